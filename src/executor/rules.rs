//! 步骤间依赖关系表
//!
//! 一条规则声明：某 (tool, action) 依赖紧邻前驱的某 (tool, action)，
//! 并可从前驱载荷中提取一个值注入到本步骤的参数里
//! （如 wikipedia search 的首条结果标题 → get_summary 的 title）。
//! 注入有保护：参数缺失、或仍等于前驱的原始查询词时才覆盖，
//! 用户显式给出的不同值绝不被改写。

use serde_json::Value;

use crate::plan::PlanStep;

/// 依赖规则：后继 (tool, action) ← 前驱 (tool, action)
#[derive(Debug, Clone, Copy)]
pub struct ContinuationRule {
    pub tool: &'static str,
    pub action: &'static str,
    pub predecessor_tool: &'static str,
    pub predecessor_action: &'static str,
    /// 注入目标参数名
    pub inject_param: &'static str,
    /// 前驱载荷中的列表字段，取其首个元素
    pub source_list: &'static str,
    /// 列表元素里要提取的字段
    pub source_field: &'static str,
    /// 前驱载荷中的原始查询词字段（注入保护用）
    pub query_field: &'static str,
}

impl ContinuationRule {
    /// step 是否按本规则依赖 predecessor
    pub fn matches(&self, step: &PlanStep, predecessor: &PlanStep) -> bool {
        step.tool == self.tool
            && step.action == self.action
            && predecessor.tool == self.predecessor_tool
            && predecessor.action == self.predecessor_action
    }

    /// 从前驱载荷提取注入值（列表首元素的指定字段）
    pub fn extract(&self, payload: &Value) -> Option<String> {
        payload
            .get(self.source_list)?
            .get(0)?
            .get(self.source_field)?
            .as_str()
            .map(String::from)
    }

    /// 是否允许注入：目标参数缺失，或等于前驱的原始查询词
    pub fn should_inject(&self, step: &PlanStep, payload: &Value) -> bool {
        match step.params.get(self.inject_param) {
            None => true,
            Some(current) => payload.get(self.query_field) == Some(current),
        }
    }
}

/// 规则表：可注册扩展，默认只含 wikipedia search → get_summary
#[derive(Debug, Clone)]
pub struct ContinuationRules {
    rules: Vec<ContinuationRule>,
}

impl Default for ContinuationRules {
    fn default() -> Self {
        Self {
            rules: vec![ContinuationRule {
                tool: "wikipedia",
                action: "get_summary",
                predecessor_tool: "wikipedia",
                predecessor_action: "search",
                inject_param: "title",
                source_list: "results",
                source_field: "title",
                query_field: "query",
            }],
        }
    }
}

impl ContinuationRules {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn register(&mut self, rule: ContinuationRule) {
        self.rules.push(rule);
    }

    /// 查找使 step 依赖 predecessor 的规则
    pub fn find(&self, step: &PlanStep, predecessor: &PlanStep) -> Option<&ContinuationRule> {
        self.rules.iter().find(|r| r.matches(step, predecessor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn step(index: usize, tool: &str, action: &str, params: Value) -> PlanStep {
        let params = match params {
            Value::Object(m) => m,
            _ => Map::new(),
        };
        PlanStep {
            index,
            tool: tool.to_string(),
            action: action.to_string(),
            params,
            reasoning: String::new(),
        }
    }

    #[test]
    fn default_table_matches_wikipedia_chain() {
        let rules = ContinuationRules::default();
        let search = step(0, "wikipedia", "search", json!({"query": "Nepal"}));
        let summary = step(1, "wikipedia", "get_summary", json!({"title": "Nepal"}));

        assert!(rules.find(&summary, &search).is_some());
        // 方向相反不匹配
        assert!(rules.find(&search, &summary).is_none());
        // 其他工具不匹配
        let weather = step(0, "weather", "get_current_weather", json!({}));
        assert!(rules.find(&summary, &weather).is_none());
    }

    #[test]
    fn extracts_first_result_title() {
        let rules = ContinuationRules::default();
        let rule = rules.rules[0];
        let payload = json!({
            "query": "Nepal",
            "results": [
                {"title": "Nepal (country)", "url": "https://en.wikipedia.org/wiki/Nepal"},
                {"title": "Nepal national cricket team"}
            ]
        });
        assert_eq!(rule.extract(&payload).as_deref(), Some("Nepal (country)"));

        assert_eq!(rule.extract(&json!({"query": "x", "results": []})), None);
        assert_eq!(rule.extract(&json!({"query": "x"})), None);
    }

    #[test]
    fn injection_guard_respects_explicit_values() {
        let rules = ContinuationRules::default();
        let rule = rules.rules[0];
        let payload = json!({"query": "Nepal", "results": [{"title": "Nepal (country)"}]});

        // 参数缺失：允许
        let missing = step(1, "wikipedia", "get_summary", json!({}));
        assert!(rule.should_inject(&missing, &payload));

        // 参数等于查询词：允许
        let same = step(1, "wikipedia", "get_summary", json!({"title": "Nepal"}));
        assert!(rule.should_inject(&same, &payload));

        // 用户显式给了不同值：拒绝
        let explicit = step(1, "wikipedia", "get_summary", json!({"title": "History of Nepal"}));
        assert!(!rule.should_inject(&explicit, &payload));
    }
}
