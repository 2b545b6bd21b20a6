//! 依赖调度器
//!
//! 把有序步骤表从左到右切成「最长的互不依赖批次」并发执行；
//! 依赖步骤单独执行，执行前从紧邻前驱的结果注入参数。
//! 批次内 fire-all / await-all，批次间严格串行（后批可能被依赖步骤卡在前批结果上）。
//! 结果按原始步骤索引回填，最终 outcomes[i] 恒对应 steps[i]。
//! 任何单步失败只产生一个失败槽位，调度器本身不中止。

use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use serde_json::Value;

use crate::executor::rules::ContinuationRules;
use crate::executor::runner::run_step;
use crate::plan::{ExecutionPlan, ExecutionResult, StepOutcome};
use crate::tools::ToolRegistry;

/// 调度器：持有注册表与依赖规则表
pub struct Executor {
    registry: Arc<ToolRegistry>,
    rules: ContinuationRules,
}

impl Executor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            rules: ContinuationRules::default(),
        }
    }

    pub fn with_rules(mut self, rules: ContinuationRules) -> Self {
        self.rules = rules;
        self
    }

    /// 执行整个计划，返回与步骤索引对齐的结果表
    pub async fn execute_plan(&self, mut plan: ExecutionPlan) -> ExecutionResult {
        let total = plan.steps.len();
        tracing::info!(task = %plan.task, total_steps = total, "executor starting plan");
        let start = Instant::now();

        let mut outcomes: Vec<StepOutcome> = Vec::with_capacity(total);
        let mut i = 0;
        while i < total {
            // 批次累积：遇到依赖步骤且批次非空时停下（依赖步骤留给下面单独处理）
            let batch_start = i;
            while i < total {
                let dependent =
                    i > 0 && self.rules.find(&plan.steps[i], &plan.steps[i - 1]).is_some();
                if dependent && i > batch_start {
                    break;
                }
                i += 1;
            }

            let batch_len = i - batch_start;
            if batch_len > 1 {
                tracing::info!(
                    from = batch_start,
                    to = i - 1,
                    "running {} steps in parallel",
                    batch_len
                );
            }
            // 批次统一走并发分派路径（size 1 也是），fire all / await all
            let futures = (batch_start..i).map(|idx| {
                let step = &plan.steps[idx];
                let registry = &self.registry;
                async move {
                    let step_start = Instant::now();
                    tracing::info!(step = idx, tool = %step.tool, action = %step.action, "step started");
                    let outcome = run_step(registry, step).await;
                    tracing::info!(
                        step = idx,
                        tool = %outcome.tool,
                        success = outcome.success,
                        duration_ms = step_start.elapsed().as_millis() as u64,
                        "step finished"
                    );
                    (idx, outcome)
                }
            });
            let mut batch_results = join_all(futures).await;
            // 完成顺序与提交顺序解耦，按原始索引回填
            batch_results.sort_by_key(|(idx, _)| *idx);
            outcomes.extend(batch_results.into_iter().map(|(_, o)| o));

            // 依赖步骤：先尝试注入参数，再单独执行
            if i < total {
                self.inject_params(&mut plan, i, &outcomes);
                let step = &plan.steps[i];
                tracing::info!(step = i, tool = %step.tool, action = %step.action, "running dependent step");
                let outcome = run_step(&self.registry, step).await;
                outcomes.push(outcome);
                i += 1;
            }
        }

        let execution_time = start.elapsed().as_secs_f64();
        tracing::info!(task = %plan.task, execution_time, "executor completed plan");
        ExecutionResult {
            plan,
            outcomes,
            execution_time,
        }
    }

    /// 依赖参数注入：前驱成功且有载荷、目标参数未被用户显式指定时，
    /// 用规则声明的字段覆盖目标参数。前驱失败时不注入，步骤照常执行。
    fn inject_params(&self, plan: &mut ExecutionPlan, idx: usize, outcomes: &[StepOutcome]) {
        let Some(rule) = self.rules.find(&plan.steps[idx], &plan.steps[idx - 1]) else {
            return;
        };
        let Some(prev) = outcomes.last() else {
            return;
        };
        if !prev.success {
            return;
        }
        let Some(data) = &prev.data else {
            return;
        };
        if !rule.should_inject(&plan.steps[idx], data) {
            return;
        }
        if let Some(value) = rule.extract(data) {
            tracing::info!(
                step = idx,
                param = rule.inject_param,
                value = %value,
                "auto-extracted parameter from previous result"
            );
            plan.steps[idx]
                .params
                .insert(rule.inject_param.to_string(), Value::String(value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanStep;
    use crate::tools::{ActionSpec, Tool, ToolError};
    use async_trait::async_trait;
    use serde_json::{json, Map};
    use std::sync::Mutex;
    use std::time::Duration;

    /// 每次调用 sleep 指定毫秒后返回 {"city": <city>}
    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Sleeps then echoes the city"
        }

        fn actions(&self) -> &'static [ActionSpec] {
            const ACTIONS: &[ActionSpec] = &[ActionSpec {
                name: "lookup",
                params: &["city", "delay_ms"],
            }];
            ACTIONS
        }

        async fn invoke(
            &self,
            _action: &str,
            params: Map<String, serde_json::Value>,
        ) -> Result<serde_json::Value, ToolError> {
            let delay = params
                .get("delay_ms")
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(json!({"city": params.get("city").cloned().unwrap_or_default()}))
        }
    }

    /// search 返回固定结果表；get_detail 记录收到的参数
    struct ChainTool {
        seen_titles: Mutex<Vec<Option<String>>>,
        fail_search: bool,
    }

    impl ChainTool {
        fn new(fail_search: bool) -> Self {
            Self {
                seen_titles: Mutex::new(Vec::new()),
                fail_search,
            }
        }
    }

    #[async_trait]
    impl Tool for ChainTool {
        fn name(&self) -> &str {
            "wikipedia"
        }

        fn description(&self) -> &str {
            "Search + detail chain"
        }

        fn actions(&self) -> &'static [ActionSpec] {
            const ACTIONS: &[ActionSpec] = &[
                ActionSpec {
                    name: "search",
                    params: &["query", "limit"],
                },
                ActionSpec {
                    name: "get_summary",
                    params: &["title"],
                },
            ];
            ACTIONS
        }

        async fn invoke(
            &self,
            action: &str,
            params: Map<String, serde_json::Value>,
        ) -> Result<serde_json::Value, ToolError> {
            match action {
                "search" => {
                    if self.fail_search {
                        return Err(ToolError::Status {
                            status: 404,
                            message: "no article".into(),
                        });
                    }
                    let query = params
                        .get("query")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default();
                    Ok(json!({
                        "query": query,
                        "results": [{"title": format!("{} (country)", query)}]
                    }))
                }
                _ => {
                    let title = params
                        .get("title")
                        .and_then(|v| v.as_str())
                        .map(String::from);
                    self.seen_titles.lock().unwrap().push(title.clone());
                    Ok(json!({"title": title, "extract": "..."}))
                }
            }
        }
    }

    fn step(index: usize, tool: &str, action: &str, params: serde_json::Value) -> PlanStep {
        PlanStep {
            index,
            tool: tool.to_string(),
            action: action.to_string(),
            params: match params {
                serde_json::Value::Object(m) => m,
                _ => Map::new(),
            },
            reasoning: String::new(),
        }
    }

    fn plan(steps: Vec<PlanStep>) -> ExecutionPlan {
        ExecutionPlan {
            task: "test".to_string(),
            steps,
            estimated_tools: vec![],
        }
    }

    #[tokio::test]
    async fn outcomes_align_with_steps() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool);
        let executor = Executor::new(Arc::new(registry));

        let result = executor
            .execute_plan(plan(vec![
                step(0, "slow", "lookup", json!({"city": "Paris"})),
                step(1, "doesnotexist", "lookup", json!({})),
                step(2, "slow", "lookup", json!({"city": "Tokyo"})),
            ]))
            .await;

        assert_eq!(result.outcomes.len(), 3);
        assert_eq!(result.outcomes[0].tool, "slow");
        assert_eq!(result.outcomes[1].tool, "doesnotexist");
        assert!(!result.outcomes[1].success);
        // 未知工具不影响后续步骤
        assert!(result.outcomes[2].success);
        assert_eq!(result.outcomes[2].data.as_ref().unwrap()["city"], "Tokyo");
    }

    #[tokio::test]
    async fn independent_steps_run_in_one_batch() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool);
        let executor = Executor::new(Arc::new(registry));

        let start = Instant::now();
        let result = executor
            .execute_plan(plan(vec![
                step(0, "slow", "lookup", json!({"city": "Paris", "delay_ms": 120})),
                step(1, "slow", "lookup", json!({"city": "Tokyo", "delay_ms": 80})),
                step(2, "slow", "lookup", json!({"city": "Lima", "delay_ms": 100})),
            ]))
            .await;
        let elapsed = start.elapsed();

        // 并发：总耗时接近 max(延迟) 而非求和
        assert!(elapsed < Duration::from_millis(280), "elapsed {elapsed:?}");
        // 完成顺序（Tokyo 最先）不影响输出顺序
        assert_eq!(result.outcomes[0].data.as_ref().unwrap()["city"], "Paris");
        assert_eq!(result.outcomes[1].data.as_ref().unwrap()["city"], "Tokyo");
        assert_eq!(result.outcomes[2].data.as_ref().unwrap()["city"], "Lima");
        assert!(result.execution_time > 0.0);
    }

    #[tokio::test]
    async fn dependent_step_gets_injected_title() {
        let mut registry = ToolRegistry::new();
        let chain = Arc::new(ChainTool::new(false));
        registry.register(ArcTool(chain.clone()));
        let executor = Executor::new(Arc::new(registry));

        let result = executor
            .execute_plan(plan(vec![
                step(0, "wikipedia", "search", json!({"query": "Nepal", "limit": 1})),
                step(1, "wikipedia", "get_summary", json!({"title": "Nepal"})),
            ]))
            .await;

        assert!(result.outcomes[0].success);
        assert!(result.outcomes[1].success);
        let seen = chain.seen_titles.lock().unwrap();
        assert_eq!(seen.as_slice(), &[Some("Nepal (country)".to_string())]);
    }

    #[tokio::test]
    async fn explicit_distinct_title_is_not_overridden() {
        let mut registry = ToolRegistry::new();
        let chain = Arc::new(ChainTool::new(false));
        registry.register(ArcTool(chain.clone()));
        let executor = Executor::new(Arc::new(registry));

        executor
            .execute_plan(plan(vec![
                step(0, "wikipedia", "search", json!({"query": "Nepal"})),
                step(
                    1,
                    "wikipedia",
                    "get_summary",
                    json!({"title": "History of Nepal"}),
                ),
            ]))
            .await;

        let seen = chain.seen_titles.lock().unwrap();
        assert_eq!(seen.as_slice(), &[Some("History of Nepal".to_string())]);
    }

    #[tokio::test]
    async fn dependent_step_runs_without_injection_when_predecessor_failed() {
        let mut registry = ToolRegistry::new();
        let chain = Arc::new(ChainTool::new(true));
        registry.register(ArcTool(chain.clone()));
        let executor = Executor::new(Arc::new(registry));

        let result = executor
            .execute_plan(plan(vec![
                step(0, "wikipedia", "search", json!({"query": "Nepal"})),
                step(1, "wikipedia", "get_summary", json!({"title": "Nepal"})),
            ]))
            .await;

        assert!(!result.outcomes[0].success);
        // 依赖步骤不跳过：以 Planner 给的参数照常执行
        assert!(result.outcomes[1].success);
        let seen = chain.seen_titles.lock().unwrap();
        assert_eq!(seen.as_slice(), &[Some("Nepal".to_string())]);
    }

    /// 测试辅助：让 Arc<ChainTool> 可被注册（注册表要求值语义）
    struct ArcTool(Arc<ChainTool>);

    #[async_trait]
    impl Tool for ArcTool {
        fn name(&self) -> &str {
            self.0.name()
        }

        fn description(&self) -> &str {
            self.0.description()
        }

        fn actions(&self) -> &'static [ActionSpec] {
            self.0.actions()
        }

        async fn invoke(
            &self,
            action: &str,
            params: Map<String, serde_json::Value>,
        ) -> Result<serde_json::Value, ToolError> {
            self.0.invoke(action, params).await
        }
    }
}
