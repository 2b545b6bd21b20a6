//! 结果聚合
//!
//! 把有序结果表折叠成可归因的视图：
//! - 同一工具被调用多次时提升为有序列表，并给每份载荷打 `_context` 标签
//!   （如 "Weather for Paris"），标签只附加、不替换原字段
//! - 递归扫描载荷中的 url / html_url 字段，收集去重且保持首见顺序的引用表
//! - 提取工具透出的 suggestion / correction_note，作为报告里的提示项
//! - 失败槽位收进 failed 表，保持原始顺序，聚合本身永不失败

use serde_json::{Map, Value};

use crate::plan::ExecutionResult;

/// 聚合视图：构建一次，之后只读
#[derive(Debug, Default)]
pub struct AggregatedData {
    /// 工具 id → 单份带标签载荷，或有序的载荷数组
    pub by_tool: Map<String, Value>,
    /// 去重、保持插入顺序的引用 URL
    pub citations: Vec<String>,
    pub suggestions: Vec<String>,
    pub corrections: Vec<String>,
    /// (tool, error)，保持原始步骤顺序
    pub failed: Vec<(String, String)>,
}

impl AggregatedData {
    /// 提示项合并视图：建议在前，纠正在后，各自保持顺序
    pub fn advisories(&self) -> Vec<String> {
        self.suggestions
            .iter()
            .chain(self.corrections.iter())
            .cloned()
            .collect()
    }
}

/// 从执行结果构建聚合视图
pub fn aggregate(result: &ExecutionResult) -> AggregatedData {
    let mut agg = AggregatedData::default();

    for outcome in &result.outcomes {
        if !outcome.success {
            agg.failed.push((
                outcome.tool.clone(),
                outcome.error.clone().unwrap_or_else(|| "Unknown error".to_string()),
            ));
            continue;
        }
        let Some(data) = &outcome.data else { continue };

        let mut tagged = data.clone();
        if let (Value::Object(obj), Some(label)) =
            (&mut tagged, context_label(&outcome.tool, data))
        {
            obj.insert("_context".to_string(), Value::String(label));
        }

        match agg.by_tool.remove(&outcome.tool) {
            None => {
                agg.by_tool.insert(outcome.tool.clone(), tagged);
            }
            Some(Value::Array(mut list)) => {
                list.push(tagged);
                agg.by_tool.insert(outcome.tool.clone(), Value::Array(list));
            }
            Some(mut first) => {
                // 第二次出现：提升为列表；若首份还没有标签则补上
                if let Value::Object(obj) = &mut first {
                    if !obj.contains_key("_context") {
                        let label = context_label(&outcome.tool, &Value::Object(obj.clone()));
                        if let Some(label) = label {
                            obj.insert("_context".to_string(), Value::String(label));
                        }
                    }
                }
                agg.by_tool
                    .insert(outcome.tool.clone(), Value::Array(vec![first, tagged]));
            }
        }

        collect_citations(data, &mut agg.citations);

        if let Some(s) = data.get("suggestion").and_then(|v| v.as_str()) {
            agg.suggestions.push(s.to_string());
        }
        if let Some(c) = data.get("correction_note").and_then(|v| v.as_str()) {
            agg.corrections.push(c.to_string());
        }
    }

    tracing::info!(
        tools = agg.by_tool.len(),
        citations = agg.citations.len(),
        failed = agg.failed.len(),
        "aggregated execution results"
    );
    agg
}

/// 区分同一工具多次调用的短标签，取自各工具载荷里的惯用字段
fn context_label(tool: &str, data: &Value) -> Option<String> {
    let field = |key: &str| data.get(key).and_then(|v| v.as_str());
    match tool {
        "weather" => field("city").map(|c| format!("Weather for {}", c)),
        "github" => field("query").map(|q| {
            let q: String = if q.chars().count() > 50 {
                format!("{}...", q.chars().take(47).collect::<String>())
            } else {
                q.to_string()
            };
            format!("GitHub search: {}", q)
        }),
        "news" => field("query").map(|q| format!("News about {}", q)),
        "wikipedia" => field("title")
            .map(|t| format!("Wikipedia: {}", t))
            .or_else(|| field("query").map(|q| format!("Wikipedia search: {}", q))),
        "crypto" => field("coin").map(|c| format!("Crypto: {}", c)),
        "countries" => field("name")
            .map(|n| format!("Country: {}", n))
            .or_else(|| field("region").map(|r| format!("Region: {}", r))),
        _ => None,
    }
}

/// 递归收集 url / html_url 字段（任意深度），去重并保持首见顺序
fn collect_citations(data: &Value, citations: &mut Vec<String>) {
    match data {
        Value::Object(obj) => {
            for (key, value) in obj {
                match value {
                    Value::String(s) if key == "url" || key == "html_url" => {
                        if !citations.iter().any(|c| c == s) {
                            citations.push(s.clone());
                        }
                    }
                    Value::Object(_) | Value::Array(_) => collect_citations(value, citations),
                    _ => {}
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_citations(item, citations);
            }
        }
        _ => {}
    }
}
