//! Verifier Agent：校验执行结果并产出最终报告
//!
//! 聚合 → LLM 生成 Markdown 摘要（失败时退化为确定性的计数摘要）→
//! 组装 FinalResult。部分失败不隐藏：verified=false 加逐项 verification_notes。

pub mod aggregate;

pub use aggregate::{aggregate, AggregatedData};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::{LlmClient, Message};
use crate::plan::{ExecutionPlan, ExecutionResult, StepOutcome};

/// 最终报告：结构上始终完整，部分失败通过 verified / verification_notes 表达
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalResult {
    pub task: String,
    pub summary: String,
    pub details: Value,
    pub sources: Vec<String>,
    pub execution_plan: ExecutionPlan,
    pub raw_results: Vec<StepOutcome>,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_notes: Option<String>,
}

const NARRATOR_SYSTEM_PROMPT: &str = "\
You are a Verifier Agent that creates clear, concise summaries of task execution results.

Your job:
1. Synthesize information from multiple tool outputs
2. Present results in a user-friendly format using Markdown
3. Highlight key findings with bold text, use bullet points and headers to organize
4. Note any failures or missing data
5. When multiple results exist for the same tool, list each one clearly

Return your summary in Markdown format. Keep it concise but informative.";

/// Verifier Agent：持有叙述用 LLM
pub struct VerifierAgent {
    llm: Arc<dyn LlmClient>,
}

impl VerifierAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// 校验并格式化：聚合 + 摘要 + 报告组装。本方法不失败。
    pub async fn verify_and_format(&self, task: &str, result: ExecutionResult) -> FinalResult {
        tracing::info!(task, total_results = result.outcomes.len(), "verifier starting");
        let agg = aggregate(&result);

        if !agg.failed.is_empty() {
            let failed_tools: Vec<&str> = agg.failed.iter().map(|(t, _)| t.as_str()).collect();
            tracing::warn!(?failed_tools, "verifier detected failed steps");
        }

        let summary = match self.generate_summary(task, &agg).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "narrator unavailable, using fallback summary");
                fallback_summary(task, &agg, result.outcomes.len())
            }
        };

        let verified = agg.failed.is_empty();
        let verification_notes = build_notes(&agg);
        tracing::info!(verified, summary_len = summary.len(), "verifier completed");

        FinalResult {
            task: task.to_string(),
            summary,
            details: Value::Object(agg.by_tool),
            sources: agg.citations,
            execution_plan: result.plan,
            raw_results: result.outcomes,
            verified,
            verification_notes,
        }
    }

    async fn generate_summary(&self, task: &str, agg: &AggregatedData) -> Result<String, String> {
        let failed_note = if agg.failed.is_empty() {
            String::new()
        } else {
            let tools: Vec<&str> = agg.failed.iter().map(|(t, _)| t.as_str()).collect();
            format!("\nFailed steps: {}", tools.join(", "))
        };
        let user = format!(
            "Original Task: {}\n\nCollected Data:\n{}\n{}\n\nCreate a clear, well-organized summary using Markdown formatting. \
             Include all relevant details from the data. Make sure to mention ALL results, \
             including when the same tool was called multiple times.",
            task,
            format_data_for_summary(&agg.by_tool),
            failed_note
        );
        let messages = vec![
            Message::system(NARRATOR_SYSTEM_PROMPT),
            Message::user(user),
        ];
        let summary = self.llm.complete(&messages).await?;
        let summary = summary.trim();
        if summary.is_empty() {
            return Err("narrator returned empty summary".to_string());
        }
        Ok(summary.to_string())
    }
}

/// LLM 不可用时的确定性摘要：只依赖计数与工具名，保证流水线总能给出可用报告
fn fallback_summary(task: &str, agg: &AggregatedData, total_steps: usize) -> String {
    let failure_count = agg.failed.len();
    let success_count = total_steps - failure_count;

    let mut summary = format!(
        "Task: {}\n\nExecuted {} steps. {} successful, {} failed.\n",
        task, total_steps, success_count, failure_count
    );
    if !agg.by_tool.is_empty() {
        summary.push_str("\nResults:\n");
        for tool in agg.by_tool.keys() {
            summary.push_str(&format!("- {} data retrieved\n", capitalize(tool)));
        }
    }
    summary
}

/// 逐项校验说明：失败步骤（含错误信息）、建议、已应用的纠正
fn build_notes(agg: &AggregatedData) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();

    if !agg.failed.is_empty() {
        let tools: Vec<&str> = agg.failed.iter().map(|(t, _)| t.as_str()).collect();
        parts.push(format!("Some steps failed: {}", tools.join(", ")));
        for (tool, error) in &agg.failed {
            parts.push(format!("- {}: {}", tool, error));
        }
    }
    if !agg.suggestions.is_empty() {
        parts.push("Suggestions:".to_string());
        for s in &agg.suggestions {
            parts.push(format!("- {}", s));
        }
    }
    if !agg.corrections.is_empty() {
        parts.push("Corrections applied:".to_string());
        for c in &agg.corrections {
            parts.push(format!("- {}", c));
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

/// 把聚合数据排版成 LLM 易读的缩进文本；同工具多结果逐条编号
fn format_data_for_summary(by_tool: &serde_json::Map<String, Value>) -> String {
    let mut lines = Vec::new();
    for (tool, data) in by_tool {
        lines.push(format!("\n{}:", tool.to_uppercase()));
        match data {
            Value::Array(items) => {
                for (idx, item) in items.iter().enumerate() {
                    lines.push(format!("  Result {}:", idx + 1));
                    lines.push(stringify(item, 2));
                }
            }
            other => lines.push(stringify(other, 1)),
        }
    }
    lines.join("\n")
}

/// 递归转文本：对象逐键、数组取前 3 项
fn stringify(data: &Value, indent: usize) -> String {
    let prefix = "  ".repeat(indent);
    match data {
        Value::Object(obj) => obj
            .iter()
            .map(|(key, value)| match value {
                Value::Object(_) | Value::Array(_) => {
                    format!("{}{}:\n{}", prefix, key, stringify(value, indent + 1))
                }
                other => format!("{}{}: {}", prefix, key, scalar_text(other)),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Array(items) => {
            let mut lines: Vec<String> = items
                .iter()
                .take(3)
                .enumerate()
                .map(|(i, item)| format!("{}[{}]:\n{}", prefix, i + 1, stringify(item, indent + 1)))
                .collect();
            if items.len() > 3 {
                lines.push(format!("{}... and {} more", prefix, items.len() - 3));
            }
            lines.join("\n")
        }
        other => format!("{}{}", prefix, scalar_text(other)),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use async_trait::async_trait;
    use serde_json::json;

    struct DownNarrator;

    #[async_trait]
    impl LlmClient for DownNarrator {
        async fn complete(&self, _messages: &[Message]) -> Result<String, String> {
            Err("connection refused".to_string())
        }
    }

    fn result_with(outcomes: Vec<StepOutcome>) -> ExecutionResult {
        ExecutionResult {
            plan: ExecutionPlan {
                task: "test".to_string(),
                steps: vec![],
                estimated_tools: vec![],
            },
            outcomes,
            execution_time: 0.2,
        }
    }

    #[tokio::test]
    async fn clean_run_is_verified_without_notes() {
        let verifier = VerifierAgent::new(Arc::new(MockLlmClient::with_replies(vec![
            "## Summary\nAll good.".to_string(),
        ])));
        let result = result_with(vec![StepOutcome::ok(
            "weather",
            json!({"city": "Paris", "temperature": "20°C"}),
        )]);

        let final_result = verifier.verify_and_format("weather in Paris", result).await;
        assert!(final_result.verified);
        assert!(final_result.verification_notes.is_none());
        assert_eq!(final_result.summary, "## Summary\nAll good.");
        assert_eq!(final_result.details["weather"]["city"], "Paris");
    }

    #[tokio::test]
    async fn narrator_failure_degrades_to_fallback_summary() {
        let verifier = VerifierAgent::new(Arc::new(DownNarrator));
        let result = result_with(vec![
            StepOutcome::ok("crypto", json!({"coin": "bitcoin", "price": 42000})),
            StepOutcome::failed("weather", "No weather data found for 'Xyz12'"),
        ]);

        let final_result = verifier.verify_and_format("crypto and weather", result).await;
        assert!(!final_result.verified);
        assert!(final_result.summary.contains("Executed 2 steps"));
        assert!(final_result.summary.contains("1 successful, 1 failed"));
        assert!(final_result.summary.contains("Crypto data retrieved"));

        let notes = final_result.verification_notes.unwrap();
        assert!(notes.contains("Some steps failed: weather"));
        assert!(notes.contains("No weather data found"));
    }

    #[tokio::test]
    async fn notes_include_suggestions_and_corrections() {
        let verifier = VerifierAgent::new(Arc::new(MockLlmClient::with_replies(vec![
            "summary".to_string(),
        ])));
        let result = result_with(vec![
            StepOutcome::ok(
                "weather",
                json!({"city": "Bangalore", "correction_note": "Corrected 'Bengalore' to 'Bangalore'"}),
            ),
            StepOutcome::ok(
                "news",
                json!({"articles": [], "suggestion": "Try search_news instead."}),
            ),
        ]);

        let final_result = verifier.verify_and_format("task", result).await;
        assert!(final_result.verified);
        let notes = final_result.verification_notes.unwrap();
        assert!(notes.contains("Suggestions:"));
        assert!(notes.contains("Try search_news instead."));
        assert!(notes.contains("Corrections applied:"));
        assert!(notes.contains("Corrected 'Bengalore' to 'Bangalore'"));
    }

    #[test]
    fn summary_text_limits_long_arrays() {
        let data = json!([1, 2, 3, 4, 5]);
        let text = stringify(&data, 0);
        assert!(text.contains("... and 2 more"));
    }
}
