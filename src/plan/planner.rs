//! Planner Agent：自然语言任务 → 结构化执行计划
//!
//! system prompt 由工具目录动态生成；user prompt 附带当前日期，
//! 让「this month / recent」之类的措辞落到具体日期。
//! LLM 输出先截取 JSON 块再解析；结构不合法（索引不稠密、工具名为空）
//! 属于致命输入错误（InvalidPlan），不在引擎内部重试。

use std::sync::Arc;

use serde::Deserialize;

use crate::core::EngineError;
use crate::llm::{LlmClient, Message};
use crate::plan::{ExecutionPlan, PlanStep};
use crate::tools::query::extract_json;
use crate::tools::ToolRegistry;

#[derive(Debug, Deserialize)]
struct RawPlan {
    steps: Vec<PlanStep>,
    #[serde(default)]
    estimated_tools: Vec<String>,
}

/// Planner Agent：持有 LLM 与工具目录文本
pub struct PlannerAgent {
    llm: Arc<dyn LlmClient>,
    catalog_text: String,
}

impl PlannerAgent {
    pub fn new(llm: Arc<dyn LlmClient>, registry: &ToolRegistry) -> Self {
        Self {
            llm,
            catalog_text: Self::catalog_text(registry),
        }
    }

    /// 工具目录段落：`- tool: description | Actions: a(p1, p2), b(p)`
    fn catalog_text(registry: &ToolRegistry) -> String {
        let mut lines = Vec::new();
        for name in registry.tool_names() {
            if let Some(tool) = registry.get(&name) {
                let actions = tool
                    .actions()
                    .iter()
                    .map(|a| format!("{}({})", a.name, a.params.join(", ")))
                    .collect::<Vec<_>>()
                    .join(", ");
                lines.push(format!(
                    "- {}: {} | Actions: {}",
                    name,
                    tool.description(),
                    actions
                ));
            }
        }
        lines.join("\n")
    }

    fn system_prompt(&self) -> String {
        format!(
            r#"You are a Planner Agent in a multi-agent operations system. Your job is to convert natural language tasks into structured execution plans.

Available Tools:
{}

Your response MUST be valid JSON following this exact schema:
{{
  "steps": [
    {{
      "index": 0,
      "action": "search_repositories",
      "tool": "github",
      "params": {{"query": "machine learning", "limit": 3}},
      "reasoning": "Search for ML repositories as requested"
    }}
  ],
  "estimated_tools": ["github"]
}}

Rules:
1. Break down the task into sequential steps; parse the ENTIRE task and create steps for ALL of its parts.
2. "index" starts at 0 and increases by exactly 1 per step.
3. Use EXACT tool, action and parameter names from the catalog above.
4. Each step should be atomic and executable; include a short reasoning.
5. Return ONLY valid JSON, no markdown or explanations.
6. For github search_repositories, the 'query' parameter MUST NOT be empty. For "top repos" use a query like "stars:>1000" or combine a language/topic with stars.
7. For wikipedia informational queries ("brief history", "tell me about", "what is"), use TWO steps: first 'search' to find the article, then 'get_summary' with the title. The executor auto-extracts the exact title from the search results when the title matches the search query.
8. For country-specific news, prefer 'search_news' with the country name as query over 'get_top_headlines' with only a country code."#,
            self.catalog_text
        )
    }

    fn user_prompt(&self, task: &str) -> String {
        let now = chrono::Local::now();
        let current_date = now.format("%Y-%m-%d").to_string();
        let month_start = now.format("%Y-%m-01").to_string();
        format!(
            "Task: {}\n\nIMPORTANT CONTEXT:\n- Current date: {}\n- Current month start: {}\n- When the user says \"this month\", use: pushed:>={}\n\nCreate a structured execution plan for this task. Return ONLY the JSON plan.",
            task, current_date, month_start, month_start
        )
    }

    /// 生成并校验执行计划
    pub async fn create_plan(&self, task: &str) -> Result<ExecutionPlan, EngineError> {
        let task = task.trim();
        if task.is_empty() {
            return Err(EngineError::EmptyTask);
        }

        tracing::info!(task, "planner generating plan");
        let messages = vec![
            Message::system(self.system_prompt()),
            Message::user(self.user_prompt(task)),
        ];
        let output = self
            .llm
            .complete(&messages)
            .await
            .map_err(EngineError::LlmError)?;

        let plan = parse_plan(task, &output)?;
        tracing::info!(
            steps = plan.steps.len(),
            tools = ?plan.estimated_tools,
            "planner created execution plan"
        );
        Ok(plan)
    }
}

/// 解析 LLM 输出为执行计划并校验结构
pub fn parse_plan(task: &str, output: &str) -> Result<ExecutionPlan, EngineError> {
    let json_str = extract_json(output);
    let raw: RawPlan = serde_json::from_str(json_str)
        .map_err(|e| EngineError::InvalidPlan(format!("{}: {}", e, json_str)))?;

    if raw.steps.is_empty() {
        return Err(EngineError::InvalidPlan("plan has no steps".to_string()));
    }
    for (i, step) in raw.steps.iter().enumerate() {
        if step.index != i {
            return Err(EngineError::InvalidPlan(format!(
                "step indices must be dense 0..{}, got {} at position {}",
                raw.steps.len() - 1,
                step.index,
                i
            )));
        }
        if step.tool.trim().is_empty() || step.action.trim().is_empty() {
            return Err(EngineError::InvalidPlan(format!(
                "step {} has empty tool or action",
                i
            )));
        }
    }

    Ok(ExecutionPlan {
        task: task.to_string(),
        steps: raw.steps,
        estimated_tools: raw.estimated_tools,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN_JSON: &str = r#"{
        "steps": [
            {"index": 0, "tool": "weather", "action": "get_current_weather",
             "params": {"city": "Paris"}, "reasoning": "weather in Paris"},
            {"index": 1, "tool": "weather", "action": "get_current_weather",
             "params": {"city": "Tokyo"}, "reasoning": "weather in Tokyo"}
        ],
        "estimated_tools": ["weather"]
    }"#;

    #[test]
    fn parses_bare_json() {
        let plan = parse_plan("weather in Paris and Tokyo", PLAN_JSON).unwrap();
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].tool, "weather");
        assert_eq!(plan.steps[1].params["city"], "Tokyo");
        assert_eq!(plan.estimated_tools, vec!["weather"]);
    }

    #[test]
    fn parses_fenced_json() {
        let fenced = format!("Here is the plan:\n```json\n{}\n```", PLAN_JSON);
        let plan = parse_plan("task", &fenced).unwrap();
        assert_eq!(plan.steps.len(), 2);
    }

    #[test]
    fn rejects_non_dense_indices() {
        let bad = r#"{"steps": [
            {"index": 1, "tool": "weather", "action": "get_current_weather", "params": {}, "reasoning": ""}
        ]}"#;
        let err = parse_plan("task", bad).unwrap_err();
        assert!(matches!(err, EngineError::InvalidPlan(_)));
    }

    #[test]
    fn rejects_empty_plan() {
        let err = parse_plan("task", r#"{"steps": []}"#).unwrap_err();
        assert!(matches!(err, EngineError::InvalidPlan(_)));
    }

    #[test]
    fn rejects_unparseable_output() {
        let err = parse_plan("task", "I could not make a plan, sorry.").unwrap_err();
        assert!(matches!(err, EngineError::InvalidPlan(_)));
    }
}
