//! 单步执行器
//!
//! (registry, step) → StepOutcome 的纯函数，调用间不保留状态，永不 panic：
//! 工具/动作解析失败、参数问题、远程故障全部折叠为失败的结果槽位。

use serde_json::Map;

use crate::plan::{PlanStep, StepOutcome};
use crate::tools::ToolRegistry;

/// 执行一个步骤并归一化结果
pub async fn run_step(registry: &ToolRegistry, step: &PlanStep) -> StepOutcome {
    let Some(tool) = registry.get(&step.tool) else {
        tracing::error!(tool = %step.tool, "tool not found");
        return StepOutcome::failed(&step.tool, format!("Tool '{}' not found", step.tool));
    };

    let Some(spec) = tool.actions().iter().find(|a| a.name == step.action) else {
        tracing::error!(tool = %step.tool, action = %step.action, "action not found");
        return StepOutcome::failed(
            &step.tool,
            format!("Action '{}' not found in tool '{}'", step.action, step.tool),
        );
    };

    // Planner 常会多给参数；只保留动作签名声明接受的键
    let mut filtered = Map::new();
    let mut dropped: Vec<&str> = Vec::new();
    for (key, value) in &step.params {
        if spec.accepts(key) {
            filtered.insert(key.clone(), value.clone());
        } else {
            dropped.push(key);
        }
    }
    if !dropped.is_empty() {
        tracing::warn!(
            tool = %step.tool,
            action = %step.action,
            dropped = ?dropped,
            "filtering out unsupported params"
        );
    }

    match tool.invoke(&step.action, filtered).await {
        Ok(data) => StepOutcome::ok(&step.tool, data),
        Err(e) => {
            tracing::warn!(tool = %step.tool, action = %step.action, error = %e, "step failed");
            StepOutcome::failed(&step.tool, e.to_string())
        }
    }
}
