//! 计划与执行结果的数据模型
//!
//! 不变式：
//! - `ExecutionPlan.steps[i].index == i`（0 起、稠密，解析时校验）
//! - `ExecutionResult.outcomes[i]` 恒对应 `plan.steps[i]`，与执行并发顺序无关
//! - 每个 StepOutcome 的 data / error 互斥：success 时看 data，失败时看 error

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 计划中的一个步骤：工具、动作、参数与规划理由
///
/// 调度器在分派前最多改写一次 params（依赖参数注入），此外不可变。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub index: usize,
    pub tool: String,
    pub action: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub reasoning: String,
}

/// Planner 产出的完整执行计划
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub task: String,
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub estimated_tools: Vec<String>,
}

/// 单步执行的归一化结果，与步骤 1:1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub tool: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepOutcome {
    pub fn ok(tool: impl Into<String>, data: Value) -> Self {
        Self {
            tool: tool.into(),
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(tool: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// 整个计划的执行结果：结果槽位与步骤索引对齐
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub plan: ExecutionPlan,
    pub outcomes: Vec<StepOutcome>,
    /// 执行耗时（秒）
    pub execution_time: f64,
}
