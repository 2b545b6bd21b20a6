//! 流水线致命错误类型
//!
//! 只覆盖「入口边界以上」的失败：空任务、畸形计划、LLM 不可达、配置错误。
//! 单步执行的失败一律转为数据（失败的 StepOutcome），不会出现在这里。

use thiserror::Error;

/// 流水线运行过程中可能出现的致命错误
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Task cannot be empty")]
    EmptyTask,

    /// Planner 输出无法解析为结构合法的执行计划（不重试）
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}
