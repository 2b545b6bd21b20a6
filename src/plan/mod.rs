//! 计划层：数据模型与 Planner Agent

pub mod planner;
pub mod types;

pub use planner::PlannerAgent;
pub use types::{ExecutionPlan, ExecutionResult, PlanStep, StepOutcome};
