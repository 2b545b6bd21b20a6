//! 执行层：依赖调度器与单步执行器

pub mod rules;
pub mod runner;
pub mod scheduler;

pub use rules::{ContinuationRule, ContinuationRules};
pub use runner::run_step;
pub use scheduler::Executor;
