//! Mantis - Rust 多智能体任务流水线
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与流水线装配（Planner → Executor → Verifier）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **plan**: 计划数据模型与 Planner Agent（任务 → 结构化执行计划）
//! - **executor**: 依赖调度器与单步执行器（批量并发 + 参数注入）
//! - **verifier**: 结果聚合与 Verifier Agent（归组、引用提取、摘要）
//! - **tools**: 工具箱（github、weather、news、countries、crypto、wikipedia）
//!   与注册表、重试策略、查询纠错

pub mod config;
pub mod core;
pub mod executor;
pub mod llm;
pub mod observability;
pub mod plan;
pub mod tools;
pub mod verifier;
