//! 核心层：错误类型与流水线装配

pub mod error;
pub mod pipeline;

pub use error::EngineError;
pub use pipeline::{Pipeline, PipelineBuilder};
