//! 工具箱
//!
//! 所有工具实现 Tool trait（name / description / actions / invoke），
//! 每个动作静态声明接受的参数名集合，执行器据此过滤 Planner 多给的参数。
//! 动作统一返回 Result<Value, ToolError>：成功为结构化 JSON 载荷，
//! 失败为带分类的错误（供重试策略判定是否可重试）。

pub mod countries;
pub mod crypto;
pub mod github;
pub mod news;
pub mod query;
pub mod registry;
pub mod retry;
pub mod weather;
pub mod wikipedia;

pub use countries::CountriesTool;
pub use crypto::CryptoTool;
pub use github::GitHubTool;
pub use news::NewsTool;
pub use query::QueryOptimizer;
pub use registry::ToolRegistry;
pub use retry::RetryPolicy;
pub use weather::WeatherTool;
pub use wikipedia::WikipediaTool;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// 远程调用错误：分类决定重试行为
#[derive(Error, Debug)]
pub enum ToolError {
    /// 连接失败等网络故障（可重试）
    #[error("Network error: {0}")]
    Network(String),

    /// 请求超时（可重试）
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// 远端返回非 2xx 状态（5xx 与 429 可重试，其余不可）
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// 响应体无法解析（不可重试）
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// 业务层拒绝：参数非法、资源不存在、缺少凭证等（不可重试）
    #[error("{0}")]
    Rejected(String),
}

impl ToolError {
    /// 可重试：网络/超时故障，或 5xx / 429 状态
    pub fn is_retryable(&self) -> bool {
        match self {
            ToolError::Network(_) | ToolError::Timeout(_) => true,
            ToolError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ToolError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ToolError::Timeout(e.to_string())
        } else if e.is_connect() {
            ToolError::Network(e.to_string())
        } else if e.is_decode() {
            ToolError::InvalidResponse(e.to_string())
        } else {
            ToolError::Network(e.to_string())
        }
    }
}

/// 每个工具独占一个 HTTP 客户端：装配时创建，注册表销毁时随之释放
pub(crate) fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent("mantis/0.1 (multi-agent task pipeline)")
        .build()
        .unwrap_or_default()
}

/// GET 请求 + 状态检查 + JSON 解码；非 2xx 转 ToolError::Status（带截断的响应体）
pub(crate) async fn get_json(
    client: &reqwest::Client,
    url: &str,
    query: &[(&str, String)],
) -> Result<Value, ToolError> {
    let resp = client.get(url).query(query).send().await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let message: String = body.chars().take(200).collect();
        return Err(ToolError::Status {
            status: status.as_u16(),
            message,
        });
    }
    resp.json::<Value>()
        .await
        .map_err(|e| ToolError::InvalidResponse(e.to_string()))
}

/// 从参数表取必填字符串
pub(crate) fn required_str<'a>(
    params: &'a Map<String, Value>,
    key: &str,
) -> Result<&'a str, ToolError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::Rejected(format!("Missing required parameter '{}'", key)))
}

/// 从参数表取可选字符串（带默认值）
pub(crate) fn str_or<'a>(params: &'a Map<String, Value>, key: &str, default: &'a str) -> &'a str {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default)
}

/// 从参数表取可选整数（带默认值）
pub(crate) fn u64_or(params: &Map<String, Value>, key: &str, default: u64) -> u64 {
    params.get(key).and_then(|v| v.as_u64()).unwrap_or(default)
}

/// 动作签名：名称与接受的参数名集合（用于执行前过滤）
#[derive(Debug, Clone, Copy)]
pub struct ActionSpec {
    pub name: &'static str,
    pub params: &'static [&'static str],
}

impl ActionSpec {
    pub fn accepts(&self, key: &str) -> bool {
        self.params.contains(&key)
    }
}

/// 工具 trait：名称、描述（供 Planner 理解）、动作签名表、按名调用
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（计划步骤中的 "tool" 字段）
    fn name(&self) -> &str;

    /// 工具描述（进 Planner 的工具目录）
    fn description(&self) -> &str;

    /// 该工具暴露的动作签名表
    fn actions(&self) -> &'static [ActionSpec];

    /// 执行指定动作（params 已按签名过滤）
    async fn invoke(&self, action: &str, params: Map<String, Value>) -> Result<Value, ToolError>;
}
