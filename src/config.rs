//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MANTIS__*` 覆盖（双下划线表示嵌套，
//! 如 `MANTIS__SERVER__PORT=9090`）。API Key 一律从进程环境读取，不进配置文件。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub server: ServerSection,
}

/// [llm] 段：后端与模型
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmSection {
    /// 后端：openai（任意 OpenAI 兼容端点）/ mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

/// [tools] 段：HTTP 超时与查询纠错开关
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ToolsSection {
    /// 单次远程请求超时（秒）
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// 是否启用 LLM 查询纠错（weather / crypto / countries）
    #[serde(default = "default_query_correction")]
    pub query_correction: bool,
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_query_correction() -> bool {
    true
}

/// [retry] 段：远程调用重试策略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    /// 总尝试次数（含首次）
    pub max_attempts: u32,
    pub initial_backoff_secs: u64,
    pub multiplier: u32,
    pub max_backoff_secs: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_secs: 1,
            multiplier: 2,
            max_backoff_secs: 10,
        }
    }
}

/// [server] 段：HTTP 服务
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmSection::default(),
            tools: ToolsSection::default(),
            retry: RetrySection::default(),
            server: ServerSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 MANTIS__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 MANTIS__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MANTIS")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
