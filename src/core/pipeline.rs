//! 流水线装配：统一的组件初始化逻辑
//!
//! Builder 从配置构造 LLM、重试策略、查询纠错器与全部工具（API Key 从进程环境读取），
//! 装配成 Planner → Executor → Verifier 的流水线。所有客户端在这里显式创建、
//! 显式注入，随 Pipeline 生命周期释放。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::EngineError;
use crate::executor::Executor;
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};
use crate::plan::PlannerAgent;
use crate::tools::{
    CountriesTool, CryptoTool, GitHubTool, NewsTool, QueryOptimizer, RetryPolicy, ToolRegistry,
    WeatherTool, WikipediaTool,
};
use crate::verifier::{FinalResult, VerifierAgent};

/// 装配好的流水线：规划 → 执行 → 校验
pub struct Pipeline {
    planner: PlannerAgent,
    executor: Executor,
    verifier: VerifierAgent,
    registry: Arc<ToolRegistry>,
}

impl Pipeline {
    /// 跑完整条流水线；入口边界以下的失败都已折叠进 FinalResult
    pub async fn run(&self, task: &str) -> Result<FinalResult, EngineError> {
        let task = task.trim();
        if task.is_empty() {
            return Err(EngineError::EmptyTask);
        }

        let plan = self.planner.create_plan(task).await?;
        let result = self.executor.execute_plan(plan).await;
        Ok(self.verifier.verify_and_format(task, result).await)
    }

    /// 工具注册表（/api/tools 用）
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}

/// 流水线构建器
pub struct PipelineBuilder {
    config: AppConfig,
}

impl PipelineBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// 根据配置与环境变量选择 LLM 后端（OpenAI 兼容 / Mock）
    pub fn build_llm(&self) -> Arc<dyn LlmClient> {
        let provider = self.config.llm.provider.to_lowercase();
        let has_key = std::env::var("OPENAI_API_KEY").is_ok();

        if provider == "openai" && has_key {
            let model = self.config.llm.model.clone();
            let base = self.config.llm.base_url.as_deref();
            tracing::info!("Using OpenAI-compatible LLM ({})", model);
            Arc::new(OpenAiClient::new(
                base,
                &model,
                std::env::var("OPENAI_API_KEY").ok().as_deref(),
            ))
        } else {
            tracing::warn!("No API key set or provider unknown, using Mock LLM");
            Arc::new(MockLlmClient::new())
        }
    }

    /// 构建统一的工具注册表（所有接入方式共享同一套工具）
    pub fn build_tool_registry(&self, llm: Arc<dyn LlmClient>) -> ToolRegistry {
        let timeout = self.config.tools.http_timeout_secs;
        let retry = RetryPolicy::from_config(&self.config.retry);
        let optimizer = Arc::new(QueryOptimizer::new(
            llm,
            self.config.tools.query_correction,
        ));

        let mut tools = ToolRegistry::new();
        tools.register(GitHubTool::new(timeout, retry.clone()));
        tools.register(WeatherTool::new(
            timeout,
            std::env::var("OPENWEATHERMAP_API_KEY").ok(),
            retry.clone(),
            optimizer.clone(),
        ));
        tools.register(NewsTool::new(
            timeout,
            std::env::var("NEWS_API_KEY").ok(),
            retry.clone(),
        ));
        tools.register(CountriesTool::new(timeout, retry.clone(), optimizer.clone()));
        tools.register(CryptoTool::new(timeout, retry.clone(), optimizer));
        tools.register(WikipediaTool::new(timeout, retry));
        tools
    }

    /// 构建完整流水线
    pub fn build(&self) -> Pipeline {
        let llm = self.build_llm();
        let registry = Arc::new(self.build_tool_registry(llm.clone()));

        Pipeline {
            planner: PlannerAgent::new(llm.clone(), &registry),
            executor: Executor::new(registry.clone()),
            verifier: VerifierAgent::new(llm),
            registry,
        }
    }
}
