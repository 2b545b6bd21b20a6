//! Mantis HTTP 服务
//!
//! 启动: cargo run
//! POST /api/task/execute 走完整流水线（Planner → Executor → Verifier），
//! 非 2xx 只出现在任务为空（400）或计划生成失败等不可恢复故障（500）；
//! 单步失败不报错，体现在响应的 verified / verification_notes 里。

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use mantis::config::load_config;
use mantis::core::{EngineError, Pipeline, PipelineBuilder};
use mantis::verifier::FinalResult;

struct AppState {
    pipeline: Pipeline,
}

#[derive(Debug, Deserialize)]
struct TaskRequest {
    task: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mantis::observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        Default::default()
    });

    for var in ["OPENAI_API_KEY", "OPENWEATHERMAP_API_KEY", "NEWS_API_KEY"] {
        if std::env::var(var).is_err() {
            tracing::warn!("Missing env var: {}", var);
        }
    }

    let port = cfg.server.port;
    let state = Arc::new(AppState {
        pipeline: PipelineBuilder::new(cfg).build(),
    });

    let app = Router::new()
        .route("/", get(index))
        .route("/health", get(|| async { "OK" }))
        .route("/api/task/execute", post(api_execute_task))
        .route("/api/tools", get(api_tools_list))
        .route("/api/examples", get(api_examples))
        .with_state(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Mantis API: http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn index() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Mantis multi-agent task pipeline",
        "status": "running",
    }))
}

/// POST /api/task/execute：执行完整流水线并立即返回最终报告
async fn api_execute_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TaskRequest>,
) -> Result<Json<FinalResult>, (StatusCode, Json<ErrorResponse>)> {
    tracing::info!(task = %req.task, "execute task");
    match state.pipeline.run(&req.task).await {
        Ok(result) => Ok(Json(result)),
        Err(e) => {
            let status = match e {
                EngineError::EmptyTask => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            tracing::error!(error = %e, "task execution failed");
            Err((
                status,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            ))
        }
    }
}

/// GET /api/tools：工具目录（名称、描述、动作与参数）
async fn api_tools_list(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let catalog = state.pipeline.registry().catalog();
    Json(serde_json::json!({
        "total_tools": catalog.as_array().map(|a| a.len()).unwrap_or(0),
        "tools": catalog,
    }))
}

/// GET /api/examples：示例任务
async fn api_examples() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "examples": [
            "Get weather in London.",
            "Find top Python GitHub repositories from this month",
            "What is the weather in Bangalore right now and give me the current news about this city?",
            "Give me a brief history about Nepal",
        ]
    }))
}
