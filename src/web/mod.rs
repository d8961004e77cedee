pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod ui;

use crate::models::{BinaryClassifier, ModelManager, ModelStats};
use crate::utils::error::ClassifierError;
use crate::{Config, Result};
use axum::{
    extract::{DefaultBodyLimit, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer, limit::RequestBodyLimitLayer, services::ServeDir, timeout::TimeoutLayer,
};
use ui::Templates;

/// 处理器共享状态，模型只读
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub model: Arc<BinaryClassifier>,
    pub templates: Arc<Templates>,
}

impl AppState {
    pub fn new(config: Config, model: Arc<BinaryClassifier>) -> Result<Self> {
        Ok(Self {
            config: Arc::new(config),
            model,
            templates: Arc::new(Templates::new()?),
        })
    }
}

pub async fn serve(config: Config) -> Result<()> {
    config.validate()?;

    // 上传目录在启动时创建
    tokio::fs::create_dir_all(&config.media.media_dir).await?;

    // 模型加载失败直接终止启动
    let manager = ModelManager::init(config.clone())?;
    manager.health_check()?;
    tracing::info!("Model stats: {:?}", manager.get_stats());

    let state = AppState::new(config.clone(), manager.model())?;
    let app = create_app(state);

    // 解析绑定地址
    let addr: SocketAddr = config.bind_addr.parse().map_err(|e| {
        ClassifierError::Config(format!("Invalid bind address {}: {}", config.bind_addr, e))
    })?;

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /                     - Upload form");
    tracing::info!("  POST /                     - Form submission");
    tracing::info!("  GET  {}*               - Stored uploads", config.media.media_url);
    tracing::info!("  POST /api/predict          - Multipart upload (JSON result)");
    tracing::info!("  POST /api/predict/base64   - JSON base64 upload");
    tracing::info!("  GET  /health               - Health check");
    tracing::info!("  GET  /api/info             - Service information");

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        ClassifierError::Internal(format!("Failed to bind to address {}: {}", addr, e))
    })?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ClassifierError::Internal(format!("Server failed: {}", e)))?;

    tracing::info!("Server stopped");
    Ok(())
}

pub fn create_app(state: AppState) -> Router {
    let max_request_size = state.config.server_config.max_request_size;
    let request_timeout = Duration::from_secs(state.config.server_config.request_timeout);
    let media_route = state.config.media.media_url.trim_end_matches('/').to_string();
    let media_dir = ServeDir::new(state.config.media.media_dir.clone());

    Router::new()
        // 上传表单
        .route("/", get(handlers::upload_form).post(handlers::upload_submit))
        // JSON API
        .route("/api/predict", post(handlers::api_predict))
        .route("/api/predict/base64", post(handlers::api_predict_base64))
        // 系统路由
        .route("/health", get(health_handler))
        .route("/api/info", get(info_handler))
        // 已上传文件
        .nest_service(&media_route, media_dir)
        // 添加中间件
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::middleware::from_fn(middleware::request_logging))
        .layer(DefaultBodyLimit::max(max_request_size))
        .layer(RequestBodyLimitLayer::new(max_request_size))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// 健康检查端点
async fn health_handler(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    ModelStats::collect(&state.model, &state.config).check()?;

    Ok(Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })))
}

/// 服务信息端点
async fn info_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = ModelStats::collect(&state.model, &state.config);

    Json(json!({
        "service": "ONNX Image Classifier",
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "model": stats,
        "limits": {
            "max_upload_size": state.config.server_config.max_upload_size,
            "request_timeout_secs": state.config.server_config.request_timeout,
        }
    }))
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
    }
}
