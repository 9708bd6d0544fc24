use axum::{
    body::Bytes,
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use super::responses::{
    DistributionResponse, ErrorBody, HealthResponse, StatsResponse, SubmitResponse,
    INVALID_SUBMISSION, SERVICE_UNAVAILABLE,
};
use crate::engine::Aggregator;
use crate::error::AggregationError;
use crate::model::validation::SubmitBody;

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
}

impl AppState {
    pub fn new(aggregator: Aggregator) -> Self {
        Self {
            aggregator: Arc::new(aggregator),
        }
    }
}

/// 把聚合层错误映射成 HTTP 响应：校验错误 400，存储错误 500 且只回通用文案
impl IntoResponse for AggregationError {
    fn into_response(self) -> Response {
        match self {
            AggregationError::Validation(e) => {
                warn!(reason = %e, "🚫 [Submit] rejected");
                (StatusCode::BAD_REQUEST, Json(ErrorBody::new(INVALID_SUBMISSION))).into_response()
            }
            AggregationError::Store(e) => {
                error!(error = %e, connectivity = e.is_connectivity(), "❌ [Store] request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody::new(SERVICE_UNAVAILABLE)),
                )
                    .into_response()
            }
        }
    }
}

pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/submit", post(submit_handler))
        .route("/stats", get(stats_handler))
        .route("/distribution/:item_id", get(distribution_handler))
        .route("/health", get(health_handler))
        .layer(middleware::from_fn_with_state(
            request_timeout,
            request_deadline,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(
    listener: TcpListener,
    state: AppState,
    request_timeout: Duration,
) -> std::io::Result<()> {
    let app = build_router(state, request_timeout);
    info!(
        "🌐 [Gateway] Listening on http://{}",
        listener.local_addr()?
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

/// 整个请求的总时限：超时和存储失败一样回 500 + 通用文案
async fn request_deadline(
    State(limit): State<Duration>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();
    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            error!(
                path = %path,
                limit_ms = limit.as_millis() as u64,
                "⏱️ [Gateway] request deadline exceeded"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::new(SERVICE_UNAVAILABLE)),
            )
                .into_response()
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("❌ [Gateway] Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("👋 [Gateway] Shutdown signal received");
}

/// 请求体自己解析：坏 JSON 也按校验失败处理
async fn submit_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let body = match SubmitBody::from_slice(&body) {
        Ok(body) => body,
        Err(e) => return AggregationError::from(e).into_response(),
    };

    match state.aggregator.submit_guess(&body).await {
        Ok(outcome) => {
            info!(
                item_id = %outcome.item_id,
                guess_kg = outcome.guess_kg,
                window = outcome.recent.len(),
                "✅ [Submit] accepted"
            );
            Json(SubmitResponse::from(outcome)).into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn stats_handler(State(state): State<AppState>) -> Response {
    match state.aggregator.fetch_global_stats().await {
        Ok(stats) => Json(StatsResponse::from(stats)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn distribution_handler(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> Response {
    match state.aggregator.item_distribution(&item_id).await {
        Ok(dist) => Json(DistributionResponse::from(dist)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn health_handler(State(state): State<AppState>) -> Response {
    match state.aggregator.store().acquire().await {
        Ok(store) => Json(HealthResponse {
            status: "ok",
            backend: store.backend_name().to_string(),
        })
        .into_response(),
        Err(e) => AggregationError::from(e).into_response(),
    }
}
