/// Health and metrics endpoints
use crate::{context::AppContext, jobs::tasks, metrics};
use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::json;

/// Build health check routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
}

/// Reports `ok` while the database answers, `degraded` otherwise
async fn health(State(ctx): State<AppContext>) -> (StatusCode, Json<serde_json::Value>) {
    match tasks::health_check(&ctx).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION"),
                "email": ctx.mailer.is_configured(),
                "googleSignIn": ctx.identity_provider.is_some(),
            })),
        ),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "version": env!("CARGO_PKG_VERSION"),
                })),
            )
        }
    }
}

/// Prometheus text exposition
async fn metrics_text() -> Response {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render_metrics(),
    )
        .into_response()
}
