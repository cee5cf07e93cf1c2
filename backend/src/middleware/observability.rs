use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request, Response, StatusCode},
    middleware::Next,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::database::{self, PoolStats};
use crate::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Tags each request with an id and logs method, path, status and duration
pub async fn request_logging(request: Request<Body>, next: Next) -> Response<Body> {
    let request_id = Uuid::new_v4();
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let mut response = next.run(request).await;

    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    let route = normalize_path(&path);

    if status.is_server_error() {
        tracing::error!(%request_id, %method, %route, status = status.as_u16(), elapsed_ms, "request failed");
    } else if status.is_client_error() {
        tracing::warn!(%request_id, %method, %route, status = status.as_u16(), elapsed_ms, "request rejected");
    } else {
        tracing::info!(%request_id, %method, %route, status = status.as_u16(), elapsed_ms, "request completed");
    }

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

/// Normalize path to group similar endpoints (e.g., /api/invoices/123 -> /api/invoices/:id)
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|s| {
            if s.parse::<i64>().is_ok() || Uuid::parse_str(s).is_ok() {
                ":id"
            } else {
                s
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Health check endpoint with database status and pool usage
pub async fn detailed_health_check(
    State(state): State<Arc<AppState>>,
) -> Result<axum::Json<HealthCheckResponse>, (StatusCode, axum::Json<HealthCheckResponse>)> {
    let started = Instant::now();

    let database = match sqlx::query("SELECT 1").execute(&state.db_pool).await {
        Ok(_) => ServiceStatus {
            status: "healthy".to_string(),
            response_time_ms: Some(started.elapsed().as_millis() as i64),
            details: None,
        },
        Err(e) => ServiceStatus {
            status: "unhealthy".to_string(),
            response_time_ms: Some(started.elapsed().as_millis() as i64),
            details: Some(serde_json::json!({ "error": e.to_string() })),
        },
    };

    let healthy = database.status == "healthy";
    let response = HealthCheckResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database,
        pool: database::get_pool_stats(&state.db_pool),
        auto_invoicing_enabled: state.config.auto_invoicing.enabled,
    };

    if healthy {
        Ok(axum::Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, axum::Json(response)))
    }
}

#[derive(Debug, serde::Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
    pub database: ServiceStatus,
    pub pool: PoolStats,
    pub auto_invoicing_enabled: bool,
}

#[derive(Debug, serde::Serialize)]
pub struct ServiceStatus {
    pub status: String,
    pub response_time_ms: Option<i64>,
    pub details: Option<serde_json::Value>,
}
