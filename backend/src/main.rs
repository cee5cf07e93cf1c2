use axum::{
    http::Method,
    middleware as axum_middleware,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod database;
mod error;
mod handlers;
mod jobs;
mod middleware;
mod pagination;
mod services;
mod validation;

#[cfg(test)]
mod tests;

pub struct AppState {
    pub db_pool: sqlx::PgPool,
    pub config: config::Config,
    pub job_logs: jobs::ExecutionLog,
}

/// Full HTTP surface over the given state
pub fn build_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "Tally Intercompany Accounting API v0.1.0" }))
        .route("/health", get(handlers::health_check))
        .route("/health/detailed", get(middleware::detailed_health_check))
        .nest("/api", handlers::api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum_middleware::from_fn(middleware::request_logging))
                .layer(cors),
        )
        .with_state(app_state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from_env()?;
    let db_pool = database::create_pool(&config.database_url).await?;

    if !database::health_check(&db_pool).await {
        anyhow::bail!("Database at {} is not responding", database::redact_url(&config.database_url));
    }
    database::migrate(&db_pool).await?;

    let job_logs = jobs::ExecutionLog::new();
    let mut scheduler = jobs::JobScheduler::new(db_pool.clone(), config.clone(), job_logs.clone()).await?;
    scheduler.start().await?;

    tracing::info!(
        "Missing account policy: {:?}, invoice terms: {} days",
        config.accounting.missing_account_policy,
        config.accounting.invoice_due_days
    );

    let server_addr = config.server_addr.clone();
    let app_state = Arc::new(AppState { db_pool, config, job_logs });
    let app = build_router(app_state);

    let listener = tokio::net::TcpListener::bind(&server_addr).await?;
    tracing::info!("Server running on {}", server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    scheduler.shutdown().await?;
    Ok(())
}
