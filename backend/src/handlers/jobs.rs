//! Background job status and manual runs

use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::ApiResult;
use crate::jobs::{self, scheduler::JobExecutionLog};
use crate::AppState;

pub fn job_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs/executions", get(list_executions))
        .route("/jobs/:name/run", post(run_job))
}

async fn list_executions(State(state): State<Arc<AppState>>) -> Json<Vec<JobExecutionLog>> {
    Json(state.job_logs.recent().await)
}

async fn run_job(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let result = jobs::run_job_now(state.db_pool.clone(), &state.config, &state.job_logs, &name).await?;
    Ok(Json(json!({ "success": true, "job": name, "result": result })))
}
