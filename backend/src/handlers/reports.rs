use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::pagination::{CompanyListParams, ReferenceParams};
use crate::services::reports::{self, LedgerSummary, ReferenceMatches};
use crate::validation::id;
use crate::AppState;

pub fn report_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/accounts-receivable/comprehensive-fixed", get(accounts_receivable))
        .route("/accounts-payable/comprehensive-fixed", get(accounts_payable))
        .route("/transactions/reference-lookup-fixed", get(reference_lookup))
}

async fn accounts_receivable(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CompanyListParams>,
) -> ApiResult<Json<LedgerSummary>> {
    let company_id = id::required(params.company_id, "companyId")?;
    let mut conn = state.db_pool.acquire().await?;
    Ok(Json(reports::receivables(&mut conn, company_id).await?))
}

async fn accounts_payable(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CompanyListParams>,
) -> ApiResult<Json<LedgerSummary>> {
    let company_id = id::required(params.company_id, "companyId")?;
    let mut conn = state.db_pool.acquire().await?;
    Ok(Json(reports::payables(&mut conn, company_id).await?))
}

async fn reference_lookup(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReferenceParams>,
) -> ApiResult<Json<ReferenceMatches>> {
    let reference = params
        .reference
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .ok_or_else(|| ApiError::required("reference"))?;

    let mut conn = state.db_pool.acquire().await?;
    let matches = reports::reference_lookup(&mut conn, reference, params.company_id, params.limit).await?;
    Ok(Json(matches))
}
