use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

use tally_shared::{Bill, BillPayment, Invoice, JournalEntry, Receipt};

use crate::error::{ApiError, ApiResult};
use crate::pagination::{CompanyListParams, PaginatedResponse};
use crate::services::{invoicing, ledger};
use crate::validation::id;
use crate::AppState;

pub fn document_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/invoices", get(list_invoices))
        .route("/invoices/:id", get(get_invoice))
        .route("/bills", get(list_bills))
        .route("/bills/:id", get(get_bill))
        .route("/journal-entries", get(list_journal_entries))
        .route("/journal-entries/:id", get(get_journal_entry))
}

async fn list_invoices(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CompanyListParams>,
) -> ApiResult<Json<PaginatedResponse<Invoice>>> {
    let company_id = id::required(params.company_id, "companyId")?;
    let page = params.page();
    let status = params.status_filter();

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM invoices WHERE company_id = $1 AND ($2::TEXT IS NULL OR status = $2)"
    )
    .bind(company_id)
    .bind(&status)
    .fetch_one(&state.db_pool)
    .await?;

    let invoices = sqlx::query_as::<_, Invoice>(
        "SELECT * FROM invoices
         WHERE company_id = $1 AND ($2::TEXT IS NULL OR status = $2)
         ORDER BY invoice_date DESC, id DESC
         LIMIT $3 OFFSET $4"
    )
    .bind(company_id)
    .bind(&status)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(PaginatedResponse::new(invoices, page, total)))
}

async fn get_invoice(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<Json<Value>> {
    let mut conn = state.db_pool.acquire().await?;

    let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::not_found("Invoice"))?;

    let items = invoicing::invoice_items(&mut conn, invoice.id).await?;
    let receipts = sqlx::query_as::<_, Receipt>(
        "SELECT * FROM receipts WHERE invoice_id = $1 ORDER BY payment_date, id"
    )
    .bind(invoice.id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Json(json!({ "invoice": invoice, "items": items, "receipts": receipts })))
}

async fn list_bills(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CompanyListParams>,
) -> ApiResult<Json<PaginatedResponse<Bill>>> {
    let company_id = id::required(params.company_id, "companyId")?;
    let page = params.page();
    let status = params.status_filter();

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM bills WHERE company_id = $1 AND ($2::TEXT IS NULL OR status = $2)"
    )
    .bind(company_id)
    .bind(&status)
    .fetch_one(&state.db_pool)
    .await?;

    let bills = sqlx::query_as::<_, Bill>(
        "SELECT * FROM bills
         WHERE company_id = $1 AND ($2::TEXT IS NULL OR status = $2)
         ORDER BY bill_date DESC, id DESC
         LIMIT $3 OFFSET $4"
    )
    .bind(company_id)
    .bind(&status)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(PaginatedResponse::new(bills, page, total)))
}

async fn get_bill(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<Json<Value>> {
    let mut conn = state.db_pool.acquire().await?;

    let bill = sqlx::query_as::<_, Bill>("SELECT * FROM bills WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::not_found("Bill"))?;

    let items = invoicing::bill_items(&mut conn, bill.id).await?;
    let payments = sqlx::query_as::<_, BillPayment>(
        "SELECT * FROM bill_payments WHERE bill_id = $1 ORDER BY payment_date, id"
    )
    .bind(bill.id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Json(json!({ "bill": bill, "items": items, "payments": payments })))
}

async fn list_journal_entries(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CompanyListParams>,
) -> ApiResult<Json<PaginatedResponse<JournalEntry>>> {
    let company_id = id::required(params.company_id, "companyId")?;
    let page = params.page();

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM journal_entries WHERE company_id = $1")
        .bind(company_id)
        .fetch_one(&state.db_pool)
        .await?;

    let entries = sqlx::query_as::<_, JournalEntry>(
        "SELECT * FROM journal_entries
         WHERE company_id = $1
         ORDER BY entry_date DESC, id DESC
         LIMIT $2 OFFSET $3"
    )
    .bind(company_id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(PaginatedResponse::new(entries, page, total)))
}

async fn get_journal_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<Json<Value>> {
    let mut conn = state.db_pool.acquire().await?;

    let entry = sqlx::query_as::<_, JournalEntry>("SELECT * FROM journal_entries WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::not_found("Journal entry"))?;

    let items = ledger::entry_items(&mut conn, entry.id).await?;

    Ok(Json(json!({ "entry": entry, "items": items })))
}
