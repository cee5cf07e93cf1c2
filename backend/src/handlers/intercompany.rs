//! Intercompany workflow endpoints: order pairs, issuance, settlement

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::pagination::{CompanyListParams, PaginatedResponse};
use crate::services::orders::{self, OrderLineInput};
use crate::services::settlement::SettlementTerms;
use crate::services::{tracker, InvoicingService, PaymentDetails, SettlementService};
use crate::validation::{self, id, money, Validator};
use crate::AppState;

use super::orders::validate_lines;

#[derive(Debug, Deserialize)]
pub struct IntercompanyCreate {
    #[serde(alias = "sourceCompanyId")]
    pub source_company_id: Option<i32>,
    #[serde(alias = "targetCompanyId")]
    pub target_company_id: Option<i32>,
    #[serde(alias = "orderDate")]
    pub order_date: Option<NaiveDate>,
    #[serde(default)]
    pub items: Vec<OrderLineInput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessFromOrders {
    #[serde(alias = "source_order_id")]
    pub source_order_id: Option<i32>,
    #[serde(alias = "target_order_id")]
    pub target_order_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptCreate {
    #[serde(alias = "company_id")]
    pub company_id: Option<i32>,
    #[serde(alias = "invoice_id")]
    pub invoice_id: Option<i32>,
    #[serde(alias = "transaction_id")]
    pub transaction_id: Option<i32>,
    pub amount: Option<Decimal>,
    pub description: Option<String>,
    #[serde(alias = "payment_method")]
    pub payment_method: Option<String>,
    #[serde(alias = "reference_number")]
    pub reference_number: Option<String>,
    #[serde(alias = "receipt_date", alias = "paymentDate")]
    pub receipt_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCreate {
    #[serde(alias = "company_id")]
    pub company_id: Option<i32>,
    #[serde(alias = "bill_id")]
    pub bill_id: Option<i32>,
    #[serde(alias = "transaction_id")]
    pub transaction_id: Option<i32>,
    pub amount: Option<Decimal>,
    pub description: Option<String>,
    #[serde(alias = "payment_method")]
    pub payment_method: Option<String>,
    #[serde(alias = "reference_number")]
    pub reference_number: Option<String>,
    #[serde(alias = "payment_date")]
    pub payment_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    pub amount: Option<Decimal>,
    pub description: Option<String>,
    #[serde(alias = "payment_method")]
    pub payment_method: Option<String>,
    #[serde(alias = "reference_number")]
    pub reference_number: Option<String>,
    #[serde(alias = "payment_date")]
    pub payment_date: Option<NaiveDate>,
}

pub fn intercompany_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/intercompany-transactions",
            get(list_transactions).post(create_transaction),
        )
        .route("/intercompany-transactions/:id", get(get_transaction))
        .route("/intercompany-transactions/:id/settle", post(settle_transaction))
        .route("/auto-invoicing/process-from-orders", post(process_from_orders))
        .route("/auto-invoicing/process-transaction/:id", post(process_transaction))
        .route("/create-intercompany-receipt", post(create_receipt))
        .route("/create-intercompany-payment", post(create_payment))
}

async fn create_transaction(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<IntercompanyCreate>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let validator = Validator::new()
        .required_id(payload.source_company_id, "source_company_id")
        .required_id(payload.target_company_id, "target_company_id")
        .error_if(
            payload.source_company_id.is_some() && payload.source_company_id == payload.target_company_id,
            "target_company_id",
            "target_company_id must differ from source_company_id",
        );
    validate_lines(validator, &payload.items).finish()?;

    let (Some(source), Some(target)) = (payload.source_company_id, payload.target_company_id) else {
        return Err(ApiError::required("source_company_id"));
    };

    let mut tx = state.db_pool.begin().await?;
    let created = orders::create_intercompany_orders(
        &mut tx,
        source,
        target,
        payload.order_date.unwrap_or_else(|| Utc::now().date_naive()),
        &payload.items,
    )
    .await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(json!({ "success": true, "data": created }))))
}

async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CompanyListParams>,
) -> ApiResult<Json<PaginatedResponse<tracker::TransactionView>>> {
    let page = params.page();
    let mut conn = state.db_pool.acquire().await?;
    let (views, total) = tracker::list_views(&mut conn, params.company_id, page).await?;
    Ok(Json(PaginatedResponse::new(views, page, total)))
}

async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<Json<tracker::TransactionView>> {
    let mut conn = state.db_pool.acquire().await?;
    let view = tracker::get_view(&mut conn, id).await?;
    Ok(Json(view))
}

async fn process_from_orders(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ProcessFromOrders>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let source_order_id = id::required(payload.source_order_id, "sourceOrderId")?;
    let target_order_id = id::required(payload.target_order_id, "targetOrderId")?;

    let mut tx = state.db_pool.begin().await?;
    let issued = InvoicingService::new(&state.config.accounting)
        .process_order_pair(&mut tx, source_order_id, target_order_id)
        .await?;
    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "invoice": issued.invoice,
            "bill": issued.bill,
            "transactionId": issued.transaction_id,
            "invoiceItems": issued.invoice_items,
            "billItems": issued.bill_items,
            "journalPosted": issued.journal_posted,
        })),
    ))
}

async fn process_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let mut tx = state.db_pool.begin().await?;
    let issued = InvoicingService::new(&state.config.accounting)
        .process_transaction(&mut tx, id)
        .await?;
    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "invoice": issued.invoice,
            "bill": issued.bill,
            "transactionId": issued.transaction_id,
            "journalPosted": issued.journal_posted,
        })),
    ))
}

async fn create_receipt(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ReceiptCreate>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let company_id = id::required(payload.company_id, "companyId")?;
    let invoice_id = id::required(payload.invoice_id, "invoiceId")?;
    let amount = money::positive(payload.amount, "amount")?;
    let payment_method = validation::payment_method(payload.payment_method.as_deref())?;

    let mut tx = state.db_pool.begin().await?;
    let posted = SettlementService::new(&state.config.accounting)
        .record_receipt(
            &mut tx,
            invoice_id,
            PaymentDetails {
                company_id,
                amount,
                payment_method,
                reference_number: payload.reference_number,
                payment_date: payload.receipt_date.unwrap_or_else(|| Utc::now().date_naive()),
                description: payload.description,
                transaction_id: payload.transaction_id,
            },
        )
        .await?;
    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "receipt": posted.receipt,
            "invoice": posted.invoice,
            "journalEntryId": posted.journal_entry_id,
            "transaction": posted.transaction,
        })),
    ))
}

async fn create_payment(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PaymentCreate>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let company_id = id::required(payload.company_id, "companyId")?;
    let bill_id = id::required(payload.bill_id, "billId")?;
    let amount = money::positive(payload.amount, "amount")?;
    let payment_method = validation::payment_method(payload.payment_method.as_deref())?;

    let mut tx = state.db_pool.begin().await?;
    let posted = SettlementService::new(&state.config.accounting)
        .record_bill_payment(
            &mut tx,
            bill_id,
            PaymentDetails {
                company_id,
                amount,
                payment_method,
                reference_number: payload.reference_number,
                payment_date: payload.payment_date.unwrap_or_else(|| Utc::now().date_naive()),
                description: payload.description,
                transaction_id: payload.transaction_id,
            },
        )
        .await?;
    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "payment": posted.payment,
            "bill": posted.bill,
            "journalEntryId": posted.journal_entry_id,
            "transaction": posted.transaction,
        })),
    ))
}

async fn settle_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    payload: Option<Json<SettleRequest>>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let amount = match payload.amount {
        Some(_) => Some(money::positive(payload.amount, "amount")?),
        None => None,
    };
    let payment_method = validation::payment_method(payload.payment_method.as_deref())?;

    let mut tx = state.db_pool.begin().await?;
    let settled = SettlementService::new(&state.config.accounting)
        .settle_transaction(
            &mut tx,
            id,
            amount,
            SettlementTerms {
                payment_method,
                reference_number: payload.reference_number,
                payment_date: payload.payment_date.unwrap_or_else(|| Utc::now().date_naive()),
                description: payload.description,
            },
        )
        .await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(json!({ "success": true, "data": settled }))))
}
