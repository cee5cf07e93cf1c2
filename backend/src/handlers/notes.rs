use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;

use tally_shared::{CreditNote, DebitNote};

use crate::error::{ApiError, ApiResult};
use crate::pagination::CompanyListParams;
use crate::services::adjustments::{
    self, AdjustmentCreated, CreditNoteCreated, DebitNoteCreated, NewAdjustment, NewNote, NoteItemInput,
};
use crate::services::AdjustmentService;
use crate::validation::{id, money, Validator};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreditNoteCreate {
    #[serde(alias = "companyId")]
    pub company_id: Option<i32>,
    #[serde(alias = "customerId")]
    pub customer_id: Option<i32>,
    #[serde(alias = "invoiceId")]
    pub invoice_id: Option<i32>,
    pub amount: Option<Decimal>,
    pub reason: Option<String>,
    #[serde(alias = "creditNoteDate")]
    pub credit_note_date: Option<NaiveDate>,
    #[serde(default)]
    pub products: Vec<NoteItemInput>,
}

#[derive(Debug, Deserialize)]
pub struct DebitNoteCreate {
    #[serde(alias = "companyId")]
    pub company_id: Option<i32>,
    #[serde(alias = "vendorId")]
    pub vendor_id: Option<i32>,
    #[serde(alias = "billId")]
    pub bill_id: Option<i32>,
    pub amount: Option<Decimal>,
    pub reason: Option<String>,
    #[serde(alias = "debitNoteDate")]
    pub debit_note_date: Option<NaiveDate>,
    #[serde(default)]
    pub products: Vec<NoteItemInput>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustmentCreate {
    #[serde(alias = "sourceCompanyId")]
    pub source_company_id: Option<i32>,
    #[serde(alias = "targetCompanyId")]
    pub target_company_id: Option<i32>,
    pub amount: Option<Decimal>,
    pub reason: Option<String>,
    #[serde(alias = "adjustmentDate")]
    pub adjustment_date: Option<NaiveDate>,
    #[serde(default)]
    pub products: Vec<NoteItemInput>,
}

pub fn note_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/credit-notes", get(list_credit_notes).post(create_credit_note))
        .route("/debit-notes", get(list_debit_notes).post(create_debit_note))
        .route("/intercompany-adjustment", post(create_adjustment))
}

fn check_items(validator: Validator, items: &[NoteItemInput]) -> Validator {
    adjustments::item_errors(items)
        .into_iter()
        .fold(validator, |v, (field, message)| v.error(&field, &message))
}

async fn create_credit_note(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreditNoteCreate>,
) -> ApiResult<(StatusCode, Json<CreditNoteCreated>)> {
    let validator = Validator::new()
        .required_id(payload.company_id, "company_id")
        .positive_amount(payload.amount, "amount");
    check_items(validator, &payload.products).finish()?;

    let company_id = id::required(payload.company_id, "company_id")?;
    let amount = money::positive(payload.amount, "amount")?;

    let mut tx = state.db_pool.begin().await?;
    let created = AdjustmentService::new(&state.config.accounting)
        .create_credit_note(
            &mut tx,
            NewNote {
                company_id,
                counterparty_id: payload.customer_id,
                document_id: payload.invoice_id,
                amount,
                reason: payload.reason,
                date: payload.credit_note_date.unwrap_or_else(|| Utc::now().date_naive()),
                items: payload.products,
            },
        )
        .await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(created)))
}

async fn create_debit_note(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DebitNoteCreate>,
) -> ApiResult<(StatusCode, Json<DebitNoteCreated>)> {
    let validator = Validator::new()
        .required_id(payload.company_id, "company_id")
        .positive_amount(payload.amount, "amount");
    check_items(validator, &payload.products).finish()?;

    let company_id = id::required(payload.company_id, "company_id")?;
    let amount = money::positive(payload.amount, "amount")?;

    let mut tx = state.db_pool.begin().await?;
    let created = AdjustmentService::new(&state.config.accounting)
        .create_debit_note(
            &mut tx,
            NewNote {
                company_id,
                counterparty_id: payload.vendor_id,
                document_id: payload.bill_id,
                amount,
                reason: payload.reason,
                date: payload.debit_note_date.unwrap_or_else(|| Utc::now().date_naive()),
                items: payload.products,
            },
        )
        .await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(created)))
}

async fn create_adjustment(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AdjustmentCreate>,
) -> ApiResult<(StatusCode, Json<AdjustmentCreated>)> {
    let validator = Validator::new()
        .required_id(payload.source_company_id, "source_company_id")
        .required_id(payload.target_company_id, "target_company_id")
        .positive_amount(payload.amount, "amount");
    check_items(validator, &payload.products).finish()?;

    let (Some(source_company_id), Some(target_company_id)) =
        (payload.source_company_id, payload.target_company_id)
    else {
        return Err(ApiError::required("source_company_id"));
    };
    let amount = money::positive(payload.amount, "amount")?;

    let mut tx = state.db_pool.begin().await?;
    let created = AdjustmentService::new(&state.config.accounting)
        .create_adjustment(
            &mut tx,
            NewAdjustment {
                source_company_id,
                target_company_id,
                amount,
                reason: payload.reason,
                date: payload.adjustment_date.unwrap_or_else(|| Utc::now().date_naive()),
                items: payload.products,
            },
        )
        .await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_credit_notes(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CompanyListParams>,
) -> ApiResult<Json<Vec<CreditNote>>> {
    let company_id = id::required(params.company_id, "companyId")?;
    let mut conn = state.db_pool.acquire().await?;
    Ok(Json(adjustments::list_credit_notes(&mut conn, company_id).await?))
}

async fn list_debit_notes(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CompanyListParams>,
) -> ApiResult<Json<Vec<DebitNote>>> {
    let company_id = id::required(params.company_id, "companyId")?;
    let mut conn = state.db_pool.acquire().await?;
    Ok(Json(adjustments::list_debit_notes(&mut conn, company_id).await?))
}
