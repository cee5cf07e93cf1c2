use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use tally_shared::{Account, AccountType, Company};

use crate::error::{ApiError, ApiResult};
use crate::pagination::CompanyListParams;
use crate::services::Ledger;
use crate::validation::{self, id, Validator};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CompanyCreate {
    pub name: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AccountCreate {
    #[serde(alias = "companyId")]
    pub company_id: Option<i32>,
    pub code: Option<String>,
    pub name: Option<String>,
    #[serde(alias = "accountType")]
    pub account_type: Option<String>,
}

pub fn company_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/companies", get(list_companies).post(create_company))
        .route("/accounts", get(list_accounts).post(create_account))
}

async fn list_companies(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Company>>> {
    let companies = sqlx::query_as::<_, Company>("SELECT * FROM companies ORDER BY id")
        .fetch_all(&state.db_pool)
        .await?;
    Ok(Json(companies))
}

/// Creates the company and its standard chart of accounts
async fn create_company(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CompanyCreate>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let name = payload.name.as_deref().map(str::trim).unwrap_or_default().to_string();
    let code = payload.code.as_deref().map(str::trim).unwrap_or_default().to_uppercase();

    Validator::new()
        .error_if(name.is_empty(), "name", "name is required")
        .error_if(code.is_empty(), "code", "code is required")
        .max_length(&Some(code.clone()), "code", 50)
        .matches(&code, "code", validation::COMPANY_CODE_PATTERN)
        .finish()?;

    let mut tx = state.db_pool.begin().await?;

    let taken: Option<i32> = sqlx::query_scalar("SELECT id FROM companies WHERE code = $1")
        .bind(&code)
        .fetch_optional(&mut *tx)
        .await?;
    if taken.is_some() {
        return Err(ApiError::conflict(format!("Company code {} already exists", code)));
    }

    let company = sqlx::query_as::<_, Company>(
        "INSERT INTO companies (name, code) VALUES ($1, $2) RETURNING *"
    )
    .bind(&name)
    .bind(&code)
    .fetch_one(&mut *tx)
    .await?;

    let accounts = Ledger::new(state.config.accounting.clone())
        .ensure_standard_accounts(&mut tx, company.id)
        .await?;

    tx.commit().await?;
    tracing::info!("Created company {} ({})", company.id, company.code);

    Ok((StatusCode::CREATED, Json(json!({ "company": company, "accounts": accounts }))))
}

async fn list_accounts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CompanyListParams>,
) -> ApiResult<Json<Vec<Account>>> {
    let company_id = id::required(params.company_id, "companyId")?;

    let accounts = sqlx::query_as::<_, Account>(
        "SELECT * FROM accounts WHERE company_id = $1 ORDER BY code"
    )
    .bind(company_id)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(accounts))
}

async fn create_account(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AccountCreate>,
) -> ApiResult<(StatusCode, Json<Account>)> {
    let account_type = payload.account_type.as_deref().and_then(AccountType::parse);

    Validator::new()
        .required_id(payload.company_id, "company_id")
        .error_if(payload.code.as_deref().unwrap_or("").trim().is_empty(), "code", "code is required")
        .error_if(payload.name.as_deref().unwrap_or("").trim().is_empty(), "name", "name is required")
        .matches(payload.code.as_deref().unwrap_or("").trim(), "code", validation::ACCOUNT_CODE_PATTERN)
        .error_if(
            account_type.is_none(),
            "account_type",
            "account_type must be one of asset, liability, equity, revenue, expense",
        )
        .finish()?;

    let (Some(company_id), Some(code), Some(name), Some(account_type)) =
        (payload.company_id, payload.code, payload.name, account_type)
    else {
        return Err(ApiError::bad_request("Invalid account"));
    };

    let mut conn = state.db_pool.acquire().await?;
    crate::services::orders::require_company(&mut conn, company_id).await?;

    let account = sqlx::query_as::<_, Account>(
        "INSERT INTO accounts (company_id, code, name, account_type)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (company_id, code) DO NOTHING
         RETURNING *"
    )
    .bind(company_id)
    .bind(code.trim())
    .bind(name.trim())
    .bind(account_type.as_str())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ApiError::conflict(format!("Account {} already exists", code.trim())))?;

    Ok((StatusCode::CREATED, Json(account)))
}
