use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use tally_shared::{PurchaseOrder, SalesOrder};

use crate::error::{ApiError, ApiResult};
use crate::pagination::CompanyListParams;
use crate::services::orders::{self, NewOrder, OrderLineInput, OrderSide};
use crate::validation::{id, Validator};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct OrderCreate {
    #[serde(alias = "companyId")]
    pub company_id: Option<i32>,
    /// Sales orders name the customer, purchase orders the vendor
    #[serde(
        rename = "customer_id",
        alias = "customerId",
        alias = "vendor_id",
        alias = "vendorId"
    )]
    pub counterparty_id: Option<i32>,
    #[serde(alias = "orderDate")]
    pub order_date: Option<NaiveDate>,
    #[serde(default)]
    pub items: Vec<OrderLineInput>,
}

pub fn order_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sales-orders", get(list_sales_orders).post(create_sales_order))
        .route("/sales-orders/:id", get(get_sales_order))
        .route("/purchase-orders", get(list_purchase_orders).post(create_purchase_order))
        .route("/purchase-orders/:id", get(get_purchase_order))
}

/// Shared checks for order lines
pub fn validate_lines(validator: Validator, items: &[OrderLineInput]) -> Validator {
    let mut validator = validator.not_empty(items, "items");
    for (idx, item) in items.iter().enumerate() {
        validator = validator
            .error_if(
                item.quantity <= rust_decimal::Decimal::ZERO,
                &format!("items[{}].quantity", idx),
                "quantity must be greater than zero",
            )
            .non_negative(item.unit_price, &format!("items[{}].unit_price", idx));
    }
    validator
}

async fn create_order(state: &AppState, side: OrderSide, payload: OrderCreate) -> ApiResult<Value> {
    let counterparty_field = match side {
        OrderSide::Sales => "customer_id",
        OrderSide::Purchase => "vendor_id",
    };

    let validator = Validator::new()
        .required_id(payload.company_id, "company_id")
        .required_id(payload.counterparty_id, counterparty_field);
    validate_lines(validator, &payload.items).finish()?;

    let (Some(company_id), Some(counterparty_id)) = (payload.company_id, payload.counterparty_id) else {
        return Err(ApiError::required("company_id"));
    };

    let mut tx = state.db_pool.begin().await?;
    let created = orders::create_order(
        &mut tx,
        NewOrder {
            side,
            company_id,
            counterparty_id,
            order_date: payload.order_date.unwrap_or_else(|| Utc::now().date_naive()),
            lines: payload.items,
        },
    )
    .await?;
    tx.commit().await?;

    Ok(created)
}

async fn create_sales_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<OrderCreate>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let created = create_order(&state, OrderSide::Sales, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn create_purchase_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<OrderCreate>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let created = create_order(&state, OrderSide::Purchase, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_sales_orders(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CompanyListParams>,
) -> ApiResult<Json<Vec<SalesOrder>>> {
    let company_id = id::required(params.company_id, "companyId")?;
    let page = params.page();

    let rows = sqlx::query_as::<_, SalesOrder>(
        "SELECT * FROM sales_orders
         WHERE company_id = $1 AND ($2::TEXT IS NULL OR status = $2)
         ORDER BY order_date DESC, id DESC
         LIMIT $3 OFFSET $4"
    )
    .bind(company_id)
    .bind(params.status_filter())
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(rows))
}

async fn list_purchase_orders(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CompanyListParams>,
) -> ApiResult<Json<Vec<PurchaseOrder>>> {
    let company_id = id::required(params.company_id, "companyId")?;
    let page = params.page();

    let rows = sqlx::query_as::<_, PurchaseOrder>(
        "SELECT * FROM purchase_orders
         WHERE company_id = $1 AND ($2::TEXT IS NULL OR status = $2)
         ORDER BY order_date DESC, id DESC
         LIMIT $3 OFFSET $4"
    )
    .bind(company_id)
    .bind(params.status_filter())
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(rows))
}

async fn get_sales_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<Json<Value>> {
    let order = sqlx::query_as::<_, SalesOrder>("SELECT * FROM sales_orders WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Sales order"))?;

    let mut conn = state.db_pool.acquire().await?;
    let items = orders::sales_order_items(&mut conn, order.id).await?;

    Ok(Json(json!({ "order": order, "items": items })))
}

async fn get_purchase_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<Json<Value>> {
    let order = sqlx::query_as::<_, PurchaseOrder>("SELECT * FROM purchase_orders WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Purchase order"))?;

    let mut conn = state.db_pool.acquire().await?;
    let items = orders::purchase_order_items(&mut conn, order.id).await?;

    Ok(Json(json!({ "order": order, "items": items })))
}
