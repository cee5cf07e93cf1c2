//! Sales/purchase orders and the order resolver

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use tracing::info;

use tally_shared::{
    IntercompanyTransaction, PurchaseOrder, PurchaseOrderItem, SalesOrder, SalesOrderItem,
    WorkflowStatus,
};

use crate::error::{ApiError, ApiResult};
use super::sequence::{self, DocumentKind};

/// One order line as submitted by a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLineInput {
    pub product_id: Option<i32>,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

impl OrderLineInput {
    pub fn total(&self) -> Decimal {
        (self.quantity * self.unit_price).round_dp(2)
    }
}

pub fn order_total(lines: &[OrderLineInput]) -> Decimal {
    lines.iter().map(OrderLineInput::total).sum()
}

/// Which side of an intercompany deal an order sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Sales,
    Purchase,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub side: OrderSide,
    pub company_id: i32,
    /// Customer for a sales order, vendor for a purchase order
    pub counterparty_id: i32,
    pub order_date: NaiveDate,
    pub lines: Vec<OrderLineInput>,
}

/// Both sides of an intercompany deal with their line items
#[derive(Debug, Clone, Serialize)]
pub struct OrderPair {
    pub sales_order: SalesOrder,
    pub sales_items: Vec<SalesOrderItem>,
    pub purchase_order: PurchaseOrder,
    pub purchase_items: Vec<PurchaseOrderItem>,
}

impl OrderPair {
    pub fn seller_id(&self) -> i32 {
        self.sales_order.company_id
    }

    pub fn buyer_id(&self) -> i32 {
        self.purchase_order.company_id
    }
}

pub async fn company_exists(conn: &mut PgConnection, company_id: i32) -> ApiResult<bool> {
    let found: Option<i32> = sqlx::query_scalar("SELECT id FROM companies WHERE id = $1")
        .bind(company_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

pub async fn require_company(conn: &mut PgConnection, company_id: i32) -> ApiResult<()> {
    if company_exists(conn, company_id).await? {
        Ok(())
    } else {
        Err(ApiError::not_found("Company"))
    }
}

async fn fetch_sales_order(conn: &mut PgConnection, id: i32, lock: bool) -> ApiResult<SalesOrder> {
    let sql = if lock {
        "SELECT * FROM sales_orders WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT * FROM sales_orders WHERE id = $1"
    };
    sqlx::query_as::<_, SalesOrder>(sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::not_found("Sales order"))
}

async fn fetch_purchase_order(conn: &mut PgConnection, id: i32, lock: bool) -> ApiResult<PurchaseOrder> {
    let sql = if lock {
        "SELECT * FROM purchase_orders WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT * FROM purchase_orders WHERE id = $1"
    };
    sqlx::query_as::<_, PurchaseOrder>(sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::not_found("Purchase order"))
}

pub async fn sales_order_items(conn: &mut PgConnection, sales_order_id: i32) -> ApiResult<Vec<SalesOrderItem>> {
    let items = sqlx::query_as::<_, SalesOrderItem>(
        "SELECT * FROM sales_order_items WHERE sales_order_id = $1 ORDER BY id"
    )
    .bind(sales_order_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(items)
}

pub async fn purchase_order_items(conn: &mut PgConnection, purchase_order_id: i32) -> ApiResult<Vec<PurchaseOrderItem>> {
    let items = sqlx::query_as::<_, PurchaseOrderItem>(
        "SELECT * FROM purchase_order_items WHERE purchase_order_id = $1 ORDER BY id"
    )
    .bind(purchase_order_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(items)
}

/// Load both orders and their items.
///
/// With `lock` set both order rows are held `FOR UPDATE` until the caller's
/// transaction ends.
pub async fn load_pair(
    conn: &mut PgConnection,
    sales_order_id: i32,
    purchase_order_id: i32,
    lock: bool,
) -> ApiResult<OrderPair> {
    let sales_order = fetch_sales_order(conn, sales_order_id, lock).await?;
    let purchase_order = fetch_purchase_order(conn, purchase_order_id, lock).await?;
    check_counterparties(&sales_order, &purchase_order)?;

    let sales_items = sales_order_items(conn, sales_order.id).await?;
    if sales_items.is_empty() {
        return Err(ApiError::not_found("Sales order items"));
    }

    let purchase_items = purchase_order_items(conn, purchase_order.id).await?;
    if purchase_items.is_empty() {
        return Err(ApiError::not_found("Purchase order items"));
    }

    Ok(OrderPair {
        sales_order,
        sales_items,
        purchase_order,
        purchase_items,
    })
}

/// The two orders must mirror each other: each names the other's company
/// as its counterparty and both carry the same total.
pub fn check_counterparties(sales_order: &SalesOrder, purchase_order: &PurchaseOrder) -> ApiResult<()> {
    if sales_order.customer_id != purchase_order.company_id
        || purchase_order.vendor_id != sales_order.company_id
    {
        return Err(ApiError::bad_request(format!(
            "Sales order {} and purchase order {} are not between the same companies",
            sales_order.order_number, purchase_order.order_number
        )));
    }
    if sales_order.total != purchase_order.total {
        return Err(ApiError::bad_request(format!(
            "Sales order total {} does not match purchase order total {}",
            sales_order.total, purchase_order.total
        )));
    }
    Ok(())
}

pub async fn find_transaction(
    conn: &mut PgConnection,
    transaction_id: i32,
    lock: bool,
) -> ApiResult<IntercompanyTransaction> {
    let sql = if lock {
        "SELECT * FROM intercompany_transactions WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT * FROM intercompany_transactions WHERE id = $1"
    };
    sqlx::query_as::<_, IntercompanyTransaction>(sql)
        .bind(transaction_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::not_found("Intercompany transaction"))
}

/// Resolve the order pair an intercompany transaction was created for
pub async fn load_pair_for_transaction(
    conn: &mut PgConnection,
    transaction_id: i32,
    lock: bool,
) -> ApiResult<(IntercompanyTransaction, OrderPair)> {
    let transaction = find_transaction(conn, transaction_id, lock).await?;

    let sales_order_id = transaction
        .sales_order_id
        .ok_or_else(|| ApiError::not_found("Sales order"))?;
    let purchase_order_id = transaction
        .purchase_order_id
        .ok_or_else(|| ApiError::not_found("Purchase order"))?;

    let pair = load_pair(conn, sales_order_id, purchase_order_id, lock).await?;
    Ok((transaction, pair))
}

pub async fn create_sales_order(
    conn: &mut PgConnection,
    company_id: i32,
    customer_id: i32,
    order_date: NaiveDate,
    lines: &[OrderLineInput],
) -> ApiResult<(SalesOrder, Vec<SalesOrderItem>)> {
    let order_number = sequence::next_number(conn, DocumentKind::SalesOrder, company_id).await;

    let order = sqlx::query_as::<_, SalesOrder>(
        "INSERT INTO sales_orders (company_id, order_number, customer_id, order_date, total, status)
         VALUES ($1, $2, $3, $4, $5, 'Ordered')
         RETURNING *"
    )
    .bind(company_id)
    .bind(&order_number)
    .bind(customer_id)
    .bind(order_date)
    .bind(order_total(lines))
    .fetch_one(&mut *conn)
    .await?;

    let mut items = Vec::with_capacity(lines.len());
    for line in lines {
        let item = sqlx::query_as::<_, SalesOrderItem>(
            "INSERT INTO sales_order_items (sales_order_id, product_id, description, quantity, unit_price, total)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING *"
        )
        .bind(order.id)
        .bind(line.product_id)
        .bind(&line.description)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.total())
        .fetch_one(&mut *conn)
        .await?;
        items.push(item);
    }

    info!("Created sales order {} for company {}", order.order_number, company_id);
    Ok((order, items))
}

pub async fn create_purchase_order(
    conn: &mut PgConnection,
    company_id: i32,
    vendor_id: i32,
    order_date: NaiveDate,
    lines: &[OrderLineInput],
) -> ApiResult<(PurchaseOrder, Vec<PurchaseOrderItem>)> {
    let order_number = sequence::next_number(conn, DocumentKind::PurchaseOrder, company_id).await;

    let order = sqlx::query_as::<_, PurchaseOrder>(
        "INSERT INTO purchase_orders (company_id, order_number, vendor_id, order_date, total, status)
         VALUES ($1, $2, $3, $4, $5, 'Ordered')
         RETURNING *"
    )
    .bind(company_id)
    .bind(&order_number)
    .bind(vendor_id)
    .bind(order_date)
    .bind(order_total(lines))
    .fetch_one(&mut *conn)
    .await?;

    let mut items = Vec::with_capacity(lines.len());
    for line in lines {
        let item = sqlx::query_as::<_, PurchaseOrderItem>(
            "INSERT INTO purchase_order_items (purchase_order_id, product_id, description, quantity, unit_price, total)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING *"
        )
        .bind(order.id)
        .bind(line.product_id)
        .bind(&line.description)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.total())
        .fetch_one(&mut *conn)
        .await?;
        items.push(item);
    }

    info!("Created purchase order {} for company {}", order.order_number, company_id);
    Ok((order, items))
}

/// Create one order of either side, checking both companies exist
pub async fn create_order(conn: &mut PgConnection, order: NewOrder) -> ApiResult<serde_json::Value> {
    require_company(conn, order.company_id).await?;
    require_company(conn, order.counterparty_id).await?;

    let created = match order.side {
        OrderSide::Sales => {
            let (header, items) = create_sales_order(
                conn, order.company_id, order.counterparty_id, order.order_date, &order.lines,
            )
            .await?;
            serde_json::json!({ "order": header, "items": items })
        }
        OrderSide::Purchase => {
            let (header, items) = create_purchase_order(
                conn, order.company_id, order.counterparty_id, order.order_date, &order.lines,
            )
            .await?;
            serde_json::json!({ "order": header, "items": items })
        }
    };
    Ok(created)
}

#[derive(Debug, Clone, Serialize)]
pub struct IntercompanyOrderCreated {
    pub transaction: IntercompanyTransaction,
    #[serde(flatten)]
    pub orders: OrderPair,
}

/// Insert the tracking row for an order pair, or return the existing one
pub async fn ensure_transaction(conn: &mut PgConnection, pair: &OrderPair) -> ApiResult<IntercompanyTransaction> {
    let transaction = sqlx::query_as::<_, IntercompanyTransaction>(
        "INSERT INTO intercompany_transactions (
            source_company_id, target_company_id, sales_order_id, purchase_order_id,
            amount, status, payment_status, transaction_date
        ) VALUES ($1, $2, $3, $4, $5, $6, 'Unpaid', $7)
        ON CONFLICT (sales_order_id, purchase_order_id)
        DO UPDATE SET updated_at = intercompany_transactions.updated_at
        RETURNING *"
    )
    .bind(pair.seller_id())
    .bind(pair.buyer_id())
    .bind(pair.sales_order.id)
    .bind(pair.purchase_order.id)
    .bind(pair.sales_order.total)
    .bind(WorkflowStatus::Ordered.label())
    .bind(pair.sales_order.order_date)
    .fetch_one(&mut *conn)
    .await?;
    Ok(transaction)
}

/// Sales order on the seller, purchase order on the buyer, and the
/// transaction row linking them
pub async fn create_intercompany_orders(
    conn: &mut PgConnection,
    source_company_id: i32,
    target_company_id: i32,
    order_date: NaiveDate,
    lines: &[OrderLineInput],
) -> ApiResult<IntercompanyOrderCreated> {
    if source_company_id == target_company_id {
        return Err(ApiError::bad_request("Source and target company must differ"));
    }
    require_company(conn, source_company_id).await?;
    require_company(conn, target_company_id).await?;

    let (sales_order, sales_items) =
        create_sales_order(conn, source_company_id, target_company_id, order_date, lines).await?;
    let (purchase_order, purchase_items) =
        create_purchase_order(conn, target_company_id, source_company_id, order_date, lines).await?;

    let orders = OrderPair { sales_order, sales_items, purchase_order, purchase_items };
    let transaction = ensure_transaction(conn, &orders).await?;

    info!(
        "Created intercompany transaction {} ({} -> {}) for {}",
        transaction.id, source_company_id, target_company_id, transaction.amount
    );

    Ok(IntercompanyOrderCreated { transaction, orders })
}

pub async fn mark_invoiced(conn: &mut PgConnection, pair: &OrderPair) -> ApiResult<()> {
    sqlx::query("UPDATE sales_orders SET status = 'Invoiced' WHERE id = $1")
        .bind(pair.sales_order.id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("UPDATE purchase_orders SET status = 'Invoiced' WHERE id = $1")
        .bind(pair.purchase_order.id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
