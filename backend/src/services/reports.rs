//! AR/AP summaries with aging, and cross-document reference lookup

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgConnection};

use tally_shared::{Bill, Invoice, SalesOrder};

use crate::error::ApiResult;
use crate::pagination::substring_pattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgingBucket {
    Current,
    Days1To30,
    Days31To60,
    Days61To90,
    Over90,
}

/// Days past due as of `as_of`; negative when not yet due
pub fn days_past_due(due_date: NaiveDate, as_of: NaiveDate) -> i64 {
    (as_of - due_date).num_days()
}

pub fn aging_bucket(due_date: NaiveDate, as_of: NaiveDate) -> AgingBucket {
    match days_past_due(due_date, as_of) {
        d if d <= 0 => AgingBucket::Current,
        1..=30 => AgingBucket::Days1To30,
        31..=60 => AgingBucket::Days31To60,
        61..=90 => AgingBucket::Days61To90,
        _ => AgingBucket::Over90,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Aging {
    pub current: Decimal,
    pub days_1_30: Decimal,
    pub days_31_60: Decimal,
    pub days_61_90: Decimal,
    pub days_over_90: Decimal,
}

impl Aging {
    pub fn add(&mut self, bucket: AgingBucket, amount: Decimal) {
        let slot = match bucket {
            AgingBucket::Current => &mut self.current,
            AgingBucket::Days1To30 => &mut self.days_1_30,
            AgingBucket::Days31To60 => &mut self.days_31_60,
            AgingBucket::Days61To90 => &mut self.days_61_90,
            AgingBucket::Over90 => &mut self.days_over_90,
        };
        *slot += amount;
    }

    pub fn total(&self) -> Decimal {
        self.current + self.days_1_30 + self.days_31_60 + self.days_61_90 + self.days_over_90
    }
}

/// An invoice or bill with its counterparty, as summarized in reports
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LedgerDocument {
    pub id: i32,
    pub number: String,
    pub counterparty_id: i32,
    pub counterparty_name: Option<String>,
    pub document_date: NaiveDate,
    pub due_date: NaiveDate,
    pub total: Decimal,
    pub amount_paid: Decimal,
    pub balance_due: Decimal,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenDocument {
    #[serde(flatten)]
    pub document: LedgerDocument,
    pub days_past_due: i64,
    pub aging_bucket: AgingBucket,
}

#[derive(Debug, Clone, Serialize)]
pub struct CounterpartyBalance {
    pub counterparty_id: i32,
    pub counterparty_name: Option<String>,
    pub document_count: usize,
    pub outstanding: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerSummary {
    pub company_id: i32,
    pub as_of: NaiveDate,
    pub document_count: usize,
    pub open_count: usize,
    pub overdue_count: usize,
    pub total_billed: Decimal,
    pub total_paid: Decimal,
    pub total_outstanding: Decimal,
    pub aging: Aging,
    pub by_counterparty: Vec<CounterpartyBalance>,
    pub open_documents: Vec<OpenDocument>,
}

/// Fold documents into totals, aging buckets and per-counterparty balances
pub fn summarize(company_id: i32, documents: Vec<LedgerDocument>, as_of: NaiveDate) -> LedgerSummary {
    let mut summary = LedgerSummary {
        company_id,
        as_of,
        document_count: documents.len(),
        open_count: 0,
        overdue_count: 0,
        total_billed: Decimal::ZERO,
        total_paid: Decimal::ZERO,
        total_outstanding: Decimal::ZERO,
        aging: Aging::default(),
        by_counterparty: Vec::new(),
        open_documents: Vec::new(),
    };

    for document in documents {
        summary.total_billed += document.total;
        summary.total_paid += document.amount_paid;

        if document.balance_due <= Decimal::ZERO {
            continue;
        }

        let overdue_days = days_past_due(document.due_date, as_of);
        let bucket = aging_bucket(document.due_date, as_of);
        summary.open_count += 1;
        if overdue_days > 0 {
            summary.overdue_count += 1;
        }
        summary.total_outstanding += document.balance_due;
        summary.aging.add(bucket, document.balance_due);

        match summary
            .by_counterparty
            .iter_mut()
            .find(|c| c.counterparty_id == document.counterparty_id)
        {
            Some(entry) => {
                entry.document_count += 1;
                entry.outstanding += document.balance_due;
            }
            None => summary.by_counterparty.push(CounterpartyBalance {
                counterparty_id: document.counterparty_id,
                counterparty_name: document.counterparty_name.clone(),
                document_count: 1,
                outstanding: document.balance_due,
            }),
        }

        summary.open_documents.push(OpenDocument {
            document,
            days_past_due: overdue_days.max(0),
            aging_bucket: bucket,
        });
    }

    summary.by_counterparty.sort_by(|a, b| b.outstanding.cmp(&a.outstanding));
    summary.open_documents.sort_by_key(|d| std::cmp::Reverse(d.days_past_due));
    summary
}

pub async fn receivables(conn: &mut PgConnection, company_id: i32) -> ApiResult<LedgerSummary> {
    let documents = sqlx::query_as::<_, LedgerDocument>(
        "SELECT i.id, i.invoice_number AS number, i.customer_id AS counterparty_id,
                c.name AS counterparty_name, i.invoice_date AS document_date, i.due_date,
                i.total, i.amount_paid, i.balance_due, i.status
         FROM invoices i
         LEFT JOIN companies c ON c.id = i.customer_id
         WHERE i.company_id = $1
         ORDER BY i.due_date, i.id"
    )
    .bind(company_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(summarize(company_id, documents, Utc::now().date_naive()))
}

pub async fn payables(conn: &mut PgConnection, company_id: i32) -> ApiResult<LedgerSummary> {
    let documents = sqlx::query_as::<_, LedgerDocument>(
        "SELECT b.id, b.bill_number AS number, b.vendor_id AS counterparty_id,
                c.name AS counterparty_name, b.bill_date AS document_date, b.due_date,
                b.total, b.amount_paid, b.balance_due, b.status
         FROM bills b
         LEFT JOIN companies c ON c.id = b.vendor_id
         WHERE b.company_id = $1
         ORDER BY b.due_date, b.id"
    )
    .bind(company_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(summarize(company_id, documents, Utc::now().date_naive()))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceMatches {
    pub reference: String,
    pub invoices: Vec<Invoice>,
    pub bills: Vec<Bill>,
    pub sales_orders: Vec<SalesOrder>,
}

pub const DEFAULT_LOOKUP_LIMIT: i64 = 20;
pub const MAX_LOOKUP_LIMIT: i64 = 100;

/// Case-insensitive substring search over document numbers.
///
/// Invoices also match their sales order number and bills the referenced
/// invoice number, so one reference finds every document of a deal.
pub async fn reference_lookup(
    conn: &mut PgConnection,
    reference: &str,
    company_id: Option<i32>,
    limit: Option<i64>,
) -> ApiResult<ReferenceMatches> {
    let pattern = substring_pattern(reference);
    let limit = limit.unwrap_or(DEFAULT_LOOKUP_LIMIT).clamp(1, MAX_LOOKUP_LIMIT);

    let invoices = sqlx::query_as::<_, Invoice>(
        "SELECT i.* FROM invoices i
         LEFT JOIN sales_orders so ON so.id = i.sales_order_id
         WHERE (i.invoice_number ILIKE $1 OR so.order_number ILIKE $1)
           AND ($2::INT IS NULL OR i.company_id = $2)
         ORDER BY i.invoice_date DESC, i.id DESC
         LIMIT $3"
    )
    .bind(&pattern)
    .bind(company_id)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;

    let bills = sqlx::query_as::<_, Bill>(
        "SELECT b.* FROM bills b
         LEFT JOIN invoices i ON i.id = b.reference_invoice_id
         LEFT JOIN purchase_orders po ON po.id = b.purchase_order_id
         WHERE (b.bill_number ILIKE $1 OR i.invoice_number ILIKE $1 OR po.order_number ILIKE $1)
           AND ($2::INT IS NULL OR b.company_id = $2)
         ORDER BY b.bill_date DESC, b.id DESC
         LIMIT $3"
    )
    .bind(&pattern)
    .bind(company_id)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;

    let sales_orders = sqlx::query_as::<_, SalesOrder>(
        "SELECT * FROM sales_orders
         WHERE order_number ILIKE $1
           AND ($2::INT IS NULL OR company_id = $2)
         ORDER BY order_date DESC, id DESC
         LIMIT $3"
    )
    .bind(&pattern)
    .bind(company_id)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;

    tracing::debug!(
        "Reference '{}' matched {} invoices, {} bills, {} sales orders",
        reference, invoices.len(), bills.len(), sales_orders.len()
    );

    Ok(ReferenceMatches {
        reference: reference.trim().to_string(),
        invoices,
        bills,
        sales_orders,
    })
}
