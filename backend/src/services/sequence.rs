//! Human-readable document numbering
//!
//! Numbers are `<PREFIX>-<companyId>-<seq>`; the next sequence is the
//! highest trailing number already issued for the company plus one. No lock
//! is taken here, the per-company unique indexes reject a colliding number.

use chrono::Utc;
use rand::Rng;
use sqlx::{Connection, PgConnection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    SalesOrder,
    PurchaseOrder,
    Invoice,
    Bill,
    Receipt,
    BillPayment,
    JournalEntry,
}

impl DocumentKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::SalesOrder => "SO",
            Self::PurchaseOrder => "PO",
            Self::Invoice => "INV",
            Self::Bill => "BILL",
            Self::Receipt => "RCPT",
            Self::BillPayment => "PAY",
            Self::JournalEntry => "JE",
        }
    }

    fn table(&self) -> &'static str {
        match self {
            Self::SalesOrder => "sales_orders",
            Self::PurchaseOrder => "purchase_orders",
            Self::Invoice => "invoices",
            Self::Bill => "bills",
            Self::Receipt => "receipts",
            Self::BillPayment => "bill_payments",
            Self::JournalEntry => "journal_entries",
        }
    }

    fn column(&self) -> &'static str {
        match self {
            Self::SalesOrder | Self::PurchaseOrder => "order_number",
            Self::Invoice => "invoice_number",
            Self::Bill => "bill_number",
            Self::Receipt => "receipt_number",
            Self::BillPayment => "payment_number",
            Self::JournalEntry => "entry_number",
        }
    }
}

/// Range used when the scan fails; far above anything a company issues by hand
const FALLBACK_RANGE: std::ops::RangeInclusive<i64> = 90_000..=99_999;

pub fn format_number(kind: DocumentKind, company_id: i32, sequence: i64) -> String {
    format!("{}-{}-{:04}", kind.prefix(), company_id, sequence)
}

/// Next sequence for `kind` within `company_id`.
///
/// The scan runs inside a savepoint so a failed query does not poison the
/// caller's transaction; on failure a random fallback is returned.
pub async fn next_sequence(conn: &mut PgConnection, kind: DocumentKind, company_id: i32) -> i64 {
    let sql = format!(
        "SELECT COALESCE(MAX(CAST(SUBSTRING({col} FROM '([0-9]+)$') AS BIGINT)), 0)
         FROM {table}
         WHERE company_id = $1",
        col = kind.column(),
        table = kind.table(),
    );

    let scanned: Result<i64, sqlx::Error> = async {
        let mut savepoint = conn.begin().await?;
        let max = sqlx::query_scalar::<_, i64>(&sql)
            .bind(company_id)
            .fetch_one(&mut *savepoint)
            .await;
        match max {
            Ok(max) => {
                savepoint.commit().await?;
                Ok(max)
            }
            Err(e) => {
                savepoint.rollback().await.ok();
                Err(e)
            }
        }
    }
    .await;

    match scanned {
        Ok(max) => max + 1,
        Err(e) => {
            let fallback = rand::thread_rng().gen_range(FALLBACK_RANGE);
            tracing::warn!(
                "Sequence scan for {} (company {}) failed, using fallback {}: {}",
                kind.prefix(), company_id, fallback, e
            );
            fallback
        }
    }
}

/// Next formatted document number for `kind` within `company_id`
pub async fn next_number(conn: &mut PgConnection, kind: DocumentKind, company_id: i32) -> String {
    let sequence = next_sequence(conn, kind, company_id).await;
    format_number(kind, company_id, sequence)
}

/// Timestamp-based numbers used by adjustment documents (`CN-17-1718000000000`)
pub fn timestamp_number(prefix: &str, company_id: i32) -> String {
    format!("{}-{}-{}", prefix, company_id, Utc::now().timestamp_millis())
}
