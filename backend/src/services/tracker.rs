//! Intercompany transaction status tracking
//!
//! `derive_workflow_status` is the only place the workflow label is
//! computed. It runs when the issuer or poster links a document and again on
//! every read, so stored and displayed labels agree.

use serde::Serialize;
use sqlx::PgConnection;

use tally_shared::{DocumentStatus, IntercompanyTransaction, Invoice, PaymentStatus, WorkflowStatus};

use crate::error::{ApiError, ApiResult};
use crate::pagination::Page;

/// `invoice_paid` is `None` when the invoice state is unknown to the caller.
/// A receipt only counts once an invoice or bill is linked.
pub fn derive_workflow_status(
    has_invoice_or_bill: bool,
    has_receipt: bool,
    invoice_paid: Option<bool>,
) -> WorkflowStatus {
    match (has_invoice_or_bill, has_receipt, invoice_paid) {
        (false, _, _) => WorkflowStatus::Ordered,
        (true, true, Some(false)) => WorkflowStatus::PartiallyPaid,
        (true, true, _) => WorkflowStatus::Completed,
        (true, false, _) => WorkflowStatus::Invoiced,
    }
}

/// Document ids to attach; `None` leaves the existing link untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentLinks {
    pub invoice_id: Option<i32>,
    pub bill_id: Option<i32>,
    pub receipt_id: Option<i32>,
    pub payment_id: Option<i32>,
}

/// Transaction row plus the label derived from its current documents
#[derive(Debug, Clone, Serialize)]
pub struct TransactionView {
    #[serde(flatten)]
    pub transaction: IntercompanyTransaction,
    pub workflow_status: String,
    pub invoice_status: Option<String>,
    pub invoice_balance_due: Option<rust_decimal::Decimal>,
}

async fn invoice_state(conn: &mut PgConnection, invoice_id: Option<i32>) -> ApiResult<Option<Invoice>> {
    let Some(id) = invoice_id else {
        return Ok(None);
    };
    let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(invoice)
}

fn invoice_paid(invoice: Option<&Invoice>) -> Option<bool> {
    invoice
        .and_then(|i| DocumentStatus::parse(&i.status))
        .map(|status| status == DocumentStatus::Paid)
}

fn payment_status(invoice: Option<&Invoice>) -> PaymentStatus {
    invoice
        .and_then(|i| DocumentStatus::parse(&i.status))
        .map(PaymentStatus::from)
        .unwrap_or(PaymentStatus::Unpaid)
}

/// Attach newly created documents and persist the derived status.
///
/// Links already set are never overwritten.
pub async fn link_documents(
    conn: &mut PgConnection,
    transaction_id: i32,
    links: DocumentLinks,
) -> ApiResult<IntercompanyTransaction> {
    let linked = sqlx::query_as::<_, IntercompanyTransaction>(
        "UPDATE intercompany_transactions SET
            source_invoice_id = COALESCE(source_invoice_id, $2),
            target_bill_id = COALESCE(target_bill_id, $3),
            source_receipt_id = COALESCE(source_receipt_id, $4),
            target_payment_id = COALESCE(target_payment_id, $5),
            updated_at = NOW()
         WHERE id = $1
         RETURNING *"
    )
    .bind(transaction_id)
    .bind(links.invoice_id)
    .bind(links.bill_id)
    .bind(links.receipt_id)
    .bind(links.payment_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ApiError::not_found("Intercompany transaction"))?;

    refresh_status(conn, linked).await
}

/// Recompute and store `status` / `payment_status` for one transaction
pub async fn refresh_status(
    conn: &mut PgConnection,
    transaction: IntercompanyTransaction,
) -> ApiResult<IntercompanyTransaction> {
    let invoice = invoice_state(conn, transaction.source_invoice_id).await?;
    let status = derive_workflow_status(
        transaction.source_invoice_id.is_some() || transaction.target_bill_id.is_some(),
        transaction.source_receipt_id.is_some(),
        invoice_paid(invoice.as_ref()),
    );

    let updated = sqlx::query_as::<_, IntercompanyTransaction>(
        "UPDATE intercompany_transactions SET status = $2, payment_status = $3, updated_at = NOW()
         WHERE id = $1
         RETURNING *"
    )
    .bind(transaction.id)
    .bind(status.label())
    .bind(payment_status(invoice.as_ref()).as_str())
    .fetch_one(&mut *conn)
    .await?;

    tracing::debug!("Transaction {} is now '{}'", updated.id, updated.status);
    Ok(updated)
}

/// Transaction linked to a given invoice, if any
pub async fn transaction_for_invoice(conn: &mut PgConnection, invoice_id: i32) -> ApiResult<Option<i32>> {
    let id = sqlx::query_scalar::<_, i32>(
        "SELECT id FROM intercompany_transactions WHERE source_invoice_id = $1 ORDER BY id LIMIT 1"
    )
    .bind(invoice_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(id)
}

pub async fn transaction_for_bill(conn: &mut PgConnection, bill_id: i32) -> ApiResult<Option<i32>> {
    let id = sqlx::query_scalar::<_, i32>(
        "SELECT id FROM intercompany_transactions WHERE target_bill_id = $1 ORDER BY id LIMIT 1"
    )
    .bind(bill_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(id)
}

pub async fn view(conn: &mut PgConnection, transaction: IntercompanyTransaction) -> ApiResult<TransactionView> {
    let invoice = invoice_state(conn, transaction.source_invoice_id).await?;
    let status = derive_workflow_status(
        transaction.source_invoice_id.is_some() || transaction.target_bill_id.is_some(),
        transaction.source_receipt_id.is_some(),
        invoice_paid(invoice.as_ref()),
    );

    Ok(TransactionView {
        workflow_status: status.label().to_string(),
        invoice_status: invoice.as_ref().map(|i| i.status.clone()),
        invoice_balance_due: invoice.as_ref().map(|i| i.balance_due),
        transaction,
    })
}

pub async fn get_view(conn: &mut PgConnection, transaction_id: i32) -> ApiResult<TransactionView> {
    let transaction = super::orders::find_transaction(conn, transaction_id, false).await?;
    view(conn, transaction).await
}

/// Transactions where the company is either side, newest first
pub async fn list_views(
    conn: &mut PgConnection,
    company_id: Option<i32>,
    page: Page,
) -> ApiResult<(Vec<TransactionView>, i64)> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM intercompany_transactions
         WHERE $1::INT IS NULL OR source_company_id = $1 OR target_company_id = $1"
    )
    .bind(company_id)
    .fetch_one(&mut *conn)
    .await?;

    let rows = sqlx::query_as::<_, IntercompanyTransaction>(
        "SELECT * FROM intercompany_transactions
         WHERE $1::INT IS NULL OR source_company_id = $1 OR target_company_id = $1
         ORDER BY created_at DESC, id DESC
         LIMIT $2 OFFSET $3"
    )
    .bind(company_id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&mut *conn)
    .await?;

    let mut views = Vec::with_capacity(rows.len());
    for row in rows {
        views.push(view(conn, row).await?);
    }
    Ok((views, total))
}
