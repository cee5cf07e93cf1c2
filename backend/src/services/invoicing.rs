//! Invoice/bill issuance for intercompany order pairs
//!
//! One call issues the seller's invoice and the buyer's bill, posts both
//! accrual entries and links everything to the transaction row. The caller
//! owns the surrounding database transaction.

use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgConnection;
use tracing::{info, warn};

use tally_shared::{Bill, BillItem, DocumentStatus, Invoice, InvoiceItem};

use crate::config::AccountingConfig;
use crate::error::{ApiError, ApiResult, AppError};
use super::ledger::{EntryHeader, Ledger, PostingSource, StandardAccount};
use super::orders::{self, OrderPair};
use super::sequence::{self, DocumentKind};
use super::tracker::{self, DocumentLinks};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedDocuments {
    pub invoice: Invoice,
    pub invoice_items: Vec<InvoiceItem>,
    pub bill: Bill,
    pub bill_items: Vec<BillItem>,
    pub transaction_id: i32,
    /// False when an accrual entry was skipped for a missing account
    pub journal_posted: bool,
}

pub fn due_date(issue_date: NaiveDate, due_days: i64) -> NaiveDate {
    issue_date + Duration::days(due_days)
}

#[derive(Debug, Clone)]
pub struct InvoicingService {
    ledger: Ledger,
}

impl InvoicingService {
    pub fn new(config: &AccountingConfig) -> Self {
        Self { ledger: Ledger::new(config.clone()) }
    }

    /// Issue documents for an explicit (sales order, purchase order) pair
    pub async fn process_order_pair(
        &self,
        conn: &mut PgConnection,
        sales_order_id: i32,
        purchase_order_id: i32,
    ) -> ApiResult<IssuedDocuments> {
        let pair = orders::load_pair(conn, sales_order_id, purchase_order_id, true).await?;
        self.issue(conn, pair).await
    }

    /// Issue documents for the order pair behind an intercompany transaction
    pub async fn process_transaction(
        &self,
        conn: &mut PgConnection,
        transaction_id: i32,
    ) -> ApiResult<IssuedDocuments> {
        let (_, pair) = orders::load_pair_for_transaction(conn, transaction_id, true).await?;
        self.issue(conn, pair).await
    }

    async fn issue(&self, conn: &mut PgConnection, pair: OrderPair) -> ApiResult<IssuedDocuments> {
        if pair.seller_id() == pair.buyer_id() {
            return Err(ApiError::bad_request("Sales and purchase order belong to the same company"));
        }

        if let Some(invoice_id) = existing_invoice(conn, pair.sales_order.id).await? {
            info!(
                "Sales order {} already invoiced as {}",
                pair.sales_order.order_number, invoice_id
            );
            return Err(AppError::AlreadyInvoiced { invoice_id });
        }

        let issue_date = Utc::now().date_naive();
        let due = due_date(issue_date, self.ledger.config().invoice_due_days);

        let (invoice, invoice_items) = self.create_invoice(conn, &pair, issue_date, due).await?;
        let mut journal_posted = self
            .ledger
            .post_transfer(
                conn,
                invoice.company_id,
                StandardAccount::Receivable,
                StandardAccount::Revenue,
                invoice.total,
                EntryHeader {
                    entry_date: issue_date,
                    reference: Some(invoice.invoice_number.clone()),
                    description: format!("Intercompany invoice {}", invoice.invoice_number),
                    source: PostingSource::Invoice(invoice.id),
                },
            )
            .await?
            .is_some();

        let (bill, bill_items) = match existing_bill(conn, pair.purchase_order.id).await? {
            Some(bill) => {
                check_reusable_bill(&bill, &invoice)?;
                if let Some(other) = bill_transaction_elsewhere(conn, bill.id, pair.sales_order.id).await? {
                    return Err(ApiError::bad_request(format!(
                        "Bill {} is already linked to intercompany transaction {}",
                        bill.bill_number, other
                    )));
                }
                warn!(
                    "Purchase order {} already billed as {}, linking existing bill",
                    pair.purchase_order.order_number, bill.bill_number
                );
                let bill = sqlx::query_as::<_, Bill>(
                    "UPDATE bills SET reference_invoice_id = $2, updated_at = NOW() WHERE id = $1 RETURNING *"
                )
                .bind(bill.id)
                .bind(invoice.id)
                .fetch_one(&mut *conn)
                .await?;
                let items = bill_items(conn, bill.id).await?;
                (bill, items)
            }
            None => {
                let (bill, items) = self
                    .create_bill(conn, &pair, invoice.id, issue_date, due)
                    .await?;
                let posted = self
                    .ledger
                    .post_transfer(
                        conn,
                        bill.company_id,
                        StandardAccount::Expense,
                        StandardAccount::Payable,
                        bill.total,
                        EntryHeader {
                            entry_date: issue_date,
                            reference: Some(bill.bill_number.clone()),
                            description: format!("Intercompany bill {}", bill.bill_number),
                            source: PostingSource::Bill(bill.id),
                        },
                    )
                    .await?
                    .is_some();
                journal_posted &= posted;
                (bill, items)
            }
        };

        orders::mark_invoiced(conn, &pair).await?;
        let transaction = orders::ensure_transaction(conn, &pair).await?;
        let transaction = tracker::link_documents(
            conn,
            transaction.id,
            DocumentLinks {
                invoice_id: Some(invoice.id),
                bill_id: Some(bill.id),
                ..Default::default()
            },
        )
        .await?;

        info!(
            "Issued {} / {} for intercompany transaction {}",
            invoice.invoice_number, bill.bill_number, transaction.id
        );

        Ok(IssuedDocuments {
            invoice,
            invoice_items,
            bill,
            bill_items,
            transaction_id: transaction.id,
            journal_posted,
        })
    }

    async fn create_invoice(
        &self,
        conn: &mut PgConnection,
        pair: &OrderPair,
        issue_date: NaiveDate,
        due: NaiveDate,
    ) -> ApiResult<(Invoice, Vec<InvoiceItem>)> {
        let total: Decimal = pair.sales_items.iter().map(|i| i.total).sum();
        if total <= Decimal::ZERO {
            return Err(ApiError::bad_request("Order total must be greater than zero"));
        }

        let number = sequence::next_number(conn, DocumentKind::Invoice, pair.seller_id()).await;
        let invoice = sqlx::query_as::<_, Invoice>(
            "INSERT INTO invoices (
                company_id, invoice_number, sales_order_id, customer_id, invoice_date,
                due_date, total, amount_paid, balance_due, status
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $7, $8)
            RETURNING *"
        )
        .bind(pair.seller_id())
        .bind(&number)
        .bind(pair.sales_order.id)
        .bind(pair.buyer_id())
        .bind(issue_date)
        .bind(due)
        .bind(total)
        .bind(DocumentStatus::Open.as_str())
        .fetch_one(&mut *conn)
        .await?;

        let mut items = Vec::with_capacity(pair.sales_items.len());
        for line in &pair.sales_items {
            let item = sqlx::query_as::<_, InvoiceItem>(
                "INSERT INTO invoice_items (invoice_id, product_id, description, quantity, unit_price, total)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 RETURNING *"
            )
            .bind(invoice.id)
            .bind(line.product_id)
            .bind(&line.description)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(line.total)
            .fetch_one(&mut *conn)
            .await?;
            items.push(item);
        }

        Ok((invoice, items))
    }

    async fn create_bill(
        &self,
        conn: &mut PgConnection,
        pair: &OrderPair,
        invoice_id: i32,
        issue_date: NaiveDate,
        due: NaiveDate,
    ) -> ApiResult<(Bill, Vec<BillItem>)> {
        let total: Decimal = pair.purchase_items.iter().map(|i| i.total).sum();
        if total <= Decimal::ZERO {
            return Err(ApiError::bad_request("Order total must be greater than zero"));
        }

        let number = sequence::next_number(conn, DocumentKind::Bill, pair.buyer_id()).await;
        let bill = sqlx::query_as::<_, Bill>(
            "INSERT INTO bills (
                company_id, bill_number, purchase_order_id, vendor_id, reference_invoice_id,
                bill_date, due_date, total, amount_paid, balance_due, status
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, $8, $9)
            RETURNING *"
        )
        .bind(pair.buyer_id())
        .bind(&number)
        .bind(pair.purchase_order.id)
        .bind(pair.seller_id())
        .bind(invoice_id)
        .bind(issue_date)
        .bind(due)
        .bind(total)
        .bind(DocumentStatus::Open.as_str())
        .fetch_one(&mut *conn)
        .await?;

        let mut items = Vec::with_capacity(pair.purchase_items.len());
        for line in &pair.purchase_items {
            let item = sqlx::query_as::<_, BillItem>(
                "INSERT INTO bill_items (bill_id, product_id, description, quantity, unit_price, total)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 RETURNING *"
            )
            .bind(bill.id)
            .bind(line.product_id)
            .bind(&line.description)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(line.total)
            .fetch_one(&mut *conn)
            .await?;
            items.push(item);
        }

        Ok((bill, items))
    }
}

async fn existing_invoice(conn: &mut PgConnection, sales_order_id: i32) -> ApiResult<Option<i32>> {
    let id = sqlx::query_scalar::<_, i32>("SELECT id FROM invoices WHERE sales_order_id = $1 LIMIT 1")
        .bind(sales_order_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(id)
}

async fn existing_bill(conn: &mut PgConnection, purchase_order_id: i32) -> ApiResult<Option<Bill>> {
    let bill = sqlx::query_as::<_, Bill>(
        "SELECT * FROM bills WHERE purchase_order_id = $1 ORDER BY id LIMIT 1 FOR UPDATE"
    )
    .bind(purchase_order_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(bill)
}

/// A bill raised before its invoice may only mirror the new invoice: same
/// total and no other invoice referenced.
pub fn check_reusable_bill(bill: &Bill, invoice: &Invoice) -> ApiResult<()> {
    if bill.total != invoice.total {
        return Err(ApiError::bad_request(format!(
            "Existing bill {} total {} does not match invoice total {}",
            bill.bill_number, bill.total, invoice.total
        )));
    }
    match bill.reference_invoice_id {
        Some(other) if other != invoice.id => Err(ApiError::bad_request(format!(
            "Existing bill {} already references invoice {}",
            bill.bill_number, other
        ))),
        _ => Ok(()),
    }
}

/// Transaction for a different sales order that already holds this bill
async fn bill_transaction_elsewhere(
    conn: &mut PgConnection,
    bill_id: i32,
    sales_order_id: i32,
) -> ApiResult<Option<i32>> {
    let id = sqlx::query_scalar::<_, i32>(
        "SELECT id FROM intercompany_transactions
         WHERE target_bill_id = $1 AND sales_order_id IS DISTINCT FROM $2
         LIMIT 1"
    )
    .bind(bill_id)
    .bind(sales_order_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(id)
}

pub async fn invoice_items(conn: &mut PgConnection, invoice_id: i32) -> ApiResult<Vec<InvoiceItem>> {
    let items = sqlx::query_as::<_, InvoiceItem>(
        "SELECT * FROM invoice_items WHERE invoice_id = $1 ORDER BY id"
    )
    .bind(invoice_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(items)
}

pub async fn bill_items(conn: &mut PgConnection, bill_id: i32) -> ApiResult<Vec<BillItem>> {
    let items = sqlx::query_as::<_, BillItem>("SELECT * FROM bill_items WHERE bill_id = $1 ORDER BY id")
        .bind(bill_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(items)
}
