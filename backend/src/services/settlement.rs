//! Settlement poster: receipts against invoices, payments against bills
//!
//! Every posting locks the document row, applies the amount, writes the
//! money-movement row and its journal entry, then updates the transaction
//! tracker. The caller commits or drops the surrounding transaction.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgConnection;
use tracing::info;

use tally_shared::{Bill, BillPayment, DocumentStatus, IntercompanyTransaction, Invoice, Receipt};

use crate::config::AccountingConfig;
use crate::error::{ApiError, ApiResult};
use super::ledger::{EntryHeader, Ledger, PostingSource, StandardAccount};
use super::orders;
use super::sequence::{self, DocumentKind};
use super::tracker::{self, DocumentLinks};

/// Invoice or bill amounts after one payment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedPayment {
    pub amount_paid: Decimal,
    pub balance_due: Decimal,
    pub status: DocumentStatus,
}

/// Apply `amount` to a document. Rejects non-positive amounts and anything
/// above the outstanding balance; status only moves forward.
pub fn apply_payment(
    total: Decimal,
    amount_paid: Decimal,
    current: DocumentStatus,
    amount: Decimal,
) -> ApiResult<AppliedPayment> {
    if amount <= Decimal::ZERO {
        return Err(ApiError::validation_single("amount", "amount must be greater than zero"));
    }

    let outstanding = total - amount_paid;
    if outstanding <= Decimal::ZERO {
        return Err(ApiError::bad_request("Document is already fully paid"));
    }
    if amount > outstanding {
        return Err(ApiError::bad_request(format!(
            "Amount {} exceeds balance due {}",
            amount, outstanding
        )));
    }

    let amount_paid = amount_paid + amount;
    Ok(AppliedPayment {
        amount_paid,
        balance_due: total - amount_paid,
        status: current.advance(DocumentStatus::for_amounts(total, amount_paid)),
    })
}

#[derive(Debug, Clone)]
pub struct PaymentDetails {
    pub company_id: i32,
    pub amount: Decimal,
    pub payment_method: String,
    pub reference_number: Option<String>,
    pub payment_date: NaiveDate,
    pub description: Option<String>,
    pub transaction_id: Option<i32>,
}

/// Payment fields shared by both sides of a settlement
#[derive(Debug, Clone)]
pub struct SettlementTerms {
    pub payment_method: String,
    pub reference_number: Option<String>,
    pub payment_date: NaiveDate,
    pub description: Option<String>,
}

impl SettlementTerms {
    fn for_side(&self, company_id: i32, amount: Decimal, transaction_id: i32) -> PaymentDetails {
        PaymentDetails {
            company_id,
            amount,
            payment_method: self.payment_method.clone(),
            reference_number: self.reference_number.clone(),
            payment_date: self.payment_date,
            description: self.description.clone(),
            transaction_id: Some(transaction_id),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptPosted {
    pub receipt: Receipt,
    pub invoice: Invoice,
    pub journal_entry_id: Option<i32>,
    pub transaction: Option<IntercompanyTransaction>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPosted {
    pub payment: BillPayment,
    pub bill: Bill,
    pub journal_entry_id: Option<i32>,
    pub transaction: Option<IntercompanyTransaction>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementPosted {
    pub receipt: ReceiptPosted,
    pub payment: PaymentPosted,
    pub transaction: IntercompanyTransaction,
}

#[derive(Debug, Clone)]
pub struct SettlementService {
    ledger: Ledger,
}

impl SettlementService {
    pub fn new(config: &AccountingConfig) -> Self {
        Self { ledger: Ledger::new(config.clone()) }
    }

    /// Receipt on the seller: debit Cash, credit Accounts Receivable
    pub async fn record_receipt(
        &self,
        conn: &mut PgConnection,
        invoice_id: i32,
        details: PaymentDetails,
    ) -> ApiResult<ReceiptPosted> {
        let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1 FOR UPDATE")
            .bind(invoice_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| ApiError::not_found("Invoice"))?;

        if invoice.company_id != details.company_id {
            return Err(ApiError::bad_request(format!(
                "Invoice {} does not belong to company {}",
                invoice.invoice_number, details.company_id
            )));
        }

        let attached = self
            .resolve_transaction(conn, details.transaction_id, Side::Invoice, invoice.id, invoice.sales_order_id)
            .await?;

        let current = DocumentStatus::parse(&invoice.status).unwrap_or(DocumentStatus::Open);
        let applied = apply_payment(invoice.total, invoice.amount_paid, current, details.amount)?;

        let number = sequence::next_number(conn, DocumentKind::Receipt, invoice.company_id).await;
        let receipt = sqlx::query_as::<_, Receipt>(
            "INSERT INTO receipts (
                company_id, receipt_number, invoice_id, customer_id, amount,
                payment_method, reference_number, payment_date, description
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *"
        )
        .bind(invoice.company_id)
        .bind(&number)
        .bind(invoice.id)
        .bind(invoice.customer_id)
        .bind(details.amount)
        .bind(&details.payment_method)
        .bind(&details.reference_number)
        .bind(details.payment_date)
        .bind(&details.description)
        .fetch_one(&mut *conn)
        .await?;

        let invoice = sqlx::query_as::<_, Invoice>(
            "UPDATE invoices SET amount_paid = $2, balance_due = $3, status = $4, updated_at = NOW()
             WHERE id = $1
             RETURNING *"
        )
        .bind(invoice.id)
        .bind(applied.amount_paid)
        .bind(applied.balance_due)
        .bind(applied.status.as_str())
        .fetch_one(&mut *conn)
        .await?;

        let entry = self
            .ledger
            .post_transfer(
                conn,
                invoice.company_id,
                StandardAccount::Cash,
                StandardAccount::Receivable,
                details.amount,
                EntryHeader {
                    entry_date: details.payment_date,
                    reference: Some(receipt.receipt_number.clone()),
                    description: details
                        .description
                        .clone()
                        .unwrap_or_else(|| format!("Receipt for invoice {}", invoice.invoice_number)),
                    source: PostingSource::Receipt(receipt.id),
                },
            )
            .await?;

        let receipt = match &entry {
            Some(entry) => {
                sqlx::query_as::<_, Receipt>(
                    "UPDATE receipts SET journal_entry_id = $2 WHERE id = $1 RETURNING *"
                )
                .bind(receipt.id)
                .bind(entry.id)
                .fetch_one(&mut *conn)
                .await?
            }
            None => receipt,
        };

        let transaction = match attached {
            Some(attached) => Some(
                tracker::link_documents(
                    conn,
                    attached.transaction_id,
                    DocumentLinks {
                        invoice_id: attached.link_document.then_some(invoice.id),
                        receipt_id: Some(receipt.id),
                        ..Default::default()
                    },
                )
                .await?,
            ),
            None => None,
        };

        info!(
            "Receipt {} of {} on {} (now {})",
            receipt.receipt_number, receipt.amount, invoice.invoice_number, invoice.status
        );

        Ok(ReceiptPosted {
            journal_entry_id: entry.map(|e| e.id),
            receipt,
            invoice,
            transaction,
        })
    }

    /// Payment on the buyer: debit Accounts Payable, credit Cash
    pub async fn record_bill_payment(
        &self,
        conn: &mut PgConnection,
        bill_id: i32,
        details: PaymentDetails,
    ) -> ApiResult<PaymentPosted> {
        let bill = sqlx::query_as::<_, Bill>("SELECT * FROM bills WHERE id = $1 FOR UPDATE")
            .bind(bill_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| ApiError::not_found("Bill"))?;

        if bill.company_id != details.company_id {
            return Err(ApiError::bad_request(format!(
                "Bill {} does not belong to company {}",
                bill.bill_number, details.company_id
            )));
        }

        let attached = self
            .resolve_transaction(conn, details.transaction_id, Side::Bill, bill.id, bill.purchase_order_id)
            .await?;

        let current = DocumentStatus::parse(&bill.status).unwrap_or(DocumentStatus::Open);
        let applied = apply_payment(bill.total, bill.amount_paid, current, details.amount)?;

        let number = sequence::next_number(conn, DocumentKind::BillPayment, bill.company_id).await;
        let payment = sqlx::query_as::<_, BillPayment>(
            "INSERT INTO bill_payments (
                company_id, payment_number, bill_id, vendor_id, amount,
                payment_method, reference_number, payment_date, description
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *"
        )
        .bind(bill.company_id)
        .bind(&number)
        .bind(bill.id)
        .bind(bill.vendor_id)
        .bind(details.amount)
        .bind(&details.payment_method)
        .bind(&details.reference_number)
        .bind(details.payment_date)
        .bind(&details.description)
        .fetch_one(&mut *conn)
        .await?;

        let bill = sqlx::query_as::<_, Bill>(
            "UPDATE bills SET amount_paid = $2, balance_due = $3, status = $4, updated_at = NOW()
             WHERE id = $1
             RETURNING *"
        )
        .bind(bill.id)
        .bind(applied.amount_paid)
        .bind(applied.balance_due)
        .bind(applied.status.as_str())
        .fetch_one(&mut *conn)
        .await?;

        let entry = self
            .ledger
            .post_transfer(
                conn,
                bill.company_id,
                StandardAccount::Payable,
                StandardAccount::Cash,
                details.amount,
                EntryHeader {
                    entry_date: details.payment_date,
                    reference: Some(payment.payment_number.clone()),
                    description: details
                        .description
                        .clone()
                        .unwrap_or_else(|| format!("Payment for bill {}", bill.bill_number)),
                    source: PostingSource::BillPayment(payment.id),
                },
            )
            .await?;

        let payment = match &entry {
            Some(entry) => {
                sqlx::query_as::<_, BillPayment>(
                    "UPDATE bill_payments SET journal_entry_id = $2 WHERE id = $1 RETURNING *"
                )
                .bind(payment.id)
                .bind(entry.id)
                .fetch_one(&mut *conn)
                .await?
            }
            None => payment,
        };

        let transaction = match attached {
            Some(attached) => Some(
                tracker::link_documents(
                    conn,
                    attached.transaction_id,
                    DocumentLinks {
                        bill_id: attached.link_document.then_some(bill.id),
                        payment_id: Some(payment.id),
                        ..Default::default()
                    },
                )
                .await?,
            ),
            None => None,
        };

        info!(
            "Payment {} of {} on {} (now {})",
            payment.payment_number, payment.amount, bill.bill_number, bill.status
        );

        Ok(PaymentPosted {
            journal_entry_id: entry.map(|e| e.id),
            payment,
            bill,
            transaction,
        })
    }

    /// Receipt on the seller and payment on the buyer for one transaction.
    ///
    /// Both documents are locked up front and must have the same balance
    /// due. `amount` defaults to that balance.
    pub async fn settle_transaction(
        &self,
        conn: &mut PgConnection,
        transaction_id: i32,
        amount: Option<Decimal>,
        terms: SettlementTerms,
    ) -> ApiResult<SettlementPosted> {
        let transaction = orders::find_transaction(conn, transaction_id, true).await?;

        let (Some(invoice_id), Some(bill_id)) = (transaction.source_invoice_id, transaction.target_bill_id) else {
            return Err(ApiError::bad_request(
                "Intercompany transaction has no invoice and bill yet",
            ));
        };

        let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1 FOR UPDATE")
            .bind(invoice_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| ApiError::not_found("Invoice"))?;
        let bill = sqlx::query_as::<_, Bill>("SELECT * FROM bills WHERE id = $1 FOR UPDATE")
            .bind(bill_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| ApiError::not_found("Bill"))?;

        let amount = settlement_amount(invoice.balance_due, bill.balance_due, amount)?;

        let receipt = self
            .record_receipt(
                conn,
                invoice_id,
                terms.for_side(transaction.source_company_id, amount, transaction.id),
            )
            .await?;

        let payment = self
            .record_bill_payment(
                conn,
                bill_id,
                terms.for_side(transaction.target_company_id, amount, transaction.id),
            )
            .await?;

        let transaction = orders::find_transaction(conn, transaction.id, false).await?;
        Ok(SettlementPosted { receipt, payment, transaction })
    }

    /// Transaction to update after a posting: the one given (which must be
    /// for this document) or the one already linked to the document
    async fn resolve_transaction(
        &self,
        conn: &mut PgConnection,
        requested: Option<i32>,
        side: Side,
        document_id: i32,
        document_order_id: Option<i32>,
    ) -> ApiResult<Option<AttachedTransaction>> {
        let Some(id) = requested else {
            let found = match side {
                Side::Invoice => tracker::transaction_for_invoice(conn, document_id).await?,
                Side::Bill => tracker::transaction_for_bill(conn, document_id).await?,
            };
            return Ok(found.map(|transaction_id| AttachedTransaction { transaction_id, link_document: false }));
        };

        let transaction = orders::find_transaction(conn, id, false).await?;
        let (linked, transaction_order_id) = match side {
            Side::Invoice => (transaction.source_invoice_id, transaction.sales_order_id),
            Side::Bill => (transaction.target_bill_id, transaction.purchase_order_id),
        };

        match document_attachment(linked, document_id, transaction_order_id, document_order_id) {
            Attachment::Linked => Ok(Some(AttachedTransaction { transaction_id: transaction.id, link_document: false })),
            Attachment::SameOrder => Ok(Some(AttachedTransaction { transaction_id: transaction.id, link_document: true })),
            Attachment::Foreign => Err(ApiError::bad_request(format!(
                "Intercompany transaction {} does not belong to this {}",
                id,
                side.label()
            ))),
        }
    }
}

/// Amount to settle when both documents carry `invoice_balance` and
/// `bill_balance`; they must agree and still be open.
pub fn settlement_amount(
    invoice_balance: Decimal,
    bill_balance: Decimal,
    requested: Option<Decimal>,
) -> ApiResult<Decimal> {
    if invoice_balance != bill_balance {
        return Err(ApiError::bad_request(format!(
            "Invoice and bill balances differ ({} vs {}); settle each side separately",
            invoice_balance, bill_balance
        )));
    }
    if invoice_balance <= Decimal::ZERO {
        return Err(ApiError::bad_request("Invoice is already fully paid"));
    }
    Ok(requested.unwrap_or(invoice_balance))
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Invoice,
    Bill,
}

impl Side {
    fn label(self) -> &'static str {
        match self {
            Side::Invoice => "invoice",
            Side::Bill => "bill",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct AttachedTransaction {
    transaction_id: i32,
    /// Transaction had no document on this side yet and adopts this one
    link_document: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attachment {
    Linked,
    SameOrder,
    Foreign,
}

/// How a document relates to a transaction named by the caller. An empty
/// link only accepts a document raised from the transaction's own order.
fn document_attachment(
    linked: Option<i32>,
    document_id: i32,
    transaction_order_id: Option<i32>,
    document_order_id: Option<i32>,
) -> Attachment {
    match (linked, transaction_order_id, document_order_id) {
        (Some(linked), _, _) if linked == document_id => Attachment::Linked,
        (None, Some(expected), Some(actual)) if expected == actual => Attachment::SameOrder,
        _ => Attachment::Foreign,
    }
}
