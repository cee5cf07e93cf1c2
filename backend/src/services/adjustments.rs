//! Credit notes, debit notes and paired intercompany adjustments
//!
//! A credit note reduces the issuer's receivable (debit Revenue, credit AR).
//! A debit note raises the issuer's payable (debit Expense, credit AP). An
//! intercompany adjustment issues one of each, on the source and target
//! company respectively, and links them.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use tracing::info;

use tally_shared::{CreditNote, CreditNoteItem, DebitNote, DebitNoteItem, IntercompanyAdjustment};

use crate::config::AccountingConfig;
use crate::error::{ApiError, ApiResult};
use crate::validation::money;
use super::ledger::{EntryHeader, Ledger, PostingSource, StandardAccount};
use super::orders::require_company;
use super::sequence::timestamp_number;

/// One product line on a credit or debit note
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteItemInput {
    pub product_id: Option<i32>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total_amount: Decimal,
    pub reason: Option<String>,
}

/// Field errors for note lines, keyed like `products[0].total_amount`
pub fn item_errors(items: &[NoteItemInput]) -> Vec<(String, String)> {
    let mut errors = Vec::new();
    for (idx, item) in items.iter().enumerate() {
        if item.quantity <= Decimal::ZERO {
            errors.push((format!("products[{}].quantity", idx), "quantity must be greater than zero".to_string()));
        }
        if item.unit_price < Decimal::ZERO {
            errors.push((format!("products[{}].unit_price", idx), "unit_price cannot be negative".to_string()));
        }
        if !money::line_total_matches(item.quantity, item.unit_price, item.total_amount) {
            errors.push((
                format!("products[{}].total_amount", idx),
                "total_amount must equal quantity * unit_price".to_string(),
            ));
        }
    }
    errors
}

#[derive(Debug, Clone)]
pub struct NewNote {
    pub company_id: i32,
    /// Customer for a credit note, vendor for a debit note
    pub counterparty_id: Option<i32>,
    /// Invoice for a credit note, bill for a debit note
    pub document_id: Option<i32>,
    pub amount: Decimal,
    pub reason: Option<String>,
    pub date: NaiveDate,
    pub items: Vec<NoteItemInput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreditNoteCreated {
    #[serde(flatten)]
    pub credit_note: CreditNote,
    pub items: Vec<CreditNoteItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DebitNoteCreated {
    #[serde(flatten)]
    pub debit_note: DebitNote,
    pub items: Vec<DebitNoteItem>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentCreated {
    pub adjustment: IntercompanyAdjustment,
    pub credit_note: CreditNoteCreated,
    pub debit_note: DebitNoteCreated,
}

#[derive(Debug, Clone)]
pub struct NewAdjustment {
    pub source_company_id: i32,
    pub target_company_id: i32,
    pub amount: Decimal,
    pub reason: Option<String>,
    pub date: NaiveDate,
    pub items: Vec<NoteItemInput>,
}

#[derive(Debug, Clone)]
pub struct AdjustmentService {
    ledger: Ledger,
}

impl AdjustmentService {
    pub fn new(config: &AccountingConfig) -> Self {
        Self { ledger: Ledger::new(config.clone()) }
    }

    pub async fn create_credit_note(&self, conn: &mut PgConnection, note: NewNote) -> ApiResult<CreditNoteCreated> {
        require_company(conn, note.company_id).await?;
        if let Some(customer_id) = note.counterparty_id {
            require_company(conn, customer_id).await?;
        }
        if let Some(invoice_id) = note.document_id {
            let owner: Option<i32> = sqlx::query_scalar("SELECT company_id FROM invoices WHERE id = $1")
                .bind(invoice_id)
                .fetch_optional(&mut *conn)
                .await?;
            match owner {
                None => return Err(ApiError::not_found("Invoice")),
                Some(owner) if owner != note.company_id => {
                    return Err(ApiError::bad_request("Invoice does not belong to this company"));
                }
                Some(_) => {}
            }
        }

        let number = timestamp_number("CN", note.company_id);
        let credit_note = sqlx::query_as::<_, CreditNote>(
            "INSERT INTO credit_notes (
                company_id, credit_note_number, customer_id, invoice_id, amount,
                reason, credit_note_date, status
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, 'Issued')
            RETURNING *"
        )
        .bind(note.company_id)
        .bind(&number)
        .bind(note.counterparty_id)
        .bind(note.document_id)
        .bind(note.amount)
        .bind(&note.reason)
        .bind(note.date)
        .fetch_one(&mut *conn)
        .await?;

        let mut items = Vec::with_capacity(note.items.len());
        for line in &note.items {
            let item = sqlx::query_as::<_, CreditNoteItem>(
                "INSERT INTO credit_note_items (credit_note_id, product_id, quantity, unit_price, total_amount, reason)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 RETURNING *"
            )
            .bind(credit_note.id)
            .bind(line.product_id)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(line.total_amount)
            .bind(&line.reason)
            .fetch_one(&mut *conn)
            .await?;
            items.push(item);
        }

        let entry = self
            .ledger
            .post_transfer(
                conn,
                note.company_id,
                StandardAccount::Revenue,
                StandardAccount::Receivable,
                note.amount,
                EntryHeader {
                    entry_date: note.date,
                    reference: Some(number.clone()),
                    description: note
                        .reason
                        .clone()
                        .unwrap_or_else(|| format!("Credit note {}", number)),
                    source: PostingSource::CreditNote(credit_note.id),
                },
            )
            .await?;

        let credit_note = match entry {
            Some(entry) => {
                sqlx::query_as::<_, CreditNote>(
                    "UPDATE credit_notes SET journal_entry_id = $2 WHERE id = $1 RETURNING *"
                )
                .bind(credit_note.id)
                .bind(entry.id)
                .fetch_one(&mut *conn)
                .await?
            }
            None => credit_note,
        };

        info!("Issued credit note {} for {}", credit_note.credit_note_number, credit_note.amount);
        Ok(CreditNoteCreated { credit_note, items })
    }

    pub async fn create_debit_note(&self, conn: &mut PgConnection, note: NewNote) -> ApiResult<DebitNoteCreated> {
        require_company(conn, note.company_id).await?;
        if let Some(vendor_id) = note.counterparty_id {
            require_company(conn, vendor_id).await?;
        }
        if let Some(bill_id) = note.document_id {
            let owner: Option<i32> = sqlx::query_scalar("SELECT company_id FROM bills WHERE id = $1")
                .bind(bill_id)
                .fetch_optional(&mut *conn)
                .await?;
            match owner {
                None => return Err(ApiError::not_found("Bill")),
                Some(owner) if owner != note.company_id => {
                    return Err(ApiError::bad_request("Bill does not belong to this company"));
                }
                Some(_) => {}
            }
        }

        let number = timestamp_number("DN", note.company_id);
        let debit_note = sqlx::query_as::<_, DebitNote>(
            "INSERT INTO debit_notes (
                company_id, debit_note_number, vendor_id, bill_id, amount,
                reason, debit_note_date, status
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, 'Issued')
            RETURNING *"
        )
        .bind(note.company_id)
        .bind(&number)
        .bind(note.counterparty_id)
        .bind(note.document_id)
        .bind(note.amount)
        .bind(&note.reason)
        .bind(note.date)
        .fetch_one(&mut *conn)
        .await?;

        let mut items = Vec::with_capacity(note.items.len());
        for line in &note.items {
            let item = sqlx::query_as::<_, DebitNoteItem>(
                "INSERT INTO debit_note_items (debit_note_id, product_id, quantity, unit_price, total_amount, reason)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 RETURNING *"
            )
            .bind(debit_note.id)
            .bind(line.product_id)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(line.total_amount)
            .bind(&line.reason)
            .fetch_one(&mut *conn)
            .await?;
            items.push(item);
        }

        let entry = self
            .ledger
            .post_transfer(
                conn,
                note.company_id,
                StandardAccount::Expense,
                StandardAccount::Payable,
                note.amount,
                EntryHeader {
                    entry_date: note.date,
                    reference: Some(number.clone()),
                    description: note
                        .reason
                        .clone()
                        .unwrap_or_else(|| format!("Debit note {}", number)),
                    source: PostingSource::DebitNote(debit_note.id),
                },
            )
            .await?;

        let debit_note = match entry {
            Some(entry) => {
                sqlx::query_as::<_, DebitNote>(
                    "UPDATE debit_notes SET journal_entry_id = $2 WHERE id = $1 RETURNING *"
                )
                .bind(debit_note.id)
                .bind(entry.id)
                .fetch_one(&mut *conn)
                .await?
            }
            None => debit_note,
        };

        info!("Issued debit note {} for {}", debit_note.debit_note_number, debit_note.amount);
        Ok(DebitNoteCreated { debit_note, items })
    }

    /// Credit note on the source, debit note on the target, one linking row
    pub async fn create_adjustment(
        &self,
        conn: &mut PgConnection,
        adjustment: NewAdjustment,
    ) -> ApiResult<AdjustmentCreated> {
        if adjustment.source_company_id == adjustment.target_company_id {
            return Err(ApiError::bad_request("Source and target company must differ"));
        }

        let credit_note = self
            .create_credit_note(
                conn,
                NewNote {
                    company_id: adjustment.source_company_id,
                    counterparty_id: Some(adjustment.target_company_id),
                    document_id: None,
                    amount: adjustment.amount,
                    reason: adjustment.reason.clone(),
                    date: adjustment.date,
                    items: adjustment.items.clone(),
                },
            )
            .await?;

        let debit_note = self
            .create_debit_note(
                conn,
                NewNote {
                    company_id: adjustment.target_company_id,
                    counterparty_id: Some(adjustment.source_company_id),
                    document_id: None,
                    amount: adjustment.amount,
                    reason: adjustment.reason.clone(),
                    date: adjustment.date,
                    items: adjustment.items,
                },
            )
            .await?;

        let number = timestamp_number("ICA", adjustment.source_company_id);
        let row = sqlx::query_as::<_, IntercompanyAdjustment>(
            "INSERT INTO intercompany_adjustments (
                adjustment_number, source_company_id, target_company_id, credit_note_id,
                debit_note_id, amount, reason, adjustment_date, status
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'Completed')
            RETURNING *"
        )
        .bind(&number)
        .bind(adjustment.source_company_id)
        .bind(adjustment.target_company_id)
        .bind(credit_note.credit_note.id)
        .bind(debit_note.debit_note.id)
        .bind(adjustment.amount)
        .bind(&adjustment.reason)
        .bind(adjustment.date)
        .fetch_one(&mut *conn)
        .await?;

        info!(
            "Intercompany adjustment {} ({} -> {}) for {}",
            row.adjustment_number, row.source_company_id, row.target_company_id, row.amount
        );

        Ok(AdjustmentCreated { adjustment: row, credit_note, debit_note })
    }
}

pub async fn list_credit_notes(conn: &mut PgConnection, company_id: i32) -> ApiResult<Vec<CreditNote>> {
    let notes = sqlx::query_as::<_, CreditNote>(
        "SELECT * FROM credit_notes WHERE company_id = $1 ORDER BY credit_note_date DESC, id DESC"
    )
    .bind(company_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(notes)
}

pub async fn list_debit_notes(conn: &mut PgConnection, company_id: i32) -> ApiResult<Vec<DebitNote>> {
    let notes = sqlx::query_as::<_, DebitNote>(
        "SELECT * FROM debit_notes WHERE company_id = $1 ORDER BY debit_note_date DESC, id DESC"
    )
    .bind(company_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(notes)
}
