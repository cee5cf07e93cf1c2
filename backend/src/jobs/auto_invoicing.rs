// Auto-invoicing job - issues invoices and bills for intercompany
// transactions that are still pending invoice

use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::config::{AccountingConfig, AutoInvoicingConfig};
use crate::error::AppError;
use crate::services::InvoicingService;
use super::JobResult;

#[derive(Debug, Default, Clone, Serialize)]
pub struct AutoInvoicingResult {
    pub transactions_checked: i32,
    pub documents_issued: i32,
    pub already_invoiced: i32,
    pub errors: Vec<String>,
}

pub struct AutoInvoicingJob {
    db_pool: PgPool,
    invoicing: InvoicingService,
    batch_size: i64,
}

impl AutoInvoicingJob {
    pub fn new(db_pool: PgPool, accounting: &AccountingConfig, config: &AutoInvoicingConfig) -> Self {
        Self {
            db_pool,
            invoicing: InvoicingService::new(accounting),
            batch_size: config.batch_size.max(1),
        }
    }

    pub async fn run(&self) -> JobResult<AutoInvoicingResult> {
        let mut result = AutoInvoicingResult::default();

        let pending: Vec<i32> = sqlx::query_scalar(
            "SELECT id FROM intercompany_transactions
             WHERE source_invoice_id IS NULL
               AND sales_order_id IS NOT NULL
               AND purchase_order_id IS NOT NULL
             ORDER BY invoice_attempts, created_at, id
             LIMIT $1"
        )
        .bind(self.batch_size)
        .fetch_all(&self.db_pool)
        .await?;

        for transaction_id in pending {
            result.transactions_checked += 1;

            // One transaction per deal so a failure only rolls back that deal
            let mut tx = self.db_pool.begin().await?;
            match self.invoicing.process_transaction(&mut tx, transaction_id).await {
                Ok(issued) => {
                    tx.commit().await?;
                    result.documents_issued += 1;
                    info!(
                        "Auto-invoiced transaction {}: {} / {}",
                        transaction_id, issued.invoice.invoice_number, issued.bill.bill_number
                    );
                }
                Err(AppError::AlreadyInvoiced { invoice_id }) => {
                    // Invoice exists but was never linked; attach it
                    drop(tx);
                    self.link_existing(transaction_id, invoice_id).await?;
                    result.already_invoiced += 1;
                }
                Err(e) => {
                    drop(tx);
                    warn!("Auto-invoicing transaction {} failed: {}", transaction_id, e);
                    self.record_failure(transaction_id, &e.to_string()).await?;
                    result.errors.push(format!("transaction {}: {}", transaction_id, e));
                }
            }
        }

        Ok(result)
    }

    /// Push a failing row behind the ones not yet tried
    async fn record_failure(&self, transaction_id: i32, message: &str) -> JobResult<()> {
        sqlx::query(
            "UPDATE intercompany_transactions
             SET invoice_attempts = invoice_attempts + 1, last_invoice_error = $2
             WHERE id = $1"
        )
        .bind(transaction_id)
        .bind(message)
        .execute(&self.db_pool)
        .await?;
        Ok(())
    }

    async fn link_existing(&self, transaction_id: i32, invoice_id: i32) -> JobResult<()> {
        let mut tx = self.db_pool.begin().await?;
        let bill_id: Option<i32> = sqlx::query_scalar(
            "SELECT b.id FROM bills b
             JOIN intercompany_transactions t ON t.purchase_order_id = b.purchase_order_id
             WHERE t.id = $1"
        )
        .bind(transaction_id)
        .fetch_optional(&mut *tx)
        .await?;

        crate::services::tracker::link_documents(
            &mut tx,
            transaction_id,
            crate::services::tracker::DocumentLinks {
                invoice_id: Some(invoice_id),
                bill_id,
                ..Default::default()
            },
        )
        .await
        .map_err(|e| super::JobError::ExecutionError(e.to_string()))?;

        tx.commit().await?;
        Ok(())
    }
}
