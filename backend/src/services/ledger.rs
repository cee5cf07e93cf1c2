//! Double-entry posting
//!
//! `Ledger::post` is the only code path that writes journal entries or
//! touches `accounts.balance`. Every balance change is the signed sum of the
//! lines posted against that account.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgConnection;
use thiserror::Error;
use tracing::{info, warn};

use tally_shared::{Account, AccountType, JournalEntry, JournalEntryItem};

use crate::config::{AccountCodes, AccountingConfig, MissingAccountPolicy};
use crate::error::AppError;
use super::sequence::{self, DocumentKind};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Journal entry needs at least 2 lines, got {0}")]
    InsufficientLines(usize),
    #[error("Line {0}: {1}")]
    InvalidLine(usize, String),
    #[error("Total debits ({debit}) must equal total credits ({credit})")]
    Unbalanced { debit: Decimal, credit: Decimal },
    #[error("Account {code} not found for company {company_id}")]
    MissingAccount { company_id: i32, code: String },
    #[error("Account {account_id} does not belong to company {company_id}")]
    ForeignAccount { account_id: i32, company_id: i32 },
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::MissingAccount { company_id, code } => AppError::MissingAccount { company_id, code },
            LedgerError::Database(e) => AppError::from(e),
            other => AppError::UnbalancedEntry(other.to_string()),
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Which document a journal entry was posted for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostingSource {
    Invoice(i32),
    Bill(i32),
    Receipt(i32),
    BillPayment(i32),
    CreditNote(i32),
    DebitNote(i32),
}

impl PostingSource {
    pub fn parts(&self) -> (&'static str, i32) {
        match *self {
            Self::Invoice(id) => ("invoice", id),
            Self::Bill(id) => ("bill", id),
            Self::Receipt(id) => ("receipt", id),
            Self::BillPayment(id) => ("bill_payment", id),
            Self::CreditNote(id) => ("credit_note", id),
            Self::DebitNote(id) => ("debit_note", id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostingLine {
    pub account_id: i32,
    pub account_type: AccountType,
    pub debit: Decimal,
    pub credit: Decimal,
    pub description: Option<String>,
}

impl PostingLine {
    pub fn debit(account: &PostingAccount, amount: Decimal) -> Self {
        Self {
            account_id: account.id,
            account_type: account.account_type,
            debit: amount,
            credit: Decimal::ZERO,
            description: None,
        }
    }

    pub fn credit(account: &PostingAccount, amount: Decimal) -> Self {
        Self {
            account_id: account.id,
            account_type: account.account_type,
            debit: Decimal::ZERO,
            credit: amount,
            description: None,
        }
    }

    pub fn balance_delta(&self) -> Decimal {
        self.account_type.balance_delta(self.debit, self.credit)
    }
}

/// The slice of an account row needed to post against it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingAccount {
    pub id: i32,
    pub code: String,
    pub account_type: AccountType,
}

#[derive(Debug, Clone)]
pub struct JournalDraft {
    pub company_id: i32,
    pub entry_date: NaiveDate,
    pub reference: Option<String>,
    pub description: String,
    pub source: PostingSource,
    pub lines: Vec<PostingLine>,
}

/// Check the double-entry rules and return (total_debit, total_credit)
pub fn validate_lines(lines: &[PostingLine]) -> LedgerResult<(Decimal, Decimal)> {
    if lines.len() < 2 {
        return Err(LedgerError::InsufficientLines(lines.len()));
    }

    let mut total_debit = Decimal::ZERO;
    let mut total_credit = Decimal::ZERO;

    for (idx, line) in lines.iter().enumerate() {
        if line.debit < Decimal::ZERO || line.credit < Decimal::ZERO {
            return Err(LedgerError::InvalidLine(idx, "amounts cannot be negative".to_string()));
        }
        let debit_side = line.debit > Decimal::ZERO;
        let credit_side = line.credit > Decimal::ZERO;
        if debit_side == credit_side {
            return Err(LedgerError::InvalidLine(
                idx,
                "exactly one of debit or credit must be non-zero".to_string(),
            ));
        }
        total_debit += line.debit;
        total_credit += line.credit;
    }

    if total_debit != total_credit {
        return Err(LedgerError::Unbalanced { debit: total_debit, credit: total_credit });
    }

    Ok((total_debit, total_credit))
}

/// The standard accounts a posting path needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardAccount {
    Cash,
    Receivable,
    Payable,
    Revenue,
    Expense,
}

impl StandardAccount {
    pub fn code<'a>(&self, codes: &'a AccountCodes) -> &'a str {
        match self {
            Self::Cash => &codes.cash,
            Self::Receivable => &codes.receivable,
            Self::Payable => &codes.payable,
            Self::Revenue => &codes.revenue,
            Self::Expense => &codes.expense,
        }
    }

    pub fn default_name(&self) -> &'static str {
        match self {
            Self::Cash => "Cash",
            Self::Receivable => "Accounts Receivable",
            Self::Payable => "Accounts Payable",
            Self::Revenue => "Revenue",
            Self::Expense => "Expense",
        }
    }

    pub fn account_type(&self) -> AccountType {
        match self {
            Self::Cash | Self::Receivable => AccountType::Asset,
            Self::Payable => AccountType::Liability,
            Self::Revenue => AccountType::Revenue,
            Self::Expense => AccountType::Expense,
        }
    }

    pub const ALL: [StandardAccount; 5] = [
        Self::Cash,
        Self::Receivable,
        Self::Payable,
        Self::Revenue,
        Self::Expense,
    ];
}

#[derive(Debug, Clone)]
pub struct Ledger {
    config: AccountingConfig,
}

impl Ledger {
    pub fn new(config: AccountingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AccountingConfig {
        &self.config
    }

    /// Look up one standard account for a company.
    ///
    /// `Ok(None)` only under `MissingAccountPolicy::Skip`; the caller then
    /// records its document without a journal entry.
    pub async fn account(
        &self,
        conn: &mut PgConnection,
        company_id: i32,
        which: StandardAccount,
    ) -> LedgerResult<Option<PostingAccount>> {
        let code = which.code(&self.config.account_codes);

        let row = sqlx::query_as::<_, Account>(
            "SELECT * FROM accounts WHERE company_id = $1 AND code = $2 AND is_active = true"
        )
        .bind(company_id)
        .bind(code)
        .fetch_optional(&mut *conn)
        .await?;

        let account = row.and_then(|a| {
            let account_type = a.kind()?;
            Some(PostingAccount { id: a.id, code: a.code, account_type })
        });

        match (account, self.config.missing_account_policy) {
            (Some(account), _) => Ok(Some(account)),
            (None, MissingAccountPolicy::Fail) => Err(LedgerError::MissingAccount {
                company_id,
                code: code.to_string(),
            }),
            (None, MissingAccountPolicy::Skip) => {
                warn!(
                    "Account {} missing for company {}, journal posting skipped",
                    code, company_id
                );
                Ok(None)
            }
        }
    }

    /// Resolve a debit/credit account pair; `None` if either is skipped
    pub async fn account_pair(
        &self,
        conn: &mut PgConnection,
        company_id: i32,
        debit: StandardAccount,
        credit: StandardAccount,
    ) -> LedgerResult<Option<(PostingAccount, PostingAccount)>> {
        let debit = self.account(conn, company_id, debit).await?;
        let credit = self.account(conn, company_id, credit).await?;
        Ok(debit.zip(credit))
    }

    /// Post a balanced entry and apply every line to its account balance
    pub async fn post(&self, conn: &mut PgConnection, draft: JournalDraft) -> LedgerResult<JournalEntry> {
        let (total_debit, total_credit) = validate_lines(&draft.lines)?;
        let (source_type, source_id) = draft.source.parts();
        let entry_number = sequence::next_number(conn, DocumentKind::JournalEntry, draft.company_id).await;

        let entry = sqlx::query_as::<_, JournalEntry>(
            "INSERT INTO journal_entries (
                company_id, entry_number, entry_date, reference, description,
                source_type, source_id, total_debit, total_credit
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *"
        )
        .bind(draft.company_id)
        .bind(&entry_number)
        .bind(draft.entry_date)
        .bind(&draft.reference)
        .bind(&draft.description)
        .bind(source_type)
        .bind(source_id)
        .bind(total_debit)
        .bind(total_credit)
        .fetch_one(&mut *conn)
        .await?;

        for line in &draft.lines {
            sqlx::query(
                "INSERT INTO journal_entry_items (journal_entry_id, account_id, debit, credit, description)
                 VALUES ($1, $2, $3, $4, $5)"
            )
            .bind(entry.id)
            .bind(line.account_id)
            .bind(line.debit)
            .bind(line.credit)
            .bind(line.description.as_deref().unwrap_or(&draft.description))
            .execute(&mut *conn)
            .await?;

            let updated = sqlx::query(
                "UPDATE accounts SET balance = balance + $2 WHERE id = $1 AND company_id = $3"
            )
            .bind(line.account_id)
            .bind(line.balance_delta())
            .bind(draft.company_id)
            .execute(&mut *conn)
            .await?;

            if updated.rows_affected() != 1 {
                return Err(LedgerError::ForeignAccount {
                    account_id: line.account_id,
                    company_id: draft.company_id,
                });
            }
        }

        info!(
            "Posted {} for company {} ({} {}): {}",
            entry.entry_number, draft.company_id, source_type, source_id, total_debit
        );

        Ok(entry)
    }

    /// Resolve both accounts and post a two-line entry.
    ///
    /// Returns `None` when the skip policy left an account unresolved.
    pub async fn post_transfer(
        &self,
        conn: &mut PgConnection,
        company_id: i32,
        debit: StandardAccount,
        credit: StandardAccount,
        amount: Decimal,
        header: EntryHeader,
    ) -> LedgerResult<Option<JournalEntry>> {
        let Some((debit_account, credit_account)) =
            self.account_pair(conn, company_id, debit, credit).await?
        else {
            return Ok(None);
        };

        let draft = JournalDraft {
            company_id,
            entry_date: header.entry_date,
            reference: header.reference,
            description: header.description,
            source: header.source,
            lines: vec![
                PostingLine::debit(&debit_account, amount),
                PostingLine::credit(&credit_account, amount),
            ],
        };

        self.post(conn, draft).await.map(Some)
    }

    /// Create any missing standard accounts for a company
    pub async fn ensure_standard_accounts(
        &self,
        conn: &mut PgConnection,
        company_id: i32,
    ) -> LedgerResult<Vec<Account>> {
        for which in StandardAccount::ALL {
            sqlx::query(
                "INSERT INTO accounts (company_id, code, name, account_type)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (company_id, code) DO NOTHING"
            )
            .bind(company_id)
            .bind(which.code(&self.config.account_codes))
            .bind(which.default_name())
            .bind(which.account_type().as_str())
            .execute(&mut *conn)
            .await?;
        }

        let accounts = sqlx::query_as::<_, Account>(
            "SELECT * FROM accounts WHERE company_id = $1 ORDER BY code"
        )
        .bind(company_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(accounts)
    }
}

/// Header fields shared by every two-line posting
#[derive(Debug, Clone)]
pub struct EntryHeader {
    pub entry_date: NaiveDate,
    pub reference: Option<String>,
    pub description: String,
    pub source: PostingSource,
}

/// Lines of one journal entry, for read endpoints
pub async fn entry_items(conn: &mut PgConnection, entry_id: i32) -> Result<Vec<JournalEntryItem>, sqlx::Error> {
    sqlx::query_as::<_, JournalEntryItem>(
        "SELECT * FROM journal_entry_items WHERE journal_entry_id = $1 ORDER BY id"
    )
    .bind(entry_id)
    .fetch_all(&mut *conn)
    .await
}
