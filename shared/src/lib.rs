use chrono::{DateTime, Utc, NaiveDate};
use serde::{Deserialize, Serialize};
use rust_decimal::Decimal;

// ==================== Tenancy & Chart of Accounts ====================

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: i32,
    pub name: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i32,
    pub company_id: i32,
    pub code: String,
    pub name: String,
    pub account_type: String, // asset, liability, equity, revenue, expense
    pub balance: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn kind(&self) -> Option<AccountType> {
        AccountType::parse(&self.account_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalBalance {
    Debit,
    Credit,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asset => "asset",
            Self::Liability => "liability",
            Self::Equity => "equity",
            Self::Revenue => "revenue",
            Self::Expense => "expense",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "asset" => Some(Self::Asset),
            "liability" => Some(Self::Liability),
            "equity" => Some(Self::Equity),
            "revenue" | "income" => Some(Self::Revenue),
            "expense" => Some(Self::Expense),
            _ => None,
        }
    }

    pub fn normal_balance(&self) -> NormalBalance {
        match self {
            Self::Asset | Self::Expense => NormalBalance::Debit,
            Self::Liability | Self::Equity | Self::Revenue => NormalBalance::Credit,
        }
    }

    /// Signed change to the cached account balance for one journal line.
    pub fn balance_delta(&self, debit: Decimal, credit: Decimal) -> Decimal {
        match self.normal_balance() {
            NormalBalance::Debit => debit - credit,
            NormalBalance::Credit => credit - debit,
        }
    }
}

// ==================== Orders ====================

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesOrder {
    pub id: i32,
    pub company_id: i32,
    pub order_number: String,
    pub customer_id: i32, // counterparty company
    pub order_date: NaiveDate,
    pub total: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesOrderItem {
    pub id: i32,
    pub sales_order_id: i32,
    pub product_id: Option<i32>,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total: Decimal,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: i32,
    pub company_id: i32,
    pub order_number: String,
    pub vendor_id: i32, // counterparty company
    pub order_date: NaiveDate,
    pub total: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrderItem {
    pub id: i32,
    pub purchase_order_id: i32,
    pub product_id: Option<i32>,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total: Decimal,
}

// ==================== Billing Documents ====================

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i32,
    pub company_id: i32,
    pub invoice_number: String,
    pub sales_order_id: Option<i32>,
    pub customer_id: i32,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub total: Decimal,
    pub amount_paid: Decimal,
    pub balance_due: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub id: i32,
    pub invoice_id: i32,
    pub product_id: Option<i32>,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total: Decimal,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bill {
    pub id: i32,
    pub company_id: i32,
    pub bill_number: String,
    pub purchase_order_id: Option<i32>,
    pub vendor_id: i32,
    pub reference_invoice_id: Option<i32>,
    pub bill_date: NaiveDate,
    pub due_date: NaiveDate,
    pub total: Decimal,
    pub amount_paid: Decimal,
    pub balance_due: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillItem {
    pub id: i32,
    pub bill_id: i32,
    pub product_id: Option<i32>,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total: Decimal,
}

/// Lifecycle of an invoice or bill. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DocumentStatus {
    Open,
    Partial,
    Paid,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Partial => "Partial",
            Self::Paid => "Paid",
        }
    }

    /// Accepts the labels older rows were written with ("Pending", "Partially Paid").
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "open" | "pending" | "draft" => Some(Self::Open),
            "partial" | "partially paid" | "partially_paid" => Some(Self::Partial),
            "paid" | "completed" => Some(Self::Paid),
            _ => None,
        }
    }

    pub fn for_amounts(total: Decimal, amount_paid: Decimal) -> Self {
        if amount_paid >= total {
            Self::Paid
        } else if amount_paid > Decimal::ZERO {
            Self::Partial
        } else {
            Self::Open
        }
    }

    /// Never regresses: returns whichever of the two states is further along.
    pub fn advance(self, next: Self) -> Self {
        self.max(next)
    }
}

// ==================== Money Movement ====================

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub id: i32,
    pub company_id: i32,
    pub receipt_number: String,
    pub invoice_id: i32,
    pub customer_id: i32,
    pub amount: Decimal,
    pub payment_method: String,
    pub reference_number: Option<String>,
    pub payment_date: NaiveDate,
    pub description: Option<String>,
    pub journal_entry_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillPayment {
    pub id: i32,
    pub company_id: i32,
    pub payment_number: String,
    pub bill_id: i32,
    pub vendor_id: i32,
    pub amount: Decimal,
    pub payment_method: String,
    pub reference_number: Option<String>,
    pub payment_date: NaiveDate,
    pub description: Option<String>,
    pub journal_entry_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}

// ==================== General Ledger ====================

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: i32,
    pub company_id: i32,
    pub entry_number: String,
    pub entry_date: NaiveDate,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub source_type: Option<String>,
    pub source_id: Option<i32>,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
    pub created_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntryItem {
    pub id: i32,
    pub journal_entry_id: i32,
    pub account_id: i32,
    pub debit: Decimal,
    pub credit: Decimal,
    pub description: Option<String>,
}

// ==================== Intercompany ====================

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntercompanyTransaction {
    pub id: i32,
    pub source_company_id: i32,
    pub target_company_id: i32,
    pub sales_order_id: Option<i32>,
    pub purchase_order_id: Option<i32>,
    pub amount: Decimal,
    pub source_invoice_id: Option<i32>,
    pub target_bill_id: Option<i32>,
    pub source_receipt_id: Option<i32>,
    pub target_payment_id: Option<i32>,
    pub status: String,
    pub payment_status: String,
    pub transaction_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowStatus {
    Ordered,
    Invoiced,
    PartiallyPaid,
    Completed,
}

impl WorkflowStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ordered => "Ordered (Pending Invoice)",
            Self::Invoiced => "Invoiced (Pending Payment)",
            Self::PartiallyPaid => "Partially Paid",
            Self::Completed => "Completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Unpaid,
    Partial,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unpaid => "Unpaid",
            Self::Partial => "Partial",
            Self::Paid => "Paid",
        }
    }
}

impl From<DocumentStatus> for PaymentStatus {
    fn from(status: DocumentStatus) -> Self {
        match status {
            DocumentStatus::Open => Self::Unpaid,
            DocumentStatus::Partial => Self::Partial,
            DocumentStatus::Paid => Self::Paid,
        }
    }
}

// ==================== Adjustments ====================

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditNote {
    pub id: i32,
    pub company_id: i32,
    pub credit_note_number: String,
    pub customer_id: Option<i32>,
    pub invoice_id: Option<i32>,
    pub amount: Decimal,
    pub reason: Option<String>,
    pub credit_note_date: NaiveDate,
    pub status: String,
    pub journal_entry_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditNoteItem {
    pub id: i32,
    pub credit_note_id: i32,
    pub product_id: Option<i32>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total_amount: Decimal,
    pub reason: Option<String>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebitNote {
    pub id: i32,
    pub company_id: i32,
    pub debit_note_number: String,
    pub vendor_id: Option<i32>,
    pub bill_id: Option<i32>,
    pub amount: Decimal,
    pub reason: Option<String>,
    pub debit_note_date: NaiveDate,
    pub status: String,
    pub journal_entry_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebitNoteItem {
    pub id: i32,
    pub debit_note_id: i32,
    pub product_id: Option<i32>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total_amount: Decimal,
    pub reason: Option<String>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntercompanyAdjustment {
    pub id: i32,
    pub adjustment_number: String,
    pub source_company_id: i32,
    pub target_company_id: i32,
    pub credit_note_id: i32,
    pub debit_note_id: i32,
    pub amount: Decimal,
    pub reason: Option<String>,
    pub adjustment_date: NaiveDate,
    pub status: String,
    pub created_at: DateTime<Utc>,
}
