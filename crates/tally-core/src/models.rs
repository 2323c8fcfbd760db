//! Domain models for Tally

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::mcc::MccCodes;

/// A category, either built-in (system-seeded, shared) or custom (user-owned)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    /// Authoritative for built-ins; for custom categories the union of the
    /// linked base categories' codes
    pub mcc_codes: MccCodes,
    pub is_builtin: bool,
    /// The single built-in used when nothing else applies
    pub is_default: bool,
    /// Owning user (custom categories only)
    pub owner_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn is_custom(&self) -> bool {
        !self.is_builtin
    }
}

/// Custom -> base category link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRelationship {
    pub custom_category_id: i64,
    pub base_category_id: i64,
}

/// Whether money left or entered the account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    Expense,
    Income,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expense => "Expense",
            Self::Income => "Income",
        }
    }

    /// Negative amounts are expenses, everything else is income
    pub fn from_amount(amount: f64) -> Self {
        if amount < 0.0 {
            Self::Expense
        } else {
            Self::Income
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "expense" => Ok(Self::Expense),
            "income" => Ok(Self::Income),
            _ => Err(format!("Unknown transaction type: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A recorded transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub description: String,
    pub amount: f64,
    pub date: NaiveDate,
    pub mcc_code: Option<i32>,
    pub transaction_type: TransactionType,
    /// Base category, always built-in
    pub category_id: i64,
    pub is_manually_categorized: bool,
    /// Statement reference supplied by the ingestion source
    pub external_id: Option<String>,
    pub import_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Transaction as handed over by an ingestion source, before categorization
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: i64,
    pub description: String,
    pub amount: f64,
    pub date: NaiveDate,
    pub mcc_code: Option<i32>,
    /// Derived from the amount sign when absent
    pub transaction_type: Option<TransactionType>,
    /// Statement reference (bank transaction id); redeliveries with the same
    /// reference are recognized as duplicates
    pub external_id: Option<String>,
}

impl NewTransaction {
    pub fn resolved_type(&self) -> TransactionType {
        self.transaction_type
            .unwrap_or_else(|| TransactionType::from_amount(self.amount))
    }
}

/// Editable fields of a recorded transaction; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct TransactionUpdate {
    pub description: Option<String>,
    pub amount: Option<f64>,
    pub date: Option<NaiveDate>,
}

impl TransactionUpdate {
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.amount.is_none() && self.date.is_none()
    }
}

/// Membership row linking a transaction to a category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionCategory {
    pub transaction_id: i64,
    pub category_id: i64,
    /// True for the one row mirroring `transactions.category_id`
    pub is_base_category: bool,
}

/// Who asked for a base-category reassignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassignOrigin {
    /// A person picked the category; marks the transaction as manually categorized
    User,
    /// A cascade or repair moved it; the manual flag is left alone
    System,
}

/// Pagination window for transaction listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

/// Outcome of AddRelationship
#[derive(Debug, Clone, Serialize)]
pub struct LinkResult {
    /// False when the link already existed
    pub created: bool,
    pub mcc_codes: MccCodes,
    pub memberships_added: usize,
}

/// Outcome of RemoveRelationship / RemoveAllRelationships
#[derive(Debug, Clone, Serialize)]
pub struct UnlinkResult {
    pub relationships_removed: usize,
    pub mcc_codes: MccCodes,
    pub memberships_removed: usize,
    pub orphans_reassigned: usize,
}

/// Outcome of a bulk base-category reassignment
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileResult {
    pub transactions_updated: usize,
    pub memberships_added: usize,
    pub memberships_removed: usize,
}

impl ReconcileResult {
    pub fn absorb(&mut self, other: ReconcileResult) {
        self.transactions_updated += other.transactions_updated;
        self.memberships_added += other.memberships_added;
        self.memberships_removed += other.memberships_removed;
    }
}

/// Outcome of deleting (or retiring) a category
#[derive(Debug, Clone, Serialize)]
pub struct DeleteCategoryResult {
    pub deleted_category_id: i64,
    pub transactions_reassigned: usize,
    pub relationships_removed: usize,
    pub memberships_removed: usize,
    /// Custom categories whose MCC cache changed because a base link vanished
    pub custom_categories_recomputed: usize,
}
