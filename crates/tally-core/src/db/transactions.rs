//! Transaction recording and membership queries

use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::categories::ensure_id;
use super::reconcile::{set_base_row, sync_custom_memberships};
use super::{parse_date, parse_datetime, Database};
use crate::categorize::categorize_on;
use crate::error::{Error, Result};
use crate::models::{
    NewTransaction, Page, Transaction, TransactionCategory, TransactionType, TransactionUpdate,
};

const TRANSACTION_COLUMNS: &str = "t.id, t.user_id, t.description, t.amount, t.date, t.mcc_code, \
     t.transaction_type, t.category_id, t.is_manually_categorized, t.external_id, t.import_hash, \
     t.created_at";

/// Result of inserting a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionInsertResult {
    /// Transaction was inserted successfully, contains new transaction ID
    Inserted(i64),
    /// Transaction was a duplicate, contains existing transaction ID
    Duplicate(i64),
}

impl TransactionInsertResult {
    pub fn id(&self) -> i64 {
        match self {
            Self::Inserted(id) | Self::Duplicate(id) => *id,
        }
    }
}

/// Hash used to recognize a transaction delivered twice by the ingestion side
///
/// Only a statement reference identifies a redelivery. Two purchases with the
/// same date, description and amount are distinct, so without a reference
/// there is no hash and every record is inserted.
pub fn generate_import_hash(tx: &NewTransaction) -> Option<String> {
    let reference = tx.external_id.as_deref().map(str::trim).filter(|r| !r.is_empty())?;
    let mut hasher = Sha256::new();
    hasher.update(tx.user_id.to_be_bytes());
    hasher.update(reference.as_bytes());
    Some(hex::encode(hasher.finalize()))
}

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let date_str: String = row.get(4)?;
    let type_str: String = row.get(6)?;
    let transaction_type = type_str
        .parse::<TransactionType>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, e.into()))?;
    let created_at_str: String = row.get(11)?;

    Ok(Transaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        description: row.get(2)?,
        amount: row.get(3)?,
        date: parse_date(4, &date_str)?,
        mcc_code: row.get(5)?,
        transaction_type,
        category_id: row.get(7)?,
        is_manually_categorized: row.get(8)?,
        external_id: row.get(9)?,
        import_hash: row.get(10)?,
        created_at: parse_datetime(&created_at_str),
    })
}

fn validate_description(description: &str) -> Result<()> {
    if description.trim().is_empty() {
        return Err(Error::Validation(
            "Transaction description must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() {
        return Err(Error::Validation(format!(
            "Transaction amount {} is not a number",
            amount
        )));
    }
    Ok(())
}

fn validate_new(tx: &NewTransaction) -> Result<()> {
    ensure_id("user", tx.user_id)?;
    validate_description(&tx.description)?;
    validate_amount(tx.amount)
}

impl Database {
    /// Record an incoming transaction (skips redeliveries of the same statement reference)
    ///
    /// The base category comes from the MCC code. The base membership row and
    /// the owner's implied custom memberships are written in the same unit.
    pub fn record_transaction(&self, new: &NewTransaction) -> Result<TransactionInsertResult> {
        validate_new(new)?;
        let import_hash = generate_import_hash(new);

        self.write(|tx| {
            if let Some(hash) = &import_hash {
                let existing: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM transactions WHERE import_hash = ?",
                        params![hash],
                        |row| row.get(0),
                    )
                    .optional()?;
                if let Some(id) = existing {
                    debug!("Skipping duplicate transaction {}", id);
                    return Ok(TransactionInsertResult::Duplicate(id));
                }
            }

            let assignment = categorize_on(tx, new.mcc_code)?;

            tx.execute(
                r#"
                INSERT INTO transactions
                    (user_id, description, amount, date, mcc_code, transaction_type,
                     category_id, is_manually_categorized, external_id, import_hash)
                VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
                "#,
                params![
                    new.user_id,
                    new.description.trim(),
                    new.amount,
                    new.date.to_string(),
                    new.mcc_code,
                    new.resolved_type().as_str(),
                    assignment.category_id,
                    new.external_id.as_deref().map(str::trim),
                    import_hash,
                ],
            )?;
            let id = tx.last_insert_rowid();

            set_base_row(tx, id, assignment.category_id)?;
            let synced = sync_custom_memberships(tx, id, new.user_id, assignment.category_id)?;

            info!(
                "Recorded transaction {} as '{}' ({}, {} custom memberships)",
                id,
                assignment.category_name,
                assignment.source,
                synced.memberships_added
            );
            Ok(TransactionInsertResult::Inserted(id))
        })
    }

    /// Get a transaction by ID
    pub fn get_transaction(&self, id: i64) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM transactions t WHERE t.id = ?", TRANSACTION_COLUMNS);
        Ok(conn
            .query_row(&sql, params![id], transaction_from_row)
            .optional()?)
    }

    /// Edit the description, amount or date of a transaction
    ///
    /// Categorization is untouched: the base category follows the MCC code and
    /// explicit reassignments, neither of which this changes.
    pub fn update_transaction(&self, id: i64, update: &TransactionUpdate) -> Result<Transaction> {
        ensure_id("transaction", id)?;
        if let Some(description) = &update.description {
            validate_description(description)?;
        }
        if let Some(amount) = update.amount {
            validate_amount(amount)?;
        }

        self.write(|tx| {
            let changed = tx.execute(
                r#"
                UPDATE transactions SET
                    description = COALESCE(?2, description),
                    amount = COALESCE(?3, amount),
                    date = COALESCE(?4, date)
                WHERE id = ?1
                "#,
                params![
                    id,
                    update.description.as_deref().map(str::trim),
                    update.amount,
                    update.date.map(|d| d.to_string()),
                ],
            )?;
            if changed == 0 {
                return Err(Error::NotFound(format!("Transaction {} not found", id)));
            }

            let sql = format!("SELECT {} FROM transactions t WHERE t.id = ?", TRANSACTION_COLUMNS);
            let updated = tx.query_row(&sql, params![id], transaction_from_row)?;
            info!("Updated transaction {}", id);
            Ok(updated)
        })
    }

    /// Delete a transaction; its membership rows go with it (ON DELETE CASCADE)
    pub fn delete_transaction(&self, id: i64) -> Result<()> {
        ensure_id("transaction", id)?;
        self.write(|tx| {
            let deleted = tx.execute("DELETE FROM transactions WHERE id = ?", params![id])?;
            if deleted == 0 {
                return Err(Error::NotFound(format!("Transaction {} not found", id)));
            }
            info!("Deleted transaction {}", id);
            Ok(())
        })
    }

    /// List transactions, newest first, optionally only those on or after `since`
    pub fn list_transactions(
        &self,
        user_id: Option<i64>,
        since: Option<NaiveDate>,
        page: Page,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM transactions t
            WHERE (?1 IS NULL OR t.user_id = ?1)
              AND (?2 IS NULL OR t.date >= ?2)
            ORDER BY t.date DESC, t.id DESC
            LIMIT ?3 OFFSET ?4
            "#,
            TRANSACTION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let transactions = stmt
            .query_map(
                params![user_id, since.map(|d| d.to_string()), page.limit, page.offset],
                transaction_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(transactions)
    }

    /// Transactions belonging to a category through any membership row, newest first
    pub fn find_transactions_by_category(
        &self,
        category_id: i64,
        owner_id: Option<i64>,
        page: Page,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM transactions t
            JOIN transaction_categories tc ON tc.transaction_id = t.id
            WHERE tc.category_id = ?1 AND (?2 IS NULL OR t.user_id = ?2)
            ORDER BY t.date DESC, t.id DESC
            LIMIT ?3 OFFSET ?4
            "#,
            TRANSACTION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let transactions = stmt
            .query_map(
                params![category_id, owner_id, page.limit, page.offset],
                transaction_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(transactions)
    }

    /// IDs of a user's transactions in a category (membership row or legacy base column)
    pub fn transaction_ids_by_category(&self, category_id: i64, user_id: i64) -> Result<Vec<i64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT t.id FROM transactions t
            WHERE t.user_id = ?2
              AND (t.category_id = ?1 OR EXISTS (
                  SELECT 1 FROM transaction_categories tc
                  WHERE tc.transaction_id = t.id AND tc.category_id = ?1
              ))
            ORDER BY t.id
            "#,
        )?;
        let ids = stmt
            .query_map(params![category_id, user_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// Membership rows of a transaction, base row first
    pub fn get_transaction_categories(&self, transaction_id: i64) -> Result<Vec<TransactionCategory>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT transaction_id, category_id, is_base_category
            FROM transaction_categories
            WHERE transaction_id = ?
            ORDER BY is_base_category DESC, category_id
            "#,
        )?;
        let rows = stmt
            .query_map(params![transaction_id], |row| {
                Ok(TransactionCategory {
                    transaction_id: row.get(0)?,
                    category_id: row.get(1)?,
                    is_base_category: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Number of transactions with a membership row for the category
    pub fn count_transactions_by_category(&self, category_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM transaction_categories WHERE category_id = ?",
            params![category_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
