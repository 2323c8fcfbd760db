//! Membership reconciler
//!
//! Moves transactions to a new base category and brings their custom
//! memberships in line with it. For a transaction owned by user U with base
//! category B, the valid custom memberships are exactly U's custom categories
//! linked to B. Everything else with `is_base_category = 0` is stale.

use std::collections::HashSet;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::categories::{ensure_id, require_builtin};
use super::Database;
use crate::error::{Error, Result};
use crate::models::{ReassignOrigin, ReconcileResult};

/// Drop stale custom memberships and add the missing valid ones
pub(crate) fn sync_custom_memberships(
    conn: &Connection,
    transaction_id: i64,
    user_id: i64,
    base_id: i64,
) -> Result<ReconcileResult> {
    let memberships_removed = conn.execute(
        r#"
        DELETE FROM transaction_categories
        WHERE transaction_id = ?1 AND is_base_category = 0
          AND category_id NOT IN (
              SELECT r.custom_category_id FROM category_relationships r
              JOIN categories c ON c.id = r.custom_category_id
              WHERE r.base_category_id = ?2 AND c.owner_id = ?3
          )
        "#,
        params![transaction_id, base_id, user_id],
    )?;

    let memberships_added = conn.execute(
        r#"
        INSERT INTO transaction_categories (transaction_id, category_id, is_base_category)
        SELECT ?1, r.custom_category_id, 0 FROM category_relationships r
        JOIN categories c ON c.id = r.custom_category_id
        WHERE r.base_category_id = ?2 AND c.owner_id = ?3
        ON CONFLICT(transaction_id, category_id) DO NOTHING
        "#,
        params![transaction_id, base_id, user_id],
    )?;

    Ok(ReconcileResult {
        transactions_updated: 0,
        memberships_added,
        memberships_removed,
    })
}

/// Point the single base row of a transaction at `base_id`
pub(crate) fn set_base_row(conn: &Connection, transaction_id: i64, base_id: i64) -> Result<()> {
    conn.execute(
        "DELETE FROM transaction_categories WHERE transaction_id = ? AND is_base_category = 1 AND category_id != ?",
        params![transaction_id, base_id],
    )?;
    conn.execute(
        r#"
        INSERT INTO transaction_categories (transaction_id, category_id, is_base_category)
        VALUES (?, ?, 1)
        ON CONFLICT(transaction_id, category_id) DO UPDATE SET is_base_category = 1
        "#,
        params![transaction_id, base_id],
    )?;
    Ok(())
}

/// Reassign the base category of every listed transaction
///
/// Runs on the caller's transaction; any failure propagates and the caller's
/// rollback discards every earlier step.
pub(crate) fn reassign_base(
    conn: &Connection,
    new_category_id: i64,
    transaction_ids: &[i64],
    origin: ReassignOrigin,
) -> Result<ReconcileResult> {
    if transaction_ids.is_empty() {
        return Err(Error::Validation(
            "At least one transaction id is required".to_string(),
        ));
    }
    let target = require_builtin(conn, new_category_id)?;
    let manual = origin == ReassignOrigin::User;

    let mut seen = HashSet::new();
    let mut result = ReconcileResult::default();

    for &transaction_id in transaction_ids {
        if !seen.insert(transaction_id) {
            continue;
        }
        ensure_id("transaction", transaction_id)?;

        let user_id: i64 = conn
            .query_row(
                "SELECT user_id FROM transactions WHERE id = ?",
                params![transaction_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| {
                Error::NotFound(format!("Transaction {} does not exist", transaction_id))
            })?;

        conn.execute(
            r#"
            UPDATE transactions
            SET category_id = ?1,
                is_manually_categorized = CASE WHEN ?2 THEN 1 ELSE is_manually_categorized END
            WHERE id = ?3
            "#,
            params![target.id, manual, transaction_id],
        )?;
        set_base_row(conn, transaction_id, target.id)?;

        let synced = sync_custom_memberships(conn, transaction_id, user_id, target.id)?;
        debug!(
            "Transaction {} -> '{}' (+{} / -{} custom memberships)",
            transaction_id, target.name, synced.memberships_added, synced.memberships_removed
        );
        result.absorb(synced);
        result.transactions_updated += 1;
    }

    Ok(result)
}

impl Database {
    /// Bulk-reassign the base category of transactions, all or nothing
    ///
    /// Reassigning to the current category is allowed and re-normalizes the
    /// custom memberships.
    pub fn update_base_category_for_transactions(
        &self,
        new_category_id: i64,
        transaction_ids: &[i64],
        origin: ReassignOrigin,
    ) -> Result<ReconcileResult> {
        let result = self.write(|tx| reassign_base(tx, new_category_id, transaction_ids, origin))?;
        info!(
            "Reassigned {} transactions to category {} (+{} / -{} custom memberships)",
            result.transactions_updated,
            new_category_id,
            result.memberships_added,
            result.memberships_removed
        );
        Ok(result)
    }

    /// Manually set one transaction's base category
    pub fn set_transaction_category(
        &self,
        transaction_id: i64,
        category_id: i64,
    ) -> Result<ReconcileResult> {
        self.update_base_category_for_transactions(
            category_id,
            &[transaction_id],
            ReassignOrigin::User,
        )
    }
}
