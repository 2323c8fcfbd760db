//! Category deletion cascade and orphan reassignment
//!
//! Order of a deletion: transactions based on the category are moved to the
//! default first, then relationship and membership rows go, and the category
//! row is deleted last.

use std::collections::BTreeSet;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use super::categories::{default_category, ensure_id, require_builtin, require_category};
use super::reconcile::{reassign_base, set_base_row, sync_custom_memberships};
use super::relationships::recompute_mcc_codes;
use super::Database;
use crate::error::{Error, Result};
use crate::models::{Category, DeleteCategoryResult, ReassignOrigin};

fn has_memberships(conn: &Connection, transaction_id: i64) -> Result<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM transaction_categories WHERE transaction_id = ? LIMIT 1",
            params![transaction_id],
            |_| Ok(true),
        )
        .optional()?
        .unwrap_or(false))
}

/// Give every listed transaction without any membership a base row on `default_id`
///
/// Transactions that still have a membership row are left alone.
pub(crate) fn reassign_orphans(conn: &Connection, transaction_ids: &[i64], default_id: i64) -> Result<usize> {
    let default = require_builtin(conn, default_id)?;
    let mut reassigned = 0;

    for &transaction_id in transaction_ids.iter().collect::<BTreeSet<_>>() {
        ensure_id("transaction", transaction_id)?;
        if has_memberships(conn, transaction_id)? {
            continue;
        }

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

        // Keep transactions.category_id and the base row in agreement
        conn.execute(
            "UPDATE transactions SET category_id = ? WHERE id = ?",
            params![default.id, transaction_id],
        )?;
        set_base_row(conn, transaction_id, default.id)?;
        sync_custom_memberships(conn, transaction_id, user_id, default.id)?;

        debug!("Orphaned transaction {} moved to '{}'", transaction_id, default.name);
        reassigned += 1;
    }

    Ok(reassigned)
}

/// Backfill orphans among `transaction_ids`, resolving the default only when needed
pub(crate) fn backfill_orphans(conn: &Connection, transaction_ids: &[i64]) -> Result<usize> {
    let mut orphans = Vec::new();
    for &id in transaction_ids {
        if !has_memberships(conn, id)? {
            orphans.push(id);
        }
    }
    if orphans.is_empty() {
        return Ok(0);
    }

    warn!("{} transactions lost their last membership", orphans.len());
    let default = default_category(conn)?;
    reassign_orphans(conn, &orphans, default.id)
}

fn transactions_based_on(conn: &Connection, category_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id FROM transactions WHERE category_id = ?1
        UNION
        SELECT transaction_id FROM transaction_categories
        WHERE category_id = ?1 AND is_base_category = 1
        ORDER BY 1
        "#,
    )?;
    let ids = stmt
        .query_map(params![category_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

fn delete_custom(conn: &Connection, category: &Category) -> Result<DeleteCategoryResult> {
    // A custom category is never a base; anything pointing at one is drift
    let based = transactions_based_on(conn, category.id)?;
    let mut memberships_removed = 0;
    if !based.is_empty() {
        warn!(
            "{} transactions use custom category '{}' as their base; moving them to the default",
            based.len(),
            category.name
        );
        let default = default_category(conn)?;
        memberships_removed += reassign_base(conn, default.id, &based, ReassignOrigin::System)?
            .memberships_removed;
    }

    let members: Vec<i64> = {
        let mut stmt =
            conn.prepare("SELECT transaction_id FROM transaction_categories WHERE category_id = ?")?;
        let ids = stmt
            .query_map(params![category.id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        ids
    };

    memberships_removed += conn.execute(
        "DELETE FROM transaction_categories WHERE category_id = ?",
        params![category.id],
    )?;
    backfill_orphans(conn, &members)?;

    let relationships_removed = conn.execute(
        "DELETE FROM category_relationships WHERE custom_category_id = ?",
        params![category.id],
    )?;
    conn.execute("DELETE FROM categories WHERE id = ?", params![category.id])?;

    Ok(DeleteCategoryResult {
        deleted_category_id: category.id,
        transactions_reassigned: based.len(),
        relationships_removed,
        memberships_removed,
        custom_categories_recomputed: 0,
    })
}

fn delete_builtin(conn: &Connection, category: &Category) -> Result<DeleteCategoryResult> {
    if category.is_default {
        return Err(Error::Validation(format!(
            "'{}' is the default category and cannot be retired",
            category.name
        )));
    }
    let default = default_category(conn)?;

    let based = transactions_based_on(conn, category.id)?;
    let mut memberships_removed = 0;
    if !based.is_empty() {
        memberships_removed += reassign_base(conn, default.id, &based, ReassignOrigin::System)?
            .memberships_removed;
    }

    // Stray non-base rows pointing at the built-in
    memberships_removed += conn.execute(
        "DELETE FROM transaction_categories WHERE category_id = ?",
        params![category.id],
    )?;

    let customs: Vec<i64> = {
        let mut stmt = conn.prepare(
            "SELECT custom_category_id FROM category_relationships WHERE base_category_id = ?",
        )?;
        let ids = stmt
            .query_map(params![category.id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        ids
    };
    let relationships_removed = conn.execute(
        "DELETE FROM category_relationships WHERE base_category_id = ?",
        params![category.id],
    )?;
    for custom_id in &customs {
        recompute_mcc_codes(conn, *custom_id)?;
    }

    conn.execute("DELETE FROM categories WHERE id = ?", params![category.id])?;

    Ok(DeleteCategoryResult {
        deleted_category_id: category.id,
        transactions_reassigned: based.len(),
        relationships_removed,
        memberships_removed,
        custom_categories_recomputed: customs.len(),
    })
}

impl Database {
    /// Delete a custom category with its links and memberships
    ///
    /// Built-in categories are rejected; see [`Database::retire_builtin_category`].
    pub fn delete_category(&self, category_id: i64) -> Result<DeleteCategoryResult> {
        let result = self.write(|tx| {
            let category = require_category(tx, category_id)?;
            if category.is_builtin {
                return Err(Error::Validation(format!(
                    "Built-in category '{}' cannot be deleted",
                    category.name
                )));
            }
            delete_custom(tx, &category)
        })?;

        info!(
            "Deleted category {}: {} relationships, {} memberships removed",
            category_id, result.relationships_removed, result.memberships_removed
        );
        Ok(result)
    }

    /// Operator-only removal of a built-in category
    ///
    /// Transactions based on it move to the default category (without marking
    /// them manually categorized), linked custom categories lose the link and
    /// get their MCC cache recomputed, then the row is deleted. Fails with a
    /// `Configuration` error when there is no default to move them to.
    pub fn retire_builtin_category(&self, category_id: i64) -> Result<DeleteCategoryResult> {
        let result = self.write(|tx| {
            let category = require_builtin(tx, category_id)?;
            delete_builtin(tx, &category)
        })?;

        info!(
            "Retired built-in category {}: {} transactions moved to the default, {} custom categories recomputed",
            category_id, result.transactions_reassigned, result.custom_categories_recomputed
        );
        Ok(result)
    }

    /// Give transactions with no membership row at all a base row on `default_category_id`
    pub fn reassign_orphaned_transactions(
        &self,
        transaction_ids: &[i64],
        default_category_id: i64,
    ) -> Result<usize> {
        if transaction_ids.is_empty() {
            return Ok(0);
        }
        let reassigned =
            self.write(|tx| reassign_orphans(tx, transaction_ids, default_category_id))?;
        if reassigned > 0 {
            info!("Reassigned {} orphaned transactions", reassigned);
        }
        Ok(reassigned)
    }
}
