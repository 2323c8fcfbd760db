//! Custom -> base category links and the derived MCC cache
//!
//! A custom category's `mcc_codes` is a cache of the union of its base
//! categories' codes. It is recomputed synchronously inside every mutation
//! that changes the link set, never lazily.

use rusqlite::{params, Connection};
use tracing::{debug, info};

use super::categories::{require_builtin, require_custom};
use super::{lifecycle, Database};
use crate::error::{Error, Result};
use crate::mcc::MccCodes;
use crate::models::{Category, LinkResult, UnlinkResult};

/// Union of the linked base categories' codes, in link order
pub(crate) fn derived_mcc_codes(conn: &Connection, custom_id: i64) -> Result<MccCodes> {
    let mut stmt = conn.prepare(
        r#"
        SELECT c.mcc_codes FROM category_relationships r
        JOIN categories c ON c.id = r.base_category_id
        WHERE r.custom_category_id = ?
        ORDER BY r.rowid
        "#,
    )?;
    let stored = stmt
        .query_map(params![custom_id], |row| row.get::<_, Option<String>>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut merged = MccCodes::new();
    for raw in stored {
        merged.extend_from(&MccCodes::decode(raw.as_deref())?);
    }
    Ok(merged)
}

/// Recompute and persist a custom category's MCC cache
pub(crate) fn recompute_mcc_codes(conn: &Connection, custom_id: i64) -> Result<MccCodes> {
    let merged = derived_mcc_codes(conn, custom_id)?;
    let updated = conn.execute(
        "UPDATE categories SET mcc_codes = ? WHERE id = ? AND is_builtin = 0",
        params![merged.encode(), custom_id],
    )?;
    if updated == 0 {
        return Err(Error::ConsistencyConflict(format!(
            "Custom category {} disappeared while its MCC codes were recomputed",
            custom_id
        )));
    }
    debug!("Custom category {} now carries MCC codes {}", custom_id, merged);
    Ok(merged)
}

fn owner_of(custom: &Category) -> Result<i64> {
    custom.owner_id.ok_or_else(|| {
        Error::InvalidData(format!("Custom category {} has no owner", custom.id))
    })
}

/// Link a custom category to a built-in and add the implied memberships
pub(crate) fn link(conn: &Connection, custom: &Category, base_id: i64) -> Result<LinkResult> {
    let base = require_builtin(conn, base_id)?;
    let owner_id = owner_of(custom)?;

    let created = conn.execute(
        r#"
        INSERT INTO category_relationships (custom_category_id, base_category_id)
        VALUES (?, ?)
        ON CONFLICT DO NOTHING
        "#,
        params![custom.id, base.id],
    )? > 0;

    let mcc_codes = recompute_mcc_codes(conn, custom.id)?;

    // Owner's transactions based on this built-in, by base row or legacy column
    let memberships_added = conn.execute(
        r#"
        INSERT INTO transaction_categories (transaction_id, category_id, is_base_category)
        SELECT t.id, ?1, 0 FROM transactions t
        WHERE t.user_id = ?2
          AND (t.category_id = ?3 OR EXISTS (
              SELECT 1 FROM transaction_categories b
              WHERE b.transaction_id = t.id AND b.category_id = ?3 AND b.is_base_category = 1
          ))
        ON CONFLICT(transaction_id, category_id) DO NOTHING
        "#,
        params![custom.id, owner_id, base.id],
    )?;

    debug!(
        "Linked '{}' -> '{}' (new link: {}, memberships added: {})",
        custom.name, base.name, created, memberships_added
    );

    Ok(LinkResult {
        created,
        mcc_codes,
        memberships_added,
    })
}

/// Remove one link and the memberships it implied
pub(crate) fn unlink(conn: &Connection, custom: &Category, base_id: i64) -> Result<UnlinkResult> {
    let base = require_builtin(conn, base_id)?;

    let affected = member_ids(
        conn,
        r#"
        SELECT tc.transaction_id FROM transaction_categories tc
        JOIN transactions t ON t.id = tc.transaction_id
        WHERE tc.category_id = ?1 AND tc.is_base_category = 0
          AND (t.category_id = ?2 OR EXISTS (
              SELECT 1 FROM transaction_categories b
              WHERE b.transaction_id = t.id AND b.category_id = ?2 AND b.is_base_category = 1
          ))
        "#,
        params![custom.id, base.id],
    )?;

    let relationships_removed = conn.execute(
        "DELETE FROM category_relationships WHERE custom_category_id = ? AND base_category_id = ?",
        params![custom.id, base.id],
    )?;
    let mcc_codes = recompute_mcc_codes(conn, custom.id)?;
    let memberships_removed = delete_memberships(conn, custom.id, &affected)?;
    let orphans_reassigned = lifecycle::backfill_orphans(conn, &affected)?;

    debug!(
        "Unlinked '{}' -> '{}' ({} memberships removed)",
        custom.name, base.name, memberships_removed
    );

    Ok(UnlinkResult {
        relationships_removed,
        mcc_codes,
        memberships_removed,
        orphans_reassigned,
    })
}

/// Remove every link of a custom category and all of its memberships
pub(crate) fn unlink_all(conn: &Connection, custom: &Category) -> Result<UnlinkResult> {
    let affected = member_ids(
        conn,
        "SELECT transaction_id FROM transaction_categories WHERE category_id = ?1",
        params![custom.id],
    )?;

    let relationships_removed = conn.execute(
        "DELETE FROM category_relationships WHERE custom_category_id = ?",
        params![custom.id],
    )?;
    let mcc_codes = recompute_mcc_codes(conn, custom.id)?;
    let memberships_removed = conn.execute(
        "DELETE FROM transaction_categories WHERE category_id = ?",
        params![custom.id],
    )?;
    let orphans_reassigned = lifecycle::backfill_orphans(conn, &affected)?;

    Ok(UnlinkResult {
        relationships_removed,
        mcc_codes,
        memberships_removed,
        orphans_reassigned,
    })
}

fn member_ids(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map(params, |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

fn delete_memberships(conn: &Connection, category_id: i64, transaction_ids: &[i64]) -> Result<usize> {
    let mut stmt = conn.prepare(
        "DELETE FROM transaction_categories WHERE transaction_id = ? AND category_id = ? AND is_base_category = 0",
    )?;
    let mut removed = 0;
    for id in transaction_ids {
        removed += stmt.execute(params![id, category_id])?;
    }
    Ok(removed)
}

impl Database {
    /// Link a custom category to a built-in base category (idempotent)
    pub fn add_relationship(&self, custom_category_id: i64, base_category_id: i64) -> Result<LinkResult> {
        self.write(|tx| {
            let custom = require_custom(tx, custom_category_id)?;
            let result = link(tx, &custom, base_category_id)?;
            info!(
                "Linked custom category {} to base {}: {} memberships added",
                custom_category_id, base_category_id, result.memberships_added
            );
            Ok(result)
        })
    }

    /// Remove one custom -> base link
    ///
    /// Removing a link that does not exist is a no-op apart from
    /// re-normalizing the MCC cache.
    pub fn remove_relationship(
        &self,
        custom_category_id: i64,
        base_category_id: i64,
    ) -> Result<UnlinkResult> {
        self.write(|tx| {
            let custom = require_custom(tx, custom_category_id)?;
            let result = unlink(tx, &custom, base_category_id)?;
            info!(
                "Unlinked custom category {} from base {}: {} memberships removed",
                custom_category_id, base_category_id, result.memberships_removed
            );
            Ok(result)
        })
    }

    /// Remove every link of a custom category
    pub fn remove_all_relationships(&self, custom_category_id: i64) -> Result<UnlinkResult> {
        self.write(|tx| {
            let custom = require_custom(tx, custom_category_id)?;
            let result = unlink_all(tx, &custom)?;
            info!(
                "Removed {} links of custom category {} ({} memberships removed)",
                result.relationships_removed, custom_category_id, result.memberships_removed
            );
            Ok(result)
        })
    }

    /// Replace the full base set of a custom category
    pub fn set_base_categories(
        &self,
        custom_category_id: i64,
        base_category_ids: &[i64],
    ) -> Result<Category> {
        self.write(|tx| {
            let custom = require_custom(tx, custom_category_id)?;

            // Every base must be valid before any link changes
            for base_id in base_category_ids {
                require_builtin(tx, *base_id)?;
            }

            let current: Vec<i64> = {
                let mut stmt = tx.prepare(
                    "SELECT base_category_id FROM category_relationships WHERE custom_category_id = ? ORDER BY rowid",
                )?;
                let ids = stmt
                    .query_map(params![custom.id], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<i64>>>()?;
                ids
            };

            let mut removed = 0;
            for base_id in current.iter().filter(|id| !base_category_ids.contains(id)) {
                removed += unlink(tx, &custom, *base_id)?.relationships_removed;
            }
            let mut added = 0;
            for base_id in base_category_ids {
                if link(tx, &custom, *base_id)?.created {
                    added += 1;
                }
            }

            info!(
                "Replaced base set of custom category {}: {} added, {} removed",
                custom.id, added, removed
            );
            require_custom(tx, custom.id)
        })
    }
}
