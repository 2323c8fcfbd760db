//! Invariant checks over the category graph and memberships, plus repair

use std::collections::BTreeMap;

use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::{info, warn};

use super::categories::{builtin_categories, default_category, CATEGORY_COLUMNS};
use super::lifecycle::reassign_orphans;
use super::reconcile::reassign_base;
use super::relationships::{derived_mcc_codes, recompute_mcc_codes};
use super::{categories, Database};
use crate::error::Result;
use crate::models::{ReassignOrigin, ReconcileResult};

/// One row that breaks an invariant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Offender {
    /// Category id for category checks, transaction id otherwise
    pub id: i64,
    pub detail: String,
}

/// Offenders per invariant; empty lists mean the invariant holds
#[derive(Debug, Clone, Default, Serialize)]
pub struct IntegrityReport {
    /// Custom categories whose cached codes differ from the union of their bases
    pub stale_mcc_caches: Vec<Offender>,
    /// Transactions without any membership row
    pub orphaned_transactions: Vec<Offender>,
    /// Transactions with zero or several base rows
    pub base_row_violations: Vec<Offender>,
    /// Base row disagrees with `transactions.category_id`
    pub base_mismatches: Vec<Offender>,
    /// Transactions whose base category is not built-in
    pub non_builtin_bases: Vec<Offender>,
    /// Custom memberships owned by a different user than the transaction
    pub cross_owner_memberships: Vec<Offender>,
    /// Custom memberships not implied by the base category's links
    pub unexpected_memberships: Vec<Offender>,
    /// Implied custom memberships that are missing
    pub missing_memberships: Vec<Offender>,
    /// MCC codes claimed by several built-ins
    pub mcc_conflicts: Vec<Offender>,
    /// Whether a default category is configured
    pub has_default_category: bool,
}

impl IntegrityReport {
    pub fn issue_count(&self) -> usize {
        self.stale_mcc_caches.len()
            + self.orphaned_transactions.len()
            + self.base_row_violations.len()
            + self.base_mismatches.len()
            + self.non_builtin_bases.len()
            + self.cross_owner_memberships.len()
            + self.unexpected_memberships.len()
            + self.missing_memberships.len()
            + self.mcc_conflicts.len()
            + usize::from(!self.has_default_category)
    }

    pub fn is_clean(&self) -> bool {
        self.issue_count() == 0
    }
}

/// Counts from a repair run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RepairResult {
    pub mcc_caches_recomputed: usize,
    pub orphans_reassigned: usize,
    pub transactions_normalized: usize,
    pub memberships_added: usize,
    pub memberships_removed: usize,
}

fn offenders(
    conn: &Connection,
    sql: &str,
    describe: impl Fn(i64) -> String,
) -> Result<Vec<Offender>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows
        .into_iter()
        .map(|(id, value)| Offender {
            id,
            detail: describe(value),
        })
        .collect())
}

fn custom_category_ids(conn: &Connection) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM categories WHERE is_builtin = 0 ORDER BY id")?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

fn check(conn: &Connection) -> Result<IntegrityReport> {
    let mut report = IntegrityReport::default();

    let sql = format!(
        "SELECT {} FROM categories WHERE is_builtin = 0 ORDER BY id",
        CATEGORY_COLUMNS
    );
    let customs = {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], categories::category_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };
    for custom in customs {
        let expected = derived_mcc_codes(conn, custom.id)?;
        if !custom.mcc_codes.same_codes(&expected) {
            report.stale_mcc_caches.push(Offender {
                id: custom.id,
                detail: format!("cached {} but links imply {}", custom.mcc_codes, expected),
            });
        }
    }

    report.orphaned_transactions = offenders(
        conn,
        r#"
        SELECT t.id, t.category_id FROM transactions t
        WHERE NOT EXISTS (SELECT 1 FROM transaction_categories tc WHERE tc.transaction_id = t.id)
        "#,
        |base| format!("no membership rows (base column {})", base),
    )?;

    report.base_row_violations = offenders(
        conn,
        r#"
        SELECT t.id, COUNT(tc.category_id) FROM transactions t
        LEFT JOIN transaction_categories tc
            ON tc.transaction_id = t.id AND tc.is_base_category = 1
        GROUP BY t.id
        HAVING COUNT(tc.category_id) != 1
        "#,
        |count| format!("{} base rows", count),
    )?;

    report.base_mismatches = offenders(
        conn,
        r#"
        SELECT t.id, tc.category_id FROM transactions t
        JOIN transaction_categories tc
            ON tc.transaction_id = t.id AND tc.is_base_category = 1
        WHERE tc.category_id != t.category_id
        "#,
        |row_category| format!("base row points at category {}", row_category),
    )?;

    report.non_builtin_bases = offenders(
        conn,
        r#"
        SELECT t.id, t.category_id FROM transactions t
        LEFT JOIN categories c ON c.id = t.category_id
        WHERE c.id IS NULL OR c.is_builtin = 0
        "#,
        |category| format!("base category {} is not built-in", category),
    )?;

    report.cross_owner_memberships = offenders(
        conn,
        r#"
        SELECT tc.transaction_id, tc.category_id FROM transaction_categories tc
        JOIN transactions t ON t.id = tc.transaction_id
        JOIN categories c ON c.id = tc.category_id
        WHERE tc.is_base_category = 0 AND c.is_builtin = 0 AND c.owner_id != t.user_id
        "#,
        |category| format!("member of another user's category {}", category),
    )?;

    report.unexpected_memberships = offenders(
        conn,
        r#"
        SELECT tc.transaction_id, tc.category_id FROM transaction_categories tc
        JOIN transactions t ON t.id = tc.transaction_id
        WHERE tc.is_base_category = 0
          AND NOT EXISTS (
              SELECT 1 FROM category_relationships r
              JOIN categories c ON c.id = r.custom_category_id
              WHERE r.custom_category_id = tc.category_id
                AND r.base_category_id = t.category_id
                AND c.owner_id = t.user_id
          )
        "#,
        |category| format!("stale membership in category {}", category),
    )?;

    report.missing_memberships = offenders(
        conn,
        r#"
        SELECT t.id, r.custom_category_id FROM transactions t
        JOIN category_relationships r ON r.base_category_id = t.category_id
        JOIN categories c ON c.id = r.custom_category_id AND c.owner_id = t.user_id
        WHERE NOT EXISTS (
            SELECT 1 FROM transaction_categories tc
            WHERE tc.transaction_id = t.id AND tc.category_id = r.custom_category_id
        )
        "#,
        |category| format!("missing membership in category {}", category),
    )?;

    let mut claims: BTreeMap<i32, Vec<(i64, String)>> = BTreeMap::new();
    for category in builtin_categories(conn)? {
        for code in category.mcc_codes.iter() {
            claims
                .entry(*code)
                .or_default()
                .push((category.id, category.name.clone()));
        }
    }
    for (code, owners) in claims.into_iter().filter(|(_, o)| o.len() > 1) {
        let names: Vec<&str> = owners.iter().map(|(_, n)| n.as_str()).collect();
        report.mcc_conflicts.push(Offender {
            id: owners[0].0,
            detail: format!("MCC {} claimed by {}", code, names.join(", ")),
        });
    }

    report.has_default_category = default_category(conn).is_ok();

    Ok(report)
}

impl Database {
    /// Check every consistency invariant and list the offending rows
    pub fn check_integrity(&self) -> Result<IntegrityReport> {
        let conn = self.conn()?;
        let report = check(&conn)?;
        if report.is_clean() {
            info!("Integrity check passed");
        } else {
            warn!("Integrity check found {} issues", report.issue_count());
        }
        Ok(report)
    }

    /// Recompute caches, backfill orphans and re-normalize every transaction
    ///
    /// Runs as one unit. Transactions whose base is not a built-in move to the
    /// default category. Manual-categorization flags are left alone.
    pub fn repair_integrity(&self) -> Result<RepairResult> {
        let result = self.write(|tx| {
            let mut result = RepairResult::default();

            for custom_id in custom_category_ids(tx)? {
                let before: Option<String> = tx.query_row(
                    "SELECT mcc_codes FROM categories WHERE id = ?",
                    params![custom_id],
                    |row| row.get(0),
                )?;
                let after = recompute_mcc_codes(tx, custom_id)?;
                if before.as_deref() != Some(after.encode().as_str()) {
                    result.mcc_caches_recomputed += 1;
                }
            }

            let default = default_category(tx)?;

            let orphans: Vec<i64> = {
                let mut stmt = tx.prepare(
                    r#"
                    SELECT t.id FROM transactions t
                    WHERE NOT EXISTS (SELECT 1 FROM transaction_categories tc WHERE tc.transaction_id = t.id)
                    "#,
                )?;
                let ids = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<i64>>>()?;
                ids
            };
            result.orphans_reassigned = reassign_orphans(tx, &orphans, default.id)?;

            // Group by the base each transaction should end up with
            let mut groups: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
            {
                let mut stmt = tx.prepare(
                    r#"
                    SELECT t.id, t.category_id, COALESCE(c.is_builtin, 0)
                    FROM transactions t
                    LEFT JOIN categories c ON c.id = t.category_id
                    "#,
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, bool>(2)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                for (id, category_id, is_builtin) in rows {
                    let target = if is_builtin { category_id } else { default.id };
                    groups.entry(target).or_default().push(id);
                }
            }

            let mut reconciled = ReconcileResult::default();
            for (target, ids) in &groups {
                reconciled.absorb(reassign_base(tx, *target, ids, ReassignOrigin::System)?);
            }
            result.transactions_normalized = reconciled.transactions_updated;
            result.memberships_added = reconciled.memberships_added;
            result.memberships_removed = reconciled.memberships_removed;

            Ok(result)
        })?;

        info!(
            "Repair: {} caches recomputed, {} orphans reassigned, {} transactions normalized",
            result.mcc_caches_recomputed, result.orphans_reassigned, result.transactions_normalized
        );
        Ok(result)
    }
}
