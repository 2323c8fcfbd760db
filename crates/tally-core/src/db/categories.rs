//! Category store: built-in seeding, custom categories, default lookup

use std::collections::BTreeSet;

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::{debug, info};

use super::{parse_datetime, relationships, Database};
use crate::config::SeedConfig;
use crate::error::{Error, Result};
use crate::mcc::MccCodes;
use crate::models::Category;

pub(crate) const CATEGORY_COLUMNS: &str =
    "id, name, mcc_codes, is_builtin, is_default, owner_id, created_at";

/// Outcome of seeding the built-in categories
#[derive(Debug, Clone, Default, Serialize)]
pub struct SeedResult {
    pub inserted: usize,
    pub updated: usize,
    pub custom_categories_recomputed: usize,
}

pub(crate) fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    let raw_codes: Option<String> = row.get(2)?;
    let mcc_codes = MccCodes::decode(raw_codes.as_deref())
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    let created_at_str: String = row.get(6)?;

    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        mcc_codes,
        is_builtin: row.get(3)?,
        is_default: row.get(4)?,
        owner_id: row.get(5)?,
        created_at: parse_datetime(&created_at_str),
    })
}

/// Reject ids that cannot name a row
pub(crate) fn ensure_id(what: &str, id: i64) -> Result<()> {
    if id <= 0 {
        return Err(Error::Validation(format!("Invalid {} id: {}", what, id)));
    }
    Ok(())
}

pub(crate) fn fetch_category(conn: &Connection, id: i64) -> Result<Option<Category>> {
    let sql = format!("SELECT {} FROM categories WHERE id = ?", CATEGORY_COLUMNS);
    Ok(conn
        .query_row(&sql, params![id], category_from_row)
        .optional()?)
}

pub(crate) fn require_category(conn: &Connection, id: i64) -> Result<Category> {
    ensure_id("category", id)?;
    fetch_category(conn, id)?
        .ok_or_else(|| Error::NotFound(format!("Category {} does not exist", id)))
}

/// Load a category that must be custom
pub(crate) fn require_custom(conn: &Connection, id: i64) -> Result<Category> {
    let category = require_category(conn, id)?;
    if category.is_builtin {
        return Err(Error::Validation(format!(
            "Category '{}' is built-in; expected a custom category",
            category.name
        )));
    }
    Ok(category)
}

/// Load a category that must be built-in (usable as a base)
pub(crate) fn require_builtin(conn: &Connection, id: i64) -> Result<Category> {
    let category = require_category(conn, id)?;
    if !category.is_builtin {
        return Err(Error::Validation(format!(
            "Category '{}' is custom and cannot be used as a base category",
            category.name
        )));
    }
    Ok(category)
}

/// The flagged fallback category
pub(crate) fn default_category(conn: &Connection) -> Result<Category> {
    let sql = format!(
        "SELECT {} FROM categories WHERE is_default = 1 AND is_builtin = 1",
        CATEGORY_COLUMNS
    );
    conn.query_row(&sql, [], category_from_row)
        .optional()?
        .ok_or_else(|| {
            Error::Configuration(
                "No default built-in category is configured; seed the built-in categories"
                    .to_string(),
            )
        })
}

/// Built-in categories in stable id order
pub(crate) fn builtin_categories(conn: &Connection) -> Result<Vec<Category>> {
    let sql = format!(
        "SELECT {} FROM categories WHERE is_builtin = 1 ORDER BY id",
        CATEGORY_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let categories = stmt
        .query_map([], category_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(categories)
}

/// Custom categories linked to `base_id`
pub(crate) fn linked_custom_ids(conn: &Connection, base_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT custom_category_id FROM category_relationships WHERE base_category_id = ? ORDER BY rowid",
    )?;
    let ids = stmt
        .query_map(params![base_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

fn clean_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Validation(
            "Category name must not be empty".to_string(),
        ));
    }
    Ok(name.to_string())
}

impl Database {
    /// Insert or refresh the built-in categories (idempotent)
    ///
    /// Built-ins are matched by name. Custom categories are never touched,
    /// except that their MCC cache is recomputed when a linked built-in's
    /// codes change.
    pub fn seed_builtin_categories(&self, config: &SeedConfig) -> Result<SeedResult> {
        self.write(|tx| {
            let mut result = SeedResult::default();
            let mut changed = Vec::new();

            for seed in &config.categories {
                let existing: Option<(i64, Option<String>)> = tx
                    .query_row(
                        "SELECT id, mcc_codes FROM categories WHERE is_builtin = 1 AND name = ?",
                        params![seed.name],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;

                match existing {
                    None => {
                        tx.execute(
                            r#"
                            INSERT INTO categories (name, mcc_codes, is_builtin, is_default, owner_id)
                            VALUES (?, ?, 1, 0, NULL)
                            "#,
                            params![seed.name, seed.mcc_codes.encode()],
                        )?;
                        debug!("Seeded built-in category '{}'", seed.name);
                        result.inserted += 1;
                    }
                    Some((id, raw)) => {
                        if MccCodes::decode(raw.as_deref())? != seed.mcc_codes {
                            tx.execute(
                                "UPDATE categories SET mcc_codes = ? WHERE id = ?",
                                params![seed.mcc_codes.encode(), id],
                            )?;
                            debug!("Refreshed MCC codes of '{}'", seed.name);
                            result.updated += 1;
                            changed.push(id);
                        }
                    }
                }
            }

            if let Some(default) = config.default_seed() {
                // Clear before setting so the single-default index never sees two
                tx.execute(
                    "UPDATE categories SET is_default = 0 WHERE is_default = 1 AND name != ?",
                    params![default.name],
                )?;
                tx.execute(
                    "UPDATE categories SET is_default = 1 WHERE is_builtin = 1 AND name = ?",
                    params![default.name],
                )?;
            }

            let mut customs = BTreeSet::new();
            for base_id in changed {
                customs.extend(linked_custom_ids(tx, base_id)?);
            }
            for custom_id in &customs {
                relationships::recompute_mcc_codes(tx, *custom_id)?;
            }
            result.custom_categories_recomputed = customs.len();

            info!(
                "Seeded built-in categories: {} inserted, {} updated, {} custom caches recomputed",
                result.inserted, result.updated, result.custom_categories_recomputed
            );
            Ok(result)
        })
    }

    /// Create a custom category for `owner_id`, linked to the given base categories
    pub fn create_custom_category(
        &self,
        owner_id: i64,
        name: &str,
        base_category_ids: &[i64],
    ) -> Result<Category> {
        ensure_id("owner", owner_id)?;
        let name = clean_name(name)?;

        self.write(|tx| {
            tx.execute(
                r#"
                INSERT INTO categories (name, mcc_codes, is_builtin, is_default, owner_id)
                VALUES (?, '[]', 0, 0, ?)
                "#,
                params![name, owner_id],
            )?;
            let id = tx.last_insert_rowid();
            let category = require_custom(tx, id)?;

            for base_id in base_category_ids {
                relationships::link(tx, &category, *base_id)?;
            }

            info!(
                "Created custom category '{}' ({}) for user {} with {} base categories",
                name,
                id,
                owner_id,
                base_category_ids.len()
            );
            require_custom(tx, id)
        })
    }

    /// Rename a custom category (built-ins are immutable)
    pub fn rename_category(&self, id: i64, name: &str) -> Result<Category> {
        let name = clean_name(name)?;

        self.write(|tx| {
            require_custom(tx, id)?;
            tx.execute(
                "UPDATE categories SET name = ? WHERE id = ? AND is_builtin = 0",
                params![name, id],
            )?;
            require_custom(tx, id)
        })
    }

    /// Get a category by ID
    pub fn get_category(&self, id: i64) -> Result<Option<Category>> {
        let conn = self.conn()?;
        fetch_category(&conn, id)
    }

    /// Built-in categories plus the owner's custom categories
    ///
    /// With no owner only the built-ins are returned.
    pub fn list_categories(&self, owner_id: Option<i64>) -> Result<Vec<Category>> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM categories
            WHERE is_builtin = 1 OR owner_id = ?
            ORDER BY is_builtin DESC, id
            "#,
            CATEGORY_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let categories = stmt
            .query_map(params![owner_id], category_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(categories)
    }

    pub fn list_builtin_categories(&self) -> Result<Vec<Category>> {
        let conn = self.conn()?;
        builtin_categories(&conn)
    }

    /// The fallback category (`Configuration` error when none is flagged)
    pub fn get_default_category(&self) -> Result<Category> {
        let conn = self.conn()?;
        default_category(&conn)
    }

    /// Base categories of a custom category, in link order
    pub fn list_base_categories(&self, custom_category_id: i64) -> Result<Vec<Category>> {
        let conn = self.conn()?;
        require_custom(&conn, custom_category_id)?;
        let sql = format!(
            r#"
            SELECT {} FROM categories c
            JOIN category_relationships r ON r.base_category_id = c.id
            WHERE r.custom_category_id = ?
            ORDER BY r.rowid
            "#,
            prefixed_columns("c")
        );
        let mut stmt = conn.prepare(&sql)?;
        let categories = stmt
            .query_map(params![custom_category_id], category_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(categories)
    }

    /// The owner's custom categories linked to a built-in
    pub fn list_linked_custom_categories(
        &self,
        base_category_id: i64,
        owner_id: i64,
    ) -> Result<Vec<Category>> {
        let conn = self.conn()?;
        require_builtin(&conn, base_category_id)?;
        let sql = format!(
            r#"
            SELECT {} FROM categories c
            JOIN category_relationships r ON r.custom_category_id = c.id
            WHERE r.base_category_id = ? AND c.owner_id = ?
            ORDER BY c.id
            "#,
            prefixed_columns("c")
        );
        let mut stmt = conn.prepare(&sql)?;
        let categories = stmt
            .query_map(params![base_category_id, owner_id], category_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(categories)
    }
}

/// `CATEGORY_COLUMNS` qualified with a table alias
fn prefixed_columns(alias: &str) -> String {
    CATEGORY_COLUMNS
        .split(", ")
        .map(|col| format!("{}.{}", alias, col))
        .collect::<Vec<_>>()
        .join(", ")
}
