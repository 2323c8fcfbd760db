//! MCC-based categorization
//!
//! An incoming transaction's MCC code picks its base category: the first
//! built-in (in id order) whose code set contains it. No code, a zero code,
//! or an unclaimed code falls back to the default category.

use rusqlite::Connection;
use serde::Serialize;
use tracing::debug;

use crate::db::categories::{builtin_categories, default_category};
use crate::db::Database;
use crate::error::Result;
use crate::models::Category;

/// How a category was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssignmentSource {
    /// A built-in category claims the MCC code
    Mcc,
    /// Nothing matched; the default category was used
    Fallback,
}

impl AssignmentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mcc => "mcc",
            Self::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for AssignmentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of categorizing one MCC code
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryAssignment {
    pub category_id: i64,
    pub category_name: String,
    pub source: AssignmentSource,
}

/// First category (in slice order) whose codes contain `mcc`
pub fn match_mcc(categories: &[Category], mcc: i32) -> Option<&Category> {
    categories.iter().find(|c| c.mcc_codes.contains(mcc))
}

/// Pick the base category for `mcc` from a snapshot of the built-ins
pub fn assign(builtins: &[Category], default: &Category, mcc: Option<i32>) -> CategoryAssignment {
    if let Some(code) = mcc.filter(|c| *c != 0) {
        if let Some(category) = match_mcc(builtins, code) {
            debug!("MCC {} -> '{}'", code, category.name);
            return CategoryAssignment {
                category_id: category.id,
                category_name: category.name.clone(),
                source: AssignmentSource::Mcc,
            };
        }
        debug!("MCC {} is unclaimed, using '{}'", code, default.name);
    }

    CategoryAssignment {
        category_id: default.id,
        category_name: default.name.clone(),
        source: AssignmentSource::Fallback,
    }
}

pub(crate) fn categorize_on(conn: &Connection, mcc: Option<i32>) -> Result<CategoryAssignment> {
    // Resolve the default up front: without it the engine cannot promise a category
    let default = default_category(conn)?;
    let builtins = builtin_categories(conn)?;
    Ok(assign(&builtins, &default, mcc))
}

/// Categorization engine over the category store
pub struct Categorizer<'a> {
    db: &'a Database,
}

impl<'a> Categorizer<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Pick the base category for an MCC code
    pub fn categorize(&self, mcc: Option<i32>) -> Result<CategoryAssignment> {
        let conn = self.db.conn()?;
        categorize_on(&conn, mcc)
    }

    /// Categorize several codes against one snapshot of the built-ins
    pub fn categorize_many(&self, codes: &[Option<i32>]) -> Result<Vec<CategoryAssignment>> {
        let conn = self.db.conn()?;
        let default = default_category(&conn)?;
        let builtins = builtin_categories(&conn)?;

        Ok(codes
            .iter()
            .map(|mcc| assign(&builtins, &default, *mcc))
            .collect())
    }
}
