//! Test utilities for tally-core
//!
//! A small, seeded category set plus helpers for recording transactions.

use chrono::NaiveDate;

use crate::config::SeedConfig;
use crate::db::Database;
use crate::models::{Category, NewTransaction};

/// Seed set used by the tests: Coffee [5814], Groceries [5411],
/// Fuel [5541, 5542], Other (default)
pub const TEST_SEED: &str = r#"
[[categories]]
name = "Coffee"
mcc_codes = [5814]

[[categories]]
name = "Groceries"
mcc_codes = [5411]

[[categories]]
name = "Fuel"
mcc_codes = [5541, 5542]

[[categories]]
name = "Other"
mcc_codes = []
default = true
"#;

/// A seeded database with handles on its built-ins
pub struct Fixture {
    pub db: Database,
    pub coffee: Category,
    pub groceries: Category,
    pub fuel: Category,
    pub other: Category,
}

impl Fixture {
    pub fn new() -> Self {
        let db = Database::in_memory().expect("Failed to create test database");
        let config = SeedConfig::parse(TEST_SEED).expect("Test seed is valid");
        db.seed_builtin_categories(&config).expect("Seeding failed");

        Self {
            coffee: builtin(&db, "Coffee"),
            groceries: builtin(&db, "Groceries"),
            fuel: builtin(&db, "Fuel"),
            other: builtin(&db, "Other"),
            db,
        }
    }

    /// Record `count` transactions for `user_id` with the given MCC code
    pub fn record(&self, user_id: i64, mcc: Option<i32>, count: usize) -> Vec<i64> {
        (0..count)
            .map(|n| {
                let tx = new_transaction(user_id, mcc, &format!("MERCHANT {:?} #{}", mcc, n));
                self.db
                    .record_transaction(&tx)
                    .expect("Failed to record transaction")
                    .id()
            })
            .collect()
    }

    /// (category_id, is_base_category) rows of a transaction, base first
    pub fn memberships(&self, transaction_id: i64) -> Vec<(i64, bool)> {
        self.db
            .get_transaction_categories(transaction_id)
            .expect("Failed to load memberships")
            .into_iter()
            .map(|tc| (tc.category_id, tc.is_base_category))
            .collect()
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Look up a built-in category by name
pub fn builtin(db: &Database, name: &str) -> Category {
    db.list_builtin_categories()
        .expect("Failed to list built-ins")
        .into_iter()
        .find(|c| c.name == name)
        .unwrap_or_else(|| panic!("Built-in '{}' not seeded", name))
}

/// An expense on 2025-03-01
pub fn new_transaction(user_id: i64, mcc: Option<i32>, description: &str) -> NewTransaction {
    NewTransaction {
        user_id,
        description: description.to_string(),
        amount: -4.50,
        date: NaiveDate::from_ymd_opt(2025, 3, 1).expect("valid date"),
        mcc_code: mcc,
        transaction_type: None,
        external_id: None,
    }
}
