//! Tally Core Library
//!
//! Category relationship and transaction-categorization engine:
//! - Category store with seeded built-in categories and user-owned custom ones
//! - Custom -> base relationships with a derived MCC code cache
//! - MCC-based categorization with a default fallback
//! - Membership reconciler for bulk base-category reassignment
//! - Deletion cascade with orphan reassignment
//! - Integrity checks and repair

pub mod categorize;
pub mod config;
pub mod db;
pub mod error;
pub mod mcc;
pub mod models;

/// Seeded fixtures shared by tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use categorize::{assign, match_mcc, AssignmentSource, CategoryAssignment, Categorizer};
pub use config::{BuiltinSeed, SeedConfig};
pub use db::{
    Database, DbStats, IntegrityReport, Offender, RepairResult, SeedResult,
    TransactionInsertResult,
};
pub use error::{Error, ErrorKind, Result};
pub use mcc::MccCodes;
