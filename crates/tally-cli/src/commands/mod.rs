//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `categories` - Category commands (list, create, link/unlink, delete, retire)
//! - `core` - Core commands (init, seed, categorize) and shared utilities (open_db)
//! - `doctor` - Integrity check and repair
//! - `status` - Status command
//! - `transactions` - Transaction commands (list, record, show, update, delete, recategorize)

pub mod categories;
pub mod core;
pub mod doctor;
pub mod status;
pub mod transactions;

// Re-export command functions for main.rs
pub use categories::*;
pub use self::core::*;
pub use doctor::*;
pub use status::*;
pub use transactions::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
