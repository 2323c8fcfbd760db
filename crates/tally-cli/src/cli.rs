//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tally - Keep transaction categories consistent
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Category graph and transaction categorization for personal finance", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "tally.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set TALLY_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    /// Built-in category seed file (defaults to the data-dir override, then the embedded set)
    #[arg(long, global = true)]
    pub seed_config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database and seed the built-in categories
    Init,

    /// Re-apply the built-in category seed (idempotent)
    Seed,

    /// Show database status
    Status,

    /// Manage categories and their base links
    Categories {
        #[command(subcommand)]
        action: Option<CategoriesAction>,
    },

    /// Show which built-in category an MCC code maps to
    Categorize {
        /// Merchant category code (omit for the default category)
        mcc: Option<i32>,
    },

    /// Record, inspect and recategorize transactions
    Transactions {
        #[command(subcommand)]
        action: Option<TransactionsAction>,
    },

    /// Check consistency invariants
    Doctor {
        /// Repair drift after checking
        #[arg(long)]
        repair: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum CategoriesAction {
    /// List built-in categories (and a user's custom ones)
    List {
        /// Include this user's custom categories
        #[arg(short, long)]
        owner: Option<i64>,
    },

    /// Show one category with its links
    Show {
        /// Category name or ID
        category: String,

        /// Owner used to resolve custom category names
        #[arg(short, long)]
        owner: Option<i64>,
    },

    /// Create a custom category
    Create {
        /// Name of the new category
        name: String,

        /// Owning user
        #[arg(short, long)]
        owner: i64,

        /// Built-in base categories to link (name or ID, repeatable)
        #[arg(short, long = "base")]
        bases: Vec<String>,
    },

    /// Rename a custom category
    Rename {
        /// Category name or ID
        category: String,

        /// New name
        name: String,

        #[arg(short, long)]
        owner: Option<i64>,
    },

    /// Link a custom category to a built-in base
    Link {
        /// Custom category name or ID
        custom: String,

        /// Built-in category name or ID
        base: String,

        #[arg(short, long)]
        owner: Option<i64>,
    },

    /// Remove a link (or all links with --all)
    Unlink {
        /// Custom category name or ID
        custom: String,

        /// Built-in category name or ID
        #[arg(required_unless_present = "all")]
        base: Option<String>,

        /// Remove every link of the custom category
        #[arg(long, conflicts_with = "base")]
        all: bool,

        #[arg(short, long)]
        owner: Option<i64>,
    },

    /// Replace the full base set of a custom category
    SetBases {
        /// Custom category name or ID
        custom: String,

        /// Built-in categories (name or ID)
        bases: Vec<String>,

        #[arg(short, long)]
        owner: Option<i64>,
    },

    /// Delete a custom category
    Delete {
        /// Category name or ID
        category: String,

        #[arg(short, long)]
        owner: Option<i64>,
    },

    /// Remove a built-in category, moving its transactions to the default
    Retire {
        /// Built-in category name or ID
        category: String,
    },
}

#[derive(Subcommand)]
pub enum TransactionsAction {
    /// List recent transactions
    List {
        /// Only this user's transactions
        #[arg(short, long)]
        user: Option<i64>,

        /// Only members of this category (name or ID)
        #[arg(short, long)]
        category: Option<String>,

        /// Only transactions on or after this date (YYYY-MM-DD)
        #[arg(short, long, conflicts_with = "category")]
        since: Option<String>,

        /// Number of transactions to show
        #[arg(short, long, default_value = "20")]
        limit: i64,

        /// Number of transactions to skip
        #[arg(long, default_value = "0")]
        offset: i64,
    },

    /// Record a transaction and categorize it by MCC code
    Record {
        #[arg(short, long)]
        user: i64,

        #[arg(short, long)]
        description: String,

        /// Amount (negative for expenses)
        #[arg(short, long, allow_hyphen_values = true)]
        amount: f64,

        /// Date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,

        /// Merchant category code
        #[arg(short, long)]
        mcc: Option<i32>,

        /// Expense or Income (derived from the amount sign when omitted)
        #[arg(short = 't', long = "type")]
        transaction_type: Option<String>,

        /// Statement reference; recording the same reference again is skipped
        #[arg(short, long = "ref")]
        reference: Option<String>,
    },

    /// Show a transaction with its memberships
    Show {
        /// Transaction ID
        id: i64,
    },

    /// Edit a transaction's description, amount or date
    Update {
        /// Transaction ID
        id: i64,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long, allow_hyphen_values = true)]
        amount: Option<f64>,

        /// Date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
    },

    /// Delete a transaction and its category memberships
    Delete {
        /// Transaction ID
        id: i64,
    },

    /// Move transactions to another built-in base category
    Recategorize {
        /// Built-in category name or ID
        #[arg(long)]
        to: String,

        /// Transaction IDs
        #[arg(required = true)]
        ids: Vec<i64>,
    },
}
