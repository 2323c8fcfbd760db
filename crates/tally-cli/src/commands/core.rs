//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `cmd_init` - Initialize the database and seed built-ins
//! - `cmd_seed` - Re-apply the built-in seed
//! - `cmd_categorize` - Show the category an MCC code maps to

use std::path::Path;

use anyhow::{Context, Result};
use tally_core::{db::Database, AssignmentSource, Categorizer, SeedConfig};
use tracing::debug;

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path is not valid UTF-8")?;
    debug!("Opening database at {}", path_str);
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Load the seed set from --seed-config, the data-dir override, or the embedded defaults
pub fn load_seed_config(path: Option<&Path>) -> Result<SeedConfig> {
    SeedConfig::load(path).context("Failed to load built-in category seed")
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool, seed_path: Option<&Path>) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let db = open_db(db_path, no_encrypt)?;
    let config = load_seed_config(seed_path)?;
    let seeded = db
        .seed_builtin_categories(&config)
        .context("Failed to seed built-in categories")?;
    println!(
        "   Seeded {} built-in categories ({} new)",
        config.categories.len(),
        seeded.inserted
    );

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Create a custom category: tally categories create \"My Spending\" --owner 1 --base Groceries");
    println!("  2. Record a transaction: tally transactions record --user 1 -d \"CAFE\" -a -4.50 --mcc 5814");

    Ok(())
}

pub fn cmd_seed(db: &Database, seed_path: Option<&Path>) -> Result<()> {
    let config = load_seed_config(seed_path)?;
    let result = db.seed_builtin_categories(&config)?;

    println!(
        "✅ Built-in categories: {} inserted, {} updated",
        result.inserted, result.updated
    );
    if result.custom_categories_recomputed > 0 {
        println!(
            "   Recomputed MCC codes of {} custom categories",
            result.custom_categories_recomputed
        );
    }
    for (code, owners) in config.mcc_conflicts() {
        println!(
            "   ⚠️  MCC {} is claimed by {} (first wins)",
            code,
            owners.join(", ")
        );
    }

    Ok(())
}

pub fn cmd_categorize(db: &Database, mcc: Option<i32>) -> Result<()> {
    let assignment = Categorizer::new(db).categorize(mcc)?;

    let code = mcc.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string());
    match assignment.source {
        AssignmentSource::Mcc => println!(
            "MCC {} → {} (id: {})",
            code, assignment.category_name, assignment.category_id
        ),
        AssignmentSource::Fallback => println!(
            "MCC {} → {} (id: {}, default fallback)",
            code, assignment.category_name, assignment.category_id
        ),
    }

    Ok(())
}
