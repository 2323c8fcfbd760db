//! Status command implementation

use std::path::Path;

use anyhow::Result;

use super::open_db;

pub fn cmd_status(db_path: &Path, no_encrypt: bool) -> Result<()> {
    use std::fs;
    use tally_core::db::DB_KEY_ENV;

    println!();
    println!("📊 Tally Status");
    println!("   ─────────────────────────────────────────────────────────────");

    println!("   Database: {}", db_path.display());

    if db_path.exists() {
        if let Ok(metadata) = fs::metadata(db_path) {
            let size_kb = metadata.len() as f64 / 1024.0;
            if size_kb < 1024.0 {
                println!("   Size: {:.1} KB", size_kb);
            } else {
                println!("   Size: {:.1} MB", size_kb / 1024.0);
            }
        }
    } else {
        println!("   Size: (database not initialized)");
    }

    let has_key = std::env::var(DB_KEY_ENV).is_ok();
    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else if has_key {
        println!("   🔒 Encryption: ENABLED ({}=***)", DB_KEY_ENV);
    } else {
        println!("   ❌ Encryption: REQUIRED but {} not set", DB_KEY_ENV);
    }

    if !db_path.exists() {
        println!();
        println!("   Run 'tally init' to create the database.");
        return Ok(());
    }

    match open_db(db_path, no_encrypt) {
        Ok(db) => {
            let stats = db.stats()?;
            println!();
            println!("   Built-in categories: {}", stats.builtin_categories);
            println!("   Custom categories: {}", stats.custom_categories);
            println!("   Relationships: {}", stats.relationships);
            println!("   Transactions: {}", stats.transactions);
            println!("   Memberships: {}", stats.memberships);

            match db.get_default_category() {
                Ok(default) => println!("   Default category: {}", default.name),
                Err(_) => println!("   ❌ Default category: MISSING (run 'tally seed')"),
            }
        }
        Err(e) => {
            println!();
            println!("   ❌ Error opening database: {}", e);
            if !no_encrypt && !has_key {
                println!("      Set {} or use --no-encrypt", DB_KEY_ENV);
            } else if has_key {
                println!("      Check that {} is correct", DB_KEY_ENV);
            }
        }
    }

    Ok(())
}
