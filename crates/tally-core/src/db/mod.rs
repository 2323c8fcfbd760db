//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `categories` - Category store (built-in seeding, custom categories, default lookup)
//! - `relationships` - Custom -> base links and the derived MCC cache
//! - `reconcile` - Membership reconciler (bulk base-category reassignment)
//! - `lifecycle` - Category deletion cascade and orphan reassignment
//! - `transactions` - Transaction recording and membership queries
//! - `integrity` - Invariant checks and drift repair
//!
//! Every operation that touches more than one row runs inside a single
//! `BEGIN IMMEDIATE` transaction (see [`Database::write`]) and is rolled back
//! as a whole on error.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::TransactionBehavior;
use serde::Serialize;
use tracing::info;

use crate::error::{Error, Result};

pub(crate) mod categories;
mod integrity;
pub(crate) mod lifecycle;
pub(crate) mod reconcile;
pub(crate) mod relationships;
mod transactions;

pub use categories::SeedResult;
pub use integrity::{IntegrityReport, Offender, RepairResult};
pub use transactions::{generate_import_hash, TransactionInsertResult};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "TALLY_DB_KEY";

/// How long a connection waits on a locked database before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Changing this invalidates every existing encrypted database
    const APP_SALT: &[u8; 16] = b"tally-salt-v1-ok";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // SQLite stores as "YYYY-MM-DD HH:MM:SS" format
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Parse a stored `YYYY-MM-DD` date inside a row mapper
pub(crate) fn parse_date(idx: usize, s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Row counts for status output
#[derive(Debug, Clone, Serialize)]
pub struct DbStats {
    pub builtin_categories: i64,
    pub custom_categories: i64,
    pub relationships: i64,
    pub transactions: i64,
    pub memberships: i64,
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `TALLY_DB_KEY` environment variable to be set.
    /// Use `new_unencrypted()` for development/testing without encryption.
    pub fn new(path: &str) -> Result<Self> {
        match std::env::var(DB_KEY_ENV).ok() {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let key_pragma = match passphrase {
            Some(pass) => Some(format!("PRAGMA key = 'x\"{}\"';", derive_key(pass)?)),
            None => None,
        };

        // Runs on every new pooled connection; the key has to come first
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            if let Some(pragma) = &key_pragma {
                conn.execute_batch(pragma)?;
            }
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        });

        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create a throw-away database (for testing)
    ///
    /// Uses a temporary file rather than `:memory:` so every pooled connection
    /// sees the same data.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "tally_test_{}_{}.db",
            std::process::id(),
            id
        ));

        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path.to_string_lossy())
    }

    /// Check if the database is encrypted
    pub fn is_encrypted(&self) -> Result<bool> {
        let conn = self.conn()?;
        // SQLCipher sets cipher_version if encryption is active
        let result: rusqlite::Result<String> =
            conn.query_row("PRAGMA cipher_version;", [], |row| row.get(0));
        Ok(result.is_ok() && std::env::var(DB_KEY_ENV).is_ok())
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run `f` as one all-or-nothing unit
    ///
    /// The write lock is taken up front (`BEGIN IMMEDIATE`) so reads that feed
    /// a mutation cannot be invalidated by another writer mid-way. Returning an
    /// error drops the transaction, which rolls it back.
    pub(crate) fn write<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Row counts per table
    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.conn()?;
        let count = |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [], |row| row.get(0))?) };

        Ok(DbStats {
            builtin_categories: count("SELECT COUNT(*) FROM categories WHERE is_builtin = 1")?,
            custom_categories: count("SELECT COUNT(*) FROM categories WHERE is_builtin = 0")?,
            relationships: count("SELECT COUNT(*) FROM category_relationships")?,
            transactions: count("SELECT COUNT(*) FROM transactions")?,
            memberships: count("SELECT COUNT(*) FROM transaction_categories")?,
        })
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- WAL mode: readers don't block the single writer
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- Categories: built-in (shared, seeded) and custom (owned by a user)
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL CHECK (length(trim(name)) > 0),
                mcc_codes TEXT NOT NULL DEFAULT '[]',      -- compact JSON array, e.g. [5411,5499]
                is_builtin BOOLEAN NOT NULL DEFAULT 0,
                is_default BOOLEAN NOT NULL DEFAULT 0,     -- fallback category, built-in only
                owner_id INTEGER,                          -- custom categories only
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                CHECK ((is_builtin = 1 AND owner_id IS NULL) OR (is_builtin = 0 AND owner_id IS NOT NULL)),
                CHECK (is_default = 0 OR is_builtin = 1)
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_categories_single_default
                ON categories(is_default) WHERE is_default = 1;
            CREATE UNIQUE INDEX IF NOT EXISTS idx_categories_builtin_name
                ON categories(name) WHERE is_builtin = 1;
            CREATE INDEX IF NOT EXISTS idx_categories_owner ON categories(owner_id);

            -- Custom -> base links. No ON DELETE CASCADE: deleting a category
            -- has to go through the lifecycle cascade.
            CREATE TABLE IF NOT EXISTS category_relationships (
                custom_category_id INTEGER NOT NULL REFERENCES categories(id),
                base_category_id INTEGER NOT NULL REFERENCES categories(id),
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (custom_category_id, base_category_id),
                CHECK (custom_category_id != base_category_id)
            );

            CREATE INDEX IF NOT EXISTS idx_category_relationships_base
                ON category_relationships(base_category_id);

            -- Transactions (category_id is the built-in base category)
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                description TEXT NOT NULL,
                amount REAL NOT NULL,
                date DATE NOT NULL,
                mcc_code INTEGER,
                transaction_type TEXT NOT NULL,            -- Expense, Income
                category_id INTEGER NOT NULL REFERENCES categories(id),
                is_manually_categorized BOOLEAN NOT NULL DEFAULT 0,
                external_id TEXT,                          -- statement reference, if any
                import_hash TEXT UNIQUE,                   -- NULL without external_id
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions(user_id);
            CREATE INDEX IF NOT EXISTS idx_transactions_category ON transactions(category_id);
            CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date);

            -- Transaction-Category membership (many-to-many)
            CREATE TABLE IF NOT EXISTS transaction_categories (
                transaction_id INTEGER NOT NULL REFERENCES transactions(id) ON DELETE CASCADE,
                category_id INTEGER NOT NULL REFERENCES categories(id),
                is_base_category BOOLEAN NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (transaction_id, category_id)
            );

            CREATE INDEX IF NOT EXISTS idx_transaction_categories_category
                ON transaction_categories(category_id);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_transaction_categories_single_base
                ON transaction_categories(transaction_id) WHERE is_base_category = 1;
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}
