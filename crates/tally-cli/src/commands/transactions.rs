//! Transaction command implementations

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tally_core::db::{Database, TransactionInsertResult};
use tally_core::models::{
    NewTransaction, Page, ReassignOrigin, Transaction, TransactionType, TransactionUpdate,
};

use super::{resolve_category_arg, truncate};

fn parse_date_arg(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))
}

/// Arguments of `transactions record`
#[derive(Debug, Clone, Default)]
pub struct RecordArgs<'a> {
    pub user: i64,
    pub description: &'a str,
    pub amount: f64,
    /// YYYY-MM-DD, defaults to today
    pub date: Option<&'a str>,
    pub mcc: Option<i32>,
    pub transaction_type: Option<&'a str>,
    /// Statement reference used to skip redeliveries
    pub reference: Option<&'a str>,
}

fn print_transactions(db: &Database, transactions: &[Transaction]) -> Result<()> {
    println!(
        "   {:>6}  {:<10}  {:<30}  {:>10}  {:<20}",
        "ID", "Date", "Description", "Amount", "Category"
    );
    for tx in transactions {
        let category = db
            .get_category(tx.category_id)?
            .map(|c| c.name)
            .unwrap_or_else(|| format!("#{}", tx.category_id));
        let marker = if tx.is_manually_categorized { "*" } else { "" };
        println!(
            "   {:>6}  {:<10}  {:<30}  {:>10.2}  {}{}",
            tx.id,
            tx.date,
            truncate(&tx.description, 30),
            tx.amount,
            truncate(&category, 20),
            marker
        );
    }
    Ok(())
}

pub fn cmd_transactions_list(
    db: &Database,
    user: Option<i64>,
    category: Option<&str>,
    since: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<()> {
    let page = Page { limit, offset };
    let since = since.map(parse_date_arg).transpose()?;
    let transactions = match category {
        Some(_) if since.is_some() => anyhow::bail!("--since cannot be combined with --category"),
        Some(arg) => {
            let category = resolve_category_arg(db, arg, user)?;
            db.find_transactions_by_category(category.id, user, page)?
        }
        None => db.list_transactions(user, since, page)?,
    };

    if transactions.is_empty() {
        println!("No transactions found.");
        return Ok(());
    }

    println!();
    println!("💳 Transactions");
    println!("   ─────────────────────────────────────────────────────────────");
    print_transactions(db, &transactions)?;
    println!();
    println!("   * manually categorized");

    Ok(())
}

pub fn cmd_transactions_record(db: &Database, args: &RecordArgs<'_>) -> Result<()> {
    let date = match args.date {
        Some(s) => parse_date_arg(s)?,
        None => chrono::Local::now().date_naive(),
    };
    let transaction_type = args
        .transaction_type
        .map(|s| s.parse::<TransactionType>())
        .transpose()
        .map_err(|e| anyhow::anyhow!(e))?;

    let new = NewTransaction {
        user_id: args.user,
        description: args.description.to_string(),
        amount: args.amount,
        date,
        mcc_code: args.mcc,
        transaction_type,
        external_id: args.reference.map(str::to_string),
    };

    match db.record_transaction(&new)? {
        TransactionInsertResult::Inserted(id) => {
            let tx = db
                .get_transaction(id)?
                .context("Recorded transaction disappeared")?;
            let category = db
                .get_category(tx.category_id)?
                .map(|c| c.name)
                .unwrap_or_default();
            println!("✅ Recorded transaction {} as '{}'", id, category);
        }
        TransactionInsertResult::Duplicate(id) => {
            println!("Skipped duplicate of transaction {}", id);
        }
    }

    Ok(())
}

pub fn cmd_transactions_show(db: &Database, id: i64) -> Result<()> {
    let tx = db
        .get_transaction(id)?
        .with_context(|| format!("Transaction not found: {}", id))?;

    println!();
    println!("💳 Transaction {}", tx.id);
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   User: {}", tx.user_id);
    println!("   Date: {}", tx.date);
    println!("   Description: {}", tx.description);
    println!("   Amount: {:.2} ({})", tx.amount, tx.transaction_type);
    if let Some(mcc) = tx.mcc_code {
        println!("   MCC: {}", mcc);
    }
    if let Some(reference) = &tx.external_id {
        println!("   Reference: {}", reference);
    }
    println!(
        "   Manually categorized: {}",
        if tx.is_manually_categorized { "yes" } else { "no" }
    );

    println!("   Categories:");
    for membership in db.get_transaction_categories(tx.id)? {
        let name = db
            .get_category(membership.category_id)?
            .map(|c| c.name)
            .unwrap_or_else(|| format!("#{}", membership.category_id));
        let role = if membership.is_base_category {
            "base"
        } else {
            "custom"
        };
        println!("     • {} ({})", name, role);
    }

    Ok(())
}

pub fn cmd_transactions_update(
    db: &Database,
    id: i64,
    description: Option<&str>,
    amount: Option<f64>,
    date: Option<&str>,
) -> Result<()> {
    let update = TransactionUpdate {
        description: description.map(str::to_string),
        amount,
        date: date.map(parse_date_arg).transpose()?,
    };
    if update.is_empty() {
        anyhow::bail!("Nothing to update: pass --description, --amount or --date");
    }

    let tx = db.update_transaction(id, &update)?;
    println!(
        "✅ Updated transaction {}: {} {} {:.2}",
        tx.id, tx.date, tx.description, tx.amount
    );
    Ok(())
}

pub fn cmd_transactions_delete(db: &Database, id: i64) -> Result<()> {
    db.delete_transaction(id)?;
    println!("🗑️  Deleted transaction {}", id);
    Ok(())
}

pub fn cmd_transactions_recategorize(db: &Database, to: &str, ids: &[i64]) -> Result<()> {
    let category = resolve_category_arg(db, to, None)?;
    let result = db.update_base_category_for_transactions(category.id, ids, ReassignOrigin::User)?;

    println!(
        "✅ Moved {} transactions to '{}'",
        result.transactions_updated, category.name
    );
    println!(
        "   Custom memberships: +{} / -{}",
        result.memberships_added, result.memberships_removed
    );

    Ok(())
}
