//! Tally CLI - Category graph and transaction categorization
//!
//! Usage:
//!   tally init                          Initialize database and seed built-ins
//!   tally categories create NAME -o 1   Create a custom category
//!   tally categories link NAME Coffee   Link it to a built-in
//!   tally transactions record ...       Record and auto-categorize a transaction
//!   tally doctor --repair               Check and repair consistency

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let seed_config = cli.seed_config.as_deref();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt, seed_config),
        Commands::Status => commands::cmd_status(&cli.db, cli.no_encrypt),
        Commands::Seed => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_seed(&db, seed_config)
        }
        Commands::Categorize { mcc } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_categorize(&db, mcc)
        }
        Commands::Categories { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_categories_list(&db, None),
                Some(CategoriesAction::List { owner }) => {
                    commands::cmd_categories_list(&db, owner)
                }
                Some(CategoriesAction::Show { category, owner }) => {
                    commands::cmd_categories_show(&db, &category, owner)
                }
                Some(CategoriesAction::Create { name, owner, bases }) => {
                    commands::cmd_categories_create(&db, owner, &name, &bases)
                }
                Some(CategoriesAction::Rename {
                    category,
                    name,
                    owner,
                }) => commands::cmd_categories_rename(&db, &category, &name, owner),
                Some(CategoriesAction::Link {
                    custom,
                    base,
                    owner,
                }) => commands::cmd_categories_link(&db, &custom, &base, owner),
                Some(CategoriesAction::Unlink {
                    custom,
                    base,
                    all,
                    owner,
                }) => {
                    if all {
                        commands::cmd_categories_unlink_all(&db, &custom, owner)
                    } else {
                        let base = base
                            .ok_or_else(|| anyhow::anyhow!("Specify a base category or --all"))?;
                        commands::cmd_categories_unlink(&db, &custom, &base, owner)
                    }
                }
                Some(CategoriesAction::SetBases {
                    custom,
                    bases,
                    owner,
                }) => commands::cmd_categories_set_bases(&db, &custom, &bases, owner),
                Some(CategoriesAction::Delete { category, owner }) => {
                    commands::cmd_categories_delete(&db, &category, owner)
                }
                Some(CategoriesAction::Retire { category }) => {
                    commands::cmd_categories_retire(&db, &category)
                }
            }
        }
        Commands::Transactions { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_transactions_list(&db, None, None, None, 20, 0),
                Some(TransactionsAction::List {
                    user,
                    category,
                    since,
                    limit,
                    offset,
                }) => commands::cmd_transactions_list(
                    &db,
                    user,
                    category.as_deref(),
                    since.as_deref(),
                    limit,
                    offset,
                ),
                Some(TransactionsAction::Record {
                    user,
                    description,
                    amount,
                    date,
                    mcc,
                    transaction_type,
                    reference,
                }) => commands::cmd_transactions_record(
                    &db,
                    &commands::RecordArgs {
                        user,
                        description: &description,
                        amount,
                        date: date.as_deref(),
                        mcc,
                        transaction_type: transaction_type.as_deref(),
                        reference: reference.as_deref(),
                    },
                ),
                Some(TransactionsAction::Show { id }) => commands::cmd_transactions_show(&db, id),
                Some(TransactionsAction::Update {
                    id,
                    description,
                    amount,
                    date,
                }) => commands::cmd_transactions_update(
                    &db,
                    id,
                    description.as_deref(),
                    amount,
                    date.as_deref(),
                ),
                Some(TransactionsAction::Delete { id }) => commands::cmd_transactions_delete(&db, id),
                Some(TransactionsAction::Recategorize { to, ids }) => {
                    commands::cmd_transactions_recategorize(&db, &to, &ids)
                }
            }
        }
        Commands::Doctor { repair, json } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_doctor(&db, repair, json)
        }
    }
}
