//! Category command implementations

use anyhow::{bail, Result};
use tally_core::db::Database;
use tally_core::models::Category;

use super::truncate;

/// Resolve a category argument: numeric ID, or a name among the built-ins
/// and the owner's custom categories
pub fn resolve_category_arg(db: &Database, arg: &str, owner: Option<i64>) -> Result<Category> {
    if let Ok(id) = arg.parse::<i64>() {
        return match db.get_category(id)? {
            Some(category) => Ok(category),
            None => bail!("Category not found: {}", id),
        };
    }

    let candidates = db.list_categories(owner)?;
    let mut matches = candidates
        .into_iter()
        .filter(|c| c.name.eq_ignore_ascii_case(arg.trim()));

    match (matches.next(), matches.next()) {
        (Some(category), None) => Ok(category),
        (Some(_), Some(_)) => bail!("Category name '{}' is ambiguous; use its ID", arg),
        (None, _) if owner.is_none() => bail!(
            "Category not found: {} (pass --owner to look up custom categories)",
            arg
        ),
        (None, _) => bail!("Category not found: {}", arg),
    }
}

fn resolve_bases(db: &Database, args: &[String]) -> Result<Vec<i64>> {
    args.iter()
        .map(|arg| resolve_category_arg(db, arg, None).map(|c| c.id))
        .collect()
}

fn describe_codes(category: &Category) -> String {
    if category.mcc_codes.is_empty() {
        "-".to_string()
    } else {
        category
            .mcc_codes
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

pub fn cmd_categories_list(db: &Database, owner: Option<i64>) -> Result<()> {
    let categories = db.list_categories(owner)?;

    if categories.is_empty() {
        println!("No categories found. Run 'tally init' to seed the built-in categories.");
        return Ok(());
    }

    println!();
    println!("📂 Categories");
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   {:>5}  {:<24}  {:<8}  MCC codes", "ID", "Name", "Kind");

    for category in &categories {
        let kind = if category.is_default {
            "default"
        } else if category.is_builtin {
            "built-in"
        } else {
            "custom"
        };
        println!(
            "   {:>5}  {:<24}  {:<8}  {}",
            category.id,
            truncate(&category.name, 24),
            kind,
            truncate(&describe_codes(category), 40)
        );
    }

    Ok(())
}

pub fn cmd_categories_show(db: &Database, arg: &str, owner: Option<i64>) -> Result<()> {
    let category = resolve_category_arg(db, arg, owner)?;

    println!();
    println!("📂 {} (id: {})", category.name, category.id);
    println!("   ─────────────────────────────────────────────────────────────");
    if category.is_builtin {
        println!(
            "   Kind: built-in{}",
            if category.is_default { " (default)" } else { "" }
        );
    } else {
        println!(
            "   Kind: custom (owner {})",
            category.owner_id.unwrap_or_default()
        );
    }
    println!("   MCC codes: {}", describe_codes(&category));
    println!(
        "   Transactions: {}",
        db.count_transactions_by_category(category.id)?
    );

    if category.is_custom() {
        let bases = db.list_base_categories(category.id)?;
        if bases.is_empty() {
            println!("   Base categories: (none)");
        } else {
            println!("   Base categories:");
            for base in bases {
                println!("     • {} [{}]", base.name, describe_codes(&base));
            }
        }
    } else if let Some(owner) = owner {
        let linked = db.list_linked_custom_categories(category.id, owner)?;
        if !linked.is_empty() {
            println!("   Linked custom categories:");
            for custom in linked {
                println!("     • {} (id: {})", custom.name, custom.id);
            }
        }
    }

    Ok(())
}

pub fn cmd_categories_create(
    db: &Database,
    owner: i64,
    name: &str,
    bases: &[String],
) -> Result<()> {
    let base_ids = resolve_bases(db, bases)?;
    let category = db.create_custom_category(owner, name, &base_ids)?;

    println!(
        "✅ Created custom category '{}' (id: {})",
        category.name, category.id
    );
    println!("   MCC codes: {}", describe_codes(&category));

    Ok(())
}

pub fn cmd_categories_rename(
    db: &Database,
    arg: &str,
    name: &str,
    owner: Option<i64>,
) -> Result<()> {
    let category = resolve_category_arg(db, arg, owner)?;
    let renamed = db.rename_category(category.id, name)?;
    println!("✅ Renamed '{}' → '{}'", category.name, renamed.name);
    Ok(())
}

pub fn cmd_categories_link(
    db: &Database,
    custom_arg: &str,
    base_arg: &str,
    owner: Option<i64>,
) -> Result<()> {
    let custom = resolve_category_arg(db, custom_arg, owner)?;
    let base = resolve_category_arg(db, base_arg, None)?;
    let result = db.add_relationship(custom.id, base.id)?;

    if result.created {
        println!("✅ Linked '{}' → '{}'", custom.name, base.name);
    } else {
        println!("'{}' was already linked to '{}'", custom.name, base.name);
    }
    println!("   MCC codes: {}", result.mcc_codes);
    println!("   Memberships added: {}", result.memberships_added);

    Ok(())
}

pub fn cmd_categories_unlink(
    db: &Database,
    custom_arg: &str,
    base_arg: &str,
    owner: Option<i64>,
) -> Result<()> {
    let custom = resolve_category_arg(db, custom_arg, owner)?;
    let base = resolve_category_arg(db, base_arg, None)?;
    let result = db.remove_relationship(custom.id, base.id)?;

    if result.relationships_removed == 0 {
        println!("'{}' was not linked to '{}'", custom.name, base.name);
    } else {
        println!("✅ Unlinked '{}' from '{}'", custom.name, base.name);
    }
    println!("   MCC codes: {}", result.mcc_codes);
    println!("   Memberships removed: {}", result.memberships_removed);
    if result.orphans_reassigned > 0 {
        println!(
            "   ⚠️  {} orphaned transactions moved to the default category",
            result.orphans_reassigned
        );
    }

    Ok(())
}

pub fn cmd_categories_unlink_all(db: &Database, custom_arg: &str, owner: Option<i64>) -> Result<()> {
    let custom = resolve_category_arg(db, custom_arg, owner)?;
    let result = db.remove_all_relationships(custom.id)?;

    println!(
        "✅ Removed {} links from '{}' ({} memberships removed)",
        result.relationships_removed, custom.name, result.memberships_removed
    );

    Ok(())
}

pub fn cmd_categories_set_bases(
    db: &Database,
    custom_arg: &str,
    bases: &[String],
    owner: Option<i64>,
) -> Result<()> {
    let custom = resolve_category_arg(db, custom_arg, owner)?;
    let base_ids = resolve_bases(db, bases)?;
    let updated = db.set_base_categories(custom.id, &base_ids)?;

    println!("✅ '{}' now has {} base categories", updated.name, base_ids.len());
    println!("   MCC codes: {}", describe_codes(&updated));

    Ok(())
}

pub fn cmd_categories_delete(db: &Database, arg: &str, owner: Option<i64>) -> Result<()> {
    let category = resolve_category_arg(db, arg, owner)?;
    if category.is_builtin {
        bail!(
            "'{}' is a built-in category. Use 'tally categories retire' to remove it.",
            category.name
        );
    }

    let result = db.delete_category(category.id)?;
    println!("✅ Deleted category '{}'", category.name);
    println!("   Relationships removed: {}", result.relationships_removed);
    println!("   Memberships removed: {}", result.memberships_removed);

    Ok(())
}

pub fn cmd_categories_retire(db: &Database, arg: &str) -> Result<()> {
    let category = resolve_category_arg(db, arg, None)?;
    let result = db.retire_builtin_category(category.id)?;

    println!("✅ Retired built-in category '{}'", category.name);
    println!(
        "   Transactions moved to the default: {}",
        result.transactions_reassigned
    );
    println!(
        "   Custom categories recomputed: {}",
        result.custom_categories_recomputed
    );

    Ok(())
}
