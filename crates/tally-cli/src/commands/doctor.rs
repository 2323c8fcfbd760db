//! Integrity check and repair command

use anyhow::Result;
use tally_core::db::{Database, IntegrityReport, Offender};

fn print_section(title: &str, offenders: &[Offender]) {
    if offenders.is_empty() {
        return;
    }
    println!("   ❌ {} ({})", title, offenders.len());
    for offender in offenders.iter().take(10) {
        println!("      #{}: {}", offender.id, offender.detail);
    }
    if offenders.len() > 10 {
        println!("      ... and {} more", offenders.len() - 10);
    }
}

fn print_report(report: &IntegrityReport) {
    println!();
    println!("🩺 Integrity Check");
    println!("   ─────────────────────────────────────────────────────────────");

    if !report.has_default_category {
        println!("   ❌ No default category configured (run 'tally seed')");
    }
    print_section("Stale custom MCC caches", &report.stale_mcc_caches);
    print_section("Orphaned transactions", &report.orphaned_transactions);
    print_section("Base row count violations", &report.base_row_violations);
    print_section("Base row mismatches", &report.base_mismatches);
    print_section("Non-built-in base categories", &report.non_builtin_bases);
    print_section("Cross-user memberships", &report.cross_owner_memberships);
    print_section("Stale custom memberships", &report.unexpected_memberships);
    print_section("Missing custom memberships", &report.missing_memberships);
    print_section("MCC codes claimed twice", &report.mcc_conflicts);

    if report.is_clean() {
        println!("   ✅ All invariants hold");
    }
}

pub fn cmd_doctor(db: &Database, repair: bool, json: bool) -> Result<()> {
    let report = db.check_integrity()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !repair || report.is_clean() {
        return Ok(());
    }

    let result = db.repair_integrity()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!();
    println!("🔧 Repair");
    println!("   MCC caches recomputed: {}", result.mcc_caches_recomputed);
    println!("   Orphans reassigned: {}", result.orphans_reassigned);
    println!(
        "   Transactions normalized: {} (+{} / -{} memberships)",
        result.transactions_normalized, result.memberships_added, result.memberships_removed
    );

    let after = db.check_integrity()?;
    if after.is_clean() {
        println!("   ✅ All invariants hold");
    } else {
        // MCC conflicts between built-ins live in the seed file, not the data
        println!(
            "   ⚠️  {} issues remain; fix the seed config and run 'tally seed'",
            after.issue_count()
        );
    }

    Ok(())
}
