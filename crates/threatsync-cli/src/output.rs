//! Terminal output formatting.

use colored::{ColoredString, Colorize};
use threatsync_etl::{MigrationStats, ValidationReport};

fn count_cell(n: usize, width: usize, warn: bool) -> ColoredString {
    let cell = format!("{:>width$}", n);
    if n == 0 {
        cell.dimmed()
    } else if warn {
        cell.yellow()
    } else {
        cell.normal()
    }
}

/// Print per-table migrated / skipped / failed counts.
pub fn print_migration_stats(stats: &MigrationStats) {
    println!();
    println!(
        "{} {}",
        "Migration complete".green().bold(),
        format!("(run {}, scope {})", stats.run_id, stats.scope).dimmed()
    );
    println!("{}", "─".repeat(64));
    println!("{:<34} {:>9} {:>9} {:>9}", "Table", "Migrated", "Skipped", "Failed");
    println!("{}", "─".repeat(64));

    for phase in &stats.phases {
        println!(
            "{:<34} {} {} {}",
            phase.phase,
            count_cell(phase.migrated(), 9, false).green(),
            count_cell(phase.skipped(), 9, true),
            count_cell(phase.failed(), 9, true),
        );
    }

    println!("{}", "─".repeat(64));
    println!(
        "{:<34} {:>9} {:>9} {:>9}",
        "Total".bold(),
        stats.migrated(),
        stats.skipped(),
        stats.failed()
    );
}

/// Print the validation checklist and any notes.
pub fn print_validation_report(report: &ValidationReport) {
    println!("{}", "Validation".bold());
    println!("{}", "─".repeat(40));
    for (name, ok) in &report.checks {
        let mark = if *ok { "✓".green() } else { "✗".red() };
        println!("  {} {}", mark, name);
    }

    if !report.notes.is_empty() {
        println!();
        for note in &report.notes {
            println!("  {} {}", "·".dimmed(), note.dimmed());
        }
    }

    println!();
    if report.passed() {
        println!("{}", "All checks passed.".green());
    } else {
        println!("{} {}", "Failed checks:".red().bold(), report.failures().join(", "));
    }
}

/// Print row counts for every destination table.
pub fn print_table_counts(counts: &[(&str, i64)]) {
    println!("  {:<34} {:>9}", "Table", "Rows");
    println!("  {}", "─".repeat(44));
    for (table, n) in counts {
        let cell = format!("{:>9}", n);
        let cell = if *n == 0 { cell.dimmed() } else { cell.cyan() };
        println!("  {:<34} {}", table, cell);
    }
}
