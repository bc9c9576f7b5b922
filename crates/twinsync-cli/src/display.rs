//! Report rendering for the terminal

use console::style;
use twinsync_engine::SyncReport;

/// Print a human-readable summary of one synchronization run
pub fn render_report(report: &SyncReport) {
    println!();
    if report.dry_run {
        println!("{}", style("Dry run - nothing was modified").yellow().bold());
    }
    if report.first_run {
        println!("{}", style("First run: bootstrapped from live trees").dim());
    }
    println!(
        "{} {}",
        style("✓").green().bold(),
        style("Synchronization complete").bold()
    );
    println!(
        "  Applied to target: {}",
        style(report.stats.applied_to_target).green()
    );
    println!(
        "  Applied to source: {}",
        style(report.stats.applied_to_source).green()
    );
    println!("  Conflicts: {}", style(report.stats.conflicts).cyan());
    println!(
        "  Duration: {}",
        style(format!("{:.2?}", report.stats.duration)).dim()
    );

    if !report.failed.is_empty() {
        println!();
        println!(
            "{} {} change(s) failed preconditions and will re-derive next run:",
            style("!").yellow().bold(),
            report.failed.len()
        );
        for failure in &report.failed {
            println!(
                "  {} {} ({:?}): {}",
                style("-").dim(),
                failure.path,
                failure.direction,
                style(&failure.reason).red()
            );
        }
    }
}
