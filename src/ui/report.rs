use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use crate::migrator::MigrationReport;
use crate::ui::{Icons, theme};

#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "Metric")]
    metric: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

/// Render the report counters as a table
pub fn report_table(report: &MigrationReport) -> String {
    let rows = vec![
        ReportRow { metric: "Migrated", value: report.migrated.to_string() },
        ReportRow { metric: "Skipped", value: report.skipped.len().to_string() },
        ReportRow { metric: "Failed", value: report.failed.len().to_string() },
        ReportRow { metric: "Cleared", value: report.cleared.to_string() },
    ];
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Print a human-readable summary of a finished run
pub fn print_report(report: &MigrationReport, database: &std::path::Path) {
    println!(
        "{} {}",
        Icons::ROCKET,
        format!("Migrated ranks from {}", report.source.display()).style(theme().header.clone())
    );
    println!(
        "{} {}",
        Icons::DATABASE,
        database.display().to_string().style(theme().dim.clone())
    );
    println!("{}", report_table(report));

    for skipped in &report.skipped {
        println!(
            "{} {}",
            Icons::WARN,
            format!("Skipped user {}: {}", skipped.id, skipped.reason).style(theme().warn.clone())
        );
    }
    for id in &report.failed {
        println!(
            "{} {}",
            Icons::CROSS,
            format!("Failed to write user {}", id).style(theme().error.clone())
        );
    }

    if report.source_deleted {
        println!("{} {}", Icons::CHECK, "Source file deleted".style(theme().success.clone()));
    } else if !report.failed.is_empty() {
        println!(
            "{} {}",
            Icons::WARN,
            "Source file kept, rerun after fixing the failed users".style(theme().warn.clone())
        );
    } else {
        println!(
            "{} {}",
            Icons::WARN,
            "Users migrated but the source file could not be deleted".style(theme().warn.clone())
        );
    }
}
