use crate::domain::result::{MigrationResult, PhaseStatus};
use colored::*;
use tabled::settings::{object::Columns, Alignment, Modify, Style};
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct TableRow {
    table: String,
    #[tabled(rename = "plain rows")]
    plain_rows: String,
    #[tabled(rename = "plain")]
    plain_status: String,
    lobs: String,
    #[tabled(rename = "lob")]
    lob_status: String,
}

fn paint_status(status: PhaseStatus) -> String {
    match status {
        PhaseStatus::Full => "full".green().to_string(),
        PhaseStatus::Partial => "partial".yellow().to_string(),
        PhaseStatus::None => "none".dimmed().to_string(),
    }
}

pub fn print_summary(result: &MigrationResult) {
    println!();
    println!("{}", "DBFERRY MIGRATION SUMMARY".bold().cyan());
    println!(
        "{}/{} → {}/{}",
        result.source.rdbms.to_string().blue(),
        result.source.schema.0.blue(),
        result.target.rdbms.to_string().green(),
        result.target.schema.0.green()
    );
    println!("Migration: {}", result.migration_id.to_string().bright_yellow());
    println!("Status: {}", paint_status(result.status));
    println!();

    if result.tables.is_empty() {
        println!("{}", "No tables migrated.".italic());
    } else {
        let rows: Vec<TableRow> = result
            .tables
            .iter()
            .map(|t| TableRow {
                table: t.table.0.bold().to_string(),
                plain_rows: t.plain_count.to_string(),
                plain_status: paint_status(t.plain_status),
                lobs: t.lob_count.to_string(),
                lob_status: paint_status(t.lob_status),
            })
            .collect();

        let table = Table::new(rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(1..=4)).with(Alignment::right()))
            .to_string();
        println!("{table}");
    }

    for warning in &result.warnings {
        println!("{} {}", "warning:".yellow().bold(), warning);
    }
    for error in &result.errors {
        println!("{} {}", "error:".red().bold(), error);
    }
}
