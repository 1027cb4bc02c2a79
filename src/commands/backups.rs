//! Backups command - Inspect and verify the backup store

use anyhow::{bail, Result};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, ContentArrangement, Table};
use owo_colors::OwoColorize;

use super::utils::{self, RunSummary};
use super::CommonOpts;
use crate::backup::{BackupCategory, BackupStore};
use crate::output;

/// Parse a category name from the CLI
pub fn parse_category(name: &str) -> Result<BackupCategory> {
    match name.to_lowercase().as_str() {
        "database" | "databases" => Ok(BackupCategory::Database),
        "telemetry" => Ok(BackupCategory::Telemetry),
        "configuration" => Ok(BackupCategory::Configuration),
        "extension" | "extensions" => Ok(BackupCategory::Extension),
        other => bail!(
            "Unknown category: {} (use database, telemetry, configuration, or extension)",
            other
        ),
    }
}

/// Execute `backups list`
pub fn execute_list(common: &CommonOpts, category: Option<BackupCategory>) -> Result<()> {
    let store = BackupStore::open(&common.backup_root, common.max_backups)?;
    let records = store.list_backups(category)?;

    if records.is_empty() {
        println!("No backups found in {}", store.root().display());
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Category"),
        Cell::new("Created"),
        Cell::new("Size"),
        Cell::new("Valid"),
        Cell::new("Original"),
    ]);

    for record in &records {
        table.add_row(vec![
            Cell::new(record.category.to_string()),
            Cell::new(record.created_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::new(utils::format_size(record.size_bytes)),
            Cell::new(if record.valid { "yes" } else { "NO" }),
            Cell::new(record.original_path.display().to_string()),
        ]);
    }
    println!("{}", table);

    let total: u64 = records.iter().map(|r| r.size_bytes).sum();
    println!(
        "\nTotal: {} backup(s), {}",
        records.len(),
        utils::format_size(total)
    );
    Ok(())
}

/// Execute `backups verify`
pub fn execute_verify(common: &CommonOpts, category: Option<BackupCategory>) -> Result<RunSummary> {
    let store = BackupStore::open(&common.backup_root, common.max_backups)?;
    let mut records = store.list_backups(category)?;

    if records.is_empty() {
        println!("No backups found in {}", store.root().display());
        return Ok(RunSummary::default());
    }

    output::section("Verifying backups");

    let mut summary = RunSummary::default();
    for record in &mut records {
        match store.revalidate(record) {
            Ok(true) => {
                println!("{} {}", "OK:".green(), record.backup_path.display());
                summary.record_success();
            }
            Ok(false) => {
                println!("{} {}", "FAILED:".red(), record.backup_path.display());
                summary.record_failure();
            }
            Err(err) => {
                output::error(&format!("{}: {}", record.backup_path.display(), err));
                summary.record_failure();
            }
        }
    }

    println!(
        "\nVerified: {} passed, {} failed",
        summary.succeeded.to_string().green(),
        if summary.failed > 0 {
            summary.failed.to_string().red().to_string()
        } else {
            "0".to_string()
        }
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_category_accepts_both_spellings() {
        assert_eq!(parse_category("database").unwrap(), BackupCategory::Database);
        assert_eq!(
            parse_category("databases").unwrap(),
            BackupCategory::Database
        );
        assert_eq!(
            parse_category("Telemetry").unwrap(),
            BackupCategory::Telemetry
        );
        assert_eq!(
            parse_category("extensions").unwrap(),
            BackupCategory::Extension
        );
    }

    #[test]
    fn test_parse_category_rejects_unknown() {
        assert!(parse_category("chats").is_err());
    }
}
