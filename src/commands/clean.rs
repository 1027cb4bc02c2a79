//! Clean command - Purge extension and identity rows from state databases

use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;

use super::utils::RunSummary;
use super::CommonOpts;
use crate::backup::{BackupCategory, BackupStore};
use crate::config;
use crate::error::ErrorKind;
use crate::output;
use crate::vscode::classify::ArtifactKind;
use crate::vscode::discover::{DiscoveryEngine, ScanOptions};
use crate::vscode::mutate::MutationEngine;
use crate::vscode::state_db::{self, PurgeOutcome};

/// Execute the clean command
pub fn execute(common: &CommonOpts, preview: bool) -> Result<RunSummary> {
    let variants = config::detect_installed();
    if variants.is_empty() {
        println!("No supported editors found on this machine.");
        return Ok(RunSummary::default());
    }

    let engine = DiscoveryEngine::new()?;
    let inventory = engine.discover(&variants, &ScanOptions::default());
    let databases: Vec<_> = inventory.of_kind(ArtifactKind::Database).collect();

    if databases.is_empty() {
        println!("No state databases found. Nothing to do.");
        return Ok(RunSummary::default());
    }

    output::section("Cleaning state databases");

    if preview {
        let mut total = 0usize;
        for record in &databases {
            match state_db::count_purgeable(&record.path) {
                Ok(rows) => {
                    println!("  {} ({} row(s))", record.path.display(), rows);
                    total += rows;
                }
                Err(err) => output::warn(&format!("{}: {}", record.path.display(), err)),
            }
        }
        println!(
            "\nWould remove {} row(s) from {} database(s)",
            total,
            databases.len()
        );
        return Ok(RunSummary::default());
    }

    let store = super::open_store(common)?;
    if let Some(store) = &store {
        output::info(&format!("Backup store: {}", store.root().display()));
    }
    let mutator = MutationEngine::new(common.force);

    let mut summary = RunSummary::default();
    let mut rows_total = 0usize;
    for record in &databases {
        match clean_one(&record.path, store.as_ref(), &mutator) {
            Ok(outcome) => {
                println!(
                    "{} {} ({} row(s))",
                    "Cleaned:".green(),
                    record.path.display(),
                    outcome.rows_deleted
                );
                rows_total += outcome.rows_deleted;
                summary.record_success();
            }
            Err(err) => {
                // A vanished backup store is a run-level precondition
                // failure, not a per-database one
                if err.kind() == ErrorKind::NotInitialized {
                    return Err(err.into());
                }
                output::error(&format!("{}: {}", record.path.display(), err));
                summary.record_failure();
            }
        }
    }

    println!(
        "\nSuccessfully cleaned: {}/{} database(s), {} row(s) removed",
        summary.succeeded.to_string().green(),
        summary.total(),
        rows_total
    );

    Ok(summary)
}

/// Back up one database, purge it, and roll the backup over it again if the
/// purge errors out
fn clean_one(
    db_path: &Path,
    store: Option<&BackupStore>,
    mutator: &MutationEngine,
) -> crate::error::ScrubResult<PurgeOutcome> {
    mutator.preflight(db_path)?;

    let backup = match store {
        Some(store) => Some((
            store,
            store.create_backup(db_path, BackupCategory::Database, "pre-clean snapshot")?,
        )),
        None => None,
    };

    match state_db::purge(db_path) {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            // A half-applied purge must not survive
            if let Some((store, record)) = backup {
                match store.restore(&record) {
                    Ok(()) => output::warn(&format!(
                        "Restored {} from its backup",
                        db_path.display()
                    )),
                    Err(restore_err) => output::error(&format!(
                        "Could not restore {}: {}",
                        db_path.display(),
                        restore_err
                    )),
                }
            }
            Err(err)
        }
    }
}
