//! Modify-ids command - Rewrite telemetry identifiers with fresh values

use anyhow::Result;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, ContentArrangement, Table};
use owo_colors::OwoColorize;
use std::fs;
use std::path::Path;

use super::utils::RunSummary;
use super::CommonOpts;
use crate::backup::{BackupCategory, BackupStore};
use crate::config::{self, VariantPaths};
use crate::error::ErrorKind;
use crate::identity::IdentifierSet;
use crate::output;
use crate::vscode::mutate::MutationEngine;
use crate::vscode::storage;

/// Execute the modify-ids command
pub fn execute(common: &CommonOpts, preview: bool, show_current: bool) -> Result<RunSummary> {
    let variants = config::detect_installed();
    if variants.is_empty() {
        println!("No supported editors found on this machine.");
        return Ok(RunSummary::default());
    }

    if show_current {
        print_current(&variants)?;
        return Ok(RunSummary::default());
    }

    let target_count: usize = variants.iter().map(|paths| targets(paths).len()).sum();
    if target_count == 0 {
        println!("No identifier files found. Nothing to do.");
        return Ok(RunSummary::default());
    }

    if preview {
        print_preview(&variants);
        return Ok(RunSummary::default());
    }

    // One identifier set for the whole run, so every variant on this
    // machine ends up with the same fresh identity
    let ids = IdentifierSet::generate()?;
    let store = super::open_store(common)?;
    if let Some(store) = &store {
        output::info(&format!("Backup store: {}", store.root().display()));
    }
    let mutator = MutationEngine::new(common.force);

    output::section("Rewriting identifiers");

    let mut summary = RunSummary::default();
    for paths in &variants {
        summary.merge(apply_to_variant(paths, &ids, store.as_ref(), &mutator)?);
    }

    print_new_ids(&ids);
    println!(
        "\nSuccessfully updated: {}/{} file(s)",
        summary.succeeded.to_string().green(),
        summary.total()
    );

    Ok(summary)
}

/// Identity files present for one variant, with the bare-identifier flag
fn targets(paths: &VariantPaths) -> Vec<(&Path, bool)> {
    let mut found = Vec::new();
    if paths.storage_json.is_file() {
        found.push((paths.storage_json.as_path(), false));
    }
    if paths.machine_id_file.is_file() {
        found.push((paths.machine_id_file.as_path(), true));
    }
    found
}

fn apply_to_variant(
    paths: &VariantPaths,
    ids: &IdentifierSet,
    store: Option<&BackupStore>,
    mutator: &MutationEngine,
) -> Result<RunSummary> {
    let mut summary = RunSummary::default();
    for (path, is_machine_id) in targets(paths) {
        apply_file(path, is_machine_id, ids, store, mutator, &mut summary)?;
    }
    Ok(summary)
}

fn apply_file(
    path: &Path,
    is_machine_id: bool,
    ids: &IdentifierSet,
    store: Option<&BackupStore>,
    mutator: &MutationEngine,
    summary: &mut RunSummary,
) -> Result<()> {
    // No rewrite without a verified backup, unless backups were declined
    if let Some(store) = store {
        if let Err(err) = store.create_backup(path, BackupCategory::Telemetry, "pre-rewrite snapshot")
        {
            // A vanished backup store is a run-level precondition failure
            if err.kind() == ErrorKind::NotInitialized {
                return Err(err.into());
            }
            output::error(&format!("{}: {}", path.display(), err));
            summary.record_failure();
            return Ok(());
        }
    }

    let result = if is_machine_id {
        mutator.mutate_machine_id_file(path, ids)
    } else {
        mutator.mutate(path, ids)
    };

    match result.error {
        None if result.changed() => {
            println!(
                "{} {} ({} key(s))",
                "Updated:".green(),
                path.display(),
                result.modified_keys.len()
            );
            summary.record_success();
        }
        None => {
            println!("{} {}", "Unchanged:".dimmed(), path.display());
            summary.record_success();
        }
        Some(err) => {
            output::error(&format!("{}: {}", path.display(), err));
            summary.record_failure();
        }
    }
    Ok(())
}

fn print_current(variants: &[VariantPaths]) -> Result<()> {
    for paths in variants {
        output::section(&paths.variant.to_string());

        if paths.storage_json.is_file() {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL_CONDENSED)
                .set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec![Cell::new("Key"), Cell::new("Value")]);
            for (key, value) in storage::current_identifiers(&paths.storage_json)? {
                table.add_row(vec![Cell::new(key), Cell::new(value)]);
            }
            println!("{}", table);
        } else {
            println!("  No storage.json found.");
        }

        if paths.machine_id_file.is_file() {
            let content = fs::read_to_string(&paths.machine_id_file).unwrap_or_default();
            println!("  machineid: {}", content.trim());
        }
    }
    Ok(())
}

fn print_preview(variants: &[VariantPaths]) {
    output::section("Identifier rewrite preview");
    for paths in variants {
        for (path, is_machine_id) in targets(paths) {
            if is_machine_id {
                println!("  {} (bare identifier)", path.display());
            } else {
                let present = storage::current_identifiers(path)
                    .map(|pairs| pairs.len())
                    .unwrap_or(0);
                println!("  {} ({} key(s) present)", path.display(), present);
            }
        }
    }
    println!("\n{}", "(PREVIEW) No changes made.".blue());
}

fn print_new_ids(ids: &IdentifierSet) {
    output::section("New identifiers");
    println!("  machineId:      {}", ids.machine_id);
    println!("  devDeviceId:    {}", ids.device_id);
    println!("  sqmId:          {}", ids.sqm_id);
    println!("  sessionId:      {}", ids.session_id);
    println!("  installationId: {}", ids.installation_id);
    println!("  userId:         {}", ids.user_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EditorVariant;
    use tempfile::tempdir;

    fn fake_variant(root: &Path) -> VariantPaths {
        VariantPaths {
            variant: EditorVariant::Code,
            data_root: root.to_path_buf(),
            storage_json: root.join("storage.json"),
            state_db: root.join("state.vscdb"),
            workspace_storage: root.join("workspaceStorage"),
            machine_id_file: root.join("machineid"),
            extensions_dir: root.join("extensions"),
        }
    }

    #[test]
    fn test_apply_rewrites_both_identity_files() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("storage.json"),
            r#"{"telemetry.machineId": "old", "telemetry.devDeviceId": "old"}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("machineid"),
            "00000000-0000-0000-0000-000000000000",
        )
        .unwrap();

        let ids = IdentifierSet::generate().unwrap();
        let store = BackupStore::open(&dir.path().join("backups"), 3).unwrap();
        let mutator = MutationEngine::new(false);

        let summary =
            apply_to_variant(&fake_variant(dir.path()), &ids, Some(&store), &mutator).unwrap();

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 0);

        let content = fs::read_to_string(dir.path().join("storage.json")).unwrap();
        assert!(content.contains(&ids.machine_id));
        assert!(content.contains(&ids.device_id));
        assert_eq!(
            fs::read_to_string(dir.path().join("machineid")).unwrap(),
            ids.device_id
        );
        assert_eq!(
            store
                .list_backups(Some(BackupCategory::Telemetry))
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn test_missing_files_are_not_targets() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("machineid"), "x").unwrap();

        let variant = fake_variant(dir.path());
        let found = targets(&variant);
        assert_eq!(found.len(), 1);
        assert!(found[0].1);
    }

    #[test]
    fn test_vanished_store_aborts_the_run() {
        let dir = tempdir().unwrap();
        let original = r#"{"telemetry.machineId": "old"}"#;
        fs::write(dir.path().join("storage.json"), original).unwrap();

        let store_root = dir.path().join("backups");
        let store = BackupStore::open(&store_root, 3).unwrap();
        fs::remove_dir_all(&store_root).unwrap();

        let ids = IdentifierSet::generate().unwrap();
        let mutator = MutationEngine::new(false);
        let result = apply_to_variant(&fake_variant(dir.path()), &ids, Some(&store), &mutator);

        assert!(result.is_err());
        assert_eq!(
            fs::read_to_string(dir.path().join("storage.json")).unwrap(),
            original
        );
    }

    #[test]
    fn test_failed_backup_blocks_one_rewrite_only() {
        let dir = tempdir().unwrap();
        let store = BackupStore::open(&dir.path().join("backups"), 3).unwrap();
        let ids = IdentifierSet::generate().unwrap();
        let mutator = MutationEngine::new(false);

        // Target vanished between discovery and rewrite
        let gone = dir.path().join("storage.json");
        let mut summary = RunSummary::default();
        apply_file(&gone, false, &ids, Some(&store), &mutator, &mut summary).unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.succeeded, 0);
        assert!(store
            .list_backups(Some(BackupCategory::Telemetry))
            .unwrap()
            .is_empty());
    }
}
