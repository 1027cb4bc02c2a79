//! CLI commands

use anyhow::{Context, Result};
use std::path::PathBuf;

pub mod backups;
pub mod clean;
pub mod modify_ids;
pub mod scan;
pub mod utils;

use crate::backup::BackupStore;
use crate::output;

/// Global flags shared by the mutating commands
#[derive(Debug, Clone)]
pub struct CommonOpts {
    /// Skip pre-mutation backups
    pub no_backup: bool,
    /// Root of the backup store
    pub backup_root: PathBuf,
    /// Backups kept per category
    pub max_backups: usize,
    /// Mutate files over the size ceiling
    pub force: bool,
}

/// Open the backup store, or none when backups are disabled
pub(crate) fn open_store(common: &CommonOpts) -> Result<Option<BackupStore>> {
    if common.no_backup {
        output::warn("Backups disabled (--no-backup)");
        return Ok(None);
    }
    let store = BackupStore::open(&common.backup_root, common.max_backups).with_context(|| {
        format!(
            "Failed to open backup store: {}",
            common.backup_root.display()
        )
    })?;
    Ok(Some(store))
}
