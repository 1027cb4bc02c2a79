//! Platform-specific editor locations
//!
//! Catalogs the VS Code-family variants this tool knows how to find and the
//! identity-bearing files each one keeps on disk.

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Editor variants sharing the VS Code storage layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditorVariant {
    Code,
    CodeInsiders,
    Codium,
    Cursor,
}

impl EditorVariant {
    pub const ALL: [EditorVariant; 4] = [
        EditorVariant::Code,
        EditorVariant::CodeInsiders,
        EditorVariant::Codium,
        EditorVariant::Cursor,
    ];

    /// Directory name under the platform config root
    pub fn product_dir(&self) -> &'static str {
        match self {
            Self::Code => "Code",
            Self::CodeInsiders => "Code - Insiders",
            Self::Codium => "VSCodium",
            Self::Cursor => "Cursor",
        }
    }

    /// Hidden home directory holding installed extensions
    pub fn dot_dir(&self) -> &'static str {
        match self {
            Self::Code => ".vscode",
            Self::CodeInsiders => ".vscode-insiders",
            Self::Codium => ".vscode-oss",
            Self::Cursor => ".cursor",
        }
    }
}

impl std::fmt::Display for EditorVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Code => "VS Code",
            Self::CodeInsiders => "VS Code Insiders",
            Self::Codium => "VSCodium",
            Self::Cursor => "Cursor",
        };
        write!(f, "{}", name)
    }
}

/// Identity-bearing locations for one installed variant
#[derive(Debug, Clone)]
pub struct VariantPaths {
    pub variant: EditorVariant,
    /// Data root, e.g. ~/.config/Code
    pub data_root: PathBuf,
    /// User/globalStorage/storage.json (telemetry identifiers)
    pub storage_json: PathBuf,
    /// User/globalStorage/state.vscdb (key/value state database)
    pub state_db: PathBuf,
    /// User/workspaceStorage/ (per-workspace state databases)
    pub workspace_storage: PathBuf,
    /// Bare machineid file at the data root
    pub machine_id_file: PathBuf,
    /// ~/.vscode/extensions and friends
    pub extensions_dir: PathBuf,
}

/// Get the data root for a variant
/// - macOS: ~/Library/Application Support/{product}
/// - Linux: ~/.config/{product}
/// - Windows: %APPDATA%/{product}
fn variant_data_root(variant: EditorVariant) -> Result<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home
            .join("Library")
            .join("Application Support")
            .join(variant.product_dir()))
    }

    #[cfg(target_os = "linux")]
    {
        let config = dirs::config_dir().context("Could not determine config directory")?;
        Ok(config.join(variant.product_dir()))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata = dirs::config_dir().context("Could not determine AppData directory")?;
        Ok(appdata.join(variant.product_dir()))
    }
}

/// Build the full path set for a variant
pub fn variant_paths(variant: EditorVariant) -> Result<VariantPaths> {
    let data_root = variant_data_root(variant)?;
    let global_storage = data_root.join("User").join("globalStorage");
    let home = dirs::home_dir().context("Could not determine home directory")?;

    Ok(VariantPaths {
        variant,
        storage_json: global_storage.join("storage.json"),
        state_db: global_storage.join("state.vscdb"),
        workspace_storage: data_root.join("User").join("workspaceStorage"),
        machine_id_file: data_root.join("machineid"),
        extensions_dir: home.join(variant.dot_dir()).join("extensions"),
        data_root,
    })
}

/// All variants whose data root exists on this machine
pub fn detect_installed() -> Vec<VariantPaths> {
    EditorVariant::ALL
        .iter()
        .filter_map(|&variant| variant_paths(variant).ok())
        .filter(|paths| paths.data_root.is_dir())
        .collect()
}

/// Browser-cache directory names kept under a variant's data root
pub const CACHE_DIR_NAMES: [&str; 4] = ["Cache", "Code Cache", "CachedData", "GPUCache"];

/// Cache directories for one variant (existing or not)
pub fn cache_dirs(paths: &VariantPaths) -> Vec<PathBuf> {
    CACHE_DIR_NAMES
        .iter()
        .map(|name| paths.data_root.join(name))
        .collect()
}

/// System temp roots searched in comprehensive mode
pub fn temp_roots() -> Vec<PathBuf> {
    #[cfg_attr(not(windows), allow(unused_mut))]
    let mut roots = vec![std::env::temp_dir()];

    #[cfg(windows)]
    if let Some(program_data) = std::env::var_os("ProgramData") {
        roots.push(PathBuf::from(program_data));
    }

    roots
}

/// User profile root searched in comprehensive mode
pub fn profile_root() -> Option<PathBuf> {
    dirs::home_dir()
}

/// Default root for the backup store
pub fn default_backup_root() -> Result<PathBuf> {
    let data = dirs::data_local_dir().context("Could not determine local data directory")?;
    Ok(data.join("vscrub").join("backups"))
}
