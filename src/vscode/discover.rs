//! Filesystem discovery of identity-bearing artifacts
//!
//! Walks the cataloged editor locations and classifies what it finds.
//! Individual unreadable entries are recorded and skipped; a missing root is
//! an expected-absence branch and stays silent.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use super::classify::{ArtifactKind, Classifier, Priority};
use super::registry;
use crate::config::{self, VariantPaths, CACHE_DIR_NAMES};

/// Scan depth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    Quick,
    Comprehensive,
}

/// Discovery options
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub mode: ScanMode,
    pub include_registry: bool,
    pub include_temp: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            mode: ScanMode::Quick,
            include_registry: false,
            include_temp: false,
        }
    }
}

/// One discovered artifact
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactRecord {
    pub path: PathBuf,
    pub kind: ArtifactKind,
    pub priority: Priority,
    pub size_bytes: u64,
    pub modified_at: Option<DateTime<Utc>>,
}

/// An entry discovery could not examine, with the reason
#[derive(Debug, Clone)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub reason: String,
}

/// Append-only scan result with canonical-path deduplication
#[derive(Debug, Default)]
pub struct Inventory {
    records: Vec<ArtifactRecord>,
    seen: HashSet<PathBuf>,
    pub skipped: Vec<SkippedEntry>,
    pub scanned_roots: usize,
}

impl Inventory {
    fn push(&mut self, record: ArtifactRecord) {
        // Two aliases of the same file must not be double-counted
        let canonical = fs::canonicalize(&record.path).unwrap_or_else(|_| record.path.clone());
        if self.seen.insert(canonical) {
            self.records.push(record);
        }
    }

    fn skip(&mut self, path: &Path, reason: String) {
        self.skipped.push(SkippedEntry {
            path: path.to_path_buf(),
            reason,
        });
    }

    pub fn records(&self) -> &[ArtifactRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn of_kind(&self, kind: ArtifactKind) -> impl Iterator<Item = &ArtifactRecord> {
        self.records.iter().filter(move |r| r.kind == kind)
    }

    pub fn counts_by_kind(&self) -> BTreeMap<ArtifactKind, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.kind).or_insert(0) += 1;
        }
        counts
    }

    pub fn total_size(&self) -> u64 {
        self.records.iter().map(|r| r.size_bytes).sum()
    }

    /// Order records for display: most critical first, then by path
    pub fn sort_for_display(&mut self) {
        self.records
            .sort_by(|a, b| (a.priority, &a.path).cmp(&(b.priority, &b.path)));
    }

    pub fn export(&self) -> InventoryExport<'_> {
        InventoryExport {
            generated_at: Utc::now(),
            scanned_roots: self.scanned_roots,
            records: &self.records,
        }
    }
}

/// Serializable scan report for `scan --export`
#[derive(Serialize)]
pub struct InventoryExport<'a> {
    pub generated_at: DateTime<Utc>,
    pub scanned_roots: usize,
    pub records: &'a [ArtifactRecord],
}

/// Walks cataloged roots and classifies entries
pub struct DiscoveryEngine {
    classifier: Classifier,
}

impl DiscoveryEngine {
    pub fn new() -> Result<Self> {
        Ok(Self {
            classifier: Classifier::new()?,
        })
    }

    /// Scan the given variant roots plus the mode-dependent extra roots
    pub fn discover(&self, variants: &[VariantPaths], options: &ScanOptions) -> Inventory {
        let mut inventory = Inventory::default();

        for paths in variants {
            self.scan_variant(paths, options, &mut inventory);
        }

        if options.mode == ScanMode::Comprehensive {
            if let Some(home) = config::profile_root() {
                self.walk_root(&home, true, None, &mut inventory);
            }
        }

        if options.mode == ScanMode::Comprehensive || options.include_temp {
            for root in config::temp_roots() {
                self.walk_root(&root, false, Some(ArtifactKind::Temp), &mut inventory);
            }
        }

        if options.include_registry {
            for value in registry::scan_identity_values() {
                let rendered = value.rendered();
                let priority = self
                    .classifier
                    .classify_registry(&rendered)
                    .unwrap_or(Priority::Optional);
                inventory.push(ArtifactRecord {
                    path: PathBuf::from(value.display_path()),
                    kind: ArtifactKind::Registry,
                    priority,
                    size_bytes: value.data.len() as u64,
                    modified_at: None,
                });
            }
        }

        inventory
    }

    fn scan_variant(&self, paths: &VariantPaths, options: &ScanOptions, inv: &mut Inventory) {
        if !paths.data_root.is_dir() {
            return;
        }
        inv.scanned_roots += 1;

        // Fixed quick-scan targets
        self.consider_file(&paths.storage_json, None, inv);
        self.consider_file(&paths.state_db, None, inv);
        self.consider_file(&paths.state_db.with_extension("vscdb.backup"), None, inv);
        self.consider_file(&paths.machine_id_file, None, inv);

        // Per-workspace state databases
        if paths.workspace_storage.is_dir() {
            match fs::read_dir(&paths.workspace_storage) {
                Ok(entries) => {
                    for entry in entries.flatten() {
                        self.consider_file(&entry.path().join("state.vscdb"), None, inv);
                    }
                }
                Err(err) => inv.skip(&paths.workspace_storage, err.to_string()),
            }
        }

        // Installed extension residue
        if paths.extensions_dir.is_dir() {
            match fs::read_dir(&paths.extensions_dir) {
                Ok(entries) => {
                    for entry in entries.flatten() {
                        self.consider_extension_dir(&entry.path(), inv);
                    }
                }
                Err(err) => inv.skip(&paths.extensions_dir, err.to_string()),
            }
        }

        if options.mode == ScanMode::Comprehensive {
            // Full tree walk; browser caches are walked separately so their
            // hits carry the cache kind
            self.walk_root(&paths.data_root, true, None, inv);
            for cache_dir in config::cache_dirs(paths) {
                self.walk_root(&cache_dir, false, Some(ArtifactKind::Cache), inv);
            }
        }
    }

    /// Unrestricted recursive walk of one root; per-entry failures land on
    /// the skip list
    fn walk_root(
        &self,
        root: &Path,
        skip_cache_dirs: bool,
        origin_kind: Option<ArtifactKind>,
        inv: &mut Inventory,
    ) {
        if !root.is_dir() {
            return;
        }
        inv.scanned_roots += 1;

        let walker = WalkDir::new(root);
        if skip_cache_dirs {
            let iter = walker
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !is_cache_dir_name(e));
            self.walk_entries(iter, origin_kind, inv);
        } else {
            self.walk_entries(walker.into_iter(), origin_kind, inv);
        }
    }

    fn walk_entries<I>(&self, entries: I, origin_kind: Option<ArtifactKind>, inv: &mut Inventory)
    where
        I: Iterator<Item = walkdir::Result<DirEntry>>,
    {
        for entry in entries {
            match entry {
                Ok(entry) if entry.file_type().is_file() => {
                    self.consider_file(entry.path(), origin_kind, inv);
                }
                Ok(_) => {}
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| PathBuf::from("<walk>"));
                    inv.skip(&path, err.to_string());
                }
            }
        }
    }

    /// Classify one file and record it if relevant
    fn consider_file(&self, path: &Path, origin_kind: Option<ArtifactKind>, inv: &mut Inventory) {
        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return,
            Err(err) => {
                inv.skip(path, err.to_string());
                return;
            }
        };
        if !metadata.is_file() {
            return;
        }

        let hit = match self.classifier.classify_name(path) {
            Some(hit) => Some(hit),
            None if self.classifier.scannable(metadata.len()) => match fs::read(path) {
                Ok(bytes) => {
                    let content = String::from_utf8_lossy(&bytes);
                    self.classifier.classify_content(&content)
                }
                Err(err) => {
                    inv.skip(path, err.to_string());
                    None
                }
            },
            None => None,
        };

        let Some((kind, priority)) = hit else { return };

        // Hits under cache or temp roots report that origin instead of the
        // rule's kind
        let (kind, priority) = match origin_kind {
            Some(origin) => (origin, Priority::Optional),
            None => (kind, priority),
        };

        inv.push(ArtifactRecord {
            path: path.to_path_buf(),
            kind,
            priority,
            size_bytes: metadata.len(),
            modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
        });
    }

    /// Installed extensions are directories; classify by directory name
    fn consider_extension_dir(&self, path: &Path, inv: &mut Inventory) {
        if !path.is_dir() {
            return;
        }
        let Some((kind, priority)) = self.classifier.classify_name(path) else {
            return;
        };

        inv.push(ArtifactRecord {
            path: path.to_path_buf(),
            kind,
            priority,
            size_bytes: dir_size(path),
            modified_at: fs::metadata(path)
                .ok()
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from),
        });
    }
}

fn is_cache_dir_name(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| CACHE_DIR_NAMES.contains(&name))
            .unwrap_or(false)
}

fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.metadata().ok())
        .filter(|m| m.is_file())
        .map(|m| m.len())
        .sum()
}
