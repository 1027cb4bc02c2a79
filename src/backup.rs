//! Backup store with integrity verification and bounded retention
//!
//! Every backup is a plain copy of the source file plus a JSON sidecar
//! (`{name}.backup.metadata`) holding its SHA-256 and provenance. Copies are
//! grouped into per-category shelves under the store root, and each shelf
//! keeps at most a fixed number of backups, evicted oldest-first.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{ScrubError, ScrubResult};
use crate::output;

/// Backups kept per category before the oldest are evicted
pub const DEFAULT_MAX_PER_CATEGORY: usize = 3;

/// Attempts at a collision-free backup name before giving up
const NAME_ATTEMPTS: u32 = 1000;

/// Shelf a backup lands on inside the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupCategory {
    Database,
    Telemetry,
    Configuration,
    Extension,
}

impl BackupCategory {
    pub const ALL: [BackupCategory; 4] = [
        BackupCategory::Database,
        BackupCategory::Telemetry,
        BackupCategory::Configuration,
        BackupCategory::Extension,
    ];

    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Database => "databases",
            Self::Telemetry => "telemetry",
            Self::Configuration => "configuration",
            Self::Extension => "extensions",
        }
    }
}

impl std::fmt::Display for BackupCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

/// Sidecar metadata for one backup
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BackupRecord {
    /// File the backup was taken from
    pub original_path: PathBuf,
    /// Where the copy lives inside the store
    pub backup_path: PathBuf,
    /// Shelf the backup belongs to
    pub category: BackupCategory,
    /// Creation time in UTC
    pub created_at: DateTime<Utc>,
    /// SHA-256 of the copy, computed right after the copy was written
    pub content_hash: String,
    /// Size of the copy in bytes
    pub size_bytes: u64,
    /// Note about why the backup was taken
    pub description: String,
    /// Outcome of the most recent integrity check
    pub valid: bool,
}

impl BackupRecord {
    /// Path of the JSON sidecar next to the backup copy
    pub fn sidecar_path(&self) -> PathBuf {
        sidecar_path(&self.backup_path)
    }
}

/// Directory of verified backups, one subdirectory per category
pub struct BackupStore {
    root: PathBuf,
    max_per_category: usize,
}

impl BackupStore {
    /// Open the store at `root`, creating it and its category shelves
    pub fn open(root: &Path, max_per_category: usize) -> ScrubResult<Self> {
        fs::create_dir_all(root).map_err(|err| ScrubError::io(root, err))?;
        for category in BackupCategory::ALL {
            let dir = root.join(category.dir_name());
            fs::create_dir_all(&dir).map_err(|err| ScrubError::io(&dir, err))?;
        }
        Ok(Self {
            root: root.to_path_buf(),
            max_per_category,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copy `source` into the store, hash and verify the copy, write the
    /// sidecar, then evict anything over the shelf limit. The returned
    /// record has always passed verification.
    pub fn create_backup(
        &self,
        source: &Path,
        category: BackupCategory,
        description: &str,
    ) -> ScrubResult<BackupRecord> {
        if !source.is_file() {
            return Err(ScrubError::SourceNotFound(source.to_path_buf()));
        }
        self.ensure_root()?;

        let dir = self.root.join(category.dir_name());
        fs::create_dir_all(&dir).map_err(|err| ScrubError::io(&dir, err))?;
        let file_name = source
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string());
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let backup_path = next_backup_path(&dir, &timestamp, &file_name)?;

        fs::copy(source, &backup_path).map_err(|err| ScrubError::io(source, err))?;

        let content_hash = hash_file(&backup_path)?;
        let size_bytes = fs::metadata(&backup_path)
            .map_err(|err| ScrubError::io(&backup_path, err))?
            .len();

        let record = BackupRecord {
            original_path: source.to_path_buf(),
            backup_path: backup_path.clone(),
            category,
            created_at: Utc::now(),
            content_hash,
            size_bytes,
            description: description.to_string(),
            valid: true,
        };
        write_sidecar(&record)?;

        // Re-read the copy so a torn write surfaces now, not at restore time
        if !self.verify_integrity(&record)? {
            let _ = fs::remove_file(&backup_path);
            let _ = fs::remove_file(record.sidecar_path());
            return Err(ScrubError::IntegrityFailure(backup_path));
        }

        self.enforce_retention(category)?;
        Ok(record)
    }

    /// Re-hash the stored copy against the sidecar. A missing copy or a
    /// size drift counts as failed, not as an error; the size comparison
    /// runs first so a mismatched copy is never hashed.
    pub fn verify_integrity(&self, record: &BackupRecord) -> ScrubResult<bool> {
        let metadata = match fs::metadata(&record.backup_path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Ok(false),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(ScrubError::io(&record.backup_path, err)),
        };
        if metadata.len() != record.size_bytes {
            return Ok(false);
        }
        Ok(hash_file(&record.backup_path)? == record.content_hash)
    }

    /// Re-check a record and persist the outcome in its sidecar
    pub fn revalidate(&self, record: &mut BackupRecord) -> ScrubResult<bool> {
        let valid = self.verify_integrity(record)?;
        if record.valid != valid {
            record.valid = valid;
            write_sidecar(record)?;
        }
        Ok(valid)
    }

    /// All records in the store, newest first, optionally limited to one
    /// category. Sidecars that fail to parse are skipped.
    pub fn list_backups(&self, category: Option<BackupCategory>) -> ScrubResult<Vec<BackupRecord>> {
        self.ensure_root()?;

        let categories: Vec<BackupCategory> = match category {
            Some(one) => vec![one],
            None => BackupCategory::ALL.to_vec(),
        };

        let mut records = Vec::new();
        for category in categories {
            let dir = self.root.join(category.dir_name());
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            for entry in entries.filter_map(|e| e.ok()) {
                let path = entry.path();
                if path.extension().and_then(|ext| ext.to_str()) != Some("metadata") {
                    continue;
                }
                let Ok(content) = fs::read_to_string(&path) else {
                    continue;
                };
                if let Ok(record) = serde_json::from_str::<BackupRecord>(&content) {
                    records.push(record);
                }
            }
        }

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// Drop the oldest backups on one shelf until it is within the limit.
    /// Eviction failures are reported but never abort the sweep.
    pub fn enforce_retention(&self, category: BackupCategory) -> ScrubResult<usize> {
        let mut records = self.list_backups(Some(category))?;
        if records.len() <= self.max_per_category {
            return Ok(0);
        }

        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let excess = records.len() - self.max_per_category;

        let mut evicted = 0;
        for record in records.into_iter().take(excess) {
            if let Err(err) = fs::remove_file(&record.backup_path) {
                output::warn(&format!(
                    "Failed to evict {}: {}",
                    record.backup_path.display(),
                    err
                ));
                continue;
            }
            if let Err(err) = fs::remove_file(record.sidecar_path()) {
                output::warn(&format!(
                    "Failed to remove sidecar for {}: {}",
                    record.backup_path.display(),
                    err
                ));
            }
            evicted += 1;
        }
        Ok(evicted)
    }

    /// Copy a verified backup over its original location. Refuses backups
    /// that no longer match their recorded hash.
    pub fn restore(&self, record: &BackupRecord) -> ScrubResult<()> {
        if !self.verify_integrity(record)? {
            return Err(ScrubError::IntegrityFailure(record.backup_path.clone()));
        }
        if let Some(parent) = record.original_path.parent() {
            fs::create_dir_all(parent).map_err(|err| ScrubError::io(parent, err))?;
        }
        fs::copy(&record.backup_path, &record.original_path)
            .map_err(|err| ScrubError::io(&record.original_path, err))?;
        Ok(())
    }

    fn ensure_root(&self) -> ScrubResult<()> {
        if !self.root.is_dir() {
            return Err(ScrubError::NotInitialized(self.root.clone()));
        }
        Ok(())
    }
}

/// First unused `{ts}_{name}.backup` path, disambiguated `{ts}_{n}_{name}`
/// when a same-second backup of the same file already exists
fn next_backup_path(dir: &Path, timestamp: &str, file_name: &str) -> ScrubResult<PathBuf> {
    let base = dir.join(format!("{}_{}.backup", timestamp, file_name));
    if !base.exists() {
        return Ok(base);
    }
    for n in 1..NAME_ATTEMPTS {
        let candidate = dir.join(format!("{}_{}_{}.backup", timestamp, n, file_name));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(ScrubError::Io {
        path: base,
        source: std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "no unused backup name after 1000 attempts",
        ),
    })
}

fn sidecar_path(backup: &Path) -> PathBuf {
    let mut name = backup.as_os_str().to_os_string();
    name.push(".metadata");
    PathBuf::from(name)
}

/// SHA-256 of a file, streamed in 8 KiB chunks
pub fn hash_file(path: &Path) -> ScrubResult<String> {
    let mut file = File::open(path).map_err(|err| ScrubError::io(path, err))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf).map_err(|err| ScrubError::io(path, err))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn write_sidecar(record: &BackupRecord) -> ScrubResult<()> {
    let path = record.sidecar_path();
    let json = serde_json::to_string_pretty(record).map_err(|err| ScrubError::ParseFailure {
        path: path.clone(),
        reason: err.to_string(),
    })?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp =
        tempfile::NamedTempFile::new_in(dir).map_err(|err| ScrubError::io(&path, err))?;
    tmp.write_all(json.as_bytes())
        .map_err(|err| ScrubError::io(&path, err))?;
    tmp.as_file()
        .sync_all()
        .map_err(|err| ScrubError::io(&path, err))?;
    tmp.persist(&path)
        .map_err(|err| ScrubError::io(&path, err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::tempdir;

    fn source_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_open_creates_category_shelves() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("backups");
        BackupStore::open(&root, 3).unwrap();

        for category in BackupCategory::ALL {
            assert!(root.join(category.dir_name()).is_dir());
        }
    }

    #[test]
    fn test_create_backup_round_trip() {
        let dir = tempdir().unwrap();
        let source = source_file(dir.path(), "state.vscdb", "original bytes");
        let store = BackupStore::open(&dir.path().join("backups"), 3).unwrap();

        let record = store
            .create_backup(&source, BackupCategory::Database, "pre-clean snapshot")
            .unwrap();

        assert!(record.valid);
        assert!(record.backup_path.is_file());
        assert!(record.sidecar_path().is_file());
        assert_eq!(record.size_bytes, "original bytes".len() as u64);
        assert_eq!(
            fs::read(&record.backup_path).unwrap(),
            fs::read(&source).unwrap()
        );
        assert!(store.verify_integrity(&record).unwrap());
    }

    #[test]
    fn test_missing_source_is_rejected() {
        let dir = tempdir().unwrap();
        let store = BackupStore::open(&dir.path().join("backups"), 3).unwrap();

        let err = store
            .create_backup(
                Path::new("/nonexistent/state.vscdb"),
                BackupCategory::Database,
                "",
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceNotFound);
    }

    #[test]
    fn test_vanished_root_is_not_initialized() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("backups");
        let source = source_file(dir.path(), "storage.json", "{}");
        let store = BackupStore::open(&root, 3).unwrap();

        fs::remove_dir_all(&root).unwrap();

        let err = store
            .create_backup(&source, BackupCategory::Telemetry, "")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotInitialized);
        assert_eq!(
            store.list_backups(None).unwrap_err().kind(),
            ErrorKind::NotInitialized
        );
    }

    #[test]
    fn test_corrupted_backup_fails_verification() {
        let dir = tempdir().unwrap();
        let source = source_file(dir.path(), "storage.json", r#"{"a": 1}"#);
        let store = BackupStore::open(&dir.path().join("backups"), 3).unwrap();

        let record = store
            .create_backup(&source, BackupCategory::Telemetry, "")
            .unwrap();
        fs::write(&record.backup_path, "tampered").unwrap();

        assert!(!store.verify_integrity(&record).unwrap());
        let err = store.restore(&record).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IntegrityFailure);
    }

    #[test]
    fn test_revalidate_persists_the_flag() {
        let dir = tempdir().unwrap();
        let source = source_file(dir.path(), "storage.json", "{}");
        let store = BackupStore::open(&dir.path().join("backups"), 3).unwrap();

        let mut record = store
            .create_backup(&source, BackupCategory::Telemetry, "")
            .unwrap();
        fs::write(&record.backup_path, "tampered").unwrap();

        assert!(!store.revalidate(&mut record).unwrap());
        assert!(!record.valid);

        let sidecar = fs::read_to_string(record.sidecar_path()).unwrap();
        let reloaded: BackupRecord = serde_json::from_str(&sidecar).unwrap();
        assert!(!reloaded.valid);
    }

    #[test]
    fn test_restore_round_trip() {
        let dir = tempdir().unwrap();
        let source = source_file(dir.path(), "state.vscdb", "before");
        let store = BackupStore::open(&dir.path().join("backups"), 3).unwrap();

        let record = store
            .create_backup(&source, BackupCategory::Database, "")
            .unwrap();
        fs::write(&source, "after").unwrap();

        store.restore(&record).unwrap();
        assert_eq!(fs::read_to_string(&source).unwrap(), "before");
    }

    #[test]
    fn test_retention_evicts_oldest_first() {
        let dir = tempdir().unwrap();
        let source = source_file(dir.path(), "state.vscdb", "payload");
        let store = BackupStore::open(&dir.path().join("backups"), 3).unwrap();

        let mut created = Vec::new();
        for _ in 0..5 {
            created.push(
                store
                    .create_backup(&source, BackupCategory::Database, "")
                    .unwrap(),
            );
        }

        let remaining = store.list_backups(Some(BackupCategory::Database)).unwrap();
        assert_eq!(remaining.len(), 3);

        // The two oldest copies are gone, the three newest survive
        assert!(!created[0].backup_path.exists());
        assert!(!created[1].backup_path.exists());
        for record in &created[2..] {
            assert!(record.backup_path.is_file());
            assert!(record.sidecar_path().is_file());
        }
    }

    #[test]
    fn test_retention_is_per_category() {
        let dir = tempdir().unwrap();
        let db = source_file(dir.path(), "state.vscdb", "db");
        let json = source_file(dir.path(), "storage.json", "{}");
        let store = BackupStore::open(&dir.path().join("backups"), 1).unwrap();

        store
            .create_backup(&db, BackupCategory::Database, "")
            .unwrap();
        store
            .create_backup(&json, BackupCategory::Telemetry, "")
            .unwrap();

        assert_eq!(store.list_backups(None).unwrap().len(), 2);
    }

    #[test]
    fn test_same_second_names_get_disambiguated() {
        let dir = tempdir().unwrap();
        let shelf = dir.path().join("databases");
        fs::create_dir_all(&shelf).unwrap();

        let first = next_backup_path(&shelf, "20260101_120000", "state.vscdb").unwrap();
        fs::write(&first, "x").unwrap();
        let second = next_backup_path(&shelf, "20260101_120000", "state.vscdb").unwrap();

        assert_ne!(first, second);
        assert!(second
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("20260101_120000_1_"));
    }

    #[test]
    fn test_list_filters_by_category() {
        let dir = tempdir().unwrap();
        let db = source_file(dir.path(), "state.vscdb", "db");
        let json = source_file(dir.path(), "storage.json", "{}");
        let store = BackupStore::open(&dir.path().join("backups"), 3).unwrap();

        store
            .create_backup(&db, BackupCategory::Database, "")
            .unwrap();
        store
            .create_backup(&json, BackupCategory::Telemetry, "")
            .unwrap();

        let databases = store.list_backups(Some(BackupCategory::Database)).unwrap();
        assert_eq!(databases.len(), 1);
        assert_eq!(databases[0].category, BackupCategory::Database);
    }

    #[test]
    fn test_hash_file_is_stable_hex() {
        let dir = tempdir().unwrap();
        let path = source_file(dir.path(), "a.txt", "abc");

        let hash = hash_file(&path).unwrap();
        // Known SHA-256 of "abc"
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
