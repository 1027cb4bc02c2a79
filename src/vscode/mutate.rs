//! Mutation dispatch
//!
//! Applies an identity mutation to one discovered target: probes for
//! exclusive access, refuses oversize files, sniffs the on-disk
//! representation, and dispatches to the structured or tabular path.
//! Failures never abort the run; each target's outcome carries its error.

use fs2::FileExt;
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::path::{Path, PathBuf};

use super::{state_db, storage};
use crate::error::{ErrorKind, ScrubError, ScrubResult};
use crate::identity::IdentifierSet;

/// Files over this size are refused without --force
pub const SIZE_CEILING: u64 = 512 * 1024 * 1024;

/// SQLite database file header
const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

/// How a target stores its data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    Structured,
    Tabular,
}

/// Outcome of one target mutation
#[derive(Debug)]
pub struct MutationResult {
    pub target: PathBuf,
    /// Rewritten JSON keys or deleted row keys
    pub modified_keys: BTreeSet<String>,
    pub error: Option<ScrubError>,
}

impl MutationResult {
    fn ok(target: &Path, modified_keys: BTreeSet<String>) -> Self {
        Self {
            target: target.to_path_buf(),
            modified_keys,
            error: None,
        }
    }

    fn failed(target: &Path, error: ScrubError) -> Self {
        Self {
            target: target.to_path_buf(),
            modified_keys: BTreeSet::new(),
            error: Some(error),
        }
    }

    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    pub fn changed(&self) -> bool {
        !self.modified_keys.is_empty()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(ScrubError::kind)
    }
}

/// Applies one identifier set to discovered targets
pub struct MutationEngine {
    pub size_ceiling: u64,
    pub force: bool,
}

impl MutationEngine {
    pub fn new(force: bool) -> Self {
        Self {
            size_ceiling: SIZE_CEILING,
            force,
        }
    }

    /// Apply the identifier set to one target
    pub fn mutate(&self, target: &Path, ids: &IdentifierSet) -> MutationResult {
        match self.try_mutate(target, ids) {
            Ok(keys) => MutationResult::ok(target, keys),
            Err(err) => MutationResult::failed(target, err),
        }
    }

    fn try_mutate(&self, target: &Path, ids: &IdentifierSet) -> ScrubResult<BTreeSet<String>> {
        self.preflight(target)?;
        match detect_representation(target)? {
            Representation::Tabular => {
                let outcome = state_db::purge(target)?;
                Ok(outcome.deleted_keys.into_iter().collect())
            }
            Representation::Structured => storage::rewrite_identifiers(target, ids),
        }
    }

    /// The machineid file holds a bare identifier, not JSON, so it has its
    /// own path through the engine
    pub fn mutate_machine_id_file(&self, target: &Path, ids: &IdentifierSet) -> MutationResult {
        let outcome = self
            .preflight(target)
            .and_then(|_| storage::rewrite_machine_id_file(target, ids));
        match outcome {
            Ok(true) => {
                let mut keys = BTreeSet::new();
                keys.insert("machineid".to_string());
                MutationResult::ok(target, keys)
            }
            Ok(false) => MutationResult::ok(target, BTreeSet::new()),
            Err(err) => MutationResult::failed(target, err),
        }
    }

    /// How many rows or keys a mutation would touch, using the exact
    /// predicates of the destructive path
    pub fn preview(&self, target: &Path) -> ScrubResult<usize> {
        match detect_representation(target)? {
            Representation::Tabular => state_db::count_purgeable(target),
            Representation::Structured => Ok(storage::current_identifiers(target)?.len()),
        }
    }

    /// Lock probe and size sanity check, before any bytes change
    pub fn preflight(&self, target: &Path) -> ScrubResult<()> {
        let metadata = std::fs::metadata(target).map_err(|err| ScrubError::io(target, err))?;
        if !self.force && metadata.len() > self.size_ceiling {
            return Err(ScrubError::Oversize {
                path: target.to_path_buf(),
                size_bytes: metadata.len(),
                limit_bytes: self.size_ceiling,
            });
        }
        probe_lock(target)
    }
}

/// Take and immediately release an exclusive lock. A refusal means another
/// process is holding the file open.
pub fn probe_lock(target: &Path) -> ScrubResult<()> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(target)
        .map_err(|err| ScrubError::io(target, err))?;

    match file.try_lock_exclusive() {
        Ok(()) => {
            let _ = file.unlock();
            Ok(())
        }
        Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
            Err(ScrubError::Locked(target.to_path_buf()))
        }
        Err(err) => Err(ScrubError::io(target, err)),
    }
}

/// Sniff the on-disk representation from the file header
pub fn detect_representation(target: &Path) -> ScrubResult<Representation> {
    let mut file = File::open(target).map_err(|err| ScrubError::io(target, err))?;
    let mut magic = [0u8; 16];
    match file.read_exact(&mut magic) {
        Ok(()) if &magic == SQLITE_MAGIC => Ok(Representation::Tabular),
        Ok(()) => Ok(Representation::Structured),
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
            Ok(Representation::Structured)
        }
        Err(err) => Err(ScrubError::io(target, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn ids() -> IdentifierSet {
        IdentifierSet::generate().unwrap()
    }

    fn json_fixture(dir: &Path) -> PathBuf {
        let path = dir.join("storage.json");
        fs::write(
            &path,
            r#"{"telemetry.machineId": "old", "unrelated": "X"}"#,
        )
        .unwrap();
        path
    }

    fn db_fixture(dir: &Path) -> PathBuf {
        let path = dir.join("state.vscdb");
        let conn = Connection::open(&path).unwrap();
        conn.execute(
            "CREATE TABLE ItemTable (key TEXT UNIQUE ON CONFLICT REPLACE, value BLOB)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO ItemTable (key, value) VALUES ('augment.state', 'x')",
            [],
        )
        .unwrap();
        path
    }

    #[test]
    fn test_detects_sqlite_by_magic() {
        let dir = tempdir().unwrap();
        let db = db_fixture(dir.path());
        assert_eq!(detect_representation(&db).unwrap(), Representation::Tabular);
    }

    #[test]
    fn test_detects_json_as_structured() {
        let dir = tempdir().unwrap();
        let json = json_fixture(dir.path());
        assert_eq!(
            detect_representation(&json).unwrap(),
            Representation::Structured
        );
    }

    #[test]
    fn test_short_file_is_structured() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tiny");
        fs::write(&path, "{}").unwrap();
        assert_eq!(
            detect_representation(&path).unwrap(),
            Representation::Structured
        );
    }

    #[test]
    fn test_mutate_dispatches_to_structured_path() {
        let dir = tempdir().unwrap();
        let json = json_fixture(dir.path());

        let set = ids();
        let result = MutationEngine::new(false).mutate(&json, &set);

        assert!(result.success());
        assert!(result.modified_keys.contains("telemetry.machineId"));
        let content = fs::read_to_string(&json).unwrap();
        assert!(content.contains(&set.machine_id));
    }

    #[test]
    fn test_mutate_dispatches_to_tabular_path() {
        let dir = tempdir().unwrap();
        let db = db_fixture(dir.path());

        let result = MutationEngine::new(false).mutate(&db, &ids());

        assert!(result.success());
        assert!(result.modified_keys.contains("augment.state"));
    }

    #[test]
    fn test_locked_target_is_left_untouched() {
        let dir = tempdir().unwrap();
        let json = json_fixture(dir.path());
        let before = fs::read(&json).unwrap();

        // A second handle holding the exclusive lock stands in for a
        // running editor
        let holder = OpenOptions::new().read(true).write(true).open(&json).unwrap();
        holder.lock_exclusive().unwrap();

        let result = MutationEngine::new(false).mutate(&json, &ids());

        assert!(!result.success());
        assert_eq!(result.error_kind(), Some(ErrorKind::Locked));
        assert_eq!(fs::read(&json).unwrap(), before);

        holder.unlock().unwrap();
    }

    #[test]
    fn test_oversize_target_is_refused() {
        let dir = tempdir().unwrap();
        let json = json_fixture(dir.path());

        let engine = MutationEngine {
            size_ceiling: 4,
            force: false,
        };
        let result = engine.mutate(&json, &ids());

        assert!(!result.success());
        assert_eq!(result.error_kind(), Some(ErrorKind::Oversize));
    }

    #[test]
    fn test_force_overrides_size_ceiling() {
        let dir = tempdir().unwrap();
        let json = json_fixture(dir.path());

        let engine = MutationEngine {
            size_ceiling: 4,
            force: true,
        };
        let result = engine.mutate(&json, &ids());
        assert!(result.success());
    }

    #[test]
    fn test_preview_matches_mutation_scope() {
        let dir = tempdir().unwrap();
        let db = db_fixture(dir.path());

        let engine = MutationEngine::new(false);
        let previewed = engine.preview(&db).unwrap();
        let result = engine.mutate(&db, &ids());

        assert_eq!(previewed, result.modified_keys.len());
    }

    #[test]
    fn test_missing_target_reports_source_not_found() {
        let result =
            MutationEngine::new(false).mutate(Path::new("/nonexistent/storage.json"), &ids());
        assert_eq!(result.error_kind(), Some(ErrorKind::SourceNotFound));
    }

    #[test]
    fn test_machine_id_file_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("machineid");
        fs::write(&path, "00000000-0000-0000-0000-000000000000").unwrap();

        let set = ids();
        let result = MutationEngine::new(false).mutate_machine_id_file(&path, &set);

        assert!(result.success());
        assert!(result.changed());
        assert_eq!(fs::read_to_string(&path).unwrap(), set.device_id);
    }
}
