//! Structured store operations
//!
//! Rewrites the telemetry identifier keys kept at the top level of a
//! variant's `globalStorage/storage.json`. Only keys already present are
//! touched; absent keys are never invented.

use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{ScrubError, ScrubResult};
use crate::identity::IdentifierSet;

/// Which identifier a recognized key receives
#[derive(Debug, Clone, Copy)]
enum Field {
    MachineId,
    DeviceId,
    SqmId,
    SessionId,
    InstallationId,
    SessionDate,
}

impl Field {
    fn value_for(&self, ids: &IdentifierSet) -> String {
        match self {
            Self::MachineId => ids.machine_id.clone(),
            Self::DeviceId => ids.device_id.clone(),
            Self::SqmId => ids.sqm_id.clone(),
            Self::SessionId => ids.session_id.clone(),
            Self::InstallationId => ids.installation_id.clone(),
            Self::SessionDate => ids.session_date(),
        }
    }
}

/// Identifier keys recognized at the top level, exact case
const IDENTIFIER_KEYS: &[(&str, Field)] = &[
    ("telemetry.machineId", Field::MachineId),
    ("machineId", Field::MachineId),
    ("telemetry.devDeviceId", Field::DeviceId),
    ("devDeviceId", Field::DeviceId),
    ("telemetry.sqmId", Field::SqmId),
    ("sqmId", Field::SqmId),
    ("telemetry.sessionId", Field::SessionId),
    ("sessionId", Field::SessionId),
    ("telemetry.instanceId", Field::InstallationId),
    ("instanceId", Field::InstallationId),
    ("installationId", Field::InstallationId),
    ("telemetry.firstSessionDate", Field::SessionDate),
    ("firstSessionDate", Field::SessionDate),
    ("telemetry.lastSessionDate", Field::SessionDate),
    ("lastSessionDate", Field::SessionDate),
];

fn is_identifier_key(key: &str) -> bool {
    IDENTIFIER_KEYS.iter().any(|(known, _)| *known == key)
}

/// Rewrite every recognized identifier key present in a storage.json file.
///
/// Returns the set of keys whose value actually changed. The file is only
/// rewritten when that set is non-empty, via a temp file in the same
/// directory so a crash never leaves a half-written store.
pub fn rewrite_identifiers<P: AsRef<Path>>(
    storage_path: P,
    ids: &IdentifierSet,
) -> ScrubResult<BTreeSet<String>> {
    let storage_path = storage_path.as_ref();

    let content =
        fs::read_to_string(storage_path).map_err(|err| ScrubError::io(storage_path, err))?;

    let mut json: Value = serde_json::from_str(&content).map_err(|err| ScrubError::ParseFailure {
        path: storage_path.to_path_buf(),
        reason: err.to_string(),
    })?;

    let Some(map) = json.as_object_mut() else {
        return Err(ScrubError::ParseFailure {
            path: storage_path.to_path_buf(),
            reason: "top level is not an object".to_string(),
        });
    };

    let mut modified = BTreeSet::new();
    for (key, field) in IDENTIFIER_KEYS {
        let Some(slot) = map.get_mut(*key) else {
            continue;
        };
        let new_value = field.value_for(ids);
        if slot.as_str() != Some(new_value.as_str()) {
            *slot = Value::String(new_value);
            modified.insert((*key).to_string());
        }
    }

    if !modified.is_empty() {
        let new_content =
            serde_json::to_string_pretty(&json).map_err(|err| ScrubError::ParseFailure {
                path: storage_path.to_path_buf(),
                reason: err.to_string(),
            })?;
        write_atomic(storage_path, new_content.as_bytes())?;
    }

    Ok(modified)
}

/// Current values of every recognized identifier key, in file order
pub fn current_identifiers<P: AsRef<Path>>(storage_path: P) -> ScrubResult<Vec<(String, String)>> {
    let storage_path = storage_path.as_ref();

    let content =
        fs::read_to_string(storage_path).map_err(|err| ScrubError::io(storage_path, err))?;

    let json: Value = serde_json::from_str(&content).map_err(|err| ScrubError::ParseFailure {
        path: storage_path.to_path_buf(),
        reason: err.to_string(),
    })?;

    let Some(map) = json.as_object() else {
        return Err(ScrubError::ParseFailure {
            path: storage_path.to_path_buf(),
            reason: "top level is not an object".to_string(),
        });
    };

    Ok(map
        .iter()
        .filter(|(key, _)| is_identifier_key(key))
        .map(|(key, value)| {
            let rendered = value
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string());
            (key.clone(), rendered)
        })
        .collect())
}

/// Rewrite the bare machineid file with the fresh device identifier
pub fn rewrite_machine_id_file<P: AsRef<Path>>(
    path: P,
    ids: &IdentifierSet,
) -> ScrubResult<bool> {
    let path = path.as_ref();

    let current = fs::read_to_string(path).map_err(|err| ScrubError::io(path, err))?;
    if current.trim() == ids.device_id {
        return Ok(false);
    }

    write_atomic(path, ids.device_id.as_bytes())?;
    Ok(true)
}

/// Replace a file through a temp sibling plus rename
fn write_atomic(path: &Path, content: &[u8]) -> ScrubResult<()> {
    let parent = path.parent().unwrap_or(Path::new("."));

    let mut tmp =
        tempfile::NamedTempFile::new_in(parent).map_err(|err| ScrubError::io(path, err))?;
    tmp.write_all(content)
        .map_err(|err| ScrubError::io(path, err))?;
    tmp.as_file()
        .sync_all()
        .map_err(|err| ScrubError::io(path, err))?;
    tmp.persist(path)
        .map_err(|err| ScrubError::io(path, err.error))?;

    Ok(())
}
