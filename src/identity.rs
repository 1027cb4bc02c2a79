//! Fresh identity generation
//!
//! Produces the replacement device/telemetry identifiers written during an
//! identity reset. All entropy comes from the operating system random
//! source; failure to draw bytes aborts the run.

use chrono::{DateTime, Utc};

use crate::error::{ScrubError, ScrubResult};

/// Length of `telemetry.machineId` values
pub const MACHINE_ID_LEN: usize = 64;

/// Generate a lowercase hex string of exactly `len` characters
pub fn generate_hex(len: usize) -> ScrubResult<String> {
    let mut bytes = vec![0u8; len.div_ceil(2)];
    getrandom::getrandom(&mut bytes)
        .map_err(|err| ScrubError::RandomSourceUnavailable(err.to_string()))?;

    // Odd lengths draw one spare byte and drop the trailing nibble
    let mut encoded = hex::encode(bytes);
    encoded.truncate(len);
    Ok(encoded)
}

/// Generate an RFC 4122 version 4 UUID (lowercase, hyphenated)
pub fn generate_uuid() -> ScrubResult<String> {
    let mut bytes = [0u8; 16];
    getrandom::getrandom(&mut bytes)
        .map_err(|err| ScrubError::RandomSourceUnavailable(err.to_string()))?;

    let uuid = uuid::Builder::from_random_bytes(bytes).into_uuid();
    Ok(uuid.to_string())
}

/// One freshly generated identity, shared by every target in a run
#[derive(Debug, Clone)]
pub struct IdentifierSet {
    /// 64-character hex machine identifier
    pub machine_id: String,
    /// UUIDv4 device identifier
    pub device_id: String,
    /// UUIDv4 SQM identifier
    pub sqm_id: String,
    /// UUIDv4 session identifier
    pub session_id: String,
    /// UUIDv4 installation identifier
    pub installation_id: String,
    /// UUIDv4 user identifier
    pub user_id: String,
    /// When this set was generated
    pub generated_at: DateTime<Utc>,
}

impl IdentifierSet {
    /// Generate a complete set. Called once per mutating invocation so every
    /// target in the run receives the same values.
    pub fn generate() -> ScrubResult<Self> {
        Ok(Self {
            machine_id: generate_hex(MACHINE_ID_LEN)?,
            device_id: generate_uuid()?,
            sqm_id: generate_uuid()?,
            session_id: generate_uuid()?,
            installation_id: generate_uuid()?,
            user_id: generate_uuid()?,
            generated_at: Utc::now(),
        })
    }

    /// Session date string written into firstSessionDate/lastSessionDate
    pub fn session_date(&self) -> String {
        self.generated_at
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string()
    }
}
