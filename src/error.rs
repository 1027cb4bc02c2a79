//! Error taxonomy shared across discovery, backup, and mutation

use std::path::{Path, PathBuf};

pub type ScrubResult<T> = std::result::Result<T, ScrubError>;

/// Errors produced by backup management and file mutation.
#[derive(Debug, thiserror::Error)]
pub enum ScrubError {
    #[error("backup store root is missing: {0}")]
    NotInitialized(PathBuf),

    #[error("source file not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("file is locked by another process: {0}")]
    Locked(PathBuf),

    #[error("backup failed integrity verification: {0}")]
    IntegrityFailure(PathBuf),

    #[error("malformed content in {path}: {reason}")]
    ParseFailure { path: PathBuf, reason: String },

    #[error("statement rejected by query guard: {0}")]
    QueryRejected(String),

    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("secure random source unavailable: {0}")]
    RandomSourceUnavailable(String),

    #[error("{path} is {size_bytes} bytes, over the {limit_bytes}-byte mutation ceiling (pass --force to override)")]
    Oversize {
        path: PathBuf,
        size_bytes: u64,
        limit_bytes: u64,
    },

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("database error on {path}: {source}")]
    Database {
        path: PathBuf,
        source: rusqlite::Error,
    },
}

/// Coarse classification of a [`ScrubError`], used in per-file reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotInitialized,
    SourceNotFound,
    Locked,
    IntegrityFailure,
    ParseFailure,
    QueryRejected,
    PermissionDenied,
    RandomSourceUnavailable,
    Oversize,
    Io,
    Database,
}

impl ScrubError {
    /// Wrap an io error, promoting not-found and permission failures to
    /// their dedicated kinds.
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::SourceNotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }

    /// Wrap a SQLite error, promoting busy/locked failures to [`ScrubError::Locked`].
    pub fn database(path: &Path, source: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(code, _) = &source {
            if matches!(
                code.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) {
                return Self::Locked(path.to_path_buf());
            }
        }
        Self::Database {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotInitialized(_) => ErrorKind::NotInitialized,
            Self::SourceNotFound(_) => ErrorKind::SourceNotFound,
            Self::Locked(_) => ErrorKind::Locked,
            Self::IntegrityFailure(_) => ErrorKind::IntegrityFailure,
            Self::ParseFailure { .. } => ErrorKind::ParseFailure,
            Self::QueryRejected(_) => ErrorKind::QueryRejected,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::RandomSourceUnavailable(_) => ErrorKind::RandomSourceUnavailable,
            Self::Oversize { .. } => ErrorKind::Oversize,
            Self::Io { .. } => ErrorKind::Io,
            Self::Database { .. } => ErrorKind::Database,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NotInitialized => "not-initialized",
            Self::SourceNotFound => "source-not-found",
            Self::Locked => "locked",
            Self::IntegrityFailure => "integrity-failure",
            Self::ParseFailure => "parse-failure",
            Self::QueryRejected => "query-rejected",
            Self::PermissionDenied => "permission-denied",
            Self::RandomSourceUnavailable => "random-source-unavailable",
            Self::Oversize => "oversize",
            Self::Io => "io",
            Self::Database => "database",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_not_found_maps_to_source_not_found() {
        let err = ScrubError::io(
            Path::new("/tmp/missing.json"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.kind(), ErrorKind::SourceNotFound);
    }

    #[test]
    fn test_io_permission_maps_to_permission_denied() {
        let err = ScrubError::io(
            Path::new("/tmp/readonly.json"),
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no"),
        );
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_other_io_stays_io() {
        let err = ScrubError::io(
            Path::new("/tmp/x"),
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof"),
        );
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_busy_database_maps_to_locked() {
        let source = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        );
        let err = ScrubError::database(Path::new("/tmp/state.vscdb"), source);
        assert_eq!(err.kind(), ErrorKind::Locked);
    }

    #[test]
    fn test_kind_display_names() {
        assert_eq!(ErrorKind::QueryRejected.to_string(), "query-rejected");
        assert_eq!(ErrorKind::Locked.to_string(), "locked");
    }
}
