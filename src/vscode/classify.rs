//! Artifact relevance classification
//!
//! Decides whether a path holds editor identity or extension residue, first
//! by filename against a curated glob table, then by scanning small files
//! for identity keywords.

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::path::Path;

/// Largest file the content scan will read (bytes)
pub const CONTENT_SCAN_CEILING: u64 = 1024 * 1024;

/// What kind of artifact a path is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Database,
    Config,
    Cache,
    Extension,
    Registry,
    Temp,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Database => "database",
            Self::Config => "config",
            Self::Cache => "cache",
            Self::Extension => "extension",
            Self::Registry => "registry",
            Self::Temp => "temp",
        };
        write!(f, "{}", name)
    }
}

/// How careful handling of the artifact must be, Critical first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    Important,
    Sensitive,
    Optional,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Critical => "critical",
            Self::Important => "important",
            Self::Sensitive => "sensitive",
            Self::Optional => "optional",
        };
        write!(f, "{}", name)
    }
}

/// Filename rules, most specific first. The first matching rule wins.
const NAME_RULES: &[(&str, ArtifactKind, Priority)] = &[
    // Editor state artifacts
    ("state.vscdb", ArtifactKind::Database, Priority::Critical),
    ("state.vscdb.backup", ArtifactKind::Database, Priority::Important),
    ("storage.json", ArtifactKind::Config, Priority::Critical),
    ("machineid", ArtifactKind::Config, Priority::Critical),
    ("*.vscdb", ArtifactKind::Database, Priority::Critical),
    ("*.sqlite", ArtifactKind::Database, Priority::Important),
    ("*.sqlite3", ArtifactKind::Database, Priority::Important),
    // Extension residue
    ("*augment*", ArtifactKind::Extension, Priority::Important),
    ("*context7*", ArtifactKind::Extension, Priority::Important),
    // Trial and license markers
    ("*trial*", ArtifactKind::Config, Priority::Sensitive),
    ("*license*", ArtifactKind::Config, Priority::Sensitive),
    ("*subscription*", ArtifactKind::Config, Priority::Sensitive),
    // Auth and session material
    ("*cookies*", ArtifactKind::Config, Priority::Sensitive),
    ("*token*cache*", ArtifactKind::Config, Priority::Sensitive),
    ("*auth*session*", ArtifactKind::Config, Priority::Sensitive),
    ("*auth*token*", ArtifactKind::Config, Priority::Sensitive),
];

/// Keywords looked for inside small files whose name matched nothing
const CONTENT_KEYWORDS: &[(&str, ArtifactKind, Priority)] = &[
    ("augment", ArtifactKind::Extension, Priority::Important),
    ("context7", ArtifactKind::Extension, Priority::Important),
    ("machineid", ArtifactKind::Config, Priority::Critical),
    ("devdeviceid", ArtifactKind::Config, Priority::Critical),
    ("sqmid", ArtifactKind::Config, Priority::Critical),
    ("trial", ArtifactKind::Config, Priority::Sensitive),
    ("access_token", ArtifactKind::Config, Priority::Sensitive),
    ("refresh_token", ArtifactKind::Config, Priority::Sensitive),
];

/// Classifies paths against the rule tables above
pub struct Classifier {
    name_rules: GlobSet,
    rule_meta: Vec<(ArtifactKind, Priority)>,
}

impl Classifier {
    pub fn new() -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        let mut rule_meta = Vec::with_capacity(NAME_RULES.len());

        for (pattern, kind, priority) in NAME_RULES {
            let glob = GlobBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .with_context(|| format!("Invalid filename pattern: {}", pattern))?;
            builder.add(glob);
            rule_meta.push((*kind, *priority));
        }

        let name_rules = builder
            .build()
            .context("Failed to build filename pattern set")?;

        Ok(Self {
            name_rules,
            rule_meta,
        })
    }

    /// Classify a path by its filename alone
    pub fn classify_name(&self, path: &Path) -> Option<(ArtifactKind, Priority)> {
        let name = path.file_name()?;
        let index = self.name_rules.matches(name).into_iter().next()?;
        Some(self.rule_meta[index])
    }

    /// Whether a file that missed every filename rule is small enough for
    /// the content scan
    pub fn scannable(&self, size_bytes: u64) -> bool {
        size_bytes <= CONTENT_SCAN_CEILING
    }

    /// Classify a file by scanning its content for identity keywords.
    /// Callers only hand over content of files within the scan ceiling.
    pub fn classify_content(&self, content: &str) -> Option<(ArtifactKind, Priority)> {
        let lowered = content.to_lowercase();
        CONTENT_KEYWORDS
            .iter()
            .find(|(keyword, _, _)| lowered.contains(keyword))
            .map(|(_, kind, priority)| (*kind, *priority))
    }

    /// Classify a registry value by its rendered `key\name = value` text.
    /// The kind is always [`ArtifactKind::Registry`]; only the priority is
    /// taken from the keyword table.
    pub fn classify_registry(&self, rendered: &str) -> Option<Priority> {
        let lowered = rendered.to_lowercase();
        CONTENT_KEYWORDS
            .iter()
            .find(|(keyword, _, _)| lowered.contains(keyword))
            .map(|(_, _, priority)| *priority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new().unwrap()
    }

    #[test]
    fn test_state_db_is_critical_database() {
        let c = classifier();
        let result = c.classify_name(Path::new("/data/User/globalStorage/state.vscdb"));
        assert_eq!(result, Some((ArtifactKind::Database, Priority::Critical)));
    }

    #[test]
    fn test_storage_json_is_critical_config() {
        let c = classifier();
        let result = c.classify_name(Path::new("/data/User/globalStorage/storage.json"));
        assert_eq!(result, Some((ArtifactKind::Config, Priority::Critical)));
    }

    #[test]
    fn test_name_match_is_case_insensitive() {
        let c = classifier();
        let result = c.classify_name(Path::new("/ext/Augment.vscode-augment-1.2.3"));
        assert_eq!(result, Some((ArtifactKind::Extension, Priority::Important)));
    }

    #[test]
    fn test_backup_copy_keeps_lower_priority() {
        let c = classifier();
        let result = c.classify_name(Path::new("/data/state.vscdb.backup"));
        assert_eq!(result, Some((ArtifactKind::Database, Priority::Important)));
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let c = classifier();
        // Matches both *augment* and *trial*; table order decides
        let result = c.classify_name(Path::new("/data/augment-trial.json"));
        assert_eq!(result, Some((ArtifactKind::Extension, Priority::Important)));
    }

    #[test]
    fn test_trial_marker_is_sensitive() {
        let c = classifier();
        let result = c.classify_name(Path::new("/data/trial-info.json"));
        assert_eq!(result, Some((ArtifactKind::Config, Priority::Sensitive)));
    }

    #[test]
    fn test_auth_session_names_are_sensitive() {
        let c = classifier();
        for name in [
            "token_cache.json",
            "auth_session.db",
            "Cookies",
            "auth-token.json",
        ] {
            let result = c.classify_name(Path::new(name));
            assert_eq!(
                result,
                Some((ArtifactKind::Config, Priority::Sensitive)),
                "{} should match an auth/session rule",
                name
            );
        }
    }

    #[test]
    fn test_unrelated_name_does_not_match() {
        let c = classifier();
        assert_eq!(c.classify_name(Path::new("/data/settings.json")), None);
        assert_eq!(c.classify_name(Path::new("/data/keybindings.json")), None);
    }

    #[test]
    fn test_content_scan_finds_keywords() {
        let c = classifier();
        let content = r#"{"telemetry.machineId": "abc123"}"#;
        let result = c.classify_content(content);
        assert_eq!(result, Some((ArtifactKind::Config, Priority::Critical)));
    }

    #[test]
    fn test_content_scan_is_case_insensitive() {
        let c = classifier();
        let result = c.classify_content("AUGMENT session data");
        assert_eq!(result, Some((ArtifactKind::Extension, Priority::Important)));
    }

    #[test]
    fn test_content_scan_misses_clean_content() {
        let c = classifier();
        assert_eq!(c.classify_content(r#"{"editor.fontSize": 14}"#), None);
    }

    #[test]
    fn test_scannable_ceiling() {
        let c = classifier();
        assert!(c.scannable(CONTENT_SCAN_CEILING));
        assert!(!c.scannable(CONTENT_SCAN_CEILING + 1));
    }

    #[test]
    fn test_registry_classification() {
        let c = classifier();
        let priority = c.classify_registry(r"HKCU\Software\Microsoft\SQMClient\MachineId = {GUID}");
        assert_eq!(priority, Some(Priority::Critical));
        assert_eq!(c.classify_registry(r"HKCU\Software\Example\Theme = dark"), None);
    }

    #[test]
    fn test_priority_orders_critical_first() {
        assert!(Priority::Critical < Priority::Important);
        assert!(Priority::Important < Priority::Sensitive);
        assert!(Priority::Sensitive < Priority::Optional);
    }
}
