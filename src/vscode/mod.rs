//! Editor state discovery and mutation

pub mod classify;
pub mod discover;
pub mod mutate;
pub mod registry;
pub mod state_db;
pub mod storage;

// Re-exports for library consumers
#[allow(unused_imports)]
pub use classify::{ArtifactKind, Classifier, Priority};
#[allow(unused_imports)]
pub use discover::{ArtifactRecord, DiscoveryEngine, Inventory, ScanMode, ScanOptions};
#[allow(unused_imports)]
pub use mutate::{MutationEngine, MutationResult};
