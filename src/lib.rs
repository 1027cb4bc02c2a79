//! vscrub library
//!
//! Core functionality for inspecting and resetting the locally stored
//! identity of VS Code-family editors: discovery of identity-bearing
//! files, verified backups, and the mutation paths that rewrite telemetry
//! identifiers and purge extension state.

pub mod backup;
pub mod config;
pub mod error;
pub mod identity;
pub mod output;
pub mod vscode;
