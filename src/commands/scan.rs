//! Scan command - Inventory identity-bearing artifacts without changing them

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, ContentArrangement, Table};
use owo_colors::OwoColorize;
use std::fs;
use std::path::PathBuf;

use super::utils;
use crate::config;
use crate::output;
use crate::vscode::discover::{DiscoveryEngine, Inventory, ScanMode, ScanOptions};

/// Scan flags from the CLI
#[derive(Debug, Clone, Default)]
pub struct ScanArgs {
    /// Walk profile, cache, and temp roots too
    pub comprehensive: bool,
    /// Include Windows registry identity values
    pub registry: bool,
    /// Include system temp roots without a full comprehensive walk
    pub include_temp: bool,
    /// Write the inventory as JSON to this file
    pub export: Option<PathBuf>,
}

/// Execute the scan command
pub fn execute(args: &ScanArgs) -> Result<()> {
    let variants = config::detect_installed();

    if variants.is_empty() {
        println!("No supported editors found on this machine.");
        return Ok(());
    }

    output::section("Scanning editor data");
    for paths in &variants {
        println!(
            "  {} {} ({})",
            "Found:".green(),
            paths.variant,
            paths.data_root.display()
        );
    }

    let engine = DiscoveryEngine::new()?;
    let mut inventory = engine.discover(&variants, &scan_options(args));
    inventory.sort_for_display();

    println!();
    print_inventory(&inventory);

    for skipped in &inventory.skipped {
        output::warn(&format!(
            "Skipped {}: {}",
            skipped.path.display(),
            skipped.reason
        ));
    }

    if let Some(path) = &args.export {
        let json = serde_json::to_string_pretty(&inventory.export())?;
        fs::write(path, json).with_context(|| format!("Failed to write: {}", path.display()))?;
        println!("\n{} {}", "Exported:".green(), path.display());
    }

    Ok(())
}

fn scan_options(args: &ScanArgs) -> ScanOptions {
    ScanOptions {
        mode: if args.comprehensive {
            ScanMode::Comprehensive
        } else {
            ScanMode::Quick
        },
        include_registry: args.registry,
        include_temp: args.include_temp,
    }
}

fn print_inventory(inventory: &Inventory) {
    if inventory.is_empty() {
        println!("No identity-bearing artifacts found. Nothing to do.");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Kind"),
        Cell::new("Priority"),
        Cell::new("Size"),
        Cell::new("Modified"),
        Cell::new("Path"),
    ]);

    for record in inventory.records() {
        let modified = record
            .modified_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());

        table.add_row(vec![
            Cell::new(record.kind.to_string()),
            Cell::new(record.priority.to_string()),
            Cell::new(utils::format_size(record.size_bytes)),
            Cell::new(modified),
            Cell::new(record.path.display().to_string()),
        ]);
    }
    println!("{}", table);

    let breakdown = inventory
        .counts_by_kind()
        .iter()
        .map(|(kind, count)| format!("{} {}", count, kind))
        .collect::<Vec<_>>()
        .join(", ");
    println!(
        "\nTotal: {} artifact(s), {} ({})",
        inventory.len(),
        utils::format_size(inventory.total_size()),
        breakdown
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args_map_to_quick_scan() {
        let options = scan_options(&ScanArgs::default());
        assert_eq!(options.mode, ScanMode::Quick);
        assert!(!options.include_registry);
        assert!(!options.include_temp);
    }

    #[test]
    fn test_comprehensive_flag_switches_mode() {
        let options = scan_options(&ScanArgs {
            comprehensive: true,
            registry: true,
            include_temp: true,
            export: None,
        });
        assert_eq!(options.mode, ScanMode::Comprehensive);
        assert!(options.include_registry);
        assert!(options.include_temp);
    }
}
