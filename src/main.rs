//! vscrub: reset VS Code-family editor identity and remove extension residue
//!
//! Operates only on locally stored editor data belonging to the current
//! user: telemetry identifier files, state databases, caches, and installed
//! extension directories.

use anyhow::Result;
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use std::path::PathBuf;

mod backup;
mod commands;
mod config;
mod error;
mod identity;
mod output;
mod vscode;

use commands::utils::RunSummary;

#[derive(Parser)]
#[command(name = "vscrub")]
#[command(about = "Reset VS Code-family editor identity and remove extension residue", long_about = None)]
#[command(version)]
struct Cli {
    /// Skip pre-mutation backups
    #[arg(long, global = true)]
    no_backup: bool,

    /// Backup store location (default: platform data directory)
    #[arg(long, global = true)]
    backup_dir: Option<PathBuf>,

    /// Backups kept per category
    #[arg(long, global = true, default_value_t = 3)]
    max_backups: usize,

    /// Mutate files over the size ceiling
    #[arg(long, global = true)]
    force: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inventory identity-bearing files without changing anything
    Scan {
        /// Also walk the profile root, caches, and temp directories
        #[arg(long)]
        comprehensive: bool,

        /// Include Windows registry identity values (no-op elsewhere)
        #[arg(long)]
        registry: bool,

        /// Include system temp roots without a full comprehensive walk
        #[arg(long)]
        include_temp: bool,

        /// Write the inventory as JSON to this file
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Purge extension and identity rows from state databases
    Clean {
        /// Show what would be removed without making changes
        #[arg(short = 'n', long)]
        preview: bool,
    },

    /// Generate fresh identifiers and write them into telemetry files
    ModifyIds {
        /// Show what would be rewritten without making changes
        #[arg(short = 'n', long)]
        preview: bool,

        /// Print the identifiers currently on disk and exit
        #[arg(long, conflicts_with = "preview")]
        show_current: bool,
    },

    /// Run clean followed by modify-ids
    All {
        /// Show what would be done without making changes
        #[arg(short = 'n', long)]
        preview: bool,
    },

    /// Preview everything `all` would do
    Preview,

    /// Inspect the backup store
    Backups {
        #[command(subcommand)]
        command: BackupsCommand,
    },
}

#[derive(Subcommand)]
enum BackupsCommand {
    /// List stored backups
    List {
        /// Only this category (database, telemetry, configuration, extension)
        #[arg(long)]
        category: Option<String>,
    },

    /// Re-hash stored backups against their recorded checksums
    Verify {
        /// Only this category
        #[arg(long)]
        category: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let backup_root = match cli.backup_dir {
        Some(dir) => dir,
        None => config::default_backup_root()?,
    };
    let common = commands::CommonOpts {
        no_backup: cli.no_backup,
        backup_root,
        max_backups: cli.max_backups,
        force: cli.force,
    };

    let mut summary = RunSummary::default();

    match cli.command {
        Commands::Scan {
            comprehensive,
            registry,
            include_temp,
            export,
        } => {
            let args = commands::scan::ScanArgs {
                comprehensive,
                registry,
                include_temp,
                export,
            };
            commands::scan::execute(&args)?;
        }

        Commands::Clean { preview } => {
            if preview {
                println!("{}", "(PREVIEW MODE - no changes will be made)".blue());
            }
            summary.merge(commands::clean::execute(&common, preview)?);
        }

        Commands::ModifyIds {
            preview,
            show_current,
        } => {
            if preview {
                println!("{}", "(PREVIEW MODE - no changes will be made)".blue());
            }
            summary.merge(commands::modify_ids::execute(&common, preview, show_current)?);
        }

        Commands::All { preview } => {
            if preview {
                println!("{}", "(PREVIEW MODE - no changes will be made)".blue());
            }
            summary.merge(commands::clean::execute(&common, preview)?);
            summary.merge(commands::modify_ids::execute(&common, preview, false)?);
            if !preview && summary.ok() {
                output::success("All operations completed");
            }
        }

        Commands::Preview => {
            println!("{}", "(PREVIEW MODE - no changes will be made)".blue());
            summary.merge(commands::clean::execute(&common, true)?);
            summary.merge(commands::modify_ids::execute(&common, true, false)?);
        }

        Commands::Backups { command } => match command {
            BackupsCommand::List { category } => {
                let category = category
                    .as_deref()
                    .map(commands::backups::parse_category)
                    .transpose()?;
                commands::backups::execute_list(&common, category)?;
            }
            BackupsCommand::Verify { category } => {
                let category = category
                    .as_deref()
                    .map(commands::backups::parse_category)
                    .transpose()?;
                summary.merge(commands::backups::execute_verify(&common, category)?);
            }
        },
    }

    // Per-file failures were already reported; fail the process once
    if !summary.ok() {
        std::process::exit(1);
    }

    Ok(())
}
