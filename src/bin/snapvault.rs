//! # snapvault CLI - Snapshots for your project
//!
//! A command-line interface for the snapvault library.
//!
//! ## Features
//! - Create snapshots of a project tree, tagged or untagged
//! - Read, list and search files as they were in any snapshot
//! - Restore or export whole snapshots or filtered subsets
//! - Compare snapshots with each other or with the working tree
//! - Reclaim storage from deleted snapshots and old autosaves
//!
//! ## Usage
//! ```bash
//! # Snapshot the current directory
//! snapvault create -m "Initial state" -t v1
//!
//! # What changed since v1?
//! snapvault diff v1
//!
//! # Bring one file back
//! snapvault restore v1 --force src/main.rs
//!
//! # Archive a snapshot
//! snapvault export v1 release --archive
//! ```

use clap::{Parser, Subcommand};
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use snapvault::file_tracking::DEFAULT_STORAGE_DIR;
use snapvault::utils::format_bytes;
use snapvault::{
    DiffTarget, Reference, Result, SearchOptions, SnapshotDiff, SnapshotOptions, Vault,
    VaultBuilder, VaultError, TRIGGER_AUTOSAVE,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// snapvault CLI - Versioned snapshots of a project tree
#[derive(Parser)]
#[command(name = "snapvault")]
#[command(version)]
#[command(about = "Record, compare and restore snapshots of a project tree")]
#[command(long_about = None)]
struct Cli {
    /// Project directory (defaults to current)
    #[arg(short, long, global = true)]
    path: Option<PathBuf>,

    /// Storage directory (defaults to <path>/.snapvault)
    #[arg(short, long, global = true)]
    storage: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Snapshot the working tree
    #[command(alias = "snap")]
    Create {
        /// Description message
        #[arg(short, long)]
        message: Option<String>,

        /// Tag for the snapshot
        #[arg(short, long)]
        tag: Option<String>,

        /// Mark as an autosave
        #[arg(long)]
        autosave: bool,

        /// Trigger label stored with the snapshot
        #[arg(long)]
        trigger: Option<String>,

        /// Extra ignore patterns, used when the storage is first created
        #[arg(short, long)]
        ignore: Vec<String>,

        /// Store blobs without compression, used when the storage is first created
        #[arg(long)]
        no_compression: bool,
    },

    /// List snapshots, most recent first
    #[command(alias = "ls")]
    List {
        /// Include autosaves
        #[arg(short, long)]
        all: bool,

        /// Limit results
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show one snapshot
    Show {
        /// Snapshot id or tag
        snapshot: String,
    },

    /// Restore files from a snapshot
    #[command(alias = "rs")]
    Restore {
        /// Snapshot id or tag
        snapshot: String,

        /// Only restore these paths, prefixes or globs
        filters: Vec<String>,

        /// Restore into this directory instead of the project
        #[arg(long)]
        target: Option<PathBuf>,

        /// Overwrite existing files
        #[arg(short, long)]
        force: bool,
    },

    /// Compare two snapshots, or a snapshot with the working tree
    Diff {
        /// From snapshot
        from: String,

        /// To snapshot (defaults to the working tree)
        #[arg(default_value = DiffTarget::CURRENT)]
        to: String,

        /// Only report these paths, prefixes or globs
        #[arg(short, long = "filter")]
        filters: Vec<String>,

        /// Print the diff as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete a snapshot (blobs stay until cleanup)
    #[command(alias = "rm")]
    Delete {
        /// Snapshot id or tag
        snapshot: String,
    },

    /// Print a file as it was in a snapshot
    Cat {
        /// Snapshot id or tag
        snapshot: String,

        /// Project-relative path
        file: String,
    },

    /// List files in a snapshot
    Files {
        /// Snapshot id or tag
        snapshot: String,

        /// Glob, prefix or exact path
        pattern: Option<String>,
    },

    /// Show the history of one file
    History {
        /// Project-relative path
        file: String,
    },

    /// Search stored file contents
    Search {
        /// Text to look for
        query: String,

        /// Only search paths matching this glob or prefix
        #[arg(short, long)]
        file: Option<String>,

        /// Only search this snapshot
        #[arg(long)]
        snapshot: Option<String>,

        /// Match case exactly
        #[arg(short, long)]
        case_sensitive: bool,
    },

    /// Render a changelog between two states
    Changelog {
        /// From snapshot
        from: String,

        /// To snapshot (defaults to the working tree)
        to: Option<String>,
    },

    /// Export a snapshot to a folder or a .tar.gz archive
    Export {
        /// Snapshot id or tag
        snapshot: String,

        /// Output folder or archive path
        output: PathBuf,

        /// Write a .tar.gz archive
        #[arg(short, long)]
        archive: bool,

        /// Only export these paths, prefixes or globs
        #[arg(short, long = "filter")]
        filters: Vec<String>,
    },

    /// Remove orphaned blobs and apply autosave retention
    #[command(alias = "gc")]
    Cleanup {
        /// Keep only this many autosaves instead of the configured limit
        #[arg(long)]
        keep_autosaves: Option<usize>,

        /// Only remove orphaned blobs
        #[arg(long)]
        orphans_only: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("snapvault=debug")
    } else {
        EnvFilter::try_from_env("SNAPVAULT_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".red().bold(), e.user_message());
        std::process::exit(1);
    }
}

/// Main command runner
fn run(cli: Cli) -> Result<()> {
    let root_path = cli.path.unwrap_or_else(|| PathBuf::from("."));
    let storage_path = cli
        .storage
        .unwrap_or_else(|| root_path.join(DEFAULT_STORAGE_DIR));

    match cli.command {
        Commands::Create {
            message,
            tag,
            autosave,
            trigger,
            ignore,
            no_compression,
        } => {
            let vault = VaultBuilder::new()
                .ignore_patterns(ignore)
                .compression_enabled(!no_compression)
                .build(root_path, storage_path)?;
            let mut options = SnapshotOptions {
                message,
                tag,
                is_autosave: autosave,
                ..Default::default()
            };
            if let Some(trigger) = trigger {
                options.trigger_type = trigger;
            } else if autosave {
                options.trigger_type = TRIGGER_AUTOSAVE.to_string();
            }
            cmd_create(&vault, &options)
        }
        Commands::List { all, limit } => cmd_list(&open_vault(root_path, storage_path)?, all, limit),
        Commands::Show { snapshot } => cmd_show(&open_vault(root_path, storage_path)?, &snapshot),
        Commands::Restore {
            snapshot,
            filters,
            target,
            force,
        } => cmd_restore(
            &open_vault(root_path, storage_path)?,
            &snapshot,
            target,
            force,
            filters,
        ),
        Commands::Diff {
            from,
            to,
            filters,
            json,
        } => cmd_diff(
            &open_vault(root_path, storage_path)?,
            &from,
            &to,
            filters,
            json,
        ),
        Commands::Delete { snapshot } => {
            cmd_delete(&open_vault(root_path, storage_path)?, &snapshot)
        }
        Commands::Cat { snapshot, file } => {
            cmd_cat(&open_vault(root_path, storage_path)?, &snapshot, &file)
        }
        Commands::Files { snapshot, pattern } => cmd_files(
            &open_vault(root_path, storage_path)?,
            &snapshot,
            pattern.as_deref(),
        ),
        Commands::History { file } => cmd_history(&open_vault(root_path, storage_path)?, &file),
        Commands::Search {
            query,
            file,
            snapshot,
            case_sensitive,
        } => {
            let options = SearchOptions {
                file_filter: file,
                snapshot: snapshot.map(Reference::from),
                case_sensitive,
            };
            cmd_search(&open_vault(root_path, storage_path)?, &query, &options)
        }
        Commands::Changelog { from, to } => {
            let vault = open_vault(root_path, storage_path)?;
            let to = to.as_deref().map_or(DiffTarget::WorkingTree, DiffTarget::parse);
            print!("{}", vault.generate_changelog(from.as_str(), to)?);
            Ok(())
        }
        Commands::Export {
            snapshot,
            output,
            archive,
            filters,
        } => cmd_export(
            &open_vault(root_path, storage_path)?,
            &snapshot,
            output,
            archive,
            filters,
        ),
        Commands::Cleanup {
            keep_autosaves,
            orphans_only,
        } => cmd_cleanup(
            &open_vault(root_path, storage_path)?,
            keep_autosaves,
            orphans_only,
        ),
    }
}

/// Snapshot the working tree
fn cmd_create(vault: &Vault, options: &SnapshotOptions) -> Result<()> {
    let start = Instant::now();
    let spinner = spinner("Scanning files...");

    let snapshot = vault.snapshot_working_tree(options)?;
    spinner.finish_and_clear();

    println!(
        "{} Created snapshot {}",
        "✓".green().bold(),
        snapshot.metadata.id.to_string().yellow().bold()
    );
    if let Some(tag) = &snapshot.metadata.tag {
        println!("  Tag: {}", tag.cyan());
    }
    if let Some(message) = &snapshot.metadata.message {
        println!("  Message: {}", message.cyan());
    }
    println!("  Files: {}", snapshot.metadata.files_count.to_string().cyan());
    println!("  Size: {}", format_bytes(snapshot.metadata.total_size).cyan());
    println!(
        "  New data: {}",
        format_bytes(snapshot.metadata.compressed_size).cyan()
    );
    println!("  Time: {}", elapsed(start).cyan());
    Ok(())
}

/// List snapshots
fn cmd_list(vault: &Vault, include_autosave: bool, limit: Option<usize>) -> Result<()> {
    let snapshots = vault.list_snapshots(limit, include_autosave)?;
    if snapshots.is_empty() {
        println!("{}", "No snapshots found.".yellow());
        return Ok(());
    }

    println!("{}", "Snapshots:".blue().bold());
    println!();
    for snapshot in &snapshots {
        let meta = &snapshot.metadata;
        let marker = if meta.is_autosave {
            "a".dimmed()
        } else {
            " ".normal()
        };
        print!("{} {:>5} ", marker, meta.id.to_string().yellow().bold());
        print!(
            "{} ",
            meta.created_at
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
                .dimmed()
        );
        if let Some(tag) = &meta.tag {
            print!("[{}] ", tag.green());
        }
        if let Some(message) = &meta.message {
            print!("{}", message.cyan());
        }
        println!();
        println!(
            "        {} files, {}",
            meta.files_count.to_string().dimmed(),
            format_bytes(meta.total_size).dimmed()
        );
    }
    Ok(())
}

/// Show snapshot details
fn cmd_show(vault: &Vault, reference: &str) -> Result<()> {
    let snapshot = vault
        .get_snapshot(reference)?
        .ok_or_else(|| VaultError::SnapshotNotFound(reference.to_string()))?;
    let meta = &snapshot.metadata;

    println!("{} {}", "Snapshot".blue().bold(), meta.id.to_string().yellow().bold());
    println!("  Created: {}", meta.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(tag) = &meta.tag {
        println!("  Tag: {}", tag.green());
    }
    if let Some(message) = &meta.message {
        println!("  Message: {}", message.cyan());
    }
    if let Some(parent) = meta.parent_id {
        println!("  Parent: {}", parent);
    }
    println!("  Trigger: {}{}", meta.trigger_type, if meta.is_autosave { " (autosave)" } else { "" });
    println!("  Files: {}", meta.files_count);
    println!("  Total size: {}", format_bytes(meta.total_size).cyan());
    println!("  New data stored: {}", format_bytes(meta.compressed_size).cyan());
    println!("  Content hash: {}", meta.content_hash[..16.min(meta.content_hash.len())].dimmed());
    Ok(())
}

/// Restore files from a snapshot
fn cmd_restore(
    vault: &Vault,
    reference: &str,
    target: Option<PathBuf>,
    force: bool,
    filters: Vec<String>,
) -> Result<()> {
    let start = Instant::now();
    let spinner = spinner("Restoring files...");
    let filters = (!filters.is_empty()).then_some(filters);

    let result = vault.restore_snapshot(reference, target.as_deref(), force, filters.as_deref())?;
    spinner.finish_and_clear();

    println!("{} Restored snapshot {}", "✓".green().bold(), result.snapshot_id.to_string().yellow());
    println!("  Restored: {}", result.restored.to_string().cyan());
    println!("  Skipped (already present): {}", result.skipped.to_string().yellow());
    println!("  Selected: {}", result.total);
    println!("  Time: {}", elapsed(start).cyan());

    if result.skipped > 0 && !force {
        println!("  Use {} to overwrite existing files", "--force".yellow());
    }
    print_failures(&result.failures);
    Ok(())
}

/// Compare snapshots
fn cmd_diff(vault: &Vault, from: &str, to: &str, filters: Vec<String>, json: bool) -> Result<()> {
    let filters = (!filters.is_empty()).then_some(filters);
    let diff = vault.diff_snapshots(from, to, filters.as_deref())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&diff)?);
        return Ok(());
    }

    println!("{} {} → {}", "Diff".blue().bold(), from.yellow(), to.yellow());
    println!();
    show_diff(&diff);
    Ok(())
}

fn show_diff(diff: &SnapshotDiff) {
    for path in &diff.files_added {
        println!("  {} {}", "+".green().bold(), path.green());
    }
    for modified in &diff.files_modified {
        println!("  {} {}", "~".yellow().bold(), modified.path.yellow());
    }
    for path in &diff.files_removed {
        println!("  {} {}", "-".red().bold(), path.red());
    }
    if diff.is_empty() {
        println!("  {}", "No changes".dimmed());
    }
    println!();
    println!(
        "{} added, {} modified, {} removed (significance {:.1}%)",
        diff.files_added.len().to_string().green(),
        diff.files_modified.len().to_string().yellow(),
        diff.files_removed.len().to_string().red(),
        diff.significance_score * 100.0
    );
}

/// Delete a snapshot
fn cmd_delete(vault: &Vault, reference: &str) -> Result<()> {
    if vault.delete_snapshot(reference)? {
        println!("{} Deleted snapshot {}", "✓".green().bold(), reference.yellow());
        println!(
            "  Run {} to reclaim unreferenced data",
            "snapvault cleanup".yellow()
        );
        Ok(())
    } else {
        Err(VaultError::SnapshotNotFound(reference.to_string()))
    }
}

/// Print a stored file
fn cmd_cat(vault: &Vault, reference: &str, file: &str) -> Result<()> {
    match vault.get_file_content_at_version(reference, file)? {
        Some(text) => {
            print!("{}", text);
            Ok(())
        }
        None => Err(VaultError::storage(format!(
            "No text content available for '{}' (missing blob or binary file)",
            file
        ))),
    }
}

/// List files in a snapshot
fn cmd_files(vault: &Vault, reference: &str, pattern: Option<&str>) -> Result<()> {
    let files = vault.list_files_at_version(reference, pattern)?;
    for file in &files {
        println!(
            "{:>10}  {:o}  {}",
            format_bytes(file.size).dimmed(),
            file.mode,
            file.path
        );
    }
    println!("\n{} files", files.len().to_string().cyan());
    Ok(())
}

/// Show file history
fn cmd_history(vault: &Vault, file: &str) -> Result<()> {
    let history = vault.get_file_history(file)?;
    if history.is_empty() {
        println!("{}", format!("No history for {}", file).yellow());
        return Ok(());
    }

    println!("{} {}", "History of".blue().bold(), file.cyan());
    println!();
    for record in &history {
        let status = if record.removed {
            "removed".red()
        } else if record.first_seen {
            "added".green()
        } else if record.changed {
            "changed".yellow()
        } else {
            "unchanged".dimmed()
        };
        print!(
            "  {:>5} {} {:<9}",
            record.snapshot_id.to_string().yellow(),
            record.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
            status
        );
        if let Some(size) = record.size {
            print!(" {}", format_bytes(size));
        }
        if let Some(tag) = &record.tag {
            print!(" [{}]", tag.green());
        }
        println!();
    }
    Ok(())
}

/// Search stored contents
fn cmd_search(vault: &Vault, query: &str, options: &SearchOptions) -> Result<()> {
    let results = vault.search_in_snapshots(query, options)?;
    if results.is_empty() {
        println!("{}", "No matches.".yellow());
        return Ok(());
    }

    for result in &results {
        let label = result
            .snapshot_tag
            .clone()
            .unwrap_or_else(|| result.snapshot_id.to_string());
        println!("{} {}", result.path.cyan().bold(), format!("@{}", label).dimmed());
        for m in &result.matches {
            println!("  {:>5}: {}", m.line_number.to_string().yellow(), m.line);
        }
    }
    println!("\n{} files matched", results.len().to_string().cyan());
    Ok(())
}

/// Export a snapshot
fn cmd_export(
    vault: &Vault,
    reference: &str,
    output: PathBuf,
    archive: bool,
    filters: Vec<String>,
) -> Result<()> {
    let start = Instant::now();
    let spinner = spinner("Exporting files...");
    let filters = (!filters.is_empty()).then_some(filters);

    let result = vault.export_snapshot(reference, &output, archive, filters.as_deref())?;
    spinner.finish_and_clear();

    println!(
        "{} Exported snapshot {} as {}",
        "✓".green().bold(),
        result.snapshot.yellow(),
        result.format
    );
    println!("  Output: {}", result.output_path.display().to_string().cyan());
    println!("  Files: {}", result.exported_count().to_string().cyan());
    if let Some(size) = result.archive_size {
        println!("  Archive size: {}", format_bytes(size).cyan());
    }
    println!("  Time: {}", elapsed(start).cyan());
    print_failures(&result.failures);
    Ok(())
}

/// Remove orphans and old autosaves
fn cmd_cleanup(vault: &Vault, keep_autosaves: Option<usize>, orphans_only: bool) -> Result<()> {
    let before = vault.stats()?;

    let autosaves = if orphans_only {
        0
    } else if let Some(keep) = keep_autosaves {
        vault.cleanup_old_autosaves(keep)?
    } else {
        vault.apply_autosave_retention()?
    };
    let orphans = vault.cleanup_orphaned_contents()?;

    let after = vault.stats()?;
    println!("{} Cleanup complete", "✓".green().bold());
    println!("  Autosaves removed: {}", autosaves.to_string().cyan());
    println!("  Orphaned blobs removed: {}", orphans.to_string().cyan());
    println!(
        "  Stored data: {} → {}",
        format_bytes(before.stored_bytes),
        format_bytes(after.stored_bytes).cyan()
    );
    Ok(())
}

// Helper functions

/// Open existing storage
fn open_vault(root_path: PathBuf, storage_path: PathBuf) -> Result<Vault> {
    Vault::open(root_path, storage_path)
}

fn spinner(message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn elapsed(start: Instant) -> String {
    // Millisecond precision is enough for display
    let millis = start.elapsed().as_millis() as u64;
    format_duration(Duration::from_millis(millis)).to_string()
}

fn print_failures(failures: &[snapvault::FileFailure]) {
    if failures.is_empty() {
        return;
    }
    println!("\n{}", "Failures:".red().bold());
    for failure in failures {
        println!("  - {}: {}", failure.path.red(), failure.reason);
    }
}
