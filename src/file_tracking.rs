//! Working tree scanning for snapvault
//!
//! Produces the sorted `(path, hash, size, mode)` list that snapshots and
//! working-tree diffs are built from.
//!
//! ## Ignore Rules
//!
//! - **`.gitignore` files**: respected at every directory level, even when the
//!   project is not a git repository
//! - **Custom patterns**: gitignore-syntax patterns from the configuration;
//!   a leading `!` turns the pattern into an allowlist entry, after which
//!   only matching files are recorded
//! - **Storage directory**: `.snapvault/` (and the configured storage
//!   directory, when it lives inside the project) is always excluded
//!
//! Hidden files are included, and so are the `.gitignore` files themselves.
//! Directories and symlinks are not recorded.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use snapvault::file_tracking::FileTracker;
//!
//! # fn main() -> snapvault::Result<()> {
//! let tracker = FileTracker::new("./site".into())
//!     .with_ignore_patterns(vec!["node_modules/".to_string()])
//!     .with_max_file_size(64 * 1024 * 1024);
//!
//! for entry in tracker.scan()? {
//!     println!("{} {}", entry.hash, entry.path);
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::types::FileEntry;
use crate::utils;
use ignore::{overrides::OverrideBuilder, WalkBuilder, WalkState};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Name of the default storage directory inside a project
pub const DEFAULT_STORAGE_DIR: &str = ".snapvault";

/// Scanner for a project directory
///
/// Custom patterns are applied on top of any `.gitignore` files found in the
/// tree. A `max_file_size` of 0 records files of any size.
#[derive(Debug, Clone)]
pub struct FileTracker {
    root_path: PathBuf,
    patterns: Vec<String>,
    max_file_size: u64,
    storage_path: Option<PathBuf>,
}

impl FileTracker {
    /// Create a tracker for `root_path` with default settings
    pub fn new(root_path: PathBuf) -> Self {
        Self {
            root_path,
            patterns: Vec::new(),
            max_file_size: 0,
            storage_path: None,
        }
    }

    /// Set custom ignore patterns (gitignore syntax)
    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.patterns = patterns;
        self
    }

    /// Skip files larger than `size` bytes (0 = unlimited)
    pub fn with_max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }

    /// Exclude the storage directory from scans
    pub fn with_storage_path(mut self, storage_path: PathBuf) -> Self {
        self.storage_path = Some(storage_path);
        self
    }

    /// Root directory being scanned
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Scan the project and return entries sorted by path
    ///
    /// Files that disappear or become unreadable mid-scan are skipped with a
    /// warning.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidPattern`](crate::VaultError::InvalidPattern)
    /// if the ignore rules cannot be compiled.
    pub fn scan(&self) -> Result<Vec<FileEntry>> {
        let started = Instant::now();

        let mut walker = WalkBuilder::new(&self.root_path);
        walker
            .follow_links(false)
            .hidden(false)
            .parents(true)
            .ignore(true)
            .git_ignore(true)
            .git_global(false)
            .git_exclude(false)
            // .gitignore files count outside git repositories too
            .require_git(false)
            .overrides(self.build_overrides()?);

        let found = Arc::new(Mutex::new(Vec::<PathBuf>::new()));

        walker.build_parallel().run(|| {
            let found = Arc::clone(&found);
            Box::new(move |result| {
                match result {
                    Ok(entry) if entry.file_type().is_some_and(|ft| ft.is_file()) => {
                        found.lock().push(entry.into_path());
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Skipping unreadable directory entry: {}", e),
                }
                WalkState::Continue
            })
        });

        let paths = std::mem::take(&mut *found.lock());

        let mut entries: Vec<FileEntry> = paths
            .par_iter()
            .filter_map(
                |path| match process_file_entry(path, &self.root_path, self.max_file_size) {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!("Could not record {:?}: {}", path, e);
                        None
                    }
                },
            )
            .collect();

        entries.sort_by(|a, b| a.path.cmp(&b.path));

        debug!(
            "Scanned {} files ({} bytes) in {:?}",
            entries.len(),
            entries.iter().map(|e| e.size).sum::<u64>(),
            started.elapsed()
        );

        Ok(entries)
    }

    fn build_overrides(&self) -> Result<ignore::overrides::Override> {
        let mut builder = OverrideBuilder::new(&self.root_path);

        // Overrides whitelist by default; a leading ! excludes
        let mut excluded = vec![DEFAULT_STORAGE_DIR.to_string()];
        if let Some(storage) = &self.storage_path {
            if let Some(relative) = utils::relative_slash_path(storage, &self.root_path) {
                if relative != DEFAULT_STORAGE_DIR {
                    excluded.push(relative);
                }
            }
        }
        for dir in &excluded {
            for glob in [format!("!{}/**", dir), format!("!{}/", dir), format!("!{}", dir)] {
                add_override(&mut builder, &glob)?;
            }
        }

        for pattern in &self.patterns {
            let flipped = pattern
                .strip_prefix('!')
                .map_or_else(|| format!("!{}", pattern), str::to_string);
            if let Err(e) = builder.add(&flipped) {
                warn!("Ignoring invalid pattern '{}': {}", pattern, e);
            }
        }

        Ok(builder.build()?)
    }
}

fn add_override(builder: &mut OverrideBuilder, pattern: &str) -> Result<()> {
    builder
        .add(pattern)
        .map_err(|e| crate::VaultError::InvalidPattern(format!("{}: {}", pattern, e)))?;
    Ok(())
}

/// Build the entry for a single file
///
/// Returns `Ok(None)` for anything that should not be recorded: the root
/// itself, non-regular files, symlinks and files above `max_file_size`.
pub fn process_file_entry(path: &Path, root: &Path, max_file_size: u64) -> Result<Option<FileEntry>> {
    let metadata = match utils::get_file_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) => {
            trace!("{:?} vanished during scan: {}", path, e);
            return Ok(None);
        }
    };

    if metadata.is_symlink || !metadata.is_file {
        return Ok(None);
    }

    if max_file_size > 0 && metadata.size > max_file_size {
        trace!("{:?} exceeds size limit ({} bytes)", path, metadata.size);
        return Ok(None);
    }

    let Some(relative) = utils::relative_slash_path(path, root) else {
        return Ok(None);
    };

    Ok(Some(FileEntry {
        path: relative,
        hash: utils::hash_file_content(path)?,
        size: metadata.size,
        mode: metadata.mode,
    }))
}
