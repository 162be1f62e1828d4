//! Snapshot engine
//!
//! This module provides the [`Vault`] struct, the entry point for every
//! snapshot operation: creating, listing, reading, restoring, exporting,
//! diffing, searching and cleaning up.
//!
//! ## Overview
//!
//! `Vault` coordinates the subsystems that each own one concern:
//!
//! - **Blob store**: content-addressed, compressed file payloads
//! - **Metadata store**: SQLite records of snapshots and their file lists
//! - **File tracker**: scans the live project tree
//! - **Compressor**: zstd encoding of blobs
//!
//! ## Snapshot creation
//!
//! Creation happens in two phases. New blobs are written first, each one
//! atomically. A single database transaction then records the snapshot row,
//! its file mappings and the content sizes. If the process dies between the
//! phases only unreferenced blobs remain, and
//! [`Vault::cleanup_orphaned_contents`] reclaims them.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use snapvault::{SnapshotOptions, Vault};
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let vault = Vault::init(
//!     PathBuf::from("./my_project"),
//!     PathBuf::from("./my_project/.snapvault"),
//! )?;
//!
//! let first = vault.snapshot_working_tree(&SnapshotOptions {
//!     tag: Some("v1".to_string()),
//!     ..Default::default()
//! })?;
//!
//! // ... edit files ...
//!
//! let diff = vault.diff_snapshots("v1", "current", None)?;
//! println!("{} files changed since {}", diff.total_changes, first.label());
//! # Ok(())
//! # }
//! ```

use crate::compression::{Compressor, DEFAULT_COMPRESSION_LEVEL};
use crate::diff;
use crate::error::{Result, VaultError};
use crate::file_tracking::FileTracker;
use crate::filter::PathFilter;
use crate::metadata::{ContentRecord, MetadataStore, NewSnapshot};
use crate::storage::BlobStore;
use crate::types::*;
use crate::utils;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, trace, warn};

/// Name of the configuration file inside the storage directory
pub const CONFIG_FILE: &str = "config.json";

/// Autosaves kept by [`Vault::apply_autosave_retention`] unless configured
pub const DEFAULT_MAX_AUTOSAVES: usize = 50;

/// Matching lines reported per file by [`Vault::search_in_snapshots`]
pub const MAX_MATCHES_PER_FILE: usize = 5;

/// Results returned by one [`Vault::search_in_snapshots`] call
pub const MAX_SEARCH_RESULTS: usize = 50;

/// Main snapshot engine
///
/// Every operation takes `&self`; the metadata store serialises its own
/// database access and blob writes are atomic renames.
///
/// # Examples
///
/// ```rust,no_run
/// use snapvault::{VaultBuilder, SnapshotOptions};
/// use std::path::PathBuf;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let vault = VaultBuilder::new()
///     .ignore_patterns(vec!["*.log".to_string()])
///     .build(PathBuf::from("./project"), PathBuf::from("./project/.snapvault"))?;
///
/// let snapshot = vault.snapshot_working_tree(&SnapshotOptions::default())?;
/// println!("snapshot {} with {} files", snapshot.metadata.id, snapshot.files.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Vault {
    config: VaultConfig,
    storage: BlobStore,
    metadata: MetadataStore,
    compressor: Compressor,
    file_tracker: FileTracker,
}

impl Vault {
    /// Initialize new snapshot storage with default settings
    ///
    /// Creates the storage directory (an existing empty directory is fine),
    /// writes `config.json`, the SQLite database and the object store.
    ///
    /// # Errors
    ///
    /// - [`VaultError::InvalidConfiguration`] if `project_root` does not exist
    /// - [`VaultError::StorageAlreadyExists`] if the storage already holds a
    ///   configuration
    /// - [`VaultError::Io`] / [`VaultError::Database`] if creating files fails
    #[instrument(skip(storage_path))]
    pub fn init(project_root: PathBuf, storage_path: PathBuf) -> Result<Self> {
        let config = VaultBuilder::new().into_config(project_root, storage_path);
        Self::init_with_config(config)
    }

    fn init_with_config(config: VaultConfig) -> Result<Self> {
        info!("Initializing snapshot storage for {:?}", config.project_root);

        if !config.project_root.is_dir() {
            return Err(VaultError::InvalidConfiguration(format!(
                "Project root {:?} does not exist",
                config.project_root
            )));
        }

        let config_path = config.storage_path.join(CONFIG_FILE);
        if config_path.exists() {
            return Err(VaultError::StorageAlreadyExists(config.storage_path.clone()));
        }

        fs::create_dir_all(&config.storage_path)?;
        write_config(&config_path, &config)?;

        Self::from_config(config)
    }

    /// Open existing snapshot storage
    ///
    /// The stored configuration is loaded, but the paths given here win, so a
    /// project and its storage can be moved together.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::StorageNotInitialized`] if `storage_path` holds no
    /// configuration.
    #[instrument(skip(storage_path))]
    pub fn open(project_root: PathBuf, storage_path: PathBuf) -> Result<Self> {
        info!("Opening snapshot storage at {:?}", storage_path);

        let config_path = storage_path.join(CONFIG_FILE);
        if !config_path.is_file() {
            return Err(VaultError::StorageNotInitialized(storage_path));
        }

        let mut config: VaultConfig = serde_json::from_slice(&fs::read(&config_path)?)?;
        config.project_root = project_root;
        config.storage_path = storage_path;

        Self::from_config(config)
    }

    fn from_config(config: VaultConfig) -> Result<Self> {
        let storage = BlobStore::open(&config.storage_path)?;
        let metadata = MetadataStore::open(&config.storage_path)?;
        let compressor = Compressor::new(config.compression_enabled, config.compression_level);
        let file_tracker = FileTracker::new(config.project_root.clone())
            .with_ignore_patterns(config.ignore_patterns.clone())
            .with_max_file_size(config.max_file_size)
            .with_storage_path(config.storage_path.clone());

        debug!(
            "Vault ready (compression: {}, level {})",
            compressor.is_enabled(),
            compressor.level()
        );

        Ok(Self {
            config,
            storage,
            metadata,
            compressor,
            file_tracker,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Project directory being snapshotted
    pub fn project_root(&self) -> &Path {
        &self.config.project_root
    }

    /// Storage directory
    pub fn storage_path(&self) -> &Path {
        &self.config.storage_path
    }

    /// Blob store backing this vault
    pub fn blob_store(&self) -> &BlobStore {
        &self.storage
    }

    /// Metadata store backing this vault
    pub fn metadata_store(&self) -> &MetadataStore {
        &self.metadata
    }

    // ────────────────────────────────────────────
    // Snapshot creation
    // ────────────────────────────────────────────

    /// Record a snapshot of the given files
    ///
    /// Entries are trusted: their hashes are not recomputed. Content for
    /// hashes not yet in the blob store is read from
    /// `project_root/<path>`, compressed and stored once.
    ///
    /// # Arguments
    ///
    /// * `files` - Project-relative entries, in any order
    /// * `options` - Message, tag and autosave flags
    ///
    /// # Errors
    ///
    /// - [`VaultError::DuplicatePath`] if a path occurs twice
    /// - [`VaultError::SourceUnreadable`] if new content cannot be read
    /// - [`VaultError::Database`] if recording fails; nothing is recorded
    #[instrument(skip(self, files, options), fields(files = files.len()))]
    pub fn create_snapshot(
        &self,
        files: &[FileEntry],
        options: &SnapshotOptions,
    ) -> Result<Snapshot> {
        let start = Instant::now();

        let mut files = files.to_vec();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        if let Some(pair) = files.windows(2).find(|pair| pair[0].path == pair[1].path) {
            return Err(VaultError::DuplicatePath(pair[0].path.clone()));
        }

        let content_hash = utils::snapshot_content_hash(&files);

        let mut seen: HashSet<&str> = HashSet::new();
        let mut contents = Vec::new();
        let mut written_bytes = 0u64;

        for entry in &files {
            if !seen.insert(entry.hash.as_str()) {
                continue;
            }

            let stored_size = if self.storage.exists(&entry.hash)? {
                trace!("Content for {} already stored", entry.path);
                self.storage.stored_size(&entry.hash)?
            } else {
                let source = self.config.project_root.join(&entry.path);
                let content = fs::read(&source)
                    .map_err(|e| VaultError::SourceUnreadable { path: source, source: e })?;
                let blob = self.compressor.compress(&content)?;
                if self.storage.store(&entry.hash, &blob)? {
                    written_bytes += blob.encoded_size;
                }
                blob.encoded_size
            };

            contents.push(ContentRecord {
                hash: entry.hash.clone(),
                original_size: entry.size,
                compressed_size: stored_size,
            });
        }

        let new = NewSnapshot {
            content_hash,
            message: options.message.clone(),
            tag: options.tag.clone(),
            is_autosave: options.is_autosave,
            trigger_type: options.trigger_type.clone(),
            parent_id: None,
            files_count: files.len(),
            total_size: files.iter().map(|f| f.size).sum(),
            compressed_size: written_bytes,
        };
        let metadata = self.metadata.record_snapshot(&new, &files, &contents)?;

        info!(
            "Created snapshot {} ({} files, {} new bytes) in {:?}",
            metadata.id,
            metadata.files_count,
            written_bytes,
            start.elapsed()
        );

        Ok(Snapshot { metadata, files })
    }

    /// Scan the project tree and snapshot it
    ///
    /// The storage directory and configured ignore patterns are excluded.
    #[instrument(skip(self, options))]
    pub fn snapshot_working_tree(&self, options: &SnapshotOptions) -> Result<Snapshot> {
        let files = self.file_tracker.scan()?;
        debug!("Working tree has {} files", files.len());
        self.create_snapshot(&files, options)
    }

    // ────────────────────────────────────────────
    // Lookup
    // ────────────────────────────────────────────

    /// Resolve a reference to a snapshot record
    ///
    /// An id reference only looks up ids; a tag reference resolves to the
    /// newest snapshot carrying that tag.
    pub fn resolve(&self, reference: impl Into<Reference>) -> Result<Option<SnapshotMetadata>> {
        match reference.into() {
            Reference::ById(id) => self.metadata.get_snapshot(id),
            Reference::ByTag(tag) => self.metadata.get_snapshot_by_tag(&tag),
        }
    }

    /// Fetch a snapshot with its file list
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use snapvault::Vault;
    /// # fn demo(vault: &Vault) -> snapvault::Result<()> {
    /// if let Some(snapshot) = vault.get_snapshot("v1")? {
    ///     println!("v1 is snapshot {}", snapshot.metadata.id);
    /// }
    /// let by_id = vault.get_snapshot(3)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn get_snapshot(&self, reference: impl Into<Reference>) -> Result<Option<Snapshot>> {
        match self.resolve(reference)? {
            Some(metadata) => Ok(Some(self.materialize(metadata)?)),
            None => Ok(None),
        }
    }

    fn require_snapshot(&self, reference: Reference) -> Result<Snapshot> {
        self.get_snapshot(&reference)?
            .ok_or_else(|| VaultError::SnapshotNotFound(reference.to_string()))
    }

    fn materialize(&self, metadata: SnapshotMetadata) -> Result<Snapshot> {
        let files = self.metadata.get_snapshot_files(metadata.id)?;
        Ok(Snapshot { metadata, files })
    }

    /// List snapshots, most recent first
    pub fn list_snapshots(
        &self,
        limit: Option<usize>,
        include_autosave: bool,
    ) -> Result<Vec<Snapshot>> {
        self.metadata
            .list_snapshots(limit, include_autosave)?
            .into_iter()
            .map(|metadata| self.materialize(metadata))
            .collect()
    }

    /// Decoded bytes of a file as stored in a snapshot
    ///
    /// Returns `Ok(None)` if the blob is missing from the store.
    ///
    /// # Errors
    ///
    /// - [`VaultError::SnapshotNotFound`] if the reference does not resolve
    /// - [`VaultError::FileNotInSnapshot`] if the snapshot has no such path
    pub fn get_file_bytes_at_version(
        &self,
        reference: impl Into<Reference>,
        path: &str,
    ) -> Result<Option<Vec<u8>>> {
        let reference = reference.into();
        let snapshot = self.require_snapshot(reference.clone())?;
        let entry = snapshot
            .get_file(path)
            .ok_or_else(|| VaultError::FileNotInSnapshot {
                snapshot: reference.to_string(),
                path: path.to_string(),
            })?;

        let content = self.storage.load(&entry.hash, &self.compressor)?;
        if content.is_none() {
            warn!("Content for hash {} not found in store", entry.hash);
        }
        Ok(content)
    }

    /// Text of a file as stored in a snapshot
    ///
    /// Returns `Ok(None)` if the blob is missing or is not valid UTF-8.
    ///
    /// # Errors
    ///
    /// Same as [`Vault::get_file_bytes_at_version`].
    pub fn get_file_content_at_version(
        &self,
        reference: impl Into<Reference>,
        path: &str,
    ) -> Result<Option<String>> {
        let Some(bytes) = self.get_file_bytes_at_version(reference, path)? else {
            return Ok(None);
        };
        match String::from_utf8(bytes) {
            Ok(text) => Ok(Some(text)),
            Err(_) => {
                debug!("{} is not valid UTF-8", path);
                Ok(None)
            }
        }
    }

    /// Files of a snapshot sorted by path, optionally filtered by a pattern
    pub fn list_files_at_version(
        &self,
        reference: impl Into<Reference>,
        pattern: Option<&str>,
    ) -> Result<Vec<FileEntry>> {
        let snapshot = self.require_snapshot(reference.into())?;
        let filter = pattern.map_or_else(PathFilter::all, |p| PathFilter::new([p]));

        let mut files: Vec<FileEntry> = snapshot
            .files
            .into_iter()
            .filter(|f| filter.matches(&f.path))
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    // ────────────────────────────────────────────
    // Restore and export
    // ────────────────────────────────────────────

    /// Write a snapshot's files back to disk
    ///
    /// Existing files are skipped unless `force` is set. Files on disk that
    /// are not part of the selection are never touched or deleted.
    /// Per-file problems (missing blob, unsafe path, write error) are
    /// collected in [`RestoreResult::failures`].
    ///
    /// # Arguments
    ///
    /// * `reference` - Snapshot id or tag
    /// * `target` - Destination root, defaults to the project root
    /// * `force` - Overwrite files that already exist
    /// * `filters` - Glob, prefix or exact path patterns; `None` restores all
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::SnapshotNotFound`] if the reference does not
    /// resolve.
    #[instrument(skip(self, reference, target, filters))]
    pub fn restore_snapshot(
        &self,
        reference: impl Into<Reference>,
        target: Option<&Path>,
        force: bool,
        filters: Option<&[String]>,
    ) -> Result<RestoreResult> {
        let snapshot = self.require_snapshot(reference.into())?;
        let target_root = target.unwrap_or(&self.config.project_root);
        let filter = PathFilter::from_option(filters);

        let mut result = RestoreResult {
            snapshot_id: snapshot.metadata.id,
            ..Default::default()
        };

        for entry in snapshot.files.iter().filter(|f| filter.matches(&f.path)) {
            result.total += 1;

            if !utils::is_safe_relative(&entry.path) {
                warn!("Refusing to restore unsafe path {:?}", entry.path);
                result.failures.push(FileFailure {
                    path: entry.path.clone(),
                    reason: "unsafe path".to_string(),
                });
                continue;
            }

            let destination = target_root.join(&entry.path);
            if !force && fs::symlink_metadata(&destination).is_ok() {
                trace!("Skipping existing {}", entry.path);
                result.skipped += 1;
                result.files_skipped.push(entry.path.clone());
                continue;
            }

            match self.write_entry(entry, &destination) {
                Ok(()) => {
                    result.restored += 1;
                    result.files_restored.push(entry.path.clone());
                }
                Err(reason) => {
                    warn!("Failed to restore {}: {}", entry.path, reason);
                    result.failures.push(FileFailure {
                        path: entry.path.clone(),
                        reason,
                    });
                }
            }
        }

        info!(
            "Restored snapshot {}: {} restored, {} skipped, {} failed of {}",
            result.snapshot_id,
            result.restored,
            result.skipped,
            result.failures.len(),
            result.total
        );
        Ok(result)
    }

    /// Copy a snapshot's files into a folder or a `.tar.gz` archive
    ///
    /// In archive mode `output` is given a `.tar.gz` suffix if it lacks one,
    /// and every entry carries the recorded mode and the snapshot's creation
    /// time. Per-file problems are collected in [`ExportResult::failures`].
    ///
    /// # Errors
    ///
    /// - [`VaultError::SnapshotNotFound`] if the reference does not resolve
    /// - [`VaultError::Io`] if the output folder or archive cannot be created
    #[instrument(skip(self, reference, output, filters))]
    pub fn export_snapshot(
        &self,
        reference: impl Into<Reference>,
        output: &Path,
        as_archive: bool,
        filters: Option<&[String]>,
    ) -> Result<ExportResult> {
        let snapshot = self.require_snapshot(reference.into())?;
        let filter = PathFilter::from_option(filters);
        let selected: Vec<&FileEntry> = snapshot
            .files
            .iter()
            .filter(|f| filter.matches(&f.path))
            .collect();

        let result = if as_archive {
            self.export_archive(&snapshot, &selected, output)?
        } else {
            self.export_folder(&snapshot, &selected, output)?
        };

        info!(
            "Exported snapshot {} as {} to {:?}: {} files, {} failed",
            result.snapshot,
            result.format,
            result.output_path,
            result.exported_count(),
            result.failed_count()
        );
        Ok(result)
    }

    fn export_folder(
        &self,
        snapshot: &Snapshot,
        files: &[&FileEntry],
        output: &Path,
    ) -> Result<ExportResult> {
        fs::create_dir_all(output)?;

        let mut result = ExportResult {
            snapshot: snapshot.label(),
            format: ExportFormat::Folder,
            output_path: output.to_path_buf(),
            files_exported: Vec::new(),
            failures: Vec::new(),
            archive_size: None,
        };

        for entry in files {
            if !utils::is_safe_relative(&entry.path) {
                result.failures.push(FileFailure {
                    path: entry.path.clone(),
                    reason: "unsafe path".to_string(),
                });
                continue;
            }
            match self.write_entry(entry, &output.join(&entry.path)) {
                Ok(()) => result.files_exported.push(entry.path.clone()),
                Err(reason) => {
                    warn!("Failed to export {}: {}", entry.path, reason);
                    result.failures.push(FileFailure {
                        path: entry.path.clone(),
                        reason,
                    });
                }
            }
        }

        Ok(result)
    }

    fn export_archive(
        &self,
        snapshot: &Snapshot,
        files: &[&FileEntry],
        output: &Path,
    ) -> Result<ExportResult> {
        let archive_path = archive_path(output);
        if let Some(parent) = archive_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let encoder = GzEncoder::new(File::create(&archive_path)?, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let mtime = snapshot.metadata.created_at.timestamp().max(0) as u64;

        let mut files_exported = Vec::new();
        let mut failures = Vec::new();

        for entry in files {
            if !utils::is_safe_relative(&entry.path) {
                failures.push(FileFailure {
                    path: entry.path.clone(),
                    reason: "unsafe path".to_string(),
                });
                continue;
            }

            let content = match self.storage.load(&entry.hash, &self.compressor) {
                Ok(Some(content)) => content,
                Ok(None) => {
                    warn!("Blob {} missing, not archiving {}", entry.hash, entry.path);
                    failures.push(FileFailure {
                        path: entry.path.clone(),
                        reason: format!("blob {} missing", entry.hash),
                    });
                    continue;
                }
                Err(e) => {
                    failures.push(FileFailure {
                        path: entry.path.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(entry.mode);
            header.set_mtime(mtime);
            header.set_cksum();
            builder.append_data(&mut header, &entry.path, content.as_slice())?;
            files_exported.push(entry.path.clone());
        }

        let encoder = builder.into_inner()?;
        encoder.finish()?.sync_all()?;
        let archive_size = fs::metadata(&archive_path)?.len();

        Ok(ExportResult {
            snapshot: snapshot.label(),
            format: ExportFormat::TarGz,
            output_path: archive_path,
            files_exported,
            failures,
            archive_size: Some(archive_size),
        })
    }

    /// Decode an entry's blob and write it atomically with its mode
    ///
    /// Errors are returned as the failure reason.
    fn write_entry(&self, entry: &FileEntry, destination: &Path) -> std::result::Result<(), String> {
        let content = match self.storage.load(&entry.hash, &self.compressor) {
            Ok(Some(content)) => content,
            Ok(None) => return Err(format!("blob {} missing", entry.hash)),
            Err(e) => return Err(e.to_string()),
        };
        write_file_atomic(destination, &content, entry.mode).map_err(|e| e.to_string())
    }

    // ────────────────────────────────────────────
    // Diff, history and search
    // ────────────────────────────────────────────

    /// Compare a snapshot with another snapshot or the live tree
    ///
    /// The working tree side gets id 0. With `filters`, the diff is narrowed
    /// after computation; see [`SnapshotDiff::filter_by_paths`].
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use snapvault::{DiffTarget, Vault};
    /// # fn demo(vault: &Vault) -> snapvault::Result<()> {
    /// let between = vault.diff_snapshots("v1", "v2", None)?;
    /// let pending = vault.diff_snapshots("v2", DiffTarget::WorkingTree, None)?;
    /// assert_eq!(pending.to_snapshot, 0);
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self, from, to, filters))]
    pub fn diff_snapshots(
        &self,
        from: impl Into<Reference>,
        to: impl Into<DiffTarget>,
        filters: Option<&[String]>,
    ) -> Result<SnapshotDiff> {
        let from = self.require_snapshot(from.into())?;
        let (to_id, to_files) = match to.into() {
            DiffTarget::Snapshot(reference) => {
                let snapshot = self.require_snapshot(reference)?;
                (snapshot.metadata.id, snapshot.files)
            }
            DiffTarget::WorkingTree => (0, self.file_tracker.scan()?),
        };

        let diff = diff::compute_diff(from.metadata.id, &from.files, to_id, &to_files);
        debug!(
            "Diff {} -> {}: {} changes",
            diff.from_snapshot, diff.to_snapshot, diff.total_changes
        );

        match filters {
            Some(patterns) if !patterns.is_empty() => {
                Ok(diff.filter_by_paths(&PathFilter::new(patterns)))
            }
            _ => Ok(diff),
        }
    }

    /// Markdown changelog between a snapshot and a later state
    ///
    /// `to` defaults to the live tree when given `None` or `"current"`.
    pub fn generate_changelog(
        &self,
        from: impl Into<Reference>,
        to: impl Into<DiffTarget>,
    ) -> Result<String> {
        let from = from.into();
        let to = to.into();

        let from_label = self.require_snapshot(from.clone())?.label();
        let to_label = match &to {
            DiffTarget::Snapshot(reference) => self.require_snapshot(reference.clone())?.label(),
            DiffTarget::WorkingTree => DiffTarget::CURRENT.to_string(),
        };

        let diff = self.diff_snapshots(from, to, None)?;
        Ok(diff::render_changelog(&from_label, &to_label, &diff))
    }

    /// Every appearance, change and removal of `path`, oldest first
    ///
    /// A record is produced for each snapshot containing the file, plus one
    /// `removed` record when the file disappears after having been present.
    pub fn get_file_history(&self, path: &str) -> Result<Vec<FileHistoryEntry>> {
        let versions: HashMap<i64, FileEntry> =
            self.metadata.get_file_versions(path)?.into_iter().collect();
        if versions.is_empty() {
            return Ok(Vec::new());
        }

        let mut snapshots = self.metadata.list_snapshots(None, true)?;
        snapshots.sort_by_key(|s| s.id);

        let mut history = Vec::new();
        let mut last_hash: Option<String> = None;
        let mut present = false;

        for snapshot in snapshots {
            match versions.get(&snapshot.id) {
                Some(entry) => {
                    let first_seen = last_hash.is_none();
                    let changed = last_hash.as_deref().is_some_and(|h| h != entry.hash);
                    history.push(FileHistoryEntry {
                        snapshot_id: snapshot.id,
                        created_at: snapshot.created_at,
                        message: snapshot.message,
                        tag: snapshot.tag,
                        hash: Some(entry.hash.clone()),
                        size: Some(entry.size),
                        first_seen,
                        changed,
                        removed: false,
                    });
                    last_hash = Some(entry.hash.clone());
                    present = true;
                }
                None if present => {
                    history.push(FileHistoryEntry {
                        snapshot_id: snapshot.id,
                        created_at: snapshot.created_at,
                        message: snapshot.message,
                        tag: snapshot.tag,
                        hash: None,
                        size: None,
                        first_seen: false,
                        changed: false,
                        removed: true,
                    });
                    present = false;
                }
                None => {}
            }
        }

        Ok(history)
    }

    /// Substring search over stored file contents
    ///
    /// Snapshots are visited most recent first. Each distinct blob is read
    /// once per call. At most [`MAX_MATCHES_PER_FILE`] lines are reported
    /// per file and the search stops after [`MAX_SEARCH_RESULTS`] files.
    /// Binary and missing blobs are skipped.
    ///
    /// # Errors
    ///
    /// - [`VaultError::InvalidQuery`] if `query` is empty
    /// - [`VaultError::SnapshotNotFound`] if `options.snapshot` does not resolve
    #[instrument(skip(self, options))]
    pub fn search_in_snapshots(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        if query.is_empty() {
            return Err(VaultError::InvalidQuery("query must not be empty".to_string()));
        }

        let snapshots = match &options.snapshot {
            Some(reference) => vec![self.require_snapshot(reference.clone())?.metadata],
            None => self.metadata.list_snapshots(None, true)?,
        };
        let filter = options
            .file_filter
            .as_deref()
            .map_or_else(PathFilter::all, |p| PathFilter::new([p]));
        let needle = if options.case_sensitive {
            query.to_string()
        } else {
            query.to_lowercase()
        };

        let mut searched: HashSet<String> = HashSet::new();
        let mut results = Vec::new();

        for snapshot in snapshots {
            for entry in self.metadata.get_snapshot_files(snapshot.id)? {
                if !filter.matches(&entry.path) || !searched.insert(entry.hash.clone()) {
                    continue;
                }

                let Some(bytes) = self.storage.load(&entry.hash, &self.compressor)? else {
                    warn!("Blob {} missing, skipping {}", entry.hash, entry.path);
                    continue;
                };
                let Ok(text) = String::from_utf8(bytes) else {
                    trace!("Skipping non-text {}", entry.path);
                    continue;
                };

                let matches = find_matches(&text, &needle, options.case_sensitive);
                if matches.is_empty() {
                    continue;
                }

                results.push(SearchResult {
                    snapshot_id: snapshot.id,
                    snapshot_tag: snapshot.tag.clone(),
                    path: entry.path,
                    hash: entry.hash,
                    matches,
                });
                if results.len() >= MAX_SEARCH_RESULTS {
                    debug!("Search result cap reached");
                    return Ok(results);
                }
            }
        }

        debug!("Search for {:?} found {} files", query, results.len());
        Ok(results)
    }

    // ────────────────────────────────────────────
    // Deletion and cleanup
    // ────────────────────────────────────────────

    /// Delete a snapshot's record and file mappings
    ///
    /// Blobs are left in place; run [`Vault::cleanup_orphaned_contents`] to
    /// reclaim them. Returns `false` if the reference does not resolve.
    #[instrument(skip(self, reference))]
    pub fn delete_snapshot(&self, reference: impl Into<Reference>) -> Result<bool> {
        let Some(metadata) = self.resolve(reference)? else {
            return Ok(false);
        };
        let deleted = self.metadata.delete_snapshot(metadata.id)?;
        if deleted {
            info!("Deleted snapshot {}", metadata.id);
        }
        Ok(deleted)
    }

    /// Keep only the `max_keep` most recent autosaves
    pub fn cleanup_old_autosaves(&self, max_keep: usize) -> Result<usize> {
        let removed = self.metadata.cleanup_old_autosaves(max_keep)?;
        if !removed.is_empty() {
            info!("Removed {} old autosaves", removed.len());
        }
        Ok(removed.len())
    }

    /// Delete autosaves older than `days`
    pub fn cleanup_expired_autosaves(&self, days: u32) -> Result<usize> {
        let removed = self.metadata.cleanup_expired_autosaves(days)?;
        if !removed.is_empty() {
            info!("Removed {} expired autosaves", removed.len());
        }
        Ok(removed.len())
    }

    /// Apply the configured autosave limits
    ///
    /// Runs the age-based cleanup when `autosave_retention_days` is set, then
    /// the count-based one with `max_autosaves`.
    pub fn apply_autosave_retention(&self) -> Result<usize> {
        let mut removed = 0;
        if let Some(days) = self.config.autosave_retention_days {
            removed += self.cleanup_expired_autosaves(days)?;
        }
        removed += self.cleanup_old_autosaves(self.config.max_autosaves)?;
        Ok(removed)
    }

    /// Remove blobs no surviving snapshot references
    ///
    /// Returns the number of blob files removed. Their `contents` rows are
    /// pruned as well.
    #[instrument(skip(self))]
    pub fn cleanup_orphaned_contents(&self) -> Result<usize> {
        let referenced = self.metadata.referenced_hashes()?;
        let removed = self.storage.delete_unreferenced(&referenced)?;
        let pruned = self.metadata.prune_unreferenced_contents()?;
        info!("Removed {} orphaned blobs ({} content rows)", removed, pruned);
        Ok(removed)
    }

    /// Storage-wide counters
    pub fn stats(&self) -> Result<VaultStats> {
        let (original_bytes, stored_bytes) = self.metadata.content_totals()?;
        Ok(VaultStats {
            snapshot_count: self.metadata.snapshot_count()?,
            blob_count: self.storage.list_all()?.len(),
            original_bytes,
            stored_bytes,
        })
    }
}

/// Up to [`MAX_MATCHES_PER_FILE`] lines of `text` containing `needle`
///
/// `needle` must already be lowercased when `case_sensitive` is false.
fn find_matches(text: &str, needle: &str, case_sensitive: bool) -> Vec<SearchMatch> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            if case_sensitive {
                line.contains(needle)
            } else {
                line.to_lowercase().contains(needle)
            }
        })
        .take(MAX_MATCHES_PER_FILE)
        .map(|(idx, line)| SearchMatch {
            line_number: idx + 1,
            line: line.trim_end().to_string(),
        })
        .collect()
}

/// `output` with `.tar.gz` appended unless it already ends that way
fn archive_path(output: &Path) -> PathBuf {
    if output.to_string_lossy().ends_with(".tar.gz") {
        return output.to_path_buf();
    }
    let mut name = output.as_os_str().to_os_string();
    name.push(".tar.gz");
    PathBuf::from(name)
}

/// Write `content` via a temp file in the same directory, then set `mode`
fn write_file_atomic(destination: &Path, content: &[u8], mode: u32) -> Result<()> {
    let parent = destination
        .parent()
        .ok_or_else(|| VaultError::internal(format!("{:?} has no parent", destination)))?;
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(content)?;
    tmp.persist(destination).map_err(|e| e.error)?;
    utils::set_permissions(destination, mode)?;
    Ok(())
}

fn write_config(path: &Path, config: &VaultConfig) -> Result<()> {
    let json = serde_json::to_vec_pretty(config)?;
    let dir = path
        .parent()
        .ok_or_else(|| VaultError::internal(format!("{:?} has no parent", path)))?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&json)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Builder for configuring a [`Vault`]
///
/// Settings only apply when new storage is initialized. Opening existing
/// storage uses the configuration saved in it.
///
/// # Examples
///
/// ```rust,no_run
/// use snapvault::VaultBuilder;
/// use std::path::PathBuf;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let vault = VaultBuilder::new()
///     .compression_level(9)
///     .max_autosaves(20)
///     .autosave_retention_days(Some(30))
///     .build(PathBuf::from("./project"), PathBuf::from("./project/.snapvault"))?;
/// # Ok(())
/// # }
/// ```
///
/// # Default Values
///
/// - `compression_enabled`: true
/// - `compression_level`: 3
/// - `ignore_patterns`: empty (the storage directory is always ignored)
/// - `max_file_size`: 0 (no limit)
/// - `max_autosaves`: 50
/// - `autosave_retention_days`: none
#[derive(Debug, Clone)]
pub struct VaultBuilder {
    compression_enabled: bool,
    compression_level: i32,
    ignore_patterns: Vec<String>,
    max_file_size: u64,
    max_autosaves: usize,
    autosave_retention_days: Option<u32>,
}

impl VaultBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self {
            compression_enabled: true,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            ignore_patterns: Vec::new(),
            max_file_size: 0,
            max_autosaves: DEFAULT_MAX_AUTOSAVES,
            autosave_retention_days: None,
        }
    }

    /// Store blobs raw instead of zstd-compressed when `false`
    pub fn compression_enabled(mut self, enabled: bool) -> Self {
        self.compression_enabled = enabled;
        self
    }

    /// Set the zstd level; values outside `1..=22` are clamped
    pub fn compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    /// Set ignore patterns
    ///
    /// Patterns use gitignore syntax and apply to working-tree scans on top
    /// of any `.gitignore` files.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use snapvault::VaultBuilder;
    ///
    /// let builder = VaultBuilder::new()
    ///     .ignore_patterns(vec!["*.tmp".to_string(), "target/".to_string()]);
    /// ```
    pub fn ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Skip files larger than `size` bytes when scanning (0 = no limit)
    pub fn max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }

    /// Autosaves kept by [`Vault::apply_autosave_retention`]
    pub fn max_autosaves(mut self, count: usize) -> Self {
        self.max_autosaves = count;
        self
    }

    /// Age limit for autosaves applied by [`Vault::apply_autosave_retention`]
    pub fn autosave_retention_days(mut self, days: Option<u32>) -> Self {
        self.autosave_retention_days = days;
        self
    }

    fn into_config(self, project_root: PathBuf, storage_path: PathBuf) -> VaultConfig {
        VaultConfig {
            project_root,
            storage_path,
            compression_enabled: self.compression_enabled,
            compression_level: crate::compression::clamp_level(self.compression_level),
            ignore_patterns: self.ignore_patterns,
            max_file_size: self.max_file_size,
            max_autosaves: self.max_autosaves,
            autosave_retention_days: self.autosave_retention_days,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Open the storage if it exists, otherwise initialize it
    ///
    /// # Errors
    ///
    /// See [`Vault::init`] and [`Vault::open`].
    pub fn build(self, project_root: PathBuf, storage_path: PathBuf) -> Result<Vault> {
        if storage_path.join(CONFIG_FILE).exists() {
            Vault::open(project_root, storage_path)
        } else {
            Vault::init_with_config(self.into_config(project_root, storage_path))
        }
    }
}

impl Default for VaultBuilder {
    fn default() -> Self {
        Self::new()
    }
}
