//! Core data types used throughout the snapvault library
//!
//! ## Overview
//!
//! The types in this module represent:
//! - **Snapshot state**: `FileEntry`, `SnapshotMetadata`, `Snapshot`
//! - **Addressing**: `Reference`, `DiffTarget` - how callers name a snapshot
//! - **Operation results**: `RestoreResult`, `ExportResult`, `SnapshotDiff`,
//!   `FileHistoryEntry`, `SearchResult`
//! - **Configuration**: `VaultConfig`, `SnapshotOptions`, `SearchOptions`
//!
//! ## Examples
//!
//! ```rust
//! use snapvault::types::{Reference, SnapshotOptions};
//!
//! // Integer parsing wins, anything else is a tag
//! assert_eq!(Reference::from("42"), Reference::ById(42));
//! assert_eq!(Reference::from("v1.0"), Reference::ByTag("v1.0".to_string()));
//!
//! let options = SnapshotOptions {
//!     message: Some("Before refactor".to_string()),
//!     tag: Some("before-refactor".to_string()),
//!     ..Default::default()
//! };
//! assert_eq!(options.trigger_type, "manual");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Trigger recorded for snapshots created by an explicit user action
pub const TRIGGER_MANUAL: &str = "manual";

/// Trigger recorded for autosaves that name no more specific cause
pub const TRIGGER_AUTOSAVE: &str = "autosave";

/// Default permission bits for entries that carry no mode
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// One file's content and placement within a snapshot
///
/// Paths are project-relative and always `/`-separated, regardless of the
/// host platform. `hash` is the SHA-256 hex digest of the raw file content
/// and doubles as the blob store key.
///
/// # Examples
///
/// ```rust
/// # use snapvault::types::FileEntry;
/// let entry = FileEntry::new("src/main.rs", "ab".repeat(32), 1024, 0o644);
/// assert_eq!(entry.path, "src/main.rs");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FileEntry {
    /// Relative path from the project root
    pub path: String,
    /// SHA-256 hash of file content
    pub hash: String,
    /// File size in bytes
    pub size: u64,
    /// Unix permission bits
    pub mode: u32,
}

impl FileEntry {
    /// Create a new file entry
    pub fn new(path: impl Into<String>, hash: impl Into<String>, size: u64, mode: u32) -> Self {
        Self {
            path: path.into(),
            hash: hash.into(),
            size,
            mode,
        }
    }
}

/// Persistent record describing one snapshot
///
/// Everything except the size fields is fixed at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotMetadata {
    /// Monotonically increasing id, never reused
    pub id: i64,
    /// SHA-256 over the sorted `(path, hash)` pairs of the snapshot
    pub content_hash: String,
    /// Free-form message
    pub message: Option<String>,
    /// Optional human label; duplicates resolve to the newest snapshot
    pub tag: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Id of the snapshot that was latest when this one was created
    pub parent_id: Option<i64>,
    /// Whether an automatic trigger created this snapshot
    pub is_autosave: bool,
    /// What triggered the snapshot (`manual`, `autosave`, ...)
    pub trigger_type: String,
    /// Number of files in the snapshot
    pub files_count: usize,
    /// Sum of original file sizes
    pub total_size: u64,
    /// Encoded bytes newly written to the blob store by this snapshot
    pub compressed_size: u64,
}

/// A snapshot with its full, path-ordered file list
///
/// The snapshot owns its entries but not the blob bytes; those are shared by
/// hash across every snapshot that references them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    /// Snapshot record
    pub metadata: SnapshotMetadata,
    /// Files ordered by path
    pub files: Vec<FileEntry>,
}

impl Snapshot {
    /// Find a file entry by exact path
    pub fn get_file(&self, path: &str) -> Option<&FileEntry> {
        self.files
            .binary_search_by(|entry| entry.path.as_str().cmp(path))
            .ok()
            .map(|idx| &self.files[idx])
    }

    /// Tag if present, otherwise the numeric id
    pub fn label(&self) -> String {
        self.metadata
            .tag
            .clone()
            .unwrap_or_else(|| self.metadata.id.to_string())
    }
}

/// How a caller names a snapshot
///
/// A reference string that parses as a base-10 integer is an id; anything
/// else is a tag. Parsing happens once, at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reference {
    /// Numeric snapshot id
    ById(i64),
    /// Tag string
    ByTag(String),
}

impl Reference {
    /// Parse a reference string, preferring the integer interpretation
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<i64>() {
            Ok(id) => Reference::ById(id),
            Err(_) => Reference::ByTag(raw.to_string()),
        }
    }
}

impl FromStr for Reference {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Reference::parse(s))
    }
}

impl From<&str> for Reference {
    fn from(raw: &str) -> Self {
        Reference::parse(raw)
    }
}

impl From<String> for Reference {
    fn from(raw: String) -> Self {
        Reference::parse(&raw)
    }
}

impl From<&String> for Reference {
    fn from(raw: &String) -> Self {
        Reference::parse(raw)
    }
}

impl From<i64> for Reference {
    fn from(id: i64) -> Self {
        Reference::ById(id)
    }
}

impl From<&Reference> for Reference {
    fn from(reference: &Reference) -> Self {
        reference.clone()
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::ById(id) => write!(f, "{}", id),
            Reference::ByTag(tag) => write!(f, "{}", tag),
        }
    }
}

/// Right-hand side of a diff: a stored snapshot or the live project tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffTarget {
    /// A stored snapshot
    Snapshot(Reference),
    /// The project tree as it is on disk right now (snapshot id 0)
    WorkingTree,
}

impl DiffTarget {
    /// Keyword that selects the working tree
    pub const CURRENT: &'static str = "current";

    /// Parse a diff target; `current` selects the working tree
    pub fn parse(raw: &str) -> Self {
        if raw.trim() == Self::CURRENT {
            DiffTarget::WorkingTree
        } else {
            DiffTarget::Snapshot(Reference::parse(raw))
        }
    }
}

impl From<&str> for DiffTarget {
    fn from(raw: &str) -> Self {
        DiffTarget::parse(raw)
    }
}

impl From<String> for DiffTarget {
    fn from(raw: String) -> Self {
        DiffTarget::parse(&raw)
    }
}

impl From<i64> for DiffTarget {
    fn from(id: i64) -> Self {
        DiffTarget::Snapshot(Reference::ById(id))
    }
}

impl From<Reference> for DiffTarget {
    fn from(reference: Reference) -> Self {
        DiffTarget::Snapshot(reference)
    }
}

impl From<Option<Reference>> for DiffTarget {
    fn from(reference: Option<Reference>) -> Self {
        reference.map_or(DiffTarget::WorkingTree, DiffTarget::Snapshot)
    }
}

/// A path present on both sides of a diff with differing content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifiedFile {
    /// Project-relative path
    pub path: String,
    /// Hash on the left side
    pub old_hash: String,
    /// Hash on the right side
    pub new_hash: String,
}

/// Set-based difference between two file lists
///
/// Computed on demand, never persisted. `significance_score` is
/// `total_changes / max(files on either side, 1)`; it is a ranking
/// heuristic and can exceed 1.0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDiff {
    /// Left snapshot id
    pub from_snapshot: i64,
    /// Right snapshot id, 0 for the working tree
    pub to_snapshot: i64,
    /// Paths only on the right
    pub files_added: Vec<String>,
    /// Paths only on the left
    pub files_removed: Vec<String>,
    /// Paths on both sides with different hashes
    pub files_modified: Vec<ModifiedFile>,
    /// `added + removed + modified`
    pub total_changes: usize,
    /// Heuristic impact ratio
    pub significance_score: f64,
}

/// A file that could not be processed during a bulk operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    /// Project-relative path
    pub path: String,
    /// Human readable cause
    pub reason: String,
}

/// Outcome of a full or partial restore
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestoreResult {
    /// Snapshot that was restored
    pub snapshot_id: i64,
    /// Number of files written
    pub restored: usize,
    /// Number of files left alone because they already existed
    pub skipped: usize,
    /// Number of files selected for restore
    pub total: usize,
    /// Paths written
    pub files_restored: Vec<String>,
    /// Paths skipped
    pub files_skipped: Vec<String>,
    /// Per-file failures (missing blob, write error, unsafe path)
    pub failures: Vec<FileFailure>,
}

impl RestoreResult {
    /// Whether every selected file was restored or deliberately skipped
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Export destination format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    /// Directory tree mirroring the relative paths
    Folder,
    /// Single gzip-compressed tar archive
    TarGz,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Folder => write!(f, "folder"),
            ExportFormat::TarGz => write!(f, "tar.gz"),
        }
    }
}

/// Outcome of an export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResult {
    /// Tag or id of the exported snapshot
    pub snapshot: String,
    /// Format written
    pub format: ExportFormat,
    /// Folder or archive actually written
    pub output_path: PathBuf,
    /// Paths exported
    pub files_exported: Vec<String>,
    /// Per-file failures
    pub failures: Vec<FileFailure>,
    /// Size of the archive on disk (archive mode only)
    pub archive_size: Option<u64>,
}

impl ExportResult {
    /// Number of files exported
    pub fn exported_count(&self) -> usize {
        self.files_exported.len()
    }

    /// Number of files that failed
    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }
}

/// One point in a file's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHistoryEntry {
    /// Snapshot the record belongs to
    pub snapshot_id: i64,
    /// Snapshot creation time
    pub created_at: DateTime<Utc>,
    /// Snapshot message
    pub message: Option<String>,
    /// Snapshot tag
    pub tag: Option<String>,
    /// Content hash, `None` for removal records
    pub hash: Option<String>,
    /// Size, `None` for removal records
    pub size: Option<u64>,
    /// First snapshot containing the file
    pub first_seen: bool,
    /// Hash differs from the last one seen
    pub changed: bool,
    /// File disappeared in this snapshot
    pub removed: bool,
}

/// A matching line inside a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMatch {
    /// 1-based line number
    pub line_number: usize,
    /// Line text with trailing whitespace trimmed
    pub line: String,
}

/// All matches for one distinct blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Snapshot where this content was first encountered
    pub snapshot_id: i64,
    /// Tag of that snapshot
    pub snapshot_tag: Option<String>,
    /// Path of the file
    pub path: String,
    /// Content hash
    pub hash: String,
    /// Up to five matching lines
    pub matches: Vec<SearchMatch>,
}

/// Options for creating a snapshot
#[derive(Debug, Clone)]
pub struct SnapshotOptions {
    /// Free-form message
    pub message: Option<String>,
    /// Optional tag
    pub tag: Option<String>,
    /// Mark as created by an automatic trigger
    pub is_autosave: bool,
    /// Trigger label stored with the snapshot
    pub trigger_type: String,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            message: None,
            tag: None,
            is_autosave: false,
            trigger_type: TRIGGER_MANUAL.to_string(),
        }
    }
}

impl SnapshotOptions {
    /// Options for an autosave snapshot with the given trigger
    pub fn autosave(trigger_type: impl Into<String>) -> Self {
        Self {
            is_autosave: true,
            trigger_type: trigger_type.into(),
            ..Default::default()
        }
    }
}

/// Options for searching stored content
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Only search paths matching this glob/prefix
    pub file_filter: Option<String>,
    /// Only search this snapshot
    pub snapshot: Option<Reference>,
    /// Match case exactly
    pub case_sensitive: bool,
}

/// Persistent configuration stored alongside the snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Project directory being snapshotted
    pub project_root: PathBuf,
    /// Storage directory
    pub storage_path: PathBuf,
    /// Compress blobs with zstd
    pub compression_enabled: bool,
    /// zstd level, clamped to 1..=22
    pub compression_level: i32,
    /// Extra ignore patterns (gitignore syntax)
    pub ignore_patterns: Vec<String>,
    /// Skip files larger than this when scanning (0 = unlimited)
    pub max_file_size: u64,
    /// Autosaves kept by the retention policy
    pub max_autosaves: usize,
    /// Autosaves older than this many days are expired
    pub autosave_retention_days: Option<u32>,
    /// Version that wrote this configuration
    pub version: String,
}

/// Storage-wide counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultStats {
    /// Snapshots recorded
    pub snapshot_count: usize,
    /// Blob files in the object store
    pub blob_count: usize,
    /// Sum of original sizes of recorded contents
    pub original_bytes: u64,
    /// Sum of encoded sizes of recorded contents
    pub stored_bytes: u64,
}
