//! # snapvault - Versioned, content-addressed project snapshots
//!
//! A library for recording immutable snapshots of a project tree, with
//! deduplicated compressed storage and a queryable history.
//!
//! ## Overview
//!
//! snapvault lets you:
//! - Record snapshots of a directory, manually or from an autosave trigger
//! - Read any file as it was in any snapshot
//! - Restore a whole snapshot or a filtered subset of it
//! - Export a snapshot to a folder or a `.tar.gz` archive
//! - Compare snapshots with each other or with the live tree
//! - Follow one file through history and search stored contents
//!
//! ## Architecture
//!
//! - **Content-Addressable Storage**: File contents are stored once per
//!   SHA-256 digest, so unchanged files cost nothing in later snapshots
//! - **Compression**: Blobs are zstd-compressed (or stored raw when
//!   compression is disabled)
//! - **Metadata Store**: Snapshot records and file lists live in an embedded
//!   SQLite database; each snapshot is recorded in one transaction
//! - **Parallel Scanning**: The working tree is walked and hashed in parallel,
//!   honouring `.gitignore` files
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use snapvault::{SnapshotOptions, VaultBuilder};
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let vault = VaultBuilder::new().build(
//!     PathBuf::from("./my_project"),
//!     PathBuf::from("./my_project/.snapvault"),
//! )?;
//!
//! let snapshot = vault.snapshot_working_tree(&SnapshotOptions {
//!     message: Some("Initial state".to_string()),
//!     tag: Some("v1".to_string()),
//!     ..Default::default()
//! })?;
//! println!("Created snapshot {}", snapshot.metadata.id);
//!
//! // Make some changes, then bring one file back
//! let filters = vec!["src/main.rs".to_string()];
//! let result = vault.restore_snapshot("v1", None, true, Some(filters.as_slice()))?;
//! println!("Restored {} files", result.restored);
//! # Ok(())
//! # }
//! ```
//!
//! ## References
//!
//! Snapshots are addressed by [`Reference`]: a string that parses as a
//! base-10 integer is an id, anything else is a tag. Tags need not be
//! unique; a tag resolves to the newest snapshot carrying it.
//!
//! ## Storage Growth
//!
//! Deleting a snapshot only removes its records. Blobs no longer referenced
//! by any snapshot are reclaimed by [`Vault::cleanup_orphaned_contents`].
//!
//! ## Error Handling
//!
//! All operations return `Result<T, VaultError>`. Bulk operations (restore,
//! export, search) report per-file problems in their result values instead
//! of failing.
//!
//! ## Module Organization
//!
//! - [`vault`]: The snapshot engine and its builder
//! - [`storage`]: Content-addressable blob store
//! - [`metadata`]: SQLite snapshot records
//! - [`compression`]: zstd blob encoding
//! - [`file_tracking`]: Working-tree scanner
//! - [`diff`]: Snapshot comparison and changelogs
//! - [`filter`]: Path filters
//! - [`types`]: Common types and data structures
//! - [`error`]: Error types and handling

pub mod compression;
pub mod diff;
pub mod error;
pub mod file_tracking;
pub mod filter;
pub mod metadata;
pub mod storage;
pub mod types;
pub mod utils;
pub mod vault;

// Re-export main types for convenience
pub use compression::Compressor;
pub use error::{Result, VaultError};
pub use filter::PathFilter;
pub use metadata::MetadataStore;
pub use storage::BlobStore;
pub use types::*;
pub use vault::{Vault, VaultBuilder};
