//! Content-addressable blob store
//!
//! Blobs are keyed by the SHA-256 hex digest of their original content and
//! written once. The store never interprets the bytes it holds: encoding and
//! decoding is done by [`Compressor`](crate::compression::Compressor).
//!
//! ## Layout
//!
//! ```text
//! storage_root/
//! ├── config.json            # Vault configuration
//! ├── snapvault.db           # Snapshot metadata (SQLite)
//! └── objects/               # Content-addressable blobs (sharded)
//!     └── <prefix>/          # First 2 chars of hash
//!         └── <suffix>       # Remaining hash chars
//! ```
//!
//! ## Durability
//!
//! Every blob is written to a temporary file inside its shard directory and
//! renamed into place, so a crash never leaves a partially written blob under
//! a valid key. Blobs are written before the metadata that references them;
//! blobs left behind by an interrupted snapshot are reclaimed by
//! [`BlobStore::delete_unreferenced`].

use crate::compression::{Compressor, EncodedBlob};
use crate::error::{Result, VaultError};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, trace};

/// Directory under the storage root holding blobs
pub const OBJECTS_DIR: &str = "objects";

/// Sharded, write-once blob store
///
/// # Example
///
/// ```rust
/// use snapvault::compression::Compressor;
/// use snapvault::storage::BlobStore;
/// use snapvault::utils::hash_data;
///
/// # fn main() -> snapvault::Result<()> {
/// let dir = tempfile::TempDir::new()?;
/// let store = BlobStore::open(dir.path())?;
/// let compressor = Compressor::default();
///
/// let content = b"Hello, world!";
/// let hash = hash_data(content);
/// assert!(store.store(&hash, &compressor.compress(content)?)?);
/// assert_eq!(store.load(&hash, &compressor)?, Some(content.to_vec()));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BlobStore {
    objects_dir: PathBuf,
}

impl BlobStore {
    /// Open the blob store under a storage root, creating `objects/` if needed
    pub fn open(storage_root: &Path) -> Result<Self> {
        let objects_dir = storage_root.join(OBJECTS_DIR);
        fs::create_dir_all(&objects_dir)?;
        Ok(Self { objects_dir })
    }

    /// Directory holding the shards
    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    /// Check if a blob exists
    pub fn exists(&self, hash: &str) -> Result<bool> {
        Ok(self.object_path(hash)?.is_file())
    }

    /// Write an encoded blob unless one is already present under `hash`
    ///
    /// Existing blobs are never overwritten.
    ///
    /// # Returns
    ///
    /// `true` if the blob was written, `false` if it already existed.
    ///
    /// # Errors
    ///
    /// - [`VaultError::InvalidHash`] if `hash` is not a usable hex digest
    /// - [`VaultError::Io`] if the write or rename fails
    pub fn store(&self, hash: &str, blob: &EncodedBlob) -> Result<bool> {
        let object_path = self.object_path(hash)?;
        if object_path.is_file() {
            trace!("Blob {} already present", short(hash));
            return Ok(false);
        }

        let shard_dir = object_path
            .parent()
            .ok_or_else(|| VaultError::storage(format!("No shard directory for {}", hash)))?;
        fs::create_dir_all(shard_dir)?;

        let mut tmp = NamedTempFile::new_in(shard_dir)?;
        tmp.write_all(&blob.data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&object_path).map_err(|e| e.error)?;

        trace!(
            "Stored blob {} ({} -> {} bytes)",
            short(hash),
            blob.original_size,
            blob.encoded_size
        );
        Ok(true)
    }

    /// Read the stored (encoded) bytes of a blob
    pub fn get(&self, hash: &str) -> Result<Option<Vec<u8>>> {
        let object_path = self.object_path(hash)?;
        match fs::read(&object_path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read and decode a blob
    pub fn load(&self, hash: &str, compressor: &Compressor) -> Result<Option<Vec<u8>>> {
        Ok(self.get(hash)?.map(|bytes| compressor.decompress(&bytes)))
    }

    /// Size of a stored blob on disk
    pub fn stored_size(&self, hash: &str) -> Result<u64> {
        let object_path = self.object_path(hash)?;
        match fs::metadata(&object_path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(VaultError::ObjectNotFound(hash.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a blob; returns whether it existed
    pub fn delete(&self, hash: &str) -> Result<bool> {
        let object_path = self.object_path(hash)?;
        match fs::remove_file(&object_path) {
            Ok(()) => {
                debug!("Deleted blob {}", short(hash));
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// List every blob hash in the store
    pub fn list_all(&self) -> Result<Vec<String>> {
        let mut objects = Vec::new();

        if !self.objects_dir.exists() {
            return Ok(objects);
        }

        for shard_entry in fs::read_dir(&self.objects_dir)? {
            let shard_entry = shard_entry?;
            if !shard_entry.file_type()?.is_dir() {
                continue;
            }
            let shard_name = shard_entry.file_name().to_string_lossy().to_string();

            for object_entry in fs::read_dir(shard_entry.path())? {
                let object_entry = object_entry?;
                if !object_entry.file_type()?.is_file() {
                    continue;
                }
                let object_name = object_entry.file_name().to_string_lossy().to_string();
                let hash = format!("{}{}", shard_name, object_name);
                // Leftover temp files from an interrupted write are not blobs
                if is_valid_hash(&hash) {
                    objects.push(hash);
                }
            }
        }

        objects.sort();
        Ok(objects)
    }

    /// Delete every blob whose hash is not in `referenced`
    ///
    /// # Returns
    ///
    /// Number of blobs removed.
    pub fn delete_unreferenced(&self, referenced: &HashSet<String>) -> Result<usize> {
        let mut removed = 0;
        for hash in self.list_all()? {
            if !referenced.contains(&hash) && self.delete(&hash)? {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!("Removed {} unreferenced blobs", removed);
        }
        Ok(removed)
    }

    /// Get path for a blob (with sharding)
    fn object_path(&self, hash: &str) -> Result<PathBuf> {
        if !is_valid_hash(hash) {
            return Err(VaultError::InvalidHash(hash.to_string()));
        }
        let (prefix, suffix) = hash.split_at(2);
        Ok(self.objects_dir.join(prefix).join(suffix))
    }
}

/// Length of a lowercase hex SHA-256 digest
pub const HASH_HEX_LEN: usize = 64;

/// Whether a string can be used as a blob key
pub fn is_valid_hash(hash: &str) -> bool {
    hash.len() == HASH_HEX_LEN
        && hash.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn short(hash: &str) -> &str {
    &hash[..hash.len().min(8)]
}
