//! Utility functions for snapvault
//!
//! ## Categories
//!
//! - **Hashing**: SHA-256 of files, byte slices and whole file lists
//! - **Metadata**: size and permission bits of files on disk
//! - **Paths**: `/`-separated relative paths and safety checks for paths
//!   read back from storage
//! - **Formatting**: human readable byte sizes

use crate::error::Result;
use crate::types::FileEntry;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path};

/// Hash file content using SHA-256
///
/// Streams the file through the hasher, so memory use does not depend on
/// file size.
///
/// # Returns
///
/// The digest as a 64-character lowercase hex string.
///
/// # Errors
///
/// Returns [`VaultError::Io`](crate::VaultError::Io) if the file cannot be
/// opened or read.
pub fn hash_file_content(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Hash arbitrary data using SHA-256
///
/// # Example
///
/// ```rust
/// use snapvault::utils::hash_data;
///
/// let hash = hash_data(b"Hello, world!");
/// assert_eq!(hash.len(), 64);
/// assert_eq!(hash, hash_data(b"Hello, world!"));
/// ```
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Digest identifying a file list
///
/// Entries are sorted by path before hashing, so enumeration order does not
/// matter. Each entry contributes its path bytes followed by its hash bytes.
pub fn snapshot_content_hash(entries: &[FileEntry]) -> String {
    let mut sorted: Vec<&FileEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));

    let mut hasher = Sha256::new();
    for entry in sorted {
        hasher.update(entry.path.as_bytes());
        hasher.update(entry.hash.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// File metadata container
#[derive(Debug, Clone, Copy)]
pub struct FileMetadata {
    /// File size in bytes
    pub size: u64,
    /// Permission bits (e.g. `0o644`)
    pub mode: u32,
    /// Whether this is a symbolic link
    pub is_symlink: bool,
    /// Whether this is a regular file
    pub is_file: bool,
}

/// Get file metadata without following symlinks
pub fn get_file_metadata(path: &Path) -> Result<FileMetadata> {
    let metadata = fs::symlink_metadata(path)?;
    let file_type = metadata.file_type();

    Ok(FileMetadata {
        size: metadata.len(),
        mode: get_permissions(&metadata),
        is_symlink: file_type.is_symlink(),
        is_file: file_type.is_file(),
    })
}

/// Get Unix permissions from metadata
#[cfg(unix)]
fn get_permissions(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

/// Get permissions from metadata (Windows implementation)
#[cfg(windows)]
fn get_permissions(metadata: &fs::Metadata) -> u32 {
    // Only the read-only attribute maps onto Unix bits
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

/// Set Unix permissions
#[cfg(unix)]
pub fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))?;
    Ok(())
}

/// Set permissions (Windows implementation)
#[cfg(windows)]
pub fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly((mode & 0o200) == 0);
    fs::set_permissions(path, perms)?;
    Ok(())
}

/// Project-relative, `/`-separated form of `path`
///
/// Returns `None` if `path` is not under `base`.
pub fn relative_slash_path(path: &Path, base: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Whether a stored relative path can be joined onto a target directory
///
/// Rejects empty, absolute and parent-traversing paths.
pub fn is_safe_relative(path: &str) -> bool {
    if path.is_empty() || path.starts_with('/') || path.starts_with('\\') {
        return false;
    }
    Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Format bytes as human-readable string
///
/// ```rust
/// use snapvault::utils::format_bytes;
///
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
