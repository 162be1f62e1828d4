//! zstd compression for stored blobs
//!
//! Blobs are compressed independently with zstd before they are written to the
//! blob store. Decoding recognises a zstd frame by its magic number and passes
//! anything else through unchanged, so a store may hold a mix of compressed
//! and raw blobs (for example after compression was toggled in the config).
//!
//! ## Format
//!
//! - Compressed blobs are plain zstd frames, starting with `28 B5 2F FD`
//! - Raw blobs are the original bytes with no header
//!
//! Content that itself starts with the zstd magic (a `.zst` file, say) is
//! always wrapped in a frame, even with compression disabled, so a raw blob
//! never starts with the magic.
//!
//! ## Examples
//!
//! ```rust
//! use snapvault::compression::Compressor;
//!
//! let compressor = Compressor::new(true, 3);
//! let data = b"fn main() {}\n".repeat(100);
//!
//! let blob = compressor.compress(&data).unwrap();
//! assert!(blob.encoded_size < blob.original_size);
//!
//! let decoded = compressor.decompress(&blob.data);
//! assert_eq!(decoded, data);
//! ```

use crate::error::{Result, VaultError};
use tracing::{trace, warn};

/// Magic number at the start of every zstd frame
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Default zstd level
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Lowest accepted zstd level
pub const MIN_COMPRESSION_LEVEL: i32 = 1;

/// Highest accepted zstd level
pub const MAX_COMPRESSION_LEVEL: i32 = 22;

/// Bytes ready to be written to the blob store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBlob {
    /// Encoded bytes (zstd frame or raw content)
    pub data: Vec<u8>,
    /// Size of the content before encoding
    pub original_size: u64,
    /// Size of `data`
    pub encoded_size: u64,
}

impl EncodedBlob {
    /// Wrap raw bytes without compressing them
    pub fn raw(content: &[u8]) -> Self {
        let size = content.len() as u64;
        Self {
            data: content.to_vec(),
            original_size: size,
            encoded_size: size,
        }
    }
}

/// Blob encoder and decoder
///
/// Holds the configured zstd level and whether compression is enabled at all.
/// Decoding does not depend on either setting.
#[derive(Debug, Clone, Copy)]
pub struct Compressor {
    enabled: bool,
    level: i32,
}

impl Compressor {
    /// Create a compressor
    ///
    /// # Arguments
    ///
    /// * `enabled` - When false, `compress` stores content raw
    /// * `level` - zstd level, clamped to `1..=22`
    pub fn new(enabled: bool, level: i32) -> Self {
        Self {
            enabled,
            level: clamp_level(level),
        }
    }

    /// Whether new blobs are compressed
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Effective zstd level
    pub fn level(&self) -> i32 {
        self.level
    }

    /// Encode content for storage
    ///
    /// With compression disabled the content is returned raw and
    /// `encoded_size == original_size`, unless the content starts with the
    /// zstd magic. Such content is framed anyway so that decoding returns it
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Compression`] if the zstd encoder fails.
    pub fn compress(&self, content: &[u8]) -> Result<EncodedBlob> {
        if !self.enabled && !is_zstd_frame(content) {
            return Ok(EncodedBlob::raw(content));
        }

        let data = zstd::encode_all(content, self.level)
            .map_err(|e| VaultError::compression(format!("zstd encode failed: {}", e)))?;

        let original_size = content.len() as u64;
        let encoded_size = data.len() as u64;

        trace!(
            "Compressed {} -> {} bytes at level {}",
            original_size,
            encoded_size,
            self.level
        );

        Ok(EncodedBlob {
            data,
            original_size,
            encoded_size,
        })
    }

    /// Decode stored bytes
    ///
    /// Bytes starting with the zstd magic are decoded; if decoding fails the
    /// input is returned unchanged with a warning. Anything else is returned
    /// as-is.
    pub fn decompress(&self, data: &[u8]) -> Vec<u8> {
        if !is_zstd_frame(data) {
            trace!("Blob has no zstd header, returning as-is");
            return data.to_vec();
        }

        match zstd::decode_all(data) {
            Ok(decoded) => {
                trace!("Decompressed {} bytes to {} bytes", data.len(), decoded.len());
                decoded
            }
            Err(e) => {
                warn!("zstd decode failed, treating blob as raw: {}", e);
                data.to_vec()
            }
        }
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new(true, DEFAULT_COMPRESSION_LEVEL)
    }
}

/// Check whether bytes start with the zstd frame magic
pub fn is_zstd_frame(data: &[u8]) -> bool {
    data.starts_with(&ZSTD_MAGIC)
}

/// Clamp a requested level into the supported zstd range
pub fn clamp_level(level: i32) -> i32 {
    level.clamp(MIN_COMPRESSION_LEVEL, MAX_COMPRESSION_LEVEL)
}
