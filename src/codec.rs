//! Byte codec for archived blobs
//!
//! Compression is stateless: bytes in, bytes out. The catalog owns where the
//! compressed bytes live; this module only transforms and fingerprints them.

use crate::error::Result;
use crate::DEFAULT_COMPRESSION_LEVEL;
use std::io::{Read, Write};
use zstd::{Decoder, Encoder};

/// Zstandard codec for archive blobs
pub struct Codec {
    level: i32,
}

impl Codec {
    pub fn new() -> Self {
        Self {
            level: DEFAULT_COMPRESSION_LEVEL,
        }
    }

    pub fn with_level(level: i32) -> Self {
        Self { level }
    }

    /// Compress a buffer with zstd
    pub fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = Encoder::new(Vec::new(), self.level)?;
        encoder.write_all(bytes)?;
        Ok(encoder.finish()?)
    }

    /// Decompress a zstd buffer
    pub fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = Decoder::new(bytes)?;
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(out)
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

/// Blake3 hash of raw file bytes as a hex string
pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Fraction of bytes saved by compression (`1 - compressed/original`)
pub fn compression_ratio(original_size: u64, compressed_size: u64) -> f64 {
    if original_size == 0 {
        0.0
    } else {
        1.0 - compressed_size as f64 / original_size as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_roundtrip() {
        let codec = Codec::new();
        let input = b"id,amount\n1,10\n2,20\n3,30\n".repeat(100);

        let compressed = codec.compress(&input).unwrap();
        assert!(compressed.len() < input.len());

        let restored = codec.decompress(&compressed).unwrap();
        assert_eq!(restored, input);
    }

    #[test]
    fn test_decompress_garbage_fails() {
        let codec = Codec::new();
        assert!(codec.decompress(b"not a zstd frame").is_err());
    }

    #[test]
    fn test_content_hash_is_stable() {
        let a = content_hash(b"hello");
        let b = content_hash(b"hello");
        let c = content_hash(b"hello!");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_compression_ratio() {
        assert_eq!(compression_ratio(0, 0), 0.0);
        assert!((compression_ratio(100, 25) - 0.75).abs() < f64::EPSILON);
        // Incompressible data can produce a negative ratio
        assert!(compression_ratio(100, 120) < 0.0);
    }
}
