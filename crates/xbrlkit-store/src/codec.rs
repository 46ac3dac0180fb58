//! Blob compression codecs.

use std::io::{Read, Write};

use xbrlkit_core::{CompressionType, Error, Result};

/// Compress `raw` with the given codec.
pub fn compress(raw: &[u8], codec: CompressionType, zstd_level: i32) -> Result<Vec<u8>> {
    match codec {
        CompressionType::Zstd => zstd::stream::encode_all(raw, zstd_level)
            .map_err(|e| Error::Storage(format!("zstd encode: {e}"))),
        CompressionType::Lz4 => Ok(lz4_flex::compress_prepend_size(raw)),
        CompressionType::Gzip => {
            let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            enc.write_all(raw)
                .and_then(|_| enc.finish())
                .map_err(|e| Error::Storage(format!("gzip encode: {e}")))
        }
        CompressionType::None => Ok(raw.to_vec()),
    }
}

/// Decompress `stored` back to the original bytes.
pub fn decompress(stored: &[u8], codec: CompressionType) -> Result<Vec<u8>> {
    match codec {
        CompressionType::Zstd => zstd::stream::decode_all(stored)
            .map_err(|e| Error::Storage(format!("zstd decode: {e}"))),
        CompressionType::Lz4 => lz4_flex::decompress_size_prepended(stored)
            .map_err(|e| Error::Storage(format!("lz4 decode: {e}"))),
        CompressionType::Gzip => {
            let mut dec = flate2::read::GzDecoder::new(stored);
            let mut out = Vec::new();
            dec.read_to_end(&mut out)
                .map_err(|e| Error::Storage(format!("gzip decode: {e}")))?;
            Ok(out)
        }
        CompressionType::None => Ok(stored.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_codecs() {
        let raw = b"<xbrl>some moderately repetitive content content content</xbrl>".repeat(50);
        for codec in [
            CompressionType::Zstd,
            CompressionType::Lz4,
            CompressionType::Gzip,
            CompressionType::None,
        ] {
            let stored = compress(&raw, codec, 3).unwrap();
            let back = decompress(&stored, codec).unwrap();
            assert_eq!(back, raw, "round trip failed for {:?}", codec);
        }
    }

    #[test]
    fn test_compression_shrinks_repetitive_input() {
        let raw = b"AAAA".repeat(10_000);
        let stored = compress(&raw, CompressionType::Zstd, 3).unwrap();
        assert!(stored.len() < raw.len() / 10);
    }

    #[test]
    fn test_empty_input() {
        for codec in [
            CompressionType::Zstd,
            CompressionType::Lz4,
            CompressionType::Gzip,
            CompressionType::None,
        ] {
            let stored = compress(b"", codec, 3).unwrap();
            assert_eq!(decompress(&stored, codec).unwrap(), Vec::<u8>::new());
        }
    }
}
