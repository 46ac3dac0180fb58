//! Content-addressed blob storage.
//!
//! Blobs are keyed by the SHA-256 of their uncompressed bytes, compressed
//! with the configured codec, and stored inline when small or as ordered
//! chunks (the large-object path) when the compressed size exceeds the
//! inline threshold. Blobs are never deleted: filings must stay
//! retrievable indefinitely.

use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};
use tracing::debug;

use xbrlkit_core::{CompressionType, Error, Result};

use crate::codec;
use crate::store::XbrlStore;
use crate::types::{now_ms, BlobRef, BlobStorage, ContentStats};

impl XbrlStore {
    /// Store `raw` and return its content-addressed reference.
    ///
    /// Idempotent: identical bytes return the existing reference without
    /// re-storing, regardless of the codec they were first stored with.
    pub fn put_blob(&self, raw: &[u8]) -> Result<BlobRef> {
        let hash = content_hash(raw);

        if let Some(existing) = self.get_blob_ref(&hash)? {
            return Ok(existing);
        }

        let codec = self.config.compression;
        let stored = codec::compress(raw, codec, self.config.zstd_level)?;
        let inline = stored.len() <= self.config.inline_threshold_bytes;
        let now = now_ms();

        let conn = self.conn.lock();
        if inline {
            conn.prepare_cached(
                "INSERT OR IGNORE INTO blobs \
                 (hash, compression, raw_size, stored_size, inline_content, lob_id, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6)",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .execute(params![
                hash,
                codec.as_str(),
                raw.len() as i64,
                stored.len() as i64,
                stored,
                now
            ])
            .map_err(|e| Error::Database(e.to_string()))?;
        } else {
            // Lob ids are allocated under the connection lock, so the
            // max+1 scan cannot race within this process; cross-process
            // writers are serialized by SQLite's write lock.
            let lob_id: i64 = conn
                .query_row(
                    "SELECT COALESCE(MAX(lob_id), 0) + 1 FROM blobs",
                    [],
                    |row| row.get(0),
                )
                .map_err(|e| Error::Database(e.to_string()))?;

            let inserted = conn
                .prepare_cached(
                    "INSERT OR IGNORE INTO blobs \
                     (hash, compression, raw_size, stored_size, inline_content, lob_id, created_at) \
                     VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6)",
                )
                .map_err(|e| Error::Database(e.to_string()))?
                .execute(params![
                    hash,
                    codec.as_str(),
                    raw.len() as i64,
                    stored.len() as i64,
                    lob_id,
                    now
                ])
                .map_err(|e| Error::Database(e.to_string()))?;

            if inserted > 0 {
                let mut stmt = conn
                    .prepare_cached(
                        "INSERT INTO blob_chunks (lob_id, seq, content) VALUES (?1, ?2, ?3)",
                    )
                    .map_err(|e| Error::Database(e.to_string()))?;
                for (seq, chunk) in stored.chunks(self.config.lob_chunk_bytes).enumerate() {
                    stmt.execute(params![lob_id, seq as i64, chunk])
                        .map_err(|e| Error::Database(e.to_string()))?;
                }
            }
        }
        drop(conn);

        debug!(
            hash = %hash,
            raw = raw.len(),
            stored = stored.len(),
            inline,
            "stored blob"
        );

        // Re-read instead of constructing: a concurrent writer may have
        // won the INSERT OR IGNORE race with different storage placement.
        self.get_blob_ref(&hash)?.ok_or_else(|| {
            Error::Internal(format!("blob {hash} missing immediately after insert"))
        })
    }

    /// Look up a blob reference by content hash.
    pub fn get_blob_ref(&self, hash: &str) -> Result<Option<BlobRef>> {
        let conn = self.conn.lock();
        let row = conn
            .prepare_cached(
                "SELECT compression, raw_size, stored_size, inline_content IS NOT NULL, lob_id \
                 FROM blobs WHERE hash = ?1",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![hash], |row| {
                let compression: String = row.get(0)?;
                let raw_size: i64 = row.get(1)?;
                let stored_size: i64 = row.get(2)?;
                let is_inline: bool = row.get(3)?;
                let lob_id: Option<i64> = row.get(4)?;
                Ok((compression, raw_size, stored_size, is_inline, lob_id))
            })
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;
        row.map(|(compression, raw_size, stored_size, is_inline, lob_id)| {
            let compression: CompressionType = compression.parse()?;
            let storage = if is_inline {
                BlobStorage::Inline
            } else {
                BlobStorage::LargeObject(lob_id.ok_or_else(|| {
                    Error::Database(format!("blob {hash} has neither inline content nor lob id"))
                })?)
            };
            Ok(BlobRef {
                hash: hash.to_string(),
                compression,
                storage,
                raw_size: raw_size as u64,
                stored_size: stored_size as u64,
            })
        })
        .transpose()
    }

    /// Retrieve and verify the original bytes for a reference.
    ///
    /// Fails with `NotFound` for a dangling reference and `Integrity` when
    /// the decompressed content no longer matches its recorded hash.
    pub fn get_blob(&self, blob_ref: &BlobRef) -> Result<Vec<u8>> {
        let stored = {
            let conn = self.conn.lock();
            match blob_ref.storage {
                BlobStorage::Inline => conn
                    .prepare_cached("SELECT inline_content FROM blobs WHERE hash = ?1")
                    .map_err(|e| Error::Database(e.to_string()))?
                    .query_row(params![blob_ref.hash], |row| {
                        row.get::<_, Option<Vec<u8>>>(0)
                    })
                    .optional()
                    .map_err(|e| Error::Database(e.to_string()))?
                    .flatten()
                    .ok_or_else(|| Error::NotFound(format!("blob {}", blob_ref.hash)))?,
                BlobStorage::LargeObject(lob_id) => {
                    let mut stmt = conn
                        .prepare_cached(
                            "SELECT content FROM blob_chunks WHERE lob_id = ?1 ORDER BY seq",
                        )
                        .map_err(|e| Error::Database(e.to_string()))?;
                    let chunks: Vec<Vec<u8>> = stmt
                        .query_map(params![lob_id], |row| row.get(0))
                        .map_err(|e| Error::Database(e.to_string()))?
                        .collect::<std::result::Result<_, _>>()
                        .map_err(|e| Error::Database(e.to_string()))?;
                    if chunks.is_empty() {
                        return Err(Error::NotFound(format!("blob {}", blob_ref.hash)));
                    }
                    chunks.concat()
                }
            }
        };

        let raw = codec::decompress(&stored, blob_ref.compression)?;
        if content_hash(&raw) != blob_ref.hash {
            return Err(Error::Integrity(blob_ref.hash.clone()));
        }
        Ok(raw)
    }

    /// Convenience: fetch by hash alone.
    pub fn get_blob_by_hash(&self, hash: &str) -> Result<Vec<u8>> {
        let blob_ref = self
            .get_blob_ref(hash)?
            .ok_or_else(|| Error::NotFound(format!("blob {hash}")))?;
        self.get_blob(&blob_ref)
    }

    /// Aggregate content store statistics.
    pub fn content_stats(&self) -> Result<ContentStats> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(raw_size), 0), COALESCE(SUM(stored_size), 0), \
             COALESCE(SUM(inline_content IS NOT NULL), 0), COALESCE(SUM(lob_id IS NOT NULL), 0) \
             FROM blobs",
            [],
            |row| {
                Ok(ContentStats {
                    total_blobs: row.get::<_, i64>(0)? as u64,
                    total_raw_bytes: row.get::<_, i64>(1)? as u64,
                    total_stored_bytes: row.get::<_, i64>(2)? as u64,
                    inline_blobs: row.get::<_, i64>(3)? as u64,
                    large_object_blobs: row.get::<_, i64>(4)? as u64,
                })
            },
        )
        .map_err(|e| Error::Database(e.to_string()))
    }
}

/// Hex SHA-256 of `raw`.
pub fn content_hash(raw: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use xbrlkit_core::StoreConfig;

    fn test_store() -> XbrlStore {
        XbrlStore::open_in_memory(StoreConfig::default()).unwrap()
    }

    #[test]
    fn test_put_get_round_trip() {
        let store = test_store();
        let raw = b"<xsd:schema targetNamespace=\"http://example.com/t\"/>".to_vec();
        let blob_ref = store.put_blob(&raw).unwrap();
        assert_eq!(store.get_blob(&blob_ref).unwrap(), raw);
    }

    #[test]
    fn test_round_trip_every_codec() {
        let raw = b"period instant duration segment scenario".repeat(100);
        for compression in [
            CompressionType::Zstd,
            CompressionType::Lz4,
            CompressionType::Gzip,
            CompressionType::None,
        ] {
            let store = XbrlStore::open_in_memory(StoreConfig {
                compression,
                ..Default::default()
            })
            .unwrap();
            let blob_ref = store.put_blob(&raw).unwrap();
            assert_eq!(blob_ref.compression, compression);
            assert_eq!(store.get_blob(&blob_ref).unwrap(), raw);
        }
    }

    #[test]
    fn test_put_is_idempotent() {
        let store = test_store();
        let raw = b"identical bytes".to_vec();
        let first = store.put_blob(&raw).unwrap();
        let second = store.put_blob(&raw).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.content_stats().unwrap().total_blobs, 1);
    }

    #[test]
    fn test_large_object_path() {
        // Shrink the threshold so incompressible content takes the lob path.
        let store = XbrlStore::open_in_memory(StoreConfig {
            compression: CompressionType::None,
            inline_threshold_bytes: 1024,
            lob_chunk_bytes: 512,
            ..Default::default()
        })
        .unwrap();

        let raw: Vec<u8> = (0..8192u32).map(|i| (i % 251) as u8).collect();
        let blob_ref = store.put_blob(&raw).unwrap();
        assert!(matches!(blob_ref.storage, BlobStorage::LargeObject(_)));
        assert_eq!(store.get_blob(&blob_ref).unwrap(), raw);

        let stats = store.content_stats().unwrap();
        assert_eq!(stats.large_object_blobs, 1);
        assert_eq!(stats.inline_blobs, 0);
    }

    #[test]
    fn test_dangling_ref_is_not_found() {
        let store = test_store();
        let blob_ref = BlobRef {
            hash: "deadbeef".into(),
            compression: CompressionType::None,
            storage: BlobStorage::Inline,
            raw_size: 0,
            stored_size: 0,
        };
        assert!(matches!(
            store.get_blob(&blob_ref),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_integrity_failure_on_corruption() {
        let store = test_store();
        let blob_ref = store.put_blob(b"original content").unwrap();

        // Corrupt the stored bytes underneath the reference.
        {
            let conn = store.conn.lock();
            let bogus = codec::compress(b"tampered", CompressionType::Zstd, 3).unwrap();
            conn.execute(
                "UPDATE blobs SET inline_content = ?1 WHERE hash = ?2",
                params![bogus, blob_ref.hash],
            )
            .unwrap();
        }

        assert!(matches!(
            store.get_blob(&blob_ref),
            Err(Error::Integrity(_))
        ));
    }
}
