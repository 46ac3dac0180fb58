//! SQLite-backed store shared by the content, registry and statement layers.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::info;

use xbrlkit_core::{Result, StoreConfig};

use crate::schema::{BLOB_SCHEMA_SQL, REGISTRY_SCHEMA_SQL, STATEMENT_SCHEMA_SQL};

/// The store behind every pipeline stage: content-addressed blobs, the
/// taxonomy registry state machine, and the statement catalog.
///
/// All access is serialized behind one connection mutex; registry upsert
/// semantics additionally hold at the SQL level (UNIQUE constraints), so
/// two independent processes on the same database stay consistent.
pub struct XbrlStore {
    pub(crate) conn: Mutex<Connection>,
    pub(crate) config: StoreConfig,
    db_path: PathBuf,
}

impl XbrlStore {
    /// Open or create the store at `db_dir/xbrlkit.db`.
    pub fn open(db_dir: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir)
            .map_err(|e| xbrlkit_core::Error::Storage(e.to_string()))?;
        let db_path = db_dir.join("xbrlkit.db");

        let conn = Self::create_connection(&db_path)?;
        Self::init_schema(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            config,
            db_path,
        };

        let schemas = store.count_schemas()?;
        let statements = store.count_statements()?;
        info!(
            "XbrlStore initialized: {} schemas, {} statements, path={}",
            schemas,
            statements,
            store.db_path.display()
        );

        Ok(store)
    }

    /// In-memory store for tests and throwaway pipelines.
    pub fn open_in_memory(config: StoreConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| xbrlkit_core::Error::Database(e.to_string()))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| xbrlkit_core::Error::Database(e.to_string()))?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config,
            db_path: PathBuf::from(":memory:"),
        })
    }

    fn create_connection(db_path: &Path) -> Result<Connection> {
        let conn = Connection::open(db_path)
            .map_err(|e| xbrlkit_core::Error::Database(e.to_string()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| xbrlkit_core::Error::Database(e.to_string()))?;
        Ok(conn)
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        // Blob and statement tables first: the registry declares foreign
        // keys into both.
        let full_schema = format!(
            "{}\n{}\n{}",
            BLOB_SCHEMA_SQL, STATEMENT_SCHEMA_SQL, REGISTRY_SCHEMA_SQL
        );
        conn.execute_batch(&full_schema)
            .map_err(|e| xbrlkit_core::Error::Database(format!("Schema init failed: {e}")))?;
        Ok(())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn count_schemas(&self) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM taxonomy_schemas", [], |row| {
            row.get(0)
        })
        .map_err(|e| xbrlkit_core::Error::Database(e.to_string()))
    }

    pub fn count_statements(&self) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM financial_statements", [], |row| {
            row.get(0)
        })
        .map_err(|e| xbrlkit_core::Error::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_db() {
        let dir = TempDir::new().unwrap();
        let store = XbrlStore::open(dir.path(), StoreConfig::default()).unwrap();
        assert_eq!(store.count_schemas().unwrap(), 0);
        assert_eq!(store.count_statements().unwrap(), 0);
        assert!(dir.path().join("xbrlkit.db").exists());
    }

    #[test]
    fn test_reopen_is_idempotent() {
        let dir = TempDir::new().unwrap();
        drop(XbrlStore::open(dir.path(), StoreConfig::default()).unwrap());
        let store = XbrlStore::open(dir.path(), StoreConfig::default()).unwrap();
        assert_eq!(store.count_schemas().unwrap(), 0);
    }
}
