//! LMDB-backed adapter.
//!
//! Uses the heed crate (Rust bindings for LMDB) as the durable container.
//!
//! # Layout
//!
//! One environment directory holding two named databases:
//! - `_mirrordb_store_`: record key → JSON-encoded [`Record`]
//! - `_mirrordb_meta_`: bookkeeping, currently only the schema version
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. Reads use read transactions, every
//! mutation runs in its own write transaction, so each operation is applied
//! in isolation.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use mirrordb_core::{OperationKind, Record, StoreError, StoreResult, CONTAINER_NAME};

use super::traits::{KeyStream, SchemaInit, SchemaUpgrade, StorageAdapter};

const META_DB: &str = "_mirrordb_meta_";
const META_VERSION: &str = "version";

/// Error type for LMDB environment setup.
#[derive(Debug, thiserror::Error)]
pub enum LmdbAdapterError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open a database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Setup failures leave the store without a durable container.
impl From<LmdbAdapterError> for StoreError {
    fn from(e: LmdbAdapterError) -> Self {
        StoreError::unavailable(e)
    }
}

/// Configuration for [`LmdbAdapter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LmdbConfig {
    /// Directory where LMDB files are stored.
    pub path: PathBuf,
    /// Maximum size of the memory map in megabytes.
    pub max_size_mb: usize,
}

impl LmdbConfig {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_size_mb: 64,
        }
    }

    pub fn with_max_size_mb(mut self, max_size_mb: usize) -> Self {
        self.max_size_mb = max_size_mb;
        self
    }
}

struct LmdbHandles {
    env: Env,
    records: Database<Str, Bytes>,
    meta: Database<Str, Bytes>,
}

/// Durable [`StorageAdapter`] on LMDB.
///
/// # Example
///
/// ```ignore
/// use mirrordb_storage::{LmdbAdapter, LmdbConfig, StorageAdapter};
///
/// let adapter = LmdbAdapter::new(LmdbConfig::new("/var/lib/mirrordb"));
/// adapter.open(1, None).await?;
/// ```
pub struct LmdbAdapter {
    config: LmdbConfig,
    handles: OnceLock<LmdbHandles>,
}

impl LmdbAdapter {
    /// Create an adapter. Nothing touches the filesystem until `open`.
    pub fn new(config: LmdbConfig) -> Self {
        Self {
            config,
            handles: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &LmdbConfig {
        &self.config
    }

    /// Whether `open` has succeeded.
    pub fn is_open(&self) -> bool {
        self.handles.get().is_some()
    }

    fn open_env(&self) -> Result<LmdbHandles, LmdbAdapterError> {
        std::fs::create_dir_all(&self.config.path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(self.config.max_size_mb * 1024 * 1024)
                .max_dbs(2)
                .open(&self.config.path)
        }
        .map_err(|e| LmdbAdapterError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbAdapterError::Transaction(e.to_string()))?;

        let records: Database<Str, Bytes> = env
            .create_database(&mut wtxn, Some(CONTAINER_NAME))
            .map_err(|e| LmdbAdapterError::DbOpen(e.to_string()))?;

        let meta: Database<Str, Bytes> = env
            .create_database(&mut wtxn, Some(META_DB))
            .map_err(|e| LmdbAdapterError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbAdapterError::Transaction(e.to_string()))?;

        Ok(LmdbHandles { env, records, meta })
    }

    fn handles(&self) -> StoreResult<&LmdbHandles> {
        self.handles
            .get()
            .ok_or_else(|| StoreError::unavailable("LMDB container has not been opened"))
    }

    fn stored_version(&self, handles: &LmdbHandles) -> StoreResult<u32> {
        let fail = |e: heed::Error| StoreError::operation_failed(OperationKind::Open, None, e);
        let rtxn = handles.env.read_txn().map_err(fail)?;
        let version = match handles.meta.get(&rtxn, META_VERSION).map_err(fail)? {
            Some(bytes) => {
                let raw: [u8; 4] = bytes.try_into().map_err(|_| {
                    StoreError::unavailable("stored schema version is corrupt")
                })?;
                u32::from_le_bytes(raw)
            }
            None => 0,
        };
        Ok(version)
    }

    fn apply_version(
        &self,
        handles: &LmdbHandles,
        version: u32,
        on_schema_init: Option<SchemaInit>,
    ) -> StoreResult<()> {
        let stored = self.stored_version(handles)?;
        if version < stored {
            return Err(StoreError::unavailable(format!(
                "requested version {} is older than stored version {}",
                version, stored
            )));
        }
        if version == stored {
            return Ok(());
        }

        let fail = |e: heed::Error| StoreError::operation_failed(OperationKind::Open, None, e);
        let mut wtxn = handles.env.write_txn().map_err(fail)?;
        handles
            .meta
            .put(&mut wtxn, META_VERSION, &version.to_le_bytes())
            .map_err(fail)?;
        wtxn.commit().map_err(fail)?;

        let upgrade = SchemaUpgrade {
            old_version: stored,
            new_version: version,
        };
        tracing::info!(path = %self.config.path.display(), %upgrade, "upgraded LMDB container");
        if let Some(init) = on_schema_init {
            init(upgrade);
        }
        Ok(())
    }

    fn collect_keys(&self) -> StoreResult<Vec<String>> {
        let handles = self.handles()?;
        let fail = |e: heed::Error| StoreError::operation_failed(OperationKind::Scan, None, e);
        let rtxn = handles.env.read_txn().map_err(fail)?;

        let mut keys = Vec::new();
        for entry in handles.records.iter(&rtxn).map_err(fail)? {
            let (key, _) = entry.map_err(fail)?;
            keys.push(key.to_string());
        }
        Ok(keys)
    }
}

#[async_trait]
impl StorageAdapter for LmdbAdapter {
    async fn open(&self, version: u32, on_schema_init: Option<SchemaInit>) -> StoreResult<()> {
        let handles = match self.handles.get() {
            Some(handles) => handles,
            None => {
                let opened = self.open_env().map_err(|e| {
                    tracing::error!(path = %self.config.path.display(), error = %e, "failed to open LMDB container");
                    StoreError::from(e)
                })?;
                self.handles.get_or_init(|| opened)
            }
        };
        self.apply_version(handles, version, on_schema_init)
    }

    fn scan(&self) -> KeyStream<'_> {
        // LMDB cursors are bound to a read transaction, so the key set is
        // materialized up front and streamed from memory.
        match self.collect_keys() {
            Ok(keys) => stream::iter(keys.into_iter().map(Ok)).boxed(),
            Err(e) => stream::once(async move { Err(e) }).boxed(),
        }
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Record>> {
        let handles = self.handles()?;
        let fail = |e: heed::Error| StoreError::operation_failed(OperationKind::Get, Some(key), e);
        let rtxn = handles.env.read_txn().map_err(fail)?;

        match handles.records.get(&rtxn, key).map_err(fail)? {
            Some(bytes) => {
                let record = Record::decode(bytes).map_err(|e| {
                    StoreError::operation_failed(OperationKind::Get, Some(key), e)
                })?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, record: Record) -> StoreResult<()> {
        let handles = self.handles()?;
        let key = record.key.as_str();
        let fail = |e: heed::Error| StoreError::operation_failed(OperationKind::Put, Some(key), e);
        let bytes = record.encode()?;

        let mut wtxn = handles.env.write_txn().map_err(fail)?;
        handles.records.put(&mut wtxn, key, &bytes).map_err(fail)?;
        wtxn.commit().map_err(fail)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let handles = self.handles()?;
        let fail =
            |e: heed::Error| StoreError::operation_failed(OperationKind::Delete, Some(key), e);

        let mut wtxn = handles.env.write_txn().map_err(fail)?;
        handles.records.delete(&mut wtxn, key).map_err(fail)?;
        wtxn.commit().map_err(fail)?;
        Ok(())
    }

    async fn clear(&self) -> StoreResult<()> {
        let handles = self.handles()?;
        let fail = |e: heed::Error| StoreError::operation_failed(OperationKind::Clear, None, e);

        let mut wtxn = handles.env.write_txn().map_err(fail)?;
        handles.records.clear(&mut wtxn).map_err(fail)?;
        wtxn.commit().map_err(fail)?;
        Ok(())
    }
}
