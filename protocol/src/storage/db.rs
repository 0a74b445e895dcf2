//! # TreasuryDb: Persistent Storage Engine
//!
//! The durability layer for the treasury, built on sled's embedded
//! key-value store. Timelocks must mature correctly across arbitrary host
//! downtime, so nothing about the ledger is allowed to live only in memory.
//!
//! ## Layout
//!
//! All ledger records share one sled tree, `ledger`, namespaced by a
//! four-byte ASCII prefix. Values are bincode-encoded. Callers (the
//! contracts crate) own the record shapes; this module only knows about
//! prefixes, bytes and atomicity.
//!
//! | Prefix  | Contents                                   |
//! |---------|--------------------------------------------|
//! | `perm/` | permission flags                           |
//! | `pend/` | pending permission changes                 |
//! | `tokn/` | reserve/liquidity token records            |
//! | `debt/` | per-debtor, per-token principal            |
//! | `bind/` | category side tables (payment addresses)   |
//! | `meta/` | totals, management, config, vault, assets  |
//!
//! ## Atomicity
//!
//! Keeping every record in one tree means one `sled::Batch` covers a whole
//! operation. [`TreasuryDb::commit`] and [`TreasuryDb::replace_all`] apply
//! their batch atomically and flush before returning: either the entire
//! post-operation state is on disk, or none of it is.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Batch, Db, Tree};
use std::collections::BTreeSet;
use std::path::Path;

use crate::config::STORAGE_SCHEMA_VERSION;
use crate::hash::blake3_hash;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("schema version mismatch: database has {found}, this build expects {expected}")]
    SchemaMismatch { found: u32, expected: u32 },
}

pub type DbResult<T> = Result<T, DbError>;

/// Well-known key holding the schema version.
const META_SCHEMA_VERSION: &[u8] = b"meta/schema_version";

/// Name of the sled tree holding every ledger record.
const LEDGER_TREE: &str = "ledger";

// ---------------------------------------------------------------------------
// WriteBatch
// ---------------------------------------------------------------------------

/// A set of writes applied atomically by [`TreasuryDb::commit`].
#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    inserts: Vec<(Vec<u8>, Vec<u8>)>,
    removes: Vec<Vec<u8>>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `value` (bincode-encoded) under `key`.
    pub fn put<T: Serialize>(&mut self, key: impl Into<Vec<u8>>, value: &T) -> DbResult<()> {
        let bytes = encode(value)?;
        self.inserts.push((key.into(), bytes));
        Ok(())
    }

    /// Queues removal of `key`.
    pub fn remove(&mut self, key: impl Into<Vec<u8>>) {
        self.removes.push(key.into());
    }

    /// Number of queued inserts.
    pub fn len(&self) -> usize {
        self.inserts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.removes.is_empty()
    }

    fn into_sled(self) -> Batch {
        let mut batch = Batch::default();
        for key in self.removes {
            batch.remove(key);
        }
        for (key, value) in self.inserts {
            batch.insert(key, value);
        }
        batch
    }
}

fn encode<T: Serialize>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// TreasuryDb
// ---------------------------------------------------------------------------

/// Persistent storage engine for treasury state.
///
/// Cheap to clone; sled handles are reference-counted and safe to share
/// across threads.
#[derive(Debug, Clone)]
pub struct TreasuryDb {
    /// The underlying sled database handle.
    db: Db,
    /// Every ledger record, namespaced by prefix.
    ledger: Tree,
}

impl TreasuryDb {
    /// Open or create a database at the given filesystem path.
    ///
    /// Fails with [`DbError::SchemaMismatch`] if the directory holds a
    /// ledger written by an incompatible build.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database cleaned up when dropped. For tests.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let ledger = db.open_tree(LEDGER_TREE)?;
        let store = Self { db, ledger };
        store.check_schema()?;
        Ok(store)
    }

    fn check_schema(&self) -> DbResult<()> {
        match self.ledger.get(META_SCHEMA_VERSION)? {
            Some(bytes) => {
                let found: u32 = decode(&bytes)?;
                if found != STORAGE_SCHEMA_VERSION {
                    return Err(DbError::SchemaMismatch {
                        found,
                        expected: STORAGE_SCHEMA_VERSION,
                    });
                }
                Ok(())
            }
            None => {
                self.ledger
                    .insert(META_SCHEMA_VERSION, encode(&STORAGE_SCHEMA_VERSION)?)?;
                tracing::info!(schema = STORAGE_SCHEMA_VERSION, "initialized empty ledger store");
                Ok(())
            }
        }
    }

    // -- Reads --------------------------------------------------------------

    /// Fetch and decode a single record.
    pub fn get<T: DeserializeOwned>(&self, key: &[u8]) -> DbResult<Option<T>> {
        match self.ledger.get(key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Decode every record under `prefix`, in key order. Returned keys
    /// have the prefix stripped.
    pub fn scan_prefix<T: DeserializeOwned>(&self, prefix: &[u8]) -> DbResult<Vec<(Vec<u8>, T)>> {
        let mut out = Vec::new();
        for item in self.ledger.scan_prefix(prefix) {
            let (key, value) = item?;
            out.push((key[prefix.len()..].to_vec(), decode(&value)?));
        }
        Ok(out)
    }

    /// Returns `true` if no ledger state has ever been committed (only the
    /// schema marker is present).
    pub fn is_fresh(&self) -> bool {
        self.ledger.len() <= 1
    }

    /// Number of records, including the schema marker.
    pub fn record_count(&self) -> usize {
        self.ledger.len()
    }

    /// BLAKE3 fingerprint over every key and value in order.
    ///
    /// Two databases holding the same ledger produce the same digest.
    pub fn digest(&self) -> DbResult<[u8; 32]> {
        let mut preimage = Vec::new();
        for item in self.ledger.iter() {
            let (key, value) = item?;
            preimage.extend_from_slice(&(key.len() as u32).to_be_bytes());
            preimage.extend_from_slice(&key);
            preimage.extend_from_slice(&(value.len() as u32).to_be_bytes());
            preimage.extend_from_slice(&value);
        }
        Ok(blake3_hash(&preimage))
    }

    // -- Writes -------------------------------------------------------------

    /// Apply `batch` atomically and flush.
    pub fn commit(&self, batch: WriteBatch) -> DbResult<()> {
        self.ledger.apply_batch(batch.into_sled())?;
        self.db.flush()?;
        Ok(())
    }

    /// Make the records under `prefixes` exactly equal to `batch`'s inserts.
    ///
    /// Any existing key under one of `prefixes` that `batch` does not write
    /// is removed in the same atomic batch. This is how consumed pending
    /// changes disappear from disk without the caller tracking deletions.
    pub fn replace_all(&self, prefixes: &[&[u8]], mut batch: WriteBatch) -> DbResult<()> {
        let written: BTreeSet<&[u8]> = batch.inserts.iter().map(|(k, _)| k.as_slice()).collect();
        let mut stale = Vec::new();
        for prefix in prefixes {
            for key in self.ledger.scan_prefix(prefix).keys() {
                let key = key?;
                if &key[..] != META_SCHEMA_VERSION && !written.contains(&key[..]) {
                    stale.push(key.to_vec());
                }
            }
        }
        if !stale.is_empty() {
            tracing::debug!(removed = stale.len(), "dropping stale ledger records");
        }
        for key in stale {
            batch.remove(key);
        }
        self.commit(batch)
    }

    /// Force a flush of all pending writes to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
