//! # AppDb — Persistent Storage Engine
//!
//! The persistence layer for profiles and the transaction ledger, built on
//! sled's embedded key-value store.
//!
//! ## Tree Layout
//!
//! | Tree           | Key                   | Value                        |
//! |----------------|-----------------------|------------------------------|
//! | `profiles`     | `user_id` (UTF-8)     | `bincode(Profile)`           |
//! | `usernames`    | `username` (UTF-8)    | `user_id` (UTF-8)            |
//! | `transactions` | `id` (8B BE)          | `bincode(TransactionRecord)` |
//! | `tx_hashes`    | lowercase hash (UTF-8)| `id` (8B BE)                 |
//!
//! Record ids come from sled's monotonic id generator and are stored
//! big-endian, so a reverse scan of `transactions` is newest-first.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use thiserror::Error;

use super::ledger::Ledger;
use super::profile::ProfileStore;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors from the profile store and ledger.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// Input rejected before touching the database.
    #[error("invalid record: {0}")]
    Invalid(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A unique key is already taken.
    #[error("conflict: {0}")]
    Conflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub(crate) fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// AppDb
// ---------------------------------------------------------------------------

/// Handle to the on-disk database.
///
/// Cloning is cheap: sled handles are reference counted and safe to share
/// across threads and tasks.
#[derive(Debug, Clone)]
pub struct AppDb {
    db: Db,
    profiles: ProfileStore,
    ledger: Ledger,
}

impl AppDb {
    /// Open or create a database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// In-memory database removed on drop. Used by tests.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let profiles = ProfileStore::new(
            db.clone(),
            db.open_tree("profiles")?,
            db.open_tree("usernames")?,
        );
        let ledger = Ledger::new(
            db.clone(),
            db.open_tree("transactions")?,
            db.open_tree("tx_hashes")?,
            profiles.clone(),
        );
        Ok(Self {
            db,
            profiles,
            ledger,
        })
    }

    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NewTransaction;
    use alloy_primitives::U256;

    fn hash(n: u8) -> String {
        format!("0x{}", hex::encode([n; 32]))
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = AppDb::open(dir.path()).unwrap();
            db.profiles().get_or_create("alice@example.com", None).unwrap();
            db.ledger()
                .append(NewTransaction {
                    transaction_hash: hash(1),
                    from_user_id: "alice@example.com".into(),
                    to_user_id: "bob@example.com".into(),
                    amount: U256::from(1_000_000u64),
                    message: None,
                })
                .unwrap();
            db.flush().unwrap();
        }

        let db = AppDb::open(dir.path()).unwrap();
        let profile = db.profiles().get("alice@example.com").unwrap().unwrap();
        assert_eq!(profile.username, "alice");
        assert_eq!(db.ledger().len(), 1);
    }

    #[test]
    fn temporary_db_starts_empty() {
        let db = AppDb::open_temporary().unwrap();
        assert!(db.profiles().list_with_payment_address().unwrap().is_empty());
        assert_eq!(db.ledger().len(), 0);
    }
}
