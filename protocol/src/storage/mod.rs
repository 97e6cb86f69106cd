//! # Storage Module
//!
//! Off-chain state: who the users are and which payments went through.
//! Balances are never stored here; the chain is the only source of truth
//! for money.
//!
//! ## Architecture
//!
//! ```text
//! db.rs      — AppDb: sled handle, tree layout, StoreError
//! profile.rs — ProfileStore: get-or-create, earning flag, address directory
//! ledger.rs  — Ledger: append-only payment log and enriched feeds
//! ```
//!
//! ## Design Decisions
//!
//! 1. **sled trees per concern.** Profiles, usernames, transactions and the
//!    hash index are separate keyspaces in one database.
//!
//! 2. **Bincode on disk, JSON on the wire.** Amounts are stored as decimal
//!    strings so both encodings agree.
//!
//! 3. **Uniqueness via compare-and-swap.** Usernames and transaction hashes
//!    are claimed with `compare_and_swap`, so concurrent writers cannot both
//!    win.

pub mod db;
pub mod ledger;
pub mod profile;

pub use db::{AppDb, StoreError, StoreResult};
pub use ledger::{is_tx_hash, EnrichedTransaction, Ledger, LedgerSink, NewTransaction, TransactionRecord};
pub use profile::{Profile, ProfileStore};
