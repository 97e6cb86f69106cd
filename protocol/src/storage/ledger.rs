//! Append-only log of confirmed payments.
//!
//! Records are immutable once written. Each on-chain transaction hash can
//! appear at most once, so re-reporting the same payment is a `Conflict`
//! rather than a duplicate row.

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Db, Tree};

use super::db::{decode, encode, StoreError, StoreResult};
use super::profile::ProfileStore;
use crate::config::{
    ALL_TRANSACTIONS_LIMIT, MAX_MESSAGE_LENGTH, RECENT_TRANSACTIONS_LIMIT, TOKEN_DECIMALS,
};

/// A payment to record. Validated by [`Ledger::append`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub transaction_hash: String,
    pub from_user_id: String,
    pub to_user_id: String,
    /// Minor units.
    pub amount: U256,
    pub message: Option<String>,
}

/// A stored payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: u64,
    pub transaction_hash: String,
    pub from_user_id: String,
    pub to_user_id: String,
    /// Minor units, as a decimal string.
    #[serde(with = "u256_decimal")]
    pub amount: U256,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A record joined with the display names of both parties.
///
/// `is_sent` is only set in a per-user feed. Sender fields are `None` when
/// the sender has no profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedTransaction {
    pub id: u64,
    pub transaction_hash: String,
    /// Token units with six decimals, e.g. `"12.500000"`.
    pub amount: String,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_sent: Option<bool>,
    pub sender_display_name: Option<String>,
    pub sender_username: Option<String>,
    pub recipient_display_name: String,
    pub recipient_username: String,
}

/// Anything that can durably record a confirmed payment.
pub trait LedgerSink: Send + Sync {
    fn append(&self, tx: NewTransaction) -> StoreResult<TransactionRecord>;
}

/// The sled-backed ledger.
#[derive(Debug, Clone)]
pub struct Ledger {
    db: Db,
    transactions: Tree,
    tx_hashes: Tree,
    profiles: ProfileStore,
}

impl Ledger {
    pub(crate) fn new(db: Db, transactions: Tree, tx_hashes: Tree, profiles: ProfileStore) -> Self {
        Self {
            db,
            transactions,
            tx_hashes,
            profiles,
        }
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn get_by_hash(&self, tx_hash: &str) -> StoreResult<Option<TransactionRecord>> {
        match self.tx_hashes.get(tx_hash.to_ascii_lowercase().as_bytes())? {
            Some(id) => match self.transactions.get(id)? {
                Some(bytes) => Ok(Some(decode(&bytes)?)),
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// Newest `limit` payments where `user_id` is sender or recipient.
    ///
    /// Recipient names are filled only for payments the user sent.
    pub fn recent_for_user(&self, user_id: &str, limit: usize) -> StoreResult<Vec<EnrichedTransaction>> {
        let records = self.scan_newest(limit, |r| r.from_user_id == user_id || r.to_user_id == user_id)?;
        records
            .into_iter()
            .map(|r| {
                let is_sent = r.from_user_id == user_id;
                let (recipient_display_name, recipient_username) = if is_sent {
                    self.profiles
                        .get(&r.to_user_id)?
                        .map(|p| (p.display_name, p.username))
                        .unwrap_or_default()
                } else {
                    Default::default()
                };
                self.enrich(r, Some(is_sent), recipient_display_name, recipient_username)
            })
            .collect()
    }

    /// [`Ledger::recent_for_user`] with the default page size.
    pub fn recent_for_user_default(&self, user_id: &str) -> StoreResult<Vec<EnrichedTransaction>> {
        self.recent_for_user(user_id, RECENT_TRANSACTIONS_LIMIT)
    }

    /// Newest `limit` payments across all users.
    pub fn all_recent(&self, limit: usize) -> StoreResult<Vec<EnrichedTransaction>> {
        self.scan_newest(limit, |_| true)?
            .into_iter()
            .map(|r| {
                let (name, username) = self
                    .profiles
                    .get(&r.to_user_id)?
                    .map(|p| (p.display_name, p.username))
                    .unwrap_or_else(|| ("Unknown".to_string(), "unknown".to_string()));
                self.enrich(r, None, name, username)
            })
            .collect()
    }

    /// [`Ledger::all_recent`] with the default page size.
    pub fn all_recent_default(&self) -> StoreResult<Vec<EnrichedTransaction>> {
        self.all_recent(ALL_TRANSACTIONS_LIMIT)
    }

    fn scan_newest(
        &self,
        limit: usize,
        keep: impl Fn(&TransactionRecord) -> bool,
    ) -> StoreResult<Vec<TransactionRecord>> {
        let mut out = Vec::with_capacity(limit.min(64));
        for entry in self.transactions.iter().rev() {
            if out.len() >= limit {
                break;
            }
            let (_, bytes) = entry?;
            let record: TransactionRecord = decode(&bytes)?;
            if keep(&record) {
                out.push(record);
            }
        }
        Ok(out)
    }

    fn enrich(
        &self,
        r: TransactionRecord,
        is_sent: Option<bool>,
        recipient_display_name: String,
        recipient_username: String,
    ) -> StoreResult<EnrichedTransaction> {
        let sender = self.profiles.get(&r.from_user_id)?;
        Ok(EnrichedTransaction {
            id: r.id,
            transaction_hash: r.transaction_hash,
            amount: format_fixed(r.amount),
            message: r.message,
            created_at: r.created_at,
            is_sent,
            sender_display_name: sender.as_ref().map(|p| p.display_name.clone()),
            sender_username: sender.map(|p| p.username),
            recipient_display_name,
            recipient_username,
        })
    }
}

impl LedgerSink for Ledger {
    fn append(&self, tx: NewTransaction) -> StoreResult<TransactionRecord> {
        Ledger::append(self, tx)
    }
}

impl Ledger {
    /// Validates and stores a payment. Duplicate hashes are a `Conflict`.
    pub fn append(&self, tx: NewTransaction) -> StoreResult<TransactionRecord> {
        validate(&tx)?;

        let id = self.db.generate_id()?;
        let id_key = id.to_be_bytes();
        let hash_key = tx.transaction_hash.to_ascii_lowercase();

        let record = TransactionRecord {
            id,
            transaction_hash: tx.transaction_hash,
            from_user_id: tx.from_user_id,
            to_user_id: tx.to_user_id,
            amount: tx.amount,
            message: tx.message.filter(|m| !m.is_empty()),
            created_at: Utc::now(),
        };
        let bytes = encode(&record)?;

        // The hash index and the record land together or not at all.
        (&self.tx_hashes, &self.transactions)
            .transaction(|(hashes, transactions)| {
                if hashes.get(hash_key.as_bytes())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(()));
                }
                hashes.insert(hash_key.as_bytes(), &id_key[..])?;
                transactions.insert(&id_key[..], bytes.as_slice())?;
                Ok(())
            })
            .map_err(|e| match e {
                TransactionError::Abort(()) => StoreError::Conflict(format!(
                    "transaction {} already recorded",
                    record.transaction_hash
                )),
                TransactionError::Storage(e) => StoreError::Sled(e),
            })?;

        tracing::debug!(id, tx_hash = %record.transaction_hash, "transaction recorded");
        Ok(record)
    }
}

fn validate(tx: &NewTransaction) -> StoreResult<()> {
    if tx.transaction_hash.is_empty() || tx.from_user_id.is_empty() || tx.to_user_id.is_empty() {
        return Err(StoreError::Invalid("missing required fields".into()));
    }
    if tx.amount.is_zero() {
        return Err(StoreError::Invalid("amount must be greater than zero".into()));
    }
    if !is_tx_hash(&tx.transaction_hash) {
        return Err(StoreError::Invalid(format!(
            "malformed transaction hash: {}",
            tx.transaction_hash
        )));
    }
    if let Some(message) = &tx.message {
        let chars = message.chars().count();
        if chars > MAX_MESSAGE_LENGTH {
            return Err(StoreError::Invalid(format!(
                "message is {chars} characters, at most {MAX_MESSAGE_LENGTH} allowed"
            )));
        }
    }
    Ok(())
}

/// `0x` followed by exactly 64 hex digits.
pub fn is_tx_hash(s: &str) -> bool {
    s.len() == 66 && s.starts_with("0x") && s[2..].bytes().all(|b| b.is_ascii_hexdigit())
}

/// Six fixed decimals, matching how amounts are displayed in feeds.
fn format_fixed(amount: U256) -> String {
    let scale = U256::from(10u64).pow(U256::from(TOKEN_DECIMALS));
    let whole = amount / scale;
    let frac = amount % scale;
    format!(
        "{}.{:0>width$}",
        whole,
        frac.to_string(),
        width = TOKEN_DECIMALS as usize
    )
}

/// Serializes a `U256` as a base-10 string. Used for both JSON and bincode.
mod u256_decimal {
    use alloy_primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(value: &U256, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(d)?;
        U256::from_str(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::AppDb;

    fn hash(n: u8) -> String {
        format!("0x{}", hex::encode([n; 32]))
    }

    fn payment(n: u8, from: &str, to: &str, minor: u64) -> NewTransaction {
        NewTransaction {
            transaction_hash: hash(n),
            from_user_id: from.into(),
            to_user_id: to.into(),
            amount: U256::from(minor),
            message: None,
        }
    }

    fn setup() -> AppDb {
        let db = AppDb::open_temporary().unwrap();
        db.profiles().get_or_create("alice@example.com", None).unwrap();
        db.profiles().get_or_create("bob@example.com", None).unwrap();
        db
    }

    #[test]
    fn append_and_fetch_by_hash() {
        let db = setup();
        let rec = db
            .ledger()
            .append(NewTransaction {
                message: Some("lunch".into()),
                ..payment(1, "alice@example.com", "bob@example.com", 12_500_000)
            })
            .unwrap();
        assert_eq!(rec.message.as_deref(), Some("lunch"));

        let fetched = db.ledger().get_by_hash(&hash(1).to_uppercase().replace("0X", "0x")).unwrap();
        assert_eq!(fetched, Some(rec));
    }

    #[test]
    fn duplicate_hash_conflicts() {
        let db = setup();
        db.ledger().append(payment(1, "alice@example.com", "bob@example.com", 1)).unwrap();
        let err = db
            .ledger()
            .append(payment(1, "bob@example.com", "alice@example.com", 2))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(db.ledger().len(), 1);
        assert_eq!(db.ledger().tx_hashes.len(), 1);
    }

    #[test]
    fn hash_index_and_records_stay_in_step() {
        let db = setup();
        let ledger = db.ledger();

        let mut long = payment(7, "a", "b", 1);
        long.message = Some("x".repeat(MAX_MESSAGE_LENGTH + 1));
        assert!(ledger.append(long).is_err());
        assert!(ledger.tx_hashes.is_empty());
        assert!(ledger.get_by_hash(&hash(7)).unwrap().is_none());

        let rec = ledger.append(payment(7, "a", "b", 3)).unwrap();
        for n in 8..12 {
            ledger.append(payment(n, "a", "b", u64::from(n))).unwrap();
        }
        assert!(ledger.append(payment(9, "b", "a", 1)).is_err());

        assert_eq!(ledger.tx_hashes.len(), ledger.len());
        assert_eq!(ledger.len(), 5);
        assert_eq!(ledger.get_by_hash(&hash(7)).unwrap(), Some(rec));
    }

    #[test]
    fn rejects_bad_input() {
        let db = setup();
        let ledger = db.ledger();

        let mut bad_hash = payment(1, "a", "b", 1);
        bad_hash.transaction_hash = "0x1234".into();
        assert!(matches!(ledger.append(bad_hash), Err(StoreError::Invalid(_))));

        let missing = payment(2, "", "b", 1);
        assert!(matches!(ledger.append(missing), Err(StoreError::Invalid(_))));

        let zero = payment(3, "a", "b", 0);
        assert!(matches!(ledger.append(zero), Err(StoreError::Invalid(_))));

        let mut long = payment(4, "a", "b", 1);
        long.message = Some("x".repeat(MAX_MESSAGE_LENGTH + 1));
        assert!(matches!(ledger.append(long), Err(StoreError::Invalid(_))));

        let mut at_limit = payment(5, "a", "b", 1);
        at_limit.message = Some("x".repeat(MAX_MESSAGE_LENGTH));
        assert!(ledger.append(at_limit).is_ok());
    }

    #[test]
    fn recent_for_user_is_newest_first_and_enriched() {
        let db = setup();
        let ledger = db.ledger();
        ledger.append(payment(1, "alice@example.com", "bob@example.com", 1_000_000)).unwrap();
        ledger.append(payment(2, "bob@example.com", "alice@example.com", 2_000_000)).unwrap();
        ledger.append(payment(3, "bob@example.com", "carol@example.com", 3_000_000)).unwrap();

        let feed = ledger.recent_for_user("alice@example.com", 10).unwrap();
        assert_eq!(feed.len(), 2);

        assert_eq!(feed[0].transaction_hash, hash(2));
        assert_eq!(feed[0].is_sent, Some(false));
        assert_eq!(feed[0].sender_username.as_deref(), Some("bob"));
        assert_eq!(feed[0].recipient_username, "");

        assert_eq!(feed[1].transaction_hash, hash(1));
        assert_eq!(feed[1].is_sent, Some(true));
        assert_eq!(feed[1].recipient_username, "bob");
        assert_eq!(feed[1].amount, "1.000000");
    }

    #[test]
    fn recent_for_user_respects_limit() {
        let db = setup();
        for n in 0..15u8 {
            db.ledger()
                .append(payment(n + 1, "alice@example.com", "bob@example.com", 1))
                .unwrap();
        }
        let feed = db.ledger().recent_for_user_default("alice@example.com").unwrap();
        assert_eq!(feed.len(), RECENT_TRANSACTIONS_LIMIT);
        assert_eq!(feed[0].transaction_hash, hash(15));
    }

    #[test]
    fn global_feed_marks_unknown_recipients() {
        let db = setup();
        db.ledger()
            .append(payment(1, "alice@example.com", "stranger", 500_000))
            .unwrap();
        db.ledger()
            .append(payment(2, "ghost", "bob@example.com", 250_000))
            .unwrap();

        let feed = db.ledger().all_recent_default().unwrap();
        assert_eq!(feed.len(), 2);

        assert_eq!(feed[0].sender_display_name, None);
        assert_eq!(feed[0].recipient_username, "bob");
        assert_eq!(feed[0].amount, "0.250000");
        assert_eq!(feed[0].is_sent, None);

        assert_eq!(feed[1].recipient_display_name, "Unknown");
        assert_eq!(feed[1].recipient_username, "unknown");
    }

    #[test]
    fn tx_hash_format() {
        assert!(is_tx_hash(&hash(0xab)));
        assert!(!is_tx_hash("0x"));
        assert!(!is_tx_hash(&format!("0x{}", "g".repeat(64))));
        assert!(!is_tx_hash(&hash(1)[2..]));
    }
}
