//! User profiles keyed by identity-provider user id.
//!
//! A profile is created lazily the first time a user is seen. Its username
//! is the local part of the user id (`alice@example.com` → `alice`), with a
//! numeric suffix when that name is already taken.

use serde::{Deserialize, Serialize};
use sled::{Db, Tree};

use super::db::{decode, encode, StoreError, StoreResult};
use crate::config::{parse_address, MAX_USERNAME_LENGTH};

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: u64,
    pub user_id: String,
    pub username: String,
    pub display_name: String,
    /// Checksummed smart account address, once known.
    pub payment_address: Option<String>,
    pub is_earning_yield: bool,
}

/// Profile persistence. Clone freely; all clones share the same trees.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    db: Db,
    profiles: Tree,
    usernames: Tree,
}

impl ProfileStore {
    pub(crate) fn new(db: Db, profiles: Tree, usernames: Tree) -> Self {
        Self {
            db,
            profiles,
            usernames,
        }
    }

    pub fn get(&self, user_id: &str) -> StoreResult<Option<Profile>> {
        match self.profiles.get(user_id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Returns the profile for `user_id`, creating it if needed.
    ///
    /// When `smart_account` is given and differs from the stored payment
    /// address, the stored address is replaced.
    pub fn get_or_create(&self, user_id: &str, smart_account: Option<&str>) -> StoreResult<Profile> {
        if user_id.trim().is_empty() {
            return Err(StoreError::Invalid("user id is empty".into()));
        }
        let address = smart_account
            .filter(|s| !s.trim().is_empty())
            .map(normalize_address)
            .transpose()?;

        if let Some(existing) = self.get(user_id)? {
            return match address {
                Some(addr) if existing.payment_address.as_deref() != Some(addr.as_str()) => {
                    tracing::info!(user_id, payment_address = %addr, "payment address changed");
                    self.update(user_id, |p| p.payment_address = Some(addr.clone()))
                }
                _ => Ok(existing),
            };
        }

        let username = self.claim_username(user_id)?;
        let profile = Profile {
            id: self.db.generate_id()?,
            user_id: user_id.to_string(),
            display_name: username.clone(),
            username: username.clone(),
            payment_address: address,
            is_earning_yield: false,
        };

        let created = self.profiles.compare_and_swap(
            user_id.as_bytes(),
            None as Option<&[u8]>,
            Some(encode(&profile)?),
        )?;
        if created.is_err() {
            // Lost a creation race; hand the username back and use theirs.
            self.usernames.remove(username.as_bytes())?;
            return self
                .get(user_id)?
                .ok_or_else(|| StoreError::NotFound(user_id.to_string()));
        }

        tracing::info!(user_id, username = %profile.username, "profile created");
        Ok(profile)
    }

    /// Sets the earning flag. `NotFound` if the user has no profile.
    pub fn set_earning_yield(&self, user_id: &str, enabled: bool) -> StoreResult<Profile> {
        self.update(user_id, |p| p.is_earning_yield = enabled)
    }

    /// Every profile with a payment address, in user-id order.
    pub fn list_with_payment_address(&self) -> StoreResult<Vec<Profile>> {
        let mut out = Vec::new();
        for entry in self.profiles.iter() {
            let (_, bytes) = entry?;
            let profile: Profile = decode(&bytes)?;
            if profile.payment_address.is_some() {
                out.push(profile);
            }
        }
        Ok(out)
    }

    /// Read-modify-write with optimistic concurrency.
    fn update(&self, user_id: &str, mutate: impl Fn(&mut Profile)) -> StoreResult<Profile> {
        loop {
            let current = self
                .profiles
                .get(user_id.as_bytes())?
                .ok_or_else(|| StoreError::NotFound(format!("profile {user_id}")))?;
            let mut profile: Profile = decode(&current)?;
            mutate(&mut profile);

            let swapped = self.profiles.compare_and_swap(
                user_id.as_bytes(),
                Some(&current),
                Some(encode(&profile)?),
            )?;
            if swapped.is_ok() {
                return Ok(profile);
            }
        }
    }

    /// Reserves a unique username derived from `user_id`.
    fn claim_username(&self, user_id: &str) -> StoreResult<String> {
        let base = username_base(user_id);
        let mut suffix = 1u32;
        loop {
            let candidate = if suffix == 1 {
                base.clone()
            } else {
                let tail = suffix.to_string();
                let keep = MAX_USERNAME_LENGTH.saturating_sub(tail.len());
                format!("{}{}", truncate_chars(&base, keep), tail)
            };

            let claimed = self.usernames.compare_and_swap(
                candidate.as_bytes(),
                None as Option<&[u8]>,
                Some(user_id.as_bytes()),
            )?;
            if claimed.is_ok() {
                return Ok(candidate);
            }
            suffix += 1;
        }
    }
}

/// Local part of an email-like id, capped at the username length limit.
fn username_base(user_id: &str) -> String {
    let local = user_id.split('@').next().unwrap_or(user_id).trim();
    let local = if local.is_empty() { "user" } else { local };
    truncate_chars(local, MAX_USERNAME_LENGTH)
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn normalize_address(raw: &str) -> StoreResult<String> {
    parse_address(raw)
        .map(|a| a.to_checksum(None))
        .ok_or_else(|| StoreError::Invalid(format!("not an address: {raw}")))
}
