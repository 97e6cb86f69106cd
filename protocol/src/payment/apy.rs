//! Time-boxed cache for the pool's supply APY.

use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::routing::format_apy;

/// Where an APY figure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApySource {
    /// Read from the pool's reserve data.
    Pool,
    /// The pool could not be read; a fixed estimate is shown instead.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApyQuote {
    pub basis_points: u64,
    /// Percent with two decimals, e.g. `"3.50"`.
    pub apy: String,
    pub source: ApySource,
}

impl ApyQuote {
    pub fn new(basis_points: u64, source: ApySource) -> Self {
        Self {
            basis_points,
            apy: format_apy(basis_points),
            source,
        }
    }
}

/// Holds the last successful pool read for `ttl`.
#[derive(Debug)]
pub struct ApyCache {
    ttl: Duration,
    entry: RwLock<Option<(Instant, u64)>>,
}

impl ApyCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: RwLock::new(None),
        }
    }

    /// Cached basis points, if still fresh.
    pub fn get(&self) -> Option<u64> {
        let guard = self.entry.read();
        match *guard {
            Some((at, bps)) if at.elapsed() < self.ttl => Some(bps),
            _ => None,
        }
    }

    pub fn put(&self, bps: u64) {
        *self.entry.write() = Some((Instant::now(), bps));
    }
}
