//! Storage Engine Module
//!
//! The authoritative map from key to value record, with TTL metadata,
//! access timestamps and encoding hints. Owns eviction (approximate LRU by
//! random sampling) and expiration (lazy on access plus an adaptive active
//! sweep driven by the event loop).
//!
//! The store is an exclusively-owned resource: all mutation happens on the
//! event loop thread, so handlers take `&mut Db` and auxiliary workers
//! receive detached snapshots.
//!
//! ## Modules
//!
//! - `aol` - Append-only log persistence and replay
//! - `entry` - Record metadata, TTL checks and encoding hints

use std::collections::BTreeMap;

use bytes::Bytes;
use rand::Rng;
use tracing::debug;

use crate::error::{Result, StorageError};

pub mod aol;
pub mod entry;

pub use entry::{Encoding, Entry};
use entry::now_ms;

/// Default number of random positions drawn when picking an eviction victim.
pub const DEFAULT_SAMPLE_SIZE: usize = 5;

// Active expiration tuning, mirroring the adaptive sampling approach:
// sample up to 20 expiry-bearing records per pass, inspect at most 100
// records total, and repeat while at least 25% of the sample was expired.
const EXPIRE_SAMPLE_SIZE: usize = 20;
const EXPIRE_CHECK_LIMIT: usize = 100;
const EXPIRE_REPEAT_THRESHOLD: f32 = 0.25;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum number of keys (0 = unbounded)
    pub max_keys: usize,
    /// Number of keys sampled per eviction decision
    pub sample_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_keys: 0,
            sample_size: DEFAULT_SAMPLE_SIZE,
        }
    }
}

/// The in-memory key-value store.
#[derive(Debug, Default)]
pub struct Db {
    data: BTreeMap<Vec<u8>, Entry>,
    config: StoreConfig,
}

impl Db {
    /// Create an unbounded store.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            data: BTreeMap::new(),
            config,
        }
    }

    /// Insert or overwrite a key with no expiration.
    pub fn set(&mut self, key: Vec<u8>, value: Bytes) {
        self.set_px(key, value, -1);
    }

    /// Insert or overwrite a key with a TTL in milliseconds.
    ///
    /// A non-positive `ttl_ms` means no expiration.
    pub fn set_px(&mut self, key: Vec<u8>, value: Bytes, ttl_ms: i64) {
        self.evict_if_needed();
        let expires_at = if ttl_ms > 0 {
            Some(now_ms() + ttl_ms as u64)
        } else {
            None
        };
        self.data.insert(key, Entry::new(value, expires_at));
    }

    /// Look up a key, purging it if expired (lazy deletion) and touching
    /// its access time otherwise.
    pub fn get(&mut self, key: &[u8]) -> Option<Bytes> {
        let now = now_ms();
        if let Some(entry) = self.data.get_mut(key) {
            if !entry.is_expired(now) {
                entry.last_access = now;
                return Some(entry.value.clone());
            }
        } else {
            return None;
        }
        // Lazy deletion: the record was present but expired.
        self.data.remove(key);
        None
    }

    /// Check existence with the same purge-on-expiry semantics as `get`.
    pub fn exists(&mut self, key: &[u8]) -> bool {
        let now = now_ms();
        let expired = match self.data.get(key) {
            Some(entry) => entry.is_expired(now),
            None => return false,
        };
        if expired {
            self.data.remove(key);
            return false;
        }
        true
    }

    /// Remaining TTL in whole seconds: -2 if the key is absent or expired,
    /// -1 if it has no expiration.
    pub fn ttl_secs(&mut self, key: &[u8]) -> i64 {
        let now = now_ms();
        let (expired, expires_at) = match self.data.get(key) {
            Some(entry) => (entry.is_expired(now), entry.expires_at),
            None => return -2,
        };
        if expired {
            self.data.remove(key);
            return -2;
        }
        match expires_at {
            None => -1,
            Some(at) => ((at - now) / 1000) as i64,
        }
    }

    /// Remove a key. Returns whether it was present.
    pub fn del(&mut self, key: &[u8]) -> bool {
        self.data.remove(key).is_some()
    }

    /// Set an expiration `seconds` from now on an existing key.
    ///
    /// Returns false (after purging) when the key is absent or already
    /// expired.
    pub fn expire(&mut self, key: &[u8], seconds: i64) -> bool {
        let now = now_ms();
        if let Some(entry) = self.data.get_mut(key) {
            if !entry.is_expired(now) {
                let deadline = (now as i64).saturating_add(seconds.saturating_mul(1000));
                entry.expires_at = Some(deadline.max(0) as u64);
                return true;
            }
        } else {
            return false;
        }
        self.data.remove(key);
        false
    }

    /// Increment the integer value of a key by one.
    ///
    /// An absent (or expired) key is created as "1". The existing TTL is
    /// preserved on increment.
    pub fn incr(&mut self, key: &[u8]) -> Result<i64> {
        let now = now_ms();
        // An expired record counts as absent.
        let stale = self
            .data
            .get(key)
            .map_or(false, |entry| entry.is_expired(now));
        if stale {
            self.data.remove(key);
        }

        match self.data.get_mut(key) {
            Some(entry) => {
                let text = std::str::from_utf8(&entry.value).map_err(|_| {
                    StorageError::InvalidType("value is not an integer".to_string())
                })?;
                let current = text.parse::<i64>().map_err(|_| {
                    StorageError::InvalidType("value is not an integer".to_string())
                })?;
                let next = current.checked_add(1).ok_or_else(|| {
                    StorageError::Overflow("increment would overflow".to_string())
                })?;

                entry.value = Bytes::from(next.to_string().into_bytes());
                entry.encoding = Encoding::Int;
                entry.last_access = now;
                Ok(next)
            }
            None => {
                self.set(key.to_vec(), Bytes::from_static(b"1"));
                Ok(1)
            }
        }
    }

    /// One adaptive expiration sweep. Returns the number of purged records.
    ///
    /// Each pass scans forward over at most `EXPIRE_SAMPLE_SIZE` records
    /// that carry an expiry (skipping those without), never inspecting more
    /// than `EXPIRE_CHECK_LIMIT` records. While at least a quarter of the
    /// sampled records were expired, the pass repeats.
    pub fn active_expire(&mut self) -> usize {
        let mut total = 0;
        loop {
            if self.data.is_empty() {
                return total;
            }

            let now = now_ms();
            let mut sampled = 0usize;
            let mut checked = 0usize;
            let mut expired_keys = Vec::new();

            for (key, entry) in self.data.iter() {
                if sampled >= EXPIRE_SAMPLE_SIZE {
                    break;
                }
                if entry.expires_at.is_some() {
                    sampled += 1;
                    if entry.is_expired(now) {
                        expired_keys.push(key.clone());
                    }
                }
                checked += 1;
                if checked >= EXPIRE_CHECK_LIMIT {
                    break;
                }
            }

            let expired = expired_keys.len();
            for key in &expired_keys {
                self.data.remove(key);
            }
            total += expired;

            if sampled == 0 || (expired as f32 / sampled as f32) < EXPIRE_REPEAT_THRESHOLD {
                if total > 0 {
                    debug!(purged = total, "active expiration sweep");
                }
                return total;
            }
        }
    }

    /// A consistent point-in-time copy of all non-expired records, for the
    /// background rewrite worker.
    pub fn snapshot(&self) -> BTreeMap<Vec<u8>, Entry> {
        let now = now_ms();
        self.data
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect()
    }

    /// Current number of records, including not-yet-purged expired ones.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of records with a set, unexpired TTL.
    pub fn expiring_count(&self) -> usize {
        let now = now_ms();
        self.data
            .values()
            .filter(|entry| entry.expires_at.is_some() && !entry.is_expired(now))
            .count()
    }

    /// Evict one approximate-LRU victim when the store is at capacity.
    fn evict_if_needed(&mut self) {
        if self.config.max_keys == 0 || self.data.len() < self.config.max_keys {
            return;
        }
        if let Some(victim) = self.find_lru_victim() {
            debug!(size = self.data.len(), "evicting least-recently-used key");
            self.data.remove(&victim);
        }
    }

    /// Sample random positions with replacement and pick the key with the
    /// minimum last-access time. Ties are broken arbitrarily.
    fn find_lru_victim(&self) -> Option<Vec<u8>> {
        if self.data.is_empty() {
            return None;
        }

        let mut rng = rand::thread_rng();
        let draws = self.config.sample_size.min(self.data.len());
        let mut victim: Option<(&Vec<u8>, u64)> = None;

        for _ in 0..draws {
            let idx = rng.gen_range(0..self.data.len());
            if let Some((key, entry)) = self.data.iter().nth(idx) {
                if victim.map_or(true, |(_, oldest)| entry.last_access < oldest) {
                    victim = Some((key, entry.last_access));
                }
            }
        }

        victim.map(|(key, _)| key.clone())
    }
}
