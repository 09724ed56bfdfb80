//! Keyspace and Entries
//!
//! The [`Store`] is a plain `HashMap` from key to [`Entry`]. It has no
//! internal locking: the reactor owns it outright on a single task, while the
//! threaded engine wraps it in a [`SharedStore`] and takes the lock around
//! every evaluation and every expiry cycle.
//!
//! ## Time
//!
//! Expiration deadlines are absolute unix timestamps in milliseconds, taken
//! from [`now_ms`]. Writers and the expiry cycle read the same clock, and an
//! entry is expired once `expires_at <= now`.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current wall-clock time as unix milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Expiration state of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// The entry lives until it is overwritten or deleted.
    Never,
    /// Absolute deadline in unix milliseconds.
    At(u64),
}

impl Expiry {
    /// Deadline `ttl` from now. Never lands on the current millisecond, so a
    /// fresh write cannot read back as already expired.
    pub fn after(ttl: Duration) -> Self {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        Expiry::At(now_ms().saturating_add(ttl_ms))
    }

    #[inline]
    pub fn is_expired_at(&self, now: u64) -> bool {
        match self {
            Expiry::Never => false,
            Expiry::At(at) => *at <= now,
        }
    }
}

/// A stored value with its expiration state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub value: Bytes,
    pub expires_at: Expiry,
}

impl Entry {
    /// Creates an entry that never expires.
    pub fn new(value: Bytes) -> Self {
        Self {
            value,
            expires_at: Expiry::Never,
        }
    }

    pub fn with_expiry(value: Bytes, expires_at: Expiry) -> Self {
        Self { value, expires_at }
    }

    /// True if the entry carries a deadline.
    #[inline]
    pub fn is_volatile(&self) -> bool {
        matches!(self.expires_at, Expiry::At(_))
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_expired_at(now_ms())
    }
}

/// What one sampling pass over the volatile entries found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleOutcome {
    /// Volatile entries inspected
    pub examined: usize,
    /// Entries removed because their deadline had passed
    pub deleted: usize,
}

/// The process keyspace.
///
/// # Example
///
/// ```
/// use tinydice::storage::Store;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let mut store = Store::new();
/// store.set(Bytes::from("name"), Bytes::from("dice"));
/// assert_eq!(store.get(b"name"), Some(Bytes::from("dice")));
///
/// store.set_with_ttl(Bytes::from("session"), Bytes::from("abc"), Duration::from_secs(60));
/// assert_eq!(store.volatile_len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct Store {
    data: HashMap<Bytes, Entry>,
    /// Every key whose entry carries a deadline
    volatile: VolatileKeys,
    /// Slot in `volatile` where the next expiry sample starts
    sample_cursor: usize,
    /// Keys removed because they expired, lazily or actively
    expired_count: u64,
}

/// Dense list of volatile keys with a reverse index, so the expiry sampler
/// can address the n-th volatile key directly.
#[derive(Debug, Default)]
struct VolatileKeys {
    keys: Vec<Bytes>,
    slots: HashMap<Bytes, usize>,
}

impl VolatileKeys {
    fn len(&self) -> usize {
        self.keys.len()
    }

    fn get(&self, slot: usize) -> Option<&Bytes> {
        self.keys.get(slot)
    }

    fn insert(&mut self, key: &Bytes) {
        if !self.slots.contains_key(key) {
            self.slots.insert(key.clone(), self.keys.len());
            self.keys.push(key.clone());
        }
    }

    fn remove(&mut self, key: &[u8]) {
        let Some(slot) = self.slots.remove(key) else {
            return;
        };
        self.keys.swap_remove(slot);
        if let Some(moved) = self.keys.get(slot) {
            self.slots.insert(moved.clone(), slot);
        }
    }
}

/// A store shared by several execution contexts.
pub type SharedStore = Arc<Mutex<Store>>;

/// Locks a shared store.
///
/// A panic while holding the lock cannot leave the map half-updated, so a
/// poisoned lock is recovered rather than propagated.
pub fn lock_store(store: &SharedStore) -> MutexGuard<'_, Store> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a new, empty store for sharing across tasks.
    pub fn shared() -> SharedStore {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Sets a key without expiry, replacing any previous entry.
    ///
    /// Returns `true` if the key was newly created.
    pub fn set(&mut self, key: Bytes, value: Bytes) -> bool {
        self.insert(key, Entry::new(value))
    }

    /// Sets a key that expires after `ttl`.
    pub fn set_with_ttl(&mut self, key: Bytes, value: Bytes, ttl: Duration) -> bool {
        self.insert(key, Entry::with_expiry(value, Expiry::after(ttl)))
    }

    /// Sets a key with an explicit expiration state.
    pub fn set_with_expiry(&mut self, key: Bytes, value: Bytes, expires_at: Expiry) -> bool {
        self.insert(key, Entry::with_expiry(value, expires_at))
    }

    fn insert(&mut self, key: Bytes, entry: Entry) -> bool {
        if entry.is_volatile() {
            self.volatile.insert(&key);
        } else {
            self.volatile.remove(&key);
        }
        self.data.insert(key, entry).is_none()
    }

    fn remove(&mut self, key: &[u8]) -> Option<Entry> {
        let entry = self.data.remove(key)?;
        if entry.is_volatile() {
            self.volatile.remove(key);
        }
        Some(entry)
    }

    /// Gets the value for a key.
    ///
    /// An entry found past its deadline is removed and reported as absent.
    pub fn get(&mut self, key: &[u8]) -> Option<Bytes> {
        self.get_entry(key).map(|entry| entry.value.clone())
    }

    /// Gets the live entry for a key, removing it first if it has expired.
    pub fn get_entry(&mut self, key: &[u8]) -> Option<&Entry> {
        let now = now_ms();
        if self.data.get(key)?.expires_at.is_expired_at(now) {
            self.remove(key);
            self.expired_count += 1;
            return None;
        }
        self.data.get(key)
    }

    /// Removes a key. Returns `true` if it existed.
    pub fn delete(&mut self, key: &[u8]) -> bool {
        self.remove(key).is_some()
    }

    /// Checks whether a key exists and has not expired.
    pub fn exists(&self, key: &[u8]) -> bool {
        self.data.get(key).is_some_and(|e| !e.is_expired())
    }

    /// Sets a deadline `ttl` from now on an existing key.
    ///
    /// Returns `false` if the key does not exist.
    pub fn expire(&mut self, key: &[u8], ttl: Duration) -> bool {
        if self.get_entry(key).is_none() {
            return false;
        }
        let Some(entry) = self.data.get_mut(key) else {
            return false;
        };
        entry.expires_at = Expiry::after(ttl);
        self.volatile.insert(&Bytes::copy_from_slice(key));
        true
    }

    /// Remaining time to live in milliseconds.
    ///
    /// - `Some(ms)` if the key exists and has a deadline
    /// - `Some(-1)` if the key exists without one
    /// - `None` if the key does not exist
    pub fn ttl_ms(&mut self, key: &[u8]) -> Option<i64> {
        let now = now_ms();
        self.get_entry(key).map(|entry| match entry.expires_at {
            Expiry::Never => -1,
            Expiry::At(at) => i64::try_from(at.saturating_sub(now)).unwrap_or(i64::MAX),
        })
    }

    /// Number of entries, including expired ones not yet reclaimed.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of entries that carry a deadline.
    pub fn volatile_len(&self) -> usize {
        self.volatile.len()
    }

    /// Total keys reclaimed because they expired.
    pub fn expired_count(&self) -> u64 {
        self.expired_count
    }

    /// Inspects up to `quota` volatile entries and removes those expired at
    /// `now`.
    ///
    /// Only keys that carry a deadline are visited, starting from the slot
    /// where the previous call stopped and wrapping around, so long-lived
    /// volatile keys do not hide expired ones behind them. The work done is
    /// bounded by `quota` whatever the size of the keyspace.
    pub fn sample_volatile(&mut self, quota: usize, now: u64) -> SampleOutcome {
        let len = self.volatile.len();
        if len == 0 || quota == 0 {
            return SampleOutcome::default();
        }

        let start = self.sample_cursor % len;
        let examined = quota.min(len);
        let mut expired = Vec::new();

        for offset in 0..examined {
            let Some(key) = self.volatile.get((start + offset) % len) else {
                continue;
            };
            if self.data.get(key).is_some_and(|e| e.expires_at.is_expired_at(now)) {
                expired.push(key.clone());
            }
        }

        self.sample_cursor = start + examined;
        for key in &expired {
            self.remove(key);
        }
        self.expired_count += expired.len() as u64;

        SampleOutcome {
            examined,
            deleted: expired.len(),
        }
    }
}
