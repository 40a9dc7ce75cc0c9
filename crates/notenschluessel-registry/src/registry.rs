//! Generic concurrent key to entry map with per-entry expiry.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace};

use crate::clock::{Clock, SystemClock};

/// How an entry's lifetime is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Expires a fixed time after the entry was stored. Reads do not extend it.
    Fixed(Duration),

    /// Expires after a period without access. Every access restarts the timer.
    Sliding(Duration),
}

impl Expiry {
    /// The configured lifetime or inactivity window.
    pub fn ttl(&self) -> Duration {
        match *self {
            Expiry::Fixed(ttl) | Expiry::Sliding(ttl) => ttl,
        }
    }

    /// Whether accesses refresh the entry's stamp.
    pub fn is_sliding(&self) -> bool {
        matches!(self, Expiry::Sliding(_))
    }

    /// Whether an entry stamped at `stamp` is past its lifetime at `now`.
    ///
    /// A stamp later than `now` counts as zero elapsed time.
    pub fn is_expired(&self, stamp: Instant, now: Instant) -> bool {
        now.saturating_duration_since(stamp) > self.ttl()
    }
}

/// A stored value with its liveness stamp.
///
/// The stamp is the insertion time for fixed expiry and the last access time
/// for sliding expiry. It has its own lock so refreshing it never needs the
/// map to be locked for writing.
#[derive(Debug)]
pub struct RegistryEntry<V> {
    value: Arc<V>,
    stamp: Mutex<Instant>,
}

impl<V> RegistryEntry<V> {
    fn new(value: Arc<V>, now: Instant) -> Self {
        Self {
            value,
            stamp: Mutex::new(now),
        }
    }

    /// The stored value.
    pub fn value(&self) -> &Arc<V> {
        &self.value
    }

    /// Current liveness stamp.
    pub fn stamp(&self) -> Instant {
        *self.stamp.lock()
    }

    fn touch(&self, now: Instant) {
        let mut stamp = self.stamp.lock();
        // Never move a stamp backwards.
        if now > *stamp {
            *stamp = now;
        }
    }
}

/// Thread-safe map from key to value with time-based expiry.
///
/// A single read/write lock guards the map structure. Values are handed out
/// as `Arc<V>`, so callers work on them after the lock is released; any state
/// a value mutates after construction must synchronize itself.
///
/// Expired entries are removed lazily by [`get`](Self::get) and in bulk by
/// [`sweep`](Self::sweep). Nothing else removes entries except
/// [`delete`](Self::delete) and [`clear`](Self::clear).
pub struct TtlRegistry<K, V, C: Clock = SystemClock> {
    name: &'static str,
    entries: RwLock<HashMap<K, RegistryEntry<V>>>,
    expiry: Expiry,
    clock: C,
}

impl<K, V> TtlRegistry<K, V, SystemClock>
where
    K: Eq + Hash + Clone,
{
    /// Create a registry backed by the system clock.
    pub fn new(name: &'static str, expiry: Expiry) -> Self {
        Self::with_clock(name, expiry, SystemClock)
    }
}

impl<K, V, C> TtlRegistry<K, V, C>
where
    K: Eq + Hash + Clone,
    C: Clock,
{
    /// Create a registry reading time from `clock`.
    ///
    /// `name` only labels log events.
    pub fn with_clock(name: &'static str, expiry: Expiry, clock: C) -> Self {
        Self {
            name,
            entries: RwLock::new(HashMap::new()),
            expiry,
            clock,
        }
    }

    /// The expiry policy.
    pub fn expiry(&self) -> Expiry {
        self.expiry
    }

    /// The clock used for stamps and expiry checks.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Return the live value for `key`, creating it with `factory` if absent.
    ///
    /// Concurrent callers for the same absent key observe a single value:
    /// the factory runs at most once, under the write lock, so it should be
    /// cheap. An expired entry still in the map is replaced.
    pub fn get_or_create<F>(&self, key: K, factory: F) -> Arc<V>
    where
        F: FnOnce() -> V,
    {
        let now = self.clock.now();

        {
            let entries = self.entries.read();
            if let Some(entry) = entries.get(&key) {
                if !self.expiry.is_expired(entry.stamp(), now) {
                    self.refresh(entry, now);
                    return Arc::clone(&entry.value);
                }
            }
        }

        let mut entries = self.entries.write();
        // Another writer may have won the race while the lock was released.
        if let Some(entry) = entries.get(&key) {
            if !self.expiry.is_expired(entry.stamp(), now) {
                self.refresh(entry, now);
                return Arc::clone(&entry.value);
            }
            trace!(registry = self.name, "Replacing expired entry");
        }

        let value = Arc::new(factory());
        entries.insert(key, RegistryEntry::new(Arc::clone(&value), now));
        trace!(registry = self.name, size = entries.len(), "Entry created");
        value
    }

    /// Return the value for `key` if present and not expired.
    ///
    /// An expired entry is removed as a side effect.
    pub fn get<Q>(&self, key: &Q) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now();

        {
            let entries = self.entries.read();
            let entry = entries.get(key)?;
            if !self.expiry.is_expired(entry.stamp(), now) {
                self.refresh(entry, now);
                return Some(Arc::clone(&entry.value));
            }
        }

        let mut entries = self.entries.write();
        // Re-check: a concurrent set may have replaced the expired entry.
        match entries.get(key) {
            None => return None,
            Some(entry) if !self.expiry.is_expired(entry.stamp(), now) => {
                self.refresh(entry, now);
                return Some(Arc::clone(&entry.value));
            }
            Some(_) => {}
        }
        entries.remove(key);
        debug!(registry = self.name, "Expired entry removed on lookup");
        None
    }

    /// Insert or overwrite the value for `key`, restarting its lifetime.
    pub fn set(&self, key: K, value: V) {
        let now = self.clock.now();
        let mut entries = self.entries.write();
        entries.insert(key, RegistryEntry::new(Arc::new(value), now));
    }

    /// Remove `key`. Returns whether an entry was present.
    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.write().remove(key).is_some()
    }

    /// Remove every entry that is expired under the registry's own policy.
    ///
    /// Returns the number of removed entries.
    pub fn sweep(&self) -> usize {
        let expiry = self.expiry;
        self.sweep_with(self.clock.now(), |entry, now| {
            expiry.is_expired(entry.stamp(), now)
        })
    }

    /// Remove every entry for which `is_expired(entry, now)` holds.
    ///
    /// The write lock is held for the duration of the scan only.
    pub fn sweep_with<F>(&self, now: Instant, mut is_expired: F) -> usize
    where
        F: FnMut(&RegistryEntry<V>, Instant) -> bool,
    {
        let (removed, remaining) = {
            let mut entries = self.entries.write();
            let before = entries.len();
            entries.retain(|_, entry| !is_expired(&*entry, now));
            (before - entries.len(), entries.len())
        };

        if removed > 0 {
            info!(
                registry = self.name,
                removed, remaining, "Cleaned up expired entries"
            );
        }

        removed
    }

    /// Number of resident entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the registry holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Snapshot of resident and expired-but-resident counts.
    pub fn stats(&self) -> RegistryStats {
        let now = self.clock.now();
        let entries = self.entries.read();
        let expired = entries
            .values()
            .filter(|e| self.expiry.is_expired(e.stamp(), now))
            .count();
        RegistryStats {
            resident: entries.len(),
            expired,
        }
    }

    fn refresh(&self, entry: &RegistryEntry<V>, now: Instant) {
        if self.expiry.is_sliding() {
            entry.touch(now);
        }
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Entries currently held in memory.
    pub resident: usize,

    /// Resident entries already past their lifetime, awaiting a sweep or lookup.
    pub expired: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn fixed(ttl: Duration) -> (TtlRegistry<String, u32, ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        (
            TtlRegistry::with_clock("test", Expiry::Fixed(ttl), clock.clone()),
            clock,
        )
    }

    fn sliding(window: Duration) -> (TtlRegistry<String, u32, ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        (
            TtlRegistry::with_clock("test", Expiry::Sliding(window), clock.clone()),
            clock,
        )
    }

    #[test]
    fn test_set_and_get() {
        let (registry, _clock) = fixed(Duration::from_secs(60));
        registry.set("a".to_string(), 7);
        assert_eq!(registry.get("a").as_deref(), Some(&7));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_set_overwrites() {
        let (registry, _clock) = fixed(Duration::from_secs(60));
        registry.set("a".to_string(), 1);
        registry.set("a".to_string(), 2);
        assert_eq!(registry.get("a").as_deref(), Some(&2));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_fixed_expiry_boundary() {
        let (registry, clock) = fixed(Duration::from_secs(60));
        registry.set("a".to_string(), 1);

        clock.advance(Duration::from_secs(59));
        assert!(registry.get("a").is_some());

        clock.advance(Duration::from_secs(2));
        assert!(registry.get("a").is_none());
        assert_eq!(registry.len(), 0, "expired entry should be removed on lookup");
    }

    #[test]
    fn test_fixed_expiry_ignores_reads() {
        let (registry, clock) = fixed(Duration::from_secs(60));
        registry.set("a".to_string(), 1);

        for _ in 0..5 {
            clock.advance(Duration::from_secs(11));
            let _ = registry.get("a");
        }

        // 55s elapsed; reads must not have extended the lifetime
        clock.advance(Duration::from_secs(6));
        assert!(registry.get("a").is_none());
    }

    #[test]
    fn test_set_restarts_lifetime() {
        let (registry, clock) = fixed(Duration::from_secs(60));
        registry.set("a".to_string(), 1);
        clock.advance(Duration::from_secs(50));
        registry.set("a".to_string(), 2);
        clock.advance(Duration::from_secs(50));
        assert_eq!(registry.get("a").as_deref(), Some(&2));
    }

    #[test]
    fn test_sliding_expiry_refreshed_by_access() {
        let (registry, clock) = sliding(Duration::from_secs(60));
        registry.get_or_create("a".to_string(), || 1);

        for _ in 0..4 {
            clock.advance(Duration::from_secs(40));
            assert!(registry.get("a").is_some());
        }

        clock.advance(Duration::from_secs(61));
        assert!(registry.get("a").is_none());
    }

    #[test]
    fn test_get_or_create_reuses_entry() {
        let (registry, _clock) = sliding(Duration::from_secs(60));
        let mut calls = 0;
        let first = registry.get_or_create("a".to_string(), || {
            calls += 1;
            10
        });
        let second = registry.get_or_create("a".to_string(), || {
            calls += 1;
            20
        });
        assert_eq!(calls, 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_get_or_create_replaces_expired() {
        let (registry, clock) = sliding(Duration::from_secs(60));
        let first = registry.get_or_create("a".to_string(), || 1);
        clock.advance(Duration::from_secs(61));
        let second = registry.get_or_create("a".to_string(), || 2);
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(*second, 2);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (registry, _clock) = fixed(Duration::from_secs(60));
        registry.set("a".to_string(), 1);
        assert!(registry.delete("a"));
        assert!(!registry.delete("a"));
        assert!(registry.get("a").is_none());
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let (registry, clock) = fixed(Duration::from_secs(60));
        registry.set("old".to_string(), 1);
        clock.advance(Duration::from_secs(30));
        registry.set("new".to_string(), 2);
        clock.advance(Duration::from_secs(31));

        assert_eq!(registry.stats(), RegistryStats { resident: 2, expired: 1 });
        assert_eq!(registry.sweep(), 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.get("new").is_some());
    }

    #[test]
    fn test_sweep_with_custom_predicate() {
        let (registry, clock) = fixed(Duration::from_secs(60));
        for i in 0..6 {
            registry.set(format!("k{i}"), i);
        }
        let removed = registry.sweep_with(clock.now(), |entry, _| **entry.value() % 2 == 0);
        assert_eq!(removed, 3);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_clear() {
        let (registry, _clock) = fixed(Duration::from_secs(60));
        registry.set("a".to_string(), 1);
        registry.set("b".to_string(), 2);
        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_expiry_clamps_future_stamp() {
        let expiry = Expiry::Fixed(Duration::from_secs(1));
        let now = Instant::now();
        let later = now + Duration::from_secs(10);
        assert!(!expiry.is_expired(later, now));
    }
}
