//! Generic TTL + LRU segment.
//!
//! One segment holds one entity kind. Entries live in an unbounded
//! `LruCache`; the segment enforces its own limit so that the bulk-load path
//! can bypass it. Hit/miss/eviction counters are atomics kept outside the
//! lock so stats never contend with the data path.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use lru::LruCache;
use parking_lot::RwLock;
use tracing::trace;

use super::SegmentConfig;

/// A single cached value.
struct Entry<T> {
    value: T,
    expires_at: Option<DateTime<Utc>>,
}

impl<T> Entry<T> {
    fn new(value: T, expires_at: Option<DateTime<Utc>>) -> Self {
        Self { value, expires_at }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

type Entries<T> = LruCache<String, Entry<T>>;

/// Point-in-time statistics for one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentStats {
    pub name: String,
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub ttl: Option<Duration>,
    pub capacity: usize,
    /// `hits / (hits + misses)`, 0 before the first access.
    pub hit_rate: f64,
    /// `misses / (hits + misses)`, 0 before the first access.
    pub miss_rate: f64,
}

/// Thread-safe TTL + LRU container for one entity kind.
///
/// Keys are strings; the empty key is never stored. Capacity is enforced
/// when new keys are inserted, never on reads.
pub struct Segment<T> {
    name: Arc<str>,
    inner: RwLock<Entries<T>>,
    /// TTL in milliseconds, 0 = disabled.
    ttl_ms: AtomicU64,
    /// 0 = unbounded.
    limit: AtomicUsize,
    size: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<T: Clone> Segment<T> {
    /// Create an empty segment.
    pub fn new(name: impl Into<Arc<str>>, config: &SegmentConfig) -> Self {
        Self {
            name: name.into(),
            inner: RwLock::new(LruCache::unbounded()),
            ttl_ms: AtomicU64::new(ttl_to_ms(config.ttl)),
            limit: AtomicUsize::new(config.max_capacity),
            size: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Name of this segment (used in logs and stats).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a value.
    ///
    /// Expired entries are removed and reported as a miss. A hit promotes the
    /// entry to most recently used.
    pub fn get(&self, key: &str) -> Option<T> {
        if key.is_empty() {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let now = Utc::now();
        let mut inner = self.inner.write();

        let Some(expired) = inner.peek(key).map(|e| e.is_expired(now)) else {
            drop(inner);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        if expired {
            inner.pop(key);
            self.size.store(inner.len(), Ordering::Relaxed);
            drop(inner);
            trace!("Segment {}: expired entry '{}' dropped on read", self.name, key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        // `get` moves the entry to the MRU position
        let value = inner.get(key).map(|e| e.value.clone());
        drop(inner);

        self.hits.fetch_add(1, Ordering::Relaxed);
        value
    }

    /// Check presence of a live entry without promoting it or touching counters.
    pub fn contains(&self, key: &str) -> bool {
        if key.is_empty() {
            return false;
        }
        let now = Utc::now();
        self.inner
            .read()
            .peek(key)
            .is_some_and(|e| !e.is_expired(now))
    }

    /// Read a live value without promoting it or touching counters.
    pub fn peek(&self, key: &str) -> Option<T> {
        let now = Utc::now();
        self.inner
            .read()
            .peek(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value.clone())
    }

    /// Insert or update a value using the segment TTL.
    pub fn set(&self, key: &str, value: T) {
        let expires_at = self.default_expiry(Utc::now());
        self.set_with_expiration(key, value, expires_at);
    }

    /// Insert or update a value with an explicit absolute expiry
    /// (`None` never expires), overriding the segment TTL for this entry.
    pub fn set_with_expiration(&self, key: &str, value: T, expires_at: Option<DateTime<Utc>>) {
        if key.is_empty() {
            return;
        }

        let mut inner = self.inner.write();

        if let Some(entry) = inner.get_mut(key) {
            *entry = Entry::new(value, expires_at);
            return;
        }

        self.make_room(&mut inner);
        inner.put(key.to_string(), Entry::new(value, expires_at));
        self.size.store(inner.len(), Ordering::Relaxed);
    }

    /// Insert a value only if no live entry exists for `key`.
    ///
    /// Respects capacity like [`Segment::set`]. Returns `true` if inserted.
    pub fn set_if_absent(&self, key: &str, value: T) -> bool {
        if key.is_empty() {
            return false;
        }

        let now = Utc::now();
        let mut inner = self.inner.write();

        match inner.peek(key).map(|e| e.is_expired(now)) {
            Some(false) => return false,
            Some(true) => {
                inner.pop(key);
            }
            None => {}
        }

        self.make_room(&mut inner);
        let expires_at = self.default_expiry(now);
        inner.put(key.to_string(), Entry::new(value, expires_at));
        self.size.store(inner.len(), Ordering::Relaxed);
        true
    }

    /// Bulk-load path: insert if absent, keep the given expiry, and never evict.
    ///
    /// Used when reloading persisted state. The segment may end up above its
    /// capacity; the next capacity-respecting insert evicts back under it.
    /// Returns `true` if inserted.
    pub fn load_entry(&self, key: &str, value: T, expires_at: Option<DateTime<Utc>>) -> bool {
        if key.is_empty() {
            return false;
        }

        let mut inner = self.inner.write();
        if inner.contains(key) {
            return false;
        }
        inner.put(key.to_string(), Entry::new(value, expires_at));
        self.size.store(inner.len(), Ordering::Relaxed);
        true
    }

    /// Remove an entry. Returns `true` if something was removed.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut inner = self.inner.write();
        let removed = inner.pop(key).is_some();
        self.size.store(inner.len(), Ordering::Relaxed);
        removed
    }

    /// Remove every entry. Counters are kept.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.clear();
        self.size.store(0, Ordering::Relaxed);
    }

    /// Remove all entries expired at `now`. Returns how many were removed.
    pub fn cleanup_expired(&self, now: DateTime<Utc>) -> usize {
        let mut inner = self.inner.write();
        let removed = Self::drain_expired(&mut inner, now).len();
        self.size.store(inner.len(), Ordering::Relaxed);
        removed
    }

    /// Like [`Segment::cleanup_expired`], calling `on_evict` for each removed
    /// entry after the lock is released, so the callback may use the segment.
    pub fn cleanup_expired_with_callback<F>(&self, now: DateTime<Utc>, mut on_evict: F) -> usize
    where
        F: FnMut(&str, T),
    {
        let removed = {
            let mut inner = self.inner.write();
            let removed = Self::drain_expired(&mut inner, now);
            self.size.store(inner.len(), Ordering::Relaxed);
            removed
        };

        let count = removed.len();
        for (key, value) in removed {
            on_evict(&key, value);
        }
        count
    }

    /// Current number of entries (expired-but-unswept entries included).
    pub fn len(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all keys, MRU first.
    pub fn keys(&self) -> Vec<String> {
        // `iter` walks from most to least recently used
        self.inner.read().iter().map(|(k, _)| k.clone()).collect()
    }

    /// Expiry of an entry. `None` if the key is absent or never expires.
    pub fn get_expiration(&self, key: &str) -> Option<DateTime<Utc>> {
        self.inner.read().peek(key).and_then(|e| e.expires_at)
    }

    /// Change the TTL applied to future inserts and updates.
    pub fn set_ttl(&self, ttl: Option<Duration>) {
        self.ttl_ms.store(ttl_to_ms(ttl), Ordering::Relaxed);
    }

    /// Current TTL, `None` when disabled.
    pub fn ttl(&self) -> Option<Duration> {
        match self.ttl_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Change the capacity, evicting LRU entries if the segment is now over it.
    pub fn set_limit(&self, limit: usize) {
        let mut inner = self.inner.write();
        self.limit.store(limit, Ordering::Relaxed);
        if limit == 0 {
            return;
        }
        while inner.len() > limit {
            if inner.pop_lru().is_none() {
                break;
            }
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        self.size.store(inner.len(), Ordering::Relaxed);
    }

    /// Current capacity, 0 when unbounded.
    pub fn limit(&self) -> usize {
        self.limit.load(Ordering::Relaxed)
    }

    /// Snapshot the counters and configuration.
    pub fn stats(&self) -> SegmentStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let (hit_rate, miss_rate) = if total == 0 {
            (0.0, 0.0)
        } else {
            (hits as f64 / total as f64, misses as f64 / total as f64)
        };

        SegmentStats {
            name: self.name.to_string(),
            size: self.len(),
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            ttl: self.ttl(),
            capacity: self.limit(),
            hit_rate,
            miss_rate,
        }
    }

    /// Copy out every entry as `(key, value, expires_at)` under the read lock.
    ///
    /// Expiry is not re-checked; the snapshot reflects current state as-is.
    pub fn snapshot(&self) -> Vec<(String, T, Option<DateTime<Utc>>)> {
        self.inner
            .read()
            .iter()
            .map(|(k, e)| (k.clone(), e.value.clone(), e.expires_at))
            .collect()
    }

    fn default_expiry(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let ttl = self.ttl()?;
        let delta = TimeDelta::from_std(ttl).ok()?;
        now.checked_add_signed(delta)
    }

    /// Evict LRU entries until one more insert fits.
    fn make_room(&self, inner: &mut Entries<T>) {
        let limit = self.limit.load(Ordering::Relaxed);
        if limit == 0 {
            return;
        }
        while inner.len() >= limit {
            match inner.pop_lru() {
                Some((key, _)) => {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    trace!("Segment {}: evicted '{}'", self.name, key);
                }
                None => break,
            }
        }
    }

    fn drain_expired(inner: &mut Entries<T>, now: DateTime<Utc>) -> Vec<(String, T)> {
        let expired: Vec<String> = inner
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|key| inner.pop(&key).map(|e| (key, e.value)))
            .collect()
    }
}

impl<T> std::fmt::Debug for Segment<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("name", &self.name)
            .field("size", &self.size.load(Ordering::Relaxed))
            .field("limit", &self.limit.load(Ordering::Relaxed))
            .finish()
    }
}

fn ttl_to_ms(ttl: Option<Duration>) -> u64 {
    ttl.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(capacity: usize, ttl: Option<Duration>) -> Segment<i32> {
        Segment::new(
            "test",
            &SegmentConfig {
                max_capacity: capacity,
                ttl,
            },
        )
    }

    #[test]
    fn test_set_then_get_within_ttl() {
        let seg = segment(0, Some(Duration::from_secs(300)));
        seg.set("k", 7);
        assert_eq!(seg.get("k"), Some(7));

        let expiry = seg.get_expiration("k").unwrap();
        assert!(expiry > Utc::now());
    }

    #[test]
    fn test_expired_entry_is_removed_on_read() {
        let seg = segment(0, Some(Duration::from_secs(300)));
        seg.set("fresh", 1);
        seg.set_with_expiration("stale", 2, Some(Utc::now() - TimeDelta::seconds(1)));
        assert_eq!(seg.len(), 2);

        assert_eq!(seg.get("stale"), None);
        assert_eq!(seg.len(), 1);
        assert_eq!(seg.stats().misses, 1);
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let seg = segment(0, None);
        seg.set("k", 1);
        assert_eq!(seg.get_expiration("k"), None);
        assert_eq!(seg.cleanup_expired(Utc::now() + TimeDelta::days(365)), 0);
        assert_eq!(seg.get("k"), Some(1));
    }

    #[test]
    fn test_empty_key_is_ignored() {
        let seg = segment(0, None);
        seg.set("", 1);
        assert!(seg.is_empty());
        assert_eq!(seg.get(""), None);
        assert_eq!(seg.stats().misses, 1);
    }

    #[test]
    fn test_peek_does_not_promote_or_count() {
        let seg = segment(2, None);
        seg.set("a", 1);
        seg.set("b", 2);
        assert_eq!(seg.peek("a"), Some(1));
        assert!(seg.contains("b"));

        seg.set("c", 3);
        assert!(!seg.contains("a"));
        let stats = seg.stats();
        assert_eq!((stats.hits, stats.misses), (0, 0));
    }

    #[test]
    fn test_lru_eviction_spares_recently_read() {
        let seg = segment(2, None);
        seg.set("a", 1);
        seg.set("b", 2);
        assert_eq!(seg.get("a"), Some(1));
        seg.set("c", 3);

        assert_eq!(seg.get("b"), None);
        assert_eq!(seg.get("a"), Some(1));
        assert_eq!(seg.get("c"), Some(3));
        assert_eq!(seg.stats().evictions, 1);
    }

    #[test]
    fn test_lru_eviction_with_larger_capacity() {
        let seg = segment(4, None);
        for (i, key) in ["k1", "k2", "k3", "k4"].iter().enumerate() {
            seg.set(key, i as i32);
        }
        seg.get("k1");
        seg.set("k5", 5);

        assert!(seg.contains("k1"));
        assert!(!seg.contains("k2"));
        assert_eq!(seg.len(), 4);
    }

    #[test]
    fn test_keys_most_recent_first() {
        let seg = segment(0, None);
        seg.set("a", 1);
        seg.set("b", 2);
        seg.set("c", 3);
        seg.get("a");
        seg.set("b", 20);

        assert_eq!(seg.keys(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_update_does_not_evict() {
        let seg = segment(2, None);
        seg.set("a", 1);
        seg.set("b", 2);
        seg.set("a", 10);

        assert_eq!(seg.len(), 2);
        assert_eq!(seg.stats().evictions, 0);
        assert_eq!(seg.get("a"), Some(10));
        // the update promoted "a", so "b" goes first
        seg.set("c", 3);
        assert!(!seg.contains("b"));
    }

    #[test]
    fn test_cleanup_expired() {
        let seg = segment(0, None);
        let past = Utc::now() - TimeDelta::seconds(10);
        seg.set_with_expiration("old1", 1, Some(past));
        seg.set_with_expiration("old2", 2, Some(past));
        seg.set("keep", 3);

        assert_eq!(seg.cleanup_expired(Utc::now()), 2);
        assert_eq!(seg.keys(), vec!["keep".to_string()]);
    }

    #[test]
    fn test_cleanup_callback_can_reenter() {
        let seg = segment(0, None);
        seg.set_with_expiration("old", 1, Some(Utc::now() - TimeDelta::seconds(1)));

        let mut seen = Vec::new();
        let removed = seg.cleanup_expired_with_callback(Utc::now(), |key, value| {
            seen.push((key.to_string(), value));
            seg.set("replacement", value + 1);
        });

        assert_eq!(removed, 1);
        assert_eq!(seen, vec![("old".to_string(), 1)]);
        assert_eq!(seg.get("replacement"), Some(2));
    }

    #[test]
    fn test_set_limit_shrinks() {
        let seg = segment(0, None);
        for key in ["a", "b", "c", "d"] {
            seg.set(key, 0);
        }
        seg.get("a");
        seg.set_limit(2);

        assert_eq!(seg.len(), 2);
        assert!(seg.contains("a"));
        assert!(seg.contains("d"));
        assert_eq!(seg.stats().evictions, 2);
    }

    #[test]
    fn test_load_entry_bypasses_capacity() {
        let seg = segment(2, None);
        assert!(seg.load_entry("a", 1, None));
        assert!(seg.load_entry("b", 2, None));
        assert!(seg.load_entry("c", 3, None));
        assert!(!seg.load_entry("c", 99, None));
        assert_eq!(seg.len(), 3);
        assert_eq!(seg.stats().evictions, 0);

        // next regular insert brings the segment back under its limit
        seg.set("d", 4);
        assert_eq!(seg.len(), 2);
        assert!(seg.contains("d"));
    }

    #[test]
    fn test_set_if_absent() {
        let seg = segment(0, None);
        assert!(seg.set_if_absent("a", 1));
        assert!(!seg.set_if_absent("a", 2));
        assert_eq!(seg.get("a"), Some(1));
    }

    #[test]
    fn test_clear_keeps_counters() {
        let seg = segment(0, None);
        seg.set("a", 1);
        seg.get("a");
        seg.get("b");
        seg.clear();

        let stats = seg.stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_stats_rates_zero_without_access() {
        let seg = segment(10, Some(Duration::from_secs(60)));
        let stats = seg.stats();
        assert_eq!(stats.hit_rate, 0.0);
        assert_eq!(stats.miss_rate, 0.0);
        assert_eq!(stats.capacity, 10);
        assert_eq!(stats.ttl, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_set_ttl_affects_future_writes_only() {
        let seg = segment(0, None);
        seg.set("before", 1);
        seg.set_ttl(Some(Duration::from_secs(60)));
        seg.set("after", 2);

        assert_eq!(seg.get_expiration("before"), None);
        assert!(seg.get_expiration("after").is_some());
    }

    #[test]
    fn test_concurrent_writers() {
        let seg = Arc::new(segment(100, None));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let seg = Arc::clone(&seg);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        seg.set(&format!("{t}-{i}"), i);
                        seg.get(&format!("{t}-{}", i / 2));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(seg.len() <= 100);
    }
}
