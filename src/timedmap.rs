//! Fixed-key/value associative container with per-entry TTL.
//!
//! Backs the ARP address table, the ARP pending-buffer slot, and the
//! UDP port table. There is no background sweeper: eviction happens
//! opportunistically on [`TimedMap::get`]/[`TimedMap::set`], since
//! this whole stack is cooperative and single-threaded (see
//! `NetStack::poll`). Time is supplied by the caller as a monotonic
//! tick count — the clock itself is an external collaborator this
//! crate has no opinion about.

use alloc::collections::BTreeMap;

use crate::NetError;

/// An associative container keyed by `K`, storing `V` alongside the
/// tick at which it was last written, with optional capacity and TTL
/// limits.
///
/// The C implementation's configurable value-copy hook — used so the
/// ARP pending map could deep-copy a `buf_t` it doesn't own — has no
/// counterpart here: `set` already takes `V` by value, so a caller
/// storing a buffer clones it up front (see [`crate::buf::Buffer`]'s
/// `Clone` impl) rather than the map cloning on its behalf.
pub struct TimedMap<K: Ord, V> {
    entries: BTreeMap<K, (V, u64)>,
    max_entries: Option<usize>,
    ttl_ticks: Option<u64>,
}

impl<K: Ord, V> TimedMap<K, V> {
    /// Create an empty map. `max_entries = None` means unbounded;
    /// `ttl_ticks = None` means entries never expire.
    pub fn new(max_entries: Option<usize>, ttl_ticks: Option<u64>) -> Self {
        TimedMap {
            entries: BTreeMap::new(),
            max_entries,
            ttl_ticks,
        }
    }

    fn is_expired(&self, last_update: u64, now: u64) -> bool {
        match self.ttl_ticks {
            Some(ttl) => now.saturating_sub(last_update) > ttl,
            None => false,
        }
    }

    /// Sweep every expired entry. Called opportunistically from `get`
    /// and `set` rather than from a timer, per the cooperative
    /// scheduling model this stack runs under.
    fn evict_expired(&mut self, now: u64) {
        if self.ttl_ticks.is_none() {
            return;
        }
        let ttl = self.ttl_ticks.unwrap();
        self.entries
            .retain(|_, (_, last_update)| now.saturating_sub(*last_update) <= ttl);
    }

    /// Insert or overwrite `key`, refreshing its timestamp. Fails if
    /// the map is at capacity and `key` is not already present.
    pub fn set(&mut self, key: K, value: V, now: u64) -> Result<(), NetError> {
        self.evict_expired(now);
        if let Some(max) = self.max_entries {
            if !self.entries.contains_key(&key) && self.entries.len() >= max {
                return Err(NetError::TableFull);
            }
        }
        self.entries.insert(key, (value, now));
        Ok(())
    }

    /// Look up `key`, evicting it first if its TTL has lapsed.
    pub fn get(&mut self, key: &K, now: u64) -> Option<&V> {
        if let Some((_, last_update)) = self.entries.get(key) {
            if self.is_expired(*last_update, now) {
                self.entries.remove(key);
                return None;
            }
        }
        self.entries.get(key).map(|(v, _)| v)
    }

    /// Mutable variant of [`TimedMap::get`], used by callers that need
    /// to invoke a stored `FnMut` (e.g. dispatching to a UDP handler).
    pub fn get_mut(&mut self, key: &K, now: u64) -> Option<&mut V> {
        if let Some((_, last_update)) = self.entries.get(key) {
            if self.is_expired(*last_update, now) {
                self.entries.remove(key);
                return None;
            }
        }
        self.entries.get_mut(key).map(|(v, _)| v)
    }

    /// Remove `key` unconditionally.
    pub fn delete(&mut self, key: &K) {
        self.entries.remove(key);
    }

    /// Whether `key` has a live (non-expired) entry, without removing
    /// it eagerly. Used by callers that only need a presence check,
    /// e.g. the ARP pending-slot contention test.
    pub fn contains(&self, key: &K, now: u64) -> bool {
        match self.entries.get(key) {
            Some((_, last_update)) => !self.is_expired(*last_update, now),
            None => false,
        }
    }

    /// Visit every live entry in key order.
    pub fn foreach(&self, mut f: impl FnMut(&K, &V)) {
        for (k, (v, _)) in self.entries.iter() {
            f(k, v);
        }
    }

    /// Number of entries currently stored, including any not yet
    /// opportunistically evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let mut m: TimedMap<u32, &str> = TimedMap::new(None, None);
        m.set(1, "one", 0).unwrap();
        assert_eq!(m.get(&1, 0), Some(&"one"));
    }

    #[test]
    fn entries_expire_after_ttl() {
        let mut m: TimedMap<u32, &str> = TimedMap::new(None, Some(10));
        m.set(1, "one", 0).unwrap();
        assert_eq!(m.get(&1, 5), Some(&"one"));
        assert_eq!(m.get(&1, 11), None);
    }

    #[test]
    fn set_refreshes_timestamp() {
        let mut m: TimedMap<u32, &str> = TimedMap::new(None, Some(10));
        m.set(1, "one", 0).unwrap();
        m.set(1, "one", 9).unwrap();
        assert_eq!(m.get(&1, 18), Some(&"one"));
    }

    #[test]
    fn bounded_map_rejects_new_keys_past_capacity() {
        let mut m: TimedMap<u32, &str> = TimedMap::new(Some(1), None);
        m.set(1, "one", 0).unwrap();
        assert!(matches!(m.set(2, "two", 0), Err(NetError::TableFull)));
        // Overwriting the existing key is still fine.
        m.set(1, "uno", 0).unwrap();
    }

    #[test]
    fn delete_removes_entry() {
        let mut m: TimedMap<u32, &str> = TimedMap::new(None, None);
        m.set(1, "one", 0).unwrap();
        m.delete(&1);
        assert_eq!(m.get(&1, 0), None);
    }
}
