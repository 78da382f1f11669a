//  Copyright 2024 Ring Cache Authors
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

use std::time::Instant;

use hashbrown::HashMap;
use ringcache_common::byteview::entry_cost;
use ringcache_common::hash::crc32;
use ringcache_common::ByteView;

use crate::index::HashSortedIndex;

/// A node in the recency list, stored in an index-addressed arena rather
/// than behind raw pointers: entries are born, touched and evicted by
/// `usize` slot index.
struct Node {
    key: String,
    value: ByteView,
    prev: Option<usize>,
    next: Option<usize>,
}

/// A sized LRU cache with optional per-key TTL, backed by a
/// [`HashSortedIndex`] so a contiguous hash range can be dropped in bulk
/// (used by group membership changes to evict keys no longer owned locally).
pub struct LruCache {
    index: HashSortedIndex<usize>,
    arena: Vec<Option<Node>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    expiries: HashMap<String, Instant>,
    used_bytes: usize,
    max_bytes: usize,
    on_evicted: Option<Box<dyn Fn(&str, &ByteView) + Send + Sync>>,
}

impl LruCache {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            index: HashSortedIndex::new(),
            arena: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            expiries: HashMap::new(),
            used_bytes: 0,
            max_bytes,
            on_evicted: None,
        }
    }

    pub fn with_eviction_callback(
        max_bytes: usize,
        on_evicted: impl Fn(&str, &ByteView) + Send + Sync + 'static,
    ) -> Self {
        let mut cache = Self::new(max_bytes);
        cache.on_evicted = Some(Box::new(on_evicted));
        cache
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    /// Returns the value for `key`, moving it to the back of the recency
    /// list on a hit. An expired hit is treated as a miss and the entry is
    /// purged immediately.
    pub fn get(&mut self, key: &str) -> Option<ByteView> {
        if self.is_expired(key) {
            self.delete(key);
            return None;
        }
        let slot = *self.index.get(key)?;
        self.move_to_back(slot);
        Some(self.arena[slot].as_ref().unwrap().value.clone())
    }

    pub fn add(&mut self, key: String, value: ByteView) {
        self.expiries.remove(&key);
        self.insert(key, value);
    }

    pub fn add_with_expiration(&mut self, key: String, value: ByteView, deadline: Instant) {
        self.insert(key.clone(), value);
        self.expiries.insert(key, deadline);
    }

    fn insert(&mut self, key: String, value: ByteView) {
        let cost = entry_cost(&key, &value);
        let hash = crc32(key.as_bytes());

        if let Some(&slot) = self.index.get(&key) {
            let old_cost = {
                let node = self.arena[slot].as_ref().unwrap();
                entry_cost(&node.key, &node.value)
            };
            if cost > old_cost {
                self.make_room_except(slot, cost - old_cost);
            }
            self.arena[slot].as_mut().unwrap().value = value;
            self.used_bytes = self.used_bytes + cost - old_cost;
            self.move_to_back(slot);
            self.index.put(key, hash, slot);
            return;
        }

        self.make_room_for(cost);

        let slot = self.alloc(Node {
            key: key.clone(),
            value,
            prev: self.tail,
            next: None,
        });
        if let Some(tail) = self.tail {
            self.arena[tail].as_mut().unwrap().next = Some(slot);
        } else {
            self.head = Some(slot);
        }
        self.tail = Some(slot);

        self.index.put(key, hash, slot);
        self.used_bytes += cost;
    }

    /// Evicts from the front until the budget (minus `incoming_cost`) is
    /// satisfied, so the entry about to be inserted has room. Never runs
    /// out of victims to evict since the incoming entry doesn't exist yet.
    fn make_room_for(&mut self, incoming_cost: usize) {
        while self.used_bytes + incoming_cost > self.max_bytes && self.head.is_some() {
            self.evict_front();
        }
    }

    /// Like [`Self::make_room_for`], but stops once `protect` would be the
    /// next victim: a single entry whose own cost exceeds the budget is
    /// accepted after evicting everything else, not evicted out from under
    /// the update that's replacing it.
    fn make_room_except(&mut self, protect: usize, incoming_extra: usize) {
        while self.used_bytes + incoming_extra > self.max_bytes {
            match self.head {
                Some(h) if h != protect => self.evict_front(),
                _ => break,
            }
        }
    }

    fn evict_front(&mut self) {
        let Some(slot) = self.head else { return };
        let node = self.arena[slot].as_ref().unwrap();
        let key = node.key.clone();
        let value = node.value.clone();
        self.remove_slot(slot);
        self.used_bytes -= entry_cost(&key, &value);
        self.index.delete(&key);
        self.expiries.remove(&key);
        if let Some(cb) = &self.on_evicted {
            cb(&key, &value);
        }
    }

    pub fn delete(&mut self, key: &str) -> bool {
        let Some(&slot) = self.index.get(key) else {
            return false;
        };
        let cost = {
            let node = self.arena[slot].as_ref().unwrap();
            entry_cost(&node.key, &node.value)
        };
        self.remove_slot(slot);
        self.used_bytes -= cost;
        self.index.delete(key);
        self.expiries.remove(key);
        true
    }

    pub fn delete_by_hash_range(&mut self, lo: u32, hi: u32) -> usize {
        let keys: Vec<String> = self
            .index
            .iter()
            .filter(|(_, &slot)| {
                let h = crc32(self.arena[slot].as_ref().unwrap().key.as_bytes());
                h >= lo && h < hi
            })
            .map(|(k, _)| k.to_string())
            .collect();
        for key in &keys {
            self.delete(key);
        }
        keys.len()
    }

    fn is_expired(&self, key: &str) -> bool {
        self.expiries
            .get(key)
            .map(|deadline| Instant::now() >= *deadline)
            .unwrap_or(false)
    }

    /// Samples up to `expiries.len() / 10` keys with a TTL and purges the
    /// ones that have expired. Meant to be driven by a periodic background
    /// tick rather than relying solely on lazy expiry at `get` time, so a
    /// key that's never looked up again still gets reclaimed.
    pub fn sweep_expired(&mut self) -> usize {
        let budget = self.expiries.len() / 10;
        if budget == 0 {
            return 0;
        }
        let now = Instant::now();
        let expired: Vec<String> = self
            .expiries
            .iter()
            .take(budget)
            .filter(|(_, deadline)| now >= **deadline)
            .map(|(k, _)| k.clone())
            .collect();
        let purged = expired.len();
        for key in expired {
            self.delete(&key);
        }
        purged
    }

    fn alloc(&mut self, node: Node) -> usize {
        if let Some(slot) = self.free.pop() {
            self.arena[slot] = Some(node);
            slot
        } else {
            self.arena.push(Some(node));
            self.arena.len() - 1
        }
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = {
            let node = self.arena[slot].as_ref().unwrap();
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.arena[p].as_mut().unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.arena[n].as_mut().unwrap().prev = prev,
            None => self.tail = prev,
        }
    }

    fn remove_slot(&mut self, slot: usize) {
        self.unlink(slot);
        self.arena[slot] = None;
        self.free.push(slot);
    }

    fn move_to_back(&mut self, slot: usize) {
        if self.tail == Some(slot) {
            return;
        }
        self.unlink(slot);
        self.arena[slot].as_mut().unwrap().prev = self.tail;
        self.arena[slot].as_mut().unwrap().next = None;
        if let Some(tail) = self.tail {
            self.arena[tail].as_mut().unwrap().next = Some(slot);
        } else {
            self.head = Some(slot);
        }
        self.tail = Some(slot);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn hit_returns_value_and_moves_to_back() {
        let mut cache = LruCache::new(1024);
        cache.add("a".into(), ByteView::from("1"));
        cache.add("b".into(), ByteView::from("2"));

        assert_eq!(cache.get("a").unwrap().to_vec(), b"1");
        // "a" is now most-recent; evicting should take "b" first.
        cache.add("c".into(), ByteView::from("3"));
        assert!(cache.get("a").is_some());
    }

    #[test]
    fn eviction_follows_strict_lru_order() {
        let evicted = Arc::new(std::sync::Mutex::new(Vec::new()));
        let evicted_cb = evicted.clone();
        // "k0".."k3" at cost 3 bytes each (1-byte key + 2-byte value).
        let mut cache = LruCache::with_eviction_callback(9, move |k, _| {
            evicted_cb.lock().unwrap().push(k.to_string());
        });

        for i in 0..3 {
            cache.add(format!("k{i}"), ByteView::from("vv"));
        }
        assert_eq!(cache.used_bytes(), 9);

        cache.add("k3".into(), ByteView::from("vv"));
        assert_eq!(*evicted.lock().unwrap(), vec!["k0".to_string()]);
        assert!(cache.get("k0").is_none());
        assert!(cache.get("k1").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_entry_expires_and_is_purged_on_access() {
        let mut cache = LruCache::new(1024);
        let deadline = Instant::now() + Duration::from_secs(2);
        cache.add_with_expiration("a".into(), ByteView::from("1"), deadline);

        assert!(cache.get("a").is_some());

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(cache.get("a").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_purges_expired_keys_up_to_the_sampled_budget() {
        let mut cache = LruCache::new(1024);
        for i in 0..20 {
            cache.add_with_expiration(format!("k{i}"), ByteView::from("v"), Instant::now() + Duration::from_secs(1));
        }

        tokio::time::advance(Duration::from_secs(2)).await;

        // budget is expiries.len() / 10 == 2 per tick, so one tick can't
        // clear all 20 expired keys at once.
        assert_eq!(cache.sweep_expired(), 2);
        assert_eq!(cache.len(), 18);

        // Repeated ticks make steady progress; once under 10 remaining the
        // sample shrinks to zero, so any stragglers are left for lazy
        // expiry on their next `get`.
        loop {
            if cache.sweep_expired() == 0 {
                break;
            }
        }
        assert!(cache.len() < 10, "sweep should drain down to the sub-10 tail");

        // Lazy expiry on `get` catches whatever the sweep's shrinking sample
        // couldn't reach.
        for i in 0..20 {
            assert!(cache.get(&format!("k{i}")).is_none());
        }
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn sweep_is_a_noop_below_the_sampling_threshold() {
        let mut cache = LruCache::new(1024);
        cache.add_with_expiration("a".into(), ByteView::from("v"), Instant::now() - Duration::from_secs(1));
        // One expired key but expiries.len() / 10 == 0, so the sample is empty.
        assert_eq!(cache.sweep_expired(), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn loader_invoked_once_per_miss_then_cached() {
        let mut cache = LruCache::new(1024);
        let loads = Arc::new(AtomicUsize::new(0));

        let mut load = |cache: &mut LruCache, key: &str| -> ByteView {
            if let Some(v) = cache.get(key) {
                return v;
            }
            loads.fetch_add(1, Ordering::SeqCst);
            let v = ByteView::from("computed");
            cache.add(key.to_string(), v.clone());
            v
        };

        load(&mut cache, "x");
        load(&mut cache, "x");
        load(&mut cache, "x");
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }
}
