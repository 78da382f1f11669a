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

use std::collections::BTreeMap;
use std::ops::Bound;

use hashbrown::HashMap;

/// A key → value index additionally ordered by `hash(key)`, so that a
/// contiguous hash interval can be deleted without a linear scan of the
/// whole index.
///
/// Keyed by `(hash, key)` in the `BTreeMap` so that hash collisions resolve
/// by key rather than silently clobbering one another; a companion
/// `HashMap<String, u32>` tracks each key's current hash for O(1) lookup
/// without re-deriving it.
pub struct HashSortedIndex<V> {
    by_hash: BTreeMap<(u32, String), V>,
    key_hashes: HashMap<String, u32>,
}

impl<V> Default for HashSortedIndex<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> HashSortedIndex<V> {
    pub fn new() -> Self {
        Self {
            by_hash: BTreeMap::new(),
            key_hashes: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }

    pub fn exists(&self, key: &str) -> bool {
        self.key_hashes.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        let hash = *self.key_hashes.get(key)?;
        self.by_hash.get(&(hash, key.to_string()))
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        let hash = *self.key_hashes.get(key)?;
        self.by_hash.get_mut(&(hash, key.to_string()))
    }

    /// Inserts `value` under `key` hashed with `hash`, replacing any prior
    /// entry in place (no stale node left behind if `hash` also changed).
    pub fn put(&mut self, key: String, hash: u32, value: V) -> Option<V> {
        if let Some(old_hash) = self.key_hashes.insert(key.clone(), hash) {
            if old_hash != hash {
                self.by_hash.remove(&(old_hash, key.clone()));
            }
        }
        self.by_hash.insert((hash, key), value)
    }

    pub fn delete(&mut self, key: &str) -> Option<V> {
        let hash = self.key_hashes.remove(key)?;
        self.by_hash.remove(&(hash, key.to_string()))
    }

    /// Deletes every entry whose hash falls in `[lo, hi)`, returning the
    /// count removed.
    pub fn delete_by_hash_range(&mut self, lo: u32, hi: u32) -> usize {
        let keys: Vec<(u32, String)> = self
            .by_hash
            .range((Bound::Included((lo, String::new())), Bound::Excluded((hi, String::new()))))
            .map(|(k, _)| k.clone())
            .collect();
        for (hash, key) in &keys {
            self.by_hash.remove(&(*hash, key.clone()));
            self.key_hashes.remove(key);
        }
        keys.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.by_hash.iter().map(|((_, k), v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_replaces_in_place_without_orphaning_old_hash() {
        let mut idx = HashSortedIndex::new();
        idx.put("a".into(), 10, 1);
        idx.put("a".into(), 20, 2);

        assert_eq!(idx.len(), 1);
        assert_eq!(idx.get("a"), Some(&2));
    }

    #[test]
    fn collisions_resolve_by_key_not_hash() {
        let mut idx = HashSortedIndex::new();
        idx.put("a".into(), 7, "va");
        idx.put("b".into(), 7, "vb");

        assert_eq!(idx.get("a"), Some(&"va"));
        assert_eq!(idx.get("b"), Some(&"vb"));
        assert_eq!(idx.len(), 2);
    }

    #[test]
    fn delete_by_hash_range_is_bounded_and_exclusive_of_hi() {
        let mut idx = HashSortedIndex::new();
        for (k, h) in [("a", 1), ("b", 5), ("c", 9), ("d", 10)] {
            idx.put(k.into(), h, ());
        }
        let removed = idx.delete_by_hash_range(5, 10);
        assert_eq!(removed, 2);
        assert!(idx.exists("a"));
        assert!(!idx.exists("b"));
        assert!(!idx.exists("c"));
        assert!(idx.exists("d"));
    }
}
