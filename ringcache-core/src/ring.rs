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

use hashbrown::HashMap;
use ringcache_common::hash::{crc32, HashFn};

/// Default number of virtual nodes per real peer for library consumers that
/// don't override it. The server binary wires a larger value (150).
pub const DEFAULT_REPLICAS: usize = 50;

/// A consistent-hash ring with virtual nodes, mapping cache keys to the peer
/// address that owns them.
///
/// `sorted_hashes` stays sorted ascending so routing is a binary search;
/// `hash_to_peer` resolves a virtual-node hash back to its real peer.
pub struct ConsistentHashRing {
    replicas: usize,
    hash_fn: HashFn,
    sorted_hashes: Vec<u32>,
    hash_to_peer: HashMap<u32, String>,
}

impl ConsistentHashRing {
    pub fn new(replicas: usize) -> Self {
        Self::with_hash_fn(replicas, crc32)
    }

    pub fn with_hash_fn(replicas: usize, hash_fn: HashFn) -> Self {
        Self {
            replicas,
            hash_fn,
            sorted_hashes: Vec::new(),
            hash_to_peer: HashMap::new(),
        }
    }

    /// Adds `peers` to the ring, each contributing `replicas` virtual nodes.
    pub fn add(&mut self, peers: &[String]) {
        for peer in peers {
            for i in 0..self.replicas {
                let h = (self.hash_fn)(format!("{i}{peer}").as_bytes());
                self.sorted_hashes.push(h);
                self.hash_to_peer.insert(h, peer.clone());
            }
        }
        self.sorted_hashes.sort_unstable();
    }

    /// Removes `peer`'s virtual nodes from the ring.
    pub fn remove(&mut self, peer: &str) {
        for i in 0..self.replicas {
            let h = (self.hash_fn)(format!("{i}{peer}").as_bytes());
            if self.hash_to_peer.remove(&h).is_some() {
                if let Ok(pos) = self.sorted_hashes.binary_search(&h) {
                    self.sorted_hashes.remove(pos);
                }
            }
        }
    }

    /// Returns the peer address owning `key`, or `None` if the ring is empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.sorted_hashes.is_empty() {
            return None;
        }
        let h = (self.hash_fn)(key.as_bytes());
        let idx = self.sorted_hashes.partition_point(|&x| x < h);
        let idx = if idx == self.sorted_hashes.len() { 0 } else { idx };
        self.hash_to_peer.get(&self.sorted_hashes[idx]).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.sorted_hashes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atoi_hash(data: &[u8]) -> u32 {
        std::str::from_utf8(data).unwrap().parse().unwrap()
    }

    #[test]
    fn routes_keys_to_nearest_peer_clockwise() {
        let mut ring = ConsistentHashRing::with_hash_fn(3, atoi_hash);
        ring.add(&["6".into(), "4".into(), "2".into()]);

        assert_eq!(ring.get("11"), Some("2"));
        assert_eq!(ring.get("23"), Some("4"));
        assert_eq!(ring.get("27"), Some("2"));

        ring.add(&["8".into()]);
        assert_eq!(ring.get("27"), Some("8"));

        ring.remove("8");
        assert_eq!(ring.get("27"), Some("2"));
    }

    #[test]
    fn empty_ring_returns_none() {
        let ring = ConsistentHashRing::new(DEFAULT_REPLICAS);
        assert_eq!(ring.get("anything"), None);
    }
}
