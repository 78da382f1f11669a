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

//! The request pipeline tying the local cache, the user-supplied loader and
//! peer forwarding together, plus the server-owned registry of groups.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use ringcache_common::{ByteView, GroupError};

use crate::lru::LruCache;
use crate::singleflight::SingleFlight;

/// Supplies the value for a key that isn't in the local cache. Implemented
/// by application code (e.g. a database-backed loader).
#[async_trait]
pub trait Getter: Send + Sync {
    /// Returns `(bytes, ttl)` on a hit, or `None` on a miss. `ttl` is an
    /// absolute deadline, matching [`LruCache::add_with_expiration`].
    async fn get(&self, key: &str) -> Result<Option<(Vec<u8>, Option<Instant>)>, GroupError>;
}

/// A handle to a remote peer, used to forward `get`/`delete` over the wire.
#[async_trait]
pub trait PeerClient: Send + Sync {
    async fn get(&self, group: &str, key: &str) -> Result<ByteView, GroupError>;
    async fn delete(&self, group: &str, key: &str) -> Result<bool, GroupError>;
}

/// Resolves which peer owns a key, consulted by [`Group`] before falling
/// back to the local cache/loader.
pub trait PeerPicker: Send + Sync {
    /// Returns the owning peer and whether it is this node, or `None` if
    /// the ring has no members yet.
    fn pick_peer(&self, key: &str) -> Option<(Arc<dyn PeerClient>, bool)>;
}

type GroupResult = Result<ByteView, GroupError>;

/// A namespaced cache with a loader fallback and optional peer forwarding.
pub struct Group {
    name: String,
    getter: Arc<dyn Getter>,
    main_cache: Mutex<LruCache>,
    peers: RwLock<Option<Arc<dyn PeerPicker>>>,
    loader: SingleFlight<GroupResult>,
    is_hot: bool,
    peers_registered: AtomicBool,
}

impl Group {
    pub fn new(name: impl Into<String>, getter: Arc<dyn Getter>, max_bytes: usize) -> Self {
        Self::with_hot_flag(name, getter, max_bytes, false)
    }

    /// A hot group never routes through peers: every node keeps its own copy.
    pub fn hot(name: impl Into<String>, getter: Arc<dyn Getter>, max_bytes: usize) -> Self {
        Self::with_hot_flag(name, getter, max_bytes, true)
    }

    fn with_hot_flag(name: impl Into<String>, getter: Arc<dyn Getter>, max_bytes: usize, is_hot: bool) -> Self {
        Self {
            name: name.into(),
            getter,
            main_cache: Mutex::new(LruCache::new(max_bytes)),
            peers: RwLock::new(None),
            loader: SingleFlight::new(),
            is_hot,
            peers_registered: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers the peer picker used for routing. Callable exactly once;
    /// a second call is a programming error and panics.
    pub fn register_peers(&self, picker: Arc<dyn PeerPicker>) {
        if self.peers_registered.swap(true, Ordering::SeqCst) {
            panic!("register_peers called more than once for group {}", self.name);
        }
        *self.peers.write() = Some(picker);
    }

    pub async fn get(&self, key: &str) -> GroupResult {
        if key.is_empty() {
            return Err(GroupError::EmptyKey);
        }

        if !self.is_hot {
            if let Some(picker) = self.peers.read().clone() {
                if let Some((peer, is_self)) = picker.pick_peer(key) {
                    if !is_self {
                        let name = self.name.clone();
                        let key_owned = key.to_string();
                        return self
                            .loader
                            .run(&key_owned, || async move {
                                match peer.get(&name, &key_owned).await {
                                    Err(GroupError::PeerUnreachable(_)) => self.load_locally(&key_owned).await,
                                    other => other,
                                }
                            })
                            .await;
                    }
                }
            }
        }

        let key_owned = key.to_string();
        self.loader.run(&key_owned, || self.load_locally(key)).await
    }

    /// Loads `key` via the local cache, then the user loader on a miss.
    /// Called directly from within the enclosing single-flight cohort
    /// (never via a nested `self.loader.run`), so the remote-peer recovery
    /// path above can fall through to it without deadlocking against the
    /// outer cohort for the same key.
    async fn load_locally(&self, key: &str) -> GroupResult {
        if let Some(v) = self.main_cache.lock().get(key) {
            return Ok(v);
        }

        let hit = self.getter.get(key).await?;
        let Some((bytes, ttl)) = hit else {
            return Err(GroupError::NotFound);
        };

        let value = ByteView::from(bytes);
        let mut cache = self.main_cache.lock();
        match ttl {
            Some(deadline) => cache.add_with_expiration(key.to_string(), value.clone(), deadline),
            None => cache.add(key.to_string(), value.clone()),
        }
        Ok(value)
    }

    pub async fn delete(&self, key: &str) -> Result<bool, GroupError> {
        if key.is_empty() {
            return Err(GroupError::EmptyKey);
        }

        if !self.is_hot {
            if let Some(picker) = self.peers.read().clone() {
                if let Some((peer, is_self)) = picker.pick_peer(key) {
                    if !is_self {
                        return peer.delete(&self.name, key).await;
                    }
                }
            }
        }

        Ok(self.main_cache.lock().delete(key))
    }

    /// Removes keys in `[lo, hi)` from the local cache, used when group
    /// membership changes and this node no longer owns that hash range.
    pub fn delete_by_hash_range(&self, lo: u32, hi: u32) -> usize {
        self.main_cache.lock().delete_by_hash_range(lo, hi)
    }

    /// Samples and purges expired keys from the local cache. Meant to be
    /// driven by a periodic background tick, not called inline from `get`.
    pub fn sweep_expired(&self) -> usize {
        self.main_cache.lock().sweep_expired()
    }
}

/// Server-owned registry of groups, replacing a package-level mutable
/// global: hot and regular groups live in separate maps, both guarded by a
/// reader/writer lock.
#[derive(Default)]
pub struct GroupRegistry {
    groups: RwLock<hashbrown::HashMap<String, Arc<Group>>>,
    hot_groups: RwLock<hashbrown::HashMap<String, Arc<Group>>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, group: Arc<Group>) {
        let map = if group.is_hot { &self.hot_groups } else { &self.groups };
        map.write().insert(group.name.clone(), group);
    }

    pub fn get(&self, name: &str) -> Option<Arc<Group>> {
        self.groups
            .read()
            .get(name)
            .or_else(|| self.hot_groups.read().get(name))
            .cloned()
    }

    /// The non-hot groups, i.e. those that route through peers and so need
    /// a picker registered once discovery is up.
    pub fn routable_groups(&self) -> Vec<Arc<Group>> {
        self.groups.read().values().cloned().collect()
    }

    /// Every registered group, hot or not, e.g. for a background task that
    /// needs to visit all of them regardless of routing.
    pub fn all_groups(&self) -> Vec<Arc<Group>> {
        self.groups
            .read()
            .values()
            .chain(self.hot_groups.read().values())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    struct CountingGetter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Getter for CountingGetter {
        async fn get(&self, key: &str) -> Result<Option<(Vec<u8>, Option<Instant>)>, GroupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if key == "missing" {
                return Ok(None);
            }
            Ok(Some((format!("value-of-{key}").into_bytes(), None)))
        }
    }

    #[tokio::test]
    async fn local_hit_avoids_reinvoking_loader() {
        let getter = Arc::new(CountingGetter { calls: AtomicUsize::new(0) });
        let group = Group::new("scores", getter.clone(), 4096);

        let first = group.get("alice").await.unwrap();
        let second = group.get("alice").await.unwrap();

        assert_eq!(first.to_vec(), b"value-of-alice");
        assert_eq!(second.to_vec(), b"value-of-alice");
        assert_eq!(getter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn miss_returns_not_found() {
        let getter = Arc::new(CountingGetter { calls: AtomicUsize::new(0) });
        let group = Group::new("scores", getter, 4096);

        assert_eq!(group.get("missing").await, Err(GroupError::NotFound));
    }

    #[tokio::test]
    async fn empty_key_is_rejected_without_touching_loader() {
        let getter = Arc::new(CountingGetter { calls: AtomicUsize::new(0) });
        let group = Group::new("scores", getter.clone(), 4096);

        assert_eq!(group.get("").await, Err(GroupError::EmptyKey));
        assert_eq!(getter.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    #[should_panic(expected = "register_peers called more than once")]
    fn registering_peers_twice_panics() {
        struct NoPeers;
        impl PeerPicker for NoPeers {
            fn pick_peer(&self, _key: &str) -> Option<(Arc<dyn PeerClient>, bool)> {
                None
            }
        }

        let getter = Arc::new(CountingGetter { calls: AtomicUsize::new(0) });
        let group = Group::new("scores", getter, 4096);
        group.register_peers(Arc::new(NoPeers));
        group.register_peers(Arc::new(NoPeers));
    }

    struct UnreachablePeer;

    #[async_trait]
    impl PeerClient for UnreachablePeer {
        async fn get(&self, _group: &str, _key: &str) -> Result<ByteView, GroupError> {
            Err(GroupError::PeerUnreachable("peer:1: deadline exceeded".into()))
        }

        async fn delete(&self, _group: &str, _key: &str) -> Result<bool, GroupError> {
            Err(GroupError::PeerUnreachable("peer:1: deadline exceeded".into()))
        }
    }

    struct RemotePicker;

    impl PeerPicker for RemotePicker {
        fn pick_peer(&self, _key: &str) -> Option<(Arc<dyn PeerClient>, bool)> {
            Some((Arc::new(UnreachablePeer), false))
        }
    }

    #[tokio::test]
    async fn unreachable_peer_falls_through_to_local_loader() {
        let getter = Arc::new(CountingGetter { calls: AtomicUsize::new(0) });
        let group = Group::new("scores", getter.clone(), 4096);
        group.register_peers(Arc::new(RemotePicker));

        let value = group.get("alice").await.unwrap();

        assert_eq!(value.to_vec(), b"value-of-alice");
        assert_eq!(getter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn registry_resolves_by_name_across_hot_and_regular_maps() {
        let getter = Arc::new(CountingGetter { calls: AtomicUsize::new(0) });
        let registry = GroupRegistry::new();
        registry.register(Arc::new(Group::new("scores", getter.clone(), 4096)));
        registry.register(Arc::new(Group::hot("sessions", getter, 4096)));

        assert!(registry.get("scores").is_some());
        assert!(registry.get("sessions").is_some());
        assert!(registry.get("missing").is_none());
    }
}
