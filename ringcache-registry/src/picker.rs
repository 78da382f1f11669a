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

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use hashbrown::HashMap;
use parking_lot::RwLock;
use ringcache_core::group::{PeerClient, PeerPicker as PeerPickerTrait};
use ringcache_core::ring::ConsistentHashRing;
use ringcache_rpc::GrpcPeerClient;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::store::{CoordinationStore, WatchEvent};

struct Inner {
    ring: ConsistentHashRing,
    clients: HashMap<String, Arc<dyn PeerClient>>,
}

/// Discovers peers via the coordination store and routes keys to them
/// through the consistent-hash ring.
///
/// `self_addr` is inserted into the ring at construction so local routing
/// works before any peer has been discovered; its entry in `clients` is a
/// sentinel that is never dialed.
pub struct PeerPicker {
    self_addr: String,
    service_name: String,
    inner: RwLock<Inner>,
    cancel: CancellationToken,
}

struct SelfSentinel;

#[async_trait::async_trait]
impl PeerClient for SelfSentinel {
    async fn get(&self, _group: &str, _key: &str) -> Result<ringcache_common::ByteView, ringcache_common::GroupError> {
        unreachable!("self sentinel is never dialed")
    }

    async fn delete(&self, _group: &str, _key: &str) -> Result<bool, ringcache_common::GroupError> {
        unreachable!("self sentinel is never dialed")
    }
}

impl PeerPicker {
    /// Builds the picker, inserts `self_addr` into the ring, and spawns the
    /// incremental watcher and full-sync background tasks against `store`.
    pub fn spawn(
        self_addr: impl Into<String>,
        service_name: impl Into<String>,
        replicas: usize,
        store: Arc<dyn CoordinationStore>,
        full_sync_interval: Duration,
    ) -> Arc<Self> {
        let self_addr = self_addr.into();
        let service_name = service_name.into();

        let mut ring = ConsistentHashRing::new(replicas);
        ring.add(&[self_addr.clone()]);
        let mut clients: HashMap<String, Arc<dyn PeerClient>> = HashMap::new();
        clients.insert(self_addr.clone(), Arc::new(SelfSentinel));

        let picker = Arc::new(Self {
            self_addr,
            service_name,
            inner: RwLock::new(Inner { ring, clients }),
            cancel: CancellationToken::new(),
        });

        tokio::spawn(picker.clone().run_watcher(store.clone()));
        tokio::spawn(picker.clone().run_full_sync(store, full_sync_interval));

        picker
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    fn prefix(&self) -> String {
        format!("{}/", self.service_name)
    }

    fn addr_from_key(&self, key: &[u8]) -> Option<String> {
        let key = std::str::from_utf8(key).ok()?;
        key.strip_prefix(&self.prefix()).map(str::to_string)
    }

    fn add_peer(&self, addr: String) {
        if addr == self.self_addr {
            return;
        }
        let mut inner = self.inner.write();
        if inner.clients.contains_key(&addr) {
            return;
        }
        match GrpcPeerClient::connect_lazy(addr.clone()) {
            Ok(client) => {
                inner.ring.add(&[addr.clone()]);
                inner.clients.insert(addr.clone(), Arc::new(client));
                debug!(peer = %addr, "added peer");
            }
            Err(err) => warn!(peer = %addr, %err, "failed to build peer client"),
        }
    }

    fn remove_peer(&self, addr: &str) {
        if addr == self.self_addr {
            return;
        }
        let mut inner = self.inner.write();
        inner.ring.remove(addr);
        inner.clients.remove(addr);
        debug!(peer = %addr, "removed peer");
    }

    async fn run_watcher(self: Arc<Self>, store: Arc<dyn CoordinationStore>) {
        let prefix = self.prefix();
        let mut stream = match store.watch_prefix(&prefix).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(%err, "failed to start peer watch");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                event = stream.next() => {
                    let Some(event) = event else { return };
                    match event {
                        Ok(WatchEvent::Put { key, .. }) => {
                            if let Some(addr) = self.addr_from_key(&key) {
                                self.add_peer(addr);
                            }
                        }
                        Ok(WatchEvent::Delete { key }) => {
                            if let Some(addr) = self.addr_from_key(&key) {
                                self.remove_peer(&addr);
                            }
                        }
                        Err(err) => warn!(%err, "peer watch error"),
                    }
                }
            }
        }
    }

    async fn run_full_sync(self: Arc<Self>, store: Arc<dyn CoordinationStore>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        let prefix = self.prefix();
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = ticker.tick() => {
                    match store.get_prefix(&prefix).await {
                        Ok(entries) => {
                            for (key, _) in entries {
                                if let Some(addr) = self.addr_from_key(&key) {
                                    self.add_peer(addr);
                                }
                            }
                        }
                        Err(err) => warn!(%err, "full sync failed"),
                    }
                }
            }
        }
    }
}

impl PeerPickerTrait for PeerPicker {
    fn pick_peer(&self, key: &str) -> Option<(Arc<dyn PeerClient>, bool)> {
        let inner = self.inner.read();
        let addr = inner.ring.get(key)?.to_string();
        let client = inner.clients.get(&addr)?.clone();
        Some((client, addr == self.self_addr))
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;

    use async_trait::async_trait;
    use futures::{Stream, StreamExt};
    use ringcache_common::error::RegistryError;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;

    use super::*;

    struct FakeStore {
        events: parking_lot::Mutex<Option<mpsc::Receiver<WatchEvent>>>,
    }

    #[async_trait]
    impl CoordinationStore for FakeStore {
        async fn get_prefix(&self, _prefix: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>, RegistryError> {
            Ok(Vec::new())
        }

        async fn watch_prefix(&self, _prefix: &str) -> Result<crate::store::WatchStream, RegistryError> {
            let rx = self.events.lock().take().expect("watch_prefix called twice in test");
            let stream: Pin<Box<dyn Stream<Item = Result<WatchEvent, RegistryError>> + Send>> =
                Box::pin(ReceiverStream::new(rx).map(Ok));
            Ok(stream)
        }

        async fn grant_lease(&self, _ttl_secs: i64) -> Result<i64, RegistryError> {
            Ok(1)
        }

        async fn keepalive(&self, _lease_id: i64) -> Result<(), RegistryError> {
            Ok(())
        }

        async fn revoke_lease(&self, _lease_id: i64) -> Result<(), RegistryError> {
            Ok(())
        }

        async fn put_with_lease(&self, _key: &str, _value: &[u8], _lease_id: i64) -> Result<(), RegistryError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn watcher_adds_and_removes_peers_on_put_and_delete() {
        let (tx, rx) = mpsc::channel(8);
        let store: Arc<dyn CoordinationStore> = Arc::new(FakeStore {
            events: parking_lot::Mutex::new(Some(rx)),
        });

        let picker = PeerPicker::spawn("127.0.0.1:9000", "ring-cache", 10, store, Duration::from_secs(3600));

        tx.send(WatchEvent::Put {
            key: b"ring-cache/127.0.0.1:9001".to_vec(),
            value: b"".to_vec(),
        })
        .await
        .unwrap();

        // Give the spawned watcher task a chance to process the event.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(picker.pick_peer("some-key").is_some());

        tx.send(WatchEvent::Delete {
            key: b"ring-cache/127.0.0.1:9001".to_vec(),
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let (_, is_self) = picker.pick_peer("some-key").unwrap();
        assert!(is_self, "only self remains after the peer was removed");

        picker.stop();
    }
}
