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

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use etcd_client::{Client, GetOptions, WatchOptions};
use futures::{Stream, StreamExt};
use ringcache_common::error::RegistryError;

/// One coordination-store event, deliberately mirroring etcd's own
/// `Put`/`Delete` distinction rather than a single "changed" boolean.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

pub type WatchStream = Pin<Box<dyn Stream<Item = Result<WatchEvent, RegistryError>> + Send>>;

/// Coordination-store contract used for membership discovery and server
/// registration. Implemented against `etcd` by [`EtcdCoordinationStore`];
/// kept as a trait so tests can substitute an in-memory fake.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>, RegistryError>;
    async fn watch_prefix(&self, prefix: &str) -> Result<WatchStream, RegistryError>;
    async fn grant_lease(&self, ttl_secs: i64) -> Result<i64, RegistryError>;
    async fn keepalive(&self, lease_id: i64) -> Result<(), RegistryError>;
    async fn revoke_lease(&self, lease_id: i64) -> Result<(), RegistryError>;
    async fn put_with_lease(&self, key: &str, value: &[u8], lease_id: i64) -> Result<(), RegistryError>;
}

pub struct EtcdCoordinationStore {
    client: Client,
}

impl EtcdCoordinationStore {
    pub async fn connect(endpoints: &[String]) -> Result<Self, RegistryError> {
        let client = Client::connect(endpoints, None)
            .await
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CoordinationStore for EtcdCoordinationStore {
    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>, RegistryError> {
        let mut client = self.client.clone();
        let resp = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;
        Ok(resp
            .kvs()
            .iter()
            .map(|kv| (kv.key().to_vec(), kv.value().to_vec()))
            .collect())
    }

    async fn watch_prefix(&self, prefix: &str) -> Result<WatchStream, RegistryError> {
        let mut client = self.client.clone();
        let (_watcher, stream) = client
            .watch(prefix, Some(WatchOptions::new().with_prefix()))
            .await
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;

        // Each watch response can carry multiple events; flatten to one
        // `WatchEvent` per stream item.
        let events = stream.flat_map(|result| match result {
            Ok(resp) => {
                let events: Vec<Result<WatchEvent, RegistryError>> = resp
                    .events()
                    .iter()
                    .filter_map(|event| {
                        let kv = event.kv()?;
                        match event.event_type() {
                            etcd_client::EventType::Put => Some(Ok(WatchEvent::Put {
                                key: kv.key().to_vec(),
                                value: kv.value().to_vec(),
                            })),
                            etcd_client::EventType::Delete => Some(Ok(WatchEvent::Delete { key: kv.key().to_vec() })),
                        }
                    })
                    .collect();
                futures::stream::iter(events)
            }
            Err(e) => futures::stream::iter(vec![Err(RegistryError::Unavailable(e.to_string()))]),
        });

        Ok(Box::pin(events))
    }

    async fn grant_lease(&self, ttl_secs: i64) -> Result<i64, RegistryError> {
        let mut client = self.client.clone();
        let resp = client
            .lease_grant(ttl_secs, None)
            .await
            .map_err(|e| RegistryError::LeaseFailed(e.to_string()))?;
        Ok(resp.id())
    }

    async fn keepalive(&self, lease_id: i64) -> Result<(), RegistryError> {
        let mut client = self.client.clone();
        let (mut keeper, mut stream) = client
            .lease_keep_alive(lease_id)
            .await
            .map_err(|e| RegistryError::LeaseFailed(e.to_string()))?;
        keeper
            .keep_alive()
            .await
            .map_err(|e| RegistryError::LeaseFailed(e.to_string()))?;
        stream
            .message()
            .await
            .map_err(|e| RegistryError::LeaseFailed(e.to_string()))?;
        Ok(())
    }

    async fn revoke_lease(&self, lease_id: i64) -> Result<(), RegistryError> {
        let mut client = self.client.clone();
        client
            .lease_revoke(lease_id)
            .await
            .map_err(|e| RegistryError::LeaseFailed(e.to_string()))?;
        Ok(())
    }

    async fn put_with_lease(&self, key: &str, value: &[u8], lease_id: i64) -> Result<(), RegistryError> {
        let mut client = self.client.clone();
        client
            .put(key, value, Some(etcd_client::PutOptions::new().with_lease(lease_id)))
            .await
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;
        Ok(())
    }
}

/// Default lease TTL for server registration: short enough that a crashed
/// node's peers notice within a couple of seconds.
pub const REGISTRATION_LEASE_TTL_SECS: i64 = 2;

/// Interval the server re-sends a keepalive on its registration lease.
pub const REGISTRATION_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);
