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

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use ringcache_common::ServerError;
use ringcache_core::group::GroupRegistry;
use ringcache_registry::store::{CoordinationStore, REGISTRATION_KEEPALIVE_INTERVAL, REGISTRATION_LEASE_TTL_SECS};
use ringcache_registry::PeerPicker;
use ringcache_rpc::proto::ring_cache_server::{RingCache, RingCacheServer};
use ringcache_rpc::proto::{DeleteRequest, DeleteResponse, GetRequest, GetResponse};
use ringcache_rpc::{group_error_to_status, FILE_DESCRIPTOR_SET};
use tokio_util::sync::CancellationToken;
use tonic::{transport, Request, Response, Status};
use tracing::{info, warn};

use crate::config::Config;

/// Explicit lifecycle states, replacing a boolean "running" flag so an
/// invalid transition (e.g. stopping twice) is a state-machine mismatch
/// rather than a silent no-op hidden inside a bool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    New,
    Starting,
    Running,
    Stopping,
    Stopped,
}

pub struct Server {
    config: Config,
    registry: Arc<GroupRegistry>,
    state: Mutex<State>,
    cancel: CancellationToken,
}

impl Server {
    pub fn new(config: Config, registry: Arc<GroupRegistry>) -> Self {
        Self {
            config,
            registry,
            state: Mutex::new(State::New),
            cancel: CancellationToken::new(),
        }
    }

    pub async fn start(self: Arc<Self>, store: Arc<dyn CoordinationStore>) -> Result<(), ServerError> {
        {
            let mut state = self.state.lock();
            if *state == State::Running || *state == State::Starting {
                return Err(ServerError::AlreadyRunning);
            }
            *state = State::Starting;
        }

        let addr: SocketAddr = self
            .config
            .addr
            .parse()
            .map_err(|_| ServerError::InvalidAddress(self.config.addr.clone()))?;

        let picker = PeerPicker::spawn(
            self.config.addr.clone(),
            self.config.service_name.clone(),
            self.config.replicas,
            store.clone(),
            self.config.full_sync_interval,
        );
        for group in self.registry.routable_groups() {
            group.register_peers(picker.clone());
        }

        let lease_id = store
            .grant_lease(REGISTRATION_LEASE_TTL_SECS)
            .await
            .map_err(|e| ServerError::InvalidAddress(e.to_string()))?;
        store
            .put_with_lease(
                &format!("{}/{}", self.config.service_name, self.config.addr),
                b"",
                lease_id,
            )
            .await
            .map_err(|e| ServerError::InvalidAddress(e.to_string()))?;

        self.spawn_keepalive(store.clone(), lease_id);
        self.spawn_sweeper();

        let reflection = tonic_reflection::server::Builder::configure()
            .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
            .build()
            .map_err(|e| ServerError::InvalidAddress(e.to_string()))?;

        let service = RingCacheService {
            registry: self.registry.clone(),
        };

        *self.state.lock() = State::Running;
        info!(%addr, "ring-cache server running");

        let cancel = self.cancel.clone();
        let server = transport::Server::builder()
            .add_service(RingCacheServer::new(service))
            .add_service(reflection)
            .serve_with_shutdown(addr, async move { cancel.cancelled().await });

        if let Err(err) = server.await {
            warn!(%err, "server terminated with error");
        }

        let _ = store.revoke_lease(lease_id).await;
        *self.state.lock() = State::Stopped;
        picker.stop();
        Ok(())
    }

    pub fn stop(&self) {
        let mut state = self.state.lock();
        if *state != State::Running {
            return;
        }
        *state = State::Stopping;
        self.cancel.cancel();
    }

    /// Periodically sweeps every registered group's cache for expired keys,
    /// so a key that's never `get()`-ed again is still reclaimed.
    fn spawn_sweeper(&self) {
        let cancel = self.cancel.clone();
        let registry = self.registry.clone();
        let interval = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        for group in registry.all_groups() {
                            let purged = group.sweep_expired();
                            if purged > 0 {
                                info!(group = group.name(), purged, "swept expired keys");
                            }
                        }
                    }
                }
            }
        });
    }

    fn spawn_keepalive(&self, store: Arc<dyn CoordinationStore>, lease_id: i64) {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REGISTRATION_KEEPALIVE_INTERVAL);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        if let Err(err) = store.keepalive(lease_id).await {
                            warn!(%err, "lease keepalive failed");
                            return;
                        }
                    }
                }
            }
        });
    }
}

struct RingCacheService {
    registry: Arc<GroupRegistry>,
}

#[tonic::async_trait]
impl RingCache for RingCacheService {
    async fn get(&self, request: Request<GetRequest>) -> Result<Response<GetResponse>, Status> {
        let req = request.into_inner();
        let group = self
            .registry
            .get(&req.group)
            .ok_or_else(|| Status::not_found("group not found"))?;

        let value = group.get(&req.key).await.map_err(|e| group_error_to_status(&e))?;
        Ok(Response::new(GetResponse { value: value.to_vec() }))
    }

    async fn delete(&self, request: Request<DeleteRequest>) -> Result<Response<DeleteResponse>, Status> {
        let req = request.into_inner();
        let group = self
            .registry
            .get(&req.group)
            .ok_or_else(|| Status::not_found("group not found"))?;

        let value = group.delete(&req.key).await.map_err(|e| group_error_to_status(&e))?;
        Ok(Response::new(DeleteResponse { value }))
    }
}
