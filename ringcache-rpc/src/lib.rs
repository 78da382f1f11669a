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

//! Generated gRPC wire types plus a [`GrpcPeerClient`] adapting them to
//! [`ringcache_core::group::PeerClient`].

use std::time::Duration;

use async_trait::async_trait;
use ringcache_common::{ByteView, GroupError};
use ringcache_core::group::PeerClient;
use tonic::transport::Channel;
use tonic::Request;

pub mod proto {
    tonic::include_proto!("ringcache");

    pub const FILE_DESCRIPTOR_SET: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/ringcache_descriptor.bin"));
}

use proto::ring_cache_client::RingCacheClient;
use proto::{DeleteRequest, GetRequest};

pub use proto::FILE_DESCRIPTOR_SET;

/// Every outbound peer call is bounded by this deadline so a stalled peer
/// can't wedge the single-flight cohort waiting on it.
const PEER_CALL_TIMEOUT: Duration = Duration::from_secs(3);

/// A [`PeerClient`] backed by a lazily-connected gRPC channel to one peer.
pub struct GrpcPeerClient {
    addr: String,
    channel: Channel,
}

impl GrpcPeerClient {
    /// Builds a client for `addr` (`host:port`) using a lazily-connecting
    /// channel: dialing happens on first use, not at construction.
    pub fn connect_lazy(addr: impl Into<String>) -> Result<Self, GroupError> {
        let addr = addr.into();
        let endpoint = Channel::from_shared(format!("http://{addr}"))
            .map_err(|e| GroupError::PeerUnreachable(format!("{addr}: {e}")))?
            .timeout(PEER_CALL_TIMEOUT);
        Ok(Self {
            addr,
            channel: endpoint.connect_lazy(),
        })
    }
}

#[async_trait]
impl PeerClient for GrpcPeerClient {
    async fn get(&self, group: &str, key: &str) -> Result<ByteView, GroupError> {
        let mut client = RingCacheClient::new(self.channel.clone());
        let mut req = Request::new(GetRequest {
            group: group.to_string(),
            key: key.to_string(),
        });
        req.set_timeout(PEER_CALL_TIMEOUT);

        let resp = client
            .get(req)
            .await
            .map_err(|status| status_to_group_error(&self.addr, status))?;
        Ok(ByteView::from(resp.into_inner().value))
    }

    async fn delete(&self, group: &str, key: &str) -> Result<bool, GroupError> {
        let mut client = RingCacheClient::new(self.channel.clone());
        let mut req = Request::new(DeleteRequest {
            group: group.to_string(),
            key: key.to_string(),
        });
        req.set_timeout(PEER_CALL_TIMEOUT);

        let resp = client
            .delete(req)
            .await
            .map_err(|status| status_to_group_error(&self.addr, status))?;
        Ok(resp.into_inner().value)
    }
}

fn status_to_group_error(addr: &str, status: tonic::Status) -> GroupError {
    match status.code() {
        tonic::Code::NotFound => GroupError::NotFound,
        tonic::Code::InvalidArgument if status.message() == "key required" => GroupError::EmptyKey,
        _ => GroupError::PeerUnreachable(format!("{addr}: {status}")),
    }
}

/// Maps a [`GroupError`] to the outbound gRPC status the server returns.
pub fn group_error_to_status(err: &GroupError) -> tonic::Status {
    match err {
        GroupError::EmptyKey => tonic::Status::invalid_argument("key required"),
        GroupError::NotFound => tonic::Status::not_found("key not found"),
        GroupError::PeerUnreachable(msg) => tonic::Status::unavailable(msg.clone()),
        GroupError::Loader(msg) => tonic::Status::not_found(msg.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_status_round_trips_to_group_error() {
        let status = tonic::Status::not_found("key not found");
        assert_eq!(status_to_group_error("peer:1", status), GroupError::NotFound);
    }

    #[test]
    fn invalid_argument_with_key_required_maps_to_empty_key() {
        let status = tonic::Status::invalid_argument("key required");
        assert_eq!(status_to_group_error("peer:1", status), GroupError::EmptyKey);
    }

    #[test]
    fn group_error_maps_back_to_expected_status_codes() {
        assert_eq!(group_error_to_status(&GroupError::EmptyKey).code(), tonic::Code::InvalidArgument);
        assert_eq!(group_error_to_status(&GroupError::NotFound).code(), tonic::Code::NotFound);
    }
}
