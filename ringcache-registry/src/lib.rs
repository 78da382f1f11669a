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

//! Cluster membership: an `etcd`-backed coordination store and the
//! consistent-hash-ring-driven [`picker::PeerPicker`] built on top of it.

pub mod picker;
pub mod store;

pub use picker::PeerPicker;
pub use store::{CoordinationStore, EtcdCoordinationStore, WatchEvent, REGISTRATION_KEEPALIVE_INTERVAL, REGISTRATION_LEASE_TTL_SECS};
