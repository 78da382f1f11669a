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

//! The cache engine: a sharded LRU+TTL store, a hash-sorted index used by
//! the consistent-hash ring, request coalescing via single-flight, and the
//! [`Group`] pipeline that ties local cache, loader and peer forwarding
//! together.

pub mod group;
pub mod index;
pub mod lru;
pub mod ring;
pub mod singleflight;

pub use group::{Getter, Group, GroupRegistry, PeerClient, PeerPicker};
pub use index::HashSortedIndex;
pub use lru::LruCache;
pub use ring::ConsistentHashRing;
pub use singleflight::SingleFlight;
