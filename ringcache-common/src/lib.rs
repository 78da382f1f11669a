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

//! Shared types used across the ring-cache workspace: the immutable [`ByteView`],
//! the crate-wide error enums, and small helpers (hashing, address validation)
//! that both the cache engine and the networking crates depend on.

pub mod addr;
pub mod byteview;
pub mod error;
pub mod hash;

pub use byteview::ByteView;
pub use error::{GroupError, RegistryError, ServerError};
