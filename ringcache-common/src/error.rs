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

use thiserror::Error;

/// Errors surfaced by [`Group::get`](crate) and the single-flight pipeline.
///
/// `Clone` because the single-flight broadcast fans one result out to every
/// waiter on a key; each waiter needs its own owned copy of the outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GroupError {
    #[error("key must not be empty")]
    EmptyKey,

    #[error("key not found")]
    NotFound,

    #[error("peer {0} unreachable")]
    PeerUnreachable(String),

    #[error("loader failed: {0}")]
    Loader(String),
}

/// Errors surfaced by the coordination-store backed registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("coordination store unavailable: {0}")]
    Unavailable(String),

    #[error("watch channel closed")]
    WatchClosed,

    #[error("lease grant failed: {0}")]
    LeaseFailed(String),
}

/// Errors surfaced by the server's lifecycle and configuration handling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    #[error("server already running")]
    AlreadyRunning,

    #[error("server not running")]
    NotRunning,

    #[error("invalid address: {0}")]
    InvalidAddress(String),
}
