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

//! The server binary's building blocks: CLI configuration and the
//! lifecycle-managed gRPC frontend, split out of `main` so both can be
//! exercised from tests.

pub mod config;
pub mod loader;
pub mod server;

pub use config::Config;
pub use loader::StaticMapGetter;
pub use server::Server;
