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

use clap::Parser;
use ringcache_core::group::{Group, GroupRegistry};
use ringcache_registry::EtcdCoordinationStore;
use ringcache_server::{Config, Server, StaticMapGetter};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let store = Arc::new(EtcdCoordinationStore::connect(&config.etcd_endpoints).await?);

    let getter = match &config.seed_file {
        Some(path) => StaticMapGetter::from_seed_file(path)?,
        None => StaticMapGetter::empty(),
    };
    let registry = Arc::new(GroupRegistry::new());
    registry.register(Arc::new(Group::new(
        config.group_name.clone(),
        Arc::new(getter),
        config.group_cache_bytes,
    )));

    let server = Arc::new(Server::new(config, registry));

    let shutdown = {
        let server = server.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            server.stop();
        }
    };

    tokio::select! {
        result = server.start(store) => result?,
        _ = shutdown => {},
    }

    Ok(())
}
