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

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use ringcache_common::addr::is_valid_peer_addr;
use ringcache_common::ServerError;

/// Virtual-node replica count the server binary wires by default, larger
/// than the library default of 50 to spread load more evenly across a
/// real cluster.
const DEFAULT_SERVER_REPLICAS: usize = 150;

#[derive(Parser, Debug, Clone)]
#[command(name = "ringcache-server", about = "Distributed in-memory cache node")]
pub struct Config {
    /// Address this node listens on and advertises to peers, `host:port`.
    #[arg(long)]
    pub addr: String,

    /// Logical service name peers discover each other under.
    #[arg(long, default_value = "ring-cache")]
    pub service_name: String,

    /// Comma-separated etcd endpoints.
    #[arg(long, value_delimiter = ',')]
    pub etcd_endpoints: Vec<String>,

    /// Virtual nodes per peer in the consistent-hash ring.
    #[arg(long, default_value_t = DEFAULT_SERVER_REPLICAS)]
    pub replicas: usize,

    /// Byte budget for each group's local cache.
    #[arg(long, default_value_t = 64 * 1024 * 1024)]
    pub group_cache_bytes: usize,

    /// Name of the group this node serves.
    #[arg(long, default_value = "default")]
    pub group_name: String,

    /// Path to a JSON object of `{key: value}` strings used as the group's
    /// backing store; keys not present in the file are a cache miss.
    /// Omitting this runs the group with an empty backing store.
    #[arg(long)]
    pub seed_file: Option<PathBuf>,

    /// How often the TTL sweeper scans for expired keys.
    #[arg(long, default_value = "1h", value_parser = parse_duration)]
    pub sweep_interval: Duration,

    /// How often the peer picker re-lists the coordination store as a
    /// full-sync safety net behind the incremental watch.
    #[arg(long, default_value = "5m", value_parser = parse_duration)]
    pub full_sync_interval: Duration,

    /// `tracing-subscriber` env-filter directive, e.g. `info` or `ringcache=debug`.
    #[arg(long, default_value = "info")]
    pub log_filter: String,
}

impl Config {
    pub fn validate(&self) -> Result<(), ServerError> {
        if !is_valid_peer_addr(&self.addr) {
            return Err(ServerError::InvalidAddress(self.addr.clone()));
        }
        Ok(())
    }
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    let (value, unit) = s.split_at(s.len() - 1);
    let value: u64 = value.parse().map_err(|_| format!("invalid duration: {s}"))?;
    match unit {
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        _ => Err(format!("unknown duration unit in {s}, expected s/m/h suffix")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hour_minute_second_suffixes() {
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn rejects_address_missing_port() {
        let cfg = Config {
            addr: "localhost".into(),
            service_name: "ring-cache".into(),
            etcd_endpoints: vec![],
            replicas: DEFAULT_SERVER_REPLICAS,
            group_cache_bytes: 1024,
            group_name: "default".into(),
            seed_file: None,
            sweep_interval: Duration::from_secs(3600),
            full_sync_interval: Duration::from_secs(300),
            log_filter: "info".into(),
        };
        assert!(cfg.validate().is_err());
    }
}
