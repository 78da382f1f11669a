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

//! The generic server binary's default [`Getter`]: a static key/value table
//! loaded once from a JSON seed file at startup, the file-backed analog of
//! the in-memory `scores` map the original demo wires by hand.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;
use ringcache_common::GroupError;
use ringcache_core::group::Getter;

/// Serves values out of a fixed table read once at startup. Keys absent from
/// the table are a terminal miss, not an error.
pub struct StaticMapGetter {
    table: HashMap<String, Vec<u8>>,
}

impl StaticMapGetter {
    pub fn empty() -> Self {
        Self { table: HashMap::new() }
    }

    /// Loads `{key: value}` string pairs from `path` as the backing store.
    pub fn from_seed_file(path: &Path) -> Result<Self, GroupError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| GroupError::Loader(format!("reading seed file {}: {e}", path.display())))?;
        let raw: HashMap<String, String> = serde_json::from_str(&contents)
            .map_err(|e| GroupError::Loader(format!("parsing seed file {}: {e}", path.display())))?;
        let table = raw.into_iter().map(|(k, v)| (k, v.into_bytes())).collect();
        Ok(Self { table })
    }
}

#[async_trait]
impl Getter for StaticMapGetter {
    async fn get(&self, key: &str) -> Result<Option<(Vec<u8>, Option<Instant>)>, GroupError> {
        Ok(self.table.get(key).map(|v| (v.clone(), None)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_keys_present_in_the_seed_file() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("ringcache-seed-test-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"alice": "100", "bob": "200"}"#).unwrap();

        let getter = StaticMapGetter::from_seed_file(&path).unwrap();
        assert_eq!(getter.get("alice").await.unwrap().unwrap().0, b"100");
        assert!(getter.get("carol").await.unwrap().is_none());

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn empty_table_misses_every_key() {
        let getter = StaticMapGetter::empty();
        assert!(getter.get("anything").await.unwrap().is_none());
    }
}
