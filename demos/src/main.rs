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

//! Single-process walkthrough of the `scores` loader from the upstream
//! project's own demo: a `Group` backed by an in-memory map, fetched by
//! four concurrent callers to show single-flight coalescing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use ringcache_common::GroupError;
use ringcache_core::group::{Getter, Group};
use tracing::info;

struct ScoresDb {
    scores: HashMap<String, String>,
    lookups: AtomicUsize,
}

#[async_trait]
impl Getter for ScoresDb {
    async fn get(&self, key: &str) -> Result<Option<(Vec<u8>, Option<Instant>)>, GroupError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        info!(%key, "slow db lookup");
        Ok(self.scores.get(key).map(|v| (v.clone().into_bytes(), None)))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let db = Arc::new(ScoresDb {
        scores: HashMap::from([
            ("Tom".to_string(), "630".to_string()),
            ("Tom1".to_string(), "631".to_string()),
            ("Tom2".to_string(), "632".to_string()),
        ]),
        lookups: AtomicUsize::new(0),
    });

    let group = Arc::new(Group::new("scores", db.clone(), 2 << 10));

    info!("ring-cache demo running locally (no peers)");

    let mut handles = Vec::new();
    for _ in 0..4 {
        let group = group.clone();
        handles.push(tokio::spawn(async move { group.get("Tom").await }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        match handle.await.unwrap() {
            Ok(value) => println!("caller {i}: Tom = {value}"),
            Err(err) => println!("caller {i}: error: {err}"),
        }
    }

    println!("slow db was consulted {} time(s) for 4 concurrent callers", db.lookups.load(Ordering::SeqCst));

    match group.get("missing").await {
        Ok(_) => unreachable!(),
        Err(err) => println!("expected miss: {err}"),
    }
}
