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

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

/// Coalesces concurrent calls for the same key into a single execution of
/// the wrapped future: every caller in the cohort observes the same result,
/// and the wrapped future runs exactly once per cohort.
pub struct SingleFlight<T> {
    calls: Arc<Mutex<HashMap<String, broadcast::Sender<T>>>>,
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Runs `fut_factory()` at most once for `key` across the current
    /// cohort of concurrent callers; every caller gets a clone of the result.
    pub async fn run<F, Fut>(&self, key: &str, fut_factory: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut rx = {
            let mut calls = self.calls.lock();
            if let Some(tx) = calls.get(key) {
                tx.subscribe()
            } else {
                let (tx, rx) = broadcast::channel(1);
                calls.insert(key.to_string(), tx);
                drop(calls);
                let result = fut_factory().await;
                let mut calls = self.calls.lock();
                if let Some(tx) = calls.remove(key) {
                    // Ignore send errors: no receivers means no one was
                    // waiting, which is fine for the caller that owns `result`.
                    let _ = tx.send(result.clone());
                }
                return result;
            }
        };
        rx.recv().await.expect("single-flight sender dropped without sending")
    }
}

impl<T> Clone for SingleFlight<T> {
    fn clone(&self) -> Self {
        Self {
            calls: self.calls.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn concurrent_callers_coalesce_into_one_execution() {
        let sf: SingleFlight<Result<u32, String>> = SingleFlight::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..1000 {
            let sf = sf.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                sf.run("shared-key", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    Ok(42)
                })
                .await
            }));
        }

        for h in handles {
            assert_eq!(h.await.unwrap(), Ok(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn subsequent_cohort_runs_again() {
        let sf: SingleFlight<u32> = SingleFlight::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = sf
            .run("k", || {
                let calls = calls.clone();
                async move { calls.fetch_add(1, Ordering::SeqCst) as u32 }
            })
            .await;
        let second = sf
            .run("k", || {
                let calls = calls.clone();
                async move { calls.fetch_add(1, Ordering::SeqCst) as u32 }
            })
            .await;

        assert_eq!(first, 0);
        assert_eq!(second, 1);
    }
}
