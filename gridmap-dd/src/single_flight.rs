//! Single-flight memoization
//!
//! At most one computation runs per key. The first caller installs a pending
//! cell and computes; concurrent callers for the same key await that cell
//! instead of polling. Successful results are memoized until [`SingleFlight::clear`];
//! failures are not, so the next caller for that key computes again.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

pub struct SingleFlight<K, V> {
    cells: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }

    /// Return the memoized value for `key`, computing it with `init` if no
    /// other caller has.
    ///
    /// The map lock is held only to look up or install the key's cell, never
    /// across `init`, so different keys resolve independently.
    pub async fn resolve<F, Fut, E>(&self, key: K, init: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = {
            let mut cells = self.cells.lock().await;
            cells.entry(key).or_insert_with(|| Arc::new(OnceCell::new())).clone()
        };

        cell.get_or_try_init(init).await.cloned()
    }

    /// Memoized value for `key`, if any
    pub async fn get(&self, key: &K) -> Option<V> {
        let cells = self.cells.lock().await;
        cells.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Number of memoized values
    pub async fn len(&self) -> usize {
        let cells = self.cells.lock().await;
        cells.values().filter(|cell| cell.initialized()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Forget every memoized value
    pub async fn clear(&self) {
        self.cells.lock().await.clear();
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
