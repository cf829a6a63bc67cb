//! Request de-duplication
//!
//! One cell per key. The first caller runs the initializer; callers arriving
//! while it is in flight await the same cell and observe its value. Values
//! are kept for the life of the cache. A failed initialization leaves the
//! cell empty so a later call can retry.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use smol::lock::OnceCell;

#[derive(Debug)]
pub struct InflightCache<K, V> {
    cells: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> Default for InflightCache<K, V> {
    fn default() -> Self {
        Self { cells: Mutex::new(HashMap::new()) }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> InflightCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, key: &K) -> Arc<OnceCell<V>> {
        let mut cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
        cells.entry(key.clone()).or_insert_with(|| Arc::new(OnceCell::new())).clone()
    }

    /// Value for `key`, running `init` only if no value exists and no other
    /// caller is already producing one.
    pub async fn get_or_try_init<E, F, Fut>(&self, key: K, init: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = self.cell(&key);
        cell.get_or_try_init(init).await.cloned()
    }

    /// Completed value, if any
    pub fn get(&self, key: &K) -> Option<V> {
        let cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
        cells.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Keys with a completed value
    pub fn len(&self) -> usize {
        let cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
        cells.values().filter(|cell| cell.is_initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_concurrent_callers_share_one_init() {
        let cache: Arc<InflightCache<&'static str, u32>> = Arc::new(InflightCache::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let values = smol::block_on(async {
            let tasks: Vec<_> = (0..4)
                .map(|_| {
                    let cache = cache.clone();
                    let runs = runs.clone();
                    smol::spawn(async move {
                        cache
                            .get_or_try_init("bucket", || async move {
                                runs.fetch_add(1, Ordering::SeqCst);
                                smol::Timer::after(std::time::Duration::from_millis(10)).await;
                                Ok::<_, ()>(7)
                            })
                            .await
                    })
                })
                .collect();
            let mut values = Vec::new();
            for task in tasks {
                values.push(task.await.unwrap());
            }
            values
        });

        assert_eq!(values, vec![7; 4]);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get(&"bucket"), Some(7));
    }

    #[test]
    fn test_failure_is_not_memoized() {
        let cache: InflightCache<u32, u32> = InflightCache::new();
        let first = smol::block_on(cache.get_or_try_init(1, || async { Err::<u32, _>("offline") }));
        assert_eq!(first, Err("offline"));
        assert!(cache.is_empty());

        let second = smol::block_on(cache.get_or_try_init(1, || async { Ok::<_, &str>(3) }));
        assert_eq!(second, Ok(3));
        assert_eq!(cache.len(), 1);
    }
}
