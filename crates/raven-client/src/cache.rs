use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::sync::broadcast;
use tracing::trace;

use crate::error::Result;

struct Entry<V> {
    value: V,
    stale: bool,
}

/// Keyed in-memory cache, the client's only shared mutable state.
///
/// Reads and optimistic patches are synchronous. Fetches for the same key
/// are funnelled through a per-key gate so concurrent readers share one
/// request. Invalidation marks an entry stale and notifies subscribers;
/// the next `get_or_fetch` re-fetches it in full. An invalidation that
/// lands while a fetch is in flight marks that fetch's result stale. Writes
/// are last resolved wins.
pub struct QueryCache<K, V> {
    entries: RwLock<HashMap<K, Entry<V>>>,
    gates: Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>,
    /// Bumped by every invalidation of a key, cached or not.
    generations: Mutex<HashMap<K, u64>>,
    invalidations: broadcast::Sender<K>,
}

impl<K, V> Default for QueryCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> QueryCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    pub fn new() -> Self {
        let (invalidations, _) = broadcast::channel(256);
        Self {
            entries: RwLock::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            generations: Mutex::new(HashMap::new()),
            invalidations,
        }
    }

    /// Cached value, stale or not.
    pub fn get(&self, key: &K) -> Option<V> {
        self.read().get(key).map(|e| e.value.clone())
    }

    pub fn get_fresh(&self, key: &K) -> Option<V> {
        self.read().get(key).filter(|e| !e.stale).map(|e| e.value.clone())
    }

    /// Read an entry in place without cloning it.
    pub fn with<R, F>(&self, key: &K, f: F) -> Option<R>
    where
        F: FnOnce(&V) -> R,
    {
        self.read().get(key).map(|e| f(&e.value))
    }

    pub fn contains(&self, key: &K) -> bool {
        self.read().contains_key(key)
    }

    pub fn is_stale(&self, key: &K) -> bool {
        self.read().get(key).is_some_and(|e| e.stale)
    }

    pub fn insert(&self, key: K, value: V) {
        self.write().insert(key, Entry { value, stale: false });
    }

    /// Replace an entry with a value built from the current one, clearing
    /// its stale flag. Runs under the write lock.
    pub fn replace_with<F>(&self, key: K, f: F)
    where
        F: FnOnce(Option<&V>) -> V,
    {
        let mut entries = self.write();
        let value = f(entries.get(&key).map(|e| &e.value));
        entries.insert(key, Entry { value, stale: false });
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.write().remove(key).map(|e| e.value)
    }

    /// Put back a snapshot taken with `get`: `None` removes the entry.
    pub fn restore(&self, key: K, snapshot: Option<V>) {
        match snapshot {
            Some(value) => self.insert(key, value),
            None => {
                self.remove(&key);
            }
        }
    }

    /// Patch an entry in place. Returns `None` if the key is not cached.
    pub fn update<R, F>(&self, key: &K, f: F) -> Option<R>
    where
        F: FnOnce(&mut V) -> R,
    {
        self.write().get_mut(key).map(|e| f(&mut e.value))
    }

    /// Patch an entry, inserting `init()` first if it is missing.
    pub fn upsert_with<R, I, F>(&self, key: K, init: I, f: F) -> R
    where
        I: FnOnce() -> V,
        F: FnOnce(&mut V) -> R,
    {
        let mut entries = self.write();
        let entry = entries.entry(key).or_insert_with(|| Entry {
            value: init(),
            stale: false,
        });
        f(&mut entry.value)
    }

    /// Patch every entry whose key matches.
    pub fn update_where<P, F>(&self, mut pred: P, mut f: F)
    where
        P: FnMut(&K) -> bool,
        F: FnMut(&mut V),
    {
        for (key, entry) in self.write().iter_mut() {
            if pred(key) {
                f(&mut entry.value);
            }
        }
    }

    /// Clone every entry whose key matches.
    pub fn entries_where<P>(&self, mut pred: P) -> Vec<(K, V)>
    where
        P: FnMut(&K) -> bool,
    {
        self.read()
            .iter()
            .filter(|(k, _)| pred(k))
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    pub fn keys(&self) -> Vec<K> {
        self.read().keys().cloned().collect()
    }

    /// Mark an entry stale and tell subscribers to re-fetch it.
    pub fn invalidate(&self, key: &K) {
        *self.generations().entry(key.clone()).or_default() += 1;
        if let Some(entry) = self.write().get_mut(key) {
            entry.stale = true;
        }
        trace!("Invalidated {:?}", key);
        let _ = self.invalidations.send(key.clone());
    }

    pub fn invalidate_where<P>(&self, mut pred: P)
    where
        P: FnMut(&K) -> bool,
    {
        // In-flight fetches count too: their key may not be cached yet.
        let mut keys: HashSet<K> = self.read().keys().cloned().collect();
        keys.extend(self.lock_gates().keys().cloned());
        keys.retain(|k| pred(k));
        for key in keys {
            self.invalidate(&key);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<K> {
        self.invalidations.subscribe()
    }

    /// Return the fresh cached value or fetch it. Concurrent callers for
    /// the same key wait for the first fetch instead of issuing their own.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(value) = self.get_fresh(&key) {
            return Ok(value);
        }

        let gate = self.gate(&key);
        let result = {
            let _permit = gate.lock().await;
            match self.get_fresh(&key) {
                Some(value) => Ok(value),
                None => {
                    let generation = self.generation(&key);
                    match fetch().await {
                        Ok(value) => {
                            let stale = self.generation(&key) != generation;
                            if stale {
                                trace!("{:?} invalidated while fetching", key);
                            }
                            self.write().insert(key.clone(), Entry { value: value.clone(), stale });
                            Ok(value)
                        }
                        Err(e) => Err(e),
                    }
                }
            }
        };

        self.release_gate(&key, gate);
        result
    }

    fn generation(&self, key: &K) -> u64 {
        self.generations().get(key).copied().unwrap_or(0)
    }

    fn generations(&self) -> MutexGuard<'_, HashMap<K, u64>> {
        self.generations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_gates(&self) -> MutexGuard<'_, HashMap<K, Arc<tokio::sync::Mutex<()>>>> {
        self.gates.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn gate(&self, key: &K) -> Arc<tokio::sync::Mutex<()>> {
        self.lock_gates()
            .entry(key.clone())
            .or_default()
            .clone()
    }

    fn release_gate(&self, key: &K, gate: Arc<tokio::sync::Mutex<()>>) {
        let mut gates = self.lock_gates();
        // Map + this handle: nobody else is waiting.
        if Arc::strong_count(&gate) <= 2 {
            gates.remove(key);
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<K, Entry<V>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<K, Entry<V>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_reads_share_one_fetch() {
        let cache: QueryCache<String, u32> = QueryCache::new();
        let counter = AtomicUsize::new(0);
        let fetches = &counter;

        let fetch = move || async move {
            fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(7)
        };

        let (a, b) = tokio::join!(
            cache.get_or_fetch("poll:p1".to_string(), fetch),
            cache.get_or_fetch("poll:p1".to_string(), fetch)
        );
        assert_eq!(a.unwrap(), 7);
        assert_eq!(b.unwrap(), 7);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidation_forces_refetch_and_notifies() {
        let cache: QueryCache<String, u32> = QueryCache::new();
        let mut rx = cache.subscribe();
        cache.insert("k".into(), 1);

        cache.invalidate(&"k".to_string());
        assert!(cache.is_stale(&"k".to_string()));
        assert_eq!(cache.get(&"k".to_string()), Some(1));
        assert_eq!(rx.recv().await.unwrap(), "k");

        let v = cache.get_or_fetch("k".into(), || async { Ok(2) }).await.unwrap();
        assert_eq!(v, 2);
        assert!(!cache.is_stale(&"k".to_string()));
    }

    #[tokio::test]
    async fn failed_fetch_leaves_cache_empty() {
        let cache: QueryCache<String, u32> = QueryCache::new();
        let err = cache
            .get_or_fetch("k".into(), || async { Err(ClientError::NotFound("k".into())) })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!cache.contains(&"k".to_string()));
    }

    #[tokio::test]
    async fn invalidation_during_fetch_is_kept() {
        let cache: QueryCache<String, u32> = QueryCache::new();
        let (started_tx, started) = tokio::sync::oneshot::channel::<()>();
        let (release, released) = tokio::sync::oneshot::channel::<()>();

        let first = cache.get_or_fetch("p1".into(), move || async move {
            let _ = started_tx.send(());
            let _ = released.await;
            Ok(1)
        });
        let change = async {
            started.await.unwrap();
            cache.invalidate(&"p1".to_string());
            release.send(()).unwrap();
        };
        let (value, ()) = tokio::join!(first, change);

        // The answer predates the change: usable, but re-fetched on next read.
        assert_eq!(value.unwrap(), 1);
        assert!(cache.is_stale(&"p1".to_string()));
        let next = cache.get_or_fetch("p1".into(), || async { Ok(2) }).await.unwrap();
        assert_eq!(next, 2);
        assert!(!cache.is_stale(&"p1".to_string()));
    }

    #[tokio::test]
    async fn predicate_invalidation_reaches_in_flight_keys() {
        let cache: QueryCache<String, u32> = QueryCache::new();
        let (started_tx, started) = tokio::sync::oneshot::channel::<()>();
        let (release, released) = tokio::sync::oneshot::channel::<()>();

        let first = cache.get_or_fetch("poll:p1".into(), move || async move {
            let _ = started_tx.send(());
            let _ = released.await;
            Ok(1)
        });
        let change = async {
            started.await.unwrap();
            cache.invalidate_where(|k| k.starts_with("poll:"));
            release.send(()).unwrap();
        };
        let _ = tokio::join!(first, change);
        assert!(cache.is_stale(&"poll:p1".to_string()));
    }

    #[test]
    fn replace_with_sees_the_old_value_and_clears_staleness() {
        let cache: QueryCache<&'static str, u32> = QueryCache::new();
        cache.insert("a", 1);
        cache.invalidate(&"a");
        cache.replace_with("a", |old| old.copied().unwrap_or(0) + 10);
        assert_eq!(cache.get_fresh(&"a"), Some(11));
    }

    #[test]
    fn restore_snapshot() {
        let cache: QueryCache<&'static str, Vec<u32>> = QueryCache::new();
        cache.insert("a", vec![1, 2, 3]);
        let snapshot = cache.get(&"a");
        cache.update(&"a", |v| v.retain(|x| *x != 2));
        assert_eq!(cache.get(&"a"), Some(vec![1, 3]));

        cache.restore("a", snapshot);
        assert_eq!(cache.get(&"a"), Some(vec![1, 2, 3]));

        cache.restore("b", None);
        assert!(!cache.contains(&"b"));
    }
}
