//! Time-bounded memoisation of expensive producers.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::clock::Clock;
use crate::domain::error::Result;

pub const DEFAULT_TTL_SECS: i64 = 60 * 60;

/// Per-key cache whose entries expire `ttl` after they were produced.
///
/// Lookups take the read lock. On a miss or expiry the write lock is taken
/// and freshness re-checked before the producer runs, so concurrent callers
/// racing on the same expiry trigger a single recomputation. Producer errors
/// are returned to the caller and never stored.
pub struct FreshnessCache<K, V> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<K, (DateTime<Utc>, V)>>,
}

impl<K, V> FreshnessCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn fresh<'a>(&self, entry: Option<&'a (DateTime<Utc>, V)>) -> Option<&'a V> {
        let (produced_at, value) = entry?;
        (self.clock.now() - *produced_at < self.ttl).then_some(value)
    }

    pub async fn get_or_refresh<F, Fut>(&self, key: &K, producer: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        {
            let entries = self.entries.read().await;
            if let Some(value) = self.fresh(entries.get(key)) {
                return Ok(value.clone());
            }
        }

        let mut entries = self.entries.write().await;
        if let Some(value) = self.fresh(entries.get(key)) {
            return Ok(value.clone());
        }

        debug!("recomputing expired cache entry");
        let value = producer().await?;
        entries.insert(key.clone(), (self.clock.now(), value.clone()));
        Ok(value)
    }

    pub async fn invalidate(&self, key: &K) {
        self.entries.write().await.remove(key);
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::SvcstatError;
    use crate::fakes::FakeClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache(clock: Arc<FakeClock>) -> FreshnessCache<String, usize> {
        FreshnessCache::new(Duration::seconds(DEFAULT_TTL_SECS), clock)
    }

    #[tokio::test]
    async fn serves_fresh_entries_and_recomputes_after_ttl() {
        let clock = Arc::new(FakeClock::default());
        let cache = cache(clock.clone());
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let key = "int".to_string();
        let produce = move || async move {
            Ok::<_, SvcstatError>(calls.fetch_add(1, Ordering::SeqCst) + 1)
        };

        assert_eq!(cache.get_or_refresh(&key, produce).await.unwrap(), 1);
        clock.advance(Duration::minutes(59));
        assert_eq!(cache.get_or_refresh(&key, produce).await.unwrap(), 1);
        clock.advance(Duration::minutes(2));
        assert_eq!(cache.get_or_refresh(&key, produce).await.unwrap(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache = cache(Arc::new(FakeClock::default()));
        let key = "stg".to_string();
        let err = cache
            .get_or_refresh(&key, || async { Err(SvcstatError::Git("boom".to_string())) })
            .await;
        assert!(err.is_err());
        let ok = cache.get_or_refresh(&key, || async { Ok(7) }).await.unwrap();
        assert_eq!(ok, 7);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_recomputation() {
        let cache = Arc::new(cache(Arc::new(FakeClock::default())));
        let calls = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_refresh(&"prod".to_string(), || async move {
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok(calls.fetch_add(1, Ordering::SeqCst))
                    })
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), 0);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_recompute() {
        let cache = cache(Arc::new(FakeClock::default()));
        let key = "int".to_string();
        cache.get_or_refresh(&key, || async { Ok(1) }).await.unwrap();
        cache.invalidate(&key).await;
        let value = cache.get_or_refresh(&key, || async { Ok(2) }).await.unwrap();
        assert_eq!(value, 2);
    }
}
