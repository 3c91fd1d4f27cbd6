//! Lazily-initialized, single-flight cache for the backing store connection.
//!
//! The service opens one connection pool per process, on first demand rather
//! than at startup. Concurrent first-time callers must not each dial the
//! database: the first caller stores the in-flight attempt in shared state
//! before its first await point, and every later caller joins that same
//! attempt via a [`Shared`] future. A failed attempt clears the slot so the
//! next request retries from scratch; the failure itself is delivered to
//! every caller that was waiting on it.
//!
//! The cache is generic over the handle type so the single-flight behavior
//! can be exercised without a live database. Production code uses
//! [`ConnectionCache::postgres`], which connects a [`PgPool`] and runs the
//! crate migrations as part of establishment.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use sqlx::PgPool;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

type Factory<T> = dyn Fn() -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync;
type Attempt<T> = Shared<BoxFuture<'static, Result<T, Arc<anyhow::Error>>>>;

/// Memoized, single-flight accessor for the backing store handle.
pub struct ConnectionCache<T: Clone> {
    factory: Arc<Factory<T>>,
    state: Mutex<CacheState<T>>,
}

struct CacheState<T: Clone> {
    handle: Option<T>,
    pending: Option<Attempt<T>>,
}

impl<T> ConnectionCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a cache around an establishment factory.
    ///
    /// The factory is invoked at most once per establishment attempt,
    /// however many callers are waiting.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            state: Mutex::new(CacheState {
                handle: None,
                pending: None,
            }),
        }
    }

    /// Return the cached handle, joining or starting an establishment
    /// attempt as needed.
    pub async fn acquire(&self) -> anyhow::Result<T> {
        let attempt = {
            let mut state = self.state.lock().await;
            if let Some(handle) = &state.handle {
                return Ok(handle.clone());
            }

            match &state.pending {
                Some(pending) => {
                    debug!("joining in-flight connection attempt");
                    pending.clone()
                }
                None => {
                    // The attempt must land in the shared slot before this
                    // task first suspends, so late arrivals join it instead
                    // of dialing again.
                    let attempt = (self.factory)().map(|res| res.map_err(Arc::new)).boxed().shared();
                    state.pending = Some(attempt.clone());
                    attempt
                }
            }
        };

        match attempt.clone().await {
            Ok(handle) => {
                let mut state = self.state.lock().await;
                state.handle = Some(handle.clone());
                if state.pending.as_ref().is_some_and(|p| p.ptr_eq(&attempt)) {
                    state.pending = None;
                }
                Ok(handle)
            }
            Err(err) => {
                // Clear only our own attempt: a newer one may already be in
                // the slot if another caller retried first.
                let mut state = self.state.lock().await;
                if state.pending.as_ref().is_some_and(|p| p.ptr_eq(&attempt)) {
                    state.pending = None;
                }
                Err(anyhow::anyhow!("database connection failed: {err:#}"))
            }
        }
    }
}

impl ConnectionCache<PgPool> {
    /// Cache that connects to PostgreSQL and runs migrations on first use.
    #[instrument(skip_all)]
    pub fn postgres(database_url: String) -> Self {
        Self::new(move || {
            let url = database_url.clone();
            async move {
                info!("Establishing database connection");
                let pool = PgPool::connect(&url).await?;
                crate::migrator().run(&pool).await?;
                Ok(pool)
            }
            .boxed()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Factory that counts its invocations and parks until released.
    fn gated_counting_cache(calls: Arc<AtomicUsize>, gate: Arc<Notify>, fail: bool) -> ConnectionCache<usize> {
        ConnectionCache::new(move || {
            let calls = calls.clone();
            let gate = gate.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                gate.notified().await;
                if fail {
                    anyhow::bail!("establishment failed");
                }
                Ok(n)
            }
            .boxed()
        })
    }

    #[test_log::test(tokio::test)]
    async fn concurrent_callers_share_one_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());
        let cache = Arc::new(gated_counting_cache(calls.clone(), gate.clone(), false));

        let a = tokio::spawn({
            let cache = cache.clone();
            async move { cache.acquire().await.unwrap() }
        });
        let b = tokio::spawn({
            let cache = cache.clone();
            async move { cache.acquire().await.unwrap() }
        });

        // Let both callers reach the pending attempt, then release it.
        tokio::time::sleep(Duration::from_millis(50)).await;
        gate.notify_waiters();

        assert_eq!(a.await.unwrap(), 1);
        assert_eq!(b.await.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1, "only one establishment may run");
    }

    #[test_log::test(tokio::test)]
    async fn cached_handle_skips_the_factory() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = ConnectionCache::new({
            let calls = calls.clone();
            move || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, anyhow::Error>(7usize)
                }
                .boxed()
            }
        });

        assert_eq!(cache.acquire().await.unwrap(), 7);
        assert_eq!(cache.acquire().await.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test_log::test(tokio::test)]
    async fn failure_reaches_every_waiter_and_is_not_sticky() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());
        let should_fail = Arc::new(AtomicUsize::new(1));

        let cache = Arc::new(ConnectionCache::new({
            let calls = calls.clone();
            let gate = gate.clone();
            let should_fail = should_fail.clone();
            move || {
                let calls = calls.clone();
                let gate = gate.clone();
                let should_fail = should_fail.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    gate.notified().await;
                    if should_fail.load(Ordering::SeqCst) == 1 {
                        anyhow::bail!("establishment failed");
                    }
                    Ok(n)
                }
                .boxed()
            }
        }));

        let a = tokio::spawn({
            let cache = cache.clone();
            async move { cache.acquire().await }
        });
        let b = tokio::spawn({
            let cache = cache.clone();
            async move { cache.acquire().await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        gate.notify_waiters();

        assert!(a.await.unwrap().is_err());
        assert!(b.await.unwrap().is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The failed attempt must not poison the cache: the next call
        // starts a fresh establishment.
        should_fail.store(0, Ordering::SeqCst);
        let next = tokio::spawn({
            let cache = cache.clone();
            async move { cache.acquire().await.unwrap() }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        gate.notify_waiters();

        assert_eq!(next.await.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
