//! Stale-while-revalidate reads on top of [`ClientCache`].

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::cache::ClientCache;

const REVALIDATED_TOTAL: &str = "portfolio_client_cache_revalidated_total";

/// Result of a stale-while-revalidate read.
///
/// `value` is what the caller can render right away. When it came from the
/// cache a background refresh is running; its result lands in the cache and,
/// if it differs, on the watch channel returned by [`Revalidated::view`].
#[derive(Debug)]
pub struct Revalidated<T> {
    pub value: T,
    pub from_cache: bool,
    view: watch::Receiver<T>,
    refresh: Option<JoinHandle<()>>,
}

impl<T: Clone> Revalidated<T> {
    /// Live view of the value, updated once the background refresh finishes.
    pub fn view(&self) -> watch::Receiver<T> {
        self.view.clone()
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Wait for the background refresh (if any) and return the newest value.
    pub async fn settled(self) -> T {
        if let Some(handle) = self.refresh
            && let Err(err) = handle.await
        {
            warn!(
                target = "portfolio::client::revalidate",
                error = %err,
                "background refresh task failed"
            );
        }
        self.view.borrow().clone()
    }
}

/// Serve `key` from the cache when it is at most `max_age` old and refresh it
/// in the background; otherwise fetch synchronously and cache the result.
///
/// Only the synchronous fetch can fail the call. Background failures are
/// logged and leave the cached value in place.
pub async fn stale_while_revalidate<T, E, F, Fut>(
    cache: &Arc<ClientCache>,
    key: &str,
    max_age: Duration,
    fetch: F,
) -> Result<Revalidated<T>, E>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    E: Display + Send + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    if let Some(cached) = cache.get::<T>(key, max_age) {
        let (tx, view) = watch::channel(cached.clone());
        let generation = cache.generation();
        let refresh = tokio::spawn(refresh(
            Arc::clone(cache),
            key.to_string(),
            max_age,
            generation,
            fetch(),
            tx,
        ));
        return Ok(Revalidated {
            value: cached,
            from_cache: true,
            view,
            refresh: Some(refresh),
        });
    }

    let value = fetch().await?;
    cache.set(key, &value, max_age);
    let (_, view) = watch::channel(value.clone());
    Ok(Revalidated {
        value,
        from_cache: false,
        view,
        refresh: None,
    })
}

async fn refresh<T, E, Fut>(
    cache: Arc<ClientCache>,
    key: String,
    max_age: Duration,
    generation: u64,
    fetch: Fut,
    view: watch::Sender<T>,
) where
    T: Serialize + Send + Sync,
    E: Display,
    Fut: Future<Output = Result<T, E>>,
{
    let fresh = match fetch.await {
        Ok(fresh) => fresh,
        Err(err) => {
            warn!(
                target = "portfolio::client::revalidate",
                key = %key,
                error = %err,
                "background refresh failed; keeping cached value"
            );
            return;
        }
    };

    let encoded = match serde_json::to_value(&fresh) {
        Ok(encoded) => encoded,
        Err(err) => {
            warn!(
                target = "portfolio::client::revalidate",
                key = %key,
                error = %err,
                "refreshed value could not be encoded"
            );
            return;
        }
    };

    let previous = serde_json::to_value(&*view.borrow()).ok();
    let changed = previous.as_ref() != Some(&encoded);

    // restamp even when unchanged so the next read counts as fresh
    if !cache.set_value_since(&key, encoded, max_age, generation) {
        debug!(
            target = "portfolio::client::revalidate",
            key = %key,
            "cache invalidated during refresh; dropping refreshed value"
        );
        return;
    }

    if changed {
        counter!(REVALIDATED_TOTAL).increment(1);
        debug!(
            target = "portfolio::client::revalidate",
            key = %key,
            "cached value replaced by fresher response"
        );
        view.send_replace(fresh);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn miss_fetches_synchronously_and_caches() {
        let cache = Arc::new(ClientCache::new());

        let read = stale_while_revalidate(&cache, "skills", MINUTE, || async {
            Ok::<_, String>(vec!["rust".to_string()])
        })
        .await
        .expect("fetch");

        assert!(!read.from_cache);
        assert!(!read.is_refreshing());
        assert_eq!(read.value, vec!["rust".to_string()]);
        assert_eq!(
            cache.get::<Vec<String>>("skills", MINUTE),
            Some(vec!["rust".to_string()])
        );
    }

    #[tokio::test]
    async fn hit_returns_cached_value_then_publishes_fresh_one() {
        let cache = Arc::new(ClientCache::new());
        cache.set("projects", &1u32, MINUTE);

        let read = stale_while_revalidate(&cache, "projects", MINUTE, || async {
            tokio::task::yield_now().await;
            Ok::<_, String>(2u32)
        })
        .await
        .expect("read");

        assert!(read.from_cache);
        assert_eq!(read.value, 1);

        let mut view = read.view();
        assert_eq!(read.settled().await, 2);
        assert_eq!(*view.borrow_and_update(), 2);
        assert_eq!(cache.get::<u32>("projects", MINUTE), Some(2));
    }

    #[tokio::test]
    async fn unchanged_refresh_does_not_notify() {
        let cache = Arc::new(ClientCache::new());
        cache.set("info", &"same".to_string(), MINUTE);

        let read = stale_while_revalidate(&cache, "info", MINUTE, || async {
            Ok::<_, String>("same".to_string())
        })
        .await
        .expect("read");

        let view = read.view();
        assert_eq!(read.settled().await, "same");
        assert!(!view.borrow().has_changed());
    }

    #[tokio::test]
    async fn background_failure_keeps_stale_value() {
        let cache = Arc::new(ClientCache::new());
        cache.set("blog", &7u32, MINUTE);

        let read = stale_while_revalidate(&cache, "blog", MINUTE, || async {
            Err::<u32, _>("upstream down".to_string())
        })
        .await
        .expect("cached read never fails");

        assert_eq!(read.settled().await, 7);
        assert_eq!(cache.get::<u32>("blog", MINUTE), Some(7));
    }

    #[tokio::test]
    async fn refresh_does_not_resurrect_invalidated_entry() {
        let cache = Arc::new(ClientCache::new());
        cache.set("blog:hello", &1u32, MINUTE);
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let read = stale_while_revalidate(&cache, "blog:hello", MINUTE, move || async move {
            let _ = release_rx.await;
            Ok::<_, String>(2u32)
        })
        .await
        .expect("cached read");
        assert!(read.from_cache);

        let pattern = regex::Regex::new("^blog(:|$)").expect("regex");
        assert_eq!(cache.invalidate_pattern(&pattern), 1);
        let _ = release_tx.send(());

        assert_eq!(read.settled().await, 1, "view keeps the pre-invalidation value");
        assert!(cache.is_empty(), "refresh must not write the entry back");
    }

    #[tokio::test]
    async fn miss_propagates_fetch_error() {
        let cache = Arc::new(ClientCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);

        let result = stale_while_revalidate(&cache, "blog", MINUTE, move || async move {
            counted.fetch_add(1, Ordering::SeqCst);
            Err::<u32, _>("boom".to_string())
        })
        .await;

        assert_eq!(result.err().as_deref(), Some("boom"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_empty());
    }
}
