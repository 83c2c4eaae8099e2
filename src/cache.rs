/// cache.rs – Keyed cache of server responses.
///
/// Responsibilities:
///  - Serve a cached value immediately on repeat access
///  - Share one in-flight request between every consumer of a key
///  - Invalidate keys (by prefix) after a mutation succeeds
///  - Refetch polled resources on a fixed interval in a background task
///
/// Values of any type live side by side; each key is expected to be used
/// with a single value type.
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::errors::{ApiError, ApiResult};

type CachedValue = Arc<dyn Any + Send + Sync>;
type SharedFetch = Shared<BoxFuture<'static, ApiResult<CachedValue>>>;

// ---------------------------------------------------------------------------
// Keys and states
// ---------------------------------------------------------------------------

/// Composite key: resource name followed by its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    pub fn with(mut self, part: impl Into<String>) -> Self {
        self.0.push(part.into());
        self
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl<const N: usize> From<[&str; N]> for QueryKey {
    fn from(parts: [&str; N]) -> Self {
        Self::new(parts)
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// What a consumer sees for a key.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
    Loading,
    Error(String),
    Data(T),
}

impl<T> QueryState<T> {
    pub fn data(&self) -> Option<&T> {
        match self {
            QueryState::Data(v) => Some(v),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            QueryState::Error(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, QueryState::Loading)
    }
}

impl<T> From<ApiResult<T>> for QueryState<T> {
    fn from(result: ApiResult<T>) -> Self {
        match result {
            Ok(v) => QueryState::Data(v),
            Err(e) => QueryState::Error(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    /// Extra attempts after a failed fetch. Zero surfaces the first failure.
    pub retries: u32,
    /// Age after which cached data is refetched on access. `None` keeps data
    /// fresh until it is invalidated or refetched.
    pub stale_after: Option<Duration>,
}

// ---------------------------------------------------------------------------
// QueryCache
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Slot {
    data: Option<CachedValue>,
    error: Option<String>,
    fetched_at: Option<Instant>,
    stale: bool,
    /// Bumped by every invalidation; a request only refreshes the slot if
    /// the generation it started under is still current.
    generation: u64,
    in_flight: Option<InFlight>,
}

struct InFlight {
    id: u64,
    generation: u64,
    request: SharedFetch,
}

#[derive(Default)]
struct Inner {
    slots: Mutex<HashMap<QueryKey, Slot>>,
    options: CacheOptions,
    next_fetch: AtomicU64,
}

/// Cheap to clone; clones share the same entries.
#[derive(Clone, Default)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl QueryCache {
    pub fn new(options: CacheOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                options,
                ..Inner::default()
            }),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<QueryKey, Slot>> {
        self.inner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Return fresh cached data for *key*, or fetch it.
    pub async fn fetch<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> QueryState<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        if let Some(value) = self.fresh_data::<T>(key) {
            debug!(key = %key, "cache hit");
            return QueryState::Data(value);
        }
        self.run(key, fetcher).await
    }

    /// Fetch *key* regardless of freshness. Joins a request already in flight.
    pub async fn refetch<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> QueryState<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        self.run(key, fetcher).await
    }

    /// Run a mutating request and, when it succeeds, invalidate every key
    /// under each prefix in *invalidates*.
    pub async fn mutate<T, Fut>(&self, request: Fut, invalidates: &[QueryKey]) -> ApiResult<T>
    where
        Fut: Future<Output = ApiResult<T>>,
    {
        let result = request.await;
        if result.is_ok() {
            for prefix in invalidates {
                self.invalidate(prefix);
            }
        }
        result
    }

    /// Mark every key starting with *prefix* stale. Returns how many keys
    /// were affected.
    ///
    /// A request already in flight for an affected key is detached: its
    /// waiters still get its result, but the next read starts a new request
    /// and the old result is not stored.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let mut slots = self.slots();
        let mut count = 0;
        for (key, slot) in slots.iter_mut() {
            if key.starts_with(prefix) {
                slot.stale = true;
                slot.generation += 1;
                if slot.in_flight.take().is_some() {
                    debug!(key = %key, "detached in-flight request");
                }
                count += 1;
            }
        }
        debug!(prefix = %prefix, count, "invalidated");
        count
    }

    /// Current state of *key* without fetching.
    pub fn state<T>(&self, key: &QueryKey) -> QueryState<T>
    where
        T: Clone + 'static,
    {
        let slots = self.slots();
        let Some(slot) = slots.get(key) else {
            return QueryState::Loading;
        };
        if let Some(err) = &slot.error {
            return QueryState::Error(err.clone());
        }
        match slot.data.as_ref().map(|v| v.downcast_ref::<T>()) {
            Some(Some(v)) => QueryState::Data(v.clone()),
            Some(None) => QueryState::Error(type_mismatch(key)),
            None => QueryState::Loading,
        }
    }

    /// Last successfully fetched value, even if a later fetch failed.
    pub fn last_data<T>(&self, key: &QueryKey) -> Option<T>
    where
        T: Clone + 'static,
    {
        let slots = self.slots();
        slots
            .get(key)?
            .data
            .as_ref()?
            .downcast_ref::<T>()
            .cloned()
    }

    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.slots()
            .get(key)
            .map(|s| s.in_flight.is_some())
            .unwrap_or(false)
    }

    /// Refetch *key* every *every* in a background task and publish each
    /// resulting state. The task stops when the returned [`Poller`] drops.
    pub fn poll<T, F, Fut>(&self, key: QueryKey, every: Duration, fetcher: F) -> Poller<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        let (tx, rx) = watch::channel(self.state::<T>(&key));
        let cache = self.clone();
        let fetcher = Arc::new(fetcher);
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut first = true;
            loop {
                ticker.tick().await;
                let f = Arc::clone(&fetcher);
                let call = move || (*f)();
                let state = if first {
                    cache.fetch(&task_key, call).await
                } else {
                    cache.refetch(&task_key, call).await
                };
                first = false;
                if tx.send(state).is_err() {
                    debug!(key = %task_key, "poller has no subscribers – stopping");
                    break;
                }
            }
        });

        debug!(key = %key, every_ms = every.as_millis() as u64, "polling started");
        Poller { key, rx, handle }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn fresh_data<T>(&self, key: &QueryKey) -> Option<T>
    where
        T: Clone + 'static,
    {
        let slots = self.slots();
        let slot = slots.get(key)?;
        if slot.stale || slot.error.is_some() {
            return None;
        }
        if let (Some(max_age), Some(at)) = (self.inner.options.stale_after, slot.fetched_at) {
            if at.elapsed() > max_age {
                return None;
            }
        }
        slot.data.as_ref()?.downcast_ref::<T>().cloned()
    }

    async fn run<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> QueryState<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        let (id, request) = self.join_or_start(key, fetcher);
        let result = request.await;
        self.settle(key, id, &result);
        match result {
            Ok(value) => match value.downcast_ref::<T>() {
                Some(v) => QueryState::Data(v.clone()),
                None => QueryState::Error(type_mismatch(key)),
            },
            Err(e) => QueryState::Error(e.to_string()),
        }
    }

    fn join_or_start<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> (u64, SharedFetch)
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        let mut slots = self.slots();
        let slot = slots.entry(key.clone()).or_default();
        if let Some(flight) = &slot.in_flight {
            debug!(key = %key, "joining in-flight request");
            return (flight.id, flight.request.clone());
        }

        let id = self.inner.next_fetch.fetch_add(1, Ordering::Relaxed);
        let retries = self.inner.options.retries;
        let label = key.to_string();
        let request = async move {
            let mut attempt = 0u32;
            loop {
                match fetcher().await {
                    Ok(value) => return Ok(Arc::new(value) as CachedValue),
                    Err(e) if attempt < retries => {
                        attempt += 1;
                        warn!(key = %label, attempt, "fetch failed – retrying: {e}");
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        .boxed()
        .shared();

        slot.in_flight = Some(InFlight {
            id,
            generation: slot.generation,
            request: request.clone(),
        });
        (id, request)
    }

    /// Record the outcome of request *id*. Consumers that joined the same
    /// request find it already settled and leave the slot alone, as does a
    /// request detached by an invalidation.
    fn settle(&self, key: &QueryKey, id: u64, result: &ApiResult<CachedValue>) {
        let mut slots = self.slots();
        let Some(slot) = slots.get_mut(key) else {
            return;
        };
        let current = matches!(
            &slot.in_flight,
            Some(flight) if flight.id == id && flight.generation == slot.generation
        );
        if !current {
            return;
        }
        slot.in_flight = None;
        match result {
            Ok(value) => {
                slot.data = Some(Arc::clone(value));
                slot.error = None;
                slot.fetched_at = Some(Instant::now());
                slot.stale = false;
            }
            Err(e) => {
                warn!(key = %key, "fetch failed: {e}");
                slot.error = Some(e.to_string());
            }
        }
    }
}

fn type_mismatch(key: &QueryKey) -> String {
    ApiError::Payload(format!("cached value for '{key}' has an unexpected type")).to_string()
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

/// Handle to a polling task. Dropping it stops the task.
pub struct Poller<T> {
    key: QueryKey,
    rx: watch::Receiver<QueryState<T>>,
    handle: JoinHandle<()>,
}

impl<T: Clone> Poller<T> {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn current(&self) -> QueryState<T> {
        self.rx.borrow().clone()
    }

    /// Wait for the next published state. Returns `false` once the task ended.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

impl<T> Drop for Poller<T> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
