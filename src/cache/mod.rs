//! Get-or-refresh cache over a remote fetch.
//!
//! Repeated reads inside the debounce window are served from memory, concurrent
//! reads share one fetch, and every successful fetch schedules the next
//! background refresh at the deadline the value itself asks for.

mod traits;

pub use traits::{ChangeHandler, Clock, Fetch, Polled, SystemClock};

use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use futures_util::future::BoxFuture;
use snafu::prelude::*;
use tokio::{sync::Mutex, time::Instant};

use crate::{
    scheduler::{Scheduler, TimerHandle, TimerSlot},
    sink::{ErrorSink, LogSink},
    BoxError, Error,
};

/// Default debounce window
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(3);

/// Error when fetch the remote value
#[derive(Debug, Snafu)]
#[snafu(display("fetch {cache} failed: {source}"))]
pub struct FetchError {
    /// cache name
    pub cache: String,
    /// source error
    pub source: BoxError,
}

#[derive(Debug)]
struct CacheEntry<T> {
    value: Option<T>,
    fetched_at: Option<Instant>,
    refresh: TimerSlot,
}

struct Inner<T> {
    name: String,
    fetcher: Box<dyn Fetch<T>>,
    on_change: Option<Box<dyn ChangeHandler<T>>>,
    errors: Arc<dyn ErrorSink>,
    clock: Arc<dyn Clock>,
    scheduler: Scheduler,
    debounce: Duration,
    /// bumped after every fetch attempt, read before waiting on the entry lock
    generation: AtomicU64,
    entry: Mutex<CacheEntry<T>>,
}

/// Cache of one polled value, cheap to clone
pub struct PollCache<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for PollCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for PollCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollCache")
            .field("name", &self.inner.name)
            .field("debounce", &self.inner.debounce)
            .field("generation", &self.inner.generation.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Builder of [`PollCache`]
pub struct PollCacheBuilder<T> {
    name: String,
    fetcher: Box<dyn Fetch<T>>,
    on_change: Option<Box<dyn ChangeHandler<T>>>,
    errors: Arc<dyn ErrorSink>,
    clock: Arc<dyn Clock>,
    scheduler: Option<Scheduler>,
    debounce: Duration,
}

impl<T> Debug for PollCacheBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollCacheBuilder")
            .field("name", &self.name)
            .field("debounce", &self.debounce)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl<T: Polled> PollCacheBuilder<T> {
    /// Change notification subscriber
    pub fn on_change<H: ChangeHandler<T>>(mut self, handler: H) -> Self {
        self.on_change = Some(Box::new(handler));
        self
    }

    /// Where failed background refreshes and subscriber errors go, defaults to [`LogSink`]
    pub fn error_sink(mut self, errors: Arc<dyn ErrorSink>) -> Self {
        self.errors = errors;
        self
    }

    /// Wall clock used by refresh rules, defaults to [`SystemClock`]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Scheduler running refresh timers, defaults to the current runtime
    pub fn scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Debounce window, defaults to [`DEFAULT_DEBOUNCE`]
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Build the cache.
    ///
    /// # Panics
    ///
    /// Panics outside of a tokio runtime when no scheduler was given.
    pub fn build(self) -> PollCache<T> {
        PollCache {
            inner: Arc::new(Inner {
                name: self.name,
                fetcher: self.fetcher,
                on_change: self.on_change,
                errors: self.errors,
                clock: self.clock,
                scheduler: self.scheduler.unwrap_or_else(Scheduler::current),
                debounce: self.debounce,
                generation: AtomicU64::new(0),
                entry: Mutex::new(CacheEntry {
                    value: None,
                    fetched_at: None,
                    refresh: TimerSlot::default(),
                }),
            }),
        }
    }
}

impl<T: Polled> PollCache<T> {
    /// Start building a cache named `name` (used in logs and errors)
    pub fn builder<S, F>(name: S, fetcher: F) -> PollCacheBuilder<T>
    where
        S: Into<String>,
        F: Fetch<T>,
    {
        PollCacheBuilder {
            name: name.into(),
            fetcher: Box::new(fetcher),
            on_change: None,
            errors: Arc::new(LogSink),
            clock: Arc::new(SystemClock),
            scheduler: None,
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    /// Cache name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Get the value, fetching it unless it was fetched inside the debounce window.
    ///
    /// `force` skips the debounce window. Callers arriving while a fetch is in
    /// flight share its outcome. A fetch error is returned only to the caller that
    /// started the fetch, and leaves the cached value and refresh timer untouched.
    pub async fn get(&self, force: bool) -> Result<Option<T>, FetchError> {
        let inner = &self.inner;
        let seen = inner.generation.load(Ordering::Acquire);

        let mut entry = inner.entry.lock().await;

        if inner.generation.load(Ordering::Acquire) != seen {
            log::trace!("Cache {} fetched while waiting, reuse", inner.name);
            return Ok(entry.value.clone());
        }

        if !force {
            if let Some(fetched_at) = entry.fetched_at {
                if fetched_at.elapsed() < inner.debounce {
                    log::trace!("Cache {} inside debounce window", inner.name);
                    return Ok(entry.value.clone());
                }
            }
        }

        log::debug!("Cache {} fetching, forced: {}", inner.name, force);

        let result = inner.fetcher.fetch().await;
        inner.generation.fetch_add(1, Ordering::AcqRel);

        let value = match result {
            Err(source) => {
                log::warn!("Cache {} fetch failed: {}", inner.name, source);
                return Err(FetchError {
                    cache: inner.name.clone(),
                    source,
                });
            }
            Ok(None) => {
                log::debug!("Cache {} got nothing, keep previous value", inner.name);
                return Ok(entry.value.clone());
            }
            Ok(Some(value)) => value,
        };

        let changed = entry
            .value
            .as_ref()
            .map_or(true, |old| !old.is_same(&value));

        if changed {
            log::info!("Cache {} value changed", inner.name);
            if let Some(handler) = &inner.on_change {
                if let Err(source) = handler.on_change(&value).await {
                    let err = Error::SubscriberFailed {
                        callback: format!("{} on_change", inner.name),
                        source,
                    };
                    log::error!("{}", err);
                    inner.errors.report(&err).await;
                }
            }
        }

        let delay = value.refresh_in(inner.clock.now());
        entry.value = Some(value.clone());
        entry.fetched_at = Some(Instant::now());
        entry.refresh.replace(self.schedule_refresh(delay));

        Ok(Some(value))
    }

    /// Schedule a background refresh after `delay` without fetching now.
    ///
    /// Replaces the pending refresh, if any.
    pub async fn refresh_after(&self, delay: Duration) {
        let handle = self.schedule_refresh(delay);
        self.inner.entry.lock().await.refresh.replace(handle);
    }

    /// Cached value, never fetches
    pub async fn cached(&self) -> Option<T> {
        self.inner.entry.lock().await.value.clone()
    }

    /// When the pending background refresh fires
    pub async fn next_refresh(&self) -> Option<Instant> {
        self.inner.entry.lock().await.refresh.deadline()
    }

    fn schedule_refresh(&self, delay: Duration) -> TimerHandle {
        log::debug!("Cache {} next refresh in {:?}", self.inner.name, delay);

        let weak = Arc::downgrade(&self.inner);
        self.inner
            .scheduler
            .after(delay, move || background_refresh(weak))
    }
}

fn background_refresh<T: Polled>(weak: Weak<Inner<T>>) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        let inner = match weak.upgrade() {
            Some(inner) => inner,
            None => return,
        };
        let cache = PollCache { inner };

        if let Err(source) = cache.get(true).await {
            let err = Error::RefreshFailed { source };
            log::error!("{}", err);
            cache.inner.errors.report(&err).await;
        }
    })
}
