use std::{fmt::Debug, future::Future, time::Duration};

use chrono::{DateTime, Utc};

use crate::{gateway::HandlerResult, BoxError};

/// Value tracked by a [`PollCache`](super::PollCache)
pub trait Polled: Clone + Send + Sync + 'static {
    /// Identity comparison, `on_change` fires when this returns false
    fn is_same(&self, other: &Self) -> bool;

    /// When the value should be fetched again, given the current wall time
    fn refresh_in(&self, now: DateTime<Utc>) -> Duration;
}

/// Remote source of a polled value, `Ok(None)` means nothing to report right now
#[async_trait::async_trait]
pub trait Fetch<T>: Send + Sync + 'static {
    /// fetch the current value
    async fn fetch(&self) -> Result<Option<T>, BoxError>;
}

#[async_trait::async_trait]
impl<T, F, Fut> Fetch<T> for F
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<T>, BoxError>> + Send,
{
    async fn fetch(&self) -> Result<Option<T>, BoxError> {
        self().await
    }
}

/// Subscriber notified when a fetched value differs from the cached one
#[async_trait::async_trait]
pub trait ChangeHandler<T>: Send + Sync + 'static {
    /// called with the new value before it is returned to the caller
    async fn on_change(&self, value: &T) -> HandlerResult;
}

#[async_trait::async_trait]
impl<T, F, Fut> ChangeHandler<T> for F
where
    T: Polled,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn on_change(&self, value: &T) -> HandlerResult {
        self(value.clone()).await
    }
}

/// Wall clock source
pub trait Clock: Debug + Send + Sync + 'static {
    /// current time
    fn now(&self) -> DateTime<Utc>;
}

/// [`Clock`] reading the system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
