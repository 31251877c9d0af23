//! Cancellable one-shot timers shared by the gateway heartbeat and the poll caches.

use std::{
    fmt::Debug,
    future::Future,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{runtime::Handle, task::AbortHandle, time::Instant};

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// Timer facility, every timer created by one scheduler runs on the same runtime.
#[derive(Debug, Clone)]
pub struct Scheduler {
    runtime: Handle,
}

impl Scheduler {
    /// Create a scheduler bound to the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn current() -> Self {
        Self {
            runtime: Handle::current(),
        }
    }

    /// Create a scheduler bound to the given runtime.
    pub fn with_runtime(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Run `callback` after `delay`, unless the returned handle is cancelled first.
    pub fn after<F, Fut>(&self, delay: Duration, callback: F) -> TimerHandle
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let deadline = Instant::now() + delay;
        let state = Arc::new(AtomicU8::new(PENDING));
        let task_state = Arc::clone(&state);

        log::trace!("Schedule timer in {:?}", delay);

        let task = self.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;

            if task_state
                .compare_exchange(PENDING, FIRED, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                log::trace!("Timer cancelled right before firing");
                return;
            }

            callback().await
        });

        TimerHandle {
            deadline,
            state,
            abort: task.abort_handle(),
        }
    }
}

/// Handle of a scheduled timer.
///
/// Dropping the handle does not cancel the timer, call [`TimerHandle::cancel`] for that.
#[derive(Debug)]
pub struct TimerHandle {
    deadline: Instant,
    state: Arc<AtomicU8>,
    abort: AbortHandle,
}

impl TimerHandle {
    /// Cancel the timer.
    ///
    /// Safe to call many times, and a no-op once the callback has started.
    pub fn cancel(&self) {
        if self
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.abort.abort();
        }
    }

    /// When the timer fires (or would have fired).
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// True while the timer has neither fired nor been cancelled.
    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) == PENDING
    }
}

/// Slot holding at most one active timer, a new timer supersedes the old one.
#[derive(Debug, Default)]
pub struct TimerSlot {
    handle: Option<TimerHandle>,
}

impl TimerSlot {
    /// Store a new timer, cancelling the previous one.
    pub fn replace(&mut self, handle: TimerHandle) {
        if let Some(old) = self.handle.replace(handle) {
            old.cancel();
        }
    }

    /// Cancel and forget the current timer.
    pub fn clear(&mut self) {
        if let Some(old) = self.handle.take() {
            old.cancel();
        }
    }

    /// Deadline of the pending timer, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.handle
            .as_ref()
            .filter(|h| h.is_pending())
            .map(TimerHandle::deadline)
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counter_callback(
        counter: &Arc<AtomicUsize>,
    ) -> impl FnOnce() -> std::future::Ready<()> + Send + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let scheduler = Scheduler::current();
        let counter = Arc::new(AtomicUsize::new(0));

        let handle = scheduler.after(Duration::from_secs(10), counter_callback(&counter));

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(handle.is_pending());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!handle.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent() {
        let scheduler = Scheduler::current();
        let counter = Arc::new(AtomicUsize::new(0));

        let handle = scheduler.after(Duration::from_secs(1), counter_callback(&counter));
        handle.cancel();
        handle.cancel();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_fire_is_noop() {
        let scheduler = Scheduler::current();
        let counter = Arc::new(AtomicUsize::new(0));

        let handle = scheduler.after(Duration::from_secs(1), counter_callback(&counter));
        tokio::time::sleep(Duration::from_secs(2)).await;

        handle.cancel();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slot_keeps_only_newest_timer() {
        let scheduler = Scheduler::current();
        let counter = Arc::new(AtomicUsize::new(0));
        let mut slot = TimerSlot::default();

        slot.replace(scheduler.after(Duration::from_secs(5), counter_callback(&counter)));
        slot.replace(scheduler.after(Duration::from_secs(20), counter_callback(&counter)));

        let deadline = slot.deadline().unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(slot.deadline(), Some(deadline));

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(slot.deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_slot_cancels_timer() {
        let scheduler = Scheduler::current();
        let counter = Arc::new(AtomicUsize::new(0));

        {
            let mut slot = TimerSlot::default();
            slot.replace(scheduler.after(Duration::from_secs(1), counter_callback(&counter)));
        }

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
