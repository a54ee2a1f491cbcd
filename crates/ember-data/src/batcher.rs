//! Debounced, self-rearming batch scheduler.
//!
//! A [`Batcher`] owns two waiter registries (id space and login space) for one
//! entity kind. The first request reaching an idle batcher schedules a drain
//! task after the debounce delay; every request arriving before dispatch joins
//! the same cycle. Each cycle resolves at most `batch_size` keys with one call
//! to the [`BatchFetcher`], ids first, then logins. When a cycle finishes and
//! keys are still pending, the task runs another cycle straight away.
//!
//! A panicking fetcher rejects the keys of its cycle with
//! [`DataError::Panicked`]; the drain task keeps going.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::oneshot;
use tracing::{debug, error, trace, warn};

use crate::registry::{Waiter, WaiterRegistry, WaiterResult};
use crate::{DataError, LookupKey};

/// Resolves one batch of keys against the remote endpoint.
#[async_trait]
pub trait BatchFetcher: Send + Sync + 'static {
    type Value: Clone + Send + Sync + 'static;

    /// Entity kind name used in logs.
    fn kind(&self) -> &'static str;

    /// Fetch every entity matching `ids` or `logins`. Either slice may be empty.
    async fn fetch(
        &self,
        ids: &[String],
        logins: &[String],
    ) -> Result<Vec<Self::Value>, DataError>;

    /// Whether `value` answers `key`.
    fn matches(&self, value: &Self::Value, key: &LookupKey) -> bool;
}

/// Number of keys waiting in each identifier space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingCounts {
    pub ids: usize,
    pub logins: usize,
}

struct BatchState<V> {
    ids: WaiterRegistry<V>,
    logins: WaiterRegistry<V>,
    /// Set from scheduling until the drain task exits.
    running: bool,
}

impl<V> BatchState<V> {
    fn has_pending(&self) -> bool {
        !self.ids.is_empty() || !self.logins.is_empty()
    }
}

struct BatcherInner<F: BatchFetcher> {
    fetcher: F,
    batch_size: usize,
    debounce: Duration,
    state: Mutex<BatchState<F::Value>>,
}

/// Batching engine for one entity kind. Cheap to clone.
pub struct Batcher<F: BatchFetcher> {
    inner: Arc<BatcherInner<F>>,
}

impl<F: BatchFetcher> Clone for Batcher<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: BatchFetcher> Batcher<F> {
    pub fn new(fetcher: F, batch_size: usize, debounce: Duration) -> Self {
        Self {
            inner: Arc::new(BatcherInner {
                fetcher,
                batch_size: batch_size.max(1),
                debounce,
                state: Mutex::new(BatchState {
                    ids: WaiterRegistry::new(),
                    logins: WaiterRegistry::new(),
                    running: false,
                }),
            }),
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.inner.fetcher
    }

    /// Resolve `key` through the next batch cycle.
    pub async fn load(&self, key: LookupKey) -> Result<Option<F::Value>, DataError> {
        self.enqueue(key).await.map_err(|_| DataError::Dropped)?
    }

    /// Register a waiter for `key` and make sure a cycle is scheduled.
    ///
    /// Must be called within a tokio runtime.
    pub fn enqueue(&self, key: LookupKey) -> oneshot::Receiver<WaiterResult<F::Value>> {
        let (waiter, rx) = Waiter::new();

        let schedule = {
            let mut state = self.inner.lock();
            let fresh = match &key {
                LookupKey::Id(id) => state.ids.register(id, waiter),
                LookupKey::Login(login) => state.logins.register(login, waiter),
            };
            trace!(kind = self.inner.fetcher.kind(), %key, fresh, "registered waiter");

            if state.running {
                false
            } else {
                state.running = true;
                true
            }
        };

        if schedule {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                tokio::time::sleep(inner.debounce).await;
                inner.drain_loop().await;
            });
        }

        rx
    }

    /// Resolve every waiter pending on `key` with `value` without a network call.
    ///
    /// Returns the number of waiters notified.
    pub fn resolve(&self, key: &LookupKey, value: F::Value) -> usize {
        let waiters = {
            let mut state = self.inner.lock();
            match key {
                LookupKey::Id(id) => state.ids.drain(id),
                LookupKey::Login(login) => state.logins.drain(login),
            }
        };

        let count = waiters.len();
        for waiter in waiters {
            waiter.fulfill(Some(value.clone()));
        }
        count
    }

    /// Whether any caller is waiting on `key`.
    pub fn is_pending(&self, key: &LookupKey) -> bool {
        let state = self.inner.lock();
        match key {
            LookupKey::Id(id) => state.ids.contains(id),
            LookupKey::Login(login) => state.logins.contains(login),
        }
    }

    pub fn pending(&self) -> PendingCounts {
        let state = self.inner.lock();
        PendingCounts {
            ids: state.ids.len(),
            logins: state.logins.len(),
        }
    }

    /// Whether a cycle is scheduled or in flight.
    pub fn is_running(&self) -> bool {
        self.inner.lock().running
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

impl<F: BatchFetcher> BatcherInner<F> {
    fn lock(&self) -> MutexGuard<'_, BatchState<F::Value>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn drain_loop(&self) {
        loop {
            let (ids, logins) = self.select();

            if !ids.is_empty() || !logins.is_empty() {
                let cycle = AssertUnwindSafe(self.run_cycle(&ids, &logins)).catch_unwind();
                if let Err(payload) = cycle.await {
                    let kind = self.fetcher.kind();
                    error!(kind, panic = panic_message(payload.as_ref()), "batch cycle panicked");
                    self.reject_selected(&ids, &logins, DataError::Panicked { kind });
                }
            }

            let mut state = self.lock();
            state.running = false;
            if !state.has_pending() {
                break;
            }
            state.running = true;
            trace!(
                kind = self.fetcher.kind(),
                ids = state.ids.len(),
                logins = state.logins.len(),
                "keys still pending, starting another cycle"
            );
        }
    }

    /// Snapshot up to `batch_size` keys, ids before logins.
    fn select(&self) -> (Vec<String>, Vec<String>) {
        let state = self.lock();
        let ids = state.ids.peek_keys(self.batch_size);
        let logins = state.logins.peek_keys(self.batch_size - ids.len());
        (ids, logins)
    }

    async fn run_cycle(&self, ids: &[String], logins: &[String]) {
        let kind = self.fetcher.kind();
        debug!(kind, ids = ids.len(), logins = logins.len(), "dispatching batch");

        match self.fetcher.fetch(ids, logins).await {
            Ok(values) => {
                let mut state = self.lock();

                for id in ids {
                    let key = LookupKey::Id(id.clone());
                    let found = values.iter().find(|v| self.fetcher.matches(v, &key));
                    for waiter in state.ids.drain(key.as_str()) {
                        waiter.fulfill(found.cloned());
                    }
                }

                for login in logins {
                    let key = LookupKey::Login(login.clone());
                    let found = values.iter().find(|v| self.fetcher.matches(v, &key));
                    for waiter in state.logins.drain(key.as_str()) {
                        waiter.fulfill(found.cloned());
                    }
                }
            }
            Err(err) => {
                warn!(kind, error = %err, ids = ids.len(), logins = logins.len(), "batch failed");
                self.reject_selected(ids, logins, err);
            }
        }
    }

    /// Reject every waiter still pending on the selected keys.
    fn reject_selected(&self, ids: &[String], logins: &[String], err: DataError) {
        let mut state = self.lock();

        for id in ids {
            for waiter in state.ids.drain(id) {
                waiter.reject(err.clone());
            }
        }
        for login in logins {
            for waiter in state.logins.drain(login) {
                waiter.reject(err.clone());
            }
        }
    }
}
