//! Pending-caller registry for one identifier space.
//!
//! Each key maps to the ordered list of waiters registered for it. Keys are
//! kept in first-registration order so batch selection is deterministic.
//!
//! Draining a key only removes its map entry. The order queue entry goes
//! stale and is discarded lazily, so a drain costs O(1) amortized no matter
//! how large the backlog is.

use std::collections::{HashMap, VecDeque};

use tokio::sync::oneshot;

use crate::DataError;

/// Terminal outcome delivered to a waiter. `Ok(None)` means not found.
pub type WaiterResult<V> = Result<Option<V>, DataError>;

/// A single pending caller.
///
/// Consumed by [`fulfill`](Self::fulfill) or [`reject`](Self::reject), so
/// it can be notified at most once.
#[derive(Debug)]
pub struct Waiter<V> {
    tx: oneshot::Sender<WaiterResult<V>>,
}

impl<V> Waiter<V> {
    /// Create a waiter and the receiver its caller awaits.
    pub fn new() -> (Self, oneshot::Receiver<WaiterResult<V>>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Resolve with a value, or with `None` for not-found.
    pub fn fulfill(self, value: Option<V>) {
        // A dropped receiver means the caller stopped caring.
        let _ = self.tx.send(Ok(value));
    }

    pub fn reject(self, error: DataError) {
        let _ = self.tx.send(Err(error));
    }
}

/// Stale order entries tolerated beyond the live key count before compacting.
const COMPACT_SLACK: usize = 32;

#[derive(Debug)]
struct Pending<V> {
    /// Matches the order entry created when the key was first registered.
    generation: u64,
    waiters: Vec<Waiter<V>>,
}

/// Waiters keyed by lookup key, in registration order.
#[derive(Debug)]
pub struct WaiterRegistry<V> {
    order: VecDeque<(u64, String)>,
    waiters: HashMap<String, Pending<V>>,
    next_generation: u64,
}

impl<V> Default for WaiterRegistry<V> {
    fn default() -> Self {
        Self {
            order: VecDeque::new(),
            waiters: HashMap::new(),
            next_generation: 0,
        }
    }
}

fn is_live<V>(waiters: &HashMap<String, Pending<V>>, entry: &(u64, String)) -> bool {
    waiters
        .get(&entry.1)
        .is_some_and(|pending| pending.generation == entry.0)
}

impl<V> WaiterRegistry<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a waiter for `key`. Returns true if the key was not pending before.
    pub fn register(&mut self, key: &str, waiter: Waiter<V>) -> bool {
        match self.waiters.get_mut(key) {
            Some(pending) => {
                pending.waiters.push(waiter);
                false
            }
            None => {
                let generation = self.next_generation;
                self.next_generation += 1;
                self.order.push_back((generation, key.to_string()));
                self.waiters.insert(
                    key.to_string(),
                    Pending {
                        generation,
                        waiters: vec![waiter],
                    },
                );
                true
            }
        }
    }

    /// Remove and return every waiter for `key`, oldest first.
    pub fn drain(&mut self, key: &str) -> Vec<Waiter<V>> {
        match self.waiters.remove(key) {
            Some(pending) => {
                self.prune();
                pending.waiters
            }
            None => Vec::new(),
        }
    }

    /// Drop stale order entries from the front, and compact once stale
    /// entries outnumber live keys.
    fn prune(&mut self) {
        while self
            .order
            .front()
            .is_some_and(|entry| !is_live(&self.waiters, entry))
        {
            self.order.pop_front();
        }

        if self.order.len() > 2 * self.waiters.len() + COMPACT_SLACK {
            let waiters = &self.waiters;
            self.order.retain(|entry| is_live(waiters, entry));
        }
    }

    /// Up to `limit` pending keys in first-registration order.
    pub fn peek_keys(&self, limit: usize) -> Vec<String> {
        self.order
            .iter()
            .filter(|entry| is_live(&self.waiters, entry))
            .take(limit)
            .map(|(_, key)| key.clone())
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.waiters.contains_key(key)
    }

    /// Number of waiters registered for `key`.
    pub fn waiter_count(&self, key: &str) -> usize {
        self.waiters.get(key).map_or(0, |pending| pending.waiters.len())
    }

    /// Number of pending keys.
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}
