//! Batching configuration.

use std::time::Duration;

/// Maximum number of keys resolved by one batch query.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Delay between the first request reaching an idle batcher and dispatch.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);

/// Delay before re-deriving languages once pending tags have arrived.
pub const DEFAULT_LANGUAGE_DEBOUNCE: Duration = Duration::from_millis(16);

/// Tuning for the batch schedulers owned by an [`EntityService`](crate::EntityService).
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub batch_size: usize,
    pub debounce: Duration,
    pub language_debounce: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            debounce: DEFAULT_DEBOUNCE,
            language_debounce: DEFAULT_LANGUAGE_DEBOUNCE,
        }
    }
}
