use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::error::AppResult;

type Pending<T> = Mutex<HashMap<String, Arc<OnceCell<T>>>>;

/// Registry of fetches currently in progress, keyed by request identity
///
/// Concurrent callers with the same key share one fetch. If the fetch fails,
/// a waiting caller runs its own. The entry is removed when the last caller
/// leaves, whether it succeeded, failed or was cancelled.
pub struct InFlight<T> {
    pending: Pending<T>,
}

impl<T> Default for InFlight<T> {
    fn default() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> InFlight<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `fetch` unless an identical request is already running, in which
    /// case its result is awaited instead
    pub async fn run<F, Fut>(&self, key: &str, fetch: F) -> AppResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let cell = Arc::clone(
            self.pending
                .lock()
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        );
        let flight = Flight {
            pending: &self.pending,
            key,
            cell,
        };

        let value = flight.cell.get_or_try_init(fetch).await?;
        Ok(value.clone())
    }

    /// Number of distinct requests currently tracked
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes the registry entry when the owning call ends, however it ends
struct Flight<'a, T> {
    pending: &'a Pending<T>,
    key: &'a str,
    cell: Arc<OnceCell<T>>,
}

impl<T> Drop for Flight<'_, T> {
    fn drop(&mut self) {
        let mut pending = self.pending.lock();
        let Some(current) = pending.get(self.key) else {
            return;
        };
        if !Arc::ptr_eq(current, &self.cell) {
            return;
        }
        // Registry plus this call: nobody else is waiting on an unfinished fetch
        if self.cell.initialized() || Arc::strong_count(&self.cell) <= 2 {
            pending.remove(self.key);
        }
    }
}
