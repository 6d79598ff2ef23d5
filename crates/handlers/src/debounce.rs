use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use marketwire_core::EntityId;
use tokio::task::JoinHandle;
use tracing::trace;

/// Key under which bursts of product-related events are merged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CoalesceKey {
    Entity(EntityId),
    /// Bulk updates touching many products at once.
    AllProducts,
}

struct PendingTask {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Keyed trailing-edge debounce.
///
/// Scheduling an action for a key that already has one pending aborts the
/// earlier timer and starts a fresh one, so only the last action of a burst
/// runs, `delay` after the last call. At most one timer is pending per key.
pub struct Debouncer<K> {
    delay: Duration,
    pending: Arc<Mutex<HashMap<K, PendingTask>>>,
    next_generation: AtomicU64,
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
{
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `action` for `key`, replacing any action still pending for
    /// the same key. Must be called from within a Tokio runtime.
    pub fn schedule<F, Fut>(&self, key: K, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let pending = Arc::clone(&self.pending);
        let delay = self.delay;
        let task_key = key.clone();

        let mut table = self.table();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut table = pending.lock().unwrap_or_else(PoisonError::into_inner);
                let current = table
                    .get(&task_key)
                    .is_some_and(|task| task.generation == generation);
                if !current {
                    return;
                }
                table.remove(&task_key);
            }
            trace!(key = ?task_key, "debounced action firing");
            action().await;
        });

        if let Some(previous) = table.insert(key, PendingTask { generation, handle }) {
            previous.handle.abort();
            trace!("debounce timer restarted");
        }
    }

    /// Cancel the pending action for `key`. Returns whether one was pending.
    pub fn cancel(&self, key: &K) -> bool {
        match self.table().remove(key) {
            Some(task) => {
                task.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending action and return how many were dropped.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<PendingTask> = self.table().drain().map(|(_, task)| task).collect();
        for task in &drained {
            task.handle.abort();
        }
        drained.len()
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.table().contains_key(key)
    }

    pub fn pending(&self) -> usize {
        self.table().len()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<K, PendingTask>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        let table = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        for task in table.values() {
            task.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const DELAY: Duration = Duration::from_millis(300);

    async fn settle(after: Duration) {
        tokio::time::sleep(after).await;
        tokio::task::yield_now().await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn burst_for_one_key_runs_last_action_once() {
        let debouncer = Debouncer::new(DELAY);
        let seen = Arc::new(Mutex::new(Vec::new()));

        for value in 1..=5 {
            let seen = Arc::clone(&seen);
            debouncer.schedule("key", move || async move {
                seen.lock().unwrap().push(value);
            });
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(debouncer.pending(), 1);

        settle(DELAY).await;

        assert_eq!(*seen.lock().unwrap(), vec![5]);
        assert_eq!(debouncer.pending(), 0);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn distinct_keys_fire_independently() {
        let debouncer = Debouncer::new(DELAY);
        let fired = Arc::new(AtomicUsize::new(0));

        for key in ["a", "b", "a"] {
            let fired = Arc::clone(&fired);
            debouncer.schedule(key, move || async move {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(debouncer.pending(), 2);

        settle(DELAY + Duration::from_millis(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn timer_restarts_on_each_call() {
        let debouncer = Debouncer::new(DELAY);
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let fired = Arc::clone(&fired);
            debouncer.schedule((), move || async move {
                fired.fetch_add(1, Ordering::SeqCst);
            });
            settle(Duration::from_millis(200)).await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        settle(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn cancelled_actions_never_run() {
        let debouncer = Debouncer::new(DELAY);
        let fired = Arc::new(AtomicUsize::new(0));

        for key in [1, 2, 3] {
            let fired = Arc::clone(&fired);
            debouncer.schedule(key, move || async move {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert!(debouncer.cancel(&2));
        assert!(!debouncer.cancel(&2));
        assert_eq!(debouncer.cancel_all(), 2);
        assert!(!debouncer.is_pending(&1));

        settle(DELAY * 2).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
