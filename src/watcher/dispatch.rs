//! Debounced hand-off from the watch thread to the update pool.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::events::FileChange;
use super::update::UpdateOrchestrator;
use super::watcher::ChangeSink;
use crate::pool::StagePool;

/// Pending timer per path, tagged with the generation that armed it.
type Timers = HashMap<PathBuf, (u64, JoinHandle<()>)>;
type Pending = Arc<Mutex<Timers>>;

/// Remove the entry for `key` if `generation` still owns it.
///
/// A timer that lost the race with its replacement finds a newer
/// generation here and must not forward its change.
fn claim(pending: &Mutex<Timers>, key: &Path, generation: u64) -> bool {
    let mut map = pending.lock();
    if map.get(key).is_some_and(|(current, _)| *current == generation) {
        map.remove(key);
        true
    } else {
        false
    }
}

/// Forwards changes to an [`UpdateOrchestrator`] on the watch pool.
///
/// A change waits out the debounce window first; a newer change for the
/// same path replaces it. When the pool queue is full the change is
/// dropped with a warning.
pub struct ChangeDispatcher {
    update: Arc<UpdateOrchestrator>,
    pool: StagePool,
    debounce: Duration,
    runtime: Handle,
    pending: Pending,
    generation: AtomicU64,
}

impl std::fmt::Debug for ChangeDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeDispatcher")
            .field("pool", &self.pool.name())
            .field("debounce", &self.debounce)
            .field("pending", &self.pending.lock().len())
            .finish_non_exhaustive()
    }
}

impl ChangeDispatcher {
    /// `runtime` is where debounce timers and updates run; the watch
    /// thread itself is not a runtime thread.
    #[must_use]
    pub fn new(
        update: Arc<UpdateOrchestrator>,
        pool: StagePool,
        debounce: Duration,
        runtime: Handle,
    ) -> Self {
        Self {
            update,
            pool,
            debounce,
            runtime,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Changes still inside their debounce window.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    fn forward(pool: &StagePool, update: Arc<UpdateOrchestrator>, change: FileChange) {
        let path = change.relative.clone();
        let kind = change.kind;
        let submitted = pool.try_spawn(async move {
            update.handle_change(&change).await;
        });
        if submitted.is_err() {
            tracing::warn!(path = %path, change = %kind, "Update queue full; dropping change");
        }
    }
}

impl ChangeSink for ChangeDispatcher {
    fn submit(&self, change: FileChange) {
        let update = Arc::clone(&self.update);
        let pool = self.pool.clone();

        if self.debounce.is_zero() {
            let _guard = self.runtime.enter();
            Self::forward(&pool, update, change);
            return;
        }

        let key = change.path.clone();
        let pending = Arc::clone(&self.pending);
        let debounce = self.debounce;
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let mut map = self.pending.lock();
        if let Some((_, previous)) = map.remove(&key) {
            previous.abort();
        }
        let timer_key = key.clone();
        let timer = self.runtime.spawn(async move {
            tokio::time::sleep(debounce).await;
            if claim(&pending, &timer_key, generation) {
                Self::forward(&pool, update, change);
            }
        });
        map.insert(key, (generation, timer));
    }
}
