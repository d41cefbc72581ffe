use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

/// Callback run when a timer elapses.
pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

/// Identifies a scheduled timer so it can be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(pub u64);

/// One-shot timer service.
///
/// `schedule` must never run `task` inline, even for a zero delay: callers
/// may hold locks that the task itself needs.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle;

    /// Cancel a pending timer. Unknown or already-fired handles are ignored.
    fn cancel(&self, handle: TimerHandle);
}

/// Runs each timer as a sleeping task on a tokio runtime. The callback itself
/// runs on the blocking pool.
pub struct TokioScheduler {
    runtime: Handle,
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, JoinHandle<()>>>>,
}

fn lock_pending(
    pending: &Mutex<HashMap<u64, JoinHandle<()>>>,
) -> MutexGuard<'_, HashMap<u64, JoinHandle<()>>> {
    pending.lock().unwrap_or_else(|e| e.into_inner())
}

impl TokioScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            next_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Bind to the runtime of the calling context.
    pub fn current() -> Result<Self> {
        let runtime = Handle::try_current().context("No tokio runtime available for timers")?;
        Ok(Self::new(runtime))
    }

    /// Number of timers that have neither fired nor been cancelled.
    pub fn pending_count(&self) -> usize {
        lock_pending(&self.pending).len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let pending = Arc::clone(&self.pending);

        // Hold the map lock across spawn so a zero-delay task cannot finish
        // and deregister before it was registered.
        let mut map = lock_pending(&self.pending);
        let join = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            lock_pending(&pending).remove(&id);
            trace!(timer = id, "Timer fired");
            // Tasks may touch the disk or the OS keyring
            if let Err(e) = tokio::task::spawn_blocking(task).await {
                warn!(timer = id, error = %e, "Timer task failed");
            }
        });
        map.insert(id, join);
        TimerHandle(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        if let Some(join) = lock_pending(&self.pending).remove(&handle.0) {
            join.abort();
            trace!(timer = handle.0, "Timer cancelled");
        }
    }
}
