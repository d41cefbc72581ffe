//! Single-timer invalidation of a session at its claims' expiry.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::auth::Claims;
use crate::timer::{Clock, Scheduler, TimerHandle, TimerTask};

/// Owns at most one pending expiry timer.
///
/// Every `arm` cancels the previous timer before scheduling a new one, so a
/// stale timer can never fire into a newer (or absent) session.
pub struct ExpiryScheduler {
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    armed: Mutex<Option<TimerHandle>>,
}

impl ExpiryScheduler {
    pub fn new(scheduler: Arc<dyn Scheduler>, clock: Arc<dyn Clock>) -> Self {
        Self {
            scheduler,
            clock,
            armed: Mutex::new(None),
        }
    }

    fn armed(&self) -> MutexGuard<'_, Option<TimerHandle>> {
        self.armed.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Schedule `on_expire` for `claims.expires_at`, replacing any pending
    /// timer. An expiry already in the past fires on the next tick. Claims
    /// without an expiry leave nothing armed.
    pub fn arm(&self, claims: &Claims, on_expire: TimerTask) {
        let mut armed = self.armed();
        if let Some(previous) = armed.take() {
            self.scheduler.cancel(previous);
        }

        let Some(delay) = claims.time_until_expiry(self.clock.now()) else {
            debug!("Claims carry no expiry, timer left disarmed");
            return;
        };

        debug!(delay_secs = delay.as_secs(), "Arming session expiry");
        *armed = Some(self.scheduler.schedule(delay, on_expire));
    }

    pub fn disarm(&self) {
        if let Some(previous) = self.armed().take() {
            self.scheduler.cancel(previous);
            debug!("Session expiry disarmed");
        }
    }

    /// True while a timer is pending (or has fired without being disarmed).
    pub fn is_armed(&self) -> bool {
        self.armed().is_some()
    }
}

impl Drop for ExpiryScheduler {
    fn drop(&mut self) {
        self.disarm();
    }
}
