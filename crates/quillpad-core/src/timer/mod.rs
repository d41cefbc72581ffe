//! Time sources and one-shot timers.
//!
//! The session core never reads the wall clock or spawns sleeps directly.
//! It goes through `Clock` and `Scheduler` so tests can drive virtual time.

pub mod clock;
pub mod scheduler;

pub use clock::{Clock, SystemClock};
pub use scheduler::{Scheduler, TimerHandle, TimerTask, TokioScheduler};
