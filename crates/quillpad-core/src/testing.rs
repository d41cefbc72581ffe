//! Test doubles shared by the unit tests: virtual time and a scripted API.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::api::{ApiError, AuthApi};
use crate::models::{AuthResponse, Profile, ProfileUpdate, RegisterPayload};
use crate::timer::{Clock, Scheduler, TimerHandle, TimerTask};

/// Build an unsigned compact token around `payload`.
pub fn make_token(payload: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());
    format!("{}.{}.signature", header, body)
}

pub fn profile(value: Value) -> Profile {
    serde_json::from_value(value).expect("test profile JSON")
}

pub fn auth_response(token: &str, profile_fields: Value) -> AuthResponse {
    let mut body = profile_fields;
    body["token"] = Value::String(token.to_string());
    serde_json::from_value(body).expect("test auth response JSON")
}

// ============================================================================
// Virtual time
// ============================================================================

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Starts at 2024-01-01T00:00:00Z.
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap() = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(by).unwrap();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

struct PendingTimer {
    id: u64,
    due: DateTime<Utc>,
    task: TimerTask,
}

/// Timers that only fire when the test advances virtual time.
pub struct ManualScheduler {
    clock: Arc<ManualClock>,
    next_id: Mutex<u64>,
    pending: Mutex<Vec<PendingTimer>>,
}

impl ManualScheduler {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            next_id: Mutex::new(1),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Move time forward by `by`, firing due timers in order. Each task runs
    /// with the clock set to its due time and no scheduler lock held.
    pub fn advance(&self, by: Duration) {
        let target = self.clock.now() + chrono::Duration::from_std(by).unwrap();
        loop {
            let next = {
                let mut pending = self.pending.lock().unwrap();
                let earliest = pending
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.due <= target)
                    .min_by_key(|(_, t)| (t.due, t.id))
                    .map(|(i, _)| i);
                earliest.map(|i| pending.remove(i))
            };
            let Some(timer) = next else { break };
            if timer.due > self.clock.now() {
                self.clock.set(timer.due);
            }
            (timer.task)();
        }
        self.clock.set(target);
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let mut next_id = self.next_id.lock().unwrap();
        let id = *next_id;
        *next_id += 1;
        let due = self.clock.now() + chrono::Duration::from_std(delay).unwrap();
        self.pending.lock().unwrap().push(PendingTimer { id, due, task });
        TimerHandle(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        self.pending.lock().unwrap().retain(|t| t.id != handle.0);
    }
}

// ============================================================================
// Scripted AuthApi
// ============================================================================

struct Scripted<T> {
    result: Result<T, ApiError>,
    gate: Option<oneshot::Receiver<()>>,
}

impl<T> Scripted<T> {
    async fn resolve(self) -> Result<T, ApiError> {
        if let Some(gate) = self.gate {
            let _ = gate.await;
        }
        self.result
    }
}

/// Queue-driven `AuthApi`. Each call pops the next scripted result; a gated
/// result is held back until the test fires the returned sender.
#[derive(Default)]
pub struct FakeAuthApi {
    logins: Mutex<VecDeque<Scripted<AuthResponse>>>,
    registrations: Mutex<VecDeque<Scripted<AuthResponse>>>,
    profiles: Mutex<VecDeque<Scripted<Profile>>>,
    updates: Mutex<VecDeque<Scripted<Profile>>>,
    pub login_calls: AtomicUsize,
    pub register_calls: AtomicUsize,
    pub get_profile_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub sent_updates: Mutex<Vec<ProfileUpdate>>,
}

fn push<T>(queue: &Mutex<VecDeque<Scripted<T>>>, result: Result<T, ApiError>) {
    queue.lock().unwrap().push_back(Scripted { result, gate: None });
}

fn push_gated<T>(
    queue: &Mutex<VecDeque<Scripted<T>>>,
    result: Result<T, ApiError>,
) -> oneshot::Sender<()> {
    let (tx, rx) = oneshot::channel();
    queue.lock().unwrap().push_back(Scripted {
        result,
        gate: Some(rx),
    });
    tx
}

fn next<T>(queue: &Mutex<VecDeque<Scripted<T>>>, what: &str) -> Scripted<T> {
    queue.lock().unwrap().pop_front().unwrap_or_else(|| Scripted {
        result: Err(ApiError::ServerError(format!("no scripted {} response", what))),
        gate: None,
    })
}

impl FakeAuthApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_login(&self, result: Result<AuthResponse, ApiError>) {
        push(&self.logins, result);
    }

    pub fn push_login_gated(&self, result: Result<AuthResponse, ApiError>) -> oneshot::Sender<()> {
        push_gated(&self.logins, result)
    }

    pub fn push_register(&self, result: Result<AuthResponse, ApiError>) {
        push(&self.registrations, result);
    }

    pub fn push_profile(&self, result: Result<Profile, ApiError>) {
        push(&self.profiles, result);
    }

    pub fn push_profile_gated(&self, result: Result<Profile, ApiError>) -> oneshot::Sender<()> {
        push_gated(&self.profiles, result)
    }

    pub fn push_update(&self, result: Result<Profile, ApiError>) {
        push(&self.updates, result);
    }

    pub fn push_update_gated(&self, result: Result<Profile, ApiError>) -> oneshot::Sender<()> {
        push_gated(&self.updates, result)
    }

    pub fn get_profile_count(&self) -> usize {
        self.get_profile_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthApi for FakeAuthApi {
    async fn login(&self, _email: &str, _password: &str) -> Result<AuthResponse, ApiError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = next(&self.logins, "login");
        scripted.resolve().await
    }

    async fn register(&self, _payload: &RegisterPayload) -> Result<AuthResponse, ApiError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = next(&self.registrations, "register");
        scripted.resolve().await
    }

    async fn get_profile(&self) -> Result<Profile, ApiError> {
        self.get_profile_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = next(&self.profiles, "profile");
        scripted.resolve().await
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<Profile, ApiError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.sent_updates.lock().unwrap().push(update.clone());
        let scripted = next(&self.updates, "update");
        scripted.resolve().await
    }
}
