//! The session controller: one consistent, observable view of who is signed in.
//!
//! Every transition of the token/claims/profile triple happens inside a single
//! lock and is written through to the stores. The expiry timer is re-armed
//! and subscribers are notified before the lock is released. Network calls
//! run outside the lock. Sign-ins apply only if no logout, `set_token` or
//! expiry happened meanwhile (the generation); profile results and timers
//! apply only while the token they were started for is current (the epoch).

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::{ApiError, AuthApi};
use crate::models::{AuthResponse, DisplayUser, Profile, ProfileUpdate, RegisterPayload};
use crate::storage::PersistentStore;
use crate::timer::{Clock, Scheduler, TimerTask};

use super::claims::{self, Claims};
use super::{ExpiryScheduler, ProfileCache, SessionError, TokenStore};

type ProfileFuture = Shared<BoxFuture<'static, Result<Profile, SessionError>>>;

/// What the UI observes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    #[serde(skip)]
    pub token: String,
    /// Claims decoded from `token`; `None` when signed out or unreadable.
    pub current_user: Option<Claims>,
    pub profile: Option<Profile>,
    pub is_loading: bool,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.current_user.is_some()
    }

    pub fn display_user(&self) -> DisplayUser {
        DisplayUser::derive(self.profile.as_ref(), self.current_user.as_ref())
    }
}

struct ProfileFlight {
    id: u64,
    epoch: u64,
    future: ProfileFuture,
}

#[derive(Default)]
struct SessionState {
    token: String,
    claims: Option<Claims>,
    profile: Option<Profile>,
    /// Number of login/signup/update calls in progress.
    loading: usize,
    /// Bumped by logout, `set_token` and expiry.
    generation: u64,
    /// Bumped on every token change, sign-ins included.
    epoch: u64,
    profile_flight: Option<ProfileFlight>,
    next_flight_id: u64,
}

impl SessionState {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            token: self.token.clone(),
            current_user: self.claims.clone(),
            profile: self.profile.clone(),
            is_loading: self.loading > 0,
        }
    }
}

struct Inner {
    api: Arc<dyn AuthApi>,
    tokens: TokenStore,
    profiles: ProfileCache,
    expiry: ExpiryScheduler,
    clock: Arc<dyn Clock>,
    state: Mutex<SessionState>,
    updates: watch::Sender<SessionSnapshot>,
}

/// Owns the session and keeps memory, storage, timer and observers in step.
///
/// Cloning gives another handle to the same session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

/// Counters captured when a request starts.
#[derive(Debug, Clone, Copy)]
struct Started {
    generation: u64,
    epoch: u64,
}

/// Keeps `is_loading` raised while alive.
struct LoadingGuard {
    inner: Arc<Inner>,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        let mut state = self.inner.lock();
        state.loading = state.loading.saturating_sub(1);
        self.inner.publish(&state);
    }
}

impl SessionController {
    /// Build a controller and restore any session left in `store`.
    ///
    /// A stored token that has already expired is cleared immediately.
    pub fn new(
        api: Arc<dyn AuthApi>,
        store: Arc<dyn PersistentStore>,
        scheduler: Arc<dyn Scheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (updates, _) = watch::channel(SessionSnapshot::default());
        let inner = Arc::new(Inner {
            api,
            tokens: TokenStore::new(Arc::clone(&store)),
            profiles: ProfileCache::new(store),
            expiry: ExpiryScheduler::new(scheduler, Arc::clone(&clock)),
            clock,
            state: Mutex::new(SessionState::default()),
            updates,
        });
        inner.restore();
        Self { inner }
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Receive every published snapshot, starting with the current one.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.updates.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.lock().snapshot()
    }

    pub fn token(&self) -> String {
        self.inner.lock().token.clone()
    }

    pub fn current_user(&self) -> Option<Claims> {
        self.inner.lock().claims.clone()
    }

    pub fn profile(&self) -> Option<Profile> {
        self.inner.lock().profile.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.lock().loading > 0
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.lock().claims.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Remaining session lifetime, `None` without claims or without `exp`.
    pub fn time_until_expiry(&self) -> Option<Duration> {
        let now = self.inner.clock.now();
        self.inner
            .lock()
            .claims
            .as_ref()
            .and_then(|c| c.time_until_expiry(now))
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Sign in, then load the full profile for the new token.
    ///
    /// The auth response only carries a summary of the account. If the
    /// follow-up fetch fails the summary stays cached and is returned.
    pub async fn login(&self, email: &str, password: &str) -> Result<Profile, SessionError> {
        let (started, _loading) = self.inner.begin_loading(false)?;
        let result = self.inner.api.login(email, password).await;
        let summary = self.inner.finish_sign_in(started, result, "login")?;
        Ok(self.hydrate(summary).await)
    }

    /// Register and sign in; hydrates the profile like `login`.
    pub async fn signup(&self, payload: &RegisterPayload) -> Result<Profile, SessionError> {
        let (started, _loading) = self.inner.begin_loading(false)?;
        let result = self.inner.api.register(payload).await;
        let summary = self.inner.finish_sign_in(started, result, "signup")?;
        Ok(self.hydrate(summary).await)
    }

    async fn hydrate(&self, summary: Profile) -> Profile {
        match self.fetch_profile().await {
            Ok(profile) => profile,
            Err(e) => {
                debug!(error = %e, "Keeping profile from sign-in response");
                summary
            }
        }
    }

    /// End the session now. Responses to requests started earlier are discarded.
    pub fn logout(&self) {
        let mut state = self.inner.lock();
        let was_signed_in = !state.token.is_empty();
        state.generation += 1;
        self.inner.apply_token(&mut state, String::new(), None);
        if was_signed_in {
            info!(generation = state.generation, "Signed out");
        }
    }

    /// Replace the token from outside (e.g. a refresh flow).
    ///
    /// An empty token signs out. A different token drops the cached profile,
    /// since it described the previous identity.
    pub fn set_token(&self, token: &str) {
        let mut state = self.inner.lock();
        let profile = if token == state.token {
            state.profile.clone()
        } else {
            None
        };
        state.generation += 1;
        self.inner.apply_token(&mut state, token.to_string(), profile);
        debug!(generation = state.generation, "Token replaced");
    }

    /// Send a partial update; the server's full record replaces the cache.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Profile, SessionError> {
        let (started, _loading) = self.inner.begin_loading(true)?;
        let result = self.inner.api.update_profile(update).await;

        let profile = result.map_err(|e| {
            warn!(error = %e, "Profile update failed");
            SessionError::from(e)
        })?;

        let mut state = self.inner.lock();
        if state.epoch != started.epoch {
            debug!(started = started.epoch, current = state.epoch, "Discarding stale profile update");
            return Err(SessionError::Superseded);
        }
        state.profile = Some(profile.clone());
        self.inner.persist_profile(&state);
        self.inner.publish(&state);
        Ok(profile)
    }

    /// Load the profile from the server.
    ///
    /// Concurrent callers for the same token share one request.
    pub async fn fetch_profile(&self) -> Result<Profile, SessionError> {
        let flight = {
            let mut state = self.inner.lock();
            if state.token.is_empty() {
                return Err(SessionError::NotAuthenticated);
            }
            let current = state.epoch;
            let joined = state
                .profile_flight
                .as_ref()
                .filter(|flight| flight.epoch == current)
                .map(|flight| {
                    debug!(flight = flight.id, "Joining in-flight profile fetch");
                    flight.future.clone()
                });
            match joined {
                Some(future) => future,
                None => self.inner.start_profile_flight(&mut state),
            }
        };
        flight.await
    }

    /// Fetch the profile only if a token is present and nothing is cached.
    pub async fn ensure_profile(&self) -> Result<Option<Profile>, SessionError> {
        {
            let state = self.inner.lock();
            if state.token.is_empty() {
                return Ok(None);
            }
            if let Some(profile) = &state.profile {
                return Ok(Some(profile.clone()));
            }
        }
        self.fetch_profile().await.map(Some)
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // Every critical section leaves the state consistent before it can panic
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, state: &SessionState) {
        self.updates.send_replace(state.snapshot());
    }

    fn restore(self: &Arc<Self>) {
        let token = match self.tokens.load() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Failed to read stored token, starting signed out");
                String::new()
            }
        };

        let mut state = self.lock();
        if token.is_empty() {
            if let Err(e) = self.profiles.clear() {
                warn!(error = %e, "Failed to clear orphaned cached profile");
            }
            self.publish(&state);
            return;
        }

        let decoded = claims::decode(&token);
        if decoded
            .as_ref()
            .map(|c| c.is_expired_at(self.clock.now()))
            .unwrap_or(false)
        {
            info!("Stored session has already expired");
            self.apply_token(&mut state, String::new(), None);
            return;
        }

        let profile = match self.profiles.load() {
            // An unreadable token is not a session, so no profile belongs to it
            Ok(Some(_)) if decoded.is_none() => {
                warn!("Stored token is unreadable, dropping cached profile");
                if let Err(e) = self.profiles.clear() {
                    warn!(error = %e, "Failed to clear cached profile");
                }
                None
            }
            Ok(profile) => profile,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable cached profile");
                if let Err(e) = self.profiles.clear() {
                    warn!(error = %e, "Failed to clear cached profile");
                }
                None
            }
        };

        state.token = token;
        state.claims = decoded;
        state.profile = profile;
        self.rearm(&state);
        debug!(
            authenticated = state.claims.is_some(),
            has_profile = state.profile.is_some(),
            "Session restored"
        );
        self.publish(&state);
    }

    /// Raise `is_loading` and capture the counters a request starts under.
    fn begin_loading(
        self: &Arc<Self>,
        require_session: bool,
    ) -> Result<(Started, LoadingGuard), SessionError> {
        let mut state = self.lock();
        if require_session && state.token.is_empty() {
            return Err(SessionError::NotAuthenticated);
        }
        state.loading += 1;
        self.publish(&state);
        Ok((
            Started {
                generation: state.generation,
                epoch: state.epoch,
            },
            LoadingGuard {
                inner: Arc::clone(self),
            },
        ))
    }

    fn finish_sign_in(
        self: &Arc<Self>,
        started: Started,
        result: Result<AuthResponse, ApiError>,
        operation: &'static str,
    ) -> Result<Profile, SessionError> {
        let response = result.map_err(|e| {
            warn!(operation, error = %e, "Sign-in request failed");
            SessionError::from(e)
        })?;
        let (token, profile) = response.into_parts();
        if token.is_empty() {
            warn!(operation, "Sign-in response carried no token");
            return Err(ApiError::InvalidResponse("response carried no token".to_string()).into());
        }

        let mut state = self.lock();
        if state.generation != started.generation {
            debug!(
                operation,
                started = started.generation,
                current = state.generation,
                "Discarding sign-in that finished after logout"
            );
            return Err(SessionError::Superseded);
        }
        self.apply_token(&mut state, token, Some(profile.clone()));
        info!(operation, epoch = state.epoch, "Signed in");
        Ok(profile)
    }

    /// Move to a new token (empty means signed out) with `profile`.
    /// Caller holds the lock; this persists, re-arms and publishes.
    fn apply_token(self: &Arc<Self>, state: &mut SessionState, token: String, profile: Option<Profile>) {
        state.epoch += 1;
        state.profile_flight = None;

        if token.is_empty() {
            state.token.clear();
            state.claims = None;
            state.profile = None;
        } else {
            state.claims = claims::decode(&token);
            state.token = token;
            state.profile = profile;
        }

        self.persist(state);
        self.rearm(state);
        self.publish(state);
    }

    fn rearm(self: &Arc<Self>, state: &SessionState) {
        match &state.claims {
            Some(claims) => self
                .expiry
                .arm(claims, self.expiry_task(state.epoch)),
            None => self.expiry.disarm(),
        }
    }

    fn expiry_task(self: &Arc<Self>, epoch: u64) -> TimerTask {
        let weak: Weak<Inner> = Arc::downgrade(self);
        Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.expire(epoch);
            }
        })
    }

    fn expire(self: &Arc<Self>, epoch: u64) {
        let mut state = self.lock();
        if state.epoch != epoch {
            debug!(armed = epoch, current = state.epoch, "Ignoring stale expiry timer");
            return;
        }
        info!(epoch, "Session expired");
        state.generation += 1;
        self.apply_token(&mut state, String::new(), None);
    }

    fn persist(&self, state: &SessionState) {
        if state.token.is_empty() {
            if let Err(e) = self.tokens.clear() {
                warn!(error = %e, "Failed to clear stored token");
            }
        } else if let Err(e) = self.tokens.save(&state.token) {
            warn!(error = %e, "Failed to save token");
        }
        self.persist_profile(state);
    }

    fn persist_profile(&self, state: &SessionState) {
        let result = match &state.profile {
            Some(profile) => self.profiles.save(profile),
            None => self.profiles.clear(),
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to write cached profile");
        }
    }

    fn start_profile_flight(self: &Arc<Self>, state: &mut SessionState) -> ProfileFuture {
        let id = state.next_flight_id;
        state.next_flight_id += 1;
        let epoch = state.epoch;

        let api = Arc::clone(&self.api);
        let weak = Arc::downgrade(self);
        let future = async move {
            let result = api.get_profile().await;
            match weak.upgrade() {
                Some(inner) => inner.finish_profile_fetch(id, epoch, result),
                None => Err(SessionError::Superseded),
            }
        }
        .boxed()
        .shared();

        debug!(flight = id, epoch, "Starting profile fetch");
        state.profile_flight = Some(ProfileFlight {
            id,
            epoch,
            future: future.clone(),
        });
        future
    }

    /// Runs once per flight, when the request resolves.
    fn finish_profile_fetch(
        &self,
        id: u64,
        epoch: u64,
        result: Result<Profile, ApiError>,
    ) -> Result<Profile, SessionError> {
        let mut state = self.lock();
        if state.profile_flight.as_ref().map(|f| f.id) == Some(id) {
            state.profile_flight = None;
        }

        let profile = result.map_err(|e| {
            warn!(error = %e, "Profile fetch failed");
            SessionError::from(e)
        })?;

        if state.epoch != epoch {
            debug!(started = epoch, current = state.epoch, "Discarding stale profile fetch");
            return Err(SessionError::Superseded);
        }
        state.profile = Some(profile.clone());
        self.persist_profile(&state);
        self.publish(&state);
        Ok(profile)
    }
}
