//! Quillpad core - session and identity lifecycle for the diary client.
//!
//! The `SessionController` owns the signed-in state: it logs in and out,
//! keeps the token and cached profile in persistent storage, invalidates the
//! session when the token's claims expire, and publishes every change to
//! observers. The remaining modules are its collaborators.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod storage;
pub mod timer;
pub mod utils;

#[cfg(test)]
mod testing;

pub use api::{ApiClient, ApiError, AuthApi};
pub use auth::{Claims, SessionController, SessionError, SessionSnapshot, TokenStore};
pub use config::{Config, TokenBackend};
pub use models::{DisplayUser, Profile, ProfileUpdate, RegisterPayload};
pub use storage::{FileStore, KeyringStore, MemoryStore, PersistentStore, StoreError};
pub use timer::{SystemClock, TokioScheduler};
