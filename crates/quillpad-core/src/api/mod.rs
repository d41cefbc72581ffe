//! REST API boundary for account operations.
//!
//! `AuthApi` is the contract the session core depends on; `ApiClient`
//! implements it against the diary backend over HTTP. Requests carry the
//! bearer token currently held in the token store.

pub mod client;
pub mod error;

use async_trait::async_trait;

use crate::models::{AuthResponse, Profile, ProfileUpdate, RegisterPayload};

pub use client::ApiClient;
pub use error::ApiError;

/// Account endpoints used by the session controller.
///
/// Implementations report failures verbatim and never retry on their own.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError>;

    async fn register(&self, payload: &RegisterPayload) -> Result<AuthResponse, ApiError>;

    async fn get_profile(&self) -> Result<Profile, ApiError>;

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<Profile, ApiError>;
}
