//! Data models for the account and its display view.
//!
//! - `Profile`: the server-owned user record, cached locally
//! - `AuthResponse`, `RegisterPayload`, `ProfileUpdate`: request/response bodies
//! - `DisplayUser`: profile and claims merged for presentation

pub mod profile;
pub mod user;

pub use profile::{AuthResponse, Profile, ProfileUpdate, RegisterPayload};
pub use user::DisplayUser;
