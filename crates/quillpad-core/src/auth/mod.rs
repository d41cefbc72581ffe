//! Session and identity lifecycle.
//!
//! This module provides:
//! - `claims`: unverified decoding of token payloads into `Claims`
//! - `TokenStore` / `ProfileCache`: write-through persistence of the session
//! - `ExpiryScheduler`: single timer that ends the session at `exp`
//! - `SessionController`: login, signup, logout, profile sync, observable state
//!
//! The server is the only authority on tokens; nothing here checks signatures.

pub mod claims;
pub mod error;
pub mod expiry;
pub mod profile_cache;
pub mod session;
pub mod token_store;

pub use claims::{Claims, DecodeError};
pub use error::SessionError;
pub use expiry::ExpiryScheduler;
pub use profile_cache::ProfileCache;
pub use session::{SessionController, SessionSnapshot};
pub use token_store::TokenStore;
