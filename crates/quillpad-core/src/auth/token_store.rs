use std::sync::Arc;

use crate::storage::{PersistentStore, StoreError};

/// Key under which the raw token is persisted
pub const TOKEN_KEY: &str = "token";

/// Durable home of the raw session token.
#[derive(Clone)]
pub struct TokenStore {
    store: Arc<dyn PersistentStore>,
}

impl TokenStore {
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self { store }
    }

    /// Last persisted token, or `""` if none was ever saved.
    pub fn load(&self) -> Result<String, StoreError> {
        Ok(self.store.get(TOKEN_KEY)?.unwrap_or_default())
    }

    /// Persist `token`. An empty token clears the key instead.
    pub fn save(&self, token: &str) -> Result<(), StoreError> {
        if token.is_empty() {
            return self.clear();
        }
        self.store.set(TOKEN_KEY, token)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(TOKEN_KEY)
    }
}
