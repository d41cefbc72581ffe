use std::sync::Arc;

use crate::models::Profile;
use crate::storage::{PersistentStore, StoreError};

/// Key under which the serialized profile is persisted
pub const PROFILE_KEY: &str = "profile";

/// Durable copy of the last profile the server returned, stored as JSON.
#[derive(Clone)]
pub struct ProfileCache {
    store: Arc<dyn PersistentStore>,
}

impl ProfileCache {
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self { store }
    }

    /// The cached profile, `None` if absent. A value that no longer parses
    /// is reported as `StoreError::Corrupt` rather than silently ignored.
    pub fn load(&self) -> Result<Option<Profile>, StoreError> {
        match self.store.get(PROFILE_KEY)? {
            None => Ok(None),
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::Corrupt {
                    key: PROFILE_KEY.to_string(),
                    reason: e.to_string(),
                }),
        }
    }

    pub fn save(&self, profile: &Profile) -> Result<(), StoreError> {
        let raw = serde_json::to_string(profile)?;
        self.store.set(PROFILE_KEY, &raw)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(PROFILE_KEY)
    }
}
