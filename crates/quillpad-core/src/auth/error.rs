use std::sync::Arc;

use thiserror::Error;

use crate::api::ApiError;

/// Failure of a session operation. Cloneable so one in-flight request can
/// hand the same outcome to every caller waiting on it.
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    #[error(transparent)]
    Api(Arc<ApiError>),

    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Session changed while the request was in flight")]
    Superseded,
}

impl From<ApiError> for SessionError {
    fn from(e: ApiError) -> Self {
        SessionError::Api(Arc::new(e))
    }
}

impl SessionError {
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            SessionError::Api(e) => Some(e.as_ref()),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.api_error().map(ApiError::is_unauthorized).unwrap_or(false)
    }
}
