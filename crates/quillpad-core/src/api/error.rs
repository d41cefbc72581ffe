use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Shown for a 401 that carries no body
const DEFAULT_UNAUTHORIZED_MESSAGE: &str = "token may be expired";

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// The backend reports failures as `{"message": "..."}`; fall back to the raw body.
    fn server_message(body: &str) -> String {
        serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .map(|m| Self::truncate_body(&m))
            .unwrap_or_else(|| Self::truncate_body(body))
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 => {
                let message = Self::server_message(body);
                if message.trim().is_empty() {
                    ApiError::Unauthorized(DEFAULT_UNAUTHORIZED_MESSAGE.to_string())
                } else {
                    ApiError::Unauthorized(message)
                }
            }
            403 => ApiError::AccessDenied(Self::server_message(body)),
            404 => ApiError::NotFound(Self::server_message(body)),
            400 | 409 | 422 => ApiError::Validation(Self::server_message(body)),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(Self::server_message(body)),
            _ => ApiError::InvalidResponse(format!(
                "Status {}: {}",
                status,
                Self::truncate_body(body)
            )),
        }
    }

    /// True when the server rejected the credentials or the bearer token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_mapping() {
        assert!(ApiError::from_status(StatusCode::UNAUTHORIZED, "").is_unauthorized());
        assert!(matches!(
            ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ApiError::RateLimited
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, "upstream down"),
            ApiError::ServerError(ref m) if m == "upstream down"
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::IM_A_TEAPOT, "short"),
            ApiError::InvalidResponse(_)
        ));
    }

    #[test]
    fn test_unauthorized_keeps_server_message() {
        let err = ApiError::from_status(
            StatusCode::UNAUTHORIZED,
            r#"{"message":"Invalid email or password"}"#,
        );
        assert!(err.is_unauthorized());
        assert_eq!(err.to_string(), "Unauthorized: Invalid email or password");

        let err = ApiError::from_status(StatusCode::UNAUTHORIZED, "");
        assert_eq!(err.to_string(), "Unauthorized: token may be expired");
    }

    #[test]
    fn test_validation_uses_server_message() {
        let err = ApiError::from_status(
            StatusCode::BAD_REQUEST,
            r#"{"message":"User already exists"}"#,
        );
        assert_eq!(err.to_string(), "Validation failed: User already exists");
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(2000);
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(500)));
        assert!(truncated.contains("2000 total bytes"));

        // Multi-byte characters straddling the limit are not split
        let wide = "é".repeat(400);
        let truncated = ApiError::truncate_body(&wide);
        assert!(truncated.contains("800 total bytes"));
    }
}
