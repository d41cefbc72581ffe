//! HTTP implementation of `AuthApi` against the diary backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::TokenStore;
use crate::models::{AuthResponse, Profile, ProfileUpdate, RegisterPayload};
use crate::utils::trim_trailing_slash;

use super::{ApiError, AuthApi};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

const LOGIN_PATH: &str = "/users/login";
const REGISTER_PATH: &str = "/users/register";
const PROFILE_PATH: &str = "/users/profile";

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// API client for the diary backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    tokens: TokenStore,
}

impl ApiClient {
    /// Create a client for `base_url` (e.g. `http://localhost:5000/api`).
    /// The bearer token is read from `tokens` on every request.
    pub fn new(base_url: &str, tokens: TokenStore) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: trim_trailing_slash(base_url).to_string(),
            tokens,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer_token(&self) -> Option<String> {
        match self.tokens.load() {
            Ok(token) if !token.is_empty() => Some(token),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read token for request, sending unauthenticated");
                None
            }
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, self.url(path))
            .header(header::ACCEPT, "application/json");
        match self.bearer_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: Response, envelope: bool) -> Result<T, ApiError> {
        let body = response.text().await?;
        let mut value: Value = serde_json::from_str(&body)
            .map_err(|e| ApiError::InvalidResponse(format!("Body is not JSON: {}", e)))?;
        if envelope {
            value = unwrap_envelope(value);
        }
        serde_json::from_value(value)
            .map_err(|e| ApiError::InvalidResponse(format!("Unexpected response shape: {}", e)))
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder, envelope: bool) -> Result<T, ApiError> {
        let response = builder.send().await?;
        debug!(status = %response.status(), url = %response.url(), "Response received");
        let response = Self::check_response(response).await?;
        Self::parse_json(response, envelope).await
    }
}

/// Some endpoints answer `{"data": {...}}`, others the bare record.
fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut obj) if obj.get("data").map(Value::is_object).unwrap_or(false) => {
            obj.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let builder = self
            .request(Method::POST, LOGIN_PATH)
            .json(&LoginRequest { email, password });
        self.send(builder, false).await
    }

    async fn register(&self, payload: &RegisterPayload) -> Result<AuthResponse, ApiError> {
        let builder = self.request(Method::POST, REGISTER_PATH).json(payload);
        self.send(builder, false).await
    }

    async fn get_profile(&self) -> Result<Profile, ApiError> {
        let builder = self.request(Method::GET, PROFILE_PATH);
        self.send(builder, true).await
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<Profile, ApiError> {
        let builder = self.request(Method::PUT, PROFILE_PATH).json(update);
        self.send(builder, true).await
    }
}
