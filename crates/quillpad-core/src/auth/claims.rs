//! Unverified decoding of the identity claims carried in a session token.
//!
//! Tokens are compact `header.payload.signature` strings. Only the payload is
//! read; the signature is the server's business. Any defect in the payload
//! means "no claims", never a partially filled `Claims`.

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// Why a token could not be decoded. Never escapes `decode`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("token has {0} segments, expected 3")]
    SegmentCount(usize),

    #[error("payload segment is empty")]
    EmptyPayload,

    #[error("payload is not valid base64")]
    Base64,

    #[error("payload is not valid JSON: {0}")]
    Json(String),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("claim '{0}' has an invalid value")]
    InvalidClaim(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub subject: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Every payload member not mapped to a named field above.
    pub extra: Map<String, Value>,
}

impl Claims {
    /// True once `now` has reached the expiry. Claims without `exp` never expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }

    /// Remaining lifetime, saturating at zero. `None` when there is no expiry.
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        self.expires_at
            .map(|exp| (exp - now).to_std().unwrap_or(std::time::Duration::ZERO))
    }

    /// Look up an unmapped claim.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }
}

/// Decode the claims of `token`, or `None` if it is not a readable token.
pub fn decode(token: &str) -> Option<Claims> {
    if token.is_empty() {
        return None;
    }
    match try_decode(token) {
        Ok(claims) => Some(claims),
        Err(e) => {
            debug!(error = %e, "Token payload could not be decoded");
            None
        }
    }
}

/// Like `decode`, but reports why decoding failed.
pub fn try_decode(token: &str) -> Result<Claims, DecodeError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(DecodeError::SegmentCount(segments.len()));
    }

    let bytes = decode_segment(segments[1])?;
    let value: Value =
        serde_json::from_slice(&bytes).map_err(|e| DecodeError::Json(e.to_string()))?;
    let Value::Object(map) = value else {
        return Err(DecodeError::NotAnObject);
    };

    claims_from_map(map)
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, DecodeError> {
    let trimmed = segment.trim_end_matches('=');
    if trimmed.is_empty() {
        return Err(DecodeError::EmptyPayload);
    }
    URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
        .map_err(|_| DecodeError::Base64)
}

fn claims_from_map(mut map: Map<String, Value>) -> Result<Claims, DecodeError> {
    let subject = match map.remove("sub") {
        Some(sub) => scalar_to_string(sub).ok_or(DecodeError::InvalidClaim("sub"))?,
        None => match map.get("id") {
            Some(id) => {
                let id = scalar_to_string(id.clone()).ok_or(DecodeError::InvalidClaim("id"))?;
                map.remove("id");
                id
            }
            None => None,
        },
    };
    let issued_at = timestamp_claim(map.remove("iat"), "iat")?;
    let expires_at = timestamp_claim(map.remove("exp"), "exp")?;

    Ok(Claims {
        subject,
        issued_at,
        expires_at,
        extra: map,
    })
}

/// `Some(None)` for JSON null, `None` for anything that is not a scalar id.
fn scalar_to_string(value: Value) -> Option<Option<String>> {
    match value {
        Value::Null => Some(None),
        Value::String(s) => Some(Some(s)),
        Value::Number(n) => Some(Some(n.to_string())),
        _ => None,
    }
}

fn timestamp_claim(
    value: Option<Value>,
    name: &'static str,
) -> Result<Option<DateTime<Utc>>, DecodeError> {
    let Some(value) = value else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    let seconds = value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f.floor() as i64))
        .ok_or(DecodeError::InvalidClaim(name))?;
    DateTime::from_timestamp(seconds, 0)
        .map(Some)
        .ok_or(DecodeError::InvalidClaim(name))
}
