//! Wire and cache types for the user's own account.
//!
//! The profile is server-owned: the client only replaces it wholesale. Fields
//! the client reads are typed, everything else is carried in `extra` so a
//! cached copy serializes back without losing members.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Response members that authenticate rather than describe the user.
const AUTH_ONLY_FIELDS: &[&str] = &["refreshToken"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Profile {
    /// Server id, accepting the document-store `_id` spelling.
    pub fn user_id(&self) -> Option<String> {
        self.id.clone().or_else(|| match self.extra.get("_id") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    }

    /// Image URL from the shapes the backend has used over time: a bare
    /// string or an object with `url`, `secure_url` or `path`.
    pub fn profile_image_url(&self) -> Option<String> {
        let image = self
            .profile_image
            .as_ref()
            .or_else(|| self.extra.get("avatar"))
            .or_else(|| self.extra.get("profilePicture"))?;
        match image {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Object(obj) => ["url", "secure_url", "path"]
                .iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_str))
                .map(str::to_string),
            _ => None,
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

/// Body of a successful login or registration: the token plus the profile
/// fields, flattened at the top level.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    #[serde(flatten)]
    pub profile: Profile,
}

impl AuthResponse {
    /// Split into token and profile, dropping credentials that must not be
    /// cached alongside the profile.
    pub fn into_parts(self) -> (String, Profile) {
        let mut profile = self.profile;
        for field in AUTH_ONLY_FIELDS {
            profile.extra.remove(*field);
        }
        (self.token, profile)
    }
}

/// Sign-up form.
#[derive(Clone, Serialize)]
pub struct RegisterPayload {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RegisterPayload {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            extra: Map::new(),
        }
    }
}

impl fmt::Debug for RegisterPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterPayload")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("extra", &self.extra)
            .finish()
    }
}

/// Partial profile sent on update. Only the members set here are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ProfileUpdate(Map<String, Value>);

impl ProfileUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}
