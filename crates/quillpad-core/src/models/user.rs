//! Display-ready view of the signed-in user.
//!
//! Combines the cached profile with the token claims. Profile values win;
//! claims fill the gaps while the profile is still loading.

use serde::Serialize;
use serde_json::Value;

use crate::auth::Claims;
use crate::utils::initials;

use super::Profile;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayUser {
    pub id: Option<String>,
    pub email: String,
    pub username: String,
    pub display_name: String,
    pub initials: String,
    pub profile_image_url: Option<String>,
    pub bio: String,
    pub is_verified: bool,
    pub stats: Value,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

fn claim_str<'a>(claims: Option<&'a Claims>, name: &str) -> Option<&'a str> {
    non_empty(claims.and_then(|c| c.get_str(name)))
}

impl DisplayUser {
    pub fn derive(profile: Option<&Profile>, claims: Option<&Claims>) -> Self {
        let claim = |name: &str| claim_str(claims, name);
        let p_username = non_empty(profile.and_then(|p| p.username.as_deref()));
        let p_email = non_empty(profile.and_then(|p| p.email.as_deref()));
        let p_display = non_empty(profile.and_then(|p| p.display_name.as_deref()));
        let p_name = non_empty(profile.and_then(|p| p.extra.get("name")).and_then(Value::as_str));

        let username = p_username
            .or_else(|| claim("username"))
            .unwrap_or_default()
            .to_string();
        let email = p_email
            .or_else(|| claim("email"))
            .unwrap_or_default()
            .to_string();
        let display_name = p_display
            .or(p_username)
            .or(p_name)
            .or_else(|| claim("displayName"))
            .or_else(|| claim("username"))
            .or_else(|| claim("name"))
            .unwrap_or_default()
            .to_string();

        let mut letters = initials(&display_name);
        if letters.is_empty() {
            letters = initials(&email);
        }

        let claims_verified = claims
            .and_then(|c| c.get("isVerified"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Self {
            id: profile
                .and_then(Profile::user_id)
                .or_else(|| claims.and_then(|c| c.subject.clone())),
            email,
            username,
            display_name,
            initials: letters,
            profile_image_url: profile.and_then(Profile::profile_image_url),
            bio: profile.and_then(|p| p.bio.clone()).unwrap_or_default(),
            is_verified: profile.and_then(|p| p.is_verified).unwrap_or(false) || claims_verified,
            stats: profile
                .and_then(|p| p.stats.clone())
                .unwrap_or_else(|| Value::Object(Default::default())),
        }
    }
}
