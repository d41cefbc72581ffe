//! CLI commands

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use serde_json::Value;
use tracing::warn;

use quillpad_core::auth::TokenStore;
use quillpad_core::utils::truncate_string;
use quillpad_core::{
    ApiClient, Config, ProfileUpdate, RegisterPayload, SessionController, SystemClock,
    TokioScheduler,
};

/// Read instead of prompting when set
const PASSWORD_ENV: &str = "QUILLPAD_PASSWORD";

/// Maximum bio length shown by `whoami`
const BIO_PREVIEW_LEN: usize = 60;

#[derive(Subcommand)]
pub enum Command {
    /// Sign in with email and password
    Login {
        /// Account email (defaults to the last one used)
        #[arg(long)]
        email: Option<String>,
    },

    /// Create an account and sign in
    Signup {
        #[arg(long)]
        username: String,

        #[arg(long)]
        email: String,
    },

    /// Sign out and forget the stored session
    Logout,

    /// Show who is signed in and how long the session lasts
    Whoami,

    /// Fetch the profile from the server and print it as JSON
    Profile,

    /// Update profile fields, e.g. `profile-set bio="Hello" isPrivate=true`
    ProfileSet {
        /// `key=value` pairs; values that parse as JSON are sent as JSON
        #[arg(required = true)]
        fields: Vec<String>,
    },
}

impl Command {
    pub async fn execute(self, config: &mut Config, api_url: &str) -> Result<()> {
        let session = open_session(config, api_url)?;

        match self {
            Command::Login { email } => {
                let email = match email.or_else(|| config.last_email.clone()) {
                    Some(email) => email,
                    None => bail!("No email given; pass --email"),
                };
                let password = read_password()?;
                let profile = session.login(&email, &password).await?;

                config.last_email = Some(email);
                if let Err(e) = config.save() {
                    warn!(error = %e, "Failed to save config");
                }
                let user = session.snapshot().display_user();
                println!("Signed in as {}", label(&user.display_name, profile.username.as_deref()));
            }

            Command::Signup { username, email } => {
                let password = read_password()?;
                let payload = RegisterPayload::new(username, email.clone(), password);
                session.signup(&payload).await?;

                config.last_email = Some(email);
                if let Err(e) = config.save() {
                    warn!(error = %e, "Failed to save config");
                }
                println!("Account created, signed in as {}", session.snapshot().display_user().username);
            }

            Command::Logout => {
                session.logout();
                println!("Signed out");
            }

            Command::Whoami => {
                if !session.is_authenticated() {
                    println!("Not signed in");
                    return Ok(());
                }
                session.ensure_profile().await?;

                let user = session.snapshot().display_user();
                println!("{} ({})", label(&user.display_name, Some(&user.username)), user.initials);
                if !user.email.is_empty() {
                    println!("  email:    {}", user.email);
                }
                if let Some(id) = &user.id {
                    println!("  id:       {}", id);
                }
                if !user.bio.is_empty() {
                    println!("  bio:      {}", truncate_string(&user.bio, BIO_PREVIEW_LEN));
                }
                println!("  verified: {}", if user.is_verified { "yes" } else { "no" });
                match session.time_until_expiry() {
                    Some(left) => println!("  expires:  in {}", format_remaining(left.as_secs())),
                    None => println!("  expires:  never"),
                }
            }

            Command::Profile => {
                let profile = session.fetch_profile().await?;
                println!("{}", serde_json::to_string_pretty(&profile)?);
            }

            Command::ProfileSet { fields } => {
                let update = parse_update(&fields)?;
                let profile = session.update_profile(&update).await?;
                println!("{}", serde_json::to_string_pretty(&profile)?);
            }
        }

        Ok(())
    }
}

fn open_session(config: &Config, api_url: &str) -> Result<SessionController> {
    let store = config.open_store()?;
    let client = ApiClient::new(api_url, TokenStore::new(Arc::clone(&store)))
        .context("Failed to build API client")?;
    let scheduler = TokioScheduler::current()?;

    Ok(SessionController::new(
        Arc::new(client),
        store,
        Arc::new(scheduler),
        Arc::new(SystemClock),
    ))
}

fn read_password() -> Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(password);
    }
    rpassword::prompt_password("Password: ").context("Failed to read password")
}

fn label(display_name: &str, username: Option<&str>) -> String {
    match username.filter(|u| !u.is_empty() && *u != display_name) {
        Some(username) if !display_name.is_empty() => format!("{} (@{})", display_name, username),
        Some(username) => format!("@{}", username),
        None => display_name.to_string(),
    }
}

/// Build an update from `key=value` arguments.
fn parse_update(fields: &[String]) -> Result<ProfileUpdate> {
    let mut update = ProfileUpdate::new();
    for field in fields {
        let Some((key, raw)) = field.split_once('=') else {
            bail!("Expected key=value, got '{}'", field);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Empty field name in '{}'", field);
        }
        let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        update = update.set(key, value);
    }
    Ok(update)
}

fn format_remaining(secs: u64) -> String {
    let (days, hours, minutes) = (secs / 86_400, (secs % 86_400) / 3_600, (secs % 3_600) / 60);
    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", secs)
    }
}
