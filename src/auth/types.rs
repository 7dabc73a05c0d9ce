// Authentication types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Static connection parameters for one Core API tenant
#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub api_base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub api_version: String,
}

impl Credentials {
    pub fn new(
        api_base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        api_version: impl fmt::Display,
    ) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            api_version: api_version.to_string(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_base_url", &self.api_base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("api_version", &self.api_version)
            .finish()
    }
}

/// Bearer token together with its absolute expiry.
/// Always stored and replaced as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Token {
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    /// True once `now` is within `grace` of the recorded expiry
    pub fn needs_refresh(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        self.expires_at <= now + grace
    }
}

/// Token endpoint response
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: u64,
}
