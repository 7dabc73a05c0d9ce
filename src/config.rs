use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::Credentials;
use crate::error::{ClientError, Result};

/// Per-request timeout applied to every dispatch
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Renew tokens this many seconds before they expire
pub const DEFAULT_TOKEN_GRACE_PERIOD_SECS: u64 = 300;

#[derive(Clone, Deserialize)]
pub struct ClientConfig {
    // Connection
    pub api_base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub api_version: String,

    // Timeouts
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_token_grace_period_secs")]
    pub token_grace_period_secs: u64,

    // Retry policy: when false only GET and POST retry on 401
    #[serde(default)]
    pub retry_all_methods: bool,

    // Optional SQLite token store shared across processes
    #[serde(default)]
    pub token_db_file: Option<PathBuf>,
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_token_grace_period_secs() -> u64 {
    DEFAULT_TOKEN_GRACE_PERIOD_SECS
}

impl ClientConfig {
    /// Configuration with default timeouts and retry policy
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
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            token_grace_period_secs: DEFAULT_TOKEN_GRACE_PERIOD_SECS,
            retry_all_methods: false,
            token_db_file: None,
        }
    }

    /// Load configuration from a TOML, JSON or YAML file (format picked by extension)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("Loading client configuration from {}", path.display());

        let config: ClientConfig = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| {
                ClientError::Config(format!("failed to load {}: {}", path.display(), e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.api_base_url).map_err(|e| {
            ClientError::Config(format!("api_base_url '{}' is invalid: {}", self.api_base_url, e))
        })?;

        if self.client_id.trim().is_empty() {
            return Err(ClientError::Config("client_id must not be empty".to_string()));
        }
        if self.client_secret.is_empty() {
            return Err(ClientError::Config("client_secret must not be empty".to_string()));
        }
        if self.api_version.trim().is_empty() {
            return Err(ClientError::Config("api_version must not be empty".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ClientError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(
            self.api_base_url.clone(),
            self.client_id.clone(),
            self.client_secret.clone(),
            &self.api_version,
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn token_grace_period(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token_grace_period_secs.min(u32::MAX as u64) as i64)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_base_url", &self.api_base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("api_version", &self.api_version)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("token_grace_period_secs", &self.token_grace_period_secs)
            .field("retry_all_methods", &self.retry_all_methods)
            .field("token_db_file", &self.token_db_file)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(extension: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "core-api-config-{}.{}",
            uuid::Uuid::new_v4(),
            extension
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new("https://site.com/", "id", "secret", 1);
        assert_eq!(config.api_version, "1");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.token_grace_period(), chrono::Duration::minutes(5));
        assert!(!config.retry_all_methods);
        assert!(config.token_db_file.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_file_fills_defaults() {
        let path = write_temp(
            "toml",
            r#"
api_base_url = "https://core.example.com/"
client_id = "client"
client_secret = "secret"
api_version = "2"
"#,
        );

        let config = ClientConfig::from_file(&path).unwrap();
        assert_eq!(config.api_base_url, "https://core.example.com/");
        assert_eq!(config.api_version, "2");
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.token_grace_period_secs, 300);
        assert!(!config.retry_all_methods);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_from_json_file_with_overrides() {
        let path = write_temp(
            "json",
            r#"{
                "api_base_url": "https://core.example.com/",
                "client_id": "client",
                "client_secret": "secret",
                "api_version": "1",
                "request_timeout_secs": 10,
                "retry_all_methods": true,
                "token_db_file": "/var/lib/core-api/tokens.db"
            }"#,
        );

        let config = ClientConfig::from_file(&path).unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert!(config.retry_all_methods);
        assert_eq!(
            config.token_db_file,
            Some(PathBuf::from("/var/lib/core-api/tokens.db"))
        );

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_from_file_rejects_invalid_values() {
        let path = write_temp(
            "toml",
            r#"
api_base_url = "no scheme here"
client_id = "client"
client_secret = "secret"
api_version = "1"
"#,
        );

        let err = ClientConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("api_base_url"));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_from_file_missing_field() {
        let path = write_temp("toml", r#"api_base_url = "https://core.example.com/""#);
        assert!(matches!(
            ClientConfig::from_file(&path),
            Err(ClientError::Config(_))
        ));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        let mut config = ClientConfig::new("https://site.com/", "", "secret", 1);
        assert!(config.validate().is_err());

        config.client_id = "id".to_string();
        config.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = ClientConfig::new("https://site.com/", "id", "hunter2", 1);
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
