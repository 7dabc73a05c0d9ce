// Error handling module
// Defines the error type shared by every client operation

use thiserror::Error;

/// Errors that can occur while talking to the Core API
#[derive(Error, Debug)]
pub enum ClientError {
    /// Token endpoint rejected us, was unreachable, or answered garbage
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Connection, DNS or timeout failure from the HTTP stack
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Base URL or path could not be turned into an absolute URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Caller-supplied header name or value is not valid HTTP
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Non-success response, only produced by `ApiResponse::error_for_status`
    #[error("Core API error: {status} - {message}")]
    UnexpectedStatus { status: u16, message: String },

    /// JSON encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Token store could not be read or written
    #[error("Token store error: {0:#}")]
    Store(#[from] anyhow::Error),

    /// Reading an upload from disk failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_error_messages() {
        let err = ClientError::Authentication("token endpoint returned 400".to_string());
        assert_eq!(
            err.to_string(),
            "Authentication failed: token endpoint returned 400"
        );

        let err = ClientError::UnexpectedStatus {
            status: 404,
            message: "Not found".to_string(),
        };
        assert_eq!(err.to_string(), "Core API error: 404 - Not found");

        let err = ClientError::Config("client_id must not be empty".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: client_id must not be empty"
        );
    }

    #[test]
    fn test_invalid_url_conversion() {
        let parse_err = url::Url::parse("not a url").unwrap_err();
        let err: ClientError = parse_err.into();
        assert!(matches!(err, ClientError::InvalidUrl(_)));
        assert!(err.to_string().starts_with("Invalid URL: "));
    }

    #[test]
    fn test_store_error_keeps_context_chain() {
        let inner: anyhow::Result<()> = Err(anyhow::anyhow!("database is locked"));
        let err: ClientError = inner.context("Failed to write token").unwrap_err().into();
        assert_eq!(
            err.to_string(),
            "Token store error: Failed to write token: database is locked"
        );
    }
}
