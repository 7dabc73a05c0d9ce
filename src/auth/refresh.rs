// Token fetch via the OAuth2 client-credentials grant

use chrono::{Duration, Utc};
use reqwest::Method;
use std::time::Duration as StdDuration;
use url::Url;

use super::types::{Credentials, Token, TokenResponse};
use crate::error::{ClientError, Result};
use crate::transport::{HttpRequest, RequestBody, Transport};

/// Unversioned path of the token endpoint
pub const TOKEN_PATH: &str = "/o/token/";

/// Get the token endpoint URL for these credentials
pub fn token_url(creds: &Credentials) -> Result<Url> {
    Ok(Url::parse(&creds.api_base_url)?.join(TOKEN_PATH)?)
}

/// Request a new access token from the token endpoint
pub async fn fetch_client_credentials_token(
    transport: &dyn Transport,
    creds: &Credentials,
    timeout: StdDuration,
) -> Result<Token> {
    let url = token_url(creds)?;

    tracing::info!("Requesting Core API token from {}", url);
    tracing::debug!(
        "Client credentials grant: client_id={}...",
        creds.client_id.chars().take(8).collect::<String>()
    );

    let mut request = HttpRequest::new(Method::POST, url);
    request.body = RequestBody::Form(vec![
        ("grant_type".to_string(), "client_credentials".to_string()),
        ("client_id".to_string(), creds.client_id.clone()),
        ("client_secret".to_string(), creds.client_secret.clone()),
    ]);
    request.timeout = Some(timeout);

    let response = transport.perform(request).await.map_err(|e| {
        tracing::error!("Token request failed: {}", e);
        ClientError::Authentication(format!("token request failed: {}", e))
    })?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text();
        tracing::error!(
            "Token endpoint rejected credentials: status={}, body={}",
            status,
            error_text
        );
        return Err(ClientError::Authentication(format!(
            "token endpoint returned {} - {}",
            status, error_text
        )));
    }

    let data: TokenResponse = response.json().map_err(|e| {
        ClientError::Authentication(format!("malformed token response: {}", e))
    })?;

    if data.access_token.is_empty() {
        return Err(ClientError::Authentication(
            "token response does not contain access_token".to_string(),
        ));
    }

    let expires_at = i64::try_from(data.expires_in)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .ok_or_else(|| {
            ClientError::Authentication(format!("expires_in out of range: {}", data.expires_in))
        })?;

    tracing::info!("Token obtained, expires: {}", expires_at.to_rfc3339());

    Ok(Token {
        access_token: data.access_token,
        expires_at,
    })
}
