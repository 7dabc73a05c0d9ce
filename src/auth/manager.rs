use chrono::{Duration, Utc};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::Mutex;

use super::refresh;
use super::store::{self, TokenStore};
use super::types::{Credentials, Token};
use crate::error::Result;
use crate::transport::Transport;

/// Token manager
/// Keeps the bearer token in its store fresh; one refresh runs at a time
pub struct TokenManager {
    /// Tenant credentials used for the client-credentials grant
    credentials: Credentials,

    /// Where the current token lives (in-memory or shared)
    store: Arc<dyn TokenStore>,

    /// Transport used for token requests
    transport: Arc<dyn Transport>,

    /// Serializes check-fetch-store sequences
    refresh_lock: Mutex<()>,

    /// Renew this long before the recorded expiry
    grace_period: Duration,

    /// Timeout for token requests
    request_timeout: StdDuration,
}

impl TokenManager {
    pub fn new(
        credentials: Credentials,
        store: Arc<dyn TokenStore>,
        transport: Arc<dyn Transport>,
        grace_period: Duration,
        request_timeout: StdDuration,
    ) -> Self {
        Self {
            credentials,
            store,
            transport,
            refresh_lock: Mutex::new(()),
            grace_period,
            request_timeout,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Snapshot of the stored token, if any
    pub fn current_token(&self) -> Result<Option<Token>> {
        Ok(store::load_token(self.store.as_ref())?)
    }

    /// Replace the stored token
    pub fn store_token(&self, token: &Token) -> Result<()> {
        Ok(store::save_token(self.store.as_ref(), token)?)
    }

    /// True when no token is stored or it expires within the grace period
    pub fn is_token_expired(&self) -> Result<bool> {
        Ok(self.fresh_token()?.is_none())
    }

    fn fresh_token(&self) -> Result<Option<Token>> {
        let token = self.current_token()?;
        Ok(token.filter(|t| !t.needs_refresh(Utc::now(), self.grace_period)))
    }

    /// Get a valid token, fetching a new one if necessary
    pub async fn ensure_token(&self) -> Result<Token> {
        if let Some(token) = self.fresh_token()? {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another task may have refreshed while we waited
        if let Some(token) = self.fresh_token()? {
            tracing::debug!("Token refreshed concurrently, reusing it");
            return Ok(token);
        }

        tracing::debug!("No valid token stored, fetching a new one...");
        self.fetch_and_store().await
    }

    /// Fetch a new token regardless of the stored one's expiry
    pub async fn refresh_token(&self) -> Result<Token> {
        let _guard = self.refresh_lock.lock().await;
        tracing::debug!("Forcing token refresh...");
        self.fetch_and_store().await
    }

    async fn fetch_and_store(&self) -> Result<Token> {
        // A failed fetch returns before the store is touched
        let token = refresh::fetch_client_credentials_token(
            self.transport.as_ref(),
            &self.credentials,
            self.request_timeout,
        )
        .await?;

        self.store_token(&token)?;
        Ok(token)
    }
}
