use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::auth::{MemoryStore, SqliteStore, Token, TokenManager, TokenStore};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::transport::{ApiResponse, HttpRequest, Part, RequestBody, ReqwestTransport, Transport};

/// Per-call request options: extra headers, query parameters and body
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header; overrides the client's defaults on conflict
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        self.body = RequestBody::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = RequestBody::Form(fields);
        self
    }

    pub fn multipart(mut self, parts: Vec<Part>) -> Self {
        self.body = RequestBody::Multipart(parts);
        self
    }
}

/// Client for the Core API
///
/// Attaches a bearer token to every request and, for GET and POST,
/// refreshes the token and retries once when the API answers 401.
pub struct CoreApiClient {
    /// Token lifecycle and credentials
    tokens: TokenManager,

    /// Transport used for API calls
    transport: Arc<dyn Transport>,

    /// Per-request timeout
    request_timeout: Duration,

    /// Extend the 401 retry to PUT, PATCH and DELETE
    retry_all_methods: bool,
}

impl CoreApiClient {
    /// Create a client with default settings.
    /// Without a `token_store` the token is kept in memory for this instance only.
    pub fn new(
        api_base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        api_version: impl fmt::Display,
        token_store: Option<Arc<dyn TokenStore>>,
    ) -> Result<Self> {
        let config = ClientConfig::new(api_base_url, client_id, client_secret, api_version);
        let transport = Arc::new(ReqwestTransport::new()?);
        Ok(Self::with_transport(&config, transport, token_store))
    }

    /// Create a client from configuration, opening the SQLite token store if one is configured
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let store: Option<Arc<dyn TokenStore>> = match &config.token_db_file {
            Some(path) => Some(Arc::new(SqliteStore::open(path)?)),
            None => None,
        };
        let transport = Arc::new(ReqwestTransport::new()?);
        Ok(Self::with_transport(config, transport, store))
    }

    /// Create a client around an explicit transport and store.
    /// `config.token_db_file` is ignored here; pass the store directly.
    pub fn with_transport(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        token_store: Option<Arc<dyn TokenStore>>,
    ) -> Self {
        let store = token_store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let tokens = TokenManager::new(
            config.credentials(),
            store,
            transport.clone(),
            config.token_grace_period(),
            config.request_timeout(),
        );

        Self {
            tokens,
            transport,
            request_timeout: config.request_timeout(),
            retry_all_methods: config.retry_all_methods,
        }
    }

    pub fn api_version(&self) -> &str {
        &self.tokens.credentials().api_version
    }

    /// True when the stored token is absent or inside the renewal window
    pub fn is_token_expired(&self) -> Result<bool> {
        self.tokens.is_token_expired()
    }

    /// Make sure a valid token is stored, fetching one if needed
    pub async fn ensure_token(&self) -> Result<Token> {
        self.tokens.ensure_token().await
    }

    /// Fetch a new token unconditionally
    pub async fn refresh_token(&self) -> Result<Token> {
        self.tokens.refresh_token().await
    }

    pub fn current_token(&self) -> Result<Option<Token>> {
        self.tokens.current_token()
    }

    /// Seed the store with a token obtained elsewhere
    pub fn store_token(&self, token: &Token) -> Result<()> {
        self.tokens.store_token(token)
    }

    /// Default headers plus `extra_headers`; the caller's entries win
    pub async fn build_headers(&self, extra_headers: &[(String, String)]) -> Result<HeaderMap> {
        let token = self.tokens.ensure_token().await?;
        headers_for(&token, extra_headers)
    }

    /// Join `path` onto the base URL; an absolute `path` replaces it
    pub fn get_absolute_url(&self, path: &str) -> Result<Url> {
        let base = Url::parse(&self.tokens.credentials().api_base_url)?;
        Ok(base.join(path)?)
    }

    /// Versioned URL: base joined with `v{api_version}{path}`
    pub fn get_api_url(&self, path: &str) -> Result<Url> {
        self.get_absolute_url(&format!("v{}{}", self.api_version(), path))
    }

    /// Dispatch a request with the bearer token attached.
    ///
    /// Non-2xx responses are returned, not raised. A 401 on GET or POST
    /// (or any method with `retry_all_methods`) forces a token refresh and
    /// one more attempt, whose response is returned whatever its status.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse> {
        let RequestOptions {
            headers: extra_headers,
            query,
            body,
        } = options;

        let mut request = HttpRequest::new(method, self.get_absolute_url(path)?);
        request.headers = self.build_headers(&extra_headers).await?;
        request.query = query;
        request.body = body;
        request.timeout = Some(self.request_timeout);

        if !self.retries_on_unauthorized(&request.method) {
            return self.transport.perform(request).await;
        }

        let response = self.transport.perform(request.clone()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::warn!(
            method = %request.method,
            url = %request.url,
            "Received 401, refreshing token and retrying..."
        );

        let token = self.tokens.refresh_token().await?;
        request.headers = headers_for(&token, &extra_headers)?;

        let response = self.transport.perform(request).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::error!("Still unauthorized after token refresh, giving up");
        }
        Ok(response)
    }

    fn retries_on_unauthorized(&self, method: &Method) -> bool {
        self.retry_all_methods || *method == Method::GET || *method == Method::POST
    }

    pub async fn get(&self, path: &str, options: RequestOptions) -> Result<ApiResponse> {
        self.request(Method::GET, path, options).await
    }

    pub async fn post(&self, path: &str, options: RequestOptions) -> Result<ApiResponse> {
        self.request(Method::POST, path, options).await
    }

    pub async fn put(&self, path: &str, options: RequestOptions) -> Result<ApiResponse> {
        self.request(Method::PUT, path, options).await
    }

    pub async fn patch(&self, path: &str, options: RequestOptions) -> Result<ApiResponse> {
        self.request(Method::PATCH, path, options).await
    }

    pub async fn delete(&self, path: &str, options: RequestOptions) -> Result<ApiResponse> {
        self.request(Method::DELETE, path, options).await
    }
}

/// `Accept` and `Authorization` for `token`, then `extra_headers` on top
fn headers_for(token: &Token, extra_headers: &[(String, String)]) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json;"));
    headers.insert(AUTHORIZATION, bearer(token)?);

    for (name, value) in extra_headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ClientError::InvalidHeader(name.clone()))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| ClientError::InvalidHeader(format!("{}: {}", name, value)))?;
        headers.insert(header_name, header_value);
    }

    Ok(headers)
}

fn bearer(token: &Token) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.access_token)).map_err(|_| {
        ClientError::Authentication("access token is not a valid header value".to_string())
    })?;
    value.set_sensitive(true);
    Ok(value)
}
