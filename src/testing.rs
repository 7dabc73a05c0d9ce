//! Scripted transport for tests
//!
//! Responses are queued per URL path. Each request pops the next queued
//! response; the last one stays in place and answers every later request.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::Result;
use crate::transport::{ApiResponse, HttpRequest, Transport};

type ResponseQueues = Arc<Mutex<HashMap<String, VecDeque<ApiResponse>>>>;
type RequestLog = Arc<Mutex<Vec<HttpRequest>>>;

/// In-memory `Transport` that records every request it receives
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    responses: ResponseQueues,
    requests: RequestLog,
}

// A panicking test poisons the lock; later reads still want the data
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw response for `path`
    pub fn push_response(&self, path: &str, status: StatusCode, body: &str) {
        self.push(path, ApiResponse::new(status, HeaderMap::new(), body.to_string()));
    }

    /// Queue a JSON response for `path`
    pub fn push_json(&self, path: &str, status: StatusCode, body: serde_json::Value) {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.push(path, ApiResponse::new(status, headers, body.to_string()));
    }

    /// Queue a successful token response carrying `access_token`
    pub fn push_token(&self, access_token: &str, expires_in: u64) {
        self.push_json(
            crate::auth::TOKEN_PATH,
            StatusCode::OK,
            serde_json::json!({"access_token": access_token, "expires_in": expires_in}),
        );
    }

    fn push(&self, path: &str, response: ApiResponse) {
        lock(&self.responses)
            .entry(path.to_string())
            .or_default()
            .push_back(response);
    }

    /// All requests in the order they were performed
    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }

    /// Requests whose URL path equals `path`
    pub fn requests_to(&self, path: &str) -> Vec<HttpRequest> {
        lock(&self.requests)
            .iter()
            .filter(|req| req.url.path() == path)
            .cloned()
            .collect()
    }

    pub fn request_count(&self, path: &str) -> usize {
        self.requests_to(path).len()
    }

    pub fn clear_requests(&self) {
        lock(&self.requests).clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn perform(&self, request: HttpRequest) -> Result<ApiResponse> {
        let path = request.url.path().to_string();
        lock(&self.requests).push(request);

        let mut responses = lock(&self.responses);
        let response = match responses.get_mut(&path) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };

        Ok(response.unwrap_or_else(|| {
            ApiResponse::new(
                StatusCode::NOT_FOUND,
                HeaderMap::new(),
                format!("no mock response configured for {}", path),
            )
        }))
    }
}
