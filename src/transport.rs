// HTTP transport seam
// Request envelope, buffered response and the reqwest-backed transport

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::error::{ClientError, Result};

/// Body of an outgoing request
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    /// Serialized as `application/json`
    Json(serde_json::Value),
    /// Serialized as `application/x-www-form-urlencoded`
    Form(Vec<(String, String)>),
    /// Serialized as `multipart/form-data`
    Multipart(Vec<Part>),
}

/// One field of a multipart body
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text { name: String, value: String },
    File { name: String, file: FileUpload },
}

/// File contents attached to a multipart request
#[derive(Debug, Clone, PartialEq)]
pub struct FileUpload {
    pub file_name: String,
    pub bytes: Bytes,
}

impl FileUpload {
    /// Wrap in-memory bytes, using `file_name` as the multipart filename
    pub fn from_bytes(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    /// Drain a reader into memory
    pub fn from_reader(file_name: impl Into<String>, mut reader: impl std::io::Read) -> Result<Self> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(Self::from_bytes(file_name, buf))
    }

    /// Read a file from disk; the multipart filename is the path's last component
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("file")
            .to_string();
        Ok(Self::from_bytes(file_name, bytes))
    }
}

/// Fully resolved request handed to a `Transport`
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: RequestBody::Empty,
            timeout: None,
        }
    }

    /// Look up a query parameter by name
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Buffered HTTP response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl ApiResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Body as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Turn a non-2xx response into `ClientError::UnexpectedStatus`.
    ///
    /// The client never calls this itself; status inspection is left to callers.
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        Err(ClientError::UnexpectedStatus {
            status: self.status.as_u16(),
            message: self.text(),
        })
    }
}

/// Performs HTTP requests on behalf of the client
#[async_trait]
pub trait Transport: Send + Sync {
    async fn perform(&self, request: HttpRequest) -> Result<ApiResponse>;
}

/// Transport backed by a pooled `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self { client })
    }

    /// Wrap an already configured client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn perform(&self, request: HttpRequest) -> Result<ApiResponse> {
        let HttpRequest {
            method,
            url,
            headers,
            query,
            body,
            timeout,
        } = request;

        tracing::debug!(method = %method, url = %url, "Sending HTTP request");

        let mut builder = self.client.request(method, url).headers(headers);
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Form(fields) => builder.form(&fields),
            RequestBody::Multipart(parts) => builder.multipart(multipart_form(parts)),
        };

        let response = builder.send().await.map_err(|e| {
            let error_kind = if e.is_timeout() {
                "timeout"
            } else if e.is_connect() {
                "connection_failed"
            } else if e.is_request() {
                "request_error"
            } else {
                "unknown"
            };
            tracing::warn!(error_kind = error_kind, error = %e, "HTTP request error");
            e
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        tracing::debug!(status = %status, "Received HTTP response");
        Ok(ApiResponse::new(status, headers, body))
    }
}

fn multipart_form(parts: Vec<Part>) -> reqwest::multipart::Form {
    parts
        .into_iter()
        .fold(reqwest::multipart::Form::new(), |form, part| match part {
            Part::Text { name, value } => form.text(name, value),
            Part::File { name, file } => form.part(
                name,
                reqwest::multipart::Part::bytes(file.bytes.to_vec()).file_name(file.file_name),
            ),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_for_status_passes_success_through() {
        let response = ApiResponse::new(StatusCode::CREATED, HeaderMap::new(), "ok");
        let response = response.error_for_status().unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.text(), "ok");
    }

    #[test]
    fn test_error_for_status_reports_body() {
        let response = ApiResponse::new(StatusCode::NOT_FOUND, HeaderMap::new(), "missing");
        match response.error_for_status() {
            Err(ClientError::UnexpectedStatus { status, message }) => {
                assert_eq!(status, 404);
                assert_eq!(message, "missing");
            }
            other => panic!("expected UnexpectedStatus, got {:?}", other),
        }
    }

    #[test]
    fn test_json_body_decoding() {
        let response = ApiResponse::new(
            StatusCode::OK,
            HeaderMap::new(),
            r#"{"request_id": "a", "status": "done"}"#,
        );
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["status"], "done");

        let broken = ApiResponse::new(StatusCode::OK, HeaderMap::new(), "<html>");
        assert!(matches!(
            broken.json::<serde_json::Value>(),
            Err(ClientError::Serialization(_))
        ));
    }

    #[test]
    fn test_file_upload_from_reader() {
        let upload = FileUpload::from_reader("scan.pdf", &b"%PDF-1.7"[..]).unwrap();
        assert_eq!(upload.file_name, "scan.pdf");
        assert_eq!(upload.bytes, Bytes::from_static(b"%PDF-1.7"));
    }

    #[tokio::test]
    async fn test_file_upload_from_path_uses_file_name() {
        let path = std::env::temp_dir().join(format!("upload-{}.txt", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, b"evidence").await.unwrap();

        let upload = FileUpload::from_path(&path).await.unwrap();
        assert_eq!(upload.file_name, path.file_name().unwrap().to_str().unwrap());
        assert_eq!(upload.bytes, Bytes::from_static(b"evidence"));

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[test]
    fn test_query_param_lookup() {
        let mut request = HttpRequest::new(
            Method::GET,
            Url::parse("https://site.com/v1/transaction/statuses/").unwrap(),
        );
        request.query.push(("request_ids".to_string(), "a,b".to_string()));
        assert_eq!(request.query_param("request_ids"), Some("a,b"));
        assert_eq!(request.query_param("missing"), None);
    }
}
