// Core API client - OAuth2 client-credentials token caching over HTTP

pub mod auth;
pub mod config;
pub mod error;
pub mod http_client;
pub mod logging;
pub mod records;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod transport;

pub use crate::auth::{Credentials, MemoryStore, SqliteStore, Token, TokenStore};
pub use crate::config::ClientConfig;
pub use crate::error::{ClientError, Result};
pub use crate::http_client::{CoreApiClient, RequestOptions};
pub use crate::transport::{ApiResponse, FileUpload, HttpRequest, Part, RequestBody, ReqwestTransport, Transport};
