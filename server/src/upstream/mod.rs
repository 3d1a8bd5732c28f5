//! Outbound calls to the upstream platform API.
//!
//! Callers build an [`UpstreamRequest`] relative to the configured base URL and
//! get back either the successful response or an [`UpstreamError`] they can
//! match on. Any non-2xx status is an error.

pub mod client;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;

pub use client::HttpUpstream;

use crate::error::{ProxyError, Result};

#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    /// Path relative to the upstream base URL, query string included.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl UpstreamRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .and_then(|value| value.split(';').next())
            .map(|mime| {
                let mime = mime.trim().to_ascii_lowercase();
                mime == "application/json" || mime.ends_with("+json")
            })
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    #[error("Request failed with status code {status}")]
    Status { status: u16 },

    #[error("Upstream unreachable: {0}")]
    Transport(String),
}

impl UpstreamError {
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status } => Some(*status),
            UpstreamError::Transport(_) => None,
        }
    }
}

/// Tenant header attached to every upstream call.
#[derive(Debug, Clone)]
pub struct TenantHeader {
    name: HeaderName,
    value: HeaderValue,
}

impl TenantHeader {
    pub fn new(name: &str, tenant_id: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ProxyError::Config(format!("Invalid tenant header name '{}'", name)))?;
        let value = HeaderValue::from_str(tenant_id)
            .map_err(|_| ProxyError::Config("Invalid tenant identifier".to_string()))?;
        Ok(Self { name, value })
    }

    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(self.name.clone(), self.value.clone());
    }
}

#[async_trait]
pub trait Upstream: Send + Sync {
    async fn invoke(
        &self,
        request: UpstreamRequest,
    ) -> std::result::Result<UpstreamResponse, UpstreamError>;
}
