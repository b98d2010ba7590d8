//! HTTP transport seam
//!
//! [`VoyagerClient`](super::client::VoyagerClient) talks to the network only
//! through [`HttpTransport`]. Production code uses [`ReqwestTransport`]; tests
//! script responses with [`MockTransport`](super::mock::MockTransport).

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

use crate::config::VoyagerConfig;
use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully resolved outbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    /// Lower-cased header names
    pub headers: BTreeMap<String, String>,
    /// Serialized JSON body
    pub body: Option<String>,
    pub use_proxy: bool,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Lower-cased header names
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailureKind {
    Timeout,
    Connect,
    Other,
}

/// The request never produced an HTTP response
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportFailure {
    pub kind: TransportFailureKind,
    pub message: String,
}

impl TransportFailure {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: TransportFailureKind::Timeout,
            message: message.into(),
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self {
            kind: TransportFailureKind::Connect,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: TransportFailureKind::Other,
            message: message.into(),
        }
    }
}

/// Executes one HTTP exchange. Implementations do not retry.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportFailure>;
}

/// `reqwest` transport with an optional proxied client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    direct: reqwest::Client,
    proxied: Option<reqwest::Client>,
}

impl ReqwestTransport {
    /// Build direct and (when `proxy_url` is set) proxied clients
    ///
    /// Timeouts are enforced by the caller, so the clients carry none.
    pub fn new(config: &VoyagerConfig) -> Result<Self> {
        let direct = reqwest::Client::builder()
            .build()
            .map_err(|e| build_error("voyager", e))?;

        let proxied = match &config.proxy_url {
            Some(url) => {
                let proxy = reqwest::Proxy::all(url.as_str())
                    .map_err(|e| build_error("voyager.proxy_url", e))?;
                Some(
                    reqwest::Client::builder()
                        .proxy(proxy)
                        .build()
                        .map_err(|e| build_error("voyager.proxy_url", e))?,
                )
            }
            None => None,
        };

        Ok(Self { direct, proxied })
    }

    fn client_for(&self, use_proxy: bool) -> &reqwest::Client {
        match (&self.proxied, use_proxy) {
            (Some(proxied), true) => proxied,
            (None, true) => {
                warn!("Proxy requested but no proxy_url configured, sending directly");
                &self.direct
            }
            _ => &self.direct,
        }
    }
}

fn build_error(field: &str, error: reqwest::Error) -> crate::error::LinkpostError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: error.to_string(),
    }
    .into()
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportFailure> {
        let client = self.client_for(request.use_proxy);
        let mut builder = match request.method {
            HttpMethod::Get => client.get(&request.url),
            HttpMethod::Post => client.post(&request.url),
            HttpMethod::Delete => client.delete(&request.url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportFailure::timeout(format!("request timeout: {}", e))
            } else if e.is_connect() {
                TransportFailure::connect(format!("connection failed: {}", e))
            } else {
                TransportFailure::other(format!("request failed: {}", e))
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| TransportFailure::other(format!("failed to read response body: {}", e)))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
