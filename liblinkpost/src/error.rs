//! Error types for Linkpost
//!
//! Two layers live here:
//!
//! - [`LinkpostError`] covers setup and infrastructure failures (configuration,
//!   database, credential storage). These are ordinary Rust errors returned by
//!   constructors and store implementations.
//! - [`ErrorInfo`] is the closed, classified failure produced by the Voyager
//!   transport for every unsuccessful call. It is passed by value up through
//!   the post/metrics services and the unified orchestrator without being
//!   reinterpreted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LinkpostError>;

/// Outcome of a Voyager-backed operation.
pub type ApiResult<T> = std::result::Result<T, ErrorInfo>;

#[derive(Error, Debug)]
pub enum LinkpostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Voyager error: {0}")]
    Api(#[from] ErrorInfo),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("No credentials stored for user {0}")]
    NotFound(String),

    #[error("Session cookie {0} is empty")]
    EmptyCookie(&'static str),
}

/// Closed classification of every Voyager failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// 401, or no usable session. Needs a credential refresh.
    Unauthorized,
    /// 403
    Forbidden,
    /// 429 upstream, or the local per-endpoint limiter.
    RateLimited,
    /// 5xx and other unexpected statuses.
    ServerError,
    Timeout,
    NetworkError,
    /// Caller input rejected before any network call, or a 4xx rejection.
    ValidationError,
    /// 404
    NotFound,
    /// 2xx response whose body could not be decoded.
    InvalidResponse,
}

impl ErrorCode {
    /// Classify a non-success HTTP status.
    ///
    /// Unlisted 4xx statuses are request rejections (`ValidationError`);
    /// everything else that is not a success is a `ServerError`.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            429 => Self::RateLimited,
            400..=499 => Self::ValidationError,
            _ => Self::ServerError,
        }
    }

    /// Whether a failure with this code may succeed when retried.
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::ServerError | Self::Timeout | Self::NetworkError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::RateLimited => "rate-limited",
            Self::ServerError => "server-error",
            Self::Timeout => "timeout",
            Self::NetworkError => "network-error",
            Self::ValidationError => "validation-error",
            Self::NotFound => "not-found",
            Self::InvalidResponse => "invalid-response",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure returned by the Voyager layer.
///
/// `retryable` is derived from the code when the value is built and cannot be
/// changed afterwards.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{code}: {message}")]
pub struct ErrorInfo {
    code: ErrorCode,
    message: String,
    status: Option<u16>,
    retryable: bool,
    retry_at: Option<DateTime<Utc>>,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
            retryable: code.is_retryable(),
            retry_at: None,
        }
    }

    /// Build an error from a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::new(ErrorCode::from_status(status), message)
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_at: DateTime<Utc>) -> Self {
        Self {
            retry_at: Some(retry_at),
            ..Self::new(ErrorCode::RateLimited, message)
        }
    }

    /// Attach the earliest retry time, e.g. from an upstream `Retry-After`
    pub fn with_retry_at(mut self, retry_at: DateTime<Utc>) -> Self {
        self.retry_at = Some(retry_at);
        self
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NetworkError, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidResponse, message)
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn retryable(&self) -> bool {
        self.retryable
    }

    /// Earliest time a retry can succeed, when known (local rate limiting or
    /// an upstream `Retry-After`).
    pub fn retry_at(&self) -> Option<DateTime<Utc>> {
        self.retry_at
    }
}
