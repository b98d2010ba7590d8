//! Voyager transport client
//!
//! [`VoyagerClient::request`] is the single path to the network. For each
//! call it loads the user's session, attaches cookies and anti-forgery
//! headers, consults the per-endpoint rate limiter, enforces the call timeout,
//! retries transient failures with backoff, and classifies the outcome into a
//! [`Response`]. It never panics and never returns a bare `Err`.

use chrono::Duration as ChronoDuration;
use reqwest::Url;
use secrecy::ExposeSecret;
use serde::de::{DeserializeOwned, IgnoredAny};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use super::endpoints::{Endpoint, RequestSpec};
use super::http::{HttpRequest, HttpResponse, HttpTransport, TransportFailureKind};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::credentials::{CredentialStore, Credentials};
use crate::error::{ApiResult, ErrorCode, ErrorInfo};
use crate::rate_limiter::{Admission, RateLimitPolicy, RateLimitState, RateLimiter};
use crate::retry::RetryConfig;

const ACCEPT: &str = "application/vnd.linkedin.normalized+json+2.1";
const RESTLI_PROTOCOL_VERSION: &str = "2.0.0";

/// Normalised outcome of one Voyager call
#[derive(Debug, Clone, PartialEq)]
pub struct Response<T> {
    pub result: ApiResult<T>,
    /// HTTP status of the last attempt; `None` when no response was received
    pub status_code: Option<u16>,
    pub headers: BTreeMap<String, String>,
}

impl<T> Response<T> {
    fn failure(error: ErrorInfo) -> Self {
        Self {
            status_code: error.status(),
            result: Err(error),
            headers: BTreeMap::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn data(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        self.result.as_ref().err()
    }

    pub fn into_result(self) -> ApiResult<T> {
        self.result
    }
}

/// Health of the stored session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialStatus {
    pub is_valid: bool,
    /// `None` when the session has no known expiry
    pub expires_in: Option<ChronoDuration>,
    pub needs_refresh: bool,
}

/// Client bound to one user's session
pub struct VoyagerClient {
    user_id: String,
    config: Arc<Config>,
    store: Arc<dyn CredentialStore>,
    transport: Arc<dyn HttpTransport>,
    limiter: RateLimiter,
    clock: Arc<dyn Clock>,
}

impl VoyagerClient {
    pub fn new(
        user_id: impl Into<String>,
        config: Arc<Config>,
        store: Arc<dyn CredentialStore>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let limiter = RateLimiter::new(config.rate_limits.clone());
        Self {
            user_id: user_id.into(),
            config,
            store,
            transport,
            limiter,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source used for expiry checks and rate-limit windows
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn rate_limit_state(&self, endpoint: Endpoint) -> Option<RateLimitState> {
        self.limiter.state(endpoint.name())
    }

    /// Issue one logical call, retrying transient failures
    pub async fn request<T: DeserializeOwned>(&self, spec: RequestSpec) -> Response<T> {
        let request_id = Uuid::new_v4();

        let credentials = match self.load_credentials().await {
            Ok(credentials) => credentials,
            Err(error) => {
                debug!(endpoint = %spec.endpoint, code = %error.code(), "No usable LinkedIn session");
                return Response::failure(error);
            }
        };

        if leaks_credentials(&spec, &credentials) {
            return Response::failure(ErrorInfo::validation(
                "Request path or query must not carry session credentials",
            ));
        }

        let request = match self.build_request(&spec, &credentials, request_id) {
            Ok(request) => request,
            Err(error) => return Response::failure(error),
        };

        let timeout = spec.timeout.unwrap_or_else(|| self.config.voyager.timeout());
        let retry = &self.config.retry;
        let mut attempt = 0;

        loop {
            attempt += 1;

            if let Err(error) = self.admit(spec.endpoint).await {
                return Response::failure(error);
            }

            debug!(
                request_id = %request_id,
                endpoint = %spec.endpoint,
                method = %request.method,
                attempt,
                "Sending Voyager request"
            );

            let mut response: Response<T> =
                self.send_once(spec.endpoint, request.clone(), timeout).await;

            let error = match &response.result {
                Ok(_) => {
                    self.touch().await;
                    return response;
                }
                Err(error) => error.clone(),
            };

            if error.status() == Some(401) {
                self.invalidate("authentication rejected").await;
            }

            let upstream_wait = match error.code() {
                ErrorCode::RateLimited => retry_after(&response.headers),
                _ => None,
            };
            if let Some(wait) = upstream_wait {
                let retry_at = self.clock.now() + ChronoDuration::seconds(wait.as_secs() as i64);
                response.result = Err(error.clone().with_retry_at(retry_at));
            }

            if !error.retryable() || attempt >= retry.max_attempts {
                debug!(
                    request_id = %request_id,
                    endpoint = %spec.endpoint,
                    code = %error.code(),
                    attempt,
                    "Voyager request failed"
                );
                return response;
            }

            let Some(delay) = retry_delay(retry, attempt, upstream_wait) else {
                debug!(
                    request_id = %request_id,
                    endpoint = %spec.endpoint,
                    attempt,
                    "Retry-After exceeds the backoff cap, leaving the retry to the caller"
                );
                return response;
            };

            warn!(
                request_id = %request_id,
                endpoint = %spec.endpoint,
                code = %error.code(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying Voyager request"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Call the identity endpoint to check the stored session
    ///
    /// A 401 from that call invalidates the stored credentials.
    pub async fn validate_credentials(&self) -> CredentialStatus {
        let identity: Response<IgnoredAny> = self.request(RequestSpec::identity()).await;
        let is_valid = identity.is_success();

        let now = self.clock.now();
        let expires_in = match self.store.get(&self.user_id).await {
            Ok(Some(credentials)) => credentials.expires_in(now),
            _ => None,
        };

        let threshold = ChronoDuration::seconds(
            i64::try_from(self.config.voyager.refresh_threshold_secs).unwrap_or(i64::MAX),
        );
        let needs_refresh = !is_valid || expires_in.is_some_and(|left| left < threshold);

        CredentialStatus {
            is_valid,
            expires_in,
            needs_refresh,
        }
    }

    async fn load_credentials(&self) -> ApiResult<Credentials> {
        let stored = self
            .store
            .get(&self.user_id)
            .await
            .map_err(|e| ErrorInfo::unauthorized(format!("Credential store unavailable: {e}")))?;

        let credentials =
            stored.ok_or_else(|| ErrorInfo::unauthorized("No LinkedIn session stored"))?;

        if credentials.is_usable(self.clock.now()) {
            return Ok(credentials);
        }

        if !credentials.is_valid {
            return Err(ErrorInfo::unauthorized("LinkedIn session has been invalidated"));
        }

        self.invalidate("session expired").await;
        Err(ErrorInfo::unauthorized("LinkedIn session expired"))
    }

    async fn invalidate(&self, reason: &str) {
        match self.store.invalidate(&self.user_id).await {
            Ok(()) => warn!(user_id = %self.user_id, reason, "Invalidated LinkedIn session"),
            Err(e) => warn!(user_id = %self.user_id, error = %e, "Failed to invalidate LinkedIn session"),
        }
    }

    async fn touch(&self) {
        if let Err(e) = self.store.touch(&self.user_id, self.clock.now()).await {
            warn!(user_id = %self.user_id, error = %e, "Failed to record session use");
        }
    }

    /// Wait for or reject a rate-limited endpoint according to the policy
    async fn admit(&self, endpoint: Endpoint) -> ApiResult<()> {
        loop {
            let now = self.clock.now();
            let reset_at = match self.limiter.check_and_record(endpoint.name(), now) {
                Admission::Allowed => return Ok(()),
                Admission::Limited { reset_at } => reset_at,
            };

            match self.limiter.policy() {
                RateLimitPolicy::Reject => {
                    debug!(endpoint = %endpoint, %reset_at, "Rate limit reached, rejecting");
                    return Err(ErrorInfo::rate_limited(
                        format!("Local rate limit reached for {endpoint}"),
                        reset_at,
                    ));
                }
                RateLimitPolicy::Queue => {
                    let wait = (reset_at - now).to_std().unwrap_or(Duration::ZERO);
                    debug!(endpoint = %endpoint, wait_ms = wait.as_millis() as u64, "Rate limit reached, queueing");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    fn build_request(
        &self,
        spec: &RequestSpec,
        credentials: &Credentials,
        request_id: Uuid,
    ) -> ApiResult<HttpRequest> {
        // the url crate silently skips dot segments
        if spec
            .segments
            .iter()
            .any(|segment| matches!(segment.trim(), "" | "." | ".."))
        {
            return Err(ErrorInfo::validation(format!(
                "Invalid path segment in {}",
                spec.path()
            )));
        }

        if spec.use_proxy && self.config.voyager.proxy_url.is_none() {
            return Err(ErrorInfo::validation(
                "Request asks for a proxy but voyager.proxy_url is not set",
            ));
        }

        let mut url = Url::parse(&self.config.voyager.base_url)
            .map_err(|e| ErrorInfo::validation(format!("Invalid Voyager base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ErrorInfo::validation("Voyager base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(spec.segments.iter());
        if !spec.query.is_empty() {
            url.query_pairs_mut().extend_pairs(spec.query.iter());
        }

        let user_agent = credentials
            .user_agent
            .as_deref()
            .unwrap_or(&self.config.voyager.user_agent);

        let mut headers = BTreeMap::new();
        headers.insert("cookie".to_string(), credentials.cookie_header());
        headers.insert(
            "csrf-token".to_string(),
            credentials.csrf_token.expose_secret().to_string(),
        );
        headers.insert("user-agent".to_string(), user_agent.to_string());
        headers.insert(
            "x-restli-protocol-version".to_string(),
            RESTLI_PROTOCOL_VERSION.to_string(),
        );
        headers.insert("x-li-lang".to_string(), self.config.voyager.lang.clone());
        headers.insert("accept".to_string(), ACCEPT.to_string());
        headers.insert("x-request-id".to_string(), request_id.to_string());

        let body = spec.body.as_ref().map(|body| body.to_string());
        if body.is_some() {
            headers.insert("content-type".to_string(), "application/json".to_string());
        }

        for (name, value) in &spec.headers {
            headers.insert(name.to_ascii_lowercase(), value.clone());
        }

        Ok(HttpRequest {
            method: spec.method,
            url: url.to_string(),
            headers,
            body,
            use_proxy: spec.use_proxy,
        })
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        request: HttpRequest,
        timeout: Duration,
    ) -> Response<T> {
        match tokio::time::timeout(timeout, self.transport.execute(request)).await {
            Err(_) => Response::failure(ErrorInfo::timeout(format!(
                "{endpoint} did not respond within {}ms",
                timeout.as_millis()
            ))),
            Ok(Err(failure)) => Response::failure(match failure.kind {
                TransportFailureKind::Timeout => ErrorInfo::timeout(failure.message),
                TransportFailureKind::Connect | TransportFailureKind::Other => {
                    ErrorInfo::network(failure.message)
                }
            }),
            Ok(Ok(response)) => decode(endpoint, response),
        }
    }
}

fn decode<T: DeserializeOwned>(endpoint: Endpoint, response: HttpResponse) -> Response<T> {
    let result = if response.is_success() {
        let body = if response.body.trim().is_empty() {
            "null"
        } else {
            response.body.as_str()
        };
        serde_json::from_str(body).map_err(|e| {
            ErrorInfo::invalid_response(format!("Could not decode {endpoint} response: {e}"))
        })
    } else {
        Err(ErrorInfo::from_status(
            response.status,
            upstream_message(&response),
        ))
    };

    Response {
        result,
        status_code: Some(response.status),
        headers: response.headers,
    }
}

/// Best-effort human-readable message from an error body
fn upstream_message(response: &HttpResponse) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(&response.body)
        .ok()
        .and_then(|body| {
            body.get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        });

    match from_json {
        Some(message) => message,
        None if response.body.trim().is_empty() => format!("HTTP {}", response.status),
        None => response.body.chars().take(200).collect(),
    }
}

/// Longest upstream `Retry-After` honoured; larger hints are clamped
const MAX_RETRY_AFTER_SECS: u64 = 7 * 24 * 60 * 60;

/// Upstream `Retry-After` in delta-seconds form
fn retry_after(headers: &BTreeMap<String, String>) -> Option<Duration> {
    headers
        .get("retry-after")
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS)))
}

/// Backoff for the given failed attempt. An upstream wait extends the
/// backoff; `None` when it is longer than `max_delay_ms` allows.
fn retry_delay(retry: &RetryConfig, attempt: u32, upstream_wait: Option<Duration>) -> Option<Duration> {
    let backoff = retry.delay_for_attempt(attempt);
    match upstream_wait {
        None => Some(backoff),
        Some(wait) if wait > Duration::from_millis(retry.max_delay_ms) => None,
        Some(wait) => Some(backoff.max(wait)),
    }
}

fn leaks_credentials(spec: &RequestSpec, credentials: &Credentials) -> bool {
    let secrets = [
        credentials.li_at.expose_secret(),
        credentials.jsessionid.expose_secret().trim_matches('"'),
    ];

    spec.segments
        .iter()
        .map(String::as_str)
        .chain(spec.query.iter().flat_map(|(k, v)| [k.as_str(), v.as_str()]))
        .any(|part| {
            part.contains("li_at=")
                || part.contains("JSESSIONID=")
                || secrets
                    .iter()
                    .any(|secret| !secret.is_empty() && part.contains(secret))
        })
}
