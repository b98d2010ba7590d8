//! Session credential storage for the Voyager API
//!
//! Voyager authenticates by replaying a browser session: the `li_at` session
//! cookie plus the `JSESSIONID` cookie, whose value doubles as the CSRF token.
//! Credentials are captured outside this crate; the core only reads them,
//! marks them invalid, and records their last use.
//!
//! # Architecture
//!
//! - `CredentialStore` trait: the contract the transport client consumes
//! - `MemoryCredentialStore`: in-process store for tests and embedding
//! - `SqliteCredentialStore` (in [`crate::db`]): persistent store

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{CredentialError, Result};

/// A user's authenticated session against the internal API
///
/// Secret values are wrapped in `SecretString`, so they are zeroed on drop and
/// redacted from `Debug` output.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// `li_at` session cookie
    pub li_at: SecretString,
    /// `JSESSIONID` cookie, e.g. `"ajax:123456789"`
    pub jsessionid: SecretString,
    /// Optional secondary auth token (`li_a`)
    pub li_a: Option<SecretString>,
    /// Value sent in the `csrf-token` header
    pub csrf_token: SecretString,
    pub user_agent: Option<String>,
    pub set_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_valid: bool,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Credentials {
    /// Build credentials from captured cookies. The CSRF token is derived from
    /// `JSESSIONID` with surrounding quotes removed.
    pub fn new(li_at: impl Into<String>, jsessionid: impl Into<String>) -> Self {
        let jsessionid = jsessionid.into();
        let csrf_token = jsessionid.trim_matches('"').to_string();

        Self {
            li_at: SecretString::from(li_at.into()),
            jsessionid: SecretString::from(jsessionid),
            li_a: None,
            csrf_token: SecretString::from(csrf_token),
            user_agent: None,
            set_at: Utc::now(),
            expires_at: None,
            is_valid: true,
            last_used_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_set_at(mut self, set_at: DateTime<Utc>) -> Self {
        self.set_at = set_at;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_secondary_token(mut self, li_a: impl Into<String>) -> Self {
        self.li_a = Some(SecretString::from(li_a.into()));
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Valid and not expired
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_valid && !self.is_expired(now)
    }

    /// Time left before expiry; `None` when no expiry is known
    pub fn expires_in(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at
            .map(|expires_at| (expires_at - now).max(Duration::zero()))
    }

    /// Reject credentials missing a required cookie
    pub fn check(&self) -> std::result::Result<(), CredentialError> {
        if self.li_at.expose_secret().trim().is_empty() {
            return Err(CredentialError::EmptyCookie("li_at"));
        }
        if self.jsessionid.expose_secret().trim_matches('"').trim().is_empty() {
            return Err(CredentialError::EmptyCookie("JSESSIONID"));
        }
        Ok(())
    }

    /// `cookie` header value
    pub fn cookie_header(&self) -> String {
        let mut cookie = format!(
            "li_at={}; JSESSIONID=\"{}\"",
            self.li_at.expose_secret(),
            self.jsessionid.expose_secret().trim_matches('"')
        );
        if let Some(li_a) = &self.li_a {
            cookie.push_str("; li_a=");
            cookie.push_str(li_a.expose_secret());
        }
        cookie
    }
}

/// Per-user credential persistence consumed by the Voyager client
///
/// `invalidate` must be idempotent: invalidating twice, or invalidating a
/// user without credentials, is not an error.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<Credentials>>;

    /// Insert or replace a user's credentials. Empty cookies are rejected.
    async fn save(&self, user_id: &str, credentials: &Credentials) -> Result<()>;

    /// Mark the user's credentials as unusable
    async fn invalidate(&self, user_id: &str) -> Result<()>;

    /// Record a successful use. Fails with `CredentialError::NotFound` when
    /// the user has no stored credentials.
    async fn touch(&self, user_id: &str, at: DateTime<Utc>) -> Result<()>;

    fn backend_name(&self) -> &str;
}

/// In-process credential store
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, Credentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with one user's credentials
    pub fn with_user(user_id: &str, credentials: Credentials) -> Self {
        let store = Self::new();
        store
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user_id.to_string(), credentials);
        store
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, user_id: &str) -> Result<Option<Credentials>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(user_id).cloned())
    }

    async fn save(&self, user_id: &str, credentials: &Credentials) -> Result<()> {
        credentials.check()?;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(user_id.to_string(), credentials.clone());
        Ok(())
    }

    async fn invalidate(&self, user_id: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(credentials) = entries.get_mut(user_id) {
            credentials.is_valid = false;
        }
        Ok(())
    }

    async fn touch(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let credentials = entries
            .get_mut(user_id)
            .ok_or_else(|| CredentialError::NotFound(user_id.to_string()))?;
        credentials.last_used_at = Some(at);
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
