//! Unified LinkedIn service
//!
//! Routes each operation either to the official API or to the internal
//! Voyager API, and tags every result with where it came from.
//!
//! # Routing
//!
//! Recomputed on every call:
//!
//! 1. `prefer_voyager` set: Voyager, reason `user-preference`
//! 2. Built for a scheduled job: Voyager, reason `scheduled-job`
//! 3. Otherwise the official API is tried first. Its failure is classified
//!    by [`classify_failure`] and the call falls back to Voyager once.
//!
//! The Voyager services are built lazily on first use through a
//! [`ServiceFactory`] and reused for the lifetime of the orchestrator.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::config::{Config, UnifiedConfig};
use crate::credentials::CredentialStore;
use crate::error::{ApiResult, ErrorInfo, Result};
use crate::types::{
    AnalyticsSummary, ContentAnalytics, CreatePostOptions, PostAnalytics, PostWithAnalytics,
    Profile, ProfileStatistics, PublishedPost, TimePeriod,
};
use crate::voyager::{
    HttpTransport, MetricsService, PostService, ReqwestTransport, VoyagerClient,
};

/// Why a call went to the internal API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackTrigger {
    Unauthorized,
    Forbidden,
    RateLimited,
    ServerError,
    Timeout,
    NetworkError,
    UserPreference,
    ScheduledJob,
}

impl FallbackTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::RateLimited => "rate-limited",
            Self::ServerError => "server-error",
            Self::Timeout => "timeout",
            Self::NetworkError => "network-error",
            Self::UserPreference => "user-preference",
            Self::ScheduledJob => "scheduled-job",
        }
    }
}

impl std::fmt::Display for FallbackTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an official API call failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfficialFailure {
    /// Non-success HTTP status
    Status(u16),
    Timeout,
    Network,
    /// No official implementation for this operation
    Unavailable,
}

impl OfficialFailure {
    /// Classify a free-text error from an official client
    pub fn from_message(message: &str) -> Self {
        let message = message.to_lowercase();
        if message.contains("timeout") {
            Self::Timeout
        } else if message.contains("network") || message.contains("fetch") {
            Self::Network
        } else {
            Self::Unavailable
        }
    }
}

impl std::fmt::Display for OfficialFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status(status) => write!(f, "HTTP {status}"),
            Self::Timeout => f.write_str("timeout"),
            Self::Network => f.write_str("network error"),
            Self::Unavailable => f.write_str("unavailable"),
        }
    }
}

/// Map an official API failure to a fallback reason. Total: every input has a reason.
pub fn classify_failure(failure: &OfficialFailure) -> FallbackTrigger {
    match failure {
        OfficialFailure::Status(401) => FallbackTrigger::Unauthorized,
        OfficialFailure::Status(403) => FallbackTrigger::Forbidden,
        OfficialFailure::Status(429) => FallbackTrigger::RateLimited,
        OfficialFailure::Status(_) => FallbackTrigger::ServerError,
        OfficialFailure::Timeout => FallbackTrigger::Timeout,
        OfficialFailure::Network => FallbackTrigger::NetworkError,
        OfficialFailure::Unavailable => FallbackTrigger::ServerError,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Official,
    Internal,
}

/// Caller-facing outcome; `source` is set on failures too
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceResult<T> {
    pub result: ApiResult<T>,
    pub source: Source,
    pub fallback_triggered: bool,
    pub fallback_reason: Option<FallbackTrigger>,
}

impl<T> ServiceResult<T> {
    fn official(value: T) -> Self {
        Self {
            result: Ok(value),
            source: Source::Official,
            fallback_triggered: false,
            fallback_reason: None,
        }
    }

    fn internal(result: ApiResult<T>, reason: FallbackTrigger) -> Self {
        Self {
            result,
            source: Source::Internal,
            fallback_triggered: true,
            fallback_reason: Some(reason),
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

/// Official LinkedIn API
///
/// Every operation defaults to [`OfficialFailure::Unavailable`], so an
/// implementation only overrides what it supports.
#[async_trait]
pub trait OfficialApi: Send + Sync {
    async fn create_post(
        &self,
        _options: &CreatePostOptions,
    ) -> std::result::Result<PublishedPost, OfficialFailure> {
        Err(OfficialFailure::Unavailable)
    }

    async fn edit_post(
        &self,
        _post_id: &str,
        _new_content: &str,
    ) -> std::result::Result<PublishedPost, OfficialFailure> {
        Err(OfficialFailure::Unavailable)
    }

    async fn delete_post(&self, _post_id: &str) -> std::result::Result<(), OfficialFailure> {
        Err(OfficialFailure::Unavailable)
    }

    async fn repost(
        &self,
        _original_id: &str,
        _commentary: Option<&str>,
    ) -> std::result::Result<PublishedPost, OfficialFailure> {
        Err(OfficialFailure::Unavailable)
    }

    async fn get_profile(&self) -> std::result::Result<Profile, OfficialFailure> {
        Err(OfficialFailure::Unavailable)
    }

    async fn get_summary(
        &self,
        _period: TimePeriod,
    ) -> std::result::Result<AnalyticsSummary, OfficialFailure> {
        Err(OfficialFailure::Unavailable)
    }

    async fn get_post_analytics(
        &self,
        _activity_id: &str,
    ) -> std::result::Result<PostAnalytics, OfficialFailure> {
        Err(OfficialFailure::Unavailable)
    }

    async fn get_profile_statistics(
        &self,
        _profile_id: Option<&str>,
    ) -> std::result::Result<ProfileStatistics, OfficialFailure> {
        Err(OfficialFailure::Unavailable)
    }

    async fn get_recent_posts_with_analytics(
        &self,
        _limit: usize,
    ) -> std::result::Result<Vec<PostWithAnalytics>, OfficialFailure> {
        Err(OfficialFailure::Unavailable)
    }

    async fn get_content_analytics(
        &self,
        _period: TimePeriod,
        _post_limit: usize,
    ) -> std::result::Result<ContentAnalytics, OfficialFailure> {
        Err(OfficialFailure::Unavailable)
    }
}

/// No official integration; every call falls back
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableOfficialApi;

impl OfficialApi for UnavailableOfficialApi {}

/// Voyager handles bound to one user
pub struct VoyagerServices {
    pub client: Arc<VoyagerClient>,
    pub posts: PostService,
    pub metrics: MetricsService,
}

impl VoyagerServices {
    pub fn new(client: Arc<VoyagerClient>) -> Self {
        Self {
            posts: PostService::new(client.clone()),
            metrics: MetricsService::new(client.clone()),
            client,
        }
    }
}

/// Builds the Voyager services for a user on first use
#[async_trait]
pub trait ServiceFactory: Send + Sync {
    async fn build(&self, user_id: &str) -> ApiResult<VoyagerServices>;
}

/// Factory over a shared config, credential store and transport
pub struct VoyagerServiceFactory {
    config: Arc<Config>,
    store: Arc<dyn CredentialStore>,
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
}

impl VoyagerServiceFactory {
    /// Fails when `config` does not pass [`Config::validate`]
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn CredentialStore>,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            transport,
            clock: Arc::new(SystemClock),
        })
    }

    /// Factory using the `reqwest` transport
    pub fn from_config(config: Arc<Config>, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(&config.voyager)?);
        Self::new(config, store, transport)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl ServiceFactory for VoyagerServiceFactory {
    async fn build(&self, user_id: &str) -> ApiResult<VoyagerServices> {
        if user_id.trim().is_empty() {
            return Err(ErrorInfo::validation("User id cannot be empty"));
        }

        let client = VoyagerClient::new(
            user_id,
            self.config.clone(),
            self.store.clone(),
            self.transport.clone(),
        )
        .with_clock(self.clock.clone());

        debug!(user_id, "Built Voyager services");
        Ok(VoyagerServices::new(Arc::new(client)))
    }
}

/// Orchestrator for one user
pub struct UnifiedService {
    user_id: String,
    prefer_voyager: bool,
    scheduled_job: bool,
    official: Arc<dyn OfficialApi>,
    factory: Option<Arc<dyn ServiceFactory>>,
    services: OnceCell<Arc<VoyagerServices>>,
}

impl UnifiedService {
    pub fn new(
        user_id: impl Into<String>,
        config: &UnifiedConfig,
        factory: Arc<dyn ServiceFactory>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            prefer_voyager: config.prefer_voyager,
            scheduled_job: false,
            official: Arc::new(UnavailableOfficialApi),
            factory: Some(factory),
            services: OnceCell::new(),
        }
    }

    /// Orchestrator over already-built services
    pub fn with_services(
        user_id: impl Into<String>,
        config: &UnifiedConfig,
        services: VoyagerServices,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            prefer_voyager: config.prefer_voyager,
            scheduled_job: false,
            official: Arc::new(UnavailableOfficialApi),
            factory: None,
            services: OnceCell::new_with(Some(Arc::new(services))),
        }
    }

    pub fn with_official_api(mut self, official: Arc<dyn OfficialApi>) -> Self {
        self.official = official;
        self
    }

    /// Route every call to Voyager with reason `scheduled-job`
    pub fn for_scheduled_job(mut self) -> Self {
        self.scheduled_job = true;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    async fn services(&self) -> ApiResult<Arc<VoyagerServices>> {
        self.services
            .get_or_try_init(|| async {
                let factory = self.factory.as_ref().ok_or_else(|| {
                    ErrorInfo::validation("No Voyager service factory configured")
                })?;
                factory.build(&self.user_id).await.map(Arc::new)
            })
            .await
            .cloned()
    }

    fn forced_route(&self) -> Option<FallbackTrigger> {
        if self.prefer_voyager {
            Some(FallbackTrigger::UserPreference)
        } else if self.scheduled_job {
            Some(FallbackTrigger::ScheduledJob)
        } else {
            None
        }
    }

    /// Pick a backend and run the operation. `official` is only awaited when
    /// no route is forced.
    async fn dispatch<'a, T>(
        &'a self,
        operation: &'static str,
        official: BoxFuture<'a, std::result::Result<T, OfficialFailure>>,
        internal: impl FnOnce(Arc<VoyagerServices>) -> BoxFuture<'a, ApiResult<T>>,
    ) -> ServiceResult<T> {
        let reason = match self.forced_route() {
            Some(reason) => reason,
            None => match official.await {
                Ok(value) => return ServiceResult::official(value),
                Err(failure) => {
                    let reason = classify_failure(&failure);
                    info!(
                        user_id = %self.user_id,
                        operation,
                        %failure,
                        %reason,
                        "Official API failed, falling back to Voyager"
                    );
                    reason
                }
            },
        };

        let result = match self.services().await {
            Ok(services) => internal(services).await,
            Err(error) => Err(error),
        };
        ServiceResult::internal(result, reason)
    }

    pub async fn create_post(&self, options: &CreatePostOptions) -> ServiceResult<PublishedPost> {
        self.dispatch("create_post", self.official.create_post(options), |s| {
            Box::pin(async move { s.posts.create(options).await })
        })
        .await
    }

    pub async fn edit_post(&self, post_id: &str, new_content: &str) -> ServiceResult<PublishedPost> {
        self.dispatch(
            "edit_post",
            self.official.edit_post(post_id, new_content),
            |s| Box::pin(async move { s.posts.edit(post_id, new_content).await }),
        )
        .await
    }

    pub async fn delete_post(&self, post_id: &str) -> ServiceResult<()> {
        self.dispatch("delete_post", self.official.delete_post(post_id), |s| {
            Box::pin(async move { s.posts.delete(post_id).await })
        })
        .await
    }

    pub async fn repost(
        &self,
        original_id: &str,
        commentary: Option<&str>,
    ) -> ServiceResult<PublishedPost> {
        self.dispatch(
            "repost",
            self.official.repost(original_id, commentary),
            |s| Box::pin(async move { s.posts.repost(original_id, commentary).await }),
        )
        .await
    }

    pub async fn get_profile(&self) -> ServiceResult<Profile> {
        self.dispatch("get_profile", self.official.get_profile(), |s| {
            Box::pin(async move { s.metrics.get_profile().await })
        })
        .await
    }

    pub async fn get_summary(&self, period: TimePeriod) -> ServiceResult<AnalyticsSummary> {
        self.dispatch("get_summary", self.official.get_summary(period), |s| {
            Box::pin(async move { s.metrics.get_summary(period).await })
        })
        .await
    }

    pub async fn get_post_analytics(&self, activity_id: &str) -> ServiceResult<PostAnalytics> {
        self.dispatch(
            "get_post_analytics",
            self.official.get_post_analytics(activity_id),
            |s| Box::pin(async move { s.metrics.get_post_analytics(activity_id).await }),
        )
        .await
    }

    pub async fn get_profile_statistics(
        &self,
        profile_id: Option<&str>,
    ) -> ServiceResult<ProfileStatistics> {
        self.dispatch(
            "get_profile_statistics",
            self.official.get_profile_statistics(profile_id),
            |s| Box::pin(async move { s.metrics.get_profile_statistics(profile_id).await }),
        )
        .await
    }

    pub async fn get_recent_posts_with_analytics(
        &self,
        limit: usize,
    ) -> ServiceResult<Vec<PostWithAnalytics>> {
        self.dispatch(
            "get_recent_posts_with_analytics",
            self.official.get_recent_posts_with_analytics(limit),
            |s| Box::pin(async move { s.metrics.get_recent_posts_with_analytics(limit).await }),
        )
        .await
    }

    pub async fn get_content_analytics(
        &self,
        period: TimePeriod,
        post_limit: usize,
    ) -> ServiceResult<ContentAnalytics> {
        self.dispatch(
            "get_content_analytics",
            self.official.get_content_analytics(period, post_limit),
            |s| {
                Box::pin(async move { s.metrics.get_content_analytics(period, post_limit).await })
            },
        )
        .await
    }

    /// Whether the stored Voyager session currently works. Never fails.
    pub async fn is_voyager_available(&self) -> bool {
        match self.services().await {
            Ok(services) => services.client.validate_credentials().await.is_valid,
            Err(error) => {
                debug!(user_id = %self.user_id, code = %error.code(), "Voyager unavailable");
                false
            }
        }
    }
}
