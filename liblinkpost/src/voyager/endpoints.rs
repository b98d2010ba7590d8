//! Voyager endpoint table
//!
//! Every path the crate calls lives here. Services build a [`RequestSpec`]
//! from these constructors and never format URLs themselves.

use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use super::http::HttpMethod;
use crate::types::TimePeriod;

/// Logical endpoint; also the rate limiter's key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Identity,
    AnalyticsCard,
    PostAnalytics,
    FeedUpdates,
    ProfileStatistics,
    ShareCreate,
    ShareEdit,
    ShareDelete,
}

impl Endpoint {
    pub const ALL: [Endpoint; 8] = [
        Self::Identity,
        Self::AnalyticsCard,
        Self::PostAnalytics,
        Self::FeedUpdates,
        Self::ProfileStatistics,
        Self::ShareCreate,
        Self::ShareEdit,
        Self::ShareDelete,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::AnalyticsCard => "analytics-card",
            Self::PostAnalytics => "post-analytics",
            Self::FeedUpdates => "feed-updates",
            Self::ProfileStatistics => "profile-statistics",
            Self::ShareCreate => "share-create",
            Self::ShareEdit => "share-edit",
            Self::ShareDelete => "share-delete",
        }
    }

    pub fn method(&self) -> HttpMethod {
        match self {
            Self::ShareCreate | Self::ShareEdit => HttpMethod::Post,
            Self::ShareDelete => HttpMethod::Delete,
            _ => HttpMethod::Get,
        }
    }

    /// Path with `{id}` standing for the single path parameter
    fn template(&self) -> &'static str {
        match self {
            Self::Identity => "/voyager/api/me",
            Self::AnalyticsCard => "/voyager/api/identity/creatorAnalytics/summary",
            Self::PostAnalytics => "/voyager/api/identity/creatorAnalytics/posts/{id}",
            Self::FeedUpdates => "/voyager/api/identity/profileUpdatesV2",
            Self::ProfileStatistics => "/voyager/api/identity/profiles/{id}/dashboardStatistics",
            Self::ShareCreate => "/voyager/api/contentcreation/normShares",
            Self::ShareEdit | Self::ShareDelete => "/voyager/api/contentcreation/normShares/{id}",
        }
    }

    /// Template split into segments, `{id}` replaced by the whole id
    fn segments(&self, id: Option<&str>) -> Vec<String> {
        self.template()
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| match (segment, id) {
                ("{id}", Some(id)) => id.to_string(),
                _ => segment.to_string(),
            })
            .collect()
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One outbound call, before credentials and standard headers are attached
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub endpoint: Endpoint,
    pub method: HttpMethod,
    /// Raw path segments relative to the configured base URL. Each entry is
    /// one segment: a `/` inside an id is percent-encoded, never a separator.
    pub segments: Vec<String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Extra headers, merged over the standard ones
    pub headers: BTreeMap<String, String>,
    /// Overrides the configured timeout
    pub timeout: Option<Duration>,
    pub use_proxy: bool,
}

impl RequestSpec {
    fn new(endpoint: Endpoint, id: Option<&str>) -> Self {
        Self {
            endpoint,
            method: endpoint.method(),
            segments: endpoint.segments(id),
            query: Vec::new(),
            body: None,
            headers: BTreeMap::new(),
            timeout: None,
            use_proxy: false,
        }
    }

    pub fn identity() -> Self {
        Self::new(Endpoint::Identity, None)
    }

    pub fn analytics_card(period: TimePeriod) -> Self {
        Self::new(Endpoint::AnalyticsCard, None).with_query("timeRange", period.upstream_param())
    }

    pub fn post_analytics(activity_id: &str) -> Self {
        Self::new(Endpoint::PostAnalytics, Some(activity_id))
    }

    pub fn feed_updates(profile_id: &str, count: usize) -> Self {
        Self::new(Endpoint::FeedUpdates, None)
            .with_query("q", "memberShareFeed")
            .with_query("profileUrn", profile_id)
            .with_query("count", count.to_string())
    }

    pub fn profile_statistics(profile_id: &str) -> Self {
        Self::new(Endpoint::ProfileStatistics, Some(profile_id))
    }

    pub fn share_create(body: Value) -> Self {
        Self::new(Endpoint::ShareCreate, None).with_body(body)
    }

    pub fn share_edit(share_id: &str, body: Value) -> Self {
        Self::new(Endpoint::ShareEdit, Some(share_id)).with_body(body)
    }

    pub fn share_delete(share_id: &str) -> Self {
        Self::new(Endpoint::ShareDelete, Some(share_id))
    }

    /// Unencoded path, for logs and assertions
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn via_proxy(mut self) -> Self {
        self.use_proxy = true;
        self
    }
}
