//! Core types for Linkpost
//!
//! Normalized shapes returned to callers. Upstream wire shapes stay private to
//! the `voyager` modules that decode them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reporting window for analytics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimePeriod {
    #[serde(rename = "LAST_7_DAYS")]
    Last7Days,
    #[serde(rename = "LAST_14_DAYS")]
    Last14Days,
    #[serde(rename = "LAST_28_DAYS")]
    Last28Days,
    #[serde(rename = "LAST_30_DAYS")]
    Last30Days,
    #[serde(rename = "LAST_90_DAYS")]
    Last90Days,
    #[serde(rename = "LAST_365_DAYS")]
    Last365Days,
}

impl TimePeriod {
    pub const ALL: [TimePeriod; 6] = [
        Self::Last7Days,
        Self::Last14Days,
        Self::Last28Days,
        Self::Last30Days,
        Self::Last90Days,
        Self::Last365Days,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Last7Days => "LAST_7_DAYS",
            Self::Last14Days => "LAST_14_DAYS",
            Self::Last28Days => "LAST_28_DAYS",
            Self::Last30Days => "LAST_30_DAYS",
            Self::Last90Days => "LAST_90_DAYS",
            Self::Last365Days => "LAST_365_DAYS",
        }
    }

    /// Value of the upstream `timeRange` query parameter
    pub fn upstream_param(&self) -> &'static str {
        match self {
            Self::Last7Days => "PAST_7_DAYS",
            Self::Last14Days => "PAST_14_DAYS",
            Self::Last28Days => "PAST_28_DAYS",
            Self::Last30Days => "PAST_30_DAYS",
            Self::Last90Days => "PAST_90_DAYS",
            Self::Last365Days => "PAST_365_DAYS",
        }
    }
}

impl std::fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TimePeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|period| period.as_str() == s)
            .ok_or_else(|| format!("Unknown time period: {s}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Entity reference (e.g. `urn:li:fsd_profile:ACoAA...`)
    pub id: String,
    pub public_identifier: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub headline: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileStatistics {
    pub profile_id: String,
    pub profile_views: u64,
    pub search_appearances: u64,
    pub post_impressions: u64,
    pub followers: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub period: TimePeriod,
    pub impressions: u64,
    pub members_reached: u64,
    pub engagements: u64,
    pub reactions: u64,
    pub comments: u64,
    pub reposts: u64,
    /// Percentage, 0 when there were no impressions
    pub engagement_rate: f64,
}

/// Counters for one post. Counters the upstream omits are zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostAnalytics {
    pub activity_id: String,
    pub impressions: u64,
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
    pub clicks: u64,
    pub engagement_rate: f64,
}

/// A post from the member's own feed, with its social-activity counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentPost {
    pub activity_id: String,
    pub share_id: Option<String>,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
}

/// A recent post merged with its analytics counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostWithAnalytics {
    pub post: RecentPost,
    pub impressions: u64,
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
    pub clicks: u64,
    pub engagement_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentAnalytics {
    pub period: TimePeriod,
    pub summary: AnalyticsSummary,
    /// At most five posts, highest impressions first
    pub top_posts: Vec<PostWithAnalytics>,
    pub avg_engagement_rate: f64,
    /// Posts considered before truncation
    pub total_posts: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Anyone,
    ConnectionsOnly,
}

impl Visibility {
    pub fn upstream_value(&self) -> &'static str {
        match self {
            Self::Anyone => "ANYONE",
            Self::ConnectionsOnly => "CONNECTIONS_ONLY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaCategory {
    Image,
    Video,
    Document,
}

impl MediaCategory {
    pub fn upstream_value(&self) -> &'static str {
        match self {
            Self::Image => "IMAGE",
            Self::Video => "VIDEO",
            Self::Document => "NATIVE_DOCUMENT",
        }
    }
}

/// Reference to media already uploaded upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub urn: String,
    pub category: MediaCategory,
    pub alt_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleAttachment {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// What to publish
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePostOptions {
    pub content: String,
    pub visibility: Visibility,
    pub media: Vec<MediaRef>,
    pub article: Option<ArticleAttachment>,
    /// Share or activity being reposted
    pub repost_of: Option<String>,
}

impl CreatePostOptions {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_media(mut self, media: MediaRef) -> Self {
        self.media.push(media);
        self
    }

    pub fn with_article(mut self, article: ArticleAttachment) -> Self {
        self.article = Some(article);
        self
    }

    pub fn reposting(mut self, original_id: impl Into<String>) -> Self {
        self.repost_of = Some(original_id.into());
        self
    }

    pub fn is_repost(&self) -> bool {
        self.repost_of.is_some()
    }
}

/// Identifiers of a created or edited post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedPost {
    pub post_id: String,
    pub activity_id: Option<String>,
    pub share_id: Option<String>,
}

/// Position of a `#hashtag` in post text
///
/// Offsets and lengths are UTF-16 code units and include the `#` sign.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashtagAttribute {
    pub start: usize,
    pub length: usize,
    pub tag: String,
}
