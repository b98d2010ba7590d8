//! Profile and analytics retrieval over Voyager
//!
//! Upstream shapes are decoded into private structs with optional fields and
//! normalised here, so callers only ever see the types in [`crate::types`].

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use super::client::VoyagerClient;
use super::endpoints::RequestSpec;
use crate::error::{ApiResult, ErrorCode, ErrorInfo};
use crate::types::{
    AnalyticsSummary, ContentAnalytics, PostAnalytics, PostWithAnalytics, Profile,
    ProfileStatistics, RecentPost, TimePeriod,
};

/// Posts kept in [`ContentAnalytics::top_posts`]
pub const TOP_POSTS: usize = 5;

/// Sum of upstream counters, saturating at `u64::MAX`
fn total(counters: &[u64]) -> u64 {
    counters.iter().copied().fold(0, u64::saturating_add)
}

/// Engagements per impression, as a percentage. 0 when there were no impressions.
pub fn engagement_rate(engagements: u64, impressions: u64) -> f64 {
    if impressions == 0 {
        return 0.0;
    }
    engagements as f64 / impressions as f64 * 100.0
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MiniProfile {
    entity_urn: Option<String>,
    dash_entity_urn: Option<String>,
    public_identifier: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    occupation: Option<String>,
}

/// `/me` response. Fields may be top-level or under `miniProfile`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IdentityResponse {
    entity_urn: Option<String>,
    dash_entity_urn: Option<String>,
    public_identifier: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    headline: Option<String>,
    mini_profile: Option<MiniProfile>,
}

impl IdentityResponse {
    /// Profile reference, top-level first
    pub(crate) fn entity_urn(&self) -> Option<String> {
        let mini = self.mini_profile.as_ref();
        self.dash_entity_urn
            .clone()
            .or_else(|| self.entity_urn.clone())
            .or_else(|| mini.and_then(|m| m.dash_entity_urn.clone()))
            .or_else(|| mini.and_then(|m| m.entity_urn.clone()))
    }

    fn into_profile(self) -> ApiResult<Profile> {
        let id = self.entity_urn().ok_or_else(|| {
            ErrorInfo::invalid_response("Identity response carried no profile reference")
        })?;
        let mini = self.mini_profile.unwrap_or_default();

        Ok(Profile {
            id,
            public_identifier: self.public_identifier.or(mini.public_identifier),
            first_name: self.first_name.or(mini.first_name).unwrap_or_default(),
            last_name: self.last_name.or(mini.last_name).unwrap_or_default(),
            headline: self.headline.or(mini.occupation),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyticsCardResponse {
    impressions: Option<u64>,
    members_reached: Option<u64>,
    engagements: Option<u64>,
    reactions: Option<u64>,
    comments: Option<u64>,
    reposts: Option<u64>,
}

impl AnalyticsCardResponse {
    fn into_summary(self, period: TimePeriod) -> AnalyticsSummary {
        let impressions = self.impressions.unwrap_or(0);
        let reactions = self.reactions.unwrap_or(0);
        let comments = self.comments.unwrap_or(0);
        let reposts = self.reposts.unwrap_or(0);
        let engagements = self
            .engagements
            .unwrap_or_else(|| total(&[reactions, comments, reposts]));

        AnalyticsSummary {
            period,
            impressions,
            members_reached: self.members_reached.unwrap_or(0),
            engagements,
            reactions,
            comments,
            reposts,
            engagement_rate: engagement_rate(engagements, impressions),
        }
    }
}

/// Per-post counters as sent upstream; `None` means the counter was omitted
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostAnalyticsResponse {
    impressions: Option<u64>,
    #[serde(alias = "reactions")]
    likes: Option<u64>,
    comments: Option<u64>,
    #[serde(alias = "reposts")]
    shares: Option<u64>,
    clicks: Option<u64>,
}

impl PostAnalyticsResponse {
    fn into_analytics(self, activity_id: &str) -> PostAnalytics {
        let impressions = self.impressions.unwrap_or(0);
        let likes = self.likes.unwrap_or(0);
        let comments = self.comments.unwrap_or(0);
        let shares = self.shares.unwrap_or(0);
        let clicks = self.clicks.unwrap_or(0);

        PostAnalytics {
            activity_id: activity_id.to_string(),
            impressions,
            likes,
            comments,
            shares,
            clicks,
            engagement_rate: engagement_rate(total(&[likes, comments, shares, clicks]), impressions),
        }
    }

    /// Merge with feed counts, preferring analytics values when present
    fn merge(&self, post: RecentPost) -> PostWithAnalytics {
        let impressions = self.impressions.unwrap_or(0);
        let likes = self.likes.unwrap_or(post.likes);
        let comments = self.comments.unwrap_or(post.comments);
        let shares = self.shares.unwrap_or(post.shares);
        let clicks = self.clicks.unwrap_or(0);

        PostWithAnalytics {
            post,
            impressions,
            likes,
            comments,
            shares,
            clicks,
            engagement_rate: engagement_rate(total(&[likes, comments, shares, clicks]), impressions),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileStatisticsResponse {
    profile_views: Option<u64>,
    search_appearances: Option<u64>,
    post_impressions: Option<u64>,
    #[serde(alias = "followerCount")]
    followers: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FeedResponse {
    #[serde(default)]
    elements: Vec<FeedElement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedElement {
    #[serde(alias = "urn")]
    activity_urn: String,
    share_urn: Option<String>,
    commentary: Option<FeedCommentary>,
    /// Milliseconds since the epoch
    created_at: Option<i64>,
    social_detail: Option<SocialDetail>,
}

#[derive(Debug, Deserialize)]
struct FeedCommentary {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SocialDetail {
    total_social_activity_counts: Option<SocialCounts>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SocialCounts {
    num_likes: Option<u64>,
    num_comments: Option<u64>,
    num_shares: Option<u64>,
}

impl From<FeedElement> for RecentPost {
    fn from(element: FeedElement) -> Self {
        let counts = element
            .social_detail
            .and_then(|detail| detail.total_social_activity_counts)
            .unwrap_or_default();

        Self {
            activity_id: element.activity_urn,
            share_id: element.share_urn,
            text: element
                .commentary
                .and_then(|c| c.text)
                .unwrap_or_default(),
            created_at: element
                .created_at
                .and_then(DateTime::<Utc>::from_timestamp_millis),
            likes: counts.num_likes.unwrap_or(0),
            comments: counts.num_comments.unwrap_or(0),
            shares: counts.num_shares.unwrap_or(0),
        }
    }
}

/// Read-only analytics operations for one user
#[derive(Clone)]
pub struct MetricsService {
    client: Arc<VoyagerClient>,
    concurrency: usize,
}

impl MetricsService {
    pub fn new(client: Arc<VoyagerClient>) -> Self {
        let concurrency = client.config().unified.analytics_concurrency.max(1);
        Self {
            client,
            concurrency,
        }
    }

    pub async fn get_profile(&self) -> ApiResult<Profile> {
        let identity: IdentityResponse = self
            .client
            .request(RequestSpec::identity())
            .await
            .into_result()?;
        identity.into_profile()
    }

    pub async fn get_summary(&self, period: TimePeriod) -> ApiResult<AnalyticsSummary> {
        let card: AnalyticsCardResponse = self
            .client
            .request(RequestSpec::analytics_card(period))
            .await
            .into_result()?;
        Ok(card.into_summary(period))
    }

    /// Counters for one post, zero-filled where upstream omits them
    pub async fn get_post_analytics(&self, activity_id: &str) -> ApiResult<PostAnalytics> {
        require_id(activity_id)?;
        Ok(self
            .fetch_post_analytics(activity_id)
            .await?
            .into_analytics(activity_id))
    }

    async fn fetch_post_analytics(&self, activity_id: &str) -> ApiResult<PostAnalyticsResponse> {
        self.client
            .request(RequestSpec::post_analytics(activity_id))
            .await
            .into_result()
    }

    /// View, search and follower counters; resolves the caller's own profile
    /// when no id is given
    pub async fn get_profile_statistics(
        &self,
        profile_id: Option<&str>,
    ) -> ApiResult<ProfileStatistics> {
        let profile_id = match profile_id {
            Some(id) => {
                require_id(id)?;
                id.to_string()
            }
            None => self.get_profile().await?.id,
        };

        let stats: ProfileStatisticsResponse = self
            .client
            .request(RequestSpec::profile_statistics(&profile_id))
            .await
            .into_result()?;

        Ok(ProfileStatistics {
            profile_id,
            profile_views: stats.profile_views.unwrap_or(0),
            search_appearances: stats.search_appearances.unwrap_or(0),
            post_impressions: stats.post_impressions.unwrap_or(0),
            followers: stats.followers.unwrap_or(0),
        })
    }

    pub async fn get_recent_posts(&self, limit: usize) -> ApiResult<Vec<RecentPost>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let profile = self.get_profile().await?;
        let feed: FeedResponse = self
            .client
            .request(RequestSpec::feed_updates(&profile.id, limit))
            .await
            .into_result()?;

        Ok(feed
            .elements
            .into_iter()
            .take(limit)
            .map(RecentPost::from)
            .collect())
    }

    /// Recent posts merged with their analytics, in feed order
    ///
    /// Up to `analytics_concurrency` analytics requests run at once. A post
    /// whose analytics call fails transiently keeps its feed counts; any other
    /// failure (e.g. a rejected session) fails the whole listing.
    pub async fn get_recent_posts_with_analytics(
        &self,
        limit: usize,
    ) -> ApiResult<Vec<PostWithAnalytics>> {
        let posts = self.get_recent_posts(limit).await?;

        stream::iter(posts)
            .map(|post| async move {
                match self.fetch_post_analytics(&post.activity_id).await {
                    Ok(analytics) => Ok(analytics.merge(post)),
                    Err(error) if degrades_to_feed_counts(&error) => {
                        warn!(
                            activity_id = %post.activity_id,
                            code = %error.code(),
                            "Post analytics unavailable, using feed counts"
                        );
                        Ok(PostAnalyticsResponse::default().merge(post))
                    }
                    Err(error) => Err(error),
                }
            })
            .buffered(self.concurrency)
            .try_collect()
            .await
    }

    /// Summary plus the best-performing recent posts
    pub async fn get_content_analytics(
        &self,
        period: TimePeriod,
        post_limit: usize,
    ) -> ApiResult<ContentAnalytics> {
        let summary = self.get_summary(period).await?;
        let mut posts = self.get_recent_posts_with_analytics(post_limit).await?;
        let total_posts = posts.len();

        // stable: ties keep feed order
        posts.sort_by(|a, b| b.impressions.cmp(&a.impressions));
        posts.truncate(TOP_POSTS);

        Ok(ContentAnalytics {
            period,
            avg_engagement_rate: summary.engagement_rate,
            summary,
            top_posts: posts,
            total_posts,
        })
    }
}

/// Transient failures and posts without analytics fall back to feed counts
fn degrades_to_feed_counts(error: &ErrorInfo) -> bool {
    error.retryable() || error.code() == ErrorCode::NotFound
}

fn require_id(id: &str) -> ApiResult<()> {
    if id.trim().is_empty() {
        return Err(ErrorInfo::validation("Identifier cannot be empty"));
    }
    Ok(())
}
