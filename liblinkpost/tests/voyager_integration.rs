//! Integration tests for the Voyager services
//!
//! Drives PostService and MetricsService end to end over a scripted transport.

use std::sync::Arc;

use chrono::{Duration, Utc};
use liblinkpost::config::UnifiedConfig;
use liblinkpost::voyager::{extract_hashtags, MockTransport, TransportFailure};
use liblinkpost::{
    Clock, Config, CreatePostOptions, Credentials, ErrorCode, ManualClock, MemoryCredentialStore,
    MetricsService, PostService, RateLimitConfig, RetryConfig, TimePeriod, VoyagerClient,
};
use serde_json::Value;
use std::time::Duration as StdDuration;

const USER: &str = "member-1";
const PROFILE: &str = "urn:li:fsd_profile:ACoAAB";

fn setup_with(
    config: Config,
    clock: Arc<ManualClock>,
) -> (Arc<VoyagerClient>, Arc<MockTransport>, Arc<MemoryCredentialStore>) {
    let transport = Arc::new(MockTransport::new());
    let store = Arc::new(MemoryCredentialStore::with_user(
        USER,
        Credentials::new("AQEDAR-session", "\"ajax:42\""),
    ));
    let client = VoyagerClient::new(USER, Arc::new(config), store.clone(), transport.clone())
        .with_clock(clock);
    (Arc::new(client), transport, store)
}

fn setup() -> (Arc<VoyagerClient>, Arc<MockTransport>) {
    let config = Config {
        retry: RetryConfig::no_retry(),
        ..Config::default()
    };
    let (client, transport, _) = setup_with(config, Arc::new(ManualClock::default()));
    transport.route_json(
        "/voyager/api/me",
        200,
        &format!(r#"{{"dashEntityUrn": "{PROFILE}", "firstName": "Ada", "lastName": "Lovelace"}}"#),
    );
    (client, transport)
}

fn post_analytics(impressions: u64) -> String {
    format!(r#"{{"impressions": {impressions}, "likes": 4, "comments": 1, "shares": 0, "clicks": 5}}"#)
}

#[tokio::test]
async fn test_content_analytics_ranks_posts_by_impressions() {
    let (client, transport) = setup();
    transport
        .route_json(
            "creatorAnalytics/summary",
            200,
            r#"{"impressions": 1000, "engagements": 50, "membersReached": 700}"#,
        )
        .route_json(
            "profileUpdatesV2",
            200,
            r#"{"elements": [
                {"activityUrn": "urn:li:activity:101", "commentary": {"text": "first"}},
                {"activityUrn": "urn:li:activity:102", "commentary": {"text": "second"}},
                {"activityUrn": "urn:li:activity:103", "commentary": {"text": "third"}}
            ]}"#,
        )
        .route_json("posts/urn:li:activity:101", 200, &post_analytics(200))
        .route_json("posts/urn:li:activity:102", 200, &post_analytics(500))
        .route_json("posts/urn:li:activity:103", 200, &post_analytics(300));

    let metrics = MetricsService::new(client);
    let analytics = metrics
        .get_content_analytics(TimePeriod::Last30Days, 10)
        .await
        .unwrap();

    assert_eq!(analytics.summary.engagement_rate, 5.0);
    assert_eq!(analytics.avg_engagement_rate, 5.0);
    assert_eq!(analytics.total_posts, 3);

    let impressions: Vec<u64> = analytics.top_posts.iter().map(|p| p.impressions).collect();
    assert_eq!(impressions, vec![500, 300, 200]);
    assert_eq!(analytics.top_posts[0].post.text, "second");
}

#[tokio::test]
async fn test_top_posts_are_capped_at_five() {
    let (client, transport) = setup();
    transport.route_json("creatorAnalytics/summary", 200, r#"{"impressions": 0}"#);

    let elements: Vec<String> = (1..=7)
        .map(|i| format!(r#"{{"activityUrn": "urn:li:activity:{i}00"}}"#))
        .collect();
    transport.route_json(
        "profileUpdatesV2",
        200,
        &format!(r#"{{"elements": [{}]}}"#, elements.join(",")),
    );
    for i in 1..=7 {
        transport.route_json(
            &format!("posts/urn:li:activity:{i}00"),
            200,
            &post_analytics(i * 10),
        );
    }

    let metrics = MetricsService::new(client);
    let analytics = metrics
        .get_content_analytics(TimePeriod::Last7Days, 7)
        .await
        .unwrap();

    assert_eq!(analytics.total_posts, 7);
    assert_eq!(analytics.top_posts.len(), 5);
    assert_eq!(analytics.top_posts[0].impressions, 70);
    assert_eq!(analytics.top_posts[4].impressions, 30);
    assert_eq!(analytics.avg_engagement_rate, 0.0);
}

#[tokio::test]
async fn test_failed_post_analytics_keeps_feed_counts() {
    let (client, transport) = setup();
    transport
        .route_json(
            "profileUpdatesV2",
            200,
            r#"{"elements": [{
                "activityUrn": "urn:li:activity:9",
                "socialDetail": {"totalSocialActivityCounts": {"numLikes": 3, "numComments": 2, "numShares": 1}}
            }]}"#,
        )
        .route_json("posts/urn:li:activity:9", 500, "");

    let metrics = MetricsService::new(client);
    let posts = metrics.get_recent_posts_with_analytics(5).await.unwrap();

    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].likes, 3);
    assert_eq!(posts[0].comments, 2);
    assert_eq!(posts[0].shares, 1);
    assert_eq!(posts[0].impressions, 0);
    assert_eq!(posts[0].engagement_rate, 0.0);
}

#[tokio::test]
async fn test_network_failure_on_one_post_keeps_the_rest() {
    let (client, transport) = setup();
    transport
        .route_json(
            "profileUpdatesV2",
            200,
            r#"{"elements": [{"activityUrn": "urn:li:activity:21"}, {"activityUrn": "urn:li:activity:22"}]}"#,
        )
        .route_failure("posts/urn:li:activity:21", TransportFailure::connect("reset"))
        .route_json("posts/urn:li:activity:22", 200, &post_analytics(80));

    let metrics = MetricsService::new(client);
    let posts = metrics.get_recent_posts_with_analytics(2).await.unwrap();

    let impressions: Vec<u64> = posts.iter().map(|p| p.impressions).collect();
    assert_eq!(impressions, vec![0, 80]);
}

#[tokio::test]
async fn test_rejected_session_fails_the_listing() {
    let (client, transport) = setup();
    transport
        .route_json(
            "profileUpdatesV2",
            200,
            r#"{"elements": [{"activityUrn": "urn:li:activity:1"}, {"activityUrn": "urn:li:activity:2"}]}"#,
        )
        .route_json("creatorAnalytics/summary", 200, r#"{"impressions": 100}"#)
        .route_json("posts/urn:li:activity:1", 401, "")
        .route_json("posts/urn:li:activity:2", 200, &post_analytics(50));

    let metrics = MetricsService::new(client);
    let error = metrics
        .get_content_analytics(TimePeriod::Last7Days, 2)
        .await
        .unwrap_err();

    assert_eq!(error.code(), ErrorCode::Unauthorized);
}

#[tokio::test]
async fn test_concurrent_analytics_keep_feed_order() {
    let config = Config {
        retry: RetryConfig::no_retry(),
        unified: UnifiedConfig {
            analytics_concurrency: 4,
            ..UnifiedConfig::default()
        },
        ..Config::default()
    };
    let (client, transport, _) = setup_with(config, Arc::new(ManualClock::default()));
    transport.route_json("/voyager/api/me", 200, &format!(r#"{{"entityUrn": "{PROFILE}"}}"#));

    let elements: Vec<String> = (1..=4)
        .map(|i| format!(r#"{{"activityUrn": "urn:li:activity:{i}0"}}"#))
        .collect();
    transport.route_json(
        "profileUpdatesV2",
        200,
        &format!(r#"{{"elements": [{}]}}"#, elements.join(",")),
    );
    // earlier posts answer later
    for i in 1..=4u64 {
        transport.route_json_delayed(
            &format!("posts/urn:li:activity:{i}0"),
            200,
            &post_analytics(i),
            StdDuration::from_millis((5 - i) * 40),
        );
    }

    let started = std::time::Instant::now();
    let metrics = MetricsService::new(client);
    let posts = metrics.get_recent_posts_with_analytics(4).await.unwrap();

    let ids: Vec<&str> = posts.iter().map(|p| p.post.activity_id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["urn:li:activity:10", "urn:li:activity:20", "urn:li:activity:30", "urn:li:activity:40"]
    );
    let impressions: Vec<u64> = posts.iter().map(|p| p.impressions).collect();
    assert_eq!(impressions, vec![1, 2, 3, 4]);
    // sequential would take 400ms
    assert!(started.elapsed() < StdDuration::from_millis(390));
}

#[tokio::test]
async fn test_post_id_with_slashes_stays_one_segment() {
    let (client, transport) = setup();
    transport.push_json(204, "");

    let posts = PostService::new(client);
    posts.delete("urn:li:share:1/../../../me").await.unwrap();

    let request = transport.last_request().unwrap();
    assert!(
        request
            .url
            .ends_with("/voyager/api/contentcreation/normShares/urn:li:share:1%2F..%2F..%2F..%2Fme"),
        "{}",
        request.url
    );

    let error = posts.delete("..").await.unwrap_err();
    assert_eq!(error.code(), ErrorCode::ValidationError);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_empty_post_is_rejected_before_any_call() {
    let (client, transport) = setup();
    let posts = PostService::new(client);

    let error = posts.create(&CreatePostOptions::new("   ")).await.unwrap_err();
    assert_eq!(error.code(), ErrorCode::ValidationError);
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_create_sends_hashtag_attributes() {
    let (client, transport) = setup();
    transport.route_json(
        "contentcreation/normShares",
        201,
        r#"{"urn": "urn:li:share:555", "activityUrn": "urn:li:activity:556"}"#,
    );

    let content = "Shipping #rust today with #tokio";
    let posts = PostService::new(client);
    let published = posts.create(&CreatePostOptions::new(content)).await.unwrap();

    assert_eq!(published.post_id, "urn:li:share:555");
    assert_eq!(published.activity_id.as_deref(), Some("urn:li:activity:556"));

    let request = transport.requests_to("normShares").pop().unwrap();
    assert_eq!(request.header("csrf-token"), Some("ajax:42"));
    let body: Value = serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
    assert_eq!(body["author"], PROFILE);
    assert_eq!(body["commentaryV2"]["text"], content);

    let attributes = body["commentaryV2"]["attributesV2"].as_array().unwrap();
    let expected = extract_hashtags(content);
    assert_eq!(attributes.len(), expected.len());
    assert_eq!(attributes[0]["start"], expected[0].start);
    assert_eq!(attributes[1]["length"], expected[1].length);

    // same text, same attributes
    assert_eq!(extract_hashtags(content), expected);
}

#[tokio::test]
async fn test_unauthorized_response_invalidates_session() {
    let (client, transport) = setup();
    transport.route_json("creatorAnalytics/summary", 401, "");

    let metrics = MetricsService::new(client.clone());
    let error = metrics.get_summary(TimePeriod::Last7Days).await.unwrap_err();
    assert_eq!(error.code(), ErrorCode::Unauthorized);
    assert_eq!(transport.calls(), 1);

    let error = metrics.get_profile().await.unwrap_err();
    assert_eq!(error.code(), ErrorCode::Unauthorized);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_reject_policy_reports_window_reset() {
    let start = Utc::now();
    let clock = Arc::new(ManualClock::new(start));

    let mut rate_limits = RateLimitConfig::default();
    rate_limits.default.max_requests = 2;
    rate_limits.default.window_ms = 60_000;
    let config = Config {
        retry: RetryConfig::no_retry(),
        rate_limits,
        ..Config::default()
    };

    let (client, transport, _) = setup_with(config, clock.clone());
    transport.route_json("/voyager/api/me", 200, &format!(r#"{{"entityUrn": "{PROFILE}"}}"#));
    let metrics = MetricsService::new(client);

    assert!(metrics.get_profile().await.is_ok());
    assert!(metrics.get_profile().await.is_ok());

    let error = metrics.get_profile().await.unwrap_err();
    assert_eq!(error.code(), ErrorCode::RateLimited);
    assert_eq!(error.retry_at(), Some(start + Duration::seconds(60)));
    assert_eq!(transport.calls(), 2);

    clock.advance(Duration::seconds(61));
    assert!(metrics.get_profile().await.is_ok());
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn test_expired_session_is_never_sent() {
    let clock = Arc::new(ManualClock::default());
    let config = Config {
        retry: RetryConfig::no_retry(),
        ..Config::default()
    };
    let transport = Arc::new(MockTransport::new());
    let store = Arc::new(MemoryCredentialStore::with_user(
        USER,
        Credentials::new("AQEDAR-old", "ajax:1").with_expiry(clock.now() - Duration::hours(1)),
    ));
    let client = VoyagerClient::new(USER, Arc::new(config), store, transport.clone())
        .with_clock(clock);

    let status = client.validate_credentials().await;
    assert!(!status.is_valid);
    assert!(status.needs_refresh);
    assert_eq!(transport.calls(), 0);
}
