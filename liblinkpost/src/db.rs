//! Database operations for Linkpost

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::config::resolve_db_path;
use crate::credentials::{CredentialStore, Credentials};
use crate::error::{CredentialError, DbError, Result};
use crate::types::{AnalyticsSummary, PostAnalytics, TimePeriod};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        let path = resolve_db_path(db_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // mode=rwc creates the file on first use
        let db_url = format!(
            "sqlite://{}?mode=rwc",
            path.to_string_lossy().replace('\\', "/")
        );

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        Self::migrate(pool).await
    }

    /// Private in-memory database, mostly for tests
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(DbError::SqlxError)?;

        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or replace a user's credentials
    pub async fn save_credentials(&self, user_id: &str, credentials: &Credentials) -> Result<()> {
        credentials.check()?;

        sqlx::query(
            r#"
            INSERT INTO linkedin_credentials
                (user_id, li_at, jsessionid, li_a, csrf_token, user_agent,
                 cookies_set_at, expires_at, is_valid, last_used_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                li_at = excluded.li_at,
                jsessionid = excluded.jsessionid,
                li_a = excluded.li_a,
                csrf_token = excluded.csrf_token,
                user_agent = excluded.user_agent,
                cookies_set_at = excluded.cookies_set_at,
                expires_at = excluded.expires_at,
                is_valid = excluded.is_valid,
                last_used_at = excluded.last_used_at
            "#,
        )
        .bind(user_id)
        .bind(credentials.li_at.expose_secret())
        .bind(credentials.jsessionid.expose_secret())
        .bind(credentials.li_a.as_ref().map(|s| s.expose_secret().to_string()))
        .bind(credentials.csrf_token.expose_secret())
        .bind(&credentials.user_agent)
        .bind(credentials.set_at.timestamp_millis())
        .bind(credentials.expires_at.map(|t| t.timestamp_millis()))
        .bind(i32::from(credentials.is_valid))
        .bind(credentials.last_used_at.map(|t| t.timestamp_millis()))
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Get a user's credentials
    pub async fn get_credentials(&self, user_id: &str) -> Result<Option<Credentials>> {
        let row = sqlx::query(
            r#"
            SELECT li_at, jsessionid, li_a, csrf_token, user_agent,
                   cookies_set_at, expires_at, is_valid, last_used_at
            FROM linkedin_credentials WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| Credentials {
            li_at: SecretString::from(r.get::<String, _>("li_at")),
            jsessionid: SecretString::from(r.get::<String, _>("jsessionid")),
            li_a: r.get::<Option<String>, _>("li_a").map(SecretString::from),
            csrf_token: SecretString::from(r.get::<String, _>("csrf_token")),
            user_agent: r.get("user_agent"),
            set_at: from_millis(r.get("cookies_set_at")),
            expires_at: r.get::<Option<i64>, _>("expires_at").map(from_millis),
            is_valid: r.get::<i32, _>("is_valid") != 0,
            last_used_at: r.get::<Option<i64>, _>("last_used_at").map(from_millis),
        }))
    }

    /// Mark a user's credentials invalid; a no-op when none are stored
    pub async fn invalidate_credentials(&self, user_id: &str) -> Result<()> {
        sqlx::query("UPDATE linkedin_credentials SET is_valid = 0 WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn touch_credentials(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query("UPDATE linkedin_credentials SET last_used_at = ? WHERE user_id = ?")
            .bind(at.timestamp_millis())
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            return Err(CredentialError::NotFound(user_id.to_string()).into());
        }
        Ok(())
    }

    /// Store the latest summary for a user and period
    pub async fn upsert_summary(&self, user_id: &str, summary: &AnalyticsSummary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO analytics_snapshots
                (user_id, period, impressions, members_reached, engagements,
                 reactions, comments, reposts, engagement_rate, captured_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, period) DO UPDATE SET
                impressions = excluded.impressions,
                members_reached = excluded.members_reached,
                engagements = excluded.engagements,
                reactions = excluded.reactions,
                comments = excluded.comments,
                reposts = excluded.reposts,
                engagement_rate = excluded.engagement_rate,
                captured_at = excluded.captured_at
            "#,
        )
        .bind(user_id)
        .bind(summary.period.as_str())
        .bind(to_db(summary.impressions))
        .bind(to_db(summary.members_reached))
        .bind(to_db(summary.engagements))
        .bind(to_db(summary.reactions))
        .bind(to_db(summary.comments))
        .bind(to_db(summary.reposts))
        .bind(summary.engagement_rate)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_summary(
        &self,
        user_id: &str,
        period: TimePeriod,
    ) -> Result<Option<AnalyticsSummary>> {
        let row = sqlx::query(
            r#"
            SELECT impressions, members_reached, engagements, reactions,
                   comments, reposts, engagement_rate
            FROM analytics_snapshots WHERE user_id = ? AND period = ?
            "#,
        )
        .bind(user_id)
        .bind(period.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| AnalyticsSummary {
            period,
            impressions: from_db(r.get("impressions")),
            members_reached: from_db(r.get("members_reached")),
            engagements: from_db(r.get("engagements")),
            reactions: from_db(r.get("reactions")),
            comments: from_db(r.get("comments")),
            reposts: from_db(r.get("reposts")),
            engagement_rate: r.get("engagement_rate"),
        }))
    }

    /// Store the latest counters for a user's post
    pub async fn upsert_post_analytics(&self, user_id: &str, analytics: &PostAnalytics) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO post_analytics
                (user_id, activity_id, impressions, likes, comments, shares,
                 clicks, engagement_rate, captured_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, activity_id) DO UPDATE SET
                impressions = excluded.impressions,
                likes = excluded.likes,
                comments = excluded.comments,
                shares = excluded.shares,
                clicks = excluded.clicks,
                engagement_rate = excluded.engagement_rate,
                captured_at = excluded.captured_at
            "#,
        )
        .bind(user_id)
        .bind(&analytics.activity_id)
        .bind(to_db(analytics.impressions))
        .bind(to_db(analytics.likes))
        .bind(to_db(analytics.comments))
        .bind(to_db(analytics.shares))
        .bind(to_db(analytics.clicks))
        .bind(analytics.engagement_rate)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_post_analytics(
        &self,
        user_id: &str,
        activity_id: &str,
    ) -> Result<Option<PostAnalytics>> {
        let row = sqlx::query(
            r#"
            SELECT activity_id, impressions, likes, comments, shares, clicks, engagement_rate
            FROM post_analytics WHERE user_id = ? AND activity_id = ?
            "#,
        )
        .bind(user_id)
        .bind(activity_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| PostAnalytics {
            activity_id: r.get("activity_id"),
            impressions: from_db(r.get("impressions")),
            likes: from_db(r.get("likes")),
            comments: from_db(r.get("comments")),
            shares: from_db(r.get("shares")),
            clicks: from_db(r.get("clicks")),
            engagement_rate: r.get("engagement_rate"),
        }))
    }
}

// SQLite integers are signed
fn to_db(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_db(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

/// Credential store backed by the `linkedin_credentials` table
#[derive(Clone)]
pub struct SqliteCredentialStore {
    db: Database,
}

impl SqliteCredentialStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn get(&self, user_id: &str) -> Result<Option<Credentials>> {
        self.db.get_credentials(user_id).await
    }

    async fn save(&self, user_id: &str, credentials: &Credentials) -> Result<()> {
        self.db.save_credentials(user_id, credentials).await
    }

    async fn invalidate(&self, user_id: &str) -> Result<()> {
        self.db.invalidate_credentials(user_id).await
    }

    async fn touch(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.db.touch_credentials(user_id, at).await
    }

    fn backend_name(&self) -> &str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LinkpostError;
    use tempfile::TempDir;

    fn sample_credentials() -> Credentials {
        Credentials::new("AQEDAR-session", "\"ajax:42\"")
            .with_set_at(DateTime::from_timestamp(1_700_000_000, 0).unwrap())
            .with_expiry(DateTime::from_timestamp(1_800_000_000, 0).unwrap())
            .with_user_agent("TestAgent/1.0")
    }

    fn sample_summary(impressions: u64) -> AnalyticsSummary {
        AnalyticsSummary {
            period: TimePeriod::Last30Days,
            impressions,
            members_reached: 400,
            engagements: 50,
            reactions: 30,
            comments: 15,
            reposts: 5,
            engagement_rate: 5.0,
        }
    }

    #[tokio::test]
    async fn test_database_initialization_with_invalid_path() {
        #[cfg(unix)]
        let invalid_path = "/tmp/test\0invalid.db";

        #[cfg(windows)]
        let invalid_path = "C:\\invalid<>path\\test.db";

        let result = Database::new(invalid_path).await;
        assert!(matches!(result, Err(LinkpostError::Database(_))));
    }

    #[tokio::test]
    async fn test_database_creates_file_and_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("linkpost.db");

        Database::new(db_path.to_str().unwrap()).await.unwrap();
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_credentials_roundtrip() {
        let db = Database::in_memory().await.unwrap();
        db.save_credentials("user-1", &sample_credentials().with_secondary_token("li-a"))
            .await
            .unwrap();

        let loaded = db.get_credentials("user-1").await.unwrap().unwrap();
        assert_eq!(loaded.li_at.expose_secret(), "AQEDAR-session");
        assert_eq!(loaded.jsessionid.expose_secret(), "\"ajax:42\"");
        assert_eq!(loaded.csrf_token.expose_secret(), "ajax:42");
        assert_eq!(loaded.li_a.as_ref().map(|s| s.expose_secret().to_string()), Some("li-a".to_string()));
        assert_eq!(loaded.user_agent.as_deref(), Some("TestAgent/1.0"));
        assert_eq!(loaded.set_at.timestamp(), 1_700_000_000);
        assert_eq!(loaded.expires_at.map(|t| t.timestamp()), Some(1_800_000_000));
        assert!(loaded.is_valid);
        assert!(loaded.last_used_at.is_none());
    }

    #[tokio::test]
    async fn test_get_missing_credentials_returns_none() {
        let db = Database::in_memory().await.unwrap();
        assert!(db.get_credentials("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_replaces_existing_credentials() {
        let db = Database::in_memory().await.unwrap();
        db.save_credentials("user-1", &sample_credentials()).await.unwrap();
        db.invalidate_credentials("user-1").await.unwrap();

        db.save_credentials("user-1", &Credentials::new("fresh", "ajax:7"))
            .await
            .unwrap();

        let loaded = db.get_credentials("user-1").await.unwrap().unwrap();
        assert_eq!(loaded.li_at.expose_secret(), "fresh");
        assert!(loaded.is_valid);
    }

    #[tokio::test]
    async fn test_sqlite_store_invalidate_and_touch() {
        let store = SqliteCredentialStore::new(Database::in_memory().await.unwrap());
        store.save("user-1", &sample_credentials()).await.unwrap();

        store.invalidate("user-1").await.unwrap();
        store.invalidate("user-1").await.unwrap();
        store.invalidate("nobody").await.unwrap();

        let at = DateTime::from_timestamp(1_750_000_000, 0).unwrap();
        store.touch("user-1", at).await.unwrap();

        let loaded = store.get("user-1").await.unwrap().unwrap();
        assert!(!loaded.is_valid);
        assert_eq!(loaded.last_used_at, Some(at));
        assert_eq!(store.backend_name(), "sqlite");

        let error = store.touch("nobody", at).await.unwrap_err();
        assert!(matches!(
            error,
            LinkpostError::Credential(CredentialError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_timestamps_keep_millisecond_precision() {
        let db = Database::in_memory().await.unwrap();
        let set_at = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let used_at = DateTime::from_timestamp_millis(1_700_000_500_987).unwrap();

        db.save_credentials("user-1", &sample_credentials().with_set_at(set_at))
            .await
            .unwrap();
        db.touch_credentials("user-1", used_at).await.unwrap();

        let loaded = db.get_credentials("user-1").await.unwrap().unwrap();
        assert_eq!(loaded.set_at, set_at);
        assert_eq!(loaded.last_used_at, Some(used_at));
    }

    #[tokio::test]
    async fn test_save_rejects_empty_session_cookie() {
        let db = Database::in_memory().await.unwrap();
        let result = db.save_credentials("user-1", &Credentials::new("  ", "ajax:1")).await;

        assert!(matches!(
            result,
            Err(LinkpostError::Credential(CredentialError::EmptyCookie("li_at")))
        ));
        assert!(db.get_credentials("user-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_summary_replaces_snapshot() {
        let db = Database::in_memory().await.unwrap();
        db.upsert_summary("user-1", &sample_summary(1000)).await.unwrap();
        db.upsert_summary("user-1", &sample_summary(1200)).await.unwrap();

        let stored = db
            .get_summary("user-1", TimePeriod::Last30Days)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.impressions, 1200);
        assert_eq!(stored.engagement_rate, 5.0);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM analytics_snapshots")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_summaries_keyed_by_period() {
        let db = Database::in_memory().await.unwrap();
        db.upsert_summary("user-1", &sample_summary(1000)).await.unwrap();

        assert!(db
            .get_summary("user-1", TimePeriod::Last7Days)
            .await
            .unwrap()
            .is_none());
        assert!(db
            .get_summary("user-2", TimePeriod::Last30Days)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_upsert_post_analytics() {
        let db = Database::in_memory().await.unwrap();
        let mut analytics = PostAnalytics {
            activity_id: "urn:li:activity:1".to_string(),
            impressions: 500,
            likes: 20,
            comments: 4,
            shares: 1,
            clicks: 9,
            engagement_rate: 5.0,
        };
        db.upsert_post_analytics("user-1", &analytics).await.unwrap();

        analytics.likes = 25;
        db.upsert_post_analytics("user-1", &analytics).await.unwrap();

        let stored = db
            .get_post_analytics("user-1", "urn:li:activity:1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, analytics);
    }

    #[tokio::test]
    async fn test_concurrent_snapshot_writes() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("linkpost.db");
        let db = Database::new(db_path.to_str().unwrap()).await.unwrap();

        let mut handles = vec![];
        for i in 0..5u64 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                let analytics = PostAnalytics {
                    activity_id: format!("urn:li:activity:{i}"),
                    impressions: i * 100,
                    likes: i,
                    comments: 0,
                    shares: 0,
                    clicks: 0,
                    engagement_rate: 1.0,
                };
                db.upsert_post_analytics("user-1", &analytics).await
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM post_analytics")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 5);
    }
}
