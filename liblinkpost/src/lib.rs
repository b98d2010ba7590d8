//! liblinkpost - LinkedIn integration over the internal Voyager API
//!
//! Publishes posts and reads analytics for a LinkedIn member using the
//! session the member's browser holds. A [`UnifiedService`] sits in front
//! and decides per call whether the official API or Voyager serves it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use liblinkpost::{Config, CreatePostOptions, Database, SqliteCredentialStore};
//! use liblinkpost::{UnifiedService, VoyagerServiceFactory};
//!
//! # async fn run() -> liblinkpost::Result<()> {
//! let config = Arc::new(Config::load()?);
//! let db = Database::new(&config.database.path).await?;
//! let store = Arc::new(SqliteCredentialStore::new(db));
//! let factory = Arc::new(VoyagerServiceFactory::from_config(config.clone(), store)?);
//!
//! let service = UnifiedService::new("member-1", &config.unified, factory);
//! let outcome = service.create_post(&CreatePostOptions::new("Hello #rust")).await;
//! println!("{:?} via {:?}", outcome.result, outcome.source);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod logging;
pub mod rate_limiter;
pub mod retry;
pub mod types;
pub mod unified;
pub mod voyager;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use credentials::{CredentialStore, Credentials, MemoryCredentialStore};
pub use db::{Database, SqliteCredentialStore};
pub use error::{ApiResult, ErrorCode, ErrorInfo, LinkpostError, Result};
pub use rate_limiter::{RateLimitConfig, RateLimitPolicy, RateLimiter};
pub use retry::RetryConfig;
pub use types::{
    AnalyticsSummary, ContentAnalytics, CreatePostOptions, PostAnalytics, PostWithAnalytics,
    Profile, ProfileStatistics, PublishedPost, RecentPost, TimePeriod, Visibility,
};
pub use unified::{
    FallbackTrigger, OfficialApi, OfficialFailure, ServiceResult, Source, UnifiedService,
    VoyagerServiceFactory,
};
pub use voyager::{MetricsService, PostService, VoyagerClient};
