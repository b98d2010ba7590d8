//! Voyager API integration
//!
//! - [`client`]: authenticated request pipeline (credentials, rate limits, retries)
//! - [`endpoints`]: endpoint table and request descriptions
//! - [`http`]: transport seam and the `reqwest` implementation
//! - [`mock`]: scripted transport for tests
//! - [`posts`]: create, edit, delete and repost
//! - [`metrics`]: profile, analytics and content summaries

pub mod client;
pub mod endpoints;
pub mod http;
pub mod metrics;
pub mod mock;
pub mod posts;

pub use client::{CredentialStatus, Response, VoyagerClient};
pub use endpoints::{Endpoint, RequestSpec};
pub use http::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportFailure,
    TransportFailureKind,
};
pub use metrics::{engagement_rate, MetricsService};
pub use mock::MockTransport;
pub use posts::{extract_hashtags, PostService};
