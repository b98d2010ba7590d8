//! Scripted HTTP transport for testing
//!
//! Simulates the Voyager API without network access. Responses come from
//! routes (matched by URL fragment, reused for every matching request) or a
//! FIFO queue. Every request is recorded so tests can assert on headers,
//! bodies and call counts.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use super::http::{HttpRequest, HttpResponse, HttpTransport, TransportFailure};

type Reply = std::result::Result<HttpResponse, TransportFailure>;

#[derive(Debug)]
struct Route {
    fragment: String,
    reply: Reply,
    delay: Option<Duration>,
}

/// Mock transport for testing
#[derive(Debug, Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    queue: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<HttpRequest>>,
    delay: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every reply (simulates network latency)
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    fn add_route(&self, fragment: &str, reply: Reply, delay: Option<Duration>) -> &Self {
        self.routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Route {
                fragment: fragment.to_string(),
                reply,
                delay,
            });
        self
    }

    /// Answer every request whose URL contains `fragment`
    ///
    /// Routes are checked in registration order before the queue.
    pub fn route(&self, fragment: &str, response: HttpResponse) -> &Self {
        self.add_route(fragment, Ok(response), None)
    }

    pub fn route_json(&self, fragment: &str, status: u16, body: &str) -> &Self {
        self.route(fragment, HttpResponse::new(status, body))
    }

    /// Like [`route_json`](Self::route_json), answering after `delay`
    pub fn route_json_delayed(
        &self,
        fragment: &str,
        status: u16,
        body: &str,
        delay: Duration,
    ) -> &Self {
        self.add_route(fragment, Ok(HttpResponse::new(status, body)), Some(delay))
    }

    /// Fail every request whose URL contains `fragment`
    pub fn route_failure(&self, fragment: &str, failure: TransportFailure) -> &Self {
        self.add_route(fragment, Err(failure), None)
    }

    /// Queue a one-shot response
    pub fn push(&self, response: HttpResponse) -> &Self {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(response));
        self
    }

    pub fn push_json(&self, status: u16, body: &str) -> &Self {
        self.push(HttpResponse::new(status, body))
    }

    /// Queue a one-shot transport failure
    pub fn push_failure(&self, failure: TransportFailure) -> &Self {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(failure));
        self
    }

    /// Number of requests executed
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn last_request(&self) -> Option<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }

    /// Requests whose URL contains `fragment`
    pub fn requests_to(&self, fragment: &str) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.url.contains(fragment))
            .cloned()
            .collect()
    }

    fn reply_for(&self, url: &str) -> (Reply, Option<Duration>) {
        let routed = self
            .routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|route| url.contains(route.fragment.as_str()))
            .map(|route| (route.reply.clone(), route.delay));
        if let Some((reply, delay)) = routed {
            return (reply, delay.or(self.delay));
        }

        let reply = self
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| {
                Ok(HttpResponse::new(
                    404,
                    format!("{{\"message\":\"no scripted response for {url}\"}}"),
                ))
            });
        (reply, self.delay)
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn execute(&self, request: HttpRequest) -> Reply {
        let (reply, delay) = self.reply_for(&request.url);
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        reply
    }
}
