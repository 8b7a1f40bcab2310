//! 🔁 The retrying client — one request, sent until it lands or we run out of hope.
//!
//! 🎬 COLD OPEN — INT. NETWORK LAYER — TIME HAS NO MEANING HERE
//!
//! The request goes out. The request comes back as a connection reset.
//! The request goes out again, slower this time, like knocking softer on a
//! door that didn't answer the first time. Eventually either the door opens
//! or we leave a note. This module is the note-leaving policy.
//!
//! 🔧 What retries: connect/send failures and the configured transient
//! statuses (throttling, gateway hiccups). What does NOT retry: any reply
//! that actually arrived with a non-transient status — including error
//! payloads. Interpreting those is the API layer's job. We deliver mail;
//! we don't read it.

use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, warn};

use crate::app_config::{EngineConfig, RetryConfig};
use crate::engine::error::{EngineError, EngineResult};

/// ✉️ One request, described declaratively so it can be rebuilt per attempt.
///
/// reqwest requests with bodies don't clone, and a retry loop that can only
/// run once is just a loop-shaped comment. So we keep the recipe, not the dish.
#[derive(Debug, Clone)]
pub(crate) struct EngineRequest {
    pub method: reqwest::Method,
    pub url: String,
    pub body: Option<String>,
    pub content_type: &'static str,
}

impl EngineRequest {
    pub(crate) fn get(url: String) -> Self {
        Self { method: reqwest::Method::GET, url, body: None, content_type: "application/json" }
    }

    pub(crate) fn put(url: String, body: String) -> Self {
        Self { method: reqwest::Method::PUT, url, body: Some(body), content_type: "application/json" }
    }

    pub(crate) fn post(url: String, body: String) -> Self {
        Self { method: reqwest::Method::POST, url, body: Some(body), content_type: "application/json" }
    }

    pub(crate) fn post_empty(url: String) -> Self {
        Self { method: reqwest::Method::POST, url, body: None, content_type: "application/json" }
    }

    pub(crate) fn delete(url: String) -> Self {
        Self { method: reqwest::Method::DELETE, url, body: None, content_type: "application/json" }
    }

    /// 📦 The bulk endpoint insists on x-ndjson. Not application/json.
    /// The x- prefix means "we made this up but we're committing to it."
    pub(crate) fn post_ndjson(url: String, body: String) -> Self {
        Self {
            method: reqwest::Method::POST,
            url,
            body: Some(body),
            content_type: "application/x-ndjson",
        }
    }
}

/// 📬 What came back: the status and whatever JSON the body contained.
/// A body that isn't JSON (or isn't there) reads as `Value::Null` — the API
/// layer treats that with the suspicion it deserves.
#[derive(Debug, Clone)]
pub(crate) struct EngineReply {
    pub status: u16,
    pub body: Value,
}

impl EngineReply {
    pub(crate) fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 🔁 The envoy we send into the HTTP wilderness, now with a travel budget.
///
/// Holds one reused `reqwest::Client` (spinning up a client per request is
/// the networking equivalent of buying a new car for every grocery run),
/// the cluster auth, and the backoff policy.
pub(crate) struct RetryingClient {
    http: reqwest::Client,
    engine: EngineConfig,
    retry: RetryConfig,
}

impl std::fmt::Debug for RetryingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 🔒 engine config carries credentials; they don't go in debug output.
        f.debug_struct("RetryingClient")
            .field("url", &self.engine.url)
            .field("retry", &self.retry)
            .finish()
    }
}

impl RetryingClient {
    /// 🚀 Build the client: 10s to shake hands, 30s for the whole reply.
    /// If the cluster can't handshake in 10 seconds it's not having a good
    /// time, and neither are we.
    pub(crate) fn new(engine: &EngineConfig, retry: &RetryConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .context("💀 The HTTP client refused to be born. Probably a missing TLS cert or a cursed system OpenSSL. Either way: tragic.")?;

        Ok(Self {
            http,
            engine: engine.clone(),
            retry: retry.clone(),
        })
    }

    /// 📡 Execute one request with exponential backoff on transient failure.
    ///
    /// The loop: send → if the network failed or the status is in the
    /// transient list, sleep and go again → otherwise hand the reply back,
    /// whatever it says. After `max_attempts` strikes, surface the last
    /// reason as [`EngineError::RetriesExhausted`].
    ///
    /// Backoff grows by `backoff_multiplier` per attempt and is capped at
    /// `max_backoff_ms` — exponential enthusiasm, bounded patience.
    pub(crate) async fn execute(&self, request: &EngineRequest) -> EngineResult<EngineReply> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut backoff = Duration::from_millis(self.retry.initial_backoff_ms);
        let mut last_reason = String::from("no attempt was made (this should be unreachable)");

        for attempt in 1..=max_attempts {
            match self.send_once(request).await {
                Ok(reply) => {
                    if self.retry.retry_statuses.contains(&reply.status) {
                        // 🚦 transient status — the cluster is having a moment, not an opinion
                        last_reason = format!("transient status {}", reply.status);
                    } else {
                        return Ok(reply);
                    }
                }
                Err(reason) => {
                    // 💀 the network ate it: refused, reset, timed out, or worse
                    last_reason = reason;
                }
            }

            if attempt < max_attempts {
                warn!(
                    "🔁 {} {} attempt {}/{} failed ({}) — backing off {:?}",
                    request.method, request.url, attempt, max_attempts, last_reason, backoff
                );
                tokio::time::sleep(backoff).await;
                let next = Duration::from_secs_f64(
                    backoff.as_secs_f64() * self.retry.backoff_multiplier,
                );
                backoff = next.min(Duration::from_millis(self.retry.max_backoff_ms));
            }
        }

        Err(EngineError::RetriesExhausted {
            url: request.url.clone(),
            attempts: max_attempts,
            reason: last_reason,
        })
    }

    /// 📡 One attempt: build, auth, send, slurp. Errors come back as strings
    /// because at this layer every failure means the same thing — try again.
    async fn send_once(&self, request: &EngineRequest) -> std::result::Result<EngineReply, String> {
        let mut builder = self.http.request(request.method.clone(), &request.url);

        if let Some(ref body) = request.body {
            builder = builder
                .header("Content-Type", request.content_type)
                .body(body.clone());
        }

        // 🔒 Auth priority: API key wins over basic auth. Not a democracy.
        if let Some(ref api_key) = self.engine.api_key {
            builder = builder.header("Authorization", format!("ApiKey {}", api_key));
        } else if let Some(ref username) = self.engine.username {
            builder = builder.basic_auth(username, self.engine.password.as_ref());
        }

        let response = builder.send().await.map_err(|err| err.to_string())?;
        let status = response.status().as_u16();

        // 📬 read the body; if it isn't JSON, Null stands in and the caller
        // gets to decide how offended to be
        let text = response.text().await.map_err(|err| err.to_string())?;
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);

        debug!("📬 {} {} → {}", request.method, request.url, status);
        Ok(EngineReply { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn snappy_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            backoff_multiplier: 2.0,
            ..RetryConfig::default()
        }
    }

    fn client_for(server: &MockServer, retry: RetryConfig) -> RetryingClient {
        let engine = EngineConfig {
            url: server.uri(),
            username: None,
            password: None,
            api_key: None,
        };
        RetryingClient::new(&engine, &retry)
            .expect("💀 Building a plain HTTP client should not be where this test dies")
    }

    #[tokio::test]
    async fn the_one_where_a_503_gets_a_second_and_third_chance() {
        let server = MockServer::start().await;
        // 🚦 two transient replies, then sunshine
        Mock::given(method("GET"))
            .and(path("/_flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/_flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let client = client_for(&server, snappy_retry(5));
        let reply = client
            .execute(&EngineRequest::get(format!("{}/_flaky", server.uri())))
            .await
            .expect("💀 Three knocks should have been enough");

        assert_eq!(reply.status, 200);
        assert_eq!(reply.body["ok"], true);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn the_one_where_the_retry_budget_runs_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server, snappy_retry(3));
        let err = client
            .execute(&EngineRequest::get(format!("{}/_down", server.uri())))
            .await
            .expect_err("💀 A permanently down endpoint must exhaust the budget");

        match err {
            EngineError::RetriesExhausted { attempts, reason, .. } => {
                assert_eq!(attempts, 3);
                assert!(reason.contains("503"));
            }
            honestly_who_knows => panic!("💀 Wrong error flavor: {honestly_who_knows:?}"),
        }
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn the_one_where_a_400_is_final_and_nobody_argues() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_nope"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"error": "mapper_parsing_exception"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, snappy_retry(5));
        let reply = client
            .execute(&EngineRequest::get(format!("{}/_nope", server.uri())))
            .await
            .expect("💀 A 400 is a delivered reply, not a transport failure");

        // 🚫 delivered, not retried — one request on the wire, reply handed up
        assert_eq!(reply.status, 400);
        assert!(!reply.is_success());
        assert_eq!(reply.body["error"], "mapper_parsing_exception");
    }

    #[tokio::test]
    async fn the_one_where_nobody_is_listening_on_the_other_end() {
        // 📡 port 9 is the discard protocol; nothing serves HTTP there
        let engine = EngineConfig {
            url: "http://127.0.0.1:9".to_string(),
            username: None,
            password: None,
            api_key: None,
        };
        let client = RetryingClient::new(&engine, &snappy_retry(2))
            .expect("💀 Client construction has no business failing here");

        let err = client
            .execute(&EngineRequest::get("http://127.0.0.1:9/".to_string()))
            .await
            .expect_err("💀 A dead socket should exhaust retries");

        assert!(matches!(err, EngineError::RetriesExhausted { attempts: 2, .. }));
    }
}
