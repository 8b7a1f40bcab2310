//! 📡 The cluster's endpoints, one method each, replies interpreted.
//!
//! This layer knows the shape of a "yes". `{"acknowledged": true}` is a yes.
//! `{"ok": true}` is a vintage yes. `{"error": ...}` is a no with paperwork.
//! Anything else is modern art and gets returned as such.

use serde_json::Value;
use tracing::debug;

use crate::app_config::{EngineConfig, RetryConfig};
use crate::engine::client::{EngineReply, EngineRequest, RetryingClient};
use crate::engine::error::{EngineError, EngineResult};

/// 📡 A handle on one cluster: base URL + the retrying client underneath.
#[derive(Debug)]
pub(crate) struct EngineApi {
    client: RetryingClient,
    base_url: String,
}

impl EngineApi {
    pub(crate) fn new(engine: &EngineConfig, retry: &RetryConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: RetryingClient::new(engine, retry)?,
            // 🧼 the "/" hygiene you didn't know you needed. Without it:
            // `https://host//my-index`. One slash of difference, infinite suffering.
            base_url: engine.url.trim_end_matches('/').to_string(),
        })
    }

    fn index_url(&self, index: &str) -> String {
        format!("{}/{}", self.base_url, index)
    }

    /// 🏗️ `PUT <index>` — create a versioned index with settings + mappings.
    pub(crate) async fn create_index(&self, index: &str, body: &Value) -> EngineResult<()> {
        let url = self.index_url(index);
        let reply = self
            .client
            .execute(&EngineRequest::put(url.clone(), body.to_string()))
            .await?;
        expect_acknowledged(url, reply)
    }

    /// 🎛️ `PUT <index>/_settings` — flip tuning knobs on a live index.
    pub(crate) async fn put_settings(&self, index: &str, settings: &Value) -> EngineResult<()> {
        let url = format!("{}/_settings", self.index_url(index));
        let reply = self
            .client
            .execute(&EngineRequest::put(url.clone(), settings.to_string()))
            .await?;
        expect_no_error(url, reply)
    }

    /// 🔄 `POST <index>/_refresh` — make everything written so far searchable.
    pub(crate) async fn refresh(&self, index: &str) -> EngineResult<()> {
        let url = format!("{}/_refresh", self.index_url(index));
        let reply = self
            .client
            .execute(&EngineRequest::post_empty(url.clone()))
            .await?;
        expect_no_error(url, reply)
    }

    /// 🔍 `GET _alias/<alias>` — which concrete indices answer to this name?
    ///
    /// A 404 means the alias doesn't exist yet — on the very first sync of a
    /// collection that is the expected state of the world, so it reads as
    /// "no indices", not as a failure.
    pub(crate) async fn aliased_indices(&self, alias: &str) -> EngineResult<Vec<String>> {
        let url = format!("{}/_alias/{}", self.base_url, alias);
        let reply = self.client.execute(&EngineRequest::get(url.clone())).await?;

        if reply.status == 404 {
            debug!("🔍 alias '{}' doesn't exist yet — nothing bound, nothing stale", alias);
            return Ok(Vec::new());
        }
        if let Some(error) = reply.body.get("error") {
            return Err(EngineError::Application {
                url,
                status: reply.status,
                body: error.clone(),
            });
        }
        match reply.body.as_object() {
            Some(bound) => Ok(bound.keys().cloned().collect()),
            None => Err(EngineError::UnexpectedReply { url, body: reply.body }),
        }
    }

    /// 🔀 `POST _aliases` — apply a full action set in ONE request.
    ///
    /// The atomicity of this single call is the entire zero-downtime story.
    /// Split it in two and there's a window where the alias points at zero
    /// generations (clients see an empty collection) or two (clients see
    /// duplicates). Neither is a good look in production.
    pub(crate) async fn update_aliases(&self, actions: &Value) -> EngineResult<()> {
        let url = format!("{}/_aliases", self.base_url);
        let reply = self
            .client
            .execute(&EngineRequest::post(url.clone(), actions.to_string()))
            .await?;
        expect_acknowledged(url, reply)
    }

    /// 🗑️ `DELETE <index>` — retire a stale generation.
    pub(crate) async fn delete_index(&self, index: &str) -> EngineResult<()> {
        let url = self.index_url(index);
        let reply = self
            .client
            .execute(&EngineRequest::delete(url.clone()))
            .await?;
        expect_acknowledged(url, reply)
    }

    /// 📦 `POST <index>/_bulk` — ship one NDJSON sub-chunk.
    ///
    /// Bulk is special: the cluster can return 200 and STILL have failed —
    /// a top-level `"errors": true` means at least one document bounced.
    /// A 200 with errors is not a success. It's a rejection letter with
    /// good posture.
    pub(crate) async fn bulk(&self, index: &str, ndjson: String) -> EngineResult<()> {
        let url = format!("{}/_bulk", self.index_url(index));
        let reply = self
            .client
            .execute(&EngineRequest::post_ndjson(url.clone(), ndjson))
            .await?;

        let doc_errors = reply.body.get("errors").and_then(Value::as_bool) == Some(true);
        if reply.body.get("error").is_some() || doc_errors || !reply.is_success() {
            return Err(EngineError::Application {
                url,
                status: reply.status,
                body: reply.body,
            });
        }
        Ok(())
    }
}

/// ✅ The strict yes: no error payload, 2xx, and an explicit
/// acknowledged/ok flag. Used where a silent half-success would bite later
/// (create, alias swap, delete).
fn expect_acknowledged(url: String, reply: EngineReply) -> EngineResult<()> {
    if reply.body.get("error").is_some() || !reply.is_success() {
        return Err(EngineError::Application {
            url,
            status: reply.status,
            body: reply.body,
        });
    }
    let acknowledged = reply.body.get("acknowledged").and_then(Value::as_bool) == Some(true)
        || reply.body.get("ok").and_then(Value::as_bool) == Some(true);
    if acknowledged {
        Ok(())
    } else {
        Err(EngineError::UnexpectedReply { url, body: reply.body })
    }
}

/// ✅ The relaxed yes: delivered, 2xx, no error payload. Used for settings
/// and refresh, whose replies vary across engine versions and whose failures
/// the caller treats as survivable anyway.
fn expect_no_error(url: String, reply: EngineReply) -> EngineResult<()> {
    if reply.body.get("error").is_some() || !reply.is_success() {
        return Err(EngineError::Application {
            url,
            status: reply.status,
            body: reply.body,
        });
    }
    Ok(())
}
