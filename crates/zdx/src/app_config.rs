//! 🔧 App Configuration — the sacred TOML-to-struct pipeline.
//!
//! 📡 Every knob a sync run can turn lives here, explicitly, in one struct.
//! No ambient environment reads scattered through the codebase, no
//! process-wide globals — the entry point takes an `AppConfig` and that is
//! the whole story. 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tracing::info;

use crate::sources::{FileSourceConfig, InMemorySourceConfig};

/// 📦 The AppConfig: everything one sync run needs to know about itself.
///
/// Built once per invocation, never mutated. If you find yourself wanting to
/// change a field mid-run, lie down until the feeling passes.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 📡 Where the search cluster lives and how to get past its bouncer.
    pub engine: EngineConfig,
    /// 🎛️ The run itself: alias, batch size, worker count, the works.
    pub job: SyncJobConfig,
    /// 🔁 How hard to keep knocking when the cluster doesn't answer.
    #[serde(default)]
    pub retry: RetryConfig,
    /// 🚰 Which record source to stream from.
    pub source: SourceConfig,
}

/// 📡 EngineConfig — the cluster URL plus tri-modal auth.
///
/// 🔒 Auth is username+password, api_key, or "I hope anonymous works".
/// API key beats basic auth when both are set. This is not a democracy;
/// api_key is the premium tier.
#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// 📡 Cluster URL, scheme and port included. Yes, all of it.
    pub url: String,
    /// 🔒 Username for basic auth. Optional, like flossing.
    #[serde(default)]
    pub username: Option<String>,
    /// 🔒 Password. If it's "password123", that's not a password, it's a confession.
    #[serde(default)]
    pub password: Option<String>,
    /// 🔒 API key auth — the key-fob tier. Wins over basic auth.
    #[serde(default)]
    pub api_key: Option<String>,
}

/// 🎛️ One sync run's worth of decisions, frozen at load time.
#[derive(Debug, Deserialize, Clone)]
pub struct SyncJobConfig {
    /// 🏷️ The stable alias clients query. Versioned indices hide behind it.
    pub alias: String,
    /// 🏷️ Document kind the mapping is registered under.
    #[serde(default = "default_kind")]
    pub kind: String,
    /// 📦 How many documents per batch before we stop pulling and ship.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// 🧵 How many bulk requests may be in flight for one batch.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// 🔍 Optional record filter — top-level field equality, applied while streaming.
    #[serde(default)]
    pub query: Option<Value>,
    /// 🧹 Which fields to strip before a document is allowed on the wire.
    #[serde(default)]
    pub serialize: SerializeOptions,
    /// 📍 Pre-supplied versioned index URI. Setting this skips index creation,
    /// alias cutover, and stale deletion — for append-only or externally
    /// managed index lifecycles where someone else owns the alias.
    #[serde(default)]
    pub external_index_uri: Option<String>,
    /// 🗺️ Path to a JSON file holding the translated index mapping (CLI path).
    /// Library callers pass an `IndexMapping` directly and ignore this.
    #[serde(default)]
    pub mapping_file: Option<String>,
}

/// 🧹 Serialization knobs: where the identifier hides and what else to strip.
#[derive(Debug, Deserialize, Clone)]
pub struct SerializeOptions {
    /// 🪪 The field holding the document identifier. Removed from every body,
    /// promoted into the action metadata.
    #[serde(default = "default_id_field")]
    pub id_field: String,
    /// 🧹 Internal framework fields that have no business being searchable.
    #[serde(default)]
    pub strip_fields: Vec<String>,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            id_field: default_id_field(),
            strip_fields: Vec::new(),
        }
    }
}

/// 🔁 Backoff policy for the retrying client.
///
/// Exponential: start at `initial_backoff_ms`, multiply by
/// `backoff_multiplier` per attempt, never exceed `max_backoff_ms`, give up
/// after `max_attempts`. The status list is the set of replies we treat as
/// "the cluster is having a moment" rather than "the cluster said no".
#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// 🚦 Transient statuses worth another knock: throttled or mid-hiccup.
    #[serde(default = "default_retry_statuses")]
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            retry_statuses: default_retry_statuses(),
        }
    }
}

/// 🎭 The many faces of a record source — config edition.
///
/// Externally tagged on purpose so the TOML reads like `[source.File]`,
/// and the variant name doubles as documentation.
#[derive(Debug, Deserialize, Clone)]
pub enum SourceConfig {
    File(FileSourceConfig),
    InMemory(InMemorySourceConfig),
}

// 🏷️ "_doc" — the kind name that survived the great mapping-type purge.
fn default_kind() -> String {
    "_doc".to_string()
}

// 🪪 "_id" — where identifiers live in every collection we've ever met.
fn default_id_field() -> String {
    "_id".to_string()
}

// 📦 1000 docs per batch — big enough to amortize the HTTP overhead,
// small enough that one batch failing doesn't ruin your whole afternoon.
fn default_batch_size() -> usize {
    1000
}

// 🧵 one worker per core the OS admits to having. If it won't say, one.
fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// 🚦 429 = slow down, 502/503/504 = somebody between us and the data is on fire.
// 400s are not in this list. A 400 retried is a 400 repeated, with feeling.
fn default_retry_statuses() -> Vec<u16> {
    vec![429, 502, 503, 504]
}

/// 🚀 Load the config — from env vars, an optional TOML file, or both.
///
/// 🔧 Merges environment variables (ZDX_*) with an optional TOML file.
/// - `config_file_name` is None  → env vars only. No file. No assumptions.
/// - `config_file_name` is Some  → env vars + TOML file, merged. TOML wins on conflicts.
///
/// 💀 Returns an error if the merged config is unparseable — and the error
/// message will actually tell you which layer let you down.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    // 🏗️ env vars are the base layer — ALL ZDX_* vars accepted, no velvet rope.
    let config = Figment::new().merge(Env::prefixed("ZDX_"));

    // 🎯 layer in TOML only if a file was actually provided.
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (ZDX_*). \
             One of them is lying about its schema.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (ZDX_*). \
                 No file was provided — this one's all on the environment. Classic."
            .to_string(),
    };

    config.extract().context(context_msg)
}
