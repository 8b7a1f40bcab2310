pub mod app_config;
pub mod common;
pub mod engine;
pub mod pipeline;
pub mod sources;

pub(crate) mod progress;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::app_config::AppConfig;
use crate::common::IndexMapping;
use crate::engine::EngineApi;
use crate::pipeline::{Orchestrator, SyncOutcome};
use crate::sources::SourceBackend;

/// Re-sync a record collection into a search index behind a stable alias,
/// with zero downtime. Returns how many documents the run processed.
pub async fn sync(
    config: &AppConfig,
    mapping: IndexMapping,
    source: &mut SourceBackend,
) -> Result<SyncOutcome> {
    let api = Arc::new(EngineApi::new(&config.engine, &config.retry)?);
    Orchestrator::new(api, &config.job, &mapping)
        .run(source)
        .await
}

/// The CLI path: build the source and the mapping from config, then sync.
pub async fn run(config: AppConfig) -> Result<SyncOutcome> {
    let mapping = match &config.job.mapping_file {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path).await.with_context(|| {
                format!("💀 Couldn't read the mapping file '{path}'. No mapping, no index.")
            })?;
            IndexMapping::from_value(serde_json::from_str(&raw).with_context(|| {
                format!("💀 The mapping file '{path}' isn't valid JSON. The cluster would have said the same thing, less politely.")
            })?)
        }
        None => IndexMapping::empty(),
    };

    let mut source = SourceBackend::from_config(&config.source, config.job.query.clone())
        .await
        .context("💀 Couldn't build the record source from config")?;

    sync(&config, mapping, &mut source).await
}
