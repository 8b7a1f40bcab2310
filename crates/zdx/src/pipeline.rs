//! 🎬 The sync pipeline — eight phases, one alias, zero downtime.
//!
//! 🎬 COLD OPEN — INT. WAR ROOM — REINDEX DAY
//!
//! The plan is taped to the wall. Build a brand-new versioned index next to
//! the old one. Pour the entire collection into it while production reads
//! happily from the old generation, blissfully unaware. Then, in a single
//! atomic request, yank the alias over. Clients never see the seam. The old
//! index is escorted out of the building. Nobody pages anybody.
//!
//! That plan, as code, is this module. The phases run strictly in order and
//! each one either advances the run or ends it:
//!
//! 1. create the versioned index            (fatal, skipped on external index)
//! 2. tune it for bulk loading              (best-effort)
//! 3. count the source documents            (fatal)
//! 4. populate via the streaming batcher    (fatal)
//! 5. revert the tuning                     (best-effort)
//! 6. refresh the index                     (best-effort)
//! 7. cut the alias over                    (fatal, skipped on external index)
//! 8. delete the stale generations          (failures logged, never fatal)
//!
//! State crosses phases in one explicit [`RunState`] struct owned by the
//! orchestrator — every phase says which fields it touches, and nothing is
//! smuggled through captured closures. 🦆

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::app_config::SyncJobConfig;
use crate::common::IndexMapping;
use crate::engine::{EngineApi, settings};
use crate::sources::{RecordSource, SourceBackend};

pub(crate) mod batcher;
pub(crate) mod cutover;
pub(crate) mod dispatcher;

use batcher::StreamingBatcher;
use dispatcher::BulkDispatcher;

/// ✅ What a finished run has to show for itself.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// 🔢 The document count snapshot taken before population — the number
    /// the run set out to process.
    pub documents: u64,
    /// 🏷️ The concrete index now serving (or, with an external index,
    /// the one that was appended to).
    pub versioned_index: String,
    /// 🗑️ Stale generations that were unbound from the alias AND actually
    /// deleted. A generation whose deletion failed is logged, not listed.
    pub removed_indices: Vec<String>,
}

/// 📦 The run's entire mutable state, in one place, owned by the
/// orchestrator, mutated only between phases. No closures, no cells,
/// no surprises.
#[derive(Debug)]
struct RunState {
    /// 🏷️ timestamp-suffixed index name, or the name carved out of the
    /// externally supplied URI
    versioned_index: String,
    /// 📍 true when the index lifecycle belongs to someone else — create,
    /// cutover, and delete all stand down
    external_index: bool,
    /// 🔢 collection size snapshot from the count phase
    doc_count: u64,
    /// 🗑️ what the cutover unbound; shrinks to what deletion confirmed
    indices_to_remove: Vec<String>,
}

/// 🎬 Sequences one full sync run. Build one, call [`Orchestrator::run`],
/// throw it away — runs don't share anything.
pub(crate) struct Orchestrator<'a> {
    api: Arc<EngineApi>,
    job: &'a SyncJobConfig,
    mapping: &'a IndexMapping,
}

impl<'a> Orchestrator<'a> {
    pub(crate) fn new(api: Arc<EngineApi>, job: &'a SyncJobConfig, mapping: &'a IndexMapping) -> Self {
        Self { api, job, mapping }
    }

    /// 🎬 Run all eight phases in order. A fatal phase error aborts the run
    /// right there — later phases never execute, and the error names the
    /// phase that died.
    pub(crate) async fn run(&self, source: &mut SourceBackend) -> Result<SyncOutcome> {
        let mut state = self.init_state()?;
        info!(
            "🎬 sync starting: alias '{}' → index '{}' (batch {}, workers {})",
            self.job.alias, state.versioned_index, self.job.batch_size, self.job.worker_count
        );

        self.create_index(&state).await?;
        self.tune_for_bulk_load(&state).await;
        self.count_docs(&mut state, source).await?;

        if let Err(err) = self.populate(&state, source).await {
            if !state.external_index {
                // 🏚️ deliberate: the half-built index is NOT deleted. It holds
                // whatever made the run die, which is exactly what you'll want
                // to look at. The alias never pointed at it, so nobody is
                // reading half a collection.
                warn!(
                    "🏚️ populate failed — versioned index '{}' is left in place, unreferenced, \
                     for post-mortem inspection",
                    state.versioned_index
                );
            }
            return Err(err);
        }

        self.revert_tuning(&state).await;
        self.refresh_index(&state).await;
        self.cutover(&mut state).await?;
        self.delete_stale(&mut state).await;

        info!(
            "✅ sync complete: {} document(s) → '{}'",
            state.doc_count, state.versioned_index
        );
        Ok(SyncOutcome {
            documents: state.doc_count,
            versioned_index: state.versioned_index,
            removed_indices: state.indices_to_remove,
        })
    }

    /// 🏷️ Phase 0, if you like: decide which index this run writes to.
    fn init_state(&self) -> Result<RunState> {
        let (versioned_index, external_index) = match &self.job.external_index_uri {
            Some(uri) => (index_name_from_uri(uri)?, true),
            None => (versioned_index_name(&self.job.alias), false),
        };
        Ok(RunState {
            versioned_index,
            external_index,
            doc_count: 0,
            indices_to_remove: Vec::new(),
        })
    }

    /// 🏗️ Phase 1 — create the versioned index with settings + mapping.
    /// Reads `versioned_index`. Fatal: without an index there is no run.
    async fn create_index(&self, state: &RunState) -> Result<()> {
        if state.external_index {
            debug!("🏗️ external index supplied — skipping index creation");
            return Ok(());
        }
        debug!("🏗️ creating versioned index '{}'", state.versioned_index);
        let body = settings::create_index_body(&self.job.kind, self.mapping);
        self.api
            .create_index(&state.versioned_index, &body)
            .await
            .context("💀 Index creation failed. Nothing was built, nothing needs cleaning up, nothing was synced.")
    }

    /// 🏎️ Phase 2 — replicas off, refresh off, maximum ingest speed.
    /// Best-effort: a cluster that won't tune still indexes, just slower.
    async fn tune_for_bulk_load(&self, state: &RunState) {
        if let Err(err) = self
            .api
            .put_settings(&state.versioned_index, &settings::bulk_load_settings())
            .await
        {
            warn!(
                "🎛️ couldn't switch '{}' into bulk-load mode — continuing at normal speed: {}",
                state.versioned_index, err
            );
        }
    }

    /// 🔢 Phase 3 — snapshot the collection size. Writes `doc_count`.
    /// Fatal: a collection that can't be counted can't be trusted to stream.
    async fn count_docs(&self, state: &mut RunState, source: &mut SourceBackend) -> Result<()> {
        state.doc_count = source
            .count()
            .await
            .context("💀 Couldn't count the source collection. If we can't even count it, streaming it is off the table.")?;
        info!("🔢 {} document(s) to sync", state.doc_count);
        Ok(())
    }

    /// 🚰 Phase 4 — stream the collection into the index. Reads
    /// `versioned_index` and `doc_count`. Fatal on any dispatch failure.
    async fn populate(&self, state: &RunState, source: &mut SourceBackend) -> Result<()> {
        if state.doc_count == 0 {
            // 📭 an empty collection still gets its cutover — the new (empty)
            // generation becomes authoritative, matching a full re-read
            debug!("📭 nothing to index — skipping population");
            return Ok(());
        }

        let dispatcher =
            BulkDispatcher::new(Arc::clone(&self.api), self.job.batch_size, self.job.worker_count);
        let mut batcher = StreamingBatcher::new(self.job, &state.versioned_index, state.doc_count);
        let indexed = batcher
            .run(source, &dispatcher)
            .await
            .context("💀 Population phase failed partway through the stream.")?;
        info!("🚰 population complete: {} document(s) dispatched", indexed);
        Ok(())
    }

    /// 🧘 Phase 5 — put the tuning back. Best-effort, same logic as phase 2:
    /// the documents are safe either way, only serving capacity is at stake.
    async fn revert_tuning(&self, state: &RunState) {
        if let Err(err) = self
            .api
            .put_settings(&state.versioned_index, &settings::steady_state_settings())
            .await
        {
            warn!(
                "🎛️ couldn't revert '{}' to steady-state settings — replicas/refresh are still \
                 in bulk mode and want a manual nudge: {}",
                state.versioned_index, err
            );
        }
    }

    /// 🔄 Phase 6 — refresh so everything written becomes searchable before
    /// the alias moves. Best-effort: the periodic refresh catches up anyway.
    async fn refresh_index(&self, state: &RunState) {
        if let Err(err) = self.api.refresh(&state.versioned_index).await {
            warn!(
                "🔄 refresh of '{}' failed — newly indexed documents may lag a refresh interval \
                 behind the cutover: {}",
                state.versioned_index, err
            );
        }
    }

    /// 🔀 Phase 7 — the atomic swap. Writes `indices_to_remove`. Fatal,
    /// but fail-safe: if the swap dies, the old generation keeps serving.
    async fn cutover(&self, state: &mut RunState) -> Result<()> {
        if state.external_index {
            debug!("🔀 external index supplied — the alias is not ours to move");
            return Ok(());
        }
        state.indices_to_remove =
            cutover::swap_alias(&self.api, &self.job.alias, &state.versioned_index)
                .await
                .context("💀 Alias cutover phase failed.")?;
        Ok(())
    }

    /// 🗑️ Phase 8 — delete what the cutover unbound, in parallel. Individual
    /// failures are logged and dropped from the outcome; the swap already
    /// happened and is not coming back.
    async fn delete_stale(&self, state: &mut RunState) {
        if state.external_index || state.indices_to_remove.is_empty() {
            return;
        }

        let deletions = state.indices_to_remove.iter().map(|index| {
            let api = Arc::clone(&self.api);
            let index = index.clone();
            async move {
                let result = api.delete_index(&index).await;
                (index, result)
            }
        });

        let mut deleted = Vec::with_capacity(state.indices_to_remove.len());
        for (index, result) in futures::future::join_all(deletions).await {
            match result {
                Ok(()) => {
                    debug!("🗑️ deleted stale index '{}'", index);
                    deleted.push(index);
                }
                Err(err) => warn!(
                    "🗑️ couldn't delete stale index '{}' — the cutover already happened, so this \
                     is cleanup debt, not an outage: {}",
                    index, err
                ),
            }
        }
        state.indices_to_remove = deleted;
    }
}

/// 🏷️ `<alias>-<nanos-since-epoch>`: sortable, unique per run, and boring in
/// exactly the way index names should be.
fn versioned_index_name(alias: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0); // clock before 1970 — index anyway, uniquely-ish
    format!("{}-{}", alias, nanos)
}

/// 📍 Carve the index name out of an externally supplied URI: the last
/// non-empty path segment. `http://host:9200/companies-preview` →
/// `companies-preview`; a bare name passes through unchanged.
fn index_name_from_uri(uri: &str) -> Result<String> {
    let name = uri.trim_end_matches('/').rsplit('/').next().unwrap_or("");
    anyhow::ensure!(
        !name.is_empty() && !name.contains(':'),
        "💀 Couldn't read an index name out of '{uri}'. Expected the last path segment to be the \
         index, found nothing usable."
    );
    Ok(name.to_string())
}
