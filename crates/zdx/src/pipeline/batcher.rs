//! 🚰 The streaming batcher — pulls records, fills crates, ships them one at a time.
//!
//! The backpressure story, in full: this loop calls `next_record` only when
//! it wants another record, and while a batch is being dispatched it is busy
//! awaiting the dispatch — so it isn't pulling, so the source isn't
//! producing. Suspension by simply not asking. The cheapest flow control
//! ever shipped and the hardest one to get wrong. 🦆
//!
//! Strictly sequential by design: no two batches are ever in flight at once.
//! Parallelism is the dispatcher's department, and only within one batch.

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::app_config::SyncJobConfig;
use crate::common::{Batch, IndexCommand};
use crate::pipeline::dispatcher::BulkDispatcher;
use crate::progress::ProgressMetrics;
use crate::sources::{RecordSource, SourceBackend};

/// 🚰 Builds fixed-size batches from the record stream and feeds the
/// dispatcher, in order, one at a time.
pub(crate) struct StreamingBatcher<'a> {
    job: &'a SyncJobConfig,
    index_name: &'a str,
    progress: ProgressMetrics,
}

impl<'a> StreamingBatcher<'a> {
    pub(crate) fn new(job: &'a SyncJobConfig, index_name: &'a str, total_docs: u64) -> Self {
        Self {
            job,
            index_name,
            progress: ProgressMetrics::new(index_name.to_string(), total_docs),
        }
    }

    /// 🔄 Drain the source into the index. Returns how many documents were
    /// actually dispatched (skipped records don't count; they never existed
    /// as far as the index is concerned).
    ///
    /// A dispatch failure aborts the whole run mid-stream — the source is
    /// abandoned where it stands and the error goes up. Batches that already
    /// landed stay landed; there is no cross-batch undo.
    pub(crate) async fn run(
        &mut self,
        source: &mut SourceBackend,
        dispatcher: &BulkDispatcher,
    ) -> Result<u64> {
        let mut batch = Batch::default();
        let mut indexed: u64 = 0;
        let mut skipped: u64 = 0;

        loop {
            let record = source
                .next_record()
                .await
                .context("💀 The record stream broke mid-sync. The collection giveth and the collection taketh away.")?;
            let Some(record) = record else {
                break;
            };

            // 🪪 no identifier, no entry — an id-less document can't be
            // addressed, which means it can't be replaced on the next run,
            // which means it would haunt the index forever. Skip it.
            let Some(id) = record.id(&self.job.serialize.id_field) else {
                skipped += 1;
                continue;
            };

            batch.push(IndexCommand {
                index: self.index_name.to_string(),
                kind: self.job.kind.clone(),
                id,
                body: record.index_body(&self.job.serialize),
            });

            if batch.len() == self.job.batch_size {
                // ⏸️ this await IS the backpressure: nothing pulls on the
                // source until the dispatch comes back happy
                indexed += self.ship(&mut batch, dispatcher).await?;
            }
        }

        // 📦 the last crate is allowed to be half full
        if !batch.is_empty() {
            indexed += self.ship(&mut batch, dispatcher).await?;
        }

        self.progress.finish();
        if skipped > 0 {
            warn!("🪪 skipped {} record(s) with no usable identifier", skipped);
        }
        debug!("🚰 source drained: {} document(s) dispatched", indexed);
        Ok(indexed)
    }

    /// 📡 Dispatch the current batch and reset it. Sequential, ordered, one
    /// at a time — the batch is taken, shipped, and only then is the stream
    /// allowed to continue.
    async fn ship(&mut self, batch: &mut Batch, dispatcher: &BulkDispatcher) -> Result<u64> {
        let full = std::mem::take(batch);
        let docs = full.len() as u64;
        let payload_bytes = dispatcher.dispatch(self.index_name, full).await?;
        self.progress.update(docs, payload_bytes);
        Ok(docs)
    }
}
