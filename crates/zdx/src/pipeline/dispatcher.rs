//! 🧵 The bulk dispatcher — one batch in, W concurrent bulk requests out.
//!
//! 🎬 COLD OPEN — INT. LOADING DOCK — CONTINUOUS
//!
//! A batch arrives on a pallet. Four workers look at it. The batch is cut
//! into contiguous sub-chunks, each worker grabs one, and for a glorious
//! moment the cluster receives exactly as much parallelism as it was
//! configured to receive and not one request more. Somewhere, a capacity
//! planner sheds a single proud tear.
//!
//! 🔧 The concurrency bound is structural, not aspirational: W worker tasks
//! consume sub-chunks from a closed channel. There is no way to have W+1
//! requests in flight because there is no W+1th worker. 🦆

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tracing::{debug, trace};

use crate::common::{Batch, IndexCommand};
use crate::engine::EngineApi;
use crate::engine::error::EngineError;

/// 📦 How many commands one sub-chunk may carry: `ceil(batch_size / W)`.
///
/// Sized so a full batch splits into at most W sub-chunks — one per worker,
/// everyone busy, nobody queueing behind an idle colleague.
pub(crate) fn chunk_capacity(batch_size: usize, worker_count: usize) -> usize {
    batch_size.div_ceil(worker_count.max(1)).max(1)
}

/// ✂️ Cut a command sequence into contiguous sub-chunks.
///
/// No reordering, no overlap, nothing dropped: concatenating the output in
/// order reconstructs the input exactly. The last chunk may run short;
/// that is its right.
pub(crate) fn split_chunks(
    commands: Vec<IndexCommand>,
    capacity: usize,
) -> Vec<Vec<IndexCommand>> {
    let capacity = capacity.max(1);
    let mut chunks = Vec::with_capacity(commands.len().div_ceil(capacity));
    let mut chunk = Vec::with_capacity(capacity);
    for command in commands {
        chunk.push(command);
        if chunk.len() == capacity {
            chunks.push(std::mem::replace(&mut chunk, Vec::with_capacity(capacity)));
        }
    }
    if !chunk.is_empty() {
        chunks.push(chunk);
    }
    chunks
}

/// 🧵 Fans one batch out over a bounded worker pool and fans the results
/// back in. The only parallel thing in the whole pipeline — everything
/// upstream is strictly sequential on purpose.
pub(crate) struct BulkDispatcher {
    api: Arc<EngineApi>,
    worker_count: usize,
    capacity: usize,
}

impl BulkDispatcher {
    pub(crate) fn new(api: Arc<EngineApi>, batch_size: usize, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        Self {
            api,
            worker_count,
            capacity: chunk_capacity(batch_size, worker_count),
        }
    }

    /// 📡 Ship one batch: split, render, fan out, fan in.
    ///
    /// Returns the total payload bytes shipped on success. On ANY sub-chunk
    /// failure the whole batch is failed and the first error encountered is
    /// surfaced; in-flight requests are left to finish (their results are
    /// discarded) and queued sub-chunks are never started — an abort flag
    /// turns the remaining workers into polite no-ops.
    pub(crate) async fn dispatch(&self, index: &str, batch: Batch) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        let batch_len = batch.len();
        let chunks = split_chunks(batch.into_commands(), self.capacity);
        let chunk_count = chunks.len();

        // 🔄 render everything up front — serialization failures should stop
        // the batch before a single byte goes on the wire
        let mut payloads = Vec::with_capacity(chunk_count);
        let mut total_bytes: u64 = 0;
        for (chunk_no, chunk) in chunks.into_iter().enumerate() {
            let mut body = String::with_capacity(chunk.len() * 160);
            for command in &chunk {
                command.render_into(&mut body)?;
            }
            total_bytes += body.len() as u64;
            payloads.push((chunk_no, body));
        }

        debug!(
            "🧵 dispatching {} docs as {} sub-chunk(s) across {} worker(s)",
            batch_len, chunk_count, self.worker_count
        );

        // ✉️ a bounded channel sized to hold every sub-chunk, closed after
        // loading — workers drain it and clock out when it's empty
        let (tx, rx) = async_channel::bounded(chunk_count);
        for payload in payloads {
            tx.send(payload)
                .await
                .context("💀 Failed to queue a sub-chunk. The channel was sized for exactly this. Physics has questions.")?;
        }
        drop(tx);

        let aborted = Arc::new(AtomicBool::new(false));
        let failures: Arc<Mutex<Vec<(usize, EngineError)>>> = Arc::new(Mutex::new(Vec::new()));

        let workers = self.worker_count.min(chunk_count);
        let mut handles = Vec::with_capacity(workers);
        for worker_no in 0..workers {
            let rx = rx.clone();
            let api = Arc::clone(&self.api);
            let aborted = Arc::clone(&aborted);
            let failures = Arc::clone(&failures);
            let index = index.to_string();

            handles.push(tokio::spawn(async move {
                while let Ok((chunk_no, payload)) = rx.recv().await {
                    if aborted.load(Ordering::Acquire) {
                        // 🛑 a colleague already hit a wall — drain, don't send
                        continue;
                    }
                    trace!("📦 worker {} shipping sub-chunk {}", worker_no, chunk_no + 1);
                    if let Err(err) = api.bulk(&index, payload).await {
                        aborted.store(true, Ordering::Release);
                        failures
                            .lock()
                            .expect("bulk failure list mutex poisoned") // only ever poisoned if a worker panicked, which is its own bug
                            .push((chunk_no, err));
                    }
                }
            }));
        }

        // 🔄 fan-in: wait for every worker, even after a failure — in-flight
        // requests get to land, we just stop caring about their feelings
        for handle in handles {
            handle
                .await
                .context("💀 A dispatch worker panicked. The batch is failed and so is our composure.")?;
        }

        let first_failure = failures
            .lock()
            .expect("bulk failure list mutex poisoned")
            .drain(..)
            .next();
        if let Some((chunk_no, err)) = first_failure {
            // 💀 first error in arrival order speaks for the batch
            return Err(err).with_context(|| {
                format!(
                    "💀 Bulk sub-chunk {}/{} of a {}-document batch failed. The batch is not \
                     committed piecemeal — the whole thing is declared lost.",
                    chunk_no + 1,
                    chunk_count,
                    batch_len
                )
            });
        }

        Ok(total_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::{EngineConfig, RetryConfig};
    use serde_json::{Map, json};
    use std::time::{Duration, Instant};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn command(i: usize) -> IndexCommand {
        IndexCommand {
            index: "things-1".to_string(),
            kind: "thing".to_string(),
            id: format!("doc-{i}"),
            body: Map::new(),
        }
    }

    fn commands(n: usize) -> Vec<IndexCommand> {
        (0..n).map(command).collect()
    }

    fn batch(n: usize) -> Batch {
        let mut batch = Batch::default();
        for i in 0..n {
            batch.push(command(i));
        }
        batch
    }

    async fn api_for(server: &MockServer) -> Arc<EngineApi> {
        let engine = EngineConfig {
            url: server.uri(),
            username: None,
            password: None,
            api_key: None,
        };
        let retry = RetryConfig {
            max_attempts: 1,
            initial_backoff_ms: 1,
            ..RetryConfig::default()
        };
        Arc::new(EngineApi::new(&engine, &retry).expect("💀 EngineApi should build"))
    }

    fn ids_in_order(chunks: &[Vec<IndexCommand>]) -> Vec<String> {
        chunks
            .iter()
            .flatten()
            .map(|c| c.id.clone())
            .collect()
    }

    #[test]
    fn the_one_where_the_chunks_partition_the_batch_exactly() {
        // 🎯 the canonical sizing: batch 1000, 4 workers → 250 per sub-chunk
        let capacity = chunk_capacity(1000, 4);
        assert_eq!(capacity, 250);

        let full = split_chunks(commands(1000), capacity);
        assert_eq!(full.len(), 4);
        assert!(full.iter().all(|c| c.len() == 250));

        let partial = split_chunks(commands(500), capacity);
        assert_eq!(partial.len(), 2);
        assert_eq!(partial[0].len(), 250);
        assert_eq!(partial[1].len(), 250);

        // ✂️ no drops, no duplicates, concatenation reconstructs the input
        let expected: Vec<String> = (0..1000).map(|i| format!("doc-{i}")).collect();
        assert_eq!(ids_in_order(&full), expected);
    }

    #[test]
    fn the_one_where_awkward_sizes_still_partition_cleanly() {
        // 🔢 7 docs, capacity 3 → 3 + 3 + 1
        let chunks = split_chunks(commands(7), 3);
        assert_eq!(
            chunks.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![3, 3, 1]
        );
        let expected: Vec<String> = (0..7).map(|i| format!("doc-{i}")).collect();
        assert_eq!(ids_in_order(&chunks), expected);

        // 🔢 fewer docs than one chunk → one short chunk, not zero chunks
        let chunks = split_chunks(commands(2), 250);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 2);

        // 🔢 one worker → one chunk, the whole batch
        assert_eq!(chunk_capacity(1000, 1), 1000);
    }

    #[tokio::test]
    async fn the_one_where_every_sub_chunk_reaches_the_dock() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/things-1/_bulk"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"took": 1, "errors": false})),
            )
            .expect(4)
            .mount(&server)
            .await;

        let dispatcher = BulkDispatcher::new(api_for(&server).await, 1000, 4);
        let bytes = dispatcher
            .dispatch("things-1", batch(1000))
            .await
            .expect("💀 A clean batch should dispatch cleanly");
        assert!(bytes > 0);

        // ✂️ every document made it onto the wire exactly once
        let requests = server.received_requests().await.unwrap();
        let mut seen_ids: Vec<String> = requests
            .iter()
            .flat_map(|r| {
                String::from_utf8_lossy(&r.body)
                    .lines()
                    .step_by(2)
                    .map(|line| {
                        serde_json::from_str::<serde_json::Value>(line).unwrap()["index"]["_id"]
                            .as_str()
                            .unwrap()
                            .to_string()
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        seen_ids.sort();
        let mut expected: Vec<String> = (0..1000).map(|i| format!("doc-{i}")).collect();
        expected.sort();
        assert_eq!(seen_ids, expected);
    }

    #[tokio::test]
    async fn the_one_where_two_workers_means_two_requests_at_a_time() {
        let server = MockServer::start().await;
        // ⏱️ each bulk takes 50ms; 4 sub-chunks over 2 workers = at least 2 waves
        Mock::given(method("POST"))
            .and(path("/things-1/_bulk"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"took": 1, "errors": false}))
                    .set_delay(Duration::from_millis(50)),
            )
            .expect(4)
            .mount(&server)
            .await;

        // batch_size 4 with 2 workers → capacity 2 → a batch of 8 makes 4 sub-chunks
        let dispatcher = BulkDispatcher::new(api_for(&server).await, 4, 2);
        let started = Instant::now();
        dispatcher
            .dispatch("things-1", batch(8))
            .await
            .expect("💀 The slow-but-steady batch should still land");

        // 🚦 lower bound only — wall clocks on CI are allowed to be slow,
        // but they are not allowed to run 4 requests in 2 slots
        assert!(
            started.elapsed() >= Duration::from_millis(100),
            "4 sub-chunks × 50ms on 2 workers cannot finish in under 100ms without cheating the bound"
        );
    }

    #[tokio::test]
    async fn the_one_where_one_bad_sub_chunk_sinks_the_whole_batch() {
        let server = MockServer::start().await;
        // ✅ the first bulk lands...
        Mock::given(method("POST"))
            .and(path("/things-1/_bulk"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"took": 1, "errors": false})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        // 💀 ...and everything after it bounces
        Mock::given(method("POST"))
            .and(path("/things-1/_bulk"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"errors": true, "items": []})),
            )
            .mount(&server)
            .await;

        let dispatcher = BulkDispatcher::new(api_for(&server).await, 4, 2);
        let err = dispatcher
            .dispatch("things-1", batch(8))
            .await
            .expect_err("💀 One failed sub-chunk must fail the batch");
        assert!(format!("{err:#}").contains("Bulk sub-chunk"));

        // 📦 the successful sub-chunk DID reach the cluster — batches are not
        // rolled back, only declared failed
        let requests = server.received_requests().await.unwrap();
        assert!(requests.len() >= 2, "at least the good one and a bad one went out");
    }
}
