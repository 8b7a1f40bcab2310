//! 🧠 The in-memory source — records that never left the building.
//!
//! Seeded from config or straight from code. Small collections, demos, and
//! every test in this crate that needs a collection without the commitment
//! of owning one.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;

use crate::common::Record;
use crate::sources::{RecordSource, matches_query};

/// 🧠 Config for the in-memory source: the records, verbatim.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct InMemorySourceConfig {
    #[serde(default)]
    pub records: Vec<Value>,
}

/// 🧠 A source backed by a `VecDeque` and nothing else.
///
/// Tracks how often it was counted and how many records were pulled —
/// cheap bookkeeping that lets a test prove a phase never touched the
/// collection, instead of vibing about it.
#[derive(Debug)]
pub struct InMemorySource {
    records: VecDeque<Record>,
    query: Option<Value>,
    total: u64,
    /// 🔢 how many times `count` was asked.
    pub(crate) count_calls: usize,
    /// 📄 how many records were pulled off the queue (pre-filter).
    pub(crate) records_pulled: usize,
}

impl InMemorySource {
    pub fn new(records: Vec<Value>, query: Option<Value>) -> Self {
        let total = records.len() as u64;
        Self {
            records: records.into_iter().map(Record::new).collect(),
            query,
            total,
            count_calls: 0,
            records_pulled: 0,
        }
    }
}

#[async_trait]
impl RecordSource for InMemorySource {
    async fn count(&mut self) -> Result<u64> {
        self.count_calls += 1;
        Ok(self.total)
    }

    async fn next_record(&mut self) -> Result<Option<Record>> {
        // 🔄 pop until something survives the filter, or the queue is empty
        while let Some(record) = self.records.pop_front() {
            self.records_pulled += 1;
            if matches_query(&record, self.query.as_ref()) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}
