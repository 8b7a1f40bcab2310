//! 🚰 Record sources — where the documents come from.
//!
//! A source is a faucet for records: it knows how many it has, and it hands
//! them over one at a time, strictly on demand. Nobody pushes. The pipeline
//! pulls when it's ready and the source waits politely in between — that
//! pause IS the backpressure, no clever machinery required. 🦆
//!
//! Sources do not serialize, batch, or talk to the cluster. They pour.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::app_config::SourceConfig;
use crate::common::Record;

pub mod file_source;
pub mod in_mem_source;

pub use file_source::{FileSource, FileSourceConfig};
pub use in_mem_source::{InMemorySource, InMemorySourceConfig};

/// 🚰 A finite, pull-based stream of records.
///
/// # Contract
/// - `count` reports the total number of records in the collection,
///   ignoring any query filter (progress wants the big number).
/// - `next_record` returns `Ok(Some(record))` while records flow and
///   `Ok(None)` exactly once the collection is exhausted. Not restartable —
///   a fresh run wants a fresh source.
/// - A configured query filter is applied during streaming: filtered-out
///   records are simply never returned.
/// - `&mut self` because sources have state. And feelings. Mostly state.
#[async_trait]
pub trait RecordSource: std::fmt::Debug {
    /// 🔢 Total records in the collection, filter not applied.
    async fn count(&mut self) -> Result<u64>;

    /// 📄 The next record, or `None` when the well runs dry.
    async fn next_record(&mut self) -> Result<Option<Record>>;
}

/// 🎭 The many faces of a record source — one enum, zero dynamic dispatch.
///
/// Each variant wraps a concrete source. The pipeline never knows (or cares)
/// whether records come from RAM or disk, which is exactly the amount of
/// caring it should do.
#[derive(Debug)]
pub enum SourceBackend {
    InMemory(InMemorySource),
    File(FileSource),
}

impl SourceBackend {
    /// 🏗️ Build a backend from config, wiring in the job's query filter.
    pub async fn from_config(config: &SourceConfig, query: Option<Value>) -> Result<Self> {
        match config {
            SourceConfig::File(file_config) => Ok(SourceBackend::File(
                FileSource::new(file_config.clone(), query).await?,
            )),
            SourceConfig::InMemory(mem_config) => Ok(SourceBackend::InMemory(
                InMemorySource::new(mem_config.records.clone(), query),
            )),
        }
    }
}

#[async_trait]
impl RecordSource for SourceBackend {
    async fn count(&mut self) -> Result<u64> {
        match self {
            SourceBackend::InMemory(s) => s.count().await,
            SourceBackend::File(s) => s.count().await,
        }
    }

    async fn next_record(&mut self) -> Result<Option<Record>> {
        match self {
            SourceBackend::InMemory(s) => s.next_record().await,
            SourceBackend::File(s) => s.next_record().await,
        }
    }
}

/// 🔍 Top-level field equality match — the whole query language.
///
/// `{"country": "de"}` matches records whose `country` field equals `"de"`.
/// Every key must match. A `None` query matches everything, including
/// records that are not even objects (they'll be dropped later for having
/// no identifier, which is their problem).
pub(crate) fn matches_query(record: &Record, query: Option<&Value>) -> bool {
    let Some(Value::Object(expected)) = query else {
        return true;
    };
    let Some(fields) = record.0.as_object() else {
        return false;
    };
    expected
        .iter()
        .all(|(key, value)| fields.get(key) == Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn the_one_where_no_query_waves_everything_through() {
        let record = Record::new(json!({"country": "de"}));
        assert!(matches_query(&record, None));
    }

    #[test]
    fn the_one_where_every_key_has_to_agree() {
        let record = Record::new(json!({"country": "de", "active": true}));

        assert!(matches_query(
            &record,
            Some(&json!({"country": "de", "active": true}))
        ));
        assert!(!matches_query(
            &record,
            Some(&json!({"country": "de", "active": false}))
        ));
        assert!(!matches_query(&record, Some(&json!({"missing": 1}))));
    }
}
