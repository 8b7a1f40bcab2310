//! 📂 The file source — a collection export, one JSON object per line.
//!
//! NDJSON in, `Record`s out. The format every datastore can dump and every
//! engineer has grep'd at least once while muttering.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::{
    fs::File,
    io::{self, AsyncBufReadExt},
};

use crate::common::Record;
use crate::sources::{RecordSource, matches_query};

// 📂 FileSourceConfig lives here, next to the thing it configures.
// Wild concept. Next up: socks living near feet.
#[derive(Debug, Deserialize, Clone)]
pub struct FileSourceConfig {
    pub file_name: String,
}

/// 📂 Reads an NDJSON export line by line and vends one `Record` per line.
///
/// Blank lines are skipped. A line that isn't valid JSON is an error, not a
/// shrug — a half-parsed export re-indexed silently is the kind of data loss
/// you only discover from a customer.
///
/// 🧵 Async, non-blocking: the BufReader wraps a tokio `File`, so this is
/// real async I/O, not blocking I/O in a trench coat.
#[derive(Debug)]
pub struct FileSource {
    reader: io::BufReader<File>,
    config: FileSourceConfig,
    query: Option<Value>,
    line_no: usize,
}

impl FileSource {
    /// 🚀 Open the export file and get ready to vend records.
    ///
    /// If the file doesn't exist: 💀 anyhow will tell you, with directions.
    pub async fn new(config: FileSourceConfig, query: Option<Value>) -> Result<Self> {
        let file = open_export(&config.file_name).await?;
        Ok(Self {
            reader: io::BufReader::new(file),
            config,
            query,
            line_no: 0,
        })
    }
}

// 💀 The door. It's locked. Or it doesn't exist. Or the filesystem lied.
// Either way the export refused to open, and the context string below is
// what you'll be reading about it.
async fn open_export(file_name: &str) -> Result<File> {
    File::open(file_name).await.with_context(|| {
        format!(
            "💀 The export file '{}' would not open. We checked that it exists (it might not). \
             We checked permissions (they might be wrong). The file remains unopened. \
             We remain outside.",
            file_name
        )
    })
}

#[async_trait]
impl RecordSource for FileSource {
    /// 🔢 Count the records by reading the file once, separately.
    ///
    /// The streaming read is not restartable, so counting gets its own file
    /// handle and its own pass. Blank lines don't count. Nothing is parsed —
    /// this is a line count, not a validation pass.
    async fn count(&mut self) -> Result<u64> {
        let file = open_export(&self.config.file_name).await?;
        let mut reader = io::BufReader::new(file);
        let mut line = String::new();
        let mut total: u64 = 0;
        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await.with_context(|| {
                format!("💀 Lost the plot while counting lines in '{}'.", self.config.file_name)
            })?;
            if bytes_read == 0 {
                break;
            }
            if !line.trim().is_empty() {
                total += 1;
            }
        }
        Ok(total)
    }

    async fn next_record(&mut self) -> Result<Option<Record>> {
        let mut line = String::new();
        loop {
            line.clear();
            let bytes_read = self.reader.read_line(&mut line).await.with_context(|| {
                format!("💀 Read error in '{}' after line {}.", self.config.file_name, self.line_no)
            })?;
            if bytes_read == 0 {
                // 📄 EOF. The well is dry. 🏁
                return Ok(None);
            }
            self.line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let value: Value = serde_json::from_str(trimmed).with_context(|| {
                format!(
                    "💀 Line {} of '{}' is not valid JSON. An export with a corrupt line is not \
                     an export, it's a trap.",
                    self.line_no, self.config.file_name
                )
            })?;

            let record = Record::new(value);
            if matches_query(&record, self.query.as_ref()) {
                return Ok(Some(record));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn write_export(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new()
            .expect("💀 Failed to create a temp export. The OS is out of inodes or patience.");
        file.write_all(contents.as_bytes())
            .expect("💀 Failed to write the temp export.");
        file
    }

    async fn file_source(file: &tempfile::NamedTempFile, query: Option<Value>) -> FileSource {
        let config = FileSourceConfig {
            file_name: file.path().to_string_lossy().into_owned(),
        };
        FileSource::new(config, query)
            .await
            .expect("💀 The temp export should open. It was literally just written.")
    }

    #[tokio::test]
    async fn the_one_where_lines_become_records_and_blanks_become_nothing() -> Result<()> {
        let file = write_export("{\"_id\":\"a\"}\n\n{\"_id\":\"b\"}\n");
        let mut source = file_source(&file, None).await;

        assert_eq!(source.count().await?, 2);
        assert_eq!(source.next_record().await?.unwrap().0["_id"], "a");
        assert_eq!(source.next_record().await?.unwrap().0["_id"], "b");
        assert!(source.next_record().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_filter_applies_but_the_count_does_not() -> Result<()> {
        let file = write_export(
            "{\"_id\":\"a\",\"kept\":true}\n{\"_id\":\"b\",\"kept\":false}\n{\"_id\":\"c\",\"kept\":true}\n",
        );
        let mut source = file_source(&file, Some(json!({"kept": true}))).await;

        assert_eq!(source.count().await?, 3, "count stays unfiltered");
        assert_eq!(source.next_record().await?.unwrap().0["_id"], "a");
        assert_eq!(source.next_record().await?.unwrap().0["_id"], "c");
        assert!(source.next_record().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_corrupt_line_stops_the_show() {
        let file = write_export("{\"_id\":\"a\"}\nthis is not json\n");
        let mut source = file_source(&file, None).await;

        assert!(source.next_record().await.unwrap().is_some());
        let err = source
            .next_record()
            .await
            .expect_err("💀 A garbage line must be an error, not a silent skip");
        assert!(format!("{err:#}").contains("not valid JSON"));
    }

    #[tokio::test]
    async fn the_one_where_the_export_simply_is_not_there() {
        let config = FileSourceConfig {
            file_name: "/definitely/not/here.ndjson".to_string(),
        };
        let err = FileSource::new(config, None)
            .await
            .expect_err("💀 A missing export must fail loudly at open time");
        assert!(format!("{err:#}").contains("would not open"));
    }
}
