//! 📦 Common data structures — the load-bearing nouns of zendex.
//!
//! ---
//!
//! 🎬 COLD OPEN — INT. STAGING CLUSTER — 11:58 PM, TWO MINUTES BEFORE THE CHANGE FREEZE
//!
//! A `Record` is pulled out of the collection. It has an identifier. It has
//! fields. It has no idea it is about to be stripped, wrapped in action
//! metadata, and mailed to a search cluster as half of an NDJSON couplet.
//! Nobody tells the records. It's kinder that way.
//!
//! 🦆
//!
//! This module defines the structs that ferry documents from the source
//! collection to the bulk endpoint: `Record` (raw, as pulled), `IndexCommand`
//! (addressed and stripped), `Batch` (a fixed-size crate of commands), and
//! `IndexMapping` (a sealed envelope we deliver but never open).

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use crate::app_config::SerializeOptions;

/// ✉️ An opaque index mapping, produced elsewhere, consumed by index creation.
///
/// We do not inspect it. We do not validate it. We place it under the
/// configured document kind in the create-index body and wish it well.
/// Schema translation is somebody else's department, and that department
/// does not take walk-ins.
#[derive(Debug, Clone)]
pub struct IndexMapping(Value);

impl IndexMapping {
    /// 📬 Wrap an already-translated mapping value.
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// 📭 An empty mapping — the cluster will infer field types on its own.
    /// Dynamic mapping: convenient in dev, a jump scare in prod.
    pub fn empty() -> Self {
        Self(Value::Object(Map::new()))
    }

    pub(crate) fn as_value(&self) -> &Value {
        &self.0
    }
}

impl Default for IndexMapping {
    fn default() -> Self {
        Self::empty()
    }
}

/// 🎯 One raw record, exactly as the source collection handed it over.
///
/// A `Record` is a JSON object wearing a newtype. It still carries its
/// internal identifier field and whatever private framework clutter the
/// source left in it — the batcher is responsible for the haircut.
#[derive(Debug, Clone)]
pub struct Record(pub Value);

impl Record {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// 🪪 Extract the document identifier from the configured id field.
    ///
    /// Returns `None` if the field is absent or not something we can spell as
    /// a string. A record without an identity does not get indexed — it gets
    /// skipped, counted, and quietly judged.
    pub(crate) fn id(&self, id_field: &str) -> Option<String> {
        match self.0.get(id_field)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// 🧹 Build the indexable body: every field except the identifier and the
    /// configured internal fields.
    ///
    /// The identifier travels in the action metadata, never in the body —
    /// the cluster reserves that name for itself and responds to duplicates
    /// with the enthusiasm of a customs officer finding undeclared fruit.
    pub(crate) fn index_body(&self, opts: &SerializeOptions) -> Map<String, Value> {
        let mut body = match self.0.as_object() {
            Some(fields) => fields.clone(),
            None => Map::new(),
        };
        body.remove(&opts.id_field);
        for field in &opts.strip_fields {
            body.remove(field);
        }
        body
    }
}

/// 📡 One fully-addressed index command: action metadata plus document body.
///
/// This is the atomic unit of the bulk wire format. On the wire it becomes
/// two newline-separated lines:
///
/// ```text
/// {"index":{"_index":"...","_type":"...","_id":"..."}}
/// {"field":"value"}
/// ```
///
/// Two lines per document. Always two. The bulk API counts in couplets and
/// has never forgiven anyone who sent it free verse.
#[derive(Debug, Clone)]
pub struct IndexCommand {
    /// 📍 Target versioned index — the concrete one, never the alias.
    pub index: String,
    /// 🏷️ Document kind the mapping was registered under.
    pub kind: String,
    /// 🪪 Document id, lifted from the record's identifier field.
    pub id: String,
    /// 📦 The indexable fields, identifier already removed.
    pub body: Map<String, Value>,
}

impl IndexCommand {
    /// 🔄 Append this command's action line + source line to a bulk body.
    ///
    /// Each line gets its own trailing `\n` — including the last one in the
    /// buffer, because the bulk endpoint rejects bodies without a final
    /// newline. That is not folklore. That is a 400.
    pub fn render_into(&self, out: &mut String) -> Result<()> {
        let action = serde_json::json!({
            "index": {
                "_index": self.index,
                "_type": self.kind,
                "_id": self.id,
            }
        });
        let action_line = serde_json::to_string(&action)
            .context("💀 Failed to serialize bulk action metadata. The JSON about the JSON refused to become JSON.")?;
        let body_line = serde_json::to_string(&self.body).with_context(|| {
            format!(
                "💀 Failed to serialize the body of document '{}'. It looked indexable. It lied.",
                self.id
            )
        })?;

        out.push_str(&action_line);
        out.push('\n');
        out.push_str(&body_line);
        out.push('\n');
        Ok(())
    }
}

/// 📦 An ordered run of index commands, bounded by the configured batch size.
///
/// Batches are built sequentially by the batcher and consumed destructively
/// by the dispatcher. They do not come back. There is no lost-and-found.
#[derive(Debug, Default)]
pub struct Batch {
    commands: Vec<IndexCommand>,
}

impl Batch {
    pub fn push(&mut self, command: IndexCommand) {
        self.commands.push(command);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// 🚚 Hand over the commands, preserving order. The batch is spent.
    pub fn into_commands(self) -> Vec<IndexCommand> {
        self.commands
    }

    /// 🔄 Render the whole batch as one NDJSON bulk body, trailing newline included.
    pub fn render(&self) -> Result<String> {
        // 📏 rough pre-allocation: body bytes are unknown until serialized,
        // so we budget ~160 bytes of action-line overhead per command and let
        // the allocator absorb our optimism.
        let mut out = String::with_capacity(self.commands.len() * 160);
        for command in &self.commands {
            command.render_into(&mut out)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn opts() -> SerializeOptions {
        SerializeOptions::default()
    }

    #[test]
    fn the_one_where_a_command_becomes_a_two_line_couplet() -> Result<()> {
        let record = Record::new(json!({"_id": "doc-42", "name": "towel", "stock": 7}));
        let command = IndexCommand {
            index: "products-123".to_string(),
            kind: "product".to_string(),
            id: record.id("_id").expect("💀 The test record lost its id on the way to the test"),
            body: record.index_body(&opts()),
        };

        let mut out = String::new();
        command.render_into(&mut out)?;

        // 🎯 two lines plus the trailing newline — splitting on '\n' yields a final empty piece
        let lines: Vec<&str> = out.split('\n').collect();
        assert_eq!(lines.len(), 3, "action line, source line, trailing newline. The holy trinity.");
        assert_eq!(lines[2], "", "the body must end with a newline or the bulk endpoint sulks");

        let action: Value = serde_json::from_str(lines[0])?;
        assert_eq!(action["index"]["_index"], "products-123");
        assert_eq!(action["index"]["_type"], "product");
        assert_eq!(action["index"]["_id"], "doc-42");

        let body: Value = serde_json::from_str(lines[1])?;
        assert!(body.get("_id").is_none(), "the identifier must never ride along in the body");
        assert_eq!(body["name"], "towel");
        assert_eq!(body["stock"], 7);
        Ok(())
    }

    #[test]
    fn the_one_where_a_numeric_id_gets_spelled_out() {
        let record = Record::new(json!({"_id": 1234, "name": "adapter"}));
        assert_eq!(record.id("_id"), Some("1234".to_string()));
    }

    #[test]
    fn the_one_where_an_id_less_record_has_no_identity() {
        let record = Record::new(json!({"name": "ghost"}));
        assert_eq!(record.id("_id"), None);

        // 🔧 an id of the wrong shape is as good as no id
        let record = Record::new(json!({"_id": {"nested": true}, "name": "weird"}));
        assert_eq!(record.id("_id"), None);
    }

    #[test]
    fn the_one_where_internal_fields_get_the_haircut() {
        let record = Record::new(json!({
            "_id": "doc-1",
            "name": "cable",
            "__v": 3,
            "_session": "nope"
        }));
        let opts = SerializeOptions {
            id_field: "_id".to_string(),
            strip_fields: vec!["__v".to_string(), "_session".to_string()],
        };

        let body = record.index_body(&opts);
        assert!(body.get("_id").is_none());
        assert!(body.get("__v").is_none());
        assert!(body.get("_session").is_none());
        assert_eq!(body.get("name"), Some(&json!("cable")));
    }

    #[test]
    fn the_one_where_a_batch_renders_every_couplet_in_order() -> Result<()> {
        let mut batch = Batch::default();
        for i in 0..3 {
            batch.push(IndexCommand {
                index: "things-1".to_string(),
                kind: "thing".to_string(),
                id: format!("doc-{i}"),
                body: Map::new(),
            });
        }

        let body = batch.render()?;
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 6, "three commands, six lines, zero surprises");
        assert!(body.ends_with('\n'), "trailing newline is non-negotiable");

        // 🔄 order in, order out
        for (i, chunk) in lines.chunks(2).enumerate() {
            let action: Value = serde_json::from_str(chunk[0])?;
            assert_eq!(action["index"]["_id"], format!("doc-{i}"));
        }
        Ok(())
    }
}
