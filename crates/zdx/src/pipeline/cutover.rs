//! 🔀 Alias cutover — the atomic handover that makes the whole thing zero-downtime.
//!
//! 🎬 COLD OPEN — INT. AIR TRAFFIC CONTROL — THE MOMENT OF TRUTH
//!
//! Two indices. One alias. Every client in production is reading through
//! that alias RIGHT NOW. The swap has to happen in a single engine request:
//! remove the old generations, add the new one, no intermediate state where
//! the alias resolves to nothing (clients see an empty collection) or to two
//! generations (clients see doubles). One request. One reply. One new world.
//!
//! The planning half of this module is a pure function, because the part of
//! the code that decides what to swap should be testable without a cluster
//! in the room.

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::engine::EngineApi;

/// 🔀 The computed swap: exactly one add, zero or more removes.
///
/// Remove candidates are the indices currently bound to the alias whose
/// names start with the alias name — i.e. prior generations of this same
/// collection — minus the new index itself (re-adding an index that's
/// already bound is fine; removing it would be a self-own).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AliasActionSet {
    pub alias: String,
    pub add_index: String,
    pub remove_indices: Vec<String>,
}

impl AliasActionSet {
    /// 🧮 Pure planning: alias + new index + currently-bound indices in,
    /// action set out. No I/O, no clock, no excuses for not testing it.
    pub(crate) fn plan(alias: &str, new_index: &str, bound_indices: &[String]) -> Self {
        let remove_indices = bound_indices
            .iter()
            .filter(|name| name.starts_with(alias) && name.as_str() != new_index)
            .cloned()
            .collect();

        Self {
            alias: alias.to_string(),
            add_index: new_index.to_string(),
            remove_indices,
        }
    }

    /// 📦 The `_aliases` request body, removes listed first, add last —
    /// order inside the request is cosmetic (the engine applies the action
    /// set atomically), but a stable order makes replies and logs diffable.
    pub(crate) fn to_request_body(&self) -> Value {
        let mut actions: Vec<Value> = self
            .remove_indices
            .iter()
            .map(|index| {
                json!({
                    "remove": {
                        "alias": self.alias,
                        "index": index
                    }
                })
            })
            .collect();

        actions.push(json!({
            "add": {
                "alias": self.alias,
                "index": self.add_index
            }
        }));

        json!({ "actions": actions })
    }
}

/// 🔀 Execute the full cutover: look up what the alias points at, plan the
/// swap, apply it in ONE request. Returns the names that were removed from
/// the alias — the orchestrator deletes those indices afterwards.
pub(crate) async fn swap_alias(
    api: &EngineApi,
    alias: &str,
    new_index: &str,
) -> Result<Vec<String>> {
    let bound = api
        .aliased_indices(alias)
        .await
        .with_context(|| format!("💀 Couldn't find out what alias '{alias}' currently points at. Swapping blind is not a strategy."))?;
    debug!("🔍 alias '{}' currently resolves to {:?}", alias, bound);

    let plan = AliasActionSet::plan(alias, new_index, &bound);
    api.update_aliases(&plan.to_request_body())
        .await
        .with_context(|| {
            format!(
                "💀 The atomic alias swap for '{alias}' failed. The new index '{new_index}' is \
                 built and populated but unreferenced — the old generation still serves traffic, \
                 which is annoying but not an outage."
            )
        })?;

    info!(
        "🔀 alias '{}' now points at '{}' ({} stale generation(s) unbound)",
        alias,
        new_index,
        plan.remove_indices.len()
    );
    Ok(plan.remove_indices)
}
