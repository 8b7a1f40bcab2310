//! 🎛️ Index bodies — the JSON we send when creating and tuning an index.
//!
//! Pure data, zero I/O. The analyzer definitions in here are the product of
//! years of search-relevance archaeology; change them and every autocomplete
//! box downstream changes its personality.

use serde_json::{Value, json};

use crate::common::IndexMapping;

/// 🏗️ The full create-index body: tuning settings, analysis chain, and the
/// translated mapping filed under its document kind.
///
/// Highlights:
/// - `max_result_window` cranked to 100M — the stock 10k ceiling breaks deep
///   pagination over large collections.
/// - `autocomplete_index` feeds an edge-n-gram tokenizer (front-anchored,
///   1..50) so "c", "ca", "cat" all hit; `autocomplete_search` deliberately
///   does NOT n-gram the query side, or every search would match everything.
/// - `word_delimiter_graph` with `preserve_original` — the graph variant,
///   because the plain filter mangles inputs containing spaces.
pub(crate) fn create_index_body(kind: &str, mapping: &IndexMapping) -> Value {
    let mut body = json!({
        "settings": {
            "index": {
                "max_result_window": 100_000_000u64
            },
            "analysis": {
                "analyzer": {
                    // 🔤 standard search & indexing: case-insensitive keyword
                    "default": {
                        "tokenizer": "keyword",
                        "filter": ["lowercase", "standard"]
                    },
                    // ⌨️ indexing side of autocomplete: n-gram everything
                    "autocomplete_index": {
                        "type": "custom",
                        "tokenizer": "autocomplete_ngram",
                        "filter": ["trim", "lowercase", "asciifolding", "word_delimiter_1"]
                    },
                    // 🔎 query side of autocomplete: no n-grams, just hygiene
                    "autocomplete_search": {
                        "type": "custom",
                        "tokenizer": "keyword",
                        "filter": ["trim", "lowercase", "asciifolding"]
                    },
                    "whitespace": {
                        "type": "custom",
                        "tokenizer": "whitespace",
                        "filter": ["trim"]
                    },
                    "analyzer_case_insensitive": {
                        "tokenizer": "keyword",
                        "filter": "lowercase"
                    }
                },
                "filter": {
                    "word_delimiter_1": {
                        "type": "word_delimiter_graph",
                        "preserve_original": true
                    }
                },
                "tokenizer": {
                    "autocomplete_ngram": {
                        "type": "edgeNGram",
                        "min_gram": 1,
                        "max_gram": 50,
                        "side": "front"
                    }
                }
            }
        }
    });

    body["mappings"] = json!({});
    body["mappings"][kind] = mapping.as_value().clone();
    body
}

/// 🏎️ Bulk-load mode: no replicas to fan writes out to, no periodic refresh
/// interrupting segment writing. Population goes brrr.
pub(crate) fn bulk_load_settings() -> Value {
    json!({
        "settings": {
            "number_of_replicas": 0,
            "refresh_interval": -1
        }
    })
}

/// 🧘 Steady state: one replica back, refresh once a second like a normal index.
pub(crate) fn steady_state_settings() -> Value {
    json!({
        "settings": {
            "number_of_replicas": 1,
            "refresh_interval": "1s"
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn the_one_where_the_create_body_has_all_its_organs() {
        let mapping = IndexMapping::from_value(json!({
            "properties": {"name": {"type": "text"}}
        }));
        let body = create_index_body("product", &mapping);

        assert_eq!(body["settings"]["index"]["max_result_window"], 100_000_000u64);
        assert_eq!(
            body["settings"]["analysis"]["tokenizer"]["autocomplete_ngram"]["type"],
            "edgeNGram"
        );
        assert_eq!(
            body["settings"]["analysis"]["tokenizer"]["autocomplete_ngram"]["min_gram"],
            1
        );
        assert_eq!(
            body["settings"]["analysis"]["tokenizer"]["autocomplete_ngram"]["max_gram"],
            50
        );
        assert_eq!(
            body["settings"]["analysis"]["filter"]["word_delimiter_1"]["preserve_original"],
            true
        );
        for analyzer in [
            "default",
            "autocomplete_index",
            "autocomplete_search",
            "whitespace",
            "analyzer_case_insensitive",
        ] {
            assert!(
                body["settings"]["analysis"]["analyzer"].get(analyzer).is_some(),
                "💀 Analyzer '{analyzer}' went missing from the create body"
            );
        }

        // 🗺️ the mapping lands under its kind, untouched
        assert_eq!(
            body["mappings"]["product"]["properties"]["name"]["type"],
            "text"
        );
    }

    #[test]
    fn the_one_where_tuning_goes_fast_and_then_goes_home() {
        let fast = bulk_load_settings();
        assert_eq!(fast["settings"]["number_of_replicas"], 0);
        assert_eq!(fast["settings"]["refresh_interval"], -1);

        let calm = steady_state_settings();
        assert_eq!(calm["settings"]["number_of_replicas"], 1);
        assert_eq!(calm["settings"]["refresh_interval"], "1s");
    }
}
