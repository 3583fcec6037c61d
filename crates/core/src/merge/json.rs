//! Field-level merge of flat JSON objects.
//!
//! Values are opaque: nested objects and arrays are compared for equality
//! and never merged recursively.

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use tracing::debug;

use super::{merge_whole_document, MergeResult, Side};
use crate::errors::ConflictError;

/// Three-way merge of flat JSON maps, defaulting divergent keys to ours.
pub fn merge_json(
    base: &Map<String, Value>,
    ours: &Map<String, Value>,
    theirs: &Map<String, Value>,
) -> MergeResult<Map<String, Value>> {
    merge_json_with(base, ours, theirs, Side::Ours)
}

/// Three-way merge of flat JSON maps with an explicit tie-break.
///
/// Keys changed by both sides to different values take the `prefer` side and
/// are still reported in `conflict_details`.
pub fn merge_json_with(
    base: &Map<String, Value>,
    ours: &Map<String, Value>,
    theirs: &Map<String, Value>,
    prefer: Side,
) -> MergeResult<Map<String, Value>> {
    let mut merged = Map::new();
    let mut details = Vec::new();

    let mut seen = BTreeSet::new();
    let keys = ours
        .keys()
        .chain(theirs.keys())
        .chain(base.keys())
        .filter(|k| seen.insert(k.as_str()));

    for key in keys {
        let b = base.get(key);
        let o = ours.get(key);
        let t = theirs.get(key);

        let chosen = if o == t {
            o
        } else if o == b {
            t
        } else if t == b {
            o
        } else {
            debug!(key = %key, "json key changed on both sides");
            details.push(format!(
                "key '{}': ours={} theirs={}",
                key,
                describe(o),
                describe(t)
            ));
            match prefer {
                Side::Ours => o,
                Side::Theirs => t,
            }
        };

        if let Some(value) = chosen {
            merged.insert(key.clone(), value.clone());
        }
    }

    MergeResult::with_details(merged, details)
}

/// Merge three JSON documents given as text.
///
/// Empty text is an empty object (a file that does not exist on that side).
/// If any side is not a JSON object the documents are compared whole and the
/// parse failure is recorded alongside any conflict.
pub fn merge_json_text(base: &str, ours: &str, theirs: &str) -> MergeResult<String> {
    if ours == theirs || theirs == base {
        return MergeResult::clean(ours.to_string());
    }
    if ours == base {
        return MergeResult::clean(theirs.to_string());
    }

    let (base_map, ours_map, theirs_map) = match parse_all(base, ours, theirs) {
        Ok(maps) => maps,
        Err(e) => {
            debug!(error = %e, "falling back to whole-document comparison");
            let mut result = merge_whole_document(base, ours, theirs);
            if result.has_conflicts {
                result.conflict_details.push(e.to_string());
            }
            return result;
        }
    };

    let result = merge_json(&base_map, &ours_map, &theirs_map);
    MergeResult {
        content: render_object(&result.content),
        has_conflicts: result.has_conflicts,
        conflict_details: result.conflict_details,
    }
}

/// Parse a document into a JSON object. Blank text yields an empty object.
pub fn parse_object(text: &str) -> Result<Map<String, Value>, ConflictError> {
    if text.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ConflictError::InvalidDocument {
            kind: "json".into(),
            detail: format!("expected an object, found {}", type_name(&other)),
        }),
        Err(e) => Err(ConflictError::InvalidDocument {
            kind: "json".into(),
            detail: e.to_string(),
        }),
    }
}

type ObjectTriple = (Map<String, Value>, Map<String, Value>, Map<String, Value>);

fn parse_all(base: &str, ours: &str, theirs: &str) -> Result<ObjectTriple, ConflictError> {
    Ok((parse_object(base)?, parse_object(ours)?, parse_object(theirs)?))
}

/// Pretty-print a JSON object with a trailing newline.
pub fn render_object(map: &Map<String, Value>) -> String {
    let mut out = serde_json::to_string_pretty(map).unwrap_or_else(|_| "{}".to_string());
    out.push('\n');
    out
}

fn describe(value: Option<&Value>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "<removed>".to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
