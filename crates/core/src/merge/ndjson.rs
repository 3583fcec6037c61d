//! Union merge of append-only NDJSON event logs.
//!
//! Log entries are facts, not state: both sides' entries are kept, once
//! each, and the merge never reports a conflict.

use std::collections::HashSet;

use serde_json::Value;

use super::MergeResult;

/// Merge two NDJSON logs by union.
///
/// Entries are identified by their `id` field when the line is a JSON object
/// carrying one, otherwise by the raw line. Order is first-seen across ours
/// followed by theirs. Blank lines are dropped.
pub fn merge_ndjson(ours: &str, theirs: &str) -> MergeResult<String> {
    if ours == theirs {
        return MergeResult::clean(ours.to_string());
    }

    let mut seen = HashSet::new();
    let mut lines = Vec::new();

    for line in ours.lines().chain(theirs.lines()) {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        if seen.insert(identity(line)) {
            lines.push(line);
        }
    }

    let mut content = lines.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    MergeResult::clean(content)
}

/// Identity key of one log line.
fn identity(line: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(line) {
        match map.get("id") {
            Some(Value::String(s)) => return format!("id:{}", s),
            Some(Value::Null) | None => {}
            Some(other) => return format!("id:{}", other),
        }
    }
    format!("line:{}", line.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(content: &str) -> Vec<i64> {
        content
            .lines()
            .map(|l| {
                let v: Value = serde_json::from_str(l).unwrap();
                v["id"].as_i64().unwrap()
            })
            .collect()
    }

    #[test]
    fn test_union_by_id() {
        let ours = "{\"id\":1,\"e\":\"a\"}\n{\"id\":2,\"e\":\"b\"}\n";
        let theirs = "{\"id\":2,\"e\":\"b\"}\n{\"id\":3,\"e\":\"c\"}\n";
        let result = merge_ndjson(ours, theirs);
        assert!(!result.has_conflicts);
        assert!(result.conflict_details.is_empty());
        assert_eq!(ids(&result.content), vec![1, 2, 3]);
    }

    #[test]
    fn test_same_id_different_payload_keeps_first_seen() {
        let ours = "{\"id\":7,\"v\":\"ours\"}\n";
        let theirs = "{\"id\":7,\"v\":\"theirs\"}\n";
        let result = merge_ndjson(ours, theirs);
        assert!(!result.has_conflicts);
        assert_eq!(result.content, "{\"id\":7,\"v\":\"ours\"}\n");
    }

    #[test]
    fn test_string_and_numeric_ids_are_distinct() {
        let result = merge_ndjson("{\"id\":\"1\"}\n", "{\"id\":1}\n");
        assert_eq!(result.content.lines().count(), 2);
    }

    #[test]
    fn test_lines_without_id_dedupe_by_text() {
        let ours = "plain entry\n{\"msg\":\"x\"}\n";
        let theirs = "{\"msg\":\"x\"}\nplain entry\nnew entry\n";
        let result = merge_ndjson(ours, theirs);
        assert_eq!(result.content, "plain entry\n{\"msg\":\"x\"}\nnew entry\n");
    }

    #[test]
    fn test_blank_lines_and_crlf() {
        let ours = "{\"id\":1}\r\n\r\n";
        let theirs = "\n{\"id\":2}\n";
        let result = merge_ndjson(ours, theirs);
        assert_eq!(result.content, "{\"id\":1}\n{\"id\":2}\n");
    }

    #[test]
    fn test_empty_logs() {
        assert_eq!(merge_ndjson("", "").content, "");
        assert_eq!(merge_ndjson("", "{\"id\":1}\n").content, "{\"id\":1}\n");
    }
}
