//! Three-way document merge algorithms.
//!
//! Each algorithm is a pure function producing a [`MergeResult`]: the merged
//! content, whether any unit (a JSON key, a Markdown section, the whole
//! document) conflicted, and one human-readable detail per conflicting unit.
//! Conflicting units always carry a default (ours) so the merged content is
//! usable even when a conflict is reported.
//!
//! [`MergeKind`] picks the algorithm for a store path once, by extension.

pub mod json;
pub mod markdown;
pub mod ndjson;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use json::{merge_json, merge_json_text, merge_json_with};
pub use markdown::merge_markdown;
pub use ndjson::merge_ndjson;

/// The result of one merge algorithm invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeResult<T> {
    /// Merged content. Conflicting units hold their default resolution.
    pub content: T,
    /// Whether any unit conflicted.
    pub has_conflicts: bool,
    /// One description per conflicting unit.
    pub conflict_details: Vec<String>,
}

impl<T> MergeResult<T> {
    /// A conflict-free result.
    pub fn clean(content: T) -> Self {
        Self {
            content,
            has_conflicts: false,
            conflict_details: Vec::new(),
        }
    }

    /// A result whose conflict flag follows the detail list.
    pub fn with_details(content: T, conflict_details: Vec<String>) -> Self {
        Self {
            content,
            has_conflicts: !conflict_details.is_empty(),
            conflict_details,
        }
    }
}

/// One side of a three-way merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The locally held version.
    Ours,
    /// The remotely fetched version.
    Theirs,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ours => write!(f, "ours"),
            Self::Theirs => write!(f, "theirs"),
        }
    }
}

/// Which merge algorithm applies to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeKind {
    /// Flat JSON object, merged key by key.
    Json,
    /// Append-only newline-delimited JSON log, merged by union.
    Ndjson,
    /// Markdown, merged section by section.
    Markdown,
    /// Anything else, compared as a whole document.
    Text,
}

impl MergeKind {
    /// Select the algorithm for a path by its extension.
    pub fn for_path(path: impl AsRef<Path>) -> Self {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("json") => Self::Json,
            Some("ndjson") | Some("jsonl") => Self::Ndjson,
            Some("md") | Some("markdown") => Self::Markdown,
            _ => Self::Text,
        }
    }

    /// Run the selected algorithm over three text documents.
    ///
    /// `base` is the empty string for a file that did not exist at the merge
    /// base.
    pub fn merge(self, base: &str, ours: &str, theirs: &str) -> MergeResult<String> {
        debug!(kind = %self, "merging document");
        match self {
            Self::Json => merge_json_text(base, ours, theirs),
            Self::Ndjson if ours == base => MergeResult::clean(theirs.to_string()),
            Self::Ndjson if theirs == base => MergeResult::clean(ours.to_string()),
            Self::Ndjson => merge_ndjson(ours, theirs),
            Self::Markdown => merge_markdown(base, ours, theirs),
            Self::Text => merge_whole_document(base, ours, theirs),
        }
    }
}

impl fmt::Display for MergeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Ndjson => write!(f, "ndjson"),
            Self::Markdown => write!(f, "markdown"),
            Self::Text => write!(f, "text"),
        }
    }
}

/// Label used for conflicts that cover an entire document.
pub const WHOLE_FILE: &str = "whole-file";

/// Whole-document three-way comparison.
///
/// Equal sides, or a change on exactly one side, merge cleanly. Divergent
/// changes keep ours and report a single [`WHOLE_FILE`] conflict.
pub fn merge_whole_document(base: &str, ours: &str, theirs: &str) -> MergeResult<String> {
    if ours == theirs || theirs == base {
        return MergeResult::clean(ours.to_string());
    }
    if ours == base {
        return MergeResult::clean(theirs.to_string());
    }
    MergeResult::with_details(
        ours.to_string(),
        vec![format!("{}: both sides modified the document", WHOLE_FILE)],
    )
}
