//! The conflict model for one merge attempt.
//!
//! A [`ConflictReport`] is created by a pull that finds divergent content,
//! persisted as the pending-conflict sidecar while any entry is unresolved,
//! and consumed when the merge is finalized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::merge::{MergeKind, Side};

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// One file whose content diverged on both sides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictEntry {
    /// Store-relative path, unique within a report.
    pub file_path: String,
    /// Locally held content (empty if ours deleted the file).
    pub ours_content: String,
    /// Remotely fetched content (empty if theirs deleted the file).
    pub theirs_content: String,
    /// Merge-base content (empty if the file is new).
    pub base_content: String,
    /// Whether a final content has been chosen.
    #[serde(default)]
    pub resolved: bool,
    /// Final content; empty until resolved.
    #[serde(default)]
    pub resolution: String,
    /// Algorithm that produced the conflict.
    #[serde(default = "default_kind")]
    pub kind: MergeKind,
    /// One description per conflicting key or section.
    #[serde(default)]
    pub details: Vec<String>,
    /// The algorithm's default merge (ours wins every conflicting unit).
    #[serde(default)]
    pub suggested: String,
    /// Content is not UTF-8. The text fields stay empty and the entry
    /// resolves to one side's blob.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub binary: bool,
    /// Side whose blob a binary entry was resolved to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_side: Option<Side>,
}

fn default_kind() -> MergeKind {
    MergeKind::Text
}

impl ConflictEntry {
    /// Create an unresolved entry.
    pub fn new(
        file_path: impl Into<String>,
        base_content: impl Into<String>,
        ours_content: impl Into<String>,
        theirs_content: impl Into<String>,
    ) -> Self {
        let file_path = file_path.into();
        let kind = MergeKind::for_path(&file_path);
        Self {
            file_path,
            ours_content: ours_content.into(),
            theirs_content: theirs_content.into(),
            base_content: base_content.into(),
            resolved: false,
            resolution: String::new(),
            kind,
            details: Vec::new(),
            suggested: String::new(),
            binary: false,
            resolved_side: None,
        }
    }

    /// Create an unresolved entry for content that is not text.
    pub fn binary(file_path: impl Into<String>, detail: impl Into<String>) -> Self {
        let mut entry = Self::new(file_path, "", "", "");
        entry.binary = true;
        entry.details = vec![detail.into()];
        entry
    }

    /// Attach the merge algorithm's details and default content.
    pub fn with_merge(mut self, details: Vec<String>, suggested: impl Into<String>) -> Self {
        self.details = details;
        self.suggested = suggested.into();
        self
    }

    /// Content of one side.
    pub fn side_content(&self, side: Side) -> &str {
        match side {
            Side::Ours => &self.ours_content,
            Side::Theirs => &self.theirs_content,
        }
    }

    /// Mark the entry resolved with the given content.
    pub fn resolve(&mut self, content: impl Into<String>) {
        self.resolution = content.into();
        self.resolved_side = None;
        self.resolved = true;
    }

    /// Mark the entry resolved to one side's committed content as is.
    pub fn resolve_side(&mut self, side: Side) {
        self.resolution.clear();
        self.resolved_side = Some(side);
        self.resolved = true;
    }

    /// Content that finalizing would write: the resolution, or ours.
    pub fn final_content(&self) -> &str {
        if self.resolved {
            &self.resolution
        } else {
            &self.ours_content
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// All divergent files from one pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictReport {
    /// Opaque identifier generated once per conflicting pull.
    pub conflict_id: String,
    /// Conflicting files in discovery order.
    #[serde(default)]
    pub conflicts: Vec<ConflictEntry>,
    /// Paths merged without conflict during the same pull.
    #[serde(default)]
    pub auto_resolved: Vec<String>,
    /// When the report was created.
    #[serde(default = "default_created_at")]
    pub created_at: DateTime<Utc>,
    /// Local commit the merge started from.
    #[serde(default)]
    pub ours_commit: Option<String>,
    /// Remote commit being merged in.
    #[serde(default)]
    pub theirs_commit: Option<String>,
    /// Repo-relative paths outside the store taken from theirs during the
    /// same pull.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outside_store: Vec<String>,
}

fn default_created_at() -> DateTime<Utc> {
    Utc::now()
}

impl Default for ConflictReport {
    fn default() -> Self {
        Self::new()
    }
}

impl ConflictReport {
    /// Create an empty report with a fresh UUID.
    pub fn new() -> Self {
        Self {
            conflict_id: Uuid::new_v4().to_string(),
            conflicts: Vec::new(),
            auto_resolved: Vec::new(),
            created_at: Utc::now(),
            ours_commit: None,
            theirs_commit: None,
            outside_store: Vec::new(),
        }
    }

    /// Whether any entry is still unresolved.
    pub fn has_conflicts(&self) -> bool {
        self.conflicts.iter().any(|e| !e.resolved)
    }

    /// Number of unresolved entries.
    pub fn unresolved_count(&self) -> usize {
        self.conflicts.iter().filter(|e| !e.resolved).count()
    }

    /// Look up an entry by path.
    pub fn entry(&self, file_path: &str) -> Option<&ConflictEntry> {
        self.conflicts.iter().find(|e| e.file_path == file_path)
    }

    /// Unresolved entries in order.
    pub fn unresolved(&self) -> impl Iterator<Item = &ConflictEntry> {
        self.conflicts.iter().filter(|e| !e.resolved)
    }

    /// Add a conflicting entry.
    pub fn push(&mut self, entry: ConflictEntry) {
        debug!(conflict_id = %self.conflict_id, path = %entry.file_path, "recording conflict");
        self.conflicts.push(entry);
    }

    /// Resolve the unresolved entry for `file_path` with `content`.
    ///
    /// Returns `false` when no unresolved entry matches; an already resolved
    /// entry is not overwritten.
    pub fn resolve_single(&mut self, file_path: &str, content: impl Into<String>) -> bool {
        match self
            .conflicts
            .iter_mut()
            .find(|e| e.file_path == file_path && !e.resolved)
        {
            Some(entry) => {
                entry.resolve(content);
                info!(conflict_id = %self.conflict_id, path = file_path, "conflict entry resolved");
                true
            }
            None => false,
        }
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        format!(
            "merge {}: {} conflicting file(s), {} unresolved, {} auto-merged",
            self.conflict_id,
            self.conflicts.len(),
            self.unresolved_count(),
            self.auto_resolved.len()
        )
    }
}
