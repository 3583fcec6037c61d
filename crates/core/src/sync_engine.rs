//! Sync orchestrator for a git-backed context store.
//!
//! The [`SyncEngine`] wraps one [`Store`] and exposes the verbs an external
//! transport needs:
//!
//! 1. [`detect_changes`](SyncEngine::detect_changes) and
//!    [`commit_and_push`](SyncEngine::commit_and_push) publish local edits.
//! 2. [`pull`](SyncEngine::pull) fetches, merges every changed store document
//!    with the algorithm for its file type, and either commits the merge or
//!    persists a [`ConflictReport`].
//! 3. [`resolve_one`](SyncEngine::resolve_one),
//!    [`finalize`](SyncEngine::finalize) and [`abort`](SyncEngine::abort)
//!    drive a pending report to completion across separate calls.
//!
//! No public operation returns `Err`: failures are folded into outcome
//! values tagged with a `status` field.

use std::collections::BTreeSet;
use std::path::Path;

use git2::Oid;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::commit_format;
use crate::conflict::{
    ConflictEntry, ConflictPrompter, ConflictReport, ConflictResolver, ConsolePrompter,
    ResolutionStrategy,
};
use crate::errors::{ConfigError, GitError, SyncError};
use crate::git::client::{GitClient, MergeAnalysis};
use crate::merge::{MergeKind, Side};
use crate::pending;
use crate::store::Store;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of [`SyncEngine::commit_and_push`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PushOutcome {
    /// No store changes and nothing unpushed.
    NothingToPush,
    /// Committed locally; the push was skipped or failed.
    Committed {
        commit_message: String,
        push_error: Option<String>,
    },
    /// Pushed to the remote. `commit_message` is `None` when only earlier
    /// commits were pushed.
    Pushed { commit_message: Option<String> },
    Error { error: String },
}

/// Result of [`SyncEngine::pull`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PullOutcome {
    UpToDate,
    /// The remote changes are in. `report` is present when conflicts were
    /// found and fully resolved by the strategy.
    Pulled {
        fast_forward: bool,
        /// Store-relative paths changed by the pull.
        changed: Vec<String>,
        report: Option<ConflictReport>,
    },
    /// A report is pending; nothing was committed.
    Conflicts { report: ConflictReport },
    Error { error: String },
}

/// Result of [`SyncEngine::resolve_one`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResolveOutcome {
    Resolved { remaining: usize },
    /// No unresolved entry has that path.
    NotFound,
    NoPending,
    Error { error: String },
}

/// Result of [`SyncEngine::save_pending_report`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SaveOutcome {
    Saved,
    /// A different report is already pending.
    AlreadyPending { conflict_id: String },
    Error { error: String },
}

/// Result of [`SyncEngine::finalize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FinalizeOutcome {
    Finalized {
        /// Entries written with their resolution.
        applied: Vec<String>,
        /// Unresolved entries that kept the local content.
        fell_back_to_ours: Vec<String>,
        commit: String,
    },
    NoPending,
    Error { error: String },
}

/// Result of [`SyncEngine::abort`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AbortOutcome {
    Aborted { conflict_id: String },
    NoPending,
    Error { error: String },
}

/// Snapshot returned by [`SyncEngine::status`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatus {
    pub branch: Option<String>,
    /// Store-relative paths with uncommitted changes.
    pub local_changes: Vec<String>,
    pub pending_conflict_id: Option<String>,
    pub unresolved: usize,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Orchestrates commit, pull, merge and resolution for one store.
pub struct SyncEngine {
    store: Store,
}

impl SyncEngine {
    pub fn new(store: Store) -> Self {
        info!(root = %store.root().display(), prefix = %store.prefix(), "initializing sync engine");
        Self { store }
    }

    /// Open the store at `root` with its `ctxsync.toml`.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, ConfigError> {
        Ok(Self::new(Store::open(root)?))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    fn git(&self) -> Result<GitClient, GitError> {
        GitClient::new(self.store.root())
    }

    fn branch(&self, git: &GitClient) -> Result<String, GitError> {
        match self.store.config().git.branch {
            Some(ref branch) => Ok(branch.clone()),
            None => git.current_branch(),
        }
    }

    /// Repo-relative paths with uncommitted changes inside the store.
    fn store_changes(&self, git: &GitClient) -> Result<Vec<String>, GitError> {
        Ok(git
            .changed_paths_under(&self.store.prefix())?
            .into_iter()
            .filter(|p| self.store.contains(p))
            .collect())
    }

    // -----------------------------------------------------------------------
    // Local changes
    // -----------------------------------------------------------------------

    /// Whether the store has uncommitted changes. Git failures log a warning
    /// and report `false`.
    pub fn detect_changes(&self) -> bool {
        match self.git().and_then(|git| self.store_changes(&git)) {
            Ok(changes) => {
                debug!(count = changes.len(), "detected store changes");
                !changes.is_empty()
            }
            Err(e) => {
                warn!(error = %e, "cannot detect store changes");
                false
            }
        }
    }

    /// Summarize local state and any pending merge.
    pub fn status(&self) -> StoreStatus {
        let mut status = StoreStatus::default();
        if let Some(report) = pending::load(&self.store) {
            status.unresolved = report.unresolved_count();
            status.pending_conflict_id = Some(report.conflict_id);
        }
        let git = match self.git() {
            Ok(git) => git,
            Err(e) => {
                status.error = Some(e.to_string());
                return status;
            }
        };
        status.branch = self.branch(&git).ok();
        match self.store_changes(&git) {
            Ok(changes) => {
                status.local_changes = changes
                    .iter()
                    .map(|p| self.store.store_path(p).to_string())
                    .collect();
            }
            Err(e) => status.error = Some(e.to_string()),
        }
        status
    }

    /// Stage and commit store changes, then push when a remote exists.
    pub fn commit_and_push(&self, message: Option<&str>) -> PushOutcome {
        match self.do_commit_and_push(message) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "commit and push failed");
                PushOutcome::Error {
                    error: e.to_string(),
                }
            }
        }
    }

    fn do_commit_and_push(&self, message: Option<&str>) -> Result<PushOutcome, SyncError> {
        if let Some(report) = pending::load(&self.store) {
            return Err(SyncError::MergeInProgress {
                conflict_id: report.conflict_id,
            });
        }
        let git = self.git()?;
        let branch = self.branch(&git)?;
        let remote = &self.store.config().git.remote;
        let token = self.store.config().git.token.as_deref();
        let changes = self.store_changes(&git)?;

        if changes.is_empty() {
            if git.has_remote(remote) && git.commits_ahead(remote, &branch)? > 0 {
                info!(remote = %remote, branch = %branch, "pushing unpushed commits");
                return Ok(match git.push(remote, &branch, token) {
                    Ok(()) => PushOutcome::Pushed {
                        commit_message: None,
                    },
                    Err(e) => PushOutcome::Error {
                        error: e.to_string(),
                    },
                });
            }
            debug!("nothing to commit or push");
            return Ok(PushOutcome::NothingToPush);
        }

        let commit_message = self.commit_local(&git, &changes, message)?;

        if !git.has_remote(remote) {
            let err = GitError::RemoteNotFound(remote.clone());
            warn!(error = %err, "committed locally without pushing");
            return Ok(PushOutcome::Committed {
                commit_message,
                push_error: Some(err.to_string()),
            });
        }
        match git.push(remote, &branch, token) {
            Ok(()) => Ok(PushOutcome::Pushed {
                commit_message: Some(commit_message),
            }),
            Err(e) => {
                warn!(error = %e, "push failed; commit kept locally");
                Ok(PushOutcome::Committed {
                    commit_message,
                    push_error: Some(e.to_string()),
                })
            }
        }
    }

    fn commit_local(
        &self,
        git: &GitClient,
        changes: &[String],
        message: Option<&str>,
    ) -> Result<String, SyncError> {
        let config = self.store.config();
        let commit_message = match message {
            Some(m) => m.to_string(),
            None => {
                let store_paths: Vec<String> = changes
                    .iter()
                    .map(|p| self.store.store_path(p).to_string())
                    .collect();
                commit_format::auto_message(
                    &config.sync.commit_prefix,
                    &store_paths,
                    &config.store,
                )
            }
        };
        self.store.ensure_gitignore()?;
        git.stage_under(&self.store.prefix())?;
        let oid = git.commit(
            &commit_message,
            &config.git.author_name,
            &config.git.author_email,
        )?;
        info!(sha = %oid, files = changes.len(), "committed store changes");
        Ok(commit_message)
    }

    // -----------------------------------------------------------------------
    // Pull
    // -----------------------------------------------------------------------

    /// Pull using the configured default strategy.
    pub fn pull_default(&self) -> PullOutcome {
        self.pull(self.store.config().sync.default_strategy)
    }

    /// Fetch and merge the remote branch.
    ///
    /// The `interactive` strategy prompts on the terminal; use
    /// [`pull_with`](Self::pull_with) to supply another prompter.
    pub fn pull(&self, strategy: ResolutionStrategy) -> PullOutcome {
        if strategy == ResolutionStrategy::Interactive {
            let mut prompter = ConsolePrompter::new();
            return self.pull_with(strategy, &mut prompter);
        }
        self.run_pull(strategy, None)
    }

    /// Like [`pull`](Self::pull) with an explicit prompter for the
    /// `interactive` strategy.
    pub fn pull_with(
        &self,
        strategy: ResolutionStrategy,
        prompter: &mut dyn ConflictPrompter,
    ) -> PullOutcome {
        self.run_pull(strategy, Some(prompter))
    }

    fn run_pull(
        &self,
        strategy: ResolutionStrategy,
        prompter: Option<&mut dyn ConflictPrompter>,
    ) -> PullOutcome {
        match self.do_pull(strategy, prompter) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "pull failed");
                PullOutcome::Error {
                    error: e.to_string(),
                }
            }
        }
    }

    fn do_pull(
        &self,
        strategy: ResolutionStrategy,
        prompter: Option<&mut dyn ConflictPrompter>,
    ) -> Result<PullOutcome, SyncError> {
        if let Some(report) = pending::load(&self.store) {
            info!(conflict_id = %report.conflict_id, "merge already pending");
            return Ok(PullOutcome::Conflicts { report });
        }

        let git = self.git()?;
        let branch = self.branch(&git)?;
        let config = self.store.config();
        let remote = &config.git.remote;
        if !git.has_remote(remote) {
            return Err(GitError::RemoteNotFound(remote.clone()).into());
        }

        let changes = self.store_changes(&git)?;
        if !changes.is_empty() {
            if !config.sync.commit_before_pull {
                return Err(SyncError::UncommittedChanges);
            }
            self.commit_local(&git, &changes, None)?;
        }

        git.fetch(remote, config.git.token.as_deref())?;
        let Some(theirs) = git.remote_tip(remote, &branch)? else {
            info!(remote = %remote, branch = %branch, "remote branch does not exist yet");
            return Ok(PullOutcome::UpToDate);
        };

        match git.analyze_merge(theirs)? {
            MergeAnalysis::UpToDate => {
                info!("already up to date");
                Ok(PullOutcome::UpToDate)
            }
            MergeAnalysis::FastForward => {
                let before = git.head_oid()?;
                let changed = self.store_paths(git.diff_paths(before, theirs)?);
                git.fast_forward(&branch, theirs)?;
                info!(changed = changed.len(), "pulled by fast-forward");
                Ok(PullOutcome::Pulled {
                    fast_forward: true,
                    changed,
                    report: None,
                })
            }
            MergeAnalysis::Diverged => self.merge_diverged(&git, &branch, theirs, strategy, prompter),
        }
    }

    fn store_paths(&self, repo_paths: Vec<String>) -> Vec<String> {
        repo_paths
            .iter()
            .filter(|p| self.store.contains(p))
            .map(|p| self.store.store_path(p).to_string())
            .collect()
    }

    fn merge_diverged(
        &self,
        git: &GitClient,
        branch: &str,
        theirs: Oid,
        strategy: ResolutionStrategy,
        prompter: Option<&mut dyn ConflictPrompter>,
    ) -> Result<PullOutcome, SyncError> {
        let ours = git
            .head_oid()?
            .ok_or_else(|| GitError::RefNotFound("HEAD".into()))?;
        let base = git.merge_base(ours, theirs)?;
        info!(ours = %ours, theirs = %theirs, base = ?base, "merging diverged histories");

        let mut paths: BTreeSet<String> = git.diff_paths(base, ours)?.into_iter().collect();
        paths.extend(git.diff_paths(base, theirs)?);

        let mut report = ConflictReport::new();
        report.ours_commit = Some(ours.to_string());
        report.theirs_commit = Some(theirs.to_string());

        // Theirs-only changes are checked out as committed blobs; merged
        // text is written after that checkout succeeds.
        let mut take_theirs = Vec::new();
        let mut merged = Vec::new();
        for path in &paths {
            let base_c = match base {
                Some(b) => git.read_file_at(b, path)?,
                None => None,
            };
            let ours_c = git.read_file_at(ours, path)?;
            let theirs_c = git.read_file_at(theirs, path)?;

            if ours_c == theirs_c || theirs_c == base_c {
                continue;
            }
            let in_store = self.store.contains(path);
            if ours_c == base_c {
                take_theirs.push(path.clone());
                if in_store {
                    report.auto_resolved.push(self.store.store_path(path).to_string());
                } else {
                    report.outside_store.push(path.clone());
                }
                continue;
            }
            if !in_store {
                warn!(path = %path, "both sides changed a file outside the store; keeping ours");
                continue;
            }

            let store_path = self.store.store_path(path).to_string();
            let [base_t, ours_t, theirs_t] =
                [&base_c, &ours_c, &theirs_c].map(|c| c.as_deref().map(std::str::from_utf8).transpose());
            let (Ok(base_t), Ok(ours_t), Ok(theirs_t)) = (base_t, ours_t, theirs_t) else {
                let detail = format!("file '{}': binary content changed on both sides", store_path);
                report.push(ConflictEntry::binary(store_path, detail));
                continue;
            };
            let base_s = base_t.unwrap_or_default();
            match (ours_t, theirs_t) {
                (Some(o), Some(t)) => {
                    let result = MergeKind::for_path(path).merge(base_s, o, t);
                    if result.has_conflicts {
                        report.push(
                            ConflictEntry::new(store_path, base_s, o, t)
                                .with_merge(result.conflict_details, result.content),
                        );
                    } else {
                        merged.push((path.clone(), result.content));
                        report.auto_resolved.push(store_path);
                    }
                }
                (Some(o), None) => {
                    let detail = format!("file '{}': modified by ours, deleted by theirs", store_path);
                    report.push(ConflictEntry::new(store_path, base_s, o, "").with_merge(vec![detail], o));
                }
                (None, Some(t)) => {
                    let detail = format!("file '{}': deleted by ours, modified by theirs", store_path);
                    report.push(ConflictEntry::new(store_path, base_s, "", t).with_merge(vec![detail], t));
                }
                (None, None) => {}
            }
        }

        git.checkout_paths_from(theirs, &take_theirs)?;
        for (path, content) in &merged {
            self.store.write_file(path, content)?;
        }

        info!(
            conflict_id = %report.conflict_id,
            conflicts = report.conflicts.len(),
            auto_resolved = report.auto_resolved.len(),
            "merge computed"
        );

        if report.conflicts.is_empty() {
            self.commit_report(git, branch, &report)?;
            return Ok(PullOutcome::Pulled {
                fast_forward: false,
                changed: report.auto_resolved,
                report: None,
            });
        }

        let complete = match ConflictResolver::apply(strategy, &mut report, prompter) {
            Ok(outcome) => outcome.is_complete(),
            Err(e) => {
                warn!(error = %e, "strategy failed; leaving conflicts pending");
                false
            }
        };
        if complete {
            self.commit_report(git, branch, &report)?;
            let changed = report.auto_resolved.clone();
            return Ok(PullOutcome::Pulled {
                fast_forward: false,
                changed,
                report: Some(report),
            });
        }

        pending::save(&self.store, &report)?;
        Ok(PullOutcome::Conflicts { report })
    }

    /// Write every entry's final content, stage, and create the merge commit.
    /// Returns the commit SHA and the applied / fallen-back entry paths.
    fn commit_report(
        &self,
        git: &GitClient,
        branch: &str,
        report: &ConflictReport,
    ) -> Result<(String, Vec<String>, Vec<String>), SyncError> {
        let theirs = report
            .theirs_commit
            .as_deref()
            .and_then(|sha| Oid::from_str(sha).ok())
            .filter(|oid| git.repo().find_commit(*oid).is_ok());

        let mut applied = Vec::new();
        let mut fell_back = Vec::new();
        let mut take_theirs = Vec::new();
        for entry in &report.conflicts {
            let repo_path = self.store.repo_path(&entry.file_path);
            match entry.resolved_side {
                Some(Side::Theirs) => match theirs {
                    Some(_) => take_theirs.push(repo_path),
                    None => warn!(path = %entry.file_path, "remote commit unavailable; keeping local content"),
                },
                // The working tree already holds ours.
                Some(Side::Ours) => {}
                None if entry.binary && !entry.resolved => {}
                None => self.store.write_file(&repo_path, entry.final_content())?,
            }
            if entry.resolved {
                applied.push(entry.file_path.clone());
            } else {
                fell_back.push(entry.file_path.clone());
            }
        }
        if let Some(theirs) = theirs {
            git.checkout_paths_from(theirs, &take_theirs)?;
        }

        self.store.ensure_gitignore()?;
        git.stage_under(&self.store.prefix())?;

        let config = self.store.config();
        let message = commit_format::merge_message(
            &config.sync.commit_prefix,
            branch,
            report.theirs_commit.as_deref().unwrap_or("unknown"),
            Some(report),
        );
        let oid = match theirs {
            Some(theirs) => git.commit_merge(
                &message,
                &config.git.author_name,
                &config.git.author_email,
                theirs,
            )?,
            None => {
                warn!(conflict_id = %report.conflict_id, "remote commit unavailable; committing without a second parent");
                git.commit(&message, &config.git.author_name, &config.git.author_email)?
            }
        };
        info!(
            sha = %oid,
            applied = applied.len(),
            fell_back = fell_back.len(),
            "merge committed"
        );
        Ok((oid.to_string(), applied, fell_back))
    }

    // -----------------------------------------------------------------------
    // Pending report
    // -----------------------------------------------------------------------

    /// The pending report, if any. A corrupt sidecar counts as none.
    pub fn load_pending_report(&self) -> Option<ConflictReport> {
        pending::load(&self.store)
    }

    /// Persist `report` as the pending report.
    pub fn save_pending_report(&self, report: &ConflictReport) -> SaveOutcome {
        if let Some(existing) = pending::load(&self.store) {
            if existing.conflict_id != report.conflict_id {
                warn!(
                    pending = %existing.conflict_id,
                    offered = %report.conflict_id,
                    "refusing to replace a different pending report"
                );
                return SaveOutcome::AlreadyPending {
                    conflict_id: existing.conflict_id,
                };
            }
        }
        match pending::save(&self.store, report) {
            Ok(()) => SaveOutcome::Saved,
            Err(e) => SaveOutcome::Error {
                error: e.to_string(),
            },
        }
    }

    /// Resolve one pending entry. `file_path` may be store- or
    /// repo-relative.
    pub fn resolve_one(&self, file_path: &str, content: &str) -> ResolveOutcome {
        let Some(mut report) = pending::load(&self.store) else {
            return ResolveOutcome::NoPending;
        };
        let key = if self.store.contains(file_path) {
            self.store.store_path(file_path)
        } else {
            file_path
        };
        if !report.resolve_single(key, content) && !report.resolve_single(file_path, content) {
            debug!(path = file_path, "no unresolved entry for path");
            return ResolveOutcome::NotFound;
        }
        match pending::save(&self.store, &report) {
            Ok(()) => ResolveOutcome::Resolved {
                remaining: report.unresolved_count(),
            },
            Err(e) => ResolveOutcome::Error {
                error: e.to_string(),
            },
        }
    }

    /// Apply the pending report and commit the merge. Unresolved entries
    /// keep the local content.
    pub fn finalize(&self) -> FinalizeOutcome {
        let Some(report) = pending::load(&self.store) else {
            return FinalizeOutcome::NoPending;
        };
        match self.do_finalize(&report) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(conflict_id = %report.conflict_id, error = %e, "finalize failed");
                FinalizeOutcome::Error {
                    error: e.to_string(),
                }
            }
        }
    }

    fn do_finalize(&self, report: &ConflictReport) -> Result<FinalizeOutcome, SyncError> {
        let git = self.git()?;
        let branch = self.branch(&git)?;
        let (commit, applied, fell_back_to_ours) = self.commit_report(&git, &branch, report)?;
        pending::delete(&self.store)?;
        info!(conflict_id = %report.conflict_id, "merge finalized");
        Ok(FinalizeOutcome::Finalized {
            applied,
            fell_back_to_ours,
            commit,
        })
    }

    /// Discard the pending merge, restoring auto-merged paths from HEAD.
    pub fn abort(&self) -> AbortOutcome {
        let Some(report) = pending::load(&self.store) else {
            return AbortOutcome::NoPending;
        };
        match self.do_abort(&report) {
            Ok(()) => AbortOutcome::Aborted {
                conflict_id: report.conflict_id,
            },
            Err(e) => {
                warn!(conflict_id = %report.conflict_id, error = %e, "abort failed");
                AbortOutcome::Error {
                    error: e.to_string(),
                }
            }
        }
    }

    fn do_abort(&self, report: &ConflictReport) -> Result<(), SyncError> {
        let git = self.git()?;
        let mut paths: Vec<String> = report
            .auto_resolved
            .iter()
            .map(|p| self.store.repo_path(p))
            .collect();
        paths.extend(report.outside_store.iter().cloned());
        git.restore_paths(&paths)?;
        pending::delete(&self.store)?;
        info!(conflict_id = %report.conflict_id, restored = paths.len(), "merge aborted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    fn engine_without_remote() -> (tempfile::TempDir, SyncEngine) {
        let dir = tempfile::tempdir().unwrap();
        GitClient::init(dir.path()).unwrap();
        let mut config = StoreConfig::default();
        config.git.branch = Some("main".into());
        let engine = SyncEngine::new(Store::new(dir.path(), config));
        (dir, engine)
    }

    #[test]
    fn test_outcomes_serialize_with_status_tag() {
        let json = serde_json::to_value(PushOutcome::NothingToPush).unwrap();
        assert_eq!(json["status"], "nothing_to_push");

        let json = serde_json::to_value(ResolveOutcome::Resolved { remaining: 2 }).unwrap();
        assert_eq!(json["status"], "resolved");
        assert_eq!(json["remaining"], 2);

        let json = serde_json::to_value(SaveOutcome::AlreadyPending {
            conflict_id: "x".into(),
        })
        .unwrap();
        assert_eq!(json["status"], "already_pending");
    }

    #[test]
    fn test_detect_changes_is_scoped() {
        let (dir, engine) = engine_without_remote();
        assert!(!engine.detect_changes());
        std::fs::write(dir.path().join("README.md"), "outside").unwrap();
        assert!(!engine.detect_changes());
        engine
            .store()
            .write_file(".context/knowledge/a.md", "## A\n")
            .unwrap();
        assert!(engine.detect_changes());
    }

    #[test]
    fn test_commit_without_remote_reports_push_error() {
        let (_dir, engine) = engine_without_remote();
        engine
            .store()
            .write_file(".context/knowledge/auth.md", "## Auth\n")
            .unwrap();
        match engine.commit_and_push(None) {
            PushOutcome::Committed {
                commit_message,
                push_error,
            } => {
                assert!(commit_message.starts_with("[ctxsync] update context: 1 knowledge"));
                assert!(push_error.unwrap().contains("origin"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(!engine.detect_changes());
        assert_eq!(engine.commit_and_push(None), PushOutcome::NothingToPush);
    }

    #[test]
    fn test_missing_repository_is_an_error_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SyncEngine::new(Store::new(dir.path(), StoreConfig::default()));
        assert!(!engine.detect_changes());
        assert!(matches!(engine.commit_and_push(None), PushOutcome::Error { .. }));
        assert!(matches!(
            engine.pull(ResolutionStrategy::Agent),
            PullOutcome::Error { .. }
        ));
        assert!(engine.status().error.is_some());
    }

    #[test]
    fn test_pull_without_remote_is_an_error_outcome() {
        let (_dir, engine) = engine_without_remote();
        match engine.pull(ResolutionStrategy::Ours) {
            PullOutcome::Error { error } => assert!(error.contains("origin")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_no_pending_variants() {
        let (_dir, engine) = engine_without_remote();
        assert_eq!(engine.resolve_one("a.md", "x"), ResolveOutcome::NoPending);
        assert_eq!(engine.finalize(), FinalizeOutcome::NoPending);
        assert_eq!(engine.abort(), AbortOutcome::NoPending);
        assert!(engine.load_pending_report().is_none());
    }

    #[test]
    fn test_save_pending_refuses_a_different_report() {
        let (_dir, engine) = engine_without_remote();
        let mut first = ConflictReport::new();
        first.push(ConflictEntry::new("a.md", "", "o", "t"));
        assert_eq!(engine.save_pending_report(&first), SaveOutcome::Saved);

        let second = ConflictReport::new();
        assert_eq!(
            engine.save_pending_report(&second),
            SaveOutcome::AlreadyPending {
                conflict_id: first.conflict_id.clone()
            }
        );

        first.resolve_single("a.md", "r");
        assert_eq!(engine.save_pending_report(&first), SaveOutcome::Saved);
        assert_eq!(engine.load_pending_report().unwrap(), first);
    }

    #[test]
    fn test_resolve_one_accepts_repo_relative_path() {
        let (_dir, engine) = engine_without_remote();
        let mut report = ConflictReport::new();
        report.push(ConflictEntry::new("knowledge/a.md", "", "o", "t"));
        report.push(ConflictEntry::new("knowledge/b.md", "", "o", "t"));
        engine.save_pending_report(&report);

        assert_eq!(
            engine.resolve_one(".context/knowledge/a.md", "r"),
            ResolveOutcome::Resolved { remaining: 1 }
        );
        assert_eq!(
            engine.resolve_one("knowledge/a.md", "again"),
            ResolveOutcome::NotFound
        );
        assert_eq!(engine.status().unresolved, 1);
    }

    #[test]
    fn test_commit_refused_while_pending() {
        let (_dir, engine) = engine_without_remote();
        let report = ConflictReport::new();
        engine.save_pending_report(&report);
        match engine.commit_and_push(Some("msg")) {
            PushOutcome::Error { error } => assert!(error.contains(&report.conflict_id)),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
