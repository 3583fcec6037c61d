//! Local Git repository operations via `git2`.

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use git2::build::CheckoutBuilder;
use git2::{
    Cred, ErrorCode, FetchOptions, IndexAddOption, Oid, PushOptions, RemoteCallbacks, Repository,
    Signature, Status, StatusOptions,
};
use tracing::{debug, info, instrument, warn};

use crate::errors::GitError;

/// High-level Git client wrapping a `git2::Repository`.
pub struct GitClient {
    repo: Repository,
    repo_path: PathBuf,
}

/// How the local branch relates to a fetched remote commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAnalysis {
    /// The remote commit is already contained in HEAD.
    UpToDate,
    /// HEAD is an ancestor of the remote commit (or unborn).
    FastForward,
    /// Histories diverged; a three-way merge is required.
    Diverged,
}

impl GitClient {
    /// Open an existing Git repository at `repo_path`.
    pub fn new<P: AsRef<Path>>(repo_path: P) -> Result<Self, GitError> {
        let path = repo_path.as_ref();
        debug!(path = %path.display(), "opening git repository");
        let repo = Repository::open(path)
            .map_err(|_| GitError::RepositoryNotFound(path.display().to_string()))?;
        Ok(Self {
            repo,
            repo_path: path.to_path_buf(),
        })
    }

    /// Initialize a new repository at `repo_path`.
    pub fn init<P: AsRef<Path>>(repo_path: P) -> Result<Self, GitError> {
        let path = repo_path.as_ref();
        info!(path = %path.display(), "initializing git repository");
        let repo = Repository::init(path)?;
        Ok(Self {
            repo,
            repo_path: path.to_path_buf(),
        })
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    /// Whether a remote with this name is configured.
    pub fn has_remote(&self, remote_name: &str) -> bool {
        self.repo.find_remote(remote_name).is_ok()
    }

    /// Short name of the branch HEAD points at, including an unborn branch.
    pub fn current_branch(&self) -> Result<String, GitError> {
        match self.repo.head() {
            Ok(head) if head.is_branch() => head
                .shorthand()
                .map(str::to_string)
                .ok_or(GitError::DetachedHead),
            Ok(_) => Err(GitError::DetachedHead),
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                let head = self.repo.find_reference("HEAD")?;
                head.symbolic_target()
                    .and_then(|t| t.strip_prefix("refs/heads/"))
                    .map(str::to_string)
                    .ok_or(GitError::DetachedHead)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// OID of the commit HEAD points at, or `None` on an unborn branch.
    pub fn head_oid(&self) -> Result<Option<Oid>, GitError> {
        match self.repo.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?.id())),
            Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    // -----------------------------------------------------------------------
    // Working tree
    // -----------------------------------------------------------------------

    /// Paths (relative to the repo root) that are untracked, modified or
    /// staged under `prefix`. Ignored files are excluded. An empty prefix
    /// covers the whole repository.
    pub fn changed_paths_under(&self, prefix: &str) -> Result<Vec<String>, GitError> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);
        if !prefix.is_empty() {
            opts.pathspec(prefix);
        }

        let statuses = self.repo.statuses(Some(&mut opts))?;
        let mut paths = Vec::new();
        for entry in statuses.iter() {
            let status = entry.status();
            if status == Status::CURRENT || status.contains(Status::IGNORED) {
                continue;
            }
            if let Some(path) = entry.path() {
                if is_under(path, prefix) {
                    paths.push(path.to_string());
                }
            }
        }
        debug!(prefix, count = paths.len(), "collected working tree changes");
        Ok(paths)
    }

    /// Stage additions, modifications and deletions under `prefix`.
    pub fn stage_under(&self, prefix: &str) -> Result<(), GitError> {
        let spec = if prefix.is_empty() { "*" } else { prefix };
        let mut index = self.repo.index()?;
        index.add_all([spec].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all([spec].iter(), None)?;
        index.write()?;
        Ok(())
    }

    /// Restore paths to their HEAD content, removing paths HEAD lacks.
    ///
    /// Only the index entries of `paths` are reset; other staged changes
    /// are kept.
    #[instrument(skip(self, paths))]
    pub fn restore_paths(&self, paths: &[String]) -> Result<(), GitError> {
        if paths.is_empty() {
            return Ok(());
        }
        let head = self.repo.head()?.peel_to_commit()?;
        let tree = head.tree()?;
        self.repo.reset_default(Some(head.as_object()), paths.iter())?;

        let mut checkout = CheckoutBuilder::new();
        checkout.force().disable_pathspec_match(true);
        let mut any_tracked = false;
        for path in paths {
            if tree.get_path(Path::new(path)).is_ok() {
                checkout.path(path);
                any_tracked = true;
            } else {
                let full = self.repo_path.join(path);
                if full.exists() {
                    std::fs::remove_file(&full)?;
                }
            }
        }
        if any_tracked {
            self.repo.checkout_head(Some(&mut checkout))?;
        }
        info!(count = paths.len(), "restored paths from HEAD");
        Ok(())
    }

    /// Check out `paths` from `commit` into the working tree and index,
    /// keeping blob bytes and file modes. Paths absent from `commit` are
    /// removed. Uncommitted edits to any of the paths make this fail with
    /// [`GitError::CheckoutConflict`] before anything is written.
    #[instrument(skip(self, paths))]
    pub fn checkout_paths_from(&self, commit: Oid, paths: &[String]) -> Result<(), GitError> {
        if paths.is_empty() {
            return Ok(());
        }
        let commit = self.repo.find_commit(commit)?;
        let mut checkout = CheckoutBuilder::new();
        checkout.safe().disable_pathspec_match(true);
        for path in paths {
            checkout.path(path);
        }
        self.repo
            .checkout_tree(commit.as_object(), Some(&mut checkout))
            .map_err(checkout_error)?;
        debug!(count = paths.len(), commit = %commit.id(), "checked out paths");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Commits
    // -----------------------------------------------------------------------

    /// Commit the current index on top of HEAD.
    #[instrument(skip(self, message))]
    pub fn commit(&self, message: &str, name: &str, email: &str) -> Result<Oid, GitError> {
        let parents: Vec<Oid> = self.head_oid()?.into_iter().collect();
        self.commit_with_parents(message, name, email, &parents)
    }

    /// Commit the current index as a merge of HEAD and `other`.
    #[instrument(skip(self, message))]
    pub fn commit_merge(
        &self,
        message: &str,
        name: &str,
        email: &str,
        other: Oid,
    ) -> Result<Oid, GitError> {
        let mut parents: Vec<Oid> = self.head_oid()?.into_iter().collect();
        if !parents.contains(&other) {
            parents.push(other);
        }
        self.commit_with_parents(message, name, email, &parents)
    }

    fn commit_with_parents(
        &self,
        message: &str,
        name: &str,
        email: &str,
        parents: &[Oid],
    ) -> Result<Oid, GitError> {
        let mut index = self.repo.index()?;
        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;
        let signature = Signature::now(name, email)?;
        let parent_commits = parents
            .iter()
            .map(|oid| self.repo.find_commit(*oid))
            .collect::<Result<Vec<_>, _>>()?;
        let parent_refs: Vec<&git2::Commit> = parent_commits.iter().collect();
        let oid = self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parent_refs,
        )?;
        info!(sha = %oid, parents = parents.len(), "created commit");
        Ok(oid)
    }

    // -----------------------------------------------------------------------
    // History inspection
    // -----------------------------------------------------------------------

    /// Classify how HEAD relates to `theirs`.
    pub fn analyze_merge(&self, theirs: Oid) -> Result<MergeAnalysis, GitError> {
        let annotated = self.repo.find_annotated_commit(theirs)?;
        let (analysis, _) = self.repo.merge_analysis(&[&annotated])?;
        let result = if analysis.is_up_to_date() {
            MergeAnalysis::UpToDate
        } else if analysis.is_fast_forward() || analysis.is_unborn() {
            MergeAnalysis::FastForward
        } else {
            MergeAnalysis::Diverged
        };
        debug!(?result, theirs = %theirs, "merge analysis");
        Ok(result)
    }

    /// Common ancestor of two commits, or `None` for unrelated histories.
    pub fn merge_base(&self, a: Oid, b: Oid) -> Result<Option<Oid>, GitError> {
        match self.repo.merge_base(a, b) {
            Ok(oid) => Ok(Some(oid)),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Paths whose content differs between two commits (`from == None`
    /// means the empty tree).
    pub fn diff_paths(&self, from: Option<Oid>, to: Oid) -> Result<Vec<String>, GitError> {
        let old_tree = match from {
            Some(oid) => Some(self.repo.find_commit(oid)?.tree()?),
            None => None,
        };
        let new_tree = self.repo.find_commit(to)?.tree()?;
        let diff = self
            .repo
            .diff_tree_to_tree(old_tree.as_ref(), Some(&new_tree), None)?;

        let mut paths = Vec::new();
        for delta in diff.deltas() {
            for file in [delta.old_file(), delta.new_file()] {
                if let Some(path) = file.path().and_then(|p| p.to_str()) {
                    if !paths.iter().any(|p: &String| p == path) {
                        paths.push(path.to_string());
                    }
                }
            }
        }
        Ok(paths)
    }

    /// Content of `path` at `commit`, or `None` if the path does not exist
    /// there.
    pub fn read_file_at(&self, commit: Oid, path: &str) -> Result<Option<Vec<u8>>, GitError> {
        let tree = self.repo.find_commit(commit)?.tree()?;
        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let blob = entry.to_object(&self.repo)?.peel_to_blob()?;
        Ok(Some(blob.content().to_vec()))
    }

    /// Tip of `refs/remotes/<remote>/<branch>`, if it exists.
    pub fn remote_tip(&self, remote_name: &str, branch: &str) -> Result<Option<Oid>, GitError> {
        let refname = format!("refs/remotes/{}/{}", remote_name, branch);
        match self.repo.find_reference(&refname) {
            Ok(reference) => Ok(Some(reference.peel_to_commit()?.id())),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Number of local commits the remote-tracking branch lacks.
    pub fn commits_ahead(&self, remote_name: &str, branch: &str) -> Result<usize, GitError> {
        let Some(local) = self.head_oid()? else {
            return Ok(0);
        };
        match self.remote_tip(remote_name, branch)? {
            Some(upstream) => Ok(self.repo.graph_ahead_behind(local, upstream)?.0),
            None => Ok(1),
        }
    }

    /// Check out `target` and point the branch at it.
    ///
    /// The checkout is safe: uncommitted edits to files the target does not
    /// change are kept, and edits the target would overwrite make this fail
    /// with [`GitError::CheckoutConflict`] while the branch stays put.
    #[instrument(skip(self))]
    pub fn fast_forward(&self, branch: &str, target: Oid) -> Result<(), GitError> {
        let commit = self.repo.find_commit(target)?;
        let mut checkout = CheckoutBuilder::new();
        checkout.safe();
        self.repo
            .checkout_tree(commit.as_object(), Some(&mut checkout))
            .map_err(checkout_error)?;

        let refname = format!("refs/heads/{}", branch);
        match self.repo.find_reference(&refname) {
            Ok(mut reference) => {
                reference.set_target(target, "ctxsync: fast-forward pull")?;
            }
            Err(e) if e.code() == ErrorCode::NotFound => {
                self.repo
                    .reference(&refname, target, true, "ctxsync: initial pull")?;
            }
            Err(e) => return Err(e.into()),
        }
        self.repo.set_head(&refname)?;
        info!(branch, target = %target, "fast-forwarded");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Remote transport
    // -----------------------------------------------------------------------

    /// Fetch from a named remote.
    #[instrument(skip(self, token))]
    pub fn fetch(&self, remote_name: &str, token: Option<&str>) -> Result<(), GitError> {
        info!(remote = remote_name, "fetching");
        let mut remote = self
            .repo
            .find_remote(remote_name)
            .map_err(|_| GitError::RemoteNotFound(remote_name.to_string()))?;
        let mut fetch_opts = FetchOptions::new();
        fetch_opts.remote_callbacks(credential_callbacks(token));
        remote.fetch(&[] as &[&str], Some(&mut fetch_opts), None)?;
        debug!("fetch completed");
        Ok(())
    }

    /// Push a local branch to a remote.
    #[instrument(skip(self, token))]
    pub fn push(&self, remote_name: &str, branch: &str, token: Option<&str>) -> Result<(), GitError> {
        info!(remote = remote_name, branch, "pushing");
        let mut remote = self
            .repo
            .find_remote(remote_name)
            .map_err(|_| GitError::RemoteNotFound(remote_name.to_string()))?;

        let push_error: RefCell<Option<String>> = RefCell::new(None);
        let mut callbacks = credential_callbacks(token);
        callbacks.push_update_reference(|refname, status| {
            if let Some(msg) = status {
                warn!(refname, msg, "push rejected");
                *push_error.borrow_mut() = Some(msg.to_string());
            }
            Ok(())
        });
        let mut push_opts = PushOptions::new();
        push_opts.remote_callbacks(callbacks);

        let refspec = format!("refs/heads/{}:refs/heads/{}", branch, branch);
        remote.push(&[&refspec], Some(&mut push_opts))?;
        if let Some(detail) = push_error.borrow_mut().take() {
            return Err(GitError::PushRejected {
                branch: branch.to_string(),
                detail,
            });
        }
        info!("push completed");
        Ok(())
    }
}

fn checkout_error(e: git2::Error) -> GitError {
    if e.code() == ErrorCode::Conflict {
        GitError::CheckoutConflict(e.message().to_string())
    } else {
        e.into()
    }
}

fn credential_callbacks<'a>(token: Option<&str>) -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();
    if let Some(tok) = token {
        let tok = tok.to_string();
        callbacks.credentials(move |_url, _username, _allowed| {
            Cred::userpass_plaintext("x-access-token", &tok)
        });
    }
    callbacks
}

/// Whether a repo-relative path lies under a directory prefix.
pub fn is_under(path: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    path == prefix
        || path
            .strip_prefix(prefix)
            .map(|rest| rest.starts_with('/'))
            .unwrap_or(false)
}
