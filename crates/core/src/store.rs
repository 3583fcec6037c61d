//! The store handle: one context store inside one git repository.
//!
//! Paths come in two flavours. *Repo-relative* paths are what git reports
//! (`.context/knowledge/auth.md`); *store-relative* paths are what conflict
//! reports and commit messages use (`knowledge/auth.md`). The handle converts
//! between them and owns all file I/O on store documents.

use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::errors::{ConfigError, SyncError};
use crate::git::client::is_under;

/// A context store rooted at a repository working directory.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
    config: StoreConfig,
}

impl Store {
    pub fn new<P: Into<PathBuf>>(root: P, config: StoreConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Open the store in `root`, loading `ctxsync.toml` if present.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, ConfigError> {
        let root = root.as_ref();
        let config = StoreConfig::load_for_repo(root)?;
        Ok(Self::new(root, config))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Store directory as a repo-relative prefix with `/` separators.
    /// Empty when the store is the whole repository.
    pub fn prefix(&self) -> String {
        self.config
            .store
            .path
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Absolute store directory.
    pub fn store_dir(&self) -> PathBuf {
        let prefix = self.prefix();
        if prefix.is_empty() {
            self.root.clone()
        } else {
            self.root.join(prefix)
        }
    }

    /// Absolute path of the pending-conflict sidecar.
    pub fn pending_path(&self) -> PathBuf {
        self.store_dir().join(&self.config.store.pending_file)
    }

    fn pending_repo_path(&self) -> String {
        self.repo_path(&self.config.store.pending_file)
    }

    /// Whether a repo-relative path belongs to the store. The sidecar never
    /// does.
    pub fn contains(&self, repo_path: &str) -> bool {
        is_under(repo_path, &self.prefix()) && repo_path != self.pending_repo_path()
    }

    /// Convert a repo-relative path under the store to a store-relative one.
    pub fn store_path<'a>(&self, repo_path: &'a str) -> &'a str {
        let prefix = self.prefix();
        if prefix.is_empty() {
            return repo_path;
        }
        repo_path
            .strip_prefix(prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(repo_path)
    }

    /// Convert a store-relative path to a repo-relative one.
    pub fn repo_path(&self, store_path: &str) -> String {
        let prefix = self.prefix();
        if prefix.is_empty() {
            store_path.to_string()
        } else {
            format!("{}/{}", prefix, store_path)
        }
    }

    // -----------------------------------------------------------------------
    // Document I/O (repo-relative paths)
    // -----------------------------------------------------------------------

    /// Read a document from the working tree. `None` when it does not exist.
    pub fn read_file(&self, repo_path: &str) -> Result<Option<String>, SyncError> {
        let full = self.root.join(repo_path);
        match std::fs::read_to_string(&full) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SyncError::StoreIo {
                path: repo_path.to_string(),
                source,
            }),
        }
    }

    /// Write a document to the working tree. Empty content removes the file.
    pub fn write_file(&self, repo_path: &str, content: &str) -> Result<(), SyncError> {
        if content.is_empty() {
            return self.remove_file(repo_path);
        }
        let full = self.root.join(repo_path);
        let io_err = |source| SyncError::StoreIo {
            path: repo_path.to_string(),
            source,
        };
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(&full, content).map_err(io_err)?;
        debug!(path = repo_path, bytes = content.len(), "wrote document");
        Ok(())
    }

    /// Remove a document; a missing file is not an error.
    pub fn remove_file(&self, repo_path: &str) -> Result<(), SyncError> {
        let full = self.root.join(repo_path);
        match std::fs::remove_file(&full) {
            Ok(()) => {
                debug!(path = repo_path, "removed document");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SyncError::StoreIo {
                path: repo_path.to_string(),
                source,
            }),
        }
    }

    /// Make sure the store's `.gitignore` excludes the sidecar.
    pub fn ensure_gitignore(&self) -> Result<(), SyncError> {
        let dir = self.store_dir();
        let path = dir.join(".gitignore");
        let line = format!("/{}", self.config.store.pending_file);
        let io_err = |source| SyncError::StoreIo {
            path: path.display().to_string(),
            source,
        };

        let existing = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(io_err(e)),
        };
        if existing.lines().any(|l| l.trim() == line) {
            return Ok(());
        }

        let mut updated = existing;
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(&line);
        updated.push('\n');
        std::fs::create_dir_all(&dir).map_err(io_err)?;
        std::fs::write(&path, updated).map_err(io_err)?;
        info!(path = %path.display(), "added pending sidecar to .gitignore");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_at(dir: &Path, path: &str) -> Store {
        let mut config = StoreConfig::default();
        config.store.path = PathBuf::from(path);
        Store::new(dir, config)
    }

    #[test]
    fn test_prefix_normalization() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(store_at(dir.path(), ".context").prefix(), ".context");
        assert_eq!(store_at(dir.path(), "./a/b/").prefix(), "a/b");
        assert_eq!(store_at(dir.path(), ".").prefix(), "");
        assert_eq!(store_at(dir.path(), "").prefix(), "");
        assert_eq!(store_at(dir.path(), ".").store_dir(), dir.path());
    }

    #[test]
    fn test_contains_and_path_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path(), ".context");
        assert!(store.contains(".context/knowledge/a.md"));
        assert!(!store.contains("README.md"));
        assert!(!store.contains(".context/.pending-conflicts.json"));
        assert_eq!(store.store_path(".context/knowledge/a.md"), "knowledge/a.md");
        assert_eq!(store.repo_path("knowledge/a.md"), ".context/knowledge/a.md");

        let whole = store_at(dir.path(), ".");
        assert!(whole.contains("README.md"));
        assert_eq!(whole.store_path("README.md"), "README.md");
    }

    #[test]
    fn test_write_read_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path(), ".context");
        store.write_file(".context/decisions/x.md", "## X\n").unwrap();
        assert_eq!(
            store.read_file(".context/decisions/x.md").unwrap().as_deref(),
            Some("## X\n")
        );
        store.write_file(".context/decisions/x.md", "").unwrap();
        assert!(store.read_file(".context/decisions/x.md").unwrap().is_none());
        store.remove_file(".context/decisions/x.md").unwrap();
    }

    #[test]
    fn test_ensure_gitignore_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path(), ".context");
        std::fs::create_dir_all(store.store_dir()).unwrap();
        std::fs::write(store.store_dir().join(".gitignore"), "*.tmp").unwrap();

        store.ensure_gitignore().unwrap();
        store.ensure_gitignore().unwrap();
        let text = std::fs::read_to_string(store.store_dir().join(".gitignore")).unwrap();
        assert_eq!(text, "*.tmp\n/.pending-conflicts.json\n");
    }
}
