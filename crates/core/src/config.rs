//! TOML-based configuration for a ctxsync store.
//!
//! The configuration lives in `ctxsync.toml` at the repository root. Every
//! field has a default, so a repository without the file behaves like one
//! with an empty file. Secrets (the push/fetch token) are stored as `_env`
//! fields naming an environment variable and are resolved at runtime via
//! [`StoreConfig::resolve_env_vars`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::conflict::ResolutionStrategy;
use crate::errors::ConfigError;

/// File name of the configuration file at the repository root.
pub const CONFIG_FILE_NAME: &str = "ctxsync.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level store configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store layout settings.
    #[serde(default)]
    pub store: StoreSection,

    /// Git remote and identity settings.
    #[serde(default)]
    pub git: GitConfig,

    /// Sync behaviour settings.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Where the store lives inside the repository and how it is laid out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
    /// Store directory relative to the repository root (default `.context`).
    /// An empty string or `.` means the whole repository.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// File name of the pending-conflict sidecar inside the store directory.
    #[serde(default = "default_pending_file")]
    pub pending_file: String,

    /// Sub-directory holding knowledge entries.
    #[serde(default = "default_knowledge_dir")]
    pub knowledge_dir: String,

    /// Sub-directory holding decision records.
    #[serde(default = "default_decisions_dir")]
    pub decisions_dir: String,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".context")
}
fn default_pending_file() -> String {
    ".pending-conflicts.json".into()
}
fn default_knowledge_dir() -> String {
    "knowledge".into()
}
fn default_decisions_dir() -> String {
    "decisions".into()
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            pending_file: default_pending_file(),
            knowledge_dir: default_knowledge_dir(),
            decisions_dir: default_decisions_dir(),
        }
    }
}

// ---------------------------------------------------------------------------
// Git
// ---------------------------------------------------------------------------

/// Remote, branch and commit identity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// Name of the remote to sync with (default `origin`).
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Branch to sync. Defaults to the currently checked-out branch.
    #[serde(default)]
    pub branch: Option<String>,

    /// Author / committer name for sync commits.
    #[serde(default = "default_author_name")]
    pub author_name: String,

    /// Author / committer email for sync commits.
    #[serde(default = "default_author_email")]
    pub author_email: String,

    /// Environment variable holding an HTTPS access token for the remote.
    #[serde(default)]
    pub token_env: Option<String>,

    /// Resolved token (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub token: Option<String>,
}

fn default_remote() -> String {
    "origin".into()
}
fn default_author_name() -> String {
    "ctxsync".into()
}
fn default_author_email() -> String {
    "ctxsync@localhost".into()
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            remote: default_remote(),
            branch: None,
            author_name: default_author_name(),
            author_email: default_author_email(),
            token_env: None,
            token: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

/// Sync behaviour configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Strategy used when a caller does not name one.
    #[serde(default = "default_strategy")]
    pub default_strategy: ResolutionStrategy,

    /// Prefix placed at the start of every generated commit subject.
    #[serde(default = "default_commit_prefix")]
    pub commit_prefix: String,

    /// Commit local store changes before pulling (otherwise pull refuses).
    #[serde(default = "default_true")]
    pub commit_before_pull: bool,
}

fn default_strategy() -> ResolutionStrategy {
    ResolutionStrategy::Agent
}
fn default_commit_prefix() -> String {
    "[ctxsync]".into()
}
fn default_true() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_strategy: default_strategy(),
            commit_prefix: default_commit_prefix(),
            commit_before_pull: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum tracing level or `EnvFilter` directive (default `info`).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl StoreConfig {
    /// Load a [`StoreConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: StoreConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Load `ctxsync.toml` from a repository root, falling back to defaults
    /// when the file does not exist.
    pub fn load_for_repo<P: AsRef<Path>>(repo_root: P) -> Result<Self, ConfigError> {
        let path = repo_root.as_ref().join(CONFIG_FILE_NAME);
        if !path.exists() {
            debug!(path = %path.display(), "no configuration file, using defaults");
            let mut config = Self::default();
            config.resolve_env_vars()?;
            return Ok(config);
        }
        Self::load_and_resolve(path)
    }

    /// Resolve all `*_env` fields from environment variables.
    ///
    /// A missing variable logs a warning but does not fail: fetch and push
    /// simply run without credentials.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(ref env_name) = self.git.token_env {
            self.git.token = resolve_optional_env(env_name, "git.token_env");
        }
        Ok(())
    }

    /// Validate that all fields are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.git.remote.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "git.remote".into(),
                detail: "remote name must not be empty".into(),
            });
        }
        if self.store.path.is_absolute() {
            return Err(ConfigError::InvalidValue {
                field: "store.path".into(),
                detail: "store path must be relative to the repository root".into(),
            });
        }
        if self
            .store
            .path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(ConfigError::InvalidValue {
                field: "store.path".into(),
                detail: "store path must not leave the repository".into(),
            });
        }
        if self.store.pending_file.is_empty() || self.store.pending_file.contains('/') {
            return Err(ConfigError::InvalidValue {
                field: "store.pending_file".into(),
                detail: "pending file must be a plain file name".into(),
            });
        }
        if let Some(ref branch) = self.git.branch {
            if branch.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "git.branch".into(),
                    detail: "branch must not be empty when set".into(),
                });
            }
        }
        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}
