//! ctxsync core library.
//!
//! A git-backed context store shared by independent agents. This crate
//! provides three-way merge algorithms for JSON, NDJSON and Markdown
//! documents, the conflict model and resolution strategies, configuration,
//! and the [`SyncEngine`] that commits, pulls, merges and finalizes.

pub mod commit_format;
pub mod config;
pub mod conflict;
pub mod errors;
pub mod git;
pub mod logging;
pub mod merge;
mod pending;
pub mod store;
pub mod sync_engine;

// Re-exports for convenience.
pub use config::StoreConfig;
pub use conflict::{ConflictEntry, ConflictReport, ResolutionStrategy};
pub use errors::CoreError;
pub use merge::{MergeKind, MergeResult};
pub use store::Store;
pub use sync_engine::{
    AbortOutcome, FinalizeOutcome, PullOutcome, PushOutcome, ResolveOutcome, SaveOutcome,
    StoreStatus, SyncEngine,
};
