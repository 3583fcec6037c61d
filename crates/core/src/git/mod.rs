//! Git operations for the context store.

pub mod client;

pub use client::{GitClient, MergeAnalysis};
