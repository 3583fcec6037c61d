//! Conflict tracking and resolution.
//!
//! The conflict subsystem is responsible for:
//! 1. **Modelling** -- one [`ConflictReport`] per conflicting pull, one
//!    [`ConflictEntry`] per divergent file.
//! 2. **Resolution** -- applying a [`ResolutionStrategy`] or single-entry
//!    resolutions until nothing is pending.

pub mod prompt;
pub mod report;
pub mod resolver;

pub use prompt::ConsolePrompter;
pub use report::{ConflictEntry, ConflictReport};
pub use resolver::{Choice, ConflictPrompter, ConflictResolver, ResolutionStrategy, StrategyOutcome};
