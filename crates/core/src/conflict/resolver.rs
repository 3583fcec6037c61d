//! Conflict resolution strategies.
//!
//! A [`ResolutionStrategy`] is applied to a [`ConflictReport`] after a pull:
//! `ours` / `theirs` settle every entry immediately, `interactive` asks a
//! [`ConflictPrompter`] per entry, and `agent` leaves everything pending so
//! an external agent can resolve entries one at a time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::report::{ConflictEntry, ConflictReport};
use crate::errors::ConflictError;
use crate::merge::json::{parse_object, render_object};
use crate::merge::{merge_json_with, MergeKind, Side};

/// Named resolution strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Resolve every entry to the local side.
    Ours,
    /// Resolve every entry to the remote side.
    Theirs,
    /// Ask a human per entry.
    Interactive,
    /// Persist the report for stepwise resolution by an external agent.
    Agent,
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ours => write!(f, "ours"),
            Self::Theirs => write!(f, "theirs"),
            Self::Interactive => write!(f, "interactive"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

impl FromStr for ResolutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ours" => Ok(Self::Ours),
            "theirs" => Ok(Self::Theirs),
            "interactive" => Ok(Self::Interactive),
            "agent" => Ok(Self::Agent),
            other => Err(format!(
                "unknown strategy '{}': use ours, theirs, interactive or agent",
                other
            )),
        }
    }
}

/// A per-entry decision from an interactive prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    Ours,
    Theirs,
    /// Use hand-edited content.
    Edit(String),
    /// Leave the entry pending.
    Skip,
}

/// Human-facing collaborator for the `interactive` strategy.
pub trait ConflictPrompter {
    /// Decide how to resolve one entry.
    fn choose(&mut self, entry: &ConflictEntry) -> Result<Choice, ConflictError>;
}

/// What applying a strategy did to a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    /// Entries were resolved; `remaining` are still pending.
    Applied { resolved: usize, remaining: usize },
    /// Nothing was resolved; the report is left for an external agent.
    Deferred { remaining: usize },
}

impl StrategyOutcome {
    /// Whether the report still has unresolved entries.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Applied { remaining: 0, .. })
    }
}

/// Stateless strategy application.
pub struct ConflictResolver;

impl ConflictResolver {
    /// Apply `strategy` to every unresolved entry of `report`.
    ///
    /// `prompter` is only consulted for [`ResolutionStrategy::Interactive`];
    /// without one, interactive resolution leaves every entry pending.
    pub fn apply(
        strategy: ResolutionStrategy,
        report: &mut ConflictReport,
        prompter: Option<&mut dyn ConflictPrompter>,
    ) -> Result<StrategyOutcome, ConflictError> {
        info!(
            conflict_id = %report.conflict_id,
            strategy = %strategy,
            unresolved = report.unresolved_count(),
            "applying resolution strategy"
        );
        let outcome = match strategy {
            ResolutionStrategy::Ours => {
                let resolved = Self::resolve_all(report, Side::Ours);
                StrategyOutcome::Applied {
                    resolved,
                    remaining: report.unresolved_count(),
                }
            }
            ResolutionStrategy::Theirs => {
                let resolved = Self::resolve_all(report, Side::Theirs);
                StrategyOutcome::Applied {
                    resolved,
                    remaining: report.unresolved_count(),
                }
            }
            ResolutionStrategy::Interactive => match prompter {
                Some(prompter) => {
                    let resolved = Self::resolve_interactive(report, prompter)?;
                    StrategyOutcome::Applied {
                        resolved,
                        remaining: report.unresolved_count(),
                    }
                }
                None => StrategyOutcome::Deferred {
                    remaining: report.unresolved_count(),
                },
            },
            ResolutionStrategy::Agent => StrategyOutcome::Deferred {
                remaining: report.unresolved_count(),
            },
        };
        debug!(?outcome, "strategy applied");
        Ok(outcome)
    }

    /// Resolve every unresolved entry to `side`. Returns how many changed.
    pub fn resolve_all(report: &mut ConflictReport, side: Side) -> usize {
        let mut count = 0;
        for entry in report.conflicts.iter_mut().filter(|e| !e.resolved) {
            Self::resolve_to(entry, side);
            count += 1;
        }
        count
    }

    /// Ask `prompter` about every unresolved entry. Returns how many were
    /// resolved; skipped entries stay pending.
    pub fn resolve_interactive(
        report: &mut ConflictReport,
        prompter: &mut dyn ConflictPrompter,
    ) -> Result<usize, ConflictError> {
        let mut count = 0;
        for entry in report.conflicts.iter_mut().filter(|e| !e.resolved) {
            let side = match prompter.choose(entry)? {
                Choice::Ours => Side::Ours,
                Choice::Theirs => Side::Theirs,
                Choice::Edit(content) => {
                    entry.resolve(content);
                    count += 1;
                    continue;
                }
                Choice::Skip => {
                    debug!(path = %entry.file_path, "entry skipped");
                    continue;
                }
            };
            Self::resolve_to(entry, side);
            count += 1;
        }
        Ok(count)
    }

    /// Resolve `entry` to `side`: binary entries keep that side's blob,
    /// text entries take [`side_resolution`](Self::side_resolution).
    pub fn resolve_to(entry: &mut ConflictEntry, side: Side) {
        if entry.binary {
            entry.resolve_side(side);
        } else {
            let content = Self::side_resolution(entry, side);
            entry.resolve(content);
        }
    }

    /// Content an entry resolves to when `side` is chosen.
    ///
    /// JSON entries re-run the field merge with `side` as the tie-break, so
    /// the other side's non-conflicting key changes survive. Every other kind
    /// takes the chosen side's whole content, as does a JSON file that one
    /// side deleted.
    pub fn side_resolution(entry: &ConflictEntry, side: Side) -> String {
        let both_present = !entry.ours_content.is_empty() && !entry.theirs_content.is_empty();
        if entry.kind == MergeKind::Json && both_present {
            let maps = (
                parse_object(&entry.base_content),
                parse_object(&entry.ours_content),
                parse_object(&entry.theirs_content),
            );
            if let (Ok(base), Ok(ours), Ok(theirs)) = maps {
                let merged = merge_json_with(&base, &ours, &theirs, side);
                return render_object(&merged.content);
            }
        }
        entry.side_content(side).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    struct Scripted(Vec<Choice>);

    impl ConflictPrompter for Scripted {
        fn choose(&mut self, _entry: &ConflictEntry) -> Result<Choice, ConflictError> {
            Ok(if self.0.is_empty() {
                Choice::Skip
            } else {
                self.0.remove(0)
            })
        }
    }

    fn report() -> ConflictReport {
        let mut report = ConflictReport::new();
        report.push(ConflictEntry::new(
            "settings.json",
            "{\"a\":1,\"b\":1}",
            "{\"a\":2,\"b\":1}",
            "{\"a\":3,\"b\":5}",
        ));
        report.push(ConflictEntry::new("notes.md", "## A\nx\n", "## A\no\n", "## A\nt\n"));
        report
    }

    #[test]
    fn test_strategy_parse_and_display() {
        for s in ["ours", "theirs", "interactive", "agent"] {
            let parsed: ResolutionStrategy = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
        assert_eq!(" Theirs ".parse::<ResolutionStrategy>(), Ok(ResolutionStrategy::Theirs));
        assert!("both".parse::<ResolutionStrategy>().is_err());
    }

    #[test]
    fn test_ours_resolves_everything() {
        let mut report = report();
        let outcome = ConflictResolver::apply(ResolutionStrategy::Ours, &mut report, None).unwrap();
        assert!(outcome.is_complete());
        assert_eq!(report.entry("notes.md").unwrap().resolution, "## A\no\n");

        // JSON keeps theirs' clean change to `b` while `a` goes to ours.
        let json: Value =
            serde_json::from_str(&report.entry("settings.json").unwrap().resolution).unwrap();
        assert_eq!(json, json!({"a": 2, "b": 5}));
    }

    #[test]
    fn test_theirs_resolves_everything() {
        let mut report = report();
        ConflictResolver::apply(ResolutionStrategy::Theirs, &mut report, None).unwrap();
        assert!(!report.has_conflicts());
        assert_eq!(report.entry("notes.md").unwrap().resolution, "## A\nt\n");
        let json: Value =
            serde_json::from_str(&report.entry("settings.json").unwrap().resolution).unwrap();
        assert_eq!(json, json!({"a": 3, "b": 5}));
    }

    #[test]
    fn test_agent_defers() {
        let mut report = report();
        let outcome =
            ConflictResolver::apply(ResolutionStrategy::Agent, &mut report, None).unwrap();
        assert_eq!(outcome, StrategyOutcome::Deferred { remaining: 2 });
        assert_eq!(report.unresolved_count(), 2);
    }

    #[test]
    fn test_interactive_with_skip_leaves_pending() {
        let mut report = report();
        let mut prompter = Scripted(vec![Choice::Edit("{\"a\":9}\n".into()), Choice::Skip]);
        let outcome = ConflictResolver::apply(
            ResolutionStrategy::Interactive,
            &mut report,
            Some(&mut prompter as &mut dyn ConflictPrompter),
        )
        .unwrap();
        assert_eq!(
            outcome,
            StrategyOutcome::Applied {
                resolved: 1,
                remaining: 1
            }
        );
        assert_eq!(report.entry("settings.json").unwrap().resolution, "{\"a\":9}\n");
        assert!(!report.entry("notes.md").unwrap().resolved);
    }

    #[test]
    fn test_interactive_without_prompter_defers() {
        let mut report = report();
        let outcome =
            ConflictResolver::apply(ResolutionStrategy::Interactive, &mut report, None).unwrap();
        assert!(!outcome.is_complete());
        assert_eq!(report.unresolved_count(), 2);
    }

    #[test]
    fn test_already_resolved_entries_are_untouched() {
        let mut report = report();
        report.resolve_single("notes.md", "mine");
        let count = ConflictResolver::resolve_all(&mut report, Side::Theirs);
        assert_eq!(count, 1);
        assert_eq!(report.entry("notes.md").unwrap().resolution, "mine");
    }

    #[test]
    fn test_binary_entries_resolve_to_a_side() {
        let mut report = ConflictReport::new();
        report.push(ConflictEntry::binary("img.bin", "binary content changed on both sides"));
        report.push(ConflictEntry::binary("logo.png", "binary content changed on both sides"));

        ConflictResolver::resolve_all(&mut report, Side::Theirs);
        let entry = report.entry("img.bin").unwrap();
        assert!(entry.resolved);
        assert_eq!(entry.resolved_side, Some(Side::Theirs));
        assert!(entry.resolution.is_empty());

        let mut report = ConflictReport::new();
        report.push(ConflictEntry::binary("img.bin", "binary content changed on both sides"));
        let mut prompter = Scripted(vec![Choice::Ours]);
        ConflictResolver::resolve_interactive(&mut report, &mut prompter).unwrap();
        assert_eq!(report.entry("img.bin").unwrap().resolved_side, Some(Side::Ours));
    }
}
