//! Commit message generation for sync commits.

use std::path::Path;

use crate::config::StoreSection;
use crate::conflict::ConflictReport;

/// Changed store paths bucketed by the store layout.
#[derive(Debug, Default, PartialEq, Eq)]
struct Grouped {
    knowledge: Vec<String>,
    decisions: Vec<String>,
    other: Vec<String>,
}

fn group_paths(paths: &[String], layout: &StoreSection) -> Grouped {
    let mut grouped = Grouped::default();
    for path in paths {
        let key = file_stem(path);
        let bucket = if in_dir(path, &layout.knowledge_dir) {
            &mut grouped.knowledge
        } else if in_dir(path, &layout.decisions_dir) {
            &mut grouped.decisions
        } else {
            &mut grouped.other
        };
        if !bucket.contains(&key) {
            bucket.push(key);
        }
    }
    grouped
}

fn in_dir(path: &str, dir: &str) -> bool {
    let dir = dir.trim_matches('/');
    !dir.is_empty()
        && path
            .strip_prefix(dir)
            .map(|rest| rest.starts_with('/'))
            .unwrap_or(false)
}

fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

/// Build a commit message for local store changes.
///
/// `paths` are store-relative. The subject counts each group and the body
/// lists the affected keys (file stems) per group.
pub fn auto_message(prefix: &str, paths: &[String], layout: &StoreSection) -> String {
    let grouped = group_paths(paths, layout);
    let groups = [
        ("knowledge", &grouped.knowledge),
        ("decisions", &grouped.decisions),
        ("other", &grouped.other),
    ];

    let counts: Vec<String> = groups
        .iter()
        .filter(|(_, keys)| !keys.is_empty())
        .map(|(name, keys)| format!("{} {}", keys.len(), name))
        .collect();
    let subject = if counts.is_empty() {
        format!("{} update context", prefix)
    } else {
        format!("{} update context: {}", prefix, counts.join(", "))
    };

    let body: Vec<String> = groups
        .iter()
        .filter(|(_, keys)| !keys.is_empty())
        .map(|(name, keys)| format!("{}: {}", name, keys.join(", ")))
        .collect();

    if body.is_empty() {
        subject
    } else {
        format!("{}\n\n{}", subject, body.join("\n"))
    }
}

/// Build the message for a merge commit of `theirs` into `branch`.
pub fn merge_message(
    prefix: &str,
    branch: &str,
    theirs: &str,
    report: Option<&ConflictReport>,
) -> String {
    let short = theirs.get(..8).unwrap_or(theirs);
    let mut msg = format!("{} merge {} into {}", prefix, short, branch);

    if let Some(report) = report {
        if !report.auto_resolved.is_empty() {
            msg.push_str("\n\nAuto-merged:\n");
            for path in &report.auto_resolved {
                msg.push_str(&format!("  {}\n", path));
            }
        }
        if !report.conflicts.is_empty() {
            msg.push_str(if report.auto_resolved.is_empty() { "\n\n" } else { "\n" });
            msg.push_str("Conflicts:\n");
            for entry in &report.conflicts {
                let how = if entry.resolved { "resolved" } else { "kept ours" };
                msg.push_str(&format!("  {} ({})\n", entry.file_path, how));
            }
        }
    }
    msg.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::ConflictEntry;

    fn paths(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_auto_message_groups_by_layout() {
        let layout = StoreSection::default();
        let msg = auto_message(
            "[ctxsync]",
            &paths(&[
                "knowledge/auth-flow.md",
                "knowledge/caching.json",
                "decisions/use-postgres.md",
                "notes.md",
            ]),
            &layout,
        );
        assert_eq!(
            msg,
            "[ctxsync] update context: 2 knowledge, 1 decisions, 1 other\n\n\
             knowledge: auth-flow, caching\n\
             decisions: use-postgres\n\
             other: notes"
        );
    }

    #[test]
    fn test_auto_message_dedupes_stems() {
        let layout = StoreSection::default();
        let msg = auto_message(
            "[x]",
            &paths(&["knowledge/a.md", "knowledge/a.json"]),
            &layout,
        );
        assert!(msg.starts_with("[x] update context: 1 knowledge"));
    }

    #[test]
    fn test_auto_message_empty() {
        assert_eq!(
            auto_message("[ctxsync]", &[], &StoreSection::default()),
            "[ctxsync] update context"
        );
    }

    #[test]
    fn test_prefix_match_requires_directory_boundary() {
        let layout = StoreSection::default();
        let grouped = group_paths(&paths(&["knowledgebase.md"]), &layout);
        assert_eq!(grouped.other, vec!["knowledgebase".to_string()]);
    }

    #[test]
    fn test_merge_message_lists_report() {
        let mut report = ConflictReport::new();
        report.auto_resolved.push("log.ndjson".into());
        report.push(ConflictEntry::new("a.md", "", "o", "t"));
        let msg = merge_message("[ctxsync]", "main", "0123456789abcdef", Some(&report));
        assert!(msg.starts_with("[ctxsync] merge 01234567 into main"));
        assert!(msg.contains("Auto-merged:\n  log.ndjson"));
        assert!(msg.contains("a.md (kept ours)"));
    }

    #[test]
    fn test_merge_message_with_short_or_multibyte_sha() {
        let msg = merge_message("[ctxsync]", "main", "aéééé", None);
        assert_eq!(msg, "[ctxsync] merge aéééé into main");
        let msg = merge_message("[ctxsync]", "main", "abc", None);
        assert_eq!(msg, "[ctxsync] merge abc into main");
    }
}
