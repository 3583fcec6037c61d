//! Section-level merge of Markdown documents.
//!
//! Documents are split on second-level headings (`## `) only; deeper
//! headings stay inside their enclosing section. Text before the first
//! heading is the preamble. Sections are matched across the three versions
//! by a normalized header key and resolved one at a time.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex_lite::Regex;
use tracing::debug;

use super::{merge_whole_document, MergeResult};

/// A heading-delimited unit of a Markdown document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// The literal heading line without its line ending; empty for the
    /// preamble.
    pub header: String,
    /// Everything after the heading line up to the next section heading.
    pub content: String,
}

impl Section {
    /// Normalized comparison key: `#` removed, trimmed, case-folded.
    pub fn key(&self) -> String {
        normalize_header(&self.header)
    }

    /// Heading text as shown in conflict details.
    fn display_name(&self) -> String {
        if self.header.is_empty() {
            "(preamble)".to_string()
        } else {
            self.header.trim_start_matches('#').trim().to_string()
        }
    }
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^##(?:[ \t]|$)").expect("static regex"))
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^ {0,3}(?:```|~~~)").expect("static regex"))
}

/// Normalize a heading line into a section key.
pub fn normalize_header(header: &str) -> String {
    header.replace('#', "").trim().to_lowercase()
}

/// Split a document into sections. Headings inside fenced code blocks are
/// content.
pub fn parse_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current = Section {
        header: String::new(),
        content: String::new(),
    };
    let mut in_fence = false;

    for line in text.split_inclusive('\n') {
        let bare = line.trim_end_matches(&['\n', '\r'][..]);
        if fence_re().is_match(bare) {
            in_fence = !in_fence;
        }
        if !in_fence && heading_re().is_match(bare) {
            if !current.header.is_empty() || !current.content.is_empty() {
                sections.push(current);
            }
            current = Section {
                header: bare.to_string(),
                content: String::new(),
            };
        } else {
            current.content.push_str(line);
        }
    }
    if !current.header.is_empty() || !current.content.is_empty() {
        sections.push(current);
    }
    sections
}

/// Sections of one version, addressable by key in document order.
struct SectionMap {
    keys: Vec<String>,
    by_key: HashMap<String, Section>,
}

impl SectionMap {
    fn parse(text: &str) -> Self {
        let mut keys = Vec::new();
        let mut by_key = HashMap::new();
        let mut occurrences: HashMap<String, usize> = HashMap::new();

        for section in parse_sections(text) {
            let base_key = section.key();
            let n = occurrences.entry(base_key.clone()).or_insert(0);
            *n += 1;
            // Repeated headings are matched by occurrence.
            let key = if *n == 1 {
                base_key
            } else {
                format!("{}#{}", base_key, n)
            };
            keys.push(key.clone());
            by_key.insert(key, section);
        }
        Self { keys, by_key }
    }

    fn get(&self, key: &str) -> Option<&Section> {
        self.by_key.get(key)
    }

    fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    fn has_headings(&self) -> bool {
        self.keys.iter().any(|k| {
            self.by_key
                .get(k)
                .map(|s| !s.header.is_empty())
                .unwrap_or(false)
        })
    }
}

fn same_content(a: &str, b: &str) -> bool {
    a.trim_end() == b.trim_end()
}

/// Three-way merge of Markdown documents at section granularity.
///
/// Output order is base sections first, then sections only ours added, then
/// sections only theirs added; the preamble always leads.
pub fn merge_markdown(base: &str, ours: &str, theirs: &str) -> MergeResult<String> {
    if ours == theirs || theirs == base {
        return MergeResult::clean(ours.to_string());
    }
    if ours == base {
        return MergeResult::clean(theirs.to_string());
    }

    let b = SectionMap::parse(base);
    let o = SectionMap::parse(ours);
    let t = SectionMap::parse(theirs);

    if !b.has_headings() && !o.has_headings() && !t.has_headings() {
        debug!("no section headings, comparing whole documents");
        return merge_whole_document(base, ours, theirs);
    }

    let mut order: Vec<&str> = Vec::new();
    if b.contains("") || o.contains("") || t.contains("") {
        order.push("");
    }
    order.extend(b.keys.iter().map(String::as_str).filter(|k| !k.is_empty()));
    order.extend(
        o.keys
            .iter()
            .map(String::as_str)
            .filter(|k| !k.is_empty() && !b.contains(k)),
    );
    order.extend(
        t.keys
            .iter()
            .map(String::as_str)
            .filter(|k| !k.is_empty() && !b.contains(k) && !o.contains(k)),
    );

    let mut merged = Vec::new();
    let mut details = Vec::new();
    for key in order {
        let (section, detail) = resolve_section(b.get(key), o.get(key), t.get(key));
        if let Some(detail) = detail {
            debug!(section = %key, "markdown section conflict");
            details.push(detail);
        }
        if let Some(section) = section {
            merged.push(section);
        }
    }

    MergeResult::with_details(render_sections(&merged), details)
}

/// Resolve one section key across the three versions.
fn resolve_section(
    base: Option<&Section>,
    ours: Option<&Section>,
    theirs: Option<&Section>,
) -> (Option<Section>, Option<String>) {
    match (base, ours, theirs) {
        (Some(b), Some(o), Some(t)) => {
            let ours_changed = !same_content(&o.content, &b.content);
            let theirs_changed = !same_content(&t.content, &b.content);
            let header = if o.header != b.header {
                o.header.clone()
            } else {
                t.header.clone()
            };
            match (ours_changed, theirs_changed) {
                (false, true) => (
                    Some(Section {
                        header,
                        content: t.content.clone(),
                    }),
                    None,
                ),
                (true, true) if !same_content(&o.content, &t.content) => (
                    Some(o.clone()),
                    Some(format!(
                        "section '{}': both sides modified",
                        o.display_name()
                    )),
                ),
                _ => (
                    Some(Section {
                        header,
                        content: o.content.clone(),
                    }),
                    None,
                ),
            }
        }
        (Some(b), Some(o), None) => {
            if same_content(&o.content, &b.content) {
                (None, None)
            } else {
                (
                    Some(o.clone()),
                    Some(format!(
                        "section '{}': modified by ours, deleted by theirs",
                        o.display_name()
                    )),
                )
            }
        }
        (Some(b), None, Some(t)) => {
            if same_content(&t.content, &b.content) {
                (None, None)
            } else {
                (
                    Some(t.clone()),
                    Some(format!(
                        "section '{}': deleted by ours, modified by theirs",
                        t.display_name()
                    )),
                )
            }
        }
        (None, Some(o), Some(t)) => {
            if same_content(&o.content, &t.content) {
                (Some(o.clone()), None)
            } else {
                (
                    Some(o.clone()),
                    Some(format!(
                        "section '{}': added on both sides with different content",
                        o.display_name()
                    )),
                )
            }
        }
        (None, Some(o), None) => (Some(o.clone()), None),
        (None, None, Some(t)) => (Some(t.clone()), None),
        (_, None, None) => (None, None),
    }
}

/// Render sections back into a document.
pub fn render_sections(sections: &[Section]) -> String {
    let mut out = String::new();
    for section in sections {
        if section.header.is_empty() {
            out.push_str(&section.content);
            continue;
        }
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&section.header);
        out.push('\n');
        out.push_str(&section.content);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sections_with_preamble_and_subheadings() {
        let doc = "# Title\nintro\n## One\nfirst\n### Deep\nstill one\n## Two\nsecond\n";
        let sections = parse_sections(doc);
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].header, "");
        assert_eq!(sections[0].content, "# Title\nintro\n");
        assert_eq!(sections[1].header, "## One");
        assert_eq!(sections[1].content, "first\n### Deep\nstill one\n");
        assert_eq!(sections[2].key(), "two");
        assert_eq!(render_sections(&sections), doc);
    }

    #[test]
    fn test_headings_in_code_fences_are_content() {
        let doc = "## Real\n```\n## not a heading\n```\n";
        let sections = parse_sections(doc);
        assert_eq!(sections.len(), 1);
        assert!(sections[0].content.contains("## not a heading"));
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("##  Setup Notes ##"), "setup notes");
        assert_eq!(normalize_header("## SETUP notes"), "setup notes");
    }

    #[test]
    fn test_section_conflict_defaults_to_ours() {
        let result = merge_markdown("## A\nOld.\n", "## A\nOurs.\n", "## A\nTheirs.\n");
        assert!(result.has_conflicts);
        assert!(result.content.contains("Ours."));
        assert!(!result.content.contains("Theirs."));
        assert_eq!(result.conflict_details.len(), 1);
        assert!(result.conflict_details[0].contains("'A'"));
    }

    #[test]
    fn test_disjoint_section_edits_merge() {
        let base = "## A\na\n## B\nb\n";
        let ours = "## A\na ours\n## B\nb\n";
        let theirs = "## A\na\n## B\nb theirs\n";
        let result = merge_markdown(base, ours, theirs);
        assert!(!result.has_conflicts);
        assert_eq!(result.content, "## A\na ours\n## B\nb theirs\n");
    }

    #[test]
    fn test_trailing_whitespace_is_not_a_change() {
        let base = "## A\na\n## B\nb\n";
        let ours = "## A\na\n\n\n## B\nb\n";
        let theirs = "## A\na\n## B\nb2\n";
        let result = merge_markdown(base, ours, theirs);
        assert!(!result.has_conflicts);
        assert_eq!(result.content, "## A\na\n\n\n## B\nb2\n");
    }

    #[test]
    fn test_unmodified_deletion_is_accepted() {
        let base = "## A\na\n## B\nb\n";
        let ours = "## A\na\n";
        let theirs = "## A\na2\n## B\nb\n";
        let result = merge_markdown(base, ours, theirs);
        assert!(!result.has_conflicts);
        assert_eq!(result.content, "## A\na2\n");
    }

    #[test]
    fn test_delete_versus_modify_keeps_modifier() {
        let base = "## A\na\n## B\nb\n";
        let ours = "## A\na\n";
        let theirs = "## A\na\n## B\nb changed\n";
        let result = merge_markdown(base, ours, theirs);
        assert!(result.has_conflicts);
        assert!(result.content.contains("b changed"));
        assert!(result.conflict_details[0].contains("deleted by ours"));

        let result = merge_markdown(base, theirs, ours);
        assert!(result.has_conflicts);
        assert!(result.content.contains("b changed"));
        assert!(result.conflict_details[0].contains("deleted by theirs"));
    }

    #[test]
    fn test_added_sections_order_and_conflicts() {
        let base = "## Base\nx\n";
        let ours = "## Base\nx\n## Shared\nsame\n## Mine\nm\n## Clash\nours\n";
        let theirs = "## Base\nx\n## Clash\ntheirs\n## Yours\ny\n## Shared\nsame\n";
        let result = merge_markdown(base, ours, theirs);
        assert!(result.has_conflicts);
        assert_eq!(result.conflict_details.len(), 1);
        assert!(result.conflict_details[0].contains("'Clash'"));
        assert_eq!(
            result.content,
            "## Base\nx\n## Shared\nsame\n## Mine\nm\n## Clash\nours\n## Yours\ny\n"
        );
    }

    #[test]
    fn test_ours_heading_rename_keeps_theirs_content() {
        let base = "## Setup\nold steps\n## Other\no\n";
        let ours = "## SETUP\nold steps\n## Other\no ours\n";
        let theirs = "## Setup\nnew steps\n## Other\no\n";
        let result = merge_markdown(base, ours, theirs);
        assert!(!result.has_conflicts);
        assert_eq!(result.content, "## SETUP\nnew steps\n## Other\no ours\n");
    }

    #[test]
    fn test_preamble_leads_output() {
        let base = "## A\na\n";
        let ours = "Intro from ours\n## A\na\n";
        let theirs = "## A\na\n## B\nb\n";
        let result = merge_markdown(base, ours, theirs);
        assert!(!result.has_conflicts);
        assert_eq!(result.content, "Intro from ours\n## A\na\n## B\nb\n");
    }

    #[test]
    fn test_missing_final_newline_is_repaired_between_sections() {
        let base = "## A\na";
        let ours = "## A\na ours";
        let theirs = "## A\na\n## B\nb";
        let result = merge_markdown(base, ours, theirs);
        assert!(!result.has_conflicts);
        assert_eq!(result.content, "## A\na ours\n## B\nb");
    }

    #[test]
    fn test_no_headings_falls_back_to_whole_document() {
        let result = merge_markdown("plain\n", "ours\n", "theirs\n");
        assert!(result.has_conflicts);
        assert_eq!(result.content, "ours\n");
        assert_eq!(result.conflict_details.len(), 1);
        assert!(result.conflict_details[0].contains("whole-file"));

        let result = merge_markdown("plain\n", "plain\n", "theirs\n");
        assert!(!result.has_conflicts);
        assert_eq!(result.content, "theirs\n");
    }
}
