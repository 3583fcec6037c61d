//! Terminal prompter for the `interactive` strategy.

use console::{Style, Term};
use dialoguer::{theme::ColorfulTheme, Editor, Select};

use super::report::ConflictEntry;
use super::resolver::{Choice, ConflictPrompter};
use crate::errors::ConflictError;

/// Shows a coloured diff of each entry and asks which side to keep.
pub struct ConsolePrompter {
    term: Term,
}

impl Default for ConsolePrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsolePrompter {
    pub fn new() -> Self {
        Self {
            term: Term::stderr(),
        }
    }
}

impl ConflictPrompter for ConsolePrompter {
    fn choose(&mut self, entry: &ConflictEntry) -> Result<Choice, ConflictError> {
        let header = Style::new().bold();
        let dim = Style::new().dim();
        let prompt_err = |e: std::io::Error| ConflictError::PromptFailed(e.to_string());

        self.term
            .write_line(&header.apply_to(format!("Conflict in {}", entry.file_path)).to_string())
            .map_err(prompt_err)?;
        for detail in &entry.details {
            self.term
                .write_line(&dim.apply_to(format!("  {}", detail)).to_string())
                .map_err(prompt_err)?;
        }
        let diff = if entry.binary {
            dim.apply_to("  binary content differs").to_string()
        } else {
            render_diff(&entry.ours_content, &entry.theirs_content)
        };
        self.term.write_line(&diff).map_err(prompt_err)?;

        let items: &[&str] = if entry.binary {
            &["Keep ours", "Take theirs", "Skip"]
        } else {
            &["Keep ours", "Take theirs", "Edit", "Skip"]
        };
        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Resolve {}", entry.file_path))
            .items(items)
            .default(0)
            .interact_on(&self.term)
            .map_err(|e| ConflictError::PromptFailed(e.to_string()))?;

        let choice = match selection {
            0 => Choice::Ours,
            1 => Choice::Theirs,
            2 if !entry.binary => {
                let start = if entry.suggested.is_empty() {
                    &entry.ours_content
                } else {
                    &entry.suggested
                };
                match Editor::new()
                    .edit(start)
                    .map_err(|e| ConflictError::PromptFailed(e.to_string()))?
                {
                    Some(edited) => Choice::Edit(edited),
                    None => Choice::Skip,
                }
            }
            _ => Choice::Skip,
        };
        Ok(choice)
    }
}

/// Unified diff from ours to theirs, coloured for a terminal.
pub fn render_diff(ours: &str, theirs: &str) -> String {
    let patch = diffy::create_patch(ours, theirs).to_string();
    let removed = Style::new().red();
    let added = Style::new().green();
    let hunk = Style::new().cyan();

    patch
        .lines()
        .map(|line| {
            if line.starts_with("---") || line.starts_with("+++") {
                line.to_string()
            } else if line.starts_with('-') {
                removed.apply_to(line).to_string()
            } else if line.starts_with('+') {
                added.apply_to(line).to_string()
            } else if line.starts_with("@@") {
                hunk.apply_to(line).to_string()
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_diff_contains_both_sides() {
        console::set_colors_enabled(false);
        let diff = render_diff("a\nours\nc\n", "a\ntheirs\nc\n");
        assert!(diff.contains("-ours"));
        assert!(diff.contains("+theirs"));
        assert!(diff.contains("@@"));
    }
}
