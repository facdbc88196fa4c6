use std::borrow::Cow;
use std::io::Write;

use crossterm::style::Stylize;
use regex::Regex;

use lokicli_types::{LogEntry, Result};

/// Separator printed between disjoint context groups
pub const GROUP_SEPARATOR: &str = "---";

/// Marks regex matches inside log text
#[derive(Clone, Debug, Default)]
pub struct Highlighter {
    regex: Option<Regex>,
}

impl Highlighter {
    /// Compile `pattern` for highlighting.
    ///
    /// The service speaks RE2; a pattern this engine cannot compile just
    /// disables highlighting.
    pub fn new(pattern: Option<&str>) -> Self {
        let regex = pattern
            .filter(|p| !p.is_empty())
            .and_then(|p| match Regex::new(p) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    tracing::warn!("Highlighting disabled, cannot compile '{}': {}", p, e);
                    None
                }
            });
        Self { regex }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    /// Check if a pattern is active
    pub fn has_pattern(&self) -> bool {
        self.regex.is_some()
    }

    /// Find all match positions in a string
    pub fn find_matches(&self, text: &str) -> Vec<(usize, usize)> {
        match &self.regex {
            Some(re) => re
                .find_iter(text)
                .filter(|m| !m.is_empty())
                .map(|m| (m.start(), m.end()))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Wrap every match in highlight styling; unmatched text is borrowed
    pub fn highlight<'t>(&self, text: &'t str) -> Cow<'t, str> {
        let matches = self.find_matches(text);
        if matches.is_empty() {
            return Cow::Borrowed(text);
        }

        // Splice from the last match so earlier offsets stay valid
        let mut highlighted = text.to_string();
        for (start, end) in matches.into_iter().rev() {
            let styled = format!("{}", text[start..end].red().bold());
            highlighted.replace_range(start..end, &styled);
        }
        Cow::Owned(highlighted)
    }
}

/// Writes log lines to an output stream
pub struct Presenter<W: Write> {
    out: W,
    highlighter: Highlighter,
    lines: usize,
}

impl<W: Write> Presenter<W> {
    pub fn new(out: W, highlighter: Highlighter) -> Self {
        Self {
            out,
            highlighter,
            lines: 0,
        }
    }

    /// Print entries in the given order, one per line
    pub fn print(&mut self, entries: &[LogEntry]) -> Result<()> {
        for entry in entries {
            let text = entry.text.strip_suffix('\n').unwrap_or(&entry.text);
            writeln!(self.out, "{}", self.highlighter.highlight(text))?;
            self.lines += 1;
        }
        self.out.flush()?;
        Ok(())
    }

    pub fn separator(&mut self) -> Result<()> {
        writeln!(self.out, "{}", GROUP_SEPARATOR)?;
        Ok(())
    }

    /// Log lines written so far, separators excluded
    pub fn lines_written(&self) -> usize {
        self.lines
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_matches() {
        let highlighter = Highlighter::new(Some("error"));
        let matches = highlighter.find_matches("an error occurred, another error here");
        assert_eq!(matches, vec![(3, 8), (27, 32)]);
    }

    #[test]
    fn test_highlight_wraps_each_match() {
        let highlighter = Highlighter::new(Some(r"\d+"));
        let text = "took 15ms after 3 retries";

        let expected = format!(
            "took {}ms after {} retries",
            "15".red().bold(),
            "3".red().bold()
        );
        assert_eq!(highlighter.highlight(text), expected);
    }

    #[test]
    fn test_no_match_is_unmodified() {
        let highlighter = Highlighter::new(Some("panic"));
        assert!(matches!(highlighter.highlight("all good"), Cow::Borrowed("all good")));
    }

    #[test]
    fn test_no_pattern_is_unmodified() {
        assert!(!Highlighter::new(None).has_pattern());
        assert!(!Highlighter::new(Some("")).has_pattern());
        assert_eq!(Highlighter::disabled().highlight("x"), "x");
    }

    #[test]
    fn test_invalid_pattern_disables_highlighting() {
        let highlighter = Highlighter::new(Some("(unclosed"));
        assert!(!highlighter.has_pattern());
        assert_eq!(highlighter.highlight("(unclosed"), "(unclosed");
    }

    #[test]
    fn test_presenter_writes_lines() {
        let mut presenter = Presenter::new(Vec::new(), Highlighter::disabled());
        presenter
            .print(&[LogEntry::new(2, "second\n"), LogEntry::new(1, "first")])
            .unwrap();
        presenter.separator().unwrap();
        presenter.print(&[]).unwrap();

        assert_eq!(presenter.lines_written(), 2);
        let out = String::from_utf8(presenter.into_inner()).unwrap();
        assert_eq!(out, "second\nfirst\n---\n");
    }
}
