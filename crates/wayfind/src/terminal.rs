use std::fmt::Write as _;
use std::pin::Pin;

use futures_lite::Stream;

use crate::session::View;

/// One line of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Cancel,
    ClearCache,
    Refetch,
    Quit,
    /// The full current content of the input field.
    Text(String),
}

impl Line {
    /// Lines starting with `:` are commands. Unknown commands are searched
    /// for as plain text.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            ":cancel" => Self::Cancel,
            ":clear" => Self::ClearCache,
            ":refetch" => Self::Refetch,
            ":quit" | ":q" => Self::Quit,
            _ => Self::Text(line.to_owned()),
        }
    }
}

/// Lines read from stdin.
pub fn lines() -> Pin<Box<dyn Stream<Item = Line> + Send>> {
    use futures_lite::io::AsyncBufReadExt;
    use futures_lite::StreamExt;

    let stdin = blocking::Unblock::new(std::io::stdin());
    let reader = futures_lite::io::BufReader::new(stdin);
    Box::pin(reader.lines().filter_map(|line| match line {
        Ok(line) => Some(Line::parse(line.trim_end_matches('\r'))),
        Err(e) => {
            tracing::warn!(?e, "failed to read stdin");
            None
        }
    }))
}

/// Successive prefixes of `text`, one per character, as typed by hand.
pub fn keystrokes(text: &str) -> impl Iterator<Item = &str> {
    text.char_indices()
        .map(move |(i, c)| &text[..i + c.len_utf8()])
}

/// Human-readable rendering of a settled view.
#[must_use]
pub fn render(view: &View) -> String {
    let mut out = String::new();
    if let Some(error) = &view.error {
        let _ = writeln!(out, "error: {error}");
        return out;
    }
    if view.suggestions.is_empty() {
        let _ = writeln!(out, "no results for \"{}\"", view.input.trim());
        return out;
    }
    for (i, suggestion) in view.suggestions.iter().enumerate() {
        let _ = write!(out, "{:>2}. {}", i + 1, suggestion.address.label);
        if let Some(distance) = suggestion.distance_label() {
            let _ = write!(out, " ({distance})");
        }
        out.push('\n');
    }
    out
}

/// A view as a single JSON line.
#[must_use]
pub fn render_json(view: &View) -> String {
    match serde_json::to_string(view) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(?e, "failed to serialize view");
            String::new()
        }
    }
}

/// Decides which views reach stdout: each settled request once.
#[derive(Debug, Default)]
pub struct Printer {
    json: bool,
    printed: u64,
}

impl Printer {
    #[must_use]
    pub const fn new(json: bool) -> Self {
        Self { json, printed: 0 }
    }

    /// Rendering of `view` if it is settled and not yet printed.
    pub fn render_settled(&mut self, view: &View) -> Option<String> {
        if view.loading || view.request == self.printed {
            return None;
        }
        self.printed = view.request;
        Some(if self.json {
            render_json(view) + "\n"
        } else {
            render(view)
        })
    }
}
