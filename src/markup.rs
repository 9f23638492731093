//! Markdown inline formatting for styled text runs.
//!
//! Adjacent runs with the same styling are merged before markers are
//! placed, so a bold word split over several runs renders as one `**…**`
//! span. Leading and trailing whitespace is kept outside the markers, where
//! markdown requires it.

/// A text run that can be rendered with markdown inline formatting.
pub(crate) trait InlineRun {
    /// The run's text content.
    fn text(&self) -> &str;
    fn bold(&self) -> bool;
    fn italic(&self) -> bool;
    fn strikeout(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Style {
    bold: bool,
    italic: bool,
    strikeout: bool,
}

impl Style {
    fn of<R: InlineRun>(run: &R) -> Self {
        Self {
            bold: run.bold(),
            italic: run.italic(),
            strikeout: run.strikeout(),
        }
    }

    fn marker(self) -> &'static str {
        match (self.bold, self.italic) {
            (true, true) => "***",
            (true, false) => "**",
            (false, true) => "*",
            (false, false) => "",
        }
    }
}

/// Render a paragraph's runs as markdown.
pub(crate) fn render_runs_markdown<R: InlineRun>(runs: &[R]) -> String {
    let mut out = String::new();
    let mut i = 0;

    while i < runs.len() {
        let style = Style::of(&runs[i]);
        let mut text = String::new();
        while i < runs.len() && Style::of(&runs[i]) == style {
            text.push_str(runs[i].text());
            i += 1;
        }
        format_inline(&text, style, &mut out);
    }

    out
}

/// Wrap `text` in the markers for `style` and append to `out`.
///
/// Whitespace-only text is never wrapped.
fn format_inline(text: &str, style: Style, out: &mut String) {
    let body = text.trim();
    if body.is_empty() {
        out.push_str(text);
        return;
    }
    let lead = &text[..text.len() - text.trim_start().len()];
    let trail = &text[text.trim_end().len()..];

    let strike = if style.strikeout { "~~" } else { "" };
    let marker = style.marker();
    out.push_str(lead);
    out.push_str(strike);
    out.push_str(marker);
    out.push_str(body);
    out.push_str(marker);
    out.push_str(strike);
    out.push_str(trail);
}
