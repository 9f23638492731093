//! Listener that turns decoded documents into plain text or markdown.

use batworks::{
    Attribute, AttributeSet, BreakKind, DocumentListener, FieldKind, NoteKind, NumberingKind,
    Paragraph,
};

use crate::markup::{self, InlineRun};

#[derive(Debug, Default)]
struct Run {
    text: String,
    attributes: AttributeSet,
}

impl InlineRun for Run {
    fn text(&self) -> &str {
        &self.text
    }
    fn bold(&self) -> bool {
        self.attributes.contains(AttributeSet::BOLD)
    }
    fn italic(&self) -> bool {
        self.attributes.contains(AttributeSet::ITALIC)
    }
    fn strikeout(&self) -> bool {
        self.attributes.contains(AttributeSet::STRIKEOUT)
    }
}

/// Collects one document's text, paragraph by paragraph.
#[derive(Debug, Default)]
pub(crate) struct Renderer {
    markdown: bool,
    out: String,
    runs: Vec<Run>,
    attributes: AttributeSet,
    paragraph: Paragraph,
    /// Number of the next item in the current numbered list.
    list_number: u32,
    in_list: bool,
    notes: u32,
}

impl Renderer {
    pub(crate) fn new(markdown: bool) -> Self {
        Self {
            markdown,
            ..Self::default()
        }
    }

    /// The rendered document.
    pub(crate) fn finish(mut self) -> String {
        if !self.runs.is_empty() {
            self.flush_paragraph();
        }
        self.out
    }

    fn push_text(&mut self, text: &str) {
        match self.runs.last_mut() {
            Some(run) if run.attributes == self.attributes => run.text.push_str(text),
            _ => self.runs.push(Run {
                text: text.to_string(),
                attributes: self.attributes,
            }),
        }
    }

    fn flush_paragraph(&mut self) {
        let runs = std::mem::take(&mut self.runs);
        if !self.markdown {
            let line: String = runs.iter().map(|r| r.text.as_str()).collect();
            self.out.push_str(line.trim_end());
            self.out.push('\n');
            return;
        }

        let body = markup::render_runs_markdown(&runs);
        let body = body.trim_end();
        if body.trim().is_empty() {
            return;
        }
        match self.paragraph.numbering.map(|n| n.kind) {
            Some(kind) => {
                let prefix = match kind {
                    NumberingKind::Bullet => "- ".to_string(),
                    NumberingKind::Numbered => {
                        self.list_number += 1;
                        format!("{}. ", self.list_number)
                    }
                };
                self.in_list = true;
                self.out.push_str(&prefix);
                self.out.push_str(body.trim_start());
                self.out.push('\n');
            }
            None => {
                if self.in_list {
                    self.out.push('\n');
                    self.in_list = false;
                }
                self.list_number = 0;
                self.out.push_str(body);
                self.out.push_str("\n\n");
            }
        }
    }
}

impl DocumentListener for Renderer {
    fn insert_character(&mut self, ch: char) {
        let mut buf = [0u8; 4];
        self.push_text(ch.encode_utf8(&mut buf));
    }

    fn insert_eol(&mut self) {
        self.flush_paragraph();
    }

    fn insert_break(&mut self, kind: BreakKind) {
        if kind != BreakKind::Page {
            return;
        }
        if !self.runs.is_empty() {
            self.flush_paragraph();
        }
        if self.markdown {
            self.out.push_str("---\n\n");
        } else {
            self.out.push_str("\x0C\n");
        }
    }

    fn attribute_change(&mut self, on: bool, attribute: Attribute) {
        self.attributes.set(AttributeSet::from(attribute), on);
    }

    fn set_paragraph(&mut self, paragraph: &Paragraph) {
        self.paragraph = paragraph.clone();
    }

    fn insert_field(&mut self, kind: FieldKind) {
        self.push_text(match kind {
            FieldKind::PageNumber => "{PAGE}",
            FieldKind::Date => "{DATE}",
            FieldKind::Time => "{TIME}",
        });
    }

    fn insert_note(&mut self, kind: NoteKind) {
        self.notes += 1;
        let marker = match (self.markdown, kind) {
            (true, _) => format!("[^{}]", self.notes),
            (false, NoteKind::Footnote) => format!("[{}]", self.notes),
            (false, NoteKind::Endnote) => format!("[e{}]", self.notes),
        };
        self.push_text(&marker);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batworks::{Event, Numbering};

    fn render(markdown: bool, events: &[Event]) -> String {
        let mut r = Renderer::new(markdown);
        for e in events {
            e.replay(&mut r);
        }
        r.finish()
    }

    fn text(s: &str) -> Vec<Event> {
        s.chars()
            .map(|c| if c == '\n' { Event::Eol } else { Event::Character(c) })
            .collect()
    }

    fn numbered() -> Event {
        Event::Paragraph(Paragraph {
            numbering: Some(Numbering {
                kind: NumberingKind::Numbered,
                style: 0,
            }),
            ..Paragraph::default()
        })
    }

    #[test]
    fn plain_lines() {
        let mut events = text("one\n\ntwo  \n");
        events.push(Event::Break(BreakKind::Page));
        events.extend(text("three"));
        assert_eq!(render(false, &events), "one\n\ntwo\n\x0C\nthree\n");
    }

    #[test]
    fn markdown_bold_run() {
        let mut events = text("a ");
        events.push(Event::AttributeChange(true, Attribute::Bold));
        events.extend(text("b"));
        events.push(Event::AttributeChange(false, Attribute::Bold));
        events.extend(text(" c\n\n"));
        assert_eq!(render(true, &events), "a **b** c\n\n");
    }

    #[test]
    fn markdown_numbered_list() {
        let mut events = vec![numbered()];
        events.extend(text("first\n"));
        events.push(numbered());
        events.extend(text("second\n"));
        events.push(Event::Paragraph(Paragraph::default()));
        events.extend(text("after\n"));
        assert_eq!(render(true, &events), "1. first\n2. second\n\nafter\n\n");
    }

    #[test]
    fn fields_and_notes() {
        let events = vec![
            Event::Field(FieldKind::PageNumber),
            Event::Character(' '),
            Event::Note(NoteKind::Footnote),
            Event::Eol,
        ];
        assert_eq!(render(true, &events), "{PAGE} [^1]\n\n");
        assert_eq!(render(false, &events), "{PAGE} [1]\n");
    }
}
