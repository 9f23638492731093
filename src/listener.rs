//! Document events and the listener interface that receives them.
//!
//! Both format families decode into the same [`DocumentListener`]. During a
//! parse the decoders record [`Event`]s into a buffer; the buffer is replayed
//! to the caller's listener only once the whole document decoded, so a
//! corrupt file never produces partial output.

/// Kind of break inserted into the text flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakKind {
    Page,
    Column,
}

/// A toggleable character attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Bold,
    Italic,
    Underline,
    Strikeout,
    Subscript,
    Superscript,
    Outline,
    Shadow,
    SmallCaps,
    AllCaps,
    Emboss,
    Engrave,
}

/// 24-bit color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Rgb {
    /// From a Windows `COLORREF` value (red in the low byte).
    pub const fn from_colorref(value: u32) -> Self {
        Self {
            red: (value & 0xFF) as u8,
            green: ((value >> 8) & 0xFF) as u8,
            blue: ((value >> 16) & 0xFF) as u8,
        }
    }
}

/// Field inserted in place of a marker character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    PageNumber,
    Date,
    Time,
}

/// Note reference inserted in place of a marker character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteKind {
    Footnote,
    Endnote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

/// Page geometry, in inches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayout {
    pub width: f64,
    pub height: f64,
    pub margin_top: f64,
    pub margin_bottom: f64,
    pub margin_left: f64,
    pub margin_right: f64,
    pub orientation: Orientation,
}

impl Default for PageLayout {
    /// US Letter with one-inch margins.
    fn default() -> Self {
        Self {
            width: 8.5,
            height: 11.0,
            margin_top: 1.0,
            margin_bottom: 1.0,
            margin_left: 1.0,
            margin_right: 1.0,
            orientation: Orientation::Portrait,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Justification {
    #[default]
    Left,
    Center,
    Right,
    Full,
}

impl Justification {
    pub(crate) const fn from_code(code: u32) -> Self {
        match code & 3 {
            1 => Self::Center,
            2 => Self::Right,
            3 => Self::Full,
            _ => Self::Left,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TabAlignment {
    #[default]
    Left,
    Center,
    Right,
    Decimal,
    Bar,
}

impl TabAlignment {
    pub(crate) const fn from_code(code: u32) -> Self {
        match code {
            1 => Self::Center,
            2 => Self::Right,
            3 => Self::Decimal,
            4 => Self::Bar,
            _ => Self::Left,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TabLeader {
    #[default]
    None,
    Dots,
    Hyphens,
    Underline,
    Equals,
}

impl TabLeader {
    pub(crate) const fn from_code(code: u32) -> Self {
        match code {
            1 => Self::Dots,
            2 => Self::Hyphens,
            3 => Self::Underline,
            4 => Self::Equals,
            _ => Self::None,
        }
    }
}

/// One tab stop; position in inches from the left indent.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TabStop {
    pub position: f64,
    pub alignment: TabAlignment,
    pub leader: TabLeader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberingKind {
    Bullet,
    Numbered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Numbering {
    pub kind: NumberingKind,
    /// Format-specific style selector (bullet glyph or number format).
    pub style: u16,
}

/// Paragraph properties; indents in inches.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Paragraph {
    pub justification: Justification,
    pub first_line_indent: f64,
    pub left_indent: f64,
    pub right_indent: f64,
    pub tabs: Vec<TabStop>,
    pub numbering: Option<Numbering>,
}

/// Consumer of decoded document structure. Every method except
/// [`DocumentListener::insert_character`] defaults to a no-op.
pub trait DocumentListener {
    fn start_document(&mut self, _page: &PageLayout) {}
    fn end_document(&mut self) {}
    fn insert_character(&mut self, ch: char);
    fn insert_break(&mut self, _kind: BreakKind) {}
    /// End of the current paragraph.
    fn insert_eol(&mut self) {}
    fn attribute_change(&mut self, _on: bool, _attribute: Attribute) {}
    fn set_text_font(&mut self, _name: &str) {}
    fn set_font_size(&mut self, _points: f32) {}
    fn set_font_color(&mut self, _color: Rgb) {}
    fn set_text_language(&mut self, _lcid: u16) {}
    /// Properties of the paragraph starting at the current position.
    fn set_paragraph(&mut self, _paragraph: &Paragraph) {}
    fn insert_field(&mut self, _kind: FieldKind) {}
    fn insert_note(&mut self, _kind: NoteKind) {}
}

/// A recorded listener call.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    StartDocument(PageLayout),
    EndDocument,
    Character(char),
    Break(BreakKind),
    Eol,
    AttributeChange(bool, Attribute),
    Font(String),
    FontSize(f32),
    FontColor(Rgb),
    Language(u16),
    Paragraph(Paragraph),
    Field(FieldKind),
    Note(NoteKind),
}

impl Event {
    /// Deliver this event to `listener`.
    pub fn replay<L: DocumentListener + ?Sized>(&self, listener: &mut L) {
        match self {
            Self::StartDocument(page) => listener.start_document(page),
            Self::EndDocument => listener.end_document(),
            Self::Character(ch) => listener.insert_character(*ch),
            Self::Break(kind) => listener.insert_break(*kind),
            Self::Eol => listener.insert_eol(),
            Self::AttributeChange(on, attr) => listener.attribute_change(*on, *attr),
            Self::Font(name) => listener.set_text_font(name),
            Self::FontSize(points) => listener.set_font_size(*points),
            Self::FontColor(color) => listener.set_font_color(*color),
            Self::Language(lcid) => listener.set_text_language(*lcid),
            Self::Paragraph(para) => listener.set_paragraph(para),
            Self::Field(kind) => listener.insert_field(*kind),
            Self::Note(kind) => listener.insert_note(*kind),
        }
    }
}

/// Recording listener: every call is appended as an [`Event`].
impl DocumentListener for Vec<Event> {
    fn start_document(&mut self, page: &PageLayout) {
        self.push(Event::StartDocument(*page));
    }
    fn end_document(&mut self) {
        self.push(Event::EndDocument);
    }
    fn insert_character(&mut self, ch: char) {
        self.push(Event::Character(ch));
    }
    fn insert_break(&mut self, kind: BreakKind) {
        self.push(Event::Break(kind));
    }
    fn insert_eol(&mut self) {
        self.push(Event::Eol);
    }
    fn attribute_change(&mut self, on: bool, attribute: Attribute) {
        self.push(Event::AttributeChange(on, attribute));
    }
    fn set_text_font(&mut self, name: &str) {
        self.push(Event::Font(name.to_string()));
    }
    fn set_font_size(&mut self, points: f32) {
        self.push(Event::FontSize(points));
    }
    fn set_font_color(&mut self, color: Rgb) {
        self.push(Event::FontColor(color));
    }
    fn set_text_language(&mut self, lcid: u16) {
        self.push(Event::Language(lcid));
    }
    fn set_paragraph(&mut self, paragraph: &Paragraph) {
        self.push(Event::Paragraph(paragraph.clone()));
    }
    fn insert_field(&mut self, kind: FieldKind) {
        self.push(Event::Field(kind));
    }
    fn insert_note(&mut self, kind: NoteKind) {
        self.push(Event::Note(kind));
    }
}
