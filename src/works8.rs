//! Works 5, 7 and 8 word-processor documents (the `CONTENTS` stream).
//!
//! The stream opens with a header index: a chain of index pages mapping
//! four-letter zone names to byte ranges of the same stream.
//!
//! ```text
//!   0x00    "CHNKWKS " / "CHNKINK " magic
//!   0x0C    u16 total index entries
//!   0x18    first index page:
//!             u16 0x01F8, u16 entries on this page, u32 next page (or !0)
//!             entries, 0x18 bytes each:
//!               u16 record length, name[4], 6 bytes, name[4], u32 offset, u32 length
//! ```
//!
//! Zones used here: `TEXT` (UTF-16LE text), `FDPC`/`FDPP` (one character or
//! paragraph FOD page each) and `FONT` (the font list). Property strings are
//! tagged records, see [`Tags`].

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use log::{debug, warn};

use crate::cursor::{ByteCursor, Source};
use crate::error::{Result, WorksError};
use crate::fod::{Fod, FodReader, WORKS8_FODS};
use crate::listener::{
    BreakKind, Event, FieldKind, Justification, NoteKind, Numbering, NumberingKind, PageLayout,
    Paragraph, Rgb, TabAlignment, TabLeader, TabStop,
};
use crate::style::{emit_delta, AttributeSet};
use crate::text::{self, RunDecoder};

const OFF_INDEX_COUNT: u64 = 0x0C;
const OFF_INDEX: u64 = 0x18;
const INDEX_PAGE_MAGIC: u16 = 0x01F8;
const MAX_INDEX_ENTRIES: u16 = 0x20;
const INDEX_RECORD_LEN: u64 = 0x18;
const NO_NEXT_PAGE: u32 = 0xFFFF_FFFF;

/// English Metric Units: 914400 per inch, 12700 per point.
const EMU_PER_INCH: f64 = 914_400.0;
const EMU_PER_POINT: f32 = 12_700.0;

// character property tags
const CHAR_BOLD: u16 = 0x0002;
const CHAR_ITALIC: u16 = 0x0003;
const CHAR_OUTLINE: u16 = 0x0004;
const CHAR_SHADOW: u16 = 0x0005;
const CHAR_STRIKEOUT: u16 = 0x0010;
const CHAR_SMALL_CAPS: u16 = 0x0013;
const CHAR_ALL_CAPS: u16 = 0x0014;
const CHAR_EMBOSS: u16 = 0x0016;
const CHAR_ENGRAVE: u16 = 0x0017;
const CHAR_POSITION: u16 = 0x100F;
const CHAR_LANGUAGE: u16 = 0x1012;
const CHAR_UNDERLINE: u16 = 0x101E;
const CHAR_FIELD: u16 = 0x1020;
const CHAR_FONT: u16 = 0x1024;
const CHAR_SIZE: u16 = 0x200C;
const CHAR_COLOR: u16 = 0x2022;

// paragraph property tags
const PARA_JUSTIFY: u16 = 0x1031;
const PARA_RIGHT_INDENT: u16 = 0x2033;
const PARA_LEFT_INDENT: u16 = 0x2034;
const PARA_FIRST_INDENT: u16 = 0x2035;
const PARA_NUMBERING_TYPE: u16 = 0x1037;
const PARA_NUMBERING_STYLE: u16 = 0x1038;
const PARA_TABS: u16 = 0x8039;

// tab stop sub-records
const TAB_POSITION: u16 = 0x2001;
const TAB_ALIGNMENT: u16 = 0x1002;
const TAB_LEADER: u16 = 0x1003;

/// Marker byte of a toggle that is switched on.
const TOGGLE_ON: u8 = 0x0A;

/// Placeholder character resolved through the field selector.
const SPECIAL_MARKER: u16 = 0x23;

fn emu_to_inches(value: u32) -> f64 {
    // indents are stored as signed 32-bit values
    f64::from(value as i32) / EMU_PER_INCH
}

// ── header index ──────────────────────────────────────────────────────

/// Byte range of one zone within the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Zone {
    pub offset: u32,
    pub length: u32,
}

impl Zone {
    fn end(self) -> u64 {
        u64::from(self.offset) + u64::from(self.length)
    }
}

/// Zone name to zone ranges, in index order. Names may repeat.
#[derive(Debug, Default)]
pub(crate) struct HeaderIndex {
    zones: BTreeMap<String, Vec<Zone>>,
}

impl HeaderIndex {
    pub(crate) fn read<S: Source>(cursor: &mut ByteCursor<S>) -> Result<Self> {
        cursor.seek_to(OFF_INDEX_COUNT);
        let mut remaining = cursor.read_u16()?;
        let mut index = Self::default();
        let mut page_at = OFF_INDEX;
        let mut visited = BTreeSet::new();

        while remaining > 0 {
            if !visited.insert(page_at) {
                return Err(WorksError::parse(format!(
                    "header index page {page_at:#x} visited twice"
                )));
            }
            cursor.seek_to(page_at);
            let magic = cursor.read_u16()?;
            if magic != INDEX_PAGE_MAGIC {
                return Err(WorksError::parse(format!(
                    "bad header index page magic {magic:#06x} at {page_at:#x}"
                )));
            }
            let local = cursor.read_u16()?;
            if local > MAX_INDEX_ENTRIES {
                return Err(WorksError::parse(format!(
                    "header index page at {page_at:#x} claims {local} entries"
                )));
            }
            let next = cursor.read_u32()?;

            for _ in 0..local.min(remaining) {
                let (name, zone) = Self::read_record(cursor)?;
                index.zones.entry(name).or_default().push(zone);
                remaining -= 1;
            }
            if remaining > 0 {
                if next == NO_NEXT_PAGE {
                    return Err(WorksError::parse(format!(
                        "header index ends with {remaining} entries missing"
                    )));
                }
                page_at = u64::from(next);
            }
        }

        debug!(
            "works8: zones {}",
            index
                .zones
                .iter()
                .map(|(name, z)| format!("{name}x{}", z.len()))
                .collect::<Vec<_>>()
                .join(" ")
        );
        Ok(index)
    }

    fn read_record<S: Source>(cursor: &mut ByteCursor<S>) -> Result<(String, Zone)> {
        let start = cursor.position();
        let declared = u64::from(cursor.read_u16()?);
        let name = cursor.read_exact_bytes(4)?;
        if !name.iter().all(|&b| b.is_ascii_alphanumeric() || b == b' ') {
            return Err(WorksError::parse(format!(
                "header index entry at {start:#x} has implausible name {name:02x?}"
            )));
        }
        cursor.seek_to(start + 12);
        let _copy = cursor.read_exact_bytes(4)?;
        let offset = cursor.read_u32()?;
        let length = cursor.read_u32()?;
        cursor.seek_to(start + declared.max(INDEX_RECORD_LEN));
        let name = String::from_utf8_lossy(&name).into_owned();
        Ok((name, Zone { offset, length }))
    }

    pub(crate) fn first(&self, name: &str) -> Option<Zone> {
        self.all(name).first().copied()
    }

    pub(crate) fn all(&self, name: &str) -> &[Zone] {
        self.zones.get(name).map(Vec::as_slice).unwrap_or_default()
    }
}

// ── fonts ─────────────────────────────────────────────────────────────

fn read_fonts<S: Source>(cursor: &mut ByteCursor<S>, zone: Option<Zone>) -> Result<Vec<String>> {
    let Some(zone) = zone else {
        return Ok(Vec::new());
    };
    let end = zone.end();
    cursor.seek_to(u64::from(zone.offset) + 4);
    let count = cursor.read_u32()?;

    let mut fonts = Vec::new();
    let mut pos = u64::from(zone.offset) + 0x10 + 4 * u64::from(count);
    while fonts.len() < count as usize && pos + 2 <= end {
        cursor.seek_to(pos);
        let units = u64::from(cursor.read_u16()?);
        let name_end = pos + 2 + 2 * units;
        if name_end > end {
            break;
        }
        let mut name = Vec::with_capacity(units as usize);
        for _ in 0..units {
            name.push(cursor.read_u16()?);
        }
        fonts.push(String::from_utf16_lossy(&name));
        pos = name_end;
    }
    if fonts.len() != count as usize {
        warn!("font zone declares {count} fonts, found {}", fonts.len());
    }
    debug!("works8: fonts {fonts:?}");
    Ok(fonts)
}

// ── FOD zones ─────────────────────────────────────────────────────────

/// Read one FOD page per zone, in index order.
fn read_fod_zones<S: Source>(
    cursor: &mut ByteCursor<S>,
    zones: &[Zone],
    text: Range<u32>,
    kind: &str,
) -> Result<Vec<Fod>> {
    let end_of_text = text.end;
    let mut reader = FodReader::new(WORKS8_FODS, end_of_text);
    let mut more = true;
    for (i, zone) in zones.iter().enumerate() {
        if !more {
            warn!("ignoring {} {kind} pages past the end of text", zones.len() - i);
            break;
        }
        cursor.seek_to(u64::from(zone.offset));
        more = reader.read_page(cursor, u64::from(zone.length))?;
    }
    if more && !zones.is_empty() {
        warn!(
            "{kind} pages end at {:#x}, before the end of text {end_of_text:#x}",
            reader.last_limit().unwrap_or(0)
        );
    }
    reader.check_start(text.start)?;
    Ok(reader.into_fods())
}

// ── tagged properties ─────────────────────────────────────────────────

/// Payload of a tagged record; the tag's high nibble picks the shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Value<'a> {
    Marker(u8),
    Short(u16),
    Long(u32),
    Bytes(&'a [u8]),
}

impl Value<'_> {
    fn number(self) -> u32 {
        match self {
            Self::Marker(v) => u32::from(v),
            Self::Short(v) => u32::from(v),
            Self::Long(v) => v,
            Self::Bytes(_) => 0,
        }
    }

    fn is_on(self) -> bool {
        self == Self::Marker(TOGGLE_ON)
    }
}

/// Iterator over `(tag, value)` records of a property string.
///
/// Record length follows from the tag's high nibble: 0 one marker byte,
/// 1 a u16, 2 a u32, 8 a length byte and that many bytes. Any other
/// category makes the rest of the string unreadable.
struct Tags<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Tags<'a> {
    /// Top-level property string, which must open with three zero bytes.
    fn new(props: &'a [u8]) -> Result<Self> {
        if props.len() < 3 || props[..3] != [0, 0, 0] {
            return Err(WorksError::parse(format!(
                "property string {props:02x?} lacks the zero prefix"
            )));
        }
        Ok(Self { data: props, pos: 3 })
    }

    fn nested(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn record(&self) -> Result<(u16, Value<'a>, usize)> {
        let data: &'a [u8] = self.data;
        let rest = &data[self.pos..];
        let truncated = || WorksError::parse(format!("truncated property record {rest:02x?}"));
        let tag_bytes = rest.get(..2).ok_or_else(truncated)?;
        let tag = u16::from_le_bytes([tag_bytes[0], tag_bytes[1]]);
        let body = &rest[2..];
        let (value, used) = match tag >> 12 {
            0 => (Value::Marker(*body.first().ok_or_else(truncated)?), 1),
            1 => {
                let b = body.get(..2).ok_or_else(truncated)?;
                (Value::Short(u16::from_le_bytes([b[0], b[1]])), 2)
            }
            2 => {
                let b = body.get(..4).ok_or_else(truncated)?;
                (Value::Long(u32::from_le_bytes([b[0], b[1], b[2], b[3]])), 4)
            }
            8 => {
                let len = usize::from(*body.first().ok_or_else(truncated)?);
                (Value::Bytes(body.get(1..1 + len).ok_or_else(truncated)?), 1 + len)
            }
            category => {
                return Err(WorksError::parse(format!(
                    "property tag {tag:#06x} has unknown length category {category}"
                )))
            }
        };
        Ok((tag, value, 2 + used))
    }
}

impl<'a> Iterator for Tags<'a> {
    type Item = Result<(u16, Value<'a>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }
        match self.record() {
            Ok((tag, value, used)) => {
                self.pos += used;
                Some(Ok((tag, value)))
            }
            Err(e) => {
                self.pos = self.data.len();
                Some(Err(e))
            }
        }
    }
}

fn read_tabs(value: Value<'_>) -> Result<Vec<TabStop>> {
    let Value::Bytes(payload) = value else {
        return Ok(Vec::new());
    };
    let count = match payload {
        [lo, hi, ..] => usize::from(u16::from_le_bytes([*lo, *hi])),
        _ => return Err(WorksError::parse("tab stop list without a count")),
    };

    let mut tabs: Vec<TabStop> = Vec::with_capacity(count);
    for record in Tags::nested(&payload[2..]) {
        let (tag, value) = record?;
        match (tag, tabs.last_mut()) {
            (TAB_POSITION, _) => tabs.push(TabStop {
                position: emu_to_inches(value.number()),
                ..TabStop::default()
            }),
            (TAB_ALIGNMENT, Some(stop)) => stop.alignment = TabAlignment::from_code(value.number()),
            (TAB_LEADER, Some(stop)) => stop.leader = TabLeader::from_code(value.number()),
            _ => warn!("skipping tab record {tag:#06x}"),
        }
    }
    if tabs.len() != count {
        warn!("tab list declares {count} stops, found {}", tabs.len());
    }
    Ok(tabs)
}

/// What the placeholder character stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Special {
    Note(NoteKind),
    Field(FieldKind),
}

impl Special {
    const fn from_selector(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Note(NoteKind::Footnote)),
            2 => Some(Self::Note(NoteKind::Endnote)),
            3 => Some(Self::Field(FieldKind::PageNumber)),
            4 => Some(Self::Field(FieldKind::Date)),
            5 => Some(Self::Field(FieldKind::Time)),
            _ => None,
        }
    }
}

// ── decoding ──────────────────────────────────────────────────────────

struct Decoder<'a> {
    fonts: &'a [String],
    attributes: AttributeSet,
    special: Option<Special>,
    high_surrogate: Option<u16>,
    odd_byte: Option<u8>,
}

impl<'a> Decoder<'a> {
    fn new(fonts: &'a [String]) -> Self {
        Self {
            fonts,
            attributes: AttributeSet::empty(),
            special: None,
            high_surrogate: None,
            odd_byte: None,
        }
    }

    fn unit(&mut self, unit: u16, out: &mut Vec<Event>) -> Result<()> {
        if let Some(high) = self.high_surrogate.take() {
            if !(0xDC00..=0xDFFF).contains(&unit) {
                return Err(WorksError::parse(format!(
                    "high surrogate {high:#06x} followed by {unit:#06x}"
                )));
            }
            let code = 0x10000 + ((u32::from(high) - 0xD800) << 10) + (u32::from(unit) - 0xDC00);
            let ch = char::from_u32(code)
                .ok_or_else(|| WorksError::parse(format!("bad code point {code:#x}")))?;
            out.push(Event::Character(ch));
            return Ok(());
        }

        match unit {
            0xD800..=0xDBFF => self.high_surrogate = Some(unit),
            0xDC00..=0xDFFF => {
                return Err(WorksError::parse(format!("unpaired low surrogate {unit:#06x}")));
            }
            0x0A | 0x0C | 0x1E | 0x1F => {}
            0x0D => out.push(Event::Eol),
            0x0E => out.push(Event::Break(BreakKind::Column)),
            SPECIAL_MARKER => out.push(match self.special {
                Some(Special::Note(kind)) => Event::Note(kind),
                Some(Special::Field(kind)) => Event::Field(kind),
                None => Event::Character('#'),
            }),
            _ => out.push(Event::Character(
                char::from_u32(u32::from(unit)).unwrap_or(char::REPLACEMENT_CHARACTER),
            )),
        }
        Ok(())
    }
}

impl RunDecoder for Decoder<'_> {
    fn character_run(&mut self) {
        self.special = None;
    }

    fn character(&mut self, props: &[u8], out: &mut Vec<Event>) -> Result<()> {
        let mut bits = AttributeSet::empty();
        for record in Tags::new(props)? {
            let (tag, value) = record?;
            let toggle = match tag {
                CHAR_BOLD => Some(AttributeSet::BOLD),
                CHAR_ITALIC => Some(AttributeSet::ITALIC),
                CHAR_OUTLINE => Some(AttributeSet::OUTLINE),
                CHAR_SHADOW => Some(AttributeSet::SHADOW),
                CHAR_STRIKEOUT => Some(AttributeSet::STRIKEOUT),
                CHAR_SMALL_CAPS => Some(AttributeSet::SMALL_CAPS),
                CHAR_ALL_CAPS => Some(AttributeSet::ALL_CAPS),
                CHAR_EMBOSS => Some(AttributeSet::EMBOSS),
                CHAR_ENGRAVE => Some(AttributeSet::ENGRAVE),
                _ => None,
            };
            if let Some(bit) = toggle {
                bits.set(bit, value.is_on());
                continue;
            }

            match tag {
                CHAR_POSITION => match value.number() {
                    1 => bits.insert(AttributeSet::SUPERSCRIPT),
                    2 => bits.insert(AttributeSet::SUBSCRIPT),
                    _ => {}
                },
                CHAR_UNDERLINE => bits.set(AttributeSet::UNDERLINE, value.number() != 0),
                CHAR_SIZE => out.push(Event::FontSize(value.number() as f32 / EMU_PER_POINT)),
                CHAR_COLOR => out.push(Event::FontColor(Rgb::from_colorref(value.number()))),
                CHAR_LANGUAGE => out.push(Event::Language(value.number() as u16)),
                CHAR_FIELD => self.special = Special::from_selector(value.number()),
                CHAR_FONT => {
                    let index = value.number() as usize;
                    let name = self.fonts.get(index).ok_or_else(|| {
                        WorksError::parse(format!(
                            "font index {index} past the {} known fonts",
                            self.fonts.len()
                        ))
                    })?;
                    out.push(Event::Font(name.clone()));
                }
                _ => warn!("skipping character property {tag:#06x}"),
            }
        }
        self.attributes = emit_delta(self.attributes, bits, out);
        Ok(())
    }

    fn paragraph(&mut self, props: &[u8], out: &mut Vec<Event>) -> Result<()> {
        let mut para = Paragraph::default();
        if props.is_empty() {
            out.push(Event::Paragraph(para));
            return Ok(());
        }

        let mut numbering_kind = None;
        let mut numbering_style = 0;
        for record in Tags::new(props)? {
            let (tag, value) = record?;
            match tag {
                PARA_JUSTIFY => para.justification = Justification::from_code(value.number()),
                PARA_FIRST_INDENT => para.first_line_indent = emu_to_inches(value.number()),
                PARA_LEFT_INDENT => para.left_indent = emu_to_inches(value.number()),
                PARA_RIGHT_INDENT => para.right_indent = emu_to_inches(value.number()),
                PARA_NUMBERING_TYPE => {
                    numbering_kind = match value.number() {
                        1 => Some(NumberingKind::Bullet),
                        2 => Some(NumberingKind::Numbered),
                        _ => None,
                    }
                }
                PARA_NUMBERING_STYLE => numbering_style = value.number() as u16,
                PARA_TABS => para.tabs = read_tabs(value)?,
                _ => warn!("skipping paragraph property {tag:#06x}"),
            }
        }
        para.numbering = numbering_kind.map(|kind| Numbering {
            kind,
            style: numbering_style,
        });
        out.push(Event::Paragraph(para));
        Ok(())
    }

    fn text(&mut self, bytes: &[u8], out: &mut Vec<Event>) -> Result<()> {
        let mut bytes = bytes;
        if let Some(low) = self.odd_byte.take() {
            match bytes.split_first() {
                Some((&high, rest)) => {
                    self.unit(u16::from_le_bytes([low, high]), out)?;
                    bytes = rest;
                }
                None => self.odd_byte = Some(low),
            }
        }
        let mut pairs = bytes.chunks_exact(2);
        for pair in &mut pairs {
            self.unit(u16::from_le_bytes([pair[0], pair[1]]), out)?;
        }
        if let [b] = pairs.remainder() {
            self.odd_byte = Some(*b);
        }
        Ok(())
    }

    fn finish(&mut self, _out: &mut Vec<Event>) -> Result<()> {
        if let Some(high) = self.high_surrogate {
            return Err(WorksError::parse(format!(
                "text ends inside a surrogate pair ({high:#06x})"
            )));
        }
        if let Some(b) = self.odd_byte {
            warn!("ignoring odd trailing text byte {b:#04x}");
        }
        Ok(())
    }
}

/// Decode a Works 5/7/8 `CONTENTS` stream.
pub(crate) fn parse<S: Source>(cursor: &mut ByteCursor<S>, out: &mut Vec<Event>) -> Result<()> {
    let index = HeaderIndex::read(cursor)?;
    let text = index
        .first("TEXT")
        .ok_or_else(|| WorksError::parse("document has no TEXT zone"))?;
    let end_of_text = text
        .offset
        .checked_add(text.length)
        .filter(|&end| u64::from(end) <= cursor.len())
        .ok_or_else(|| {
            WorksError::parse(format!(
                "TEXT zone {:#x}+{:#x} runs past end of stream",
                text.offset, text.length
            ))
        })?;

    let fonts = read_fonts(cursor, index.first("FONT"))?;
    let range = text.offset..end_of_text;
    let chars = read_fod_zones(cursor, index.all("FDPC"), range.clone(), "character")?;
    let paras = read_fod_zones(cursor, index.all("FDPP"), range.clone(), "paragraph")?;
    debug!(
        "works8: text {:#x}..{end_of_text:#x}, {} character runs, {} paragraphs",
        text.offset,
        chars.len(),
        paras.len()
    );

    out.push(Event::StartDocument(PageLayout::default()));
    let mut decoder = Decoder::new(&fonts);
    text::emit_runs(cursor, &mut decoder, range, &chars, &paras, out)?;
    out.push(Event::EndDocument);
    Ok(())
}
