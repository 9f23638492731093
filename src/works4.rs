//! Works 2, 3 and 4 word-processor documents.
//!
//! The document is one byte stream (the raw file for Works 2, the `MN0`
//! stream for Works 3/4) laid out in 128-byte pages:
//!
//! ```text
//!   0x000    header (end of text, font table, page geometry)
//!   0x100    text, one byte per character
//!   ...      character FOD pages, from the first page boundary past the text
//!   ...      paragraph FOD pages, straight after the character pages
//! ```
//!
//! The font table lives wherever the header points. Works 2 has none and
//! names fonts from a fixed list instead.

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::codepage;
use crate::cursor::{ByteCursor, Source};
use crate::error::{Result, WorksError};
use crate::fod::{Fod, FodReader, WORKS4_FODS};
use crate::listener::{
    BreakKind, Event, Justification, Orientation, PageLayout, Paragraph, TabAlignment, TabLeader,
    TabStop,
};
use crate::style::{emit_delta, AttributeSet};
use crate::text::{self, RunDecoder};

const OFF_END_OF_TEXT: u64 = 0x26;
const OFF_FONT_TABLE: u64 = 0x5E;
const OFF_FONT_TABLE_LEN: u64 = 0x62;
const OFF_GEOMETRY: u64 = 0x64;
const OFF_ORIENTATION: u64 = 0x7A;

/// First byte of text.
const TEXT_START: u32 = 0x100;
const PAGE_SIZE: u64 = 128;
const TWIPS_PER_INCH: f64 = 1440.0;

/// Font size asserted when a property string carries none.
const DEFAULT_FONT_SIZE: f32 = 12.0;
const DEFAULT_BUILTIN_FONT: &str = "Courier";
/// Longest face name Windows allows (`LF_FACESIZE`).
const MAX_FONT_NAME_LEN: usize = 32;

// character property bits, byte 0
const CHP_BOLD: u8 = 0x01;
const CHP_ITALIC: u8 = 0x02;
const CHP_STRIKEOUT: u8 = 0x04;
// byte 1
const CHP_UNDERLINE_ENABLE: u8 = 0x20;
const CHP_POSITION_ENABLE: u8 = 0x40;

/// First tab stop in a paragraph property string.
const PAP_TABS: usize = 22;

/// Fonts known to Works 2, keyed by index.
fn builtin_font(index: u8) -> Option<&'static str> {
    match index {
        0 => Some("Courier"),
        1 => Some("Courier PC"),
        3 => Some("Univers_Scale"),
        4 => Some("Univers"),
        6 => Some("LinePrinterPC"),
        7 => Some("LinePrinter"),
        16 => Some("CGTimes_Scale"),
        24 => Some("CGTimes"),
        _ => None,
    }
}

fn twips(value: u16) -> f64 {
    f64::from(value) / TWIPS_PER_INCH
}

fn signed_twips(value: i16) -> f64 {
    f64::from(value) / TWIPS_PER_INCH
}

#[derive(Debug)]
enum FontTable {
    BuiltIn,
    Indexed(BTreeMap<u8, String>),
}

impl FontTable {
    fn read<S: Source>(cursor: &mut ByteCursor<S>, version: u8, codepage: u16) -> Result<Self> {
        if version < 3 {
            return Ok(Self::BuiltIn);
        }
        cursor.seek_to(OFF_FONT_TABLE);
        let offset = u64::from(cursor.read_u32()?);
        cursor.seek_to(OFF_FONT_TABLE_LEN);
        let length = u64::from(cursor.read_u16()?);
        let end = offset + length;
        if length > 0 && end > cursor.len() {
            return Err(WorksError::parse(format!(
                "font table {offset:#x}+{length:#x} runs past end of stream"
            )));
        }

        let mut fonts = BTreeMap::new();
        cursor.seek_to(offset);
        while length > 0 && cursor.position() < end {
            let index = cursor.read_u8()?;
            let _reserved = cursor.read_u8()?;
            let name_len = usize::from(cursor.read_u8()?);
            if name_len > MAX_FONT_NAME_LEN {
                return Err(WorksError::parse(format!(
                    "font entry {index} claims a {name_len}-byte name"
                )));
            }
            let name = codepage::decode_str(&cursor.read_exact_bytes(name_len)?, codepage);
            if cursor.position() > end {
                return Err(WorksError::parse(format!("font entry {index} overruns the font table")));
            }
            if fonts.insert(index, name).is_some() {
                return Err(WorksError::parse(format!("duplicate font index {index}")));
            }
        }
        debug!("works4: {} fonts", fonts.len());
        Ok(Self::Indexed(fonts))
    }

    fn name(&self, index: u8) -> Result<&str> {
        match self {
            Self::BuiltIn => Ok(builtin_font(index).unwrap_or_else(|| {
                warn!("unknown built-in font {index}, using {DEFAULT_BUILTIN_FONT}");
                DEFAULT_BUILTIN_FONT
            })),
            Self::Indexed(fonts) => fonts
                .get(&index)
                .map(String::as_str)
                .ok_or_else(|| WorksError::parse(format!("font index {index} not in font table"))),
        }
    }
}

struct Header {
    end_of_text: u32,
    page: PageLayout,
}

impl Header {
    fn read<S: Source>(cursor: &mut ByteCursor<S>) -> Result<Self> {
        if cursor.len() < u64::from(TEXT_START) {
            return Err(WorksError::parse("stream too short for a Works header"));
        }
        cursor.seek_to(OFF_END_OF_TEXT);
        let end_of_text = cursor.read_u32()?;
        if end_of_text < TEXT_START || u64::from(end_of_text) > cursor.len() {
            return Err(WorksError::parse(format!(
                "end of text {end_of_text:#x} outside the stream"
            )));
        }
        let page = Self::read_page(cursor)?;
        Ok(Self { end_of_text, page })
    }

    fn read_page<S: Source>(cursor: &mut ByteCursor<S>) -> Result<PageLayout> {
        cursor.seek_to(OFF_GEOMETRY);
        let top = cursor.read_u16()?;
        let bottom = cursor.read_u16()?;
        let left = cursor.read_u16()?;
        let right = cursor.read_u16()?;
        let height = cursor.read_u16()?;
        let width = cursor.read_u16()?;
        cursor.seek_to(OFF_ORIENTATION);
        let orientation = if cursor.read_u8()? == 0 {
            Orientation::Portrait
        } else {
            Orientation::Landscape
        };

        if height == 0 || width == 0 {
            warn!("works4: no page size recorded, assuming letter");
            return Ok(PageLayout {
                orientation,
                ..PageLayout::default()
            });
        }
        if u32::from(top) + u32::from(bottom) > u32::from(height)
            || u32::from(left) + u32::from(right) > u32::from(width)
        {
            return Err(WorksError::parse(format!(
                "margins exceed the {width}x{height} twip page"
            )));
        }
        Ok(PageLayout {
            width: twips(width),
            height: twips(height),
            margin_top: twips(top),
            margin_bottom: twips(bottom),
            margin_left: twips(left),
            margin_right: twips(right),
            orientation,
        })
    }
}

/// Read pages of one FOD kind starting at the cursor until the text is
/// covered.
fn read_fod_pages<S: Source>(cursor: &mut ByteCursor<S>, end_of_text: u32) -> Result<Vec<Fod>> {
    let mut reader = FodReader::new(WORKS4_FODS, end_of_text);
    while reader.read_page(cursor, PAGE_SIZE)? {}
    reader.check_start(TEXT_START)?;
    Ok(reader.into_fods())
}

/// Property and text decoding for one document.
struct Decoder<'a> {
    codepage: u16,
    fonts: &'a FontTable,
    attributes: AttributeSet,
}

impl RunDecoder for Decoder<'_> {
    fn character(&mut self, props: &[u8], out: &mut Vec<Event>) -> Result<()> {
        let mut bits = AttributeSet::empty();
        let b0 = props.first().copied().unwrap_or(0);
        bits.set(AttributeSet::BOLD, b0 & CHP_BOLD != 0);
        bits.set(AttributeSet::ITALIC, b0 & CHP_ITALIC != 0);
        bits.set(AttributeSet::STRIKEOUT, b0 & CHP_STRIKEOUT != 0);

        if let Some(&index) = props.get(2) {
            out.push(Event::Font(self.fonts.name(index)?.to_string()));
        }
        if props.len() >= 4 && props[1] & CHP_UNDERLINE_ENABLE != 0 && props[3] & 0x01 != 0 {
            bits.insert(AttributeSet::UNDERLINE);
        }
        let size = match props.get(4) {
            Some(&half_points) if half_points != 0 => f32::from(half_points) / 2.0,
            _ => DEFAULT_FONT_SIZE,
        };
        out.push(Event::FontSize(size));
        if props.len() >= 6 && props[1] & CHP_POSITION_ENABLE != 0 && props[5] != 0 {
            if props[5] < 0x80 {
                bits.insert(AttributeSet::SUPERSCRIPT);
            } else {
                bits.insert(AttributeSet::SUBSCRIPT);
            }
        }

        self.attributes = emit_delta(self.attributes, bits, out);
        Ok(())
    }

    fn paragraph(&mut self, props: &[u8], out: &mut Vec<Event>) -> Result<()> {
        let i16_at = |at: usize| props.get(at..at + 2).map(|b| i16::from_le_bytes([b[0], b[1]]));

        let mut para = Paragraph::default();
        if let Some(&b1) = props.get(1) {
            para.justification = Justification::from_code(u32::from(b1));
        }
        if let Some(v) = i16_at(4) {
            para.right_indent = signed_twips(v);
        }
        if let Some(v) = i16_at(6) {
            para.left_indent = signed_twips(v);
        }
        if let Some(v) = i16_at(8) {
            para.first_line_indent = signed_twips(v);
        }
        for stop in props.get(PAP_TABS..).unwrap_or_default().chunks_exact(4) {
            let position = u16::from_le_bytes([stop[0], stop[1]]);
            if position == 0 {
                break;
            }
            let flags = u32::from(stop[2]);
            para.tabs.push(TabStop {
                position: twips(position),
                alignment: TabAlignment::from_code(flags & 0x07),
                leader: TabLeader::from_code((flags >> 3) & 0x07),
            });
        }
        out.push(Event::Paragraph(para));
        Ok(())
    }

    fn text(&mut self, bytes: &[u8], out: &mut Vec<Event>) -> Result<()> {
        for &b in bytes {
            match b {
                0x00 => break,
                0x0C => out.push(Event::Break(BreakKind::Page)),
                0x0D => out.push(Event::Eol),
                0x01..=0x1F => {}
                _ => out.push(Event::Character(codepage::decode_byte(b, self.codepage))),
            }
        }
        Ok(())
    }
}

/// Decode an old-family document stream of the given major version.
pub(crate) fn parse<S: Source>(cursor: &mut ByteCursor<S>, version: u8, out: &mut Vec<Event>) -> Result<()> {
    let codepage = codepage::for_version(version);
    let header = Header::read(cursor)?;
    let fonts = FontTable::read(cursor, version, codepage)?;

    let eot = header.end_of_text;
    cursor.seek_to(u64::from(eot).div_ceil(PAGE_SIZE) * PAGE_SIZE);
    let chars = read_fod_pages(cursor, eot)?;
    let paras = read_fod_pages(cursor, eot)?;
    debug!(
        "works{version}: text {TEXT_START:#x}..{eot:#x}, {} character runs, {} paragraphs",
        chars.len(),
        paras.len()
    );

    out.push(Event::StartDocument(header.page));
    let mut decoder = Decoder {
        codepage,
        fonts: &fonts,
        attributes: AttributeSet::empty(),
    };
    text::emit_runs(cursor, &mut decoder, TEXT_START..eot, &chars, &paras, out)?;
    out.push(Event::EndDocument);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fod::tests::old_page;
    use crate::listener::Attribute;

    /// Letter page, one-inch margins.
    const GEOMETRY: [u16; 6] = [1440, 1440, 1440, 1440, 15840, 12240];

    fn put_u16(data: &mut [u8], at: usize, v: u16) {
        data[at..at + 2].copy_from_slice(&v.to_le_bytes());
    }

    fn put_u32(data: &mut [u8], at: usize, v: u32) {
        data[at..at + 4].copy_from_slice(&v.to_le_bytes());
    }

    /// Assemble a stream: header, text, FOD pages, then the font table.
    fn build(text: &[u8], chars: &[Vec<u8>], paras: &[Vec<u8>], fonts: &[u8]) -> Vec<u8> {
        let eot = 0x100 + text.len();
        let mut data = vec![0u8; 0x100];
        put_u32(&mut data, 0x26, eot as u32);
        for (i, v) in GEOMETRY.iter().enumerate() {
            put_u16(&mut data, 0x64 + 2 * i, *v);
        }
        data.extend_from_slice(text);
        data.resize(eot.div_ceil(128) * 128, 0);
        for page in chars.iter().chain(paras) {
            data.extend_from_slice(page);
        }
        if !fonts.is_empty() {
            let at = data.len();
            put_u32(&mut data, 0x5E, at as u32);
            put_u16(&mut data, 0x62, fonts.len() as u16);
            data.extend_from_slice(fonts);
        }
        data
    }

    fn font_entry(index: u8, name: &str) -> Vec<u8> {
        let mut entry = vec![index, 0, name.len() as u8];
        entry.extend_from_slice(name.as_bytes());
        entry
    }

    /// One property-less character page and paragraph page covering `text`.
    fn plain(text: &[u8]) -> Vec<u8> {
        let eot = 0x100 + text.len() as u32;
        build(
            text,
            &[old_page(&[0x100, eot], &[None])],
            &[old_page(&[0x100, eot], &[None])],
            &[],
        )
    }

    fn run(data: &[u8], version: u8) -> Result<Vec<Event>> {
        let mut out = Vec::new();
        parse(&mut ByteCursor::from_slice(data), version, &mut out)?;
        Ok(out)
    }

    fn chars(events: &[Event]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                Event::Character(c) => Some(*c),
                _ => None,
            })
            .collect()
    }

    // ── structure ─────────────────────────────────────────────────

    #[test]
    fn empty_document() {
        let data = build(&[], &[old_page(&[0x100], &[])], &[old_page(&[0x100], &[])], &[]);
        let events = run(&data, 4).unwrap();
        assert_eq!(
            events,
            vec![Event::StartDocument(PageLayout::default()), Event::EndDocument]
        );
    }

    #[test]
    fn plain_paragraph() {
        let events = run(&plain(b"Hi\r"), 4).unwrap();
        assert_eq!(
            events,
            vec![
                Event::StartDocument(PageLayout::default()),
                Event::Paragraph(Paragraph::default()),
                Event::Character('H'),
                Event::Character('i'),
                Event::Eol,
                Event::EndDocument,
            ]
        );
    }

    #[test]
    fn control_bytes() {
        let text = [b'a', 0x01, 0x09, 0x0C, b'b', 0x0D, 0x00, b'c'];
        let events = run(&plain(&text), 4).unwrap();
        assert_eq!(
            &events[2..],
            &[
                Event::Character('a'),
                Event::Break(BreakKind::Page),
                Event::Character('b'),
                Event::Eol,
                Event::EndDocument,
            ]
        );
    }

    #[test]
    fn codepage_follows_version() {
        assert_eq!(chars(&run(&plain(&[0x93]), 4).unwrap()), "\u{201C}");
        assert_eq!(chars(&run(&plain(&[0x82]), 2).unwrap()), "\u{00E9}");
    }

    #[test]
    fn multiple_character_pages() {
        let text = b"abcdef";
        let data = build(
            text,
            &[
                old_page(&[0x100, 0x102], &[Some(&[CHP_BOLD])]),
                old_page(&[0x102, 0x106], &[None]),
            ],
            &[old_page(&[0x100, 0x106], &[None])],
            &[],
        );
        let events = run(&data, 4).unwrap();
        assert_eq!(chars(&events), "abcdef");
        assert!(events.contains(&Event::AttributeChange(true, Attribute::Bold)));
    }

    // ── header ────────────────────────────────────────────────────

    #[test]
    fn landscape_geometry() {
        let mut data = plain(b"x");
        put_u16(&mut data, 0x6C, 12240);
        put_u16(&mut data, 0x6E, 15840);
        data[0x7A] = 1;
        let events = run(&data, 4).unwrap();
        let Event::StartDocument(page) = &events[0] else {
            panic!("no start event");
        };
        assert_eq!(page.width, 11.0);
        assert_eq!(page.orientation, Orientation::Landscape);
    }

    #[test]
    fn margins_larger_than_page_rejected() {
        let mut data = plain(b"x");
        put_u16(&mut data, 0x68, 7000);
        put_u16(&mut data, 0x6A, 7000);
        assert!(matches!(run(&data, 4), Err(WorksError::Parse(_))));
    }

    #[test]
    fn end_of_text_before_text_start_rejected() {
        let mut data = plain(b"x");
        put_u32(&mut data, 0x26, 0x80);
        assert!(matches!(run(&data, 4), Err(WorksError::Parse(_))));
    }

    #[test]
    fn short_stream_rejected() {
        assert!(run(&[0u8; 0x40], 4).is_err());
    }

    #[test]
    fn corrupt_descriptor_count() {
        let mut page = old_page(&[0x100, 0x101], &[None]);
        page[127] = 0x19;
        let data = build(b"x", &[page], &[old_page(&[0x100, 0x101], &[None])], &[]);
        assert!(matches!(run(&data, 4), Err(WorksError::Parse(_))));
    }

    #[test]
    fn character_pages_starting_after_text_rejected() {
        let data = build(
            b"ab",
            &[old_page(&[0x101, 0x102], &[None])],
            &[old_page(&[0x100, 0x102], &[None])],
            &[],
        );
        assert!(matches!(run(&data, 4), Err(WorksError::Parse(_))));
    }

    // ── fonts ─────────────────────────────────────────────────────

    #[test]
    fn font_table_lookup() {
        let mut fonts = font_entry(0, "Arial");
        fonts.extend(font_entry(5, "Times New Roman"));
        let data = build(
            b"ab",
            &[old_page(
                &[0x100, 0x101, 0x102],
                &[Some(&[CHP_BOLD, 0, 5, 0, 24]), Some(&[0, 0, 0])],
            )],
            &[old_page(&[0x100, 0x102], &[None])],
            &fonts,
        );
        let events = run(&data, 4).unwrap();
        assert_eq!(
            &events[1..],
            &[
                Event::Paragraph(Paragraph::default()),
                Event::Font("Times New Roman".into()),
                Event::FontSize(12.0),
                Event::AttributeChange(true, Attribute::Bold),
                Event::Character('a'),
                Event::Font("Arial".into()),
                Event::FontSize(12.0),
                Event::AttributeChange(false, Attribute::Bold),
                Event::Character('b'),
                Event::EndDocument,
            ]
        );
    }

    #[test]
    fn missing_font_index_rejected() {
        let data = build(
            b"a",
            &[old_page(&[0x100, 0x101], &[Some(&[0, 0, 9])])],
            &[old_page(&[0x100, 0x101], &[None])],
            &font_entry(0, "Arial"),
        );
        assert!(matches!(run(&data, 4), Err(WorksError::Parse(_))));
    }

    #[test]
    fn duplicate_font_index_rejected() {
        let mut fonts = font_entry(1, "Arial");
        fonts.extend(font_entry(1, "Courier"));
        let data = build(
            b"a",
            &[old_page(&[0x100, 0x101], &[None])],
            &[old_page(&[0x100, 0x101], &[None])],
            &fonts,
        );
        assert!(matches!(run(&data, 4), Err(WorksError::Parse(_))));
    }

    #[test]
    fn overlong_font_name_rejected() {
        let mut fonts = vec![1, 0, 200];
        fonts.extend(vec![b'A'; 200]);
        let data = build(
            b"a",
            &[old_page(&[0x100, 0x101], &[None])],
            &[old_page(&[0x100, 0x101], &[None])],
            &fonts,
        );
        assert!(matches!(run(&data, 4), Err(WorksError::Parse(_))));
    }

    #[test]
    fn longest_font_name_accepted() {
        let name = "A".repeat(MAX_FONT_NAME_LEN);
        let data = build(
            b"a",
            &[old_page(&[0x100, 0x101], &[Some(&[0, 0, 1])])],
            &[old_page(&[0x100, 0x101], &[None])],
            &font_entry(1, &name),
        );
        let events = run(&data, 4).unwrap();
        assert!(events.contains(&Event::Font(name)));
    }

    #[test]
    fn works2_builtin_fonts() {
        let data = build(
            b"ab",
            &[old_page(&[0x100, 0x101, 0x102], &[Some(&[0, 0, 24]), Some(&[0, 0, 99])])],
            &[old_page(&[0x100, 0x102], &[None])],
            &[],
        );
        let fonts: Vec<_> = run(&data, 2)
            .unwrap()
            .into_iter()
            .filter_map(|e| match e {
                Event::Font(name) => Some(name),
                _ => None,
            })
            .collect();
        assert_eq!(fonts, vec!["CGTimes", "Courier"]);
    }

    // ── character properties ──────────────────────────────────────

    #[test]
    fn underline_and_position() {
        let data = build(
            b"ab",
            &[old_page(
                &[0x100, 0x101, 0x102],
                &[Some(&[0, 0x60, 0, 0x01, 0, 0x10]), Some(&[0, 0x40, 0, 0, 0, 0xF0])],
            )],
            &[old_page(&[0x100, 0x102], &[None])],
            &[],
        );
        let changes: Vec<_> = run(&data, 2)
            .unwrap()
            .into_iter()
            .filter(|e| matches!(e, Event::AttributeChange(..)))
            .collect();
        assert_eq!(
            changes,
            vec![
                Event::AttributeChange(true, Attribute::Underline),
                Event::AttributeChange(true, Attribute::Superscript),
                Event::AttributeChange(false, Attribute::Underline),
                Event::AttributeChange(true, Attribute::Subscript),
                Event::AttributeChange(false, Attribute::Superscript),
            ]
        );
    }

    #[test]
    fn underline_needs_both_bits() {
        let fonts = FontTable::BuiltIn;
        let mut decoder = Decoder {
            codepage: codepage::CP850,
            fonts: &fonts,
            attributes: AttributeSet::empty(),
        };
        let mut out = Vec::new();
        decoder.character(&[0, 0x00, 0, 0x01], &mut out).unwrap();
        assert!(decoder.attributes.is_empty());
        decoder.character(&[0, 0x20, 0, 0x01], &mut out).unwrap();
        assert_eq!(decoder.attributes, AttributeSet::UNDERLINE);
    }

    // ── paragraph properties ──────────────────────────────────────

    #[test]
    fn paragraph_indents_and_tabs() {
        let mut pap = vec![0u8; 30];
        pap[1] = 1;
        pap[4..6].copy_from_slice(&720i16.to_le_bytes());
        pap[6..8].copy_from_slice(&1440i16.to_le_bytes());
        pap[8..10].copy_from_slice(&(-360i16).to_le_bytes());
        pap[22..24].copy_from_slice(&2880u16.to_le_bytes());
        pap[24] = 0x02 | (1 << 3);
        let data = build(
            b"x\r",
            &[old_page(&[0x100, 0x102], &[None])],
            &[old_page(&[0x100, 0x102], &[Some(&pap)])],
            &[],
        );
        let events = run(&data, 4).unwrap();
        assert_eq!(
            events[1],
            Event::Paragraph(Paragraph {
                justification: Justification::Center,
                first_line_indent: -0.25,
                left_indent: 1.0,
                right_indent: 0.5,
                tabs: vec![TabStop {
                    position: 2.0,
                    alignment: TabAlignment::Right,
                    leader: TabLeader::Dots,
                }],
                numbering: None,
            })
        );
    }

    #[test]
    fn each_paragraph_reports_properties() {
        let data = build(
            b"a\rb\r",
            &[old_page(&[0x100, 0x104], &[None])],
            &[old_page(&[0x100, 0x102, 0x104], &[Some(&[0, 2]), None])],
            &[],
        );
        let paras: Vec<_> = run(&data, 4)
            .unwrap()
            .into_iter()
            .filter_map(|e| match e {
                Event::Paragraph(p) => Some(p.justification),
                _ => None,
            })
            .collect();
        assert_eq!(paras, vec![Justification::Right, Justification::Left]);
    }

    #[test]
    fn decoding_twice_is_identical() {
        let data = plain(b"same\rtext");
        assert_eq!(run(&data, 4).unwrap(), run(&data, 4).unwrap());
    }
}
