//! `batworks`: decoder for Microsoft Works word-processor documents.
//!
//! Reads Works 2 raw files, Works 3/4 (`MN0` stream) and Works 5/7/8
//! (`CONTENTS` stream) compound files and reports their structure to a
//! [`DocumentListener`]: text, paragraph and page breaks, character
//! attributes, fonts and paragraph properties.
//!
//! A parse either succeeds and delivers the whole document, or fails and
//! delivers nothing: events are collected while decoding and only replayed
//! to the listener once the document decoded cleanly.
//!
//! ```no_run
//! use batworks::Event;
//!
//! let data = std::fs::read("letter.wps")?;
//! let mut events: Vec<Event> = Vec::new();
//! batworks::parse(&data, &mut events)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![allow(clippy::redundant_pub_crate)]

mod codepage;
mod cursor;
mod detect;
mod error;
mod fod;
mod listener;
mod ole;
mod style;
mod text;
mod works4;
mod works8;

use std::path::Path;

use log::debug;

pub use cursor::{ByteCursor, FileSource, Source};
pub use detect::{detect_source, Confidence, Detection, Family, Format};
pub use error::{ParseStatus, Result, WorksError};
pub use fod::{Fod, FodReader, FormatConstants, WORKS4_FODS, WORKS8_FODS};
pub use listener::{
    Attribute, BreakKind, DocumentListener, Event, FieldKind, Justification, NoteKind, Numbering,
    NumberingKind, Orientation, PageLayout, Paragraph, Rgb, TabAlignment, TabLeader, TabStop,
};
pub use ole::{CompoundFile, DirectoryEntry, EntryType};
pub use style::AttributeSet;

use detect::Root;

/// Detect the Works format of an in-memory document.
pub fn detect(data: &[u8]) -> Detection {
    detect_source(ByteCursor::from_slice(data))
}

/// Decode an in-memory document into `listener`.
pub fn parse<L: DocumentListener + ?Sized>(data: &[u8], listener: &mut L) -> Result<()> {
    parse_source(ByteCursor::from_slice(data), listener)
}

/// Decode the document at `path` into `listener`, reading through a
/// buffered file source.
pub fn parse_file<L: DocumentListener + ?Sized>(path: impl AsRef<Path>, listener: &mut L) -> Result<()> {
    parse_source(ByteCursor::new(FileSource::open(path)?), listener)
}

/// Decode a document from any byte source into `listener`.
///
/// Nothing reaches the listener unless the whole document decodes.
pub fn parse_source<S: Source, L: DocumentListener + ?Sized>(
    cursor: ByteCursor<S>,
    listener: &mut L,
) -> Result<()> {
    let (format, root) = detect::open(cursor)?;
    debug!("decoding {format}");

    let mut events = Vec::new();
    match root {
        Root::Raw(mut cursor) => decode(format, &mut cursor, &mut events)?,
        Root::Stream(mut cursor) => decode(format, &mut cursor, &mut events)?,
    }

    for event in &events {
        event.replay(listener);
    }
    Ok(())
}

fn decode<S: Source>(format: Format, cursor: &mut ByteCursor<S>, out: &mut Vec<Event>) -> Result<()> {
    match format.family() {
        Family::Works4 => works4::parse(cursor, format.major(), out),
        Family::Works8 => works8::parse(cursor, out),
    }
}
