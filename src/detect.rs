//! Works format detection.
//!
//! Order matters and is fixed: an `MN0` stream wins over `CONTENTS`, and
//! the raw Works 2 signature is only tried on input that is not a compound
//! file at all.

use std::fmt;

use log::debug;

use crate::cursor::{ByteCursor, Source};
use crate::error::{Result, WorksError};
use crate::ole::{CompoundFile, MAGIC};

const MN0_STREAM: &str = "/MN0";
const CONTENTS_STREAM: &str = "/CONTENTS";
const WORKS8_MAGIC: &[u8] = b"CHNKWKS";
const WORKS5_MAGIC: &[u8] = b"CHNKINK";

/// How sure detection is, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Confidence {
    #[default]
    None,
    Poor,
    Likely,
    Good,
    Excellent,
}

/// Layout family: decides which decoder runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// Works 2, 3 and 4: 128-byte pages, 8-bit text.
    Works4,
    /// Works 5, 7 and 8: header index, tagged properties, UTF-16 text.
    Works8,
}

/// A recognized Works word-processor format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Raw DOS file, no container.
    Works2,
    /// `MN0` stream in a compound file.
    Works4,
    /// `CONTENTS` stream tagged `CHNKINK`.
    Works5,
    /// `CONTENTS` stream tagged `CHNKWKS` (also written by Works 7).
    Works8,
}

impl Format {
    pub const fn major(self) -> u8 {
        match self {
            Self::Works2 => 2,
            Self::Works4 => 4,
            Self::Works5 => 5,
            Self::Works8 => 8,
        }
    }

    pub const fn family(self) -> Family {
        match self {
            Self::Works2 | Self::Works4 => Family::Works4,
            Self::Works5 | Self::Works8 => Family::Works8,
        }
    }

    /// Direct signature matches are certain; Works 2 and 5 rest on weaker
    /// evidence.
    pub const fn confidence(self) -> Confidence {
        match self {
            Self::Works4 | Self::Works8 => Confidence::Excellent,
            Self::Works2 | Self::Works5 => Confidence::Good,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Works {}", self.major())
    }
}

/// Result of [`crate::detect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Detection {
    pub format: Option<Format>,
    pub confidence: Confidence,
}

/// The byte stream a decoder reads: the input itself, or a stream copied
/// out of the compound file.
pub(crate) enum Root<S> {
    Raw(ByteCursor<S>),
    Stream(ByteCursor<Vec<u8>>),
}

fn has_container_magic<S: Source>(cursor: &mut ByteCursor<S>) -> Result<bool> {
    cursor.seek_to(0);
    Ok(cursor.read_bytes(MAGIC.len())? == MAGIC)
}

/// Identify the format and locate the document stream.
pub(crate) fn open<S: Source>(mut cursor: ByteCursor<S>) -> Result<(Format, Root<S>)> {
    if has_container_magic(&mut cursor)? {
        let mut file = CompoundFile::open(cursor)?;
        if let Some(data) = file.read_stream(MN0_STREAM)? {
            return Ok((Format::Works4, Root::Stream(ByteCursor::from_vec(data))));
        }
        if let Some(data) = file.read_stream(CONTENTS_STREAM)? {
            let format = match data.get(..7) {
                Some(magic) if magic == WORKS8_MAGIC => Format::Works8,
                Some(magic) if magic == WORKS5_MAGIC => Format::Works5,
                _ => {
                    return Err(WorksError::Unsupported(
                        "CONTENTS stream is not a Works document".into(),
                    ))
                }
            };
            return Ok((format, Root::Stream(ByteCursor::from_vec(data))));
        }
        return Err(WorksError::Unsupported(
            "compound file holds no Works document".into(),
        ));
    }

    cursor.seek_to(0);
    match cursor.read_bytes(2)?[..] {
        [b0, 0xFE] if b0 < 6 => Ok((Format::Works2, Root::Raw(cursor))),
        _ => Err(WorksError::Unsupported("not a Works document".into())),
    }
}

/// Detect the format of `cursor`'s content.
pub fn detect_source<S: Source>(cursor: ByteCursor<S>) -> Detection {
    match open(cursor) {
        Ok((format, _)) => Detection {
            format: Some(format),
            confidence: format.confidence(),
        },
        Err(e) => {
            debug!("detection failed: {e}");
            Detection::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn container(streams: &[(&str, &[u8])]) -> Vec<u8> {
        let mut ole = cfb::CompoundFile::create(Cursor::new(Vec::new())).unwrap();
        for (path, data) in streams {
            let mut stream = ole.create_stream(path).unwrap();
            stream.write_all(data).unwrap();
        }
        ole.into_inner().into_inner()
    }

    fn detect(data: &[u8]) -> Detection {
        detect_source(ByteCursor::from_slice(data))
    }

    #[test]
    fn raw_works2() {
        let mut data = vec![0u8; 0x200];
        data[0] = 0x01;
        data[1] = 0xFE;
        let d = detect(&data);
        assert_eq!(d.format, Some(Format::Works2));
        assert_eq!(d.confidence, Confidence::Good);
    }

    #[test]
    fn raw_junk() {
        assert_eq!(detect(&[0x06, 0xFE, 0, 0]), Detection::default());
        assert_eq!(detect(b"plain text"), Detection::default());
        assert_eq!(detect(&[]), Detection::default());
    }

    #[test]
    fn contents_magic_selects_version() {
        let data = container(&[("/CONTENTS", b"CHNKWKS rest")]);
        assert_eq!(detect(&data).format, Some(Format::Works8));
        assert_eq!(detect(&data).confidence, Confidence::Excellent);

        let data = container(&[("/CONTENTS", b"CHNKINK rest")]);
        assert_eq!(detect(&data).format, Some(Format::Works5));

        let data = container(&[("/CONTENTS", b"CHNKXLS rest")]);
        assert_eq!(detect(&data).format, None);
    }

    #[test]
    fn mn0_wins_over_contents() {
        let data = container(&[("/CONTENTS", b"CHNKWKS"), ("/MN0", &[0u8; 0x100])]);
        let d = detect(&data);
        assert_eq!(d.format, Some(Format::Works4));
        assert_eq!(d.confidence, Confidence::Excellent);
    }

    #[test]
    fn container_without_document() {
        let data = container(&[("/WordDocument", b"nope")]);
        assert!(matches!(
            open(ByteCursor::from_slice(&data)),
            Err(WorksError::Unsupported(_))
        ));
    }

    #[test]
    fn truncated_container_is_not_raw() {
        let mut data = MAGIC.to_vec();
        data.resize(100, 0);
        assert!(matches!(
            open(ByteCursor::from_slice(&data)),
            Err(WorksError::NotContainer)
        ));
    }

    #[test]
    fn confidence_is_ordered() {
        assert!(Confidence::Excellent > Confidence::Good);
        assert!(Confidence::Poor > Confidence::None);
    }

    #[test]
    fn format_properties() {
        assert_eq!(Format::Works2.family(), Family::Works4);
        assert_eq!(Format::Works5.family(), Family::Works8);
        assert_eq!(Format::Works8.major(), 8);
        assert_eq!(Format::Works4.to_string(), "Works 4");
    }
}
