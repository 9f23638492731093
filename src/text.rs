//! Text/run emitter shared by both format families.
//!
//! Walks the text range once, splitting it at every character-FOD and
//! paragraph-FOD boundary (each step advances to the nearer of the two
//! limits). Paragraph properties are decoded at the start of each paragraph
//! run and character properties at the start of each character run; the raw
//! bytes in between go to the family's text decoder.

use std::ops::Range;

use crate::cursor::{ByteCursor, Source};
use crate::error::Result;
use crate::fod::Fod;
use crate::listener::Event;

/// Family-specific decoding hooks driven by [`emit_runs`].
pub(crate) trait RunDecoder {
    /// Decode a paragraph property string (empty = defaults).
    fn paragraph(&mut self, properties: &[u8], out: &mut Vec<Event>) -> Result<()>;

    /// Called at the start of every character run, before
    /// [`character`](Self::character) and whether or not the run has
    /// properties.
    fn character_run(&mut self) {}

    /// Decode a non-empty character property string.
    fn character(&mut self, properties: &[u8], out: &mut Vec<Event>) -> Result<()>;

    /// Decode one run of raw text bytes.
    fn text(&mut self, bytes: &[u8], out: &mut Vec<Event>) -> Result<()>;

    /// Called once after the last run.
    fn finish(&mut self, _out: &mut Vec<Event>) -> Result<()> {
        Ok(())
    }
}

/// Index of the first FOD whose run extends past `pos`.
fn active(fods: &[Fod], mut index: usize, pos: u32) -> usize {
    while index < fods.len() && fods[index].limit <= pos {
        index += 1;
    }
    index
}

/// Decode `text` (absolute stream offsets) run by run into `out`.
pub(crate) fn emit_runs<S: Source, D: RunDecoder>(
    cursor: &mut ByteCursor<S>,
    decoder: &mut D,
    text: Range<u32>,
    chars: &[Fod],
    paras: &[Fod],
    out: &mut Vec<Event>,
) -> Result<()> {
    let mut pos = text.start;
    let mut ci = 0;
    let mut pi = 0;
    let mut char_started = None;
    let mut para_started = None;

    while pos < text.end {
        ci = active(chars, ci, pos);
        pi = active(paras, pi, pos);

        if pi < paras.len() && para_started != Some(pi) {
            para_started = Some(pi);
            decoder.paragraph(&paras[pi].properties, out)?;
        }
        if ci < chars.len() && char_started != Some(ci) {
            char_started = Some(ci);
            decoder.character_run();
            if !chars[ci].properties.is_empty() {
                decoder.character(&chars[ci].properties, out)?;
            }
        }

        let char_end = chars.get(ci).map_or(text.end, |f| f.limit);
        let para_end = paras.get(pi).map_or(text.end, |f| f.limit);
        let end = char_end.min(para_end).min(text.end);

        cursor.seek_to(u64::from(pos));
        let bytes = cursor.read_exact_bytes((end - pos) as usize)?;
        decoder.text(&bytes, out)?;
        pos = end;
    }

    decoder.finish(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records which hook saw what.
    #[derive(Default)]
    struct Trace(Vec<String>);

    impl RunDecoder for Trace {
        fn paragraph(&mut self, properties: &[u8], _out: &mut Vec<Event>) -> Result<()> {
            self.0.push(format!("P{properties:?}"));
            Ok(())
        }
        fn character_run(&mut self) {
            self.0.push("|".into());
        }
        fn character(&mut self, properties: &[u8], _out: &mut Vec<Event>) -> Result<()> {
            self.0.push(format!("C{properties:?}"));
            Ok(())
        }
        fn text(&mut self, bytes: &[u8], _out: &mut Vec<Event>) -> Result<()> {
            self.0.push(String::from_utf8_lossy(bytes).into_owned());
            Ok(())
        }
    }

    fn fod(limit: u32, properties: &[u8]) -> Fod {
        Fod {
            limit,
            property_offset: u16::from(!properties.is_empty()),
            properties: properties.to_vec(),
        }
    }

    #[test]
    fn splits_at_both_boundaries() {
        let data = b"abcdefgh";
        let mut c = ByteCursor::from_slice(data);
        let chars = [fod(3, &[1]), fod(8, &[2])];
        let paras = [fod(5, &[]), fod(8, &[9])];
        let mut trace = Trace::default();
        emit_runs(&mut c, &mut trace, 0..8, &chars, &paras, &mut Vec::new()).unwrap();
        assert_eq!(
            trace.0,
            vec!["P[]", "|", "C[1]", "abc", "|", "C[2]", "de", "P[9]", "fgh"]
        );
    }

    #[test]
    fn property_less_character_runs_skip_decoder() {
        let data = b"xxabc";
        let mut c = ByteCursor::from_slice(data);
        let chars = [fod(4, &[]), fod(5, &[7])];
        let mut trace = Trace::default();
        emit_runs(&mut c, &mut trace, 2..5, &chars, &[], &mut Vec::new()).unwrap();
        assert_eq!(trace.0, vec!["|", "ab", "|", "C[7]", "c"]);
    }

    #[test]
    fn no_fods_single_run() {
        let data = b"hello";
        let mut c = ByteCursor::from_slice(data);
        let mut trace = Trace::default();
        emit_runs(&mut c, &mut trace, 0..5, &[], &[], &mut Vec::new()).unwrap();
        assert_eq!(trace.0, vec!["hello"]);
    }

    #[test]
    fn empty_range_emits_nothing() {
        let mut c = ByteCursor::from_slice(b"");
        let mut trace = Trace::default();
        emit_runs(&mut c, &mut trace, 0..0, &[fod(0, &[1])], &[], &mut Vec::new()).unwrap();
        assert!(trace.0.is_empty());
    }

    #[test]
    fn text_past_stream_end_fails() {
        let mut c = ByteCursor::from_slice(b"abc");
        let mut trace = Trace::default();
        assert!(emit_runs(&mut c, &mut trace, 0..10, &[], &[], &mut Vec::new()).is_err());
    }
}
