//! 8-bit codepage decoding for the Works 2/3/4 text stream.
//!
//! Works 2 stores DOS text (code page 850); Works 3 and 4 store Windows
//! text (code page 1252). Code page 1252 goes through `encoding_rs`; code
//! page 850 is not a WHATWG encoding, so its upper half is tabulated here.

/// DOS Latin-1.
pub(crate) const CP850: u16 = 850;
/// Windows Western European.
pub(crate) const CP1252: u16 = 1252;

/// Upper half (0x80..=0xFF) of code page 850.
#[rustfmt::skip]
const CP850_HIGH: [char; 128] = [
    // 0x80
    '\u{00C7}', '\u{00FC}', '\u{00E9}', '\u{00E2}', '\u{00E4}', '\u{00E0}', '\u{00E5}', '\u{00E7}',
    '\u{00EA}', '\u{00EB}', '\u{00E8}', '\u{00EF}', '\u{00EE}', '\u{00EC}', '\u{00C4}', '\u{00C5}',
    // 0x90
    '\u{00C9}', '\u{00E6}', '\u{00C6}', '\u{00F4}', '\u{00F6}', '\u{00F2}', '\u{00FB}', '\u{00F9}',
    '\u{00FF}', '\u{00D6}', '\u{00DC}', '\u{00F8}', '\u{00A3}', '\u{00D8}', '\u{00D7}', '\u{0192}',
    // 0xA0
    '\u{00E1}', '\u{00ED}', '\u{00F3}', '\u{00FA}', '\u{00F1}', '\u{00D1}', '\u{00AA}', '\u{00BA}',
    '\u{00BF}', '\u{00AE}', '\u{00AC}', '\u{00BD}', '\u{00BC}', '\u{00A1}', '\u{00AB}', '\u{00BB}',
    // 0xB0
    '\u{2591}', '\u{2592}', '\u{2593}', '\u{2502}', '\u{2524}', '\u{00C1}', '\u{00C2}', '\u{00C0}',
    '\u{00A9}', '\u{2563}', '\u{2551}', '\u{2557}', '\u{255D}', '\u{00A2}', '\u{00A5}', '\u{2510}',
    // 0xC0
    '\u{2514}', '\u{2534}', '\u{252C}', '\u{251C}', '\u{2500}', '\u{253C}', '\u{00E3}', '\u{00C3}',
    '\u{255A}', '\u{2554}', '\u{2569}', '\u{2566}', '\u{2560}', '\u{2550}', '\u{256C}', '\u{00A4}',
    // 0xD0
    '\u{00F0}', '\u{00D0}', '\u{00CA}', '\u{00CB}', '\u{00C8}', '\u{0131}', '\u{00CD}', '\u{00CE}',
    '\u{00CF}', '\u{2518}', '\u{250C}', '\u{2588}', '\u{2584}', '\u{00A6}', '\u{00CC}', '\u{2580}',
    // 0xE0
    '\u{00D3}', '\u{00DF}', '\u{00D4}', '\u{00D2}', '\u{00F5}', '\u{00D5}', '\u{00B5}', '\u{00FE}',
    '\u{00DE}', '\u{00DA}', '\u{00DB}', '\u{00D9}', '\u{00FD}', '\u{00DD}', '\u{00AF}', '\u{00B4}',
    // 0xF0
    '\u{00AD}', '\u{00B1}', '\u{2017}', '\u{00BE}', '\u{00B6}', '\u{00A7}', '\u{00F7}', '\u{00B8}',
    '\u{00B0}', '\u{00A8}', '\u{00B7}', '\u{00B9}', '\u{00B3}', '\u{00B2}', '\u{25A0}', '\u{00A0}',
];

/// Code page used by an old-family document of the given major version.
pub(crate) const fn for_version(version: u8) -> u16 {
    if version < 3 {
        CP850
    } else {
        CP1252
    }
}

/// Decode a single byte using the given code page, returning its Unicode
/// code point.
///
/// ASCII bytes (< 0x80) map to themselves in every supported code page.
/// Any code page other than 850 reads as 1252.
pub(crate) fn decode_byte(byte: u8, codepage: u16) -> char {
    if byte < 0x80 {
        return char::from(byte);
    }
    if codepage == CP850 {
        return CP850_HIGH[usize::from(byte - 0x80)];
    }
    let buf = [byte];
    let (cow, _encoding_used, _had_errors) = encoding_rs::WINDOWS_1252.decode(&buf);
    cow.chars().next().unwrap_or('\u{FFFD}')
}

/// Decode a whole byte string, e.g. a font name.
pub(crate) fn decode_str(bytes: &[u8], codepage: u16) -> String {
    if codepage == CP850 {
        return bytes.iter().map(|&b| decode_byte(b, CP850)).collect();
    }
    let (cow, _encoding_used, _had_errors) = encoding_rs::WINDOWS_1252.decode(bytes);
    cow.into_owned()
}
