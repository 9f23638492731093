//! Formatting-descriptor (FOD) page decoder shared by both format families.
//!
//! A FOD page maps runs of text (by absolute stream offset) to raw property
//! strings. Page layout, old family (Works 2/3/4), fixed 128 bytes:
//!
//! ```text
//!   0        u32 fcFirst, then cfod u32 limits
//!   ...      cfod u8 property offsets
//!   ...      property records: u8 length, raw bytes
//!   127      u8 cfod
//! ```
//!
//! New family (Works 5/7/8), page size taken from the header index:
//!
//! ```text
//!   0        u16 cfod
//!   2        u32 fcFirst, then cfod u32 limits
//!   ...      cfod u16 property offsets
//!   ...      property records: u8 (length + 1), raw bytes
//! ```
//!
//! Descriptor `i` covers `[limit[i], limit[i + 1])`. Any inconsistency is
//! fatal: later offsets cannot be trusted once a page is corrupt.

use crate::cursor::{ByteCursor, Source};
use crate::error::{Result, WorksError};

/// Version-specific layout of FOD pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatConstants {
    /// Maximum descriptors on one page.
    pub max_fods: usize,
    /// Fixed page size, or `None` when each page declares its own.
    pub page_size: Option<u64>,
    /// Width of the descriptor count field (1 or 2 bytes).
    pub count_width: u8,
    /// Width of each property offset field (1 or 2 bytes).
    pub offset_width: u8,
    /// Descriptor count stored in the last byte of the page instead of the
    /// first bytes.
    pub count_at_end: bool,
    /// Property records store their length plus one.
    pub length_plus_one: bool,
    /// Hard cap on a property record on top of the page end; `None` caps at
    /// the page end only.
    pub max_property_len: Option<usize>,
}

/// Works 2, 3 and 4.
pub const WORKS4_FODS: FormatConstants = FormatConstants {
    max_fods: 0x18,
    page_size: Some(128),
    count_width: 1,
    offset_width: 1,
    count_at_end: true,
    length_plus_one: false,
    max_property_len: Some(93),
};

/// Works 5, 7 and 8.
pub const WORKS8_FODS: FormatConstants = FormatConstants {
    max_fods: 0x54,
    page_size: None,
    count_width: 2,
    offset_width: 2,
    count_at_end: false,
    length_plus_one: true,
    max_property_len: None,
};

impl FormatConstants {
    /// Offset of the limit array from the page start.
    const fn limits_offset(&self) -> u64 {
        if self.count_at_end {
            0
        } else {
            self.count_width as u64
        }
    }

    /// End of the limit and offset tables for `cfod` descriptors.
    const fn tables_end(&self, cfod: usize) -> u64 {
        self.limits_offset() + 4 * (cfod as u64 + 1) + self.offset_width as u64 * cfod as u64
    }

    /// First byte past the property area.
    const fn property_area_end(&self, page_size: u64) -> u64 {
        if self.count_at_end {
            page_size - self.count_width as u64
        } else {
            page_size
        }
    }

    fn read_width<S: Source>(width: u8, cursor: &mut ByteCursor<S>) -> Result<u16> {
        if width == 1 {
            Ok(u16::from(cursor.read_u8()?))
        } else {
            cursor.read_u16()
        }
    }
}

/// One run of uniformly formatted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fod {
    /// Exclusive end offset of the run.
    pub limit: u32,
    /// Offset of the property record within its page; 0 = defaults.
    pub property_offset: u16,
    /// Raw property string, opaque at this level.
    pub properties: Vec<u8>,
}

/// Accumulates FODs over a sequence of pages of one kind.
#[derive(Debug)]
pub struct FodReader {
    constants: FormatConstants,
    end_of_text: u32,
    first_limit: Option<u32>,
    last_limit: Option<u32>,
    fods: Vec<Fod>,
}

impl FodReader {
    pub const fn new(constants: FormatConstants, end_of_text: u32) -> Self {
        Self {
            constants,
            end_of_text,
            first_limit: None,
            last_limit: None,
            fods: Vec::new(),
        }
    }

    /// Highest limit read so far, including a page's `fcFirst`.
    pub const fn last_limit(&self) -> Option<u32> {
        self.last_limit
    }

    /// Fail when the first page starts after `text_start`: the text before
    /// it has no descriptor.
    pub fn check_start(&self, text_start: u32) -> Result<()> {
        match self.first_limit {
            Some(first) if first > text_start => Err(WorksError::parse(format!(
                "FOD pages start at {first:#x}, after the text at {text_start:#x}"
            ))),
            _ => Ok(()),
        }
    }

    pub fn fods(&self) -> &[Fod] {
        &self.fods
    }

    pub fn into_fods(self) -> Vec<Fod> {
        self.fods
    }

    /// Decode the page at the cursor position. `declared_size` is only used
    /// when the format has no fixed page size.
    ///
    /// Leaves the cursor at the end of the page and returns whether more
    /// pages of this kind are expected (the last limit is still below the
    /// end of text).
    pub fn read_page<S: Source>(&mut self, cursor: &mut ByteCursor<S>, declared_size: u64) -> Result<bool> {
        let c = self.constants;
        let start = cursor.position();
        let page_size = c.page_size.unwrap_or(declared_size);
        if page_size < c.tables_end(0) + u64::from(c.count_at_end) * u64::from(c.count_width) {
            return Err(WorksError::parse(format!(
                "FOD page at {start:#x} is too small ({page_size} bytes)"
            )));
        }

        let count_at = if c.count_at_end {
            start + page_size - u64::from(c.count_width)
        } else {
            start
        };
        cursor.seek_to(count_at);
        let cfod = usize::from(FormatConstants::read_width(c.count_width, cursor)?);
        if cfod > c.max_fods {
            return Err(WorksError::parse(format!(
                "FOD page at {start:#x} claims {cfod} descriptors (max {})",
                c.max_fods
            )));
        }
        if c.tables_end(cfod) > c.property_area_end(page_size) {
            return Err(WorksError::parse(format!(
                "FOD page at {start:#x}: {cfod} descriptors do not fit"
            )));
        }

        cursor.seek_to(start + c.limits_offset());
        let mut limits = Vec::with_capacity(cfod + 1);
        let mut previous = self.last_limit;
        for _ in 0..=cfod {
            let limit = cursor.read_u32()?;
            if limit > self.end_of_text {
                return Err(WorksError::parse(format!(
                    "FOD limit {limit:#x} past end of text {:#x}",
                    self.end_of_text
                )));
            }
            if previous.is_some_and(|p| limit < p) {
                return Err(WorksError::parse(format!(
                    "FOD limit {limit:#x} goes backwards at page {start:#x}"
                )));
            }
            previous = Some(limit);
            limits.push(limit);
        }

        let tables_end = c.tables_end(cfod);
        let area_end = c.property_area_end(page_size);
        let mut offsets = Vec::with_capacity(cfod);
        for _ in 0..cfod {
            let offset = FormatConstants::read_width(c.offset_width, cursor)?;
            let at = u64::from(offset);
            if offset != 0 && (at < tables_end || at >= area_end) {
                return Err(WorksError::parse(format!(
                    "property offset {offset:#x} outside page at {start:#x}"
                )));
            }
            offsets.push(offset);
        }

        for (i, &offset) in offsets.iter().enumerate() {
            let properties = if offset == 0 {
                Vec::new()
            } else {
                self.read_properties(cursor, start, offset, page_size)?
            };
            self.fods.push(Fod {
                limit: limits[i + 1],
                property_offset: offset,
                properties,
            });
        }

        let last = limits[cfod];
        if self.first_limit.is_none() {
            self.first_limit = Some(limits[0]);
        }
        self.last_limit = Some(last);
        cursor.seek_to(start + page_size);
        Ok(last < self.end_of_text)
    }

    fn read_properties<S: Source>(
        &self,
        cursor: &mut ByteCursor<S>,
        page_start: u64,
        offset: u16,
        page_size: u64,
    ) -> Result<Vec<u8>> {
        let c = self.constants;
        cursor.seek_to(page_start + u64::from(offset));
        let stored = cursor.read_u8()?;
        let len = if c.length_plus_one {
            usize::from(stored.saturating_sub(1))
        } else {
            usize::from(stored)
        };
        if len == 0 {
            return Err(WorksError::parse(format!(
                "empty property record at {:#x}",
                page_start + u64::from(offset)
            )));
        }
        let past_page = u64::from(offset) + 1 + len as u64 > c.property_area_end(page_size);
        let too_long = past_page || c.max_property_len.is_some_and(|max| len > max);
        if too_long {
            return Err(WorksError::parse(format!(
                "property record of {len} bytes at {:#x} is too long",
                page_start + u64::from(offset)
            )));
        }
        cursor.read_exact_bytes(len)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Build a 128-byte old-family page. `props[i]` is the property string
    /// of descriptor `i` (`None` = zero offset).
    pub(crate) fn old_page(limits: &[u32], props: &[Option<&[u8]>]) -> Vec<u8> {
        let cfod = props.len();
        assert_eq!(limits.len(), cfod + 1);
        let mut page = vec![0u8; 128];
        for (i, l) in limits.iter().enumerate() {
            page[i * 4..i * 4 + 4].copy_from_slice(&l.to_le_bytes());
        }
        let mut next = 4 * (cfod + 1) + cfod;
        for (i, p) in props.iter().enumerate() {
            if let Some(bytes) = p {
                page[4 * (cfod + 1) + i] = next as u8;
                page[next] = bytes.len() as u8;
                page[next + 1..next + 1 + bytes.len()].copy_from_slice(bytes);
                next += 1 + bytes.len();
            }
        }
        page[127] = cfod as u8;
        page
    }

    /// Build a new-family page of `size` bytes.
    pub(crate) fn new_page(size: usize, limits: &[u32], props: &[Option<&[u8]>]) -> Vec<u8> {
        let cfod = props.len();
        assert_eq!(limits.len(), cfod + 1);
        let mut page = vec![0u8; size];
        page[0..2].copy_from_slice(&(cfod as u16).to_le_bytes());
        for (i, l) in limits.iter().enumerate() {
            page[2 + i * 4..6 + i * 4].copy_from_slice(&l.to_le_bytes());
        }
        let offsets_at = 2 + 4 * (cfod + 1);
        let mut next = offsets_at + 2 * cfod;
        for (i, p) in props.iter().enumerate() {
            if let Some(bytes) = p {
                page[offsets_at + 2 * i..offsets_at + 2 * i + 2].copy_from_slice(&(next as u16).to_le_bytes());
                page[next] = bytes.len() as u8 + 1;
                page[next + 1..next + 1 + bytes.len()].copy_from_slice(bytes);
                next += 1 + bytes.len();
            }
        }
        page
    }

    // ── old family ────────────────────────────────────────────────

    #[test]
    fn old_page_with_properties() {
        let page = old_page(&[0x100, 0x105, 0x110], &[Some(&[0x01, 0x00, 0x02]), None]);
        let mut c = ByteCursor::from_vec(page);
        let mut reader = FodReader::new(WORKS4_FODS, 0x110);
        let more = reader.read_page(&mut c, 0).unwrap();
        assert!(!more);
        assert_eq!(c.position(), 128);
        let fods = reader.into_fods();
        assert_eq!(fods.len(), 2);
        assert_eq!(fods[0].limit, 0x105);
        assert_eq!(fods[0].properties, vec![0x01, 0x00, 0x02]);
        assert_eq!(fods[1].limit, 0x110);
        assert_eq!(fods[1].property_offset, 0);
        assert!(fods[1].properties.is_empty());
    }

    #[test]
    fn old_page_reports_more() {
        let page = old_page(&[0x100, 0x105], &[None]);
        let mut c = ByteCursor::from_vec(page);
        let mut reader = FodReader::new(WORKS4_FODS, 0x200);
        assert!(reader.read_page(&mut c, 0).unwrap());
        assert_eq!(reader.last_limit(), Some(0x105));
    }

    #[test]
    fn empty_page_uses_first_limit() {
        let page = old_page(&[0x100], &[]);
        let mut c = ByteCursor::from_vec(page);
        let mut reader = FodReader::new(WORKS4_FODS, 0x100);
        assert!(!reader.read_page(&mut c, 0).unwrap());
        assert!(reader.fods().is_empty());
    }

    #[test]
    fn rejects_too_many_descriptors() {
        let mut page = vec![0u8; 128];
        page[127] = 0x19;
        let mut c = ByteCursor::from_vec(page);
        let mut reader = FodReader::new(WORKS4_FODS, 0x1000);
        assert!(matches!(reader.read_page(&mut c, 0), Err(WorksError::Parse(_))));
    }

    #[test]
    fn rejects_decreasing_limit() {
        let page = old_page(&[0x100, 0x120, 0x110], &[None, None]);
        let mut c = ByteCursor::from_vec(page);
        let mut reader = FodReader::new(WORKS4_FODS, 0x200);
        assert!(reader.read_page(&mut c, 0).is_err());
    }

    #[test]
    fn rejects_decrease_across_pages() {
        let mut data = old_page(&[0x100, 0x140], &[None]);
        data.extend(old_page(&[0x130, 0x150], &[None]));
        let mut c = ByteCursor::from_vec(data);
        let mut reader = FodReader::new(WORKS4_FODS, 0x200);
        assert!(reader.read_page(&mut c, 0).unwrap());
        assert!(reader.read_page(&mut c, 0).is_err());
    }

    #[test]
    fn rejects_limit_past_end_of_text() {
        let page = old_page(&[0x100, 0x180], &[None]);
        let mut c = ByteCursor::from_vec(page);
        let mut reader = FodReader::new(WORKS4_FODS, 0x17F);
        assert!(reader.read_page(&mut c, 0).is_err());
    }

    #[test]
    fn rejects_offset_inside_tables() {
        let mut page = old_page(&[0x100, 0x110], &[None]);
        page[8] = 3; // points into the limit array
        let mut c = ByteCursor::from_vec(page);
        let mut reader = FodReader::new(WORKS4_FODS, 0x110);
        assert!(reader.read_page(&mut c, 0).is_err());
    }

    #[test]
    fn rejects_offset_at_count_byte() {
        let mut page = old_page(&[0x100, 0x110], &[None]);
        page[8] = 127;
        let mut c = ByteCursor::from_vec(page);
        let mut reader = FodReader::new(WORKS4_FODS, 0x110);
        assert!(reader.read_page(&mut c, 0).is_err());
    }

    #[test]
    fn rejects_zero_length_property() {
        let mut page = old_page(&[0x100, 0x110], &[None]);
        page[8] = 20;
        page[20] = 0;
        let mut c = ByteCursor::from_vec(page);
        let mut reader = FodReader::new(WORKS4_FODS, 0x110);
        assert!(reader.read_page(&mut c, 0).is_err());
    }

    #[test]
    fn rejects_oversized_property() {
        let mut page = old_page(&[0x100, 0x110], &[None]);
        // fits before the count byte, but over the 93-byte cap
        page[8] = 9;
        page[9] = 94;
        let mut c = ByteCursor::from_vec(page);
        let mut reader = FodReader::new(WORKS4_FODS, 0x110);
        assert!(reader.read_page(&mut c, 0).is_err());
    }

    #[test]
    fn rejects_property_past_count_byte() {
        let mut data = old_page(&[0x100, 0x110], &[None]);
        data[8] = 120;
        data[120] = 20;
        data.extend(vec![0xEE; 128]);
        let mut c = ByteCursor::from_vec(data);
        let mut reader = FodReader::new(WORKS4_FODS, 0x110);
        assert!(matches!(reader.read_page(&mut c, 0), Err(WorksError::Parse(_))));
    }

    #[test]
    fn accepts_property_ending_at_count_byte() {
        let mut page = old_page(&[0x100, 0x110], &[None]);
        page[8] = 120;
        page[120] = 6;
        let mut c = ByteCursor::from_vec(page);
        let mut reader = FodReader::new(WORKS4_FODS, 0x110);
        reader.read_page(&mut c, 0).unwrap();
        assert_eq!(reader.fods()[0].properties.len(), 6);
    }

    #[test]
    fn start_after_text_is_rejected() {
        let page = old_page(&[0x104, 0x110], &[None]);
        let mut c = ByteCursor::from_vec(page);
        let mut reader = FodReader::new(WORKS4_FODS, 0x110);
        reader.read_page(&mut c, 0).unwrap();
        assert!(reader.check_start(0x104).is_ok());
        assert!(matches!(reader.check_start(0x100), Err(WorksError::Parse(_))));
    }

    #[test]
    fn start_check_without_pages() {
        let reader = FodReader::new(WORKS8_FODS, 0x110);
        assert!(reader.check_start(0x100).is_ok());
    }

    // ── new family ────────────────────────────────────────────────

    #[test]
    fn new_page_decrements_length() {
        let page = new_page(512, &[0x200, 0x210, 0x220], &[Some(&[0, 0, 0, 1]), None]);
        let mut c = ByteCursor::from_vec(page);
        let mut reader = FodReader::new(WORKS8_FODS, 0x220);
        assert!(!reader.read_page(&mut c, 512).unwrap());
        assert_eq!(c.position(), 512);
        let fods = reader.into_fods();
        assert_eq!(fods[0].properties, vec![0, 0, 0, 1]);
        assert_eq!(fods[1].limit, 0x220);
    }

    #[test]
    fn new_page_rejects_record_past_page_end() {
        let mut page = new_page(64, &[0x200, 0x210], &[None]);
        // offsets table at 2 + 8 = 10
        page[10..12].copy_from_slice(&60u16.to_le_bytes());
        page[60] = 10;
        let mut c = ByteCursor::from_vec(page);
        let mut reader = FodReader::new(WORKS8_FODS, 0x210);
        assert!(reader.read_page(&mut c, 64).is_err());
    }

    #[test]
    fn new_page_rejects_too_many_descriptors() {
        let mut page = vec![0u8; 512];
        page[0..2].copy_from_slice(&0x55u16.to_le_bytes());
        let mut c = ByteCursor::from_vec(page);
        let mut reader = FodReader::new(WORKS8_FODS, 0x1000);
        assert!(reader.read_page(&mut c, 512).is_err());
    }

    #[test]
    fn truncated_page_is_an_error() {
        let page = old_page(&[0x100, 0x110], &[None]);
        let mut c = ByteCursor::from_vec(page[..100].to_vec());
        let mut reader = FodReader::new(WORKS4_FODS, 0x110);
        assert!(reader.read_page(&mut c, 0).is_err());
    }

    // ── properties ────────────────────────────────────────────────

    fn run_lengths() -> impl Strategy<Value = Vec<u32>> {
        prop::collection::vec(0u32..40, 0..60)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn prop_accepted_limits_are_monotonic(runs in run_lengths()) {
            let text_start = 0x100u32;
            let mut limits = vec![text_start];
            for r in &runs {
                limits.push(limits.last().unwrap() + r);
            }
            let eot = *limits.last().unwrap();

            let mut data = Vec::new();
            let mut pages = 0;
            let mut first = 0;
            loop {
                let chunk = (limits.len() - 1 - first).min(0x18);
                let props: Vec<Option<&[u8]>> = vec![None; chunk];
                data.extend(old_page(&limits[first..=first + chunk], &props));
                pages += 1;
                first += chunk;
                if first + 1 >= limits.len() {
                    break;
                }
            }

            let mut c = ByteCursor::from_vec(data);
            let mut reader = FodReader::new(WORKS4_FODS, eot);
            let mut more = true;
            for _ in 0..pages {
                more = reader.read_page(&mut c, 0).unwrap();
            }
            prop_assert!(!more);
            let fods = reader.into_fods();
            prop_assert_eq!(fods.len(), runs.len());
            prop_assert!(fods.windows(2).all(|w| w[0].limit <= w[1].limit));
            if let Some(last) = fods.last() {
                prop_assert_eq!(last.limit, eot);
            }
        }

        #[test]
        fn prop_decreasing_limit_rejected(
            base in 0x100u32..0x1000,
            drop in 1u32..0x100,
            at in 1usize..5,
        ) {
            let mut limits: Vec<u32> = (0..6).map(|i| base + i * 0x200).collect();
            limits[at] = limits[at - 1] - drop.min(limits[at - 1]);
            prop_assume!(limits[at] < limits[at - 1]);
            let page = old_page(&limits, &[None; 5]);
            let mut c = ByteCursor::from_vec(page);
            let mut reader = FodReader::new(WORKS4_FODS, u32::MAX);
            prop_assert!(reader.read_page(&mut c, 0).is_err());
        }
    }
}
