//! Read-only compound file (OLE2 structured storage) reader.
//!
//! Parses the 512-byte header, assembles the big-block allocation table
//! (109 sector numbers inline in the header, the rest chained through
//! meta-allocation sectors), loads the small-block allocation table and the
//! directory stream, and resolves `/`-separated paths to stream contents.
//!
//! Corrupt files are expected: every chain walk and every directory tree
//! walk tracks the sectors or entries it has already visited and stops on a
//! repeat instead of looping.

use fixedbitset::FixedBitSet;

use crate::cursor::{ByteCursor, Source};
use crate::error::{Result, WorksError};

pub(crate) const MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

const HEADER_SIZE: usize = 512;
const DIR_ENTRY_SIZE: usize = 128;
/// Streams strictly below this size live in small blocks.
const SIZE_THRESHOLD: u32 = 4096;
const INLINE_TABLE_SECTORS: usize = 109;

// Special sector numbers
const DIF_SECT: u32 = 0xFFFF_FFFC;

// Header field offsets
const OFF_BIG_SHIFT: usize = 0x1E;
const OFF_SMALL_SHIFT: usize = 0x20;
const OFF_TABLE_COUNT: usize = 0x2C;
const OFF_DIR_START: usize = 0x30;
const OFF_THRESHOLD: usize = 0x38;
const OFF_SMALL_TABLE_START: usize = 0x3C;
const OFF_SMALL_TABLE_COUNT: usize = 0x40;
const OFF_META_START: usize = 0x44;
const OFF_META_COUNT: usize = 0x48;
const OFF_INLINE_TABLE: usize = 0x4C;

/// Kind of a directory record, from its type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Empty,
    Storage,
    Stream,
    Root,
    Other(u8),
}

impl From<u8> for EntryType {
    fn from(b: u8) -> Self {
        match b {
            0 => Self::Empty,
            1 => Self::Storage,
            2 => Self::Stream,
            5 => Self::Root,
            other => Self::Other(other),
        }
    }
}

/// One 128-byte directory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub entry_type: EntryType,
    pub start_sector: u32,
    pub size: u32,
    pub prev: u32,
    pub next: u32,
    pub child: u32,
}

impl DirectoryEntry {
    pub const fn is_directory(&self) -> bool {
        matches!(self.entry_type, EntryType::Storage | EntryType::Root)
    }

    fn parse(record: &[u8]) -> Self {
        let name_len = usize::from(le_u16(record, 0x40));
        let units: Vec<u16> = record[..64]
            .chunks_exact(2)
            .take(name_len / 2)
            .map(|p| u16::from_le_bytes([p[0], p[1]]))
            .take_while(|&u| u != 0)
            .collect();
        let mut name: String = char::decode_utf16(units)
            .map(|r| r.unwrap_or('\u{FFFD}'))
            .collect();
        // "\u{1}CompObj", "\u{5}SummaryInformation": leading control
        // character is not part of the name.
        if name.starts_with(|c: char| c.is_control()) {
            name.remove(0);
        }

        Self {
            name,
            entry_type: EntryType::from(record[0x42]),
            prev: le_u32(record, 0x44),
            next: le_u32(record, 0x48),
            child: le_u32(record, 0x4C),
            start_sector: le_u32(record, 0x74),
            size: le_u32(record, 0x78),
        }
    }
}

fn le_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn le_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn u32_table(data: &[u8]) -> impl Iterator<Item = u32> + '_ {
    data.chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
}

/// Walk an allocation chain starting at `start`.
///
/// Stops at any value that is not an index into `table` (end-of-chain,
/// free, reserved) and at the first sector seen twice, returning the chain
/// collected so far.
pub(crate) fn follow(table: &[u32], start: u32) -> Vec<u32> {
    let mut chain = Vec::new();
    let mut visited = FixedBitSet::with_capacity(table.len());
    let mut current = start;

    while current < DIF_SECT {
        let Some(&next) = table.get(current as usize) else {
            log::warn!("allocation chain leaves the table at sector {current}");
            break;
        };
        if visited.put(current as usize) {
            log::warn!("allocation chain loops back to sector {current}");
            break;
        }
        chain.push(current);
        current = next;
    }

    chain
}

/// An opened compound file. Tables and directory are immutable after
/// [`CompoundFile::open`].
#[derive(Debug)]
pub struct CompoundFile<S> {
    cursor: ByteCursor<S>,
    sector_size: usize,
    small_sector_size: usize,
    big_table: Vec<u32>,
    small_table: Vec<u32>,
    entries: Vec<DirectoryEntry>,
    /// Big sectors holding the small-block stream (the root entry's chain).
    small_store: Vec<u32>,
}

impl<S: Source> CompoundFile<S> {
    /// Parse header, allocation tables and directory.
    ///
    /// Returns [`WorksError::NotContainer`] when the input is too short,
    /// lacks the signature or declares an impossible geometry, and
    /// [`WorksError::Container`] when the tables themselves are corrupt.
    pub fn open(mut cursor: ByteCursor<S>) -> Result<Self> {
        if cursor.len() < HEADER_SIZE as u64 {
            return Err(WorksError::NotContainer);
        }
        cursor.seek_to(0);
        let header = cursor.read_exact_bytes(HEADER_SIZE)?;
        if header[..8] != MAGIC {
            return Err(WorksError::NotContainer);
        }

        let big_shift = le_u16(&header, OFF_BIG_SHIFT);
        let small_shift = le_u16(&header, OFF_SMALL_SHIFT);
        // block size must be > 64 and < 2^31
        if !(7..=30).contains(&big_shift) || small_shift > big_shift {
            return Err(WorksError::NotContainer);
        }
        if le_u32(&header, OFF_THRESHOLD) != SIZE_THRESHOLD {
            return Err(WorksError::NotContainer);
        }

        let mut file = Self {
            cursor,
            sector_size: 1usize << big_shift,
            small_sector_size: 1usize << small_shift,
            big_table: Vec::new(),
            small_table: Vec::new(),
            entries: Vec::new(),
            small_store: Vec::new(),
        };

        let table_sectors = file.table_sector_list(&header)?;
        file.load_big_table(&table_sectors)?;
        file.load_small_table(
            le_u32(&header, OFF_SMALL_TABLE_START),
            le_u32(&header, OFF_SMALL_TABLE_COUNT),
        )?;
        file.load_directory(le_u32(&header, OFF_DIR_START))?;

        let root_start = file.entries[0].start_sector;
        file.small_store = follow(&file.big_table, root_start);

        log::debug!(
            "compound file: sector size {}, {} table entries, {} directory entries",
            file.sector_size,
            file.big_table.len(),
            file.entries.len()
        );
        Ok(file)
    }

    /// Number of whole or partial sectors after the header.
    fn sector_count(&self) -> u64 {
        let ss = self.sector_size as u64;
        self.cursor.len().div_ceil(ss).saturating_sub(1)
    }

    /// Collect the sector numbers holding the big-block allocation table:
    /// up to 109 from the header, the rest from the meta-sector chain.
    fn table_sector_list(&mut self, header: &[u8]) -> Result<Vec<u32>> {
        let count = le_u32(header, OFF_TABLE_COUNT) as usize;
        if count as u64 > self.sector_count() {
            return Err(WorksError::container(format!(
                "allocation table claims {count} sectors"
            )));
        }

        let mut sectors: Vec<u32> = u32_table(&header[OFF_INLINE_TABLE..HEADER_SIZE])
            .take(count.min(INLINE_TABLE_SECTORS))
            .collect();

        let per_meta = self.sector_size / 4 - 1;
        let mut meta = le_u32(header, OFF_META_START);
        let meta_count = le_u32(header, OFF_META_COUNT) as usize;
        let mut visited = FixedBitSet::with_capacity(self.sector_count() as usize);
        let mut walked = 0;

        while sectors.len() < count {
            if meta >= DIF_SECT || walked >= meta_count {
                return Err(WorksError::container(format!(
                    "allocation table truncated: {} of {count} sectors",
                    sectors.len()
                )));
            }
            if (meta as u64) >= self.sector_count() || visited.put(meta as usize) {
                return Err(WorksError::container(format!(
                    "bad meta-allocation sector {meta}"
                )));
            }
            let data = self.read_full_sector(meta)?;
            let needed = count - sectors.len();
            sectors.extend(u32_table(&data[..per_meta * 4]).take(needed));
            meta = le_u32(&data, per_meta * 4);
            walked += 1;
        }

        Ok(sectors)
    }

    fn load_big_table(&mut self, sectors: &[u32]) -> Result<()> {
        let mut table = Vec::with_capacity(sectors.len() * self.sector_size / 4);
        for &sector in sectors {
            let data = self.read_full_sector(sector)?;
            table.extend(u32_table(&data));
        }
        self.big_table = table;
        Ok(())
    }

    fn load_small_table(&mut self, start: u32, count: u32) -> Result<()> {
        if count == 0 || start >= DIF_SECT {
            return Ok(());
        }
        let chain = follow(&self.big_table, start);
        if chain.is_empty() {
            return Err(WorksError::container(format!(
                "small-block table starts at bad sector {start}"
            )));
        }
        let mut table = Vec::with_capacity(chain.len() * self.sector_size / 4);
        for sector in chain {
            let data = self.read_full_sector(sector)?;
            table.extend(u32_table(&data));
        }
        self.small_table = table;
        Ok(())
    }

    fn load_directory(&mut self, start: u32) -> Result<()> {
        let chain = follow(&self.big_table, start);
        if chain.is_empty() {
            return Err(WorksError::container(format!(
                "directory starts at bad sector {start}"
            )));
        }
        let mut data = Vec::with_capacity(chain.len() * self.sector_size);
        for sector in chain {
            data.extend(self.read_full_sector(sector)?);
        }

        self.entries = data
            .chunks_exact(DIR_ENTRY_SIZE)
            .map(DirectoryEntry::parse)
            .collect();

        match self.entries.first() {
            Some(root) if root.entry_type == EntryType::Root => Ok(()),
            _ => Err(WorksError::container("directory has no root entry")),
        }
    }

    /// Read one big sector, allowing a short final sector.
    fn read_sector(&mut self, sector: u32) -> Result<Vec<u8>> {
        let offset = (u64::from(sector) + 1) * self.sector_size as u64;
        self.cursor.seek_to(offset);
        self.cursor.read_bytes(self.sector_size)
    }

    fn read_full_sector(&mut self, sector: u32) -> Result<Vec<u8>> {
        let data = self.read_sector(sector)?;
        if data.len() < self.sector_size {
            return Err(WorksError::container(format!(
                "sector {sector} lies past the end of the file"
            )));
        }
        Ok(data)
    }

    pub const fn sector_size(&self) -> usize {
        self.sector_size
    }

    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&DirectoryEntry> {
        self.entries.get(index)
    }

    /// Resolve a `/`-separated path to a directory index. The empty path
    /// (or `/`) is the root entry.
    pub fn resolve(&self, path: &str) -> Option<usize> {
        path.split('/')
            .filter(|c| !c.is_empty())
            .try_fold(0usize, |dir, name| {
                self.find_child(self.entries[dir].child, name)
            })
    }

    pub fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_some()
    }

    /// Search the sibling tree rooted at `start` for `name`.
    fn find_child(&self, start: u32, name: &str) -> Option<usize> {
        let mut visited = FixedBitSet::with_capacity(self.entries.len());
        let mut pending = vec![start];

        while let Some(id) = pending.pop() {
            let index = id as usize;
            let Some(entry) = self.entries.get(index) else {
                continue;
            };
            if visited.put(index) {
                continue;
            }
            if entry.entry_type != EntryType::Empty && entry.name == name {
                return Some(index);
            }
            pending.push(entry.prev);
            pending.push(entry.next);
        }

        None
    }

    /// Full paths of every stream, depth first.
    pub fn stream_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        let mut visited = FixedBitSet::with_capacity(self.entries.len());
        visited.insert(0);
        let mut pending = vec![(self.entries[0].child, String::new())];

        while let Some((id, parent)) = pending.pop() {
            let index = id as usize;
            let Some(entry) = self.entries.get(index) else {
                continue;
            };
            if visited.put(index) {
                continue;
            }
            pending.push((entry.prev, parent.clone()));
            pending.push((entry.next, parent.clone()));

            let path = format!("{parent}/{}", entry.name);
            match entry.entry_type {
                EntryType::Stream => paths.push(path),
                EntryType::Storage => pending.push((entry.child, path)),
                _ => {}
            }
        }

        paths.sort();
        paths
    }

    /// Read the stream at `path`; `Ok(None)` when no such stream exists.
    pub fn read_stream(&mut self, path: &str) -> Result<Option<Vec<u8>>> {
        match self.resolve(path) {
            Some(index) if self.entries[index].entry_type == EntryType::Stream => {
                self.read_entry(index).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Read the full contents of directory entry `index`.
    ///
    /// A stream whose chain ends early is salvaged (truncated, with a
    /// warning) when at least half of its declared bytes are present.
    pub fn read_entry(&mut self, index: usize) -> Result<Vec<u8>> {
        let entry = self
            .entries
            .get(index)
            .ok_or_else(|| WorksError::container(format!("no directory entry {index}")))?;
        let size = entry.size as usize;
        let start = entry.start_sector;
        let name = entry.name.clone();

        let mut data = if entry.size < SIZE_THRESHOLD {
            self.read_small_chain(start, size)?
        } else {
            self.read_big_chain(start, size)?
        };

        if data.len() < size {
            if data.len() * 2 >= size {
                log::warn!(
                    "stream {name:?} truncated: {} of {size} bytes present",
                    data.len()
                );
            } else {
                return Err(WorksError::container(format!(
                    "stream {name:?} truncated: {} of {size} bytes present",
                    data.len()
                )));
            }
        }
        data.truncate(size);
        Ok(data)
    }

    fn read_big_chain(&mut self, start: u32, size: usize) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(size);
        for sector in follow(&self.big_table, start) {
            if data.len() >= size {
                break;
            }
            let chunk = self.read_sector(sector)?;
            let short = chunk.len() < self.sector_size;
            data.extend(chunk);
            if short {
                break;
            }
        }
        Ok(data)
    }

    fn read_small_chain(&mut self, start: u32, size: usize) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(size);
        for small in follow(&self.small_table, start) {
            if data.len() >= size {
                break;
            }
            let offset = small as usize * self.small_sector_size;
            let Some(&big) = self.small_store.get(offset / self.sector_size) else {
                break;
            };
            let within = (offset % self.sector_size) as u64;
            let position = (u64::from(big) + 1) * self.sector_size as u64 + within;
            self.cursor.seek_to(position);
            let chunk = self.cursor.read_bytes(self.small_sector_size)?;
            let short = chunk.len() < self.small_sector_size;
            data.extend(chunk);
            if short {
                break;
            }
        }
        Ok(data)
    }
}
