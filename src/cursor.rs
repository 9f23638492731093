//! Seekable, position-tracking byte cursor over a finite extent.
//!
//! Every decoder in the crate reads through [`ByteCursor`]. The extent comes
//! from a [`Source`]: an in-memory buffer (a borrowed slice or an owned
//! `Vec<u8>`, used for compound-file streams) or a [`FileSource`] that reads
//! ahead in 64 KiB chunks. Seeks clamp to `[0, len]`; fixed-width reads past
//! the end fail with [`WorksError::UnexpectedEof`] and leave the position
//! untouched, while [`ByteCursor::read_bytes`] returns a short result.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{Result, WorksError};

/// Random-access byte extent of known length.
pub trait Source {
    /// Total length of the extent in bytes.
    fn size(&self) -> u64;

    /// Copy bytes starting at `offset` into `buf`, returning how many were
    /// copied. Returns 0 at or past the end of the extent.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;
}

fn copy_from_slice_at(data: &[u8], offset: u64, buf: &mut [u8]) -> usize {
    let Ok(start) = usize::try_from(offset) else {
        return 0;
    };
    if start >= data.len() {
        return 0;
    }
    let n = buf.len().min(data.len() - start);
    buf[..n].copy_from_slice(&data[start..start + n]);
    n
}

impl Source for &[u8] {
    fn size(&self) -> u64 {
        self.len() as u64
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        Ok(copy_from_slice_at(self, offset, buf))
    }
}

impl Source for Vec<u8> {
    fn size(&self) -> u64 {
        self.len() as u64
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        Ok(copy_from_slice_at(self, offset, buf))
    }
}

/// Read-ahead window of [`FileSource`].
const READ_AHEAD: usize = 64 * 1024;

/// File-backed source with a single read-ahead window.
///
/// Requests that fall inside the window are served from memory; anything
/// else refills the window starting at the requested offset. Requests larger
/// than the window bypass it.
#[derive(Debug)]
pub struct FileSource {
    file: File,
    size: u64,
    window: Vec<u8>,
    window_start: u64,
}

impl FileSource {
    /// Open `path` for reading.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::new(File::open(path)?)
    }

    /// Wrap an already opened file.
    pub fn new(file: File) -> io::Result<Self> {
        let size = file.metadata()?.len();
        Ok(Self {
            file,
            size,
            window: Vec::with_capacity(READ_AHEAD),
            window_start: 0,
        })
    }

    fn fill(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl Source for FileSource {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.size || buf.is_empty() {
            return Ok(0);
        }
        if buf.len() > READ_AHEAD {
            return self.fill(offset, buf);
        }

        let window_end = self.window_start + self.window.len() as u64;
        let wanted_end = (offset + buf.len() as u64).min(self.size);
        if offset < self.window_start || wanted_end > window_end {
            let mut window = std::mem::take(&mut self.window);
            window.resize(READ_AHEAD, 0);
            let n = self.fill(offset, &mut window)?;
            window.truncate(n);
            self.window = window;
            self.window_start = offset;
        }

        let start = usize::try_from(offset - self.window_start).unwrap_or(usize::MAX);
        Ok(copy_from_slice_at(&self.window, start as u64, buf))
    }
}

/// Position-tracking reader over a [`Source`].
#[derive(Debug)]
pub struct ByteCursor<S> {
    source: S,
    pos: u64,
}

impl<'a> ByteCursor<&'a [u8]> {
    /// Cursor over a borrowed buffer.
    pub const fn from_slice(data: &'a [u8]) -> Self {
        Self {
            source: data,
            pos: 0,
        }
    }
}

impl ByteCursor<Vec<u8>> {
    /// Cursor over an owned buffer.
    pub const fn from_vec(data: Vec<u8>) -> Self {
        Self {
            source: data,
            pos: 0,
        }
    }
}

impl<S: Source> ByteCursor<S> {
    pub const fn new(source: S) -> Self {
        Self { source, pos: 0 }
    }

    /// Length of the underlying extent.
    pub fn len(&self) -> u64 {
        self.source.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn position(&self) -> u64 {
        self.pos
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.len()
    }

    /// Move the position, clamping the target into `[0, len]`. Returns the
    /// new position.
    pub fn seek(&mut self, target: SeekFrom) -> u64 {
        let len = self.len();
        let wanted = match target {
            SeekFrom::Start(n) => i128::from(n),
            SeekFrom::Current(d) => i128::from(self.pos) + i128::from(d),
            SeekFrom::End(d) => i128::from(len) + i128::from(d),
        };
        self.pos = u64::try_from(wanted.clamp(0, i128::from(len))).unwrap_or(len);
        self.pos
    }

    /// Shorthand for an absolute seek.
    pub fn seek_to(&mut self, offset: u64) -> u64 {
        self.seek(SeekFrom::Start(offset))
    }

    /// Fill as much of `buf` as the extent allows and advance by the amount
    /// read.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut total = 0;
        while total < buf.len() {
            let n = self
                .source
                .read_at(self.pos + total as u64, &mut buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        self.pos += total as u64;
        Ok(total)
    }

    /// Read up to `n` bytes; the result is shorter when the extent ends
    /// first.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let available = usize::try_from(self.len().saturating_sub(self.pos)).unwrap_or(usize::MAX);
        let mut buf = vec![0u8; n.min(available)];
        let got = self.read_into(&mut buf)?;
        buf.truncate(got);
        Ok(buf)
    }

    /// Read exactly `n` bytes or fail without moving.
    pub fn read_exact_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let start = self.pos;
        let buf = self.read_bytes(n)?;
        if buf.len() < n {
            self.pos = start;
            return Err(WorksError::UnexpectedEof { offset: start });
        }
        Ok(buf)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let start = self.pos;
        let mut buf = [0u8; N];
        if self.read_into(&mut buf)? < N {
            self.pos = start;
            return Err(WorksError::UnexpectedEof { offset: start });
        }
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(i8::from_le_bytes(self.read_array()?))
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub const fn source(&self) -> &S {
        &self.source
    }

    pub fn into_inner(self) -> S {
        self.source
    }
}
