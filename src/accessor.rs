//! Byte-range Accessor
//!
//! A bounded reader/writer/seeker over `[base, base + size)` of a parcel file.
//!
//! The range is fixed at construction: reads and writes are clipped to it,
//! seeks are clamped into `[0, size]`. The accessor owns no data and borrows
//! the file, so it cannot outlive the parcel that handed it out.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::file::ParcelFile;

/// Bounded view over a byte range of the parcel file
pub struct ObjectAccessor<'a, F: ParcelFile + ?Sized> {
    file: &'a mut F,
    base: u64,
    size: u64,
    /// Cursor, relative to `base`
    pos: u64,
}

impl<'a, F: ParcelFile + ?Sized> ObjectAccessor<'a, F> {
    pub fn new(file: &'a mut F, base: u64, size: u64) -> Self {
        Self {
            file,
            base,
            size,
            pos: 0,
        }
    }

    /// Absolute file offset of the start of the range
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Size of the range
    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Cursor position within the range
    pub fn tell(&self) -> u64 {
        self.pos
    }

    /// Bytes between the cursor and the end of the range
    pub fn available(&self) -> u64 {
        self.size - self.pos
    }

    pub fn at_end(&self) -> bool {
        self.pos == self.size
    }

    /// Read everything from the cursor to the end of the range
    pub fn read_remaining(&mut self) -> io::Result<Vec<u8>> {
        let mut data = vec![0u8; self.available() as usize];
        self.read_exact(&mut data)?;
        Ok(data)
    }

    /// Number of bytes an I/O of `want` bytes may touch from the cursor
    fn clip(&self, want: usize) -> usize {
        (want as u64).min(self.available()) as usize
    }
}

impl<F: ParcelFile + ?Sized> Read for ObjectAccessor<'_, F> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.clip(buf.len());
        if n == 0 {
            return Ok(0);
        }

        self.file.seek(SeekFrom::Start(self.base + self.pos))?;
        let read = self.file.read(&mut buf[..n])?;
        self.pos += read as u64;
        Ok(read)
    }
}

impl<F: ParcelFile + ?Sized> Write for ObjectAccessor<'_, F> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.clip(buf.len());
        if n == 0 {
            return Ok(0);
        }

        self.file.seek(SeekFrom::Start(self.base + self.pos))?;
        let written = self.file.write(&buf[..n])?;
        self.pos += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl<F: ParcelFile + ?Sized> Seek for ObjectAccessor<'_, F> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target: i128 = match pos {
            SeekFrom::Start(p) => p as i128,
            SeekFrom::End(delta) => self.size as i128 + delta as i128,
            SeekFrom::Current(delta) => self.pos as i128 + delta as i128,
        };
        self.pos = target.clamp(0, self.size as i128) as u64;
        Ok(self.pos)
    }
}
