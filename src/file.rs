//! Parcel File
//!
//! The byte-addressable medium a parcel lives in. Anything that can read,
//! write and seek can back a parcel: a real file, an in-memory buffer, etc.
//!
//! The helpers at the bottom are the only place raw I/O errors are turned
//! into [`ParcelError`]s, so every record and payload access reports the same
//! error kinds.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use crate::error::{ParcelError, Result};

/// Storage medium for a parcel
pub trait ParcelFile: Read + Write + Seek {
    /// Total size of the medium in bytes
    fn file_size(&mut self) -> io::Result<u64> {
        let pos = self.stream_position()?;
        let end = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(pos))?;
        Ok(end)
    }

    /// Flush written data to stable storage
    fn sync(&mut self) -> io::Result<()> {
        self.flush()
    }

    /// Discard all content (used by `create`)
    fn clear(&mut self) -> io::Result<()>;

    /// True if the cursor is at the end of the medium
    fn at_end(&mut self) -> io::Result<bool> {
        let pos = self.stream_position()?;
        Ok(pos >= self.file_size()?)
    }
}

impl ParcelFile for File {
    fn file_size(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.flush()?;
        self.sync_all()
    }

    fn clear(&mut self) -> io::Result<()> {
        self.set_len(0)?;
        self.seek(SeekFrom::Start(0))?;
        Ok(())
    }
}

impl ParcelFile for Cursor<Vec<u8>> {
    fn file_size(&mut self) -> io::Result<u64> {
        Ok(self.get_ref().len() as u64)
    }

    fn clear(&mut self) -> io::Result<()> {
        self.get_mut().clear();
        self.set_position(0);
        Ok(())
    }
}

impl<T: ParcelFile + ?Sized> ParcelFile for Box<T> {
    fn file_size(&mut self) -> io::Result<u64> {
        (**self).file_size()
    }

    fn sync(&mut self) -> io::Result<()> {
        (**self).sync()
    }

    fn clear(&mut self) -> io::Result<()> {
        (**self).clear()
    }
}

// =============================================================================
// Positioned I/O helpers
// =============================================================================

/// Seek to an absolute offset
pub(crate) fn seek_to<F: ParcelFile + ?Sized>(file: &mut F, offset: u64) -> Result<()> {
    file.seek(SeekFrom::Start(offset))
        .map(|_| ())
        .map_err(ParcelError::Seek)
}

/// Read exactly `buf.len()` bytes at `offset`
///
/// Hitting end of file is reported as `Trunc`, not as a read error.
pub(crate) fn read_exact_at<F: ParcelFile + ?Sized>(
    file: &mut F,
    offset: u64,
    buf: &mut [u8],
) -> Result<()> {
    seek_to(file, offset)?;
    file.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => ParcelError::Trunc { offset },
        _ => ParcelError::Read(e),
    })
}

/// Write all of `buf` at `offset`
pub(crate) fn write_all_at<F: ParcelFile + ?Sized>(
    file: &mut F,
    offset: u64,
    buf: &[u8],
) -> Result<()> {
    seek_to(file, offset)?;
    file.write_all(buf).map_err(ParcelError::Write)
}
