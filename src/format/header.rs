//! Parcel Header
//!
//! The single fixed record at offset 0. Holds the roots of the tree and the
//! freelist, the append point and the caller-settable root object id.

use bytes::{Buf, BufMut};

use crate::error::{ParcelError, Result};
use crate::file::{read_exact_at, write_all_at, ParcelFile};
use crate::zuid::{Zuid, ZUID_SIZE};

use super::{crc32, verify_crc, FLAG_TAIL_EXTEND, HEADER_SIZE, SIGNATURE, VERSION};

/// Byte offset of the CRC field (everything before it is checksummed)
const CRC_OFFSET: usize = HEADER_SIZE as usize - 4;

/// Decoded parcel header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub flags: u32,
    /// Offset of the tree's root node (0 = empty tree)
    pub treehead: u64,
    /// First node of the freelist (0 = empty list)
    pub freehead: u64,
    /// Last node of the freelist (0 = empty list)
    pub freetail: u64,
    /// First never-allocated byte
    pub tailptr: u64,
    /// Caller-designated root object
    pub root: Zuid,
}

impl Header {
    /// Absolute offset of the header
    pub const OFFSET: u64 = 0;

    /// Header for a freshly created parcel
    pub fn new(flags: u32) -> Self {
        Self {
            version: VERSION,
            flags,
            treehead: 0,
            freehead: 0,
            freetail: 0,
            tailptr: HEADER_SIZE,
            root: Zuid::NIL,
        }
    }

    pub fn tail_extend(&self) -> bool {
        self.flags & FLAG_TAIL_EXTEND != 0
    }

    pub fn set_tail_extend(&mut self, enabled: bool) {
        if enabled {
            self.flags |= FLAG_TAIL_EXTEND;
        } else {
            self.flags &= !FLAG_TAIL_EXTEND;
        }
    }

    /// Encode to the on-disk layout, CRC included
    pub fn encode(&self) -> [u8; HEADER_SIZE as usize] {
        let mut raw = [0u8; HEADER_SIZE as usize];
        {
            let mut buf = &mut raw[..];
            buf.put_slice(SIGNATURE);
            buf.put_u8(self.version);
            buf.put_u32(self.flags);
            buf.put_u64(self.treehead);
            buf.put_u64(self.freehead);
            buf.put_u64(self.freetail);
            buf.put_u64(self.tailptr);
            buf.put_slice(self.root.as_bytes());
        }
        let crc = crc32(&[&raw[..CRC_OFFSET]]);
        raw[CRC_OFFSET..].copy_from_slice(&crc.to_be_bytes());
        raw
    }

    /// Decode and validate: signature, then version, then CRC
    pub fn decode(raw: &[u8; HEADER_SIZE as usize]) -> Result<Self> {
        if &raw[..SIGNATURE.len()] != SIGNATURE {
            return Err(ParcelError::Sig);
        }

        let mut buf = &raw[SIGNATURE.len()..];
        let version = buf.get_u8();
        if version != VERSION {
            return Err(ParcelError::Version(version));
        }

        let flags = buf.get_u32();
        let treehead = buf.get_u64();
        let freehead = buf.get_u64();
        let freetail = buf.get_u64();
        let tailptr = buf.get_u64();
        let mut root = [0u8; ZUID_SIZE];
        buf.copy_to_slice(&mut root);
        let stored = buf.get_u32();

        verify_crc(Self::OFFSET, stored, &[&raw[..CRC_OFFSET]])?;

        Ok(Self {
            version,
            flags,
            treehead,
            freehead,
            freetail,
            tailptr,
            root: Zuid::from_bytes(root),
        })
    }

    /// Read the header from the start of `file`
    pub fn read<F: ParcelFile + ?Sized>(file: &mut F) -> Result<Self> {
        let mut raw = [0u8; HEADER_SIZE as usize];
        read_exact_at(file, Self::OFFSET, &mut raw)?;
        Self::decode(&raw)
    }

    /// Write the header to the start of `file`
    pub fn write<F: ParcelFile + ?Sized>(&self, file: &mut F) -> Result<()> {
        write_all_at(file, Self::OFFSET, &self.encode())
    }
}
