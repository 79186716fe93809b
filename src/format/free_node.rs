//! Free Node
//!
//! Head record of a reclaimed byte range. Free nodes form a singly linked
//! list starting at the header's `freehead`.

use bytes::{Buf, BufMut};

use crate::error::{ParcelError, Result};
use crate::file::{read_exact_at, write_all_at, ParcelFile};

use super::{crc32, verify_crc, FREE_MAGIC, FREE_NODE_SIZE};

/// Byte offset of the CRC field
const CRC_OFFSET: usize = FREE_NODE_SIZE as usize - 4;

/// Decoded free node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeNode {
    pub offset: u64,
    /// Next free node (0 = end of list)
    pub next: u64,
    /// Size of the whole free range, this record included
    pub size: u64,
}

impl FreeNode {
    pub fn new(offset: u64, size: u64) -> Self {
        Self {
            offset,
            next: 0,
            size,
        }
    }

    /// One past the last byte of the range
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    pub fn encode(&self) -> [u8; FREE_NODE_SIZE as usize] {
        let mut raw = [0u8; FREE_NODE_SIZE as usize];
        {
            let mut buf = &mut raw[..];
            buf.put_u32(FREE_MAGIC);
            buf.put_u64(self.next);
            buf.put_u64(self.size);
        }
        let crc = crc32(&[&raw[..CRC_OFFSET]]);
        raw[CRC_OFFSET..].copy_from_slice(&crc.to_be_bytes());
        raw
    }

    pub fn decode(offset: u64, raw: &[u8; FREE_NODE_SIZE as usize]) -> Result<Self> {
        let mut buf = &raw[..];
        let magic = buf.get_u32();
        if magic != FREE_MAGIC {
            return Err(ParcelError::Magic {
                offset,
                found: magic,
            });
        }

        let next = buf.get_u64();
        let size = buf.get_u64();
        let stored = buf.get_u32();
        verify_crc(offset, stored, &[&raw[..CRC_OFFSET]])?;

        Ok(Self { offset, next, size })
    }

    pub fn read_at<F: ParcelFile + ?Sized>(file: &mut F, offset: u64) -> Result<Self> {
        let mut raw = [0u8; FREE_NODE_SIZE as usize];
        read_exact_at(file, offset, &mut raw)?;
        Self::decode(offset, &raw)
    }

    pub fn write<F: ParcelFile + ?Sized>(&self, file: &mut F) -> Result<()> {
        write_all_at(file, self.offset, &self.encode())
    }
}
