//! Tree Node
//!
//! One record per stored object. Links to its children by file offset and
//! carries a 16-byte payload field that holds either the value itself or an
//! `(offset, size)` pair pointing at an out-of-line payload region.
//!
//! The `extra` byte tells the two apart: `0..=16` is the inline length,
//! `0xff` marks an out-of-line payload.
//!
//! The top byte of the out-of-line size word is the slack: how many bytes the
//! allocator reserved beyond `max(size, FREE_NODE_SIZE)`. It is always smaller
//! than a free node, since any larger remainder would have been split off.

use bytes::{Buf, BufMut};

use crate::error::{ParcelError, Result};
use crate::file::{read_exact_at, write_all_at, ParcelFile};
use crate::zuid::{Zuid, ZUID_SIZE};

use super::{
    crc32, verify_crc, EXTRA_OUT_OF_LINE, FREE_NODE_SIZE, INLINE_SIZE, TREE_MAGIC, TREE_NODE_SIZE,
};

/// Byte offset of the CRC field
const CRC_OFFSET: usize = 38;

/// Byte offset of the payload field (after the CRC)
pub(crate) const PAYLOAD_OFFSET: usize = CRC_OFFSET + 4;

/// Largest out-of-line payload; the size word's top byte holds the slack
pub const MAX_PAYLOAD_SIZE: u64 = (1 << 56) - 1;

/// Where an object's value lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    /// Value stored in the node itself; only the first `len` bytes are used
    Inline { len: u8, bytes: [u8; INLINE_SIZE] },

    /// Value stored in a separately allocated region of `reserved` bytes,
    /// of which the first `size` are used
    OutOfLine { offset: u64, size: u64, reserved: u64 },
}

impl Payload {
    /// Inline payload from a value of at most 16 bytes
    pub fn inline(data: &[u8]) -> Self {
        debug_assert!(data.len() <= INLINE_SIZE);
        let mut bytes = [0u8; INLINE_SIZE];
        bytes[..data.len()].copy_from_slice(data);
        Payload::Inline {
            len: data.len() as u8,
            bytes,
        }
    }

    /// Length of the stored value in bytes
    pub fn size(&self) -> u64 {
        match self {
            Payload::Inline { len, .. } => u64::from(*len),
            Payload::OutOfLine { size, .. } => *size,
        }
    }

    /// Bytes to return to the freelist when the object goes away
    pub fn reserved(&self) -> u64 {
        match self {
            Payload::Inline { .. } => 0,
            Payload::OutOfLine { reserved, .. } => *reserved,
        }
    }
}

/// Decoded tree node, together with the offset it lives at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub offset: u64,
    pub key: Zuid,
    pub lnode: u64,
    pub rnode: u64,
    pub obj_type: u8,
    pub extra: u8,
    pub payload: [u8; INLINE_SIZE],
}

impl TreeNode {
    /// New leaf node at `offset`
    pub fn new(offset: u64, key: Zuid, obj_type: u8, payload: Payload) -> Self {
        let mut node = Self {
            offset,
            key,
            lnode: 0,
            rnode: 0,
            obj_type,
            extra: 0,
            payload: [0; INLINE_SIZE],
        };
        node.set_payload(payload);
        node
    }

    /// Interpret the payload field according to `extra`
    pub fn payload(&self) -> Result<Payload> {
        match self.extra {
            EXTRA_OUT_OF_LINE => {
                let mut buf = &self.payload[..];
                let offset = buf.get_u64();
                let word = buf.get_u64();
                let size = word & MAX_PAYLOAD_SIZE;
                let slack = word >> 56;
                if slack >= FREE_NODE_SIZE {
                    return Err(ParcelError::Encoding(format!(
                        "tree node at {} has payload slack {}",
                        self.offset, slack
                    )));
                }
                Ok(Payload::OutOfLine {
                    offset,
                    size,
                    reserved: size.max(FREE_NODE_SIZE) + slack,
                })
            }
            len if usize::from(len) <= INLINE_SIZE => Ok(Payload::Inline {
                len,
                bytes: self.payload,
            }),
            other => Err(ParcelError::Encoding(format!(
                "tree node at {} has invalid payload marker {:#04x}",
                self.offset, other
            ))),
        }
    }

    pub fn set_payload(&mut self, payload: Payload) {
        match payload {
            Payload::Inline { len, bytes } => {
                self.extra = len;
                self.payload = bytes;
            }
            Payload::OutOfLine {
                offset,
                size,
                reserved,
            } => {
                debug_assert!(size <= MAX_PAYLOAD_SIZE);
                let slack = reserved.saturating_sub(size.max(FREE_NODE_SIZE));
                debug_assert!(slack < FREE_NODE_SIZE);
                self.extra = EXTRA_OUT_OF_LINE;
                let mut buf = &mut self.payload[..];
                buf.put_u64(offset);
                buf.put_u64(size | (slack << 56));
            }
        }
    }

    /// Encode to the on-disk layout, CRC included
    pub fn encode(&self) -> [u8; TREE_NODE_SIZE as usize] {
        let mut raw = [0u8; TREE_NODE_SIZE as usize];
        {
            let mut buf = &mut raw[..];
            buf.put_u32(TREE_MAGIC);
            buf.put_slice(self.key.as_bytes());
            buf.put_u64(self.lnode);
            buf.put_u64(self.rnode);
            buf.put_u8(self.obj_type);
            buf.put_u8(self.extra);
            buf.put_u32(0);
            buf.put_slice(&self.payload);
        }
        let crc = crc32(&[&raw[..CRC_OFFSET], &raw[PAYLOAD_OFFSET..]]);
        raw[CRC_OFFSET..PAYLOAD_OFFSET].copy_from_slice(&crc.to_be_bytes());
        raw
    }

    /// Decode and validate: magic, then CRC
    pub fn decode(offset: u64, raw: &[u8; TREE_NODE_SIZE as usize]) -> Result<Self> {
        let mut buf = &raw[..];
        let magic = buf.get_u32();
        if magic != TREE_MAGIC {
            return Err(ParcelError::Magic {
                offset,
                found: magic,
            });
        }

        let mut key = [0u8; ZUID_SIZE];
        buf.copy_to_slice(&mut key);
        let lnode = buf.get_u64();
        let rnode = buf.get_u64();
        let obj_type = buf.get_u8();
        let extra = buf.get_u8();
        let stored = buf.get_u32();
        let mut payload = [0u8; INLINE_SIZE];
        buf.copy_to_slice(&mut payload);

        verify_crc(offset, stored, &[&raw[..CRC_OFFSET], &raw[PAYLOAD_OFFSET..]])?;

        Ok(Self {
            offset,
            key: Zuid::from_bytes(key),
            lnode,
            rnode,
            obj_type,
            extra,
            payload,
        })
    }

    /// Read and validate the node at `offset`
    pub fn read_at<F: ParcelFile + ?Sized>(file: &mut F, offset: u64) -> Result<Self> {
        let mut raw = [0u8; TREE_NODE_SIZE as usize];
        read_exact_at(file, offset, &mut raw)?;
        Self::decode(offset, &raw)
    }

    /// Write the node at its offset
    pub fn write<F: ParcelFile + ?Sized>(&self, file: &mut F) -> Result<()> {
        write_all_at(file, self.offset, &self.encode())
    }
}
