//! On-Disk Format
//!
//! Fixed-layout records of a parcel file. All multi-byte fields are
//! big-endian, every record ends its fixed part with a CRC32.
//!
//! ## File Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ Header (64 bytes, offset 0)                                     │
//! │   Sig "ZPARCEL" (7) | Version (1) | Flags (4)                   │
//! │   TreeHead (8) | FreeHead (8) | FreeTail (8) | TailPtr (8)      │
//! │   Root (16) | CRC32 (4)                                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Tree nodes, free nodes and out-of-line payloads, in any order   │
//! │                                                                 │
//! │ Tree Node (58 bytes)                                            │
//! │   Magic "ZTRN" (4) | Key (16) | LNode (8) | RNode (8)           │
//! │   Type (1) | Extra (1) | CRC32 (4) | Payload (16)               │
//! │                                                                 │
//! │ Free Node (24 bytes, head of a free range)                      │
//! │   Magic "ZFRE" (4) | Next (8) | Size (8) | CRC32 (4)            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ TailPtr: first never-allocated byte                             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod free_node;
mod header;
mod tree_node;

pub use free_node::FreeNode;
pub use header::Header;
pub use tree_node::{Payload, TreeNode, MAX_PAYLOAD_SIZE};
pub(crate) use tree_node::PAYLOAD_OFFSET;

use crate::error::{ParcelError, Result};

// =============================================================================
// Shared Constants
// =============================================================================

/// File signature, format family "ZPARCEL"
pub const SIGNATURE: &[u8; 7] = b"ZPARCEL";

/// Current format version (type 1 parcel: no pages, payload in tree node)
pub const VERSION: u8 = 1;

/// Header flag: extend the file on its tail when no free range fits
pub const FLAG_TAIL_EXTEND: u32 = 1;

/// Magic number of a tree node
pub const TREE_MAGIC: u32 = u32::from_be_bytes(*b"ZTRN");

/// Magic number of a free node
pub const FREE_MAGIC: u32 = u32::from_be_bytes(*b"ZFRE");

/// Header size: 7 + 1 + 4 + 8 * 4 + 16 + 4 = 64 bytes
pub const HEADER_SIZE: u64 = 64;

/// Tree node size: 4 + 16 + 8 + 8 + 1 + 1 + 4 + 16 = 58 bytes
pub const TREE_NODE_SIZE: u64 = 58;

/// Free node size: 4 + 8 + 8 + 4 = 24 bytes
pub const FREE_NODE_SIZE: u64 = 24;

/// Size of the inline payload region of a tree node
pub const INLINE_SIZE: usize = 16;

/// `extra` value marking an out-of-line payload
pub const EXTRA_OUT_OF_LINE: u8 = 0xff;

/// Offset value meaning "no node"
pub const NULL_OFFSET: u64 = 0;

// =============================================================================
// Checksum helpers
// =============================================================================

/// CRC32 over a sequence of byte slices
pub(crate) fn crc32(parts: &[&[u8]]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize()
}

/// Compare a stored checksum against one computed over `parts`
pub(crate) fn verify_crc(offset: u64, stored: u32, parts: &[&[u8]]) -> Result<()> {
    let computed = crc32(parts);
    if stored != computed {
        tracing::warn!(offset, stored, computed, "crc mismatch");
        return Err(ParcelError::Crc {
            offset,
            stored,
            computed,
        });
    }
    Ok(())
}
