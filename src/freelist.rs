//! Freelist Allocator
//!
//! Hands out byte ranges of the parcel file, reusing ranges freed by
//! deletions before growing the file.
//!
//! ## Policy
//! - Requests are rounded up to at least one free node record, so every
//!   allocated range can later be turned back into a free node.
//! - First fit from `freehead`. A free range of size `S` serves a request of
//!   `n` bytes when `S >= n`:
//!   - `S == n`: the whole range is handed out.
//!   - `S >= n + FREE_NODE_SIZE`: the front `n` bytes are handed out and the
//!     remainder stays on the list in the split node's position.
//!   - otherwise the remainder could not hold a free node, so the whole range
//!     is handed out and the caller must remember the reserved size `S`.
//!     [`Freelist::allocate_exact`] skips such ranges, for fixed-size records
//!     that have nowhere to keep it.
//! - Nothing fits: grow at `tailptr` if tail extension is enabled, otherwise
//!   fail with `NoFree`.
//! - Freed ranges are appended at `freetail`. Adjacent ranges are not
//!   coalesced, so a parcel with many small deletions fragments.

use std::collections::HashSet;

use crate::error::{ParcelError, Result};
use crate::file::{write_all_at, ParcelFile};
use crate::format::{FreeNode, Header, FREE_NODE_SIZE, HEADER_SIZE};

/// Size actually reserved for a request of `min_size` bytes
pub fn alloc_size(min_size: u64) -> u64 {
    min_size.max(FREE_NODE_SIZE)
}

/// Allocator view over an open parcel's file and header
///
/// Every change to the list is persisted immediately, header included.
pub struct Freelist<'a, F: ParcelFile + ?Sized> {
    file: &'a mut F,
    header: &'a mut Header,
}

impl<'a, F: ParcelFile + ?Sized> Freelist<'a, F> {
    pub fn new(file: &'a mut F, header: &'a mut Header) -> Self {
        Self { file, header }
    }

    /// Allocate a range of at least `min_size` bytes
    ///
    /// Returns `(offset, reserved)`. `reserved` is `alloc_size(min_size)`,
    /// or the whole free range when it is less than a free node larger.
    pub fn allocate(&mut self, min_size: u64) -> Result<(u64, u64)> {
        self.allocate_with(alloc_size(min_size), true)
    }

    /// Allocate exactly `alloc_size(size)` bytes, never more
    pub fn allocate_exact(&mut self, size: u64) -> Result<(u64, u64)> {
        self.allocate_with(alloc_size(size), false)
    }

    fn allocate_with(&mut self, size: u64, take_whole: bool) -> Result<(u64, u64)> {
        let mut seen = HashSet::new();
        let mut prev: Option<FreeNode> = None;
        let mut cursor = self.header.freehead;

        while cursor != 0 {
            let node = self.load(cursor, &mut seen)?;

            let unsplittable = node.size > size && node.size < size + FREE_NODE_SIZE;
            if node.size == size || (take_whole && unsplittable) {
                tracing::debug!(
                    offset = node.offset,
                    size,
                    reserved = node.size,
                    "allocate: whole free range"
                );
                self.unlink(prev, &node, node.next, None)?;
                return Ok((node.offset, node.size));
            }

            if node.size >= size + FREE_NODE_SIZE {
                let remainder = FreeNode {
                    offset: node.offset + size,
                    next: node.next,
                    size: node.size - size,
                };
                tracing::debug!(
                    offset = node.offset,
                    size,
                    remainder = remainder.size,
                    "allocate: split free range"
                );
                remainder.write(self.file)?;
                self.unlink(prev, &node, remainder.offset, Some(remainder.offset))?;
                return Ok((node.offset, size));
            }

            prev = Some(node);
            cursor = node.next;
        }

        if !self.header.tail_extend() {
            return Err(ParcelError::NoFree { requested: size });
        }

        // Touch the last byte so the file always covers `tailptr`
        let offset = self.header.tailptr;
        write_all_at(self.file, offset + size - 1, &[0])?;
        self.header.tailptr += size;
        self.header.write(self.file)?;
        tracing::debug!(offset, size, tailptr = self.header.tailptr, "allocate: tail extend");
        Ok((offset, size))
    }

    /// Check that `free(offset, size)` would succeed without writing anything
    ///
    /// Validates the range and reads the current tail node, so callers can
    /// run it before mutating anything else.
    pub fn check_free(&mut self, offset: u64, size: u64) -> Result<()> {
        if offset < HEADER_SIZE || size < FREE_NODE_SIZE || offset + size > self.header.tailptr {
            return Err(ParcelError::Freelist(format!(
                "cannot free range [{}, {}) with tail at {}",
                offset,
                offset + size,
                self.header.tailptr
            )));
        }
        if offset == self.header.freetail {
            return Err(ParcelError::Freelist(format!(
                "range at {} is already the freelist tail",
                offset
            )));
        }
        self.tail()?;
        Ok(())
    }

    /// Return the range `[offset, offset + size)` to the freelist
    pub fn free(&mut self, offset: u64, size: u64) -> Result<()> {
        self.check_free(offset, size)?;
        let tail = self.tail()?;

        FreeNode::new(offset, size).write(self.file)?;

        match tail {
            None => self.header.freehead = offset,
            Some(mut tail) => {
                tail.next = offset;
                tail.write(self.file)?;
            }
        }
        self.header.freetail = offset;
        self.header.write(self.file)?;

        tracing::debug!(offset, size, "free range appended");
        Ok(())
    }

    /// All free ranges in list order
    pub fn ranges(&mut self) -> Result<Vec<FreeNode>> {
        let mut seen = HashSet::new();
        let mut nodes = Vec::new();
        let mut cursor = self.header.freehead;
        let mut last = 0;

        while cursor != 0 {
            let node = self.load(cursor, &mut seen)?;
            last = node.offset;
            cursor = node.next;
            nodes.push(node);
        }

        if last != self.header.freetail {
            return Err(ParcelError::Freelist(format!(
                "list ends at {} but header tail is {}",
                last, self.header.freetail
            )));
        }
        Ok(nodes)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Read a free node, validating its position, size and that the walk
    /// has not been here before
    fn load(&mut self, offset: u64, seen: &mut HashSet<u64>) -> Result<FreeNode> {
        if offset < HEADER_SIZE || offset + FREE_NODE_SIZE > self.header.tailptr {
            return Err(ParcelError::Freelist(format!(
                "free node offset {} outside file",
                offset
            )));
        }
        if !seen.insert(offset) {
            return Err(ParcelError::Freelist(format!("cycle at offset {}", offset)));
        }

        let node = FreeNode::read_at(self.file, offset)?;
        if node.size < FREE_NODE_SIZE || node.end() > self.header.tailptr {
            return Err(ParcelError::Freelist(format!(
                "free node at {} has bad size {}",
                offset, node.size
            )));
        }
        Ok(node)
    }

    /// Current tail node, validated
    fn tail(&mut self) -> Result<Option<FreeNode>> {
        match self.header.freetail {
            0 => Ok(None),
            offset => {
                let node = self.load(offset, &mut HashSet::new())?;
                if node.next != 0 {
                    return Err(ParcelError::Freelist(format!(
                        "tail node at {} links to {}",
                        offset, node.next
                    )));
                }
                Ok(Some(node))
            }
        }
    }

    /// Replace `node` in the list by `replacement` (its successor, or a split
    /// remainder) and persist the header
    fn unlink(
        &mut self,
        prev: Option<FreeNode>,
        node: &FreeNode,
        replacement: u64,
        new_tail: Option<u64>,
    ) -> Result<()> {
        match prev {
            Some(mut prev) => {
                prev.next = replacement;
                prev.write(self.file)?;
            }
            None => self.header.freehead = replacement,
        }

        if self.header.freetail == node.offset {
            self.header.freetail = new_tail.unwrap_or_else(|| prev.map_or(0, |p| p.offset));
        }
        self.header.write(self.file)
    }
}
