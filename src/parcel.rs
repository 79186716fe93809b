//! Parcel
//!
//! The object store façade: typed store/fetch per value kind, existence and
//! removal, root pointer and listing, on top of the tree index and the
//! freelist allocator.
//!
//! ## Store
//! 1. Validate: the id must be absent and its slot within `max_depth`
//! 2. Allocate the tree node, then the out-of-line payload (if > 16 bytes)
//! 3. Write the payload, then the node
//! 4. Link the node into the tree, update the cache
//!
//! A failure in step 2 returns the node range to the freelist, so a failed
//! store leaves no reachable trace.
//!
//! ## Remove
//! Both ranges are checked against the freelist before the tree is touched.
//! The cache entries of the removed and relinked nodes are dropped as soon as
//! the tree has been written, whatever happens afterwards.
//!
//! ## Fetch
//! Cache first, tree search on a miss. The node is CRC checked when read;
//! the stored type tag must match the requested kind.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::path::Path;

use crate::accessor::ObjectAccessor;
use crate::config::{ParcelConfig, SyncStrategy};
use crate::error::{ParcelError, Result};
use crate::file::{write_all_at, ParcelFile};
use crate::format::{
    Header, Payload, TreeNode, FLAG_TAIL_EXTEND, HEADER_SIZE, INLINE_SIZE, MAX_PAYLOAD_SIZE,
    PAYLOAD_OFFSET, TREE_NODE_SIZE,
};
use crate::freelist::Freelist;
use crate::object::{
    decode_bool, decode_file, decode_float, decode_list, decode_sint, decode_string, decode_uint,
    decode_zuid, encode_list, FileObject, ObjectEntry, ObjectInfo, ObjectType, Value,
};
use crate::tree::{Located, Slot, TreeIndex};
use crate::zuid::Zuid;

/// Lifecycle state of a parcel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParcelState {
    Open,
    Closed,
    /// Open, but advisory read-only: mutating operations fail with `Locked`
    Locked,
}

/// Summary produced by [`Parcel::verify`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub objects: u64,
    /// Bytes held by tree nodes and out-of-line payloads
    pub live_bytes: u64,
    pub free_ranges: u64,
    pub free_bytes: u64,
    pub tailptr: u64,
}

/// A single-file object store
pub struct Parcel<F: ParcelFile> {
    config: ParcelConfig,
    state: ParcelState,
    file: Option<F>,
    header: Header,
    cache: HashMap<Zuid, ObjectInfo>,
}

impl<F: ParcelFile> Parcel<F> {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Initialize a fresh parcel in `file`, destroying any prior content
    pub fn create(mut file: F, config: ParcelConfig) -> Result<Self> {
        file.clear().map_err(ParcelError::Write)?;

        let flags = if config.tail_extend { FLAG_TAIL_EXTEND } else { 0 };
        let header = Header::new(flags);
        header.write(&mut file)?;
        file.sync().map_err(ParcelError::Write)?;

        tracing::debug!(flags, "parcel created");
        Ok(Self::with_header(file, header, config))
    }

    /// Open an existing parcel, validating its header
    pub fn open(mut file: F, config: ParcelConfig) -> Result<Self> {
        let header = Header::read(&mut file)?;

        let size = file.file_size().map_err(ParcelError::Read)?;
        if header.tailptr < HEADER_SIZE || header.tailptr > size {
            return Err(ParcelError::Trunc {
                offset: header.tailptr,
            });
        }

        tracing::debug!(
            treehead = header.treehead,
            freehead = header.freehead,
            tailptr = header.tailptr,
            "parcel opened"
        );
        Ok(Self::with_header(file, header, config))
    }

    fn with_header(file: F, header: Header, config: ParcelConfig) -> Self {
        Self {
            config,
            state: ParcelState::Open,
            file: Some(file),
            header,
            cache: HashMap::new(),
        }
    }

    /// Sync and release the file; every later operation fails with `NotOpen`
    pub fn close(&mut self) -> Result<F> {
        let mut file = self.file.take().ok_or(ParcelError::NotOpen)?;
        self.state = ParcelState::Closed;
        self.cache.clear();
        file.sync().map_err(ParcelError::Write)?;
        tracing::debug!("parcel closed");
        Ok(file)
    }

    /// Mark the parcel read-only for this process
    pub fn lock(&mut self) -> Result<()> {
        self.file_ref()?;
        self.state = ParcelState::Locked;
        Ok(())
    }

    pub fn unlock(&mut self) -> Result<()> {
        self.file_ref()?;
        self.state = ParcelState::Open;
        Ok(())
    }

    pub fn state(&self) -> ParcelState {
        self.state
    }

    /// Last header read or written
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn config(&self) -> &ParcelConfig {
        &self.config
    }

    /// Enable or disable tail extension (persisted in the header flags)
    pub fn set_tail_extend(&mut self, enabled: bool) -> Result<()> {
        let (file, header) = self.parts_mut()?;
        header.set_tail_extend(enabled);
        header.write(file)?;
        self.after_write()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// True if `id` is stored. Never fails; damage is logged and reported as
    /// absent.
    pub fn exists(&mut self, id: Zuid) -> bool {
        self.get_type(id).is_some()
    }

    /// Type of the object `id`, `None` if there is no such object
    pub fn get_type(&mut self, id: Zuid) -> Option<ObjectType> {
        match self.object_info(id) {
            Ok(info) => Some(info.obj_type),
            Err(ParcelError::NoExist(_)) => None,
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "lookup failed");
                None
            }
        }
    }

    /// Look up an object's position and payload descriptor
    pub fn object_info(&mut self, id: Zuid) -> Result<ObjectInfo> {
        self.file_ref()?;
        if let Some(info) = self.cache.get(&id) {
            return Ok(*info);
        }

        let max_depth = self.config.max_depth;
        let (file, header) = self.parts()?;
        let Located { node, parent, .. } = TreeIndex::new(file, header, max_depth).search(id)?;
        let payload = node.payload()?;
        let parent = parent.map_or(0, |(p, _)| p.offset);
        let info = ObjectInfo::new(&node, parent, payload);

        if self.config.cache_objects {
            self.cache.insert(id, info);
        }
        Ok(info)
    }

    /// All objects in ascending id order
    pub fn list_objects(&mut self) -> Result<Vec<ObjectEntry>> {
        let max_depth = self.config.max_depth;
        let (file, header) = self.parts()?;
        let nodes = TreeIndex::new(file, header, max_depth).walk()?;

        nodes
            .into_iter()
            .map(|(node, depth)| {
                let payload = node.payload()?;
                Ok(ObjectEntry {
                    id: node.key,
                    obj_type: ObjectType::from_tag(node.obj_type),
                    depth,
                    offset: node.offset,
                    size: payload.size(),
                    out_of_line: matches!(payload, Payload::OutOfLine { .. }),
                })
            })
            .collect()
    }

    /// Free ranges as `(offset, size)`, in freelist order
    pub fn free_ranges(&mut self) -> Result<Vec<(u64, u64)>> {
        let (file, header) = self.parts()?;
        let nodes = Freelist::new(file, header).ranges()?;
        Ok(nodes.into_iter().map(|n| (n.offset, n.size)).collect())
    }

    /// Walk the whole tree and freelist and check that no two ranges overlap
    /// and everything lies below the tail pointer
    pub fn verify(&mut self) -> Result<VerifyReport> {
        let objects = self.list_objects()?;
        let free = self.free_ranges()?;
        let tailptr = self.header.tailptr;

        // (start, end, is_free)
        let mut ranges: Vec<(u64, u64, bool)> = Vec::new();
        let mut report = VerifyReport {
            tailptr,
            ..Default::default()
        };

        for entry in &objects {
            ranges.push((entry.offset, entry.offset + TREE_NODE_SIZE, false));
            report.live_bytes += TREE_NODE_SIZE;
            if entry.out_of_line {
                let info = self.object_info(entry.id)?;
                if let Payload::OutOfLine {
                    offset, reserved, ..
                } = info.payload
                {
                    ranges.push((offset, offset.saturating_add(reserved), false));
                    report.live_bytes += reserved;
                }
            }
        }
        for &(offset, size) in &free {
            ranges.push((offset, offset.saturating_add(size), true));
            report.free_bytes += size;
        }

        ranges.sort_unstable();
        let mut last_end = HEADER_SIZE;
        let mut last_free = false;
        for &(start, end, is_free) in &ranges {
            let problem = if start < last_end {
                Some((format!("overlaps range ending at {}", last_end), is_free || last_free))
            } else if end > tailptr {
                Some((format!("extends past tail at {}", tailptr), is_free))
            } else {
                None
            };
            if let Some((problem, in_freelist)) = problem {
                let msg = format!("range [{}, {}) {}", start, end, problem);
                tracing::warn!("{}", msg);
                return Err(if in_freelist {
                    ParcelError::Freelist(msg)
                } else {
                    ParcelError::Tree(msg)
                });
            }
            last_end = end;
            last_free = is_free;
        }

        report.objects = objects.len() as u64;
        report.free_ranges = free.len() as u64;
        Ok(report)
    }

    // =========================================================================
    // Root object
    // =========================================================================

    pub fn root(&self) -> Result<Zuid> {
        self.file_ref()?;
        Ok(self.header.root)
    }

    pub fn set_root(&mut self, id: Zuid) -> Result<()> {
        let (file, header) = self.parts_mut()?;
        header.root = id;
        header.write(file)?;
        self.after_write()
    }

    // =========================================================================
    // Store
    // =========================================================================

    pub fn store_null(&mut self, id: Zuid) -> Result<()> {
        self.store_object(id, ObjectType::Null.tag(), &[])
    }

    pub fn store_bool(&mut self, id: Zuid, value: bool) -> Result<()> {
        self.store(id, &Value::Bool(value))
    }

    pub fn store_uint(&mut self, id: Zuid, value: u64) -> Result<()> {
        self.store(id, &Value::Uint(value))
    }

    pub fn store_sint(&mut self, id: Zuid, value: i64) -> Result<()> {
        self.store(id, &Value::Sint(value))
    }

    pub fn store_float(&mut self, id: Zuid, value: f64) -> Result<()> {
        self.store(id, &Value::Float(value))
    }

    pub fn store_zuid(&mut self, id: Zuid, value: Zuid) -> Result<()> {
        self.store_object(id, ObjectType::Zuid.tag(), value.as_bytes())
    }

    pub fn store_blob(&mut self, id: Zuid, data: &[u8]) -> Result<()> {
        self.store_object(id, ObjectType::Blob.tag(), data)
    }

    pub fn store_string(&mut self, id: Zuid, value: &str) -> Result<()> {
        self.store_object(id, ObjectType::String.tag(), value.as_bytes())
    }

    pub fn store_list(&mut self, id: Zuid, ids: &[Zuid]) -> Result<()> {
        self.store_object(id, ObjectType::List.tag(), &encode_list(ids))
    }

    /// Store any value under its own type tag
    ///
    /// `Value::Unknown` is accepted only for tags no known type claims.
    pub fn store(&mut self, id: Zuid, value: &Value) -> Result<()> {
        if let Value::Unknown { tag, .. } = value {
            let known = ObjectType::from_tag(*tag);
            if known != ObjectType::Unknown {
                return Err(ParcelError::Encoding(format!(
                    "tag {} belongs to {}, store it as that type",
                    tag, known
                )));
            }
        }
        self.store_object(id, value.tag(), &value.encode())
    }

    /// Stream `size` bytes from `reader` into a new blob object
    ///
    /// The payload is written through an accessor, so large blobs are never
    /// buffered whole. A reader that ends early fails with `Trunc`.
    pub fn store_blob_from<R: Read>(&mut self, id: Zuid, reader: R, size: u64) -> Result<()> {
        self.store_stream(id, ObjectType::Blob.tag(), reader, size)
    }

    /// Store a file object: `name` as a string object, `content` as a blob
    /// object, both under fresh ids, and the file node referencing them
    pub fn store_file(&mut self, id: Zuid, name: &str, content: &[u8]) -> Result<FileObject> {
        self.store_file_parts(id, name, |parcel, data_id| parcel.store_blob(data_id, content))
    }

    /// Like [`store_file`](Self::store_file), streaming the content
    pub fn store_file_from<R: Read>(
        &mut self,
        id: Zuid,
        name: &str,
        reader: R,
        size: u64,
    ) -> Result<FileObject> {
        self.store_file_parts(id, name, |parcel, data_id| {
            parcel.store_blob_from(data_id, reader, size)
        })
    }

    /// Store a file object that references existing name and data objects
    pub fn store_file_ref(&mut self, id: Zuid, file: FileObject) -> Result<()> {
        self.store(id, &Value::File(file))
    }

    // =========================================================================
    // Fetch
    // =========================================================================

    /// Fetch any object as a [`Value`]
    pub fn fetch(&mut self, id: Zuid) -> Result<Value> {
        let info = self.object_info(id)?;
        let data = self.read_payload(&info)?;
        Value::decode(info.tag, data)
    }

    /// Check that `id` exists and holds null
    pub fn fetch_null(&mut self, id: Zuid) -> Result<()> {
        let info = self.expect_type(id, ObjectType::Null)?;
        if info.payload.size() != 0 {
            return Err(ParcelError::Encoding(format!(
                "null object {} has a {} byte payload",
                id,
                info.payload.size()
            )));
        }
        Ok(())
    }

    pub fn fetch_bool(&mut self, id: Zuid) -> Result<bool> {
        let data = self.fetch_typed(id, ObjectType::Bool)?;
        decode_bool(&data)
    }

    pub fn fetch_uint(&mut self, id: Zuid) -> Result<u64> {
        let data = self.fetch_typed(id, ObjectType::Uint)?;
        decode_uint(&data)
    }

    pub fn fetch_sint(&mut self, id: Zuid) -> Result<i64> {
        let data = self.fetch_typed(id, ObjectType::Sint)?;
        decode_sint(&data)
    }

    pub fn fetch_float(&mut self, id: Zuid) -> Result<f64> {
        let data = self.fetch_typed(id, ObjectType::Float)?;
        decode_float(&data)
    }

    pub fn fetch_zuid(&mut self, id: Zuid) -> Result<Zuid> {
        let data = self.fetch_typed(id, ObjectType::Zuid)?;
        decode_zuid(&data)
    }

    pub fn fetch_blob(&mut self, id: Zuid) -> Result<Vec<u8>> {
        self.fetch_typed(id, ObjectType::Blob)
    }

    /// Accessor over a blob's payload, for streaming reads
    pub fn fetch_blob_reader(&mut self, id: Zuid) -> Result<ObjectAccessor<'_, F>> {
        let info = self.expect_type(id, ObjectType::Blob)?;
        self.accessor(&info)
    }

    /// Accessor for overwriting an out-of-line blob in place
    ///
    /// The blob keeps its size. Inline blobs are covered by the tree node
    /// checksum and are refused.
    pub fn fetch_blob_writer(&mut self, id: Zuid) -> Result<ObjectAccessor<'_, F>> {
        self.parts_mut()?;
        let info = self.expect_type(id, ObjectType::Blob)?;
        if let Payload::Inline { .. } = info.payload {
            return Err(ParcelError::Encoding(format!(
                "blob {} is inline and cannot be written in place",
                id
            )));
        }
        self.accessor(&info)
    }

    pub fn fetch_string(&mut self, id: Zuid) -> Result<String> {
        let data = self.fetch_typed(id, ObjectType::String)?;
        decode_string(data)
    }

    pub fn fetch_list(&mut self, id: Zuid) -> Result<Vec<Zuid>> {
        let data = self.fetch_typed(id, ObjectType::List)?;
        decode_list(&data)
    }

    /// Ids of a file object's name and data objects
    pub fn fetch_file(&mut self, id: Zuid) -> Result<FileObject> {
        let data = self.fetch_typed(id, ObjectType::File)?;
        decode_file(&data)
    }

    pub fn fetch_file_name(&mut self, id: Zuid) -> Result<String> {
        let file = self.fetch_file(id)?;
        self.fetch_string(file.name_id)
    }

    /// Accessor over a file object's content
    pub fn fetch_file_reader(&mut self, id: Zuid) -> Result<ObjectAccessor<'_, F>> {
        let file = self.fetch_file(id)?;
        self.fetch_blob_reader(file.data_id)
    }

    // =========================================================================
    // Remove
    // =========================================================================

    /// Remove an object and return its space to the freelist
    ///
    /// Removing a file object removes only the file node; its name and data
    /// objects stay.
    pub fn remove_object(&mut self, id: Zuid) -> Result<()> {
        self.parts_mut()?;
        let info = self.object_info(id)?;
        let payload_range = match info.payload {
            Payload::OutOfLine {
                offset, reserved, ..
            } => Some((offset, reserved)),
            Payload::Inline { .. } => None,
        };

        let max_depth = self.config.max_depth;
        let removal = {
            let (file, header) = self.parts_mut()?;
            let mut freelist = Freelist::new(&mut *file, &mut *header);
            freelist.check_free(info.tree, TREE_NODE_SIZE)?;
            if let Some((offset, reserved)) = payload_range {
                freelist.check_free(offset, reserved)?;
            }
            TreeIndex::new(&mut *file, &mut *header, max_depth).remove(id)
        };

        // The tree may be partly rewritten even on error
        self.cache.remove(&id);
        let removal = removal?;
        for key in &removal.relinked {
            self.cache.remove(key);
        }

        let (file, header) = self.parts_mut()?;
        let mut freelist = Freelist::new(file, header);
        freelist.free(removal.node.offset, TREE_NODE_SIZE)?;
        if let Some((offset, reserved)) = payload_range {
            freelist.free(offset, reserved)?;
        }

        tracing::debug!(id = %id, "object removed");
        self.after_write()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Open file, or `NotOpen`
    fn file_ref(&self) -> Result<&F> {
        match (&self.file, self.state) {
            (Some(file), ParcelState::Open | ParcelState::Locked) => Ok(file),
            _ => Err(ParcelError::NotOpen),
        }
    }

    /// File and header for reading
    fn parts(&mut self) -> Result<(&mut F, &mut Header)> {
        match (&mut self.file, self.state) {
            (Some(file), ParcelState::Open | ParcelState::Locked) => Ok((file, &mut self.header)),
            _ => Err(ParcelError::NotOpen),
        }
    }

    /// File and header for writing; refused while locked
    fn parts_mut(&mut self) -> Result<(&mut F, &mut Header)> {
        if self.state == ParcelState::Locked {
            return Err(ParcelError::Locked);
        }
        self.parts()
    }

    fn after_write(&mut self) -> Result<()> {
        if self.config.sync_strategy == SyncStrategy::EveryWrite {
            let (file, _) = self.parts()?;
            file.sync().map_err(ParcelError::Write)?;
        }
        Ok(())
    }

    fn expect_type(&mut self, id: Zuid, expected: ObjectType) -> Result<ObjectInfo> {
        let info = self.object_info(id)?;
        if info.obj_type != expected {
            return Err(ParcelError::TypeMismatch {
                id,
                expected,
                found: info.obj_type,
            });
        }
        Ok(info)
    }

    fn fetch_typed(&mut self, id: Zuid, expected: ObjectType) -> Result<Vec<u8>> {
        let info = self.expect_type(id, expected)?;
        self.read_payload(&info)
    }

    fn read_payload(&mut self, info: &ObjectInfo) -> Result<Vec<u8>> {
        match info.payload {
            Payload::Inline { len, bytes } => Ok(bytes[..usize::from(len)].to_vec()),
            Payload::OutOfLine { .. } => {
                let mut accessor = self.accessor(info)?;
                let base = accessor.base();
                accessor.read_remaining().map_err(|e| match e.kind() {
                    io::ErrorKind::UnexpectedEof => ParcelError::Trunc { offset: base },
                    _ => ParcelError::Read(e),
                })
            }
        }
    }

    /// Accessor over an object's payload bytes, wherever they live
    fn accessor(&mut self, info: &ObjectInfo) -> Result<ObjectAccessor<'_, F>> {
        let (base, size) = match info.payload {
            Payload::Inline { len, .. } => (info.tree + PAYLOAD_OFFSET as u64, u64::from(len)),
            Payload::OutOfLine { offset, size, .. } => (offset, size),
        };

        let (file, header) = self.parts()?;
        let end = base.checked_add(size).ok_or(ParcelError::Trunc { offset: base })?;
        if base < HEADER_SIZE || end > header.tailptr {
            return Err(ParcelError::Trunc { offset: base });
        }
        Ok(ObjectAccessor::new(file, base, size))
    }

    /// Validate, allocate, write and link a new object with payload `data`
    fn store_object(&mut self, id: Zuid, tag: u8, data: &[u8]) -> Result<()> {
        let size = data.len() as u64;
        self.store_with(id, tag, size, |file, region| match region {
            None => Ok(Payload::inline(data)),
            Some((offset, reserved)) => {
                write_all_at(file, offset, data)?;
                Ok(Payload::OutOfLine {
                    offset,
                    size,
                    reserved,
                })
            }
        })
    }

    /// Like `store_object`, with the payload streamed from `reader`
    fn store_stream<R: Read>(&mut self, id: Zuid, tag: u8, reader: R, size: u64) -> Result<()> {
        let mut reader = reader.take(size);

        if size <= INLINE_SIZE as u64 {
            let mut data = Vec::with_capacity(size as usize);
            reader.read_to_end(&mut data).map_err(ParcelError::Read)?;
            if data.len() as u64 != size {
                return Err(ParcelError::Trunc { offset: 0 });
            }
            return self.store_object(id, tag, &data);
        }

        self.store_with(id, tag, size, |file, region| {
            let (offset, reserved) = region.ok_or(ParcelError::Trunc { offset: 0 })?;
            let mut accessor = ObjectAccessor::new(file, offset, size);
            let copied = io::copy(&mut reader, &mut accessor).map_err(ParcelError::Write)?;
            if copied != size {
                return Err(ParcelError::Trunc {
                    offset: offset + copied,
                });
            }
            Ok(Payload::OutOfLine {
                offset,
                size,
                reserved,
            })
        })
    }

    /// Shared store path
    ///
    /// `fill` receives the out-of-line region as `(offset, reserved)` (`None`
    /// for inline payloads), writes the payload and returns its descriptor.
    /// Any failure before the node is linked releases the ranges allocated so
    /// far.
    fn store_with<W>(&mut self, id: Zuid, tag: u8, size: u64, fill: W) -> Result<()>
    where
        W: FnOnce(&mut F, Option<(u64, u64)>) -> Result<Payload>,
    {
        let max_depth = self.config.max_depth;
        let (file, header) = self.parts_mut()?;

        if size > MAX_PAYLOAD_SIZE {
            return Err(ParcelError::Encoding(format!(
                "payload of {} bytes exceeds the {} byte limit",
                size, MAX_PAYLOAD_SIZE
            )));
        }

        let slot: Slot = TreeIndex::new(&mut *file, &mut *header, max_depth).find_slot(id)?;
        let parent = slot.parent.as_ref().map(|(p, _)| (p.key, p.offset));

        let (node_offset, _) =
            Freelist::new(&mut *file, &mut *header).allocate_exact(TREE_NODE_SIZE)?;

        let region = if size > INLINE_SIZE as u64 {
            match Freelist::new(&mut *file, &mut *header).allocate(size) {
                Ok(region) => Some(region),
                Err(e) => {
                    Freelist::new(&mut *file, &mut *header).free(node_offset, TREE_NODE_SIZE)?;
                    return Err(e);
                }
            }
        } else {
            None
        };

        let payload = match fill(&mut *file, region) {
            Ok(payload) => payload,
            Err(e) => {
                let mut freelist = Freelist::new(&mut *file, &mut *header);
                freelist.free(node_offset, TREE_NODE_SIZE)?;
                if let Some((offset, reserved)) = region {
                    freelist.free(offset, reserved)?;
                }
                return Err(e);
            }
        };

        let node = TreeNode::new(node_offset, id, tag, payload);
        node.write(&mut *file)?;
        TreeIndex::new(&mut *file, &mut *header, max_depth).link(slot, node_offset)?;

        tracing::debug!(
            id = %id,
            tag,
            size,
            offset = node_offset,
            out_of_line = region.is_some(),
            "object stored"
        );

        if let Some((key, _)) = parent {
            self.cache.remove(&key);
        }
        if self.config.cache_objects {
            let parent_offset = parent.map_or(0, |(_, offset)| offset);
            self.cache.insert(id, ObjectInfo::new(&node, parent_offset, payload));
        }
        self.after_write()
    }

    /// Store the name and data parts of a file object, then the file node.
    /// Already stored parts are removed again if a later step fails.
    fn store_file_parts<D>(&mut self, id: Zuid, name: &str, store_data: D) -> Result<FileObject>
    where
        D: FnOnce(&mut Self, Zuid) -> Result<()>,
    {
        self.parts_mut()?;
        match self.object_info(id) {
            Ok(_) => return Err(ParcelError::Exists(id)),
            Err(ParcelError::NoExist(_)) => {}
            Err(e) => return Err(e),
        }

        let name_id = self.fresh_id();
        self.store_string(name_id, name)?;

        let data_id = self.fresh_id();
        if let Err(e) = store_data(&mut *self, data_id) {
            self.discard(name_id);
            return Err(e);
        }

        let file = FileObject { name_id, data_id };
        if let Err(e) = self.store_file_ref(id, file) {
            self.discard(name_id);
            self.discard(data_id);
            return Err(e);
        }
        Ok(file)
    }

    /// Random id not yet used in this parcel
    fn fresh_id(&mut self) -> Zuid {
        loop {
            let id = Zuid::random();
            if !self.exists(id) {
                return id;
            }
        }
    }

    /// Best-effort removal while unwinding a failed store
    fn discard(&mut self, id: Zuid) {
        if let Err(e) = self.remove_object(id) {
            tracing::warn!(id = %id, error = %e, "failed to unwind partial store");
        }
    }
}

impl Parcel<File> {
    /// Create (or truncate) the file at `path` and initialize a parcel in it
    pub fn create_path(path: impl AsRef<Path>, config: ParcelConfig) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())
            .map_err(ParcelError::Open)?;
        Self::create(file, config)
    }

    /// Open the existing parcel file at `path`
    pub fn open_path(path: impl AsRef<Path>, config: ParcelConfig) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())
            .map_err(ParcelError::Open)?;
        Self::open(file, config)
    }
}
