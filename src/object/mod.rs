//! Object Model
//!
//! Type tags, cached object info and the value encodings stored in tree
//! node payloads.

mod value;

pub use value::Value;

use std::fmt;

use crate::format::{Payload, TreeNode};
use crate::zuid::Zuid;

pub(crate) use value::{
    decode_bool, decode_file, decode_float, decode_list, decode_sint, decode_string, decode_uint,
    decode_zuid, encode_list,
};

/// Payload type tag of a stored object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ObjectType {
    Null = 0,
    /// Boolean, one byte
    Bool = 1,
    /// Unsigned 64-bit integer
    Uint = 2,
    /// Signed 64-bit integer
    Sint = 3,
    /// Double precision float
    Float = 4,
    /// Identifier of another object
    Zuid = 5,
    /// Binary blob
    Blob = 6,
    /// UTF-8 string
    String = 7,
    /// Ordered list of identifiers
    List = 8,
    /// File: ids of a name object and a data object
    File = 9,
    /// Any tag this version does not know
    Unknown = 255,
}

impl ObjectType {
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            0 => ObjectType::Null,
            1 => ObjectType::Bool,
            2 => ObjectType::Uint,
            3 => ObjectType::Sint,
            4 => ObjectType::Float,
            5 => ObjectType::Zuid,
            6 => ObjectType::Blob,
            7 => ObjectType::String,
            8 => ObjectType::List,
            9 => ObjectType::File,
            _ => ObjectType::Unknown,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            ObjectType::Null => "null",
            ObjectType::Bool => "bool",
            ObjectType::Uint => "uint",
            ObjectType::Sint => "sint",
            ObjectType::Float => "float",
            ObjectType::Zuid => "zuid",
            ObjectType::Blob => "blob",
            ObjectType::String => "string",
            ObjectType::List => "list",
            ObjectType::File => "file",
            ObjectType::Unknown => "unknown",
        }
    }

    /// Name of a raw type tag
    pub fn type_name(tag: u8) -> &'static str {
        Self::from_tag(tag).name()
    }

    /// Parse a type name as printed by `name`
    pub fn from_name(name: &str) -> Option<Self> {
        let ty = match name {
            "null" => ObjectType::Null,
            "bool" => ObjectType::Bool,
            "uint" => ObjectType::Uint,
            "sint" => ObjectType::Sint,
            "float" => ObjectType::Float,
            "zuid" => ObjectType::Zuid,
            "blob" => ObjectType::Blob,
            "string" => ObjectType::String,
            "list" => ObjectType::List,
            "file" => ObjectType::File,
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A file object: the ids of its name (string) and data (blob) objects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileObject {
    pub name_id: Zuid,
    pub data_id: Zuid,
}

/// Decoded position and payload descriptor of a stored object
///
/// Lives only in the parcel's cache; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectInfo {
    pub id: Zuid,
    /// Tree node offset
    pub tree: u64,
    /// Parent tree node offset (0 for the root)
    pub parent: u64,
    pub lnode: u64,
    pub rnode: u64,
    pub obj_type: ObjectType,
    /// Raw tag as stored
    pub tag: u8,
    pub payload: Payload,
}

impl ObjectInfo {
    pub fn new(node: &TreeNode, parent: u64, payload: Payload) -> Self {
        Self {
            id: node.key,
            tree: node.offset,
            parent,
            lnode: node.lnode,
            rnode: node.rnode,
            obj_type: ObjectType::from_tag(node.obj_type),
            tag: node.obj_type,
            payload,
        }
    }
}

/// One line of an object listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub id: Zuid,
    pub obj_type: ObjectType,
    /// Depth in the tree (root = 1)
    pub depth: u32,
    /// Tree node offset
    pub offset: u64,
    /// Payload size in bytes
    pub size: u64,
    /// True if the payload lives outside the tree node
    pub out_of_line: bool,
}
