//! Value encodings
//!
//! Canonical big-endian byte encodings of every object kind. Payloads of at
//! most 16 bytes end up inline in the tree node, so e.g. a single zuid or a
//! one-element list is inline and a two-element list is not.

use bytes::{Buf, BufMut};

use crate::error::{ParcelError, Result};
use crate::zuid::{Zuid, ZUID_SIZE};

use super::{FileObject, ObjectType};

/// A decoded object value of any kind
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Uint(u64),
    Sint(i64),
    Float(f64),
    Zuid(Zuid),
    Blob(Vec<u8>),
    String(String),
    List(Vec<Zuid>),
    File(FileObject),
    /// Object with a tag this version does not know
    Unknown { tag: u8, data: Vec<u8> },
}

impl Value {
    pub fn object_type(&self) -> ObjectType {
        match self {
            Value::Null => ObjectType::Null,
            Value::Bool(_) => ObjectType::Bool,
            Value::Uint(_) => ObjectType::Uint,
            Value::Sint(_) => ObjectType::Sint,
            Value::Float(_) => ObjectType::Float,
            Value::Zuid(_) => ObjectType::Zuid,
            Value::Blob(_) => ObjectType::Blob,
            Value::String(_) => ObjectType::String,
            Value::List(_) => ObjectType::List,
            Value::File(_) => ObjectType::File,
            Value::Unknown { .. } => ObjectType::Unknown,
        }
    }

    /// Raw tag written to the tree node
    pub fn tag(&self) -> u8 {
        match self {
            Value::Unknown { tag, .. } => *tag,
            other => other.object_type().tag(),
        }
    }

    /// Canonical payload bytes
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Value::Null => Vec::new(),
            Value::Bool(b) => vec![u8::from(*b)],
            Value::Uint(n) => n.to_be_bytes().to_vec(),
            Value::Sint(n) => n.to_be_bytes().to_vec(),
            Value::Float(x) => x.to_bits().to_be_bytes().to_vec(),
            Value::Zuid(id) => id.as_bytes().to_vec(),
            Value::Blob(data) => data.clone(),
            Value::String(s) => s.as_bytes().to_vec(),
            Value::List(ids) => encode_list(ids),
            Value::File(file) => encode_file(file),
            Value::Unknown { data, .. } => data.clone(),
        }
    }

    /// Decode payload bytes stored under raw tag `tag`
    pub fn decode(tag: u8, data: Vec<u8>) -> Result<Self> {
        let value = match ObjectType::from_tag(tag) {
            ObjectType::Null => {
                expect_len("null", &data, 0)?;
                Value::Null
            }
            ObjectType::Bool => Value::Bool(decode_bool(&data)?),
            ObjectType::Uint => Value::Uint(decode_uint(&data)?),
            ObjectType::Sint => Value::Sint(decode_sint(&data)?),
            ObjectType::Float => Value::Float(decode_float(&data)?),
            ObjectType::Zuid => Value::Zuid(decode_zuid(&data)?),
            ObjectType::Blob => Value::Blob(data),
            ObjectType::String => Value::String(decode_string(data)?),
            ObjectType::List => Value::List(decode_list(&data)?),
            ObjectType::File => Value::File(decode_file(&data)?),
            ObjectType::Unknown => Value::Unknown { tag, data },
        };
        Ok(value)
    }
}

// =============================================================================
// Per-kind codecs
// =============================================================================

fn expect_len(kind: &str, data: &[u8], len: usize) -> Result<()> {
    if data.len() != len {
        return Err(ParcelError::Encoding(format!(
            "{} payload must be {} bytes, got {}",
            kind,
            len,
            data.len()
        )));
    }
    Ok(())
}

pub(crate) fn decode_bool(data: &[u8]) -> Result<bool> {
    expect_len("bool", data, 1)?;
    match data[0] {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(ParcelError::Encoding(format!(
            "bool payload must be 0 or 1, got {}",
            other
        ))),
    }
}

pub(crate) fn decode_uint(mut data: &[u8]) -> Result<u64> {
    expect_len("uint", data, 8)?;
    Ok(data.get_u64())
}

pub(crate) fn decode_sint(mut data: &[u8]) -> Result<i64> {
    expect_len("sint", data, 8)?;
    Ok(data.get_i64())
}

pub(crate) fn decode_float(mut data: &[u8]) -> Result<f64> {
    expect_len("float", data, 8)?;
    Ok(data.get_f64())
}

pub(crate) fn decode_zuid(data: &[u8]) -> Result<Zuid> {
    expect_len("zuid", data, ZUID_SIZE)?;
    let mut bytes = [0u8; ZUID_SIZE];
    bytes.copy_from_slice(data);
    Ok(Zuid::from_bytes(bytes))
}

pub(crate) fn decode_string(data: Vec<u8>) -> Result<String> {
    String::from_utf8(data).map_err(|e| ParcelError::Encoding(format!("string payload: {}", e)))
}

pub(crate) fn encode_list(ids: &[Zuid]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ids.len() * ZUID_SIZE);
    for id in ids {
        out.put_slice(id.as_bytes());
    }
    out
}

pub(crate) fn decode_list(data: &[u8]) -> Result<Vec<Zuid>> {
    if data.len() % ZUID_SIZE != 0 {
        return Err(ParcelError::Encoding(format!(
            "list payload of {} bytes is not a whole number of ids",
            data.len()
        )));
    }
    Ok(data
        .chunks_exact(ZUID_SIZE)
        .map(|chunk| {
            let mut bytes = [0u8; ZUID_SIZE];
            bytes.copy_from_slice(chunk);
            Zuid::from_bytes(bytes)
        })
        .collect())
}

fn encode_file(file: &FileObject) -> Vec<u8> {
    encode_list(&[file.name_id, file.data_id])
}

pub(crate) fn decode_file(data: &[u8]) -> Result<FileObject> {
    expect_len("file", data, 2 * ZUID_SIZE)?;
    let ids = decode_list(data)?;
    Ok(FileObject {
        name_id: ids[0],
        data_id: ids[1],
    })
}
