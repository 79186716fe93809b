//! Error types for ZParcel
//!
//! Every fallible operation returns a [`ParcelError`]. Each error maps to a
//! stable numeric [`ErrorCode`] so front ends can report it (the CLI uses it
//! as its exit status).

use std::io;

use thiserror::Error;

use crate::object::ObjectType;
use crate::zuid::Zuid;

/// Result type alias using ParcelError
pub type Result<T> = std::result::Result<T, ParcelError>;

/// Unified error type for parcel operations
#[derive(Debug, Error)]
pub enum ParcelError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("error opening file: {0}")]
    Open(#[source] io::Error),

    #[error("error seeking file: {0}")]
    Seek(#[source] io::Error),

    #[error("error reading file: {0}")]
    Read(#[source] io::Error),

    #[error("error writing file: {0}")]
    Write(#[source] io::Error),

    // -------------------------------------------------------------------------
    // Object Errors
    // -------------------------------------------------------------------------
    #[error("object {0} already exists")]
    Exists(Zuid),

    #[error("object {0} does not exist")]
    NoExist(Zuid),

    #[error("object {id} has type {found}, expected {expected}")]
    TypeMismatch {
        id: Zuid,
        expected: ObjectType,
        found: ObjectType,
    },

    #[error("object payload is malformed: {0}")]
    Encoding(String),

    // -------------------------------------------------------------------------
    // Integrity Errors
    // -------------------------------------------------------------------------
    #[error("crc mismatch in record at offset {offset}: stored {stored:#010x}, computed {computed:#010x}")]
    Crc { offset: u64, stored: u32, computed: u32 },

    #[error("record at offset {offset} truncated by end of file")]
    Trunc { offset: u64 },

    #[error("bad tree structure: {0}")]
    Tree(String),

    #[error("bad freelist structure: {0}")]
    Freelist(String),

    #[error("no free space for {requested} bytes and tail extension is disabled")]
    NoFree { requested: u64 },

    #[error("bad file signature")]
    Sig,

    #[error("unsupported parcel version {0}")]
    Version(u8),

    #[error("exceeded maximum tree depth of {0}")]
    MaxDepth(u16),

    #[error("bad magic number {found:#010x} in record at offset {offset}")]
    Magic { offset: u64, found: u32 },

    // -------------------------------------------------------------------------
    // State Errors
    // -------------------------------------------------------------------------
    #[error("parcel is not open")]
    NotOpen,

    #[error("parcel is locked")]
    Locked,
}

impl ParcelError {
    /// Get the numeric code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            ParcelError::Open(_) => ErrorCode::Open,
            ParcelError::Seek(_) => ErrorCode::Seek,
            ParcelError::Read(_) => ErrorCode::Read,
            ParcelError::Write(_) => ErrorCode::Write,
            ParcelError::Exists(_) => ErrorCode::Exists,
            ParcelError::NoExist(_) => ErrorCode::NoExist,
            ParcelError::TypeMismatch { .. } => ErrorCode::TypeMismatch,
            ParcelError::Encoding(_) => ErrorCode::Encoding,
            ParcelError::Crc { .. } => ErrorCode::Crc,
            ParcelError::Trunc { .. } => ErrorCode::Trunc,
            ParcelError::Tree(_) => ErrorCode::Tree,
            ParcelError::Freelist(_) => ErrorCode::Freelist,
            ParcelError::NoFree { .. } => ErrorCode::NoFree,
            ParcelError::Sig => ErrorCode::Sig,
            ParcelError::Version(_) => ErrorCode::Version,
            ParcelError::MaxDepth(_) => ErrorCode::MaxDepth,
            ParcelError::Magic { .. } => ErrorCode::Magic,
            ParcelError::NotOpen => ErrorCode::NotOpen,
            ParcelError::Locked => ErrorCode::Locked,
        }
    }
}

/// Stable numeric error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    Ok = 0,
    Open,
    Seek,
    Read,
    Write,
    Exists,
    NoExist,
    Crc,
    Trunc,
    Tree,
    Freelist,
    NoFree,
    Sig,
    Version,
    MaxDepth,
    Magic,
    TypeMismatch,
    NotOpen,
    Locked,
    Encoding,
}

impl ErrorCode {
    /// Human-readable description of an error code
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Ok => "OK",
            ErrorCode::Open => "Error opening file",
            ErrorCode::Seek => "Error seeking file",
            ErrorCode::Read => "Error reading file",
            ErrorCode::Write => "Error writing file",
            ErrorCode::Exists => "Object exists",
            ErrorCode::NoExist => "Object does not exist",
            ErrorCode::Crc => "CRC mismatch",
            ErrorCode::Trunc => "Payload is truncated by end of file",
            ErrorCode::Tree => "Bad tree structure",
            ErrorCode::Freelist => "Bad freelist structure",
            ErrorCode::NoFree => "No free nodes",
            ErrorCode::Sig => "Bad file signature",
            ErrorCode::Version => "Bad file header version",
            ErrorCode::MaxDepth => "Exceeded maximum tree depth",
            ErrorCode::Magic => "Bad object magic number",
            ErrorCode::TypeMismatch => "Object has wrong type",
            ErrorCode::NotOpen => "Parcel not open",
            ErrorCode::Locked => "Parcel is locked",
            ErrorCode::Encoding => "Malformed object payload",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
