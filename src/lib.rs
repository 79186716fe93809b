//! # zparcel
//!
//! A single-file object store: 128-bit ids map to typed values (integers,
//! floats, strings, blobs, id lists, files) through an on-disk binary search
//! tree, with a freelist allocator reusing the space of removed objects.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Parcel                               │
//! │        (typed store / fetch / remove, object cache)         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┼────────────┐
//!          │            │            │
//!          ▼            ▼            ▼
//!   ┌─────────────┐ ┌──────────┐ ┌──────────────┐
//!   │  TreeIndex  │ │ Freelist │ │   Accessor   │
//!   │   (BST)     │ │ (alloc)  │ │ (byte range) │
//!   └──────┬──────┘ └────┬─────┘ └──────┬───────┘
//!          │             │              │
//!          ▼             ▼              ▼
//!   ┌─────────────────────────────────────────────┐
//!   │   Format: header, tree nodes, free nodes    │
//!   │        (big-endian records + CRC32)         │
//!   └──────────────────────┬──────────────────────┘
//!                          ▼
//!                  ┌──────────────┐
//!                  │  ParcelFile  │
//!                  └──────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use std::io::Cursor;
//! use zparcel::{Parcel, ParcelConfig, Zuid};
//!
//! let mut parcel = Parcel::create(Cursor::new(Vec::new()), ParcelConfig::default())?;
//! let id = Zuid::from_u128(1);
//! parcel.store_string(id, "hello")?;
//! assert_eq!(parcel.fetch_string(id)?, "hello");
//! # Ok::<(), zparcel::ParcelError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod zuid;

pub mod file;
pub mod accessor;
pub mod format;
pub mod freelist;
pub mod tree;
pub mod object;
pub mod parcel;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use accessor::ObjectAccessor;
pub use config::{ParcelConfig, SyncStrategy};
pub use error::{ErrorCode, ParcelError, Result};
pub use file::ParcelFile;
pub use object::{FileObject, ObjectEntry, ObjectInfo, ObjectType, Value};
pub use parcel::{Parcel, ParcelState, VerifyReport};
pub use zuid::Zuid;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of zparcel
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
