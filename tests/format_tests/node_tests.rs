//! Tests for the on-disk records
//!
//! These tests verify:
//! - Header, tree node and free node layouts at their documented offsets
//! - Corruption of any record is reported when the record is next read
//! - A file shorter than its tail pointer is refused on open

use std::io::Cursor;

use zparcel::format::{FreeNode, Header, Payload, TreeNode, HEADER_SIZE, TREE_NODE_SIZE};
use zparcel::{Parcel, ParcelConfig, ParcelError, Zuid};

// =============================================================================
// Helper Functions
// =============================================================================

fn uncached() -> ParcelConfig {
    ParcelConfig::builder().cache_objects(false).build()
}

/// Run `build` on a fresh in-memory parcel and return the raw bytes
fn parcel_bytes<B>(build: B) -> Vec<u8>
where
    B: FnOnce(&mut Parcel<Cursor<Vec<u8>>>),
{
    let mut parcel = Parcel::create(Cursor::new(Vec::new()), ParcelConfig::default()).unwrap();
    build(&mut parcel);
    parcel.close().unwrap().into_inner()
}

fn reopen(bytes: Vec<u8>) -> Result<Parcel<Cursor<Vec<u8>>>, ParcelError> {
    Parcel::open(Cursor::new(bytes), uncached())
}

// =============================================================================
// Header Tests
// =============================================================================

#[test]
fn test_fresh_header_layout() {
    let bytes = parcel_bytes(|_| {});
    assert_eq!(bytes.len(), HEADER_SIZE as usize);
    assert_eq!(&bytes[0..7], b"ZPARCEL");
    assert_eq!(bytes[7], 1);
    assert_eq!(&bytes[8..12], &1u32.to_be_bytes());
    assert_eq!(&bytes[36..44], &HEADER_SIZE.to_be_bytes());
    assert!(bytes[12..36].iter().all(|b| *b == 0));
}

#[test]
fn test_header_bad_signature() {
    let mut bytes = parcel_bytes(|_| {});
    bytes[0] = b'X';
    assert!(matches!(reopen(bytes), Err(ParcelError::Sig)));
}

#[test]
fn test_header_bad_version() {
    let mut bytes = parcel_bytes(|_| {});
    bytes[7] = 2;
    assert!(matches!(reopen(bytes), Err(ParcelError::Version(2))));
}

#[test]
fn test_header_flag_corruption() {
    let mut bytes = parcel_bytes(|_| {});
    bytes[11] ^= 0x02;
    assert!(matches!(reopen(bytes), Err(ParcelError::Crc { offset: 0, .. })));
}

#[test]
fn test_header_roundtrip_through_parcel() {
    let root = Zuid::from_u128(0xfeed);
    let bytes = parcel_bytes(|p| {
        p.store_uint(Zuid::from_u128(1), 1).unwrap();
        p.set_root(root).unwrap();
    });

    let header = Header::decode(bytes[..64].try_into().unwrap()).unwrap();
    assert_eq!(header.root, root);
    assert_eq!(header.treehead, HEADER_SIZE);
    assert_eq!(header.tailptr, HEADER_SIZE + TREE_NODE_SIZE);
}

#[test]
fn test_truncated_file_refused() {
    let mut bytes = parcel_bytes(|p| {
        p.store_blob(Zuid::from_u128(1), &[5u8; 100]).unwrap();
    });
    let tailptr = bytes.len() as u64;
    bytes.truncate(150);
    assert!(matches!(
        reopen(bytes),
        Err(ParcelError::Trunc { offset }) if offset == tailptr
    ));
}

// =============================================================================
// Tree Node Tests
// =============================================================================

#[test]
fn test_tree_node_written_at_first_allocation() {
    let id = Zuid::from_u128(0x0102);
    let bytes = parcel_bytes(|p| p.store_uint(id, 7).unwrap());

    let raw: [u8; 58] = bytes[64..122].try_into().unwrap();
    let node = TreeNode::decode(64, &raw).unwrap();
    assert_eq!(node.key, id);
    assert_eq!(node.obj_type, 2);
    assert_eq!(node.extra, 8);
    assert_eq!(&bytes[64 + 42..64 + 50], &7u64.to_be_bytes());
}

#[test]
fn test_tree_node_payload_corruption_detected() {
    let id = Zuid::from_u128(9);
    let mut bytes = parcel_bytes(|p| p.store_uint(id, 123).unwrap());
    bytes[64 + 45] ^= 0x10;

    let mut parcel = reopen(bytes).unwrap();
    assert!(matches!(
        parcel.fetch_uint(id),
        Err(ParcelError::Crc { offset: 64, .. })
    ));
    assert!(!parcel.exists(id));
}

#[test]
fn test_tree_node_key_corruption_detected() {
    let id = Zuid::from_u128(9);
    let mut bytes = parcel_bytes(|p| p.store_string(id, "abc").unwrap());
    bytes[64 + 10] ^= 0xff;

    let mut parcel = reopen(bytes).unwrap();
    assert!(matches!(parcel.fetch_string(id), Err(ParcelError::Crc { .. })));
}

#[test]
fn test_tree_node_bad_magic() {
    let id = Zuid::from_u128(9);
    let mut bytes = parcel_bytes(|p| p.store_null(id).unwrap());
    bytes[64] = 0;

    let mut parcel = reopen(bytes).unwrap();
    assert!(matches!(
        parcel.fetch_null(id),
        Err(ParcelError::Magic { offset: 64, .. })
    ));
}

#[test]
fn test_out_of_line_descriptor() {
    let id = Zuid::from_u128(3);
    let bytes = parcel_bytes(|p| p.store_blob(id, &[1u8; 17]).unwrap());

    let raw: [u8; 58] = bytes[64..122].try_into().unwrap();
    let node = TreeNode::decode(64, &raw).unwrap();
    assert_eq!(node.extra, 0xff);
    assert_eq!(
        node.payload().unwrap(),
        Payload::OutOfLine {
            offset: 122,
            size: 17,
            reserved: 24,
        }
    );
    // slack byte is zero for a fresh tail allocation
    assert_eq!(node.payload[8], 0);
    assert_eq!(&bytes[122..139], &[1u8; 17]);
}

// =============================================================================
// Free Node Tests
// =============================================================================

#[test]
fn test_free_nodes_written_on_remove() {
    let id = Zuid::from_u128(1);
    let bytes = parcel_bytes(|p| {
        p.store_blob(id, &[0u8; 100]).unwrap();
        p.remove_object(id).unwrap();
    });

    let node_range: [u8; 24] = bytes[64..88].try_into().unwrap();
    let first = FreeNode::decode(64, &node_range).unwrap();
    assert_eq!(first.size, 58);
    assert_eq!(first.next, 122);

    let payload_range: [u8; 24] = bytes[122..146].try_into().unwrap();
    let second = FreeNode::decode(122, &payload_range).unwrap();
    assert_eq!(second.size, 100);
    assert_eq!(second.next, 0);

    let header = Header::decode(bytes[..64].try_into().unwrap()).unwrap();
    assert_eq!(header.treehead, 0);
    assert_eq!(header.freehead, 64);
    assert_eq!(header.freetail, 122);
}

#[test]
fn test_free_node_corruption_detected_on_allocation() {
    let id = Zuid::from_u128(1);
    let mut bytes = parcel_bytes(|p| {
        p.store_blob(id, &[0u8; 100]).unwrap();
        p.remove_object(id).unwrap();
    });
    bytes[64 + 6] ^= 0x01;

    let mut parcel = reopen(bytes).unwrap();
    assert!(matches!(
        parcel.store_uint(Zuid::from_u128(2), 1),
        Err(ParcelError::Crc { offset: 64, .. })
    ));
}

#[test]
fn test_damaged_freetail_fails_remove_before_tree_changes() {
    let ids: Vec<Zuid> = (1..=3).map(Zuid::from_u128).collect();
    let mut bytes = parcel_bytes(|p| {
        for (n, id) in ids.iter().enumerate() {
            p.store_uint(*id, n as u64).unwrap();
        }
        p.remove_object(ids[2]).unwrap();
    });
    // the third node's range is now the freetail; flip a bit in its size
    let freetail = HEADER_SIZE + 2 * TREE_NODE_SIZE;
    bytes[freetail as usize + 19] ^= 0x01;

    let mut parcel = Parcel::open(Cursor::new(bytes), ParcelConfig::default()).unwrap();
    assert_eq!(parcel.fetch_uint(ids[1]).unwrap(), 1);
    assert!(matches!(
        parcel.remove_object(ids[1]),
        Err(ParcelError::Crc { offset, .. }) if offset == freetail
    ));

    // nothing was detached, cached or on disk
    assert!(parcel.exists(ids[1]));
    assert_eq!(parcel.fetch_uint(ids[1]).unwrap(), 1);
    let listed: Vec<Zuid> = parcel.list_objects().unwrap().iter().map(|e| e.id).collect();
    assert_eq!(listed, ids[..2].to_vec());

    let mut parcel = reopen(parcel.close().unwrap().into_inner()).unwrap();
    assert_eq!(parcel.fetch_uint(ids[0]).unwrap(), 0);
    assert_eq!(parcel.fetch_uint(ids[1]).unwrap(), 1);
    assert_eq!(parcel.header().freetail, freetail);
}
