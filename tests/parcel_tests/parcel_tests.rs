//! Tests for Parcel
//!
//! These tests verify:
//! - Round trips for every object kind, inline and out-of-line
//! - Uniqueness, type checking and missing objects
//! - Space reuse and unwinding of failed stores
//! - File objects
//! - Lifecycle: close, lock, root, persisted flags

use std::io::{self, Cursor, Read};

use zparcel::format::{Payload, HEADER_SIZE, TREE_NODE_SIZE};
use zparcel::{
    FileObject, ObjectType, Parcel, ParcelConfig, ParcelError, ParcelState, SyncStrategy, Value,
    Zuid,
};

// =============================================================================
// Helper Functions
// =============================================================================

type MemParcel = Parcel<Cursor<Vec<u8>>>;

fn memory_parcel() -> MemParcel {
    Parcel::create(Cursor::new(Vec::new()), ParcelConfig::default()).unwrap()
}

fn id(n: u128) -> Zuid {
    Zuid::from_u128(n)
}

/// Close and reopen, dropping every cached lookup
fn reopen(parcel: &mut MemParcel) -> MemParcel {
    let file = parcel.close().unwrap();
    let config = ParcelConfig::builder().cache_objects(false).build();
    Parcel::open(file, config).unwrap()
}

fn node_offset_of(parcel: &mut MemParcel, key: Zuid) -> u64 {
    parcel.object_info(key).unwrap().tree
}

/// Reader that fails after yielding `limit` bytes
struct FailingReader {
    remaining: usize,
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::new(io::ErrorKind::Other, "source went away"));
        }
        let n = buf.len().min(self.remaining);
        buf[..n].fill(0xaa);
        self.remaining -= n;
        Ok(n)
    }
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_scalar_round_trips() {
    let mut parcel = memory_parcel();
    parcel.store_null(id(1)).unwrap();
    parcel.store_bool(id(2), true).unwrap();
    parcel.store_uint(id(3), u64::MAX).unwrap();
    parcel.store_sint(id(4), -42).unwrap();
    parcel.store_float(id(5), 3.25).unwrap();
    parcel.store_zuid(id(6), id(0xabcdef)).unwrap();

    let mut parcel = reopen(&mut parcel);
    parcel.fetch_null(id(1)).unwrap();
    assert!(parcel.fetch_bool(id(2)).unwrap());
    assert_eq!(parcel.fetch_uint(id(3)).unwrap(), u64::MAX);
    assert_eq!(parcel.fetch_sint(id(4)).unwrap(), -42);
    assert_eq!(parcel.fetch_float(id(5)).unwrap(), 3.25);
    assert_eq!(parcel.fetch_zuid(id(6)).unwrap(), id(0xabcdef));
}

#[test]
fn test_inline_boundary() {
    let mut parcel = memory_parcel();
    let sixteen = vec![0x16u8; 16];
    let seventeen = vec![0x17u8; 17];
    parcel.store_blob(id(16), &sixteen).unwrap();
    parcel.store_blob(id(17), &seventeen).unwrap();
    parcel.store_string(id(18), "exactly16bytes!!").unwrap();
    parcel.store_string(id(19), "seventeen bytes!!").unwrap();
    parcel.store_blob(id(20), &[]).unwrap();

    let mut parcel = reopen(&mut parcel);
    assert_eq!(parcel.fetch_blob(id(16)).unwrap(), sixteen);
    assert_eq!(parcel.fetch_blob(id(17)).unwrap(), seventeen);
    assert_eq!(parcel.fetch_string(id(18)).unwrap(), "exactly16bytes!!");
    assert_eq!(parcel.fetch_string(id(19)).unwrap(), "seventeen bytes!!");
    assert!(parcel.fetch_blob(id(20)).unwrap().is_empty());

    let entries = parcel.list_objects().unwrap();
    let inline: Vec<bool> = entries.iter().map(|e| !e.out_of_line).collect();
    assert_eq!(inline, vec![true, false, true, false, true]);
}

#[test]
fn test_list_round_trip() {
    let mut parcel = memory_parcel();
    let ids: Vec<Zuid> = (100..110).map(id).collect();
    parcel.store_list(id(1), &ids).unwrap();
    parcel.store_list(id(2), &ids[..1]).unwrap();
    parcel.store_list(id(3), &[]).unwrap();

    let mut parcel = reopen(&mut parcel);
    assert_eq!(parcel.fetch_list(id(1)).unwrap(), ids);
    assert_eq!(parcel.fetch_list(id(2)).unwrap(), vec![id(100)]);
    assert!(parcel.fetch_list(id(3)).unwrap().is_empty());
}

#[test]
fn test_large_blob() {
    let mut parcel = memory_parcel();
    let data: Vec<u8> = (0..100_000u32).map(|i| (i * 7) as u8).collect();
    parcel.store_blob(id(1), &data).unwrap();

    let mut parcel = reopen(&mut parcel);
    assert_eq!(parcel.fetch_blob(id(1)).unwrap(), data);
}

#[test]
fn test_generic_value_store_and_fetch() {
    let mut parcel = memory_parcel();
    let values = vec![
        Value::Null,
        Value::Bool(false),
        Value::Uint(7),
        Value::Sint(-7),
        Value::Float(0.5),
        Value::Zuid(id(9)),
        Value::Blob(vec![1; 40]),
        Value::String("value".to_string()),
        Value::List(vec![id(1), id(2)]),
        Value::Unknown {
            tag: 77,
            data: vec![1, 2, 3],
        },
    ];
    for (i, value) in values.iter().enumerate() {
        parcel.store(id(i as u128 + 1), value).unwrap();
    }

    let mut parcel = reopen(&mut parcel);
    for (i, value) in values.iter().enumerate() {
        assert_eq!(&parcel.fetch(id(i as u128 + 1)).unwrap(), value);
    }
    assert_eq!(parcel.get_type(id(10)), Some(ObjectType::Unknown));
}

#[test]
fn test_unknown_value_with_known_tag_rejected() {
    let mut parcel = memory_parcel();
    let tailptr = parcel.header().tailptr;

    let forged = Value::Unknown {
        tag: ObjectType::Uint.tag(),
        data: vec![1, 2, 3],
    };
    assert!(matches!(
        parcel.store(id(1), &forged),
        Err(ParcelError::Encoding(_))
    ));
    assert!(!parcel.exists(id(1)));
    assert_eq!(parcel.header().tailptr, tailptr);

    let unclaimed = Value::Unknown {
        tag: 255,
        data: vec![4; 20],
    };
    parcel.store(id(2), &unclaimed).unwrap();
    assert_eq!(parcel.fetch(id(2)).unwrap(), unclaimed);
}

// =============================================================================
// Identity and Type Tests
// =============================================================================

#[test]
fn test_duplicate_id_rejected() {
    let mut parcel = memory_parcel();
    parcel.store_uint(id(1), 1).unwrap();
    let tailptr = parcel.header().tailptr;

    assert!(matches!(
        parcel.store_string(id(1), "again"),
        Err(ParcelError::Exists(k)) if k == id(1)
    ));
    assert_eq!(parcel.header().tailptr, tailptr);
    assert_eq!(parcel.fetch_uint(id(1)).unwrap(), 1);
}

#[test]
fn test_type_mismatch() {
    let mut parcel = memory_parcel();
    parcel.store_string(id(1), "text").unwrap();

    let err = parcel.fetch_uint(id(1)).unwrap_err();
    assert!(matches!(
        err,
        ParcelError::TypeMismatch {
            expected: ObjectType::Uint,
            found: ObjectType::String,
            ..
        }
    ));
    assert_eq!(parcel.get_type(id(1)), Some(ObjectType::String));
}

#[test]
fn test_missing_object() {
    let mut parcel = memory_parcel();
    assert!(matches!(parcel.fetch_blob(id(5)), Err(ParcelError::NoExist(_))));
    assert!(matches!(parcel.remove_object(id(5)), Err(ParcelError::NoExist(_))));
    assert!(!parcel.exists(id(5)));
    assert_eq!(parcel.get_type(id(5)), None);
}

// =============================================================================
// Allocation Tests
// =============================================================================

#[test]
fn test_node_then_payload_layout() {
    let mut parcel = memory_parcel();
    parcel.store_blob(id(1), &[0u8; 100]).unwrap();
    let info = parcel.object_info(id(1)).unwrap();
    assert_eq!(info.tree, HEADER_SIZE);
    assert_eq!(
        parcel.header().tailptr,
        HEADER_SIZE + TREE_NODE_SIZE + 100
    );
}

#[test]
fn test_space_reuse_inline() {
    let mut parcel = memory_parcel();
    parcel.store_uint(id(1), 1).unwrap();
    parcel.store_uint(id(2), 2).unwrap();
    let a_offset = node_offset_of(&mut parcel, id(1));

    parcel.remove_object(id(1)).unwrap();
    parcel.set_tail_extend(false).unwrap();

    parcel.store_sint(id(3), -3).unwrap();
    assert_eq!(node_offset_of(&mut parcel, id(3)), a_offset);
    assert!(parcel.free_ranges().unwrap().is_empty());
}

#[test]
fn test_space_reuse_out_of_line() {
    let mut parcel = memory_parcel();
    parcel.store_blob(id(1), &[1u8; 200]).unwrap();
    parcel.store_uint(id(2), 2).unwrap();
    let old = parcel.object_info(id(1)).unwrap();

    parcel.remove_object(id(1)).unwrap();
    parcel.set_tail_extend(false).unwrap();

    parcel.store_blob(id(3), &[3u8; 150]).unwrap();
    let new = parcel.object_info(id(3)).unwrap();
    assert_eq!(new.tree, old.tree);
    assert_eq!(parcel.fetch_blob(id(3)).unwrap(), vec![3u8; 150]);

    // 200 - 150 leaves a 50 byte remainder on the list
    assert_eq!(parcel.free_ranges().unwrap().len(), 1);
    assert_eq!(parcel.free_ranges().unwrap()[0].1, 50);
    parcel.verify().unwrap();
}

#[test]
fn test_unsplittable_range_reused_whole() {
    let mut parcel = memory_parcel();
    parcel.store_blob(id(1), &[1u8; 100]).unwrap();
    parcel.store_uint(id(2), 2).unwrap();
    let old = parcel.object_info(id(1)).unwrap();
    let Payload::OutOfLine { offset: old_payload, .. } = old.payload else {
        panic!("100 byte blob stored inline");
    };

    parcel.remove_object(id(1)).unwrap();
    parcel.set_tail_extend(false).unwrap();

    // 90 bytes leave a 10 byte remainder, too small for a free node
    parcel.store_blob(id(3), &[3u8; 90]).unwrap();
    let new = parcel.object_info(id(3)).unwrap();
    assert_eq!(new.tree, old.tree);
    assert_eq!(
        new.payload,
        Payload::OutOfLine {
            offset: old_payload,
            size: 90,
            reserved: 100,
        }
    );
    assert!(parcel.free_ranges().unwrap().is_empty());
    parcel.verify().unwrap();

    // the reserved size survives a reopen and is freed in full
    let mut parcel = reopen(&mut parcel);
    assert_eq!(parcel.fetch_blob(id(3)).unwrap(), vec![3u8; 90]);
    assert_eq!(parcel.verify().unwrap().live_bytes, 2 * TREE_NODE_SIZE + 100);
    parcel.remove_object(id(3)).unwrap();
    assert!(parcel.free_ranges().unwrap().contains(&(old_payload, 100)));
    parcel.verify().unwrap();

    parcel.store_blob(id(4), &[4u8; 100]).unwrap();
    assert_eq!(parcel.fetch_blob(id(4)).unwrap(), vec![4u8; 100]);
    parcel.verify().unwrap();
}

#[test]
fn test_no_free_unwinds_node_allocation() {
    let mut parcel = memory_parcel();
    parcel.store_blob(id(1), &[1u8; 100]).unwrap();
    parcel.remove_object(id(1)).unwrap();
    parcel.set_tail_extend(false).unwrap();
    let tailptr = parcel.header().tailptr;

    // The node fits the old node range, the 120 byte payload fits nowhere
    assert!(matches!(
        parcel.store_blob(id(2), &[2u8; 120]),
        Err(ParcelError::NoFree { requested: 120 })
    ));
    assert!(!parcel.exists(id(2)));
    assert_eq!(parcel.header().tailptr, tailptr);

    let mut sizes: Vec<u64> = parcel
        .free_ranges()
        .unwrap()
        .into_iter()
        .map(|(_, size)| size)
        .collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![58, 100]);
    parcel.verify().unwrap();
}

#[test]
fn test_failing_stream_unwinds() {
    let mut parcel = memory_parcel();
    let err = parcel
        .store_blob_from(id(1), FailingReader { remaining: 50 }, 500)
        .unwrap_err();
    assert!(matches!(err, ParcelError::Write(_)));
    assert!(!parcel.exists(id(1)));

    let free: u64 = parcel.free_ranges().unwrap().iter().map(|(_, s)| s).sum();
    assert_eq!(free, 58 + 500);
}

#[test]
fn test_short_stream_is_truncation() {
    let mut parcel = memory_parcel();
    let err = parcel
        .store_blob_from(id(1), Cursor::new(vec![1u8; 100]), 300)
        .unwrap_err();
    assert!(matches!(err, ParcelError::Trunc { .. }));
    assert!(!parcel.exists(id(1)));
    parcel.verify().unwrap();
}

#[test]
fn test_stream_store_small_and_large() {
    let mut parcel = memory_parcel();
    parcel
        .store_blob_from(id(1), Cursor::new(b"small".to_vec()), 5)
        .unwrap();
    let big = vec![9u8; 3000];
    parcel
        .store_blob_from(id(2), Cursor::new(big.clone()), 3000)
        .unwrap();

    let mut parcel = reopen(&mut parcel);
    assert_eq!(parcel.fetch_blob(id(1)).unwrap(), b"small");
    assert_eq!(parcel.fetch_blob(id(2)).unwrap(), big);
}

// =============================================================================
// File Object Tests
// =============================================================================

#[test]
fn test_file_object() {
    let mut parcel = memory_parcel();
    let content = vec![0x42u8; 2048];
    let file = parcel.store_file(id(1), "report.pdf", &content).unwrap();

    let mut parcel = reopen(&mut parcel);
    assert_eq!(parcel.fetch_file(id(1)).unwrap(), file);
    assert_eq!(parcel.fetch_file_name(id(1)).unwrap(), "report.pdf");
    assert_eq!(parcel.fetch_blob(file.data_id).unwrap(), content);
    assert_eq!(parcel.get_type(file.name_id), Some(ObjectType::String));
    assert_eq!(parcel.list_objects().unwrap().len(), 3);
}

#[test]
fn test_file_object_existing_id_leaves_nothing_behind() {
    let mut parcel = memory_parcel();
    parcel.store_uint(id(1), 1).unwrap();
    assert!(matches!(
        parcel.store_file(id(1), "a", b"b"),
        Err(ParcelError::Exists(_))
    ));
    assert_eq!(parcel.list_objects().unwrap().len(), 1);
}

#[test]
fn test_file_object_unwinds_on_failed_content() {
    let mut parcel = memory_parcel();
    let err = parcel
        .store_file_from(id(1), "broken.bin", FailingReader { remaining: 10 }, 100)
        .unwrap_err();
    assert!(matches!(err, ParcelError::Write(_)));
    assert!(parcel.list_objects().unwrap().is_empty());
    parcel.verify().unwrap();
}

#[test]
fn test_file_ref_and_removal_keeps_parts() {
    let mut parcel = memory_parcel();
    parcel.store_string(id(10), "name").unwrap();
    parcel.store_blob(id(11), b"data").unwrap();
    let file = FileObject {
        name_id: id(10),
        data_id: id(11),
    };
    parcel.store_file_ref(id(1), file).unwrap();

    parcel.remove_object(id(1)).unwrap();
    assert!(!parcel.exists(id(1)));
    assert_eq!(parcel.fetch_string(id(10)).unwrap(), "name");
    assert_eq!(parcel.fetch_blob(id(11)).unwrap(), b"data");
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_scenario() {
    let mut parcel = memory_parcel();
    let id1 = id(1);
    let id2 = id(2);

    parcel.store_uint(id1, 42).unwrap();
    assert_eq!(parcel.fetch_uint(id1).unwrap(), 42);
    parcel.store_string(id2, "hello").unwrap();
    parcel.remove_object(id1).unwrap();

    assert!(matches!(parcel.fetch_uint(id1), Err(ParcelError::NoExist(_))));
    assert_eq!(parcel.fetch_string(id2).unwrap(), "hello");
}

#[test]
fn test_closed_parcel() {
    let mut parcel = memory_parcel();
    parcel.store_uint(id(1), 1).unwrap();
    parcel.close().unwrap();

    assert_eq!(parcel.state(), ParcelState::Closed);
    assert!(matches!(parcel.fetch_uint(id(1)), Err(ParcelError::NotOpen)));
    assert!(matches!(parcel.store_uint(id(2), 2), Err(ParcelError::NotOpen)));
    assert!(matches!(parcel.root(), Err(ParcelError::NotOpen)));
    assert!(matches!(parcel.close(), Err(ParcelError::NotOpen)));
    assert!(!parcel.exists(id(1)));
}

#[test]
fn test_locked_parcel_is_read_only() {
    let mut parcel = memory_parcel();
    parcel.store_uint(id(1), 1).unwrap();
    parcel.lock().unwrap();
    assert_eq!(parcel.state(), ParcelState::Locked);

    assert_eq!(parcel.fetch_uint(id(1)).unwrap(), 1);
    assert_eq!(parcel.list_objects().unwrap().len(), 1);
    assert!(matches!(parcel.store_uint(id(2), 2), Err(ParcelError::Locked)));
    assert!(matches!(parcel.remove_object(id(1)), Err(ParcelError::Locked)));
    assert!(matches!(parcel.set_root(id(1)), Err(ParcelError::Locked)));
    assert!(matches!(parcel.set_tail_extend(false), Err(ParcelError::Locked)));
    assert!(matches!(
        parcel.store_file(id(3), "x", b"y"),
        Err(ParcelError::Locked)
    ));

    parcel.unlock().unwrap();
    parcel.store_uint(id(2), 2).unwrap();
}

#[test]
fn test_root_persists() {
    let mut parcel = memory_parcel();
    assert!(parcel.root().unwrap().is_nil());
    parcel.set_root(id(77)).unwrap();

    let parcel = reopen(&mut parcel);
    assert_eq!(parcel.root().unwrap(), id(77));
}

#[test]
fn test_tail_extend_flag_persists() {
    let config = ParcelConfig::builder().tail_extend(false).build();
    let mut parcel = Parcel::create(Cursor::new(Vec::new()), config).unwrap();
    assert!(!parcel.header().tail_extend());
    assert!(matches!(
        parcel.store_uint(id(1), 1),
        Err(ParcelError::NoFree { .. })
    ));

    parcel.set_tail_extend(true).unwrap();
    parcel.store_uint(id(1), 1).unwrap();

    let parcel = reopen(&mut parcel);
    assert!(parcel.header().tail_extend());
}

#[test]
fn test_sync_every_write() {
    let config = ParcelConfig::builder()
        .sync_strategy(SyncStrategy::EveryWrite)
        .build();
    let mut parcel = Parcel::create(Cursor::new(Vec::new()), config).unwrap();
    parcel.store_string(id(1), "durable").unwrap();
    parcel.remove_object(id(1)).unwrap();
    assert_eq!(parcel.config().sync_strategy, SyncStrategy::EveryWrite);
}

#[test]
fn test_create_discards_previous_content() {
    let mut parcel = memory_parcel();
    parcel.store_blob(id(1), &[1u8; 500]).unwrap();
    let file = parcel.close().unwrap();

    let mut parcel = Parcel::create(file, ParcelConfig::default()).unwrap();
    assert!(!parcel.exists(id(1)));
    assert_eq!(parcel.header().tailptr, HEADER_SIZE);
    let file = parcel.close().unwrap();
    assert_eq!(file.get_ref().len() as u64, HEADER_SIZE);
}
