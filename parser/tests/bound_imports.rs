mod common;

use common::ImageBuilder;
use pew_parser::DirectoryKind;
use pew_parser::directories::WalkState;

const ROOT: usize = 0x300;

fn record(ts: u32, name: u16, refs: u16) -> Vec<u8> {
    let mut r = ts.to_le_bytes().to_vec();
    r.extend_from_slice(&name.to_le_bytes());
    r.extend_from_slice(&refs.to_le_bytes());
    r
}

/// KERNEL32 with two forwarder refs, then USER32 with none.
fn bound_image() -> ImageBuilder {
    ImageBuilder::pe32()
        .section(".text", 0x1000, 0x400, 0x200)
        .directory(DirectoryKind::BoundImport, ROOT as u32, 0x80)
        .write_raw(ROOT, record(0x1111_1111, 0x40, 2))
        .write_raw(ROOT + 8, record(0x2222_2222, 0x50, 0))
        .write_raw(ROOT + 16, record(0x3333_3333, 0x58, 0))
        .write_raw(ROOT + 24, record(0x4444_4444, 0x68, 0))
        .write_raw(ROOT + 0x40, b"KERNEL32.dll\0".to_vec())
        .write_raw(ROOT + 0x50, b"NTDLL.DLL\0".to_vec())
        .write_raw(ROOT + 0x58, b"KERNELBASE.dll\0".to_vec())
        .write_raw(ROOT + 0x68, b"USER32.dll\0".to_vec())
}

#[test]
fn test_record_count_includes_forwarder_refs() {
    let pe = bound_image().parse();
    let bound = pe.bound_imports().unwrap();
    assert_eq!(bound.records_count(), 4);
    assert_eq!(bound.directory().offset(), ROOT as u64);
    assert_eq!(bound.directory().records_size(), 32);
}

#[test]
fn test_descriptors_counted_apart_from_forwarder_refs() {
    let pe = bound_image().parse();
    let bound = pe.bound_imports().unwrap();
    assert_eq!(bound.descriptors_count(), 2);
    assert_eq!(bound.records_count(), 4);

    let tags: Vec<_> = bound.directory().records().iter().map(|r| r.is_forwarder_ref).collect();
    assert_eq!(tags, vec![false, true, true, false]);
    let descriptors: Vec<_> = bound
        .directory()
        .records()
        .iter()
        .filter(|r| !r.is_forwarder_ref)
        .filter_map(|r| bound.name_of(r))
        .collect();
    assert_eq!(descriptors, vec!["KERNEL32.dll", "USER32.dll"]);
}

#[test]
fn test_sequential_walk() {
    let pe = bound_image().parse();
    let mut walker = pe.bound_imports().unwrap().walker();

    assert_eq!(walker.state(), WalkState::AtDescriptor);
    assert_eq!(walker.library_name().as_deref(), Some("KERNEL32.dll"));
    assert_eq!(walker.fields().name(), "TimeDateStamp");

    walker.load_next_library();
    assert_eq!(walker.state(), WalkState::AtForwarderRef { remaining: 2 });
    assert_eq!(walker.library_name().as_deref(), Some("NTDLL.DLL"));

    walker.load_next_library();
    assert_eq!(walker.state(), WalkState::AtForwarderRef { remaining: 1 });
    assert_eq!(walker.library_name().as_deref(), Some("KERNELBASE.dll"));

    walker.load_next_library();
    assert_eq!(walker.state(), WalkState::AtDescriptor);
    assert_eq!(walker.library_name().as_deref(), Some("USER32.dll"));

    walker.load_next_library();
    assert!(walker.is_done());
    assert!(walker.record().is_none());

    walker.reset();
    assert_eq!(walker.index(), 0);
    assert_eq!(walker.state(), WalkState::AtDescriptor);
}

#[test]
fn test_forwarder_ref_fields_name_reserved() {
    let pe = bound_image().parse();
    let mut walker = pe.bound_imports().unwrap().walker();

    let names: Vec<_> = walker.fields().by_ref().map(|f| f.name).collect();
    assert_eq!(
        names,
        vec!["TimeDateStamp", "OffsetModuleName", "NumberOfModuleForwarderRefs"]
    );

    walker.load_next_library();
    assert!(walker.is_forwarder_ref());
    let fields = walker.fields();
    assert_eq!(fields.base(), ROOT as u64 + 8);
    assert_eq!(fields.index(), 0);
    let names: Vec<_> = fields.by_ref().map(|f| f.name).collect();
    assert_eq!(names, vec!["TimeDateStamp", "OffsetModuleName", "Reserved"]);
}

#[test]
fn test_walk_consumes_one_plus_refs_per_descriptor() {
    let pe = bound_image().parse();
    let bound = pe.bound_imports().unwrap();
    let mut walker = bound.walker();
    let mut consumed = 0usize;
    while let Some(rec) = walker.record().copied() {
        assert_eq!(rec.is_forwarder_ref, walker.is_forwarder_ref());
        if walker.state() == WalkState::AtDescriptor {
            consumed += 1 + rec.forwarder_refs as usize;
        }
        walker.load_next_library();
    }
    assert_eq!(consumed, bound.records_count());
}
