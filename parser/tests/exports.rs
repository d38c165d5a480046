mod common;

use common::ImageBuilder;
use pew_parser::DirectoryKind;

const DIR: u32 = 0x1000;
const FUNCS: u32 = 0x1030;
const NAMES: u32 = 0x1040;
const ORDS: u32 = 0x1050;

fn export_image(functions: &[u32], names: &[(&str, u16)], dir_size: u32) -> ImageBuilder {
    let mut b = ImageBuilder::pe32()
        .section(".edata", 0x1000, 0x400, 0x200)
        .directory(DirectoryKind::Export, DIR, dir_size)
        .write_u32(DIR + 4, 0x5F5E_1000)
        .write_u32(DIR + 12, 0x1080)
        .write_u32(DIR + 16, 5)
        .write_u32(DIR + 20, functions.len() as u32)
        .write_u32(DIR + 24, names.len() as u32)
        .write_u32(DIR + 28, FUNCS)
        .write_u32(DIR + 32, NAMES)
        .write_u32(DIR + 36, ORDS)
        .write_str(0x1080, "test.dll");
    for (i, f) in functions.iter().enumerate() {
        b = b.write_u32(FUNCS + i as u32 * 4, *f);
    }
    for (i, (name, slot)) in names.iter().enumerate() {
        let name_rva = 0x1090 + i as u32 * 0x10;
        b = b
            .write_u32(NAMES + i as u32 * 4, name_rva)
            .write_u16(ORDS + i as u32 * 2, *slot)
            .write_str(name_rva, name);
    }
    b
}

#[test]
fn test_two_named_one_ordinal_only() {
    let pe = export_image(&[0x3000, 0x3010, 0x3020], &[("Alpha", 0), ("Beta", 1)], 0x100).parse();
    let exports = pe.exports().unwrap();

    assert_eq!(exports.library_name().as_deref(), Some("test.dll"));
    assert_eq!(exports.function_count(), 3);
    assert_eq!(exports.names_count(), 2);

    let ordinals: Vec<u64> = (0..3).map(|i| exports.ordinal(i)).collect();
    assert_eq!(ordinals, vec![5, 6, 7]);
    assert!(!exports.is_by_ordinal(0));
    assert!(!exports.is_by_ordinal(1));
    assert!(exports.is_by_ordinal(2));

    assert_eq!(exports.name(0).as_deref(), Some("Alpha"));
    assert_eq!(exports.name(1).as_deref(), Some("Beta"));
    assert_eq!(exports.name(2), None);
    assert_eq!(exports.function_rva(2), Some(0x3020));
    assert_eq!(exports.function_offset(1), Some(0x434));

    let slots: Vec<_> = exports.iter().collect();
    assert_eq!(slots.len(), 3);
    assert!(slots[2].by_ordinal);
    assert!(slots.iter().all(|s| !s.is_forwarder()));
}

#[test]
fn test_name_ordinals_map_out_of_order() {
    // The second name designates slot 0, the first slot 2.
    let pe = export_image(&[0x3000, 0x3010, 0x3020], &[("Gamma", 2), ("Alpha", 0)], 0x100).parse();
    let exports = pe.exports().unwrap();
    assert_eq!(exports.name(0).as_deref(), Some("Alpha"));
    assert_eq!(exports.name(2).as_deref(), Some("Gamma"));
    assert!(exports.is_by_ordinal(1));
}

#[test]
fn test_duplicate_slot_keeps_last_name() {
    let pe = export_image(&[0x3000], &[("First", 0), ("Second", 0)], 0x100).parse();
    let exports = pe.exports().unwrap();
    assert_eq!(exports.name(0).as_deref(), Some("Second"));
}

#[test]
fn test_forwarder_points_inside_export_directory() {
    let pe = export_image(&[0x3000, 0x10C0], &[("Plain", 0), ("Fwd", 1)], 0x100)
        .write_str(0x10C0, "NTDLL.RtlAllocateHeap")
        .parse();
    let exports = pe.exports().unwrap();
    assert!(!exports.is_forwarder(0));
    assert!(exports.is_forwarder(1));
    assert_eq!(
        exports.forwarder_name(1).as_deref(),
        Some("NTDLL.RtlAllocateHeap")
    );
    assert_eq!(exports.forwarder_name(0), None);
}

#[test]
fn test_forwarder_range_excludes_end() {
    // va + size itself is past the directory. An inclusive comparison would
    // report slot 1 as a forwarder; the half-open range does not.
    let pe = export_image(&[0x1000, 0x1100], &[], 0x100).parse();
    let exports = pe.exports().unwrap();
    assert!(exports.is_forwarder(0));
    assert!(!exports.is_forwarder(1));
}

#[test]
fn test_directory_fields() {
    let pe = export_image(&[0x3000], &[("Alpha", 0)], 0x100).parse();
    let mut fields = pe.exports().unwrap().fields();
    assert_eq!(fields.fields_count(), 11);
    assert_eq!(fields.record_size(), 40);
    while fields.name() != "Name" {
        fields.load_next_field();
    }
    assert_eq!(fields.offset(), 0x400 + 12);
    assert_eq!(fields.description().as_deref(), Some("test.dll"));
}

#[test]
fn test_truncated_address_table_stops_iteration() {
    // NumberOfFunctions claims far more slots than the section holds.
    let pe = export_image(&[0x3000, 0x3010], &[], 0x100)
        .write_u32(DIR + 20, 0x1000_0000)
        .parse();
    let exports = pe.exports().unwrap();
    let slots: Vec<_> = exports.iter().collect();
    // FUNCS + n*4 must stay inside the 0x200-byte section plus its inclusive end.
    assert_eq!(slots.len() as u32, (0x200 - (FUNCS - 0x1000)) / 4);
    assert!(exports.function_rva(0x0FFF_FFFF).is_none());
}
