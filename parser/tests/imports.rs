mod common;

use common::ImageBuilder;
use pew_parser::DirectoryKind;
use pew_parser::directories::{Binding, ChainLink};

const IDATA: u32 = 0x2000;

struct Desc {
    oft: u32,
    ts: u32,
    chain: u32,
    name: u32,
    ft: u32,
}

fn with_descriptor(b: ImageBuilder, at: u32, d: Desc) -> ImageBuilder {
    b.write_u32(at, d.oft)
        .write_u32(at + 4, d.ts)
        .write_u32(at + 8, d.chain)
        .write_u32(at + 12, d.name)
        .write_u32(at + 16, d.ft)
}

fn with_hint_name(b: ImageBuilder, at: u32, hint: u16, name: &str) -> ImageBuilder {
    b.write_u16(at, hint).write_str(at + 2, name)
}

fn two_library_image() -> ImageBuilder {
    let b = ImageBuilder::pe32()
        .section(".idata", IDATA, 0x400, 0x600)
        .directory(DirectoryKind::Import, IDATA, 0x3C);
    let b = with_descriptor(
        b,
        IDATA,
        Desc { oft: 0x2100, ts: 0, chain: 0, name: 0x2300, ft: 0x2200 },
    );
    let b = with_descriptor(
        b,
        IDATA + 20,
        Desc { oft: 0, ts: u32::MAX, chain: u32::MAX, name: 0x2310, ft: 0x2240 },
    );
    let b = b
        .write_str(0x2300, "KERNEL32.dll")
        .write_str(0x2310, "USER32.dll")
        .write_u32(0x2100, 0x2400)
        .write_u32(0x2104, 0x8000_0010)
        .write_u32(0x2200, 0x2400)
        .write_u32(0x2204, 0x8000_0010)
        .write_u32(0x2240, 0x2420);
    let b = with_hint_name(b, 0x2400, 0x1F, "GetProcAddress");
    with_hint_name(b, 0x2420, 2, "MessageBoxA")
}

/// One old-bound library with four functions whose address table holds the
/// forwarder chain `links`.
fn chained_image(first: u32, links: [u32; 4]) -> ImageBuilder {
    let b = ImageBuilder::pe32()
        .section(".idata", IDATA, 0x400, 0x600)
        .directory(DirectoryKind::Import, IDATA, 0x28);
    let mut b = with_descriptor(
        b,
        IDATA,
        Desc { oft: 0x2100, ts: 0x3A00_0000, chain: first, name: 0x2300, ft: 0x2200 },
    )
    .write_str(0x2300, "OLDBOUND.dll");
    for (i, link) in links.iter().enumerate() {
        let hn = 0x2400 + i as u32 * 0x10;
        b = b.write_u32(0x2100 + i as u32 * 4, hn).write_u32(0x2200 + i as u32 * 4, *link);
        b = with_hint_name(b, hn, i as u16, &format!("Func{i}"));
    }
    b
}

#[test]
fn test_libraries_and_names() {
    let pe = two_library_image().parse();
    let imports = pe.imports().unwrap();
    assert_eq!(imports.libraries_count(), 2);
    assert_eq!(imports.directory().descriptors_size(), 40);
    assert_eq!(imports.library_name(0).as_deref(), Some("KERNEL32.dll"));
    assert_eq!(imports.library_name(1).as_deref(), Some("USER32.dll"));
    assert_eq!(imports.function_count(0), 2);
    assert_eq!(imports.function_count(1), 1);
    assert_eq!(imports.binding(0), Some(Binding::NotBound));
    assert_eq!(imports.binding(1), Some(Binding::NewBind));
    assert_eq!(imports.binding(2), None);
}

#[test]
fn test_thunks_32() {
    let pe = two_library_image().parse();
    let imports = pe.imports().unwrap();
    assert_eq!(imports.thunk_size(), 4);

    let by_name = imports.thunk(0, 0).unwrap();
    assert!(!by_name.by_ordinal);
    assert_eq!(by_name.hint, Some(0x1F));
    assert_eq!(by_name.name.as_deref(), Some("GetProcAddress"));
    assert_eq!(by_name.call_via, 0x2200);
    assert_eq!(by_name.original, Some(0x2400));
    assert_eq!(by_name.value, Some(0x2400));

    let by_ordinal = imports.thunk(0, 1).unwrap();
    assert!(by_ordinal.by_ordinal);
    assert_eq!(by_ordinal.ordinal, Some(16));
    assert_eq!(by_ordinal.name, None);
    assert_eq!(by_ordinal.call_via, 0x2204);

    assert!(imports.thunk(0, 2).is_none());
}

#[test]
fn test_address_table_names_when_no_original_thunks() {
    let pe = two_library_image().parse();
    let imports = pe.imports().unwrap();
    let thunks: Vec<_> = imports.thunks(1).collect();
    assert_eq!(thunks.len(), 1);
    assert_eq!(thunks[0].original, None);
    assert_eq!(thunks[0].name.as_deref(), Some("MessageBoxA"));
    assert_eq!(thunks[0].hint, Some(2));
}

#[test]
fn test_thunks_64_use_bit_63() {
    let b = ImageBuilder::pe64()
        .section(".idata", IDATA, 0x400, 0x600)
        .directory(DirectoryKind::Import, IDATA, 0x28);
    let b = with_descriptor(
        b,
        IDATA,
        Desc { oft: 0x2100, ts: 0, chain: 0, name: 0x2300, ft: 0x2200 },
    )
    .write_str(0x2300, "ntdll.dll")
    .write_u64(0x2100, 0x8000_0000_0000_0007)
    .write_u64(0x2108, 0x8000_2400)
    .write_u64(0x2200, 0x8000_0000_0000_0007)
    .write_u64(0x2208, 0x8000_2400);
    let pe = with_hint_name(b, 0x2400, 9, "NtClose").parse();
    let imports = pe.imports().unwrap();
    assert_eq!(imports.thunk_size(), 8);
    assert_eq!(imports.function_count(0), 2);

    assert!(imports.is_by_ordinal(0, 0));
    assert_eq!(imports.ordinal(0, 0), Some(7));

    // Bit 31 alone does not mark an ordinal in a 64-bit table.
    assert!(!imports.is_by_ordinal(0, 1));
    assert_eq!(imports.function_name(0, 1).as_deref(), Some("NtClose"));
    assert_eq!(imports.call_via(0, 1), Some(0x2208));
}

#[test]
fn test_descriptor_fields_skip_whole_entries() {
    let pe = two_library_image().parse();
    let imports = pe.imports().unwrap();
    let mut fields = imports.fields();
    let base = fields.base();
    assert_eq!(fields.record_size(), 20);
    fields.load_next_field();
    fields.load_next_field();
    assert_eq!(fields.name(), "Forwarder");
    fields.skip_entry();
    assert_eq!(fields.base(), base + 20);
    assert_eq!(fields.offset(), base + 20);
    assert_eq!(fields.index(), 0);
    while fields.name() != "NameRVA" {
        fields.load_next_field();
    }
    assert_eq!(fields.description().as_deref(), Some("USER32.dll"));
}

#[test]
fn test_forwarder_chain_walk() {
    // 0 -> 2 -> 3 -> end
    let pe = chained_image(0, [2, 0x2410, 3, u32::MAX]).parse();
    let imports = pe.imports().unwrap();
    assert!(imports.has_forwarders(0));
    assert_eq!(imports.binding(0), Some(Binding::OldBind));
    assert_eq!(
        imports.chain(0),
        vec![
            ChainLink::Next { from: 0, to: 2, target: 0x2208 },
            ChainLink::Next { from: 2, to: 3, target: 0x220C },
            ChainLink::End { at: 3 },
        ]
    );
}

#[test]
fn test_corrupted_chain_is_reported_not_followed() {
    // Slot 2 points backwards to slot 1.
    let pe = chained_image(0, [2, 0x2410, 1, u32::MAX]).parse();
    let imports = pe.imports().unwrap();
    assert_eq!(
        imports.chain(0),
        vec![
            ChainLink::Next { from: 0, to: 2, target: 0x2208 },
            ChainLink::Corrupted { at: 2, value: 1 },
        ]
    );

    // A next index past the function count is corrupted as well.
    let pe = chained_image(1, [0x2400, 9, 0x2420, 0x2430]).parse();
    assert_eq!(
        pe.imports().unwrap().chain(0),
        vec![ChainLink::Corrupted { at: 1, value: 9 }]
    );
}

#[test]
fn test_invalid_first_chain_index() {
    let pe = chained_image(4, [0x2400, 0x2410, 0x2420, 0x2430]).parse();
    let imports = pe.imports().unwrap();
    assert!(!imports.is_valid_forwarder_chain(0));
    assert!(!imports.has_forwarders(0));
    assert!(imports.chain(0).is_empty());

    let pe = chained_image(u32::MAX, [0x2400, 0x2410, 0x2420, 0x2430]).parse();
    let imports = pe.imports().unwrap();
    assert!(imports.has_forwarders(0));
    assert!(imports.chain(0).is_empty());
}

#[test]
fn test_cursor_follows_chain() {
    let pe = chained_image(0, [2, 0x2410, 3, u32::MAX]).parse();
    let imports = pe.imports().unwrap();
    let mut cursor = imports.cursor();
    assert!(cursor.select_library(0));
    assert_eq!(cursor.chain_index(), 0);
    assert!(cursor.is_forwarder());
    assert!(cursor.is_valid_next_chain_index());
    assert!(!cursor.is_end_of_chain());
    assert_eq!(cursor.forwarder(), Some(0x2208));

    assert!(cursor.load_next_chain_index());
    assert_eq!(cursor.chain_index(), 2);
    cursor.load_next_thunk();
    assert!(!cursor.is_forwarder());
    cursor.load_next_thunk();
    assert!(cursor.is_forwarder());
    assert_eq!(cursor.thunk().unwrap().name.as_deref(), Some("Func2"));

    assert!(cursor.load_next_chain_index());
    assert!(cursor.is_end_of_chain());
    assert_eq!(cursor.forwarder(), None);
    assert!(!cursor.load_next_chain_index());
    assert_eq!(cursor.chain_index(), 3);

    cursor.clear();
    assert_eq!(cursor.slot(), 0);
    assert_eq!(cursor.chain_index(), 0);
    assert!(!cursor.select_library(1));
}

#[test]
fn test_descriptor_array_without_sentinel() {
    // Descriptors fill the section to the end of the file with no terminator.
    let mut b = ImageBuilder::pe32()
        .section(".idata", IDATA, 0x400, 0x50)
        .directory(DirectoryKind::Import, IDATA, 0x50);
    for i in 0..4 {
        b = with_descriptor(
            b,
            IDATA + i * 20,
            Desc { oft: 0, ts: 0, chain: 0, name: 0x9000, ft: 0x9000 },
        );
    }
    let pe = b.parse();
    let imports = pe.imports().unwrap();
    assert_eq!(imports.libraries_count(), 4);
    assert_eq!(imports.library_name(0), None);
    assert_eq!(imports.function_count(0), 0);
}

#[test]
fn test_shared_and_overlapping_name_tables() {
    // Many libraries point into one name table; some start part way in.
    let libraries = 300u32;
    let entries = 2000u32;
    let table = 0x4000;
    let mut b = ImageBuilder::pe32()
        .section(".idata", IDATA, 0x400, 0x5000)
        .directory(DirectoryKind::Import, IDATA, (libraries + 1) * 20);
    for i in 0..libraries {
        let oft = if i % 3 == 2 { table + (i % 7) * 4 } else { table };
        b = with_descriptor(
            b,
            IDATA + i * 20,
            Desc { oft, ts: 0, chain: 0, name: 0x3F00, ft: table },
        );
    }
    let values: Vec<u8> = (0..entries).flat_map(|i| (0x8000_0001 + i).to_le_bytes()).collect();
    let pe = b.write_str(0x3F00, "SHARED.dll").write(table, values).parse();

    let imports = pe.imports().unwrap();
    assert_eq!(imports.libraries_count(), libraries as usize);
    for i in 0..libraries {
        let skipped = if i % 3 == 2 { i % 7 } else { 0 };
        assert_eq!(imports.function_count(i as usize), entries - skipped, "library {i}");
    }
    assert_eq!(imports.ordinal(2, 0), Some(3));
}

#[test]
fn test_name_table_stops_at_section_end() {
    // The table fills the rest of .idata; the next section is not read.
    let b = ImageBuilder::pe32()
        .section(".idata", IDATA, 0x400, 0x200)
        .section(".data", 0x3000, 0x600, 0x200)
        .directory(DirectoryKind::Import, IDATA, 0x28);
    let b = with_descriptor(
        b,
        IDATA,
        Desc { oft: 0x2100, ts: 0, chain: 0, name: 0x2080, ft: 0x2100 },
    )
    .write_str(0x2080, "FULL.dll")
    .write(0x2100, vec![0x11u8; 0x100])
    .write(0x3000, vec![0x22u8; 0x200]);
    let pe = b.parse();
    let imports = pe.imports().unwrap();
    assert_eq!(imports.function_count(0), 0x40);
    assert!(imports.thunk(0, 0x3F).is_some());
    assert!(imports.thunk(0, 0x40).is_none());
}

#[test]
fn test_name_table_cut_by_end_of_file() {
    // Three whole entries survive the cut; the fourth is split by it.
    let b = ImageBuilder::pe32()
        .section(".idata", IDATA, 0x400, 0x600)
        .directory(DirectoryKind::Import, IDATA, 0x28);
    let pe = with_descriptor(
        b,
        IDATA,
        Desc { oft: 0x2100, ts: 0, chain: 0, name: 0x2080, ft: 0x2200 },
    )
    .write_str(0x2080, "CUT.dll")
    .write_u32(0x2100, 0x8000_0001)
    .write_u32(0x2104, 0x8000_0002)
    .write_u32(0x2108, 0x8000_0003)
    .write_u32(0x210C, 0x8000_0004)
    .write_u32(0x2110, 0x8000_0005)
    .file_len(0x50E)
    .parse();

    let imports = pe.imports().unwrap();
    assert_eq!(imports.library_name(0).as_deref(), Some("CUT.dll"));
    assert_eq!(imports.function_count(0), 3);
    let ordinals: Vec<_> = imports.thunks(0).map(|t| t.ordinal).collect();
    assert_eq!(ordinals, vec![Some(1), Some(2), Some(3)]);
    assert!(imports.thunk(0, 3).is_none());
    // The address table lies past the cut.
    assert_eq!(imports.thunk_value(0, 0), None);
}
