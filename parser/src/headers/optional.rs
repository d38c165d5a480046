use std::collections::BTreeMap;

use crate::describe;
use crate::directories::{DataDirectoryEntry, DirectoryKind};
use crate::field::{FieldSpec, FieldType, Note};
use crate::pe::Bitness;
use crate::reader::PeReader;

use FieldType::{Byte, Dword, Qword, Word};

const LAYOUT_32: &[FieldSpec] = &[
    FieldSpec::noted("Magic", Word, Note::OptionalMagic),
    FieldSpec::new("Linker Ver. (Major)", Byte),
    FieldSpec::new("Linker Ver. (Minor)", Byte),
    FieldSpec::new("Size of Code", Dword),
    FieldSpec::new("Size of Initialized Data", Dword),
    FieldSpec::new("Size of Uninitialized Data", Dword),
    FieldSpec::new("Entry Point", Dword),
    FieldSpec::new("Base of Code", Dword),
    FieldSpec::new("Base of Data", Dword),
    FieldSpec::new("Image Base", Dword),
    FieldSpec::new("Section Alignment", Dword),
    FieldSpec::new("File Alignment", Dword),
    FieldSpec::new("OS Ver. (Major)", Word),
    FieldSpec::new("OS Ver. (Minor)", Word),
    FieldSpec::new("Image Ver. (Major)", Word),
    FieldSpec::new("Image Ver. (Minor)", Word),
    FieldSpec::new("Subsystem Ver. (Major)", Word),
    FieldSpec::new("Subsystem Ver. (Minor)", Word),
    FieldSpec::new("Win32 Version Value", Dword),
    FieldSpec::new("Size of Image", Dword),
    FieldSpec::new("Size of Headers", Dword),
    FieldSpec::new("Checksum", Dword),
    FieldSpec::noted("Subsystem", Word, Note::Subsystem),
    FieldSpec::new("DLL Characteristics", Word),
    FieldSpec::new("Size of Stack Reserve", Dword),
    FieldSpec::new("Size of Stack Commit", Dword),
    FieldSpec::new("Size of Heap Reserve", Dword),
    FieldSpec::new("Size of Heap Commit", Dword),
    FieldSpec::new("Loader Flags", Dword),
    FieldSpec::new("Number of RVAs and Sizes", Dword),
];

// No "Base of Data"; image base and the stack/heap sizes are 8 bytes wide.
const LAYOUT_64: &[FieldSpec] = &[
    FieldSpec::noted("Magic", Word, Note::OptionalMagic),
    FieldSpec::new("Linker Ver. (Major)", Byte),
    FieldSpec::new("Linker Ver. (Minor)", Byte),
    FieldSpec::new("Size of Code", Dword),
    FieldSpec::new("Size of Initialized Data", Dword),
    FieldSpec::new("Size of Uninitialized Data", Dword),
    FieldSpec::new("Entry Point", Dword),
    FieldSpec::new("Base of Code", Dword),
    FieldSpec::new("Image Base", Qword),
    FieldSpec::new("Section Alignment", Dword),
    FieldSpec::new("File Alignment", Dword),
    FieldSpec::new("OS Ver. (Major)", Word),
    FieldSpec::new("OS Ver. (Minor)", Word),
    FieldSpec::new("Image Ver. (Major)", Word),
    FieldSpec::new("Image Ver. (Minor)", Word),
    FieldSpec::new("Subsystem Ver. (Major)", Word),
    FieldSpec::new("Subsystem Ver. (Minor)", Word),
    FieldSpec::new("Win32 Version Value", Dword),
    FieldSpec::new("Size of Image", Dword),
    FieldSpec::new("Size of Headers", Dword),
    FieldSpec::new("Checksum", Dword),
    FieldSpec::noted("Subsystem", Word, Note::Subsystem),
    FieldSpec::new("DLL Characteristics", Word),
    FieldSpec::new("Size of Stack Reserve", Qword),
    FieldSpec::new("Size of Stack Commit", Qword),
    FieldSpec::new("Size of Heap Reserve", Qword),
    FieldSpec::new("Size of Heap Commit", Qword),
    FieldSpec::new("Loader Flags", Dword),
    FieldSpec::new("Number of RVAs and Sizes", Dword),
];

/// Byte offsets of the fields whose position depends on bitness.
struct Offsets {
    image_base: u64,
    stack_reserve: u64,
    number_of_rva_and_sizes: u64,
    data_directories: u64,
}

const OFFSETS_32: Offsets = Offsets {
    image_base: 28,
    stack_reserve: 72,
    number_of_rva_and_sizes: 92,
    data_directories: 96,
};

const OFFSETS_64: Offsets = Offsets {
    image_base: 24,
    stack_reserve: 72,
    number_of_rva_and_sizes: 108,
    data_directories: 112,
};

/// The optional header, decoded with the layout of one bitness.
#[derive(Debug, Clone)]
pub struct OptionalHeader {
    bitness: Bitness,
    pub magic: u16,
    pub size_of_code: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    /// Absent on PE32+.
    pub base_of_data: Option<u32>,
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub checksum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u64,
    pub size_of_stack_commit: u64,
    pub size_of_heap_reserve: u64,
    pub size_of_heap_commit: u64,
    pub number_of_rva_and_sizes: u32,
    data_directories: [DataDirectoryEntry; DirectoryKind::COUNT],
    layout: Vec<FieldSpec>,
}

impl OptionalHeader {
    pub const SIZE_32: u64 = 224;
    pub const SIZE_64: u64 = 240;
    pub const DATA_DIRECTORY_SIZE: u64 = 8;

    pub(crate) fn parse(r: &PeReader, offset: u64, bitness: Bitness) -> Option<Self> {
        let (fixed, at) = match bitness {
            Bitness::Pe32 => (LAYOUT_32, &OFFSETS_32),
            Bitness::Pe64 => (LAYOUT_64, &OFFSETS_64),
        };

        let wide = |off: u64| -> Option<u64> {
            match bitness {
                Bitness::Pe32 => r.u32(offset + off).map(u64::from),
                Bitness::Pe64 => r.u64(offset + off),
            }
        };
        let step = bitness.thunk_size();

        let mut data_directories = [DataDirectoryEntry::default(); DirectoryKind::COUNT];
        for (i, entry) in data_directories.iter_mut().enumerate() {
            let base = offset + at.data_directories + i as u64 * Self::DATA_DIRECTORY_SIZE;
            *entry = DataDirectoryEntry {
                virtual_address: r.u32(base)?,
                size: r.u32(base + 4)?,
            };
        }

        let mut layout = fixed.to_vec();
        layout.extend(DirectoryKind::ALL.iter().flat_map(|&kind| {
            [
                FieldSpec::noted("VirtualAddress", Dword, Note::DataDirectory(kind)),
                FieldSpec::noted("Size", Dword, Note::DataDirectory(kind)),
            ]
        }));

        Some(Self {
            bitness,
            magic: r.u16(offset)?,
            size_of_code: r.u32(offset + 4)?,
            address_of_entry_point: r.u32(offset + 16)?,
            base_of_code: r.u32(offset + 20)?,
            base_of_data: match bitness {
                Bitness::Pe32 => Some(r.u32(offset + 24)?),
                Bitness::Pe64 => None,
            },
            image_base: wide(at.image_base)?,
            section_alignment: r.u32(offset + 32)?,
            file_alignment: r.u32(offset + 36)?,
            size_of_image: r.u32(offset + 56)?,
            size_of_headers: r.u32(offset + 60)?,
            checksum: r.u32(offset + 64)?,
            subsystem: r.u16(offset + 68)?,
            dll_characteristics: r.u16(offset + 70)?,
            size_of_stack_reserve: wide(at.stack_reserve)?,
            size_of_stack_commit: wide(at.stack_reserve + step)?,
            size_of_heap_reserve: wide(at.stack_reserve + 2 * step)?,
            size_of_heap_commit: wide(at.stack_reserve + 3 * step)?,
            number_of_rva_and_sizes: r.u32(offset + at.number_of_rva_and_sizes)?,
            data_directories,
            layout,
        })
    }

    pub fn bitness(&self) -> Bitness {
        self.bitness
    }

    /// Fixed fields, then a `VirtualAddress` and a `Size` row for each of
    /// the 16 data directories.
    pub fn layout(&self) -> &[FieldSpec] {
        &self.layout
    }

    pub fn data_directory(&self, kind: DirectoryKind) -> DataDirectoryEntry {
        self.data_directories[kind.index()]
    }

    pub fn data_directories(&self) -> &[DataDirectoryEntry] {
        &self.data_directories
    }

    pub fn magic_description(&self) -> &'static str {
        describe::optional_magic(self.magic)
    }

    pub fn subsystem_description(&self) -> &'static str {
        describe::subsystem(self.subsystem)
    }

    pub fn dll_characteristics_map(&self) -> BTreeMap<u16, &'static str> {
        describe::dll_characteristics(self.dll_characteristics)
    }
}
