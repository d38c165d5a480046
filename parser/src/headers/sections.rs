use std::collections::BTreeMap;

use log::warn;

use crate::describe;
use crate::field::{FieldSpec, FieldType};
use crate::reader::PeReader;

use FieldType::{Bytes, Dword, Word};

/// One 40-byte section header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    header_offset: u64,
    pub name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub raw_size: u32,
    pub raw_pointer: u32,
    pub relocation_pointer: u32,
    pub linenum_pointer: u32,
    pub relocation_count: u16,
    pub linenum_count: u16,
    pub characteristics: u32,
}

impl Section {
    fn parse(r: &PeReader, offset: u64) -> Option<Self> {
        let mut name = [0u8; 8];
        name.copy_from_slice(r.slice(offset, 8)?);
        Some(Self {
            header_offset: offset,
            name,
            virtual_size: r.u32(offset + 8)?,
            virtual_address: r.u32(offset + 12)?,
            raw_size: r.u32(offset + 16)?,
            raw_pointer: r.u32(offset + 20)?,
            relocation_pointer: r.u32(offset + 24)?,
            linenum_pointer: r.u32(offset + 28)?,
            relocation_count: r.u16(offset + 32)?,
            linenum_count: r.u16(offset + 34)?,
            characteristics: r.u32(offset + 36)?,
        })
    }

    /// Raw file offset of this header.
    pub fn header_offset(&self) -> u64 {
        self.header_offset
    }

    /// Section name up to the first NUL. Eight-byte names are not
    /// terminated.
    pub fn name(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(8);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    pub fn characteristics_map(&self) -> BTreeMap<u32, &'static str> {
        describe::section_characteristics(self.characteristics)
    }

    /// Whether `rva` lies in the file-backed part of this section. Both ends
    /// are inclusive.
    pub fn contains_rva(&self, rva: u64) -> bool {
        let start = self.virtual_address as u64;
        start <= rva && rva <= start + self.raw_size as u64
    }
}

/// The section table, in file order.
#[derive(Debug, Clone, Default)]
pub struct SectionTable {
    offset: u64,
    sections: Vec<Section>,
}

impl SectionTable {
    pub const ENTRY_SIZE: u64 = 40;

    pub const LAYOUT: &'static [FieldSpec] = &[
        FieldSpec::new("Name", Bytes(8)),
        FieldSpec::new("Virtual Size", Dword),
        FieldSpec::new("Virtual Address", Dword),
        FieldSpec::new("Size of Raw Data", Dword),
        FieldSpec::new("Pointer to Raw Data", Dword),
        FieldSpec::new("Pointer to Relocations", Dword),
        FieldSpec::new("Pointer to Line Numbers", Dword),
        FieldSpec::new("Number of Relocations", Word),
        FieldSpec::new("Number of Line Numbers", Word),
        FieldSpec::new("Characteristics", Dword),
    ];

    /// Read up to `count` headers starting at `offset`. A table that runs
    /// past the end of the file is cut at the last complete header.
    pub(crate) fn parse(r: &PeReader, offset: u64, count: u16) -> Self {
        let mut sections = Vec::with_capacity(count as usize);
        for i in 0..count as u64 {
            match Section::parse(r, offset + i * Self::ENTRY_SIZE) {
                Some(s) => sections.push(s),
                None => {
                    warn!("section table truncated after {} of {} headers", i, count);
                    break;
                }
            }
        }
        Self { offset, sections }
    }

    /// Build a table directly from headers, for callers that already have
    /// them.
    pub fn from_sections(offset: u64, sections: Vec<Section>) -> Self {
        Self { offset, sections }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Section> {
        self.sections.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Section> {
        self.sections.iter()
    }

    /// First section whose file-backed range contains `rva`.
    pub fn section_for_rva(&self, rva: u64) -> Option<&Section> {
        self.sections.iter().find(|s| s.contains_rva(rva))
    }

    /// Translate a relative virtual address into a raw file offset.
    pub fn rva_to_raw(&self, rva: u64) -> Option<u64> {
        let s = self.section_for_rva(rva)?;
        Some(s.raw_pointer as u64 + (rva - s.virtual_address as u64))
    }
}

impl<'a> IntoIterator for &'a SectionTable {
    type Item = &'a Section;
    type IntoIter = std::slice::Iter<'a, Section>;

    fn into_iter(self) -> Self::IntoIter {
        self.sections.iter()
    }
}
