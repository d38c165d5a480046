use crate::field::{FieldSpec, FieldType};
use crate::reader::PeReader;

use FieldType::{Bytes, Dword, Word};

/// The MS-DOS stub header at offset 0.
#[derive(Debug, Clone)]
pub struct DosHeader {
    pub magic: u16,
    pub bytes_on_last_page: u16,
    pub pages: u16,
    pub header_paragraphs: u16,
    pub initial_ss: u16,
    pub initial_sp: u16,
    pub initial_ip: u16,
    pub initial_cs: u16,
    pub lfanew: u32,
}

impl DosHeader {
    pub const SIZE: u64 = 64;
    pub const LFANEW_OFFSET: u64 = 60;

    pub const LAYOUT: &'static [FieldSpec] = &[
        FieldSpec::new("Magic number", Word),
        FieldSpec::new("Bytes on last page of file", Word),
        FieldSpec::new("Pages in file", Word),
        FieldSpec::new("Relocations", Word),
        FieldSpec::new("Size of header in paragraphs", Word),
        FieldSpec::new("Minimum extra paragraphs", Word),
        FieldSpec::new("Maximum extra paragraphs", Word),
        FieldSpec::new("Initial (relative) SS value", Word),
        FieldSpec::new("Initial SP value", Word),
        FieldSpec::new("Checksum", Word),
        FieldSpec::new("Initial IP value", Word),
        FieldSpec::new("Initial (relative) CS value", Word),
        FieldSpec::new("File address of relocation table", Word),
        FieldSpec::new("Overlay number", Word),
        FieldSpec::new("Reserved words", Bytes(8)),
        FieldSpec::new("OEM identifier", Word),
        FieldSpec::new("OEM information", Word),
        FieldSpec::new("Reserved words", Bytes(20)),
        FieldSpec::new("File address of new exe header", Dword),
    ];

    pub(crate) fn parse(r: &PeReader) -> Option<Self> {
        Some(Self {
            magic: r.u16(0)?,
            bytes_on_last_page: r.u16(2)?,
            pages: r.u16(4)?,
            header_paragraphs: r.u16(8)?,
            initial_ss: r.u16(14)?,
            initial_sp: r.u16(16)?,
            initial_ip: r.u16(20)?,
            initial_cs: r.u16(22)?,
            lfanew: r.u32(Self::LFANEW_OFFSET)?,
        })
    }

    pub fn nt_headers_offset(&self) -> u64 {
        self.lfanew as u64
    }
}
