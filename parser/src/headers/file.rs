use std::collections::BTreeMap;

use crate::describe;
use crate::field::{FieldSpec, FieldType, Note};
use crate::reader::PeReader;

/// The COFF file header that follows the `PE\0\0` signature.
#[derive(Debug, Clone)]
pub struct FileHeader {
    pub machine: u16,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub pointer_to_symbol_table: u32,
    pub number_of_symbols: u32,
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

impl FileHeader {
    pub const SIZE: u64 = 20;

    pub const LAYOUT: &'static [FieldSpec] = &[
        FieldSpec::noted("Machine", FieldType::Word, Note::Machine),
        FieldSpec::new("Sections Count", FieldType::Word),
        FieldSpec::noted("Time Date Stamp", FieldType::Dword, Note::Timestamp),
        FieldSpec::new("Pointer to Symbol Table", FieldType::Dword),
        FieldSpec::new("Number of Symbols", FieldType::Dword),
        FieldSpec::new("Size of Optional Header", FieldType::Word),
        FieldSpec::new("Characteristics", FieldType::Word),
    ];

    pub(crate) fn parse(r: &PeReader, offset: u64) -> Option<Self> {
        Some(Self {
            machine: r.u16(offset)?,
            number_of_sections: r.u16(offset + 2)?,
            time_date_stamp: r.u32(offset + 4)?,
            pointer_to_symbol_table: r.u32(offset + 8)?,
            number_of_symbols: r.u32(offset + 12)?,
            size_of_optional_header: r.u16(offset + 16)?,
            characteristics: r.u16(offset + 18)?,
        })
    }

    pub fn machine_description(&self) -> &'static str {
        describe::machine(self.machine)
    }

    /// Set characteristic bits, keyed by bit value.
    pub fn characteristics_map(&self) -> BTreeMap<u16, &'static str> {
        describe::file_characteristics(self.characteristics)
    }

    pub fn is_dll(&self) -> bool {
        self.characteristics & 0x2000 != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::layout_size;

    #[test]
    fn test_layout_size() {
        assert_eq!(layout_size(FileHeader::LAYOUT), FileHeader::SIZE);
    }

    #[test]
    fn test_parse_and_describe() {
        let mut data = [0u8; 20];
        data[0..2].copy_from_slice(&0x8664u16.to_le_bytes());
        data[2..4].copy_from_slice(&3u16.to_le_bytes());
        data[16..18].copy_from_slice(&240u16.to_le_bytes());
        data[18..20].copy_from_slice(&0x2022u16.to_le_bytes());
        let fh = FileHeader::parse(&PeReader::new(&data), 0).unwrap();
        assert_eq!(fh.number_of_sections, 3);
        assert_eq!(fh.size_of_optional_header, 240);
        assert_eq!(fh.machine_description(), "AMD64 (K8)");
        assert!(fh.is_dll());
        assert_eq!(fh.characteristics_map().len(), 3);
    }

    #[test]
    fn test_truncated_header() {
        assert!(FileHeader::parse(&PeReader::new(&[0u8; 19]), 0).is_none());
    }
}
