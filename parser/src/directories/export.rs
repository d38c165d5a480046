use std::collections::HashMap;

use log::{debug, warn};

use super::{DataDirectoryEntry, DirectoryKind, EntryCursor, locate};
use crate::field::{FieldCursor, FieldSpec, FieldType, Note};
use crate::pe::{OffsetKind, PeFile};

use FieldType::{Dword, Word};

/// Decoded `IMAGE_EXPORT_DIRECTORY` plus the slot-to-name index.
#[derive(Debug, Clone)]
pub struct ExportDirectory {
    offset: u64,
    range: DataDirectoryEntry,
    pub characteristics: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub name_rva: u32,
    pub base: u32,
    pub number_of_functions: u32,
    pub number_of_names: u32,
    pub address_of_functions: u32,
    pub address_of_names: u32,
    pub address_of_name_ordinals: u32,
    /// Address-table slot -> position in the name table.
    name_index: HashMap<u32, u32>,
}

impl ExportDirectory {
    pub const SIZE: u64 = 40;

    pub const LAYOUT: &'static [FieldSpec] = &[
        FieldSpec::new("Characteristics", Dword),
        FieldSpec::noted("TimeDateStamp", Dword, Note::Timestamp),
        FieldSpec::new("MajorVersion", Word),
        FieldSpec::new("MinorVersion", Word),
        FieldSpec::noted("Name", Dword, Note::NameRva),
        FieldSpec::new("Base", Dword),
        FieldSpec::new("NumberOfFunctions", Dword),
        FieldSpec::new("NumberOfNames", Dword),
        FieldSpec::new("AddressOfFunctions", Dword),
        FieldSpec::new("AddressOfNames", Dword),
        FieldSpec::new("AddressOfNameOrdinals", Dword),
    ];

    pub(crate) fn load(pe: &PeFile) -> Option<Self> {
        let offset = locate(pe, DirectoryKind::Export, Self::SIZE)?;
        let r = pe.reader_at(offset, OffsetKind::Raw)?;
        let mut dir = Self {
            offset,
            range: pe.data_directory(DirectoryKind::Export),
            characteristics: r.u32(0)?,
            time_date_stamp: r.u32(4)?,
            major_version: r.u16(8)?,
            minor_version: r.u16(10)?,
            name_rva: r.u32(12)?,
            base: r.u32(16)?,
            number_of_functions: r.u32(20)?,
            number_of_names: r.u32(24)?,
            address_of_functions: r.u32(28)?,
            address_of_names: r.u32(32)?,
            address_of_name_ordinals: r.u32(36)?,
            name_index: HashMap::new(),
        };
        dir.index_names(pe);
        debug!(
            "exports: {} function(s), {} name(s), base {}",
            dir.number_of_functions,
            dir.name_index.len(),
            dir.base
        );
        Some(dir)
    }

    /// Read the name-ordinals array once. A slot named twice keeps the last
    /// name.
    fn index_names(&mut self, pe: &PeFile) {
        let table = self.address_of_name_ordinals as u64;
        for i in 0..self.number_of_names {
            match pe.table_entry(table, i as u64, 2) {
                Some(slot) => {
                    self.name_index.insert(slot as u32, i);
                }
                None => {
                    warn!(
                        "exports: name-ordinal table truncated at {} of {}",
                        i, self.number_of_names
                    );
                    break;
                }
            }
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Name-table position for an address-table slot.
    pub fn name_index(&self, slot: u32) -> Option<u32> {
        self.name_index.get(&slot).copied()
    }
}

/// What one address-table slot resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSlot {
    pub index: u32,
    pub ordinal: u64,
    /// Raw offset of the address-table slot.
    pub offset: Option<u64>,
    pub function_rva: u32,
    pub by_ordinal: bool,
    pub name: Option<String>,
    /// Target string (`"OTHER.Function"`) for forwarded exports.
    pub forwarder: Option<String>,
}

impl ExportSlot {
    pub fn is_forwarder(&self) -> bool {
        self.forwarder.is_some()
    }
}

/// Read-only view over the export directory of a [`PeFile`].
#[derive(Clone, Copy)]
pub struct Exports<'pe> {
    pe: &'pe PeFile,
    dir: &'pe ExportDirectory,
}

impl<'pe> Exports<'pe> {
    pub(crate) fn new(pe: &'pe PeFile, dir: &'pe ExportDirectory) -> Self {
        Self { pe, dir }
    }

    pub fn directory(&self) -> &'pe ExportDirectory {
        self.dir
    }

    pub fn fields(&self) -> FieldCursor<'pe> {
        FieldCursor::new(self.pe, ExportDirectory::LAYOUT, self.dir.offset)
    }

    /// Navigation state over the address-table slots.
    pub fn cursor(&self) -> EntryCursor {
        EntryCursor::new(self.dir.number_of_functions as usize)
    }

    pub fn library_name(&self) -> Option<String> {
        self.pe
            .read_cstr(self.dir.name_rva as u64, OffsetKind::Virtual)
    }

    pub fn function_count(&self) -> u32 {
        self.dir.number_of_functions
    }

    pub fn names_count(&self) -> u32 {
        self.dir.number_of_names
    }

    pub fn base(&self) -> u32 {
        self.dir.base
    }

    /// Ordinal of slot `i`: the directory base plus the slot index.
    pub fn ordinal(&self, i: u32) -> u64 {
        self.dir.base as u64 + i as u64
    }

    pub fn function_rva(&self, i: u32) -> Option<u32> {
        self.pe
            .table_entry(self.dir.address_of_functions as u64, i as u64, 4)
            .map(|v| v as u32)
    }

    /// Raw offset of address-table slot `i`.
    pub fn function_offset(&self, i: u32) -> Option<u64> {
        self.pe
            .rva_to_raw(self.dir.address_of_functions as u64 + i as u64 * 4)
    }

    pub fn is_by_ordinal(&self, i: u32) -> bool {
        self.dir.name_index(i).is_none()
    }

    pub fn name_rva(&self, i: u32) -> Option<u32> {
        let pos = self.dir.name_index(i)?;
        self.pe
            .table_entry(self.dir.address_of_names as u64, pos as u64, 4)
            .map(|v| v as u32)
    }

    pub fn name(&self, i: u32) -> Option<String> {
        let rva = self.name_rva(i)?;
        self.pe.read_cstr(rva as u64, OffsetKind::Virtual)
    }

    /// Whether slot `i` points back inside the export directory's own
    /// `[va, va + size)` range, i.e. at a forwarder string.
    pub fn is_forwarder(&self, i: u32) -> bool {
        self.function_rva(i)
            .is_some_and(|rva| self.dir.range.contains(rva as u64))
    }

    pub fn forwarder_name(&self, i: u32) -> Option<String> {
        if !self.is_forwarder(i) {
            return None;
        }
        let rva = self.function_rva(i)?;
        self.pe.read_cstr(rva as u64, OffsetKind::Virtual)
    }

    /// Snapshot of slot `i`, `None` when the slot is past the table or the
    /// file.
    pub fn slot(&self, i: u32) -> Option<ExportSlot> {
        if i >= self.dir.number_of_functions {
            return None;
        }
        let function_rva = self.function_rva(i)?;
        Some(ExportSlot {
            index: i,
            ordinal: self.ordinal(i),
            offset: self.function_offset(i),
            function_rva,
            by_ordinal: self.is_by_ordinal(i),
            name: self.name(i),
            forwarder: self.forwarder_name(i),
        })
    }

    /// All readable slots in order; stops at the first slot that cannot be
    /// read.
    pub fn iter(&self) -> impl Iterator<Item = ExportSlot> + use<'pe> {
        let view = *self;
        (0..self.dir.number_of_functions).map_while(move |i| view.slot(i))
    }
}
