use log::debug;

use super::{DirectoryKind, locate};
use crate::describe;
use crate::field::{FieldCursor, FieldSpec, FieldType, Note};
use crate::pe::{OffsetKind, PeFile};

use FieldType::{Dword, Word};

const CODEVIEW: u32 = 2;
const RSDS: u32 = 0x5344_5352;
const NB10: u32 = 0x3031_424E;

/// One 28-byte `IMAGE_DEBUG_DIRECTORY` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugRecord {
    pub offset: u64,
    pub characteristics: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub debug_type: u32,
    pub size_of_data: u32,
    pub address_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
}

impl DebugRecord {
    /// Empty for types past the classic five.
    pub fn type_description(&self) -> &'static str {
        describe::debug_type(self.debug_type)
    }
}

/// CodeView payload summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeView {
    /// PDB 7.0
    Rsds {
        guid: String,
        age: u32,
        path: String,
    },
    /// PDB 2.0
    Nb10 {
        signature: u32,
        age: u32,
        path: String,
    },
}

impl CodeView {
    pub fn path(&self) -> &str {
        match self {
            CodeView::Rsds { path, .. } | CodeView::Nb10 { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DebugDirectory {
    offset: u64,
    records: Vec<DebugRecord>,
}

impl DebugDirectory {
    pub const RECORD_SIZE: u64 = 28;

    pub const LAYOUT: &'static [FieldSpec] = &[
        FieldSpec::new("Characteristics", Dword),
        FieldSpec::noted("TimeDateStamp", Dword, Note::Timestamp),
        FieldSpec::new("MajorVersion", Word),
        FieldSpec::new("MinorVersion", Word),
        FieldSpec::noted("Type", Dword, Note::DebugType),
        FieldSpec::new("SizeOfData", Dword),
        FieldSpec::new("AddressOfRawData", Dword),
        FieldSpec::new("PointerToRawData", Dword),
    ];

    /// Decode `size / 28` records, at least one, stopping at the first record
    /// that runs past the file.
    pub(crate) fn load(pe: &PeFile) -> Option<Self> {
        let offset = locate(pe, DirectoryKind::Debug, Self::RECORD_SIZE)?;
        let declared = pe.data_directory(DirectoryKind::Debug).size as u64 / Self::RECORD_SIZE;
        let mut records = Vec::new();
        for i in 0..declared.max(1) {
            match read_record(pe, offset + i * Self::RECORD_SIZE) {
                Some(rec) => records.push(rec),
                None => break,
            }
        }
        if records.is_empty() {
            return None;
        }
        debug!("debug: {} record(s) of {} declared", records.len(), declared);
        Some(Self { offset, records })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn records(&self) -> &[DebugRecord] {
        &self.records
    }
}

fn read_record(pe: &PeFile, offset: u64) -> Option<DebugRecord> {
    let r = pe.reader_at(offset, OffsetKind::Raw)?;
    Some(DebugRecord {
        offset,
        characteristics: r.u32(0)?,
        time_date_stamp: r.u32(4)?,
        major_version: r.u16(8)?,
        minor_version: r.u16(10)?,
        debug_type: r.u32(12)?,
        size_of_data: r.u32(16)?,
        address_of_raw_data: r.u32(20)?,
        pointer_to_raw_data: r.u32(24)?,
    })
}

fn format_guid(g: &[u8]) -> String {
    format!(
        "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
        u32::from_le_bytes([g[0], g[1], g[2], g[3]]),
        u16::from_le_bytes([g[4], g[5]]),
        u16::from_le_bytes([g[6], g[7]]),
        g[8],
        g[9],
        g[10],
        g[11],
        g[12],
        g[13],
        g[14],
        g[15],
    )
}

/// Read-only view over the debug directory of a [`PeFile`].
#[derive(Clone, Copy)]
pub struct DebugDirectories<'pe> {
    pe: &'pe PeFile,
    dir: &'pe DebugDirectory,
}

impl<'pe> DebugDirectories<'pe> {
    pub(crate) fn new(pe: &'pe PeFile, dir: &'pe DebugDirectory) -> Self {
        Self { pe, dir }
    }

    pub fn directory(&self) -> &'pe DebugDirectory {
        self.dir
    }

    pub fn count(&self) -> usize {
        self.dir.records.len()
    }

    pub fn record(&self, index: usize) -> Option<&'pe DebugRecord> {
        self.dir.records.get(index)
    }

    /// The first record; the classic single debug entry.
    pub fn first(&self) -> Option<&'pe DebugRecord> {
        self.record(0)
    }

    pub fn fields(&self, index: usize) -> Option<FieldCursor<'pe>> {
        let rec = self.record(index)?;
        Some(FieldCursor::new(self.pe, DebugDirectory::LAYOUT, rec.offset))
    }

    /// CodeView signature, PDB identity and path of a CodeView record.
    pub fn codeview(&self, record: &DebugRecord) -> Option<CodeView> {
        if record.debug_type != CODEVIEW || record.pointer_to_raw_data == 0 {
            return None;
        }
        let r = self
            .pe
            .reader_at(record.pointer_to_raw_data as u64, OffsetKind::Raw)?;
        match r.u32(0)? {
            RSDS => Some(CodeView::Rsds {
                guid: format_guid(r.slice(4, 16)?),
                age: r.u32(20)?,
                path: r.cstr(24)?,
            }),
            NB10 => Some(CodeView::Nb10 {
                signature: r.u32(8)?,
                age: r.u32(12)?,
                path: r.cstr(16)?,
            }),
            _ => None,
        }
    }
}
