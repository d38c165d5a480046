use log::{debug, warn};

use super::{DirectoryKind, locate};
use crate::field::{FieldCursor, FieldSpec, FieldType, Note};
use crate::pe::{OffsetKind, PeFile};

use FieldType::{Dword, Word};

/// One 8-byte record of the bound-import stream: a descriptor or one of the
/// forwarder refs that trail it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundImportRecord {
    pub offset: u64,
    pub time_date_stamp: u32,
    /// Module name offset, relative to the start of the directory.
    pub offset_module_name: u16,
    /// Forwarder-ref count on descriptors, reserved on forwarder refs.
    pub forwarder_refs: u16,
    /// Set on the refs that trail a descriptor.
    pub is_forwarder_ref: bool,
}

/// The bound-import stream up to its all-zero terminator.
#[derive(Debug, Clone)]
pub struct BoundImportDirectory {
    offset: u64,
    records: Vec<BoundImportRecord>,
}

impl BoundImportDirectory {
    pub const RECORD_SIZE: u64 = 8;

    pub const DESCRIPTOR_LAYOUT: &'static [FieldSpec] = &[
        FieldSpec::noted("TimeDateStamp", Dword, Note::Timestamp),
        FieldSpec::new("OffsetModuleName", Word),
        FieldSpec::new("NumberOfModuleForwarderRefs", Word),
    ];

    pub const FORWARDER_REF_LAYOUT: &'static [FieldSpec] = &[
        FieldSpec::noted("TimeDateStamp", Dword, Note::Timestamp),
        FieldSpec::new("OffsetModuleName", Word),
        FieldSpec::new("Reserved", Word),
    ];

    pub(crate) fn load(pe: &PeFile) -> Option<Self> {
        let offset = locate(pe, DirectoryKind::BoundImport, Self::RECORD_SIZE)?;
        let r = pe.reader_at(offset, OffsetKind::Raw)?;

        let mut records = Vec::new();
        let mut refs_left = 0u16;
        let mut at = 0u64;
        while !r.is_zeroed(at, Self::RECORD_SIZE as usize) {
            let (Some(time_date_stamp), Some(offset_module_name), Some(forwarder_refs)) =
                (r.u32(at), r.u16(at + 4), r.u16(at + 6))
            else {
                warn!(
                    "bound imports: record stream runs past the end of the file after {} records",
                    records.len()
                );
                break;
            };
            let is_forwarder_ref = refs_left > 0;
            refs_left = if is_forwarder_ref {
                refs_left - 1
            } else {
                forwarder_refs
            };
            records.push(BoundImportRecord {
                offset: offset + at,
                time_date_stamp,
                offset_module_name,
                forwarder_refs,
                is_forwarder_ref,
            });
            at += Self::RECORD_SIZE;
        }

        let dir = Self { offset, records };
        debug!(
            "bound imports: {} librar(ies), {} record(s)",
            dir.descriptors_count(),
            dir.records.len()
        );
        Some(dir)
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Non-zero records, descriptors and forwarder refs alike.
    pub fn records(&self) -> &[BoundImportRecord] {
        &self.records
    }

    /// Descriptors only; their forwarder refs are not counted.
    pub fn descriptors_count(&self) -> usize {
        self.records.iter().filter(|r| !r.is_forwarder_ref).count()
    }

    pub fn records_size(&self) -> u64 {
        self.records.len() as u64 * Self::RECORD_SIZE
    }
}

/// Where a sequential walk stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkState {
    AtDescriptor,
    /// On a forwarder ref; `remaining` counts this one and those after it.
    AtForwarderRef { remaining: u16 },
}

/// Read-only view over the bound-import directory of a [`PeFile`].
#[derive(Clone, Copy)]
pub struct BoundImports<'pe> {
    pe: &'pe PeFile,
    dir: &'pe BoundImportDirectory,
}

impl<'pe> BoundImports<'pe> {
    pub(crate) fn new(pe: &'pe PeFile, dir: &'pe BoundImportDirectory) -> Self {
        Self { pe, dir }
    }

    pub fn directory(&self) -> &'pe BoundImportDirectory {
        self.dir
    }

    /// Every record of the stream, forwarder refs included.
    pub fn records_count(&self) -> usize {
        self.dir.records.len()
    }

    pub fn descriptors_count(&self) -> usize {
        self.dir.descriptors_count()
    }

    /// Module name stored at `offset_module_name` past the directory start.
    pub fn name_of(&self, record: &BoundImportRecord) -> Option<String> {
        let at = self.dir.offset + record.offset_module_name as u64;
        self.pe.read_cstr(at, OffsetKind::Raw)
    }

    pub fn walker(&self) -> BoundImportWalker<'pe> {
        BoundImportWalker::new(*self)
    }
}

/// Sequential walk over the bound-import stream.
///
/// The stream cannot be indexed: a descriptor's forwarder refs have to be
/// stepped over before the next descriptor is reachable.
#[derive(Clone)]
pub struct BoundImportWalker<'pe> {
    view: BoundImports<'pe>,
    index: usize,
    state: WalkState,
    fields: FieldCursor<'pe>,
}

impl<'pe> BoundImportWalker<'pe> {
    fn new(view: BoundImports<'pe>) -> Self {
        let fields = FieldCursor::new(
            view.pe,
            BoundImportDirectory::DESCRIPTOR_LAYOUT,
            view.dir.offset,
        );
        Self {
            view,
            index: 0,
            state: WalkState::AtDescriptor,
            fields,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> WalkState {
        self.state
    }

    pub fn is_forwarder_ref(&self) -> bool {
        matches!(self.state, WalkState::AtForwarderRef { .. })
    }

    pub fn is_done(&self) -> bool {
        self.index >= self.view.dir.records.len()
    }

    pub fn record(&self) -> Option<&'pe BoundImportRecord> {
        self.view.dir.records.get(self.index)
    }

    pub fn library_name(&self) -> Option<String> {
        self.view.name_of(self.record()?)
    }

    /// Field cursor over the current record.
    pub fn fields(&mut self) -> &mut FieldCursor<'pe> {
        &mut self.fields
    }

    /// Step to the next record. Leaving a descriptor enters its forwarder
    /// refs, if it has any; leaving the last ref returns to descriptors.
    pub fn load_next_library(&mut self) {
        let Some(record) = self.record() else {
            return;
        };
        self.state = match self.state {
            WalkState::AtDescriptor if record.forwarder_refs > 0 => WalkState::AtForwarderRef {
                remaining: record.forwarder_refs,
            },
            WalkState::AtDescriptor => WalkState::AtDescriptor,
            WalkState::AtForwarderRef { remaining } if remaining > 1 => {
                WalkState::AtForwarderRef {
                    remaining: remaining - 1,
                }
            }
            WalkState::AtForwarderRef { .. } => WalkState::AtDescriptor,
        };
        self.index += 1;

        let layout = if self.is_forwarder_ref() {
            BoundImportDirectory::FORWARDER_REF_LAYOUT
        } else {
            BoundImportDirectory::DESCRIPTOR_LAYOUT
        };
        let base = self.view.dir.offset + self.index as u64 * BoundImportDirectory::RECORD_SIZE;
        self.fields = FieldCursor::new(self.view.pe, layout, base);
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.view);
    }
}
