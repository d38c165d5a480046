//! Data-directory decoders
//!
//! The optional header ends with 16 `(virtual address, size)` pairs. For the
//! kinds this crate understands, [`DataDirectories::load`] locates the record
//! and builds an immutable decoder; every other slot stays
//! [`DirectorySlot::Absent`]. Decoders only hold offsets and parsed values,
//! navigation lives in separate cursor types.

mod bound_import;
mod debug;
mod export;
mod import;
mod resource;

use log::{debug, warn};

use crate::pe::PeFile;

pub use bound_import::{
    BoundImportDirectory, BoundImportRecord, BoundImportWalker, BoundImports, WalkState,
};
pub use debug::{CodeView, DebugDirectories, DebugDirectory, DebugRecord};
pub use export::{ExportDirectory, ExportSlot, Exports};
pub use import::{
    Binding, ChainLink, ImportCursor, ImportDescriptor, ImportDirectory, Imports, Thunk,
};
pub use resource::{
    ResourceCursor, ResourceDataEntry, ResourceDirectory, ResourceEntry, ResourceNode, Resources,
    resource_type_name,
};

/// The 16 well-known data-directory slots, in table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DirectoryKind {
    Export,
    Import,
    Resource,
    Exception,
    Security,
    BaseReloc,
    Debug,
    Architecture,
    GlobalPtr,
    Tls,
    LoadConfig,
    BoundImport,
    Iat,
    DelayImport,
    Clr,
    Reserved,
}

impl DirectoryKind {
    pub const COUNT: usize = 16;

    pub const ALL: [DirectoryKind; Self::COUNT] = [
        DirectoryKind::Export,
        DirectoryKind::Import,
        DirectoryKind::Resource,
        DirectoryKind::Exception,
        DirectoryKind::Security,
        DirectoryKind::BaseReloc,
        DirectoryKind::Debug,
        DirectoryKind::Architecture,
        DirectoryKind::GlobalPtr,
        DirectoryKind::Tls,
        DirectoryKind::LoadConfig,
        DirectoryKind::BoundImport,
        DirectoryKind::Iat,
        DirectoryKind::DelayImport,
        DirectoryKind::Clr,
        DirectoryKind::Reserved,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub const fn name(self) -> &'static str {
        match self {
            DirectoryKind::Export => "Export Directory",
            DirectoryKind::Import => "Import Directory",
            DirectoryKind::Resource => "Resource Directory",
            DirectoryKind::Exception => "Exception Directory",
            DirectoryKind::Security => "Security Directory",
            DirectoryKind::BaseReloc => "Base Relocation Table",
            DirectoryKind::Debug => "Debug Directory",
            DirectoryKind::Architecture => "Architecture Specific Data",
            DirectoryKind::GlobalPtr => "RVA of Global Pointer",
            DirectoryKind::Tls => "TLS Directory",
            DirectoryKind::LoadConfig => "Load Configuration Directory",
            DirectoryKind::BoundImport => "Bound Import Directory",
            DirectoryKind::Iat => "Import Address Table",
            DirectoryKind::DelayImport => "Delay Load Import Descriptors",
            DirectoryKind::Clr => ".NET Header",
            DirectoryKind::Reserved => "Reserved",
        }
    }
}

/// One `(virtual address, size)` pair of the optional header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataDirectoryEntry {
    pub virtual_address: u32,
    pub size: u32,
}

impl DataDirectoryEntry {
    pub fn is_present(&self) -> bool {
        self.virtual_address != 0
    }

    /// Half-open `[va, va + size)` containment.
    pub fn contains(&self, rva: u64) -> bool {
        let start = self.virtual_address as u64;
        start <= rva && rva < start + self.size as u64
    }
}

/// A constructed directory decoder.
#[derive(Debug, Clone)]
pub enum Directory {
    Export(ExportDirectory),
    Import(ImportDirectory),
    BoundImport(BoundImportDirectory),
    Resource(ResourceDirectory),
    Debug(DebugDirectory),
}

impl Directory {
    pub fn kind(&self) -> DirectoryKind {
        match self {
            Directory::Export(_) => DirectoryKind::Export,
            Directory::Import(_) => DirectoryKind::Import,
            Directory::BoundImport(_) => DirectoryKind::BoundImport,
            Directory::Resource(_) => DirectoryKind::Resource,
            Directory::Debug(_) => DirectoryKind::Debug,
        }
    }

    /// Raw file offset of the directory's first record.
    pub fn offset(&self) -> u64 {
        match self {
            Directory::Export(d) => d.offset(),
            Directory::Import(d) => d.offset(),
            Directory::BoundImport(d) => d.offset(),
            Directory::Resource(d) => d.offset(),
            Directory::Debug(d) => d.offset(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub enum DirectorySlot {
    #[default]
    Absent,
    Present(Directory),
}

/// The table of directory decoders, one slot per [`DirectoryKind`].
#[derive(Debug, Clone, Default)]
pub struct DataDirectories {
    slots: [DirectorySlot; DirectoryKind::COUNT],
}

impl DataDirectories {
    /// Build a decoder for every supported directory with a non-zero,
    /// locatable virtual address.
    pub(crate) fn load(pe: &PeFile) -> Self {
        let mut table = Self::default();
        for kind in DirectoryKind::ALL {
            let built = match kind {
                DirectoryKind::Export => ExportDirectory::load(pe).map(Directory::Export),
                DirectoryKind::Import => ImportDirectory::load(pe).map(Directory::Import),
                DirectoryKind::BoundImport => {
                    BoundImportDirectory::load(pe).map(Directory::BoundImport)
                }
                DirectoryKind::Resource => ResourceDirectory::load(pe).map(Directory::Resource),
                DirectoryKind::Debug => DebugDirectory::load(pe).map(Directory::Debug),
                _ => None,
            };
            if let Some(dir) = built {
                table.slots[kind.index()] = DirectorySlot::Present(dir);
            }
        }
        table
    }

    pub fn slot(&self, kind: DirectoryKind) -> &DirectorySlot {
        &self.slots[kind.index()]
    }

    pub fn get(&self, kind: DirectoryKind) -> Option<&Directory> {
        match self.slot(kind) {
            DirectorySlot::Present(dir) => Some(dir),
            DirectorySlot::Absent => None,
        }
    }

    pub fn present_kinds(&self) -> Vec<DirectoryKind> {
        DirectoryKind::ALL
            .into_iter()
            .filter(|k| self.get(*k).is_some())
            .collect()
    }
}

/// Place the first record of directory `kind` in the file.
///
/// A zero virtual address means the directory is not there. Otherwise the
/// address is translated through the section table; when no section maps
/// it, the address is taken as a raw offset provided a whole `record_size`
/// record fits in the file there.
pub(crate) fn locate(pe: &PeFile, kind: DirectoryKind, record_size: u64) -> Option<u64> {
    let entry = pe.data_directory(kind);
    if !entry.is_present() {
        return None;
    }
    let va = entry.virtual_address as u64;
    if let Some(raw) = pe.rva_to_raw(va) {
        return Some(raw);
    }
    if va + record_size <= pe.len() {
        debug!("{}: no section maps {:#x}, using it as a raw offset", kind.name(), va);
        return Some(va);
    }
    warn!(
        "{}: virtual address {:#x} is outside every section and the file",
        kind.name(),
        va
    );
    None
}

/// Index-based navigation over a fixed number of entries.
///
/// Starts at entry 0 and only moves through [`select`](Self::select),
/// [`load_next`](Self::load_next) and [`reset`](Self::reset).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryCursor {
    current: usize,
    count: usize,
}

impl EntryCursor {
    pub fn new(count: usize) -> Self {
        Self { current: 0, count }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_done(&self) -> bool {
        self.current >= self.count
    }

    /// Jump to entry `index`. Out of range indices are refused.
    pub fn select(&mut self, index: usize) -> bool {
        if index < self.count {
            self.current = index;
            true
        } else {
            false
        }
    }

    /// Advance one entry; stops one past the last entry.
    pub fn load_next(&mut self) {
        if self.current < self.count {
            self.current += 1;
        }
    }

    pub fn reset(&mut self) {
        self.current = 0;
    }
}
