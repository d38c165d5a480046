//! Import descriptors, thunk tables and old-style forwarder chains

use std::collections::HashMap;

use log::{debug, trace, warn};

use super::{DirectoryKind, EntryCursor, locate};
use crate::field::{FieldCursor, FieldSpec, FieldType, Note};
use crate::pe::{OffsetKind, PeFile};
use crate::reader::PeReader;

use FieldType::Dword;

/// `TimeDateStamp`/`ForwarderChain` sentinel.
const ALL_ONES: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    NotBound,
    /// Bound with a real timestamp; forwarder chains may be present.
    OldBind,
    /// Timestamp is -1; binding data lives in the bound-import directory.
    NewBind,
}

impl Binding {
    pub fn from_timestamp(timestamp: u32) -> Self {
        match timestamp {
            ALL_ONES => Binding::NewBind,
            0 => Binding::NotBound,
            _ => Binding::OldBind,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Binding::NotBound => "Not bound",
            Binding::OldBind => "Old bind",
            Binding::NewBind => "New bind",
        }
    }
}

/// One 20-byte `IMAGE_IMPORT_DESCRIPTOR`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDescriptor {
    pub offset: u64,
    pub original_first_thunk: u32,
    pub time_date_stamp: u32,
    pub forwarder_chain: u32,
    pub name_rva: u32,
    pub first_thunk: u32,
    /// Entries of the name table before its zero terminator.
    pub function_count: u32,
}

impl ImportDescriptor {
    fn parse(r: &PeReader, offset: u64) -> Option<Self> {
        Some(Self {
            offset,
            original_first_thunk: r.u32(0)?,
            time_date_stamp: r.u32(4)?,
            forwarder_chain: r.u32(8)?,
            name_rva: r.u32(12)?,
            first_thunk: r.u32(16)?,
            function_count: 0,
        })
    }

    pub fn binding(&self) -> Binding {
        Binding::from_timestamp(self.time_date_stamp)
    }

    pub fn has_name_table(&self) -> bool {
        self.original_first_thunk != 0
    }

    pub fn has_address_table(&self) -> bool {
        self.first_thunk != 0
    }

    /// RVA of the table that names the imported functions: the original
    /// thunks when present, the address table otherwise.
    pub fn names_rva(&self) -> Option<u32> {
        if self.has_name_table() {
            Some(self.original_first_thunk)
        } else if self.has_address_table() {
            Some(self.first_thunk)
        } else {
            None
        }
    }

    /// The first chain index is either -1 or a slot of this library.
    pub fn is_valid_forwarder_chain(&self) -> bool {
        self.forwarder_chain == ALL_ONES || self.forwarder_chain < self.function_count
    }

    pub fn has_forwarders(&self) -> bool {
        self.binding() == Binding::OldBind && self.is_valid_forwarder_chain()
    }
}

/// Decoded import directory: the descriptors up to the all-zero sentinel.
#[derive(Debug, Clone)]
pub struct ImportDirectory {
    offset: u64,
    thunk_size: u64,
    descriptors: Vec<ImportDescriptor>,
}

impl ImportDirectory {
    pub const DESCRIPTOR_SIZE: u64 = 20;

    pub const LAYOUT: &'static [FieldSpec] = &[
        FieldSpec::new("OriginalFirstThunk", Dword),
        FieldSpec::new("TimeDateStamp", Dword),
        FieldSpec::new("Forwarder", Dword),
        FieldSpec::noted("NameRVA", Dword, Note::NameRva),
        FieldSpec::new("FirstThunk", Dword),
    ];

    pub(crate) fn load(pe: &PeFile) -> Option<Self> {
        let offset = locate(pe, DirectoryKind::Import, Self::DESCRIPTOR_SIZE)?;
        let thunk_size = pe.bitness().thunk_size();
        let r = pe.reader_at(offset, OffsetKind::Raw)?;

        let mut descriptors = Vec::new();
        let mut at = 0u64;
        loop {
            if r.is_zeroed(at, Self::DESCRIPTOR_SIZE as usize) {
                break;
            }
            let Some(window) = r.slice(at, Self::DESCRIPTOR_SIZE as usize) else {
                warn!(
                    "imports: descriptor array runs past the end of the file after {} entries",
                    descriptors.len()
                );
                break;
            };
            let Some(desc) = ImportDescriptor::parse(&PeReader::new(window), offset + at) else {
                break;
            };
            descriptors.push(desc);
            at += Self::DESCRIPTOR_SIZE;
        }
        count_functions(pe, &mut descriptors, thunk_size);

        debug!("imports: {} librar(ies)", descriptors.len());
        Some(Self {
            offset,
            thunk_size,
            descriptors,
        })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn thunk_size(&self) -> u64 {
        self.thunk_size
    }

    pub fn descriptors(&self) -> &[ImportDescriptor] {
        &self.descriptors
    }

    /// Total byte size of the descriptors, sentinel excluded.
    pub fn descriptors_size(&self) -> u64 {
        self.descriptors.len() as u64 * Self::DESCRIPTOR_SIZE
    }
}

fn read_thunk(pe: &PeFile, rva: u64, thunk_size: u64) -> Option<u64> {
    match thunk_size {
        8 => pe.read_u64(rva, OffsetKind::Virtual),
        _ => pe.read_u32(rva, OffsetKind::Virtual).map(u64::from),
    }
}

/// Raw range the descriptor's name table may occupy: from its translated
/// start to the end of the containing section's raw data.
fn table_window(pe: &PeFile, desc: &ImportDescriptor) -> Option<(u64, u64)> {
    let rva = desc.names_rva()? as u64;
    let Some(section) = pe.sections().section_for_rva(rva) else {
        warn!("imports: thunk table at {:#x} is outside every section", rva);
        return None;
    };
    let start = section.raw_pointer as u64 + (rva - section.virtual_address as u64);
    let end = (section.raw_pointer as u64 + section.raw_size as u64).min(pe.len());
    Some((start, end.max(start)))
}

/// Fill in `function_count` for every descriptor.
///
/// Tables are scanned from the highest start down and each scan stops at a
/// table start already counted, so a table shared or overlapped by several
/// descriptors is read once.
fn count_functions(pe: &PeFile, descriptors: &mut [ImportDescriptor], thunk_size: u64) {
    let mut tables: Vec<(usize, u64, u64)> = descriptors
        .iter()
        .enumerate()
        .filter_map(|(i, d)| table_window(pe, d).map(|(start, end)| (i, start, end)))
        .collect();
    tables.sort_unstable_by(|a, b| b.1.cmp(&a.1));

    let r = PeReader::new(pe.source().bytes());
    let mut terminators: HashMap<u64, u64> = HashMap::new();
    for (i, start, end) in tables {
        let terminator = match terminators.get(&start) {
            Some(&t) => t,
            None => {
                let t = scan_table(&r, start, end, thunk_size, &terminators);
                terminators.insert(start, t);
                t
            }
        };
        let count = u32::try_from((terminator - start) / thunk_size).unwrap_or(u32::MAX);
        trace!(
            "imports: descriptor {} at {:#x}, {} function(s)",
            i,
            descriptors[i].offset,
            count
        );
        descriptors[i].function_count = count;
    }
}

/// Raw offset of the zero entry ending the table at `start`, or of the first
/// entry that does not fit before `end`.
fn scan_table(
    r: &PeReader,
    start: u64,
    end: u64,
    thunk_size: u64,
    known: &HashMap<u64, u64>,
) -> u64 {
    let mut at = start;
    loop {
        if let Some(&t) = known.get(&at)
            && t <= end
        {
            return t;
        }
        if at + thunk_size > end {
            warn!(
                "imports: thunk table at {:#x} is not terminated inside its section",
                start
            );
            return at;
        }
        let value = match thunk_size {
            8 => r.u64(at),
            _ => r.u32(at).map(u64::from),
        };
        match value {
            Some(0) | None => return at,
            Some(_) => at += thunk_size,
        }
    }
}

/// One resolved thunk of a library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thunk {
    pub index: u32,
    /// Address-table slot RVA the loader patches.
    pub call_via: u64,
    /// Raw value of the original (name-table) thunk.
    pub original: Option<u64>,
    /// Raw value of the address-table thunk.
    pub value: Option<u64>,
    pub by_ordinal: bool,
    pub ordinal: Option<u16>,
    pub hint: Option<u16>,
    pub name: Option<String>,
}

/// One step of a forwarder-chain walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainLink {
    /// Slot `from` names the next chain index `to`; `target` is the RVA of
    /// the address-table slot it designates.
    Next { from: u32, to: u32, target: u64 },
    End { at: u32 },
    /// The stored index does not advance inside the table.
    Corrupted { at: u32, value: u32 },
    Unreadable { at: u32 },
}

/// Read-only view over the import directory of a [`PeFile`].
#[derive(Clone, Copy)]
pub struct Imports<'pe> {
    pe: &'pe PeFile,
    dir: &'pe ImportDirectory,
}

impl<'pe> Imports<'pe> {
    pub(crate) fn new(pe: &'pe PeFile, dir: &'pe ImportDirectory) -> Self {
        Self { pe, dir }
    }

    pub fn directory(&self) -> &'pe ImportDirectory {
        self.dir
    }

    /// Field cursor over the descriptor array. [`FieldCursor::skip_entry`]
    /// moves to the next descriptor.
    pub fn fields(&self) -> FieldCursor<'pe> {
        FieldCursor::new(self.pe, ImportDirectory::LAYOUT, self.dir.offset)
    }

    pub fn cursor(&self) -> ImportCursor<'pe> {
        ImportCursor::new(*self)
    }

    pub fn thunk_size(&self) -> u64 {
        self.dir.thunk_size
    }

    pub fn libraries_count(&self) -> usize {
        self.dir.descriptors.len()
    }

    pub fn descriptor(&self, lib: usize) -> Option<&'pe ImportDescriptor> {
        self.dir.descriptors.get(lib)
    }

    pub fn library_name(&self, lib: usize) -> Option<String> {
        let d = self.descriptor(lib)?;
        self.pe.read_cstr(d.name_rva as u64, OffsetKind::Virtual)
    }

    pub fn function_count(&self, lib: usize) -> u32 {
        self.descriptor(lib).map_or(0, |d| d.function_count)
    }

    pub fn binding(&self, lib: usize) -> Option<Binding> {
        self.descriptor(lib).map(ImportDescriptor::binding)
    }

    pub fn is_valid_forwarder_chain(&self, lib: usize) -> bool {
        self.descriptor(lib)
            .is_some_and(ImportDescriptor::is_valid_forwarder_chain)
    }

    pub fn has_forwarders(&self, lib: usize) -> bool {
        self.descriptor(lib)
            .is_some_and(ImportDescriptor::has_forwarders)
    }

    fn ordinal_flag(&self) -> u64 {
        match self.thunk_size() {
            8 => 1 << 63,
            _ => 1 << 31,
        }
    }

    /// Value of the name-table entry `slot` of library `lib`.
    fn name_thunk(&self, d: &ImportDescriptor, slot: u32) -> Option<u64> {
        let table = d.names_rva()? as u64;
        read_thunk(self.pe, table + slot as u64 * self.thunk_size(), self.thunk_size())
    }

    pub fn is_by_ordinal(&self, lib: usize, slot: u32) -> bool {
        self.descriptor(lib)
            .and_then(|d| self.name_thunk(d, slot))
            .is_some_and(|v| v & self.ordinal_flag() != 0)
    }

    pub fn ordinal(&self, lib: usize, slot: u32) -> Option<u16> {
        let v = self.name_thunk(self.descriptor(lib)?, slot)?;
        Some((v & 0xFFFF) as u16)
    }

    fn hint_name_rva(&self, lib: usize, slot: u32) -> Option<u64> {
        let v = self.name_thunk(self.descriptor(lib)?, slot)?;
        if v & self.ordinal_flag() != 0 {
            return None;
        }
        Some(v & 0x7FFF_FFFF)
    }

    pub fn hint(&self, lib: usize, slot: u32) -> Option<u16> {
        let rva = self.hint_name_rva(lib, slot)?;
        self.pe.read_u16(rva, OffsetKind::Virtual)
    }

    pub fn function_name(&self, lib: usize, slot: u32) -> Option<String> {
        let rva = self.hint_name_rva(lib, slot)?;
        self.pe.read_cstr(rva + 2, OffsetKind::Virtual)
    }

    /// RVA of the address-table slot the loader writes for `slot`.
    pub fn call_via(&self, lib: usize, slot: u32) -> Option<u64> {
        let d = self.descriptor(lib)?;
        Some(d.first_thunk as u64 + slot as u64 * self.thunk_size())
    }

    pub fn original_thunk(&self, lib: usize, slot: u32) -> Option<u64> {
        let d = self.descriptor(lib)?;
        if !d.has_name_table() {
            return None;
        }
        let rva = d.original_first_thunk as u64 + slot as u64 * self.thunk_size();
        read_thunk(self.pe, rva, self.thunk_size())
    }

    pub fn thunk_value(&self, lib: usize, slot: u32) -> Option<u64> {
        let rva = self.call_via(lib, slot)?;
        read_thunk(self.pe, rva, self.thunk_size())
    }

    pub fn thunk(&self, lib: usize, slot: u32) -> Option<Thunk> {
        if slot >= self.function_count(lib) {
            return None;
        }
        let by_ordinal = self.is_by_ordinal(lib, slot);
        Some(Thunk {
            index: slot,
            call_via: self.call_via(lib, slot)?,
            original: self.original_thunk(lib, slot),
            value: self.thunk_value(lib, slot),
            by_ordinal,
            ordinal: if by_ordinal { self.ordinal(lib, slot) } else { None },
            hint: self.hint(lib, slot),
            name: self.function_name(lib, slot),
        })
    }

    pub fn thunks(&self, lib: usize) -> impl Iterator<Item = Thunk> + use<'pe> {
        let view = *self;
        (0..self.function_count(lib)).map_while(move |slot| view.thunk(lib, slot))
    }

    /// Next chain index stored in address-table slot `index`.
    fn chain_value(&self, d: &ImportDescriptor, index: u32) -> Option<u32> {
        let rva = d.first_thunk as u64 + index as u64 * self.thunk_size();
        self.pe.read_u32(rva, OffsetKind::Virtual)
    }

    /// Walk the forwarder chain of library `lib` from its first index. The
    /// walk ends at `-1`, at an unreadable slot, or at the first link that
    /// does not move strictly forward inside the table.
    pub fn chain(&self, lib: usize) -> Vec<ChainLink> {
        let Some(d) = self.descriptor(lib) else {
            return Vec::new();
        };
        if !d.has_forwarders() || d.forwarder_chain == ALL_ONES {
            return Vec::new();
        }
        let mut links = Vec::new();
        let mut current = d.forwarder_chain;
        loop {
            let link = match self.chain_value(d, current) {
                None => ChainLink::Unreadable { at: current },
                Some(ALL_ONES) => ChainLink::End { at: current },
                Some(next) if next > current && next < d.function_count => ChainLink::Next {
                    from: current,
                    to: next,
                    target: d.first_thunk as u64 + next as u64 * self.thunk_size(),
                },
                Some(value) => {
                    warn!(
                        "imports: corrupted forwarder chain in library {} at slot {}: {:#x}",
                        lib, current, value
                    );
                    ChainLink::Corrupted { at: current, value }
                }
            };
            links.push(link);
            match link {
                ChainLink::Next { to, .. } => current = to,
                _ => break,
            }
        }
        links
    }
}

/// Navigation state for imports: selected library, thunk slot inside it
/// and current forwarder-chain index.
#[derive(Clone)]
pub struct ImportCursor<'pe> {
    imports: Imports<'pe>,
    library: EntryCursor,
    slot: u32,
    chain_index: u32,
}

impl<'pe> ImportCursor<'pe> {
    fn new(imports: Imports<'pe>) -> Self {
        let chain_index = imports.descriptor(0).map_or(ALL_ONES, |d| d.forwarder_chain);
        Self {
            imports,
            library: EntryCursor::new(imports.libraries_count()),
            slot: 0,
            chain_index,
        }
    }

    fn descriptor(&self) -> Option<&'pe ImportDescriptor> {
        self.imports.descriptor(self.library.current())
    }

    pub fn selected_library(&self) -> usize {
        self.library.current()
    }

    /// Select library `lib`; resets the thunk slot and chain index.
    pub fn select_library(&mut self, lib: usize) -> bool {
        if !self.library.select(lib) {
            return false;
        }
        self.clear();
        true
    }

    pub fn load_next_library(&mut self) {
        self.library.load_next();
        self.clear();
    }

    pub fn is_done(&self) -> bool {
        self.library.is_done()
    }

    /// Back to the first thunk and the library's first chain index.
    pub fn clear(&mut self) {
        self.slot = 0;
        self.chain_index = self.descriptor().map_or(ALL_ONES, |d| d.forwarder_chain);
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn load_next_thunk(&mut self) {
        if self.slot < self.imports.function_count(self.library.current()) {
            self.slot += 1;
        }
    }

    pub fn thunk(&self) -> Option<Thunk> {
        self.imports.thunk(self.library.current(), self.slot)
    }

    pub fn call_via(&self) -> Option<u64> {
        self.imports.call_via(self.library.current(), self.slot)
    }

    pub fn chain_index(&self) -> u32 {
        self.chain_index
    }

    /// The current thunk is the current link of the forwarder chain.
    pub fn is_forwarder(&self) -> bool {
        self.slot == self.chain_index
    }

    fn next_chain_value(&self) -> Option<u32> {
        self.imports.chain_value(self.descriptor()?, self.chain_index)
    }

    pub fn is_end_of_chain(&self) -> bool {
        self.next_chain_value() == Some(ALL_ONES)
    }

    /// The index stored at the current link is `-1` or moves strictly
    /// forward inside the library's table.
    pub fn is_valid_next_chain_index(&self) -> bool {
        let Some(d) = self.descriptor() else {
            return false;
        };
        match self.next_chain_value() {
            Some(ALL_ONES) => true,
            Some(next) => next > self.chain_index && next < d.function_count,
            None => false,
        }
    }

    /// Follow one link. Refuses corrupted links and the end marker.
    pub fn load_next_chain_index(&mut self) -> bool {
        if self.is_end_of_chain() || !self.is_valid_next_chain_index() {
            return false;
        }
        match self.next_chain_value() {
            Some(next) => {
                self.chain_index = next;
                true
            }
            None => false,
        }
    }

    /// RVA of the address-table slot the current link forwards to.
    pub fn forwarder(&self) -> Option<u64> {
        let d = self.descriptor()?;
        let next = self.next_chain_value()?;
        if next == ALL_ONES {
            return None;
        }
        Some(d.first_thunk as u64 + next as u64 * self.imports.thunk_size())
    }
}
