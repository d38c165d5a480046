//! The resource tree
//!
//! Nodes and entries are addressed by offsets relative to the root node, so
//! the tree is only reachable by walking it. [`Resources`] reads nodes on
//! demand; [`ResourceCursor`] holds the caller's position in the walk. Depth
//! is not assumed: descent follows the directory bit of each entry.

use std::collections::HashSet;
use std::ops::Range;

use log::{debug, trace, warn};

use super::{DirectoryKind, locate};
use crate::field::{FieldCursor, FieldSpec, FieldType, Note};
use crate::pe::{OffsetKind, PeFile};
use crate::reader::utf16le_to_string;

use FieldType::{Dword, Word};

const HIGH_BIT: u32 = 0x8000_0000;
const LOW_BITS: u32 = 0x7FFF_FFFF;

/// Name of a well-known numeric resource type. Only meaningful for entries
/// of the root node.
pub fn resource_type_name(id: u16) -> &'static str {
    match id {
        1 => "Cursor",
        2 => "Bitmap",
        3 => "Icon",
        4 => "Menu",
        5 => "Dialog",
        6 => "String Table",
        7 => "Font Directory",
        8 => "Font",
        9 => "Accelerator",
        10 => "RC Data",
        11 => "Message Table",
        12 => "Cursor Group",
        14 => "Icon Group",
        16 => "Version",
        17 => "Dlg Include",
        19 => "Plug & Play",
        20 => "VXD",
        21 => "Animated Cursor",
        22 => "Animated Icon",
        23 => "HTML",
        24 => "Manifest",
        _ => "Unknown",
    }
}

/// Header of one `IMAGE_RESOURCE_DIRECTORY` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceNode {
    pub offset: u64,
    pub characteristics: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub named_entries: u16,
    pub id_entries: u16,
}

impl ResourceNode {
    pub fn entries_count(&self) -> usize {
        self.named_entries as usize + self.id_entries as usize
    }

    fn entry_offset(&self, index: usize) -> u64 {
        self.offset + ResourceDirectory::NODE_SIZE + index as u64 * ResourceDirectory::ENTRY_SIZE
    }
}

/// One 8-byte entry of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceEntry {
    pub offset: u64,
    pub index: usize,
    /// Raw name word: a string offset when the high bit is set, an id
    /// otherwise.
    pub name: u32,
    /// Raw data word: a child node offset when the high bit is set, a data
    /// entry offset otherwise.
    pub data: u32,
}

impl ResourceEntry {
    pub fn is_named(&self) -> bool {
        self.name & HIGH_BIT != 0
    }

    pub fn name_offset(&self) -> u32 {
        self.name & LOW_BITS
    }

    pub fn id(&self) -> u16 {
        (self.name & 0xFFFF) as u16
    }

    pub fn is_directory(&self) -> bool {
        self.data & HIGH_BIT != 0
    }

    pub fn data_offset(&self) -> u32 {
        self.data & LOW_BITS
    }
}

/// Leaf `IMAGE_RESOURCE_DATA_ENTRY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceDataEntry {
    pub offset: u64,
    pub data_rva: u32,
    pub size: u32,
    pub code_page: u32,
    pub reserved: u32,
}

#[derive(Debug, Clone)]
pub struct ResourceDirectory {
    offset: u64,
    root: ResourceNode,
}

impl ResourceDirectory {
    pub const NODE_SIZE: u64 = 16;
    pub const ENTRY_SIZE: u64 = 8;
    pub const DATA_ENTRY_SIZE: u64 = 16;

    pub const NODE_LAYOUT: &'static [FieldSpec] = &[
        FieldSpec::new("Characteristics", Dword),
        FieldSpec::noted("TimeDateStamp", Dword, Note::Timestamp),
        FieldSpec::new("MajorVersion", Word),
        FieldSpec::new("MinorVersion", Word),
        FieldSpec::new("NumberOfNamedEntries", Word),
        FieldSpec::new("NumberOfIdEntries", Word),
    ];

    pub const DATA_ENTRY_LAYOUT: &'static [FieldSpec] = &[
        FieldSpec::new("OffsetToData", Dword),
        FieldSpec::new("Size", Dword),
        FieldSpec::new("CodePage", Dword),
        FieldSpec::new("Reserved", Dword),
    ];

    pub(crate) fn load(pe: &PeFile) -> Option<Self> {
        let offset = locate(pe, DirectoryKind::Resource, Self::NODE_SIZE)?;
        let root = read_node(pe, offset)?;
        debug!(
            "resources: root at {:#x} with {} entr(ies)",
            offset,
            root.entries_count()
        );
        Some(Self { offset, root })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn root(&self) -> &ResourceNode {
        &self.root
    }
}

fn read_node(pe: &PeFile, offset: u64) -> Option<ResourceNode> {
    let r = pe.reader_at(offset, OffsetKind::Raw)?;
    Some(ResourceNode {
        offset,
        characteristics: r.u32(0)?,
        time_date_stamp: r.u32(4)?,
        major_version: r.u16(8)?,
        minor_version: r.u16(10)?,
        named_entries: r.u16(12)?,
        id_entries: r.u16(14)?,
    })
}

/// Read-only view over the resource tree of a [`PeFile`].
#[derive(Clone, Copy)]
pub struct Resources<'pe> {
    pe: &'pe PeFile,
    dir: &'pe ResourceDirectory,
}

impl<'pe> Resources<'pe> {
    pub(crate) fn new(pe: &'pe PeFile, dir: &'pe ResourceDirectory) -> Self {
        Self { pe, dir }
    }

    pub fn directory(&self) -> &'pe ResourceDirectory {
        self.dir
    }

    pub fn root_offset(&self) -> u64 {
        self.dir.offset
    }

    pub fn root(&self) -> ResourceNode {
        self.dir.root
    }

    /// Node header at an absolute raw offset.
    pub fn node(&self, offset: u64) -> Option<ResourceNode> {
        read_node(self.pe, offset)
    }

    /// Field cursor over the node header at `offset`.
    pub fn fields(&self, offset: u64) -> FieldCursor<'pe> {
        FieldCursor::new(self.pe, ResourceDirectory::NODE_LAYOUT, offset)
    }

    pub fn data_entry_fields(&self, offset: u64) -> FieldCursor<'pe> {
        FieldCursor::new(self.pe, ResourceDirectory::DATA_ENTRY_LAYOUT, offset)
    }

    pub fn cursor(&self) -> ResourceCursor<'pe> {
        ResourceCursor::new(*self)
    }

    pub fn entry(&self, node: &ResourceNode, index: usize) -> Option<ResourceEntry> {
        if index >= node.entries_count() {
            return None;
        }
        let offset = node.entry_offset(index);
        let r = self.pe.reader_at(offset, OffsetKind::Raw)?;
        Some(ResourceEntry {
            offset,
            index,
            name: r.u32(0)?,
            data: r.u32(4)?,
        })
    }

    /// Entries of `node` in order, stopping at the first unreadable one.
    pub fn entries(&self, node: ResourceNode) -> impl Iterator<Item = ResourceEntry> + use<'pe> {
        let view = *self;
        (0..node.entries_count()).map_while(move |i| view.entry(&node, i))
    }

    /// Absolute offset of a named entry's length-prefixed string.
    pub fn name_offset(&self, entry: &ResourceEntry) -> u64 {
        self.dir.offset + entry.name_offset() as u64
    }

    /// Absolute offset of the child node or data entry.
    pub fn data_offset(&self, entry: &ResourceEntry) -> u64 {
        self.dir.offset + entry.data_offset() as u64
    }

    /// Transcoded name of a named entry.
    pub fn entry_name(&self, entry: &ResourceEntry) -> Option<String> {
        if !entry.is_named() {
            return None;
        }
        let at = self.name_offset(entry);
        let units = self.pe.read_u16(at, OffsetKind::Raw)? as usize;
        let bytes = self
            .pe
            .content_at(at + 2, OffsetKind::Raw)?
            .get(..units * 2)?;
        Some(utf16le_to_string(bytes))
    }

    pub fn child(&self, entry: &ResourceEntry) -> Option<ResourceNode> {
        if !entry.is_directory() {
            return None;
        }
        self.node(self.data_offset(entry))
    }

    /// Entry count of the node an entry points to, 0 for leaves.
    pub fn child_entries_count(&self, entry: &ResourceEntry) -> usize {
        self.child(entry).map_or(0, |n| n.entries_count())
    }

    pub fn data_entry(&self, offset: u64) -> Option<ResourceDataEntry> {
        let r = self.pe.reader_at(offset, OffsetKind::Raw)?;
        Some(ResourceDataEntry {
            offset,
            data_rva: r.u32(0)?,
            size: r.u32(4)?,
            code_page: r.u32(8)?,
            reserved: r.u32(12)?,
        })
    }

    /// Raw file range of a leaf's payload, when all of it is in the file.
    pub fn payload_range(&self, entry: &ResourceDataEntry) -> Option<Range<u64>> {
        let start = self.pe.rva_to_raw(entry.data_rva as u64)?;
        let end = start + entry.size as u64;
        (end <= self.pe.len()).then_some(start..end)
    }

    pub fn payload(&self, entry: &ResourceDataEntry) -> Option<&'pe [u8]> {
        self.pe
            .content_at(entry.data_rva as u64, OffsetKind::Virtual)?
            .get(..entry.size as usize)
    }

    /// Descend from entry `index` of the node at `node_offset` through
    /// entry 0 of every directory until a leaf, and return the absolute
    /// offset of its data entry. `None` on an unreadable entry or when a
    /// node is reached twice.
    pub fn data_entry_offset(&self, node_offset: u64, index: usize) -> Option<u64> {
        let mut visited = HashSet::new();
        visited.insert(node_offset);
        let mut node = self.node(node_offset)?;
        let mut index = index;
        loop {
            let entry = self.entry(&node, index)?;
            let target = self.data_offset(&entry);
            if !entry.is_directory() {
                return Some(target);
            }
            if !visited.insert(target) {
                warn!("resources: cycle through node {:#x}", target);
                return None;
            }
            trace!("resources: descending into {:#x}", target);
            node = self.node(target)?;
            index = 0;
        }
    }
}

/// Navigation state over the resource tree.
///
/// Tracks a current node, the entry selected in it and the tree level the
/// caller says that node is at. The cursor enforces no traversal order.
#[derive(Clone)]
pub struct ResourceCursor<'pe> {
    view: Resources<'pe>,
    node: ResourceNode,
    entry: usize,
    tree_level: usize,
    selected_data_entry: Option<u64>,
}

impl<'pe> ResourceCursor<'pe> {
    fn new(view: Resources<'pe>) -> Self {
        Self {
            view,
            node: view.root(),
            entry: 0,
            tree_level: 0,
            selected_data_entry: None,
        }
    }

    pub fn current_node(&self) -> &ResourceNode {
        &self.node
    }

    /// Make the node at `offset` current and select its first entry.
    pub fn set_current_node(&mut self, offset: u64) -> bool {
        match self.view.node(offset) {
            Some(node) => {
                self.node = node;
                self.entry = 0;
                true
            }
            None => false,
        }
    }

    pub fn tree_level(&self) -> usize {
        self.tree_level
    }

    pub fn set_tree_level(&mut self, level: usize) {
        self.tree_level = level;
    }

    pub fn load_next_tree_level(&mut self) {
        self.tree_level += 1;
    }

    pub fn clear_tree_level(&mut self) {
        self.tree_level = 0;
    }

    pub fn current_entry(&self) -> usize {
        self.entry
    }

    pub fn set_current_entry(&mut self, index: usize) {
        self.entry = index;
    }

    pub fn load_next_entry(&mut self) {
        if self.entry < self.entries_count() {
            self.entry += 1;
        }
    }

    pub fn clear_entry(&mut self) {
        self.entry = 0;
    }

    pub fn entries_count(&self) -> usize {
        self.node.entries_count()
    }

    pub fn entry(&self) -> Option<ResourceEntry> {
        self.view.entry(&self.node, self.entry)
    }

    pub fn is_directory(&self) -> bool {
        self.entry().is_some_and(|e| e.is_directory())
    }

    pub fn is_named(&self) -> bool {
        self.entry().is_some_and(|e| e.is_named())
    }

    pub fn name(&self) -> Option<String> {
        self.view.entry_name(&self.entry()?)
    }

    pub fn id(&self) -> Option<u16> {
        self.entry().map(|e| e.id())
    }

    /// Resource type of a numeric entry on the top level.
    pub fn type_name(&self) -> Option<&'static str> {
        let entry = self.entry()?;
        if self.tree_level != 0 || entry.is_named() {
            return None;
        }
        Some(resource_type_name(entry.id()))
    }

    pub fn name_value(&self) -> Option<u32> {
        self.entry().map(|e| e.name)
    }

    pub fn name_offset(&self) -> Option<u64> {
        self.entry().map(|e| self.view.name_offset(&e))
    }

    pub fn data_value(&self) -> Option<u32> {
        self.entry().map(|e| e.data)
    }

    pub fn data_offset(&self) -> Option<u64> {
        self.entry().map(|e| self.view.data_offset(&e))
    }

    pub fn child_entries_count(&self) -> usize {
        self.entry().map_or(0, |e| self.view.child_entries_count(&e))
    }

    /// Step into the current entry's child node, one level down.
    pub fn enter(&mut self) -> bool {
        let Some(offset) = self
            .entry()
            .filter(|e| e.is_directory())
            .map(|e| self.view.data_offset(&e))
        else {
            return false;
        };
        if !self.set_current_node(offset) {
            return false;
        }
        self.load_next_tree_level();
        true
    }

    pub fn data_entry_offset(&self) -> Option<u64> {
        self.view.data_entry_offset(self.node.offset, self.entry)
    }

    pub fn set_selected_data_entry_offset(&mut self, offset: u64) {
        self.selected_data_entry = Some(offset);
    }

    pub fn selected_data_entry_offset(&self) -> Option<u64> {
        self.selected_data_entry
    }

    pub fn selected_data_entry(&self) -> Option<ResourceDataEntry> {
        self.view.data_entry(self.selected_data_entry?)
    }
}
