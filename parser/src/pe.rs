//! The PE model: classification, header wiring and the address translator

use log::debug;

use crate::directories::{
    BoundImports, DataDirectories, DataDirectoryEntry, DebugDirectories, Directory,
    DirectoryKind, Exports, Imports, Resources,
};
use crate::error::{PeError, PeResult};
use crate::field::FieldCursor;
use crate::headers::{DosHeader, FileHeader, OptionalHeader, SectionTable};
use crate::reader::PeReader;
use crate::source::ByteSource;

/// DOS `MZ` magic.
pub const MZ_MAGIC: [u8; 2] = [0x4D, 0x5A];

/// `PE\0\0` signature at `e_lfanew`.
pub const PE_SIGNATURE: u32 = 0x0000_4550;

pub const PE32_MAGIC: u16 = 0x10b;
pub const PE64_MAGIC: u16 = 0x20b;

const NT_SIGNATURE_SIZE: u64 = 4;

/// Check if the given bytes start with MZ magic
pub fn is_pe_magic(magic: &[u8]) -> bool {
    magic.len() >= 2 && magic[..2] == MZ_MAGIC
}

/// File validity classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeType {
    NotPe,
    Corrupted,
    Pe32,
    Pe64,
}

/// Layout selector for a model that passed classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bitness {
    Pe32,
    Pe64,
}

impl Bitness {
    /// Size of the NT headers (signature, file header, optional header).
    pub fn nt_headers_size(&self) -> u64 {
        NT_SIGNATURE_SIZE + FileHeader::SIZE + self.optional_header_size()
    }

    pub fn optional_header_size(&self) -> u64 {
        match self {
            Bitness::Pe32 => OptionalHeader::SIZE_32,
            Bitness::Pe64 => OptionalHeader::SIZE_64,
        }
    }

    /// Smallest file that can hold the DOS header, the NT headers and one
    /// section header.
    pub fn min_file_size(&self) -> u64 {
        DosHeader::SIZE + self.nt_headers_size() + SectionTable::ENTRY_SIZE
    }

    /// Import/export thunk width.
    pub fn thunk_size(&self) -> u64 {
        match self {
            Bitness::Pe32 => 4,
            Bitness::Pe64 => 8,
        }
    }
}

impl From<Bitness> for PeType {
    fn from(b: Bitness) -> Self {
        match b {
            Bitness::Pe32 => PeType::Pe32,
            Bitness::Pe64 => PeType::Pe64,
        }
    }
}

/// How an offset handed to [`PeFile::content_at`] is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetKind {
    Raw,
    /// Relative virtual address, translated through the section table.
    Virtual,
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Decide whether `bytes` hold a PE image and of which bitness.
pub fn classify(bytes: &[u8]) -> PeType {
    match check(bytes) {
        Ok(b) => b.into(),
        Err(PeError::NotPe(_)) => PeType::NotPe,
        Err(PeError::Corrupted { .. }) => PeType::Corrupted,
    }
}

/// Same as [`classify`], with the reason attached on failure.
pub fn check(bytes: &[u8]) -> PeResult<Bitness> {
    let len = bytes.len() as u64;
    if !is_pe_magic(bytes) {
        return Err(PeError::NotPe("missing MZ signature"));
    }
    let r = PeReader::new(bytes);

    let corrupted = |required: u64| PeError::Corrupted { len, required };

    let Some(lfanew) = r.u32(DosHeader::LFANEW_OFFSET) else {
        return Err(corrupted(DosHeader::SIZE));
    };
    let nt = lfanew as u64;
    let Some(signature) = r.u32(nt) else {
        return Err(corrupted(nt + NT_SIGNATURE_SIZE));
    };
    if signature != PE_SIGNATURE {
        return Err(PeError::NotPe("missing PE signature"));
    }

    let magic_at = nt + NT_SIGNATURE_SIZE + FileHeader::SIZE;
    let bitness = match r.u16(magic_at) {
        Some(PE32_MAGIC) => Bitness::Pe32,
        Some(PE64_MAGIC) => Bitness::Pe64,
        Some(_) => return Err(corrupted(Bitness::Pe32.min_file_size() + 1)),
        None => return Err(corrupted(magic_at + 2)),
    };

    let min = bitness.min_file_size();
    if len <= min {
        return Err(corrupted(min + 1));
    }
    let headers_end = nt + bitness.nt_headers_size();
    if headers_end > len {
        return Err(corrupted(headers_end));
    }
    Ok(bitness)
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// A decoded PE image.
///
/// Owns the bytes, the headers and the table of directory decoders. Every
/// decoder reads memory through [`PeFile::content_at`].
pub struct PeFile {
    source: ByteSource,
    bitness: Bitness,
    dos: DosHeader,
    file: FileHeader,
    optional: OptionalHeader,
    sections: SectionTable,
    directories: DataDirectories,
}

impl PeFile {
    /// Classify `source` and build the model.
    pub fn parse(source: ByteSource) -> PeResult<Self> {
        let bitness = check(source.bytes())?;
        Self::new(source, bitness)
    }

    /// Build the model for an image already classified as `bitness`.
    pub fn new(source: ByteSource, bitness: Bitness) -> PeResult<Self> {
        let bytes = source.bytes();
        let len = source.len();
        let r = PeReader::new(bytes);

        let corrupted = |required: u64| PeError::Corrupted { len, required };

        let dos = DosHeader::parse(&r).ok_or(corrupted(DosHeader::SIZE))?;
        let nt = dos.nt_headers_offset();
        let headers_end = nt + bitness.nt_headers_size();
        if headers_end > len {
            return Err(corrupted(headers_end));
        }

        let file_offset = nt + NT_SIGNATURE_SIZE;
        let file = FileHeader::parse(&r, file_offset).ok_or(corrupted(headers_end))?;
        let optional_offset = file_offset + FileHeader::SIZE;
        let optional =
            OptionalHeader::parse(&r, optional_offset, bitness).ok_or(corrupted(headers_end))?;
        let sections_offset = optional_offset + file.size_of_optional_header as u64;
        let sections = SectionTable::parse(&r, sections_offset, file.number_of_sections);

        let mut pe = Self {
            source,
            bitness,
            dos,
            file,
            optional,
            sections,
            directories: DataDirectories::default(),
        };
        pe.directories = DataDirectories::load(&pe);

        debug!(
            "{}: {:?}, {} section(s), directories present: {:?}",
            pe.source.name(),
            bitness,
            pe.sections.len(),
            pe.directories.present_kinds()
        );
        Ok(pe)
    }

    pub fn source(&self) -> &ByteSource {
        &self.source
    }

    pub fn len(&self) -> u64 {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    pub fn bitness(&self) -> Bitness {
        self.bitness
    }

    pub fn pe_type(&self) -> PeType {
        self.bitness.into()
    }

    // -- headers ------------------------------------------------------------

    pub fn dos_header(&self) -> &DosHeader {
        &self.dos
    }

    pub fn file_header(&self) -> &FileHeader {
        &self.file
    }

    pub fn optional_header(&self) -> &OptionalHeader {
        &self.optional
    }

    pub fn sections(&self) -> &SectionTable {
        &self.sections
    }

    pub fn nt_headers_offset(&self) -> u64 {
        self.dos.nt_headers_offset()
    }

    pub fn nt_headers_size(&self) -> u64 {
        self.bitness.nt_headers_size()
    }

    pub fn file_header_offset(&self) -> u64 {
        self.nt_headers_offset() + NT_SIGNATURE_SIZE
    }

    pub fn optional_header_offset(&self) -> u64 {
        self.file_header_offset() + FileHeader::SIZE
    }

    pub fn section_headers_offset(&self) -> u64 {
        self.sections.offset()
    }

    pub fn dos_header_fields(&self) -> FieldCursor<'_> {
        FieldCursor::new(self, DosHeader::LAYOUT, 0)
    }

    pub fn file_header_fields(&self) -> FieldCursor<'_> {
        FieldCursor::new(self, FileHeader::LAYOUT, self.file_header_offset())
    }

    /// Cursor over the optional header, ending with the 16 data-directory
    /// entries.
    pub fn optional_header_fields(&self) -> FieldCursor<'_> {
        FieldCursor::new(self, self.optional.layout(), self.optional_header_offset())
    }

    /// Cursor over section header `index`, or `None` past the table.
    pub fn section_fields(&self, index: usize) -> Option<FieldCursor<'_>> {
        let offset = self.sections.get(index)?.header_offset();
        Some(FieldCursor::new(self, SectionTable::LAYOUT, offset))
    }

    // -- translation --------------------------------------------------------

    /// Map a relative virtual address to a raw file offset.
    pub fn rva_to_raw(&self, rva: u64) -> Option<u64> {
        self.sections.rva_to_raw(rva)
    }

    /// View of the file starting at `offset`. This is the single bounds
    /// check every decoder goes through.
    pub fn content_at(&self, offset: u64, kind: OffsetKind) -> Option<&[u8]> {
        let raw = match kind {
            OffsetKind::Raw => offset,
            OffsetKind::Virtual => self.rva_to_raw(offset)?,
        };
        if raw > self.len() {
            return None;
        }
        self.source.bytes().get(usize::try_from(raw).ok()?..)
    }

    pub(crate) fn reader_at(&self, offset: u64, kind: OffsetKind) -> Option<PeReader<'_>> {
        self.content_at(offset, kind).map(PeReader::new)
    }

    pub fn read_u8(&self, offset: u64, kind: OffsetKind) -> Option<u8> {
        self.reader_at(offset, kind)?.u8(0)
    }

    pub fn read_u16(&self, offset: u64, kind: OffsetKind) -> Option<u16> {
        self.reader_at(offset, kind)?.u16(0)
    }

    pub fn read_u32(&self, offset: u64, kind: OffsetKind) -> Option<u32> {
        self.reader_at(offset, kind)?.u32(0)
    }

    pub fn read_u64(&self, offset: u64, kind: OffsetKind) -> Option<u64> {
        self.reader_at(offset, kind)?.u64(0)
    }

    pub fn read_cstr(&self, offset: u64, kind: OffsetKind) -> Option<String> {
        self.reader_at(offset, kind)?.cstr(0)
    }

    /// Element `index` of a table of `width`-byte values whose first element
    /// is at `rva`. The table base is translated once; elements follow it in
    /// the file.
    pub(crate) fn table_entry(&self, rva: u64, index: u64, width: u64) -> Option<u64> {
        let r = self.reader_at(rva, OffsetKind::Virtual)?;
        let at = index.checked_mul(width)?;
        match width {
            2 => r.u16(at).map(u64::from),
            4 => r.u32(at).map(u64::from),
            8 => r.u64(at),
            _ => None,
        }
    }

    // -- data directories ---------------------------------------------------

    /// The `(virtual address, size)` pair of a data-directory slot.
    pub fn data_directory(&self, kind: DirectoryKind) -> DataDirectoryEntry {
        self.optional.data_directory(kind)
    }

    /// Decoder for a data-directory slot, `None` when the directory is absent.
    pub fn directory(&self, kind: DirectoryKind) -> Option<&Directory> {
        self.directories.get(kind)
    }

    pub fn exports(&self) -> Option<Exports<'_>> {
        match self.directory(DirectoryKind::Export)? {
            Directory::Export(dir) => Some(Exports::new(self, dir)),
            _ => None,
        }
    }

    pub fn imports(&self) -> Option<Imports<'_>> {
        match self.directory(DirectoryKind::Import)? {
            Directory::Import(dir) => Some(Imports::new(self, dir)),
            _ => None,
        }
    }

    pub fn bound_imports(&self) -> Option<BoundImports<'_>> {
        match self.directory(DirectoryKind::BoundImport)? {
            Directory::BoundImport(dir) => Some(BoundImports::new(self, dir)),
            _ => None,
        }
    }

    pub fn resources(&self) -> Option<Resources<'_>> {
        match self.directory(DirectoryKind::Resource)? {
            Directory::Resource(dir) => Some(Resources::new(self, dir)),
            _ => None,
        }
    }

    pub fn debug(&self) -> Option<DebugDirectories<'_>> {
        match self.directory(DirectoryKind::Debug)? {
            Directory::Debug(dir) => Some(DebugDirectories::new(self, dir)),
            _ => None,
        }
    }
}

impl std::fmt::Debug for PeFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeFile")
            .field("source", &self.source)
            .field("bitness", &self.bitness)
            .field("sections", &self.sections.len())
            .finish()
    }
}
