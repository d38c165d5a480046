//! Sequential field cursors over fixed-layout records
//!
//! Every header and directory record is described by a static table of
//! [`FieldSpec`]s. A [`FieldCursor`] walks such a table: its offset is always
//! the record base plus the widths of the fields already visited.

use crate::describe;
use crate::directories::DirectoryKind;
use crate::pe::{OffsetKind, PeFile};

/// Width class of a raw field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Byte,
    Word,
    Dword,
    Qword,
    /// Opaque run of bytes (reserved arrays, section names).
    Bytes(usize),
}

impl FieldType {
    pub fn width(&self) -> usize {
        match self {
            FieldType::Byte => 1,
            FieldType::Word => 2,
            FieldType::Dword => 4,
            FieldType::Qword => 8,
            FieldType::Bytes(n) => *n,
        }
    }
}

/// A raw field value, typed by its width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'pe> {
    Byte(u8),
    Word(u16),
    Dword(u32),
    Qword(u64),
    Bytes(&'pe [u8]),
}

impl FieldValue<'_> {
    /// Numeric view of the value; `None` for byte runs.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            FieldValue::Byte(v) => Some(v as u64),
            FieldValue::Word(v) => Some(v as u64),
            FieldValue::Dword(v) => Some(v as u64),
            FieldValue::Qword(v) => Some(v),
            FieldValue::Bytes(_) => None,
        }
    }
}

/// How a field can be described beyond its raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Note {
    None,
    Machine,
    OptionalMagic,
    Subsystem,
    Timestamp,
    /// RVA of a NUL-terminated library name.
    NameRva,
    DebugType,
    /// One entry of the optional header's data-directory array.
    DataDirectory(DirectoryKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
    pub note: Note,
}

impl FieldSpec {
    pub const fn new(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            note: Note::None,
        }
    }

    pub const fn noted(name: &'static str, ty: FieldType, note: Note) -> Self {
        Self { name, ty, note }
    }
}

/// Total byte size of a record layout.
pub fn layout_size(layout: &[FieldSpec]) -> u64 {
    layout.iter().map(|f| f.ty.width() as u64).sum()
}

/// Snapshot of the field under a cursor.
#[derive(Debug, Clone)]
pub struct Field<'pe> {
    pub index: usize,
    pub offset: u64,
    pub name: &'static str,
    pub ty: FieldType,
    pub value: Option<FieldValue<'pe>>,
    pub description: Option<String>,
}

/// Navigation state over one record layout.
///
/// The cursor borrows the model immutably; each logical iteration owns its own
/// cursor, so independent readers never share this state.
#[derive(Clone)]
pub struct FieldCursor<'pe> {
    pe: &'pe PeFile,
    layout: &'pe [FieldSpec],
    base: u64,
    offset: u64,
    index: usize,
}

impl<'pe> FieldCursor<'pe> {
    pub(crate) fn new(pe: &'pe PeFile, layout: &'pe [FieldSpec], base: u64) -> Self {
        Self {
            pe,
            layout,
            base,
            offset: base,
            index: 0,
        }
    }

    fn spec(&self) -> Option<&'pe FieldSpec> {
        self.layout.get(self.index)
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn fields_count(&self) -> usize {
        self.layout.len()
    }

    pub fn record_size(&self) -> u64 {
        layout_size(self.layout)
    }

    pub fn is_done(&self) -> bool {
        self.index >= self.layout.len()
    }

    pub fn name(&self) -> &'static str {
        self.spec().map_or("Unknown", |s| s.name)
    }

    pub fn field_type(&self) -> Option<FieldType> {
        self.spec().map(|s| s.ty)
    }

    pub fn width(&self) -> usize {
        self.spec().map_or(0, |s| s.ty.width())
    }

    /// Raw value of the current field, `None` past the end of the layout or
    /// of the file.
    pub fn value(&self) -> Option<FieldValue<'pe>> {
        let spec = self.spec()?;
        let pe = self.pe;
        let at = self.offset;
        let kind = OffsetKind::Raw;
        match spec.ty {
            FieldType::Byte => pe.read_u8(at, kind).map(FieldValue::Byte),
            FieldType::Word => pe.read_u16(at, kind).map(FieldValue::Word),
            FieldType::Dword => pe.read_u32(at, kind).map(FieldValue::Dword),
            FieldType::Qword => pe.read_u64(at, kind).map(FieldValue::Qword),
            FieldType::Bytes(n) => pe.content_at(at, kind)?.get(..n).map(FieldValue::Bytes),
        }
    }

    pub fn is_described(&self) -> bool {
        self.spec().is_some_and(|s| !matches!(s.note, Note::None | Note::DataDirectory(_)))
    }

    pub fn description(&self) -> Option<String> {
        let note = self.spec()?.note;
        let raw = self.value()?.as_u64()?;
        match note {
            Note::None | Note::DataDirectory(_) => None,
            Note::Machine => Some(describe::machine(raw as u16).to_string()),
            Note::OptionalMagic => Some(describe::optional_magic(raw as u16).to_string()),
            Note::Subsystem => Some(describe::subsystem(raw as u16).to_string()),
            Note::Timestamp => Some(describe::timestamp(raw as u32)),
            Note::NameRva => self.pe.read_cstr(raw, OffsetKind::Virtual),
            Note::DebugType => Some(describe::debug_type(raw as u32).to_string()),
        }
    }

    /// Directory kind of the current field when walking the data-directory
    /// array of the optional header.
    pub fn data_directory_kind(&self) -> Option<DirectoryKind> {
        match self.spec()?.note {
            Note::DataDirectory(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn field(&self) -> Option<Field<'pe>> {
        let spec = self.spec()?;
        Some(Field {
            index: self.index,
            offset: self.offset,
            name: spec.name,
            ty: spec.ty,
            value: self.value(),
            description: self.description(),
        })
    }

    /// Step to the next field. A no-op once the layout is exhausted.
    pub fn load_next_field(&mut self) {
        if let Some(spec) = self.spec() {
            self.offset += spec.ty.width() as u64;
            self.index += 1;
        }
    }

    pub fn reset(&mut self) {
        self.offset = self.base;
        self.index = 0;
    }

    /// Move to another record with the same layout and reset.
    pub fn rebase(&mut self, base: u64) {
        self.base = base;
        self.reset();
    }

    /// Jump to the next record in one step, wherever the cursor currently is
    /// inside this one.
    pub fn skip_entry(&mut self) {
        let next = self.base + self.record_size();
        self.rebase(next);
    }
}

impl<'pe> Iterator for FieldCursor<'pe> {
    type Item = Field<'pe>;

    fn next(&mut self) -> Option<Self::Item> {
        let field = self.field()?;
        self.load_next_field();
        Some(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT: &[FieldSpec] = &[
        FieldSpec::new("A", FieldType::Word),
        FieldSpec::new("B", FieldType::Dword),
        FieldSpec::new("C", FieldType::Bytes(3)),
        FieldSpec::new("D", FieldType::Qword),
    ];

    #[test]
    fn test_widths() {
        assert_eq!(FieldType::Byte.width(), 1);
        assert_eq!(FieldType::Word.width(), 2);
        assert_eq!(FieldType::Dword.width(), 4);
        assert_eq!(FieldType::Qword.width(), 8);
        assert_eq!(FieldType::Bytes(20).width(), 20);
        assert_eq!(layout_size(LAYOUT), 17);
    }

    #[test]
    fn test_value_as_u64() {
        assert_eq!(FieldValue::Word(0x5A4D).as_u64(), Some(0x5A4D));
        assert_eq!(FieldValue::Bytes(&[1, 2]).as_u64(), None);
    }
}
