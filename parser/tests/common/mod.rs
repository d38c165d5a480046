//! Synthetic PE images for integration tests.
#![allow(dead_code)]

use pew_parser::{Bitness, ByteSource, DirectoryKind, PeFile};

pub const LFANEW: usize = 0x40;
pub const FILE_HEADER: usize = LFANEW + 4;
pub const OPTIONAL_HEADER: usize = FILE_HEADER + 20;
pub const HEADERS_SIZE: usize = 0x400;

struct SectionDef {
    name: [u8; 8],
    va: u32,
    raw: u32,
    size: u32,
}

/// Builds a PE32 or PE32+ image with arbitrary sections, data-directory
/// entries and bytes placed at RVAs.
pub struct ImageBuilder {
    bitness: Bitness,
    sections: Vec<SectionDef>,
    directories: [(u32, u32); 16],
    writes: Vec<(u32, Vec<u8>)>,
    raw_writes: Vec<(usize, Vec<u8>)>,
    file_len: Option<usize>,
}

impl ImageBuilder {
    pub fn new(bitness: Bitness) -> Self {
        Self {
            bitness,
            sections: Vec::new(),
            directories: [(0, 0); 16],
            writes: Vec::new(),
            raw_writes: Vec::new(),
            file_len: None,
        }
    }

    pub fn pe32() -> Self {
        Self::new(Bitness::Pe32)
    }

    pub fn pe64() -> Self {
        Self::new(Bitness::Pe64)
    }

    pub fn section(mut self, name: &str, va: u32, raw: u32, size: u32) -> Self {
        let mut n = [0u8; 8];
        let len = name.len().min(8);
        n[..len].copy_from_slice(&name.as_bytes()[..len]);
        self.sections.push(SectionDef {
            name: n,
            va,
            raw,
            size,
        });
        self
    }

    pub fn directory(mut self, kind: DirectoryKind, va: u32, size: u32) -> Self {
        self.directories[kind.index()] = (va, size);
        self
    }

    /// Place `bytes` at `rva`; the RVA must fall inside a section.
    pub fn write(mut self, rva: u32, bytes: impl Into<Vec<u8>>) -> Self {
        self.writes.push((rva, bytes.into()));
        self
    }

    pub fn write_u16(self, rva: u32, v: u16) -> Self {
        self.write(rva, v.to_le_bytes())
    }

    pub fn write_u32(self, rva: u32, v: u32) -> Self {
        self.write(rva, v.to_le_bytes())
    }

    pub fn write_u64(self, rva: u32, v: u64) -> Self {
        self.write(rva, v.to_le_bytes())
    }

    /// NUL-terminated string at `rva`.
    pub fn write_str(self, rva: u32, s: &str) -> Self {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        self.write(rva, bytes)
    }

    pub fn write_raw(mut self, offset: usize, bytes: impl Into<Vec<u8>>) -> Self {
        self.raw_writes.push((offset, bytes.into()));
        self
    }

    /// Cut or pad the final image to `len` bytes.
    pub fn file_len(mut self, len: usize) -> Self {
        self.file_len = Some(len);
        self
    }

    pub fn section_headers_offset(&self) -> usize {
        OPTIONAL_HEADER + self.optional_size()
    }

    fn optional_size(&self) -> usize {
        match self.bitness {
            Bitness::Pe32 => 224,
            Bitness::Pe64 => 240,
        }
    }

    fn rva_to_raw(&self, rva: u32) -> usize {
        self.sections
            .iter()
            .find(|s| s.va <= rva && rva < s.va + s.size)
            .map(|s| (s.raw + (rva - s.va)) as usize)
            .unwrap_or_else(|| panic!("rva {rva:#x} is not inside any section"))
    }

    pub fn build(&self) -> Vec<u8> {
        let end = self
            .sections
            .iter()
            .map(|s| (s.raw + s.size) as usize)
            .max()
            .unwrap_or(0)
            .max(HEADERS_SIZE);
        let mut img = vec![0u8; end];

        put(&mut img, 0, b"MZ");
        put(&mut img, 0x3C, &(LFANEW as u32).to_le_bytes());
        put(&mut img, LFANEW, b"PE\0\0");

        let machine: u16 = match self.bitness {
            Bitness::Pe32 => 0x014c,
            Bitness::Pe64 => 0x8664,
        };
        put(&mut img, FILE_HEADER, &machine.to_le_bytes());
        put(&mut img, FILE_HEADER + 2, &(self.sections.len() as u16).to_le_bytes());
        put(&mut img, FILE_HEADER + 4, &0x5F5E_1000u32.to_le_bytes());
        put(&mut img, FILE_HEADER + 16, &(self.optional_size() as u16).to_le_bytes());
        put(&mut img, FILE_HEADER + 18, &0x2102u16.to_le_bytes());

        let o = OPTIONAL_HEADER;
        let (magic, rva_count_at, dirs_at): (u16, usize, usize) = match self.bitness {
            Bitness::Pe32 => (0x10b, 92, 96),
            Bitness::Pe64 => (0x20b, 108, 112),
        };
        put(&mut img, o, &magic.to_le_bytes());
        put(&mut img, o + 16, &0x1000u32.to_le_bytes());
        put(&mut img, o + 32, &0x1000u32.to_le_bytes());
        put(&mut img, o + 36, &0x200u32.to_le_bytes());
        put(&mut img, o + 60, &(HEADERS_SIZE as u32).to_le_bytes());
        put(&mut img, o + 68, &3u16.to_le_bytes());
        match self.bitness {
            Bitness::Pe32 => {
                put(&mut img, o + 24, &0x2000u32.to_le_bytes());
                put(&mut img, o + 28, &0x1000_0000u32.to_le_bytes());
                put(&mut img, o + 72, &0x10_0000u32.to_le_bytes());
            }
            Bitness::Pe64 => {
                put(&mut img, o + 24, &0x1_8000_0000u64.to_le_bytes());
                put(&mut img, o + 72, &0x10_0000u64.to_le_bytes());
            }
        }
        put(&mut img, o + rva_count_at, &16u32.to_le_bytes());
        for (i, (va, size)) in self.directories.iter().enumerate() {
            put(&mut img, o + dirs_at + i * 8, &va.to_le_bytes());
            put(&mut img, o + dirs_at + i * 8 + 4, &size.to_le_bytes());
        }

        let mut sh = self.section_headers_offset();
        for s in &self.sections {
            put(&mut img, sh, &s.name);
            put(&mut img, sh + 8, &s.size.to_le_bytes());
            put(&mut img, sh + 12, &s.va.to_le_bytes());
            put(&mut img, sh + 16, &s.size.to_le_bytes());
            put(&mut img, sh + 20, &s.raw.to_le_bytes());
            put(&mut img, sh + 36, &0x6000_0020u32.to_le_bytes());
            sh += 40;
        }

        for (rva, bytes) in &self.writes {
            let at = self.rva_to_raw(*rva);
            put(&mut img, at, bytes);
        }
        for (at, bytes) in &self.raw_writes {
            put(&mut img, *at, bytes);
        }
        if let Some(len) = self.file_len {
            img.resize(len, 0);
        }
        img
    }

    pub fn parse(&self) -> PeFile {
        PeFile::parse(ByteSource::from_bytes("test.dll", self.build()))
            .expect("synthetic image should parse")
    }
}

fn put(img: &mut Vec<u8>, at: usize, bytes: &[u8]) {
    if img.len() < at + bytes.len() {
        img.resize(at + bytes.len(), 0);
    }
    img[at..at + bytes.len()].copy_from_slice(bytes);
}
