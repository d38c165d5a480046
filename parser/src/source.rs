//! Ownership of the raw image bytes

use std::path::{Path, PathBuf};

use memmap2::Mmap;

enum Storage {
    Owned(Box<[u8]>),
    Mapped(Mmap),
}

/// The immutable byte buffer behind a PE model.
///
/// This is the only owner of file memory. Everything else in the crate holds
/// offsets into it and reads through [`crate::PeFile::content_at`].
pub struct ByteSource {
    path: PathBuf,
    name: String,
    storage: Storage,
}

impl ByteSource {
    /// Wrap an in-memory buffer. `name` is used for display only.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            path: PathBuf::new(),
            name: name.into(),
            storage: Storage::Owned(bytes.into().into_boxed_slice()),
        }
    }

    /// Take ownership of an already established read-only mapping of `path`.
    pub fn from_mmap(path: impl Into<PathBuf>, mmap: Mmap) -> Self {
        let path = path.into();
        let name = file_name_of(&path);
        Self {
            path,
            name,
            storage: Storage::Mapped(mmap),
        }
    }

    /// Take ownership of a buffer that was read from `path`.
    pub fn from_file_bytes(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        let path = path.into();
        let name = file_name_of(&path);
        Self {
            path,
            name,
            storage: Storage::Owned(bytes.into_boxed_slice()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        match &self.storage {
            Storage::Owned(b) => b,
            Storage::Mapped(m) => m,
        }
    }

    pub fn len(&self) -> u64 {
        self.bytes().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self.storage, Storage::Mapped(_))
    }
}

impl std::fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteSource")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("len", &self.len())
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
