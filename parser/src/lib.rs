//! Decoding engine for Windows PE/COFF images.
//!
//! A [`PeFile`] owns the image bytes and decodes the DOS header, NT headers
//! and section table up front. Directory decoders for exports, imports,
//! bound imports, resources and debug records are built for every directory
//! with a locatable virtual address and reached through typed views such as
//! [`PeFile::exports`]. All byte access goes through
//! [`PeFile::content_at`]; reads past the end of the file come back as
//! `None`.
//!
//! ```no_run
//! use pew_parser::{ByteSource, PeFile};
//!
//! let bytes = std::fs::read("kernel32.dll")?;
//! let pe = PeFile::parse(ByteSource::from_bytes("kernel32.dll", bytes))?;
//! if let Some(exports) = pe.exports() {
//!     for slot in exports.iter() {
//!         println!("{} {:?}", slot.ordinal, slot.name);
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod describe;
pub mod directories;
mod error;
pub mod field;
pub mod headers;
mod pe;
mod reader;
mod source;

pub use directories::{DataDirectoryEntry, Directory, DirectoryKind, DirectorySlot, EntryCursor};
pub use error::{PeError, PeResult};
pub use field::{Field, FieldCursor, FieldSpec, FieldType, FieldValue};
pub use pe::{Bitness, OffsetKind, PeFile, PeType, check, classify, is_pe_magic};
pub use reader::utf16le_to_string;
pub use source::ByteSource;
