//! Fixed-layout headers: DOS, file, optional and the section table
//!
//! Each header is parsed once into plain values and also carries a static
//! field layout so a [`crate::FieldCursor`] can walk its raw bytes.

mod dos;
mod file;
mod optional;
mod sections;

pub use dos::DosHeader;
pub use file::FileHeader;
pub use optional::OptionalHeader;
pub use sections::{Section, SectionTable};
