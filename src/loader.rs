//! Reading an image from disk into a [`ByteSource`]

use std::fs::File;
use std::path::Path;

use log::debug;
use memmap2::Mmap;
use pew_parser::ByteSource;

use crate::errors::AppResult;

/// Map `path` read-only. Zero-length files can't be mapped on every
/// platform, so they become an empty owned buffer.
pub fn load(path: &Path) -> AppResult<ByteSource> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    if len == 0 {
        debug!("{}: empty file", path.display());
        return Ok(ByteSource::from_file_bytes(path, Vec::new()));
    }
    // SAFETY: the map is read-only and owned by the returned source; the
    // file is not modified by this process while it is mapped.
    let mmap = unsafe { Mmap::map(&file)? };
    debug!("{}: mapped {} bytes", path.display(), mmap.len());
    Ok(ByteSource::from_mmap(path, mmap))
}
