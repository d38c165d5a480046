//! Bounded little-endian reads over a byte slice
//!
//! Every read returns `None` instead of touching memory past the end of the
//! slice, so callers can turn truncation into an "unavailable" field.

/// Longest NUL-terminated string we are willing to collect.
const MAX_CSTR: usize = 4096;

#[derive(Clone, Copy)]
pub(crate) struct PeReader<'a> {
    data: &'a [u8],
}

impl<'a> PeReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub(crate) fn slice(&self, off: u64, len: usize) -> Option<&'a [u8]> {
        let start = usize::try_from(off).ok()?;
        let end = start.checked_add(len)?;
        self.data.get(start..end)
    }

    pub(crate) fn u8(&self, off: u64) -> Option<u8> {
        self.slice(off, 1).map(|b| b[0])
    }

    pub(crate) fn u16(&self, off: u64) -> Option<u16> {
        self.slice(off, 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32(&self, off: u64) -> Option<u32> {
        self.slice(off, 4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn u64(&self, off: u64) -> Option<u64> {
        self.slice(off, 8).map(|b| {
            u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
        })
    }

    /// NUL-terminated string starting at `off`. An unterminated string runs to
    /// the end of the data (or `MAX_CSTR`).
    pub(crate) fn cstr(&self, off: u64) -> Option<String> {
        let start = usize::try_from(off).ok()?;
        let rest = self.data.get(start..)?;
        let rest = &rest[..rest.len().min(MAX_CSTR)];
        let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        Some(String::from_utf8_lossy(&rest[..end]).into_owned())
    }

    /// Whether `len` bytes starting at `off` are all zero. Out of range counts
    /// as "not zero" so the caller stops scanning on truncation separately.
    pub(crate) fn is_zeroed(&self, off: u64, len: usize) -> bool {
        self.slice(off, len)
            .is_some_and(|b| b.iter().all(|&x| x == 0))
    }
}

/// Transcode little-endian UTF-16 code units to UTF-8. Unpaired surrogates
/// become U+FFFD.
pub fn utf16le_to_string(bytes: &[u8]) -> String {
    let units = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]));
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}
