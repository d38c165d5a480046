//! Human descriptions for closed enumerations and flag words
//!
//! Everything here is a pure lookup over a raw value. Nothing in the decoders
//! depends on these strings.

use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

pub fn machine(machine: u16) -> &'static str {
    match machine {
        0x0001 => "Target Host",
        0x014c => "Intel 386",
        0x0162 | 0x0166 | 0x0168 => "MIPS little-endian",
        0x0169 => "MIPS little-endian WCE v2",
        0x0184 => "Alpha AXP",
        0x01a2 => "SH3 little-endian",
        0x01a3 => "SH3DSP",
        0x01a4 => "SH3E little-endian",
        0x01a6 => "SH4 little-endian",
        0x01a8 => "SH5",
        0x01c0 => "ARM little-endian",
        0x01c2 => "ARM Thumb/Thumb-2 little-endian",
        0x01c4 => "ARM Thumb-2 little-endian",
        0x01d3 => "Matsushita AM33",
        0x01f0 => "IBM PowerPC little-endian",
        0x01f1 => "PowerPC with FPU",
        0x0200 => "Intel Itanium (IA-64)",
        0x0266 | 0x0366 | 0x0466 => "MIPS",
        0x0284 => "Alpha 64",
        0x0520 => "Infineon TriCore",
        0x0cef => "CEF",
        0x0ebc => "EFI Byte Code",
        0x8664 => "AMD64 (K8)",
        0x9041 => "Mitsubishi M32R little-endian",
        0xaa64 => "ARM64 little-endian",
        0xc0ee => "CEE",
        _ => "Unknown",
    }
}

pub fn optional_magic(magic: u16) -> &'static str {
    match magic {
        0x10b => "PE32",
        0x20b => "PE32+ (x64)",
        0x107 => "ROM",
        _ => "Unknown",
    }
}

pub fn subsystem(subsystem: u16) -> &'static str {
    match subsystem {
        0 => "Unknown subsystem",
        1 => "Driver",
        2 => "Windows Graphical (GUI)",
        3 => "Windows Character (Console)",
        5 => "OS/2 (Console)",
        7 => "POSIX (Console)",
        8 => "Native Win9x driver",
        9 => "Windows CE",
        10 => "Extensible Firmware Interface (EFI)",
        11 => "EFI driver with boot services",
        12 => "EFI driver with run-time services",
        13 => "EFI ROM image",
        14 => "Xbox system",
        16 => "Boot application",
        _ => "Unknown",
    }
}

/// Debug record type. Types past the classic five describe as an empty
/// string rather than "Unknown"; existing consumers rely on that.
pub fn debug_type(kind: u32) -> &'static str {
    match kind {
        0 => "Unknown",
        1 => "COFF",
        2 => "Visual C++ (CodeView)",
        3 => "Frame pointer omission (FPO)",
        4 => "DBG file",
        _ => "",
    }
}

// ---------------------------------------------------------------------------
// Flag words
// ---------------------------------------------------------------------------

const FILE_CHARACTERISTICS: &[(u16, &str)] = &[
    (0x0001, "Relocation info stripped from file"),
    (0x0002, "File is executable"),
    (0x0004, "COFF line numbers stripped"),
    (0x0008, "COFF local symbols stripped"),
    (0x0010, "Aggressively trim working set"),
    (0x0020, "Application can handle > 2GB addresses"),
    (0x0080, "LE: LSB precedes MSB (deprecated)"),
    (0x0100, "32-bit word machine"),
    (0x0200, "Debugging info stripped into a .DBG file"),
    (0x0400, "If image is on removable media, copy it to swap and run"),
    (0x0800, "If image is on network media, copy it to swap and run"),
    (0x1000, "System file, not a user program"),
    (0x2000, "File is a DLL"),
    (0x4000, "Run only on a uniprocessor machine"),
    (0x8000, "BE: MSB precedes LSB (deprecated)"),
];

const DLL_CHARACTERISTICS: &[(u16, &str)] = &[
    (0x0020, "Image can handle a high entropy 64-bit address space"),
    (0x0040, "DLL can be relocated at load time"),
    (0x0080, "Code Integrity checks are enforced"),
    (0x0100, "Image is NX compatible"),
    (0x0200, "Isolation aware, but do not isolate the image"),
    (0x0400, "No structured exception (SEH) handling"),
    (0x0800, "Do not bind the image"),
    (0x1000, "Image must execute in an AppContainer"),
    (0x2000, "A WDM driver"),
    (0x4000, "Image supports Control Flow Guard"),
    (0x8000, "Terminal Server aware"),
];

const SECTION_CHARACTERISTICS: &[(u32, &str)] = &[
    (0x0000_0020, "Contains executable code"),
    (0x0000_0040, "Contains initialized data"),
    (0x0000_0080, "Contains uninitialized data"),
    (0x0100_0000, "Contains extended relocations"),
    (0x0200_0000, "Can be discarded as needed"),
    (0x0400_0000, "Cannot be cached"),
    (0x0800_0000, "Not pageable"),
    (0x1000_0000, "Can be shared in memory"),
    (0x2000_0000, "Can be executed as code"),
    (0x4000_0000, "Can be read"),
    (0x8000_0000, "Can be written to"),
];

fn flag_map<T>(value: T, table: &[(T, &'static str)]) -> BTreeMap<T, &'static str>
where
    T: Copy + Ord + std::ops::BitAnd<Output = T> + Default,
{
    table
        .iter()
        .filter(|(bit, _)| value & *bit != T::default())
        .map(|&(bit, text)| (bit, text))
        .collect()
}

/// Set bits of a file-header characteristics word, keyed by bit value.
pub fn file_characteristics(value: u16) -> BTreeMap<u16, &'static str> {
    flag_map(value, FILE_CHARACTERISTICS)
}

pub fn dll_characteristics(value: u16) -> BTreeMap<u16, &'static str> {
    flag_map(value, DLL_CHARACTERISTICS)
}

pub fn section_characteristics(value: u32) -> BTreeMap<u32, &'static str> {
    flag_map(value, SECTION_CHARACTERISTICS)
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

const SECS_PER_DAY: u32 = 86_400;
const MONTH_DAYS: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

fn is_leap(year: u32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

fn year_days(year: u32) -> u32 {
    if is_leap(year) { 366 } else { 365 }
}

/// A COFF `TimeDateStamp` split into UTC calendar fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtcTime {
    pub year: u32,
    /// 1-based
    pub month: u32,
    /// 1-based
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl From<u32> for UtcTime {
    fn from(stamp: u32) -> Self {
        let mut days = stamp / SECS_PER_DAY;
        let secs = stamp % SECS_PER_DAY;

        // A u32 stamp ends in 2106, so stepping a year at a time is short.
        let mut year = 1970;
        while days >= year_days(year) {
            days -= year_days(year);
            year += 1;
        }
        let mut month = 0;
        for (m, &len) in MONTH_DAYS.iter().enumerate() {
            let len = len + u32::from(m == 1 && is_leap(year));
            if days < len {
                month = m as u32;
                break;
            }
            days -= len;
        }

        Self {
            year,
            month: month + 1,
            day: days + 1,
            hour: secs / 3600,
            minute: secs / 60 % 60,
            second: secs % 60,
        }
    }
}

impl fmt::Display for UtcTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02} UTC",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Render a `TimeDateStamp`; zero means the linker left it unset.
pub fn timestamp(stamp: u32) -> String {
    match stamp {
        0 => String::from("(not set)"),
        _ => UtcTime::from(stamp).to_string(),
    }
}
