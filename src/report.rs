//! Plain-text rendering of a decoded image
//!
//! Every part is built from the read-only accessors of [`PeFile`]; nothing
//! here reads the image bytes directly.

use std::collections::HashSet;

use pew_parser::describe;
use pew_parser::directories::{
    BoundImports, ChainLink, DebugDirectories, Exports, Imports, ResourceEntry, Resources,
};
use pew_parser::{Bitness, DirectoryKind, FieldCursor, FieldValue, PeFile};

use crate::config::{Part, ReportConfig};

const RULE: &str = "═══════════════════════════════════════════════════════════════";

pub struct Report<'a> {
    pe: &'a PeFile,
    config: &'a ReportConfig,
}

impl<'a> Report<'a> {
    pub fn new(pe: &'a PeFile, config: &'a ReportConfig) -> Self {
        Self { pe, config }
    }

    pub fn render(&self) -> String {
        let mut o = self.format_summary();
        for part in &self.config.parts {
            let text = match part {
                Part::Dos => self.format_dos_header(),
                Part::File => self.format_file_header(),
                Part::Optional => self.format_optional_header(),
                Part::Sections => self.format_sections(),
                Part::Exports => self.format_exports(),
                Part::Imports => self.format_imports(),
                Part::BoundImports => self.format_bound_imports(),
                Part::Resources => self.format_resources(),
                Part::Debug => self.format_debug(),
            };
            o.push_str(&text);
        }
        o
    }

    // -----------------------------------------------------------------------
    // Formatting helpers
    // -----------------------------------------------------------------------

    fn hex(&self, value: u64) -> String {
        if self.config.hex_uppercase {
            format!("0x{:X}", value)
        } else {
            format!("0x{:x}", value)
        }
    }

    /// Zero-padded to `digits`.
    fn hex_w(&self, value: u64, digits: usize) -> String {
        if self.config.hex_uppercase {
            format!("0x{:0w$X}", value, w = digits)
        } else {
            format!("0x{:0w$x}", value, w = digits)
        }
    }

    fn format_value(&self, value: Option<FieldValue<'_>>) -> String {
        match value {
            None => "(unavailable)".to_string(),
            Some(FieldValue::Byte(v)) => self.hex_w(v as u64, 2),
            Some(FieldValue::Word(v)) => self.hex_w(v as u64, 4),
            Some(FieldValue::Dword(v)) => self.hex_w(v as u64, 8),
            Some(FieldValue::Qword(v)) => self.hex_w(v, 16),
            Some(FieldValue::Bytes(b)) => b
                .iter()
                .map(|x| {
                    if self.config.hex_uppercase {
                        format!("{:02X}", x)
                    } else {
                        format!("{:02x}", x)
                    }
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    /// One line per field: raw offset, name, value and description.
    /// Data-directory entries of the optional header are listed separately.
    fn format_fields(&self, o: &mut String, mut cursor: FieldCursor<'_>) {
        while !cursor.is_done() {
            if cursor.data_directory_kind().is_none() {
                let line = format!(
                    "  {}  {:<34} {}",
                    self.hex_w(cursor.offset(), 8),
                    cursor.name(),
                    self.format_value(cursor.value())
                );
                match cursor.description().filter(|d| !d.is_empty()) {
                    Some(d) => o.push_str(&format!("{}  ({})\n", line, d)),
                    None => o.push_str(&format!("{}\n", line)),
                }
            }
            cursor.load_next_field();
        }
    }

    fn format_flags<T: Into<u64>>(
        &self,
        o: &mut String,
        flags: impl IntoIterator<Item = (T, &'static str)>,
    ) {
        for (bit, text) in flags {
            o.push_str(&format!("      {}  {}\n", self.hex_w(bit.into(), 8), text));
        }
    }

    fn limit(max: usize) -> usize {
        if max == 0 { usize::MAX } else { max }
    }

    // -----------------------------------------------------------------------
    // Summary
    // -----------------------------------------------------------------------

    fn format_summary(&self) -> String {
        let pe = self.pe;
        let mut o = String::new();
        o.push_str(&format!("  File:         {}\n", pe.source().name()));
        o.push_str(&format!("  Size:         {} bytes\n", pe.len()));
        o.push_str(&format!(
            "  Format:       {}\n",
            match pe.bitness() {
                Bitness::Pe32 => "PE32 (32-bit)",
                Bitness::Pe64 => "PE32+ (64-bit)",
            }
        ));
        o.push_str(&format!(
            "  Type:         {}\n",
            if pe.file_header().is_dll() { "DLL" } else { "Executable" }
        ));
        o.push_str(&format!(
            "  Machine:      {}\n",
            pe.file_header().machine_description()
        ));
        o.push('\n');
        o
    }

    // -----------------------------------------------------------------------
    // Headers
    // -----------------------------------------------------------------------

    fn format_dos_header(&self) -> String {
        let mut o = String::new();
        banner(&mut o, "DOS HEADER");
        self.format_fields(&mut o, self.pe.dos_header_fields());
        o.push('\n');
        o
    }

    fn format_file_header(&self) -> String {
        let pe = self.pe;
        let mut o = String::new();
        banner(&mut o, "FILE HEADER");
        o.push_str(&format!(
            "  NT headers at {}, file header at {}\n\n",
            self.hex(pe.nt_headers_offset()),
            self.hex(pe.file_header_offset())
        ));
        self.format_fields(&mut o, pe.file_header_fields());
        o.push_str("\n  Characteristics:\n");
        self.format_flags(&mut o, pe.file_header().characteristics_map());
        o.push('\n');
        o
    }

    fn format_optional_header(&self) -> String {
        let pe = self.pe;
        let opt = pe.optional_header();
        let mut o = String::new();
        banner(&mut o, "OPTIONAL HEADER");
        self.format_fields(&mut o, pe.optional_header_fields());

        o.push_str("\n  DLL Characteristics:\n");
        self.format_flags(&mut o, opt.dll_characteristics_map());

        o.push_str("\n  Data Directories:\n");
        for kind in DirectoryKind::ALL {
            let entry = opt.data_directory(kind);
            let decoded = if pe.directory(kind).is_some() { "  *" } else { "" };
            o.push_str(&format!(
                "    {:<32} VA {}  Size {}{}\n",
                kind.name(),
                self.hex_w(entry.virtual_address as u64, 8),
                self.hex_w(entry.size as u64, 8),
                decoded
            ));
        }
        o.push('\n');
        o
    }

    fn format_sections(&self) -> String {
        let pe = self.pe;
        let mut o = String::new();
        banner(&mut o, "SECTION TABLE");
        if pe.sections().is_empty() {
            o.push_str("  (no sections)\n\n");
            return o;
        }
        o.push_str(&format!(
            "  {:<8}  {:<10}  {:<10}  {:<10}  {:<10}  {}\n",
            "Name", "VirtAddr", "VirtSize", "RawPtr", "RawSize", "Flags"
        ));
        for section in pe.sections() {
            o.push_str(&format!(
                "  {:<8}  {}  {}  {}  {}  {}\n",
                section.name(),
                self.hex_w(section.virtual_address as u64, 8),
                self.hex_w(section.virtual_size as u64, 8),
                self.hex_w(section.raw_pointer as u64, 8),
                self.hex_w(section.raw_size as u64, 8),
                self.hex_w(section.characteristics as u64, 8)
            ));
            self.format_flags(&mut o, section.characteristics_map());
        }
        o.push('\n');
        o
    }

    // -----------------------------------------------------------------------
    // Directories
    // -----------------------------------------------------------------------

    fn format_exports(&self) -> String {
        let mut o = String::new();
        banner(&mut o, "EXPORT TABLE");
        match self.pe.exports() {
            Some(exports) => self.format_export_table(&mut o, exports),
            None => o.push_str("  (not present)\n"),
        }
        o.push('\n');
        o
    }

    fn format_export_table(&self, o: &mut String, exports: Exports<'_>) {
        o.push_str(&format!(
            "  Library:      {}\n",
            exports.library_name().unwrap_or_else(|| "(unavailable)".into())
        ));
        o.push_str(&format!("  Base:         {}\n", exports.base()));
        o.push_str(&format!("  Functions:    {}\n", exports.function_count()));
        o.push_str(&format!("  Names:        {}\n\n", exports.names_count()));

        let max = Self::limit(self.config.max_exports);
        for slot in exports.iter().take(max) {
            let what = match (&slot.forwarder, &slot.name) {
                (Some(target), Some(name)) => format!("{} -> {}", name, target),
                (Some(target), None) => format!("(ordinal) -> {}", target),
                (None, Some(name)) => name.clone(),
                (None, None) => "(ordinal)".to_string(),
            };
            o.push_str(&format!(
                "  {:>5}  {}  {}\n",
                slot.ordinal,
                self.hex_w(slot.function_rva as u64, 8),
                what
            ));
        }
        if exports.function_count() as usize > max {
            o.push_str(&format!(
                "  ... {} more\n",
                exports.function_count() as usize - max
            ));
        }
    }

    fn format_imports(&self) -> String {
        let mut o = String::new();
        banner(&mut o, "IMPORT TABLE");
        match self.pe.imports() {
            Some(imports) => self.format_import_table(&mut o, imports),
            None => o.push_str("  (not present)\n\n"),
        }
        o
    }

    fn format_import_table(&self, o: &mut String, imports: Imports<'_>) {
        let max = Self::limit(self.config.max_functions_per_library);
        for lib in 0..imports.libraries_count() {
            let name = imports
                .library_name(lib)
                .unwrap_or_else(|| "(unavailable)".into());
            let count = imports.function_count(lib);
            let binding = imports.binding(lib).map_or("", |b| b.as_str());
            o.push_str(&format!("  {} ({} functions, {})\n", name, count, binding));

            for thunk in imports.thunks(lib).take(max) {
                let what = match (thunk.by_ordinal, thunk.ordinal, &thunk.name) {
                    (true, Some(ord), _) => format!("Ordinal {}", ord),
                    (_, _, Some(name)) => match thunk.hint {
                        Some(hint) => format!("{} (hint {})", name, hint),
                        None => name.clone(),
                    },
                    _ => "(unavailable)".to_string(),
                };
                o.push_str(&format!("    {}  {}\n", self.hex_w(thunk.call_via, 8), what));
            }
            if count as usize > max {
                o.push_str(&format!("    ... {} more\n", count as usize - max));
            }

            if self.config.show_forwarder_chains && imports.has_forwarders(lib) {
                o.push_str("    Forwarder chain:\n");
                for link in imports.chain(lib) {
                    let line = match link {
                        ChainLink::Next { from, to, target } => {
                            format!("{} -> {} ({})", from, to, self.hex_w(target, 8))
                        }
                        ChainLink::End { at } => format!("{} -> end", at),
                        ChainLink::Corrupted { at, value } => {
                            format!("{} -> corrupted ({})", at, self.hex(value as u64))
                        }
                        ChainLink::Unreadable { at } => format!("{} -> unreadable", at),
                    };
                    o.push_str(&format!("      {}\n", line));
                }
            }
            o.push('\n');
        }
    }

    fn format_bound_imports(&self) -> String {
        let mut o = String::new();
        banner(&mut o, "BOUND IMPORTS");
        match self.pe.bound_imports() {
            Some(bound) => self.format_bound_table(&mut o, bound),
            None => o.push_str("  (not present)\n"),
        }
        o.push('\n');
        o
    }

    fn format_bound_table(&self, o: &mut String, bound: BoundImports<'_>) {
        o.push_str(&format!(
            "  {} librar(ies), {} record(s)\n\n",
            bound.descriptors_count(),
            bound.records_count()
        ));
        let mut walker = bound.walker();
        while let Some(record) = walker.record() {
            let name = walker
                .library_name()
                .unwrap_or_else(|| "(unavailable)".into());
            let stamp = describe::timestamp(record.time_date_stamp);
            if walker.is_forwarder_ref() {
                o.push_str(&format!("      -> {}  {}\n", name, stamp));
            } else {
                o.push_str(&format!(
                    "  {}  {}  ({} forwarder refs)\n",
                    name, stamp, record.forwarder_refs
                ));
            }
            walker.load_next_library();
        }
    }

    fn format_resources(&self) -> String {
        let mut o = String::new();
        banner(&mut o, "RESOURCES");
        match self.pe.resources() {
            Some(res) => {
                let mut visited = HashSet::new();
                visited.insert(res.root_offset());
                self.format_resource_node(&mut o, res, res.root_offset(), 0, &mut visited);
            }
            None => o.push_str("  (not present)\n"),
        }
        o.push('\n');
        o
    }

    fn resource_label(res: Resources<'_>, entry: &ResourceEntry, level: usize) -> String {
        if entry.is_named() {
            return res
                .entry_name(entry)
                .map_or_else(|| "(unavailable)".to_string(), |n| format!("\"{}\"", n));
        }
        if level == 0 {
            let name = pew_parser::directories::resource_type_name(entry.id());
            return format!("{} ({})", name, entry.id());
        }
        format!("#{}", entry.id())
    }

    fn format_resource_node(
        &self,
        o: &mut String,
        res: Resources<'_>,
        offset: u64,
        level: usize,
        visited: &mut HashSet<u64>,
    ) {
        let Some(node) = res.node(offset) else {
            return;
        };
        let indent = "  ".repeat(level + 1);
        for entry in res.entries(node) {
            let label = Self::resource_label(res, &entry, level);
            let target = res.data_offset(&entry);
            if entry.is_directory() {
                o.push_str(&format!(
                    "{}{}  [{} entries]\n",
                    indent,
                    label,
                    res.child_entries_count(&entry)
                ));
                if level + 1 >= self.config.resource_depth() {
                    continue;
                }
                if !visited.insert(target) {
                    o.push_str(&format!("{}  (cycle at {})\n", indent, self.hex(target)));
                    continue;
                }
                self.format_resource_node(o, res, target, level + 1, visited);
            } else {
                match res.data_entry(target) {
                    Some(data) => o.push_str(&format!(
                        "{}{}  RVA {}  Size {}  CodePage {}\n",
                        indent,
                        label,
                        self.hex_w(data.data_rva as u64, 8),
                        data.size,
                        data.code_page
                    )),
                    None => o.push_str(&format!("{}{}  (unavailable)\n", indent, label)),
                }
            }
        }
    }

    fn format_debug(&self) -> String {
        let mut o = String::new();
        banner(&mut o, "DEBUG DIRECTORY");
        match self.pe.debug() {
            Some(debug) => self.format_debug_records(&mut o, debug),
            None => o.push_str("  (not present)\n"),
        }
        o.push('\n');
        o
    }

    fn format_debug_records(&self, o: &mut String, debug: DebugDirectories<'_>) {
        for i in 0..debug.count() {
            let Some(record) = debug.record(i) else {
                break;
            };
            let description = match record.type_description() {
                "" => format!("type {}", record.debug_type),
                d => d.to_string(),
            };
            o.push_str(&format!(
                "  [{}] {}  {}  {} bytes at {}\n",
                i,
                description,
                describe::timestamp(record.time_date_stamp),
                record.size_of_data,
                self.hex_w(record.pointer_to_raw_data as u64, 8)
            ));
            if let Some(cv) = debug.codeview(record) {
                match &cv {
                    pew_parser::directories::CodeView::Rsds { guid, age, .. } => {
                        o.push_str(&format!("      RSDS  GUID {}  Age {}\n", guid, age));
                    }
                    pew_parser::directories::CodeView::Nb10 { signature, age, .. } => {
                        o.push_str(&format!(
                            "      NB10  Signature {}  Age {}\n",
                            self.hex_w(*signature as u64, 8),
                            age
                        ));
                    }
                }
                o.push_str(&format!("      PDB   {}\n", cv.path()));
            }
        }
    }
}

fn banner(o: &mut String, title: &str) {
    let pad = RULE.chars().count().saturating_sub(title.len()) / 2;
    o.push_str(RULE);
    o.push('\n');
    o.push_str(&" ".repeat(pad));
    o.push_str(title);
    o.push('\n');
    o.push_str(RULE);
    o.push_str("\n\n");
}
