//! Unified object header shared by the PE, ELF, and Mach-O parsers.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A mapped section of an object file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Virtual address where the section is mapped.
    pub addr: u64,
    /// File offset of the section's bytes.
    pub offset: u64,
    /// Number of file-backed bytes.
    pub length: u64,
    /// `addr + length`.
    pub end: u64,
    pub exec: bool,
    pub read: bool,
    pub write: bool,
}

impl Section {
    pub fn new(addr: u64, offset: u64, length: u64) -> Self {
        Self {
            addr,
            offset,
            length,
            end: addr.saturating_add(length),
            exec: false,
            read: true,
            write: false,
        }
    }

    pub fn executable(mut self, exec: bool) -> Self {
        self.exec = exec;
        self
    }

    pub fn writable(mut self, write: bool) -> Self {
        self.write = write;
        self
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.addr && addr < self.end
    }
}

/// Header fields common to every executable format the engine understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectHeader {
    /// Instruction width in bits: 16, 32 or 64.
    pub insn_mode: u8,
    /// False when only the identification bytes could be read.
    pub known_format: bool,
    /// Source-type tag of the file the header came from.
    pub format: String,
    pub image_base: u64,
    pub section_info: BTreeMap<String, Section>,
    /// Addresses at which execution begins.
    pub entries: BTreeSet<u64>,
    /// Imported symbols keyed by the address of their slot.
    pub symbol_table: BTreeMap<u64, String>,
}

impl ObjectHeader {
    /// Header carrying only the instruction width (truncated or unparsable files).
    pub fn coarse(format: impl Into<String>, insn_mode: u8) -> Self {
        Self {
            insn_mode,
            known_format: false,
            format: format.into(),
            image_base: 0,
            section_info: BTreeMap::new(),
            entries: BTreeSet::new(),
            symbol_table: BTreeMap::new(),
        }
    }

    /// Treat a whole file as one executable blob mapped at address zero.
    pub fn raw(size: u64, insn_mode: u8) -> Self {
        let mut header = Self::coarse("RAW", insn_mode);
        header.section_info.insert("raw".into(), Section::new(0, 0, size).executable(true));
        header
    }

    /// File offset for an address inside a mapped section.
    pub fn get_offset(&self, rva: u64) -> Option<u64> {
        self.section_info
            .values()
            .filter(|s| s.length > 0)
            .find(|s| s.contains(rva))
            .and_then(|s| s.offset.checked_add(rva - s.addr))
    }

    /// Name of the section containing `addr`.
    pub fn find_section(&self, addr: u64) -> Option<&str> {
        self.section_info.iter().find(|(_, s)| s.contains(addr)).map(|(name, _)| name.as_str())
    }

    pub fn exec_sections(&self) -> impl Iterator<Item = (&String, &Section)> {
        self.section_info.iter().filter(|(_, s)| s.exec && s.length > 0)
    }

    /// Pointer width in bytes for this header's instruction mode.
    pub fn pointer_width(&self) -> usize {
        if self.insn_mode == 64 {
            8
        } else {
            4
        }
    }
}

/// Output of a format-specific module (`pe`, `elf`, `macho`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatInfo {
    pub header: ObjectHeader,
}
