//! Object-header extraction for PE, ELF, and Mach-O via `goblin`.
//!
//! Every parser returns `None` only when the identification bytes do not
//! match. When the full parse fails a coarse header is returned instead
//! (`known_format = false`, instruction mode read from the identification
//! bytes) so truncated files still report an instruction width.

pub mod elf;
pub mod macho;
pub mod pe;

use crate::model::{ObjectHeader, SourceType};

/// Parse `data` as the executable format named by `kind`.
pub fn parse_header(kind: SourceType, data: &[u8]) -> Option<ObjectHeader> {
    match kind {
        SourceType::Pe | SourceType::Zm => pe::parse(data),
        SourceType::Elf => elf::parse(data),
        SourceType::MachO | SourceType::OsxUniversal => macho::parse(data),
        _ => None,
    }
}
