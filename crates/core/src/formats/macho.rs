use goblin::mach::constants::{S_ATTR_PURE_INSTRUCTIONS, S_ATTR_SOME_INSTRUCTIONS};
use goblin::mach::{Mach, MachO};
use tracing::warn;

use crate::model::{ObjectHeader, Section};

const MAGICS_64: [[u8; 4]; 2] = [[0xfe, 0xed, 0xfa, 0xcf], [0xcf, 0xfa, 0xed, 0xfe]];
const MAGICS_32: [[u8; 4]; 2] = [[0xfe, 0xed, 0xfa, 0xce], [0xce, 0xfa, 0xed, 0xfe]];
const FAT_MAGIC: [u8; 4] = [0xca, 0xfe, 0xba, 0xbe];
const CPU_ARCH_ABI64: u32 = 0x0100_0000;

pub fn parse(data: &[u8]) -> Option<ObjectHeader> {
    let is_64 = MAGICS_64.iter().any(|m| data.starts_with(m));
    let is_32 = MAGICS_32.iter().any(|m| data.starts_with(m));
    let is_fat = data.starts_with(&FAT_MAGIC);
    if !(is_64 || is_32 || is_fat) {
        return None;
    }

    match Mach::parse(data) {
        Ok(Mach::Binary(macho)) => Some(full_header(&macho)),
        Ok(Mach::Fat(fat)) => {
            let wide = fat
                .iter_arches()
                .filter_map(Result::ok)
                .any(|arch| arch.cputype & CPU_ARCH_ABI64 != 0);
            Some(ObjectHeader::coarse("OSX Universal Binary", if wide { 64 } else { 32 }))
        }
        Err(e) => {
            warn!(error = %e, "Mach-O parse failed; using identification bytes only");
            let format = if is_fat { "OSX Universal Binary" } else { "MACHO" };
            Some(ObjectHeader::coarse(format, if is_64 { 64 } else { 32 }))
        }
    }
}

fn full_header(macho: &MachO<'_>) -> ObjectHeader {
    let mut header = ObjectHeader::coarse("MACHO", if macho.is_64 { 64 } else { 32 });
    header.known_format = true;
    header.image_base = macho
        .segments
        .iter()
        .find(|seg| seg.name().map(|n| n == "__TEXT").unwrap_or(false))
        .map(|seg| seg.vmaddr)
        .unwrap_or(0);
    if macho.entry != 0 {
        header.entries.insert(macho.entry);
    }

    for (sec, _) in macho.segments.sections().flatten().filter_map(Result::ok) {
        let segname = sec.segname().unwrap_or("");
        let name = format!("{segname},{}", sec.name().unwrap_or(""));
        let section = Section::new(sec.addr, u64::from(sec.offset), sec.size)
            .executable(sec.flags & (S_ATTR_PURE_INSTRUCTIONS | S_ATTR_SOME_INSTRUCTIONS) != 0)
            .writable(segname == "__DATA");
        header.section_info.insert(name, section);
    }

    if let Ok(imports) = macho.imports() {
        for import in imports {
            header.symbol_table.insert(import.address, format!("{}!{}", import.dylib, import.name));
        }
    }
    header
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_thin_header_uses_magic_width() {
        let h = parse(&[0xcf, 0xfa, 0xed, 0xfe, 0, 0]).expect("mach-o magic");
        assert_eq!(h.insn_mode, 64);
        assert!(!h.known_format);
        assert!(parse(b"\x7fELF").is_none());
    }
}
