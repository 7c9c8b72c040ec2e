use goblin::pe::section_table::{
    IMAGE_SCN_CNT_CODE, IMAGE_SCN_MEM_EXECUTE, IMAGE_SCN_MEM_READ, IMAGE_SCN_MEM_WRITE,
};
use goblin::pe::PE;
use tracing::warn;

use crate::model::{ObjectHeader, Section};

const MACHINE_AMD64: u16 = 0x8664;
const MACHINE_IA64: u16 = 0x0200;
const MACHINE_ARM64: u16 = 0xaa64;

pub fn parse(data: &[u8]) -> Option<ObjectHeader> {
    if !(data.starts_with(b"MZ") || data.starts_with(b"ZM")) {
        return None;
    }
    match PE::parse(data) {
        Ok(pe) => Some(full_header(&pe)),
        Err(e) => {
            warn!(error = %e, "PE parse failed; using identification bytes only");
            Some(coarse(data))
        }
    }
}

/// Instruction mode from the COFF machine field, or 16-bit for plain DOS images.
fn coarse(data: &[u8]) -> ObjectHeader {
    let machine = data
        .get(0x3c..0x40)
        .map(|raw| u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize)
        .filter(|lfanew| data.get(*lfanew..lfanew + 4) == Some(&b"PE\0\0"[..]))
        .and_then(|lfanew| data.get(lfanew + 4..lfanew + 6))
        .map(|raw| u16::from_le_bytes([raw[0], raw[1]]));
    let mode = match machine {
        None => 16,
        Some(MACHINE_AMD64 | MACHINE_IA64 | MACHINE_ARM64) => 64,
        Some(_) => 32,
    };
    ObjectHeader::coarse("PE", mode)
}

fn full_header(pe: &PE<'_>) -> ObjectHeader {
    let mut header = ObjectHeader::coarse("PE", if pe.is_64 { 64 } else { 32 });
    header.known_format = true;
    header.image_base = pe.image_base as u64;
    let base = header.image_base;
    let rebase = |rva: u64| base.checked_add(rva);
    if pe.entry != 0 {
        header.entries.extend(rebase(pe.entry as u64));
    }

    for section in &pe.sections {
        let name = section.name().unwrap_or("").trim_end_matches('\0').to_string();
        let raw = u64::from(section.size_of_raw_data);
        let length = match u64::from(section.virtual_size) {
            0 => raw,
            virt => virt.min(raw),
        };
        let flags = section.characteristics;
        let Some(addr) = rebase(u64::from(section.virtual_address)) else {
            warn!(section = %name, "section address overflows; skipped");
            continue;
        };
        let mut mapped = Section::new(
            addr,
            u64::from(section.pointer_to_raw_data),
            length,
        )
        .executable(flags & (IMAGE_SCN_MEM_EXECUTE | IMAGE_SCN_CNT_CODE) != 0)
        .writable(flags & IMAGE_SCN_MEM_WRITE != 0);
        mapped.read = flags & IMAGE_SCN_MEM_READ != 0;
        header.section_info.insert(name, mapped);
    }

    for import in &pe.imports {
        if let Some(slot) = rebase(import.rva as u64) {
            header.symbol_table.insert(slot, format!("{}!{}", import.dll, import.name));
        }
    }
    for export in pe.exports.iter().filter(|e| e.rva != 0) {
        if let (Some(name), Some(slot)) = (export.name, rebase(export.rva as u64)) {
            header.symbol_table.entry(slot).or_insert_with(|| name.to_string());
        }
    }
    header
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dos_stub_is_sixteen_bit() {
        let h = parse(b"MZ\x90\x00\x03").expect("mz magic");
        assert_eq!(h.insn_mode, 16);
        assert!(!h.known_format);
    }
}
