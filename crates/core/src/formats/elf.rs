use goblin::elf::program_header::{PF_W, PF_X, PT_LOAD};
use goblin::elf::section_header::{SHF_ALLOC, SHF_EXECINSTR, SHF_WRITE, SHT_NOBITS};
use goblin::elf::Elf;
use tracing::warn;

use crate::model::{ObjectHeader, Section};

const MAGIC: &[u8] = b"\x7fELF";
const ELFCLASS64: u8 = 2;

pub fn parse(data: &[u8]) -> Option<ObjectHeader> {
    if !data.starts_with(MAGIC) {
        return None;
    }
    match Elf::parse(data) {
        Ok(elf) => Some(full_header(&elf)),
        Err(e) => {
            warn!(error = %e, "ELF parse failed; using identification bytes only");
            Some(coarse(data))
        }
    }
}

fn coarse(data: &[u8]) -> ObjectHeader {
    let mode = if data.get(4) == Some(&ELFCLASS64) { 64 } else { 32 };
    ObjectHeader::coarse("ELF", mode)
}

fn full_header(elf: &Elf<'_>) -> ObjectHeader {
    let mut header = ObjectHeader::coarse("ELF", if elf.is_64 { 64 } else { 32 });
    header.known_format = true;
    header.image_base = elf
        .program_headers
        .iter()
        .filter(|ph| ph.p_type == PT_LOAD)
        .map(|ph| ph.p_vaddr)
        .min()
        .unwrap_or(0);
    if elf.header.e_entry != 0 {
        header.entries.insert(elf.header.e_entry);
    }

    for sh in &elf.section_headers {
        if sh.sh_flags & u64::from(SHF_ALLOC) == 0 || sh.sh_type == SHT_NOBITS {
            continue;
        }
        let name = elf.shdr_strtab.get_at(sh.sh_name).unwrap_or("");
        if name.is_empty() {
            continue;
        }
        let section = Section::new(sh.sh_addr, sh.sh_offset, sh.sh_size)
            .executable(sh.sh_flags & u64::from(SHF_EXECINSTR) != 0)
            .writable(sh.sh_flags & u64::from(SHF_WRITE) != 0);
        header.section_info.insert(name.to_string(), section);
    }

    // Stripped section tables: fall back to loadable segments.
    if header.section_info.is_empty() {
        for (idx, ph) in elf.program_headers.iter().enumerate().filter(|(_, ph)| ph.p_type == PT_LOAD) {
            let section = Section::new(ph.p_vaddr, ph.p_offset, ph.p_filesz)
                .executable(ph.p_flags & PF_X != 0)
                .writable(ph.p_flags & PF_W != 0);
            header.section_info.insert(format!("segment{idx}"), section);
        }
    }

    for rel in elf.pltrelocs.iter() {
        let name = elf
            .dynsyms
            .get(rel.r_sym)
            .and_then(|sym| elf.dynstrtab.get_at(sym.st_name))
            .unwrap_or("");
        if !name.is_empty() {
            header.symbol_table.insert(rel.r_offset, name.to_string());
        }
    }
    for sym in elf.syms.iter().filter(|s| s.is_function() && s.st_value != 0) {
        if let Some(name) = elf.strtab.get_at(sym.st_name).filter(|n| !n.is_empty()) {
            header.symbol_table.entry(sym.st_value).or_insert_with(|| name.to_string());
        }
    }
    header
}
