//! File-type recognition from magic bytes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Source-type tag assigned to every imported file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourceType {
    Pe,
    /// DOS `MZ`/`ZM` executable without a valid PE header.
    Zm,
    Elf,
    MachO,
    OsxUniversal,
    JavaClass,
    Dex,
    Zip,
    Gzip,
    Bz2,
    Pdf,
    Png,
    Gif,
    Jpg,
    Bmp,
    Tiff,
    PostScript,
    Mp4,
    M4a,
    Tar,
    Cab,
    MsOffice,
    Vmem,
    Xml,
    Script,
    Unknown,
}

const MACHO_MAGICS: [[u8; 4]; 4] = [
    [0xfe, 0xed, 0xfa, 0xce],
    [0xce, 0xfa, 0xed, 0xfe],
    [0xfe, 0xed, 0xfa, 0xcf],
    [0xcf, 0xfa, 0xed, 0xfe],
];

/// Simple prefix magics, checked in order after the structural cases.
const PREFIX_MAGICS: &[(&[u8], SourceType)] = &[
    (b"\x7fELF", SourceType::Elf),
    (b"dex\n", SourceType::Dex),
    (b"PK\x03\x04", SourceType::Zip),
    (b"PK\x05\x06", SourceType::Zip),
    (b"\x1f\x8b", SourceType::Gzip),
    (b"BZh", SourceType::Bz2),
    (b"%PDF", SourceType::Pdf),
    (b"\x89PNG\r\n\x1a\n", SourceType::Png),
    (b"GIF87a", SourceType::Gif),
    (b"GIF89a", SourceType::Gif),
    (b"\xff\xd8\xff", SourceType::Jpg),
    (b"II*\x00", SourceType::Tiff),
    (b"MM\x00*", SourceType::Tiff),
    (b"%!PS", SourceType::PostScript),
    (b"MSCF", SourceType::Cab),
    (b"\xd0\xcf\x11\xe0\xa1\xb1\x1a\xe1", SourceType::MsOffice),
    (b"<?xml", SourceType::Xml),
    (b"#!", SourceType::Script),
    (b"BM", SourceType::Bmp),
];

impl SourceType {
    /// Classify `data`. `name` is any name the file was imported under; it is
    /// only consulted for formats without a magic (memory images).
    pub fn detect(data: &[u8], name: Option<&str>) -> Self {
        if data.starts_with(b"MZ") || data.starts_with(b"ZM") {
            return if has_pe_signature(data) { SourceType::Pe } else { SourceType::Zm };
        }
        if data.len() >= 4 && MACHO_MAGICS.iter().any(|m| data.starts_with(m)) {
            return SourceType::MachO;
        }
        if data.starts_with(&[0xca, 0xfe, 0xba, 0xbe]) {
            // Java class files reuse the fat magic; their next word is a version >= 45.
            return match data.get(4..8) {
                Some(word) if u32::from_be_bytes([word[0], word[1], word[2], word[3]]) < 45 => {
                    SourceType::OsxUniversal
                }
                Some(_) => SourceType::JavaClass,
                None => SourceType::OsxUniversal,
            };
        }
        if let Some((_, tag)) = PREFIX_MAGICS.iter().find(|(magic, _)| data.starts_with(magic)) {
            return *tag;
        }
        if data.get(4..8) == Some(&b"ftyp"[..]) {
            return if data.get(8..11) == Some(&b"M4A"[..]) { SourceType::M4a } else { SourceType::Mp4 };
        }
        if data.get(257..262) == Some(&b"ustar"[..]) {
            return SourceType::Tar;
        }
        if name.is_some_and(|n| n.to_ascii_lowercase().ends_with(".vmem")) {
            return SourceType::Vmem;
        }
        SourceType::Unknown
    }

    /// Tag string stored by the `src_type` module.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Pe => "PE",
            SourceType::Zm => "ZM",
            SourceType::Elf => "ELF",
            SourceType::MachO => "MACHO",
            SourceType::OsxUniversal => "OSX Universal Binary",
            SourceType::JavaClass => "JAVA_CLASS",
            SourceType::Dex => "DEX",
            SourceType::Zip => "ZIP",
            SourceType::Gzip => "GZIP",
            SourceType::Bz2 => "BZ2",
            SourceType::Pdf => "PDF",
            SourceType::Png => "PNG",
            SourceType::Gif => "GIF",
            SourceType::Jpg => "JPG",
            SourceType::Bmp => "BMP",
            SourceType::Tiff => "TIFF",
            SourceType::PostScript => "PS",
            SourceType::Mp4 => "MP4",
            SourceType::M4a => "M4A",
            SourceType::Tar => "TAR",
            SourceType::Cab => "CAB",
            SourceType::MsOffice => "MS_OFFICE",
            SourceType::Vmem => "VMEM",
            SourceType::Xml => "XML",
            SourceType::Script => "SCRIPT",
            SourceType::Unknown => "UNKNOWN",
        }
    }

    /// Inverse of [`SourceType::as_str`].
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::all().iter().copied().find(|t| t.as_str() == tag)
    }

    pub fn all() -> &'static [SourceType] {
        use SourceType::*;
        &[
            Pe, Zm, Elf, MachO, OsxUniversal, JavaClass, Dex, Zip, Gzip, Bz2, Pdf, Png, Gif, Jpg,
            Bmp, Tiff, PostScript, Mp4, M4a, Tar, Cab, MsOffice, Vmem, Xml, Script, Unknown,
        ]
    }

    /// Human-readable description of the recognising magic.
    pub fn magic_description(&self) -> &'static str {
        match self {
            SourceType::Pe => "MZ with PE\\0\\0 at e_lfanew",
            SourceType::Zm => "MZ or ZM without a PE header",
            SourceType::Elf => "\\x7fELF",
            SourceType::MachO => "feedface / cefaedfe / feedfacf / cffaedfe",
            SourceType::OsxUniversal => "cafebabe with a small architecture count",
            SourceType::JavaClass => "cafebabe with a class-file version",
            SourceType::Dex => "dex\\n",
            SourceType::Zip => "PK\\x03\\x04 or PK\\x05\\x06",
            SourceType::Gzip => "\\x1f\\x8b",
            SourceType::Bz2 => "BZh",
            SourceType::Pdf => "%PDF",
            SourceType::Png => "\\x89PNG",
            SourceType::Gif => "GIF87a / GIF89a",
            SourceType::Jpg => "\\xff\\xd8\\xff",
            SourceType::Bmp => "BM",
            SourceType::Tiff => "II*\\0 / MM\\0*",
            SourceType::PostScript => "%!PS",
            SourceType::Mp4 => "ftyp at offset 4",
            SourceType::M4a => "ftypM4A at offset 4",
            SourceType::Tar => "ustar at offset 257",
            SourceType::Cab => "MSCF",
            SourceType::MsOffice => "compound file binary header",
            SourceType::Vmem => "name ending in .vmem",
            SourceType::Xml => "<?xml",
            SourceType::Script => "#!",
            SourceType::Unknown => "anything else",
        }
    }

    /// True for formats the header modules can parse.
    pub fn is_executable(&self) -> bool {
        matches!(self, SourceType::Pe | SourceType::Elf | SourceType::MachO | SourceType::OsxUniversal)
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn has_pe_signature(data: &[u8]) -> bool {
    let Some(raw) = data.get(0x3c..0x40) else {
        return false;
    };
    let lfanew = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
    lfanew
        .checked_add(4)
        .and_then(|end| data.get(lfanew..end))
        .is_some_and(|sig| sig == b"PE\0\0")
}
