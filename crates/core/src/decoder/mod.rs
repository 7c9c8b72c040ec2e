//! Instruction decoding.
//!
//! The engine only depends on the [`Decoder`] trait; the capstone-backed
//! implementation is compiled in with the default `capstone-decoder` feature.

use std::sync::Arc;

use crate::error::EngineResult;
use crate::model::Instruction;

#[cfg(feature = "capstone-decoder")]
mod capstone;

#[cfg(feature = "capstone-decoder")]
pub use self::capstone::CapstoneDecoder;

/// Turns raw bytes into normalised instruction records.
///
/// Implementations must be deterministic and must cover every input byte:
/// anything undecodable becomes a one-byte `invalid` record.
pub trait Decoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decode `bytes` mapped at `base_addr`, located at `base_offset` in the file.
    fn decode(
        &self,
        bytes: &[u8],
        base_addr: u64,
        base_offset: u64,
        insn_mode: u8,
    ) -> EngineResult<Vec<Instruction>>;
}

/// The decoder compiled into this build, if any.
pub fn default_decoder() -> Option<Arc<dyn Decoder>> {
    #[cfg(feature = "capstone-decoder")]
    {
        Some(Arc::new(CapstoneDecoder))
    }
    #[cfg(not(feature = "capstone-decoder"))]
    {
        None
    }
}

/// x86 legacy and REX prefixes at the start of an encoding.
pub(crate) fn leading_prefixes(bytes: &[u8], insn_mode: u8) -> Vec<String> {
    let mut prefixes = Vec::new();
    for b in bytes {
        let name = match b {
            0xf0 => "lock",
            0xf2 => "repne",
            0xf3 => "rep",
            0x2e => "cs",
            0x36 => "ss",
            0x3e => "ds",
            0x26 => "es",
            0x64 => "fs",
            0x65 => "gs",
            0x66 => "opsize",
            0x67 => "addrsize",
            0x40..=0x4f if insn_mode == 64 => "rex",
            _ => break,
        };
        prefixes.push(name.to_string());
        if name == "rex" {
            break;
        }
    }
    prefixes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_stop_at_opcode() {
        assert_eq!(leading_prefixes(&[0xf3, 0xa4], 32), vec!["rep"]);
        assert_eq!(leading_prefixes(&[0x66, 0x48, 0x89, 0xc0], 64), vec!["opsize", "rex"]);
        assert!(leading_prefixes(&[0x48, 0x89], 32).is_empty());
    }
}
