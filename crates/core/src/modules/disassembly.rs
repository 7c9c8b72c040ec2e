use tracing::{debug, warn};

use crate::analysis::nop_runs;
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::model::{Artifact, Disassembly};
use crate::oid::Oid;
use crate::options::{OptionSchema, OptionSpec, OptionType, ResolvedOptions};
use crate::registry::{Documentation, Module};
use crate::value::Value;

use super::{disassembly, file_bytes, layout_header};

fn valid_mode(value: &Value) -> bool {
    matches!(value.as_int(), Some(0 | 16 | 32 | 64))
}

/// Linear-sweep disassembly of every executable section, keyed by file offset.
pub struct DisassemblyModule;

impl Module for DisassemblyModule {
    fn name(&self) -> &'static str {
        "disassembly"
    }

    fn documentation(&self) -> Documentation {
        Documentation::atomic("Instructions of every executable section, keyed by file offset").with_opts(
            OptionSchema::new().with(
                "mode",
                OptionSpec::new(OptionType::Int, "Instruction width override (16/32/64); 0 uses the header")
                    .with_default(0i64)
                    .mangle()
                    .validator(valid_mode),
            ),
        )
    }

    fn process(&self, api: &Engine, oid: &Oid, opts: &ResolvedOptions) -> EngineResult<Option<Artifact>> {
        let Some(decoder) = api.decoder() else {
            warn!(oid = %oid, "no instruction decoder compiled in");
            return Err(EngineError::not_applicable(self.name(), oid));
        };
        let Some(bytes) = file_bytes(api, oid)? else {
            return Ok(None);
        };
        let header = layout_header(api, oid, bytes.len())?;
        let mode = match opts.get_int("mode").unwrap_or(0) {
            0 => header.insn_mode,
            m => m as u8,
        };

        let mut insns = Disassembly::new();
        for (name, section) in header.exec_sections() {
            let start = section.offset as usize;
            let Some(slice) = bytes.get(start..) else {
                debug!(oid = %oid, section = %name, "section starts past end of file");
                continue;
            };
            let slice = &slice[..slice.len().min(section.length as usize)];
            for insn in decoder.decode(slice, section.addr, section.offset, mode)? {
                insns.insert(insn.offset, insn);
            }
        }
        debug!(oid = %oid, mode, count = insns.len(), decoder = decoder.name(), "disassembled");
        Ok(Some(Artifact::Disassembly(insns)))
    }
}

/// Runs of consecutive `nop`s: start offset -> length.
pub struct NopsModule;

impl Module for NopsModule {
    fn name(&self) -> &'static str {
        "nops"
    }

    fn documentation(&self) -> Documentation {
        Documentation::atomic("Runs of consecutive nop instructions, keyed by start offset")
    }

    fn process(&self, api: &Engine, oid: &Oid, _opts: &ResolvedOptions) -> EngineResult<Option<Artifact>> {
        Ok(disassembly(api, oid)?.map(|insns| Artifact::Runs(nop_runs(insns.values()))))
    }
}
