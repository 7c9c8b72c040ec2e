//! Executable-format header modules.

use tracing::warn;

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::formats;
use crate::model::{Artifact, FormatInfo, SourceType};
use crate::oid::Oid;
use crate::options::ResolvedOptions;
use crate::registry::{Documentation, Module};

use super::{dependency, file_bytes, source_type};

/// Shared body of the per-format modules: parse when the source type is one
/// of `accepts`, NotApplicable otherwise.
fn format_header(
    api: &Engine,
    module: &'static str,
    oid: &Oid,
    accepts: &[SourceType],
) -> EngineResult<Option<Artifact>> {
    let Some(kind) = source_type(api, oid)? else {
        return Ok(None);
    };
    if !accepts.contains(&kind) {
        return Err(EngineError::not_applicable(module, oid));
    }
    let Some(bytes) = file_bytes(api, oid)? else {
        return Ok(None);
    };
    match formats::parse_header(kind, &bytes) {
        Some(header) => Ok(Some(Artifact::Format(FormatInfo { header }))),
        None => {
            warn!(module, oid = %oid, kind = %kind, "header could not be parsed");
            Err(EngineError::not_applicable(module, oid))
        }
    }
}

pub struct PeModule;

impl Module for PeModule {
    fn name(&self) -> &'static str {
        "pe"
    }

    fn documentation(&self) -> Documentation {
        Documentation::atomic("PE / MZ header: sections, entry points, imports and exports")
    }

    fn process(&self, api: &Engine, oid: &Oid, _opts: &ResolvedOptions) -> EngineResult<Option<Artifact>> {
        format_header(api, self.name(), oid, &[SourceType::Pe, SourceType::Zm])
    }
}

pub struct ElfModule;

impl Module for ElfModule {
    fn name(&self) -> &'static str {
        "elf"
    }

    fn documentation(&self) -> Documentation {
        Documentation::atomic("ELF header: loadable sections, entry point and symbols")
    }

    fn process(&self, api: &Engine, oid: &Oid, _opts: &ResolvedOptions) -> EngineResult<Option<Artifact>> {
        format_header(api, self.name(), oid, &[SourceType::Elf])
    }
}

pub struct MachoModule;

impl Module for MachoModule {
    fn name(&self) -> &'static str {
        "macho"
    }

    fn documentation(&self) -> Documentation {
        Documentation::atomic("Mach-O header, including universal binaries")
    }

    fn process(&self, api: &Engine, oid: &Oid, _opts: &ResolvedOptions) -> EngineResult<Option<Artifact>> {
        format_header(api, self.name(), oid, &[SourceType::MachO, SourceType::OsxUniversal])
    }
}

/// Unified header, dispatched on `src_type` to the matching format module.
pub struct ObjectHeaderModule;

impl Module for ObjectHeaderModule {
    fn name(&self) -> &'static str {
        "object_header"
    }

    fn documentation(&self) -> Documentation {
        Documentation::atomic("Object header of any supported executable format")
    }

    fn process(&self, api: &Engine, oid: &Oid, _opts: &ResolvedOptions) -> EngineResult<Option<Artifact>> {
        let Some(kind) = source_type(api, oid)? else {
            return Ok(None);
        };
        let format_module = match kind {
            SourceType::Pe | SourceType::Zm => "pe",
            SourceType::Elf => "elf",
            SourceType::MachO | SourceType::OsxUniversal => "macho",
            _ => return Err(EngineError::not_applicable(self.name(), oid)),
        };
        Ok(dependency(api, format_module, oid)?
            .as_ref()
            .and_then(Artifact::as_header)
            .cloned()
            .map(Artifact::Header))
    }
}
