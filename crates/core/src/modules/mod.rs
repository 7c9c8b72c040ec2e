//! Built-in analysis modules.
//!
//! Each module is a unit struct implementing [`Module`]. Modules read their
//! inputs back through the engine, so every intermediate artifact is cached
//! and shared.

mod disassembly;
mod headers;
mod meta;
mod sources;
mod stats;
mod structure;

use std::sync::Arc;

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::model::{Artifact, Disassembly, Function, ObjectHeader, SourceType};
use crate::oid::Oid;
use crate::options::OptionBag;
use crate::registry::{Module, ModuleRegistry};

pub use disassembly::{DisassemblyModule, NopsModule};
pub use headers::{ElfModule, MachoModule, ObjectHeaderModule, PeModule};
pub use meta::{FileMetaModule, SrcTypeModule};
pub use sources::{CollectionsSource, FilesSource};
pub use stats::{ByteHistogramModule, CollectionSizeModule, EntropyModule, OpcodeHistogramModule};
pub use structure::{
    BasicBlocksHashesModule, BasicBlocksModule, CallGraphModule, ControlFlowGraphModule,
    FunctionExtractModule,
};

/// Registry holding every built-in module.
pub fn default_module_registry() -> EngineResult<ModuleRegistry> {
    let modules: Vec<Arc<dyn Module>> = vec![
        Arc::new(FilesSource),
        Arc::new(CollectionsSource),
        Arc::new(FileMetaModule),
        Arc::new(SrcTypeModule),
        Arc::new(PeModule),
        Arc::new(ElfModule),
        Arc::new(MachoModule),
        Arc::new(ObjectHeaderModule),
        Arc::new(DisassemblyModule),
        Arc::new(NopsModule),
        Arc::new(FunctionExtractModule),
        Arc::new(BasicBlocksModule),
        Arc::new(BasicBlocksHashesModule),
        Arc::new(ControlFlowGraphModule),
        Arc::new(CallGraphModule),
        Arc::new(EntropyModule),
        Arc::new(ByteHistogramModule),
        Arc::new(OpcodeHistogramModule),
        Arc::new(CollectionSizeModule),
    ];

    let mut registry = ModuleRegistry::new();
    for module in modules {
        registry.register(module)?;
    }
    Ok(registry)
}

/// Fetch `module`'s artifact for `oid` with default options.
fn dependency(api: &Engine, module: &str, oid: &Oid) -> EngineResult<Option<Artifact>> {
    api.retrieve(module, oid, &OptionBag::new())
}

/// Raw bytes of an imported file.
fn file_bytes(api: &Engine, oid: &Oid) -> EngineResult<Option<Vec<u8>>> {
    match dependency(api, "files", oid)? {
        Some(Artifact::Bytes(bytes)) => Ok(Some(bytes)),
        Some(other) => Err(mismatch("files", "bytes", &other)),
        None => Ok(None),
    }
}

fn source_type(api: &Engine, oid: &Oid) -> EngineResult<Option<SourceType>> {
    Ok(dependency(api, "src_type", oid)?
        .as_ref()
        .and_then(Artifact::as_text)
        .and_then(SourceType::from_tag))
}

/// Header to lay the file out with: the parsed object header, or the whole
/// file as one 32-bit executable blob.
fn layout_header(api: &Engine, oid: &Oid, size: usize) -> EngineResult<ObjectHeader> {
    Ok(match dependency(api, "object_header", oid)? {
        Some(Artifact::Header(header)) if header.known_format => header,
        Some(Artifact::Header(header)) => ObjectHeader::raw(size as u64, header.insn_mode),
        _ => ObjectHeader::raw(size as u64, 32),
    })
}

/// File bytes plus layout header, `None` when the file is unknown.
fn load_image(api: &Engine, oid: &Oid) -> EngineResult<Option<(Vec<u8>, ObjectHeader)>> {
    let Some(bytes) = file_bytes(api, oid)? else {
        return Ok(None);
    };
    let header = layout_header(api, oid, bytes.len())?;
    Ok(Some((bytes, header)))
}

fn disassembly(api: &Engine, oid: &Oid) -> EngineResult<Option<Disassembly>> {
    match dependency(api, "disassembly", oid)? {
        Some(Artifact::Disassembly(insns)) => Ok(Some(insns)),
        Some(other) => Err(mismatch("disassembly", "disassembly", &other)),
        None => Ok(None),
    }
}

fn functions(api: &Engine, oid: &Oid) -> EngineResult<Option<std::collections::BTreeMap<u64, Function>>> {
    match dependency(api, "function_extract", oid)? {
        Some(Artifact::Functions(funcs)) => Ok(Some(funcs)),
        Some(other) => Err(mismatch("function_extract", "functions", &other)),
        None => Ok(None),
    }
}

fn mismatch(module: &str, wanted: &str, found: &Artifact) -> EngineError {
    EngineError::module(module, format!("expected a {wanted} artifact, found {}", found.kind()))
}

/// Sum histogram artifacts; anything else is a module error.
fn merge_histograms(module: &str, parts: Vec<Artifact>) -> EngineResult<Artifact> {
    let mut total = std::collections::BTreeMap::new();
    for part in parts {
        match part {
            Artifact::Histogram(counts) => {
                for (key, count) in counts {
                    *total.entry(key).or_insert(0u64) += count;
                }
            }
            other => return Err(mismatch(module, "histogram", &other)),
        }
    }
    Ok(Artifact::Histogram(total))
}
