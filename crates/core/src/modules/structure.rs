//! Functions, basic blocks, control-flow graphs and the call graph.

use std::collections::BTreeMap;

use crate::analysis::{basic_blocks, block_hashes, call_graph, control_flow_graph, extract_functions, Image};
use crate::engine::Engine;
use crate::error::EngineResult;
use crate::model::{Artifact, BasicBlock};
use crate::oid::Oid;
use crate::options::ResolvedOptions;
use crate::registry::{Documentation, Module};

use super::{dependency, disassembly, functions, load_image, mismatch};

pub struct FunctionExtractModule;

impl Module for FunctionExtractModule {
    fn name(&self) -> &'static str {
        "function_extract"
    }

    fn documentation(&self) -> Documentation {
        Documentation::atomic("Functions recovered from the disassembly, keyed by start address")
    }

    fn process(&self, api: &Engine, oid: &Oid, _opts: &ResolvedOptions) -> EngineResult<Option<Artifact>> {
        let Some(insns) = disassembly(api, oid)? else {
            return Ok(None);
        };
        let Some((bytes, header)) = load_image(api, oid)? else {
            return Ok(None);
        };
        let image = Image::new(&bytes, &header);
        Ok(Some(Artifact::Functions(extract_functions(insns.values(), &image))))
    }
}

fn blocks_of(api: &Engine, oid: &Oid) -> EngineResult<Option<BTreeMap<u64, Vec<BasicBlock>>>> {
    match dependency(api, "basic_blocks", oid)? {
        Some(Artifact::BasicBlocks(blocks)) => Ok(Some(blocks)),
        Some(other) => Err(mismatch("basic_blocks", "basic_blocks", &other)),
        None => Ok(None),
    }
}

pub struct BasicBlocksModule;

impl Module for BasicBlocksModule {
    fn name(&self) -> &'static str {
        "basic_blocks"
    }

    fn documentation(&self) -> Documentation {
        Documentation::atomic("Basic blocks of every function, keyed by function start")
    }

    fn process(&self, api: &Engine, oid: &Oid, _opts: &ResolvedOptions) -> EngineResult<Option<Artifact>> {
        let Some(funcs) = functions(api, oid)? else {
            return Ok(None);
        };
        let Some((bytes, header)) = load_image(api, oid)? else {
            return Ok(None);
        };
        let image = Image::new(&bytes, &header);
        let blocks = funcs.iter().map(|(start, f)| (*start, basic_blocks(f, &image))).collect();
        Ok(Some(Artifact::BasicBlocks(blocks)))
    }
}

/// Blocks grouped by the hash of their bytes, for finding shared code.
pub struct BasicBlocksHashesModule;

impl Module for BasicBlocksHashesModule {
    fn name(&self) -> &'static str {
        "basic_blocks_hashes"
    }

    fn documentation(&self) -> Documentation {
        Documentation::atomic("SHA-1 of each basic block's bytes -> addresses of blocks with those bytes")
    }

    fn process(&self, api: &Engine, oid: &Oid, _opts: &ResolvedOptions) -> EngineResult<Option<Artifact>> {
        let Some(funcs) = functions(api, oid)? else {
            return Ok(None);
        };
        let Some(blocks) = blocks_of(api, oid)? else {
            return Ok(None);
        };
        Ok(Some(Artifact::BlockHashes(block_hashes(&funcs, &blocks))))
    }
}

pub struct ControlFlowGraphModule;

impl Module for ControlFlowGraphModule {
    fn name(&self) -> &'static str {
        "control_flow_graph"
    }

    fn documentation(&self) -> Documentation {
        Documentation::atomic("Intra-function control-flow graphs over block leaders")
    }

    fn process(&self, api: &Engine, oid: &Oid, _opts: &ResolvedOptions) -> EngineResult<Option<Artifact>> {
        let Some(funcs) = functions(api, oid)? else {
            return Ok(None);
        };
        let Some((bytes, header)) = load_image(api, oid)? else {
            return Ok(None);
        };
        let image = Image::new(&bytes, &header);
        let cfgs = funcs
            .iter()
            .filter_map(|(start, f)| control_flow_graph(f, &image).map(|g| (*start, g)))
            .collect();
        Ok(Some(Artifact::Cfgs(cfgs)))
    }
}

pub struct CallGraphModule;

impl Module for CallGraphModule {
    fn name(&self) -> &'static str {
        "call_graph"
    }

    fn documentation(&self) -> Documentation {
        Documentation::atomic("Calls between recovered functions")
    }

    fn process(&self, api: &Engine, oid: &Oid, _opts: &ResolvedOptions) -> EngineResult<Option<Artifact>> {
        let Some(funcs) = functions(api, oid)? else {
            return Ok(None);
        };
        let Some((bytes, header)) = load_image(api, oid)? else {
            return Ok(None);
        };
        let image = Image::new(&bytes, &header);
        Ok(Some(Artifact::CallGraph(call_graph(&funcs, &image))))
    }
}
