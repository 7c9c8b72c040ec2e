//! Statistical modules, including the map/reduce histograms.

use std::collections::{BTreeMap, BTreeSet};

use crate::analysis::{byte_counts, opcode_counts, shannon_entropy};
use crate::engine::Engine;
use crate::error::EngineResult;
use crate::model::Artifact;
use crate::oid::Oid;
use crate::options::{OptionSchema, OptionSpec, OptionType, ResolvedOptions};
use crate::registry::{Documentation, ModuleKind, Module};

use super::{disassembly, file_bytes, merge_histograms};

pub struct EntropyModule;

impl Module for EntropyModule {
    fn name(&self) -> &'static str {
        "entropy"
    }

    fn documentation(&self) -> Documentation {
        Documentation::atomic("Shannon entropy of the file in bits per byte")
    }

    fn process(&self, api: &Engine, oid: &Oid, _opts: &ResolvedOptions) -> EngineResult<Option<Artifact>> {
        Ok(file_bytes(api, oid)?.map(|bytes| Artifact::Float(shannon_entropy(&bytes))))
    }
}

/// Byte-value frequencies across a set of files.
pub struct ByteHistogramModule;

impl Module for ByteHistogramModule {
    fn name(&self) -> &'static str {
        "byte_histogram"
    }

    fn documentation(&self) -> Documentation {
        Documentation::new("Occurrences of each byte value (hex) across all files", ModuleKind::MapReduce)
    }

    fn mapper(
        &self,
        api: &Engine,
        oid: &Oid,
        _opts: &ResolvedOptions,
        _job_id: &Oid,
    ) -> EngineResult<Option<Artifact>> {
        let Some(bytes) = file_bytes(api, oid)? else {
            return Ok(None);
        };
        let counts: BTreeMap<String, u64> = byte_counts(&bytes)
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .map(|(byte, count)| (format!("{byte:02x}"), *count))
            .collect();
        Ok(Some(Artifact::Histogram(counts)))
    }

    fn reducer(
        &self,
        _api: &Engine,
        intermediate: Vec<Artifact>,
        _opts: &ResolvedOptions,
        _job_id: &Oid,
    ) -> EngineResult<Option<Artifact>> {
        merge_histograms(self.name(), intermediate).map(Some)
    }
}

/// Mnemonic frequencies across a set of files.
pub struct OpcodeHistogramModule;

impl Module for OpcodeHistogramModule {
    fn name(&self) -> &'static str {
        "opcode_histogram"
    }

    fn documentation(&self) -> Documentation {
        Documentation::new("Occurrences of each instruction mnemonic across all files", ModuleKind::MapReduce)
            .with_opts(OptionSchema::new().with(
                "normalized",
                OptionSpec::new(OptionType::Bool, "Count normalised mnemonics (jcc, retn) instead of raw ones")
                    .with_default(true)
                    .mangle(),
            ))
    }

    fn mapper(
        &self,
        api: &Engine,
        oid: &Oid,
        opts: &ResolvedOptions,
        _job_id: &Oid,
    ) -> EngineResult<Option<Artifact>> {
        let normalized = opts.get_bool("normalized").unwrap_or(true);
        Ok(disassembly(api, oid)?.map(|insns| Artifact::Histogram(opcode_counts(insns.values(), normalized))))
    }

    fn reducer(
        &self,
        _api: &Engine,
        intermediate: Vec<Artifact>,
        _opts: &ResolvedOptions,
        _job_id: &Oid,
    ) -> EngineResult<Option<Artifact>> {
        merge_histograms(self.name(), intermediate).map(Some)
    }
}

/// Number of distinct files in a set of OIDs.
pub struct CollectionSizeModule;

impl Module for CollectionSizeModule {
    fn name(&self) -> &'static str {
        "collection_size"
    }

    fn documentation(&self) -> Documentation {
        Documentation::new("Number of distinct files after expanding collections", ModuleKind::Set)
    }

    fn results(&self, api: &Engine, oids: &[Oid], _opts: &ResolvedOptions) -> EngineResult<Option<Artifact>> {
        let files: BTreeSet<Oid> = api.expand_oids(oids)?.into_iter().collect();
        Ok(Some(Artifact::Count(files.len() as u64)))
    }
}
