//! Wire messages. Every frame is the canonical encoding of one value and
//! carries the codec schema version.

use std::collections::BTreeMap;
use std::io;

use serde::{Deserialize, Serialize};
use tokio_util::codec::{LengthDelimitedCodec, LengthDelimitedCodecError};

use crate::codec::{self, CODEC_SCHEMA_VERSION};
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::model::Artifact;
use crate::oid::Oid;
use crate::options::OptionBag;
use crate::registry::DocSummary;

/// Frame cap used when the configuration does not override it.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 1 << 30;

/// Length-prefixed framing that accepts frames up to `max_frame_length` bytes.
pub fn frame_codec(max_frame_length: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder().max_frame_length(max_frame_length).new_codec()
}

/// True when the codec rejected a frame for exceeding its length cap.
pub(crate) fn is_oversize_frame(err: &io::Error) -> bool {
    err.get_ref().is_some_and(|inner| inner.is::<LengthDelimitedCodecError>())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub schema: u32,
    pub method: RpcMethod,
}

impl RpcRequest {
    pub fn new(method: RpcMethod) -> Self {
        Self { schema: CODEC_SCHEMA_VERSION, method }
    }

    pub fn encode(&self) -> EngineResult<Vec<u8>> {
        codec::encode(self)
    }

    pub fn decode(bytes: &[u8]) -> EngineResult<Self> {
        let request: Self = codec::decode(bytes)?;
        check_schema(request.schema)?;
        Ok(request)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcMethod {
    Alive,
    ListModules,
    Exists { module: String, oid: Oid, opts: OptionBag },
    Retrieve { module: String, oid: Oid, opts: OptionBag },
    Store { module: String, oid: Oid, opts: OptionBag, artifact: Artifact },
    Process { module: String, oids: Vec<Oid>, opts: OptionBag, force: bool },
    DistRetrieve { module: String, oids: Vec<Oid>, opts: OptionBag },
    DistProcess { module: String, oids: Vec<Oid>, opts: OptionBag, force: bool },
    /// Run the mappers of `module` over one partition of a job.
    DistMap { module: String, oids: Vec<Oid>, opts: OptionBag, job_id: Oid, force: bool },
}

impl RpcMethod {
    pub fn name(&self) -> &'static str {
        match self {
            RpcMethod::Alive => "alive",
            RpcMethod::ListModules => "list_modules",
            RpcMethod::Exists { .. } => "exists",
            RpcMethod::Retrieve { .. } => "retrieve",
            RpcMethod::Store { .. } => "store",
            RpcMethod::Process { .. } => "process",
            RpcMethod::DistRetrieve { .. } => "dist_retrieve",
            RpcMethod::DistProcess { .. } => "dist_process",
            RpcMethod::DistMap { .. } => "dist_map",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcReply {
    Alive(bool),
    Modules(Vec<DocSummary>),
    Exists(bool),
    Artifact(Option<Artifact>),
    Stored,
    Processed(BTreeMap<Oid, bool>),
    Artifacts(Vec<(Oid, Option<Artifact>)>),
    MapOutputs(Vec<(Oid, Option<Artifact>)>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub schema: u32,
    /// Remote failures travel as their display text.
    pub result: Result<RpcReply, String>,
}

impl RpcResponse {
    pub fn from_result(result: EngineResult<RpcReply>) -> Self {
        Self { schema: CODEC_SCHEMA_VERSION, result: result.map_err(|e| e.to_string()) }
    }

    pub fn encode(&self) -> EngineResult<Vec<u8>> {
        codec::encode(self)
    }

    pub fn decode(bytes: &[u8]) -> EngineResult<Self> {
        let response: Self = codec::decode(bytes)?;
        check_schema(response.schema)?;
        Ok(response)
    }
}

fn check_schema(found: u32) -> EngineResult<()> {
    if found != CODEC_SCHEMA_VERSION {
        return Err(EngineError::SchemaMismatch { expected: CODEC_SCHEMA_VERSION, found });
    }
    Ok(())
}

/// Execute one request against a local engine.
pub fn dispatch(engine: &Engine, request: RpcRequest) -> EngineResult<RpcReply> {
    match request.method {
        RpcMethod::Alive => Ok(RpcReply::Alive(true)),
        RpcMethod::ListModules => Ok(RpcReply::Modules(engine.registry().summaries(true))),
        RpcMethod::Exists { module, oid, opts } => {
            engine.exists(&module, &oid, &opts).map(RpcReply::Exists)
        }
        RpcMethod::Retrieve { module, oid, opts } => {
            engine.retrieve(&module, &oid, &opts).map(RpcReply::Artifact)
        }
        RpcMethod::Store { module, oid, opts, artifact } => {
            engine.store(&module, &oid, &artifact, &opts).map(|()| RpcReply::Stored)
        }
        RpcMethod::Process { module, oids, opts, force }
        | RpcMethod::DistProcess { module, oids, opts, force } => {
            engine.process(&module, &oids, &opts, force).map(RpcReply::Processed)
        }
        RpcMethod::DistRetrieve { module, oids, opts } => engine
            .retrieve_many(&module, &oids, &opts)
            .map(|map| RpcReply::Artifacts(map.into_iter().collect())),
        RpcMethod::DistMap { module, oids, opts, job_id, force } => engine
            .map_partition(&module, &oids, &opts, &job_id, force)
            .map(RpcReply::MapOutputs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_mismatch_is_rejected() {
        let mut request = RpcRequest::new(RpcMethod::Alive);
        request.schema = CODEC_SCHEMA_VERSION + 1;
        let bytes = codec::encode(&request).expect("encode");
        let err = RpcRequest::decode(&bytes).expect_err("mismatch");
        assert_eq!(
            err,
            EngineError::SchemaMismatch { expected: CODEC_SCHEMA_VERSION, found: CODEC_SCHEMA_VERSION + 1 }
        );
    }

    #[test]
    fn responses_carry_remote_errors_as_text() {
        let response = RpcResponse::from_result(Err(EngineError::UnrecognizedModule("nope".into())));
        let decoded = RpcResponse::decode(&response.encode().expect("encode")).expect("decode");
        assert_eq!(decoded.result, Err("Unrecognized module 'nope'".to_string()));
    }
}
