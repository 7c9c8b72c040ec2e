//! Error kinds surfaced by the engine and its modules.

use std::fmt::Display;

use thiserror::Error;

/// Error type shared by the engine, the stores, and analysis modules.
///
/// The type is `Clone` so a single outcome can be handed to every caller that
/// coalesced on the same in-flight computation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// The caller-supplied list contains no valid OIDs.
    #[error("No valid OIDs in list ({supplied} supplied)")]
    BadOidList { supplied: usize },

    #[error("Unrecognized module '{0}'")]
    UnrecognizedModule(String),

    #[error("Module '{0}' is already registered")]
    DuplicateModule(String),

    #[error("Option '{option}' of module '{module}': {message}")]
    OptionTypeError { module: String, option: String, message: String },

    #[error("Module '{module}' requires option '{option}'")]
    OptionMissingRequired { module: String, option: String },

    /// Only raised for modules whose option schema is closed.
    #[error("Module '{module}' does not accept option '{option}'")]
    UnknownOption { module: String, option: String },

    #[error("Dependency cycle detected: {chain}")]
    DependencyCycle { chain: String },

    #[error("Artifact I/O error at {path}: {message}")]
    ArtifactIo { path: String, message: String },

    /// The module cannot process this OID. Never fatal; recorded as "no artifact".
    #[error("Module '{module}' is not applicable to {oid}")]
    NotApplicable { module: String, oid: String },

    #[error("Worker {endpoint} unavailable: {reason}")]
    WorkerUnavailable { endpoint: String, reason: String },

    #[error("Job {job_id} was canceled")]
    Canceled { job_id: String },

    #[error("Canonical encoding error: {0}")]
    Codec(String),

    #[error("Schema version mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: u32, found: u32 },

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A module's own declared failure.
    #[error("Module '{module}' failed: {message}")]
    Module { module: String, message: String },

    #[error("Worker {endpoint} reported: {message}")]
    Remote { endpoint: String, message: String },
}

/// Convenience result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Wrap an I/O failure with the path it happened on.
    pub fn io(path: impl Display, err: impl Display) -> Self {
        EngineError::ArtifactIo { path: path.to_string(), message: err.to_string() }
    }

    pub fn module(module: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Module { module: module.into(), message: message.into() }
    }

    pub fn not_applicable(module: impl Into<String>, oid: impl Display) -> Self {
        EngineError::NotApplicable { module: module.into(), oid: oid.to_string() }
    }

    /// True for errors caused by how the engine was called rather than by I/O.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            EngineError::BadOidList { .. }
                | EngineError::UnrecognizedModule(_)
                | EngineError::OptionTypeError { .. }
                | EngineError::OptionMissingRequired { .. }
                | EngineError::UnknownOption { .. }
        )
    }
}
