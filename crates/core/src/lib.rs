//! oxide-core
//!
//! Core library for the oxide binary-analysis engine.
//!
//! Files are imported into a content-addressed store and analysed by a
//! population of modules that request each other's artifacts through the
//! [`Engine`] handle. The crate holds the module registry and option contract,
//! the artifact store, the execution engine (including map/reduce and
//! distributed fan-out), and the data model shared by all modules.
//!
//! All substantive logic lives here so it stays testable and reusable from
//! multiple frontends (the `oxide` CLI, worker processes, etc.).

pub mod analysis;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod decoder;
pub mod distrib;
pub mod engine;
pub mod error;
pub mod formats;
pub mod model;
pub mod modules;
pub mod oid;
pub mod options;
pub mod reference;
pub mod registry;
pub mod store;
pub mod util;
pub mod value;

pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use model::Artifact;
pub use oid::Oid;
pub use options::{OptionBag, ResolvedOptions};
pub use value::Value;

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
