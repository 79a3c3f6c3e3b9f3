//! libid-core
//!
//! Core library for identifying which build of a standard runtime library
//! (C library, compiler-support library) was statically linked into a
//! stripped binary.
//!
//! This crate defines the candidate model, the persisted identification state
//! machine and its relaunch orchestrator, the pattern-file tooling (record
//! parsing, alias clustering, content deduplication), and adapters for the
//! external analysis engine.
//!
//! All substantive logic lives here so it is fully testable and reusable from
//! multiple frontends.

pub mod identify;
pub mod model;
pub mod patterns;
pub mod services;
pub mod store;

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
