//! Adapters around the external analysis engine.
//!
//! - `engine`: the trial capability used during identification.
//! - `triage`: ELF gate deciding whether a binary needs identification.
//! - `session`: one-time preparation of an analysis session once identified.

pub mod engine;
pub mod session;
pub mod triage;

pub use engine::{CommandEngine, TrialEngine, TrialError};
pub use session::{AnalysisSession, FunctionEntry, SessionEngine, SessionError, SessionReport};
pub use triage::{triage_file, Triage, TriagePolicy};
