//! Identification of statically linked runtime library builds.
//!
//! - `state`: the persisted per-binary document.
//! - `machine`: the advance/decide algorithm.
//! - `orchestrator`: engine-side step and the relaunch loop around it.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::services::engine::TrialError;

pub mod machine;
pub mod orchestrator;
pub mod state;

pub use machine::{Action, KindStanding, Step};
pub use orchestrator::{
    document_path, drive, engine_step, CommandRelauncher, DocumentStamp, Outcome, Relauncher,
    RetryPolicy,
};
pub use state::{IdentificationState, Resolution};

/// Error type for identification document and orchestration operations.
#[derive(Debug, Error)]
pub enum IdentifyError {
    #[error("I/O error on {0}: {1}")]
    Io(PathBuf, #[source] io::Error),
    #[error("Malformed identification document {0}: {1}")]
    Document(PathBuf, String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Trial(#[from] TrialError),
    #[error("Relaunch failed: {0}")]
    Relaunch(String),
}
