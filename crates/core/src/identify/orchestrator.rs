//! Process-level driver for identification.
//!
//! The analysis engine cannot keep state between trials, so identification is
//! split in two halves that only communicate through the persisted document:
//!
//! - [`engine_step`] runs inside a fresh engine process: load, advance once,
//!   persist if dirty.
//! - [`drive`] runs in the orchestrator: relaunch the engine until the document
//!   holds a result, aborting as soon as one relaunch makes no observable
//!   progress.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::SystemTime;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::identify::machine::Step;
use crate::identify::state::IdentificationState;
use crate::identify::IdentifyError;
use crate::model::CandidateSet;
use crate::services::engine::TrialEngine;

/// Load the document, advance once, and persist the state if it changed.
pub fn engine_step<E: TrialEngine + ?Sized>(
    document: &Path,
    candidates: &CandidateSet,
    engine: &mut E,
) -> Result<Step, IdentifyError> {
    let mut state = IdentificationState::load(document)?;
    let step = state.advance(candidates, engine)?;
    if step.dirty {
        state.save(document)?;
    }
    Ok(step)
}

/// Observable identity of the document on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentStamp {
    pub modified: SystemTime,
    pub digest: [u8; 32],
}

impl DocumentStamp {
    /// Stamp of the document at `path`, or `None` if it does not exist.
    pub fn read(path: &Path) -> Result<Option<Self>, IdentifyError> {
        let io_err = |e: io::Error| IdentifyError::Io(path.to_path_buf(), e);
        let modified = match fs::metadata(path) {
            Ok(meta) => meta.modified().map_err(io_err)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_err(err)),
        };
        let body = fs::read(path).map_err(io_err)?;
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&Sha256::digest(&body));
        Ok(Some(Self { modified, digest }))
    }
}

/// Starts one engine process for a binary and waits for it to exit.
pub trait Relauncher {
    fn relaunch(&mut self, binary: &Path, document: &Path) -> Result<(), IdentifyError>;
}

/// Relauncher running a command template.
///
/// Placeholders: `{binary}`, `{document}`, plus any extra `(name, value)` pairs
/// registered with [`CommandRelauncher::with_var`]. The engine's stdout is
/// discarded and its exit status only logged; progress is judged from the
/// document alone.
#[derive(Debug, Clone)]
pub struct CommandRelauncher {
    command: Vec<String>,
    vars: Vec<(String, String)>,
}

impl CommandRelauncher {
    pub fn new(command: Vec<String>) -> Self {
        Self { command, vars: Vec::new() }
    }

    pub fn with_var(mut self, name: &str, value: impl Into<String>) -> Self {
        self.vars.push((format!("{{{name}}}"), value.into()));
        self
    }

    fn expand(&self, arg: &str, binary: &Path, document: &Path) -> String {
        let mut out = arg
            .replace("{binary}", &binary.display().to_string())
            .replace("{document}", &document.display().to_string());
        for (placeholder, value) in &self.vars {
            out = out.replace(placeholder.as_str(), value);
        }
        out
    }
}

impl Relauncher for CommandRelauncher {
    fn relaunch(&mut self, binary: &Path, document: &Path) -> Result<(), IdentifyError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| IdentifyError::Relaunch("relaunch command is empty".to_string()))?;
        let status = Command::new(self.expand(program, binary, document))
            .args(args.iter().map(|a| self.expand(a, binary, document)))
            .stdout(Stdio::null())
            .status()
            .map_err(|e| IdentifyError::Relaunch(format!("failed to spawn {program}: {e}")))?;
        if !status.success() {
            warn!(%status, binary = %binary.display(), "engine process exited unsuccessfully");
        }
        Ok(())
    }
}

/// Bounds on the relaunch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_relaunches: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_relaunches: 10_000 }
    }
}

/// Terminal condition of [`drive`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The document holds a result.
    Resolved { state: IdentificationState, relaunches: usize },
    /// A relaunch left the document absent or unchanged.
    Stalled { relaunches: usize },
    /// The relaunch budget ran out before a result appeared.
    Exhausted { relaunches: usize },
}

impl Outcome {
    pub fn relaunches(&self) -> usize {
        match self {
            Outcome::Resolved { relaunches, .. }
            | Outcome::Stalled { relaunches }
            | Outcome::Exhausted { relaunches } => *relaunches,
        }
    }
}

/// Relaunch the engine until `document` holds a result or progress stops.
pub fn drive<R: Relauncher + ?Sized>(
    binary: &Path,
    document: &Path,
    relauncher: &mut R,
    policy: RetryPolicy,
) -> Result<Outcome, IdentifyError> {
    let mut relaunches = 0;
    loop {
        if let Some(state) = IdentificationState::load_existing(document)? {
            if state.is_resolved() {
                info!(binary = %binary.display(), relaunches, "identification finished");
                return Ok(Outcome::Resolved { state, relaunches });
            }
        }
        if relaunches >= policy.max_relaunches {
            warn!(binary = %binary.display(), relaunches, "relaunch budget exhausted");
            return Ok(Outcome::Exhausted { relaunches });
        }

        let before = DocumentStamp::read(document)?;
        relauncher.relaunch(binary, document)?;
        relaunches += 1;
        let after = DocumentStamp::read(document)?;

        if after.is_none() || after == before {
            warn!(binary = %binary.display(), relaunches, "engine made no progress");
            return Ok(Outcome::Stalled { relaunches });
        }
    }
}

/// Document path for a binary: `<path without extension><suffix>`.
pub fn document_path(binary: &Path, suffix: &str) -> PathBuf {
    let stem = binary.with_extension("");
    let mut name = stem.into_os_string();
    name.push(suffix);
    PathBuf::from(name)
}
