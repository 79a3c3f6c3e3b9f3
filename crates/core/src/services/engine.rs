use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::debug;

use crate::model::SIGNATURE_EXTENSION;

/// Environment variable pointing at a JSON map of candidate -> count.
///
/// When set, `CommandEngine` answers trials from the map instead of spawning the
/// configured command, so the relaunch pipeline can be exercised without an
/// analysis engine installed.
pub const FAKE_COUNTS_ENV: &str = "LIBID_FAKE_COUNTS";

/// Count reported when the engine output carries no usable number.
pub const INVALID_COUNT: i64 = -1;

#[derive(Debug, Error)]
pub enum TrialError {
    #[error("library flags were not cleared before applying {0}")]
    FlagsNotCleared(String),
    #[error("trial command is empty")]
    EmptyCommand,
    #[error("trial engine error: {0}")]
    Engine(String),
}

/// Capability offered by the external analysis engine.
///
/// Contract: `clear_library_flags` is called immediately before every
/// `apply_candidate`, and the returned count is the number of functions flagged
/// as library code right after the candidate was applied. Negative counts are
/// treated as zero by callers.
pub trait TrialEngine {
    /// Reset every library-function flag on the analyzed binary.
    fn clear_library_flags(&mut self) -> Result<(), TrialError>;

    /// Apply one candidate signature and count the functions it flags.
    fn apply_candidate(&mut self, candidate: &str) -> Result<i64, TrialError>;
}

/// Map a raw engine count to a recorded count; invalid values contribute zero.
pub fn sanitize_count(raw: i64) -> u64 {
    u64::try_from(raw).unwrap_or(0)
}

/// Parse the count printed by a trial command: the last non-empty stdout line.
pub fn parse_count_output(stdout: &str) -> i64 {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.parse::<i64>().ok())
        .unwrap_or(INVALID_COUNT)
}

/// Trial engine that runs one external command per candidate.
///
/// Each command invocation analyzes the binary from scratch, so clearing flags
/// only records that the precondition was honored. Placeholders in the command
/// template: `{binary}`, `{candidate}`, `{signature}` (path of the `.sig` file).
#[derive(Debug, Clone)]
pub struct CommandEngine {
    command: Vec<String>,
    binary: PathBuf,
    signature_dir: PathBuf,
    cleared: bool,
}

impl CommandEngine {
    pub fn new(
        command: Vec<String>,
        binary: impl Into<PathBuf>,
        signature_dir: impl Into<PathBuf>,
    ) -> Self {
        Self { command, binary: binary.into(), signature_dir: signature_dir.into(), cleared: false }
    }

    pub fn signature_path(&self, candidate: &str) -> PathBuf {
        self.signature_dir.join(format!("{candidate}.{SIGNATURE_EXTENSION}"))
    }

    fn expand(&self, arg: &str, candidate: &str) -> String {
        arg.replace("{binary}", &self.binary.display().to_string())
            .replace("{candidate}", candidate)
            .replace("{signature}", &self.signature_path(candidate).display().to_string())
    }

    fn run_command(&self, candidate: &str) -> Result<i64, TrialError> {
        let (program, args) = self.command.split_first().ok_or(TrialError::EmptyCommand)?;
        let output = Command::new(self.expand(program, candidate))
            .args(args.iter().map(|a| self.expand(a, candidate)))
            .output()
            .map_err(|e| TrialError::Engine(format!("failed to spawn {program}: {e}")))?;
        if !output.status.success() {
            return Err(TrialError::Engine(format!("{program} exited with {}", output.status)));
        }
        Ok(parse_count_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl TrialEngine for CommandEngine {
    fn clear_library_flags(&mut self) -> Result<(), TrialError> {
        self.cleared = true;
        Ok(())
    }

    fn apply_candidate(&mut self, candidate: &str) -> Result<i64, TrialError> {
        if !std::mem::replace(&mut self.cleared, false) {
            return Err(TrialError::FlagsNotCleared(candidate.to_string()));
        }
        if let Some(fake) = std::env::var_os(FAKE_COUNTS_ENV) {
            return fake_count(Path::new(&fake), candidate);
        }
        let count = self.run_command(candidate)?;
        debug!(candidate, count, "trial command finished");
        Ok(count)
    }
}

fn fake_count(path: &Path, candidate: &str) -> Result<i64, TrialError> {
    let body = fs::read_to_string(path)
        .map_err(|e| TrialError::Engine(format!("failed to read {FAKE_COUNTS_ENV}: {e}")))?;
    let counts: BTreeMap<String, i64> = serde_json::from_str(&body)
        .map_err(|e| TrialError::Engine(format!("failed to parse {FAKE_COUNTS_ENV}: {e}")))?;
    Ok(counts.get(candidate).copied().unwrap_or(0))
}
