use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::LibraryKind;
use crate::services::triage::TriagePolicy;

/// Settings file names probed in the toolkit root, in order.
pub const SETTINGS_FILES: [&str; 3] = ["libid.yaml", "libid.yml", "libid.json"];

/// Error type for loading toolkit settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error on {0}: {1}")]
    Io(PathBuf, #[source] io::Error),
    #[error("Invalid YAML settings in {0}: {1}")]
    Yaml(PathBuf, #[source] serde_yaml::Error),
    #[error("Invalid JSON settings in {0}: {1}")]
    Json(PathBuf, #[source] serde_json::Error),
}

/// External commands used to run trials and relaunch the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Trial command template (`{binary}`, `{candidate}`, `{signature}`).
    /// Empty until configured.
    pub trial_command: Vec<String>,
    /// Relaunch command template (`{binary}`, `{document}`, `{cpu}`, `{root}`).
    /// When unset the CLI re-invokes itself with `step`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relaunch_command: Option<Vec<String>>,
    pub max_relaunches: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self { trial_command: Vec::new(), relaunch_command: None, max_relaunches: 10_000 }
    }
}

/// Serializable toolkit settings. Every field has a default, so an empty or
/// missing settings file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory of generated pattern files, one subdirectory per CPU.
    pub pattern_dir: String,
    /// Directory of compiled signatures (the candidate store), one subdirectory per CPU.
    pub signature_dir: String,
    pub alias_table: String,
    pub suppression_list: String,
    /// Kind whose non-canonical aliases go into the suppression list.
    pub suppressed_kind: LibraryKind,
    /// Appended to the binary path (minus extension) to name its document.
    pub document_suffix: String,
    pub engine: EngineSettings,
    pub triage: TriagePolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pattern_dir: "pat".to_string(),
            signature_dir: "sig".to_string(),
            alias_table: "name_alternate.csv".to_string(),
            suppression_list: "name_ignore.txt".to_string(),
            suppressed_kind: LibraryKind::Libgcc,
            document_suffix: "_libid.json".to_string(),
            engine: EngineSettings::default(),
            triage: TriagePolicy::default(),
        }
    }
}
