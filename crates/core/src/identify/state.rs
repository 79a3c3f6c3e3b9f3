use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::identify::IdentifyError;
use crate::model::LibraryKind;
use crate::store::write_atomic;

/// Final decision: each library kind mapped to its chosen candidate, or `None`
/// when no candidate of that kind matched.
pub type Resolution = BTreeMap<LibraryKind, Option<String>>;

/// Persisted per-binary identification state.
///
/// Serialized as a JSON object with `estimate`, `determine` and `result`. Keys are
/// kept in `BTreeMap`s so the document has a deterministic ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentificationState {
    /// Standalone trial count per candidate.
    #[serde(default)]
    pub estimate: BTreeMap<String, u64>,
    /// Trial count per candidate chosen as provisional match.
    #[serde(default)]
    pub determine: BTreeMap<String, u64>,
    /// Present only once every library kind has been resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Resolution>,
}

impl IdentificationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State recorded for binaries that need no identification (empty result).
    pub fn skipped() -> Self {
        Self { result: Some(Resolution::new()), ..Self::default() }
    }

    pub fn is_resolved(&self) -> bool {
        self.result.is_some()
    }

    /// Chosen candidates of the final result, skipping kinds without a match.
    pub fn chosen(&self) -> Vec<&str> {
        self.result
            .iter()
            .flat_map(|r| r.values())
            .filter_map(|c| c.as_deref())
            .collect()
    }

    pub fn from_json(body: &str) -> Result<Self, IdentifyError> {
        Ok(serde_json::from_str(body)?)
    }

    pub fn to_json(&self) -> Result<String, IdentifyError> {
        let mut body = serde_json::to_string_pretty(self)?;
        body.push('\n');
        Ok(body)
    }

    /// Load the document at `path`; a missing file is an empty state.
    pub fn load(path: &Path) -> Result<Self, IdentifyError> {
        match Self::load_existing(path)? {
            Some(state) => Ok(state),
            None => Ok(Self::new()),
        }
    }

    /// Load the document at `path`, or `None` if it does not exist.
    pub fn load_existing(path: &Path) -> Result<Option<Self>, IdentifyError> {
        match fs::read_to_string(path) {
            Ok(body) => Self::from_json(&body)
                .map(Some)
                .map_err(|e| IdentifyError::Document(path.to_path_buf(), e.to_string())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(IdentifyError::Io(path.to_path_buf(), err)),
        }
    }

    /// Persist atomically: write a sibling temporary file, then rename over `path`.
    pub fn save(&self, path: &Path) -> Result<(), IdentifyError> {
        let body = self.to_json()?;
        write_atomic(path, body.as_bytes()).map_err(|e| IdentifyError::Io(path.to_path_buf(), e))
    }
}
