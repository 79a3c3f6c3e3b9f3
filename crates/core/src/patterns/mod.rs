//! Pattern files produced by the external pattern compiler.
//!
//! A pattern file is line oriented. Lines with at least five whitespace
//! separated tokens describe one module: four header tokens followed by
//! `(marker, name)` pairs where a `:`-prefixed marker carries the hex offset of
//! a public name. A usable file ends with the `---` sentinel line.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

pub mod alias;
pub mod dedup;

pub use alias::{
    alias_order, cluster, cluster_files, is_stale, suppression_names, write_suppression_list,
    AliasCluster, AliasClusterer, AliasTable,
};
pub use dedup::{DedupOutcome, Deduplicator};

/// Extension of pattern files.
pub const PATTERN_EXTENSION: &str = "pat";

/// Last line of a completed pattern file.
pub const SENTINEL: &str = "---";

/// Tokens preceding the offset/name pairs on a record line.
const HEADER_TOKENS: usize = 4;

const OFFSET_MARKER: char = ':';
const LOCAL_SUFFIX: char = '@';

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("I/O error on {0}: {1}")]
    Io(PathBuf, #[source] io::Error),
}

/// Names observed per offset on one pattern line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternRecord {
    pub entries: BTreeMap<i64, BTreeSet<String>>,
}

impl PatternRecord {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every name in the record, across offsets.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.values().flatten().map(String::as_str)
    }
}

/// Parse a hex offset token after its markers were stripped (`-?[0-9a-fA-F]+`).
fn parse_offset(token: &str) -> Option<i64> {
    let digits = token.strip_prefix('-').unwrap_or(token);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    i64::from_str_radix(token, 16).ok()
}

/// Parse one pattern line. Lines with fewer than five tokens carry no record.
pub fn parse_line(line: &str) -> Option<PatternRecord> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() <= HEADER_TOKENS {
        return None;
    }

    let mut record = PatternRecord::default();
    let mut rest = &tokens[HEADER_TOKENS..];
    while let [token, tail @ ..] = rest {
        if tail.is_empty() {
            break;
        }
        rest = tail;
        let Some(marked) = token.strip_prefix(OFFSET_MARKER) else {
            continue;
        };
        let stripped = marked.trim_start_matches(OFFSET_MARKER).trim_end_matches(LOCAL_SUFFIX);
        match parse_offset(stripped) {
            Some(offset) => {
                record.entries.entry(offset).or_default().insert(tail[0].to_string());
                rest = &tail[1..];
            }
            None => debug!(token = *token, "skipping malformed offset token"),
        }
    }
    Some(record)
}

/// A completed pattern file and its parsed records.
#[derive(Debug, Clone)]
pub struct PatternFile {
    pub path: PathBuf,
    pub records: Vec<PatternRecord>,
}

impl PatternFile {
    /// Parse pattern text; `None` unless the last line is the sentinel.
    pub fn parse(path: impl Into<PathBuf>, body: &str) -> Option<Self> {
        if !has_sentinel(body) {
            return None;
        }
        let records = body.lines().filter_map(parse_line).collect();
        Some(Self { path: path.into(), records })
    }

    /// Read and parse a pattern file; unusable files yield `None`.
    pub fn load(path: &Path) -> Result<Option<Self>, PatternError> {
        let body = read_text(path)?;
        Ok(Self::parse(path, &body))
    }

    /// Library kind prefix check on the file stem (e.g. `_libgcc_`).
    pub fn stem_starts_with(&self, prefix: &str) -> bool {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|stem| stem.starts_with(prefix))
    }
}

fn read_text(path: &Path) -> Result<String, PatternError> {
    let bytes = fs::read(path).map_err(|e| PatternError::Io(path.to_path_buf(), e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// True when the last line of `body`, trimmed, is the sentinel.
pub fn has_sentinel(body: &str) -> bool {
    body.lines().last().is_some_and(|line| line.trim() == SENTINEL)
}

/// True when the file at `path` is a completed pattern file.
pub fn is_usable(path: &Path) -> Result<bool, PatternError> {
    Ok(has_sentinel(&read_text(path)?))
}

/// Sorted `*.pat` files directly under `dir`. A missing directory is empty.
pub fn list_pattern_files(dir: &Path) -> Result<Vec<PathBuf>, PatternError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(PatternError::Io(dir.to_path_buf(), err)),
    };
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| PatternError::Io(dir.to_path_buf(), e))?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(PATTERN_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Load every usable pattern file among `paths`, skipping the rest.
pub fn load_usable(paths: &[PathBuf]) -> Result<Vec<PatternFile>, PatternError> {
    let mut files = Vec::new();
    for path in paths {
        match PatternFile::load(path)? {
            Some(file) => files.push(file),
            None => debug!(path = %path.display(), "skipping pattern file without sentinel"),
        }
    }
    Ok(files)
}
