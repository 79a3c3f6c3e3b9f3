//! Core data model: library kinds and candidate signature sets.
//!
//! A candidate signature is identified by the stem of its signature file, e.g.
//! `_libc_aboriginal-1.4.5-armv5l`. The leading `_<kind>_` prefix names the
//! library kind the candidate belongs to.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// File extension of compiled signature files in the candidate store.
pub const SIGNATURE_EXTENSION: &str = "sig";

/// Fixed category of runtime library for which one candidate is chosen (or none).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LibraryKind {
    /// C runtime library.
    Libc,
    /// Compiler support runtime library.
    Libgcc,
}

impl LibraryKind {
    /// All kinds, in resolution order.
    pub const ALL: [LibraryKind; 2] = [LibraryKind::Libc, LibraryKind::Libgcc];

    pub fn as_str(self) -> &'static str {
        match self {
            LibraryKind::Libc => "libc",
            LibraryKind::Libgcc => "libgcc",
        }
    }

    /// Prefix carried by candidate ids of this kind (e.g. `_libc_`).
    pub fn prefix(self) -> &'static str {
        match self {
            LibraryKind::Libc => "_libc_",
            LibraryKind::Libgcc => "_libgcc_",
        }
    }

    /// Kind of a candidate id, if it carries a known prefix.
    pub fn of_candidate(candidate: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| candidate.starts_with(kind.prefix()))
    }
}

impl fmt::Display for LibraryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns true if `stem` looks like a candidate id (`_<kind>_<package>`).
///
/// Any `_x_y` shaped name qualifies, not only the two known kinds; candidates of
/// unknown kinds are still estimated but never chosen.
pub fn is_candidate_name(stem: &str) -> bool {
    stem.strip_prefix('_').is_some_and(|rest| rest.contains('_'))
}

/// The set of candidate signatures currently available, ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
    ids: BTreeSet<String>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enumerate `<dir>/_*_*.sig`. A missing directory yields an empty set.
    pub fn from_store(dir: &Path) -> io::Result<Self> {
        let mut set = Self::new();
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(set),
            Err(err) => return Err(err),
        };
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SIGNATURE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if is_candidate_name(stem) {
                    set.insert(stem);
                }
            }
        }
        Ok(set)
    }

    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.ids.insert(id.into())
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.ids.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterate ids in lexicographic order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Ids of one library kind, in lexicographic order.
    pub fn of_kind(&self, kind: LibraryKind) -> impl Iterator<Item = &str> {
        self.iter().filter(move |id| id.starts_with(kind.prefix()))
    }
}

impl<S: Into<String>> FromIterator<S> for CandidateSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self { ids: iter.into_iter().map(Into::into).collect() }
    }
}
