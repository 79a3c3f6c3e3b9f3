//! Collapse byte-identical pattern files before signature compilation.
//!
//! Files are compared by size first; SHA-256 digests are only computed for
//! files that share a size with an earlier canonical file, and are memoized per
//! path. Duplicates are rewritten to a one-line redirect naming the canonical
//! file's stem, so the signature compiler only ever sees the canonical copy.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::patterns::{is_usable, PatternError, PATTERN_EXTENSION, SENTINEL};
use crate::store::write_atomic;

/// Redirect stubs are tiny; anything larger is never read as a stub.
const MAX_STUB_LEN: u64 = 512;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DedupOutcome {
    /// Files kept for compilation, in sorted order.
    pub canonical: Vec<PathBuf>,
    /// Duplicate file -> canonical file it redirects to.
    pub redirects: BTreeMap<PathBuf, PathBuf>,
}

#[derive(Debug, Clone)]
struct CachedDigest {
    size: u64,
    modified: SystemTime,
    digest: [u8; 32],
}

/// Size-then-hash deduplicator with a per-file digest memo.
#[derive(Debug, Default)]
pub struct Deduplicator {
    digests: HashMap<PathBuf, CachedDigest>,
    hashed: usize,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of digests computed so far (cache hits are not counted).
    pub fn hashes_computed(&self) -> usize {
        self.hashed
    }

    fn digest(&mut self, path: &Path) -> Result<[u8; 32], PatternError> {
        let io_err = |e: io::Error| PatternError::Io(path.to_path_buf(), e);
        let meta = fs::metadata(path).map_err(io_err)?;
        let modified = meta.modified().map_err(io_err)?;
        if let Some(cached) = self.digests.get(path) {
            if cached.size == meta.len() && cached.modified == modified {
                debug!(path = %path.display(), "digest cache hit");
                return Ok(cached.digest);
            }
        }
        let body = fs::read(path).map_err(io_err)?;
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&Sha256::digest(&body));
        self.hashed += 1;
        self.digests
            .insert(path.to_path_buf(), CachedDigest { size: meta.len(), modified, digest });
        Ok(digest)
    }

    /// Deduplicate `files`, rewriting duplicates into redirect stubs.
    ///
    /// Existing stubs are reported as redirects without being hashed, so running
    /// twice over the same set yields the same outcome. Files without the
    /// sentinel that are not stubs are still being written and are left out.
    pub fn dedup(&mut self, files: &[PathBuf]) -> Result<DedupOutcome, PatternError> {
        let mut sorted = files.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut outcome = DedupOutcome::default();
        let mut by_size: HashMap<u64, Vec<PathBuf>> = HashMap::new();

        for path in sorted {
            let size = fs::metadata(&path).map_err(|e| PatternError::Io(path.clone(), e))?.len();
            if let Some(target) = read_stub(&path, size)? {
                outcome.redirects.insert(path, target);
                continue;
            }
            if !is_usable(&path)? {
                debug!(path = %path.display(), "skipping incomplete pattern file");
                continue;
            }

            let mut duplicate_of = None;
            if let Some(group) = by_size.get(&size) {
                let group = group.clone();
                let digest = self.digest(&path)?;
                for canonical in group {
                    if self.digest(&canonical)? == digest {
                        duplicate_of = Some(canonical);
                        break;
                    }
                }
            }

            match duplicate_of {
                Some(canonical) => {
                    write_stub(&path, &canonical)?;
                    self.digests.remove(&path);
                    info!(
                        duplicate = %path.display(),
                        canonical = %canonical.display(),
                        "collapsed duplicate pattern"
                    );
                    outcome.redirects.insert(path, canonical);
                }
                None => {
                    by_size.entry(size).or_default().push(path.clone());
                    outcome.canonical.push(path);
                }
            }
        }
        Ok(outcome)
    }
}

fn write_stub(path: &Path, canonical: &Path) -> Result<(), PatternError> {
    let stem = canonical.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    write_atomic(path, format!("{stem}\n").as_bytes())
        .map_err(|e| PatternError::Io(path.to_path_buf(), e))
}

/// Target of a redirect stub: a single line naming an existing sibling pattern.
fn read_stub(path: &Path, size: u64) -> Result<Option<PathBuf>, PatternError> {
    if size == 0 || size > MAX_STUB_LEN {
        return Ok(None);
    }
    let body = fs::read(path).map_err(|e| PatternError::Io(path.to_path_buf(), e))?;
    let body = String::from_utf8_lossy(&body);
    let mut lines = body.lines();
    let (Some(line), None) = (lines.next(), lines.next()) else {
        return Ok(None);
    };
    let name = line.trim();
    if name.is_empty() || name == SENTINEL || name.contains(char::is_whitespace) {
        return Ok(None);
    }
    let target = path.with_file_name(format!("{name}.{PATTERN_EXTENSION}"));
    if target != path && target.is_file() {
        Ok(Some(target))
    } else {
        Ok(None)
    }
}
