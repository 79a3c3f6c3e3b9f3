use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::store::Settings;

/// Logical layout of a signature toolkit on disk.
///
/// Derived from a root path and the settings. It does *not* perform any IO
/// except in [`ToolkitLayout::pattern_cpus`].
#[derive(Debug, Clone)]
pub struct ToolkitLayout {
    /// Root directory of the toolkit.
    pub root: PathBuf,
    /// Generated pattern files (pat).
    pub pattern_dir: PathBuf,
    /// Compiled signatures (sig).
    pub signature_dir: PathBuf,
    /// Alias table file.
    pub alias_table_path: PathBuf,
    /// Suppression list file.
    pub suppression_list_path: PathBuf,
}

impl ToolkitLayout {
    pub fn new(root: impl AsRef<Path>, settings: &Settings) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            pattern_dir: root.join(&settings.pattern_dir),
            signature_dir: root.join(&settings.signature_dir),
            alias_table_path: root.join(&settings.alias_table),
            suppression_list_path: root.join(&settings.suppression_list),
            root,
        }
    }

    pub fn pattern_cpu_dir(&self, cpu: &str) -> PathBuf {
        self.pattern_dir.join(cpu)
    }

    /// Candidate store for one CPU namespace.
    pub fn signature_cpu_dir(&self, cpu: &str) -> PathBuf {
        self.signature_dir.join(cpu)
    }

    /// CPU subdirectories of the pattern directory, sorted. Missing directory is empty.
    pub fn pattern_cpus(&self) -> io::Result<Vec<String>> {
        let entries = match fs::read_dir(&self.pattern_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let mut cpus = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                cpus.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        cpus.sort();
        Ok(cpus)
    }
}
