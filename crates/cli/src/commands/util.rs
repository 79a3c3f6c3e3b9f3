use std::path::Path;
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use libid_core::services::triage::TriagePolicy;
use libid_core::store::ToolkitContext;
use serde::Serialize;

use crate::canonicalize_or_current;

/// Triage overrides given on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriageFlags {
    /// Disable every check except "is an ELF file".
    pub ignore_all: bool,
    pub ignore_machine: bool,
    pub ignore_strip: bool,
    pub ignore_entropy: bool,
}

impl TriageFlags {
    /// Layer the flags over a configured policy; a flag can only disable a check.
    pub fn apply(self, mut policy: TriagePolicy) -> TriagePolicy {
        if self.ignore_all {
            return policy.ignore_all();
        }
        policy.ignore_machine |= self.ignore_machine;
        policy.ignore_strip |= self.ignore_strip;
        policy.ignore_entropy |= self.ignore_entropy;
        policy
    }
}

/// Resolve `root` and load the toolkit context rooted there.
pub fn load_context(root: &str) -> Result<ToolkitContext> {
    let root_path = canonicalize_or_current(root)?;
    ToolkitContext::from_root(&root_path)
        .with_context(|| format!("Failed to open toolkit at {}", root_path.display()))
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}

/// Modification time of `path` in RFC 3339 (UTC), if it exists.
pub fn modified_rfc3339(path: &Path) -> Option<String> {
    let modified: SystemTime = path.metadata().and_then(|m| m.modified()).ok()?;
    let stamp: DateTime<Utc> = modified.into();
    Some(stamp.to_rfc3339_opts(SecondsFormat::Secs, true))
}
