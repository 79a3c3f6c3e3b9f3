use std::path::PathBuf;

use anyhow::{Context, Result};
use libid_core::model::{CandidateSet, LibraryKind};
use libid_core::services::triage::{triage_file, Triage};
use serde::Serialize;

use crate::absolute_path;
use crate::commands::{load_context, print_json, TriageFlags};

#[derive(Debug, Serialize)]
struct CandidateEntry<'a> {
    id: &'a str,
    kind: Option<LibraryKind>,
}

/// List candidate signatures in the store for `cpu`.
pub fn candidates_command(root: &str, cpu: &str, json: bool) -> Result<()> {
    let ctx = load_context(root)?;
    let dir = ctx.layout.signature_cpu_dir(cpu);
    let candidates = CandidateSet::from_store(&dir)
        .with_context(|| format!("Failed to list signatures in {}", dir.display()))?;

    if json {
        let entries: Vec<CandidateEntry> = candidates
            .iter()
            .map(|id| CandidateEntry { id, kind: LibraryKind::of_candidate(id) })
            .collect();
        return print_json(&entries);
    }

    if candidates.is_empty() {
        println!("No candidate signatures in {}.", dir.display());
        return Ok(());
    }
    println!("Candidates ({}):", candidates.len());
    for id in candidates.iter() {
        let kind = LibraryKind::of_candidate(id).map(|k| k.as_str()).unwrap_or("unknown");
        println!("- {id} [{kind}]");
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct TriageEntry {
    binary: PathBuf,
    #[serde(flatten)]
    verdict: Triage,
}

/// Report the triage verdict of each binary.
pub fn triage_command(root: &str, paths: &[String], flags: TriageFlags, json: bool) -> Result<()> {
    let ctx = load_context(root)?;
    let policy = flags.apply(ctx.settings.triage.clone());
    let mut entries = Vec::new();
    for path in paths {
        let binary = absolute_path(path)?;
        let verdict = triage_file(&binary, &policy)
            .with_context(|| format!("Failed to read binary {}", binary.display()))?;
        entries.push(TriageEntry { binary, verdict });
    }

    if json {
        return print_json(&entries);
    }
    for entry in &entries {
        match &entry.verdict {
            Triage::Identify { attributes, cpu, entropy } => println!(
                "{}: identify ({}-bit, machine {}, cpu {}, entropy {entropy:.2})",
                entry.binary.display(),
                attributes.bits,
                attributes.machine,
                cpu.as_deref().unwrap_or("-"),
            ),
            Triage::Skip { reason, entropy, .. } => {
                println!("{}: skip ({reason}, entropy {entropy:.2})", entry.binary.display())
            }
        }
    }
    Ok(())
}
