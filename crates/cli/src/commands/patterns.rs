use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use libid_core::patterns::{
    cluster_files, is_stale, list_pattern_files, load_usable, suppression_names,
    write_suppression_list, AliasTable, DedupOutcome, Deduplicator,
};
use libid_core::store::ToolkitContext;
use serde::Serialize;

use crate::commands::{load_context, print_json};

/// Every `.pat` file across the CPU subdirectories of the pattern directory, sorted.
fn all_pattern_files(ctx: &ToolkitContext) -> Result<Vec<PathBuf>> {
    let layout = &ctx.layout;
    let cpus = layout
        .pattern_cpus()
        .with_context(|| format!("Failed to read {}", layout.pattern_dir.display()))?;
    let mut files = Vec::new();
    for cpu in cpus {
        files.extend(list_pattern_files(&layout.pattern_cpu_dir(&cpu))?);
    }
    files.sort();
    Ok(files)
}

#[derive(Debug, Serialize)]
struct DedupReport {
    cpu: String,
    #[serde(flatten)]
    outcome: DedupOutcome,
}

/// Deduplicate pattern files per CPU namespace.
pub fn dedup_command(root: &str, cpu: Option<&str>, json: bool) -> Result<()> {
    let ctx = load_context(root)?;
    let cpus = match cpu {
        Some(cpu) => vec![cpu.to_string()],
        None => ctx.layout.pattern_cpus().with_context(|| {
            format!("Failed to read {}", ctx.layout.pattern_dir.display())
        })?,
    };

    let mut dedup = Deduplicator::new();
    let mut reports = Vec::new();
    for cpu in cpus {
        let files = list_pattern_files(&ctx.layout.pattern_cpu_dir(&cpu))?;
        let outcome = dedup.dedup(&files)?;
        reports.push(DedupReport { cpu, outcome });
    }

    if json {
        return print_json(&reports);
    }
    for report in &reports {
        println!(
            "{}: {} canonical, {} redirected",
            report.cpu,
            report.outcome.canonical.len(),
            report.outcome.redirects.len()
        );
        for (duplicate, canonical) in &report.outcome.redirects {
            println!("  - {} -> {}", duplicate.display(), canonical.display());
        }
    }
    Ok(())
}

/// Regenerate the alias table and suppression list when stale (or forced).
pub fn alias_table_command(root: &str, force: bool) -> Result<()> {
    let ctx = load_context(root)?;
    let layout = &ctx.layout;
    let paths = all_pattern_files(&ctx)?;
    let files = load_usable(&paths)?;

    let table_path = &layout.alias_table_path;
    if force || is_stale(table_path, &paths)? {
        let clusters = cluster_files(&files);
        AliasTable::write(table_path, &clusters)
            .with_context(|| format!("Failed to write {}", table_path.display()))?;
        println!("Wrote {} clusters to {}", clusters.len(), table_path.display());
    } else {
        println!("Up to date: {}", table_path.display());
    }

    let kind = ctx.settings.suppressed_kind;
    let kind_paths: Vec<PathBuf> = paths
        .iter()
        .filter(|p| {
            p.file_stem().and_then(|s| s.to_str()).is_some_and(|s| s.starts_with(kind.prefix()))
        })
        .cloned()
        .collect();
    let list_path = &layout.suppression_list_path;
    if force || is_stale(list_path, &kind_paths)? {
        let names = suppression_names(&files, kind);
        write_suppression_list(list_path, &names)
            .with_context(|| format!("Failed to write {}", list_path.display()))?;
        println!("Wrote {} {kind} names to {}", names.len(), list_path.display());
    } else {
        println!("Up to date: {}", list_path.display());
    }
    Ok(())
}

/// Print `name -> canonical` for each name using the alias table.
pub fn canonical_command(root: &str, names: &[String]) -> Result<()> {
    let ctx = load_context(root)?;
    let table_path = &ctx.layout.alias_table_path;
    if !table_path.exists() {
        return Err(anyhow!("Alias table not found at {}", table_path.display()));
    }
    let table = AliasTable::load(table_path)?;
    for name in names {
        println!("{name} -> {}", table.canonical(name).unwrap_or(name.as_str()));
    }
    Ok(())
}
