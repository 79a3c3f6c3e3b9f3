use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use libid_core::identify::{
    drive, engine_step, Action, CommandRelauncher, IdentificationState, Outcome, Resolution,
    RetryPolicy,
};
use libid_core::model::CandidateSet;
use libid_core::services::engine::CommandEngine;
use libid_core::services::triage::{triage_file, Triage};
use libid_core::store::ToolkitContext;
use serde::Serialize;
use tracing::{info, warn};

use crate::absolute_path;
use crate::commands::{load_context, modified_rfc3339, print_json, TriageFlags};

/// Per-binary status reported by `identify`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IdentifyStatus {
    /// The document already held a result.
    Cached { result: Resolution },
    /// Triage decided no identification is needed.
    Skipped { reason: String },
    Resolved { result: Resolution, relaunches: usize },
    Stalled { relaunches: usize },
    Exhausted { relaunches: usize },
    /// The binary could not be processed; later binaries are still attempted.
    Failed { error: String },
}

impl IdentifyStatus {
    fn is_complete(&self) -> bool {
        !matches!(
            self,
            IdentifyStatus::Stalled { .. }
                | IdentifyStatus::Exhausted { .. }
                | IdentifyStatus::Failed { .. }
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IdentifyReport {
    pub binary: PathBuf,
    pub document: PathBuf,
    #[serde(flatten)]
    pub status: IdentifyStatus,
}

/// Relaunch command used when the settings do not configure one: this very
/// executable running a single `step`.
fn default_relaunch_command() -> Result<Vec<String>> {
    let exe = env::current_exe().context("Failed to locate the libid executable")?;
    Ok(vec![
        exe.display().to_string(),
        "step".to_string(),
        "--root".to_string(),
        "{root}".to_string(),
        "--cpu".to_string(),
        "{cpu}".to_string(),
        "{binary}".to_string(),
    ])
}

fn identify_one(
    ctx: &ToolkitContext,
    binary: &Path,
    force: bool,
    flags: TriageFlags,
) -> Result<IdentifyStatus> {
    let document = ctx.document_path(binary);
    if force && document.exists() {
        fs::remove_file(&document)
            .with_context(|| format!("Failed to remove {}", document.display()))?;
    }
    if let Some(state) = IdentificationState::load_existing(&document)? {
        if let Some(result) = state.result {
            return Ok(IdentifyStatus::Cached { result });
        }
    }

    let policy = flags.apply(ctx.settings.triage.clone());
    let verdict = triage_file(binary, &policy)
        .with_context(|| format!("Failed to read binary {}", binary.display()))?;
    let (attributes, cpu) = match &verdict {
        Triage::Identify { attributes, cpu: Some(cpu), .. } => (*attributes, cpu.clone()),
        Triage::Identify { attributes, cpu: None, .. } => {
            warn!(
                binary = %binary.display(),
                machine = attributes.machine,
                "no signature namespace for machine"
            );
            IdentificationState::skipped().save(&document)?;
            return Ok(IdentifyStatus::Skipped { reason: "no_signature_namespace".to_string() });
        }
        Triage::Skip { reason, .. } => {
            info!(binary = %binary.display(), ?reason, "identification not needed");
            IdentificationState::skipped().save(&document)?;
            return Ok(IdentifyStatus::Skipped { reason: reason.to_string() });
        }
    };

    let command = match &ctx.settings.engine.relaunch_command {
        Some(command) => command.clone(),
        None => default_relaunch_command()?,
    };
    let mut relauncher = CommandRelauncher::new(command)
        .with_var("cpu", cpu)
        .with_var("bits", attributes.bits.to_string())
        .with_var("root", ctx.layout.root.display().to_string());
    let policy = RetryPolicy { max_relaunches: ctx.settings.engine.max_relaunches };

    Ok(match drive(binary, &document, &mut relauncher, policy)? {
        Outcome::Resolved { state, relaunches } => {
            IdentifyStatus::Resolved { result: state.result.unwrap_or_default(), relaunches }
        }
        Outcome::Stalled { relaunches } => IdentifyStatus::Stalled { relaunches },
        Outcome::Exhausted { relaunches } => IdentifyStatus::Exhausted { relaunches },
    })
}

fn describe(result: &Resolution) -> String {
    if result.is_empty() {
        return "(none)".to_string();
    }
    result
        .iter()
        .map(|(kind, chosen)| format!("{kind}={}", chosen.as_deref().unwrap_or("-")))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Identify each binary, relaunching the engine as needed.
pub fn identify_command(
    root: &str,
    paths: &[String],
    force: bool,
    flags: TriageFlags,
    json: bool,
) -> Result<()> {
    let ctx = load_context(root)?;
    let mut reports = Vec::new();
    for path in paths {
        let binary = absolute_path(path)?;
        let outcome = if binary.is_file() {
            identify_one(&ctx, &binary, force, flags)
        } else {
            Err(anyhow!("Binary file does not exist: {}", binary.display()))
        };
        let status = outcome.unwrap_or_else(|err| {
            let error = format!("{err:#}");
            warn!(binary = %binary.display(), %error, "identification failed");
            IdentifyStatus::Failed { error }
        });
        reports.push(IdentifyReport { document: ctx.document_path(&binary), binary, status });
    }

    if json {
        print_json(&reports)?;
    } else {
        for report in &reports {
            let line = match &report.status {
                IdentifyStatus::Cached { result } => format!("cached {}", describe(result)),
                IdentifyStatus::Skipped { reason } => format!("skipped ({reason})"),
                IdentifyStatus::Resolved { result, relaunches } => {
                    format!("identified {} after {relaunches} relaunches", describe(result))
                }
                IdentifyStatus::Stalled { relaunches } => {
                    format!("stalled after {relaunches} relaunches")
                }
                IdentifyStatus::Exhausted { relaunches } => {
                    format!("gave up after {relaunches} relaunches")
                }
                IdentifyStatus::Failed { error } => format!("failed: {error}"),
            };
            println!("{}: {line}", report.binary.display());
        }
    }

    let incomplete = reports.iter().filter(|r| !r.status.is_complete()).count();
    if incomplete > 0 {
        return Err(anyhow!("Identification incomplete for {incomplete} binaries"));
    }
    Ok(())
}

/// Run one engine-side identification step for `binary`.
pub fn step_command(root: &str, cpu: &str, binary: &str, json: bool) -> Result<()> {
    let ctx = load_context(root)?;
    let binary = absolute_path(binary)?;
    let document = ctx.document_path(&binary);
    let signature_dir = ctx.layout.signature_cpu_dir(cpu);
    let candidates = CandidateSet::from_store(&signature_dir)
        .with_context(|| format!("Failed to list signatures in {}", signature_dir.display()))?;
    let mut engine =
        CommandEngine::new(ctx.settings.engine.trial_command.clone(), &binary, &signature_dir);

    let step = engine_step(&document, &candidates, &mut engine)
        .with_context(|| format!("Identification step failed for {}", binary.display()))?;

    if json {
        print_json(&step.action)?;
    } else {
        match &step.action {
            Action::ProbeEstimate(candidate) => println!("estimate {candidate}"),
            Action::ProbeDetermine(candidate) => println!("determine {candidate}"),
            Action::Done => println!("done"),
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct ShowReport<'a> {
    document: &'a Path,
    updated: Option<String>,
    state: &'a IdentificationState,
}

/// Show the identification document of `binary`.
pub fn show_command(root: &str, binary: &str, json: bool) -> Result<()> {
    let ctx = load_context(root)?;
    let binary = absolute_path(binary)?;
    let document = ctx.document_path(&binary);
    let state = IdentificationState::load_existing(&document)?
        .ok_or_else(|| anyhow!("No identification document at {}", document.display()))?;
    let updated = modified_rfc3339(&document);

    if json {
        return print_json(&ShowReport { document: &document, updated, state: &state });
    }

    println!("Document: {}", document.display());
    if let Some(updated) = updated {
        println!("Updated: {updated}");
    }
    println!("Estimates: {}", state.estimate.len());
    for (candidate, count) in &state.estimate {
        let determine = state.determine.get(candidate).map(|d| format!(" (determine {d})"));
        println!("  - {candidate}: {count}{}", determine.unwrap_or_default());
    }
    match &state.result {
        Some(result) => println!("Result: {}", describe(result)),
        None => println!("Result: pending"),
    }
    Ok(())
}
