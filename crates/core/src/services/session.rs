//! One-time preparation of an analysis session after identification.
//!
//! Once a binary's document holds a result, the session applies the chosen
//! signatures that the engine has not applied yet, then normalizes library
//! function names through the alias table and flags those functions as library
//! code.

use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::identify::IdentificationState;
use crate::patterns::AliasTable;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("analysis session error: {0}")]
    Engine(String),
}

/// A function known to the analysis engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionEntry {
    pub address: u64,
    pub name: String,
    pub is_library: bool,
}

/// Operations the session needs from an open analysis database.
pub trait SessionEngine {
    /// Names of signatures already applied to the database.
    fn applied_signatures(&self) -> Result<Vec<String>, SessionError>;
    fn apply_signature(&mut self, candidate: &str) -> Result<(), SessionError>;
    fn functions(&self) -> Result<Vec<FunctionEntry>, SessionError>;
    /// Address bound to `name`, if any.
    fn address_of(&self, name: &str) -> Result<Option<u64>, SessionError>;
    fn rename_function(&mut self, address: u64, name: &str) -> Result<(), SessionError>;
    fn mark_library(&mut self, address: u64) -> Result<(), SessionError>;
}

/// What [`AnalysisSession::initialize`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    pub applied: Vec<String>,
    pub renamed: usize,
    pub marked: usize,
}

/// Post-identification initializer, run at most once per session.
#[derive(Debug, Clone)]
pub struct AnalysisSession {
    initialized: bool,
    aliases: AliasTable,
}

impl AnalysisSession {
    pub fn new(aliases: AliasTable) -> Self {
        Self { initialized: false, aliases }
    }

    /// Apply the identified signatures and normalize names.
    ///
    /// Returns `None` when the session was already initialized. A failure leaves
    /// the session uninitialized so the call can be retried.
    pub fn initialize<E: SessionEngine + ?Sized>(
        &mut self,
        state: &IdentificationState,
        engine: &mut E,
    ) -> Result<Option<SessionReport>, SessionError> {
        if self.initialized {
            debug!("analysis session already initialized");
            return Ok(None);
        }
        let applied = apply_signatures(state, engine)?;
        let mut report = SessionReport { applied, ..Default::default() };
        self.normalize_names(engine, &mut report)?;
        self.initialized = true;
        info!(
            applied = report.applied.len(),
            renamed = report.renamed,
            marked = report.marked,
            "analysis session initialized"
        );
        Ok(Some(report))
    }

    fn normalize_names<E: SessionEngine + ?Sized>(
        &self,
        engine: &mut E,
        report: &mut SessionReport,
    ) -> Result<(), SessionError> {
        for function in engine.functions()? {
            let Some(canonical) = self.aliases.canonical(&function.name) else {
                continue;
            };
            if canonical != function.name && engine.address_of(canonical)?.is_none() {
                engine.rename_function(function.address, canonical)?;
                report.renamed += 1;
            }
            if !function.is_library {
                engine.mark_library(function.address)?;
                report.marked += 1;
            }
        }
        Ok(())
    }
}

/// Apply chosen candidates not yet applied, in name order.
fn apply_signatures<E: SessionEngine + ?Sized>(
    state: &IdentificationState,
    engine: &mut E,
) -> Result<Vec<String>, SessionError> {
    let mut pending: BTreeSet<&str> = state.chosen().into_iter().collect();
    for name in engine.applied_signatures()? {
        pending.remove(name.as_str());
    }
    let mut applied = Vec::new();
    for name in pending {
        engine.apply_signature(name)?;
        applied.push(name.to_string());
    }
    Ok(applied)
}
