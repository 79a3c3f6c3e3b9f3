//! The advance/decide algorithm over `IdentificationState`.
//!
//! Each call to [`IdentificationState::advance`] performs at most one trial on
//! the engine. The caller persists the state whenever the returned step is
//! dirty and calls again (usually from a fresh engine process) until `Done`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::identify::state::{IdentificationState, Resolution};
use crate::model::{CandidateSet, LibraryKind};
use crate::services::engine::{sanitize_count, TrialEngine, TrialError};

/// What an `advance` call did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "candidate", rename_all = "snake_case")]
pub enum Action {
    /// A standalone trial was run and recorded under `estimate`.
    ProbeEstimate(String),
    /// The current leader of a kind was trialed and recorded under `determine`.
    ProbeDetermine(String),
    /// Nothing left to probe for this candidate set.
    Done,
}

impl Action {
    pub fn is_done(&self) -> bool {
        matches!(self, Action::Done)
    }
}

/// Outcome of one `advance` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub action: Action,
    /// True when the state was mutated and must be persisted.
    pub dirty: bool,
}

/// Per-kind view of the accumulated counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindStanding {
    pub kind: LibraryKind,
    /// Best candidate by `determine` if the kind has any, else by `estimate`.
    pub best: Option<(String, u64)>,
    /// Highest `determine` value of the kind (0 when none).
    pub best_determine: u64,
    /// Leader among candidates of the kind lacking a `determine` entry.
    pub pending: Option<(String, u64)>,
}

impl KindStanding {
    /// No undetermined candidate can still beat the confirmed baseline.
    pub fn is_resolved(&self) -> bool {
        let pending = self.pending.as_ref().map_or(0, |(_, count)| *count);
        pending < self.best_determine.max(1)
    }

    /// Winner of a resolved kind; a best score below 1 is no match.
    pub fn winner(&self) -> Option<&str> {
        self.best.as_ref().filter(|(_, score)| *score >= 1).map(|(name, _)| name.as_str())
    }
}

/// Highest value in `entries`; ties go to the first (smallest) id.
fn leader<'a>(entries: impl Iterator<Item = (&'a str, u64)>) -> Option<(String, u64)> {
    let mut best: Option<(&str, u64)> = None;
    for (id, count) in entries {
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((id, count));
        }
    }
    best.map(|(id, count)| (id.to_string(), count))
}

impl IdentificationState {
    /// Run at most one trial and record it, or finalize the result.
    pub fn advance<E: TrialEngine + ?Sized>(
        &mut self,
        candidates: &CandidateSet,
        engine: &mut E,
    ) -> Result<Step, TrialError> {
        let mut dirty = self.reconcile(candidates);

        if let Some(candidate) = candidates.iter().find(|id| !self.estimate.contains_key(*id)) {
            let candidate = candidate.to_string();
            let count = probe(engine, &candidate)?;
            info!(candidate = %candidate, count, "recorded estimate");
            self.estimate.insert(candidate.clone(), count);
            return Ok(Step { action: Action::ProbeEstimate(candidate), dirty: true });
        }

        if self.result.is_none() {
            let standings = self.standings(candidates);
            for standing in standings.iter().filter(|s| !s.is_resolved()) {
                if let Some((candidate, estimate)) = &standing.pending {
                    if *estimate >= standing.best_determine {
                        let count = probe(engine, candidate)?;
                        info!(
                            kind = %standing.kind,
                            candidate = %candidate,
                            count,
                            "recorded determine"
                        );
                        self.determine.insert(candidate.clone(), count);
                        return Ok(Step {
                            action: Action::ProbeDetermine(candidate.clone()),
                            dirty: true,
                        });
                    }
                }
            }

            if standings.iter().all(KindStanding::is_resolved) {
                let resolution: Resolution = standings
                    .iter()
                    .map(|s| (s.kind, s.winner().map(str::to_string)))
                    .collect();
                info!(?resolution, "identification resolved");
                self.result = Some(resolution);
                dirty = true;
            }
        }

        Ok(Step { action: Action::Done, dirty })
    }

    /// Drop counts of candidates no longer available.
    ///
    /// Any purge, or any candidate still lacking an estimate, invalidates a
    /// previously computed result. Returns true if the state changed.
    pub fn reconcile(&mut self, candidates: &CandidateSet) -> bool {
        let before = self.estimate.len() + self.determine.len();
        self.estimate.retain(|id, _| candidates.contains(id));
        self.determine.retain(|id, _| candidates.contains(id));
        let purged = before != self.estimate.len() + self.determine.len();
        if purged {
            let removed = before - self.estimate.len() - self.determine.len();
            debug!(removed, "purged stale candidates");
        }
        let grown = candidates.iter().any(|id| !self.estimate.contains_key(id));
        let invalidated = (purged || grown) && self.result.take().is_some();
        purged || invalidated
    }

    /// Current standing of every library kind, in kind order.
    pub fn standings(&self, candidates: &CandidateSet) -> Vec<KindStanding> {
        LibraryKind::ALL.into_iter().map(|kind| self.standing(kind, candidates)).collect()
    }

    fn standing(&self, kind: LibraryKind, candidates: &CandidateSet) -> KindStanding {
        let determined: BTreeMap<&str, u64> = candidates
            .of_kind(kind)
            .filter_map(|id| self.determine.get(id).map(|count| (id, *count)))
            .collect();
        let undetermined = candidates
            .of_kind(kind)
            .filter(|id| !self.determine.contains_key(*id))
            .filter_map(|id| self.estimate.get(id).map(|count| (id, *count)));

        let best = if determined.is_empty() {
            leader(
                candidates.of_kind(kind).filter_map(|id| self.estimate.get(id).map(|c| (id, *c))),
            )
        } else {
            leader(determined.iter().map(|(id, count)| (*id, *count)))
        };
        let best_determine = determined.values().copied().max().unwrap_or(0);

        KindStanding { kind, best, best_determine, pending: leader(undetermined) }
    }
}

fn probe<E: TrialEngine + ?Sized>(engine: &mut E, candidate: &str) -> Result<u64, TrialError> {
    engine.clear_library_flags()?;
    let raw = engine.apply_candidate(candidate)?;
    Ok(sanitize_count(raw))
}
