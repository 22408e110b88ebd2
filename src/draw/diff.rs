//! Eligibility diffing between consecutive accepted snapshots.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::{ParticipantId, Snapshot};

/// Participants who lost eligibility between two accepted snapshots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EliminationDelta {
    /// Ordered as in the previous snapshot's participant list.
    pub eliminated_ids: Vec<ParticipantId>,
    pub digit_index: usize,
    pub digit_value: char,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RevealedDigit {
    pub index: usize,
    pub value: char,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffOutcome {
    /// Newly known positions, oldest first.
    pub revealed: Vec<RevealedDigit>,
    pub delta: Option<EliminationDelta>,
    /// Eligible after this diff, in snapshot order.
    pub survivors: Vec<ParticipantId>,
    /// Ids the server reports eligible again without a reset.
    pub reappeared: Vec<ParticipantId>,
}

#[derive(Debug, Default)]
pub struct DiffEngine {
    previous_eligible: Vec<ParticipantId>,
    previous_revealed: String,
}

impl DiffEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous_eligible(&self) -> &[ParticipantId] {
        &self.previous_eligible
    }

    pub fn previous_revealed(&self) -> &str {
        &self.previous_revealed
    }

    /// Takes the snapshot as the new baseline without producing a delta.
    pub fn rebaseline(&mut self, snapshot: &Snapshot) {
        self.previous_eligible = snapshot.eligible_ids();
        self.previous_revealed = snapshot.session.revealed_digits.clone();
    }

    pub fn clear(&mut self) {
        self.previous_eligible.clear();
        self.previous_revealed.clear();
    }

    /// Eliminations published for digits that are already on screen.
    ///
    /// Only applies when `snapshot` reveals exactly the baseline digits; the
    /// delta is tagged with the last of them.
    pub fn reconcile(&mut self, snapshot: &Snapshot) -> Option<DiffOutcome> {
        let revealed = &snapshot.session.revealed_digits;
        if *revealed != self.previous_revealed {
            return None;
        }
        let (index, value) = revealed.chars().enumerate().last()?;
        let (eliminated, survivors, reappeared) = self.eligibility(snapshot);
        if eliminated.is_empty() {
            return None;
        }

        self.previous_eligible = survivors.clone();
        Some(DiffOutcome {
            revealed: Vec::new(),
            delta: Some(EliminationDelta {
                eliminated_ids: eliminated,
                digit_index: index,
                digit_value: value,
            }),
            survivors,
            reappeared,
        })
    }

    /// Eliminated, surviving and reappearing ids relative to the baseline.
    fn eligibility(
        &self,
        snapshot: &Snapshot,
    ) -> (Vec<ParticipantId>, Vec<ParticipantId>, Vec<ParticipantId>) {
        let current: BTreeSet<ParticipantId> = snapshot.eligible_set();
        let previous: BTreeSet<ParticipantId> = self.previous_eligible.iter().copied().collect();

        let eliminated: Vec<ParticipantId> = self
            .previous_eligible
            .iter()
            .copied()
            .filter(|id| !current.contains(id))
            .collect();
        let reappeared: Vec<ParticipantId> = snapshot
            .eligible_ids()
            .into_iter()
            .filter(|id| !previous.contains(id))
            .collect();

        // Eligibility only shrinks within a drawing; reappearing ids stay out.
        let survivors: Vec<ParticipantId> = snapshot
            .eligible_ids()
            .into_iter()
            .filter(|id| previous.contains(id))
            .collect();

        (eliminated, survivors, reappeared)
    }

    /// Diffs `snapshot` against the baseline.
    ///
    /// Returns `None` unless the revealed digits grew since the last accepted
    /// snapshot; repeated identical polls never reach the eligibility diff.
    pub fn diff(&mut self, snapshot: &Snapshot) -> Option<DiffOutcome> {
        let revealed = &snapshot.session.revealed_digits;
        if revealed.len() <= self.previous_revealed.len()
            || !revealed.starts_with(self.previous_revealed.as_str())
        {
            return None;
        }

        let start = self.previous_revealed.chars().count();
        let newly: Vec<RevealedDigit> = revealed
            .chars()
            .enumerate()
            .skip(start)
            .map(|(index, value)| RevealedDigit { index, value })
            .collect();

        let (eliminated, survivors, reappeared) = self.eligibility(snapshot);

        let delta = match newly.last() {
            Some(last) if !eliminated.is_empty() => Some(EliminationDelta {
                eliminated_ids: eliminated,
                digit_index: last.index,
                digit_value: last.value,
            }),
            _ => None,
        };

        self.previous_eligible = survivors.clone();
        self.previous_revealed = revealed.clone();

        Some(DiffOutcome {
            revealed: newly,
            delta,
            survivors,
            reappeared,
        })
    }
}
