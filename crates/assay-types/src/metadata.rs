//! Per-candidate bookkeeping for the discrete part of a search space.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::searchspace::SubspaceDiscrete;

/// Experimentation status of one discrete candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CandidateFlags {
    pub recommended: bool,
    pub measured: bool,
    pub excluded: bool,
}

/// Ledger keyed by the discrete subspace index.
///
/// Holds exactly one entry per discrete candidate from construction on.
/// Entries are never added or removed, only their flags change.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchSpaceMetadata {
    flags: BTreeMap<usize, CandidateFlags>,
}

impl SearchSpaceMetadata {
    /// Fresh ledger with exclusions seeded from the subspace defaults.
    pub fn from_discrete(discrete: &SubspaceDiscrete) -> Self {
        let flags = discrete
            .exp_rep()
            .index()
            .iter()
            .map(|&idx| {
                let entry = CandidateFlags {
                    excluded: discrete.is_excluded_by_default(idx),
                    ..CandidateFlags::default()
                };
                (idx, entry)
            })
            .collect();
        Self { flags }
    }

    pub fn get(&self, index: usize) -> Option<CandidateFlags> {
        self.flags.get(&index).copied()
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Returns `false` if `index` has no ledger entry.
    pub fn mark_recommended(&mut self, index: usize) -> bool {
        self.update(index, |f| f.recommended = true)
    }

    pub fn mark_measured(&mut self, index: usize) -> bool {
        self.update(index, |f| f.measured = true)
    }

    pub fn set_excluded(&mut self, index: usize, excluded: bool) -> bool {
        self.update(index, |f| f.excluded = excluded)
    }

    pub fn count_recommended(&self) -> usize {
        self.count(|f| f.recommended)
    }

    pub fn count_measured(&self) -> usize {
        self.count(|f| f.measured)
    }

    pub fn count_excluded(&self) -> usize {
        self.count(|f| f.excluded)
    }

    fn update<F: FnOnce(&mut CandidateFlags)>(&mut self, index: usize, apply: F) -> bool {
        match self.flags.get_mut(&index) {
            Some(entry) => {
                apply(entry);
                true
            }
            None => false,
        }
    }

    fn count<F: Fn(&CandidateFlags) -> bool>(&self, pred: F) -> usize {
        self.flags.values().filter(|f| pred(*f)).count()
    }
}
