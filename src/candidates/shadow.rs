// src/candidates/shadow.rs

//! Candidate lists with an optional shadowed external view
//!
//! A candidate list starts as a single ordered sequence. The first time
//! fragment merging injects a synthesized hosted capability, the list splits
//! into two aligned sequences: the external view keeps declaration-level
//! capabilities so the resolve context can be asked for insertion positions,
//! while the internal view holds the composite-host capabilities the resolver
//! works with. Invariant: both views have the same length and index `i` in
//! each refers to the same logical candidate.

use indexmap::IndexSet;

use crate::resource::Capability;

#[derive(Debug, Clone)]
pub(crate) enum CandidateList {
    Plain(Vec<Capability>),
    Shadow {
        external: Vec<Capability>,
        internal: Vec<Capability>,
    },
}

impl CandidateList {
    pub fn new(candidates: Vec<Capability>) -> Self {
        CandidateList::Plain(candidates)
    }

    /// The resolver-facing candidate sequence.
    pub fn candidates(&self) -> &[Capability] {
        match self {
            CandidateList::Plain(list) => list,
            CandidateList::Shadow { internal, .. } => internal,
        }
    }

    pub fn len(&self) -> usize {
        self.candidates().len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates().is_empty()
    }

    pub fn first(&self) -> Option<&Capability> {
        self.candidates().first()
    }

    /// Drops the current first choice, promoting the next candidate.
    pub fn remove_first(&mut self) {
        let list = self.internal_mut();
        if !list.is_empty() {
            list.remove(0);
        }
    }

    /// Removes one candidate from the resolver-facing sequence.
    pub fn remove(&mut self, capability: &Capability) {
        let list = self.internal_mut();
        if let Some(position) = list.iter().position(|c| c == capability) {
            list.remove(position);
        }
    }

    /// Removes every listed candidate from the resolver-facing sequence.
    pub fn remove_all(&mut self, capabilities: &IndexSet<Capability>) {
        self.internal_mut().retain(|c| !capabilities.contains(c));
    }

    /// Splits into aligned external/internal views; no-op if already split.
    pub fn ensure_shadow(&mut self) {
        if let CandidateList::Plain(list) = self {
            let external = list.clone();
            let internal = std::mem::take(list);
            *self = CandidateList::Shadow { external, internal };
        }
    }

    /// A plain copy of the resolver-facing sequence.
    pub fn to_plain(&self) -> CandidateList {
        CandidateList::Plain(self.candidates().to_vec())
    }

    pub fn external(&self) -> &[Capability] {
        match self {
            CandidateList::Plain(list) => list,
            CandidateList::Shadow { external, .. } => external,
        }
    }

    pub fn external_position(&self, capability: &Capability) -> Option<usize> {
        self.external().iter().position(|c| c == capability)
    }

    /// Removes index `at` from both views.
    pub fn remove_at(&mut self, at: usize) {
        match self {
            CandidateList::Plain(list) => {
                if at < list.len() {
                    list.remove(at);
                }
            }
            CandidateList::Shadow { external, internal } => {
                if at < external.len() {
                    external.remove(at);
                }
                if at < internal.len() {
                    internal.remove(at);
                }
            }
        }
    }

    /// Inserts the aligned pair (external view gets `external_cap`, internal
    /// view gets `internal_cap`) at the same index.
    pub fn insert_at(&mut self, at: usize, external_cap: Capability, internal_cap: Capability) {
        match self {
            CandidateList::Plain(list) => {
                let at = at.min(list.len());
                list.insert(at, internal_cap);
            }
            CandidateList::Shadow { external, internal } => {
                let eat = at.min(external.len());
                external.insert(eat, external_cap);
                let iat = at.min(internal.len());
                internal.insert(iat, internal_cap);
            }
        }
    }

    /// Replaces a candidate in the resolver-facing sequence only; the
    /// external view keeps the original declaration.
    pub fn replace_internal(&mut self, old: &Capability, new: Capability) {
        let list = self.internal_mut();
        if let Some(position) = list.iter().position(|c| c == old) {
            list[position] = new;
        }
    }

    fn internal_mut(&mut self) -> &mut Vec<Capability> {
        match self {
            CandidateList::Plain(list) => list,
            CandidateList::Shadow { internal, .. } => internal,
        }
    }
}
