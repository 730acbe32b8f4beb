// src/context.rs

//! Resolve context collaborator
//!
//! The resolver is pure graph machinery; everything environment-specific
//! (which resources to resolve, which capabilities match a filter, which
//! resources are already resolved, candidate priority) comes from the caller
//! through this trait. One resolve invocation owns the context for its
//! duration; the resolver never mutates caller state.

use indexmap::IndexMap;

use crate::resource::{Capability, Requirement, Resource, Wiring};

/// Caller-supplied view of the resolve universe.
pub trait ResolveContext {
    /// Resources that must resolve; failure to resolve any of them fails the
    /// whole operation.
    fn mandatory_resources(&self) -> Vec<Resource>;

    /// Resources to resolve if possible; failures are silently dropped.
    fn optional_resources(&self) -> Vec<Resource> {
        Vec::new()
    }

    /// Capabilities matching the requirement's filter, highest priority
    /// first. The resolver keeps this order when picking candidates.
    fn find_providers(&self, requirement: &Requirement) -> Vec<Capability>;

    /// Already-resolved state, for incremental and dynamic resolves. A
    /// resource present here is treated as immutable: its wires are facts,
    /// not choices.
    fn wirings(&self) -> &IndexMap<Resource, Wiring>;

    /// Whether the requirement participates in this resolve at all.
    fn is_effective(&self, _requirement: &Requirement) -> bool {
        true
    }

    /// Position at which a synthesized hosted capability should be inserted
    /// into a candidate list, so the caller controls candidate priority for
    /// fragment-contributed capabilities. The default appends.
    fn insert_hosted_capability(
        &self,
        capabilities: &[Capability],
        _hosted: &Capability,
    ) -> usize {
        capabilities.len()
    }
}
