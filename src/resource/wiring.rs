// src/resource/wiring.rs

//! Resolved wiring state
//!
//! A [`Wire`] is a resolved requirement-to-capability edge; the resolver
//! produces them and never reads them back. A [`Wiring`] is the pre-existing
//! resolved state of a resource, supplied by the resolve context for
//! incremental and dynamic resolves.

use std::fmt;

use super::{Capability, Requirement, Resource};

/// A resolved edge from a requirement to the capability satisfying it. All
/// parts are in declared (unwrapped) form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wire {
    requirer: Resource,
    requirement: Requirement,
    provider: Resource,
    capability: Capability,
}

impl Wire {
    pub(crate) fn new(
        requirer: Resource,
        requirement: Requirement,
        provider: Resource,
        capability: Capability,
    ) -> Self {
        Wire {
            requirer,
            requirement,
            provider,
            capability,
        }
    }

    pub fn requirer(&self) -> &Resource {
        &self.requirer
    }

    pub fn requirement(&self) -> &Requirement {
        &self.requirement
    }

    pub fn provider(&self) -> &Resource {
        &self.provider
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }
}

impl fmt::Display for Wire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({})",
            self.requirer, self.provider, self.capability
        )
    }
}

/// The resolved state of a resource as known to the caller: its effective
/// capabilities and requirements (including declared dynamic requirements)
/// and the wires satisfying its requirements.
#[derive(Debug, Clone, Default)]
pub struct Wiring {
    pub capabilities: Vec<Capability>,
    pub requirements: Vec<Requirement>,
    pub required_wires: Vec<Wire>,
}

impl Wiring {
    /// A wiring carrying the resource's declared capabilities and
    /// requirements and the given wires.
    pub fn of(resource: &Resource, required_wires: Vec<Wire>) -> Self {
        Wiring {
            capabilities: resource.capabilities(),
            requirements: resource.requirements(),
            required_wires,
        }
    }

    /// Requirements with `resolution:=dynamic`, in declaration order.
    pub fn dynamic_requirements(&self) -> Vec<Requirement> {
        self.requirements
            .iter()
            .filter(|r| r.is_dynamic())
            .cloned()
            .collect()
    }
}
