// src/resolver/packages.rs

//! Per-resource package spaces and blame chains
//!
//! A resource's package space is everything it can see: packages it exports,
//! packages it imports through direct wires, packages it reaches through
//! bundle requires (including reexport chains), and packages it is
//! transitively exposed to through `uses` directives. Every entry carries a
//! [`Blame`]: the capability plus the requirement chain that pulled it in,
//! which drives both conflict resolution and the diagnostics shown to users.

use indexmap::{IndexMap, IndexSet};

use crate::resource::{Capability, Requirement, Resource};

/// The package space of one resource. Rebuilt from scratch at the start of
/// every permutation attempt.
#[derive(Debug, Clone, Default)]
pub(crate) struct Packages {
    /// Package name to the capability exporting it (substitutable exports
    /// excluded). Exported blames carry no requirement chain.
    pub exported: IndexMap<String, Blame>,
    /// Package name to blames for each import of it.
    pub imported: IndexMap<String, Vec<Blame>>,
    /// Package name to blames reaching it through bundle requires.
    pub required: IndexMap<String, Vec<Blame>>,
    /// Package name to the used-capability groups exposed through `uses`
    /// directives.
    pub used: IndexMap<String, Vec<UsedBlames>>,
    /// Guards reentrant package-space calculation across root resources.
    pub calculated: bool,
}

/// A capability and the requirement chain that caused it to be pulled into a
/// package space. Exported packages have no chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Blame {
    pub capability: Capability,
    pub requirements: Option<Vec<Requirement>>,
}

impl Blame {
    pub fn new(capability: Capability, requirements: Option<Vec<Requirement>>) -> Self {
        Blame {
            capability,
            requirements,
        }
    }

    /// Head of the chain: the requirement on the resource being checked.
    pub fn root_requirement(&self) -> Option<&Requirement> {
        self.requirements.as_ref().and_then(|reqs| reqs.first())
    }
}

/// All blames that resolve to the same used capability, plus the root-cause
/// capabilities per multi-cardinality root requirement so a conflicting
/// subset can be pruned without discarding the whole candidate list. Only
/// root requirements can be multi-cardinality: uses chains below the root
/// always run through package capabilities.
#[derive(Debug, Clone)]
pub(crate) struct UsedBlames {
    pub capability: Capability,
    pub blames: Vec<Blame>,
    root_causes: IndexMap<Requirement, IndexSet<Capability>>,
}

impl UsedBlames {
    pub fn new(capability: Capability) -> Self {
        UsedBlames {
            capability,
            blames: Vec::new(),
            root_causes: IndexMap::new(),
        }
    }

    pub fn add_blame(&mut self, blame: Blame, matching_capability: Option<&Capability>) {
        if let Some(matching) = matching_capability {
            if let Some(root) = blame.root_requirement() {
                if root.is_multiple() {
                    self.root_causes
                        .entry(root.clone())
                        .or_default()
                        .insert(matching.clone());
                }
            }
        }
        self.blames.push(blame);
    }

    /// The capabilities that pulled this used capability in through the
    /// given multi-cardinality root requirement.
    pub fn root_causes(&self, requirement: &Requirement) -> IndexSet<Capability> {
        self.root_causes
            .get(requirement)
            .cloned()
            .unwrap_or_default()
    }
}

/// Renders a blame chain for conflict diagnostics, one hop per line pair.
pub(crate) fn render_blame(blame: &Blame) -> String {
    let chain = match &blame.requirements {
        Some(requirements) if !requirements.is_empty() => requirements,
        _ => return blame.capability.resource().to_string(),
    };
    let mut out = String::new();
    for requirement in chain {
        out.push_str(&format!("  {}\n", requirement.resource()));
        out.push_str(&format!(
            "    requires: {}\n",
            requirement.filter().unwrap_or(requirement.namespace())
        ));
        out.push_str("     |\n");
    }
    out.push_str(&format!(
        "    provides: {}={}\n",
        blame.capability.namespace(),
        blame.capability.namespace_attribute().unwrap_or("")
    ));
    out.push_str(&format!("  {}", blame.capability.resource()));
    out
}

/// Two blame chains exposed the resource to one package from different
/// providers.
pub(crate) fn chain_conflict_message(
    resource: &Resource,
    package: &str,
    first: &Blame,
    second: &Blame,
) -> String {
    format!(
        "Uses constraint violation. Unable to resolve {resource} because it is exposed to \
         package '{package}' from {} and {} via two dependency chains.\n\nChain 1:\n{}\n\nChain 2:\n{}",
        first.capability.resource(),
        second.capability.resource(),
        render_blame(first),
        render_blame(second),
    )
}

/// The resource exports a package it is also exposed to from elsewhere.
pub(crate) fn export_conflict_message(
    resource: &Resource,
    package: &str,
    used_blame: &Blame,
) -> String {
    format!(
        "Uses constraint violation. Unable to resolve {resource} because it exports \
         package '{package}' and is also exposed to it from {} via the following dependency \
         chain:\n\n{}",
        used_blame.capability.resource(),
        render_blame(used_blame),
    )
}
