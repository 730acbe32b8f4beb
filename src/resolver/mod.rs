// src/resolver/mod.rs

//! Resolver entry points and the backtracking retry loop
//!
//! One resolve invocation populates candidates for every requested resource,
//! merges fragments, and then loops: compute package spaces for the current
//! candidate permutation, check uses-constraint consistency, and on conflict
//! pull the next permutation from the queues (uses-permutations first). When
//! a consistent permutation is found the chosen candidates become the wire
//! map. When a conflict is pinned on an optionally resolved resource, that
//! resource is dropped and the whole populate/prepare/check cycle restarts.
//!
//! Explicitly not thread-safe: one invocation owns all of its state and runs
//! as plain synchronous recursion.

mod consistency;
mod packages;
mod spaces;
mod wires;

use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::candidates::{Candidates, ResolutionKind};
use crate::context::ResolveContext;
use crate::error::{Error, Result};
use crate::resource::{Capability, Requirement, Resource, Wire, namespace};

use packages::Packages;
use wires::{populate_dynamic_wire_map, populate_wire_map};

/// The resolver's output: for every newly resolved resource, the wires
/// satisfying its requirements.
pub type WireMap = IndexMap<Resource, Vec<Wire>>;

/// Mutable state of one resolve invocation.
pub(crate) struct ResolveSession<'a> {
    context: &'a dyn ResolveContext,
    /// Permutations created by backtracking uses chains; tried first.
    uses_permutations: VecDeque<Candidates>,
    /// Permutations backtracking plain candidate decisions.
    import_permutations: VecDeque<Candidates>,
    /// Accumulates in-place prunes of multi-cardinality candidates; when the
    /// current permutation checks out, this delta replaces it.
    multiple_card_candidates: Option<Candidates>,
    /// Package sources per capability, valid for one permutation attempt.
    package_sources_cache: IndexMap<Capability, Vec<Capability>>,
}

impl<'a> ResolveSession<'a> {
    fn new(context: &'a dyn ResolveContext) -> Self {
        ResolveSession {
            context,
            uses_permutations: VecDeque::new(),
            import_permutations: VecDeque::new(),
            multiple_card_candidates: None,
            package_sources_cache: IndexMap::new(),
        }
    }

    fn next_permutation(&mut self) -> Option<Candidates> {
        self.package_sources_cache.clear();
        self.multiple_card_candidates = None;
        self.uses_permutations
            .pop_front()
            .or_else(|| self.import_permutations.pop_front())
    }

    fn has_permutations(&self) -> bool {
        !self.uses_permutations.is_empty() || !self.import_permutations.is_empty()
    }
}

/// The resolver. Stateless between invocations; every `resolve` call owns
/// its working state exclusively.
#[derive(Debug, Default)]
pub struct Resolver;

impl Resolver {
    pub fn new() -> Self {
        Resolver
    }

    /// Resolves the context's mandatory and optional resources into a wire
    /// map. Returns an empty map when nothing needed resolving; fails with
    /// the precipitating requirement when a mandatory resource cannot be
    /// resolved consistently.
    pub fn resolve(&self, context: &dyn ResolveContext) -> Result<WireMap> {
        let mut wire_map = WireMap::new();

        let mut mandatory: Vec<Resource> = context.mandatory_resources();
        // Already-resolved non-fragments have nothing left to do.
        mandatory.retain(|r| r.is_fragment() || !context.wirings().contains_key(r));
        let mut optional: Vec<Resource> = context.optional_resources();

        loop {
            let mut session = ResolveSession::new(context);
            let mut all_candidates = Candidates::new();

            for resource in &mandatory {
                all_candidates.populate(context, resource, ResolutionKind::Mandatory)?;
            }
            for resource in &optional {
                if resource.is_fragment() || !context.wirings().contains_key(resource) {
                    let _ = all_candidates.populate(context, resource, ResolutionKind::Optional);
                }
            }

            all_candidates.prepare(context)?;

            let mut all_resources: Vec<Resource> = mandatory.clone();
            for resource in &optional {
                if all_candidates.is_populated(resource) {
                    all_resources.push(resource.clone());
                }
            }

            // A fragment root is verified through its host, so remember the
            // host requirement to look the host up per permutation.
            let host_requirements: IndexMap<Resource, Requirement> = all_resources
                .iter()
                .filter(|r| r.is_fragment())
                .filter_map(|r| {
                    r.requirements()
                        .into_iter()
                        .find(|q| q.namespace() == namespace::HOST)
                        .map(|q| (r.clone(), q))
                })
                .collect();

            session.uses_permutations.push_back(all_candidates);

            let mut pkg_map: IndexMap<Resource, Packages> = IndexMap::new();
            let mut rethrow: Option<Error> = None;
            let mut final_candidates: Option<Candidates> = None;

            loop {
                pkg_map.clear();
                let Some(current) = session.next_permutation() else {
                    break;
                };
                rethrow = None;

                let mut result_cache: IndexSet<Resource> = IndexSet::new();
                for resource in &all_resources {
                    let mut target = resource.clone();
                    if let Some(host_requirement) = host_requirements.get(resource) {
                        match current.first_candidate(host_requirement) {
                            Some(host_capability) => target = host_capability.resource(),
                            None => continue,
                        }
                    }
                    let target = current.wrapped_host(&target);

                    let mut uses_cycle = IndexMap::new();
                    let mut cycle = IndexSet::new();
                    session.calculate_package_spaces(
                        &target,
                        &current,
                        &mut pkg_map,
                        &mut uses_cycle,
                        &mut cycle,
                    )?;

                    if let Err(err) = session.check_package_space_consistency(
                        &target,
                        &current,
                        &pkg_map,
                        &mut result_cache,
                    ) {
                        rethrow = Some(err);
                    }
                }

                final_candidates = Some(current);
                if rethrow.is_none() || !session.has_permutations() {
                    break;
                }
            }

            match rethrow {
                Some(err) => {
                    // An optionally resolved resource (typically a fragment)
                    // may be to blame; drop it and start over.
                    let faulty = faulty_resource(&err);
                    match faulty.and_then(|f| optional.iter().position(|r| *r == f)) {
                        Some(position) => {
                            let dropped = optional.remove(position);
                            debug!(
                                resource = %dropped,
                                "dropping optional resource after unresolvable conflict"
                            );
                        }
                        None => return Err(err),
                    }
                }
                None => {
                    // Multi-cardinality pruning may have produced a cleaned
                    // delta of the winning permutation; prefer it.
                    let chosen = match session.multiple_card_candidates.take() {
                        Some(candidates) => candidates,
                        None => match final_candidates {
                            Some(candidates) => candidates,
                            None => return Ok(wire_map),
                        },
                    };
                    for resource in &all_resources {
                        let mut target = resource.clone();
                        if let Some(host_requirement) = host_requirements.get(resource) {
                            match chosen.first_candidate(host_requirement) {
                                Some(host_capability) => {
                                    target = host_capability.resource().declared_resource();
                                }
                                None => continue,
                            }
                        }
                        if chosen.is_populated(&target) {
                            populate_wire_map(
                                context,
                                &chosen.wrapped_host(&target),
                                &mut wire_map,
                                &chosen,
                            );
                        }
                    }
                    return Ok(wire_map);
                }
            }
        }
    }

    /// Resolves a single dynamic requirement for an already-resolved host.
    /// The matching capabilities come from the caller; the context is not
    /// asked to find providers for the dynamic requirement itself. Returns an
    /// empty map when the preconditions are not met.
    pub fn resolve_dynamic(
        &self,
        context: &dyn ResolveContext,
        host: &Resource,
        dynamic_requirement: &Requirement,
        matches: Vec<Capability>,
        ondemand_fragments: Vec<Resource>,
    ) -> Result<WireMap> {
        let mut wire_map = WireMap::new();
        if matches.is_empty() || !context.wirings().contains_key(host) {
            return Ok(wire_map);
        }
        for capability in &matches {
            if capability.namespace() != namespace::PACKAGE {
                return Err(Error::InvalidDynamicCandidate {
                    capability: capability.clone(),
                });
            }
        }

        let mut ondemand = ondemand_fragments;
        loop {
            let mut session = ResolveSession::new(context);
            let mut all_candidates = Candidates::new();
            all_candidates.populate_dynamic(context, host, dynamic_requirement, matches.clone())?;

            for resource in &ondemand {
                if resource.is_fragment() {
                    let _ = all_candidates.populate(context, resource, ResolutionKind::OnDemand);
                }
            }

            all_candidates.prepare(context)?;
            session.uses_permutations.push_back(all_candidates);

            let mut pkg_map: IndexMap<Resource, Packages> = IndexMap::new();
            let mut rethrow: Option<Error> = None;
            let mut final_candidates: Option<Candidates> = None;

            loop {
                pkg_map.clear();
                let Some(current) = session.next_permutation() else {
                    break;
                };
                rethrow = None;

                let target = current.wrapped_host(host);
                let mut uses_cycle = IndexMap::new();
                let mut cycle = IndexSet::new();
                session.calculate_package_spaces(
                    &target,
                    &current,
                    &mut pkg_map,
                    &mut uses_cycle,
                    &mut cycle,
                )?;

                let mut result_cache: IndexSet<Resource> = IndexSet::new();
                if let Err(err) = session.check_dynamic_package_space_consistency(
                    &target,
                    &current,
                    &pkg_map,
                    &mut result_cache,
                ) {
                    rethrow = Some(err);
                }

                final_candidates = Some(current);
                if rethrow.is_none() || !session.has_permutations() {
                    break;
                }
            }

            match rethrow {
                Some(err) => {
                    let faulty = faulty_resource(&err);
                    match faulty.and_then(|f| ondemand.iter().position(|r| *r == f)) {
                        Some(position) => {
                            let dropped = ondemand.remove(position);
                            debug!(
                                resource = %dropped,
                                "dropping on-demand fragment after unresolvable conflict"
                            );
                        }
                        None => return Err(err),
                    }
                }
                None => {
                    let chosen = match session.multiple_card_candidates.take() {
                        Some(candidates) => candidates,
                        None => match final_candidates {
                            Some(candidates) => candidates,
                            None => return Ok(wire_map),
                        },
                    };
                    populate_dynamic_wire_map(
                        context,
                        host,
                        dynamic_requirement,
                        &mut wire_map,
                        &chosen,
                    );
                    return Ok(wire_map);
                }
            }
        }
    }
}

/// The resource a failure is pinned on: the declaring resource of the first
/// unresolved requirement, which for a re-homed fragment requirement is the
/// fragment itself rather than the composite host.
fn faulty_resource(err: &Error) -> Option<Resource> {
    err.unresolved_requirements()
        .into_iter()
        .next()
        .map(|requirement| requirement.declared().resource())
}
