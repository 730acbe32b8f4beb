// src/candidates/mod.rs

//! Candidate store and population engine
//!
//! [`Candidates`] owns the working state of one resolve attempt: the
//! requirement-to-candidates map, the capability-to-dependents reverse index,
//! the per-resource population cache, and fragment attachment bookkeeping.
//! Population walks each resource's requirements recursively, caching results
//! so repeated visits are no-ops and failures are recorded once and
//! re-surfaced without poisoning sibling branches. Mutual dependency cycles
//! terminate through a reentrancy counter: a reentrant visit drains the same
//! remaining-requirements work list instead of starting over, and only the
//! outermost frame publishes the local results into the global maps.
//!
//! `prepare` merges fragments into hosts (one version per symbolic name per
//! host), cascading removal of losing fragments through the reverse index.
//! Cloning the store yields a fully independent permutation for backtracking.

mod shadow;

use std::cmp::Reverse;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use semver::Version;
use tracing::trace;

use crate::context::ResolveContext;
use crate::error::{Error, Result};
use crate::resource::{Capability, Requirement, Resource, WrappedResource, namespace};

pub(crate) use shadow::CandidateList;

/// How hard to try resolving a resource during population.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResolutionKind {
    /// Must resolve; failure propagates.
    Mandatory,
    /// Attempt to resolve; failure is recorded and swallowed.
    Optional,
    /// Fragments only: resolve only if a candidate host is already populated.
    OnDemand,
}

/// Population state of one resource.
#[derive(Debug, Clone)]
enum PopulateState {
    /// Population failed; the error is re-surfaced on every later visit.
    Failed(Error),
    /// Population succeeded and the results are in the global maps.
    Resolved,
    /// Population is underway somewhere up the call stack.
    InProgress(InProgress),
}

#[derive(Debug, Clone)]
struct InProgress {
    /// Reentrant visits below the outermost frame; starts at -1 for
    /// on-demand fragments whose first frame re-enters a preseeded entry.
    cycle_count: i32,
    /// Candidates found so far, published globally only by the outermost
    /// frame.
    local_candidates: IndexMap<Requirement, Vec<Capability>>,
    /// Requirements still waiting for candidate lookup.
    remaining: VecDeque<Requirement>,
}

/// Host-capability to fragment bookkeeping: per host capability, fragment
/// symbolic name to version (descending) to the host requirements carrying
/// that fragment.
type HostFragments =
    IndexMap<Capability, IndexMap<String, BTreeMap<Reverse<Version>, Vec<Requirement>>>>;

/// The working candidate state of one resolve attempt.
#[derive(Debug, Clone)]
pub(crate) struct Candidates {
    /// Resources that must end up populated for the resolve to succeed.
    mandatory: IndexSet<Resource>,
    /// Reverse index: which requirements currently have this capability as a
    /// candidate. Kept in sync with `candidates` by every add/remove.
    dependents: IndexMap<Capability, IndexSet<Requirement>>,
    /// Requirement to ordered candidate capabilities.
    candidates: IndexMap<Requirement, CandidateList>,
    /// Declared host to synthesized composite, filled by `prepare`.
    wrapped_hosts: IndexMap<Resource, Resource>,
    /// Per-resource population cache.
    population: IndexMap<Resource, PopulateState>,
    /// Set once any host requirement shows up among the candidates.
    fragments_present: bool,
}

impl Candidates {
    pub fn new() -> Self {
        Candidates {
            mandatory: IndexSet::new(),
            dependents: IndexMap::new(),
            candidates: IndexMap::new(),
            wrapped_hosts: IndexMap::new(),
            population: IndexMap::new(),
            fragments_present: false,
        }
    }

    /// Populates candidates for `resource` according to the resolution kind.
    /// Idempotent: a resource already populated or already failed is left
    /// alone. Only `Mandatory` failures propagate.
    pub fn populate(
        &mut self,
        context: &dyn ResolveContext,
        resource: &Resource,
        kind: ResolutionKind,
    ) -> Result<()> {
        match self.population.get(resource) {
            Some(PopulateState::Failed(_)) | Some(PopulateState::Resolved) => return Ok(()),
            _ => {}
        }

        // Fragments are always worth attempting (their hosts may want them
        // on demand); anything else already resolved is left alone.
        let is_fragment = resource.is_fragment();
        if !is_fragment && context.wirings().contains_key(resource) {
            return Ok(());
        }

        let proceed = match kind {
            ResolutionKind::OnDemand => {
                is_fragment && self.populate_fragment_ondemand(context, resource)
            }
            _ => true,
        };
        if proceed {
            if kind == ResolutionKind::Mandatory {
                self.mandatory.insert(resource.clone());
            }
            match self.populate_resource(context, resource) {
                Err(err) if kind == ResolutionKind::Mandatory => return Err(err),
                _ => {}
            }
        }
        Ok(())
    }

    /// Recursive candidate discovery for one resource. Reentrant visits
    /// (cycles) bump the counter and keep draining the same work list; the
    /// outermost frame publishes the local candidates globally.
    fn populate_resource(
        &mut self,
        context: &dyn ResolveContext,
        resource: &Resource,
    ) -> Result<()> {
        match self.population.get_mut(resource) {
            Some(PopulateState::Failed(err)) => return Err(err.clone()),
            Some(PopulateState::Resolved) => return Ok(()),
            Some(PopulateState::InProgress(state)) => {
                state.cycle_count += 1;
            }
            None => {
                trace!(resource = %resource, "populating candidates");
                self.population.insert(
                    resource.clone(),
                    PopulateState::InProgress(InProgress {
                        cycle_count: 0,
                        local_candidates: IndexMap::new(),
                        remaining: resource.requirements().into(),
                    }),
                );
            }
        }

        loop {
            let requirement = match self.population.get_mut(resource) {
                Some(PopulateState::InProgress(state)) => match state.remaining.pop_front() {
                    Some(requirement) => requirement,
                    None => break,
                },
                Some(PopulateState::Failed(err)) => return Err(err.clone()),
                _ => break,
            };

            // Non-effective and dynamic requirements play no part here.
            if !context.is_effective(&requirement) || requirement.is_dynamic() {
                continue;
            }

            let mut candidates = context.find_providers(&requirement);
            let rethrow = self.process_candidates(context, resource, &mut candidates);

            // A deeper cycle frame may have failed this resource meanwhile.
            if let Some(PopulateState::Failed(err)) = self.population.get(resource) {
                return Err(err.clone());
            }

            if candidates.is_empty() && !requirement.is_optional() {
                let err = Error::MissingRequirement {
                    requirement,
                    cause: rethrow.map(Box::new),
                };
                self.population
                    .insert(resource.clone(), PopulateState::Failed(err.clone()));
                return Err(err);
            }
            if !candidates.is_empty() {
                if let Some(PopulateState::InProgress(state)) = self.population.get_mut(resource) {
                    state.local_candidates.insert(requirement, candidates);
                }
            }
        }

        match self.population.get_mut(resource) {
            Some(PopulateState::InProgress(state)) => {
                if state.cycle_count > 0 {
                    state.cycle_count -= 1;
                    return Ok(());
                }
                let local = std::mem::take(&mut state.local_candidates);
                self.population
                    .insert(resource.clone(), PopulateState::Resolved);
                for (requirement, candidates) in local {
                    self.add(requirement, candidates);
                }
                Ok(())
            }
            Some(PopulateState::Failed(err)) => Err(err.clone()),
            _ => Ok(()),
        }
    }

    /// On-demand fragments attach only to hosts that are already populated.
    /// Preseeds the population cache with the surviving host candidates and
    /// the rest of the fragment's requirements; returns false if no host
    /// qualifies, in which case the fragment is skipped entirely.
    fn populate_fragment_ondemand(
        &mut self,
        context: &dyn ResolveContext,
        resource: &Resource,
    ) -> bool {
        let mut remaining: VecDeque<Requirement> = resource.requirements().into();
        let host_index = remaining
            .iter()
            .position(|r| r.namespace() == namespace::HOST);
        let Some(host_index) = host_index else {
            return false;
        };
        let Some(host_requirement) = remaining.remove(host_index) else {
            return false;
        };

        let mut hosts = context.find_providers(&host_requirement);
        hosts.retain(|host| self.is_populated(&host.resource()));
        if hosts.is_empty() {
            return false;
        }

        let mut local_candidates = IndexMap::new();
        local_candidates.insert(host_requirement, hosts);
        // The populate that follows re-enters this entry and bumps the
        // counter to zero, making it the outermost frame.
        self.population.insert(
            resource.clone(),
            PopulateState::InProgress(InProgress {
                cycle_count: -1,
                local_candidates,
                remaining,
            }),
        );
        true
    }

    /// Seeds the store for a dynamic resolve: the single dynamic requirement
    /// with its externally matched candidates.
    pub fn populate_dynamic(
        &mut self,
        context: &dyn ResolveContext,
        host: &Resource,
        requirement: &Requirement,
        mut matches: Vec<Capability>,
    ) -> Result<()> {
        self.mandatory.insert(host.clone());
        let rethrow = self.process_candidates(context, host, &mut matches);
        if matches.is_empty() {
            return Err(rethrow.unwrap_or_else(|| Error::DynamicImportFailed {
                requirement: requirement.clone(),
            }));
        }
        self.add(requirement.clone(), matches);
        self.population
            .insert(host.clone(), PopulateState::Resolved);
        Ok(())
    }

    /// Common candidate processing: recursively populates each candidate's
    /// resource, dropping candidates that cannot resolve (remembering the
    /// first failure as the cause), and synthesizes hosted capabilities for
    /// fragments that are already attached to resolved hosts.
    fn process_candidates(
        &mut self,
        context: &dyn ResolveContext,
        resource: &Resource,
        candidates: &mut Vec<Capability>,
    ) -> Option<Error> {
        let mut rethrow: Option<Error> = None;
        let mut fragment_candidates: Vec<Capability> = Vec::new();

        let mut index = 0;
        while index < candidates.len() {
            let candidate = candidates[index].clone();
            let candidate_resource = candidate.resource();
            let is_fragment = candidate_resource.is_fragment();

            if is_fragment {
                fragment_candidates.push(candidate.clone());
            }

            // Fragments must always populate (they only work attached);
            // everything else only if unresolved. Skipping the trivial
            // self-edge avoids needless recursion and keeps failure chains
            // short.
            if (is_fragment || !context.wirings().contains_key(&candidate_resource))
                && candidate_resource != *resource
            {
                if let Err(err) = self.populate_resource(context, &candidate_resource) {
                    if rethrow.is_none() {
                        rethrow = Some(err);
                    }
                    candidates.remove(index);
                    continue;
                }
            }
            index += 1;
        }

        // A fragment already attached to resolved hosts contributes one
        // hosted capability per host; each host is a distinct provider.
        for fragment_candidate in fragment_candidates {
            if fragment_candidate.namespace() == namespace::IDENTITY {
                continue;
            }
            let fragment_resource = fragment_candidate.resource();
            let Some(wiring) = context.wirings().get(&fragment_resource) else {
                continue;
            };
            let host_wires: Vec<_> = wiring
                .required_wires
                .iter()
                .filter(|w| w.requirement().namespace() == namespace::HOST)
                .cloned()
                .collect();
            for wire in host_wires {
                let provider = wire.provider().clone();
                // A package capability may be a substitutable export the
                // host dropped; only hosts that actually carry it count.
                let carried = fragment_candidate.namespace() != namespace::PACKAGE
                    || context
                        .wirings()
                        .get(&provider)
                        .is_some_and(|w| w.capabilities.contains(&fragment_candidate));
                if carried {
                    if let Some(position) =
                        candidates.iter().position(|c| c == &fragment_candidate)
                    {
                        candidates.remove(position);
                    }
                    let hosted = Capability::hosted(provider, &fragment_candidate);
                    let at = context
                        .insert_hosted_capability(candidates, &hosted)
                        .min(candidates.len());
                    candidates.insert(at, hosted);
                }
            }
        }

        rethrow
    }

    pub fn is_populated(&self, resource: &Resource) -> bool {
        matches!(self.population.get(resource), Some(PopulateState::Resolved))
    }

    /// The failure recorded for a resource, if population failed.
    pub fn resolution_error(&self, resource: &Resource) -> Option<Error> {
        match self.population.get(resource) {
            Some(PopulateState::Failed(err)) => Some(err.clone()),
            _ => None,
        }
    }

    /// Records a requirement's candidates and indexes the reverse edges.
    fn add(&mut self, requirement: Requirement, candidates: Vec<Capability>) {
        if requirement.namespace() == namespace::HOST {
            self.fragments_present = true;
        }
        for capability in &candidates {
            self.dependents
                .entry(capability.clone())
                .or_default()
                .insert(requirement.clone());
        }
        self.candidates
            .insert(requirement, CandidateList::new(candidates));
    }

    /// The composite for a host that had fragments attached, or the resource
    /// itself.
    pub fn wrapped_host(&self, resource: &Resource) -> Resource {
        self.wrapped_hosts
            .get(resource)
            .cloned()
            .unwrap_or_else(|| resource.clone())
    }

    pub fn get_candidates(&self, requirement: &Requirement) -> Option<&[Capability]> {
        self.candidates.get(requirement).map(CandidateList::candidates)
    }

    pub fn first_candidate(&self, requirement: &Requirement) -> Option<Capability> {
        self.candidates
            .get(requirement)
            .and_then(|list| list.first().cloned())
    }

    pub fn candidate_count(&self, requirement: &Requirement) -> usize {
        self.candidates.get(requirement).map_or(0, CandidateList::len)
    }

    /// Drops the current first choice for a requirement, promoting the next
    /// candidate. Used on cloned permutations during backtracking.
    pub fn remove_first_candidate(&mut self, requirement: &Requirement) {
        if let Some(list) = self.candidates.get_mut(requirement) {
            list.remove_first();
        }
    }

    /// Removes a specific set of candidates from a multi-cardinality
    /// requirement; returns the remaining count, or `None` if the
    /// requirement has no candidates at all.
    pub fn remove_candidates(
        &mut self,
        requirement: &Requirement,
        capabilities: &IndexSet<Capability>,
    ) -> Option<usize> {
        let list = self.candidates.get_mut(requirement)?;
        list.remove_all(capabilities);
        Some(list.len())
    }

    /// Merges fragments into hosts. Selects the highest version per fragment
    /// symbolic name per host, removes losing fragments (cascading through
    /// the reverse index), synthesizes composite host resources, and reroutes
    /// candidate lists and dependents from fragment declarations to their
    /// hosted equivalents. Must be called exactly once, after population and
    /// before package-space calculation.
    pub fn prepare(&mut self, context: &dyn ResolveContext) -> Result<()> {
        let host_fragments = if self.fragments_present {
            self.host_fragments()
        } else {
            HostFragments::new()
        };

        let mut composites: Vec<Resource> = Vec::new();
        let mut unselected: Vec<Resource> = Vec::new();
        for (host_capability, fragments) in &host_fragments {
            let mut selected = Vec::new();
            for versions in fragments.values() {
                let mut first = true;
                for host_requirements in versions.values() {
                    for host_requirement in host_requirements {
                        // The first entry is the highest version of this
                        // symbolic name; everything after it loses this host.
                        if first {
                            selected.push(host_requirement.resource().inner().clone());
                            first = false;
                        } else {
                            if let Some(deps) = self.dependents.get_mut(host_capability) {
                                deps.shift_remove(host_requirement);
                            }
                            if let Some(hosts) = self.candidates.get_mut(host_requirement) {
                                hosts.remove(host_capability);
                                if hosts.is_empty() {
                                    unselected.push(host_requirement.resource());
                                }
                            }
                        }
                    }
                }
            }

            let composite = Resource::Wrapped(Arc::new(WrappedResource::new(
                host_capability.resource().inner().clone(),
                selected,
            )));
            composites.push(composite.clone());
            self.wrapped_hosts
                .insert(host_capability.resource(), composite);
        }

        // Other resources may depend on capabilities of losing fragments, so
        // their removal can cascade into fresh unresolved resources.
        for fragment in unselected {
            let err = Error::FragmentNotSelected {
                resource: fragment.clone(),
            };
            self.remove_resource(&fragment, err);
        }

        for composite in &composites {
            // Reroute dependents of every merged capability onto the hosted
            // equivalent. The original stays indexed: the same fragment
            // capability may be merged into several hosts, each needing its
            // own copy of the dependents.
            for capability in composite.capabilities() {
                if capability.namespace() == namespace::HOST {
                    continue;
                }
                let declared_capability = capability.declared();
                let Some(dependent_set) = self.dependents.get(&declared_capability).cloned()
                else {
                    continue;
                };
                self.dependents
                    .insert(capability.clone(), dependent_set.clone());
                for requirement in &dependent_set {
                    let Some(list) = self.candidates.get_mut(requirement) else {
                        continue;
                    };
                    list.ensure_shadow();
                    if capability.declaring_resource() != composite.declared_resource() {
                        // Fragment-contributed: the context decides where the
                        // synthesized capability ranks. Externally it points
                        // at the declared host; internally at the composite.
                        // A fragment merged into several hosts is only found
                        // on the first pass; later hosts just insert.
                        if let Some(at) = list.external_position(&declared_capability) {
                            list.remove_at(at);
                        }
                        let context_facing = Capability::hosted(
                            composite.declared_resource(),
                            &declared_capability,
                        );
                        let insert_at = context
                            .insert_hosted_capability(list.external(), &context_facing)
                            .min(list.external().len());
                        list.insert_at(insert_at, context_facing, capability.clone());
                    } else {
                        list.replace_internal(&declared_capability, capability.clone());
                    }
                }
            }

            // Candidates found for fragment requirements now belong to the
            // composite's re-homed requirements.
            for requirement in composite.requirements() {
                let declared_requirement = requirement.declared();
                let Some(list) = self.candidates.get(&declared_requirement) else {
                    continue;
                };
                let plain = list.to_plain();
                for candidate in plain.candidates() {
                    if let Some(deps) = self.dependents.get_mut(candidate) {
                        deps.shift_remove(&declared_requirement);
                        deps.insert(requirement.clone());
                    }
                }
                self.candidates.insert(requirement.clone(), plain);
            }
        }

        // Fragment selection may have knocked out a mandatory resource;
        // surface the originally recorded cause.
        let mandatory: Vec<Resource> = self.mandatory.iter().cloned().collect();
        for resource in mandatory {
            if !self.is_populated(&resource) {
                if let Some(err) = self.resolution_error(&resource) {
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    /// Groups candidate host capabilities by fragment symbolic name and
    /// version (descending).
    fn host_fragments(&self) -> HostFragments {
        let mut host_fragments = HostFragments::new();
        for (requirement, list) in &self.candidates {
            if requirement.namespace() != namespace::HOST {
                continue;
            }
            let fragment = requirement.resource();
            let name = fragment.symbolic_name().to_string();
            let version = fragment.version().clone();
            for capability in list.candidates() {
                host_fragments
                    .entry(capability.clone())
                    .or_default()
                    .entry(name.clone())
                    .or_default()
                    .entry(Reverse(version.clone()))
                    .or_default()
                    .push(requirement.clone());
            }
        }
        host_fragments
    }

    /// Removes a resource that lost selection, recording why, then removes
    /// every resource that became unresolvable as a consequence.
    fn remove_resource(&mut self, resource: &Resource, err: Error) {
        self.population
            .insert(resource.clone(), PopulateState::Failed(err));
        let mut unresolved: IndexSet<Resource> = IndexSet::new();
        self.remove(resource, &mut unresolved);
        loop {
            let Some(next) = unresolved.shift_remove_index(0) else {
                break;
            };
            self.remove(&next, &mut unresolved);
        }
    }

    fn remove(&mut self, resource: &Resource, unresolved: &mut IndexSet<Resource>) {
        for requirement in resource.requirements() {
            self.remove_requirement(&requirement);
        }
        for capability in resource.capabilities() {
            self.remove_capability(&capability, unresolved);
        }
    }

    fn remove_requirement(&mut self, requirement: &Requirement) {
        if let Some(list) = self.candidates.shift_remove(requirement) {
            for capability in list.candidates() {
                if let Some(deps) = self.dependents.get_mut(capability) {
                    deps.shift_remove(requirement);
                }
            }
        }
    }

    /// Removing a capability may empty another requirement's candidate list;
    /// non-optional requirements then fail their resource, which queues it
    /// for removal in turn.
    fn remove_capability(
        &mut self,
        capability: &Capability,
        unresolved: &mut IndexSet<Resource>,
    ) {
        let Some(dependent_set) = self.dependents.shift_remove(capability) else {
            return;
        };
        for requirement in dependent_set {
            let emptied = match self.candidates.get_mut(&requirement) {
                Some(list) => {
                    list.remove(capability);
                    list.is_empty()
                }
                None => continue,
            };
            if emptied {
                self.candidates.shift_remove(&requirement);
                if !requirement.is_optional() {
                    let cause = self
                        .resolution_error(&capability.resource())
                        .map(Box::new);
                    let err = Error::MissingRequirement {
                        requirement: requirement.clone(),
                        cause,
                    };
                    self.population
                        .insert(requirement.resource(), PopulateState::Failed(err));
                    unresolved.insert(requirement.resource());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::directive;

    struct TestContext {
        resources: Vec<Resource>,
        wirings: IndexMap<Resource, crate::resource::Wiring>,
    }

    impl TestContext {
        fn new(resources: Vec<Resource>) -> Self {
            TestContext {
                resources,
                wirings: IndexMap::new(),
            }
        }
    }

    impl ResolveContext for TestContext {
        fn mandatory_resources(&self) -> Vec<Resource> {
            Vec::new()
        }

        fn find_providers(&self, requirement: &Requirement) -> Vec<Capability> {
            let mut providers = Vec::new();
            for resource in &self.resources {
                for capability in resource.capabilities() {
                    if capability.namespace() == requirement.namespace()
                        && filter_matches(requirement.filter(), &capability)
                    {
                        providers.push(capability);
                    }
                }
            }
            providers
        }

        fn wirings(&self) -> &IndexMap<Resource, crate::resource::Wiring> {
            &self.wirings
        }
    }

    fn filter_matches(filter: Option<&str>, capability: &Capability) -> bool {
        let Some(filter) = filter else { return true };
        clauses(filter)
            .into_iter()
            .all(|(key, value)| capability.attribute(&key) == Some(value.as_str()))
    }

    fn clauses(filter: &str) -> Vec<(String, String)> {
        let inner = filter.strip_prefix("(&").and_then(|f| f.strip_suffix(')'));
        let body = inner.unwrap_or(filter);
        body.split(')')
            .filter_map(|clause| {
                let clause = clause.trim_start_matches('(');
                let (key, value) = clause.split_once('=')?;
                Some((key.to_string(), value.to_string()))
            })
            .collect()
    }

    fn exporter(name: &str, pkg: &str) -> Resource {
        Resource::builder(name, "1.0.0")
            .unwrap()
            .capability(namespace::PACKAGE)
            .attribute(namespace::PACKAGE, pkg)
            .done()
            .build()
    }

    fn importer(name: &str, pkgs: &[&str]) -> Resource {
        let mut builder = Resource::builder(name, "1.0.0").unwrap();
        for pkg in pkgs {
            builder = builder
                .requirement(namespace::PACKAGE)
                .directive(directive::FILTER, &format!("(wiring.package={pkg})"))
                .done();
        }
        builder.build()
    }

    #[test]
    fn test_populate_is_idempotent_and_caches_failures() {
        let app = importer("app", &["missing"]);
        let ctx = TestContext::new(vec![app.clone()]);
        let mut candidates = Candidates::new();

        let err = candidates
            .populate(&ctx, &app, ResolutionKind::Mandatory)
            .unwrap_err();
        assert!(matches!(err, Error::MissingRequirement { .. }));
        assert!(candidates.resolution_error(&app).is_some());

        // Repeated populate of a failed resource is a no-op, not a rethrow.
        assert!(candidates
            .populate(&ctx, &app, ResolutionKind::Mandatory)
            .is_ok());
    }

    #[test]
    fn test_optional_population_swallows_failure() {
        let app = importer("app", &["missing"]);
        let ctx = TestContext::new(vec![app.clone()]);
        let mut candidates = Candidates::new();

        assert!(candidates
            .populate(&ctx, &app, ResolutionKind::Optional)
            .is_ok());
        assert!(!candidates.is_populated(&app));
        assert!(candidates.resolution_error(&app).is_some());
    }

    #[test]
    fn test_optional_requirement_without_candidates_is_dropped() {
        let app = Resource::builder("app", "1.0.0")
            .unwrap()
            .requirement(namespace::PACKAGE)
            .directive(directive::FILTER, "(wiring.package=missing)")
            .directive(directive::RESOLUTION, directive::RESOLUTION_OPTIONAL)
            .done()
            .build();
        let ctx = TestContext::new(vec![app.clone()]);
        let mut candidates = Candidates::new();

        candidates
            .populate(&ctx, &app, ResolutionKind::Mandatory)
            .unwrap();
        assert!(candidates.is_populated(&app));
        assert_eq!(candidates.get_candidates(&app.requirements()[0]), None);
    }

    #[test]
    fn test_mutual_dependency_cycle_terminates() {
        let a = Resource::builder("a", "1.0.0")
            .unwrap()
            .capability(namespace::PACKAGE)
            .attribute(namespace::PACKAGE, "pa")
            .done()
            .requirement(namespace::PACKAGE)
            .directive(directive::FILTER, "(wiring.package=pb)")
            .done()
            .build();
        let b = Resource::builder("b", "1.0.0")
            .unwrap()
            .capability(namespace::PACKAGE)
            .attribute(namespace::PACKAGE, "pb")
            .done()
            .requirement(namespace::PACKAGE)
            .directive(directive::FILTER, "(wiring.package=pa)")
            .done()
            .build();
        let ctx = TestContext::new(vec![a.clone(), b.clone()]);
        let mut candidates = Candidates::new();

        candidates
            .populate(&ctx, &a, ResolutionKind::Mandatory)
            .unwrap();
        assert!(candidates.is_populated(&a));
        assert!(candidates.is_populated(&b));
        assert_eq!(candidates.candidate_count(&a.requirements()[0]), 1);
        assert_eq!(candidates.candidate_count(&b.requirements()[0]), 1);
    }

    #[test]
    fn test_clone_is_independent() {
        let provider_a = exporter("pa", "p");
        let provider_b = exporter("pb", "p");
        let app = importer("app", &["p"]);
        let ctx = TestContext::new(vec![provider_a, provider_b, app.clone()]);
        let mut candidates = Candidates::new();
        candidates
            .populate(&ctx, &app, ResolutionKind::Mandatory)
            .unwrap();

        let requirements = app.requirements();
        let requirement = &requirements[0];
        assert_eq!(candidates.candidate_count(requirement), 2);

        let mut permutation = candidates.clone();
        permutation.remove_first_candidate(requirement);
        assert_eq!(permutation.candidate_count(requirement), 1);
        assert_eq!(candidates.candidate_count(requirement), 2);
        assert_ne!(
            candidates.first_candidate(requirement),
            permutation.first_candidate(requirement)
        );
    }

    #[test]
    fn test_prepare_selects_highest_fragment_version() {
        let host = Resource::builder("host", "1.0.0")
            .unwrap()
            .capability(namespace::HOST)
            .attribute(namespace::HOST, "host")
            .done()
            .build();
        let fragment = |version: &str| {
            Resource::builder("frag", version)
                .unwrap()
                .requirement(namespace::HOST)
                .directive(directive::FILTER, "(wiring.host=host)")
                .done()
                .capability(namespace::PACKAGE)
                .attribute(namespace::PACKAGE, "fp")
                .done()
                .build()
        };
        let f1 = fragment("1.0.0");
        let f2 = fragment("2.0.0");
        let ctx = TestContext::new(vec![host.clone(), f1.clone(), f2.clone()]);

        let mut candidates = Candidates::new();
        candidates
            .populate(&ctx, &host, ResolutionKind::Mandatory)
            .unwrap();
        candidates
            .populate(&ctx, &f1, ResolutionKind::Optional)
            .unwrap();
        candidates
            .populate(&ctx, &f2, ResolutionKind::Optional)
            .unwrap();
        candidates.prepare(&ctx).unwrap();

        let composite = candidates.wrapped_host(&host);
        assert_ne!(composite, host);
        assert_eq!(composite.fragments(), vec![f2.clone()]);
        assert!(matches!(
            candidates.resolution_error(&f1),
            Some(Error::FragmentNotSelected { .. })
        ));
        // The winner keeps its host candidate list; the loser lost its host.
        assert_eq!(candidates.candidate_count(&f2.requirements()[0]), 1);
        assert_eq!(candidates.candidate_count(&f1.requirements()[0]), 0);
    }
}
