// src/resolver/spaces.rs

//! Package-space calculation
//!
//! For each resource (resolved or tentative) this builds the four package
//! maps: exported, imported (direct wires), required (bundle requires with
//! reexport chains), and used (transitive `uses` closure). Resolved and
//! unresolved resources are handled identically by first flattening either
//! the existing wires or the current first-choice candidates into parallel
//! requirement/capability lists.

use indexmap::{IndexMap, IndexSet};

use crate::candidates::Candidates;
use crate::error::{Error, Result};
use crate::resource::{Capability, Requirement, Resource, namespace};

use super::ResolveSession;
use super::packages::{Blame, Packages, UsedBlames};

impl ResolveSession<'_> {
    /// Builds the package space of `resource` and, post-order, of every
    /// resource reachable through its chosen candidates. `cycle` bounds the
    /// traversal; `uses_cycle` bounds the uses-closure merging.
    pub(super) fn calculate_package_spaces(
        &mut self,
        resource: &Resource,
        all_candidates: &Candidates,
        pkg_map: &mut IndexMap<Resource, Packages>,
        uses_cycle: &mut IndexMap<Capability, Vec<Resource>>,
        cycle: &mut IndexSet<Resource>,
    ) -> Result<()> {
        if !cycle.insert(resource.clone()) {
            return Ok(());
        }
        if let Some(pkgs) = pkg_map.get_mut(resource) {
            if pkgs.calculated {
                return Ok(());
            }
            pkgs.calculated = true;
        }

        let context = self.context;
        let resolved = context.wirings().contains_key(resource);

        // Parallel requirement/capability lists so resolved and unresolved
        // resources flow through the same merging code.
        let mut reqs: Vec<Requirement> = Vec::new();
        let mut caps: Vec<Capability> = Vec::new();
        let mut dynamic_importing = false;
        if let Some(wiring) = context.wirings().get(resource) {
            for wire in &wiring.required_wires {
                // Re-home requirements contributed by fragments (and shared
                // dynamic requirements) onto the requiring resource, and
                // fragment capabilities onto the providing resource.
                let mut requirement = wire.requirement().clone();
                if requirement.resource() != *wire.requirer() || requirement.is_dynamic() {
                    requirement = Requirement::hosted(wire.requirer().clone(), &requirement);
                }
                let mut capability = wire.capability().clone();
                if capability.resource() != *wire.provider() {
                    capability = Capability::hosted(wire.provider().clone(), &capability);
                }
                reqs.push(requirement);
                caps.push(capability);
            }

            // A resolved resource may have a dynamic import underway; at most
            // one at a time. It goes last in the parallel lists, which the
            // already-has-access check below relies on.
            for requirement in wiring.dynamic_requirements() {
                let Some(cand_caps) = all_candidates.get_candidates(&requirement) else {
                    continue;
                };
                let Some(capability) = cand_caps.first() else {
                    continue;
                };
                reqs.push(requirement.clone());
                caps.push(capability.clone());
                dynamic_importing = true;
                break;
            }
        } else {
            for requirement in resource.requirements() {
                if requirement.is_dynamic() {
                    continue;
                }
                let Some(cand_caps) = all_candidates.get_candidates(&requirement) else {
                    continue;
                };
                if cand_caps.is_empty() {
                    continue;
                }
                if requirement.is_multiple() {
                    for capability in cand_caps {
                        reqs.push(requirement.clone());
                        caps.push(capability.clone());
                    }
                } else {
                    reqs.push(requirement.clone());
                    caps.push(cand_caps[0].clone());
                }
            }
        }

        self.calculate_exported_packages(resource, all_candidates, pkg_map);

        for (i, (requirement, capability)) in reqs.iter().zip(&caps).enumerate() {
            self.calculate_exported_packages(&capability.resource(), all_candidates, pkg_map);

            // The dynamic import being finalized must bring in a package the
            // resource cannot already see; anything else is a caller error.
            if dynamic_importing && i + 1 == reqs.len() {
                let package = capability
                    .namespace_attribute()
                    .unwrap_or_default()
                    .to_string();
                if let Some(pkgs) = pkg_map.get(resource) {
                    if pkgs.exported.contains_key(&package)
                        || pkgs.imported.contains_key(&package)
                        || pkgs.required.contains_key(&package)
                    {
                        return Err(Error::IllegalDynamicImport {
                            resource: resource.clone(),
                            package,
                        });
                    }
                }
            }

            self.merge_candidate_packages(
                resource,
                requirement,
                capability,
                pkg_map,
                all_candidates,
                &mut IndexMap::new(),
            );
        }

        for capability in &caps {
            self.calculate_package_spaces(
                &capability.resource(),
                all_candidates,
                pkg_map,
                uses_cycle,
                cycle,
            )?;
        }

        // Resolved resources have consistent package spaces by definition;
        // the uses closure is only needed for resources being checked, plus
        // a resolved resource taking on a new dynamic import.
        if !resolved || dynamic_importing {
            for (requirement, capability) in reqs.iter().zip(&caps) {
                if requirement.namespace() != namespace::BUNDLE
                    && requirement.namespace() != namespace::PACKAGE
                {
                    let blame_reqs = vec![requirement.clone()];
                    self.merge_uses(
                        resource,
                        capability,
                        &blame_reqs,
                        Some(capability),
                        pkg_map,
                        uses_cycle,
                    );
                }
            }

            let imported: Vec<Vec<Blame>> = pkg_map
                .get(resource)
                .map(|p| p.imported.values().cloned().collect())
                .unwrap_or_default();
            for blames in imported {
                for blame in blames {
                    if blame.capability.resource() == *resource {
                        continue;
                    }
                    let Some(root) = blame.root_requirement() else {
                        continue;
                    };
                    let blame_reqs = vec![root.clone()];
                    self.merge_uses(
                        resource,
                        &blame.capability,
                        &blame_reqs,
                        None,
                        pkg_map,
                        uses_cycle,
                    );
                }
            }

            let required: Vec<Vec<Blame>> = pkg_map
                .get(resource)
                .map(|p| p.required.values().cloned().collect())
                .unwrap_or_default();
            for blames in required {
                for blame in blames {
                    let Some(root) = blame.root_requirement() else {
                        continue;
                    };
                    let blame_reqs = vec![root.clone()];
                    self.merge_uses(
                        resource,
                        &blame.capability,
                        &blame_reqs,
                        None,
                        pkg_map,
                        uses_cycle,
                    );
                }
            }
        }

        Ok(())
    }

    /// Computes a resource's exported packages once: package capabilities
    /// minus substitutable exports (an unresolved resource importing a
    /// package it also exports defers to the import).
    pub(super) fn calculate_exported_packages(
        &mut self,
        resource: &Resource,
        all_candidates: &Candidates,
        pkg_map: &mut IndexMap<Resource, Packages>,
    ) {
        if pkg_map.contains_key(resource) {
            return;
        }
        let context = self.context;
        let mut packages = Packages::default();

        let capabilities = match context.wirings().get(resource) {
            Some(wiring) => wiring.capabilities.clone(),
            None => resource.capabilities(),
        };
        let mut exports: IndexMap<String, Capability> = IndexMap::new();
        for capability in capabilities {
            if capability.namespace() != namespace::PACKAGE {
                continue;
            }
            let capability = if capability.resource() != *resource {
                Capability::hosted(resource.clone(), &capability)
            } else {
                capability
            };
            let Some(package) = capability.namespace_attribute().map(str::to_string) else {
                continue;
            };
            exports.insert(package, capability);
        }

        if !exports.is_empty() && !context.wirings().contains_key(resource) {
            for requirement in resource.requirements() {
                if requirement.namespace() != namespace::PACKAGE {
                    continue;
                }
                let Some(candidates) = all_candidates.get_candidates(&requirement) else {
                    continue;
                };
                let Some(first) = candidates.first() else {
                    continue;
                };
                if let Some(package) = first.namespace_attribute() {
                    exports.shift_remove(package);
                }
            }
        }

        for (package, capability) in exports {
            packages
                .exported
                .insert(package, Blame::new(capability, None));
        }
        pkg_map.insert(resource.clone(), packages);
    }

    /// Merges one chosen candidate into the current resource's package
    /// space: package capabilities become imports; bundle capabilities pull
    /// in the provider's whole export map as requires, chasing reexported
    /// bundle requires transitively.
    fn merge_candidate_packages(
        &mut self,
        current: &Resource,
        current_req: &Requirement,
        cand_cap: &Capability,
        pkg_map: &mut IndexMap<Resource, Packages>,
        all_candidates: &Candidates,
        cycles: &mut IndexMap<Resource, Vec<Capability>>,
    ) {
        let cycle_caps = cycles.entry(current.clone()).or_default();
        if cycle_caps.contains(cand_cap) {
            return;
        }
        cycle_caps.push(cand_cap.clone());

        if cand_cap.namespace() == namespace::PACKAGE {
            merge_candidate_package(current, false, current_req, cand_cap, pkg_map);
        } else if cand_cap.namespace() == namespace::BUNDLE {
            let cand_resource = cand_cap.resource();
            self.calculate_exported_packages(&cand_resource, all_candidates, pkg_map);

            let exported: Vec<Blame> = pkg_map
                .get(&cand_resource)
                .map(|p| p.exported.values().cloned().collect())
                .unwrap_or_default();
            for blame in exported {
                merge_candidate_package(current, true, current_req, &blame.capability, pkg_map);
            }

            let context = self.context;
            if let Some(wiring) = context.wirings().get(&cand_resource) {
                for wire in &wiring.required_wires {
                    if wire.requirement().namespace() == namespace::BUNDLE
                        && wire.requirement().is_reexport()
                    {
                        self.merge_candidate_packages(
                            current,
                            current_req,
                            wire.capability(),
                            pkg_map,
                            all_candidates,
                            cycles,
                        );
                    }
                }
            } else {
                for requirement in cand_resource.requirements() {
                    if requirement.namespace() == namespace::BUNDLE && requirement.is_reexport() {
                        let Some(candidates) = all_candidates.get_candidates(&requirement) else {
                            continue;
                        };
                        let Some(first) = candidates.first().cloned() else {
                            continue;
                        };
                        self.merge_candidate_packages(
                            current,
                            current_req,
                            &first,
                            pkg_map,
                            all_candidates,
                            cycles,
                        );
                    }
                }
            }
        }

        cycles.shift_remove(current);
    }

    /// Adds every package a capability transitively `uses` to the current
    /// resource's used map, tracing each used package to its providing blame
    /// (exported first, then required, then imported) and recursing into the
    /// provider.
    pub(super) fn merge_uses(
        &mut self,
        current: &Resource,
        merge_cap: &Capability,
        blame_reqs: &[Requirement],
        matching_cap: Option<&Capability>,
        pkg_map: &mut IndexMap<Resource, Packages>,
        cycle_map: &mut IndexMap<Capability, Vec<Resource>>,
    ) {
        // A resource's own exports are folded in while its package space is
        // built; only foreign capabilities contribute uses constraints.
        if *current == merge_cap.resource() {
            return;
        }
        let visited = cycle_map.entry(merge_cap.clone()).or_default();
        if visited.contains(current) {
            return;
        }
        visited.push(current.clone());

        for source_cap in self.package_sources(merge_cap, pkg_map) {
            for used_package in source_cap.uses() {
                let source_resource = source_cap.resource();
                let source_blames: Vec<Blame> = {
                    let Some(source_pkgs) = pkg_map.get(&source_resource) else {
                        continue;
                    };
                    if let Some(exported) = source_pkgs.exported.get(used_package) {
                        vec![exported.clone()]
                    } else if let Some(required) = source_pkgs.required.get(used_package) {
                        required.clone()
                    } else if let Some(imported) = source_pkgs.imported.get(used_package) {
                        imported.clone()
                    } else {
                        continue;
                    }
                };

                for blame in source_blames {
                    let chain: Vec<Requirement> = match &blame.requirements {
                        Some(requirements) => {
                            // Only the tail requirement matters: it is the
                            // one wired to the blamed capability.
                            let mut chain = blame_reqs.to_vec();
                            if let Some(last) = requirements.last() {
                                chain.push(last.clone());
                            }
                            chain
                        }
                        None => blame_reqs.to_vec(),
                    };
                    add_used_blame(
                        pkg_map,
                        current,
                        used_package,
                        &blame.capability,
                        &chain,
                        matching_cap,
                    );
                    self.merge_uses(
                        current,
                        &blame.capability,
                        &chain,
                        matching_cap,
                        pkg_map,
                        cycle_map,
                    );
                }
            }
        }
    }

    /// The package sources of a capability: every same-named package
    /// capability reachable from its resource, including through required
    /// bundles. Non-package capabilities count as their own source when they
    /// carry a `uses` directive. Cached per capability for the duration of a
    /// permutation attempt.
    pub(super) fn package_sources(
        &mut self,
        capability: &Capability,
        pkg_map: &IndexMap<Resource, Packages>,
    ) -> Vec<Capability> {
        if capability.namespace() == namespace::PACKAGE {
            if let Some(sources) = self.package_sources_cache.get(capability) {
                return sources.clone();
            }
            let mut sources = Vec::new();
            let mut cycle = IndexSet::new();
            self.package_sources_internal(capability, pkg_map, &mut sources, &mut cycle);
            self.package_sources_cache
                .insert(capability.clone(), sources.clone());
            return sources;
        }

        if !capability.uses().is_empty() {
            vec![capability.clone()]
        } else {
            Vec::new()
        }
    }

    fn package_sources_internal(
        &self,
        capability: &Capability,
        pkg_map: &IndexMap<Resource, Packages>,
        sources: &mut Vec<Capability>,
        cycle: &mut IndexSet<Capability>,
    ) {
        if capability.namespace() != namespace::PACKAGE {
            return;
        }
        if !cycle.insert(capability.clone()) {
            return;
        }
        let Some(package) = capability.namespace_attribute().map(str::to_string) else {
            return;
        };
        let resource = capability.resource();
        let context = self.context;

        // A resource can export the same package more than once, so collect
        // every capability with the same package name.
        let capabilities = match context.wirings().get(&resource) {
            Some(wiring) => wiring.capabilities.clone(),
            None => resource.capabilities(),
        };
        for source_cap in capabilities {
            if source_cap.namespace() == namespace::PACKAGE
                && source_cap.namespace_attribute() == Some(package.as_str())
            {
                if source_cap.resource() != resource {
                    sources.push(Capability::hosted(resource.clone(), &source_cap));
                } else {
                    sources.push(source_cap);
                }
            }
        }

        if let Some(pkgs) = pkg_map.get(&resource) {
            if let Some(required) = pkgs.required.get(&package) {
                let required_caps: Vec<Capability> =
                    required.iter().map(|b| b.capability.clone()).collect();
                for required_cap in required_caps {
                    self.package_sources_internal(&required_cap, pkg_map, sources, cycle);
                }
            }
        }
    }

    /// Two capabilities are compatible when they are the same capability or
    /// when one's package-source set subsumes the other's.
    pub(super) fn is_compatible(
        &mut self,
        current: &Capability,
        candidate: &Capability,
        pkg_map: &IndexMap<Resource, Packages>,
    ) -> bool {
        if current == candidate {
            return true;
        }
        let current_sources = self.package_sources(current, pkg_map);
        let candidate_sources = self.package_sources(candidate, pkg_map);
        contains_all(&current_sources, &candidate_sources)
            || contains_all(&candidate_sources, &current_sources)
    }
}

fn contains_all(outer: &[Capability], inner: &[Capability]) -> bool {
    inner.iter().all(|capability| outer.contains(capability))
}

/// Records a package capability as imported (or required) by `current`,
/// blamed on the requirement that chose it.
fn merge_candidate_package(
    current: &Resource,
    requires: bool,
    current_req: &Requirement,
    cand_cap: &Capability,
    pkg_map: &mut IndexMap<Resource, Packages>,
) {
    if cand_cap.namespace() != namespace::PACKAGE {
        return;
    }
    let Some(package) = cand_cap.namespace_attribute().map(str::to_string) else {
        return;
    };
    let blame = Blame::new(cand_cap.clone(), Some(vec![current_req.clone()]));
    let Some(pkgs) = pkg_map.get_mut(current) else {
        return;
    };
    let target = if requires {
        &mut pkgs.required
    } else {
        &mut pkgs.imported
    };
    target.entry(package).or_default().push(blame);
}

/// Groups a used blame under the entry for its capability, creating the
/// group on first sight.
fn add_used_blame(
    pkg_map: &mut IndexMap<Resource, Packages>,
    current: &Resource,
    used_package: &str,
    used_cap: &Capability,
    chain: &[Requirement],
    matching_cap: Option<&Capability>,
) {
    let Some(pkgs) = pkg_map.get_mut(current) else {
        return;
    };
    let groups = pkgs.used.entry(used_package.to_string()).or_default();
    if !groups.iter().any(|group| group.capability == *used_cap) {
        groups.push(UsedBlames::new(used_cap.clone()));
    }
    if let Some(group) = groups.iter_mut().find(|group| group.capability == *used_cap) {
        group.add_blame(
            Blame::new(used_cap.clone(), Some(chain.to_vec())),
            matching_cap,
        );
    }
}
