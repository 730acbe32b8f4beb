// src/resolver/consistency.rs

//! Uses-constraint consistency checking and backtracking
//!
//! Walks the package-space graph looking for uses-constraint violations. A
//! conflict either prunes the offending candidates in place (multi-cardinality
//! roots) or clones the whole candidate map into a permutation with one
//! candidate dropped, queued for retry. Uses-permutations carry more signal
//! than plain import backtracking, so the retry loop drains them first.

use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::candidates::Candidates;
use crate::error::{Error, Result};
use crate::resource::{Requirement, Resource};

use super::ResolveSession;
use super::packages::{
    Blame, Packages, UsedBlames, chain_conflict_message, export_conflict_message,
};

impl ResolveSession<'_> {
    /// Checks `resource` and, transitively, every first-choice candidate it
    /// depends on. Resources that already have a wiring are consistent by
    /// definition and skipped.
    pub(super) fn check_package_space_consistency(
        &mut self,
        resource: &Resource,
        all_candidates: &Candidates,
        pkg_map: &IndexMap<Resource, Packages>,
        result_cache: &mut IndexSet<Resource>,
    ) -> Result<()> {
        if self.context.wirings().contains_key(resource) {
            return Ok(());
        }
        self.check_dynamic_package_space_consistency(
            resource,
            all_candidates,
            pkg_map,
            result_cache,
        )
    }

    /// The dynamic entry point re-checks a resolved resource taking on a new
    /// import, so it skips the resolved shortcut above.
    pub(super) fn check_dynamic_package_space_consistency(
        &mut self,
        resource: &Resource,
        all_candidates: &Candidates,
        pkg_map: &IndexMap<Resource, Packages>,
        result_cache: &mut IndexSet<Resource>,
    ) -> Result<()> {
        if result_cache.contains(resource) {
            return Ok(());
        }
        let Some(pkgs) = pkg_map.get(resource) else {
            return Ok(());
        };

        // Fragment merging can leave one package imported from two different
        // providers, which no candidate choice can repair from here: enqueue
        // backtracks for both chains and fail this permutation.
        for (package, blames) in &pkgs.imported {
            if blames.len() < 2 {
                continue;
            }
            let source_blame = &blames[0];
            for blame in &blames[1..] {
                if blame.capability.resource() == source_blame.capability.resource() {
                    continue;
                }
                if let Some(requirement) = blame.root_requirement() {
                    permutate(all_candidates, requirement, &mut self.import_permutations);
                }
                if let Some(requirement) = source_blame.root_requirement() {
                    permutate(all_candidates, requirement, &mut self.import_permutations);
                }
                let err = Error::UsesConflict {
                    message: chain_conflict_message(resource, package, source_blame, blame),
                    requirement: blame.root_requirement().cloned(),
                };
                debug!(
                    "Candidate permutation failed due to a conflict with a fragment import; \
                     will try another if possible: {err}"
                );
                return Err(err);
            }
        }

        let mut permutation: Option<Candidates> = None;
        let mut mutated: IndexSet<Requirement> = IndexSet::new();
        let mut rethrow: Option<Error> = None;

        // Exported packages must agree with every capability the resource is
        // transitively exposed to for the same package name.
        for (package, export_blame) in &pkgs.exported {
            let Some(used_groups) = pkgs.used.get(package) else {
                continue;
            };
            for used_blames in used_groups {
                if self.is_compatible(&export_blame.capability, &used_blames.capability, pkg_map) {
                    continue;
                }
                for used_blame in &used_blames.blames {
                    if self.check_multiple(used_blames, used_blame, all_candidates) {
                        continue;
                    }
                    let permutation =
                        permutation.get_or_insert_with(|| all_candidates.clone());
                    if rethrow.is_none() {
                        rethrow = Some(Error::UsesConflict {
                            message: export_conflict_message(resource, package, used_blame),
                            requirement: None,
                        });
                    }
                    mutate_blame_chain(permutation, used_blame, &mut mutated);
                }
            }
            if let Some(err) = rethrow.take() {
                if !mutated.is_empty() {
                    if let Some(permutation) = permutation.take() {
                        self.uses_permutations.push_back(permutation);
                    }
                }
                debug!(
                    "Candidate permutation failed due to a conflict between an export and \
                     import; will try another if possible: {err}"
                );
                return Err(err);
            }
        }

        // Imported and required packages combined (imports shadow requires
        // for the same name) must likewise agree with the used closure.
        let mut import_require: IndexMap<String, Vec<Blame>> = pkgs.required.clone();
        for (package, blames) in &pkgs.imported {
            import_require.insert(package.clone(), blames.clone());
        }

        for (package, blames) in &import_require {
            for requirement_blame in blames {
                let Some(used_groups) = pkgs.used.get(package) else {
                    continue;
                };
                for used_blames in used_groups {
                    if self.is_compatible(
                        &requirement_blame.capability,
                        &used_blames.capability,
                        pkg_map,
                    ) {
                        continue;
                    }
                    for used_blame in &used_blames.blames {
                        if self.check_multiple(used_blames, used_blame, all_candidates) {
                            continue;
                        }
                        let permutation =
                            permutation.get_or_insert_with(|| all_candidates.clone());
                        if rethrow.is_none() {
                            rethrow = Some(Error::UsesConflict {
                                message: chain_conflict_message(
                                    resource,
                                    package,
                                    requirement_blame,
                                    used_blame,
                                ),
                                requirement: None,
                            });
                        }
                        mutate_blame_chain(permutation, used_blame, &mut mutated);
                    }
                }

                if let Some(err) = rethrow.take() {
                    if !mutated.is_empty() {
                        if let Some(permutation) = permutation.take() {
                            self.uses_permutations.push_back(permutation);
                        }
                    }
                    // Backtrack on the original import decision too, in case
                    // no viable candidate exists for the uses chain; dedup so
                    // repeated violations don't pile up identical permutations.
                    if let Some(requirement) = requirement_blame.root_requirement() {
                        if !mutated.contains(requirement) {
                            permutate_if_needed(
                                all_candidates,
                                requirement,
                                &mut self.import_permutations,
                            );
                        }
                    }
                    debug!(
                        "Candidate permutation failed due to a conflict between imports; \
                         will try another if possible: {err}"
                    );
                    return Err(err);
                }
            }
        }

        result_cache.insert(resource.clone());

        // Descend into every first-choice candidate. If a descendant fails
        // without creating any new permutation, escalate by backtracking the
        // requirement that led there.
        let permutation_count = self.uses_permutations.len() + self.import_permutations.len();
        for requirement in resource.requirements() {
            let Some(candidates) = all_candidates.get_candidates(&requirement) else {
                continue;
            };
            let Some(capability) = candidates.first().cloned() else {
                continue;
            };
            let provider = capability.resource();
            if provider == *resource {
                continue;
            }
            if let Err(err) =
                self.check_package_space_consistency(&provider, all_candidates, pkg_map, result_cache)
            {
                if permutation_count
                    == self.uses_permutations.len() + self.import_permutations.len()
                {
                    permutate(all_candidates, &requirement, &mut self.import_permutations);
                }
                return Err(err);
            }
        }

        Ok(())
    }

    /// For a multi-cardinality root requirement, prunes just the candidates
    /// that pulled in the conflicting used capability, accumulating the
    /// result in the session-level consistent permutation. Succeeds when at
    /// least one candidate survives.
    fn check_multiple(
        &mut self,
        used_blames: &UsedBlames,
        used_blame: &Blame,
        all_candidates: &Candidates,
    ) -> bool {
        let Some(requirement) = used_blame.root_requirement() else {
            return false;
        };
        if !requirement.is_multiple() {
            return false;
        }
        if self.multiple_card_candidates.is_none() {
            self.multiple_card_candidates = Some(all_candidates.clone());
        }
        let root_causes = used_blames.root_causes(requirement);
        match self.multiple_card_candidates.as_mut() {
            Some(candidates) => match candidates.remove_candidates(requirement, &root_causes) {
                Some(remaining) => remaining > 0,
                None => false,
            },
            None => false,
        }
    }
}

/// Walks a conflicting blame chain tail-to-head and drops the first choice
/// of the innermost requirement that still has alternatives. Requirements
/// already mutated this pass stop the walk so one permutation changes each
/// decision at most once.
fn mutate_blame_chain(
    permutation: &mut Candidates,
    used_blame: &Blame,
    mutated: &mut IndexSet<Requirement>,
) {
    let Some(chain) = used_blame.requirements.as_ref() else {
        return;
    };
    for requirement in chain.iter().rev() {
        if requirement.is_multiple() {
            continue;
        }
        if mutated.contains(requirement) {
            break;
        }
        if permutation.candidate_count(requirement) > 1 {
            mutated.insert(requirement.clone());
            permutation.remove_first_candidate(requirement);
            break;
        }
    }
}

/// Queues a permutation with the requirement's first choice dropped, if it
/// has an alternative to fall back to.
pub(super) fn permutate(
    all_candidates: &Candidates,
    requirement: &Requirement,
    permutations: &mut VecDeque<Candidates>,
) {
    if requirement.is_multiple() {
        return;
    }
    if all_candidates.candidate_count(requirement) > 1 {
        let mut permutation = all_candidates.clone();
        permutation.remove_first_candidate(requirement);
        permutations.push_back(permutation);
    }
}

/// Like [`permutate`], but skips requirements some queued permutation has
/// already backtracked (detected by a differing first candidate).
fn permutate_if_needed(
    all_candidates: &Candidates,
    requirement: &Requirement,
    permutations: &mut VecDeque<Candidates>,
) {
    if all_candidates.candidate_count(requirement) > 1 {
        let current_first = all_candidates.first_candidate(requirement);
        let already_permutated = permutations
            .iter()
            .any(|permutation| permutation.first_candidate(requirement) != current_first);
        if !already_permutated {
            permutate(all_candidates, requirement, permutations);
        }
    }
}
