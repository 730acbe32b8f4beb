// src/resolver/wires.rs

//! Wire-map construction
//!
//! Once a consistent permutation is found, the chosen candidates are turned
//! into directed wires, everything in declared (unwrapped) form. Package
//! wires come first per resource, then bundle wires, then everything else.
//! Composite hosts additionally contribute one host wire per attached
//! fragment.

use crate::candidates::Candidates;
use crate::context::ResolveContext;
use crate::resource::{Requirement, Resource, Wire, namespace};

use super::WireMap;

pub(super) fn populate_wire_map(
    context: &dyn ResolveContext,
    resource: &Resource,
    wire_map: &mut WireMap,
    all_candidates: &Candidates,
) {
    let unwrapped = resource.declared_resource();
    if context.wirings().contains_key(&unwrapped) || wire_map.contains_key(&unwrapped) {
        return;
    }
    // Placeholder entry guards against dependency cycles while recursing.
    wire_map.insert(unwrapped.clone(), Vec::new());

    let mut package_wires: Vec<Wire> = Vec::new();
    let mut bundle_wires: Vec<Wire> = Vec::new();
    let mut capability_wires: Vec<Wire> = Vec::new();

    for requirement in resource.requirements() {
        let Some(candidates) = all_candidates.get_candidates(&requirement) else {
            continue;
        };
        let candidates: Vec<_> = candidates.to_vec();
        for candidate in candidates {
            let provider = candidate.resource();
            // Self-wires make no sense in the wiring namespaces; generic
            // namespaces may legitimately wire a resource to itself.
            let self_wire = candidate.namespace().starts_with(namespace::WIRING_PREFIX)
                && provider == *resource;
            if !self_wire {
                if !context.wirings().contains_key(&provider) {
                    populate_wire_map(context, &provider, wire_map, all_candidates);
                }
                let wire = Wire::new(
                    unwrapped.clone(),
                    requirement.declared(),
                    provider.declared_resource(),
                    candidate.declared(),
                );
                match requirement.namespace() {
                    namespace::PACKAGE => package_wires.push(wire),
                    namespace::BUNDLE => bundle_wires.push(wire),
                    _ => capability_wires.push(wire),
                }
            }
            if !requirement.is_multiple() {
                break;
            }
        }
    }

    package_wires.extend(bundle_wires);
    package_wires.extend(capability_wires);
    wire_map.insert(unwrapped.clone(), package_wires);

    // Each attached fragment gets a wire to its host.
    for fragment in resource.fragments() {
        let mut fragment_wires = wire_map.get(&fragment).cloned().unwrap_or_default();
        for requirement in fragment.requirements() {
            if requirement.namespace() != namespace::HOST {
                continue;
            }
            if let Some(host_capability) = unwrapped
                .capabilities()
                .into_iter()
                .find(|c| c.namespace() == namespace::HOST)
            {
                fragment_wires.push(Wire::new(
                    fragment.clone(),
                    requirement,
                    unwrapped.clone(),
                    host_capability,
                ));
            }
        }
        wire_map.insert(fragment, fragment_wires);
    }
}

/// The host's wire list for a dynamic resolve is exactly the one new wire;
/// any freshly pulled-in provider gets a full wire list of its own.
pub(super) fn populate_dynamic_wire_map(
    context: &dyn ResolveContext,
    host: &Resource,
    dynamic_requirement: &Requirement,
    wire_map: &mut WireMap,
    all_candidates: &Candidates,
) {
    let host = host.declared_resource();
    wire_map.insert(host.clone(), Vec::new());

    let Some(candidates) = all_candidates.get_candidates(dynamic_requirement) else {
        return;
    };
    let Some(candidate) = candidates.first().cloned() else {
        return;
    };

    let provider = candidate.resource();
    if !context.wirings().contains_key(&provider) {
        populate_wire_map(context, &provider, wire_map, all_candidates);
    }

    let wire = Wire::new(
        host.clone(),
        dynamic_requirement.declared(),
        provider.declared_resource(),
        candidate.declared(),
    );
    wire_map.insert(host, vec![wire]);
}
