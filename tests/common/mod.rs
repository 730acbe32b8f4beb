// tests/common/mod.rs

//! Shared test fixtures: an in-memory resolve context with a minimal
//! attribute-equality filter matcher, plus builder shorthand for package
//! exporters and importers.

// Each integration test binary compiles its own copy; not all of them use
// every helper.
#![allow(dead_code)]

use indexmap::IndexMap;
use interlink::resource::ResourceBuilder;
use interlink::{Capability, Requirement, ResolveContext, Resource, WireMap, Wiring};
use interlink::{directive, namespace};

/// In-memory universe. Candidate priority follows registration order.
#[derive(Default)]
pub struct TestContext {
    pub universe: Vec<Resource>,
    pub mandatory: Vec<Resource>,
    pub optional: Vec<Resource>,
    pub wirings: IndexMap<Resource, Wiring>,
}

impl TestContext {
    pub fn new() -> Self {
        TestContext::default()
    }

    /// Adds a resource to the universe (a provider that resolves only when
    /// pulled in).
    pub fn register(&mut self, resource: &Resource) {
        self.universe.push(resource.clone());
    }

    /// Adds a resource to the universe and marks it mandatory.
    pub fn mandate(&mut self, resource: &Resource) {
        self.universe.push(resource.clone());
        self.mandatory.push(resource.clone());
    }

    /// Adds a resource to the universe and marks it optional.
    pub fn offer(&mut self, resource: &Resource) {
        self.universe.push(resource.clone());
        self.optional.push(resource.clone());
    }

    /// Installs the wires of a previous resolve as existing wirings.
    pub fn install(&mut self, wire_map: &WireMap) {
        for (resource, wires) in wire_map {
            self.wirings
                .insert(resource.clone(), Wiring::of(resource, wires.clone()));
        }
    }
}

impl ResolveContext for TestContext {
    fn mandatory_resources(&self) -> Vec<Resource> {
        self.mandatory.clone()
    }

    fn optional_resources(&self) -> Vec<Resource> {
        self.optional.clone()
    }

    fn find_providers(&self, requirement: &Requirement) -> Vec<Capability> {
        let mut providers = Vec::new();
        for resource in &self.universe {
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

    fn wirings(&self) -> &IndexMap<Resource, Wiring> {
        &self.wirings
    }
}

/// Matches `(key=value)` and `(&(k1=v1)(k2=v2))` filters against capability
/// attributes. No filter matches everything.
pub fn filter_matches(filter: Option<&str>, capability: &Capability) -> bool {
    let Some(filter) = filter else { return true };
    clauses(filter)
        .into_iter()
        .all(|(key, value)| capability.attribute(&key) == Some(value.as_str()))
}

fn clauses(filter: &str) -> Vec<(String, String)> {
    let body = filter
        .strip_prefix("(&")
        .and_then(|f| f.strip_suffix(')'))
        .unwrap_or(filter);
    body.split(')')
        .filter_map(|clause| {
            let clause = clause.trim_start_matches('(');
            let (key, value) = clause.split_once('=')?;
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Starts a resource builder, panicking on bad versions (test input is
/// always well-formed).
pub fn resource(name: &str, version: &str) -> ResourceBuilder {
    Resource::builder(name, version).unwrap()
}

/// Adds a package export with a `version` attribute and optional `uses`.
pub fn export_package(
    builder: ResourceBuilder,
    package: &str,
    version: &str,
    uses: &[&str],
) -> ResourceBuilder {
    let mut capability = builder
        .capability(namespace::PACKAGE)
        .attribute(namespace::PACKAGE, package)
        .attribute("version", version);
    if !uses.is_empty() {
        capability = capability.directive(directive::USES, &uses.join(","));
    }
    capability.done()
}

/// Adds a package import, optionally pinned to a `version` attribute value.
pub fn import_package(
    builder: ResourceBuilder,
    package: &str,
    version: Option<&str>,
) -> ResourceBuilder {
    let filter = match version {
        Some(version) => format!("(&({}={package})(version={version}))", namespace::PACKAGE),
        None => format!("({}={package})", namespace::PACKAGE),
    };
    builder
        .requirement(namespace::PACKAGE)
        .directive(directive::FILTER, &filter)
        .done()
}

/// A host resource exposing a host capability under the given name.
pub fn host(name: &str, version: &str) -> ResourceBuilder {
    resource(name, version)
        .capability(namespace::HOST)
        .attribute(namespace::HOST, name)
        .done()
}

/// Starts a fragment of the named host.
pub fn fragment_of(name: &str, version: &str, host_name: &str) -> ResourceBuilder {
    resource(name, version)
        .requirement(namespace::HOST)
        .directive(
            directive::FILTER,
            &format!("({}={host_name})", namespace::HOST),
        )
        .done()
}

/// The wires of one resource in the result, panicking if absent.
pub fn wires_of<'a>(wire_map: &'a WireMap, resource: &Resource) -> &'a [interlink::Wire] {
    wire_map
        .get(resource)
        .unwrap_or_else(|| panic!("no wires for {resource}"))
}
