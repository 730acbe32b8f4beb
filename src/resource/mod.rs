// src/resource/mod.rs

//! Immutable resource data model
//!
//! Resources own capabilities (facts they provide) and requirements (filters
//! they need satisfied). All three are created once through
//! [`ResourceBuilder`], shared via `Arc`, and never mutated afterwards; the
//! resolver only wraps them. Handle equality is pointer identity of the
//! backing resource, so two resources built from identical metadata are still
//! distinct nodes in the graph.
//!
//! A capability or requirement handle is `(resource, index)` into the owning
//! resource's declaration list, which gives cheap clones and back-references
//! without reference cycles. The `Hosted` variants re-home a declaration onto
//! another resource: fragment merging produces composite hosts whose merged
//! capability and requirement lists all point back at the composite.

mod wiring;
mod wrapped;

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use semver::Version;

use crate::error::{Error, Result};

pub use wiring::{Wire, Wiring};
pub use wrapped::WrappedResource;

/// Capability and requirement namespaces.
///
/// Namespaces under `wiring.` participate in wiring semantics: self-wires are
/// suppressed for them, and `package`/`bundle`/`host` each get dedicated
/// treatment during package-space calculation and fragment merging.
pub mod namespace {
    /// Package export/import. The attribute keyed by this namespace holds the
    /// package name.
    pub const PACKAGE: &str = "wiring.package";
    /// Whole-resource require with optional reexport visibility.
    pub const BUNDLE: &str = "wiring.bundle";
    /// Fragment attachment point.
    pub const HOST: &str = "wiring.host";
    /// Resource identity; never merged onto hosts.
    pub const IDENTITY: &str = "identity";

    /// Namespaces with wiring semantics share this prefix.
    pub const WIRING_PREFIX: &str = "wiring.";
}

/// Directive names and well-known directive values.
pub mod directive {
    /// Filter expression a requirement matches against capability attributes.
    pub const FILTER: &str = "filter";
    /// Resolution kind of a requirement: absent (mandatory), `optional`, or
    /// `dynamic`.
    pub const RESOLUTION: &str = "resolution";
    /// Candidate cardinality of a requirement: absent (single) or `multiple`.
    pub const CARDINALITY: &str = "cardinality";
    /// Visibility of a bundle requirement: absent (private) or `reexport`.
    pub const VISIBILITY: &str = "visibility";
    /// Comma-separated package names a capability transitively exposes.
    pub const USES: &str = "uses";

    pub const RESOLUTION_OPTIONAL: &str = "optional";
    pub const RESOLUTION_DYNAMIC: &str = "dynamic";
    pub const CARDINALITY_MULTIPLE: &str = "multiple";
    pub const VISIBILITY_REEXPORT: &str = "reexport";
}

/// Backing data of a declared resource.
#[derive(Debug)]
pub struct ResourceInner {
    symbolic_name: String,
    version: Version,
    capabilities: Vec<CapabilityData>,
    requirements: Vec<RequirementData>,
}

/// A declared capability: namespace plus attribute and directive maps.
#[derive(Debug, Clone, Default)]
pub struct CapabilityData {
    namespace: String,
    attributes: BTreeMap<String, String>,
    directives: BTreeMap<String, String>,
}

impl CapabilityData {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn directive(&self, name: &str) -> Option<&str> {
        self.directives.get(name).map(String::as_str)
    }

    /// Package names listed in the `uses` directive.
    pub fn uses(&self) -> Vec<&str> {
        match self.directive(directive::USES) {
            Some(value) => value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect(),
            None => Vec::new(),
        }
    }
}

/// A declared requirement: namespace plus directive map; the matching filter
/// lives in the `filter` directive and is evaluated by the resolve context.
#[derive(Debug, Clone, Default)]
pub struct RequirementData {
    namespace: String,
    directives: BTreeMap<String, String>,
}

impl RequirementData {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn directive(&self, name: &str) -> Option<&str> {
        self.directives.get(name).map(String::as_str)
    }
}

/// Handle to a resource: either a declared node or a composite synthesized by
/// fragment merging. Cheap to clone; equality is pointer identity.
#[derive(Clone)]
pub enum Resource {
    Declared(Arc<ResourceInner>),
    Wrapped(Arc<WrappedResource>),
}

impl Resource {
    /// Start building a declared resource.
    pub fn builder(symbolic_name: &str, version: &str) -> Result<ResourceBuilder> {
        let version = Version::parse(version).map_err(|e| Error::InvalidVersion {
            value: version.to_string(),
            reason: e.to_string(),
        })?;
        Ok(ResourceBuilder {
            symbolic_name: symbolic_name.to_string(),
            version,
            capabilities: Vec::new(),
            requirements: Vec::new(),
        })
    }

    pub fn symbolic_name(&self) -> &str {
        match self {
            Resource::Declared(inner) => &inner.symbolic_name,
            Resource::Wrapped(w) => &w.host().symbolic_name,
        }
    }

    pub fn version(&self) -> &Version {
        match self {
            Resource::Declared(inner) => &inner.version,
            Resource::Wrapped(w) => &w.host().version,
        }
    }

    /// A fragment declares a host requirement and never resolves standalone.
    pub fn is_fragment(&self) -> bool {
        match self {
            Resource::Declared(inner) => inner
                .requirements
                .iter()
                .any(|r| r.namespace == namespace::HOST),
            Resource::Wrapped(_) => false,
        }
    }

    /// All capabilities of this resource. For a composite host this is the
    /// host's own capabilities plus every attached fragment's capabilities
    /// (except identity), each re-homed onto the composite.
    pub fn capabilities(&self) -> Vec<Capability> {
        match self {
            Resource::Declared(inner) => (0..inner.capabilities.len())
                .map(|index| Capability::Declared {
                    resource: inner.clone(),
                    index,
                })
                .collect(),
            Resource::Wrapped(w) => w.capabilities(self),
        }
    }

    /// All requirements of this resource. For a composite host this is the
    /// host's own requirements plus every attached fragment's requirements
    /// (except host attachment), each re-homed onto the composite.
    pub fn requirements(&self) -> Vec<Requirement> {
        match self {
            Resource::Declared(inner) => (0..inner.requirements.len())
                .map(|index| Requirement::Declared {
                    resource: inner.clone(),
                    index,
                })
                .collect(),
            Resource::Wrapped(w) => w.requirements(self),
        }
    }

    /// The underlying declared resource: the host for a composite, the
    /// resource itself otherwise.
    pub fn declared_resource(&self) -> Resource {
        match self {
            Resource::Declared(_) => self.clone(),
            Resource::Wrapped(w) => Resource::Declared(w.host().clone()),
        }
    }

    /// Fragments attached to a composite host; empty for declared resources.
    pub fn fragments(&self) -> Vec<Resource> {
        match self {
            Resource::Declared(_) => Vec::new(),
            Resource::Wrapped(w) => w.fragments().iter().cloned().map(Resource::Declared).collect(),
        }
    }

    pub(crate) fn inner(&self) -> &Arc<ResourceInner> {
        match self {
            Resource::Declared(inner) => inner,
            Resource::Wrapped(w) => w.host(),
        }
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Resource::Declared(a), Resource::Declared(b)) => Arc::ptr_eq(a, b),
            (Resource::Wrapped(a), Resource::Wrapped(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Resource {}

impl Hash for Resource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Resource::Declared(a) => {
                state.write_u8(0);
                state.write_usize(Arc::as_ptr(a) as usize);
            }
            Resource::Wrapped(a) => {
                state.write_u8(1);
                state.write_usize(Arc::as_ptr(a) as usize);
            }
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.symbolic_name(), self.version())
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Declared(_) => write!(f, "Resource({self})"),
            Resource::Wrapped(_) => write!(f, "WrappedResource({self})"),
        }
    }
}

/// Handle to a capability. `Hosted` re-homes a declaration onto another
/// resource (a composite host, or a declared host for context-facing
/// synthesized capabilities). Equality is structural over the owner and the
/// declaration, so re-deriving the same hosted capability compares equal.
#[derive(Clone)]
pub enum Capability {
    Declared {
        resource: Arc<ResourceInner>,
        index: usize,
    },
    Hosted {
        owner: Resource,
        resource: Arc<ResourceInner>,
        index: usize,
    },
}

impl Capability {
    pub(crate) fn hosted(owner: Resource, declared: &Capability) -> Capability {
        let (resource, index) = declared.declaration();
        Capability::Hosted {
            owner,
            resource: resource.clone(),
            index,
        }
    }

    pub fn data(&self) -> &CapabilityData {
        let (resource, index) = self.declaration();
        &resource.capabilities[index]
    }

    pub fn namespace(&self) -> &str {
        self.data().namespace()
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.data().attribute(name)
    }

    /// The attribute keyed by the capability's own namespace, e.g. the
    /// package name of a package capability.
    pub fn namespace_attribute(&self) -> Option<&str> {
        self.data().attribute(self.namespace())
    }

    pub fn uses(&self) -> Vec<&str> {
        self.data().uses()
    }

    /// The resource this capability belongs to; the composite host for a
    /// hosted capability.
    pub fn resource(&self) -> Resource {
        match self {
            Capability::Declared { resource, .. } => Resource::Declared(resource.clone()),
            Capability::Hosted { owner, .. } => owner.clone(),
        }
    }

    /// The capability as originally declared, unwrapping any hosting.
    pub fn declared(&self) -> Capability {
        let (resource, index) = self.declaration();
        Capability::Declared {
            resource: resource.clone(),
            index,
        }
    }

    /// The resource that originally declared this capability.
    pub fn declaring_resource(&self) -> Resource {
        let (resource, _) = self.declaration();
        Resource::Declared(resource.clone())
    }

    fn declaration(&self) -> (&Arc<ResourceInner>, usize) {
        match self {
            Capability::Declared { resource, index }
            | Capability::Hosted {
                resource, index, ..
            } => (resource, *index),
        }
    }
}

impl PartialEq for Capability {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Capability::Declared { resource: a, index: i },
                Capability::Declared { resource: b, index: j },
            ) => Arc::ptr_eq(a, b) && i == j,
            (
                Capability::Hosted {
                    owner: oa,
                    resource: a,
                    index: i,
                },
                Capability::Hosted {
                    owner: ob,
                    resource: b,
                    index: j,
                },
            ) => oa == ob && Arc::ptr_eq(a, b) && i == j,
            _ => false,
        }
    }
}

impl Eq for Capability {}

impl Hash for Capability {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Capability::Declared { resource, index } => {
                state.write_u8(0);
                state.write_usize(Arc::as_ptr(resource) as usize);
                state.write_usize(*index);
            }
            Capability::Hosted {
                owner,
                resource,
                index,
            } => {
                state.write_u8(1);
                owner.hash(state);
                state.write_usize(Arc::as_ptr(resource) as usize);
                state.write_usize(*index);
            }
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.resource(), self.namespace())?;
        if let Some(value) = self.namespace_attribute() {
            write!(f, "={value}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Capability({self})")
    }
}

/// Handle to a requirement, mirroring [`Capability`].
#[derive(Clone)]
pub enum Requirement {
    Declared {
        resource: Arc<ResourceInner>,
        index: usize,
    },
    Hosted {
        owner: Resource,
        resource: Arc<ResourceInner>,
        index: usize,
    },
}

impl Requirement {
    pub(crate) fn hosted(owner: Resource, declared: &Requirement) -> Requirement {
        let (resource, index) = declared.declaration();
        Requirement::Hosted {
            owner,
            resource: resource.clone(),
            index,
        }
    }

    pub fn data(&self) -> &RequirementData {
        let (resource, index) = self.declaration();
        &resource.requirements[index]
    }

    pub fn namespace(&self) -> &str {
        self.data().namespace()
    }

    pub fn filter(&self) -> Option<&str> {
        self.data().directive(directive::FILTER)
    }

    pub fn is_optional(&self) -> bool {
        self.data().directive(directive::RESOLUTION) == Some(directive::RESOLUTION_OPTIONAL)
    }

    pub fn is_dynamic(&self) -> bool {
        self.data().directive(directive::RESOLUTION) == Some(directive::RESOLUTION_DYNAMIC)
    }

    pub fn is_multiple(&self) -> bool {
        self.data().directive(directive::CARDINALITY) == Some(directive::CARDINALITY_MULTIPLE)
    }

    pub fn is_reexport(&self) -> bool {
        self.data().directive(directive::VISIBILITY) == Some(directive::VISIBILITY_REEXPORT)
    }

    /// The resource this requirement belongs to; the composite host for a
    /// hosted requirement.
    pub fn resource(&self) -> Resource {
        match self {
            Requirement::Declared { resource, .. } => Resource::Declared(resource.clone()),
            Requirement::Hosted { owner, .. } => owner.clone(),
        }
    }

    /// The requirement as originally declared, unwrapping any hosting.
    pub fn declared(&self) -> Requirement {
        let (resource, index) = self.declaration();
        Requirement::Declared {
            resource: resource.clone(),
            index,
        }
    }

    pub fn is_hosted(&self) -> bool {
        matches!(self, Requirement::Hosted { .. })
    }

    fn declaration(&self) -> (&Arc<ResourceInner>, usize) {
        match self {
            Requirement::Declared { resource, index }
            | Requirement::Hosted {
                resource, index, ..
            } => (resource, *index),
        }
    }
}

impl PartialEq for Requirement {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Requirement::Declared { resource: a, index: i },
                Requirement::Declared { resource: b, index: j },
            ) => Arc::ptr_eq(a, b) && i == j,
            (
                Requirement::Hosted {
                    owner: oa,
                    resource: a,
                    index: i,
                },
                Requirement::Hosted {
                    owner: ob,
                    resource: b,
                    index: j,
                },
            ) => oa == ob && Arc::ptr_eq(a, b) && i == j,
            _ => false,
        }
    }
}

impl Eq for Requirement {}

impl Hash for Requirement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Requirement::Declared { resource, index } => {
                state.write_u8(0);
                state.write_usize(Arc::as_ptr(resource) as usize);
                state.write_usize(*index);
            }
            Requirement::Hosted {
                owner,
                resource,
                index,
            } => {
                state.write_u8(1);
                owner.hash(state);
                state.write_usize(Arc::as_ptr(resource) as usize);
                state.write_usize(*index);
            }
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.resource(), self.namespace())?;
        if let Some(filter) = self.filter() {
            write!(f, "; filter:=\"{filter}\"")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Requirement({self})")
    }
}

/// Builder for a declared resource and its capability/requirement lists.
pub struct ResourceBuilder {
    symbolic_name: String,
    version: Version,
    capabilities: Vec<CapabilityData>,
    requirements: Vec<RequirementData>,
}

impl ResourceBuilder {
    /// Add a capability in the given namespace; finish it with
    /// [`CapabilityBuilder::done`].
    pub fn capability(self, namespace: &str) -> CapabilityBuilder {
        CapabilityBuilder {
            builder: self,
            data: CapabilityData {
                namespace: namespace.to_string(),
                ..CapabilityData::default()
            },
        }
    }

    /// Add a requirement in the given namespace; finish it with
    /// [`RequirementBuilder::done`].
    pub fn requirement(self, namespace: &str) -> RequirementBuilder {
        RequirementBuilder {
            builder: self,
            data: RequirementData {
                namespace: namespace.to_string(),
                ..RequirementData::default()
            },
        }
    }

    pub fn build(self) -> Resource {
        Resource::Declared(Arc::new(ResourceInner {
            symbolic_name: self.symbolic_name,
            version: self.version,
            capabilities: self.capabilities,
            requirements: self.requirements,
        }))
    }
}

/// In-progress capability of a [`ResourceBuilder`].
pub struct CapabilityBuilder {
    builder: ResourceBuilder,
    data: CapabilityData,
}

impl CapabilityBuilder {
    pub fn attribute(mut self, name: &str, value: &str) -> Self {
        self.data
            .attributes
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn directive(mut self, name: &str, value: &str) -> Self {
        self.data
            .directives
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn done(mut self) -> ResourceBuilder {
        self.builder.capabilities.push(self.data);
        self.builder
    }
}

/// In-progress requirement of a [`ResourceBuilder`].
pub struct RequirementBuilder {
    builder: ResourceBuilder,
    data: RequirementData,
}

impl RequirementBuilder {
    pub fn directive(mut self, name: &str, value: &str) -> Self {
        self.data
            .directives
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn done(mut self) -> ResourceBuilder {
        self.builder.requirements.push(self.data);
        self.builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exporter(name: &str, pkg: &str) -> Resource {
        Resource::builder(name, "1.0.0")
            .unwrap()
            .capability(namespace::PACKAGE)
            .attribute(namespace::PACKAGE, pkg)
            .directive(directive::USES, "q, r")
            .done()
            .build()
    }

    #[test]
    fn test_identity_equality() {
        let a = exporter("a", "p");
        let b = exporter("a", "p");
        assert_eq!(a, a.clone());
        assert_ne!(a, b);

        let cap_a = a.capabilities().remove(0);
        assert_eq!(cap_a, a.capabilities().remove(0));
        assert_ne!(cap_a, b.capabilities().remove(0));
    }

    #[test]
    fn test_capability_accessors() {
        let a = exporter("a", "p");
        let cap = a.capabilities().remove(0);
        assert_eq!(cap.namespace(), namespace::PACKAGE);
        assert_eq!(cap.namespace_attribute(), Some("p"));
        assert_eq!(cap.uses(), vec!["q", "r"]);
        assert_eq!(cap.resource(), a);
    }

    #[test]
    fn test_fragment_detection() {
        let plain = exporter("a", "p");
        assert!(!plain.is_fragment());

        let fragment = Resource::builder("frag", "2.0.0")
            .unwrap()
            .requirement(namespace::HOST)
            .directive(directive::FILTER, "(wiring.host=h)")
            .done()
            .build();
        assert!(fragment.is_fragment());
    }

    #[test]
    fn test_requirement_directives() {
        let r = Resource::builder("a", "1.0.0")
            .unwrap()
            .requirement(namespace::PACKAGE)
            .directive(directive::FILTER, "(wiring.package=p)")
            .directive(directive::RESOLUTION, directive::RESOLUTION_OPTIONAL)
            .done()
            .requirement(namespace::BUNDLE)
            .directive(directive::VISIBILITY, directive::VISIBILITY_REEXPORT)
            .directive(directive::CARDINALITY, directive::CARDINALITY_MULTIPLE)
            .done()
            .build();
        let reqs = r.requirements();
        assert!(reqs[0].is_optional());
        assert!(!reqs[0].is_dynamic());
        assert_eq!(reqs[0].filter(), Some("(wiring.package=p)"));
        assert!(reqs[1].is_reexport());
        assert!(reqs[1].is_multiple());
    }

    #[test]
    fn test_invalid_version_rejected() {
        assert!(Resource::builder("a", "not-a-version").is_err());
    }

    #[test]
    fn test_display() {
        let a = exporter("impl.a", "p");
        assert_eq!(a.to_string(), "impl.a 1.0.0");
        let cap = a.capabilities().remove(0);
        assert_eq!(cap.to_string(), "[impl.a 1.0.0] wiring.package=p");
    }
}
