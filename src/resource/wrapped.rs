// src/resource/wrapped.rs

//! Composite host resources
//!
//! Fragment merging replaces a host and its selected fragments with a single
//! synthesized resource. The composite's capability and requirement lists are
//! the union of the host's and the fragments' declarations (minus fragment
//! identity capabilities and host-attachment requirements), each re-homed so
//! its `resource()` points back at the composite. One fragment attached to
//! two hosts is effectively multiplied: each composite re-homes its own copy.

use std::sync::Arc;

use super::{Capability, Requirement, Resource, ResourceInner, namespace};

/// A host resource with its selected fragments merged in. Lives for one
/// resolve attempt; created during fragment merging.
#[derive(Debug)]
pub struct WrappedResource {
    host: Arc<ResourceInner>,
    fragments: Vec<Arc<ResourceInner>>,
}

impl WrappedResource {
    pub(crate) fn new(host: Arc<ResourceInner>, fragments: Vec<Arc<ResourceInner>>) -> Self {
        WrappedResource { host, fragments }
    }

    pub(crate) fn host(&self) -> &Arc<ResourceInner> {
        &self.host
    }

    pub(crate) fn fragments(&self) -> &[Arc<ResourceInner>] {
        &self.fragments
    }

    /// Host capabilities plus fragment capabilities (except identity), all
    /// owned by `composite`.
    pub(crate) fn capabilities(&self, composite: &Resource) -> Vec<Capability> {
        let mut capabilities = Vec::new();
        for index in 0..self.host.capabilities.len() {
            capabilities.push(Capability::Hosted {
                owner: composite.clone(),
                resource: self.host.clone(),
                index,
            });
        }
        for fragment in &self.fragments {
            for (index, data) in fragment.capabilities.iter().enumerate() {
                if data.namespace() != namespace::IDENTITY {
                    capabilities.push(Capability::Hosted {
                        owner: composite.clone(),
                        resource: fragment.clone(),
                        index,
                    });
                }
            }
        }
        capabilities
    }

    /// Host requirements plus fragment requirements (except host
    /// attachment), all owned by `composite`.
    pub(crate) fn requirements(&self, composite: &Resource) -> Vec<Requirement> {
        let mut requirements = Vec::new();
        for index in 0..self.host.requirements.len() {
            requirements.push(Requirement::Hosted {
                owner: composite.clone(),
                resource: self.host.clone(),
                index,
            });
        }
        for fragment in &self.fragments {
            for (index, data) in fragment.requirements.iter().enumerate() {
                if data.namespace() != namespace::HOST {
                    requirements.push(Requirement::Hosted {
                        owner: composite.clone(),
                        resource: fragment.clone(),
                        index,
                    });
                }
            }
        }
        requirements
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::directive;

    #[test]
    fn test_composite_merges_declarations() {
        let host = Resource::builder("host", "1.0.0")
            .unwrap()
            .capability(namespace::HOST)
            .attribute(namespace::HOST, "host")
            .done()
            .capability(namespace::PACKAGE)
            .attribute(namespace::PACKAGE, "hp")
            .done()
            .build();
        let fragment = Resource::builder("frag", "1.0.0")
            .unwrap()
            .requirement(namespace::HOST)
            .directive(directive::FILTER, "(wiring.host=host)")
            .done()
            .requirement(namespace::PACKAGE)
            .directive(directive::FILTER, "(wiring.package=fp.dep)")
            .done()
            .capability(namespace::PACKAGE)
            .attribute(namespace::PACKAGE, "fp")
            .done()
            .build();

        let composite = Resource::Wrapped(Arc::new(WrappedResource::new(
            host.inner().clone(),
            vec![fragment.inner().clone()],
        )));

        let capabilities = composite.capabilities();
        assert_eq!(capabilities.len(), 3);
        assert!(capabilities.iter().all(|c| c.resource() == composite));
        assert_eq!(capabilities[2].namespace_attribute(), Some("fp"));
        assert_eq!(capabilities[2].declared(), fragment.capabilities()[0]);

        // The fragment's host-attachment requirement stays on the fragment.
        let requirements = composite.requirements();
        assert_eq!(requirements.len(), 1);
        assert_eq!(requirements[0].namespace(), namespace::PACKAGE);
        assert!(requirements[0].is_hosted());

        assert_eq!(composite.declared_resource(), host);
        assert_eq!(composite.fragments(), vec![fragment]);
    }
}
