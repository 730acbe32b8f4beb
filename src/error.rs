// src/error.rs

//! Error types for resolution failures
//!
//! A resolve either returns a complete wire map or a single [`Error`] naming
//! at least one unresolved requirement, possibly chained to a deeper cause.
//! Errors are cached per resource during population, so they must be cheap to
//! clone and re-surface without re-deriving the failure.

use thiserror::Error;

use crate::resource::{Capability, Requirement, Resource};

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while resolving a set of resources.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A mandatory requirement ended up with zero surviving candidates.
    #[error(
        "Unable to resolve {}: missing requirement {}{}",
        .requirement.resource(),
        .requirement,
        cause_suffix(.cause)
    )]
    MissingRequirement {
        requirement: Requirement,
        cause: Option<Box<Error>>,
    },

    /// A tentative wiring would expose a resource to two incompatible
    /// providers of the same package. Recoverable while permutations remain.
    #[error("{message}")]
    UsesConflict {
        message: String,
        /// Head of the offending blame chain, when one can be singled out.
        requirement: Option<Requirement>,
    },

    /// A fragment lost version selection on every candidate host.
    #[error("Fragment was not selected for attachment: {resource}")]
    FragmentNotSelected { resource: Resource },

    /// No usable candidate remained for a dynamic requirement.
    #[error("Dynamic import failed: {requirement}")]
    DynamicImportFailed { requirement: Requirement },

    /// The dynamically imported package is already accessible to the
    /// resource. Caller error; never retried.
    #[error(
        "Resource {resource} cannot dynamically import package '{package}' since it already has access to it"
    )]
    IllegalDynamicImport { resource: Resource, package: String },

    /// A capability handed to the dynamic resolve entry point does not carry
    /// a package name.
    #[error("Matching candidate does not provide a package name: {capability}")]
    InvalidDynamicCandidate { capability: Capability },

    /// A version string could not be parsed.
    #[error("Invalid version '{value}': {reason}")]
    InvalidVersion { value: String, reason: String },
}

impl Error {
    /// The requirement(s) this failure is attributed to, used to decide
    /// whether an optionally resolved resource can be dropped and the resolve
    /// retried.
    pub fn unresolved_requirements(&self) -> Vec<Requirement> {
        match self {
            Error::MissingRequirement { requirement, .. } => vec![requirement.clone()],
            Error::UsesConflict {
                requirement: Some(requirement),
                ..
            } => vec![requirement.clone()],
            Error::DynamicImportFailed { requirement } => vec![requirement.clone()],
            _ => Vec::new(),
        }
    }
}

fn cause_suffix(cause: &Option<Box<Error>>) -> String {
    match cause {
        Some(cause) => format!(" [caused by: {cause}]"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Resource, namespace};

    fn fragment_error() -> Error {
        let resource = Resource::builder("frag", "1.0.0")
            .unwrap()
            .requirement(namespace::HOST)
            .directive(directive_filter(), "(host=h)")
            .done()
            .build();
        Error::FragmentNotSelected { resource }
    }

    fn directive_filter() -> &'static str {
        crate::resource::directive::FILTER
    }

    #[test]
    fn test_missing_requirement_message_chains_cause() {
        let resource = Resource::builder("app", "1.0.0")
            .unwrap()
            .requirement(namespace::PACKAGE)
            .directive(directive_filter(), "(wiring.package=p)")
            .done()
            .build();
        let requirement = resource.requirements().remove(0);

        let err = Error::MissingRequirement {
            requirement: requirement.clone(),
            cause: Some(Box::new(fragment_error())),
        };
        let message = err.to_string();
        assert!(message.contains("missing requirement"));
        assert!(message.contains("[caused by: Fragment was not selected"));

        let flat = Error::MissingRequirement {
            requirement,
            cause: None,
        };
        assert!(!flat.to_string().contains("caused by"));
    }

    #[test]
    fn test_unresolved_requirements_attribution() {
        let err = fragment_error();
        assert!(err.unresolved_requirements().is_empty());

        let resource = Resource::builder("app", "1.0.0")
            .unwrap()
            .requirement(namespace::PACKAGE)
            .done()
            .build();
        let requirement = resource.requirements().remove(0);
        let err = Error::MissingRequirement {
            requirement: requirement.clone(),
            cause: None,
        };
        assert_eq!(err.unresolved_requirements(), vec![requirement]);
    }
}
