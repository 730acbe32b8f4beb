// src/lib.rs

//! Interlink capability resolver
//!
//! A constraint-based dependency resolver: given a universe of resources that
//! declare capabilities (things they provide) and requirements (things they
//! need), it computes a consistent assignment of requirements to capabilities
//! ("wires") for a requested set of resources, such that no resource is
//! exposed to conflicting providers of the same named package through its
//! transitive dependency graph.
//!
//! # Architecture
//!
//! - Candidate store: requirement-to-candidates working state with a reverse
//!   dependents index and a per-resource population cache
//! - Population: recursive candidate discovery with reentrant cycle counting
//! - Fragment merging: one fragment version per symbolic name per host,
//!   synthesized composite host resources
//! - Package spaces: exported/imported/required/used package maps per resource
//! - Consistency checking: uses-constraint validation with backtracking via
//!   cloned candidate permutations
//!
//! The caller supplies the universe through a [`ResolveContext`] and receives
//! a wire map; nothing here loads code, starts anything, or persists state.

mod candidates;
pub mod context;
mod error;
pub mod resolver;
pub mod resource;

pub use context::ResolveContext;
pub use error::{Error, Result};
pub use resolver::{Resolver, WireMap};
pub use resource::{
    Capability, Requirement, Resource, ResourceBuilder, Wire, Wiring, directive, namespace,
};
