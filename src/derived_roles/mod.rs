//! Derived-role resolution (§4.4): a role granted to a principal for a
//! specific resource when a parent-role requirement and a condition both
//! hold, with load-time cycle detection and per-request memoisation.

pub mod graph;
pub mod resolver;
pub mod types;

pub use graph::{DependencyGraph, DependencyGraphBuilder, GraphError};
pub use resolver::{DerivedRoleCache, RoleResolver};
pub use types::DerivedRole;
