//! Hierarchical scope resolution (§4.3): dot-separated inheritance chains,
//! `*`/`**` wildcard pattern matching, and principal/resource scope
//! intersection.

mod resolver;
mod types;

pub use resolver::{CacheStats, ScopeResolver, DEFAULT_MAX_SCOPE_DEPTH};
pub use types::{Scope, ScopeError, ScopeResult, GLOBAL};
