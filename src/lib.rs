//! A policy-based authorization decision engine: given a principal, a
//! resource, and one or more actions, decides ALLOW or DENY per action by
//! evaluating resource policies, principal policies, and derived roles
//! (§1-§4).
//!
//! ## Example
//!
//! ```rust
//! use cretoai_authz::{EngineConfig, Metadata, PolicyEngine, Principal, Resource, Request, ResourcePolicy, ResourceRule, Effect};
//! use std::sync::atomic::AtomicBool;
//!
//! let engine = PolicyEngine::new(EngineConfig::default()).unwrap();
//! engine.load_resource_policies(vec![ResourcePolicy {
//!     api_version: "v1".to_string(),
//!     metadata: Metadata::new("document-policy"),
//!     resource: "document".to_string(),
//!     scope: None,
//!     rules: vec![ResourceRule {
//!         name: None,
//!         actions: vec!["read".to_string()],
//!         effect: Effect::Allow,
//!         roles: vec!["user".to_string()],
//!         derived_roles: vec![],
//!         condition: None,
//!     }],
//! }]).unwrap();
//!
//! let request = Request::new(
//!     Principal::new("alice").with_roles(["user".to_string()]),
//!     Resource::new("document", "doc-1"),
//!     vec!["read".to_string()],
//! );
//! let response = engine.check(&request, &AtomicBool::new(false)).unwrap();
//! assert_eq!(response.results["read"].effect, Effect::Allow);
//! ```

pub mod derived_roles;
pub mod engine;
pub mod error;
pub mod expr;
pub mod pattern;
pub mod policy;
pub mod scope;
pub mod types;
pub mod validation;

pub use engine::{EngineConfig, EngineConfigBuilder, EngineStats, PlanResult, PolicyEngine};
pub use error::{AuthzError, Result};
pub use policy::{
    DerivedRolesPolicy, Metadata, PolicyCounts, PolicyIndex, PrincipalActionRule, PrincipalPolicy,
    PrincipalRule, ResourcePolicy, ResourceRule,
};
pub use scope::{CacheStats, Scope, ScopeError, ScopeResolver};
pub use types::{
    ActionResult, CheckResponse, Effect, Principal, Request, Resource, ResponseMeta,
    DEFAULT_POLICY_NAME,
};

/// Crate version, exposed for diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
