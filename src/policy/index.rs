//! In-memory policy bundle (§2 component 4): validated policies keyed for
//! §4.5/§4.6 lookup, plus the monotonically increasing generation id §4.8
//! uses to invalidate the evaluation cache on every bundle swap.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::derived_roles::DerivedRole;
use crate::error::Result;
use crate::scope::GLOBAL;

use super::types::{DerivedRolesPolicy, PrincipalPolicy, ResourcePolicy};

/// Resource policies keyed by `(scope, resource kind)`; `scope` is `GLOBAL`
/// for an unscoped policy. Declaration order within a bucket is preserved
/// for rule-selection purposes (§4.5 iterates in declaration order within a
/// single policy; across policies registered at the same key, earlier
/// loads are tried first).
#[derive(Default)]
struct Bundle {
    resource_policies: BTreeMap<(String, String), Vec<ResourcePolicy>>,
    derived_roles: Vec<DerivedRole>,
    variables: BTreeMap<String, String>,
    principal_policies: Vec<PrincipalPolicy>,
}

/// The active policy bundle. Cheap to read concurrently; mutated only by
/// the load/clear operations, each of which bumps `generation`.
pub struct PolicyIndex {
    bundle: RwLock<Bundle>,
    generation: AtomicU64,
}

impl PolicyIndex {
    pub fn new() -> Self {
        Self { bundle: RwLock::new(Bundle::default()), generation: AtomicU64::new(0) }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Validates and appends resource policies, keyed by their (possibly
    /// absent) scope and resource kind.
    pub fn load_resource_policies(&self, policies: Vec<ResourcePolicy>) -> Result<()> {
        for policy in &policies {
            policy.validate()?;
        }
        let mut bundle = self.bundle.write().unwrap();
        for policy in policies {
            let scope = policy.scope.clone().unwrap_or_else(|| GLOBAL.to_string());
            let key = (scope, policy.resource.clone());
            bundle.resource_policies.entry(key).or_default().push(policy);
        }
        drop(bundle);
        self.bump_generation();
        Ok(())
    }

    /// Validates and appends derived-role definitions and their `variables`.
    /// Definitions and variables from every loaded `DerivedRolesPolicy`
    /// accumulate into one bundle-wide namespace; [`crate::derived_roles::RoleResolver::load`]
    /// is responsible for rejecting duplicate names and cycles across the
    /// combined set.
    pub fn load_derived_roles_policies(&self, policies: Vec<DerivedRolesPolicy>) -> Result<()> {
        for policy in &policies {
            policy.validate()?;
        }
        let mut bundle = self.bundle.write().unwrap();
        for policy in policies {
            bundle.derived_roles.extend(policy.definitions);
            bundle.variables.extend(policy.variables);
        }
        drop(bundle);
        self.bump_generation();
        Ok(())
    }

    pub fn load_principal_policies(&self, policies: Vec<PrincipalPolicy>) -> Result<()> {
        for policy in &policies {
            policy.validate()?;
        }
        let mut bundle = self.bundle.write().unwrap();
        bundle.principal_policies.extend(policies);
        drop(bundle);
        self.bump_generation();
        Ok(())
    }

    pub fn clear(&self) {
        *self.bundle.write().unwrap() = Bundle::default();
        self.bump_generation();
    }

    /// Resource policies registered at an exact `(scope, kind)` key, in load
    /// order, or an empty slice if none.
    pub fn resource_policies_at(&self, scope: &str, kind: &str) -> Vec<ResourcePolicy> {
        self.bundle
            .read()
            .unwrap()
            .resource_policies
            .get(&(scope.to_string(), kind.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn principal_policies(&self) -> Vec<PrincipalPolicy> {
        self.bundle.read().unwrap().principal_policies.clone()
    }

    pub fn derived_roles(&self) -> Vec<DerivedRole> {
        self.bundle.read().unwrap().derived_roles.clone()
    }

    pub fn variables(&self) -> BTreeMap<String, String> {
        self.bundle.read().unwrap().variables.clone()
    }

    pub fn counts(&self) -> PolicyCounts {
        let bundle = self.bundle.read().unwrap();
        PolicyCounts {
            resource_policies: bundle.resource_policies.values().map(Vec::len).sum(),
            derived_roles: bundle.derived_roles.len(),
            principal_policies: bundle.principal_policies.len(),
        }
    }
}

impl Default for PolicyIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolicyCounts {
    pub resource_policies: usize,
    pub derived_roles: usize,
    pub principal_policies: usize,
}
