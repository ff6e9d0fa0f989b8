//! Policy validation (§2 component 10): checks policy documents before
//! they are accepted into a bundle -- required fields, enum values,
//! expression parseability, scope syntax, and derived-role cycle detection
//! across the whole set at once, rather than document-by-document.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::derived_roles::RoleResolver;
use crate::error::{AuthzError, Result};
use crate::expr::Engine;
use crate::policy::{DerivedRolesPolicy, PrincipalPolicy, ResourcePolicy};
use crate::scope::ScopeResolver;

/// Validates a set of policy documents as the unit they'll be loaded into a
/// `PolicyEngine` as: every individual document must validate on its own
/// terms (via its own `validate()`), every `ResourcePolicy.scope` must parse
/// against the dotted-segment grammar, and the derived roles across all
/// `DerivedRolesPolicy` documents combined must form an acyclic graph with
/// unique names -- a cycle spanning two different documents is only visible
/// once they're considered together.
pub fn validate_bundle(
    resource_policies: &[ResourcePolicy],
    derived_roles_policies: &[DerivedRolesPolicy],
    principal_policies: &[PrincipalPolicy],
    scope_resolver: &ScopeResolver,
) -> Result<()> {
    for policy in resource_policies {
        policy.validate()?;
        if let Some(scope) = &policy.scope {
            scope_resolver
                .parse(scope)
                .map_err(|e| AuthzError::InvalidScope(scope.clone(), e.to_string()))?;
        }
    }
    for policy in derived_roles_policies {
        policy.validate()?;
    }
    for policy in principal_policies {
        policy.validate()?;
    }

    validate_derived_role_graph(derived_roles_policies)
}

/// Builds a throwaway `RoleResolver` purely to reuse its load-time cycle and
/// uniqueness checks (§4.4) without touching whatever resolver a live engine
/// already has loaded.
fn validate_derived_role_graph(derived_roles_policies: &[DerivedRolesPolicy]) -> Result<()> {
    let mut roles = Vec::new();
    let mut variables = BTreeMap::new();
    for policy in derived_roles_policies {
        roles.extend(policy.definitions.iter().cloned());
        variables.extend(policy.variables.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    let mut resolver = RoleResolver::new(Arc::new(Engine::new()));
    resolver.load(roles, variables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derived_roles::DerivedRole;
    use crate::policy::{Metadata, ResourceRule};
    use crate::types::Effect;

    fn resource_policy(scope: Option<&str>) -> ResourcePolicy {
        ResourcePolicy {
            api_version: "v1".to_string(),
            metadata: Metadata::new("doc-policy"),
            resource: "document".to_string(),
            scope: scope.map(str::to_string),
            rules: vec![ResourceRule {
                name: None,
                actions: vec!["read".to_string()],
                effect: Effect::Allow,
                roles: vec!["user".to_string()],
                derived_roles: vec![],
                condition: None,
            }],
        }
    }

    #[test]
    fn accepts_a_well_formed_bundle() {
        let resolver = ScopeResolver::default();
        let result = validate_bundle(&[resource_policy(Some("acme.corp"))], &[], &[], &resolver);
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_malformed_scope() {
        let resolver = ScopeResolver::default();
        let result = validate_bundle(&[resource_policy(Some("acme..corp"))], &[], &[], &resolver);
        assert!(matches!(result, Err(AuthzError::InvalidScope(_, _))));
    }

    #[test]
    fn rejects_derived_role_cycle_spanning_two_documents() {
        let resolver = ScopeResolver::default();
        let first = DerivedRolesPolicy {
            api_version: "v1".to_string(),
            metadata: Metadata::new("roles-a"),
            definitions: vec![DerivedRole::new("role_a", vec!["role_b".to_string()])],
            variables: BTreeMap::new(),
        };
        let second = DerivedRolesPolicy {
            api_version: "v1".to_string(),
            metadata: Metadata::new("roles-b"),
            definitions: vec![DerivedRole::new("role_b", vec!["role_a".to_string()])],
            variables: BTreeMap::new(),
        };
        let result = validate_bundle(&[], &[first, second], &[], &resolver);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_invalid_policy_document() {
        let resolver = ScopeResolver::default();
        let mut policy = resource_policy(None);
        policy.rules.clear();
        let result = validate_bundle(&[policy], &[], &[], &resolver);
        assert!(matches!(result, Err(AuthzError::InvalidPolicy { .. })));
    }
}
