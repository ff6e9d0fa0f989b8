//! Derived role definitions (§4.4): a role granted to a principal for a
//! specific resource when a parent-role requirement and a condition both
//! hold.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AuthzError, Result};
use crate::expr::{self, BaseContext, EvalContext, Engine, VariableScope};
use crate::types::{Principal, Resource, Value};

/// A single derived-role definition.
///
/// A principal holds this role for a request when it already holds at least
/// one role matching `parent_roles` (OR across patterns -- any one parent
/// role pattern matching any one of the principal's roles is sufficient) and
/// `condition`, if present, evaluates true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedRole {
    pub name: String,

    /// Parent role patterns (supports wildcards: `*`, `prefix-*`, `*-suffix`).
    /// The principal needs only one match (OR logic).
    pub parent_roles: Vec<String>,

    /// Restricted-language condition, evaluated under the request context
    /// plus the owning policy's `variables`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl DerivedRole {
    pub fn new(name: impl Into<String>, parent_roles: Vec<String>) -> Self {
        Self { name: name.into(), parent_roles, condition: None }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(AuthzError::InvalidPolicy {
                name: self.name.clone(),
                reason: "derived role name cannot be empty".to_string(),
            });
        }
        if self.parent_roles.is_empty() {
            return Err(AuthzError::InvalidPolicy {
                name: self.name.clone(),
                reason: "must have at least one parent role".to_string(),
            });
        }
        for parent in &self.parent_roles {
            if parent.is_empty() {
                return Err(AuthzError::InvalidPolicy {
                    name: self.name.clone(),
                    reason: "has an empty parent role".to_string(),
                });
            }
            if parent == &self.name {
                return Err(AuthzError::InvalidPolicy {
                    name: self.name.clone(),
                    reason: "cannot reference itself as a parent role".to_string(),
                });
            }
        }
        if let Some(condition) = &self.condition {
            crate::expr::parser::parse(condition).map_err(|e| AuthzError::InvalidPolicy {
                name: self.name.clone(),
                reason: format!("condition does not parse: {e}"),
            })?;
        }
        Ok(())
    }

    /// OR across parent role patterns: granted as soon as any pattern
    /// matches any role the principal currently holds.
    pub fn matches_parent_roles(&self, principal_roles: &[String]) -> bool {
        self.parent_roles
            .iter()
            .any(|pattern| principal_roles.iter().any(|role| Self::matches_role_pattern(role, pattern)))
    }

    fn matches_role_pattern(role: &str, pattern: &str) -> bool {
        if pattern == "*" {
            return true;
        }
        if let Some(prefix) = pattern.strip_suffix('*') {
            return role.starts_with(prefix);
        }
        if let Some(suffix) = pattern.strip_prefix('*') {
            return role.ends_with(suffix);
        }
        role == pattern
    }

    /// Evaluates `condition` (if any) against the request, with `variables`
    /// resolved lazily out of the owning policy's definitions. A role with no
    /// condition is granted whenever its parent-role requirement holds.
    pub fn is_granted(
        &self,
        engine: &Engine,
        principal: &Principal,
        resource: &Resource,
        aux_data: Option<&BTreeMap<String, Value>>,
        variables: &VariableScope<'_>,
    ) -> bool {
        if !self.matches_parent_roles(&principal.roles.iter().cloned().collect::<Vec<_>>()) {
            return false;
        }
        let Some(condition) = &self.condition else { return true };
        let base = BaseContext::new(
            expr::principal_to_value(principal),
            expr::resource_to_value(resource),
            expr::aux_data_to_value(aux_data),
        );
        let ctx = EvalContext::with_variables(&base, variables);
        engine.compile_and_eval(condition, &ctx).unwrap_or(false)
    }
}
