//! Policy document types (§3): resource, derived-roles, and principal
//! policies, plus the metadata every kind shares.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::derived_roles::DerivedRole;
use crate::error::{AuthzError, Result};
use crate::types::Effect;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Metadata {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Metadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }
}

/// A single rule inside a [`ResourcePolicy`] (§4.5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRule {
    #[serde(default)]
    pub name: Option<String>,
    pub actions: Vec<String>,
    pub effect: Effect,
    /// Empty means "any role".
    #[serde(default)]
    pub roles: Vec<String>,
    /// Empty means "any derived role".
    #[serde(default)]
    pub derived_roles: Vec<String>,
    #[serde(default)]
    pub condition: Option<String>,
}

/// Policy governing actions on a resource kind, optionally scoped (§3, §4.3,
/// §4.5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePolicy {
    pub api_version: String,
    pub metadata: Metadata,
    /// Resource kind (or pattern) this policy governs.
    pub resource: String,
    #[serde(default)]
    pub scope: Option<String>,
    pub rules: Vec<ResourceRule>,
}

impl ResourcePolicy {
    pub fn validate(&self) -> Result<()> {
        if self.metadata.name.is_empty() {
            return Err(AuthzError::InvalidPolicy {
                name: self.metadata.name.clone(),
                reason: "metadata.name must not be empty".to_string(),
            });
        }
        if self.resource.is_empty() {
            return Err(AuthzError::InvalidPolicy {
                name: self.metadata.name.clone(),
                reason: "resource kind/pattern must not be empty".to_string(),
            });
        }
        if self.rules.is_empty() {
            return Err(AuthzError::InvalidPolicy {
                name: self.metadata.name.clone(),
                reason: "must declare at least one rule".to_string(),
            });
        }
        for rule in &self.rules {
            if rule.actions.is_empty() {
                return Err(AuthzError::InvalidPolicy {
                    name: self.metadata.name.clone(),
                    reason: "rule must declare at least one action pattern".to_string(),
                });
            }
            if let Some(condition) = &rule.condition {
                crate::expr::parser::parse(condition).map_err(|e| AuthzError::InvalidPolicy {
                    name: self.metadata.name.clone(),
                    reason: format!("rule condition does not parse: {e}"),
                })?;
            }
        }
        Ok(())
    }
}

/// Named derived-role definitions plus shared `variables` sub-expressions
/// (§3, §4.4). `variables` is additive beyond the literal struct of §3 to
/// satisfy §4.4's requirement that conditions see a lazily-memoised
/// `variables` scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedRolesPolicy {
    pub api_version: String,
    pub metadata: Metadata,
    pub definitions: Vec<DerivedRole>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

impl DerivedRolesPolicy {
    pub fn validate(&self) -> Result<()> {
        for (name, source) in &self.variables {
            crate::expr::parser::parse(source).map_err(|e| AuthzError::InvalidPolicy {
                name: self.metadata.name.clone(),
                reason: format!("variable '{name}' does not parse: {e}"),
            })?;
        }
        for role in &self.definitions {
            role.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalActionRule {
    pub action: String,
    pub effect: Effect,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalRule {
    /// Resource-kind pattern this rule governs.
    pub resource: String,
    pub actions: Vec<PrincipalActionRule>,
}

/// Policy governing one principal (or principal pattern)'s access across
/// resource kinds (§3, §4.6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalPolicy {
    pub api_version: String,
    pub metadata: Metadata,
    pub principal: String,
    #[serde(default)]
    pub version: Option<String>,
    pub rules: Vec<PrincipalRule>,
}

impl PrincipalPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.principal.is_empty() {
            return Err(AuthzError::InvalidPolicy {
                name: self.metadata.name.clone(),
                reason: "principal pattern must not be empty".to_string(),
            });
        }
        for rule in &self.rules {
            if rule.resource.is_empty() {
                return Err(AuthzError::InvalidPolicy {
                    name: self.metadata.name.clone(),
                    reason: "rule resource pattern must not be empty".to_string(),
                });
            }
            for action_rule in &rule.actions {
                if action_rule.action.is_empty() {
                    return Err(AuthzError::InvalidPolicy {
                        name: self.metadata.name.clone(),
                        reason: "action rule's action pattern must not be empty".to_string(),
                    });
                }
                if let Some(condition) = &action_rule.condition {
                    crate::expr::parser::parse(condition).map_err(|e| AuthzError::InvalidPolicy {
                        name: self.metadata.name.clone(),
                        reason: format!("action rule condition does not parse: {e}"),
                    })?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_policy_validation() {
        let policy = ResourcePolicy {
            api_version: "api.authz/v1".to_string(),
            metadata: Metadata::new("document-policy"),
            resource: "document".to_string(),
            scope: None,
            rules: vec![ResourceRule {
                name: None,
                actions: vec!["*".to_string()],
                effect: Effect::Allow,
                roles: vec!["admin".to_string()],
                derived_roles: vec![],
                condition: None,
            }],
        };
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn resource_policy_rejects_empty_rules() {
        let policy = ResourcePolicy {
            api_version: "api.authz/v1".to_string(),
            metadata: Metadata::new("empty"),
            resource: "document".to_string(),
            scope: None,
            rules: vec![],
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn resource_policy_rejects_unparsable_condition() {
        let policy = ResourcePolicy {
            api_version: "api.authz/v1".to_string(),
            metadata: Metadata::new("bad-condition"),
            resource: "document".to_string(),
            scope: None,
            rules: vec![ResourceRule {
                name: None,
                actions: vec!["read".to_string()],
                effect: Effect::Allow,
                roles: vec![],
                derived_roles: vec![],
                condition: Some("principal.id ==".to_string()),
            }],
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn derived_roles_policy_validates_variables_and_definitions() {
        let mut variables = BTreeMap::new();
        variables.insert("is_owner".to_string(), "resource.attributes.ownerId == principal.id".to_string());
        let policy = DerivedRolesPolicy {
            api_version: "api.authz/v1".to_string(),
            metadata: Metadata::new("common-roles"),
            definitions: vec![DerivedRole::new("owner", vec!["user".to_string()])
                .with_condition("variables.is_owner == true")],
            variables,
        };
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn principal_policy_validation() {
        let policy = PrincipalPolicy {
            api_version: "api.authz/v1".to_string(),
            metadata: Metadata::new("john-overrides"),
            principal: "john@example.com".to_string(),
            version: None,
            rules: vec![PrincipalRule {
                resource: "expense".to_string(),
                actions: vec![PrincipalActionRule {
                    action: "delete".to_string(),
                    effect: Effect::Deny,
                    name: None,
                    condition: None,
                }],
            }],
        };
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn principal_policy_rejects_empty_principal_pattern() {
        let policy = PrincipalPolicy {
            api_version: "api.authz/v1".to_string(),
            metadata: Metadata::new("bad"),
            principal: "".to_string(),
            version: None,
            rules: vec![],
        };
        assert!(policy.validate().is_err());
    }
}
