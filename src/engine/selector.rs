//! Rule selection within a `ResourcePolicy` (§4.5) and principal-policy
//! evaluation (§4.6).

use std::collections::{BTreeMap, BTreeSet};

use crate::expr::{self, BaseContext, EvalContext, Engine, VariableScope};
use crate::pattern::{matches_action, PatternMatcher};
use crate::policy::{PrincipalPolicy, ResourcePolicy};
use crate::types::{Effect, LayerEffect, Principal, Resource, Value};

/// The effect a policy layer produced for one action, with attribution.
/// `effect` is `LayerEffect::None` when nothing matched, in which case the
/// attribution fields are all `None` too.
pub struct LayerMatch {
    pub effect: LayerEffect,
    pub policy_name: Option<String>,
    pub rule_name: Option<String>,
    pub matched_derived_roles: Option<BTreeSet<String>>,
}

impl LayerMatch {
    fn none() -> Self {
        Self { effect: LayerEffect::None, policy_name: None, rule_name: None, matched_derived_roles: None }
    }
}

/// §4.5: the first rule, across the given (already scope-resolved) policies
/// in declaration order, whose action pattern, role/derived-role
/// requirement, and condition all hold for this request.
#[allow(clippy::too_many_arguments)]
pub fn select_resource_effect(
    policies: &[ResourcePolicy],
    engine: &Engine,
    principal: &Principal,
    resource: &Resource,
    action: &str,
    granted_derived_roles: &BTreeSet<String>,
    aux_data: Option<&BTreeMap<String, Value>>,
    variables: &VariableScope<'_>,
) -> LayerMatch {
    for policy in policies {
        for rule in &policy.rules {
            if !rule.actions.iter().any(|pattern| matches_action(pattern, action)) {
                continue;
            }
            let no_role_requirement = rule.roles.is_empty() && rule.derived_roles.is_empty();
            let holds_listed_role = rule.roles.iter().any(|r| principal.has_role(r));
            let holds_listed_derived_role =
                rule.derived_roles.iter().any(|r| granted_derived_roles.contains(r));
            if !(no_role_requirement || holds_listed_role || holds_listed_derived_role) {
                continue;
            }
            if let Some(condition) = &rule.condition {
                if !eval_condition(engine, condition, principal, resource, aux_data, variables) {
                    continue;
                }
            }
            let matched_derived_roles: BTreeSet<String> = rule
                .derived_roles
                .iter()
                .filter(|r| granted_derived_roles.contains(*r))
                .cloned()
                .collect();
            return LayerMatch {
                effect: rule.effect.into(),
                policy_name: Some(policy.metadata.name.clone()),
                rule_name: rule.name.clone(),
                matched_derived_roles: (!matched_derived_roles.is_empty()).then_some(matched_derived_roles),
            };
        }
    }
    LayerMatch::none()
}

/// §4.6: evaluates every principal policy whose `principal` pattern matches
/// the request, combining with deny-override across policies (the first
/// matching rule wins within one policy).
pub fn select_principal_effect(
    policies: &[PrincipalPolicy],
    pattern_matcher: &PatternMatcher,
    engine: &Engine,
    principal: &Principal,
    resource: &Resource,
    action: &str,
    aux_data: Option<&BTreeMap<String, Value>>,
    variables: &VariableScope<'_>,
) -> LayerMatch {
    let mut allow_candidate = None;
    for policy in policies {
        if !pattern_matcher.matches_principal(&policy.principal, &principal.id) {
            continue;
        }
        for rule in &policy.rules {
            if !pattern_matcher.matches_principal(&rule.resource, &resource.kind) {
                continue;
            }
            for action_rule in &rule.actions {
                if !matches_action(&action_rule.action, action) {
                    continue;
                }
                if let Some(condition) = &action_rule.condition {
                    if !eval_condition(engine, condition, principal, resource, aux_data, variables) {
                        continue;
                    }
                }
                let hit = LayerMatch {
                    effect: action_rule.effect.into(),
                    policy_name: Some(policy.metadata.name.clone()),
                    rule_name: action_rule.name.clone(),
                    matched_derived_roles: None,
                };
                match action_rule.effect {
                    Effect::Deny => return hit,
                    Effect::Allow => {
                        if allow_candidate.is_none() {
                            allow_candidate = Some(hit);
                        }
                    }
                }
            }
        }
    }
    allow_candidate.unwrap_or_else(LayerMatch::none)
}

fn eval_condition(
    engine: &Engine,
    condition: &str,
    principal: &Principal,
    resource: &Resource,
    aux_data: Option<&BTreeMap<String, Value>>,
    variables: &VariableScope<'_>,
) -> bool {
    let base = BaseContext::new(
        expr::principal_to_value(principal),
        expr::resource_to_value(resource),
        expr::aux_data_to_value(aux_data),
    );
    let ctx = EvalContext::with_variables(&base, variables);
    engine.compile_and_eval(condition, &ctx).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{Metadata, PrincipalActionRule, PrincipalRule, ResourceRule};
    use std::collections::BTreeMap;

    fn engine() -> Engine {
        Engine::new()
    }

    #[test]
    fn first_matching_rule_wins_in_declaration_order() {
        let policy = ResourcePolicy {
            api_version: "v1".to_string(),
            metadata: Metadata::new("p1"),
            resource: "document".to_string(),
            scope: None,
            rules: vec![
                ResourceRule {
                    name: Some("allow-admin".to_string()),
                    actions: vec!["*".to_string()],
                    effect: Effect::Allow,
                    roles: vec!["admin".to_string()],
                    derived_roles: vec![],
                    condition: None,
                },
                ResourceRule {
                    name: Some("deny-all".to_string()),
                    actions: vec!["*".to_string()],
                    effect: Effect::Deny,
                    roles: vec![],
                    derived_roles: vec![],
                    condition: None,
                },
            ],
        };
        let principal = Principal::new("u1").with_roles(["admin".to_string()]);
        let resource = Resource::new("document", "d1");
        let matched = select_resource_effect(
            &[policy],
            &engine(),
            &principal,
            &resource,
            "read",
            &BTreeSet::new(),
            None,
            &VariableScope::new(&BTreeMap::new()),
        );
        assert_eq!(matched.effect, LayerEffect::Allow);
        assert_eq!(matched.rule_name.as_deref(), Some("allow-admin"));
    }

    #[test]
    fn no_rule_matches_without_required_role() {
        let policy = ResourcePolicy {
            api_version: "v1".to_string(),
            metadata: Metadata::new("p1"),
            resource: "document".to_string(),
            scope: None,
            rules: vec![ResourceRule {
                name: None,
                actions: vec!["read".to_string()],
                effect: Effect::Allow,
                roles: vec!["admin".to_string()],
                derived_roles: vec![],
                condition: None,
            }],
        };
        let principal = Principal::new("u1").with_roles(["user".to_string()]);
        let resource = Resource::new("document", "d1");
        assert!(select_resource_effect(
            &[policy],
            &engine(),
            &principal,
            &resource,
            "read",
            &BTreeSet::new(),
            None,
            &VariableScope::new(&BTreeMap::new()),
        )
        .effect
        .is_none());
    }

    #[test]
    fn derived_role_requirement_uses_granted_set() {
        let policy = ResourcePolicy {
            api_version: "v1".to_string(),
            metadata: Metadata::new("p1"),
            resource: "document".to_string(),
            scope: None,
            rules: vec![ResourceRule {
                name: None,
                actions: vec!["edit".to_string()],
                effect: Effect::Allow,
                roles: vec![],
                derived_roles: vec!["owner".to_string()],
                condition: None,
            }],
        };
        let principal = Principal::new("u4").with_roles(["user".to_string()]);
        let resource = Resource::new("document", "d4");
        let mut granted = BTreeSet::new();
        granted.insert("owner".to_string());
        let matched = select_resource_effect(
            &[policy],
            &engine(),
            &principal,
            &resource,
            "edit",
            &granted,
            None,
            &VariableScope::new(&BTreeMap::new()),
        );
        assert_eq!(matched.matched_derived_roles, Some(granted));
    }

    #[test]
    fn principal_policy_denies_and_short_circuits() {
        let policy = PrincipalPolicy {
            api_version: "v1".to_string(),
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
        let principal = Principal::new("john@example.com").with_roles(["admin".to_string()]);
        let resource = Resource::new("expense", "e1");
        let matcher = PatternMatcher::default();
        let matched = select_principal_effect(
            &[policy],
            &matcher,
            &engine(),
            &principal,
            &resource,
            "delete",
            None,
            &VariableScope::new(&BTreeMap::new()),
        );
        assert_eq!(matched.effect, LayerEffect::Deny);
    }

    #[test]
    fn principal_pattern_must_match_request_principal() {
        let policy = PrincipalPolicy {
            api_version: "v1".to_string(),
            metadata: Metadata::new("other-user"),
            principal: "jane@example.com".to_string(),
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
        let principal = Principal::new("john@example.com");
        let resource = Resource::new("expense", "e1");
        let matcher = PatternMatcher::default();
        assert!(select_principal_effect(
            &[policy],
            &matcher,
            &engine(),
            &principal,
            &resource,
            "delete",
            None,
            &VariableScope::new(&BTreeMap::new()),
        )
        .effect
        .is_none());
    }
}
