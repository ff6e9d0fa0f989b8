//! Property-based checks for the quantified invariants of §8.

use cretoai_authz::{Effect, EngineConfig, Metadata, PolicyEngine, Principal, Request, Resource, ResourcePolicy, ResourceRule};
use proptest::prelude::*;
use std::sync::atomic::AtomicBool;

fn engine_with_mixed_policy() -> PolicyEngine {
    let engine = PolicyEngine::new(EngineConfig { cache_enabled: false, ..EngineConfig::default() }).unwrap();
    engine
        .load_resource_policies(vec![ResourcePolicy {
            api_version: "v1".to_string(),
            metadata: Metadata::new("mixed-policy"),
            resource: "document".to_string(),
            scope: None,
            rules: vec![
                ResourceRule {
                    name: Some("allow-even".to_string()),
                    actions: vec!["read".to_string()],
                    effect: Effect::Allow,
                    roles: vec!["user".to_string()],
                    derived_roles: vec![],
                    condition: None,
                },
                ResourceRule {
                    name: Some("deny-write".to_string()),
                    actions: vec!["write".to_string()],
                    effect: Effect::Deny,
                    roles: vec![],
                    derived_roles: vec![],
                    condition: None,
                },
            ],
        }])
        .unwrap();
    engine
}

proptest! {
    #[test]
    fn every_requested_action_appears_exactly_once(
        principal_id in "[a-z]{3,10}@example\\.com",
        resource_id in "doc-[a-z0-9]{3,10}",
        actions in prop::collection::hash_set("(read|write|delete|edit)", 1..4),
    ) {
        let engine = engine_with_mixed_policy();
        let action_list: Vec<String> = actions.into_iter().collect();
        let request = Request::new(
            Principal::new(principal_id).with_roles(["user".to_string()]),
            Resource::new("document", resource_id),
            action_list.clone(),
        );
        let cancelled = AtomicBool::new(false);
        let response = engine.check(&request, &cancelled).unwrap();
        prop_assert_eq!(response.results.len(), action_list.len());
        for action in &action_list {
            prop_assert!(response.results.contains_key(action));
        }
    }

    #[test]
    fn decision_is_deterministic_across_repeated_calls(
        principal_id in "[a-z]{3,10}@example\\.com",
        action in "(read|write|delete)",
    ) {
        let engine = engine_with_mixed_policy();
        let request = Request::new(
            Principal::new(principal_id).with_roles(["user".to_string()]),
            Resource::new("document", "d1"),
            vec![action.clone()],
        );
        let cancelled = AtomicBool::new(false);
        let first = engine.check(&request, &cancelled).unwrap();
        let second = engine.check(&request, &cancelled).unwrap();
        prop_assert_eq!(first.results[&action].effect, second.results[&action].effect);
        prop_assert_eq!(first.results[&action].policy_name, second.results[&action].policy_name);
    }

    #[test]
    fn explicit_deny_always_wins_over_configured_default_allow(
        principal_id in "[a-z]{3,10}@example\\.com",
    ) {
        let engine = PolicyEngine::new(EngineConfig { cache_enabled: false, default_effect: Effect::Allow, ..EngineConfig::default() }).unwrap();
        engine
            .load_resource_policies(vec![ResourcePolicy {
                api_version: "v1".to_string(),
                metadata: Metadata::new("deny-policy"),
                resource: "document".to_string(),
                scope: None,
                rules: vec![ResourceRule {
                    name: None,
                    actions: vec!["write".to_string()],
                    effect: Effect::Deny,
                    roles: vec![],
                    derived_roles: vec![],
                    condition: None,
                }],
            }])
            .unwrap();
        let request = Request::new(Principal::new(principal_id), Resource::new("document", "d1"), vec!["write".to_string()]);
        let cancelled = AtomicBool::new(false);
        let response = engine.check(&request, &cancelled).unwrap();
        prop_assert_eq!(response.results["write"].effect, Effect::Deny);
    }

    #[test]
    fn unmatched_action_resolves_to_configured_default(
        principal_id in "[a-z]{3,10}@example\\.com",
        default in prop::bool::ANY,
    ) {
        let default_effect = if default { Effect::Allow } else { Effect::Deny };
        let engine = PolicyEngine::new(EngineConfig { cache_enabled: false, default_effect, ..EngineConfig::default() }).unwrap();
        let request = Request::new(Principal::new(principal_id), Resource::new("document", "d1"), vec!["archive".to_string()]);
        let cancelled = AtomicBool::new(false);
        let response = engine.check(&request, &cancelled).unwrap();
        prop_assert_eq!(response.results["archive"].effect, default_effect);
    }
}
