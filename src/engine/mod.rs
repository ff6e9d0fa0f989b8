//! The policy engine orchestrator (§2, §6): loads policy bundles, resolves
//! derived roles and scope, combines the principal and resource layers
//! (§4.7), and dispatches multi-action requests across a bounded worker pool
//! (§4.9), optionally backed by a fingerprinted evaluation cache (§4.8).

pub mod cache;
pub mod config;
pub mod dispatch;
pub mod selector;

pub use cache::{CacheStatsSnapshot, EvaluationCache};
pub use config::{EngineConfig, EngineConfigBuilder};
pub use dispatch::ActionDispatcher;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tracing::{debug, instrument, warn};

use crate::derived_roles::{DerivedRole, DerivedRoleCache, RoleResolver};
use crate::error::{AuthzError, Result};
use crate::expr::{Engine as ExprEngine, VariableScope};
use crate::pattern::PatternMatcher;
use crate::policy::{DerivedRolesPolicy, PolicyCounts, PolicyIndex, PrincipalPolicy, ResourcePolicy};
use crate::scope::ScopeResolver;
use crate::types::{ActionResult, CheckResponse, Effect, LayerEffect, Principal, Request, Resource, ResponseMeta};

use selector::{select_principal_effect, select_resource_effect};

/// `planResources`'s three possible answers (§6): a constant verdict, or a
/// condition left in terms of the resource's (unknown, at plan time)
/// attributes for the caller to push down into a query.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanResult {
    AlwaysAllow,
    AlwaysDeny,
    Conditional { condition: String },
}

/// §6's `getStats()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_evictions: u64,
    pub policy_counts: PolicyCountsSnapshot,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolicyCountsSnapshot {
    pub resource_policies: usize,
    pub derived_roles: usize,
    pub principal_policies: usize,
}

impl From<PolicyCounts> for PolicyCountsSnapshot {
    fn from(c: PolicyCounts) -> Self {
        Self {
            resource_policies: c.resource_policies,
            derived_roles: c.derived_roles,
            principal_policies: c.principal_policies,
        }
    }
}

/// The authorization decision engine. Cheap to clone (every field is an
/// `Arc`); share one instance across the request-handling threads of a
/// server.
#[derive(Clone)]
pub struct PolicyEngine {
    config: EngineConfig,
    index: Arc<PolicyIndex>,
    expr_engine: Arc<ExprEngine>,
    role_resolver: Arc<RwLock<RoleResolver>>,
    scope_resolver: Arc<ScopeResolver>,
    pattern_matcher: Arc<PatternMatcher>,
    cache: Option<Arc<EvaluationCache>>,
    dispatcher: Arc<ActionDispatcher>,
}

impl PolicyEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let expr_engine = Arc::new(ExprEngine::new());
        let cache = config.cache_enabled.then(|| {
            Arc::new(EvaluationCache::new(
                config.cache_size,
                std::time::Duration::from_millis(config.cache_ttl_millis),
            ))
        });
        Ok(Self {
            index: Arc::new(PolicyIndex::new()),
            expr_engine: expr_engine.clone(),
            role_resolver: Arc::new(RwLock::new(RoleResolver::new(expr_engine))),
            scope_resolver: Arc::new(ScopeResolver::new(config.max_scope_depth)),
            pattern_matcher: Arc::new(PatternMatcher::default()),
            dispatcher: Arc::new(ActionDispatcher::new(config.parallel_workers)),
            cache,
            config,
        })
    }

    pub fn load_resource_policies(&self, policies: Vec<ResourcePolicy>) -> Result<()> {
        self.index.load_resource_policies(policies)?;
        self.invalidate_cache();
        Ok(())
    }

    /// Reloads the full set of derived-role definitions and rebuilds the
    /// dependency-ordered resolver. Derived roles accumulate bundle-wide
    /// (§4.4 names must be globally unique), so this reloads from the
    /// index's combined set rather than appending incrementally.
    pub fn load_derived_roles_policies(&self, policies: Vec<DerivedRolesPolicy>) -> Result<()> {
        self.index.load_derived_roles_policies(policies)?;
        self.rebuild_role_resolver()?;
        self.invalidate_cache();
        Ok(())
    }

    pub fn load_principal_policies(&self, policies: Vec<PrincipalPolicy>) -> Result<()> {
        self.index.load_principal_policies(policies)?;
        self.invalidate_cache();
        Ok(())
    }

    pub fn clear_policies(&self) -> Result<()> {
        self.index.clear();
        self.rebuild_role_resolver()?;
        self.invalidate_cache();
        Ok(())
    }

    fn rebuild_role_resolver(&self) -> Result<()> {
        let roles: Vec<DerivedRole> = self.index.derived_roles();
        let variables = self.index.variables();
        self.role_resolver.write().load(roles, variables)
    }

    fn invalidate_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    #[instrument(skip(self, request), fields(principal = %request.principal.id, resource = %request.resource.kind))]
    pub fn check(&self, request: &Request, cancelled: &AtomicBool) -> Result<CheckResponse> {
        request.validate()?;
        if cancelled.load(Ordering::Relaxed) {
            return Err(AuthzError::Cancelled);
        }

        let generation = self.index.generation();
        match &self.cache {
            Some(cache) => {
                let key = cache::fingerprint(
                    &request.principal,
                    &request.resource,
                    &request.actions,
                    request.aux_data.as_ref(),
                    generation,
                );
                cache.get_or_compute(key, || self.evaluate(request, cancelled))
            }
            None => self.evaluate(request, cancelled),
        }
    }

    pub fn check_batch(&self, requests: &[Request], cancelled: &AtomicBool) -> Result<Vec<CheckResponse>> {
        requests.iter().map(|r| self.check(r, cancelled)).collect()
    }

    /// Fixes `principal` and `action`, and reports whether the result is
    /// independent of the resource's attributes (`AlwaysAllow`/`AlwaysDeny`)
    /// or depends on them (`Conditional`, carrying the unevaluated
    /// condition for the caller to push down).
    pub fn plan_resources(&self, principal: &Principal, resource_kind: &str, action: &str) -> Result<PlanResult> {
        let principal_policies = self.index.principal_policies();
        for policy in &principal_policies {
            if !self.pattern_matcher.matches_principal(&policy.principal, &principal.id) {
                continue;
            }
            for rule in &policy.rules {
                if !self.pattern_matcher.matches_principal(&rule.resource, resource_kind) {
                    continue;
                }
                for action_rule in &rule.actions {
                    if !crate::pattern::matches_action(&action_rule.action, action) {
                        continue;
                    }
                    if action_rule.condition.is_none() && action_rule.effect == Effect::Deny {
                        return Ok(PlanResult::AlwaysDeny);
                    }
                }
            }
        }

        let resource_policies = self.index.resource_policies_at(crate::scope::GLOBAL, resource_kind);
        for policy in &resource_policies {
            for rule in &policy.rules {
                if !rule.actions.iter().any(|p| crate::pattern::matches_action(p, action)) {
                    continue;
                }
                let open_to_principal = rule.roles.is_empty() && rule.derived_roles.is_empty()
                    || rule.roles.iter().any(|r| principal.has_role(r));
                if !open_to_principal {
                    continue;
                }
                return Ok(match &rule.condition {
                    Some(condition) => PlanResult::Conditional { condition: condition.clone() },
                    None => match rule.effect {
                        Effect::Allow => PlanResult::AlwaysAllow,
                        Effect::Deny => PlanResult::AlwaysDeny,
                    },
                });
            }
        }

        Ok(match self.config.default_effect {
            Effect::Allow => PlanResult::AlwaysAllow,
            Effect::Deny => PlanResult::AlwaysDeny,
        })
    }

    pub fn get_stats(&self) -> EngineStats {
        let cache_stats = self.cache.as_ref().map(|c| c.stats()).unwrap_or_default();
        EngineStats {
            cache_hits: cache_stats.hits,
            cache_misses: cache_stats.misses,
            cache_evictions: cache_stats.evictions,
            policy_counts: self.index.counts().into(),
        }
    }

    fn evaluate(&self, request: &Request, cancelled: &AtomicBool) -> Result<CheckResponse> {
        let started = Instant::now();
        let derived_role_cache = DerivedRoleCache::new();
        let role_resolver = self.role_resolver.read().clone();
        let principal_policies = self.index.principal_policies();
        let policies_evaluated = std::sync::Mutex::new(BTreeSet::new());

        let outcomes = if request.actions.len() > 1 {
            self.dispatcher.dispatch(&request.actions, cancelled, |action| {
                self.evaluate_action(
                    request,
                    action,
                    &role_resolver,
                    &derived_role_cache,
                    &principal_policies,
                    &policies_evaluated,
                )
            })?
        } else {
            request
                .actions
                .iter()
                .map(|action| {
                    self.evaluate_action(
                        request,
                        action,
                        &role_resolver,
                        &derived_role_cache,
                        &principal_policies,
                        &policies_evaluated,
                    )
                })
                .collect()
        };

        if cancelled.load(Ordering::Relaxed) {
            return Err(AuthzError::Cancelled);
        }

        let mut results = std::collections::BTreeMap::new();
        for (action, result) in request.actions.iter().zip(outcomes) {
            results.insert(action.clone(), result);
        }

        // §3 leaves `requestId` optional on the inbound `Request`; every
        // response still carries one, so callers can always correlate a
        // decision back to a `tracing` span even when they didn't supply one.
        let request_id = request.request_id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Ok(CheckResponse {
            request_id: Some(request_id),
            results,
            meta: ResponseMeta {
                total_duration_micros: started.elapsed().as_micros() as u64,
                policies_evaluated: policies_evaluated.into_inner().unwrap(),
                cache_hit: false,
            },
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn evaluate_action(
        &self,
        request: &Request,
        action: &str,
        role_resolver: &RoleResolver,
        derived_role_cache: &DerivedRoleCache,
        principal_policies: &[PrincipalPolicy],
        policies_evaluated: &std::sync::Mutex<BTreeSet<String>>,
    ) -> ActionResult {
        let started = Instant::now();
        let variable_scope_holder = role_resolver.variable_defs();
        let variables = VariableScope::new(&variable_scope_holder);

        let granted_derived_roles = derived_role_cache.get_or_resolve(
            role_resolver,
            &request.principal,
            &request.resource,
            request.aux_data.as_ref(),
        );

        let principal_match = select_principal_effect(
            principal_policies,
            &self.pattern_matcher,
            &self.expr_engine,
            &request.principal,
            &request.resource,
            action,
            request.aux_data.as_ref(),
            &variables,
        );
        if let Some(name) = &principal_match.policy_name {
            policies_evaluated.lock().unwrap().insert(name.clone());
        }
        if principal_match.effect == LayerEffect::Deny {
            return ActionResult {
                effect: Effect::Deny,
                policy_name: principal_match.policy_name.unwrap(),
                rule_name: principal_match.rule_name,
                matched_derived_roles: principal_match.matched_derived_roles,
                evaluation_duration_micros: started.elapsed().as_micros() as u64,
            };
        }

        let effective_scope = match self.scope_resolver.effective_scope(None, request.resource.scope.as_deref()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "invalid scope on resource, treating as unscoped");
                None
            }
        };
        let matched_scope = self
            .scope_resolver
            .find_matching_scope(effective_scope.as_deref(), |candidate| {
                !self.index.resource_policies_at(candidate, &request.resource.kind).is_empty()
            })
            .unwrap_or(None);
        let resource_policies = matched_scope
            .map(|scope| self.index.resource_policies_at(&scope, &request.resource.kind))
            .unwrap_or_default();

        let resource_match = select_resource_effect(
            &resource_policies,
            &self.expr_engine,
            &request.principal,
            &request.resource,
            action,
            &granted_derived_roles,
            request.aux_data.as_ref(),
            &variables,
        );
        if let Some(name) = &resource_match.policy_name {
            policies_evaluated.lock().unwrap().insert(name.clone());
        }

        let (effect, policy_name, rule_name, matched_derived_roles) = match resource_match.effect {
            LayerEffect::Deny => {
                (Effect::Deny, resource_match.policy_name.unwrap(), resource_match.rule_name, resource_match.matched_derived_roles)
            }
            LayerEffect::Allow => {
                (Effect::Allow, resource_match.policy_name.unwrap(), resource_match.rule_name, resource_match.matched_derived_roles)
            }
            LayerEffect::None if principal_match.effect == LayerEffect::Allow => {
                (Effect::Allow, principal_match.policy_name.unwrap(), principal_match.rule_name, principal_match.matched_derived_roles)
            }
            LayerEffect::None => (self.config.default_effect, crate::types::DEFAULT_POLICY_NAME.to_string(), None, None),
        };

        debug!(action, ?effect, policy_name, "action evaluated");
        ActionResult {
            effect,
            policy_name,
            rule_name,
            matched_derived_roles,
            evaluation_duration_micros: started.elapsed().as_micros() as u64,
        }
    }
}
