//! Resolves the set of derived roles a principal holds for one request
//! (§4.4): evaluates each definition's parent-role requirement (OR logic)
//! and condition, in the dependency order [`graph::DependencyGraph`]
//! establishes, with a per-request memoisation cache.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::{AuthzError, Result};
use crate::expr::{CompiledExpr, Engine, VariableScope};
use crate::types::{Principal, Resource, Value};

use super::graph::{DependencyGraphBuilder, GraphError};
use super::types::DerivedRole;

fn map_graph_error(name: &str, e: GraphError) -> AuthzError {
    match e {
        GraphError::CircularDependency(msg) => {
            AuthzError::InvalidPolicy { name: name.to_string(), reason: format!("circular derived-role dependency: {msg}") }
        }
        GraphError::DuplicateRole(role) => {
            AuthzError::InvalidPolicy { name: name.to_string(), reason: format!("duplicate derived role: {role}") }
        }
        GraphError::InvalidRole(msg) => AuthzError::InvalidPolicy { name: name.to_string(), reason: msg },
    }
}

/// Holds the active set of derived-role definitions plus the policy-level
/// `variables` named sub-expressions they may reference, in load order.
#[derive(Clone)]
pub struct RoleResolver {
    engine: Arc<Engine>,
    derived_roles: Arc<Vec<DerivedRole>>,
    evaluation_order: Arc<Vec<String>>,
    variable_defs: Arc<BTreeMap<String, Arc<CompiledExpr>>>,
}

impl RoleResolver {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            derived_roles: Arc::new(Vec::new()),
            evaluation_order: Arc::new(Vec::new()),
            variable_defs: Arc::new(BTreeMap::new()),
        }
    }

    /// Replaces the active derived-role definitions and their shared
    /// `variables` (raw expression source, keyed by name). Validates
    /// uniqueness, acyclicity and that every condition and variable parses.
    pub fn load(&mut self, roles: Vec<DerivedRole>, variables: BTreeMap<String, String>) -> Result<()> {
        let mut builder = DependencyGraphBuilder::new();
        for role in &roles {
            builder.add_role(role.clone()).map_err(|e| map_graph_error(&role.name, e))?;
        }
        let evaluation_order = builder.build().and_then(|g| g.resolve_order()).map_err(|e| map_graph_error("<bundle>", e))?;

        let mut compiled_variables = BTreeMap::new();
        for (name, source) in &variables {
            let compiled = self.engine.compile(source).map_err(|e| AuthzError::InvalidPolicy {
                name: name.clone(),
                reason: format!("variable does not parse: {e}"),
            })?;
            compiled_variables.insert(name.clone(), compiled);
        }

        self.derived_roles = Arc::new(roles);
        self.evaluation_order = Arc::new(evaluation_order);
        self.variable_defs = Arc::new(compiled_variables);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.derived_roles = Arc::new(Vec::new());
        self.evaluation_order = Arc::new(Vec::new());
        self.variable_defs = Arc::new(BTreeMap::new());
    }

    pub fn role_count(&self) -> usize {
        self.derived_roles.len()
    }

    pub fn role_names(&self) -> Vec<String> {
        self.derived_roles.iter().map(|r| r.name.clone()).collect()
    }

    /// The compiled `variables` definitions currently loaded, for building a
    /// [`VariableScope`] shared with resource/principal condition evaluation.
    pub fn variable_defs(&self) -> Arc<BTreeMap<String, Arc<CompiledExpr>>> {
        self.variable_defs.clone()
    }

    /// Computes the derived roles granted for one (principal, resource,
    /// auxData) triple, in dependency order so a condition referencing an
    /// earlier-evaluated derived role through `variables` sees its result.
    pub fn resolve(
        &self,
        principal: &Principal,
        resource: &Resource,
        aux_data: Option<&BTreeMap<String, Value>>,
    ) -> BTreeSet<String> {
        let variable_scope = VariableScope::new(&self.variable_defs);
        let mut granted = BTreeSet::new();

        for role_name in self.evaluation_order.iter() {
            let Some(role) = self.derived_roles.iter().find(|r| &r.name == role_name) else { continue };
            let mut effective_principal = principal.clone();
            effective_principal.roles.extend(granted.iter().cloned());
            if role.is_granted(&self.engine, &effective_principal, resource, aux_data, &variable_scope) {
                granted.insert(role.name.clone());
            }
        }

        granted
    }
}

/// Per-request memoisation for [`RoleResolver::resolve`], keyed by
/// `(principalId, sorted parent roles, resourceKind, resourceId)` per
/// §4.4. Constructed fresh per request and discarded at request end.
#[derive(Default)]
pub struct DerivedRoleCache {
    memo: std::sync::Mutex<BTreeMap<CacheKey, BTreeSet<String>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct CacheKey {
    principal_id: String,
    sorted_roles: Vec<String>,
    resource_kind: String,
    resource_id: String,
}

impl DerivedRoleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_resolve(
        &self,
        resolver: &RoleResolver,
        principal: &Principal,
        resource: &Resource,
        aux_data: Option<&BTreeMap<String, Value>>,
    ) -> BTreeSet<String> {
        let mut sorted_roles: Vec<String> = principal.roles.iter().cloned().collect();
        sorted_roles.sort();
        let key = CacheKey {
            principal_id: principal.id.clone(),
            sorted_roles,
            resource_kind: resource.kind.clone(),
            resource_id: resource.id.clone(),
        };

        if let Some(existing) = self.memo.lock().unwrap().get(&key) {
            return existing.clone();
        }
        let resolved = resolver.resolve(principal, resource, aux_data);
        self.memo.lock().unwrap().insert(key, resolved.clone());
        resolved
    }
}
