//! Core data model: principals, resources, requests, and the tagged value union
//! that attribute bags and condition expressions operate over.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A dynamically typed attribute value.
///
/// Attribute bags (`Principal::attributes`, `Resource::attributes`, `Request::aux_data`)
/// and the expression evaluator both operate on this union rather than on
/// unconstrained generics. `Map` is a `BTreeMap` so that canonical serialisation
/// (used for cache fingerprints) is deterministic without a separate sort pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Navigates a dot-separated attribute path (e.g. `attributes.ownerId`) starting
    /// from this value. Missing segments resolve to `Value::Null` rather than an
    /// error, matching the evaluator's undefined-attribute semantics.
    pub fn get_path(&self, path: &str) -> Value {
        let mut current = self;
        for segment in path.split('.') {
            match current.as_map().and_then(|m| m.get(segment)) {
                Some(v) => current = v,
                None => return Value::Null,
            }
        }
        current.clone()
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

/// The requesting identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: BTreeSet::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = String>) -> Self {
        self.roles = roles.into_iter().collect();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// The object being acted upon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub kind: String,
    pub id: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl Resource {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            attributes: BTreeMap::new(),
            scope: None,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

/// A single authorization request: one principal, one resource, one or more actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub request_id: Option<String>,
    pub principal: Principal,
    pub resource: Resource,
    pub actions: Vec<String>,
    #[serde(default)]
    pub aux_data: Option<BTreeMap<String, Value>>,
}

impl Request {
    pub fn new(principal: Principal, resource: Resource, actions: Vec<String>) -> Self {
        Self {
            request_id: None,
            principal,
            resource,
            actions,
            aux_data: None,
        }
    }

    /// Validates the structural invariants `check` requires: non-empty actions,
    /// no duplicate action names.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::AuthzError;

        if self.principal.id.is_empty() {
            return Err(AuthzError::InvalidRequest("principal.id is empty".into()));
        }
        if self.resource.kind.is_empty() {
            return Err(AuthzError::InvalidRequest("resource.kind is empty".into()));
        }
        if self.actions.is_empty() {
            return Err(AuthzError::InvalidRequest("actions must not be empty".into()));
        }
        let mut seen = BTreeSet::new();
        for action in &self.actions {
            if action.is_empty() {
                return Err(AuthzError::InvalidRequest("action name is empty".into()));
            }
            if !seen.insert(action.as_str()) {
                return Err(AuthzError::InvalidRequest(format!(
                    "duplicate action '{action}'"
                )));
            }
        }
        Ok(())
    }
}

/// The two possible decision outcomes. A missing match resolves to the engine's
/// configured default effect rather than an absence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn is_allow(&self) -> bool {
        matches!(self, Effect::Allow)
    }
}

/// A layer's intermediate verdict for one action: it either produced an explicit
/// effect, or had nothing to say (`None`). Returned by rule selection
/// (`engine::selector`) so "no rule matched" and "a rule matched with effect
/// X" are one type instead of an `Option<Effect>` the caller has to unwrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerEffect {
    Allow,
    Deny,
    None,
}

impl From<Effect> for LayerEffect {
    fn from(effect: Effect) -> Self {
        match effect {
            Effect::Allow => LayerEffect::Allow,
            Effect::Deny => LayerEffect::Deny,
        }
    }
}

impl LayerEffect {
    pub fn is_none(&self) -> bool {
        matches!(self, LayerEffect::None)
    }
}

/// The decision for a single requested action, with full attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub effect: Effect,
    pub policy_name: String,
    #[serde(default)]
    pub rule_name: Option<String>,
    #[serde(default)]
    pub matched_derived_roles: Option<BTreeSet<String>>,
    pub evaluation_duration_micros: u64,
}

/// The synthetic policy name attributed to a result produced by the engine's
/// configured default effect rather than any matching policy.
pub const DEFAULT_POLICY_NAME: &str = "<default>";

/// Response-level metadata accompanying a `CheckResponse`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub total_duration_micros: u64,
    pub policies_evaluated: BTreeSet<String>,
    pub cache_hit: bool,
}

/// The result of one `check` call: one `ActionResult` per requested action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResponse {
    #[serde(default)]
    pub request_id: Option<String>,
    pub results: BTreeMap<String, ActionResult>,
    pub meta: ResponseMeta,
}
