//! The restricted predicate language used by policy conditions (§4.1).
//!
//! Conditions are compiled once into an [`ast::Expr`] tree at policy load and
//! evaluated by a recursive walk (`engine::Engine::eval`) against a per-call
//! [`context::EvalContext`]. There are no user function calls, loops, or
//! assignment -- the grammar is intentionally closed.

pub mod ast;
pub mod context;
pub mod engine;
pub mod error;
pub mod parser;

pub use ast::CompiledExpr;
pub use context::{BaseContext, EvalContext, VariableScope};
pub use engine::Engine;
pub use error::{ExpressionError, Result};

use crate::types::{Principal, Resource, Value};
use std::collections::BTreeMap;

/// Converts a principal into the `Value::Map` representation the evaluator
/// navigates (`principal.id`, `principal.roles`, `principal.attributes.*`).
pub fn principal_to_value(principal: &Principal) -> Value {
    let mut map = BTreeMap::new();
    map.insert("id".to_string(), Value::String(principal.id.clone()));
    map.insert(
        "roles".to_string(),
        Value::List(principal.roles.iter().map(|r| Value::String(r.clone())).collect()),
    );
    map.insert("attributes".to_string(), Value::Map(principal.attributes.clone()));
    Value::Map(map)
}

/// Converts a resource into the `Value::Map` representation the evaluator
/// navigates (`resource.kind`, `resource.id`, `resource.attributes.*`).
pub fn resource_to_value(resource: &Resource) -> Value {
    let mut map = BTreeMap::new();
    map.insert("kind".to_string(), Value::String(resource.kind.clone()));
    map.insert("id".to_string(), Value::String(resource.id.clone()));
    map.insert("attributes".to_string(), Value::Map(resource.attributes.clone()));
    Value::Map(map)
}

pub fn aux_data_to_value(aux_data: Option<&BTreeMap<String, Value>>) -> Value {
    Value::Map(aux_data.cloned().unwrap_or_default())
}
