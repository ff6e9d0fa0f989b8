//! Evaluation context: the read-only view of principal/resource/auxData a
//! compiled expression is evaluated against, plus the per-request lazily
//! memoised `variables` scope used by derived-role conditions.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::expr::ast::CompiledExpr;
use crate::expr::engine::Engine;
use crate::types::Value;

/// Named sub-expressions declared by a `DerivedRolesPolicy`, evaluated lazily
/// and memoised the first time a condition references `variables.<name>`.
pub struct VariableScope<'a> {
    defs: &'a BTreeMap<String, Arc<CompiledExpr>>,
    memo: RefCell<HashMap<String, Value>>,
}

impl<'a> VariableScope<'a> {
    pub fn new(defs: &'a BTreeMap<String, Arc<CompiledExpr>>) -> Self {
        Self {
            defs,
            memo: RefCell::new(HashMap::new()),
        }
    }

    pub(crate) fn resolve(&self, engine: &Engine, base: &BaseContext, name: &str) -> Value {
        if let Some(v) = self.memo.borrow().get(name) {
            return v.clone();
        }
        let Some(compiled) = self.defs.get(name) else {
            return Value::Null;
        };
        let ctx = EvalContext {
            base,
            variables: Some(self),
        };
        let value = engine
            .eval_compiled(compiled, &ctx)
            .map(Value::Bool)
            .unwrap_or(Value::Null);
        self.memo.borrow_mut().insert(name.to_string(), value.clone());
        value
    }
}

/// The non-variable portion of an evaluation context: principal, resource and
/// auxData, each represented as a `Value::Map`.
pub struct BaseContext {
    pub principal: Value,
    pub resource: Value,
    pub aux_data: Value,
}

impl BaseContext {
    pub fn new(principal: Value, resource: Value, aux_data: Value) -> Self {
        Self {
            principal,
            resource,
            aux_data,
        }
    }
}

pub struct EvalContext<'a> {
    pub base: &'a BaseContext,
    pub variables: Option<&'a VariableScope<'a>>,
}

impl<'a> EvalContext<'a> {
    pub fn new(base: &'a BaseContext) -> Self {
        Self {
            base,
            variables: None,
        }
    }

    pub fn with_variables(base: &'a BaseContext, variables: &'a VariableScope<'a>) -> Self {
        Self {
            base,
            variables: Some(variables),
        }
    }
}
