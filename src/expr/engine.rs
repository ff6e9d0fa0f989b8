//! Compiles and evaluates the restricted predicate language.
//!
//! Mirrors the compile-cache shape the rest of this codebase uses for
//! condition evaluation: parse once at load time, cache the AST keyed by
//! source text, and evaluate by recursive walk against a per-call context.

use std::sync::Arc;

use dashmap::DashMap;

use crate::expr::ast::{collect_variable_refs, CompiledExpr, Expr};
use crate::expr::context::EvalContext;
use crate::expr::error::{ExpressionError, Result};
use crate::expr::parser;
use crate::types::Value;

/// Compiles conditions once and caches the resulting AST by source text, the
/// same way the rest of the engine caches compiled patterns and scope chains.
#[derive(Debug, Default)]
pub struct Engine {
    cache: DashMap<String, Arc<CompiledExpr>>,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            cache: DashMap::new(),
        }
    }

    /// Compiles `source`, or returns the cached program if this exact text has
    /// been compiled before.
    pub fn compile(&self, source: &str) -> Result<Arc<CompiledExpr>> {
        if let Some(existing) = self.cache.get(source) {
            return Ok(existing.clone());
        }
        let root = parser::parse(source)?;
        let mut referenced_variables = Vec::new();
        collect_variable_refs(&root, &mut referenced_variables);
        let compiled = Arc::new(CompiledExpr {
            root,
            source: source.to_string(),
            referenced_variables,
        });
        self.cache.insert(source.to_string(), compiled.clone());
        Ok(compiled)
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Evaluates a compiled program as a boolean condition. Type mismatches and
    /// unbound-attribute errors are returned to the caller, which is expected to
    /// degrade them to "condition false" per the engine's propagation policy --
    /// this function itself never does that silently, so callers can still count
    /// the diagnostic.
    pub fn eval_compiled(&self, compiled: &CompiledExpr, ctx: &EvalContext) -> Result<bool> {
        let value = self.eval(&compiled.root, ctx)?;
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(ExpressionError::TypeMismatch {
                op: "condition".to_string(),
                detail: format!("expected boolean result, got {other:?}"),
            }),
        }
    }

    pub fn compile_and_eval(&self, source: &str, ctx: &EvalContext) -> Result<bool> {
        let compiled = self.compile(source)?;
        self.eval_compiled(&compiled, ctx)
    }

    fn eval(&self, expr: &Expr, ctx: &EvalContext) -> Result<Value> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Path(segments) => Ok(resolve_path(self, ctx, segments)),
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, ctx)?);
                }
                Ok(Value::List(values))
            }
            Expr::Not(inner) => {
                let v = self.eval(inner, ctx)?;
                match v {
                    Value::Bool(b) => Ok(Value::Bool(!b)),
                    other => Err(ExpressionError::TypeMismatch {
                        op: "!".to_string(),
                        detail: format!("expected boolean, got {other:?}"),
                    }),
                }
            }
            Expr::And(a, b) => {
                if !self.eval_bool(a, ctx)? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval_bool(b, ctx)?))
            }
            Expr::Or(a, b) => {
                if self.eval_bool(a, ctx)? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval_bool(b, ctx)?))
            }
            Expr::Eq(a, b) => Ok(Value::Bool(values_equal(&self.eval(a, ctx)?, &self.eval(b, ctx)?))),
            Expr::Ne(a, b) => Ok(Value::Bool(!values_equal(&self.eval(a, ctx)?, &self.eval(b, ctx)?))),
            Expr::Lt(a, b) => self.eval_order(a, b, ctx, "<", |o| o == std::cmp::Ordering::Less),
            Expr::Le(a, b) => self.eval_order(a, b, ctx, "<=", |o| o != std::cmp::Ordering::Greater),
            Expr::Gt(a, b) => self.eval_order(a, b, ctx, ">", |o| o == std::cmp::Ordering::Greater),
            Expr::Ge(a, b) => self.eval_order(a, b, ctx, ">=", |o| o != std::cmp::Ordering::Less),
            Expr::In(a, b) => {
                let left = self.eval(a, ctx)?;
                let right = self.eval(b, ctx)?;
                match &right {
                    Value::List(items) => Ok(Value::Bool(items.iter().any(|v| values_equal(v, &left)))),
                    Value::Map(map) => match left.as_str() {
                        Some(key) => Ok(Value::Bool(map.contains_key(key))),
                        None => Err(ExpressionError::TypeMismatch {
                            op: "in".to_string(),
                            detail: "map membership requires a string key".to_string(),
                        }),
                    },
                    Value::Null => Ok(Value::Bool(false)),
                    other => Err(ExpressionError::TypeMismatch {
                        op: "in".to_string(),
                        detail: format!("right-hand side must be a list or map, got {other:?}"),
                    }),
                }
            }
            Expr::Like(a, b) => {
                let left = self.eval(a, ctx)?;
                let right = self.eval(b, ctx)?;
                match (left.as_str(), right.as_str()) {
                    (Some(value), Some(pattern)) => Ok(Value::Bool(wildcard_match(pattern, value))),
                    _ => Err(ExpressionError::TypeMismatch {
                        op: "like".to_string(),
                        detail: "both operands must be strings".to_string(),
                    }),
                }
            }
        }
    }

    fn eval_bool(&self, expr: &Expr, ctx: &EvalContext) -> Result<bool> {
        match self.eval(expr, ctx)? {
            Value::Bool(b) => Ok(b),
            other => Err(ExpressionError::TypeMismatch {
                op: "boolean operator".to_string(),
                detail: format!("expected boolean, got {other:?}"),
            }),
        }
    }

    fn eval_order(
        &self,
        a: &Expr,
        b: &Expr,
        ctx: &EvalContext,
        op: &str,
        accept: impl Fn(std::cmp::Ordering) -> bool,
    ) -> Result<Value> {
        let left = self.eval(a, ctx)?;
        let right = self.eval(b, ctx)?;
        if left.is_null() || right.is_null() {
            // Comparing null with anything other than null is false; this applies
            // to ordering comparisons too, not only equality.
            return Ok(Value::Bool(false));
        }
        let ordering = match (&left, &right) {
            (Value::Number(l), Value::Number(r)) => {
                l.partial_cmp(r).ok_or_else(|| ExpressionError::TypeMismatch {
                    op: op.to_string(),
                    detail: "NaN is unordered".to_string(),
                })?
            }
            (Value::String(l), Value::String(r)) => l.cmp(r),
            _ => {
                return Err(ExpressionError::TypeMismatch {
                    op: op.to_string(),
                    detail: format!("cannot order {left:?} and {right:?}"),
                })
            }
        };
        Ok(Value::Bool(accept(ordering)))
    }
}

/// Structural equality where `null == null` is true and `null` compared
/// with anything else is false.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        _ => a == b,
    }
}

/// Translates a `*`-wildcard pattern into an anchored match against `value`.
/// Shares the same wildcard semantics as the principal pattern matcher, but is
/// evaluated directly (not cached) since conditions are already cached whole.
fn wildcard_match(pattern: &str, value: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == value;
    }
    let parts: Vec<&str> = pattern.split('*').collect();
    let mut pos = 0;
    for (idx, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        match value[pos..].find(part) {
            Some(found) => {
                if idx == 0 && found != 0 {
                    return false;
                }
                pos += found + part.len();
            }
            None => return false,
        }
    }
    if let Some(last) = parts.last() {
        if !last.is_empty() && !value.ends_with(last) {
            return false;
        }
    }
    true
}

fn resolve_path(engine: &Engine, ctx: &EvalContext, segments: &[String]) -> Value {
    if segments.is_empty() {
        return Value::Null;
    }
    match segments[0].as_str() {
        "principal" => navigate(&ctx.base.principal, &segments[1..]),
        "resource" => navigate(&ctx.base.resource, &segments[1..]),
        "auxData" => navigate(&ctx.base.aux_data, &segments[1..]),
        "variables" => {
            if segments.len() < 2 {
                return Value::Null;
            }
            match ctx.variables {
                Some(scope) => scope.resolve(engine, ctx.base, &segments[1]),
                None => Value::Null,
            }
        }
        _ => Value::Null,
    }
}

fn navigate(root: &Value, segments: &[String]) -> Value {
    if segments.is_empty() {
        return root.clone();
    }
    root.get_path(&segments.join("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::context::BaseContext;
    use std::collections::BTreeMap;

    fn ctx_with(principal_attrs: &[(&str, &str)], resource_attrs: &[(&str, &str)]) -> BaseContext {
        let mut p = BTreeMap::new();
        let mut attrs = BTreeMap::new();
        for (k, v) in principal_attrs {
            attrs.insert(k.to_string(), Value::String(v.to_string()));
        }
        p.insert("attributes".to_string(), Value::Map(attrs));
        p.insert("id".to_string(), Value::String("u1".to_string()));

        let mut r = BTreeMap::new();
        let mut rattrs = BTreeMap::new();
        for (k, v) in resource_attrs {
            rattrs.insert(k.to_string(), Value::String(v.to_string()));
        }
        r.insert("attributes".to_string(), Value::Map(rattrs));

        BaseContext::new(Value::Map(p), Value::Map(r), Value::Map(BTreeMap::new()))
    }

    #[test]
    fn evaluates_simple_literal() {
        let engine = Engine::new();
        let base = ctx_with(&[], &[]);
        let ctx = EvalContext::new(&base);
        assert!(engine.compile_and_eval("true", &ctx).unwrap());
        assert!(!engine.compile_and_eval("false", &ctx).unwrap());
    }

    #[test]
    fn evaluates_attribute_equality() {
        let engine = Engine::new();
        let base = ctx_with(&[], &[("ownerId", "u1")]);
        let ctx = EvalContext::new(&base);
        assert!(engine
            .compile_and_eval("resource.attributes.ownerId == principal.id", &ctx)
            .unwrap());
    }

    #[test]
    fn undefined_attribute_is_null_not_error() {
        let engine = Engine::new();
        let base = ctx_with(&[], &[]);
        let ctx = EvalContext::new(&base);
        assert!(engine
            .compile_and_eval("resource.attributes.missing == null", &ctx)
            .unwrap());
    }

    #[test]
    fn null_compared_with_non_null_is_false() {
        let engine = Engine::new();
        let base = ctx_with(&[], &[]);
        let ctx = EvalContext::new(&base);
        assert!(!engine
            .compile_and_eval("resource.attributes.missing == \"x\"", &ctx)
            .unwrap());
    }

    #[test]
    fn short_circuits_and() {
        let engine = Engine::new();
        let base = ctx_with(&[], &[]);
        let ctx = EvalContext::new(&base);
        // the right side would error if evaluated (type mismatch), so this only
        // passes if && actually short-circuits on a false left side.
        assert!(!engine
            .compile_and_eval("false && (1 < \"x\")", &ctx)
            .unwrap());
    }

    #[test]
    fn membership_in_list() {
        let engine = Engine::new();
        let base = ctx_with(&[], &[]);
        let ctx = EvalContext::new(&base);
        assert!(engine
            .compile_and_eval("principal.id in [\"u1\", \"u2\"]", &ctx)
            .unwrap());
    }

    #[test]
    fn like_wildcard_pattern() {
        let engine = Engine::new();
        let base = ctx_with(&[], &[("name", "doc-report-final")]);
        let ctx = EvalContext::new(&base);
        assert!(engine
            .compile_and_eval("resource.attributes.name like \"doc-*-final\"", &ctx)
            .unwrap());
    }

    #[test]
    fn type_mismatch_on_bad_comparison() {
        let engine = Engine::new();
        let base = ctx_with(&[], &[]);
        let ctx = EvalContext::new(&base);
        let result = engine.compile_and_eval("1 < \"x\"", &ctx);
        assert!(result.is_err());
    }

    #[test]
    fn compile_cache_reuses_program() {
        let engine = Engine::new();
        engine.compile("true").unwrap();
        engine.compile("true").unwrap();
        assert_eq!(engine.cache_len(), 1);
    }
}
