//! The restricted expression AST.
//!
//! Conditions compile once, at policy load, into this tree. Evaluation is a
//! recursive walk with no user function calls, no loops, and no assignment.

use crate::types::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// A dotted attribute path, e.g. `principal.attributes.ownerId` is
    /// `["principal", "attributes", "ownerId"]`.
    Path(Vec<String>),
    List(Vec<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
    Lt(Box<Expr>, Box<Expr>),
    Le(Box<Expr>, Box<Expr>),
    Gt(Box<Expr>, Box<Expr>),
    Ge(Box<Expr>, Box<Expr>),
    /// `a in b`: value membership in a list, or key membership in a map.
    In(Box<Expr>, Box<Expr>),
    /// `a like b`: wildcard string-pattern match (`*` only), distinct from `==`.
    Like(Box<Expr>, Box<Expr>),
}

/// A compiled, ready-to-evaluate condition. Immutable once built; stored in
/// `Arc` so multiple rules/policies can share the same compiled program when
/// the source expression text is identical.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpr {
    pub(crate) root: Expr,
    pub(crate) source: String,
    /// Every top-level identifier the expression's path roots touch under
    /// `variables.*`, used by the derived-role dependency scan (§4.4).
    pub(crate) referenced_variables: Vec<String>,
}

impl CompiledExpr {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn referenced_variables(&self) -> &[String] {
        &self.referenced_variables
    }
}

pub(crate) fn collect_variable_refs(expr: &Expr, out: &mut Vec<String>) {
    match expr {
        Expr::Path(segments) => {
            if segments.len() >= 2 && segments[0] == "variables" {
                let name = segments[1].clone();
                if !out.contains(&name) {
                    out.push(name);
                }
            }
        }
        Expr::List(items) => items.iter().for_each(|e| collect_variable_refs(e, out)),
        Expr::Not(e) => collect_variable_refs(e, out),
        Expr::And(a, b)
        | Expr::Or(a, b)
        | Expr::Eq(a, b)
        | Expr::Ne(a, b)
        | Expr::Lt(a, b)
        | Expr::Le(a, b)
        | Expr::Gt(a, b)
        | Expr::Ge(a, b)
        | Expr::In(a, b)
        | Expr::Like(a, b) => {
            collect_variable_refs(a, out);
            collect_variable_refs(b, out);
        }
        Expr::Literal(_) => {}
    }
}
