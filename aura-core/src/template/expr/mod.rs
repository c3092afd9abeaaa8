//! Template Expressions
//!
//! Attribute values and `{{ }}` bodies are small script expressions. They are
//! parsed once into an [`Expr`] tree and evaluated against a [`Scope`] on
//! every render. Inside the render pipeline a failing expression is never
//! fatal: it evaluates to `undefined` and the failure is logged at `debug`.

mod ast;
mod eval;
mod parser;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

pub use ast::{BinaryOp, Expr, LogicalOp, TemplatePart, UnaryOp};
pub use eval::{eval, EvalResult};
pub use parser::{parse, ParseResult};

use crate::error::{Error, Result};
use crate::template::Scope;
use crate::value::Value;

/// A parsed expression together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    ast: Expr,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self> {
        let ast = parser::parse(source).map_err(|reason| Error::expression(source, reason))?;
        Ok(Self {
            source: source.to_string(),
            ast,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    /// The dotted path this expression names, if it is a plain path.
    pub fn path(&self) -> Option<Vec<String>> {
        self.ast.as_path()
    }

    /// Evaluate, surfacing failures.
    pub fn try_evaluate(&self, scope: &Scope) -> Result<Value> {
        eval::eval(&self.ast, scope).map_err(|reason| Error::expression(&self.source, reason))
    }

    /// Evaluate, treating any failure as `undefined`.
    pub fn evaluate(&self, scope: &Scope) -> Value {
        eval::eval(&self.ast, scope).unwrap_or_else(|reason| {
            tracing::debug!(expr = %self.source, %reason, "expression evaluated to undefined");
            Value::Undefined
        })
    }
}

/// Parse-once cache keyed by source text. Sources that fail to parse are
/// remembered too, so they are only reported once.
#[derive(Debug, Default)]
pub struct ExprCache {
    entries: Mutex<HashMap<String, Option<Arc<Expression>>>>,
}

impl ExprCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, source: &str) -> Option<Arc<Expression>> {
        if let Some(cached) = self.entries.lock().get(source) {
            return cached.clone();
        }

        let parsed = match Expression::parse(source) {
            Ok(expr) => Some(Arc::new(expr)),
            Err(err) => {
                tracing::debug!(%err, "expression failed to parse");
                None
            }
        };
        self.entries.lock().insert(source.to_string(), parsed.clone());
        parsed
    }

    /// Parse (or reuse) and evaluate `source`. Unparseable sources evaluate
    /// to `undefined`.
    pub fn evaluate(&self, source: &str, scope: &Scope) -> Value {
        match self.get(source) {
            Some(expr) => expr.evaluate(scope),
            None => Value::Undefined,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_errors_carry_source() {
        let err = Expression::parse("a +").unwrap_err();
        assert!(err.to_string().contains("`a +`"));
    }

    #[test]
    fn evaluate_swallows_failures() {
        let expr = Expression::parse("missing.name").unwrap();
        assert_eq!(expr.evaluate(&Scope::default()), Value::Undefined);
        assert!(expr.try_evaluate(&Scope::default()).is_err());
    }

    #[test]
    fn cache_parses_once() {
        let cache = ExprCache::new();
        let a = cache.get("1 + 1").unwrap();
        let b = cache.get("1 + 1").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(cache.get("1 +").is_none());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.evaluate("1 +", &Scope::default()), Value::Undefined);
    }

    #[test]
    fn paths() {
        let expr = Expression::parse("form.name").unwrap();
        assert_eq!(expr.path(), Some(vec!["form".to_string(), "name".to_string()]));
        assert_eq!(Expression::parse("a + b").unwrap().path(), None);
    }
}
