//! Expression language.
//!
//! Schema strings that begin with `$` are expressions. They are parsed once per
//! distinct source string and evaluated many times against different scopes.
//!
//! ```text
//! "$label"                         -> scope lookup
//! "$item.user.name"                -> member access
//! "$fns.upper($label) + '!'"       -> function call, string concat
//! "$value.length > 3 && $touched"  -> comparison, short-circuit
//! ```
//!
//! A string that does not start with `$` is literal text and is never parsed.
//! `\$` escapes a literal leading dollar.

mod ast;
mod eval;
mod lexer;
mod parser;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::error::{EvalError, ExpressionError};
use crate::types::Value;

pub use ast::{BinaryOp, Expr, Path};
pub use eval::{Function, Resolver, evaluate};
pub use parser::parse;

/// True when a schema string is an expression rather than literal text.
pub fn is_expression(text: &str) -> bool {
    text.starts_with('$')
}

/// Literal text with a leading `\$` escape removed.
pub fn unescape(text: &str) -> &str {
    text.strip_prefix('\\').filter(|rest| rest.starts_with('$')).unwrap_or(text)
}

/// A parsed expression. Cheap to clone and shareable across mounted trees.
#[derive(Clone)]
pub struct CompiledExpression {
    source: Arc<str>,
    ast: Arc<Expr>,
}

impl CompiledExpression {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    pub fn evaluate(&self, resolver: &dyn Resolver) -> Result<Value, EvalError> {
        evaluate(&self.ast, resolver)
    }
}

impl fmt::Debug for CompiledExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CompiledExpression").field(&self.source).finish()
    }
}

impl PartialEq for CompiledExpression {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.ast, &other.ast) || self.source == other.source
    }
}

/// Parse `source` without memoizing.
///
/// The leading `$` sigil is optional: `compile("$a + 1")` and
/// `compile("a + 1")` differ only in how `a` is read (scope lookup versus
/// bare word).
pub fn compile(source: &str) -> Result<CompiledExpression, ExpressionError> {
    let ast = parse(source)?;
    Ok(CompiledExpression {
        source: Arc::from(source),
        ast: Arc::new(ast),
    })
}

/// Memoizing compiler keyed by exact source string.
///
/// Entries are immutable once inserted, so one cache can be shared by any
/// number of interpreters.
#[derive(Default)]
pub struct ExpressionCache {
    entries: RwLock<HashMap<String, CompiledExpression>>,
}

impl ExpressionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, source: &str) -> Option<CompiledExpression> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(source)
            .cloned()
    }

    pub fn set(&self, compiled: CompiledExpression) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(compiled.source().to_string(), compiled);
    }

    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compile through the cache. Parse failures are not cached.
    pub fn compile(&self, source: &str) -> Result<CompiledExpression, ExpressionError> {
        if let Some(hit) = self.get(source) {
            return Ok(hit);
        }
        let compiled = compile(source)?;
        tracing::trace!(source, "compiled expression");
        self.set(compiled.clone());
        Ok(compiled)
    }
}

impl fmt::Debug for ExpressionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionCache").field("len", &self.len()).finish()
    }
}
