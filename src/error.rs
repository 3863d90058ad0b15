//! Error types.
//!
//! Parse errors are fatal to the schema being assembled. Evaluation errors are
//! recoverable: the interpreter keeps the last good output and reports them
//! through [`Diagnostics`](crate::pipeline::Diagnostics).

use thiserror::Error;

/// A violation of the expression grammar.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    /// The source was empty or only whitespace.
    #[error("invalid expression: empty")]
    Empty,

    /// The expression begins with a binary operator.
    #[error("expression cannot start with an operator ({operator} in \"{expression}\")")]
    LeadingOperator {
        /// The offending operator.
        operator: String,
        /// Full expression text.
        expression: String,
    },

    /// The expression ends with a binary operator.
    #[error("expression cannot end with an operator ({fragment} in \"{expression}\")")]
    TrailingOperator {
        /// Last operand and the dangling operator, e.g. `10+`.
        fragment: String,
        /// Full expression text.
        expression: String,
    },

    /// A token appeared where the grammar does not allow it.
    #[error("unexpected `{token}` in \"{expression}\"")]
    UnexpectedToken { token: String, expression: String },

    #[error("unterminated string literal in \"{expression}\"")]
    UnterminatedString { expression: String },

    #[error("unbalanced parentheses in \"{expression}\"")]
    UnbalancedParens { expression: String },

    #[error("expected an operand in \"{expression}\"")]
    ExpectedOperand { expression: String },
}

/// A failure while evaluating a compiled expression against a live scope.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("cannot apply `{op}` to {left} and {right}")]
    InvalidOperands {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    /// A scope function returned an error.
    #[error("function `{name}` failed: {message}")]
    Function { name: String, message: String },
}

/// Errors raised while assembling or loading a schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// An embedded expression failed to parse.
    #[error("{location}: {source}")]
    Expression {
        source: ExpressionError,
        /// Where in the schema the expression lives, e.g. `label.attrs.class`.
        location: String,
    },

    #[error("invalid `for` directive: {0}")]
    InvalidFor(String),

    #[error("invalid schema node: {0}")]
    InvalidNode(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SchemaError {
    pub(crate) fn expression(location: impl Into<String>, source: ExpressionError) -> Self {
        Self::Expression {
            source,
            location: location.into(),
        }
    }
}
