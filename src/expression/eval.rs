//! Expression evaluation against a scope.

use std::rc::Rc;

use crate::error::EvalError;
use crate::types::Value;

use super::ast::{BinaryOp, Expr};

/// A scope function, supplied through the `fns` namespace.
pub type Function = Rc<dyn Fn(&[Value]) -> Result<Value, String>>;

/// Variable and function lookup used during evaluation.
///
/// Implementations must not mutate the scope. Reactive implementations
/// subscribe to whatever they read during `lookup`.
pub trait Resolver {
    /// Resolve `$root.seg.seg`. Missing names yield `Value::Undefined`.
    fn lookup(&self, root: &str, segments: &[String]) -> Value;

    /// Resolve a callable by name.
    fn function(&self, name: &str) -> Option<Function>;

    /// Called when a call site names a function that does not exist.
    fn unresolved_function(&self, _name: &str) {}
}

pub fn evaluate(expr: &Expr, resolver: &dyn Resolver) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Path(path) => Ok(resolver.lookup(&path.root, &path.segments)),
        Expr::Call { callee, args, tail } => {
            let Some(function) = resolver.function(callee) else {
                resolver.unresolved_function(callee);
                return Ok(Value::Undefined);
            };
            let args = args
                .iter()
                .map(|arg| evaluate(arg, resolver))
                .collect::<Result<Vec<_>, _>>()?;
            let result = function(&args).map_err(|message| EvalError::Function {
                name: callee.clone(),
                message,
            })?;
            Ok(result.get_path(tail))
        }
        Expr::Binary { op, left, right } => {
            let left = evaluate(left, resolver)?;
            match op {
                BinaryOp::And if !left.is_truthy() => Ok(left),
                BinaryOp::Or if left.is_truthy() => Ok(left),
                BinaryOp::And | BinaryOp::Or => evaluate(right, resolver),
                _ => binary(*op, &left, &evaluate(right, resolver)?),
            }
        }
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    let result = match op {
        BinaryOp::Eq => Value::Bool(loose_eq(left, right)),
        BinaryOp::Ne => Value::Bool(!loose_eq(left, right)),
        BinaryOp::StrictEq => Value::Bool(strict_eq(left, right)),
        BinaryOp::StrictNe => Value::Bool(!strict_eq(left, right)),
        BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Lt | BinaryOp::Le => {
            Value::Bool(compare(op, left, right)?)
        }
        BinaryOp::Add if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) => {
            Value::String(format!(
                "{}{}",
                left.to_display_string(),
                right.to_display_string()
            ))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            let (a, b) = numeric_operands(op, left, right)?;
            Value::Number(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                _ => a % b,
            })
        }
        BinaryOp::And if left.is_truthy() => right.clone(),
        BinaryOp::Or if !left.is_truthy() => right.clone(),
        BinaryOp::And | BinaryOp::Or => left.clone(),
    };
    Ok(result)
}

fn is_compound(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_))
}

fn invalid(op: BinaryOp, left: &Value, right: &Value) -> EvalError {
    EvalError::InvalidOperands {
        op: op.symbol(),
        left: left.type_name(),
        right: right.type_name(),
    }
}

fn numeric_operands(op: BinaryOp, left: &Value, right: &Value) -> Result<(f64, f64), EvalError> {
    if is_compound(left) || is_compound(right) {
        return Err(invalid(op, left, right));
    }
    Ok((
        left.to_number().unwrap_or(f64::NAN),
        right.to_number().unwrap_or(f64::NAN),
    ))
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<bool, EvalError> {
    if let (Value::String(a), Value::String(b)) = (left, right) {
        return Ok(match op {
            BinaryOp::Gt => a > b,
            BinaryOp::Ge => a >= b,
            BinaryOp::Lt => a < b,
            _ => a <= b,
        });
    }
    let (a, b) = numeric_operands(op, left, right)?;
    Ok(match op {
        BinaryOp::Gt => a > b,
        BinaryOp::Ge => a >= b,
        BinaryOp::Lt => a < b,
        _ => a <= b,
    })
}

fn strict_eq(left: &Value, right: &Value) -> bool {
    left == right
}

/// `==`: nullish values equal each other, scalars compare after numeric coercion.
fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
        (Value::String(a), Value::String(b)) => a == b,
        (a, b) if is_compound(a) || is_compound(b) => a == b,
        (a, b) => match (a.to_number(), b.to_number()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}
