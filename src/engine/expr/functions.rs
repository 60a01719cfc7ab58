//! DV-013: Scalar semantics — operators and built-in functions.
//!
//! Null propagates through arithmetic, comparisons and most functions.
//! Division by zero yields null, matching the query engine.

use super::parser::BinaryOp;
use crate::core::types::{Diagnostic, Value};
use crate::ops::order::compare_scalars;
use std::cmp::Ordering;

fn operand_error(op: &str, a: &Value, b: &Value) -> Diagnostic {
    Diagnostic::type_error(format!(
        "unsupported operand kinds {} and {} for '{}'",
        a.kind(),
        b.kind(),
        op
    ))
}

/// Apply a binary operator to two scalars. `and`/`or` use three-valued logic.
pub fn binary(op: BinaryOp, a: &Value, b: &Value) -> Result<Value, Diagnostic> {
    match op {
        BinaryOp::And | BinaryOp::Or => logical(op, a, b),
        BinaryOp::Equal | BinaryOp::NotEqual => {
            if a.is_null() || b.is_null() {
                return Ok(Value::Null);
            }
            let eq = values_equal(a, b);
            Ok(Value::Boolean(if op == BinaryOp::Equal { eq } else { !eq }))
        }
        BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
            if a.is_null() || b.is_null() {
                return Ok(Value::Null);
            }
            let ord = compare_scalars(a, b).ok_or_else(|| {
                Diagnostic::type_error(format!(
                    "cannot compare {} with {} using '{}'",
                    a.kind(),
                    b.kind(),
                    op.symbol()
                ))
            })?;
            Ok(Value::Boolean(match op {
                BinaryOp::Less => ord == Ordering::Less,
                BinaryOp::LessEqual => ord != Ordering::Greater,
                BinaryOp::Greater => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            }))
        }
        _ => arithmetic(op, a, b),
    }
}

fn logical(op: BinaryOp, a: &Value, b: &Value) -> Result<Value, Diagnostic> {
    let truth = |v: &Value| -> Result<Option<bool>, Diagnostic> {
        match v {
            Value::Boolean(x) => Ok(Some(*x)),
            Value::Null => Ok(None),
            _ => Err(operand_error(op.symbol(), a, b)),
        }
    };
    let (x, y) = (truth(a)?, truth(b)?);
    let out = if op == BinaryOp::And {
        match (x, y) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        }
    } else {
        match (x, y) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        }
    };
    Ok(out.map(Value::Boolean).unwrap_or(Value::Null))
}

/// Equality across comparable kinds; incomparable kinds are simply unequal.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    compare_scalars(a, b) == Some(Ordering::Equal)
}

fn arithmetic(op: BinaryOp, a: &Value, b: &Value) -> Result<Value, Diagnostic> {
    if let (Value::Text(x), Value::Text(y), BinaryOp::Add) = (a, b, op) {
        return Ok(Value::Text(format!("{}{}", x, y)));
    }
    if a.is_null() || b.is_null() {
        if (a.is_null() || a.is_numeric() || matches!(a, Value::Text(_)))
            && (b.is_null() || b.is_numeric() || matches!(b, Value::Text(_)))
        {
            return Ok(Value::Null);
        }
        return Err(operand_error(op.symbol(), a, b));
    }
    if !a.is_numeric() || !b.is_numeric() {
        return Err(operand_error(op.symbol(), a, b));
    }

    let overflow = || Diagnostic::runtime(format!("integer overflow in '{}'", op.symbol()));
    if let (Value::Integer(x), Value::Integer(y)) = (a, b) {
        let (x, y) = (*x, *y);
        return match op {
            BinaryOp::Add => x.checked_add(y).map(Value::Integer).ok_or_else(overflow),
            BinaryOp::Subtract => x.checked_sub(y).map(Value::Integer).ok_or_else(overflow),
            BinaryOp::Multiply => x.checked_mul(y).map(Value::Integer).ok_or_else(overflow),
            BinaryOp::Divide if y == 0 => Ok(Value::Null),
            BinaryOp::Divide => Ok(Value::Real(x as f64 / y as f64)),
            BinaryOp::Remainder if y == 0 => Ok(Value::Null),
            BinaryOp::Remainder => x.checked_rem(y).map(Value::Integer).ok_or_else(overflow),
            _ => Err(operand_error(op.symbol(), a, b)),
        };
    }

    let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
    Ok(match op {
        BinaryOp::Add => Value::Real(x + y),
        BinaryOp::Subtract => Value::Real(x - y),
        BinaryOp::Multiply => Value::Real(x * y),
        BinaryOp::Divide | BinaryOp::Remainder if y == 0.0 => Value::Null,
        BinaryOp::Divide => Value::Real(x / y),
        BinaryOp::Remainder => Value::Real(x % y),
        _ => return Err(operand_error(op.symbol(), a, b)),
    })
}

/// Unary minus.
pub fn negate(v: &Value) -> Result<Value, Diagnostic> {
    match v {
        Value::Null => Ok(Value::Null),
        Value::Integer(i) => i
            .checked_neg()
            .map(Value::Integer)
            .ok_or_else(|| Diagnostic::runtime("integer overflow in negation")),
        Value::Real(r) => Ok(Value::Real(-r)),
        other => Err(Diagnostic::type_error(format!(
            "bad operand kind {} for unary '-'",
            other.kind()
        ))),
    }
}

/// Logical `not` (null stays null).
pub fn not(v: &Value) -> Result<Value, Diagnostic> {
    match v {
        Value::Null => Ok(Value::Null),
        Value::Boolean(b) => Ok(Value::Boolean(!b)),
        other => Err(Diagnostic::type_error(format!(
            "bad operand kind {} for 'not'",
            other.kind()
        ))),
    }
}

/// Membership test; null on the left yields null.
pub fn contains(list: &[Value], v: &Value) -> Value {
    if v.is_null() {
        return Value::Null;
    }
    Value::Boolean(list.iter().any(|item| values_equal(item, v)))
}

/// Names of all built-in scalar functions.
pub const SCALAR_FUNCTIONS: &[&str] = &[
    "abs", "round", "floor", "ceil", "lower", "upper", "length", "trim", "substr", "coalesce",
    "is_null", "if_else", "int", "real", "text", "year", "month", "day",
];

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), Diagnostic> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{}", min)
        } else {
            format!("{} to {}", min, max)
        };
        return Err(Diagnostic::type_error(format!(
            "{}() takes {} arguments ({} given)",
            name,
            expected,
            args.len()
        )));
    }
    Ok(())
}

fn kind_error(name: &str, v: &Value) -> Diagnostic {
    Diagnostic::type_error(format!("{}() does not accept {}", name, v.kind()))
}

/// Raw text of a scalar, without quoting.
pub fn to_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::Text(s) | Value::Temporal(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(r) => Some(format!("{:?}", r)),
        Value::Boolean(b) => Some(b.to_string()),
    }
}

fn round_to(x: f64, digits: i64) -> f64 {
    let factor = 10f64.powi(digits.clamp(-15, 15) as i32);
    (x * factor).round() / factor
}

fn date_part(name: &str, v: &Value, range: std::ops::Range<usize>) -> Result<Value, Diagnostic> {
    let s = v.as_str().ok_or_else(|| kind_error(name, v))?;
    s.get(range)
        .and_then(|part| part.parse::<i64>().ok())
        .map(Value::Integer)
        .ok_or_else(|| Diagnostic::type_error(format!("{}() cannot parse date from '{}'", name, s)))
}

/// Call a built-in scalar function.
pub fn call(name: &str, args: &[Value]) -> Result<Value, Diagnostic> {
    match name {
        "coalesce" => {
            arity(name, args, 1, usize::MAX)?;
            return Ok(args.iter().find(|v| !v.is_null()).cloned().unwrap_or(Value::Null));
        }
        "is_null" => {
            arity(name, args, 1, 1)?;
            return Ok(Value::Boolean(args[0].is_null()));
        }
        "if_else" => {
            arity(name, args, 3, 3)?;
            return match &args[0] {
                Value::Boolean(true) => Ok(args[1].clone()),
                Value::Boolean(false) | Value::Null => Ok(args[2].clone()),
                other => Err(kind_error(name, other)),
            };
        }
        _ => {}
    }

    if !SCALAR_FUNCTIONS.contains(&name) {
        return Err(Diagnostic::name(format!("unknown function '{}'", name)));
    }
    let (min, max) = match name {
        "round" => (1, 2),
        "substr" => (2, 3),
        _ => (1, 1),
    };
    arity(name, args, min, max)?;
    if args.iter().any(Value::is_null) {
        return Ok(Value::Null);
    }
    let x = &args[0];

    match name {
        "abs" => match x {
            Value::Integer(i) => i
                .checked_abs()
                .map(Value::Integer)
                .ok_or_else(|| Diagnostic::runtime("integer overflow in abs()")),
            Value::Real(r) => Ok(Value::Real(r.abs())),
            other => Err(kind_error(name, other)),
        },
        "round" => {
            let digits = match args.get(1) {
                None => 0,
                Some(Value::Integer(d)) => *d,
                Some(other) => return Err(kind_error(name, other)),
            };
            match x {
                Value::Integer(i) => Ok(Value::Integer(*i)),
                Value::Real(r) => Ok(Value::Real(round_to(*r, digits))),
                other => Err(kind_error(name, other)),
            }
        }
        "floor" | "ceil" => match x {
            Value::Integer(i) => Ok(Value::Integer(*i)),
            Value::Real(r) => Ok(Value::Real(if name == "floor" { r.floor() } else { r.ceil() })),
            other => Err(kind_error(name, other)),
        },
        "lower" | "upper" | "trim" | "length" => {
            let s = match x {
                Value::Text(s) | Value::Temporal(s) => s,
                other => return Err(kind_error(name, other)),
            };
            Ok(match name {
                "lower" => Value::Text(s.to_lowercase()),
                "upper" => Value::Text(s.to_uppercase()),
                "trim" => Value::Text(s.trim().to_string()),
                _ => Value::Integer(s.chars().count() as i64),
            })
        }
        "substr" => {
            let s = x.as_str().ok_or_else(|| kind_error(name, x))?;
            let start = match &args[1] {
                Value::Integer(i) => *i,
                other => return Err(kind_error(name, other)),
            };
            let len = match args.get(2) {
                None => None,
                Some(Value::Integer(n)) if *n >= 0 => Some(*n as usize),
                Some(other) => return Err(kind_error(name, other)),
            };
            let skip = (start.max(1) - 1) as usize;
            let chars = s.chars().skip(skip);
            Ok(Value::Text(match len {
                Some(n) => chars.take(n).collect(),
                None => chars.collect(),
            }))
        }
        "int" => match x {
            Value::Integer(i) => Ok(Value::Integer(*i)),
            Value::Real(r) if r.is_finite() => Ok(Value::Integer(r.trunc() as i64)),
            Value::Boolean(b) => Ok(Value::Integer(i64::from(*b))),
            Value::Text(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| Diagnostic::runtime(format!("cannot convert '{}' to int", s))),
            other => Err(kind_error(name, other)),
        },
        "real" => match x {
            Value::Integer(i) => Ok(Value::Real(*i as f64)),
            Value::Real(r) => Ok(Value::Real(*r)),
            Value::Boolean(b) => Ok(Value::Real(if *b { 1.0 } else { 0.0 })),
            Value::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Real)
                .map_err(|_| Diagnostic::runtime(format!("cannot convert '{}' to real", s))),
            other => Err(kind_error(name, other)),
        },
        "text" => Ok(to_text(x).map(Value::Text).unwrap_or(Value::Null)),
        "year" => date_part(name, x, 0..4),
        "month" => date_part(name, x, 5..7),
        "day" => date_part(name, x, 8..10),
        _ => Err(Diagnostic::name(format!("unknown function '{}'", name))),
    }
}
