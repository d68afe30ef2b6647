// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Operator semantics shared by the VM and the compiler's constant folder.

use crate::ast::BinaryOp;
use crate::runtime::Value;

use super::comparison;

/// Applies a binary operator.
pub fn binary(op: BinaryOp, a: &Value, b: &Value) -> Result<Value, String> {
    match op {
        BinaryOp::Add => add(a, b),
        BinaryOp::Sub => numeric(op, a, b, i64::checked_sub, |x, y| x - y),
        BinaryOp::Mul => numeric(op, a, b, i64::checked_mul, |x, y| x * y),
        BinaryOp::Div => divide(a, b),
        BinaryOp::Mod => modulo(a, b),
        BinaryOp::Eq => Ok(Value::bool(a == b)),
        BinaryOp::Ne => Ok(Value::bool(a != b)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            comparison::compare(op, a, b).map(Value::bool)
        }
    }
}

/// Unary minus.
pub fn negate(value: &Value) -> Result<Value, String> {
    match value {
        Value::Int(n) => n.checked_neg().map(Value::Int).ok_or_else(overflow),
        Value::Float(n) => Ok(Value::Float(-n)),
        other => Err(format!(
            "Type mismatch: cannot apply '-' to {}",
            other.type_name()
        )),
    }
}

fn add(a: &Value, b: &Value) -> Result<Value, String> {
    match (a, b) {
        (Value::Str(_), _) | (_, Value::Str(_)) => Ok(Value::str(format!("{}{}", a, b))),
        (Value::Array(x), Value::Array(y)) => {
            let mut items = x.borrow().clone();
            items.extend(y.borrow().iter().cloned());
            Ok(Value::array(items))
        }
        _ => numeric(BinaryOp::Add, a, b, i64::checked_add, |x, y| x + y),
    }
}

fn numeric(
    op: BinaryOp,
    a: &Value,
    b: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, String> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => int_op(*x, *y).map(Value::Int).ok_or_else(overflow),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Ok(Value::Float(float_op(x, y))),
            _ => Err(mismatch(op, a, b)),
        },
    }
}

fn divide(a: &Value, b: &Value) -> Result<Value, String> {
    let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
        return Err(mismatch(BinaryOp::Div, a, b));
    };
    if y == 0.0 {
        return Err("Division by zero".to_string());
    }
    Ok(Value::Float(x / y))
}

/// Floor modulo: the result takes the divisor's sign.
fn modulo(a: &Value, b: &Value) -> Result<Value, String> {
    match (a, b) {
        (Value::Int(_), Value::Int(0)) => Err("Division by zero".to_string()),
        (Value::Int(x), Value::Int(y)) => {
            let r = x.wrapping_rem(*y);
            Ok(Value::Int(if r != 0 && (r < 0) != (*y < 0) { r + y } else { r }))
        }
        _ => {
            let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
                return Err(mismatch(BinaryOp::Mod, a, b));
            };
            if y == 0.0 {
                return Err("Division by zero".to_string());
            }
            let r = x % y;
            Ok(Value::Float(if r != 0.0 && (r < 0.0) != (y < 0.0) { r + y } else { r }))
        }
    }
}

fn overflow() -> String {
    "Integer overflow".to_string()
}

fn mismatch(op: BinaryOp, a: &Value, b: &Value) -> String {
    format!(
        "Type mismatch: cannot apply '{}' to {} and {}",
        op.symbol(),
        a.type_name(),
        b.type_name()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(op: BinaryOp, a: impl Into<Value>, b: impl Into<Value>) -> Result<Value, String> {
        binary(op, &a.into(), &b.into())
    }

    #[test]
    fn test_int_arithmetic_stays_int() {
        assert_eq!(apply(BinaryOp::Add, 2i64, 3i64), Ok(Value::Int(5)));
        assert!(matches!(apply(BinaryOp::Mul, 4i64, 5i64), Ok(Value::Int(20))));
    }

    #[test]
    fn test_mixed_arithmetic_is_float() {
        assert!(matches!(apply(BinaryOp::Add, 1i64, 0.5), Ok(Value::Float(f)) if f == 1.5));
    }

    #[test]
    fn test_division_always_float() {
        assert!(matches!(apply(BinaryOp::Div, 6i64, 3i64), Ok(Value::Float(f)) if f == 2.0));
        assert_eq!(apply(BinaryOp::Div, 1i64, 0i64), Err("Division by zero".into()));
        assert_eq!(apply(BinaryOp::Div, 1.0, 0.0), Err("Division by zero".into()));
    }

    #[test]
    fn test_floor_modulo() {
        assert_eq!(apply(BinaryOp::Mod, 7i64, 3i64), Ok(Value::Int(1)));
        assert_eq!(apply(BinaryOp::Mod, -7i64, 3i64), Ok(Value::Int(2)));
        assert_eq!(apply(BinaryOp::Mod, 7i64, -3i64), Ok(Value::Int(-2)));
        assert!(matches!(apply(BinaryOp::Mod, -1.5, 1.0), Ok(Value::Float(f)) if f == 0.5));
        assert_eq!(apply(BinaryOp::Mod, 1i64, 0i64), Err("Division by zero".into()));
    }

    #[test]
    fn test_overflow() {
        assert_eq!(apply(BinaryOp::Add, i64::MAX, 1i64), Err("Integer overflow".into()));
        assert_eq!(negate(&Value::Int(i64::MIN)), Err("Integer overflow".into()));
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(apply(BinaryOp::Add, "n = ", 5i64), Ok(Value::str("n = 5")));
        assert_eq!(apply(BinaryOp::Add, 1.0, "x"), Ok(Value::str("1.0x")));
    }

    #[test]
    fn test_array_concatenation() {
        let a = Value::array(vec![Value::Int(1)]);
        let b = Value::array(vec![Value::Int(2)]);
        let joined = binary(BinaryOp::Add, &a, &b).unwrap();
        assert_eq!(joined, Value::array(vec![Value::Int(1), Value::Int(2)]));
        // Operands are untouched.
        assert_eq!(a, Value::array(vec![Value::Int(1)]));
    }

    #[test]
    fn test_type_mismatch() {
        assert_eq!(
            apply(BinaryOp::Sub, "a", 1i64),
            Err("Type mismatch: cannot apply '-' to string and int".into())
        );
    }

    #[test]
    fn test_equality_is_numeric() {
        assert_eq!(apply(BinaryOp::Eq, 1i64, 1.0), Ok(Value::Int(1)));
        assert_eq!(apply(BinaryOp::Ne, "a", "a"), Ok(Value::Int(0)));
    }
}
