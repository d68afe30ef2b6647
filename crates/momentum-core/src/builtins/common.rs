// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Conversions, container helpers and `assert`.

use super::{Builtins, Native, check_arity};
use crate::error::NativeError;
use crate::runtime::Value;
use crate::vm::index;

pub(super) fn register(builtins: &mut Builtins) {
    builtins.register("str", |args| {
        check_arity("str", &args, 1, 1)?;
        Ok(Native::Ready(Value::str(args[0].to_string())))
    });
    builtins.register("int", |args| {
        check_arity("int", &args, 1, 1)?;
        to_int(&args[0]).map(Native::Ready)
    });
    builtins.register("float", |args| {
        check_arity("float", &args, 1, 1)?;
        to_float(&args[0]).map(Native::Ready)
    });
    builtins.register("len", |args| {
        check_arity("len", &args, 1, 1)?;
        let len = index::length(&args[0])?;
        Ok(Native::Ready(Value::Int(len as i64)))
    });
    builtins.register("type", |args| {
        check_arity("type", &args, 1, 1)?;
        Ok(Native::Ready(Value::str(args[0].type_name())))
    });
    builtins.register("append", |args| {
        check_arity("append", &args, 2, 2)?;
        match &args[0] {
            Value::Array(items) => {
                items.borrow_mut().push(args[1].clone());
                Ok(Native::Ready(Value::None))
            }
            other => Err(NativeError::message(format!(
                "append() expects an array, found {}",
                other.type_name()
            ))),
        }
    });
    builtins.register("keys", |args| {
        check_arity("keys", &args, 1, 1)?;
        match &args[0] {
            Value::Dict(entries) => {
                let keys = entries.borrow().keys().map(Value::str).collect();
                Ok(Native::Ready(Value::array(keys)))
            }
            other => Err(NativeError::message(format!(
                "keys() expects a dictionary, found {}",
                other.type_name()
            ))),
        }
    });
    builtins.register("assert", |args| {
        check_arity("assert", &args, 1, 2)?;
        if args[0].is_truthy() {
            return Ok(Native::Ready(Value::None));
        }
        let message = match args.get(1) {
            Some(message) => format!("Assertion failed: {}", message),
            None => "Assertion failed".to_string(),
        };
        Err(NativeError::Message(message))
    });
}

fn to_int(value: &Value) -> Result<Value, NativeError> {
    let converted = match value {
        Value::Int(n) => Some(*n),
        Value::Float(n) => float_to_int(*n),
        Value::Str(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(float_to_int))
        }
        _ => None,
    };
    converted
        .map(Value::Int)
        .ok_or_else(|| cannot_convert(value, "int"))
}

/// Truncates toward zero; out-of-range and non-finite values fail.
fn float_to_int(n: f64) -> Option<i64> {
    let n = n.trunc();
    (n.is_finite() && n >= i64::MIN as f64 && n < i64::MAX as f64).then_some(n as i64)
}

fn to_float(value: &Value) -> Result<Value, NativeError> {
    let converted = match value {
        Value::Int(n) => Some(*n as f64),
        Value::Float(n) => Some(*n),
        Value::Str(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    converted
        .map(Value::Float)
        .ok_or_else(|| cannot_convert(value, "float"))
}

fn cannot_convert(value: &Value, target: &str) -> NativeError {
    NativeError::message(format!("Cannot convert {} to {}", value.repr(), target))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<Value>) -> Result<Value, NativeError> {
        let builtins = Builtins::standard();
        match builtins.get(name).expect("builtin")(args)? {
            Native::Ready(value) => Ok(value),
            Native::Pending(_) => panic!("{} should be synchronous", name),
        }
    }

    #[test]
    fn test_int_conversion() {
        assert_eq!(call("int", vec![Value::str(" 42 ")]), Ok(Value::Int(42)));
        assert_eq!(call("int", vec![Value::Float(-3.7)]), Ok(Value::Int(-3)));
        assert_eq!(call("int", vec![Value::str("2.5")]), Ok(Value::Int(2)));
        assert_eq!(
            call("int", vec![Value::str("abc")]),
            Err(NativeError::message("Cannot convert \"abc\" to int"))
        );
        assert!(call("int", vec![Value::Float(f64::NAN)]).is_err());
    }

    #[test]
    fn test_float_conversion() {
        assert!(matches!(call("float", vec![Value::Int(2)]), Ok(Value::Float(f)) if f == 2.0));
        assert!(matches!(call("float", vec![Value::str("0.25")]), Ok(Value::Float(f)) if f == 0.25));
        assert!(call("float", vec![Value::None]).is_err());
    }

    #[test]
    fn test_str_and_type() {
        assert_eq!(call("str", vec![Value::Float(1.0)]), Ok(Value::str("1.0")));
        assert_eq!(call("type", vec![Value::array(vec![])]), Ok(Value::str("array")));
    }

    #[test]
    fn test_append_shares_array() {
        let array = Value::array(vec![]);
        call("append", vec![array.clone(), Value::Int(1)]).unwrap();
        assert_eq!(call("len", vec![array]), Ok(Value::Int(1)));
    }

    #[test]
    fn test_keys_sorted() {
        let mut entries = std::collections::BTreeMap::new();
        entries.insert("b".to_string(), Value::Int(1));
        entries.insert("a".to_string(), Value::Int(2));
        assert_eq!(
            call("keys", vec![Value::dict(entries)]),
            Ok(Value::array(vec![Value::str("a"), Value::str("b")]))
        );
    }

    #[test]
    fn test_assert() {
        assert_eq!(call("assert", vec![Value::Int(1)]), Ok(Value::None));
        assert_eq!(
            call("assert", vec![Value::Int(0), Value::str("x must be positive")]),
            Err(NativeError::message("Assertion failed: x must be positive"))
        );
    }
}
