// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Momentum value representation.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use super::function::Function;
use super::promise::Promise;

/// Shared, mutable array storage.
pub type ArrayRef = Rc<RefCell<Vec<Value>>>;

/// Shared, mutable dictionary storage. Keys iterate in sorted order.
pub type DictRef = Rc<RefCell<BTreeMap<String, Value>>>;

/// Nesting beyond this depth is elided when displaying, which also stops
/// self-referencing containers from recursing forever.
const MAX_DISPLAY_DEPTH: usize = 32;

/// A Momentum value.
///
/// Arrays, dictionaries, functions and futures are handles: cloning a value
/// shares the underlying storage.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// The absent value
    #[default]
    None,
    /// 64-bit signed integer (also used for booleans)
    Int(i64),
    /// IEEE 754 double
    Float(f64),
    /// Immutable string
    Str(Rc<str>),
    /// Mutable array with reference semantics
    Array(ArrayRef),
    /// String-keyed dictionary with reference semantics
    Dict(DictRef),
    /// Compiled function
    Function(Rc<Function>),
    /// Fixed-size key used for multi-dimensional subscripts
    Tuple(Rc<[Value]>),
    /// Handle to a pending or finished computation
    Future(Rc<Promise>),
}

impl Value {
    /// Boolean as the integers 0/1.
    pub fn bool(b: bool) -> Self {
        Value::Int(b as i64)
    }

    /// Creates a string value.
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    /// Creates a new array value.
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    /// Creates a new dictionary value.
    pub fn dict(entries: BTreeMap<String, Value>) -> Self {
        Value::Dict(Rc::new(RefCell::new(entries)))
    }

    /// Returns true if this value is None.
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Returns true for Int and Float.
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Truthiness used by conditions and logical operators.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Int(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Array(items) => !items.borrow().is_empty(),
            Value::Dict(entries) => !entries.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Function(_) | Value::Future(_) => true,
        }
    }

    /// Returns the name of this value's type, as reported by `type()`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Dict(_) => "dict",
            Value::Function(_) => "function",
            Value::Tuple(_) => "tuple",
            Value::Future(_) => "future",
        }
    }

    /// Numeric view of Int and Float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// The quoted form used inside containers and by `debug`.
    pub fn repr(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = write_value(&mut out, self, true, 0);
        out
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Future(a), Value::Future(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

/// Formats a float the way Momentum prints it: integral values keep a
/// trailing `.0`.
pub fn format_float(n: f64) -> String {
    if n.is_nan() {
        "nan".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e16 {
        format!("{:.1}", n)
    } else {
        format!("{}", n)
    }
}

fn write_value(out: &mut impl fmt::Write, value: &Value, quoted: bool, depth: usize) -> fmt::Result {
    if depth > MAX_DISPLAY_DEPTH {
        return out.write_str("...");
    }
    match value {
        Value::None => out.write_str("None"),
        Value::Int(n) => write!(out, "{}", n),
        Value::Float(n) => out.write_str(&format_float(*n)),
        Value::Str(s) if quoted => write!(out, "{:?}", s.as_ref()),
        Value::Str(s) => out.write_str(s),
        Value::Array(items) => {
            out.write_char('[')?;
            for (i, item) in items.borrow().iter().enumerate() {
                if i > 0 {
                    out.write_str(", ")?;
                }
                write_value(out, item, true, depth + 1)?;
            }
            out.write_char(']')
        }
        Value::Tuple(items) => {
            out.write_char('(')?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.write_str(", ")?;
                }
                write_value(out, item, true, depth + 1)?;
            }
            out.write_char(')')
        }
        Value::Dict(entries) => {
            out.write_char('{')?;
            for (i, (key, item)) in entries.borrow().iter().enumerate() {
                if i > 0 {
                    out.write_str(", ")?;
                }
                write!(out, "{:?}: ", key)?;
                write_value(out, item, true, depth + 1)?;
            }
            out.write_char('}')
        }
        Value::Function(func) => write!(out, "<function {}>", func.name),
        Value::Future(_) => out.write_str("<future>"),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self, false, 0)
    }
}
