// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Ordering comparisons.
//!
//! Equality never fails and is [`Value`]'s `PartialEq`. Ordering is defined
//! between two numbers (Int and Float mix freely) and between two strings.

use std::cmp::Ordering;

use crate::ast::BinaryOp;
use crate::runtime::Value;

/// Evaluates `<`, `<=`, `>` or `>=`.
pub fn compare(op: BinaryOp, a: &Value, b: &Value) -> Result<bool, String> {
    let ordering = match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        _ => match (a.as_f64(), b.as_f64()) {
            // NaN is unordered: every comparison is false.
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => {
                return Err(format!(
                    "Type mismatch: cannot apply '{}' to {} and {}",
                    op.symbol(),
                    a.type_name(),
                    b.type_name()
                ));
            }
        },
    };

    let Some(ordering) = ordering else {
        return Ok(false);
    };
    Ok(match op {
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::Ge => ordering != Ordering::Less,
        _ => return Err(format!("'{}' is not an ordering comparison", op.symbol())),
    })
}
