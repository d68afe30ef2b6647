// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Subscripts, lengths and iteration over containers.

use crate::runtime::Value;

/// Number of elements, characters or entries.
pub fn length(value: &Value) -> Result<usize, String> {
    match value {
        Value::Array(items) => Ok(items.borrow().len()),
        Value::Dict(entries) => Ok(entries.borrow().len()),
        Value::Str(s) => Ok(s.chars().count()),
        Value::Tuple(items) => Ok(items.len()),
        other => Err(format!("Cannot take the length of {}", other.type_name())),
    }
}

/// `object[key]` for arrays, dictionaries and strings. A tuple key walks
/// nested arrays one dimension at a time.
pub fn get(object: &Value, key: &Value) -> Result<Value, String> {
    match (object, key) {
        (_, Value::Tuple(keys)) => {
            let mut current = object.clone();
            for key in keys.iter() {
                current = get(&current, key)?;
            }
            Ok(current)
        }
        (Value::Array(items), _) => {
            let items = items.borrow();
            let i = position(key, items.len())?;
            Ok(items[i].clone())
        }
        (Value::Dict(entries), Value::Str(name)) => entries
            .borrow()
            .get(name.as_ref())
            .cloned()
            .ok_or_else(|| format!("Key '{}' not found in dictionary", name)),
        (Value::Dict(_), other) => Err(format!(
            "Dictionary keys must be strings, found {}",
            other.type_name()
        )),
        (Value::Str(s), _) => {
            let len = s.chars().count();
            let i = position(key, len)?;
            Ok(s.chars().nth(i).map(|c| Value::str(c.to_string())).unwrap_or_default())
        }
        (other, _) => Err(format!("Cannot index into {}", other.type_name())),
    }
}

/// `object[key] = value`. Dictionaries grow; arrays do not.
pub fn set(object: &Value, key: &Value, value: Value) -> Result<(), String> {
    match (object, key) {
        (_, Value::Tuple(keys)) => match keys.split_last() {
            Some((last, outer)) => {
                let mut current = object.clone();
                for key in outer {
                    current = get(&current, key)?;
                }
                set(&current, last, value)
            }
            None => Err("Empty subscript".to_string()),
        },
        (Value::Array(items), _) => {
            let mut items = items.borrow_mut();
            let i = position(key, items.len())?;
            items[i] = value;
            Ok(())
        }
        (Value::Dict(entries), Value::Str(name)) => {
            entries.borrow_mut().insert(name.to_string(), value);
            Ok(())
        }
        (Value::Dict(_), other) => Err(format!(
            "Dictionary keys must be strings, found {}",
            other.type_name()
        )),
        (Value::Str(_), _) => Err("Strings are immutable".to_string()),
        (other, _) => Err(format!("Cannot assign into {}", other.type_name())),
    }
}

/// The `index`th element of a `for each` walk: array elements, string
/// characters, or dictionary keys in sorted order.
pub fn iter_value(collection: &Value, index: &Value) -> Result<Value, String> {
    match collection {
        Value::Dict(entries) => {
            let entries = entries.borrow();
            let i = position(index, entries.len())?;
            Ok(entries.keys().nth(i).map(Value::str).unwrap_or_default())
        }
        Value::Tuple(items) => {
            let i = position(index, items.len())?;
            Ok(items[i].clone())
        }
        Value::Array(_) | Value::Str(_) => get(collection, index),
        other => Err(format!("Cannot iterate over {}", other.type_name())),
    }
}

/// Builds `dim` storage: nested arrays of None, outermost dimension first.
pub fn new_array(sizes: &[Value]) -> Result<Value, String> {
    let Some((first, rest)) = sizes.split_first() else {
        return Ok(Value::array(Vec::new()));
    };
    let size = match first {
        Value::Int(n) if *n >= 0 => *n as usize,
        other => {
            return Err(format!(
                "Array size must be a non-negative integer, found {}",
                other.repr()
            ));
        }
    };
    let mut items = Vec::with_capacity(size);
    for _ in 0..size {
        items.push(if rest.is_empty() { Value::None } else { new_array(rest)? });
    }
    Ok(Value::array(items))
}

/// Resolves an Int index against `len`; negative indices count from the end.
fn position(key: &Value, len: usize) -> Result<usize, String> {
    let Value::Int(i) = key else {
        return Err(format!("Index must be an integer, found {}", key.type_name()));
    };
    let resolved = if *i < 0 { len as i64 + i } else { *i };
    if resolved < 0 || resolved >= len as i64 {
        return Err(format!("Index {} out of range for length {}", i, len));
    }
    Ok(resolved as usize)
}

/// Splits a subscript key into call arguments.
pub(crate) fn key_arguments(key: Value) -> Vec<Value> {
    match key {
        Value::Tuple(items) => items.to_vec(),
        other => vec![other],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    fn ints(values: &[i64]) -> Value {
        Value::array(values.iter().map(|n| Value::Int(*n)).collect())
    }

    #[test]
    fn test_array_indexing() {
        let array = ints(&[10, 20, 30]);
        assert_eq!(get(&array, &Value::Int(0)), Ok(Value::Int(10)));
        assert_eq!(get(&array, &Value::Int(-1)), Ok(Value::Int(30)));
        assert_eq!(
            get(&array, &Value::Int(3)),
            Err("Index 3 out of range for length 3".to_string())
        );
        assert!(get(&array, &Value::str("0")).is_err());
    }

    #[test]
    fn test_array_store() {
        let array = ints(&[1, 2]);
        set(&array, &Value::Int(1), Value::Int(5)).unwrap();
        assert_eq!(array, ints(&[1, 5]));
        assert!(set(&array, &Value::Int(2), Value::None).is_err());
    }

    #[test]
    fn test_dict_access() {
        let dict = Value::dict(BTreeMap::new());
        set(&dict, &Value::str("k"), Value::Int(1)).unwrap();
        assert_eq!(get(&dict, &Value::str("k")), Ok(Value::Int(1)));
        assert_eq!(
            get(&dict, &Value::str("missing")),
            Err("Key 'missing' not found in dictionary".to_string())
        );
    }

    #[test]
    fn test_string_indexing_by_char() {
        let s = Value::str("héllo");
        assert_eq!(get(&s, &Value::Int(1)), Ok(Value::str("é")));
        assert_eq!(length(&s), Ok(5));
    }

    #[test]
    fn test_tuple_key_walks_dimensions() {
        let grid = new_array(&[Value::Int(2), Value::Int(3)]).unwrap();
        let key = Value::Tuple(Rc::from(vec![Value::Int(1), Value::Int(2)]));
        set(&grid, &key, Value::Int(9)).unwrap();
        assert_eq!(get(&grid, &key), Ok(Value::Int(9)));
        assert_eq!(length(&get(&grid, &Value::Int(0)).unwrap()), Ok(3));
    }

    #[test]
    fn test_new_array_rejects_negative() {
        assert!(new_array(&[Value::Int(-1)]).is_err());
        assert!(new_array(&[Value::Float(2.0)]).is_err());
    }

    #[test]
    fn test_iter_value_over_dict_keys() {
        let mut entries = BTreeMap::new();
        entries.insert("z".to_string(), Value::Int(1));
        entries.insert("a".to_string(), Value::Int(2));
        let dict = Value::dict(entries);
        assert_eq!(iter_value(&dict, &Value::Int(0)), Ok(Value::str("a")));
        assert_eq!(iter_value(&dict, &Value::Int(1)), Ok(Value::str("z")));
    }

    #[test]
    fn test_key_arguments() {
        let key = Value::Tuple(Rc::from(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(key_arguments(key), vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(key_arguments(Value::Int(3)), vec![Value::Int(3)]);
    }
}
