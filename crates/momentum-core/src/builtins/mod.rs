// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Built-in functions.
//!
//! Builtins are looked up by name when a call does not resolve to a global
//! function. They are not values: `f = len` is an undefined variable.
//!
//! - [`common`]: conversions, containers and assertions
//! - [`system`]: clock, timers and process exit

pub mod common;
pub mod system;

use std::fmt;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use rustc_hash::FxHashMap;

use crate::error::NativeError;
use crate::runtime::Value;

/// What a builtin produced.
pub enum Native {
    /// Finished synchronously
    Ready(Value),
    /// Finishes later; the calling task suspends until it does
    Pending(LocalBoxFuture<'static, Result<Value, NativeError>>),
}

impl fmt::Debug for Native {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Native::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Native::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// Signature shared by every builtin.
pub type NativeFn = Rc<dyn Fn(Vec<Value>) -> Result<Native, NativeError>>;

/// Registry of builtins by lowercased name.
#[derive(Clone, Default)]
pub struct Builtins {
    functions: FxHashMap<String, NativeFn>,
}

impl Builtins {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard library.
    pub fn standard() -> Self {
        let mut builtins = Self::new();
        common::register(&mut builtins);
        system::register(&mut builtins);
        builtins
    }

    /// Registers (or replaces) a builtin.
    pub fn register<F>(&mut self, name: &str, function: F)
    where
        F: Fn(Vec<Value>) -> Result<Native, NativeError> + 'static,
    {
        self.functions.insert(name.to_lowercase(), Rc::new(function));
    }

    /// Looks up a builtin.
    pub fn get(&self, name: &str) -> Option<NativeFn> {
        self.functions.get(name).cloned()
    }

    /// Returns true if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for Builtins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builtins").field("functions", &self.names()).finish()
    }
}

/// Fails unless `min <= args.len() <= max`.
pub(crate) fn check_arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), NativeError> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let expected = if min == max {
        min.to_string()
    } else {
        format!("{} to {}", min, max)
    };
    Err(NativeError::message(format!(
        "Function '{}' expected {} arguments, but got {}",
        name,
        expected,
        args.len()
    )))
}
