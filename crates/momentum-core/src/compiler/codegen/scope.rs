// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Scope management for variable resolution during compilation.
//!
//! A local's index in [`Scope::locals`] is its frame-relative stack slot.

/// A local variable in a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Local {
    /// The variable name
    pub name: String,
    /// The scope depth where this was declared
    pub depth: usize,
}

/// A scope for variable resolution.
#[derive(Debug, Default, Clone)]
pub struct Scope {
    /// Live locals, oldest first
    pub locals: Vec<Local>,
    /// Current scope depth (0 = function body level)
    pub depth: usize,
}

impl Scope {
    /// Creates a new scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new scope.
    pub fn begin_scope(&mut self) {
        self.depth += 1;
    }

    /// End the current scope and return the number of locals to pop.
    pub fn end_scope(&mut self) -> usize {
        let count = self.count_above(self.depth - 1);
        self.locals.truncate(self.locals.len() - count);
        self.depth -= 1;
        count
    }

    /// Number of trailing locals declared deeper than `depth`.
    pub fn count_above(&self, depth: usize) -> usize {
        self.locals.iter().rev().take_while(|l| l.depth > depth).count()
    }

    /// Declare a local variable, returning its slot. Fails with a message
    /// when the name is already live at the current depth.
    pub fn declare(&mut self, name: &str) -> Result<usize, String> {
        let duplicate = self
            .locals
            .iter()
            .rev()
            .take_while(|l| l.depth == self.depth)
            .any(|l| l.name == name);
        if duplicate {
            return Err(format!("Variable '{}' already declared in this scope", name));
        }

        self.locals.push(Local {
            name: name.to_string(),
            depth: self.depth,
        });
        Ok(self.locals.len() - 1)
    }

    /// Resolve a local variable by name, innermost first.
    pub fn resolve(&self, name: &str) -> Option<usize> {
        self.locals.iter().rposition(|l| l.name == name)
    }
}
