// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Function descriptors and activation records.

use std::rc::Rc;

use crate::compiler::Chunk;

/// Name given to the implicit function wrapping top-level code.
pub const MAIN_NAME: &str = "<main>";

/// A compiled Momentum function. Immutable once built.
#[derive(Debug)]
pub struct Function {
    /// The lowercased function name
    pub name: String,
    /// Number of parameters
    pub arity: usize,
    /// The compiled body
    pub chunk: Chunk,
    /// Declared `async`; only reachable through `await`/`spawn`
    pub is_async: bool,
    /// Declared `native`; runs as ordinary bytecode
    pub is_native: bool,
}

impl Function {
    /// Creates a new function.
    pub fn new(name: impl Into<String>, arity: usize, chunk: Chunk) -> Self {
        Self {
            name: name.into(),
            arity,
            chunk,
            is_async: false,
            is_native: false,
        }
    }
}

/// A call frame for function execution.
#[derive(Debug, Clone)]
pub struct CallFrame {
    /// The function being executed
    pub function: Rc<Function>,
    /// Instruction pointer within this function's chunk
    pub ip: usize,
    /// Stack index of the first argument; the callee sits just below
    pub stack_base: usize,
}

impl CallFrame {
    /// Creates a new call frame.
    pub fn new(function: Rc<Function>, stack_base: usize) -> Self {
        Self {
            function,
            ip: 0,
            stack_base,
        }
    }

    /// Source line of the instruction most recently fetched.
    pub fn current_line(&self) -> u32 {
        self.function.chunk.line_at(self.ip.saturating_sub(1))
    }
}

/// An active `try` region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TryBlock {
    /// Handler offset in the owning frame's chunk
    pub handler: usize,
    /// Operand-stack depth to restore
    pub stack_depth: usize,
    /// Number of frames active when the region was entered
    pub frame_depth: usize,
}
