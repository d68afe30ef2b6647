// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # momentum-core
//!
//! Bytecode compiler and cooperative virtual machine for the Momentum
//! scripting language.
//!
//! ## Overview
//!
//! Source text goes through a lexer and parser into an AST, the compiler
//! lowers the AST into one bytecode [`Chunk`](compiler::Chunk) per function,
//! and the [`Vm`](vm::Vm) executes the chunks on a single thread.
//! `spawn`/`await` run as cooperative tasks over a current-thread tokio
//! runtime.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use momentum_core::{BufferConsole, Config, Engine};
//!
//! let console = Rc::new(RefCell::new(BufferConsole::new()));
//! let mut engine = Engine::with_console(Config::default(), console.clone()).unwrap();
//! engine.eval("let total = 0\nfor i = 1 to 5\ntotal = total + i\nnext\nprint total").unwrap();
//! assert_eq!(console.borrow().text(), "15");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod async_engine;
pub mod builtins;
pub mod compiler;
pub mod config;
pub mod error;
pub mod lexer;
pub mod loader;
pub mod parser;
pub mod runtime;
pub mod vm;

// Re-exports for convenience
pub use async_engine::AsyncEngine;
pub use config::Config;
pub use error::{Error, NativeError, Result, RuntimeError};
pub use runtime::{BufferConsole, Console, SharedConsole, StdConsole, Value};

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use tokio::runtime::{Builder, Runtime};

/// A synchronous Momentum engine.
///
/// Owns a current-thread tokio runtime and blocks on it for each
/// evaluation. Globals persist between evaluations.
pub struct Engine {
    runtime: Runtime,
    inner: AsyncEngine,
}

impl Engine {
    /// Creates an engine with the default configuration, printing to stdout.
    pub fn new() -> Result<Self> {
        Self::with_console(Config::default(), Rc::new(RefCell::new(StdConsole)))
    }

    /// Creates an engine with an explicit configuration and console.
    pub fn with_console(config: Config, console: SharedConsole) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_time().build()?;
        Ok(Self {
            runtime,
            inner: AsyncEngine::with_console(config, console),
        })
    }

    /// Evaluates Momentum source code and returns the program's result.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let mut engine = Engine::new()?;
    /// engine.eval("print \"hello\"")?;
    /// ```
    pub fn eval(&mut self, source: &str) -> Result<Value> {
        self.runtime.block_on(self.inner.eval(source))
    }

    /// Evaluates source code and returns the value of a trailing expression
    /// statement.
    pub fn eval_interactive(&mut self, source: &str) -> Result<Value> {
        self.runtime.block_on(self.inner.eval_interactive(source))
    }

    /// Evaluates Momentum source code from a file.
    pub fn eval_file(&mut self, path: &Path) -> Result<Value> {
        self.runtime.block_on(self.inner.eval_file(path))
    }

    /// The underlying VM.
    pub fn vm(&self) -> &vm::Vm {
        self.inner.vm()
    }

    /// The underlying VM, mutably.
    pub fn vm_mut(&mut self) -> &mut vm::Vm {
        self.inner.vm_mut()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").field("inner", &self.inner).finish_non_exhaustive()
    }
}
