// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Asynchronous engine APIs.
//!
//! [`AsyncEngine`] runs programs on whatever current-thread runtime the
//! caller provides, so timers and imports make progress while a program
//! waits on them.
//!
//! # Example
//!
//! ```ignore
//! use momentum_core::AsyncEngine;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let mut engine = AsyncEngine::new();
//!     engine.eval_file("script.mn").await.unwrap();
//! }
//! ```

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tokio::fs;
use tracing::debug;

use crate::compiler::{CompiledProgram, Compiler};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::parser::Parser;
use crate::runtime::{Promise, SharedConsole, StdConsole, Value};
use crate::vm::Vm;

/// An asynchronous Momentum engine.
///
/// Globals persist between evaluations, which is what the REPL relies on.
#[derive(Debug)]
pub struct AsyncEngine {
    vm: Vm,
}

impl AsyncEngine {
    /// Creates an engine with the default configuration, printing to stdout.
    pub fn new() -> Self {
        Self::with_console(Config::default(), Rc::new(RefCell::new(StdConsole)))
    }

    /// Creates an engine with an explicit configuration and console.
    pub fn with_console(config: Config, console: SharedConsole) -> Self {
        Self {
            vm: Vm::new(config, console),
        }
    }

    /// The underlying VM.
    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    /// The underlying VM, mutably.
    pub fn vm_mut(&mut self) -> &mut Vm {
        &mut self.vm
    }

    /// Parses and compiles a program without running it.
    pub fn compile(source: &str) -> Result<CompiledProgram> {
        let mut parser = Parser::new(source);
        let program = parser.parse_program()?;
        Compiler::new().compile(&program)
    }

    /// Evaluates source code. Imports resolve against the VM's base
    /// directory.
    pub async fn eval(&mut self, source: &str) -> Result<Value> {
        let program = Self::compile(source)?;
        self.vm.run(&program).await
    }

    /// Evaluates source code, returning the value of a trailing expression
    /// statement instead of discarding it.
    pub async fn eval_interactive(&mut self, source: &str) -> Result<Value> {
        let mut parser = Parser::new(source);
        let program = parser.parse_program()?;
        let program = Compiler::new().compile_interactive(&program)?;
        self.vm.run(&program).await
    }

    /// Evaluates a file. Its imports resolve against its own directory, and
    /// a module importing it back is reported as circular.
    pub async fn eval_file(&mut self, path: impl AsRef<Path>) -> Result<Value> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)
            .await
            .map_err(|e| Error::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        let program = Self::compile(&source)?;

        let canonical = std::fs::canonicalize(path)?;
        let dir = canonical
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        debug!(file = %canonical.display(), "running file");

        let previous = self.vm.base_dir().to_path_buf();
        let cache = self.vm.module_cache();
        let loading = Rc::new(Promise::new());
        self.vm.set_base_dir(dir);
        let previous_module = self.vm.set_module(Some(canonical.clone()));
        cache.borrow_mut().begin(canonical.clone(), loading.clone());

        let result = self.vm.run(&program).await;

        loading.settle(match &result {
            Ok(_) => Ok(Value::Dict(self.vm.globals_dict())),
            Err(e) => Err(e.to_string()),
        });
        cache.borrow_mut().delete(&canonical);
        self.vm.set_module(previous_module);
        self.vm.set_base_dir(previous);
        result
    }

    /// Evaluates files one after another, sharing globals and the module
    /// cache. Results are in the order given.
    pub async fn eval_files_ordered(&mut self, paths: &[impl AsRef<Path>]) -> Vec<Result<Value>> {
        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            results.push(self.eval_file(path).await);
        }
        results
    }
}

impl Default for AsyncEngine {
    fn default() -> Self {
        Self::new()
    }
}
