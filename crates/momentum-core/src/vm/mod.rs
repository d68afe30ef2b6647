// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The bytecode virtual machine.
//!
//! A [`Vm`] owns the program-wide state: globals, the DATA pool and its
//! cursor, the builtin registry and the console. Execution happens in
//! tasks, each with its own operand stack, call frames and try regions,
//! driven cooperatively by a scheduler.
//!
//! ## Structure
//!
//! - `interpreter` - Fetch-decode-dispatch loop for one task
//! - `scheduler` - Run queue, waiting tasks and native futures
//! - `arithmetic` - Operator semantics (shared with constant folding)
//! - `comparison` - Ordering comparisons
//! - `index` - Subscripts, lengths and iteration

mod interpreter;
mod scheduler;

pub mod arithmetic;
pub mod comparison;
pub mod index;

#[cfg(test)]
mod tests;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::builtins::Builtins;
use crate::compiler::CompiledProgram;
use crate::config::Config;
use crate::error::{Error, NativeError, Result, RuntimeError};
use crate::loader::ModuleCache;
use crate::runtime::value::DictRef;
use crate::runtime::{SharedConsole, Value};

use interpreter::Outcome;
use scheduler::Scheduler;

/// The Momentum virtual machine.
pub struct Vm {
    globals: FxHashMap<String, Value>,
    data: Vec<Value>,
    data_cursor: usize,
    builtins: Rc<Builtins>,
    console: SharedConsole,
    modules: Rc<RefCell<ModuleCache>>,
    config: Rc<Config>,
    /// Directory imports resolve against
    base_dir: PathBuf,
    /// File this VM is running, if any; imports are recorded against it
    module: Option<PathBuf>,
}

impl Vm {
    /// Creates a VM with the standard builtins, resolving imports against
    /// the current directory.
    pub fn new(config: Config, console: SharedConsole) -> Self {
        Self {
            globals: FxHashMap::default(),
            data: Vec::new(),
            data_cursor: 0,
            builtins: Rc::new(Builtins::standard()),
            console,
            modules: Rc::new(RefCell::new(ModuleCache::new())),
            config: Rc::new(config),
            base_dir: PathBuf::from("."),
            module: None,
        }
    }

    /// Replaces the builtin registry.
    pub fn with_builtins(mut self, builtins: Builtins) -> Self {
        self.builtins = Rc::new(builtins);
        self
    }

    /// Sets the directory imports resolve against.
    pub fn set_base_dir(&mut self, dir: impl Into<PathBuf>) {
        self.base_dir = dir.into();
    }

    /// The directory imports resolve against.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// The engine configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Looks up a global.
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Defines or replaces a global.
    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    /// Global names, sorted.
    pub fn global_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.globals.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Removes every global.
    pub fn clear_globals(&mut self) {
        self.globals.clear();
    }

    /// The builtin registry.
    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    pub(crate) fn module_cache(&self) -> Rc<RefCell<ModuleCache>> {
        self.modules.clone()
    }

    /// A snapshot of the globals as a dictionary.
    pub(crate) fn globals_dict(&self) -> DictRef {
        let entries: BTreeMap<String, Value> = self
            .globals
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Rc::new(RefCell::new(entries))
    }

    /// Sets the file this VM is running and returns the previous one.
    pub(crate) fn set_module(&mut self, path: Option<PathBuf>) -> Option<PathBuf> {
        std::mem::replace(&mut self.module, path)
    }

    /// A fresh VM for running the module at `path`. Everything but the
    /// globals and DATA pool is shared with this one.
    pub(crate) fn module_vm(&self, path: PathBuf) -> Vm {
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.base_dir.clone());
        Vm {
            globals: FxHashMap::default(),
            data: Vec::new(),
            data_cursor: 0,
            builtins: self.builtins.clone(),
            console: self.console.clone(),
            modules: self.modules.clone(),
            config: self.config.clone(),
            base_dir: dir,
            module: Some(path),
        }
    }

    /// Runs a program until its main task and every task it spawned have
    /// finished, and returns the main task's result.
    ///
    /// An uncaught error in the main task ends the run at once. Errors in
    /// other tasks reject their futures and surface where those are awaited.
    pub async fn run(&mut self, program: &CompiledProgram) -> Result<Value> {
        self.data = program.data.clone();
        self.data_cursor = 0;

        let mut scheduler = Scheduler::new();
        let main = scheduler.spawn(program.main.clone(), Vec::new());

        loop {
            if let Some(mut task) = scheduler.next_ready() {
                trace!(task = task.id, "resuming task");
                match self.run_task(&mut task, &mut scheduler) {
                    Outcome::Suspended => {
                        trace!(task = task.id, "task suspended");
                        scheduler.park(task);
                    }
                    Outcome::Finished(value) => {
                        trace!(task = task.id, "task finished");
                        task.promise.settle(Ok(value));
                    }
                    Outcome::Failed(error) => {
                        if Rc::ptr_eq(&task.promise, &main) {
                            return Err(Error::Runtime(error));
                        }
                        debug!(task = task.id, error = %error, "task failed");
                        task.promise.settle(Err(error.message));
                    }
                    Outcome::Exit(code) => return Err(Error::Exit(code)),
                }
                scheduler.wake();
                continue;
            }

            if !scheduler.has_natives() {
                if scheduler.has_waiting() {
                    return Err(deadlock());
                }
                break;
            }
            if let Some((promise, result)) = scheduler.next_native().await {
                match result {
                    Ok(value) => promise.settle(Ok(value)),
                    Err(NativeError::Message(message)) => promise.settle(Err(message)),
                    Err(NativeError::Exit(code)) => return Err(Error::Exit(code)),
                }
            }
            scheduler.wake();
        }

        scheduler.report_unobserved();
        match main.outcome() {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(Error::Runtime(RuntimeError::new(message))),
            None => Err(deadlock()),
        }
    }
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("globals", &self.global_names())
            .field("data_cursor", &self.data_cursor)
            .field("base_dir", &self.base_dir)
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

fn deadlock() -> Error {
    Error::Runtime(RuntimeError::new("Deadlock: all tasks are waiting"))
}
