// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The bytecode interpreter.

use std::collections::BTreeMap;
use std::rc::Rc;

use futures::FutureExt;
use tracing::{debug, trace};

use super::scheduler::{Scheduler, Task, is_settled};
use super::{Vm, arithmetic, index};
use crate::ast::BinaryOp;
use crate::builtins::Native;
use crate::compiler::OpCode;
use crate::error::{NativeError, RuntimeError, TraceEntry};
use crate::loader::{self, ModuleState};
use crate::runtime::{CallFrame, Function, Promise, TryBlock, Value};

/// Result of executing one instruction.
pub(super) enum Flow {
    Continue,
    /// The task is waiting on the value on top of its stack
    Suspend,
    /// The task's outermost frame returned
    Finished(Value),
}

/// How a task stopped running.
pub(super) enum Outcome {
    Suspended,
    Finished(Value),
    Failed(RuntimeError),
    Exit(i32),
}

/// A decoded instruction. `a` is the first operand (u8 or u16), `b` the
/// trailing u8 of three-byte operands.
struct Instruction {
    op: OpCode,
    a: usize,
    b: usize,
}

impl Vm {
    /// Runs `task` until it finishes, suspends or fails.
    pub(super) fn run_task(&mut self, task: &mut Task, scheduler: &mut Scheduler) -> Outcome {
        loop {
            if !task.can_resume() {
                return Outcome::Suspended;
            }
            let result = if task.awaiting {
                finish_await(task).map(|()| Flow::Continue)
            } else {
                self.step(task, scheduler)
            };

            match result {
                Ok(Flow::Continue) => {}
                Ok(Flow::Suspend) => return Outcome::Suspended,
                Ok(Flow::Finished(value)) => return Outcome::Finished(value),
                Err(NativeError::Exit(code)) => return Outcome::Exit(code),
                Err(NativeError::Message(message)) => {
                    if !recover(task, &message) {
                        return Outcome::Failed(self.annotate(task, message));
                    }
                }
            }
        }
    }

    /// Attaches the failing line and an innermost-first trace.
    fn annotate(&self, task: &Task, message: String) -> RuntimeError {
        let mut error = RuntimeError::new(message);
        error.line = task.frames.last().map(CallFrame::current_line);
        error.trace = task
            .frames
            .iter()
            .rev()
            .take(self.config.trace_limit)
            .map(|frame| TraceEntry {
                function: frame.function.name.clone(),
                line: frame.current_line(),
            })
            .collect();
        error
    }

    pub(super) fn step(&mut self, task: &mut Task, scheduler: &mut Scheduler) -> Result<Flow, NativeError> {
        let Instruction { op, a, b } = task.fetch()?;

        match op {
            OpCode::Constant => {
                let value = task.constant(a)?;
                task.push(value);
            }
            OpCode::None => task.push(Value::None),
            OpCode::Pop => {
                task.pop()?;
            }
            OpCode::Dup => {
                let value = task.peek(0)?.clone();
                task.push(value);
            }

            // Variables
            OpCode::GetLocal => {
                let slot = task.local_slot(a)?;
                let value = task.stack[slot].clone();
                task.push(value);
            }
            OpCode::SetLocal => {
                let slot = task.local_slot(a)?;
                let value = task.peek(0)?.clone();
                task.stack[slot] = value;
            }
            OpCode::GetGlobal => {
                let name = task.name(a)?;
                let value = self
                    .globals
                    .get(name.as_ref())
                    .cloned()
                    .ok_or_else(|| NativeError::message(format!("Variable '{}' is not defined.", name)))?;
                task.push(value);
            }
            OpCode::SetGlobal => {
                let name = task.name(a)?;
                let value = task.peek(0)?.clone();
                self.globals.insert(name.to_string(), value);
            }

            // Operators
            OpCode::Add => binary(task, BinaryOp::Add)?,
            OpCode::Sub => binary(task, BinaryOp::Sub)?,
            OpCode::Mul => binary(task, BinaryOp::Mul)?,
            OpCode::Div => binary(task, BinaryOp::Div)?,
            OpCode::Mod => binary(task, BinaryOp::Mod)?,
            OpCode::Eq => binary(task, BinaryOp::Eq)?,
            OpCode::Ne => binary(task, BinaryOp::Ne)?,
            OpCode::Lt => binary(task, BinaryOp::Lt)?,
            OpCode::Le => binary(task, BinaryOp::Le)?,
            OpCode::Gt => binary(task, BinaryOp::Gt)?,
            OpCode::Ge => binary(task, BinaryOp::Ge)?,
            OpCode::Neg => {
                let value = task.pop()?;
                task.push(arithmetic::negate(&value)?);
            }
            OpCode::Not => {
                let value = task.pop()?;
                task.push(Value::bool(!value.is_truthy()));
            }
            OpCode::ToBool => {
                let value = task.pop()?;
                task.push(Value::bool(value.is_truthy()));
            }

            // Control flow
            OpCode::Jump => task.frame_mut()?.ip += a,
            OpCode::JumpIfFalse => {
                if !task.pop()?.is_truthy() {
                    task.frame_mut()?.ip += a;
                }
            }
            OpCode::JumpIfTrue => {
                if task.pop()?.is_truthy() {
                    task.frame_mut()?.ip += a;
                }
            }
            OpCode::Loop => {
                let frame = task.frame_mut()?;
                frame.ip = frame.ip.saturating_sub(a);
            }

            // Calls
            OpCode::Call => return self.call(task, a),
            OpCode::CallNamed => return self.call_named(task, scheduler, a, b),
            OpCode::Return => {
                let value = task.pop()?;
                let frame = task.frames.pop().ok_or_else(no_frame)?;
                let depth = task.frames.len();
                task.tries.retain(|block| block.frame_depth <= depth);
                task.stack.truncate(frame.stack_base.saturating_sub(1));
                if task.frames.is_empty() {
                    return Ok(Flow::Finished(value));
                }
                task.push(value);
            }

            // Structured data
            OpCode::BuildArray => {
                let items = task.pop_many(a)?;
                task.push(Value::array(items));
            }
            OpCode::BuildDict => {
                let flat = task.pop_many(a * 2)?;
                let mut entries = BTreeMap::new();
                let mut pairs = flat.into_iter();
                while let (Some(key), Some(value)) = (pairs.next(), pairs.next()) {
                    match key {
                        Value::Str(key) => {
                            entries.insert(key.to_string(), value);
                        }
                        other => {
                            return Err(NativeError::message(format!(
                                "Dictionary keys must be strings, found {}",
                                other.type_name()
                            )));
                        }
                    }
                }
                task.push(Value::dict(entries));
            }
            OpCode::BuildTuple => {
                let items = task.pop_many(a)?;
                task.push(Value::Tuple(Rc::from(items)));
            }
            OpCode::BuildString => {
                let parts = task.pop_many(a)?;
                let text: String = parts.iter().map(ToString::to_string).collect();
                task.push(Value::str(text));
            }
            OpCode::NewArray => {
                let sizes = task.pop_many(a)?;
                task.push(index::new_array(&sizes)?);
            }

            // Subscripts and iteration
            OpCode::GetIndex => {
                let key = task.pop()?;
                let object = task.pop()?;
                if let Value::Function(function) = object {
                    // `f[a, b]` reads as a call when `f` is a function.
                    let args = index::key_arguments(key);
                    let argc = args.len();
                    task.push(Value::Function(function.clone()));
                    task.stack.extend(args);
                    self.enter(task, function, argc)?;
                } else {
                    task.push(index::get(&object, &key)?);
                }
            }
            OpCode::SetIndex => {
                let value = task.pop()?;
                let key = task.pop()?;
                let object = task.pop()?;
                index::set(&object, &key, value.clone())?;
                task.push(value);
            }
            OpCode::Len => {
                let value = task.pop()?;
                task.push(Value::Int(index::length(&value)? as i64));
            }
            OpCode::IterValue => {
                let position = task.pop()?;
                let collection = task.pop()?;
                task.push(index::iter_value(&collection, &position)?);
            }

            // DATA pool
            OpCode::ReadData => {
                let value = self
                    .data
                    .get(self.data_cursor)
                    .cloned()
                    .ok_or_else(|| NativeError::message("Out of DATA"))?;
                self.data_cursor += 1;
                task.push(value);
            }
            OpCode::RestoreData => self.data_cursor = 0,

            // Console
            OpCode::Print => {
                let values = task.pop_many(a)?;
                let line = values
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                self.console.borrow_mut().print_line(&line);
            }
            OpCode::Debug => {
                let label = task.constant(a)?;
                let value = task.pop()?;
                self.console
                    .borrow_mut()
                    .print_line(&format!("{} = {}", label, value.repr()));
            }
            OpCode::Input => {
                let prompt = if a != 0 { task.pop()?.to_string() } else { String::new() };
                let line = self.console.borrow_mut().read_line(&prompt);
                task.push(line.map(coerce_input).unwrap_or_default());
            }

            // Tasks
            OpCode::Spawn => self.spawn(task, scheduler, a)?,
            OpCode::SpawnNamed => self.spawn_named(task, scheduler, a, b)?,
            OpCode::Await => {
                if !is_settled(task.peek(0)?) {
                    task.awaiting = true;
                    return Ok(Flow::Suspend);
                }
                finish_await(task)?;
            }
            OpCode::Import => {
                let request = task.name(a)?;
                let future = self.import(&request, scheduler)?;
                task.push(future);
            }
            OpCode::MergeGlobals => match task.pop()? {
                Value::Dict(entries) => {
                    for (name, value) in entries.borrow().iter() {
                        self.globals.insert(name.clone(), value.clone());
                    }
                }
                other => {
                    return Err(NativeError::message(format!(
                        "Cannot merge {} into globals",
                        other.type_name()
                    )));
                }
            },

            // Exceptions
            OpCode::TryBegin => {
                let handler = task.frame()?.ip + a;
                let block = TryBlock {
                    handler,
                    stack_depth: task.stack.len(),
                    frame_depth: task.frames.len(),
                };
                task.tries.push(block);
            }
            OpCode::TryEnd => {
                task.tries.pop();
            }
            OpCode::Raise => {
                let value = task.pop()?;
                return Err(NativeError::Message(value.to_string()));
            }
        }

        Ok(Flow::Continue)
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// `Call argc`: the callee sits beneath its arguments.
    fn call(&mut self, task: &mut Task, argc: usize) -> Result<Flow, NativeError> {
        let callee = task.peek(argc)?.clone();
        match &callee {
            Value::Function(function) => self.enter(task, function.clone(), argc)?,
            Value::Array(_) | Value::Dict(_) if argc == 1 => {
                let key = task.pop()?;
                task.pop()?;
                task.push(index::get(&callee, &key)?);
            }
            other => return Err(not_a_function(other)),
        }
        Ok(Flow::Continue)
    }

    /// `CallNamed name argc`: a global function, then a global container
    /// indexed by a single argument, then a builtin.
    fn call_named(
        &mut self,
        task: &mut Task,
        scheduler: &mut Scheduler,
        name: usize,
        argc: usize,
    ) -> Result<Flow, NativeError> {
        let name = task.name(name)?;
        match self.globals.get(name.as_ref()) {
            Some(Value::Function(function)) => {
                let function = function.clone();
                let at = task.stack.len().checked_sub(argc).ok_or_else(underflow)?;
                task.stack.insert(at, Value::Function(function.clone()));
                self.enter(task, function, argc)?;
                return Ok(Flow::Continue);
            }
            Some(container @ (Value::Array(_) | Value::Dict(_))) if argc == 1 => {
                let container = container.clone();
                let key = task.pop()?;
                task.push(index::get(&container, &key)?);
                return Ok(Flow::Continue);
            }
            _ => {}
        }

        let builtin = self
            .builtins
            .get(&name)
            .ok_or_else(|| NativeError::message(format!("'{}' is not a function.", name)))?;
        let args = task.pop_many(argc)?;
        match builtin(args)? {
            Native::Ready(value) => {
                task.push(value);
                Ok(Flow::Continue)
            }
            Native::Pending(future) => {
                // Awaited implicitly: the task resumes once the result is in.
                let promise = scheduler.register_native(future);
                task.push(Value::Future(promise));
                task.awaiting = true;
                Ok(Flow::Suspend)
            }
        }
    }

    /// Pushes a frame for `function`, whose arguments are the top `argc`
    /// values on the stack.
    fn enter(&self, task: &mut Task, function: Rc<Function>, argc: usize) -> Result<(), NativeError> {
        if function.is_async {
            return Err(NativeError::message(format!(
                "Cannot call async function '{}' synchronously; use await or spawn",
                function.name
            )));
        }
        check_arity(&function, argc)?;
        if task.frames.len() >= self.config.max_call_depth {
            return Err(NativeError::message(format!(
                "Stack overflow: maximum call depth of {} exceeded",
                self.config.max_call_depth
            )));
        }
        let base = task.stack.len().checked_sub(argc).ok_or_else(underflow)?;
        task.frames.push(CallFrame::new(function, base));
        Ok(())
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    /// `Spawn argc`: the callee sits beneath its arguments.
    fn spawn(&mut self, task: &mut Task, scheduler: &mut Scheduler, argc: usize) -> Result<(), NativeError> {
        let args = task.pop_many(argc)?;
        let callee = task.pop()?;
        let promise = match &callee {
            Value::Function(function) => spawn_function(scheduler, function.clone(), args)?,
            Value::Array(_) | Value::Dict(_) if args.len() == 1 => {
                Rc::new(Promise::resolved(index::get(&callee, &args[0])?))
            }
            other => return Err(not_a_function(other)),
        };
        task.push(Value::Future(promise));
        Ok(())
    }

    fn spawn_named(
        &mut self,
        task: &mut Task,
        scheduler: &mut Scheduler,
        name: usize,
        argc: usize,
    ) -> Result<(), NativeError> {
        let name = task.name(name)?;
        let args = task.pop_many(argc)?;

        let promise = match self.globals.get(name.as_ref()) {
            Some(Value::Function(function)) => spawn_function(scheduler, function.clone(), args)?,
            Some(container @ (Value::Array(_) | Value::Dict(_))) if args.len() == 1 => {
                Rc::new(Promise::resolved(index::get(container, &args[0])?))
            }
            _ => {
                let builtin = self
                    .builtins
                    .get(&name)
                    .ok_or_else(|| NativeError::message(format!("'{}' is not a function.", name)))?;
                let promise = match builtin(args)? {
                    Native::Ready(value) => Rc::new(Promise::resolved(value)),
                    Native::Pending(future) => scheduler.register_native(future),
                };
                scheduler.track(promise.clone());
                promise
            }
        };
        task.push(Value::Future(promise));
        Ok(())
    }

    /// Starts loading a module, or hands back the cached globals. A module
    /// another task is already loading is waited for, unless the wait
    /// would loop back to this VM's own module.
    fn import(&mut self, request: &str, scheduler: &mut Scheduler) -> Result<Value, NativeError> {
        let path = loader::resolve(&self.base_dir, request, &self.config.module_extension)?;
        let cached = self.modules.borrow().get(&path);
        match cached {
            Some(ModuleState::Loaded(globals)) => {
                trace!(module = %path.display(), "module already loaded");
                Ok(Value::Future(Rc::new(Promise::resolved(Value::Dict(globals)))))
            }
            Some(ModuleState::Loading(loading)) => {
                if let Some(importer) = &self.module {
                    let mut modules = self.modules.borrow_mut();
                    if modules.closes_cycle(importer, &path) {
                        return Err(NativeError::message(format!(
                            "Circular import of '{}'",
                            path.display()
                        )));
                    }
                    modules.add_import(importer, &path);
                }
                trace!(module = %path.display(), "waiting for module");
                let wait = async move { loading.wait().await.map_err(NativeError::Message) };
                Ok(Value::Future(scheduler.register_native(wait.boxed_local())))
            }
            None => {
                debug!(module = %path.display(), "importing module");
                let vm = self.module_vm(path.clone());
                let promise = scheduler.register_native(loader::load(vm, path.clone()).boxed_local());
                let mut modules = self.modules.borrow_mut();
                modules.begin(path.clone(), promise.clone());
                if let Some(importer) = &self.module {
                    modules.add_import(importer, &path);
                }
                Ok(Value::Future(promise))
            }
        }
    }
}

fn spawn_function(
    scheduler: &mut Scheduler,
    function: Rc<Function>,
    args: Vec<Value>,
) -> Result<Rc<Promise>, NativeError> {
    check_arity(&function, args.len())?;
    trace!(function = %function.name, "spawning task");
    Ok(scheduler.spawn_tracked(function, args))
}

/// Replaces the awaited value on top of the stack with its result.
fn finish_await(task: &mut Task) -> Result<(), NativeError> {
    task.awaiting = false;
    let awaited = task.pop()?;
    let value = match awaited {
        Value::Future(promise) => settled_value(&promise)?,
        Value::Array(items) => {
            let outcomes: Vec<Result<Value, NativeError>> = items
                .borrow()
                .iter()
                .map(|item| match item {
                    Value::Future(promise) => settled_value(promise),
                    other => Ok(other.clone()),
                })
                .collect();
            // Every element is observed before the first failure is raised.
            Value::array(outcomes.into_iter().collect::<Result<Vec<_>, _>>()?)
        }
        other => other,
    };
    task.push(value);
    Ok(())
}

fn settled_value(promise: &Promise) -> Result<Value, NativeError> {
    match promise.outcome() {
        Some(Ok(value)) => Ok(value),
        Some(Err(message)) => Err(NativeError::Message(message)),
        None => Err(NativeError::message("Awaited future is still pending")),
    }
}

/// Unwinds to the innermost try region. Returns false when there is none.
pub(super) fn recover(task: &mut Task, message: &str) -> bool {
    let Some(block) = task.tries.pop() else {
        return false;
    };
    task.frames.truncate(block.frame_depth);
    task.stack.truncate(block.stack_depth);
    task.awaiting = false;
    match task.frames.last_mut() {
        Some(frame) => frame.ip = block.handler,
        None => return false,
    }
    task.push(Value::str(message));
    true
}

fn binary(task: &mut Task, op: BinaryOp) -> Result<(), NativeError> {
    let right = task.pop()?;
    let left = task.pop()?;
    task.push(arithmetic::binary(op, &left, &right)?);
    Ok(())
}

fn check_arity(function: &Function, argc: usize) -> Result<(), NativeError> {
    if function.arity == argc {
        return Ok(());
    }
    Err(NativeError::message(format!(
        "Function '{}' expected {} arguments, but got {}",
        function.name, function.arity, argc
    )))
}

/// `input` yields an Int for integral numbers, a Float for other numbers,
/// and the raw line otherwise.
fn coerce_input(line: String) -> Value {
    let text = line.trim();
    if let Ok(n) = text.parse::<i64>() {
        return Value::Int(n);
    }
    match text.parse::<f64>() {
        Ok(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < i64::MAX as f64 => Value::Int(n as i64),
        Ok(n) if n.is_finite() => Value::Float(n),
        _ => Value::str(line),
    }
}

fn not_a_function(value: &Value) -> NativeError {
    NativeError::message(format!("'{}' is not a function.", value))
}

fn underflow() -> NativeError {
    NativeError::message("Stack underflow")
}

fn no_frame() -> NativeError {
    NativeError::message("No active call frame")
}

impl Task {
    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Result<Value, NativeError> {
        self.stack.pop().ok_or_else(underflow)
    }

    fn peek(&self, distance: usize) -> Result<&Value, NativeError> {
        let at = self.stack.len().checked_sub(distance + 1).ok_or_else(underflow)?;
        Ok(&self.stack[at])
    }

    /// Pops the top `count` values, bottom-most first.
    fn pop_many(&mut self, count: usize) -> Result<Vec<Value>, NativeError> {
        let at = self.stack.len().checked_sub(count).ok_or_else(underflow)?;
        Ok(self.stack.split_off(at))
    }

    fn frame(&self) -> Result<&CallFrame, NativeError> {
        self.frames.last().ok_or_else(no_frame)
    }

    fn frame_mut(&mut self) -> Result<&mut CallFrame, NativeError> {
        self.frames.last_mut().ok_or_else(no_frame)
    }

    fn local_slot(&self, slot: usize) -> Result<usize, NativeError> {
        let at = self.frame()?.stack_base + slot;
        if at >= self.stack.len() {
            return Err(NativeError::message(format!("Invalid local slot {}", slot)));
        }
        Ok(at)
    }

    fn constant(&self, index: usize) -> Result<Value, NativeError> {
        self.frame()?
            .function
            .chunk
            .constants
            .get(index)
            .cloned()
            .ok_or_else(|| NativeError::message(format!("Invalid constant index {}", index)))
    }

    /// A string constant, as used for names and paths.
    fn name(&self, index: usize) -> Result<Rc<str>, NativeError> {
        match self.constant(index)? {
            Value::Str(name) => Ok(name),
            other => Err(NativeError::message(format!(
                "Expected a name constant, found {}",
                other.type_name()
            ))),
        }
    }

    /// Decodes the instruction at the current ip and advances past it.
    fn fetch(&mut self) -> Result<Instruction, NativeError> {
        let frame = self.frame_mut()?;
        let code = &frame.function.chunk.code;
        let byte = *code
            .get(frame.ip)
            .ok_or_else(|| NativeError::message("Instruction pointer out of bounds"))?;
        let op = OpCode::from_byte(byte)
            .ok_or_else(|| NativeError::message(format!("Unknown opcode {}", byte)))?;

        let start = frame.ip + 1;
        let width = op.operand_width();
        let operands = code
            .get(start..start + width)
            .ok_or_else(|| NativeError::message("Truncated instruction"))?;
        let (a, b) = match operands {
            [] => (0, 0),
            [x] => (*x as usize, 0),
            [hi, lo] => (u16::from_be_bytes([*hi, *lo]) as usize, 0),
            [hi, lo, x, ..] => (u16::from_be_bytes([*hi, *lo]) as usize, *x as usize),
        };
        frame.ip = start + width;
        Ok(Instruction { op, a, b })
    }
}
