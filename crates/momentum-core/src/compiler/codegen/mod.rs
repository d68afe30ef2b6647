// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Code generation from AST to bytecode.
//!
//! This module contains the `Compiler` which transforms a parsed Momentum
//! program into one [`Chunk`] per function plus one for top-level code.
//!
//! Locals live on the task's operand stack: at every statement boundary the
//! frame holds exactly its live locals, so a local's index in the scope list
//! is also its frame-relative slot.

mod expressions;
mod scope;
mod statements;

#[cfg(test)]
mod tests;

pub use scope::{Local, Scope};

use std::rc::Rc;

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::ast::*;
use crate::compiler::bytecode::{Chunk, OpCode};
use crate::error::{Error, Result};
use crate::runtime::{Function, MAIN_NAME, Value};

/// A compiled program: the top-level function and its DATA pool.
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    /// Zero-arity function wrapping top-level code
    pub main: Rc<Function>,
    /// Every `data` literal in source order
    pub data: Vec<Value>,
}

#[derive(Debug, Default)]
struct LoopContext {
    /// Locals deeper than this belong to the body
    scope_depth: usize,
    /// Number of try regions open outside the loop
    try_depth: usize,
    /// Backward target for `continue`, when known up front
    continue_target: Option<usize>,
    continue_patches: Vec<usize>,
    break_patches: Vec<usize>,
}

#[derive(Debug, Clone)]
struct TryContext {
    /// Inlined on every jump out of the region
    finally: Option<Vec<Statement>>,
    /// Scope depth at the `try` statement
    scope_depth: usize,
}

/// Compiles AST to bytecode.
#[derive(Debug, Default)]
pub struct Compiler {
    /// The chunk being generated
    chunk: Chunk,
    /// Current scope for variable resolution
    scope: Scope,
    /// False for top-level code, where plain assignment binds globals
    in_function: bool,
    loops: Vec<LoopContext>,
    tries: Vec<TryContext>,
    /// Names listed in `global` statements
    globals: FxHashSet<String>,
    /// Line attributed to emitted bytes
    line: u32,
    /// Hidden local holding a pending `return` value while finally blocks run
    return_slot: Option<u16>,
}

impl Compiler {
    /// Creates a new compiler for top-level code.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles a whole program.
    pub fn compile(&mut self, program: &Program) -> Result<CompiledProgram> {
        self.compile_main(program, false)
    }

    /// Compiles a program for the REPL: when the last statement is an
    /// expression its value is returned from the main function instead of
    /// being discarded.
    pub fn compile_interactive(&mut self, program: &Program) -> Result<CompiledProgram> {
        self.compile_main(program, true)
    }

    fn compile_main(&mut self, program: &Program, keep_last: bool) -> Result<CompiledProgram> {
        let mut data = Vec::new();
        collect_data(&program.body, &mut data)?;

        // Top-level functions are bound before anything else runs.
        for stmt in &program.body {
            if let StatementKind::Function(decl) = &stmt.kind {
                self.line = stmt.line;
                self.compile_function(decl)?;
            }
        }

        let mut returned = false;
        for (i, stmt) in program.body.iter().enumerate() {
            match &stmt.kind {
                StatementKind::Function(_) => {}
                StatementKind::Expression(expr) if keep_last && i + 1 == program.body.len() => {
                    self.line = stmt.line;
                    self.compile_expression(expr)?;
                    self.emit_op(OpCode::Return);
                    returned = true;
                }
                _ => self.compile_statement(stmt)?,
            }
        }
        if !returned {
            self.emit_op(OpCode::None);
            self.emit_op(OpCode::Return);
        }

        let chunk = std::mem::take(&mut self.chunk);
        debug!(function = MAIN_NAME, bytes = chunk.len(), data = data.len(), "compiled program");
        Ok(CompiledProgram {
            main: Rc::new(Function::new(MAIN_NAME, 0, chunk)),
            data,
        })
    }

    /// Compiles a function body with a fresh compiler and binds the result
    /// as a global.
    fn compile_function(&mut self, decl: &FunctionDeclaration) -> Result<()> {
        if decl.params.len() > u8::MAX as usize {
            return Err(self.error(format!("Too many parameters in function '{}'", decl.name)));
        }

        let mut compiler = Compiler {
            in_function: true,
            line: self.line,
            ..Compiler::default()
        };
        compiler.scope.begin_scope();
        for param in &decl.params {
            compiler.declare_local(param)?;
        }
        if returns_inside_try(&decl.body, false) {
            compiler.emit_op(OpCode::None);
            compiler.return_slot = Some(compiler.declare_local("(return)")?);
        }
        for stmt in &decl.body {
            compiler.compile_statement(stmt)?;
        }
        compiler.emit_op(OpCode::None);
        compiler.emit_op(OpCode::Return);

        let mut function = Function::new(decl.name.clone(), decl.params.len(), compiler.chunk);
        function.is_async = decl.is_async;
        function.is_native = decl.is_native;
        debug!(function = %decl.name, arity = function.arity, bytes = function.chunk.len(), "compiled function");

        self.emit_constant(Value::Function(Rc::new(function)))?;
        let name = self.name_constant(&decl.name)?;
        self.emit_with_u16(OpCode::SetGlobal, name);
        self.emit_op(OpCode::Pop);
        Ok(())
    }

    // ========================================================================
    // Emission helpers
    // ========================================================================

    fn error(&self, message: impl Into<String>) -> Error {
        Error::compile(self.line, message)
    }

    fn emit_op(&mut self, op: OpCode) {
        self.chunk.write_op(op, self.line);
    }

    fn emit_byte(&mut self, byte: u8) {
        self.chunk.write(byte, self.line);
    }

    fn emit_with_u16(&mut self, op: OpCode, operand: u16) {
        self.chunk.write_op(op, self.line);
        self.chunk.write_u16(operand, self.line);
    }

    fn emit_with_u8(&mut self, op: OpCode, operand: u8) {
        self.chunk.write_op(op, self.line);
        self.chunk.write(operand, self.line);
    }

    fn make_constant(&mut self, value: Value) -> Result<u16> {
        self.chunk
            .add_constant(value)
            .ok_or_else(|| self.error("Too many constants in one chunk"))
    }

    fn emit_constant(&mut self, value: Value) -> Result<()> {
        let index = self.make_constant(value)?;
        self.emit_with_u16(OpCode::Constant, index);
        Ok(())
    }

    fn name_constant(&mut self, name: &str) -> Result<u16> {
        self.make_constant(Value::str(name))
    }

    /// Emits a forward jump with a placeholder; returns the operand offset.
    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_with_u16(op, u16::MAX);
        self.chunk.len() - 2
    }

    /// Points the jump operand at `offset` to the current end of code.
    fn patch_jump(&mut self, offset: usize) -> Result<()> {
        let distance = self.chunk.len() - (offset + 2);
        let distance = u16::try_from(distance).map_err(|_| self.error("Too much code to jump over"))?;
        self.chunk.patch_u16(offset, distance);
        Ok(())
    }

    fn emit_loop(&mut self, target: usize) -> Result<()> {
        self.emit_op(OpCode::Loop);
        let distance = self.chunk.len() + 2 - target;
        let distance = u16::try_from(distance).map_err(|_| self.error("Loop body too large"))?;
        self.chunk.write_u16(distance, self.line);
        Ok(())
    }

    fn count_operand(&self, count: usize, what: &str) -> Result<u8> {
        u8::try_from(count).map_err(|_| self.error(format!("Too many {}", what)))
    }

    // ========================================================================
    // Scopes and locals
    // ========================================================================

    /// Declares a local for the value currently on top of the stack.
    fn declare_local(&mut self, name: &str) -> Result<u16> {
        let slot = self.scope.declare(name).map_err(|message| self.error(message))?;
        u16::try_from(slot).map_err(|_| self.error("Too many local variables in function"))
    }

    fn is_local(&self, name: &str) -> bool {
        !self.globals.contains(name) && self.scope.resolve(name).is_some()
    }

    fn local_slot(&self, name: &str) -> Option<u16> {
        if self.globals.contains(name) {
            return None;
        }
        // Slots are bounded by `declare_local`.
        self.scope.resolve(name).map(|slot| slot as u16)
    }

    /// Leaves the current scope, popping its locals.
    fn pop_scope(&mut self) {
        for _ in 0..self.scope.end_scope() {
            self.emit_op(OpCode::Pop);
        }
    }

    /// Leaves a scope whose end is unreachable; nothing is emitted.
    fn close_dead_scope(&mut self) {
        self.scope.end_scope();
    }

    /// Pops every local deeper than `depth`.
    fn discard_locals_above(&mut self, depth: usize) {
        let count = self.scope.count_above(depth);
        for _ in 0..count {
            self.emit_op(OpCode::Pop);
        }
        let keep = self.scope.locals.len() - count;
        self.scope.locals.truncate(keep);
    }

    fn compile_block(&mut self, statements: &[Statement]) -> Result<()> {
        self.scope.begin_scope();
        for stmt in statements {
            self.compile_statement(stmt)?;
        }
        self.pop_scope();
        Ok(())
    }

    /// Emits the cleanup for a jump that leaves try regions `try_depth..`
    /// and every local deeper than `scope_depth`, then lets `jump` emit the
    /// transfer itself. Crossed finally blocks are inlined. Compile-time scope
    /// state is restored afterwards; the code after the jump is unreachable
    /// on this path.
    fn emit_exit(
        &mut self,
        scope_depth: usize,
        try_depth: usize,
        jump: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        let saved = self.scope.locals.clone();
        for index in (try_depth..self.tries.len()).rev() {
            let region = self.tries[index].clone();
            self.discard_locals_above(region.scope_depth);
            self.emit_op(OpCode::TryEnd);
            if let Some(finally) = &region.finally {
                let outer = self.tries.split_off(index);
                let result = self.compile_block(finally);
                self.tries.extend(outer);
                result?;
            }
        }
        self.discard_locals_above(scope_depth);
        let result = jump(self);
        self.scope.locals = saved;
        result
    }
}

/// Collects every `data` value in source order, function bodies and
/// unreachable branches included.
fn collect_data(statements: &[Statement], pool: &mut Vec<Value>) -> Result<()> {
    for stmt in statements {
        if let StatementKind::Data(items) = &stmt.kind {
            for item in items {
                let value = literal_value(item)
                    .ok_or_else(|| Error::compile(stmt.line, "DATA values must be literals"))?;
                pool.push(value);
            }
        }
        for block in child_blocks(&stmt.kind) {
            collect_data(block, pool)?;
        }
    }
    Ok(())
}

fn literal_value(expr: &Expression) -> Option<Value> {
    match expr {
        Expression::Int(n) => Some(Value::Int(*n)),
        Expression::Float(n) => Some(Value::Float(*n)),
        Expression::Str(s) => Some(Value::str(s)),
        Expression::None => Some(Value::None),
        Expression::Unary {
            op: UnaryOp::Neg,
            operand,
        } => match **operand {
            Expression::Int(n) => n.checked_neg().map(Value::Int),
            Expression::Float(n) => Some(Value::Float(-n)),
            _ => None,
        },
        _ => None,
    }
}

/// Whether a `return` appears inside a try region of this function body.
fn returns_inside_try(statements: &[Statement], inside: bool) -> bool {
    statements.iter().any(|stmt| match &stmt.kind {
        StatementKind::Return(_) => inside,
        StatementKind::Function(_) => false,
        StatementKind::Try(_) => child_blocks(&stmt.kind)
            .into_iter()
            .any(|block| returns_inside_try(block, true)),
        kind => child_blocks(kind)
            .into_iter()
            .any(|block| returns_inside_try(block, inside)),
    })
}

/// Nested statement lists of a statement.
fn child_blocks(kind: &StatementKind) -> Vec<&[Statement]> {
    match kind {
        StatementKind::If(stmt) => {
            let mut blocks: Vec<&[Statement]> = stmt.branches.iter().map(|(_, body)| body.as_slice()).collect();
            blocks.extend(stmt.else_body.as_deref());
            blocks
        }
        StatementKind::While(stmt) => vec![stmt.body.as_slice()],
        StatementKind::For(stmt) => vec![stmt.body.as_slice()],
        StatementKind::ForEach(stmt) => vec![stmt.body.as_slice()],
        StatementKind::Function(decl) => vec![decl.body.as_slice()],
        StatementKind::Try(stmt) => {
            let mut blocks = vec![stmt.body.as_slice()];
            blocks.extend(stmt.catch.as_ref().map(|(_, body)| body.as_slice()));
            blocks.extend(stmt.finally.as_deref());
            blocks
        }
        StatementKind::Switch(stmt) => {
            let mut blocks: Vec<&[Statement]> = stmt.cases.iter().map(|case| case.body.as_slice()).collect();
            blocks.extend(stmt.default.as_deref());
            blocks
        }
        _ => Vec::new(),
    }
}
