// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Statement compilation.
//!
//! Every statement leaves the operand stack exactly as deep as it found it,
//! plus one slot for each local it declares in the enclosing scope.

use super::{Compiler, LoopContext, TryContext};
use crate::ast::*;
use crate::compiler::bytecode::OpCode;
use crate::error::Result;
use crate::runtime::Value;

impl Compiler {
    pub(super) fn compile_statement(&mut self, stmt: &Statement) -> Result<()> {
        self.line = stmt.line;
        match &stmt.kind {
            StatementKind::Expression(expr) => {
                self.compile_expression(expr)?;
                self.emit_op(OpCode::Pop);
            }
            StatementKind::Assign(assign) => {
                self.compile_store(&assign.target, |c| c.compile_expression(&assign.value))?;
            }
            StatementKind::Declare(name) => self.compile_declare(name)?,
            StatementKind::Print(values) => {
                let count = self.count_operand(values.len(), "values in print")?;
                for value in values {
                    self.compile_expression(value)?;
                }
                self.emit_with_u8(OpCode::Print, count);
            }
            StatementKind::Input(input) => {
                self.compile_store(&input.target, |c| {
                    if let Some(prompt) = &input.prompt {
                        c.compile_expression(prompt)?;
                    }
                    c.emit_with_u8(OpCode::Input, input.prompt.is_some() as u8);
                    Ok(())
                })?;
            }
            StatementKind::If(stmt) => self.compile_if(stmt)?,
            StatementKind::While(stmt) => self.compile_while(stmt)?,
            StatementKind::For(stmt) => self.compile_for(stmt)?,
            StatementKind::ForEach(stmt) => self.compile_for_each(stmt)?,
            StatementKind::Function(decl) => self.compile_function(decl)?,
            StatementKind::Return(value) => self.compile_return(value.as_ref())?,
            StatementKind::Dim(arrays) => {
                for array in arrays {
                    let dims = self.count_operand(array.sizes.len(), "array dimensions")?;
                    self.compile_store(&Expression::Variable(array.name.clone()), |c| {
                        for size in &array.sizes {
                            c.compile_expression(size)?;
                        }
                        c.emit_with_u8(OpCode::NewArray, dims);
                        Ok(())
                    })?;
                }
            }
            // Collected by the pre-pass
            StatementKind::Data(_) => {}
            StatementKind::Read(targets) => {
                for target in targets {
                    self.compile_store(target, |c| {
                        c.emit_op(OpCode::ReadData);
                        Ok(())
                    })?;
                }
            }
            StatementKind::Restore => self.emit_op(OpCode::RestoreData),
            StatementKind::Break => self.compile_break()?,
            StatementKind::Continue => self.compile_continue()?,
            StatementKind::Try(stmt) => self.compile_try(stmt)?,
            StatementKind::Switch(stmt) => self.compile_switch(stmt)?,
            StatementKind::Import(path) => {
                let path = self.make_constant(Value::str(path))?;
                self.emit_with_u16(OpCode::Import, path);
                self.emit_op(OpCode::Await);
                self.emit_op(OpCode::MergeGlobals);
            }
            StatementKind::Spawn(call) => {
                self.compile_spawn(call)?;
                self.emit_op(OpCode::Pop);
            }
            StatementKind::Global(names) => {
                if !self.in_function {
                    return Err(self.error("'global' declaration outside of a function"));
                }
                self.globals.extend(names.iter().cloned());
            }
            StatementKind::Raise(value) => {
                self.compile_expression(value)?;
                self.emit_op(OpCode::Raise);
            }
            StatementKind::Debug(debug) => {
                self.compile_expression(&debug.expression)?;
                let label = self.make_constant(Value::str(&debug.source))?;
                self.emit_with_u16(OpCode::Debug, label);
            }
        }
        Ok(())
    }

    // ========================================================================
    // Variables and stores
    // ========================================================================

    /// Compiles a store into `target`; `value` emits the stored value.
    pub(super) fn compile_store(
        &mut self,
        target: &Expression,
        value: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        match target {
            Expression::Variable(name) => {
                value(self)?;
                self.store_variable(name)
            }
            Expression::Index { object, keys } => {
                self.compile_expression(object)?;
                self.compile_keys(keys)?;
                value(self)?;
                self.emit_op(OpCode::SetIndex);
                self.emit_op(OpCode::Pop);
                Ok(())
            }
            _ => Err(self.error("Invalid assignment target")),
        }
    }

    /// Stores the value on top of the stack into `name`, consuming it
    /// unless it becomes a new local.
    fn store_variable(&mut self, name: &str) -> Result<()> {
        if let Some(slot) = self.local_slot(name) {
            self.emit_with_u16(OpCode::SetLocal, slot);
            self.emit_op(OpCode::Pop);
        } else if self.in_function && !self.globals.contains(name) {
            self.declare_local(name)?;
        } else {
            let name = self.name_constant(name)?;
            self.emit_with_u16(OpCode::SetGlobal, name);
            self.emit_op(OpCode::Pop);
        }
        Ok(())
    }

    fn compile_declare(&mut self, name: &str) -> Result<()> {
        self.emit_op(OpCode::None);
        if self.in_function && !self.globals.contains(name) {
            self.declare_local(name)?;
        } else {
            let name = self.name_constant(name)?;
            self.emit_with_u16(OpCode::SetGlobal, name);
            self.emit_op(OpCode::Pop);
        }
        Ok(())
    }

    /// Makes sure a loop variable has storage that outlives the loop, so
    /// per-iteration stores never grow the stack.
    fn ensure_variable(&mut self, name: &str) -> Result<()> {
        if self.in_function && !self.globals.contains(name) && self.scope.resolve(name).is_none() {
            self.emit_op(OpCode::None);
            self.declare_local(name)?;
        }
        Ok(())
    }

    // ========================================================================
    // Control flow
    // ========================================================================

    fn compile_if(&mut self, stmt: &IfStatement) -> Result<()> {
        let mut end_jumps = Vec::new();
        let last = stmt.branches.len().saturating_sub(1);

        for (i, (condition, body)) in stmt.branches.iter().enumerate() {
            self.compile_expression(condition)?;
            let next = self.emit_jump(OpCode::JumpIfFalse);
            self.compile_block(body)?;
            if i < last || stmt.else_body.is_some() {
                end_jumps.push(self.emit_jump(OpCode::Jump));
            }
            self.patch_jump(next)?;
        }

        if let Some(body) = &stmt.else_body {
            self.compile_block(body)?;
        }
        for jump in end_jumps {
            self.patch_jump(jump)?;
        }
        Ok(())
    }

    fn compile_while(&mut self, stmt: &WhileStatement) -> Result<()> {
        let loop_start = self.chunk.len();
        self.compile_expression(&stmt.condition)?;
        let exit = self.emit_jump(OpCode::JumpIfFalse);

        self.loops.push(LoopContext {
            scope_depth: self.scope.depth,
            try_depth: self.tries.len(),
            continue_target: Some(loop_start),
            ..LoopContext::default()
        });
        let body = self.compile_block(&stmt.body);
        let context = self.finish_loop();
        body?;

        self.emit_loop(loop_start)?;
        self.patch_jump(exit)?;
        for jump in context.break_patches {
            self.patch_jump(jump)?;
        }
        Ok(())
    }

    /// `for v = start to end step s`. The bounds are evaluated once into
    /// hidden locals; the variable itself follows the assignment rule and
    /// outlives the loop.
    fn compile_for(&mut self, stmt: &ForStatement) -> Result<()> {
        let var = Expression::Variable(stmt.var.clone());
        self.compile_store(&var, |c| c.compile_expression(&stmt.start))?;

        self.scope.begin_scope();
        self.compile_expression(&stmt.end)?;
        self.declare_local("(end)")?;
        match &stmt.step {
            Some(step) => self.compile_expression(step)?,
            None => self.emit_constant(Value::Int(1))?,
        }
        self.declare_local("(step)")?;

        // (step > 0 and v <= end) or (step < 0 and v >= end)
        let step = || Box::new(Expression::Variable("(step)".into()));
        let end = || Box::new(Expression::Variable("(end)".into()));
        let compare = |op, left: Box<Expression>, right: Box<Expression>| Expression::Binary { op, left, right };
        let and = |left, right| Expression::Logical {
            op: LogicalOp::And,
            left: Box::new(left),
            right: Box::new(right),
        };
        let condition = Expression::Logical {
            op: LogicalOp::Or,
            left: Box::new(and(
                compare(BinaryOp::Gt, step(), Box::new(Expression::Int(0))),
                compare(BinaryOp::Le, Box::new(var.clone()), end()),
            )),
            right: Box::new(and(
                compare(BinaryOp::Lt, step(), Box::new(Expression::Int(0))),
                compare(BinaryOp::Ge, Box::new(var.clone()), end()),
            )),
        };

        let loop_start = self.chunk.len();
        self.compile_expression(&condition)?;
        let exit = self.emit_jump(OpCode::JumpIfFalse);

        self.loops.push(LoopContext {
            scope_depth: self.scope.depth,
            try_depth: self.tries.len(),
            ..LoopContext::default()
        });
        let body = self.compile_block(&stmt.body);
        let context = self.finish_loop();
        body?;

        for jump in context.continue_patches {
            self.patch_jump(jump)?;
        }
        let increment = compare(BinaryOp::Add, Box::new(var.clone()), step());
        self.compile_store(&var, |c| c.compile_expression(&increment))?;
        self.emit_loop(loop_start)?;

        self.patch_jump(exit)?;
        for jump in context.break_patches {
            self.patch_jump(jump)?;
        }
        self.pop_scope();
        Ok(())
    }

    /// `for each v in e`: walks array elements, string characters or sorted
    /// dictionary keys by position.
    fn compile_for_each(&mut self, stmt: &ForEachStatement) -> Result<()> {
        self.ensure_variable(&stmt.var)?;

        self.scope.begin_scope();
        self.compile_expression(&stmt.iterable)?;
        let each = self.declare_local("(each)")?;
        self.emit_constant(Value::Int(0))?;
        let index = self.declare_local("(index)")?;

        let loop_start = self.chunk.len();
        self.emit_with_u16(OpCode::GetLocal, index);
        self.emit_with_u16(OpCode::GetLocal, each);
        self.emit_op(OpCode::Len);
        self.emit_op(OpCode::Lt);
        let exit = self.emit_jump(OpCode::JumpIfFalse);

        self.compile_store(&Expression::Variable(stmt.var.clone()), |c| {
            c.emit_with_u16(OpCode::GetLocal, each);
            c.emit_with_u16(OpCode::GetLocal, index);
            c.emit_op(OpCode::IterValue);
            Ok(())
        })?;

        self.loops.push(LoopContext {
            scope_depth: self.scope.depth,
            try_depth: self.tries.len(),
            ..LoopContext::default()
        });
        let body = self.compile_block(&stmt.body);
        let context = self.finish_loop();
        body?;

        for jump in context.continue_patches {
            self.patch_jump(jump)?;
        }
        self.emit_with_u16(OpCode::GetLocal, index);
        self.emit_constant(Value::Int(1))?;
        self.emit_op(OpCode::Add);
        self.emit_with_u16(OpCode::SetLocal, index);
        self.emit_op(OpCode::Pop);
        self.emit_loop(loop_start)?;

        self.patch_jump(exit)?;
        for jump in context.break_patches {
            self.patch_jump(jump)?;
        }
        self.pop_scope();
        Ok(())
    }

    fn finish_loop(&mut self) -> LoopContext {
        self.loops.pop().unwrap_or_default()
    }

    fn compile_break(&mut self) -> Result<()> {
        let Some(context) = self.loops.last() else {
            return Err(self.error("'break' outside of a loop"));
        };
        let (scope_depth, try_depth) = (context.scope_depth, context.try_depth);
        self.emit_exit(scope_depth, try_depth, |c| {
            let jump = c.emit_jump(OpCode::Jump);
            if let Some(context) = c.loops.last_mut() {
                context.break_patches.push(jump);
            }
            Ok(())
        })
    }

    fn compile_continue(&mut self) -> Result<()> {
        let Some(context) = self.loops.last() else {
            return Err(self.error("'continue' outside of a loop"));
        };
        let (scope_depth, try_depth, target) =
            (context.scope_depth, context.try_depth, context.continue_target);
        self.emit_exit(scope_depth, try_depth, |c| match target {
            Some(target) => c.emit_loop(target),
            None => {
                let jump = c.emit_jump(OpCode::Jump);
                if let Some(context) = c.loops.last_mut() {
                    context.continue_patches.push(jump);
                }
                Ok(())
            }
        })
    }

    fn compile_return(&mut self, value: Option<&Expression>) -> Result<()> {
        if !self.in_function {
            return Err(self.error("'return' outside of a function"));
        }
        match value {
            Some(value) => self.compile_expression(value)?,
            None => self.emit_op(OpCode::None),
        }

        let slot = match self.return_slot {
            Some(slot) if !self.tries.is_empty() => slot,
            _ => {
                self.emit_op(OpCode::Return);
                return Ok(());
            }
        };

        // Park the value while the enclosing finally blocks run.
        self.emit_with_u16(OpCode::SetLocal, slot);
        self.emit_op(OpCode::Pop);
        let depth = self.scope.depth;
        self.emit_exit(depth, 0, |c| {
            c.emit_with_u16(OpCode::GetLocal, slot);
            c.emit_op(OpCode::Return);
            Ok(())
        })
    }

    fn compile_switch(&mut self, stmt: &SwitchStatement) -> Result<()> {
        self.scope.begin_scope();
        self.compile_expression(&stmt.subject)?;
        let subject = self.declare_local("(switch)")?;

        let mut end_jumps = Vec::new();
        for case in &stmt.cases {
            let mut matched = Vec::with_capacity(case.values.len());
            for value in &case.values {
                self.emit_with_u16(OpCode::GetLocal, subject);
                self.compile_expression(value)?;
                self.emit_op(OpCode::Eq);
                matched.push(self.emit_jump(OpCode::JumpIfTrue));
            }
            let next = self.emit_jump(OpCode::Jump);

            for jump in matched {
                self.patch_jump(jump)?;
            }
            self.compile_block(&case.body)?;
            end_jumps.push(self.emit_jump(OpCode::Jump));
            self.patch_jump(next)?;
        }

        if let Some(body) = &stmt.default {
            self.compile_block(body)?;
        }
        for jump in end_jumps {
            self.patch_jump(jump)?;
        }
        self.pop_scope();
        Ok(())
    }

    // ========================================================================
    // Exceptions
    // ========================================================================

    /// Layout:
    ///
    /// ```text
    ///     TryBegin H
    ///     <body>
    ///     TryEnd
    ///     Jump NORMAL
    /// H:  (message on the stack)
    ///     <catch body with the message as a local>   or
    ///     <finally body, then re-raise the message>
    /// NORMAL:
    ///     <finally body>
    /// ```
    ///
    /// With both catch and finally, the catch body is itself protected so an
    /// error raised there still runs the finally body before propagating.
    fn compile_try(&mut self, stmt: &TryStatement) -> Result<()> {
        let handler = self.emit_jump(OpCode::TryBegin);
        self.tries.push(TryContext {
            finally: stmt.finally.clone(),
            scope_depth: self.scope.depth,
        });
        let body = self.compile_block(&stmt.body);
        self.tries.pop();
        body?;
        self.emit_op(OpCode::TryEnd);
        let normal = self.emit_jump(OpCode::Jump);
        self.patch_jump(handler)?;

        match (&stmt.catch, &stmt.finally) {
            (Some((name, body)), None) => {
                self.scope.begin_scope();
                self.declare_local(name)?;
                for stmt in body {
                    self.compile_statement(stmt)?;
                }
                self.pop_scope();
            }
            (Some((name, body)), Some(finally)) => {
                self.scope.begin_scope();
                self.declare_local(name)?;
                let rethrow = self.emit_jump(OpCode::TryBegin);
                self.tries.push(TryContext {
                    finally: Some(finally.clone()),
                    scope_depth: self.scope.depth,
                });
                let handled = self.compile_block(body);
                self.tries.pop();
                handled?;
                self.emit_op(OpCode::TryEnd);
                self.pop_scope();
                let done = self.emit_jump(OpCode::Jump);

                // The catch variable is still on the stack below the new message.
                self.patch_jump(rethrow)?;
                self.scope.begin_scope();
                self.declare_local("(caught)")?;
                self.compile_rethrow(finally)?;
                self.close_dead_scope();
                self.patch_jump(done)?;
            }
            (None, Some(finally)) => {
                self.scope.begin_scope();
                self.compile_rethrow(finally)?;
                self.close_dead_scope();
            }
            (None, None) => self.emit_op(OpCode::Pop),
        }

        self.patch_jump(normal)?;
        if let Some(finally) = &stmt.finally {
            self.compile_block(finally)?;
        }
        Ok(())
    }

    /// Runs `finally` with the pending message parked in a hidden local,
    /// then raises it again.
    fn compile_rethrow(&mut self, finally: &[Statement]) -> Result<()> {
        let error = self.declare_local("(error)")?;
        self.compile_block(finally)?;
        self.emit_with_u16(OpCode::GetLocal, error);
        self.emit_op(OpCode::Raise);
        Ok(())
    }
}
