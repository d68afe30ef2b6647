// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Expression compilation. Each expression pushes exactly one value.

use super::Compiler;
use crate::ast::*;
use crate::compiler::bytecode::OpCode;
use crate::error::Result;
use crate::runtime::Value;
use crate::vm::arithmetic;

impl Compiler {
    pub(super) fn compile_expression(&mut self, expr: &Expression) -> Result<()> {
        if let Some(value) = fold(expr) {
            return self.emit_constant(value);
        }

        match expr {
            Expression::Int(n) => self.emit_constant(Value::Int(*n)),
            Expression::Float(n) => self.emit_constant(Value::Float(*n)),
            Expression::Str(s) => self.emit_constant(Value::str(s)),
            Expression::None => {
                self.emit_op(OpCode::None);
                Ok(())
            }
            Expression::FString(parts) => self.compile_fstring(parts),
            Expression::Variable(name) => self.compile_variable(name),
            Expression::Binary { op, left, right } => {
                self.compile_expression(left)?;
                self.compile_expression(right)?;
                self.emit_op(binary_opcode(*op));
                Ok(())
            }
            Expression::Unary { op, operand } => {
                self.compile_expression(operand)?;
                self.emit_op(match op {
                    UnaryOp::Neg => OpCode::Neg,
                    UnaryOp::Not => OpCode::Not,
                });
                Ok(())
            }
            Expression::Logical { op, left, right } => self.compile_logical(*op, left, right),
            Expression::Call { callee, args } => self.compile_call(callee, args, false),
            Expression::Index { object, keys } => {
                self.compile_expression(object)?;
                self.compile_keys(keys)?;
                self.emit_op(OpCode::GetIndex);
                Ok(())
            }
            Expression::Array(items) => {
                let count = u16::try_from(items.len()).map_err(|_| self.error("Array literal too large"))?;
                for item in items {
                    self.compile_expression(item)?;
                }
                self.emit_with_u16(OpCode::BuildArray, count);
                Ok(())
            }
            Expression::Dict(entries) => {
                let count =
                    u16::try_from(entries.len()).map_err(|_| self.error("Dictionary literal too large"))?;
                for (key, value) in entries {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit_with_u16(OpCode::BuildDict, count);
                Ok(())
            }
            Expression::Await(inner) => {
                // `await f(x)` spawns the call so async functions are reachable.
                match inner.as_ref() {
                    Expression::Call { callee, args } => self.compile_call(callee, args, true)?,
                    other => self.compile_expression(other)?,
                }
                self.emit_op(OpCode::Await);
                Ok(())
            }
            Expression::Spawn(call) => self.compile_spawn(call),
        }
    }

    fn compile_variable(&mut self, name: &str) -> Result<()> {
        match self.local_slot(name) {
            Some(slot) => self.emit_with_u16(OpCode::GetLocal, slot),
            None => {
                let name = self.name_constant(name)?;
                self.emit_with_u16(OpCode::GetGlobal, name);
            }
        }
        Ok(())
    }

    fn compile_fstring(&mut self, parts: &[FStringPart]) -> Result<()> {
        if parts.is_empty() {
            return self.emit_constant(Value::str(""));
        }
        let count = u16::try_from(parts.len()).map_err(|_| self.error("f-string too long"))?;
        for part in parts {
            match part {
                FStringPart::Literal(text) => self.emit_constant(Value::str(text))?,
                FStringPart::Expression(expr) => self.compile_expression(expr)?,
            }
        }
        self.emit_with_u16(OpCode::BuildString, count);
        Ok(())
    }

    /// `and`/`or` short-circuit and always yield 0 or 1.
    fn compile_logical(&mut self, op: LogicalOp, left: &Expression, right: &Expression) -> Result<()> {
        self.compile_expression(left)?;
        let short = self.emit_jump(OpCode::JumpIfFalse);
        match op {
            LogicalOp::And => {
                self.compile_expression(right)?;
                self.emit_op(OpCode::ToBool);
                let end = self.emit_jump(OpCode::Jump);
                self.patch_jump(short)?;
                self.emit_constant(Value::Int(0))?;
                self.patch_jump(end)
            }
            LogicalOp::Or => {
                self.emit_constant(Value::Int(1))?;
                let end = self.emit_jump(OpCode::Jump);
                self.patch_jump(short)?;
                self.compile_expression(right)?;
                self.emit_op(OpCode::ToBool);
                self.patch_jump(end)
            }
        }
    }

    /// Calls through a name the compiler cannot see as a local are resolved
    /// at runtime, which is where a global array or dictionary turns a call
    /// into a subscript.
    fn compile_call(&mut self, callee: &Expression, args: &[Expression], spawn: bool) -> Result<()> {
        let argc = self.count_operand(args.len(), "arguments in call")?;

        match callee {
            Expression::Variable(name) if !self.is_local(name) => {
                let name = self.name_constant(name)?;
                for arg in args {
                    self.compile_expression(arg)?;
                }
                self.emit_with_u16(if spawn { OpCode::SpawnNamed } else { OpCode::CallNamed }, name);
                self.emit_byte(argc);
            }
            _ => {
                self.compile_expression(callee)?;
                for arg in args {
                    self.compile_expression(arg)?;
                }
                self.emit_with_u8(if spawn { OpCode::Spawn } else { OpCode::Call }, argc);
            }
        }
        Ok(())
    }

    pub(super) fn compile_spawn(&mut self, call: &Expression) -> Result<()> {
        match call {
            Expression::Call { callee, args } => self.compile_call(callee, args, true),
            _ => Err(self.error("spawn requires a function call")),
        }
    }

    /// One key is pushed as is; several are packed into a tuple.
    pub(super) fn compile_keys(&mut self, keys: &[Expression]) -> Result<()> {
        for key in keys {
            self.compile_expression(key)?;
        }
        if keys.len() != 1 {
            let count = self.count_operand(keys.len(), "subscript keys")?;
            self.emit_with_u8(OpCode::BuildTuple, count);
        }
        Ok(())
    }
}

fn binary_opcode(op: BinaryOp) -> OpCode {
    match op {
        BinaryOp::Add => OpCode::Add,
        BinaryOp::Sub => OpCode::Sub,
        BinaryOp::Mul => OpCode::Mul,
        BinaryOp::Div => OpCode::Div,
        BinaryOp::Mod => OpCode::Mod,
        BinaryOp::Eq => OpCode::Eq,
        BinaryOp::Ne => OpCode::Ne,
        BinaryOp::Lt => OpCode::Lt,
        BinaryOp::Le => OpCode::Le,
        BinaryOp::Gt => OpCode::Gt,
        BinaryOp::Ge => OpCode::Ge,
    }
}

/// Folds numeric literal arithmetic with the VM's own operators. Anything
/// that would fail at runtime is left for the runtime to report.
fn fold(expr: &Expression) -> Option<Value> {
    match expr {
        Expression::Int(n) => Some(Value::Int(*n)),
        Expression::Float(n) => Some(Value::Float(*n)),
        Expression::Unary {
            op: UnaryOp::Neg,
            operand,
        } => arithmetic::negate(&fold(operand)?).ok(),
        Expression::Binary { op, left, right } => {
            let left = fold(left)?;
            let right = fold(right)?;
            if matches!(op, BinaryOp::Div | BinaryOp::Mod) && right.as_f64() == Some(0.0) {
                return None;
            }
            arithmetic::binary(*op, &left, &right).ok()
        }
        _ => None,
    }
}
