// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bytecode definitions.
//!
//! A [`Chunk`] is a flat byte stream: one opcode byte followed by its
//! operands. Two-byte operands are big-endian.

use std::fmt::Write;

use crate::runtime::value::Value;

/// A compiled bytecode chunk.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    /// The encoded instructions
    pub code: Vec<u8>,
    /// The constant pool
    pub constants: Vec<Value>,
    /// Run-length encoded `(line, byte count)` pairs
    lines: Vec<(u32, u32)>,
}

impl Chunk {
    /// Creates a new empty chunk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of encoded bytes.
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Returns true if nothing has been emitted.
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Appends one byte attributed to `line`.
    pub fn write(&mut self, byte: u8, line: u32) {
        self.code.push(byte);
        match self.lines.last_mut() {
            Some((last, count)) if *last == line => *count += 1,
            _ => self.lines.push((line, 1)),
        }
    }

    /// Appends an opcode.
    pub fn write_op(&mut self, op: OpCode, line: u32) {
        self.write(op as u8, line);
    }

    /// Appends a big-endian u16 operand.
    pub fn write_u16(&mut self, value: u16, line: u32) {
        let [hi, lo] = value.to_be_bytes();
        self.write(hi, line);
        self.write(lo, line);
    }

    /// Overwrites the u16 operand at `offset`.
    pub fn patch_u16(&mut self, offset: usize, value: u16) {
        let [hi, lo] = value.to_be_bytes();
        self.code[offset] = hi;
        self.code[offset + 1] = lo;
    }

    /// Reads the u16 operand at `offset`.
    pub fn read_u16(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.code[offset], self.code[offset + 1]])
    }

    /// Adds a constant and returns its index, reusing an equal scalar
    /// constant when one exists. `None` when the pool is full.
    pub fn add_constant(&mut self, value: Value) -> Option<u16> {
        let existing = self.constants.iter().position(|c| same_constant(c, &value));
        let index = match existing {
            Some(index) => index,
            None => {
                self.constants.push(value);
                self.constants.len() - 1
            }
        };
        u16::try_from(index).ok()
    }

    /// Source line of the byte at `offset`.
    pub fn line_at(&self, offset: usize) -> u32 {
        let mut end = 0usize;
        for &(line, count) in &self.lines {
            end += count as usize;
            if offset < end {
                return line;
            }
        }
        self.lines.last().map_or(0, |&(line, _)| line)
    }

    /// Renders a human-readable listing of this chunk and, recursively, of
    /// every function in its constant pool.
    pub fn disassemble(&self, name: &str) -> String {
        let mut out = String::new();
        self.disassemble_into(name, &mut out);
        out
    }

    fn disassemble_into(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "== {} ==", name);
        let mut offset = 0;
        let mut last_line = None;
        while offset < self.code.len() {
            let line = self.line_at(offset);
            let line_col = if last_line == Some(line) {
                "   |".to_string()
            } else {
                format!("{:4}", line)
            };
            last_line = Some(line);

            let Some(op) = OpCode::from_byte(self.code[offset]) else {
                let _ = writeln!(out, "{:04} {} <bad opcode {}>", offset, line_col, self.code[offset]);
                offset += 1;
                continue;
            };
            let text = self.describe(op, offset);
            let _ = writeln!(out, "{:04} {} {}", offset, line_col, text);
            offset += 1 + op.operand_width();
        }

        for constant in &self.constants {
            if let Value::Function(func) = constant {
                out.push('\n');
                func.chunk.disassemble_into(&func.name, out);
            }
        }
    }

    fn describe(&self, op: OpCode, offset: usize) -> String {
        let at = offset + 1;
        let constant = |index: u16| {
            self.constants
                .get(index as usize)
                .map_or_else(|| "?".to_string(), Value::repr)
        };
        match op.operand_width() {
            0 => format!("{:?}", op),
            1 => format!("{:<14} {}", format!("{:?}", op), self.code[at]),
            3 => {
                let index = self.read_u16(at);
                format!(
                    "{:<14} {} {} ({} args)",
                    format!("{:?}", op),
                    index,
                    constant(index),
                    self.code[at + 2]
                )
            }
            _ => {
                let operand = self.read_u16(at);
                match op {
                    OpCode::Jump | OpCode::JumpIfFalse | OpCode::JumpIfTrue | OpCode::TryBegin => {
                        format!("{:<14} {} -> {}", format!("{:?}", op), operand, at + 2 + operand as usize)
                    }
                    OpCode::Loop => format!(
                        "{:<14} {} -> {}",
                        format!("{:?}", op),
                        operand,
                        (at + 2).saturating_sub(operand as usize)
                    ),
                    OpCode::Constant
                    | OpCode::GetGlobal
                    | OpCode::SetGlobal
                    | OpCode::Debug
                    | OpCode::Import => {
                        format!("{:<14} {} {}", format!("{:?}", op), operand, constant(operand))
                    }
                    _ => format!("{:<14} {}", format!("{:?}", op), operand),
                }
            }
        }
    }
}

/// Constant-pool deduplication: only scalars are shared. Floats compare by
/// bit pattern so `0.0` and `-0.0` stay distinct.
fn same_constant(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
        (Value::Str(x), Value::Str(y)) => x == y,
        _ => false,
    }
}

macro_rules! opcodes {
    ($($(#[$doc:meta])* $name:ident = $width:expr,)*) => {
        /// Operation codes for the VM.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[repr(u8)]
        pub enum OpCode {
            $($(#[$doc])* $name,)*
        }

        impl OpCode {
            const ALL: &'static [OpCode] = &[$(OpCode::$name,)*];

            /// Decodes an opcode byte.
            pub fn from_byte(byte: u8) -> Option<Self> {
                Self::ALL.get(byte as usize).copied()
            }

            /// Number of operand bytes following the opcode.
            pub fn operand_width(self) -> usize {
                match self {
                    $(OpCode::$name => $width,)*
                }
            }
        }
    };
}

opcodes! {
    // Stack operations
    /// Push a constant (u16 index)
    Constant = 2,
    /// Push None
    None = 0,
    /// Pop the top value
    Pop = 0,
    /// Duplicate the top value
    Dup = 0,

    // Variables
    /// Push a frame-relative local (u16 slot)
    GetLocal = 2,
    /// Store the top into a local, keeping it on the stack (u16 slot)
    SetLocal = 2,
    /// Push a global (u16 name constant)
    GetGlobal = 2,
    /// Store the top into a global, keeping it on the stack (u16 name constant)
    SetGlobal = 2,

    // Arithmetic and logic
    /// Add, or concatenate strings/arrays
    Add = 0,
    /// Subtract
    Sub = 0,
    /// Multiply
    Mul = 0,
    /// Divide (always yields a float)
    Div = 0,
    /// Floor modulo
    Mod = 0,
    /// Negate
    Neg = 0,
    /// Logical not, yields 0/1
    Not = 0,
    /// Normalise the top to 0/1
    ToBool = 0,
    /// Equal
    Eq = 0,
    /// Not equal
    Ne = 0,
    /// Less than
    Lt = 0,
    /// Less than or equal
    Le = 0,
    /// Greater than
    Gt = 0,
    /// Greater than or equal
    Ge = 0,

    // Control flow
    /// Unconditional forward jump (u16)
    Jump = 2,
    /// Pop, jump forward if falsy (u16)
    JumpIfFalse = 2,
    /// Pop, jump forward if truthy (u16)
    JumpIfTrue = 2,
    /// Backward jump (u16)
    Loop = 2,

    // Functions
    /// Call the value beneath the arguments (u8 argc)
    Call = 1,
    /// Call by name, resolved at runtime (u16 name constant, u8 argc)
    CallNamed = 3,
    /// Return from the current frame
    Return = 0,

    // Data construction
    /// Build an array from the top n values (u16)
    BuildArray = 2,
    /// Build a dictionary from the top n key/value pairs (u16)
    BuildDict = 2,
    /// Build a tuple key from the top n values (u8)
    BuildTuple = 1,
    /// Concatenate the display forms of the top n values (u16)
    BuildString = 2,
    /// Allocate a nested array from n dimension sizes (u8)
    NewArray = 1,

    // Subscripts and iteration
    /// container, key -> element
    GetIndex = 0,
    /// container, key, value -> value
    SetIndex = 0,
    /// Length of an array, string or dictionary
    Len = 0,
    /// collection, index -> element (dictionary key for dictionaries)
    IterValue = 0,

    // Sequential data
    /// Push the next data-pool value
    ReadData = 0,
    /// Reset the data-pool cursor
    RestoreData = 0,

    // I/O
    /// Print the top n values separated by spaces (u8)
    Print = 1,
    /// Print `label = value` and pop the value (u16 label constant)
    Debug = 2,
    /// Read a line, optionally popping a prompt first (u8 flag)
    Input = 1,

    // Tasks
    /// Spawn the callable beneath the arguments (u8 argc)
    Spawn = 1,
    /// Spawn by name (u16 name constant, u8 argc)
    SpawnNamed = 3,
    /// Await a future, an array of futures, or pass a value through
    Await = 0,
    /// Start loading a module; pushes a future of its globals (u16 path constant)
    Import = 2,
    /// Pop a dictionary and copy its entries into the globals
    MergeGlobals = 0,

    // Exceptions
    /// Enter a try region whose handler is a forward offset (u16)
    TryBegin = 2,
    /// Leave the innermost try region
    TryEnd = 0,
    /// Pop a value and raise it as an error
    Raise = 0,
}
