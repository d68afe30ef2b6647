// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Abstract Syntax Tree (AST) definitions for Momentum.
//!
//! Names are stored lowercased; the parser normalises them.

/// A complete Momentum program.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    /// The top-level statements
    pub body: Vec<Statement>,
}

/// A statement together with the source line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// 1-based source line
    pub line: u32,
    /// What the statement does
    pub kind: StatementKind,
}

impl Statement {
    /// Creates a new statement.
    pub fn new(line: u32, kind: StatementKind) -> Self {
        Self { line, kind }
    }
}

/// The different kinds of statements.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    /// Bare expression, evaluated for its effects
    Expression(Expression),
    /// `let x = e`, `x = e`, `a[i] = e`
    Assign(AssignStatement),
    /// `let x` without an initializer
    Declare(String),
    /// `print a, b`
    Print(Vec<Expression>),
    /// `input x, "prompt"`
    Input(InputStatement),
    /// if / elseif / else
    If(IfStatement),
    /// while ... wend
    While(WhileStatement),
    /// for i = a to b step s ... next
    For(ForStatement),
    /// for each v in e ... next
    ForEach(ForEachStatement),
    /// Function definition
    Function(FunctionDeclaration),
    /// return [e]
    Return(Option<Expression>),
    /// `dim a[3], b[2, 3]`
    Dim(Vec<DimDeclaration>),
    /// `data 1, "two", 3.0`
    Data(Vec<Expression>),
    /// `read a, b[0]`
    Read(Vec<Expression>),
    /// `restore`
    Restore,
    /// `break`
    Break,
    /// `continue`
    Continue,
    /// try / catch / finally
    Try(TryStatement),
    /// switch / case / default
    Switch(SwitchStatement),
    /// `import "path"`
    Import(String),
    /// `spawn f(x)` as a statement; the future is discarded
    Spawn(Expression),
    /// `global a, b` inside a function
    Global(Vec<String>),
    /// `raise e`
    Raise(Expression),
    /// `debug e`
    Debug(DebugStatement),
}

/// An assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignStatement {
    /// A `Variable` or `Index` expression
    pub target: Expression,
    /// The assigned value
    pub value: Expression,
}

/// An input statement.
#[derive(Debug, Clone, PartialEq)]
pub struct InputStatement {
    /// Where the line read is stored
    pub target: Expression,
    /// Optional prompt
    pub prompt: Option<Expression>,
}

/// An if statement with any number of elseif branches.
#[derive(Debug, Clone, PartialEq)]
pub struct IfStatement {
    /// `(condition, body)` pairs tested in order
    pub branches: Vec<(Expression, Vec<Statement>)>,
    /// Runs when no branch matched
    pub else_body: Option<Vec<Statement>>,
}

/// A while loop.
#[derive(Debug, Clone, PartialEq)]
pub struct WhileStatement {
    /// Checked before every iteration
    pub condition: Expression,
    /// The loop body
    pub body: Vec<Statement>,
}

/// A counted for loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ForStatement {
    /// The loop variable
    pub var: String,
    /// Initial value
    pub start: Expression,
    /// Inclusive bound
    pub end: Expression,
    /// Increment; defaults to 1
    pub step: Option<Expression>,
    /// The loop body
    pub body: Vec<Statement>,
}

/// A for-each loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ForEachStatement {
    /// The element variable
    pub var: String,
    /// Array, string or dictionary
    pub iterable: Expression,
    /// The loop body
    pub body: Vec<Statement>,
}

/// A function definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDeclaration {
    /// The function name
    pub name: String,
    /// Parameter names
    pub params: Vec<String>,
    /// The function body
    pub body: Vec<Statement>,
    /// Declared with `async`
    pub is_async: bool,
    /// Declared with `native`
    pub is_native: bool,
}

/// One array in a `dim` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct DimDeclaration {
    /// Variable receiving the array
    pub name: String,
    /// One size per dimension
    pub sizes: Vec<Expression>,
}

/// A try statement.
#[derive(Debug, Clone, PartialEq)]
pub struct TryStatement {
    /// The protected block
    pub body: Vec<Statement>,
    /// Catch variable and handler block
    pub catch: Option<(String, Vec<Statement>)>,
    /// Runs on every exit path
    pub finally: Option<Vec<Statement>>,
}

/// A switch statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchStatement {
    /// Evaluated once
    pub subject: Expression,
    /// Cases in source order
    pub cases: Vec<SwitchCase>,
    /// Runs when no case matched
    pub default: Option<Vec<Statement>>,
}

/// One `case v1, v2` arm.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    /// Values compared with `==`
    pub values: Vec<Expression>,
    /// The case body
    pub body: Vec<Statement>,
}

/// A debug statement.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugStatement {
    /// The inspected expression
    pub expression: Expression,
    /// Its source text, used as the label
    pub source: String,
}

/// A piece of an f-string.
#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    /// Literal text
    Literal(String),
    /// `{expression}`
    Expression(Expression),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// +
    Add,
    /// -
    Sub,
    /// *
    Mul,
    /// /
    Div,
    /// %
    Mod,
    /// ==
    Eq,
    /// != or <>
    Ne,
    /// <
    Lt,
    /// <=
    Le,
    /// >
    Gt,
    /// >=
    Ge,
}

impl BinaryOp {
    /// The operator as written in source.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// -x
    Neg,
    /// not x
    Not,
}

/// Short-circuit operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    /// and
    And,
    /// or
    Or,
}

/// A Momentum expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
    /// String literal
    Str(String),
    /// f-string
    FString(Vec<FStringPart>),
    /// `none`
    None,
    /// Variable reference
    Variable(String),
    /// Arithmetic or comparison
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expression>,
        /// Right operand
        right: Box<Expression>,
    },
    /// Unary operator
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Box<Expression>,
    },
    /// and / or
    Logical {
        /// Operator
        op: LogicalOp,
        /// Left operand
        left: Box<Expression>,
        /// Right operand, evaluated only when needed
        right: Box<Expression>,
    },
    /// Function call
    Call {
        /// Usually a `Variable`
        callee: Box<Expression>,
        /// Arguments
        args: Vec<Expression>,
    },
    /// `a[i]` or `a[i, j]`
    Index {
        /// The indexed value
        object: Box<Expression>,
        /// One key per dimension
        keys: Vec<Expression>,
    },
    /// `[a, b]`
    Array(Vec<Expression>),
    /// `{"k": v}`
    Dict(Vec<(Expression, Expression)>),
    /// `await e`
    Await(Box<Expression>),
    /// `spawn f(x)`
    Spawn(Box<Expression>),
}

impl Expression {
    /// Returns true for number literals, including a negated one.
    pub fn is_numeric_literal(&self) -> bool {
        match self {
            Expression::Int(_) | Expression::Float(_) => true,
            Expression::Unary {
                op: UnaryOp::Neg,
                operand,
            } => matches!(**operand, Expression::Int(_) | Expression::Float(_)),
            _ => false,
        }
    }
}
