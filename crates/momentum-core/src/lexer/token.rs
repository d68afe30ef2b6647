// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Token definitions for the Momentum lexer.

/// A span in the source code, representing a range of bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Start byte offset (inclusive)
    pub start: usize,
    /// End byte offset (exclusive)
    pub end: usize,
}

impl Span {
    /// Creates a new span.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Returns the length of this span in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns true if this span is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind of token
    pub kind: TokenKind,
    /// The span in the source code
    pub span: Span,
    /// 1-based line of the token's first character
    pub line: u32,
}

impl Token {
    /// Creates a new token.
    pub fn new(kind: TokenKind, span: Span, line: u32) -> Self {
        Self { kind, span, line }
    }
}

/// A piece of an f-string as scanned.
#[derive(Debug, Clone, PartialEq)]
pub enum FStringPiece {
    /// Literal text with escapes already processed
    Text(String),
    /// Source of an embedded expression and its byte offset in the file
    Code(String, usize),
}

/// The different kinds of tokens in Momentum.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    /// Integer literal
    Int(i64),
    /// The magnitude of `i64::MIN`, only valid right after a unary minus
    MinIntMagnitude,
    /// Float literal
    Float(f64),
    /// String literal
    Str(String),
    /// f-string literal
    FString(Vec<FStringPiece>),

    /// Identifier, lowercased
    Identifier(String),

    // Keywords
    Let,
    Print,
    Input,
    If,
    Then,
    Else,
    ElseIf,
    EndIf,
    While,
    Wend,
    For,
    Each,
    In,
    To,
    Step,
    Next,
    Function,
    EndFunction,
    Return,
    Async,
    Native,
    Dim,
    Data,
    Read,
    Restore,
    Break,
    Continue,
    Try,
    Catch,
    Finally,
    EndTry,
    Switch,
    Case,
    Default,
    EndSwitch,
    Import,
    Spawn,
    Await,
    Global,
    Raise,
    Debug,
    And,
    Or,
    Not,
    True,
    False,
    NoneLiteral,
    /// A bare `end` not followed by a block keyword
    End,

    // Punctuation
    /// (
    LeftParen,
    /// )
    RightParen,
    /// [
    LeftBracket,
    /// ]
    RightBracket,
    /// {
    LeftBrace,
    /// }
    RightBrace,
    /// ,
    Comma,
    /// :
    Colon,

    // Operators
    /// +
    Plus,
    /// -
    Minus,
    /// *
    Star,
    /// /
    Slash,
    /// %
    Percent,
    /// =
    Assign,
    /// ==
    EqualEqual,
    /// != or <>
    BangEqual,
    /// <
    Less,
    /// <=
    LessEqual,
    /// >
    Greater,
    /// >=
    GreaterEqual,

    // Special
    /// Statement terminator (newline or `;`)
    Newline,
    /// End of file
    Eof,
    /// Malformed input, with a description
    Error(String),
}

impl TokenKind {
    /// Looks up a keyword. `name` must already be lowercased.
    pub fn keyword(name: &str) -> Option<TokenKind> {
        let kind = match name {
            "let" => TokenKind::Let,
            "print" => TokenKind::Print,
            "input" => TokenKind::Input,
            "if" => TokenKind::If,
            "then" => TokenKind::Then,
            "else" => TokenKind::Else,
            "elseif" => TokenKind::ElseIf,
            "endif" => TokenKind::EndIf,
            "while" => TokenKind::While,
            "wend" => TokenKind::Wend,
            "for" => TokenKind::For,
            "each" => TokenKind::Each,
            "in" => TokenKind::In,
            "to" => TokenKind::To,
            "step" => TokenKind::Step,
            "next" => TokenKind::Next,
            "function" => TokenKind::Function,
            "endfunction" => TokenKind::EndFunction,
            "return" => TokenKind::Return,
            "async" => TokenKind::Async,
            "native" => TokenKind::Native,
            "dim" => TokenKind::Dim,
            "data" => TokenKind::Data,
            "read" => TokenKind::Read,
            "restore" => TokenKind::Restore,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "try" => TokenKind::Try,
            "catch" => TokenKind::Catch,
            "finally" => TokenKind::Finally,
            "endtry" => TokenKind::EndTry,
            "switch" => TokenKind::Switch,
            "case" => TokenKind::Case,
            "default" => TokenKind::Default,
            "endswitch" => TokenKind::EndSwitch,
            "import" => TokenKind::Import,
            "spawn" => TokenKind::Spawn,
            "await" => TokenKind::Await,
            "global" => TokenKind::Global,
            "raise" => TokenKind::Raise,
            "debug" => TokenKind::Debug,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "none" => TokenKind::NoneLiteral,
            "end" => TokenKind::End,
            _ => return None,
        };
        Some(kind)
    }

    /// Block keyword produced by `end <word>`.
    pub fn end_of(word: &str) -> Option<TokenKind> {
        match word {
            "if" => Some(TokenKind::EndIf),
            "function" => Some(TokenKind::EndFunction),
            "while" => Some(TokenKind::Wend),
            "switch" => Some(TokenKind::EndSwitch),
            "try" => Some(TokenKind::EndTry),
            _ => None,
        }
    }

    /// Short description used in parser errors.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Int(n) => format!("number {}", n),
            TokenKind::MinIntMagnitude => format!("number {}", i64::MIN.unsigned_abs()),
            TokenKind::Float(n) => format!("number {}", n),
            TokenKind::Str(_) | TokenKind::FString(_) => "string".to_string(),
            TokenKind::Identifier(name) => format!("'{}'", name),
            TokenKind::Newline => "end of line".to_string(),
            TokenKind::Eof => "end of file".to_string(),
            TokenKind::Error(msg) => msg.clone(),
            other => format!("{:?}", other).to_lowercase(),
        }
    }
}
