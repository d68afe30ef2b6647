// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the Momentum runtime.

use std::fmt;

use thiserror::Error;

/// Result type for Momentum operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the engine to its embedder.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Lexer or parser failure
    #[error("Syntax error (line {line}): {message}")]
    Syntax {
        /// Source line of the offending token
        line: u32,
        /// Description of the problem
        message: String,
    },

    /// Compiler failure (scoping, data literals, limits)
    #[error("Compile error (line {line}): {message}")]
    Compile {
        /// Source line of the offending statement
        line: u32,
        /// Description of the problem
        message: String,
    },

    /// Uncaught runtime error
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Explicit `exit(code)` request; never visible to `try`
    #[error("Program exited with code {0}")]
    Exit(i32),

    /// File system error
    #[error("IO error: {0}")]
    Io(String),
}

impl Error {
    /// Create a syntax error
    pub fn syntax(line: u32, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            message: message.into(),
        }
    }

    /// Create a compile error
    pub fn compile(line: u32, message: impl Into<String>) -> Self {
        Self::Compile {
            line,
            message: message.into(),
        }
    }

    /// Returns the runtime error payload, if this is one.
    pub fn as_runtime(&self) -> Option<&RuntimeError> {
        match self {
            Error::Runtime(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

/// One entry of a runtime call-stack trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    /// Function name (`<main>` for top-level code)
    pub function: String,
    /// Line being executed in that function
    pub line: u32,
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {} (line {})", self.function, self.line)
    }
}

/// A runtime error that escaped every active `try`.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    /// The error message, as a `catch` clause would have seen it
    pub message: String,
    /// Line where the error was raised
    pub line: Option<u32>,
    /// Active frames, innermost first
    pub trace: Vec<TraceEntry>,
}

impl RuntimeError {
    /// Creates an error with no location attached yet.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            trace: Vec::new(),
        }
    }

    /// Renders the trace, one frame per line.
    pub fn render_trace(&self) -> String {
        self.trace
            .iter()
            .map(|entry| format!("  {entry}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "Runtime error (line {line}): {}", self.message),
            None => write!(f, "Runtime error: {}", self.message),
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Failure reported by a builtin.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NativeError {
    /// Ordinary, catchable failure
    #[error("{0}")]
    Message(String),

    /// Process exit request
    #[error("exit({0})")]
    Exit(i32),
}

impl NativeError {
    /// Create a catchable failure
    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }
}

impl From<String> for NativeError {
    fn from(msg: String) -> Self {
        Self::Message(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_error_display() {
        let mut err = RuntimeError::new("Division by zero");
        assert_eq!(err.to_string(), "Runtime error: Division by zero");
        err.line = Some(4);
        assert_eq!(err.to_string(), "Runtime error (line 4): Division by zero");
    }

    #[test]
    fn test_render_trace() {
        let err = RuntimeError {
            message: "boom".into(),
            line: Some(2),
            trace: vec![
                TraceEntry {
                    function: "inner".into(),
                    line: 2,
                },
                TraceEntry {
                    function: "<main>".into(),
                    line: 7,
                },
            ],
        };
        assert_eq!(
            err.render_trace(),
            "  at inner (line 2)\n  at <main> (line 7)"
        );
    }

    #[test]
    fn test_error_wraps_runtime() {
        let err: Error = RuntimeError::new("x").into();
        assert!(err.as_runtime().is_some());
        assert!(Error::Exit(3).as_runtime().is_none());
        assert_eq!(
            Error::syntax(1, "Unexpected token").to_string(),
            "Syntax error (line 1): Unexpected token"
        );
    }
}
