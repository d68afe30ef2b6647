// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Parser for Momentum source code.
//!
//! Transforms a stream of tokens into an Abstract Syntax Tree (AST).
//!
//! ## Structure
//!
//! - `parser` - Token plumbing and statement parsing
//! - `expressions` - Expression parsing by precedence climbing
//!
//! ## Usage
//!
//! ```rust
//! use momentum_core::parser::Parser;
//!
//! let mut parser = Parser::new("let x = 1 + 2\nprint x");
//! let program = parser.parse_program().expect("Should parse");
//! assert_eq!(program.body.len(), 2);
//! ```

mod expressions;
mod parser;

pub use parser::Parser;
