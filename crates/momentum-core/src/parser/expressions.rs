// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Expression parsing.
//!
//! ## Operator Precedence (lowest to highest)
//!
//! 1. Logical OR: `or`
//! 2. Logical AND: `and`
//! 3. Logical NOT: `not`
//! 4. Comparison: `==`, `!=`, `<>`, `<`, `<=`, `>`, `>=`
//! 5. Additive: `+`, `-`
//! 6. Multiplicative: `*`, `/`, `%`
//! 7. Unary: `-`, `+`
//! 8. Task prefixes: `await`, `spawn`
//! 9. Postfix: calls `f(x)` and subscripts `a[i, j]`
//! 10. Primary: literals, identifiers, `( )`, `[ ]`, `{ }`
//!
//! All binary operators are left-associative.

use super::Parser;
use crate::ast::*;
use crate::error::Error;
use crate::lexer::{FStringPiece, TokenKind};

impl<'a> Parser<'a> {
    /// Parses an expression.
    pub fn parse_expression(&mut self) -> Result<Expression, Error> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expression, Error> {
        let mut left = self.parse_and()?;
        while self.matches(&TokenKind::Or) {
            let right = self.parse_and()?;
            left = Expression::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expression, Error> {
        let mut left = self.parse_not()?;
        while self.matches(&TokenKind::And) {
            let right = self.parse_not()?;
            left = Expression::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expression, Error> {
        if self.matches(&TokenKind::Not) {
            let operand = self.parse_not()?;
            return Ok(Expression::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expression, Error> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.current.kind {
                TokenKind::EqualEqual => BinaryOp::Eq,
                TokenKind::BangEqual => BinaryOp::Ne,
                TokenKind::Less => BinaryOp::Lt,
                TokenKind::LessEqual => BinaryOp::Le,
                TokenKind::Greater => BinaryOp::Gt,
                TokenKind::GreaterEqual => BinaryOp::Ge,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_additive()?;
            left = binary(op, left, right);
        }
    }

    fn parse_additive(&mut self) -> Result<Expression, Error> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expression, Error> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> Result<Expression, Error> {
        if self.matches(&TokenKind::Minus) {
            if self.matches(&TokenKind::MinIntMagnitude) {
                return Ok(Expression::Int(i64::MIN));
            }
            let operand = self.parse_unary()?;
            return Ok(Expression::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        if self.matches(&TokenKind::Plus) {
            return self.parse_unary();
        }
        self.parse_task_prefix()
    }

    fn parse_task_prefix(&mut self) -> Result<Expression, Error> {
        if self.matches(&TokenKind::Await) {
            let operand = self.parse_task_prefix()?;
            return Ok(Expression::Await(Box::new(operand)));
        }
        if self.matches(&TokenKind::Spawn) {
            let line = self.current.line;
            let call = self.parse_postfix()?;
            if !matches!(call, Expression::Call { .. }) {
                return Err(Error::syntax(line, "spawn requires a function call"));
            }
            return Ok(Expression::Spawn(Box::new(call)));
        }
        self.parse_postfix()
    }

    /// Calls and subscripts, which may chain: `table[1](x)[0]`.
    pub(super) fn parse_postfix(&mut self) -> Result<Expression, Error> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.matches(&TokenKind::LeftParen) {
                let args = if self.check(&TokenKind::RightParen) {
                    Vec::new()
                } else {
                    self.parse_expression_list()?
                };
                self.expect(&TokenKind::RightParen, "')'")?;
                expr = Expression::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else if self.matches(&TokenKind::LeftBracket) {
                let keys = self.parse_expression_list()?;
                self.expect(&TokenKind::RightBracket, "']'")?;
                expr = Expression::Index {
                    object: Box::new(expr),
                    keys,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expression, Error> {
        let expr = match &self.current.kind {
            TokenKind::Int(n) => Expression::Int(*n),
            TokenKind::MinIntMagnitude => {
                return Err(Error::syntax(
                    self.current.line,
                    format!("Integer literal '{}' is too large", i64::MIN.unsigned_abs()),
                ));
            }
            TokenKind::Float(n) => Expression::Float(*n),
            TokenKind::Str(s) => Expression::Str(s.clone()),
            TokenKind::True => Expression::Int(1),
            TokenKind::False => Expression::Int(0),
            TokenKind::NoneLiteral => Expression::None,
            TokenKind::Identifier(name) => Expression::Variable(name.clone()),
            TokenKind::FString(pieces) => {
                let pieces = pieces.clone();
                let line = self.current.line;
                self.advance();
                return self.parse_fstring(pieces, line);
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(&TokenKind::RightParen, "')'")?;
                return Ok(expr);
            }
            TokenKind::LeftBracket => {
                self.advance();
                let items = if self.check(&TokenKind::RightBracket) {
                    Vec::new()
                } else {
                    self.parse_expression_list()?
                };
                self.expect(&TokenKind::RightBracket, "']'")?;
                return Ok(Expression::Array(items));
            }
            TokenKind::LeftBrace => {
                self.advance();
                return self.parse_dict();
            }
            _ => return Err(self.unexpected("an expression")),
        };
        self.advance();
        Ok(expr)
    }

    /// `{key: value, ...}` after the opening brace.
    fn parse_dict(&mut self) -> Result<Expression, Error> {
        let mut entries = Vec::new();
        if !self.check(&TokenKind::RightBrace) {
            loop {
                let key = self.parse_expression()?;
                self.expect(&TokenKind::Colon, "':'")?;
                let value = self.parse_expression()?;
                entries.push((key, value));
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightBrace, "'}'")?;
        Ok(Expression::Dict(entries))
    }

    fn parse_fstring(&mut self, pieces: Vec<FStringPiece>, line: u32) -> Result<Expression, Error> {
        let mut parts = Vec::with_capacity(pieces.len());
        for piece in pieces {
            match piece {
                FStringPiece::Text(text) => parts.push(FStringPart::Literal(text)),
                FStringPiece::Code(code, _) => {
                    if code.trim().is_empty() {
                        return Err(Error::syntax(line, "Empty expression in f-string"));
                    }
                    let mut inner = Parser::with_line(&code, line);
                    let expr = inner.parse_expression()?;
                    if !inner.is_at_end() {
                        return Err(inner.unexpected("'}' in f-string"));
                    }
                    parts.push(FStringPart::Expression(expr));
                }
            }
        }
        Ok(Expression::FString(parts))
    }
}

fn binary(op: BinaryOp, left: Expression, right: Expression) -> Expression {
    Expression::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}
