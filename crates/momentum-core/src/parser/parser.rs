// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The main parser implementation: token plumbing and statements.

use crate::ast::*;
use crate::error::Error;
use crate::lexer::{Scanner, Span, Token, TokenKind};

/// A recursive descent parser for Momentum.
pub struct Parser<'a> {
    pub(super) source: &'a str,
    scanner: Scanner<'a>,
    pub(super) current: Token,
    pub(super) previous: Token,
}

impl<'a> Parser<'a> {
    /// Creates a new parser for the given source code.
    pub fn new(source: &'a str) -> Self {
        Self::with_line(source, 1)
    }

    /// Creates a parser whose first line is numbered `line`.
    pub fn with_line(source: &'a str, line: u32) -> Self {
        let mut scanner = Scanner::with_line(source, line);
        let current = scanner.next_token();
        Self {
            source,
            scanner,
            current,
            previous: Token::new(TokenKind::Eof, Span::new(0, 0), line),
        }
    }

    /// Parses the source code into a Program AST node.
    pub fn parse_program(&mut self) -> Result<Program, Error> {
        let body = self.parse_block(&[])?;
        if !self.is_at_end() {
            return Err(self.unexpected("a statement"));
        }
        Ok(Program { body })
    }

    /// Parses statements until one of `terminators` (or end of file) is
    /// the next token. The terminator is not consumed.
    pub(super) fn parse_block(&mut self, terminators: &[TokenKind]) -> Result<Vec<Statement>, Error> {
        let mut body = Vec::new();
        loop {
            self.skip_separators();
            if self.is_at_end() || terminators.iter().any(|t| self.check(t)) {
                return Ok(body);
            }
            body.push(self.parse_statement()?);
            self.expect_terminator()?;
        }
    }

    /// Parses a single statement.
    pub fn parse_statement(&mut self) -> Result<Statement, Error> {
        let line = self.current.line;
        let kind = match &self.current.kind {
            TokenKind::Let => self.parse_let()?,
            TokenKind::Print => self.parse_print()?,
            TokenKind::Input => self.parse_input()?,
            TokenKind::If => self.parse_if()?,
            TokenKind::While => self.parse_while()?,
            TokenKind::For => self.parse_for()?,
            TokenKind::Function | TokenKind::Async | TokenKind::Native => self.parse_function()?,
            TokenKind::Return => {
                self.advance();
                if self.at_terminator() {
                    StatementKind::Return(None)
                } else {
                    StatementKind::Return(Some(self.parse_expression()?))
                }
            }
            TokenKind::Dim => self.parse_dim()?,
            TokenKind::Data => {
                self.advance();
                StatementKind::Data(self.parse_expression_list()?)
            }
            TokenKind::Read => {
                self.advance();
                let mut targets = Vec::new();
                loop {
                    targets.push(self.parse_target()?);
                    if !self.matches(&TokenKind::Comma) {
                        break;
                    }
                }
                StatementKind::Read(targets)
            }
            TokenKind::Restore => {
                self.advance();
                StatementKind::Restore
            }
            TokenKind::Break => {
                self.advance();
                StatementKind::Break
            }
            TokenKind::Continue => {
                self.advance();
                StatementKind::Continue
            }
            TokenKind::Try => self.parse_try()?,
            TokenKind::Switch => self.parse_switch()?,
            TokenKind::Import => {
                self.advance();
                match &self.current.kind {
                    TokenKind::Str(path) => {
                        let path = path.clone();
                        self.advance();
                        StatementKind::Import(path)
                    }
                    _ => return Err(self.unexpected("a module path string")),
                }
            }
            TokenKind::Spawn => match self.parse_expression()? {
                Expression::Spawn(call) => StatementKind::Spawn(*call),
                other => StatementKind::Expression(other),
            },
            TokenKind::Global => {
                self.advance();
                let mut names = vec![self.expect_identifier()?];
                while self.matches(&TokenKind::Comma) {
                    names.push(self.expect_identifier()?);
                }
                StatementKind::Global(names)
            }
            TokenKind::Raise => {
                self.advance();
                StatementKind::Raise(self.parse_expression()?)
            }
            TokenKind::Debug => {
                self.advance();
                let start = self.current.span.start;
                let expression = self.parse_expression()?;
                let source = self.source[start..self.previous.span.end].trim().to_string();
                StatementKind::Debug(DebugStatement { expression, source })
            }
            _ => self.parse_expression_statement()?,
        };
        Ok(Statement::new(line, kind))
    }

    /// `let target = value` or `let name`.
    fn parse_let(&mut self) -> Result<StatementKind, Error> {
        self.advance(); // consume 'let'
        let target = self.parse_target()?;
        if self.matches(&TokenKind::Assign) {
            let value = self.parse_expression()?;
            return Ok(StatementKind::Assign(AssignStatement { target, value }));
        }
        match target {
            Expression::Variable(name) => Ok(StatementKind::Declare(name)),
            _ => Err(self.unexpected("'='")),
        }
    }

    /// An expression, or an assignment when followed by `=`.
    fn parse_expression_statement(&mut self) -> Result<StatementKind, Error> {
        let expression = self.parse_expression()?;
        if self.check(&TokenKind::Assign) {
            if !matches!(expression, Expression::Variable(_) | Expression::Index { .. }) {
                return Err(Error::syntax(self.current.line, "Invalid assignment target"));
            }
            self.advance();
            let value = self.parse_expression()?;
            return Ok(StatementKind::Assign(AssignStatement {
                target: expression,
                value,
            }));
        }
        Ok(StatementKind::Expression(expression))
    }

    fn parse_print(&mut self) -> Result<StatementKind, Error> {
        self.advance(); // consume 'print'
        if self.at_terminator() {
            return Ok(StatementKind::Print(Vec::new()));
        }
        Ok(StatementKind::Print(self.parse_expression_list()?))
    }

    fn parse_input(&mut self) -> Result<StatementKind, Error> {
        self.advance(); // consume 'input'
        let target = self.parse_target()?;
        let prompt = if self.matches(&TokenKind::Comma) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        Ok(StatementKind::Input(InputStatement { target, prompt }))
    }

    fn parse_if(&mut self) -> Result<StatementKind, Error> {
        self.advance(); // consume 'if'
        let mut branches = Vec::new();
        let mut else_body = None;

        let condition = self.parse_expression()?;
        self.matches(&TokenKind::Then);

        // Single-line form: `if c then statement`
        if !self.at_terminator() {
            let statement = self.parse_statement()?;
            branches.push((condition, vec![statement]));
            if self.matches(&TokenKind::Else) {
                else_body = Some(vec![self.parse_statement()?]);
            }
            return Ok(StatementKind::If(IfStatement { branches, else_body }));
        }

        let body = self.parse_block(&[TokenKind::ElseIf, TokenKind::Else, TokenKind::EndIf])?;
        branches.push((condition, body));

        loop {
            if self.matches(&TokenKind::ElseIf) || self.else_if() {
                let condition = self.parse_expression()?;
                self.matches(&TokenKind::Then);
                let body = self.parse_block(&[TokenKind::ElseIf, TokenKind::Else, TokenKind::EndIf])?;
                branches.push((condition, body));
            } else if self.matches(&TokenKind::Else) {
                else_body = Some(self.parse_block(&[TokenKind::EndIf])?);
                self.expect(&TokenKind::EndIf, "'end if'")?;
                break;
            } else {
                self.expect(&TokenKind::EndIf, "'end if'")?;
                break;
            }
        }

        Ok(StatementKind::If(IfStatement { branches, else_body }))
    }

    /// Consumes `else if` written as two words.
    fn else_if(&mut self) -> bool {
        if self.check(&TokenKind::Else) && self.peek_is(&TokenKind::If) {
            self.advance();
            self.advance();
            true
        } else {
            false
        }
    }

    fn parse_while(&mut self) -> Result<StatementKind, Error> {
        self.advance(); // consume 'while'
        let condition = self.parse_expression()?;
        let body = self.parse_block(&[TokenKind::Wend])?;
        self.expect(&TokenKind::Wend, "'wend'")?;
        Ok(StatementKind::While(WhileStatement { condition, body }))
    }

    fn parse_for(&mut self) -> Result<StatementKind, Error> {
        self.advance(); // consume 'for'

        if self.matches(&TokenKind::Each) {
            let var = self.expect_identifier()?;
            self.expect(&TokenKind::In, "'in'")?;
            let iterable = self.parse_expression()?;
            let body = self.parse_block(&[TokenKind::Next])?;
            self.parse_next(&var)?;
            return Ok(StatementKind::ForEach(ForEachStatement { var, iterable, body }));
        }

        let var = self.expect_identifier()?;
        self.expect(&TokenKind::Assign, "'='")?;
        let start = self.parse_expression()?;
        self.expect(&TokenKind::To, "'to'")?;
        let end = self.parse_expression()?;
        let step = if self.matches(&TokenKind::Step) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        let body = self.parse_block(&[TokenKind::Next])?;
        self.parse_next(&var)?;
        Ok(StatementKind::For(ForStatement {
            var,
            start,
            end,
            step,
            body,
        }))
    }

    /// `next` with an optional variable that must match the loop's.
    fn parse_next(&mut self, var: &str) -> Result<(), Error> {
        self.expect(&TokenKind::Next, "'next'")?;
        if let TokenKind::Identifier(name) = &self.current.kind {
            if name != var {
                return Err(Error::syntax(
                    self.current.line,
                    format!(
                        "Mismatched FOR/NEXT variable. Expected '{}', found '{}'",
                        var, name
                    ),
                ));
            }
            self.advance();
        }
        Ok(())
    }

    fn parse_function(&mut self) -> Result<StatementKind, Error> {
        let mut is_async = false;
        let mut is_native = false;
        loop {
            if self.matches(&TokenKind::Async) {
                is_async = true;
            } else if self.matches(&TokenKind::Native) {
                is_native = true;
            } else {
                break;
            }
        }
        self.expect(&TokenKind::Function, "'function'")?;

        let name = self.expect_identifier()?;
        self.expect(&TokenKind::LeftParen, "'('")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                params.push(self.expect_identifier()?);
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightParen, "')'")?;

        let body = self.parse_block(&[TokenKind::EndFunction])?;
        self.expect(&TokenKind::EndFunction, "'end function'")?;

        Ok(StatementKind::Function(FunctionDeclaration {
            name,
            params,
            body,
            is_async,
            is_native,
        }))
    }

    fn parse_dim(&mut self) -> Result<StatementKind, Error> {
        self.advance(); // consume 'dim'
        let mut arrays = Vec::new();
        loop {
            let name = self.expect_identifier()?;
            let close = if self.matches(&TokenKind::LeftBracket) {
                TokenKind::RightBracket
            } else {
                self.expect(&TokenKind::LeftParen, "'[' or '('")?;
                TokenKind::RightParen
            };
            let sizes = self.parse_expression_list()?;
            self.expect(&close, "closing bracket")?;
            arrays.push(DimDeclaration { name, sizes });
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        Ok(StatementKind::Dim(arrays))
    }

    fn parse_try(&mut self) -> Result<StatementKind, Error> {
        self.advance(); // consume 'try'
        let body = self.parse_block(&[TokenKind::Catch, TokenKind::Finally, TokenKind::EndTry])?;

        let catch = if self.matches(&TokenKind::Catch) {
            let var = self.expect_identifier()?;
            let handler = self.parse_block(&[TokenKind::Finally, TokenKind::EndTry])?;
            Some((var, handler))
        } else {
            None
        };

        let finally = if self.matches(&TokenKind::Finally) {
            Some(self.parse_block(&[TokenKind::EndTry])?)
        } else {
            None
        };

        if catch.is_none() && finally.is_none() {
            return Err(self.unexpected("'catch' or 'finally'"));
        }
        self.expect(&TokenKind::EndTry, "'end try'")?;

        Ok(StatementKind::Try(TryStatement { body, catch, finally }))
    }

    fn parse_switch(&mut self) -> Result<StatementKind, Error> {
        self.advance(); // consume 'switch'
        let subject = self.parse_expression()?;
        let mut cases = Vec::new();
        let mut default = None;
        let arm_end = [TokenKind::Case, TokenKind::Default, TokenKind::EndSwitch];

        loop {
            self.skip_separators();
            if self.matches(&TokenKind::Case) {
                let values = self.parse_expression_list()?;
                let body = self.parse_block(&arm_end)?;
                cases.push(SwitchCase { values, body });
            } else if self.matches(&TokenKind::Default) {
                if default.is_some() {
                    return Err(Error::syntax(self.previous.line, "Duplicate 'default' in switch"));
                }
                default = Some(self.parse_block(&arm_end)?);
            } else {
                self.expect(&TokenKind::EndSwitch, "'case', 'default' or 'end switch'")?;
                break;
            }
        }

        Ok(StatementKind::Switch(SwitchStatement {
            subject,
            cases,
            default,
        }))
    }

    /// A variable or subscript that can be stored into.
    pub(super) fn parse_target(&mut self) -> Result<Expression, Error> {
        let line = self.current.line;
        let target = self.parse_postfix()?;
        match target {
            Expression::Variable(_) | Expression::Index { .. } => Ok(target),
            _ => Err(Error::syntax(line, "Invalid assignment target")),
        }
    }

    pub(super) fn parse_expression_list(&mut self) -> Result<Vec<Expression>, Error> {
        let mut items = vec![self.parse_expression()?];
        while self.matches(&TokenKind::Comma) {
            items.push(self.parse_expression()?);
        }
        Ok(items)
    }

    // ========================================================================
    // Token helpers
    // ========================================================================

    pub(super) fn advance(&mut self) {
        self.previous = std::mem::replace(&mut self.current, self.scanner.next_token());
    }

    pub(super) fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current.kind) == std::mem::discriminant(kind)
    }

    /// Looks one token past `current` without consuming anything.
    fn peek_is(&self, kind: &TokenKind) -> bool {
        let mut lookahead = self.scanner.clone();
        std::mem::discriminant(&lookahead.next_token().kind) == std::mem::discriminant(kind)
    }

    pub(super) fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(super) fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<(), Error> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    pub(super) fn expect_identifier(&mut self) -> Result<String, Error> {
        match &self.current.kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    pub(super) fn unexpected(&self, expected: &str) -> Error {
        match &self.current.kind {
            TokenKind::Error(message) => Error::syntax(self.current.line, message.clone()),
            found => Error::syntax(
                self.current.line,
                format!("Expected {}, found {}", expected, found.describe()),
            ),
        }
    }

    pub(super) fn is_at_end(&self) -> bool {
        matches!(self.current.kind, TokenKind::Eof)
    }

    fn at_terminator(&self) -> bool {
        matches!(
            self.current.kind,
            TokenKind::Newline | TokenKind::Colon | TokenKind::Eof
        )
    }

    fn skip_separators(&mut self) {
        while matches!(self.current.kind, TokenKind::Newline | TokenKind::Colon) {
            self.advance();
        }
    }

    /// A statement must end at a newline, `:`/`;`, or end of file.
    fn expect_terminator(&mut self) -> Result<(), Error> {
        if self.at_terminator() {
            self.skip_separators();
            Ok(())
        } else {
            Err(self.unexpected("end of line"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Program {
        Parser::new(source).parse_program().expect("Should parse")
    }

    fn parse_err(source: &str) -> Error {
        Parser::new(source).parse_program().expect_err("Should fail")
    }

    fn kinds(source: &str) -> Vec<StatementKind> {
        parse(source).body.into_iter().map(|s| s.kind).collect()
    }

    #[test]
    fn test_parse_empty_program() {
        assert!(parse("").body.is_empty());
        assert!(parse("\n\n// only a comment\n").body.is_empty());
    }

    #[test]
    fn test_parse_let_and_declare() {
        let body = kinds("let x = 1\nlet y\nz = 2");
        assert!(matches!(&body[0], StatementKind::Assign(a) if a.target == Expression::Variable("x".into())));
        assert_eq!(body[1], StatementKind::Declare("y".into()));
        assert!(matches!(&body[2], StatementKind::Assign(_)));
    }

    #[test]
    fn test_parse_subscript_assignment() {
        let body = kinds("let grid[1, 2] = 5");
        let StatementKind::Assign(assign) = &body[0] else {
            panic!("expected assignment");
        };
        assert!(matches!(&assign.target, Expression::Index { keys, .. } if keys.len() == 2));
    }

    #[test]
    fn test_parse_lines() {
        let program = parse("print 1\n\nprint 2");
        assert_eq!(program.body[0].line, 1);
        assert_eq!(program.body[1].line, 3);
    }

    #[test]
    fn test_parse_if_chain() {
        let body = kinds("if x > 1 then\nprint 1\nelseif x > 0 then\nprint 2\nelse if x < -5\nprint 3\nelse\nprint 4\nend if");
        let StatementKind::If(stmt) = &body[0] else {
            panic!("expected if");
        };
        assert_eq!(stmt.branches.len(), 3);
        assert!(stmt.else_body.is_some());
    }

    #[test]
    fn test_parse_single_line_if() {
        let body = kinds("if x then print 1 else print 2");
        let StatementKind::If(stmt) = &body[0] else {
            panic!("expected if");
        };
        assert_eq!(stmt.branches.len(), 1);
        assert_eq!(stmt.else_body.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_parse_for_loops() {
        let body = kinds("for i = 1 to 10 step 2\nprint i\nnext i\nfor each v in items\nprint v\nnext");
        assert!(matches!(&body[0], StatementKind::For(f) if f.var == "i" && f.step.is_some()));
        assert!(matches!(&body[1], StatementKind::ForEach(f) if f.var == "v"));
    }

    #[test]
    fn test_parse_for_next_mismatch() {
        let err = parse_err("for i = 1 to 3\nnext j");
        assert!(err.to_string().contains("Mismatched FOR/NEXT variable"));
    }

    #[test]
    fn test_parse_function_flags() {
        let body = kinds("async function Fetch(a, b)\nreturn a\nend function\nnative function fast()\nend function");
        let StatementKind::Function(f) = &body[0] else {
            panic!("expected function");
        };
        assert_eq!(f.name, "fetch");
        assert_eq!(f.params, vec!["a".to_string(), "b".to_string()]);
        assert!(f.is_async);
        assert!(matches!(&body[1], StatementKind::Function(f) if f.is_native && !f.is_async));
    }

    #[test]
    fn test_parse_try_forms() {
        let body = kinds("try\nraise \"x\"\ncatch e\nprint e\nfinally\nprint 1\nend try");
        let StatementKind::Try(stmt) = &body[0] else {
            panic!("expected try");
        };
        assert!(stmt.catch.is_some());
        assert!(stmt.finally.is_some());

        let err = parse_err("try\nprint 1\nendtry");
        assert!(err.to_string().contains("'catch' or 'finally'"));
    }

    #[test]
    fn test_parse_switch() {
        let body = kinds("switch x\ncase 1, 2\nprint \"low\"\ncase 3\nprint \"three\"\ndefault\nprint \"other\"\nend switch");
        let StatementKind::Switch(stmt) = &body[0] else {
            panic!("expected switch");
        };
        assert_eq!(stmt.cases.len(), 2);
        assert_eq!(stmt.cases[0].values.len(), 2);
        assert!(stmt.default.is_some());
    }

    #[test]
    fn test_parse_data_read_restore() {
        let body = kinds("data 1, -2, \"three\"\nread a, b[0]\nrestore");
        assert!(matches!(&body[0], StatementKind::Data(items) if items.len() == 3));
        assert!(matches!(&body[1], StatementKind::Read(targets) if targets.len() == 2));
        assert_eq!(body[2], StatementKind::Restore);
    }

    #[test]
    fn test_parse_dim() {
        let body = kinds("dim a[3], grid(2, 4)");
        let StatementKind::Dim(arrays) = &body[0] else {
            panic!("expected dim");
        };
        assert_eq!(arrays[0].name, "a");
        assert_eq!(arrays[1].sizes.len(), 2);
    }

    #[test]
    fn test_parse_debug_keeps_source_text() {
        let body = kinds("debug  x + y * 2 ");
        assert!(matches!(&body[0], StatementKind::Debug(d) if d.source == "x + y * 2"));
    }

    #[test]
    fn test_parse_import_spawn_global() {
        let body = kinds("import \"lib\"\nspawn work(1)\nglobal a, b");
        assert_eq!(body[0], StatementKind::Import("lib".into()));
        assert!(matches!(&body[1], StatementKind::Spawn(Expression::Call { .. })));
        assert_eq!(body[2], StatementKind::Global(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn test_parse_colon_separates_statements() {
        assert_eq!(kinds("print 1 : print 2; print 3").len(), 3);
    }

    #[test]
    fn test_parse_error_missing_terminator() {
        let err = parse_err("print 1 print 2");
        assert!(matches!(err, Error::Syntax { line: 1, .. }));
    }

    #[test]
    fn test_parse_error_invalid_assignment_target() {
        let err = parse_err("1 + 2 = 3");
        assert!(err.to_string().contains("Invalid assignment target"));
    }

    #[test]
    fn test_parse_error_unclosed_block() {
        let err = parse_err("while x\nprint 1\n");
        assert!(err.to_string().contains("'wend'"));
    }
}
