// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The scanner that produces tokens from source text.

use super::{FStringPiece, Span, Token, TokenKind};

/// A scanner that tokenizes Momentum source code.
#[derive(Clone)]
pub struct Scanner<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    current_pos: usize,
    line: u32,
    /// Open `(`, `[` and `{`; newlines inside them are not terminators
    nesting: usize,
}

impl<'a> Scanner<'a> {
    /// Creates a new scanner for the given source code.
    pub fn new(source: &'a str) -> Self {
        Self::with_line(source, 1)
    }

    /// Creates a scanner whose first line is numbered `line`.
    pub fn with_line(source: &'a str, line: u32) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            current_pos: 0,
            line,
            nesting: 0,
        }
    }

    /// Returns the next token from the source.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();

        let start = self.current_pos;
        let line = self.line;

        let Some((_pos, ch)) = self.advance() else {
            return Token::new(TokenKind::Eof, Span::new(start, start), line);
        };

        let kind = match ch {
            '\n' => TokenKind::Newline,
            ';' => TokenKind::Newline,
            '(' | '[' | '{' => {
                self.nesting += 1;
                match ch {
                    '(' => TokenKind::LeftParen,
                    '[' => TokenKind::LeftBracket,
                    _ => TokenKind::LeftBrace,
                }
            }
            ')' | ']' | '}' => {
                self.nesting = self.nesting.saturating_sub(1);
                match ch {
                    ')' => TokenKind::RightParen,
                    ']' => TokenKind::RightBracket,
                    _ => TokenKind::RightBrace,
                }
            }
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '=' => {
                if self.eat('=') {
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if self.eat('=') {
                    TokenKind::BangEqual
                } else {
                    TokenKind::Error("Unexpected character '!'".to_string())
                }
            }
            '<' => {
                if self.eat('=') {
                    TokenKind::LessEqual
                } else if self.eat('>') {
                    TokenKind::BangEqual
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                if self.eat('=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                }
            }

            // String literals
            '"' | '\'' => self.scan_string(ch),

            // Numbers
            '0'..='9' => self.scan_number(start),
            '.' if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.scan_number(start),

            // f-strings, identifiers and keywords
            'f' | 'F' if matches!(self.peek(), Some('"' | '\'')) => {
                let quote = self.advance().map_or('"', |(_, c)| c);
                self.scan_fstring(quote)
            }
            _ if is_id_start(ch) => self.scan_identifier(start),

            _ => TokenKind::Error(format!("Unexpected character '{}'", ch)),
        };

        Token::new(kind, Span::new(start, self.current_pos), line)
    }

    /// Scans the whole input.
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return tokens;
            }
        }
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        let result = self.chars.next();
        if let Some((pos, ch)) = result {
            self.current_pos = pos + ch.len_utf8();
            if ch == '\n' {
                self.line += 1;
            }
        }
        result
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, ch)| *ch)
    }

    fn peek_next(&self) -> Option<char> {
        let mut iter = self.chars.clone();
        iter.next();
        iter.next().map(|(_, ch)| ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r') => {
                    self.advance();
                }
                Some('\n') if self.nesting > 0 => {
                    self.advance();
                }
                Some('/') if self.peek_next() == Some('/') => {
                    while let Some(ch) = self.peek() {
                        if ch == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn scan_number(&mut self, start: usize) -> TokenKind {
        let mut is_float = self.source[start..].starts_with('.');
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                self.advance();
            } else if ch == '.' && !is_float && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.advance();
            } else {
                break;
            }
        }

        let text = &self.source[start..self.current_pos];
        if is_float {
            match text.parse::<f64>() {
                Ok(n) => TokenKind::Float(n),
                Err(_) => TokenKind::Error(format!("Invalid number '{}'", text)),
            }
        } else {
            match text.parse::<i64>() {
                Ok(n) => TokenKind::Int(n),
                Err(_) if text.parse::<u64>() == Ok(i64::MIN.unsigned_abs()) => TokenKind::MinIntMagnitude,
                Err(_) => TokenKind::Error(format!("Integer literal '{}' is too large", text)),
            }
        }
    }

    fn scan_escape(&mut self) -> Option<char> {
        let (_, ch) = self.advance()?;
        Some(match ch {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            other => other,
        })
    }

    fn scan_string(&mut self, quote: char) -> TokenKind {
        let mut value = String::new();
        loop {
            match self.advance() {
                None | Some((_, '\n')) => {
                    return TokenKind::Error("Unterminated string literal".to_string());
                }
                Some((_, ch)) if ch == quote => return TokenKind::Str(value),
                Some((_, '\\')) => match self.scan_escape() {
                    Some(ch) => value.push(ch),
                    None => return TokenKind::Error("Unterminated string literal".to_string()),
                },
                Some((_, ch)) => value.push(ch),
            }
        }
    }

    /// Scans an f-string body after the opening quote. `{{` and `}}` are
    /// literal braces.
    fn scan_fstring(&mut self, quote: char) -> TokenKind {
        let unterminated = || TokenKind::Error("Unterminated f-string literal".to_string());
        let mut pieces = Vec::new();
        let mut text = String::new();
        loop {
            match self.advance() {
                None | Some((_, '\n')) => return unterminated(),
                Some((_, ch)) if ch == quote => break,
                Some((_, '\\')) => match self.scan_escape() {
                    Some(ch) => text.push(ch),
                    None => return unterminated(),
                },
                Some((_, '{')) if self.eat('{') => text.push('{'),
                Some((_, '}')) if self.eat('}') => text.push('}'),
                Some((_, '{')) => {
                    if !text.is_empty() {
                        pieces.push(FStringPiece::Text(std::mem::take(&mut text)));
                    }
                    let code_start = self.current_pos;
                    let mut depth = 0usize;
                    let mut inner_quote: Option<char> = None;
                    loop {
                        match self.peek() {
                            None | Some('\n') => return unterminated(),
                            Some(c) if inner_quote == Some(c) => inner_quote = None,
                            Some(_) if inner_quote.is_some() => {}
                            Some(c @ ('"' | '\'')) if c != quote => inner_quote = Some(c),
                            Some(c) if c == quote => return unterminated(),
                            Some('{') => depth += 1,
                            Some('}') if depth == 0 => break,
                            Some('}') => depth -= 1,
                            Some(_) => {}
                        }
                        self.advance();
                    }
                    let code = self.source[code_start..self.current_pos].to_string();
                    self.advance();
                    if code.trim().is_empty() {
                        return TokenKind::Error("Empty expression in f-string".to_string());
                    }
                    pieces.push(FStringPiece::Code(code, code_start));
                }
                Some((_, '}')) => {
                    return TokenKind::Error("Single '}' is not allowed in f-string".to_string());
                }
                Some((_, ch)) => text.push(ch),
            }
        }
        if !text.is_empty() {
            pieces.push(FStringPiece::Text(text));
        }
        TokenKind::FString(pieces)
    }

    fn scan_identifier(&mut self, start: usize) -> TokenKind {
        while let Some(ch) = self.peek() {
            if is_id_continue(ch) {
                self.advance();
            } else {
                break;
            }
        }
        let name = self.source[start..self.current_pos].to_lowercase();

        if name == "end" {
            if let Some(kind) = self.scan_end_compound() {
                return kind;
            }
        }

        TokenKind::keyword(&name).unwrap_or(TokenKind::Identifier(name))
    }

    /// Handles `end if`, `end function` and friends on the same line.
    fn scan_end_compound(&mut self) -> Option<TokenKind> {
        let rest = &self.source[self.current_pos..];
        let trimmed = rest.trim_start_matches([' ', '\t']);
        let skipped = rest.len() - trimmed.len();
        let word_len = trimmed
            .char_indices()
            .find(|&(_, c)| !is_id_continue(c))
            .map_or(trimmed.len(), |(i, _)| i);
        let kind = TokenKind::end_of(&trimmed[..word_len].to_lowercase())?;
        let target = self.current_pos + skipped + word_len;
        while self.current_pos < target {
            self.advance();
        }
        Some(kind)
    }
}

fn is_id_start(ch: char) -> bool {
    ch == '_' || unicode_xid::UnicodeXID::is_xid_start(ch)
}

fn is_id_continue(ch: char) -> bool {
    unicode_xid::UnicodeXID::is_xid_continue(ch)
}
