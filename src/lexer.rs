//! The textual IR scanner (§4.1 "Scanner contract"): produces a token
//! stream of identifiers, signed numbers, strings, punctuation symbols,
//! newlines, and EOF. Whitespace is insignificant except that a newline
//! terminates a statement.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use crate::error::ParseError;

/// A 1-indexed line/column position plus a 0-indexed byte offset, in the
/// style of `seen_common::span::Position`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub offset: u32,
}

impl Position {
    pub fn start() -> Self {
        Self { line: 1, column: 1, offset: 0 }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// One lexical token. Numbers carry their literal text and sign rather
/// than a parsed value: the parser resolves width/signedness against the
/// expected type, and `0x` pointer literals are distinguished from
/// ordinary (possibly signed) integer literals by `hex`.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Number { text: String, negative: bool, hex: bool },
    Str(String),
    /// A single-character punctuation symbol: one of
    /// `@ # % { } ( ) , : = < >`. `< >` only appear inside composite type
    /// spellings (e.g. `array<i64, 4>`).
    Symbol(char),
    FatArrow,
    Newline,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "identifier {s:?}"),
            Token::Number { text, .. } => write!(f, "number {text:?}"),
            Token::Str(s) => write!(f, "string {s:?}"),
            Token::Symbol(c) => write!(f, "'{c}'"),
            Token::FatArrow => write!(f, "'=>'"),
            Token::Newline => write!(f, "newline"),
            Token::Eof => write!(f, "end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub pos: Position,
}

/// Recognizes one token stream from source text. Single-pass, no
/// lookahead beyond one character (`peek`).
pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    pos: Position,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { chars: source.chars().peekable(), pos: Position::start() }
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.pos.line += 1;
            self.pos.column = 1;
        } else {
            self.pos.column += 1;
        }
        self.pos.offset += c.len_utf8() as u32;
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn skip_insignificant_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' || !c.is_whitespace() {
                break;
            }
            self.advance();
        }
    }

    /// Scans the whole input into a token stream, the form the parser
    /// consumes (§4.1's parser is single-pass recursive descent over this
    /// stream).
    pub fn tokenize(mut self) -> Result<Vec<SpannedToken>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let eof = matches!(tok.token, Token::Eof);
            tokens.push(tok);
            if eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<SpannedToken, ParseError> {
        self.skip_insignificant_whitespace();
        let start = self.pos;
        let Some(c) = self.peek() else {
            return Ok(SpannedToken { token: Token::Eof, pos: start });
        };

        if c == '\n' {
            self.advance();
            return Ok(SpannedToken { token: Token::Newline, pos: start });
        }

        if c == '"' {
            return self.scan_string(start);
        }

        if c.is_ascii_digit() || (c == '-' && self.peek_is_digit_after_minus()) {
            return self.scan_number(start);
        }

        if is_ident_start(c) {
            return Ok(self.scan_ident(start));
        }

        match c {
            '@' | '#' | '%' | '{' | '}' | '(' | ')' | ',' | ':' | '<' | '>' => {
                self.advance();
                Ok(SpannedToken { token: Token::Symbol(c), pos: start })
            }
            '=' => {
                self.advance();
                if self.peek() == Some('>') {
                    self.advance();
                    Ok(SpannedToken { token: Token::FatArrow, pos: start })
                } else {
                    Ok(SpannedToken { token: Token::Symbol('='), pos: start })
                }
            }
            other => Err(ParseError::UnexpectedChar { position: start, found: other }),
        }
    }

    fn peek_is_digit_after_minus(&mut self) -> bool {
        let mut clone = self.chars.clone();
        clone.next(); // consume '-'
        matches!(clone.peek(), Some(c) if c.is_ascii_digit())
    }

    fn scan_ident(&mut self, start: Position) -> SpannedToken {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        SpannedToken { token: Token::Ident(text), pos: start }
    }

    fn scan_number(&mut self, start: Position) -> Result<SpannedToken, ParseError> {
        let mut text = String::new();
        let mut negative = false;
        if self.peek() == Some('-') {
            negative = true;
            text.push('-');
            self.advance();
        }

        let mut hex = false;
        if self.peek() == Some('0') {
            text.push('0');
            self.advance();
            if self.peek() == Some('x') {
                hex = true;
                text.push('x');
                self.advance();
                while let Some(c) = self.peek() {
                    if c.is_ascii_hexdigit() {
                        text.push(c);
                        self.advance();
                    } else {
                        break;
                    }
                }
                return Ok(SpannedToken { token: Token::Number { text, negative, hex }, pos: start });
            }
        }

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if text.is_empty() || text == "-" {
            return Err(ParseError::InvalidNumber { position: start, text });
        }
        Ok(SpannedToken { token: Token::Number { text, negative, hex }, pos: start })
    }

    fn scan_string(&mut self, start: Position) -> Result<SpannedToken, ParseError> {
        self.advance(); // opening quote
        let mut text = String::new();
        loop {
            match self.advance() {
                None => return Err(ParseError::UnterminatedString { position: start }),
                Some('"') => break,
                Some('\\') => match self.advance() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('"') => text.push('"'),
                    Some('\\') => text.push('\\'),
                    Some(other) => text.push(other),
                    None => return Err(ParseError::UnterminatedString { position: start }),
                },
                Some(c) => text.push(c),
            }
        }
        Ok(SpannedToken { token: Token::Str(text), pos: start })
    }
}
