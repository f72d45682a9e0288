use std::str::FromStr;

use cursor::{Cursor, Line};
use errors::LoxError;
use rust_decimal::Decimal;

pub mod token;
pub use token::{Token, TokenData, TokenType};
use TokenData::*;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("[line {line}] Error: {error}")]
pub struct ScanError {
    pub error: ScanErrorType,
    pub line: Line,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ScanErrorType {
    #[error("Unexpected character.")]
    UnexpectedCharacter(char),
    #[error("Unterminated string.")]
    UnterminatedString,
    #[error("Unterminated comment.")]
    UnterminatedComment,
    #[error("Number literal out of range.")]
    NumberOutOfRange,
}

impl From<ScanError> for LoxError {
    fn from(e: ScanError) -> Self {
        LoxError::new(e.line, "", e.error)
    }
}

/// Scans the whole source. Errors are interleaved with the tokens in source order,
/// and the last item is always the `Eof` token.
pub fn scan(source: &str) -> Vec<Result<Token<'_>, ScanError>> {
    TokenStream::new(source).collect()
}

#[derive(Debug, Clone)]
pub struct TokenStream<'a> {
    cursor: Cursor<'a>,
    start: usize,
    start_line: Line,
    done: bool,
}

impl<'a> TokenStream<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { cursor: Cursor::new(source), start: 0, start_line: Line(1), done: false }
    }

    fn make_token(&self, data: TokenData<'a>) -> Token<'a> {
        Token::new(data, self.cursor.slice_from(self.start), self.start_line)
    }

    fn error(&self, error: ScanErrorType) -> ScanError {
        ScanError { error, line: self.start_line }
    }

    fn either(&mut self, expected: char, matched: TokenData<'a>, otherwise: TokenData<'a>) -> Token<'a> {
        if self.cursor.next_if(expected) {
            self.make_token(matched)
        } else {
            self.make_token(otherwise)
        }
    }

    /// Scans the token starting with `c`. Returns `None` for whitespace and comments.
    fn scan_token(&mut self, c: char) -> Option<Result<Token<'a>, ScanError>> {
        let token = match c {
            '(' => self.make_token(LeftParen),
            ')' => self.make_token(RightParen),
            '{' => self.make_token(LeftBrace),
            '}' => self.make_token(RightBrace),
            ',' => self.make_token(Comma),
            '.' => self.make_token(Dot),
            '-' => self.make_token(Minus),
            '+' => self.make_token(Plus),
            ';' => self.make_token(Semicolon),
            '*' => self.make_token(Star),

            '!' => self.either('=', BangEqual, Bang),
            '=' => self.either('=', EqualEqual, Equal),
            '<' => self.either('=', LessEqual, Less),
            '>' => self.either('=', GreaterEqual, Greater),

            '/' => {
                if self.cursor.next_if('/') {
                    self.cursor.eat_while(|c| c != '\n');
                    return None;
                } else if self.cursor.next_if('*') {
                    return self.block_comment().err().map(Err);
                } else {
                    self.make_token(Slash)
                }
            }

            ' ' | '\r' | '\t' | '\n' => return None,

            '"' => return Some(self.string()),
            d if d.is_ascii_digit() => return Some(self.number()),
            a if a.is_ascii_alphabetic() || a == '_' => self.identifier(),

            c => return Some(Err(self.error(ScanErrorType::UnexpectedCharacter(c)))),
        };
        Some(Ok(token))
    }

    fn block_comment(&mut self) -> Result<(), ScanError> {
        let mut depth = 1usize;
        loop {
            match self.cursor.next() {
                None => return Err(self.error(ScanErrorType::UnterminatedComment)),
                Some('/') if self.cursor.next_if('*') => depth += 1,
                Some('*') if self.cursor.next_if('/') => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Some(_) => (),
            }
        }
    }

    fn string(&mut self) -> Result<Token<'a>, ScanError> {
        self.cursor.eat_while(|c| c != '"');
        if !self.cursor.next_if('"') {
            return Err(self.error(ScanErrorType::UnterminatedString));
        }
        let lexeme = self.cursor.slice_from(self.start);
        Ok(self.make_token(Str(&lexeme[1..lexeme.len() - 1])))
    }

    fn number(&mut self) -> Result<Token<'a>, ScanError> {
        self.cursor.eat_while(|c| c.is_ascii_digit());

        if self.cursor.peek() == Some('.')
            && self.cursor.peek_next().is_some_and(|c| c.is_ascii_digit())
        {
            self.cursor.next();
            self.cursor.eat_while(|c| c.is_ascii_digit());
        }

        let lexeme = self.cursor.slice_from(self.start);
        let fraction_digits = lexeme.split_once('.').map_or(0, |(_, fraction)| fraction.len());

        // `Decimal` rounds away fractional digits it can't hold, which shows up as a smaller scale.
        match Decimal::from_str(lexeme) {
            Ok(n) if n.scale() as usize == fraction_digits => Ok(self.make_token(Number(n))),
            _ => Err(self.error(ScanErrorType::NumberOutOfRange)),
        }
    }

    fn identifier(&mut self) -> Token<'a> {
        self.cursor.eat_while(|c| c.is_ascii_alphanumeric() || c == '_');
        let data = token::keyword(self.cursor.slice_from(self.start)).unwrap_or(Identifier);
        self.make_token(data)
    }
}

impl<'a> Iterator for TokenStream<'a> {
    type Item = Result<Token<'a>, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.start = self.cursor.offset();
            self.start_line = self.cursor.line();

            let Some(c) = self.cursor.next() else {
                if self.done {
                    return None;
                }
                self.done = true;
                return Some(Ok(Token::eof(self.cursor.line())));
            };

            if let Some(result) = self.scan_token(c) {
                log::trace!("Scanned {:?}", result);
                return Some(result);
            }
        }
    }
}
