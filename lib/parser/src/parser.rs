mod expr;
mod stmt;

use cursor::Line;
use errors::LoxError;
pub use expr::{Expr, LiteralValue};
pub use stmt::Stmt;

use scanner::{Token, TokenData, TokenType};
use TokenType::*;

pub type Result<T> = std::result::Result<T, ParseError>;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("[line {line}] Error{at}: {error}")]
pub struct ParseError {
    pub error: ParseErrorType,
    pub line: Line,
    pub at: String,
}

impl From<ParseError> for LoxError {
    fn from(e: ParseError) -> Self {
        LoxError::new(e.line, e.at, e.error)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParseErrorType {
    #[error("Expect expression.")]
    ExpectedExpression,
    #[error("Expect ')' after {0}.")]
    ExpectedRightParen(&'static str),
    #[error("Expect ';' after {0}.")]
    ExpectedSemicolonAfter(&'static str),
    #[error("Expect variable name.")]
    ExpectedVariableName,
    #[error("Expect '}}' after {0}.")]
    ExpectedRightBrace(&'static str),
    #[error("Invalid assignment target.")]
    InvalidAssignmentTarget,
}

impl ParseErrorType {
    fn at(self, token: &Token) -> ParseError {
        ParseError { error: self, line: token.line(), at: errors::location(token.lexeme()) }
    }
}

#[derive(Debug)]
pub struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    current: usize,
    block_depth: usize,
    errors: Vec<ParseError>,
}

impl<'a> Parser<'a> {
    /// The token sequence is terminated with `Eof` if it isn't already.
    pub fn new(tokens: impl IntoIterator<Item = Token<'a>>) -> Self {
        let mut tokens: Vec<_> = tokens.into_iter().collect();
        if tokens.last().map(Token::ty) != Some(Eof) {
            let line = tokens.last().map_or(Line(1), Token::line);
            tokens.push(Token::eof(line));
        }
        Self { tokens, current: 0, block_depth: 0, errors: Vec::new() }
    }

    pub fn parse(mut self) -> (Vec<Stmt<'a>>, Vec<ParseError>) {
        let mut stmts = Vec::new();
        while !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                stmts.push(stmt);
            }
        }

        log::debug!("Parsed {} statement(s) with {} error(s)", stmts.len(), self.errors.len());
        (stmts, self.errors)
    }

    /// Parses one declaration, recording the error and resynchronizing if it fails.
    fn declaration(&mut self) -> Option<Stmt<'a>> {
        let result = if self.consume(Var).is_some() {
            self.var_declaration()
        } else {
            self.statement()
        };

        match result {
            Ok(stmt) => Some(stmt),
            Err(e) => {
                log::trace!("Hit error: {:?}, syncing...", e);
                self.errors.push(e);
                self.synchronize();
                None
            }
        }
    }

    fn var_declaration(&mut self) -> Result<Stmt<'a>> {
        let name = self.consume_or_error(Identifier, ParseErrorType::ExpectedVariableName)?;

        let initializer = match self.consume(Equal) {
            Some(_) => Some(self.expression()?),
            None => None,
        };

        self.consume_or_error(
            Semicolon,
            ParseErrorType::ExpectedSemicolonAfter("variable declaration"),
        )?;

        Ok(Stmt::Var { name, initializer })
    }

    fn statement(&mut self) -> Result<Stmt<'a>> {
        if self.consume(Print).is_some() {
            return self.print_statement();
        }

        if self.consume(LeftBrace).is_some() {
            return self.block();
        }

        self.expression_statement()
    }

    fn block(&mut self) -> Result<Stmt<'a>> {
        let mut stmts = Vec::new();

        self.block_depth += 1;
        while !matches!(self.peek(), RightBrace | Eof) {
            if let Some(stmt) = self.declaration() {
                stmts.push(stmt);
            }
        }
        self.block_depth -= 1;

        self.consume_or_error(RightBrace, ParseErrorType::ExpectedRightBrace("block"))?;
        Ok(Stmt::Block(stmts))
    }

    fn print_statement(&mut self) -> Result<Stmt<'a>> {
        let value = self.expression()?;
        self.consume_or_error(Semicolon, ParseErrorType::ExpectedSemicolonAfter("value"))?;
        Ok(Stmt::Print(value))
    }

    fn expression_statement(&mut self) -> Result<Stmt<'a>> {
        let value = self.expression()?;
        self.consume_or_error(Semicolon, ParseErrorType::ExpectedSemicolonAfter("expression"))?;
        Ok(Stmt::Expression(value))
    }

    fn expression(&mut self) -> Result<Expr<'a>> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr<'a>> {
        let expr = self.equality()?;

        if let Some(equal) = self.consume(Equal) {
            let value = Box::new(self.assignment()?);

            if let Expr::Variable(name) = expr {
                return Ok(Expr::Assign { name, value });
            }

            // Not fatal: the parser isn't confused, so there's nothing to synchronize.
            self.errors.push(ParseErrorType::InvalidAssignmentTarget.at(&equal));
        }

        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr<'a>> {
        let mut expr = self.comparison()?;

        while let BangEqual | EqualEqual = self.peek() {
            let operator = self.advance();
            let right = Box::new(self.comparison()?);
            expr = Expr::Binary { left: Box::new(expr), operator, right }
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr<'a>> {
        let mut expr = self.term()?;

        while let Greater | GreaterEqual | Less | LessEqual = self.peek() {
            let operator = self.advance();
            let right = Box::new(self.term()?);
            expr = Expr::Binary { left: Box::new(expr), operator, right }
        }
        Ok(expr)
    }

    fn term(&mut self) -> Result<Expr<'a>> {
        let mut expr = self.factor()?;

        while let Plus | Minus = self.peek() {
            let operator = self.advance();
            let right = Box::new(self.factor()?);
            expr = Expr::Binary { left: Box::new(expr), operator, right }
        }
        Ok(expr)
    }

    fn factor(&mut self) -> Result<Expr<'a>> {
        let mut expr = self.unary()?;

        while let Star | Slash = self.peek() {
            let operator = self.advance();
            let right = Box::new(self.unary()?);
            expr = Expr::Binary { left: Box::new(expr), operator, right }
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr<'a>> {
        if let Minus | Bang = self.peek() {
            let operator = self.advance();
            let right = Box::new(self.unary()?);
            return Ok(Expr::Unary { operator, right });
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr<'a>> {
        let token = self.peek_token().clone();
        let expr = match token.data {
            TokenData::False => Expr::Literal(LiteralValue::Boolean(false)),
            TokenData::True => Expr::Literal(LiteralValue::Boolean(true)),
            TokenData::Nil => Expr::Literal(LiteralValue::Nil),
            TokenData::Str(s) => Expr::Literal(LiteralValue::Str(s)),
            TokenData::Number(n) => Expr::Literal(LiteralValue::Number(n)),
            TokenData::Identifier => Expr::Variable(token),
            TokenData::LeftParen => {
                self.advance();
                let expr = self.expression()?;
                self.consume_or_error(
                    RightParen,
                    ParseErrorType::ExpectedRightParen("expression"),
                )?;
                return Ok(Expr::Grouping(Box::new(expr)));
            }
            _ => return Err(ParseErrorType::ExpectedExpression.at(&token)),
        };
        self.advance();
        Ok(expr)
    }

    /// Discards tokens until the start of the next statement. Inside a block, a closing
    /// brace is left for the block to consume.
    fn synchronize(&mut self) {
        if self.block_depth > 0 && self.peek() == RightBrace {
            return;
        }

        let mut previous = self.advance().ty();
        loop {
            log::trace!("Syncing... {:?}", self.peek_token());
            if previous == Semicolon {
                return;
            }
            match self.peek() {
                Class | Fun | Var | For | If | While | Print | Return | Eof => return,
                RightBrace if self.block_depth > 0 => return,
                _ => previous = self.advance().ty(),
            }
        }
    }
}

// Helpers
impl<'a> Parser<'a> {
    fn consume(&mut self, ty: TokenType) -> Option<Token<'a>> {
        (self.peek() == ty).then(|| self.advance())
    }

    fn consume_or_error(&mut self, ty: TokenType, error: ParseErrorType) -> Result<Token<'a>> {
        match self.consume(ty) {
            Some(token) => Ok(token),
            None => Err(error.at(self.peek_token())),
        }
    }

    fn peek_token(&self) -> &Token<'a> {
        // `new` guarantees a trailing Eof, and `advance` never moves past it.
        &self.tokens[self.current]
    }

    fn peek(&self) -> TokenType {
        self.peek_token().ty()
    }

    fn advance(&mut self) -> Token<'a> {
        let token = self.peek_token().clone();
        if token.ty() != Eof {
            self.current += 1;
        }
        token
    }

    fn is_at_end(&self) -> bool {
        self.peek() == Eof
    }
}
