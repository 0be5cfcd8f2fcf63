// Recursive-descent parser; `&&` binds tighter than `||`, `!` binds tightest.

use super::lexer::{Token, TokenKind};
use super::FilterError;

/// Deepest allowed nesting of `!`, parentheses and `nestedFilter` calls.
pub const MAX_NESTING_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(f64),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Function {
    StartsWith(String),
    Contains(String),
    NestedFilter(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Compare { field: String, op: CompareOp, value: Literal },
    Call { field: String, function: Function },
}

pub(super) struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    pub(super) fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0, depth: 0 }
    }

    pub(super) fn parse(mut self) -> Result<Expr, FilterError> {
        if self.peek() == &TokenKind::Eof {
            return Err(FilterError::Empty);
        }

        let expr = self.parse_or()?;
        if self.peek() != &TokenKind::Eof {
            return Err(self.expected("end of expression"));
        }
        Ok(expr)
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].offset
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, expected: &'static str) -> Result<(), FilterError> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.expected(expected))
        }
    }

    fn expected(&self, expected: &'static str) -> FilterError {
        FilterError::Expected { expected, offset: self.offset() }
    }

    /// Run `parse` one nesting level deeper, failing once the limit is reached.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, FilterError>,
    ) -> Result<T, FilterError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(FilterError::TooDeep { max: MAX_NESTING_DEPTH, offset: self.offset() });
        }

        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn parse_or(&mut self) -> Result<Expr, FilterError> {
        let mut terms = vec![self.parse_and()?];
        while self.eat(&TokenKind::OrOr) {
            terms.push(self.parse_and()?);
        }
        Ok(if terms.len() == 1 { terms.remove(0) } else { Expr::Or(terms) })
    }

    fn parse_and(&mut self) -> Result<Expr, FilterError> {
        let mut terms = vec![self.parse_unary()?];
        while self.eat(&TokenKind::AndAnd) {
            terms.push(self.parse_unary()?);
        }
        Ok(if terms.len() == 1 { terms.remove(0) } else { Expr::And(terms) })
    }

    fn parse_unary(&mut self) -> Result<Expr, FilterError> {
        match self.peek() {
            TokenKind::Bang => self.nested(|parser| {
                parser.advance();
                Ok(Expr::Not(Box::new(parser.parse_unary()?)))
            }),
            TokenKind::LParen => self.nested(|parser| {
                parser.advance();
                let inner = parser.parse_or()?;
                parser.expect(&TokenKind::RParen, "')'")?;
                Ok(inner)
            }),
            _ => self.parse_predicate(),
        }
    }

    fn parse_predicate(&mut self) -> Result<Expr, FilterError> {
        let (field, function) = self.parse_operand()?;

        if let Some((name, offset)) = function {
            return self.parse_call(field, name, offset);
        }

        let op = match self.peek() {
            TokenKind::EqEq => CompareOp::Eq,
            TokenKind::NotEq => CompareOp::Ne,
            TokenKind::Lt => CompareOp::Lt,
            TokenKind::Le => CompareOp::Le,
            TokenKind::Gt => CompareOp::Gt,
            TokenKind::Ge => CompareOp::Ge,
            _ => return Err(self.expected("a comparison operator or function call")),
        };
        self.advance();

        let value = self.parse_literal()?;
        Ok(Expr::Compare { field, op, value })
    }

    /// Reads a field path. If the path ends in `name(`, the last segment is
    /// returned separately as a function name.
    fn parse_operand(&mut self) -> Result<(String, Option<(String, usize)>), FilterError> {
        if let TokenKind::Str(value) = self.peek().clone() {
            self.advance();
            return Ok((value, None));
        }

        let mut segments = Vec::new();
        loop {
            let offset = self.offset();
            let TokenKind::Ident(name) = self.peek().clone() else {
                return Err(self.expected("a field name"));
            };
            self.advance();

            if self.peek() == &TokenKind::LParen && !segments.is_empty() {
                return Ok((segments.join("."), Some((name, offset))));
            }
            segments.push(name);

            if !self.eat(&TokenKind::Dot) {
                return Ok((segments.join("."), None));
            }
        }
    }

    fn parse_call(&mut self, field: String, name: String, offset: usize) -> Result<Expr, FilterError> {
        self.expect(&TokenKind::LParen, "'('")?;

        let function = match name.as_str() {
            "startsWith" => Function::StartsWith(self.parse_string_argument()?),
            "contains" => Function::Contains(self.parse_string_argument()?),
            "nestedFilter" => {
                Function::NestedFilter(Box::new(self.nested(|parser| parser.parse_or())?))
            }
            _ => return Err(FilterError::UnknownFunction { name, offset }),
        };

        self.expect(&TokenKind::RParen, "')'")?;
        Ok(Expr::Call { field, function })
    }

    fn parse_string_argument(&mut self) -> Result<String, FilterError> {
        match self.peek().clone() {
            TokenKind::Str(value) => {
                self.advance();
                Ok(value)
            }
            _ => Err(self.expected("a string argument")),
        }
    }

    fn parse_literal(&mut self) -> Result<Literal, FilterError> {
        let literal = match self.peek().clone() {
            TokenKind::Str(value) => Literal::String(value),
            TokenKind::Number(value, _) => Literal::Number(value),
            TokenKind::True => Literal::Bool(true),
            TokenKind::False => Literal::Bool(false),
            _ => return Err(self.expected("a literal value")),
        };
        self.advance();
        Ok(literal)
    }
}
