// Filter expressions: a small CEL-like dialect compiled to the search index query DSL.
//
//   kind == "BUILD" && (resource.uri == "a" || build.provenance.builtArtifacts.nestedFilter(id == "a"))
//   name.startsWith("projects/p/notes/collector-")

mod compile;
mod lexer;
mod parser;

use serde_json::Value;
use thiserror::Error;

pub use parser::{CompareOp, Expr, Function, Literal, MAX_NESTING_DEPTH};

/// Longest accepted filter expression, in bytes.
pub const MAX_FILTER_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("unexpected character '{found}' at offset {offset}")]
    UnexpectedCharacter { found: char, offset: usize },

    #[error("unterminated string literal starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("invalid escape sequence at offset {offset}")]
    InvalidEscape { offset: usize },

    #[error("invalid number '{text}' at offset {offset}")]
    InvalidNumber { text: String, offset: usize },

    #[error("expected {expected} at offset {offset}")]
    Expected { expected: &'static str, offset: usize },

    #[error("unknown function '{name}' at offset {offset}")]
    UnknownFunction { name: String, offset: usize },

    #[error("filter expression nests deeper than {max} levels at offset {offset}")]
    TooDeep { max: usize, offset: usize },

    #[error("filter expression exceeds max length: {len} bytes (max {max})")]
    TooLong { len: usize, max: usize },

    #[error("filter expression is empty")]
    Empty,
}

impl FilterError {
    /// Byte offset into the expression where the error was detected, if any.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Self::UnexpectedCharacter { offset, .. }
            | Self::UnterminatedString { offset }
            | Self::InvalidEscape { offset }
            | Self::InvalidNumber { offset, .. }
            | Self::Expected { offset, .. }
            | Self::UnknownFunction { offset, .. }
            | Self::TooDeep { offset, .. } => Some(*offset),
            Self::TooLong { .. } | Self::Empty => None,
        }
    }
}

/// Turns a filter expression into a structured index query.
pub trait FilterCompiler: Send + Sync {
    fn compile(&self, expression: &str) -> Result<Value, FilterError>;
}

/// Compiler for the CEL-like dialect shared with the evidence store.
#[derive(Debug, Clone, Copy, Default)]
pub struct CelFilterCompiler;

impl FilterCompiler for CelFilterCompiler {
    fn compile(&self, expression: &str) -> Result<Value, FilterError> {
        let expr = parse(expression)?;
        Ok(compile::to_query(&expr))
    }
}

pub fn parse(expression: &str) -> Result<Expr, FilterError> {
    if expression.len() > MAX_FILTER_LEN {
        return Err(FilterError::TooLong { len: expression.len(), max: MAX_FILTER_LEN });
    }

    let tokens = lexer::tokenize(expression)?;
    parser::Parser::new(tokens).parse()
}

/// Quote `value` as a string literal of the filter dialect.
pub fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for ch in value.chars() {
        if ch == '"' || ch == '\\' {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// Join expressions with `||`, wrapping each side in parentheses.
pub fn any_of<I, S>(expressions: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    expressions
        .into_iter()
        .map(|expression| format!("({})", expression.as_ref()))
        .collect::<Vec<_>>()
        .join(" || ")
}

/// Join expressions with `&&`, wrapping each side in parentheses.
pub fn all_of<I, S>(expressions: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    expressions
        .into_iter()
        .map(|expression| format!("({})", expression.as_ref()))
        .collect::<Vec<_>>()
        .join(" && ")
}
