//! PEST-based token splitter for expression text
//!
//! Programs normally arrive already tokenized by the language lexer. When an expression is given
//! as plain text (program files written by hand, tests, the CLI), this module splits it into the
//! raw token stream the RPN compiler expects. String literals come out as three tokens: the
//! opening quote, the verbatim contents and the closing quote.

use pest::Parser;
use pest_derive::Parser;
use std::fmt;


/* ===================== PEST Parser ===================== */

#[derive(Parser)]
#[grammar = "parser/tokens.pest"]
struct TokenParser;

/* ===================== Error Types ===================== */

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    /// 1-based, 0 when unknown
    pub line: usize,
    pub col: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: usize, col: usize) -> Self {
        Self {
            message: message.into(),
            line,
            col,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} (line {}, column {})", self.message, self.line, self.col)
        }
    }
}

impl std::error::Error for ParseError {}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let (line, col) = match err.line_col {
            pest::error::LineColLocation::Pos(pos) => pos,
            pest::error::LineColLocation::Span(start, _) => start,
        };
        ParseError::new(err.variant.message().to_string(), line, col)
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/* ===================== Token Splitting ===================== */

/// Split expression text into raw tokens
pub fn split_tokens(source: &str) -> ParseResult<Vec<String>> {
    let mut pairs = TokenParser::parse(Rule::tokens, source)?;
    let Some(root) = pairs.next() else {
        return Ok(Vec::new());
    };

    let mut tokens = Vec::new();
    for pair in root.into_inner() {
        match pair.as_rule() {
            Rule::string => {
                for part in pair.into_inner() {
                    tokens.push(part.as_str().to_string());
                }
            }
            Rule::EOI => {}
            _ => tokens.push(pair.as_str().to_string()),
        }
    }
    Ok(tokens)
}
