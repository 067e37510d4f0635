//! ternplate: parser for `${var}` / `#{ cond ? a : b }` template strings.
//!
//! This crate does one job: turn a template string into an AST that a
//! caller can evaluate against its own variable bindings. It never
//! evaluates anything itself.
//!
//! Supported syntax:
//! - Literal text, passed through unchanged.
//! - `${name}` variable references. Names may contain `.` for nested
//!   field access; resolving them is up to the caller.
//! - `#{ condition ? then : else }` conditional blocks, where `then` and
//!   `else` are a variable reference or a literal value, and `condition`
//!   is one or more comparisons joined by `AND`/`OR` (also `and`/`or`,
//!   `&&`/`||`), optionally grouped with parentheses.
//! - Values: numbers (`5`, `1.5`, `.5`), quoted strings (`'a'`, `"a"`, no
//!   escapes), booleans (`true`, `false`, `TRUE`, `FALSE`) and non-empty
//!   arrays (`[1, [2, 3]]`).
//! - Comparison operators: `==`, `!=`, `>`, `>=`, `<`, `<=`, `IN`.
//!
//! AND/OR have no relative precedence: `a AND b OR c` is kept as one flat
//! chain ([`Expr::right`]) and only parentheses create grouping.
//!
//! Parsing is a pure function of the input. A template either parses as a
//! whole or fails with a [`ParseError`] pointing at the offending position.

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;

pub use ast::{
    Comparison, ComparisonOperator, Cond, Expr, Fragment, IfStatement, LogicExpr, LogicOperator,
    Operand, Statement, Term, Value,
};
pub use error::{Context, ErrorKind, ParseError};
pub use lexer::{tokenize, Mode, Span, Token, TokenKind, Tokenizer};
pub use parser::{Parser, Rule};

use tracing::debug;

/// Default bound on nested parentheses and arrays.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Parser configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Maximum nesting of `( ... )` sub-expressions and `[ ... ]` arrays.
    pub max_depth: usize,
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Parse a template string with default options.
pub fn parse(input: &str) -> Result<Statement, ParseError> {
    parse_with_options(input, &ParseOptions::default())
}

pub fn parse_with_options(input: &str, options: &ParseOptions) -> Result<Statement, ParseError> {
    let result = tokenize(input).and_then(|tokens| parse_tokens(tokens, options));
    match &result {
        Ok(statement) => debug!(fragments = statement.fragments.len(), "parsed template"),
        Err(err) => debug!(error = %err, "template rejected"),
    }
    result
}

/// Parse an already-lexed token sequence, as produced by [`tokenize`].
pub fn parse_tokens(tokens: Vec<Token<'_>>, options: &ParseOptions) -> Result<Statement, ParseError> {
    Parser::with_options(tokens, options.clone()).parse()
}
