//! Parse errors.
//!
//! Every failure is attributed to a source position and to the lexer mode
//! or grammar rule that was active when it happened.

use std::fmt;

use thiserror::Error;

use crate::lexer::{Mode, Span};
use crate::parser::Rule;

/// What went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    /// No lexer rule of the active mode matches this character
    #[error("unexpected character '{0}'")]
    UnexpectedCharacter(char),

    #[error("unterminated string literal")]
    UnterminatedString,

    /// End of input reached with `delimiter` still open
    #[error("unclosed block: `{delimiter}` is never closed")]
    UnclosedBlock { delimiter: &'static str },

    #[error("unexpected {found}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: &'static str,
    },

    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: &'static str },

    #[error("empty template")]
    EmptyTemplate,

    /// A boolean or logic operator keyword that does not normalize
    #[error("invalid keyword '{text}'")]
    InvalidKeyword { text: String },

    #[error("invalid number literal '{text}'")]
    InvalidNumber { text: String },

    #[error("nesting exceeds the maximum depth of {limit}")]
    NestingTooDeep { limit: usize },
}

/// Where in the pipeline an error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    Lex(Mode),
    Grammar(Rule),
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Context::Lex(mode) => write!(f, "while lexing {}", mode),
            Context::Grammar(rule) => write!(f, "while parsing {}", rule),
        }
    }
}

/// A lexical or grammar error with its position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at {span} {context}")]
pub struct ParseError {
    pub kind: ErrorKind,
    pub span: Span,
    pub context: Context,
}

impl ParseError {
    pub fn lexical(kind: ErrorKind, span: Span, mode: Mode) -> Self {
        Self {
            kind,
            span,
            context: Context::Lex(mode),
        }
    }

    pub fn grammar(kind: ErrorKind, span: Span, rule: Rule) -> Self {
        Self {
            kind,
            span,
            context: Context::Grammar(rule),
        }
    }

    pub fn is_lexical(&self) -> bool {
        matches!(self.context, Context::Lex(_))
    }

    /// Byte offset of the failure in the input.
    pub fn offset(&self) -> usize {
        self.span.start
    }

    /// Render the error with the offending source line and a caret under
    /// the failing column.
    pub fn format_with_source(&self, source: &str) -> String {
        let mut result = format!("Error at {}: {} {}\n", self.span, self.kind, self.context);

        let line_index = self.span.line.saturating_sub(1) as usize;
        if let Some(error_line) = source.lines().nth(line_index) {
            let pad = (self.span.column as usize).saturating_sub(1);
            result.push_str("  |\n");
            result.push_str(&format!("{:3} | {}\n", self.span.line, error_line));
            result.push_str(&format!("  | {}^\n", " ".repeat(pad)));
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_includes_position_and_context() {
        let err = ParseError::grammar(
            ErrorKind::UnexpectedToken {
                found: "`}`".to_string(),
                expected: "`:`",
            },
            Span::new(15, 16, 1, 16),
            Rule::IfStatement,
        );
        assert_eq!(
            err.to_string(),
            "unexpected `}`, expected `:` at 1:16 while parsing conditional block"
        );
        assert!(!err.is_lexical());
        assert_eq!(err.offset(), 15);
    }

    #[test]
    fn caret_points_at_column() {
        let source = "a\n#{ ${x} == }";
        let err = ParseError::lexical(
            ErrorKind::UnexpectedCharacter('@'),
            Span::new(5, 6, 2, 4),
            Mode::Ternary,
        );
        let rendered = err.format_with_source(source);
        assert!(rendered.starts_with("Error at 2:4: unexpected character '@' while lexing conditional block\n"));
        assert!(rendered.contains("  2 | #{ ${x} == }\n"));
        assert!(rendered.ends_with("  |    ^\n"));
    }
}
