use std::fmt;

use tracing::trace;

use crate::ast::*;
use crate::error::{ErrorKind, ParseError};
use crate::lexer::{Span, Token, TokenKind};
use crate::ParseOptions;

/// Grammar production active when a parse error is raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    Statement,
    Fragment,
    IfStatement,
    Expr,
    LogicExpr,
    Cond,
    Term,
    Variable,
    Value,
    Array,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Rule::Statement => "template",
            Rule::Fragment => "fragment",
            Rule::IfStatement => "conditional block",
            Rule::Expr => "expression",
            Rule::LogicExpr => "logical operand",
            Rule::Cond => "condition",
            Rule::Term => "term",
            Rule::Variable => "variable reference",
            Rule::Value => "value",
            Rule::Array => "array",
        })
    }
}

const TERM_START: &[TokenKind] = &[
    TokenKind::VariableOpen,
    TokenKind::Number,
    TokenKind::String,
    TokenKind::Boolean,
    TokenKind::ArrayOpen,
];

/// Recursive-descent parser over a lexed token sequence.
pub struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    cursor: usize,
    eof: Token<'a>,
    depth: usize,
    options: ParseOptions,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token<'a>>) -> Self {
        Self::with_options(tokens, ParseOptions::default())
    }

    pub fn with_options(mut tokens: Vec<Token<'a>>, options: ParseOptions) -> Self {
        let eof = match tokens.last() {
            Some(last) if last.kind == TokenKind::Eof => {
                let last = *last;
                tokens.pop();
                last
            }
            // No terminator: report end of input at the end of the last token.
            Some(last) => Token {
                kind: TokenKind::Eof,
                text: "",
                span: Span::new(last.span.end, last.span.end, last.span.line, last.span.column),
            },
            None => Token {
                kind: TokenKind::Eof,
                text: "",
                span: Span::new(0, 0, 1, 1),
            },
        };
        Self {
            tokens,
            cursor: 0,
            eof,
            depth: 0,
            options,
        }
    }

    fn peek(&self) -> Token<'a> {
        self.tokens.get(self.cursor).copied().unwrap_or(self.eof)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn consume(&mut self) -> Token<'a> {
        let token = self.peek();
        if self.cursor < self.tokens.len() {
            self.cursor += 1;
        }
        token
    }

    fn expect(
        &mut self,
        kind: TokenKind,
        expected: &'static str,
        rule: Rule,
    ) -> Result<Token<'a>, ParseError> {
        if self.at(kind) {
            Ok(self.consume())
        } else {
            Err(self.unexpected(expected, rule))
        }
    }

    fn unexpected(&self, expected: &'static str, rule: Rule) -> ParseError {
        let token = self.peek();
        let kind = match token.kind {
            TokenKind::Eof => ErrorKind::UnexpectedEof { expected },
            _ => ErrorKind::UnexpectedToken {
                found: token.describe(),
                expected,
            },
        };
        ParseError::grammar(kind, token.span, rule)
    }

    fn enter(&mut self, opener: Span, rule: Rule) -> Result<(), ParseError> {
        if self.depth >= self.options.max_depth {
            return Err(ParseError::grammar(
                ErrorKind::NestingTooDeep {
                    limit: self.options.max_depth,
                },
                opener,
                rule,
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// `Statement := Fragment+`
    pub fn parse(&mut self) -> Result<Statement, ParseError> {
        let mut fragments = Vec::new();
        while !self.at(TokenKind::Eof) {
            fragments.push(self.parse_fragment()?);
        }
        if fragments.is_empty() {
            return Err(ParseError::grammar(
                ErrorKind::EmptyTemplate,
                self.peek().span,
                Rule::Statement,
            ));
        }
        Ok(Statement { fragments })
    }

    fn parse_fragment(&mut self) -> Result<Fragment, ParseError> {
        let token = self.peek();
        match token.kind {
            TokenKind::TernaryOpen => Ok(Fragment::If(self.parse_if()?)),
            TokenKind::VariableOpen => Ok(Fragment::Variable(self.parse_variable()?)),
            TokenKind::Literal if !token.text.is_empty() => {
                self.consume();
                Ok(Fragment::Literal(token.text.to_string()))
            }
            _ => Err(self.unexpected("text, `${` or `#{`", Rule::Fragment)),
        }
    }

    /// `'#{' Expr '?' Term ':' Term '}'`
    fn parse_if(&mut self) -> Result<IfStatement, ParseError> {
        let open = self.expect(TokenKind::TernaryOpen, "`#{`", Rule::IfStatement)?;
        trace!(offset = open.span.start, "parse conditional block");

        let condition = self.parse_expr()?;
        self.expect(TokenKind::TernaryThen, "`?`", Rule::IfStatement)?;
        let then_branch = self.parse_term()?;
        self.expect(TokenKind::TernaryElse, "`:`", Rule::IfStatement)?;
        let else_branch = self.parse_term()?;
        self.expect(TokenKind::BlockClose, "`}`", Rule::IfStatement)?;

        Ok(IfStatement {
            condition,
            then_branch,
            else_branch,
        })
    }

    /// `'${' Ident '}'`
    fn parse_variable(&mut self) -> Result<String, ParseError> {
        self.expect(TokenKind::VariableOpen, "`${`", Rule::Variable)?;
        let name = self.expect(TokenKind::Ident, "identifier", Rule::Variable)?;
        self.expect(TokenKind::BlockClose, "`}`", Rule::Variable)?;
        Ok(name.text.to_string())
    }

    /// `(Cond | '(' Expr ')') LogicExpr*`
    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_operand(Rule::Expr)?;
        let mut right = Vec::new();
        while self.at(TokenKind::LogicOperator) {
            let token = self.consume();
            let operator = token.text.parse::<LogicOperator>().map_err(|e| {
                ParseError::grammar(
                    ErrorKind::InvalidKeyword { text: e.0 },
                    token.span,
                    Rule::LogicExpr,
                )
            })?;
            let operand = self.parse_operand(Rule::LogicExpr)?;
            right.push(LogicExpr { operator, operand });
        }
        Ok(Expr { left, right })
    }

    fn parse_operand(&mut self, rule: Rule) -> Result<Operand, ParseError> {
        if !self.at(TokenKind::SubExprOpen) {
            return Ok(Operand::Cond(self.parse_cond(rule)?));
        }

        let open = self.consume();
        self.enter(open.span, rule)?;
        trace!(offset = open.span.start, depth = self.depth, "parse sub-expression");
        let expr = self.parse_expr()?;
        self.expect(TokenKind::SubExprClose, "`)`", rule)?;
        self.leave();
        Ok(Operand::Sub(Box::new(expr)))
    }

    /// `Term (ComparisonOperator Term)?`
    fn parse_cond(&mut self, rule: Rule) -> Result<Cond, ParseError> {
        if !TERM_START.contains(&self.peek().kind) {
            return Err(self.unexpected("condition", rule));
        }
        let left = self.parse_term()?;
        if !self.at(TokenKind::ComparisonOperator) {
            return Ok(Cond::new(left));
        }

        let token = self.consume();
        let operator = token.text.parse::<ComparisonOperator>().map_err(|e| {
            ParseError::grammar(ErrorKind::InvalidKeyword { text: e.0 }, token.span, Rule::Cond)
        })?;
        if !TERM_START.contains(&self.peek().kind) {
            return Err(self.unexpected("comparison operand", Rule::Cond));
        }
        let right = self.parse_term()?;
        Ok(Cond::compare(left, operator, right))
    }

    /// `'${' Ident '}' | Value`
    fn parse_term(&mut self) -> Result<Term, ParseError> {
        match self.peek().kind {
            TokenKind::VariableOpen => Ok(Term::Variable(self.parse_variable()?)),
            TokenKind::Number | TokenKind::String | TokenKind::Boolean | TokenKind::ArrayOpen => {
                Ok(Term::Value(self.parse_value()?))
            }
            _ => Err(self.unexpected("variable reference or value", Rule::Term)),
        }
    }

    /// `Number | String | Boolean | '[' Value (',' Value)* ']'`
    fn parse_value(&mut self) -> Result<Value, ParseError> {
        let token = self.peek();
        match token.kind {
            TokenKind::Number => {
                self.consume();
                match token.text.parse::<f64>() {
                    Ok(n) if n.is_finite() => Ok(Value::Number(n)),
                    _ => Err(ParseError::grammar(
                        ErrorKind::InvalidNumber {
                            text: token.text.to_string(),
                        },
                        token.span,
                        Rule::Value,
                    )),
                }
            }
            TokenKind::String => {
                self.consume();
                Ok(Value::String(token.text.to_string()))
            }
            TokenKind::Boolean => {
                self.consume();
                parse_boolean(token.text).map(Value::Boolean).map_err(|e| {
                    ParseError::grammar(
                        ErrorKind::InvalidKeyword { text: e.0 },
                        token.span,
                        Rule::Value,
                    )
                })
            }
            TokenKind::ArrayOpen => self.parse_array(),
            _ => Err(self.unexpected("value", Rule::Value)),
        }
    }

    fn parse_array(&mut self) -> Result<Value, ParseError> {
        let open = self.expect(TokenKind::ArrayOpen, "`[`", Rule::Array)?;
        self.enter(open.span, Rule::Array)?;
        trace!(offset = open.span.start, depth = self.depth, "parse array");

        let mut items = vec![self.parse_value()?];
        while self.at(TokenKind::Comma) {
            self.consume();
            items.push(self.parse_value()?);
        }
        self.expect(TokenKind::ArrayClose, "`,` or `]`", Rule::Array)?;
        self.leave();
        Ok(Value::Array(items))
    }
}
