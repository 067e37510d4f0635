//! Mode-switching tokenizer.
//!
//! The same characters mean different things depending on where they
//! appear: `?`, `:`, `(`, `==` or `and` are plain text at the top level but
//! operators inside `#{ ... }`. The tokenizer keeps a stack of [`Mode`]s,
//! pushing one when a construct opens (`#{`, `${`, `(`) and popping it on
//! that construct's own closing delimiter. Each mode tries an ordered list
//! of rules against the remaining input and the first match wins.

use std::fmt;

use tracing::trace;

use crate::error::{ErrorKind, ParseError};

/// Source location of a token or error.
///
/// `start`/`end` are byte offsets into the input; `line` and `column` are
/// 1-based and count characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether `offset` falls inside this span (an empty span contains its start).
    pub fn contains(&self, offset: usize) -> bool {
        offset == self.start || (self.start..self.end).contains(&offset)
    }

    pub fn slice<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    TernaryOpen,  // #{
    VariableOpen, // ${
    TernaryThen,  // ?
    TernaryElse,  // :
    BlockClose,   // }
    LogicOperator,
    SubExprOpen,  // (
    SubExprClose, // )
    ComparisonOperator,
    ArrayOpen,  // [
    ArrayClose, // ]
    Comma,      // ,

    // Data
    String,
    Number,
    Boolean,
    Ident,
    Literal,

    /// End of input. Always the last token of a successful tokenization.
    Eof,
}

impl TokenKind {
    /// Human-readable name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::TernaryOpen => "`#{`",
            TokenKind::VariableOpen => "`${`",
            TokenKind::TernaryThen => "`?`",
            TokenKind::TernaryElse => "`:`",
            TokenKind::BlockClose => "`}`",
            TokenKind::LogicOperator => "logic operator",
            TokenKind::SubExprOpen => "`(`",
            TokenKind::SubExprClose => "`)`",
            TokenKind::ComparisonOperator => "comparison operator",
            TokenKind::ArrayOpen => "`[`",
            TokenKind::ArrayClose => "`]`",
            TokenKind::Comma => "`,`",
            TokenKind::String => "string",
            TokenKind::Number => "number",
            TokenKind::Boolean => "boolean",
            TokenKind::Ident => "identifier",
            TokenKind::Literal => "literal text",
            TokenKind::Eof => "end of input",
        }
    }

    fn has_fixed_text(&self) -> bool {
        !matches!(
            self,
            TokenKind::LogicOperator
                | TokenKind::ComparisonOperator
                | TokenKind::String
                | TokenKind::Number
                | TokenKind::Boolean
                | TokenKind::Ident
                | TokenKind::Literal
        )
    }
}

/// A lexed token.
///
/// `text` is the captured value: the matched source for most kinds, the
/// contents between the quotes for [`TokenKind::String`]. `span` always
/// covers the full source match, quotes included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub span: Span,
}

impl Token<'_> {
    /// Short description for diagnostics, e.g. "identifier 'foo'".
    pub fn describe(&self) -> String {
        if self.kind.has_fixed_text() {
            self.kind.name().to_string()
        } else {
            format!("{} '{}'", self.kind.name(), self.text)
        }
    }
}

/// Lexical context. `Plain` is the implicit bottom of the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Plain,
    Ternary,
    SubExpr,
    Variable,
}

impl Mode {
    /// The delimiter that pushed this mode.
    pub fn opener(&self) -> &'static str {
        match self {
            Mode::Plain => "",
            Mode::Ternary => "#{",
            Mode::SubExpr => "(",
            Mode::Variable => "${",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Plain => "plain text",
            Mode::Ternary => "conditional block",
            Mode::SubExpr => "sub-expression",
            Mode::Variable => "variable reference",
        })
    }
}

// Word forms only match at a word boundary; see `keyword_len`.
const LOGIC_KEYWORDS: &[&str] = &["and", "or", "AND", "OR"];
const LOGIC_SYMBOLS: &[&str] = &["&&", "||"];
// Two-character operators first so `>=` is never split into `>` `=`.
const COMPARISON_SYMBOLS: &[&str] = &["==", "!=", ">=", "<=", ">", "<"];
const COMPARISON_KEYWORDS: &[&str] = &["IN"];
const BOOLEAN_KEYWORDS: &[&str] = &["true", "false", "TRUE", "FALSE"];

/// Outcome of a matched rule.
enum Lexed<'a> {
    Token(Token<'a>),
    Skipped,
}

#[derive(Clone)]
pub struct Tokenizer<'a> {
    input: &'a str,
    cursor: usize,
    line: u32,
    column: u32,
    /// Pushed modes with the span of the delimiter that opened each.
    modes: Vec<(Mode, Span)>,
    finished: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            cursor: 0,
            line: 1,
            column: 1,
            modes: Vec::new(),
            finished: false,
        }
    }

    /// The mode on top of the stack.
    pub fn mode(&self) -> Mode {
        self.modes.last().map_or(Mode::Plain, |(mode, _)| *mode)
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.cursor..]
    }

    fn span_at(&self, len: usize) -> Span {
        Span::new(self.cursor, self.cursor + len, self.line, self.column)
    }

    fn advance(&mut self, n: usize) {
        for c in self.input[self.cursor..self.cursor + n].chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.cursor += n;
    }

    /// Produce the next token. Returns `None` once `Eof` or an error has
    /// been yielded.
    pub fn next_token(&mut self) -> Option<Result<Token<'a>, ParseError>> {
        if self.finished {
            return None;
        }

        loop {
            if self.remaining().is_empty() {
                self.finished = true;
                return Some(match self.modes.last() {
                    Some(&(mode, opener)) => Err(ParseError::lexical(
                        ErrorKind::UnclosedBlock {
                            delimiter: mode.opener(),
                        },
                        opener,
                        mode,
                    )),
                    None => Ok(Token {
                        kind: TokenKind::Eof,
                        text: "",
                        span: self.span_at(0),
                    }),
                });
            }

            let mode = self.mode();
            let matched = match mode {
                Mode::Plain => Some(self.plain_rules()),
                Mode::Ternary => self.ternary_rules(),
                Mode::SubExpr => self.expr_rules().or_else(|| self.sub_expr_rules()),
                Mode::Variable => self.variable_rules(),
            };

            match matched {
                Some(Lexed::Token(token)) => return Some(Ok(token)),
                Some(Lexed::Skipped) => continue,
                None => {
                    self.finished = true;
                    return Some(Err(self.no_match(mode)));
                }
            }
        }
    }

    fn no_match(&self, mode: Mode) -> ParseError {
        // `remaining()` is non-empty here, checked by the caller.
        let c = self.remaining().chars().next().unwrap_or_default();
        let kind = if quoted_len(self.remaining()).is_none() && (c == '"' || c == '\'') {
            ErrorKind::UnterminatedString
        } else {
            ErrorKind::UnexpectedCharacter(c)
        };
        ParseError::lexical(kind, self.span_at(c.len_utf8()), mode)
    }

    fn emit(&mut self, kind: TokenKind, len: usize) -> Lexed<'a> {
        let span = self.span_at(len);
        let text = &self.input[self.cursor..self.cursor + len];
        self.advance(len);
        Lexed::Token(Token { kind, text, span })
    }

    fn open(&mut self, kind: TokenKind, len: usize, mode: Mode) -> Lexed<'a> {
        let span = self.span_at(len);
        trace!(%mode, offset = span.start, "push lexer mode");
        self.modes.push((mode, span));
        self.emit(kind, len)
    }

    fn close(&mut self, kind: TokenKind) -> Lexed<'a> {
        if let Some((mode, _)) = self.modes.pop() {
            trace!(%mode, offset = self.cursor, "pop lexer mode");
        }
        self.emit(kind, 1)
    }

    fn plain_rules(&mut self) -> Lexed<'a> {
        let rest = self.remaining();
        if rest.starts_with("#{") {
            return self.open(TokenKind::TernaryOpen, 2, Mode::Ternary);
        }
        if rest.starts_with("${") {
            return self.open(TokenKind::VariableOpen, 2, Mode::Variable);
        }
        // Longest run up to the next introducer; a lone `$` or `#` stays in it.
        let len = rest
            .char_indices()
            .skip(1)
            .map(|(i, _)| i)
            .find(|&i| opens_block(&rest[i..]))
            .unwrap_or(rest.len());
        self.emit(TokenKind::Literal, len)
    }

    fn ternary_rules(&mut self) -> Option<Lexed<'a>> {
        match self.remaining().as_bytes().first()? {
            b'?' => Some(self.emit(TokenKind::TernaryThen, 1)),
            b':' => Some(self.emit(TokenKind::TernaryElse, 1)),
            b'}' => Some(self.close(TokenKind::BlockClose)),
            _ => self.expr_rules(),
        }
    }

    fn sub_expr_rules(&mut self) -> Option<Lexed<'a>> {
        if self.remaining().starts_with(')') {
            return Some(self.close(TokenKind::SubExprClose));
        }
        None
    }

    fn variable_rules(&mut self) -> Option<Lexed<'a>> {
        if self.remaining().starts_with('}') {
            return Some(self.close(TokenKind::BlockClose));
        }
        self.common_rules()
    }

    fn expr_rules(&mut self) -> Option<Lexed<'a>> {
        let rest = self.remaining();
        if let Some(len) = symbol_len(rest, LOGIC_SYMBOLS).or_else(|| keyword_len(rest, LOGIC_KEYWORDS))
        {
            return Some(self.emit(TokenKind::LogicOperator, len));
        }
        if rest.starts_with('(') {
            return Some(self.open(TokenKind::SubExprOpen, 1, Mode::SubExpr));
        }
        self.condition_rules()
    }

    fn condition_rules(&mut self) -> Option<Lexed<'a>> {
        let rest = self.remaining();
        if rest.starts_with("${") {
            return Some(self.open(TokenKind::VariableOpen, 2, Mode::Variable));
        }
        if let Some(len) =
            symbol_len(rest, COMPARISON_SYMBOLS).or_else(|| keyword_len(rest, COMPARISON_KEYWORDS))
        {
            return Some(self.emit(TokenKind::ComparisonOperator, len));
        }
        if let Some(len) = quoted_len(rest) {
            let span = self.span_at(len);
            let text = &rest[1..len - 1];
            self.advance(len);
            return Some(Lexed::Token(Token {
                kind: TokenKind::String,
                text,
                span,
            }));
        }
        match rest.as_bytes().first()? {
            b'[' => Some(self.emit(TokenKind::ArrayOpen, 1)),
            b']' => Some(self.emit(TokenKind::ArrayClose, 1)),
            b',' => Some(self.emit(TokenKind::Comma, 1)),
            _ => self.common_rules(),
        }
    }

    fn common_rules(&mut self) -> Option<Lexed<'a>> {
        let rest = self.remaining();
        let whitespace = rest.len() - rest.trim_start().len();
        if whitespace > 0 {
            self.advance(whitespace);
            return Some(Lexed::Skipped);
        }
        if let Some(len) = number_len(rest) {
            return Some(self.emit(TokenKind::Number, len));
        }
        if let Some(len) = keyword_len(rest, BOOLEAN_KEYWORDS) {
            return Some(self.emit(TokenKind::Boolean, len));
        }
        if let Some(len) = ident_len(rest) {
            return Some(self.emit(TokenKind::Ident, len));
        }
        None
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Result<Token<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

/// Lex `input` into a token sequence terminated by [`TokenKind::Eof`].
pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>, ParseError> {
    Tokenizer::new(input).collect()
}

fn opens_block(rest: &str) -> bool {
    rest.starts_with("#{") || rest.starts_with("${")
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

fn symbol_len(rest: &str, symbols: &[&str]) -> Option<usize> {
    symbols
        .iter()
        .find(|symbol| rest.starts_with(**symbol))
        .map(|symbol| symbol.len())
}

fn keyword_len(rest: &str, keywords: &[&str]) -> Option<usize> {
    keywords
        .iter()
        .find(|keyword| {
            rest.starts_with(**keyword) && !rest[keyword.len()..].starts_with(is_ident_continue)
        })
        .map(|keyword| keyword.len())
}

fn quoted_len(rest: &str) -> Option<usize> {
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    rest[1..].find(quote).map(|end| end + 2)
}

/// `(?:\d*\.)?\d+`: no sign, no exponent.
fn number_len(rest: &str) -> Option<usize> {
    let bytes = rest.as_bytes();
    let int = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
    if bytes.get(int) == Some(&b'.') {
        let frac = bytes[int + 1..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if frac > 0 {
            return Some(int + 1 + frac);
        }
    }
    (int > 0).then_some(int)
}

/// `[A-Za-z][A-Za-z0-9_.]*`
fn ident_len(rest: &str) -> Option<usize> {
    if !rest.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return None;
    }
    Some(
        rest.find(|c: char| !is_ident_continue(c))
            .unwrap_or(rest.len()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input)
            .expect("should lex")
            .iter()
            .map(|t| t.kind)
            .collect()
    }

    fn texts(input: &str) -> Vec<&str> {
        tokenize(input)
            .expect("should lex")
            .into_iter()
            .map(|t| t.text)
            .collect()
    }

    #[test]
    fn plain_text_is_one_literal() {
        let tokens = tokenize("some value 5 (a == b) ? x : y").unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].kind, TokenKind::Literal);
        assert_eq!(tokens[0].text, "some value 5 (a == b) ? x : y");
        assert_eq!(tokens[1].kind, TokenKind::Eof);
    }

    #[test]
    fn lone_dollar_and_hash_stay_in_literal() {
        let tokens = tokenize("cost $5 #1 and $${x}").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Literal);
        assert_eq!(tokens[0].text, "cost $5 #1 and $");
        assert_eq!(tokens[1].kind, TokenKind::VariableOpen);
        assert_eq!(tokens[2].text, "x");
    }

    #[test]
    fn variable_reference() {
        use TokenKind::*;
        assert_eq!(
            kinds("${some.variable_1}"),
            vec![VariableOpen, Ident, BlockClose, Eof]
        );
        assert_eq!(texts("${some.variable_1}")[1], "some.variable_1");
    }

    #[test]
    fn ternary_tokens() {
        use TokenKind::*;
        assert_eq!(
            kinds(r#"#{ ${a} >= 5 && (${b} IN [1, 'x']) ? "yes" : false }"#),
            vec![
                TernaryOpen,
                VariableOpen,
                Ident,
                BlockClose,
                ComparisonOperator,
                Number,
                LogicOperator,
                SubExprOpen,
                VariableOpen,
                Ident,
                BlockClose,
                ComparisonOperator,
                ArrayOpen,
                Number,
                Comma,
                String,
                ArrayClose,
                SubExprClose,
                TernaryThen,
                String,
                TernaryElse,
                Boolean,
                BlockClose,
                Eof,
            ]
        );
    }

    #[test]
    fn longest_comparison_operator_wins() {
        let tokens = tokenize("#{ 1 >= 2 <= 3 != 4 }").unwrap();
        let ops: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::ComparisonOperator)
            .map(|t| t.text)
            .collect();
        assert_eq!(ops, vec![">=", "<=", "!="]);
    }

    #[test]
    fn operators_are_text_outside_blocks() {
        let tokens = tokenize("a ? b : c }").unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].kind, TokenKind::Literal);
    }

    #[test]
    fn string_text_excludes_quotes_but_span_covers_them() {
        let tokens = tokenize(r#"#{ 'it"s' }"#).unwrap();
        let string = tokens[1];
        assert_eq!(string.kind, TokenKind::String);
        assert_eq!(string.text, "it\"s");
        assert_eq!(string.span.start, 3);
        assert_eq!(string.span.len(), 6);
    }

    #[test]
    fn numbers_have_no_sign_or_exponent() {
        assert_eq!(texts("#{ 1.5 .25 7 }")[1..4], ["1.5", ".25", "7"]);
        let err = tokenize("#{ -1 }").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnexpectedCharacter('-'));
        assert_eq!(err.span.start, 3);
    }

    #[test]
    fn keywords_need_a_word_boundary() {
        use TokenKind::*;
        assert_eq!(kinds("${trueish}"), vec![VariableOpen, Ident, BlockClose, Eof]);
        assert_eq!(kinds("${TRUE}"), vec![VariableOpen, Boolean, BlockClose, Eof]);
        assert_eq!(kinds("#{ order }")[1], Ident);
        assert_eq!(kinds("#{ or }")[1], LogicOperator);
        assert_eq!(kinds("#{ INDEX }")[1], Ident);
    }

    #[test]
    fn mixed_case_keywords_are_not_recognized() {
        assert_eq!(kinds("#{ And }")[1], TokenKind::Ident);
        assert_eq!(kinds("#{ True }")[1], TokenKind::Ident);
    }

    #[test]
    fn unclosed_blocks_report_the_opener() {
        let err = tokenize("abc ${unclosed").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnclosedBlock { delimiter: "${" });
        assert_eq!(err.span.start, 4);
        assert!(err.is_lexical());

        let err = tokenize("#{ (${a} ? b : c }").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnexpectedCharacter('?'));

        let err = tokenize("#{ (${a}").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnclosedBlock { delimiter: "(" });
        assert_eq!(err.span.start, 3);
    }

    #[test]
    fn unterminated_string() {
        let err = tokenize("#{ \"abc }").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnterminatedString);
        assert_eq!(err.span.start, 3);
    }

    #[test]
    fn quote_without_string_rule_is_unexpected() {
        let err = tokenize("${\"name\"}").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnexpectedCharacter('"'));
        assert_eq!(err.context, crate::error::Context::Lex(Mode::Variable));
        assert_eq!(err.span.start, 2);
    }

    #[test]
    fn eof_span_is_empty() {
        let tokens = tokenize("${a}").unwrap();
        let eof = tokens[tokens.len() - 1];
        assert_eq!(eof.kind, TokenKind::Eof);
        assert!(eof.span.is_empty());
        assert!(eof.span.contains(4));
    }

    #[test]
    fn tracks_lines_and_columns() {
        let tokens = tokenize("line one\n  #{ ${x} ? 1 : 2 }").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::TernaryOpen);
        assert_eq!((tokens[1].span.line, tokens[1].span.column), (2, 3));
        let ident = tokens[3];
        assert_eq!((ident.span.line, ident.span.column), (2, 8));
    }

    #[test]
    fn stops_after_first_error() {
        let mut tokenizer = Tokenizer::new("${ @ }");
        assert!(matches!(tokenizer.next_token(), Some(Ok(_))));
        assert!(matches!(tokenizer.next_token(), Some(Err(_))));
        assert!(tokenizer.next_token().is_none());
    }
}
