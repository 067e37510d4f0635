use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A keyword that failed to normalize into a [`LogicOperator`],
/// [`ComparisonOperator`] or boolean.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown keyword '{0}'")]
pub struct UnknownKeyword(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LogicOperator {
    And,
    Or,
}

impl LogicOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicOperator::And => "AND",
            LogicOperator::Or => "OR",
        }
    }
}

impl FromStr for LogicOperator {
    type Err = UnknownKeyword;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AND" | "and" | "&&" => Ok(LogicOperator::And),
            "OR" | "or" | "||" => Ok(LogicOperator::Or),
            _ => Err(UnknownKeyword(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ComparisonOperator {
    Eq,    // ==
    NotEq, // !=
    Gt,    // >
    Ge,    // >=
    Lt,    // <
    Le,    // <=
    In,    // IN
}

impl ComparisonOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "==",
            ComparisonOperator::NotEq => "!=",
            ComparisonOperator::Gt => ">",
            ComparisonOperator::Ge => ">=",
            ComparisonOperator::Lt => "<",
            ComparisonOperator::Le => "<=",
            ComparisonOperator::In => "IN",
        }
    }
}

impl FromStr for ComparisonOperator {
    type Err = UnknownKeyword;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "==" => Ok(ComparisonOperator::Eq),
            "!=" => Ok(ComparisonOperator::NotEq),
            ">" => Ok(ComparisonOperator::Gt),
            ">=" => Ok(ComparisonOperator::Ge),
            "<" => Ok(ComparisonOperator::Lt),
            "<=" => Ok(ComparisonOperator::Le),
            "IN" => Ok(ComparisonOperator::In),
            _ => Err(UnknownKeyword(s.to_string())),
        }
    }
}

/// Normalize a boolean keyword: `true`/`TRUE` or `false`/`FALSE`.
pub fn parse_boolean(s: &str) -> Result<bool, UnknownKeyword> {
    match s {
        "true" | "TRUE" => Ok(true),
        "false" | "FALSE" => Ok(false),
        _ => Err(UnknownKeyword(s.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    Number(f64),
    String(String),
    Boolean(bool),
    Array(Vec<Value>), // never empty
}

/// A condition operand or ternary branch.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Term {
    Variable(String),
    Value(Value),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Comparison {
    pub operator: ComparisonOperator,
    pub right: Term,
}

/// `left` alone, or `left <op> right`. At most one comparison; there is
/// no chaining.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cond {
    pub left: Term,
    pub comparison: Option<Comparison>,
}

impl Cond {
    pub fn new(left: Term) -> Self {
        Self {
            left,
            comparison: None,
        }
    }

    pub fn compare(left: Term, operator: ComparisonOperator, right: Term) -> Self {
        Self {
            left,
            comparison: Some(Comparison { operator, right }),
        }
    }

    pub fn operator(&self) -> Option<ComparisonOperator> {
        self.comparison.as_ref().map(|c| c.operator)
    }

    pub fn right(&self) -> Option<&Term> {
        self.comparison.as_ref().map(|c| &c.right)
    }
}

/// Either side of a logic chain: a condition or a parenthesized expression.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operand {
    Cond(Cond),
    Sub(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LogicExpr {
    pub operator: LogicOperator,
    pub operand: Operand,
}

/// A boolean expression.
///
/// `right` is a flat, left-to-right list: `a AND b OR c` is
/// `left = a, right = [(AND, b), (OR, c)]`. The parser assigns no
/// precedence between AND and OR; only parentheses group.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Expr {
    pub left: Operand,
    pub right: Vec<LogicExpr>,
}

/// `#{ condition ? then : else }`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IfStatement {
    pub condition: Expr,
    pub then_branch: Term,
    pub else_branch: Term,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Fragment {
    Literal(String), // never empty
    Variable(String),
    If(IfStatement),
}

/// One parsed template: one or more fragments in source order.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Statement {
    pub fragments: Vec<Fragment>,
}

impl Statement {
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Every variable name referenced anywhere in the template, in source
    /// order, duplicates included.
    pub fn variables(&self) -> Vec<&str> {
        let mut names = Vec::new();
        for fragment in &self.fragments {
            match fragment {
                Fragment::Literal(_) => {}
                Fragment::Variable(name) => names.push(name.as_str()),
                Fragment::If(block) => {
                    block.condition.collect_variables(&mut names);
                    block.then_branch.collect_variables(&mut names);
                    block.else_branch.collect_variables(&mut names);
                }
            }
        }
        names
    }
}

impl Expr {
    fn collect_variables<'a>(&'a self, names: &mut Vec<&'a str>) {
        self.left.collect_variables(names);
        for logic in &self.right {
            logic.operand.collect_variables(names);
        }
    }
}

impl Operand {
    fn collect_variables<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Operand::Cond(cond) => {
                cond.left.collect_variables(names);
                if let Some(right) = cond.right() {
                    right.collect_variables(names);
                }
            }
            Operand::Sub(expr) => expr.collect_variables(names),
        }
    }
}

impl Term {
    fn collect_variables<'a>(&'a self, names: &mut Vec<&'a str>) {
        if let Term::Variable(name) = self {
            names.push(name.as_str());
        }
    }
}

// Display renders canonical template source that parses back to the same
// tree.

impl fmt::Display for LogicOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) if s.contains('"') => write!(f, "'{}'", s),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Variable(name) => write!(f, "${{{}}}", name),
            Term::Value(value) => write!(f, "{}", value),
        }
    }
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.left)?;
        if let Some(comparison) = &self.comparison {
            write!(f, " {} {}", comparison.operator, comparison.right)?;
        }
        Ok(())
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Cond(cond) => write!(f, "{}", cond),
            Operand::Sub(expr) => write!(f, "({})", expr),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.left)?;
        for logic in &self.right {
            write!(f, " {} {}", logic.operator, logic.operand)?;
        }
        Ok(())
    }
}

impl fmt::Display for IfStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{{ {} ? {} : {} }}",
            self.condition, self.then_branch, self.else_branch
        )
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fragment::Literal(text) => f.write_str(text),
            Fragment::Variable(name) => write!(f, "${{{}}}", name),
            Fragment::If(block) => write!(f, "{}", block),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for fragment in &self.fragments {
            write!(f, "{}", fragment)?;
        }
        Ok(())
    }
}
