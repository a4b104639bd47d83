//! Abstract Syntax Tree node types
//!
//! These are the objects handed over by the parser layer: ordered statement lists (`Body`)
//! and raw, not-yet-compiled expressions. Expressions compile lazily, exactly once, into a
//! postfix stream shared by every thread that evaluates them.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::compiler::{self, CompiledExpr};
use crate::executor::errors::{LangError, LangResult, SourceLocation};
use crate::parser;

/* ===================== Operators ===================== */

/// Operator tags produced by the compiler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    /// Unary plus
    Pos,
    /// Unary minus
    Neg,
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
    Not,
    And,
    Or,
    /// Attribute access
    Dot,
    Wait,
    Background,
}

impl Operator {
    /// Binding strength, higher binds tighter
    pub fn precedence(self) -> i8 {
        match self {
            Operator::Dot | Operator::Pow | Operator::Wait => 7,
            Operator::Pos | Operator::Neg => 6,
            Operator::Mul | Operator::Div => 5,
            Operator::Add | Operator::Sub => 4,
            Operator::Gt
            | Operator::Lt
            | Operator::Ge
            | Operator::Le
            | Operator::Eq
            | Operator::Ne => 3,
            Operator::Not => 2,
            Operator::And => 1,
            Operator::Or => 0,
            Operator::Background => -1,
        }
    }

    /// Prefix operators take a single operand to their right
    pub fn is_prefix(self) -> bool {
        matches!(
            self,
            Operator::Pos | Operator::Neg | Operator::Not | Operator::Wait | Operator::Background
        )
    }

    pub fn is_right_assoc(self) -> bool {
        matches!(self, Operator::Pow)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Add | Operator::Pos => "+",
            Operator::Sub | Operator::Neg => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Pow => "^",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Not => "not",
            Operator::And => "and",
            Operator::Or => "or",
            Operator::Dot => ".",
            Operator::Wait => "wait",
            Operator::Background => "in background",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/* ===================== Expressions ===================== */

/// A raw expression: tokens from the lexer plus its location, compiled on first use
#[derive(Debug, Clone)]
pub struct Expression {
    tokens: Vec<String>,
    location: SourceLocation,
    compiled: OnceLock<LangResult<Arc<CompiledExpr>>>,
}

impl Expression {
    pub fn new(tokens: Vec<String>, location: SourceLocation) -> Self {
        Self {
            tokens,
            location,
            compiled: OnceLock::new(),
        }
    }

    /// Split expression text into raw tokens and wrap it (line 0, no file)
    pub fn parse(text: &str) -> Result<Self, parser::ParseError> {
        let tokens = parser::split_tokens(text)?;
        Ok(Self::new(tokens, SourceLocation::new("", 0, text.trim())))
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    pub fn set_file(&mut self, file: &str) {
        self.location.file = file.to_string();
    }

    /// The postfix form, compiled exactly once
    pub fn compiled(&self) -> LangResult<Arc<CompiledExpr>> {
        self.compiled
            .get_or_init(|| compiler::compile(&self.tokens, &self.location).map(Arc::new))
            .clone()
    }
}

/// Wire form of an expression: plain text, a token list, or either with a line number
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ExpressionRepr {
    Text(String),
    Tokens(Vec<String>),
    Located {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tokens: Option<Vec<String>>,
        #[serde(default)]
        line: usize,
    },
}

impl TryFrom<ExpressionRepr> for Expression {
    type Error = parser::ParseError;

    fn try_from(repr: ExpressionRepr) -> Result<Self, Self::Error> {
        match repr {
            ExpressionRepr::Text(text) => Expression::parse(&text),
            ExpressionRepr::Tokens(tokens) => {
                let text = tokens.join(" ");
                Ok(Expression::new(tokens, SourceLocation::new("", 0, text)))
            }
            ExpressionRepr::Located { text, tokens, line } => {
                let mut expr = match (tokens, text) {
                    (Some(tokens), text) => {
                        let text = text.unwrap_or_else(|| tokens.join(" "));
                        Expression::new(tokens, SourceLocation::new("", 0, text))
                    }
                    (None, Some(text)) => Expression::parse(&text)?,
                    (None, None) => {
                        return Err(parser::ParseError::new(
                            "expression needs either 'text' or 'tokens'",
                            line,
                            0,
                        ))
                    }
                };
                expr.location.line = line;
                Ok(expr)
            }
        }
    }
}

impl From<Expression> for ExpressionRepr {
    fn from(expr: Expression) -> Self {
        ExpressionRepr::Located {
            text: Some(expr.location.text),
            tokens: Some(expr.tokens),
            line: expr.location.line,
        }
    }
}

impl Serialize for Expression {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ExpressionRepr::from(self.clone()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = ExpressionRepr::deserialize(deserializer)?;
        Expression::try_from(repr).map_err(serde::de::Error::custom)
    }
}

/* ===================== Statements ===================== */

/// Ordered statement list, shared between frames without copying
pub type Body = Arc<Vec<Statement>>;

/// Target of a reassignment: a bare name or a single-level field (`name.field`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssignTarget {
    pub name: String,
    pub field: Option<String>,
}

impl TryFrom<String> for AssignTarget {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        let mut parts = raw.split('.').map(str::trim);
        let name = parts.next().unwrap_or_default().to_string();
        let field = parts.next().map(str::to_string);
        if name.is_empty() || field.as_deref() == Some("") || parts.next().is_some() {
            return Err(format!(
                "assignment target '{}' must be a name or name.field",
                raw
            ));
        }
        Ok(AssignTarget { name, field })
    }
}

impl From<AssignTarget> for String {
    fn from(target: AssignTarget) -> Self {
        match target.field {
            Some(field) => format!("{}.{}", target.name, field),
            None => target.name,
        }
    }
}

/// One `if` / `else when` arm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub test: Expression,
    pub body: Body,
}

/// Exception handler of a context block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handler {
    /// Class name the handler catches
    pub class: String,
    /// Name the caught exception object is bound to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<String>,
    pub body: Body,
}

/// Lock owned by one mutual-exclusion block
#[derive(Debug, Default)]
pub struct BlockLock {
    held: Mutex<bool>,
}

impl BlockLock {
    /// Mark the lock held if it is free
    pub fn try_acquire(&self) -> bool {
        let mut held = self.held.lock();
        if *held {
            false
        } else {
            *held = true;
            true
        }
    }

    pub fn release(&self) {
        *self.held.lock() = false;
    }

    pub fn is_held(&self) -> bool {
        *self.held.lock()
    }
}

/// Statement AST node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Statement {
    /// First assignment: introduces a name in the innermost scope
    Declare { name: String, value: Expression },
    Assign {
        target: AssignTarget,
        value: Expression,
    },
    /// `if` with optional `else when` arms (in order) and optional `else`
    If {
        branches: Vec<Branch>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        otherwise: Option<Body>,
    },
    /// Counted loop over an inclusive integer range
    Repeat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        var: Option<String>,
        from: Expression,
        to: Expression,
        body: Body,
    },
    While { test: Expression, body: Body },
    /// Exception context
    Try { body: Body, handlers: Vec<Handler> },
    Throw { value: Expression },
    /// Mutual-exclusion block
    Exclusive {
        body: Body,
        #[serde(skip)]
        lock: Arc<BlockLock>,
    },
    Print { value: Expression },
    Return {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Expression>,
    },
    Break,
    Continue,
    Expr { expr: Expression },
}

impl Statement {
    /// Visit every expression of this statement and its nested bodies
    pub fn for_each_expression(&self, visit: &mut dyn FnMut(&Expression)) {
        match self {
            Statement::Declare { value, .. }
            | Statement::Assign { value, .. }
            | Statement::Throw { value }
            | Statement::Print { value } => visit(value),
            Statement::Expr { expr } => visit(expr),
            Statement::Return { value } => {
                if let Some(value) = value {
                    visit(value);
                }
            }
            Statement::If {
                branches,
                otherwise,
            } => {
                for branch in branches {
                    visit(&branch.test);
                    for_each_in_body(&branch.body, visit);
                }
                if let Some(body) = otherwise {
                    for_each_in_body(body, visit);
                }
            }
            Statement::Repeat { from, to, body, .. } => {
                visit(from);
                visit(to);
                for_each_in_body(body, visit);
            }
            Statement::While { test, body } => {
                visit(test);
                for_each_in_body(body, visit);
            }
            Statement::Try { body, handlers } => {
                for_each_in_body(body, visit);
                for handler in handlers {
                    for_each_in_body(&handler.body, visit);
                }
            }
            Statement::Exclusive { body, .. } => for_each_in_body(body, visit),
            Statement::Break | Statement::Continue => {}
        }
    }

    /// Mutable counterpart of [`Statement::for_each_expression`]
    pub fn for_each_expression_mut(&mut self, visit: &mut dyn FnMut(&mut Expression)) {
        match self {
            Statement::Declare { value, .. }
            | Statement::Assign { value, .. }
            | Statement::Throw { value }
            | Statement::Print { value } => visit(value),
            Statement::Expr { expr } => visit(expr),
            Statement::Return { value } => {
                if let Some(value) = value {
                    visit(value);
                }
            }
            Statement::If {
                branches,
                otherwise,
            } => {
                for branch in branches {
                    visit(&mut branch.test);
                    for_each_in_body_mut(&mut branch.body, visit);
                }
                if let Some(body) = otherwise {
                    for_each_in_body_mut(body, visit);
                }
            }
            Statement::Repeat { from, to, body, .. } => {
                visit(from);
                visit(to);
                for_each_in_body_mut(body, visit);
            }
            Statement::While { test, body } => {
                visit(test);
                for_each_in_body_mut(body, visit);
            }
            Statement::Try { body, handlers } => {
                for_each_in_body_mut(body, visit);
                for handler in handlers {
                    for_each_in_body_mut(&mut handler.body, visit);
                }
            }
            Statement::Exclusive { body, .. } => for_each_in_body_mut(body, visit),
            Statement::Break | Statement::Continue => {}
        }
    }
}

pub fn for_each_in_body(body: &Body, visit: &mut dyn FnMut(&Expression)) {
    for stmt in body.iter() {
        stmt.for_each_expression(visit);
    }
}

pub fn for_each_in_body_mut(body: &mut Body, visit: &mut dyn FnMut(&mut Expression)) {
    for stmt in Arc::make_mut(body).iter_mut() {
        stmt.for_each_expression_mut(visit);
    }
}

/// Compile every expression of a body, collecting all diagnostics
pub fn check_body(body: &Body) -> Vec<LangError> {
    let mut errors = Vec::new();
    for_each_in_body(body, &mut |expr| {
        if let Err(err) = expr.compiled() {
            errors.push(err);
        }
    });
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_from_json() {
        let json = r#"{
            "t": "Repeat",
            "var": "i",
            "from": "1",
            "to": {"text": "n * 2", "line": 7},
            "body": [{"t": "Assign", "target": "total", "value": "total + i"}]
        }"#;
        let stmt: Statement = serde_json::from_str(json).unwrap();
        let Statement::Repeat { var, to, body, .. } = stmt else {
            unreachable!("Expected Repeat, got {:?}", stmt);
        };
        assert_eq!(var.as_deref(), Some("i"));
        assert_eq!(to.tokens(), ["n", "*", "2"]);
        assert_eq!(to.location().line, 7);
        assert!(matches!(&body[0], Statement::Assign { target, .. } if target.name == "total"));
    }

    #[test]
    fn test_assign_target_forms() {
        let target = AssignTarget::try_from("case.fine".to_string()).unwrap();
        assert_eq!(target.name, "case");
        assert_eq!(target.field.as_deref(), Some("fine"));
        assert!(AssignTarget::try_from("a.b.c".to_string()).is_err());
        assert!(AssignTarget::try_from(".b".to_string()).is_err());
    }

    #[test]
    fn test_block_lock() {
        let lock = BlockLock::default();
        assert!(lock.try_acquire());
        assert!(!lock.try_acquire());
        lock.release();
        assert!(!lock.is_held());
    }

    #[test]
    fn test_expression_compiles_once() {
        let expr = Expression::parse("1 + 2").unwrap();
        let first = expr.compiled().unwrap();
        let second = expr.compiled().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
