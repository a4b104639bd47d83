//! Infix to postfix expression compiler
//!
//! A shunting-yard variant over the raw token stream of one expression. Compilation runs in
//! three passes:
//!
//! 1. classify: raw strings become typed tokens (string literals are glued back together,
//!    `+`/`-` are resolved to their unary or binary form, `in background` is paired up)
//! 2. validate: bracket balance, operator adjacency, trailing operators
//! 3. convert: the actual shunting-yard pass producing a flat [`Rpn`] stream
//!
//! The output needs no further lookahead: calls, method invocations and background scheduling
//! are all explicit items in the stream.

use std::num::IntErrorKind;
use tracing::debug;

use crate::executor::errors::{LangError, LangResult, SourceLocation};
use crate::executor::types::{Operator, Val};

#[cfg(test)]
mod tests;

/* ===================== Output ===================== */

/// One postfix item
#[derive(Debug, Clone, PartialEq)]
pub enum Rpn {
    /// Literal value
    Push(Val),
    /// Variable or registry lookup
    Load(String),
    /// Field name consumed by the following `Op(Dot)`
    Attr(String),
    /// Marks where the arguments of the next call begin
    ArgsStart,
    /// Call of a named callable with the arguments back to the last `ArgsStart`
    Call { name: String, deferred: bool },
    /// Call of the value just below the last `ArgsStart` (method calls)
    Invoke { deferred: bool },
    Op(Operator),
}

/// A compiled expression, shared by every evaluation of its source expression
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    pub items: Vec<Rpn>,
    pub location: SourceLocation,
}

impl CompiledExpr {
    /// Human-readable postfix form, used by `jurist check --verbose` and the tests
    pub fn postfix(&self) -> String {
        self.items
            .iter()
            .map(|item| match item {
                Rpn::Push(Val::Str(s)) => format!("{:?}", s),
                Rpn::Push(v) => v.to_string(),
                Rpn::Load(name) => name.clone(),
                Rpn::Attr(name) => format!(".{}", name),
                Rpn::ArgsStart => "[".to_string(),
                Rpn::Call { name, deferred } => {
                    format!("{}(){}", name, if *deferred { "&" } else { "" })
                }
                Rpn::Invoke { deferred } => format!("](){}", if *deferred { "&" } else { "" }),
                Rpn::Op(op) => op.symbol().to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/* ===================== Public API ===================== */

/// Compile one expression's raw tokens into postfix form
pub fn compile(tokens: &[String], location: &SourceLocation) -> LangResult<CompiledExpr> {
    let fail = |message: String| {
        LangError::syntax(format!("{} in expression '{}'", message, location.text)).at(location)
    };

    let classified = classify(tokens).map_err(fail)?;
    validate(&classified).map_err(fail)?;
    let items = convert(&classified).map_err(fail)?;

    debug!(expr = %location.text, items = items.len(), "compiled expression");
    Ok(CompiledExpr {
        items,
        location: location.clone(),
    })
}

/* ===================== Classification ===================== */

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Literal(Val),
    Ident(String),
    Open,
    Close,
    Comma,
    Dot,
    Binary(Operator),
    Prefix(Operator),
}

impl Tok {
    /// Tokens that can end an operand
    fn ends_operand(&self) -> bool {
        matches!(self, Tok::Literal(_) | Tok::Ident(_) | Tok::Close)
    }

    fn describe(&self) -> String {
        match self {
            Tok::Literal(Val::Str(s)) => format!("\"{}\"", s),
            Tok::Literal(v) => v.to_string(),
            Tok::Ident(name) => name.clone(),
            Tok::Open => "(".to_string(),
            Tok::Close => ")".to_string(),
            Tok::Comma => ",".to_string(),
            Tok::Dot => ".".to_string(),
            Tok::Binary(op) | Tok::Prefix(op) => op.symbol().to_string(),
        }
    }
}

const QUOTE: &str = "\"";

fn binary_operator(raw: &str) -> Option<Operator> {
    let op = match raw {
        "*" => Operator::Mul,
        "/" => Operator::Div,
        "^" => Operator::Pow,
        ">" => Operator::Gt,
        "<" => Operator::Lt,
        ">=" | "≥" => Operator::Ge,
        "<=" | "≤" => Operator::Le,
        "=" => Operator::Eq,
        "!=" | "≠" => Operator::Ne,
        "and" => Operator::And,
        "or" => Operator::Or,
        _ => return None,
    };
    Some(op)
}

fn is_identifier(raw: &str) -> bool {
    let mut chars = raw.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn number(raw: &str) -> Result<Val, String> {
    if raw.contains('.') {
        raw.parse::<f64>()
            .map(Val::Float)
            .map_err(|_| format!("invalid number '{}'", raw))
    } else {
        raw.parse::<i64>().map(Val::Int).map_err(|err| match err.kind() {
            IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
                format!("number '{}' is out of range", raw)
            }
            _ => format!("invalid number '{}'", raw),
        })
    }
}

fn classify(raw: &[String]) -> Result<Vec<Tok>, String> {
    let mut out: Vec<Tok> = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        let token = raw[i].as_str();
        let unary_position = match out.last() {
            None => true,
            Some(prev) => matches!(
                prev,
                Tok::Open | Tok::Comma | Tok::Binary(_) | Tok::Prefix(_)
            ),
        };

        let tok = match token {
            QUOTE => {
                let Some(close) = raw[i + 1..].iter().position(|t| t == QUOTE) else {
                    return Err("unbalanced string quote".to_string());
                };
                let text = raw[i + 1..i + 1 + close].concat();
                i += close + 1;
                Tok::Literal(Val::Str(text))
            }
            "(" => Tok::Open,
            ")" => Tok::Close,
            "," => Tok::Comma,
            "." => Tok::Dot,
            "+" if unary_position => Tok::Prefix(Operator::Pos),
            "-" if unary_position => Tok::Prefix(Operator::Neg),
            "+" => Tok::Binary(Operator::Add),
            "-" => Tok::Binary(Operator::Sub),
            "not" => Tok::Prefix(Operator::Not),
            "wait" => Tok::Prefix(Operator::Wait),
            "in" => {
                if raw.get(i + 1).map(String::as_str) != Some("background") {
                    return Err("'in' must be followed by 'background'".to_string());
                }
                i += 1;
                Tok::Prefix(Operator::Background)
            }
            "background" => {
                return Err("'background' must be preceded by 'in'".to_string());
            }
            "true" => Tok::Literal(Val::Bool(true)),
            "false" => Tok::Literal(Val::Bool(false)),
            "empty" => Tok::Literal(Val::Null),
            _ => {
                if let Some(op) = binary_operator(token) {
                    Tok::Binary(op)
                } else if token.starts_with(|c: char| c.is_ascii_digit()) {
                    Tok::Literal(number(token)?)
                } else if is_identifier(token) {
                    Tok::Ident(token.to_string())
                } else {
                    return Err(format!("unrecognized token '{}'", token));
                }
            }
        };
        out.push(tok);
        i += 1;
    }
    Ok(out)
}

/* ===================== Validation ===================== */

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{} {}", count, word)
    } else {
        format!("{} {}s", count, word)
    }
}

fn validate(tokens: &[Tok]) -> Result<(), String> {
    let Some(last) = tokens.last() else {
        return Err("empty expression".to_string());
    };

    // Bracket balance; a ')' with nothing open counts as a missing '('
    let mut depth = 0usize;
    let mut missing_open = 0usize;
    for tok in tokens {
        match tok {
            Tok::Open => depth += 1,
            Tok::Close if depth == 0 => missing_open += 1,
            Tok::Close => depth -= 1,
            _ => {}
        }
    }
    if missing_open > 0 {
        return Err(format!(
            "missing {} '('",
            plural(missing_open, "opening bracket")
        ));
    }
    if depth > 0 {
        return Err(format!("missing {} ')'", plural(depth, "closing bracket")));
    }

    if matches!(
        last,
        Tok::Binary(_) | Tok::Prefix(_) | Tok::Open | Tok::Comma | Tok::Dot
    ) {
        return Err(format!("expression ends with '{}'", last.describe()));
    }

    let mut prev: Option<&Tok> = None;
    for tok in tokens {
        let prev_ends_operand = prev.is_some_and(Tok::ends_operand);
        match tok {
            Tok::Binary(_) | Tok::Comma | Tok::Dot => {
                if !prev_ends_operand {
                    return Err(match prev {
                        None => format!("expression starts with '{}'", tok.describe()),
                        Some(p) => format!(
                            "'{}' cannot follow '{}'",
                            tok.describe(),
                            p.describe()
                        ),
                    });
                }
            }
            Tok::Prefix(_) => {
                if prev_ends_operand {
                    return Err(format!("missing operator before '{}'", tok.describe()));
                }
                if matches!(prev, Some(Tok::Dot)) {
                    return Err(format!("expected a field name after '.', found '{}'", tok.describe()));
                }
            }
            Tok::Literal(_) | Tok::Open => {
                if matches!(prev, Some(Tok::Dot)) {
                    return Err(format!(
                        "expected a field name after '.', found '{}'",
                        tok.describe()
                    ));
                }
                // `name(` is a call, anything else needs an operator in between
                let call = matches!(tok, Tok::Open) && matches!(prev, Some(Tok::Ident(_)));
                if prev_ends_operand && !call {
                    return Err(format!("missing operator before '{}'", tok.describe()));
                }
            }
            Tok::Ident(_) => {
                if prev_ends_operand {
                    return Err(format!("missing operator before '{}'", tok.describe()));
                }
            }
            Tok::Close => {
                if !prev_ends_operand && !matches!(prev, Some(Tok::Open)) {
                    let p = prev.map(Tok::describe).unwrap_or_default();
                    return Err(format!("')' cannot follow '{}'", p));
                }
            }
        }
        prev = Some(tok);
    }
    Ok(())
}

/* ===================== Shunting-yard ===================== */

#[derive(Debug)]
enum Pending {
    Op(Operator),
    /// Plain grouping bracket
    Group,
    /// `name(`
    Call(String),
    /// `.name(`
    Invoke,
}

/// Emit an operator, turning the trailing call of a background operand into its deferred form
fn emit(out: &mut Vec<Rpn>, op: Operator) -> Result<(), String> {
    if op == Operator::Background {
        match out.last_mut() {
            Some(Rpn::Call { deferred, .. }) | Some(Rpn::Invoke { deferred }) => *deferred = true,
            Some(Rpn::Load(name)) => {
                let name = std::mem::take(name);
                out.pop();
                out.push(Rpn::ArgsStart);
                out.push(Rpn::Call {
                    name,
                    deferred: true,
                });
            }
            _ => return Err("'in background' must be applied to a call".to_string()),
        }
    }
    out.push(Rpn::Op(op));
    Ok(())
}

fn convert(tokens: &[Tok]) -> Result<Vec<Rpn>, String> {
    let mut out: Vec<Rpn> = Vec::with_capacity(tokens.len());
    let mut pending: Vec<Pending> = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        match &tokens[i] {
            Tok::Literal(value) => out.push(Rpn::Push(value.clone())),

            Tok::Ident(name) => {
                if tokens.get(i + 1) == Some(&Tok::Open) {
                    out.push(Rpn::ArgsStart);
                    pending.push(Pending::Call(name.clone()));
                    i += 1;
                } else {
                    out.push(Rpn::Load(name.clone()));
                }
            }

            // Attribute segments bind tighter than every operator, so they are emitted as soon
            // as they are read
            Tok::Dot => {
                let Some(Tok::Ident(field)) = tokens.get(i + 1) else {
                    return Err("expected a field name after '.'".to_string());
                };
                out.push(Rpn::Attr(field.clone()));
                out.push(Rpn::Op(Operator::Dot));
                i += 1;
                if tokens.get(i + 1) == Some(&Tok::Open) {
                    out.push(Rpn::ArgsStart);
                    pending.push(Pending::Invoke);
                    i += 1;
                }
            }

            Tok::Open => {
                if tokens.get(i + 1) == Some(&Tok::Close) {
                    return Err("empty brackets '()'".to_string());
                }
                pending.push(Pending::Group);
            }

            Tok::Close => loop {
                match pending.pop() {
                    Some(Pending::Op(op)) => emit(&mut out, op)?,
                    Some(Pending::Group) => break,
                    Some(Pending::Call(name)) => {
                        out.push(Rpn::Call {
                            name,
                            deferred: false,
                        });
                        break;
                    }
                    Some(Pending::Invoke) => {
                        out.push(Rpn::Invoke { deferred: false });
                        break;
                    }
                    None => return Err("unbalanced ')'".to_string()),
                }
            },

            Tok::Comma => loop {
                match pending.last() {
                    Some(Pending::Op(op)) => {
                        let op = *op;
                        pending.pop();
                        emit(&mut out, op)?;
                    }
                    Some(Pending::Call(_)) | Some(Pending::Invoke) => break,
                    Some(Pending::Group) | None => {
                        return Err("',' is only allowed between call arguments".to_string())
                    }
                }
            },

            Tok::Binary(op) => {
                let op = *op;
                while let Some(Pending::Op(top)) = pending.last() {
                    let top = *top;
                    let pops = if top.is_prefix() {
                        op.precedence() <= top.precedence()
                    } else {
                        top.precedence() > op.precedence()
                            || (top.precedence() == op.precedence() && !op.is_right_assoc())
                    };
                    if !pops {
                        break;
                    }
                    pending.pop();
                    emit(&mut out, top)?;
                }
                pending.push(Pending::Op(op));
            }

            Tok::Prefix(op) => pending.push(Pending::Op(*op)),
        }
        i += 1;
    }

    while let Some(top) = pending.pop() {
        match top {
            Pending::Op(op) => emit(&mut out, op)?,
            _ => return Err("unbalanced '('".to_string()),
        }
    }
    Ok(out)
}
