//! Operator implementations
//!
//! Binary operators dispatch on the type of their left operand. Integer arithmetic is checked;
//! an integer division that is not exact produces a number (float).

use std::cmp::Ordering;

use super::errors::{ErrorKind, LangError, LangResult};
use super::types::{Operator, Val};

fn mismatch(op: Operator, left: &Val, right: &Val) -> LangError {
    LangError::invalid_type(format!(
        "cannot apply '{}' to {} and {}",
        op,
        left.type_name(),
        right.type_name()
    ))
}

fn overflow(op: Operator) -> LangError {
    LangError::new(
        ErrorKind::ArithmeticOverflow,
        format!("arithmetic overflow in '{}'", op),
    )
}

/// Float result, rejecting overflow to infinity
fn float(op: Operator, value: f64) -> LangResult<Val> {
    if value.is_infinite() {
        Err(overflow(op))
    } else {
        Ok(Val::Float(value))
    }
}

/* ===================== Binary ===================== */

pub fn binary(op: Operator, left: Val, right: Val) -> LangResult<Val> {
    let left = left.unboxed();
    let right = right.unboxed();
    match op {
        Operator::Add => add(left, right),
        Operator::Sub | Operator::Mul => arithmetic(op, &left, &right),
        Operator::Div => divide(&left, &right),
        Operator::Pow => power(&left, &right),
        Operator::Eq => Ok(Val::Bool(left == right)),
        Operator::Ne => Ok(Val::Bool(left != right)),
        Operator::Gt | Operator::Lt | Operator::Ge | Operator::Le => compare(op, &left, &right),
        Operator::And | Operator::Or => match (&left, &right) {
            (Val::Bool(a), Val::Bool(b)) => Ok(Val::Bool(if op == Operator::And {
                *a && *b
            } else {
                *a || *b
            })),
            _ => Err(mismatch(op, &left, &right)),
        },
        _ => Err(LangError::internal(format!("'{}' is not a binary operator", op))),
    }
}

fn add(left: Val, right: Val) -> LangResult<Val> {
    match (left, right) {
        (Val::Str(mut s), right) => {
            s.push_str(&right.to_string());
            Ok(Val::Str(s))
        }
        (Val::List(mut a), Val::List(b)) => {
            a.extend(b);
            Ok(Val::List(a))
        }
        (left, right) => arithmetic(Operator::Add, &left, &right),
    }
}

fn arithmetic(op: Operator, left: &Val, right: &Val) -> LangResult<Val> {
    match (left, right) {
        (Val::Int(a), Val::Int(b)) => {
            let result = match op {
                Operator::Add => a.checked_add(*b),
                Operator::Sub => a.checked_sub(*b),
                _ => a.checked_mul(*b),
            };
            result.map(Val::Int).ok_or_else(|| overflow(op))
        }
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => float(
                op,
                match op {
                    Operator::Add => a + b,
                    Operator::Sub => a - b,
                    _ => a * b,
                },
            ),
            _ => Err(mismatch(op, left, right)),
        },
    }
}

fn divide(left: &Val, right: &Val) -> LangResult<Val> {
    let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
        return Err(mismatch(Operator::Div, left, right));
    };
    if b == 0.0 {
        return Err(LangError::new(ErrorKind::DivisionByZero, "division by zero"));
    }
    match (left, right) {
        (Val::Int(x), Val::Int(y)) => match x.checked_rem(*y) {
            None => Err(overflow(Operator::Div)),
            Some(0) => x
                .checked_div(*y)
                .map(Val::Int)
                .ok_or_else(|| overflow(Operator::Div)),
            Some(_) => float(Operator::Div, a / b),
        },
        _ => float(Operator::Div, a / b),
    }
}

fn power(left: &Val, right: &Val) -> LangResult<Val> {
    match (left, right) {
        (Val::Int(base), Val::Int(exp)) if *exp >= 0 => {
            let exp = u32::try_from(*exp).map_err(|_| overflow(Operator::Pow))?;
            base.checked_pow(exp)
                .map(Val::Int)
                .ok_or_else(|| overflow(Operator::Pow))
        }
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => float(Operator::Pow, a.powf(b)),
            _ => Err(mismatch(Operator::Pow, left, right)),
        },
    }
}

fn compare(op: Operator, left: &Val, right: &Val) -> LangResult<Val> {
    let ordering = match (left, right) {
        (Val::Int(a), Val::Int(b)) => Some(a.cmp(b)),
        (Val::Str(a), Val::Str(b)) => Some(a.cmp(b)),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => return Err(mismatch(op, left, right)),
        },
    };
    // NaN compares false with everything
    let Some(ordering) = ordering else {
        return Ok(Val::Bool(false));
    };
    let result = match op {
        Operator::Gt => ordering == Ordering::Greater,
        Operator::Lt => ordering == Ordering::Less,
        Operator::Ge => ordering != Ordering::Less,
        _ => ordering != Ordering::Greater,
    };
    Ok(Val::Bool(result))
}

/* ===================== Unary ===================== */

pub fn unary(op: Operator, operand: Val) -> LangResult<Val> {
    let operand = operand.unboxed();
    match (op, &operand) {
        (Operator::Not, Val::Bool(b)) => Ok(Val::Bool(!b)),
        (Operator::Pos, Val::Int(_) | Val::Float(_)) => Ok(operand),
        (Operator::Neg, Val::Int(i)) => i.checked_neg().map(Val::Int).ok_or_else(|| overflow(op)),
        (Operator::Neg, Val::Float(x)) => Ok(Val::Float(-x)),
        _ => Err(LangError::invalid_type(format!(
            "cannot apply '{}' to {}",
            op,
            operand.type_name()
        ))),
    }
}
