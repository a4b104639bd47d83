//! Numeric extensions

use crate::executor::errors::{ErrorKind, LangError, LangResult};
use crate::executor::types::Val;

fn number(name: &str, value: &Val) -> LangResult<f64> {
    value.as_f64().ok_or_else(|| {
        LangError::invalid_type(format!(
            "{} expects a number, got {}",
            name,
            value.type_name()
        ))
    })
}

/// Arguments of min/max: either the values themselves or a single list of them
fn operands(args: &[Val]) -> &[Val] {
    match args {
        [Val::List(items)] => items,
        _ => args,
    }
}

pub fn abs(args: &[Val]) -> LangResult<Val> {
    match &args[0] {
        Val::Int(i) => i.checked_abs().map(Val::Int).ok_or_else(|| {
            LangError::new(ErrorKind::ArithmeticOverflow, "integer overflow in abs")
        }),
        other => Ok(Val::Float(number("abs", other)?.abs())),
    }
}

/// round(x) gives a whole number, round(x, digits) a number with that many decimals
pub fn round(args: &[Val]) -> LangResult<Val> {
    let value = number("round", &args[0])?;
    match args.get(1) {
        None => match &args[0] {
            Val::Int(i) => Ok(Val::Int(*i)),
            _ => {
                let rounded = value.round();
                if rounded.abs() < i64::MAX as f64 {
                    Ok(Val::Int(rounded as i64))
                } else {
                    Ok(Val::Float(rounded))
                }
            }
        },
        Some(Val::Int(digits)) if (0..=15).contains(digits) => {
            let factor = 10f64.powi(*digits as i32);
            Ok(Val::Float((value * factor).round() / factor))
        }
        Some(other) => Err(LangError::invalid_type(format!(
            "round expects a number of digits between 0 and 15, got {}",
            other
        ))),
    }
}

fn extreme(name: &str, args: &[Val], pick_left: fn(f64, f64) -> bool) -> LangResult<Val> {
    let values = operands(args);
    let Some(first) = values.first() else {
        return Err(LangError::invalid_type(format!(
            "{} of an empty list",
            name
        )));
    };
    let mut best = first;
    let mut best_num = number(name, first)?;
    for value in &values[1..] {
        let n = number(name, value)?;
        if pick_left(n, best_num) {
            best = value;
            best_num = n;
        }
    }
    Ok(best.clone())
}

pub fn min(args: &[Val]) -> LangResult<Val> {
    extreme("min", args, |a, b| a < b)
}

pub fn max(args: &[Val]) -> LangResult<Val> {
    extreme("max", args, |a, b| a > b)
}

pub fn pi(_args: &[Val]) -> LangResult<Val> {
    Ok(Val::Float(std::f64::consts::PI))
}
