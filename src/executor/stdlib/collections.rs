//! Text and list extensions

use crate::executor::errors::{ErrorKind, LangError, LangResult};
use crate::executor::types::Val;

pub fn length(args: &[Val]) -> LangResult<Val> {
    match &args[0] {
        Val::Str(s) => Ok(Val::Int(s.chars().count() as i64)),
        Val::List(items) => Ok(Val::Int(items.len() as i64)),
        other => Err(LangError::invalid_type(format!(
            "length expects a string or a list, got {}",
            other.type_name()
        ))),
    }
}

/// Element count of a list, or field count of a record or instance
pub fn size(args: &[Val]) -> LangResult<Val> {
    match &args[0] {
        Val::List(items) => Ok(Val::Int(items.len() as i64)),
        Val::Record(record) => Ok(Val::Int(record.fields.len() as i64)),
        Val::Null => Ok(Val::Int(0)),
        other => Err(LangError::invalid_type(format!(
            "size expects a list or a record, got {}",
            other.type_name()
        ))),
    }
}

pub fn text(args: &[Val]) -> LangResult<Val> {
    Ok(Val::Str(args[0].to_string()))
}

pub fn list(args: &[Val]) -> LangResult<Val> {
    Ok(Val::List(args.to_vec()))
}

/// item(list, index), 0-based
pub fn item(args: &[Val]) -> LangResult<Val> {
    let Val::List(items) = &args[0] else {
        return Err(LangError::invalid_type(format!(
            "item expects a list, got {}",
            args[0].type_name()
        )));
    };
    let Val::Int(index) = args[1] else {
        return Err(LangError::invalid_type(format!(
            "item index must be an integer, got {}",
            args[1].type_name()
        )));
    };
    usize::try_from(index)
        .ok()
        .and_then(|i| items.get(i))
        .cloned()
        .ok_or_else(|| {
            LangError::new(
                ErrorKind::IndexOutOfRange,
                format!("index {} is out of range for a list of {}", index, items.len()),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length() {
        assert_eq!(length(&[Val::str("héllo")]).unwrap(), Val::Int(5));
        assert_eq!(length(&[Val::List(vec![Val::Null])]).unwrap(), Val::Int(1));
    }

    #[test]
    fn test_item_bounds() {
        let list = Val::List(vec![Val::Int(10), Val::Int(20)]);
        assert_eq!(item(&[list.clone(), Val::Int(1)]).unwrap(), Val::Int(20));
        let err = item(&[list.clone(), Val::Int(2)]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IndexOutOfRange);
        let err = item(&[list, Val::Int(-1)]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IndexOutOfRange);
    }
}
