//! Extensions and the standard extension library
//!
//! Extensions are callables provided by the host rather than written in the language. They
//! receive already evaluated, unboxed arguments; the evaluator checks the argument count against
//! the declared [`Arity`] before calling them.

pub mod collections;
pub mod math;

use std::fmt;
use std::sync::Arc;

use super::errors::{LangError, LangResult};
use super::types::Val;

/* ===================== Extension Contract ===================== */

pub trait Extension: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn arity(&self) -> Arity;

    fn call(&self, args: &[Val]) -> LangResult<Val>;
}

/// Accepted argument counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    /// `None` means unbounded
    pub max: Option<usize>,
    /// A bare reference to the extension (no brackets) calls it with no arguments
    pub auto_invoke: bool,
}

impl Arity {
    /// Takes no arguments and may be referenced without brackets
    pub const fn none() -> Self {
        Self {
            min: 0,
            max: Some(0),
            auto_invoke: true,
        }
    }

    pub const fn exact(n: usize) -> Self {
        Self {
            min: n,
            max: Some(n),
            auto_invoke: false,
        }
    }

    pub const fn range(min: usize, max: usize) -> Self {
        Self {
            min,
            max: Some(max),
            auto_invoke: false,
        }
    }

    pub const fn at_least(min: usize) -> Self {
        Self {
            min,
            max: None,
            auto_invoke: false,
        }
    }

    pub fn accepts(&self, supplied: usize) -> bool {
        supplied >= self.min && self.max.map_or(true, |max| supplied <= max)
    }

    pub fn check(&self, callee: &str, supplied: usize) -> LangResult<()> {
        if self.accepts(supplied) {
            Ok(())
        } else {
            Err(LangError::argument_count(callee, &self.to_string(), supplied))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "{}", max),
            Some(max) => write!(f, "{} to {}", self.min, max),
            None => write!(f, "at least {}", self.min),
        }
    }
}

/* ===================== Native Functions ===================== */

/// An extension backed by a plain function
pub struct NativeFn {
    name: &'static str,
    arity: Arity,
    func: fn(&[Val]) -> LangResult<Val>,
}

impl NativeFn {
    pub fn new(name: &'static str, arity: Arity, func: fn(&[Val]) -> LangResult<Val>) -> Self {
        Self { name, arity, func }
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFn({}/{})", self.name, self.arity)
    }
}

impl Extension for NativeFn {
    fn name(&self) -> &str {
        self.name
    }

    fn arity(&self) -> Arity {
        self.arity
    }

    fn call(&self, args: &[Val]) -> LangResult<Val> {
        (self.func)(args)
    }
}

/// The extensions every program gets
pub fn standard_library() -> Vec<Arc<dyn Extension>> {
    let natives = [
        NativeFn::new("abs", Arity::exact(1), math::abs),
        NativeFn::new("round", Arity::range(1, 2), math::round),
        NativeFn::new("min", Arity::at_least(1), math::min),
        NativeFn::new("max", Arity::at_least(1), math::max),
        NativeFn::new("pi", Arity::none(), math::pi),
        NativeFn::new("length", Arity::exact(1), collections::length),
        NativeFn::new("size", Arity::exact(1), collections::size),
        NativeFn::new("text", Arity::exact(1), collections::text),
        NativeFn::new("list", Arity::at_least(0), collections::list),
        NativeFn::new("item", Arity::exact(2), collections::item),
    ];
    natives
        .into_iter()
        .map(|native| Arc::new(native) as Arc<dyn Extension>)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::errors::ErrorKind;

    #[test]
    fn test_arity_checks() {
        assert!(Arity::exact(2).accepts(2));
        assert!(!Arity::exact(2).accepts(1));
        assert!(Arity::range(1, 2).accepts(2));
        assert!(Arity::at_least(1).accepts(9));
        assert!(!Arity::at_least(1).accepts(0));

        let err = Arity::range(1, 2).check("round", 3).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ArgumentCount);
        assert!(err.message.contains("expects 1 to 2 argument(s), 3 supplied"));
    }

    #[test]
    fn test_standard_library_names_are_unique() {
        let library = standard_library();
        let mut names: Vec<&str> = library.iter().map(|e| e.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), library.len());
    }
}
