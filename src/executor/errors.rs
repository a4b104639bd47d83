//! Language error taxonomy
//!
//! Every failure the runtime can surface to a program is a [`LangError`]. Host-level faults
//! (type mismatches, arithmetic faults, bad arity) are normalized into one of the
//! [`ErrorKind`]s below and always carry the source location of the expression that raised them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::classes::ClassInstance;

/* ===================== Error Kinds ===================== */

/// Built-in error kinds.
///
/// Each kind is also registered as a throwable class (see [`ErrorKind::class_name`]), rooted in
/// the `Error` class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Root of every error class; user exceptions usually derive from it
    Error,
    Syntax,
    NameNotDefined,
    FieldNotDefined,
    InvalidType,
    InvalidExpression,
    DivisionByZero,
    ArithmeticOverflow,
    ArgumentCount,
    RecursionLimit,
    DuplicateName,
    IndexOutOfRange,
    DoubleWait,
    NotThrowable,
    Scheduler,
    Internal,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 16] = [
        ErrorKind::Error,
        ErrorKind::Syntax,
        ErrorKind::NameNotDefined,
        ErrorKind::FieldNotDefined,
        ErrorKind::InvalidType,
        ErrorKind::InvalidExpression,
        ErrorKind::DivisionByZero,
        ErrorKind::ArithmeticOverflow,
        ErrorKind::ArgumentCount,
        ErrorKind::RecursionLimit,
        ErrorKind::DuplicateName,
        ErrorKind::IndexOutOfRange,
        ErrorKind::DoubleWait,
        ErrorKind::NotThrowable,
        ErrorKind::Scheduler,
        ErrorKind::Internal,
    ];

    /// Stable machine-readable code
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Error => "ERROR",
            ErrorKind::Syntax => "SYNTAX_ERROR",
            ErrorKind::NameNotDefined => "NAME_NOT_DEFINED",
            ErrorKind::FieldNotDefined => "FIELD_NOT_DEFINED",
            ErrorKind::InvalidType => "INVALID_TYPE",
            ErrorKind::InvalidExpression => "INVALID_EXPRESSION",
            ErrorKind::DivisionByZero => "DIVISION_BY_ZERO",
            ErrorKind::ArithmeticOverflow => "ARITHMETIC_OVERFLOW",
            ErrorKind::ArgumentCount => "ARGUMENT_COUNT",
            ErrorKind::RecursionLimit => "RECURSION_LIMIT",
            ErrorKind::DuplicateName => "DUPLICATE_NAME",
            ErrorKind::IndexOutOfRange => "INDEX_OUT_OF_RANGE",
            ErrorKind::DoubleWait => "DOUBLE_WAIT",
            ErrorKind::NotThrowable => "NOT_THROWABLE",
            ErrorKind::Scheduler => "SCHEDULER_ERROR",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }

    /// Name of the class this kind is exposed as inside the language
    pub fn class_name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::Syntax => "SyntaxError",
            ErrorKind::NameNotDefined => "NameError",
            ErrorKind::FieldNotDefined => "FieldError",
            ErrorKind::InvalidType => "TypeError",
            ErrorKind::InvalidExpression => "ExpressionError",
            ErrorKind::DivisionByZero => "ZeroDivisionError",
            ErrorKind::ArithmeticOverflow => "OverflowError",
            ErrorKind::ArgumentCount => "ArgumentError",
            ErrorKind::RecursionLimit => "RecursionError",
            ErrorKind::DuplicateName => "DuplicateNameError",
            ErrorKind::IndexOutOfRange => "IndexError",
            ErrorKind::DoubleWait => "WaitError",
            ErrorKind::NotThrowable => "ThrowError",
            ErrorKind::Scheduler => "SchedulerError",
            ErrorKind::Internal => "InternalError",
        }
    }

    pub fn from_class_name(name: &str) -> Option<ErrorKind> {
        ErrorKind::ALL.into_iter().find(|kind| kind.class_name() == name)
    }

    /// Message used when an error class is thrown without one
    pub fn default_message(self) -> &'static str {
        match self {
            ErrorKind::Error => "error",
            ErrorKind::Syntax => "syntax error",
            ErrorKind::NameNotDefined => "name is not defined",
            ErrorKind::FieldNotDefined => "field is not defined",
            ErrorKind::InvalidType => "invalid type",
            ErrorKind::InvalidExpression => "invalid expression",
            ErrorKind::DivisionByZero => "division by zero",
            ErrorKind::ArithmeticOverflow => "arithmetic overflow",
            ErrorKind::ArgumentCount => "wrong number of arguments",
            ErrorKind::RecursionLimit => "maximum recursion depth exceeded",
            ErrorKind::DuplicateName => "name is already defined",
            ErrorKind::IndexOutOfRange => "index out of range",
            ErrorKind::DoubleWait => "task result was already consumed",
            ErrorKind::NotThrowable => "value cannot be thrown",
            ErrorKind::Scheduler => "scheduler error",
            ErrorKind::Internal => "internal error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class_name())
    }
}

/* ===================== Source Locations ===================== */

/// Where an expression came from
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: usize,
    /// Raw text of the expression
    pub text: String,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: usize, text: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            text: text.into(),
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = if self.file.is_empty() { "<input>" } else { &self.file };
        write!(f, "{}:{}: {}", file, self.line, self.text)
    }
}

/// One entry of the call chain attached to an error as it leaves a procedure
#[derive(Debug, Clone, PartialEq)]
pub struct TraceFrame {
    pub procedure: String,
    pub location: Option<SourceLocation>,
}

/* ===================== Language Error ===================== */

#[derive(Debug, Clone, Error)]
#[error("{class_name}: {message}")]
pub struct LangError {
    pub kind: ErrorKind,
    /// Declared class of the raised value; the kind's class unless a user exception was thrown
    pub class_name: String,
    pub message: String,
    /// The thrown instance, when the error came from a `throw` of an instance
    pub payload: Option<Arc<ClassInstance>>,
    pub location: Option<SourceLocation>,
    /// Innermost procedure first
    pub trace: Vec<TraceFrame>,
}

pub type LangResult<T> = Result<T, LangError>;

impl LangError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            class_name: kind.class_name().to_string(),
            message: message.into(),
            payload: None,
            location: None,
            trace: Vec::new(),
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, message)
    }

    pub fn invalid_type(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidType, message)
    }

    pub fn invalid_expression(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidExpression, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn name_not_defined(name: &str, suggestions: &[String]) -> Self {
        let message = if suggestions.is_empty() {
            format!("name '{}' is not defined", name)
        } else {
            format!(
                "name '{}' is not defined; did you mean: {}?",
                name,
                suggestions.join(", ")
            )
        };
        Self::new(ErrorKind::NameNotDefined, message)
    }

    pub fn field_not_defined(field: &str, owner: &str) -> Self {
        Self::new(
            ErrorKind::FieldNotDefined,
            format!("field '{}' is not defined on {}", field, owner),
        )
    }

    pub fn argument_count(callee: &str, expected: &str, supplied: usize) -> Self {
        Self::new(
            ErrorKind::ArgumentCount,
            format!(
                "'{}' expects {} argument(s), {} supplied",
                callee, expected, supplied
            ),
        )
    }

    /// Attach a location unless one is already present
    pub fn at(mut self, location: &SourceLocation) -> Self {
        if self.location.is_none() {
            self.location = Some(location.clone());
        }
        self
    }

    pub fn with_frame(mut self, frame: TraceFrame) -> Self {
        self.trace.push(frame);
        self
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Full diagnostic: message, location and call chain
    pub fn report(&self) -> String {
        let mut out = format!("{}: {}", self.class_name, self.message);
        if let Some(location) = &self.location {
            out.push_str(&format!("\n  at {}", location));
        }
        for frame in &self.trace {
            match &frame.location {
                Some(location) => {
                    out.push_str(&format!("\n  in {} called from {}", frame.procedure, location))
                }
                None => out.push_str(&format!("\n  in {}", frame.procedure)),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_names_round_trip() {
        for kind in ErrorKind::ALL {
            assert_eq!(ErrorKind::from_class_name(kind.class_name()), Some(kind));
        }
        assert_eq!(ErrorKind::from_class_name("NoSuchError"), None);
    }

    #[test]
    fn test_location_is_attached_once() {
        let first = SourceLocation::new("a.law", 3, "x + 1");
        let second = SourceLocation::new("b.law", 9, "y");
        let err = LangError::invalid_type("bad").at(&first).at(&second);
        assert_eq!(err.location, Some(first));
    }

    #[test]
    fn test_report_includes_trace() {
        let err = LangError::new(ErrorKind::DivisionByZero, "division by zero")
            .at(&SourceLocation::new("rules.law", 4, "a / b"))
            .with_frame(TraceFrame {
                procedure: "ratio".to_string(),
                location: Some(SourceLocation::new("rules.law", 10, "ratio(1, 0)")),
            });
        let report = err.report();
        assert!(report.starts_with("ZeroDivisionError: division by zero"));
        assert!(report.contains("rules.law:4: a / b"));
        assert!(report.contains("in ratio called from rules.law:10: ratio(1, 0)"));
        assert_eq!(err.code(), "DIVISION_BY_ZERO");
    }
}
