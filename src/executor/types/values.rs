//! Runtime value types

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

use crate::executor::classes::{ClassDefinition, ClassInstance};
use crate::executor::stdlib::Extension;
use crate::program::{Procedure, Record};
use crate::scheduler::TaskHandle;

/// Runtime value
#[derive(Debug, Clone)]
pub enum Val {
    /// The language's "empty" value
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Val>),
    /// Boxed instance field, produced by attribute access
    Field(ClassField),
    Instance(Arc<ClassInstance>),
    Class(Arc<ClassDefinition>),
    Procedure(Arc<Procedure>),
    /// Method with its receiver already bound
    Method(BoundMethod),
    Extension(Arc<dyn Extension>),
    Record(Arc<Record>),
    /// Handle of a background task
    Task(TaskHandle),
    /// A call captured for background scheduling instead of being executed
    Deferred(Arc<DeferredCall>),
}

/// Method of a concrete instance
#[derive(Debug, Clone)]
pub struct BoundMethod {
    pub receiver: Arc<ClassInstance>,
    pub method: Arc<Procedure>,
}

#[derive(Debug, Clone)]
pub struct DeferredCall {
    pub callee: Val,
    pub args: Vec<Val>,
}

/* ===================== Class Fields ===================== */

/// A boxed value that can be mutated in place through attribute access
#[derive(Debug, Clone, Default)]
pub struct ClassField(Arc<Mutex<Val>>);

impl ClassField {
    pub fn new(value: Val) -> Self {
        ClassField(Arc::new(Mutex::new(value)))
    }

    pub fn get(&self) -> Val {
        self.0.lock().clone()
    }

    pub fn set(&self, value: Val) {
        *self.0.lock() = value;
    }

    pub fn ptr_eq(&self, other: &ClassField) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for Val {
    fn default() -> Self {
        Val::Null
    }
}

/* ===================== Helpers ===================== */

impl Val {
    /// Name of the value's type as shown in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Val::Null => "empty",
            Val::Bool(_) => "boolean",
            Val::Int(_) => "integer",
            Val::Float(_) => "number",
            Val::Str(_) => "string",
            Val::List(_) => "list",
            Val::Field(_) => "field",
            Val::Instance(_) => "instance",
            Val::Class(_) => "class",
            Val::Procedure(_) => "procedure",
            Val::Method(_) => "method",
            Val::Extension(_) => "extension",
            Val::Record(_) => "record",
            Val::Task(_) => "task",
            Val::Deferred(_) => "deferred call",
        }
    }

    /// Strip the field box, if any
    pub fn unboxed(self) -> Val {
        match self {
            Val::Field(field) => field.get().unboxed(),
            other => other,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Val::Int(i) => Some(*i as f64),
            Val::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Val::Procedure(_) | Val::Method(_) | Val::Class(_) | Val::Extension(_)
        )
    }

    pub fn str(s: impl Into<String>) -> Val {
        Val::Str(s.into())
    }
}

impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Val::Null, Val::Null) => true,
            (Val::Bool(a), Val::Bool(b)) => a == b,
            (Val::Int(a), Val::Int(b)) => a == b,
            (Val::Float(a), Val::Float(b)) => a == b,
            (Val::Int(a), Val::Float(b)) | (Val::Float(b), Val::Int(a)) => (*a as f64) == *b,
            (Val::Str(a), Val::Str(b)) => a == b,
            (Val::List(a), Val::List(b)) => a == b,
            (Val::Field(a), Val::Field(b)) if a.ptr_eq(b) => true,
            (Val::Field(a), b) => a.get() == *b,
            (a, Val::Field(b)) => *a == b.get(),
            (Val::Instance(a), Val::Instance(b)) => Arc::ptr_eq(a, b),
            (Val::Class(a), Val::Class(b)) => Arc::ptr_eq(a, b),
            (Val::Procedure(a), Val::Procedure(b)) => Arc::ptr_eq(a, b),
            (Val::Method(a), Val::Method(b)) => {
                Arc::ptr_eq(&a.receiver, &b.receiver) && Arc::ptr_eq(&a.method, &b.method)
            }
            (Val::Extension(a), Val::Extension(b)) => a.name() == b.name(),
            (Val::Record(a), Val::Record(b)) => Arc::ptr_eq(a, b),
            (Val::Task(a), Val::Task(b)) => a.id() == b.id(),
            _ => false,
        }
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Null => f.write_str("empty"),
            Val::Bool(b) => write!(f, "{}", b),
            Val::Int(i) => write!(f, "{}", i),
            Val::Float(x) => write!(f, "{}", x),
            Val::Str(s) => f.write_str(s),
            Val::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Val::Field(field) => write!(f, "{}", field.get()),
            Val::Instance(instance) => write!(f, "<{} instance>", instance.class().name),
            Val::Class(class) => write!(f, "<class {}>", class.name),
            Val::Procedure(procedure) => write!(f, "<procedure {}>", procedure.name),
            Val::Method(bound) => write!(
                f,
                "<method {}.{}>",
                bound.receiver.class().name,
                bound.method.name
            ),
            Val::Extension(ext) => write!(f, "<extension {}>", ext.name()),
            Val::Record(record) => write!(f, "<{} {}>", record.kind, record.name),
            Val::Task(task) => write!(f, "<task {}>", task.id()),
            Val::Deferred(_) => f.write_str("<deferred call>"),
        }
    }
}

impl From<bool> for Val {
    fn from(b: bool) -> Self {
        Val::Bool(b)
    }
}

impl From<i64> for Val {
    fn from(i: i64) -> Self {
        Val::Int(i)
    }
}

impl From<f64> for Val {
    fn from(x: f64) -> Self {
        Val::Float(x)
    }
}

impl From<&str> for Val {
    fn from(s: &str) -> Self {
        Val::Str(s.to_string())
    }
}

impl From<serde_json::Value> for Val {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as JsonValue;
        match json {
            JsonValue::Null => Val::Null,
            JsonValue::Bool(b) => Val::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Val::Int(i),
                None => Val::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Val::Str(s),
            JsonValue::Array(items) => Val::List(items.into_iter().map(Val::from).collect()),
            JsonValue::Object(map) => Val::Record(Arc::new(Record::from_json_map("object", "", map))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_unboxing() {
        let field = ClassField::new(Val::Int(3));
        let boxed = Val::Field(field.clone());
        field.set(Val::Int(4));
        assert_eq!(boxed.clone().unboxed(), Val::Int(4));
        assert_eq!(boxed, Val::Int(4));
    }

    #[test]
    fn test_numeric_equality_across_kinds() {
        assert_eq!(Val::Int(2), Val::Float(2.0));
        assert_ne!(Val::Int(2), Val::str("2"));
    }

    #[test]
    fn test_display() {
        let list = Val::List(vec![Val::Int(1), Val::str("a"), Val::Null]);
        assert_eq!(list.to_string(), "[1, a, empty]");
        assert_eq!(Val::Float(2.5).to_string(), "2.5");
        assert_eq!(Val::Bool(false).to_string(), "false");
    }

    #[test]
    fn test_from_json() {
        let val = Val::from(serde_json::json!([1, 2.5, "x", true, null]));
        assert_eq!(
            val,
            Val::List(vec![
                Val::Int(1),
                Val::Float(2.5),
                Val::str("x"),
                Val::Bool(true),
                Val::Null
            ])
        );
    }
}
