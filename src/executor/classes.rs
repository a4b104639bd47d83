//! Classes, instances and the exception class system
//!
//! Classes use single inheritance. An instance owns its fields plus, when its class has a
//! parent, the parent instance that was constructed for it. Method lookup is flattened once per
//! instance: own methods first, then whatever the parent chain adds.
//!
//! Every built-in [`ErrorKind`] is also a class. User classes that derive from one of them (at
//! any depth) are throwable and carry the kind at the root of their ancestry.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use super::errors::{ErrorKind, LangError};
use super::types::{ClassField, Val};
use crate::program::Procedure;

/// Field every error instance carries
pub const MESSAGE_FIELD: &str = "message";

/* ===================== Definitions ===================== */

pub struct ClassDefinition {
    pub name: String,
    pub parent: Option<Arc<ClassDefinition>>,
    pub methods: HashMap<String, Arc<Procedure>>,
    pub constructor: Option<Arc<Procedure>>,
    /// Built-in error kind at the root of the ancestry, if any
    pub error_root: Option<ErrorKind>,
    /// Built-in error class, constructed natively from an optional message
    pub native: bool,
}

impl fmt::Debug for ClassDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<&String> = self.methods.keys().collect();
        methods.sort();
        f.debug_struct("ClassDefinition")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| &p.name))
            .field("methods", &methods)
            .field("error_root", &self.error_root)
            .finish()
    }
}

impl ClassDefinition {
    /// The class registered for a built-in error kind
    pub fn builtin_error(kind: ErrorKind, root: Option<&Arc<ClassDefinition>>) -> Self {
        Self {
            name: kind.class_name().to_string(),
            parent: root.cloned(),
            methods: HashMap::new(),
            constructor: None,
            error_root: Some(kind),
            native: true,
        }
    }

    /// This class followed by its ancestors
    pub fn ancestry(&self) -> impl Iterator<Item = &ClassDefinition> {
        std::iter::successors(Some(self), |class| class.parent.as_deref())
    }

    pub fn is_a(&self, name: &str) -> bool {
        self.ancestry().any(|class| class.name == name)
    }

    /// Number of leading constructor arguments this class consumes
    pub fn constructor_arity(&self) -> usize {
        if self.native {
            return 1;
        }
        match (&self.constructor, &self.parent) {
            (Some(ctor), _) => ctor.params.len(),
            (None, Some(parent)) => parent.constructor_arity(),
            (None, None) => 0,
        }
    }

    fn flattened_methods(&self) -> HashMap<String, Arc<Procedure>> {
        let mut methods = HashMap::new();
        for class in self.ancestry() {
            for (name, method) in &class.methods {
                methods
                    .entry(name.clone())
                    .or_insert_with(|| Arc::clone(method));
            }
        }
        methods
    }
}

/* ===================== Instances ===================== */

pub struct ClassInstance {
    class: Arc<ClassDefinition>,
    fields: RwLock<HashMap<String, ClassField>>,
    methods: HashMap<String, Arc<Procedure>>,
    parent: OnceLock<Arc<ClassInstance>>,
}

impl fmt::Debug for ClassInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields: Vec<String> = self.fields.read().keys().cloned().collect();
        fields.sort();
        f.debug_struct("ClassInstance")
            .field("class", &self.class.name)
            .field("fields", &fields)
            .finish()
    }
}

impl ClassInstance {
    pub fn new(class: &Arc<ClassDefinition>) -> Arc<ClassInstance> {
        Arc::new(ClassInstance {
            class: Arc::clone(class),
            fields: RwLock::new(HashMap::new()),
            methods: class.flattened_methods(),
            parent: OnceLock::new(),
        })
    }

    /// A built-in error instance carrying `message`
    pub fn error(class: &Arc<ClassDefinition>, message: &str) -> Arc<ClassInstance> {
        let instance = ClassInstance::new(class);
        instance.set_field(MESSAGE_FIELD, Val::str(message));
        instance
    }

    pub fn class(&self) -> &Arc<ClassDefinition> {
        &self.class
    }

    pub fn parent(&self) -> Option<&Arc<ClassInstance>> {
        self.parent.get()
    }

    /// Attach the constructed parent and take over its fields; fields already set win
    pub fn adopt_parent(&self, parent: Arc<ClassInstance>) {
        {
            let parent_fields = parent.fields.read();
            let mut fields = self.fields.write();
            for (name, field) in parent_fields.iter() {
                fields.entry(name.clone()).or_insert_with(|| field.clone());
            }
        }
        let _ = self.parent.set(parent);
    }

    pub fn field(&self, name: &str) -> Option<ClassField> {
        self.fields.read().get(name).cloned()
    }

    /// Update a field in place, creating it if needed
    pub fn set_field(&self, name: &str, value: Val) {
        if let Some(field) = self.fields.read().get(name) {
            field.set(value);
            return;
        }
        self.fields
            .write()
            .entry(name.to_string())
            .or_default()
            .set(value);
    }

    pub fn method(&self, name: &str) -> Option<Arc<Procedure>> {
        self.methods.get(name).cloned()
    }

    /// Field and method names, for suggestions
    pub fn member_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.fields.read().keys().cloned().collect();
        names.extend(self.methods.keys().cloned());
        names.sort();
        names.dedup();
        names
    }

    /// The `message` field as text, when present
    pub fn message(&self) -> Option<String> {
        self.field(MESSAGE_FIELD).map(|field| field.get().to_string())
    }
}

/* ===================== Exceptions ===================== */

/// Turn a thrown value into a language error
pub fn throwable(value: Val) -> Result<LangError, LangError> {
    match value {
        Val::Class(class) if class.native => {
            let kind = class.error_root.unwrap_or(ErrorKind::Error);
            Ok(LangError::new(kind, kind.default_message()))
        }
        Val::Instance(instance) => {
            let Some(kind) = instance.class().error_root else {
                return Err(not_throwable(&Val::Instance(instance)));
            };
            let message = instance
                .message()
                .unwrap_or_else(|| kind.default_message().to_string());
            let mut err = LangError::new(kind, message);
            err.class_name = instance.class().name.clone();
            err.payload = Some(instance);
            Ok(err)
        }
        other => Err(not_throwable(&other)),
    }
}

fn not_throwable(value: &Val) -> LangError {
    LangError::new(
        ErrorKind::NotThrowable,
        format!(
            "{} cannot be thrown; only error classes and their instances can",
            value
        ),
    )
}

/// Whether a handler declared for `handler` catches `err`
pub fn handler_matches(handler: &str, err: &LangError) -> bool {
    if handler == err.class_name || handler == ErrorKind::Error.class_name() {
        return true;
    }
    if ErrorKind::from_class_name(handler) == Some(err.kind) {
        return true;
    }
    err.payload
        .as_ref()
        .is_some_and(|instance| instance.class().is_a(handler))
}
