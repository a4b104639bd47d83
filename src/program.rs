//! Program registry
//!
//! A [`Program`] is the immutable table of top-level names (procedures, classes, declarative
//! records and extensions) plus the main body. It is built once by [`ProgramBuilder`] and then
//! shared read-only by the main program and every background task.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::executor::classes::ClassDefinition;
use crate::executor::errors::{ErrorKind, LangError, LangResult};
use crate::executor::stdlib::{self, Extension};
use crate::executor::suggest;
use crate::executor::types::ast::{for_each_in_body, for_each_in_body_mut};
use crate::executor::types::{Body, Expression, Val};

/* ===================== Callables And Records ===================== */

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    /// Evaluated in the caller's scope when the argument is omitted
    pub default: Option<Expression>,
}

/// A procedure, method or constructor
#[derive(Debug)]
pub struct Procedure {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Body,
}

impl Procedure {
    /// Parameters that must be supplied
    pub fn required(&self) -> usize {
        self.params
            .iter()
            .rposition(|p| p.default.is_none())
            .map_or(0, |i| i + 1)
    }

    pub fn describe_arity(&self) -> String {
        let required = self.required();
        if required == self.params.len() {
            required.to_string()
        } else {
            format!("{} to {}", required, self.params.len())
        }
    }
}

/// A read-only declarative object (law, subject, document, ...)
#[derive(Debug)]
pub struct Record {
    pub name: String,
    pub kind: String,
    pub fields: HashMap<String, Val>,
}

impl Record {
    pub fn from_json_map(
        kind: &str,
        name: &str,
        map: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            fields: map.into_iter().map(|(k, v)| (k, Val::from(v))).collect(),
        }
    }

    pub fn field(&self, name: &str) -> Option<Val> {
        self.fields.get(name).cloned()
    }
}

/* ===================== Registry ===================== */

/// One top-level name
#[derive(Debug, Clone)]
pub enum Entry {
    Procedure(Arc<Procedure>),
    Class(Arc<ClassDefinition>),
    Record(Arc<Record>),
    Extension(Arc<dyn Extension>),
}

impl Entry {
    pub fn to_val(&self) -> Val {
        match self {
            Entry::Procedure(p) => Val::Procedure(Arc::clone(p)),
            Entry::Class(c) => Val::Class(Arc::clone(c)),
            Entry::Record(r) => Val::Record(Arc::clone(r)),
            Entry::Extension(e) => Val::Extension(Arc::clone(e)),
        }
    }
}

#[derive(Debug)]
pub struct Program {
    entries: HashMap<String, Entry>,
    main: Body,
    file: String,
}

impl Program {
    pub fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.get(name)
    }

    pub fn lookup(&self, name: &str) -> Option<Val> {
        self.entries.get(name).map(Entry::to_val)
    }

    pub fn class(&self, name: &str) -> Option<Arc<ClassDefinition>> {
        match self.entries.get(name) {
            Some(Entry::Class(class)) => Some(Arc::clone(class)),
            _ => None,
        }
    }

    /// The class registered for a built-in error kind
    pub fn error_class(&self, kind: ErrorKind) -> Option<Arc<ClassDefinition>> {
        self.class(kind.class_name())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn main(&self) -> &Body {
        &self.main
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    /// Compile every expression in the program, collecting all diagnostics
    pub fn check(&self) -> Vec<LangError> {
        let mut errors = Vec::new();
        let mut check = |expr: &Expression| {
            if let Err(err) = expr.compiled() {
                errors.push(err);
            }
        };
        for_each_in_body(&self.main, &mut check);
        for entry in self.entries.values() {
            match entry {
                Entry::Procedure(p) => check_procedure(p, &mut check),
                Entry::Class(class) if !class.native => {
                    for method in class.methods.values() {
                        check_procedure(method, &mut check);
                    }
                    if let Some(ctor) = &class.constructor {
                        check_procedure(ctor, &mut check);
                    }
                }
                _ => {}
            }
        }
        errors
    }
}

fn check_procedure(procedure: &Procedure, check: &mut dyn FnMut(&Expression)) {
    for param in &procedure.params {
        if let Some(default) = &param.default {
            check(default);
        }
    }
    for_each_in_body(&procedure.body, check);
}

/* ===================== Program Source ===================== */

/// Serialized program, as handed over by the parser layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgramSource {
    #[serde(default)]
    pub procedures: Vec<ProcedureDecl>,
    #[serde(default)]
    pub classes: Vec<ClassDecl>,
    #[serde(default)]
    pub records: Vec<RecordDecl>,
    #[serde(default)]
    pub main: Body,
}

impl ProgramSource {
    pub fn from_json(source: &str) -> serde_json::Result<Self> {
        serde_json::from_str(source)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcedureDecl {
    pub name: String,
    #[serde(default)]
    pub params: Vec<ParamDecl>,
    #[serde(default)]
    pub body: Body,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamDecl {
    Name(String),
    WithDefault { name: String, default: Expression },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub methods: Vec<ProcedureDecl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constructor: Option<ProcedureDecl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDecl {
    pub name: String,
    #[serde(default = "default_record_kind")]
    pub kind: String,
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

fn default_record_kind() -> String {
    "record".to_string()
}

/* ===================== Builder ===================== */

/// Builds the immutable registry
///
/// Built-in error classes and the standard extensions are always registered. User names that
/// collide with them, or with each other, are rejected.
#[derive(Default)]
pub struct ProgramBuilder {
    file: String,
    procedures: Vec<ProcedureDecl>,
    classes: Vec<ClassDecl>,
    records: Vec<RecordDecl>,
    extensions: Vec<Arc<dyn Extension>>,
    main: Body,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_source(source: ProgramSource) -> Self {
        Self {
            procedures: source.procedures,
            classes: source.classes,
            records: source.records,
            main: source.main,
            ..Self::default()
        }
    }

    /// File name attached to every expression's location
    pub fn file(mut self, file: impl Into<String>) -> Self {
        self.file = file.into();
        self
    }

    pub fn procedure(mut self, decl: ProcedureDecl) -> Self {
        self.procedures.push(decl);
        self
    }

    pub fn class(mut self, decl: ClassDecl) -> Self {
        self.classes.push(decl);
        self
    }

    pub fn record(mut self, decl: RecordDecl) -> Self {
        self.records.push(decl);
        self
    }

    pub fn extension(mut self, extension: Arc<dyn Extension>) -> Self {
        self.extensions.push(extension);
        self
    }

    pub fn main(mut self, body: Body) -> Self {
        self.main = body;
        self
    }

    pub fn build(self) -> LangResult<Program> {
        let file = self.file;
        let mut entries: HashMap<String, Entry> = HashMap::new();

        // Built-in error classes, all rooted in `Error`
        let root = Arc::new(ClassDefinition::builtin_error(ErrorKind::Error, None));
        for kind in ErrorKind::ALL {
            let class = if kind == ErrorKind::Error {
                Arc::clone(&root)
            } else {
                Arc::new(ClassDefinition::builtin_error(kind, Some(&root)))
            };
            entries.insert(kind.class_name().to_string(), Entry::Class(class));
        }

        let extensions = stdlib::standard_library()
            .into_iter()
            .chain(self.extensions);
        for extension in extensions {
            insert(&mut entries, extension.name().to_string(), Entry::Extension(extension))?;
        }

        for decl in self.records {
            let record = Record::from_json_map(&decl.kind, &decl.name, decl.fields);
            insert(&mut entries, decl.name, Entry::Record(Arc::new(record)))?;
        }

        for decl in self.procedures {
            let procedure = build_procedure(decl, &file);
            insert(
                &mut entries,
                procedure.name.clone(),
                Entry::Procedure(Arc::new(procedure)),
            )?;
        }

        let mut pending: HashMap<String, ClassDecl> = HashMap::new();
        for decl in self.classes {
            if entries.contains_key(&decl.name) || pending.contains_key(&decl.name) {
                return Err(duplicate(&decl.name));
            }
            pending.insert(decl.name.clone(), decl);
        }
        let mut names: Vec<String> = pending.keys().cloned().collect();
        names.sort();
        for name in names {
            resolve_class(&name, &mut pending, &mut entries, &mut HashSet::new(), &file)?;
        }

        let mut main = self.main;
        for_each_in_body_mut(&mut main, &mut |expr| expr.set_file(&file));

        debug!(file = %file, names = entries.len(), "program registry built");
        Ok(Program {
            entries,
            main,
            file,
        })
    }
}

fn duplicate(name: &str) -> LangError {
    LangError::new(
        ErrorKind::DuplicateName,
        format!("name '{}' is already defined", name),
    )
}

fn insert(entries: &mut HashMap<String, Entry>, name: String, entry: Entry) -> LangResult<()> {
    if entries.contains_key(&name) {
        return Err(duplicate(&name));
    }
    entries.insert(name, entry);
    Ok(())
}

fn build_procedure(decl: ProcedureDecl, file: &str) -> Procedure {
    let params = decl
        .params
        .into_iter()
        .map(|param| match param {
            ParamDecl::Name(name) => Param {
                name,
                default: None,
            },
            ParamDecl::WithDefault { name, mut default } => {
                default.set_file(file);
                Param {
                    name,
                    default: Some(default),
                }
            }
        })
        .collect();
    let mut body = decl.body;
    for_each_in_body_mut(&mut body, &mut |expr| expr.set_file(file));
    Procedure {
        name: decl.name,
        params,
        body,
    }
}

/// Build a class after its parent, detecting unknown parents and inheritance cycles
fn resolve_class(
    name: &str,
    pending: &mut HashMap<String, ClassDecl>,
    entries: &mut HashMap<String, Entry>,
    visiting: &mut HashSet<String>,
    file: &str,
) -> LangResult<Arc<ClassDefinition>> {
    if let Some(Entry::Class(class)) = entries.get(name) {
        return Ok(Arc::clone(class));
    }
    let Some(decl) = pending.remove(name) else {
        return Err(LangError::new(
            ErrorKind::NameNotDefined,
            format!("class '{}' is not defined", name),
        ));
    };
    visiting.insert(name.to_string());

    let parent = match &decl.parent {
        None => None,
        Some(parent) if visiting.contains(parent) => {
            return Err(LangError::new(
                ErrorKind::Syntax,
                format!("inheritance cycle through class '{}'", parent),
            ));
        }
        Some(parent) => {
            if !pending.contains_key(parent) && !matches!(entries.get(parent), Some(Entry::Class(_)))
            {
                let known: Vec<String> = pending
                    .keys()
                    .cloned()
                    .chain(entries.iter().filter_map(|(n, e)| {
                        matches!(e, Entry::Class(_)).then(|| n.clone())
                    }))
                    .collect();
                let mut err = LangError::name_not_defined(parent, &suggest::closest(parent, &known));
                err.message = format!("parent class of '{}': {}", name, err.message);
                return Err(err);
            }
            Some(resolve_class(parent, pending, entries, visiting, file)?)
        }
    };

    let methods = decl
        .methods
        .into_iter()
        .map(|method| {
            let mut procedure = build_procedure(method, file);
            let short = std::mem::take(&mut procedure.name);
            procedure.name = format!("{}.{}", name, short);
            (short, Arc::new(procedure))
        })
        .collect();
    let constructor = decl.constructor.map(|ctor| {
        let mut procedure = build_procedure(ctor, file);
        procedure.name = format!("{}.constructor", name);
        Arc::new(procedure)
    });

    let class = Arc::new(ClassDefinition {
        name: name.to_string(),
        error_root: parent.as_ref().and_then(|p| p.error_root),
        parent,
        methods,
        constructor,
        native: false,
    });
    visiting.remove(name);
    entries.insert(name.to_string(), Entry::Class(Arc::clone(&class)));
    Ok(class)
}
