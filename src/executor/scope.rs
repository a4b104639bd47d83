//! Lexical scopes
//!
//! A [`Scope`] maps names to [`Variable`]s and points at its lexical parent. Lookups walk the
//! parent chain; declarations always land in the scope they are made on, so shadowing never
//! touches an outer binding. The global scope is shared by the main program and every
//! background task, hence the locks.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::errors::{ErrorKind, LangError, LangResult};
use super::types::Val;

/* ===================== Variables ===================== */

/// Immutable name bound to a mutable value slot
#[derive(Debug)]
pub struct Variable {
    name: String,
    value: RwLock<Val>,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: Val) -> Self {
        Self {
            name: name.into(),
            value: RwLock::new(value),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> Val {
        self.value.read().clone()
    }

    pub fn set(&self, value: Val) {
        *self.value.write() = value;
    }
}

/* ===================== Scope ===================== */

pub struct Scope {
    name: String,
    vars: RwLock<HashMap<String, Arc<Variable>>>,
    parent: Option<Arc<Scope>>,
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.vars.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("Scope")
            .field("name", &self.name)
            .field("vars", &names)
            .field("parent", &self.parent.as_ref().map(|p| p.name.clone()))
            .finish()
    }
}

impl Scope {
    /// A scope without parent (the globals)
    pub fn root(name: impl Into<String>) -> Arc<Scope> {
        Arc::new(Scope {
            name: name.into(),
            vars: RwLock::new(HashMap::new()),
            parent: None,
        })
    }

    pub fn child(parent: &Arc<Scope>, name: impl Into<String>) -> Arc<Scope> {
        Arc::new(Scope {
            name: name.into(),
            vars: RwLock::new(HashMap::new()),
            parent: Some(Arc::clone(parent)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<Scope>> {
        self.parent.as_ref()
    }

    /// Find the variable bound to `name`, walking the parent chain
    pub fn find(&self, name: &str) -> Option<Arc<Variable>> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(var) = current.vars.read().get(name) {
                return Some(Arc::clone(var));
            }
            scope = current.parent.as_deref();
        }
        None
    }

    pub fn lookup(&self, name: &str) -> Option<Val> {
        self.find(name).map(|var| var.get())
    }

    pub fn contains_local(&self, name: &str) -> bool {
        self.vars.read().contains_key(name)
    }

    /// Introduce a new name in this scope
    pub fn declare(&self, name: &str, value: Val) -> LangResult<()> {
        let mut vars = self.vars.write();
        if vars.contains_key(name) {
            return Err(LangError::new(
                ErrorKind::DuplicateName,
                format!("name '{}' is already defined in this scope", name),
            ));
        }
        vars.insert(name.to_string(), Arc::new(Variable::new(name, value)));
        Ok(())
    }

    /// Bind `name` in this scope, replacing any existing binding
    pub fn define(&self, name: &str, value: Val) {
        self.vars
            .write()
            .insert(name.to_string(), Arc::new(Variable::new(name, value)));
    }

    /// Update the nearest existing binding; false when the name is unbound
    pub fn assign(&self, name: &str, value: Val) -> bool {
        match self.find(name) {
            Some(var) => {
                var.set(value);
                true
            }
            None => false,
        }
    }

    /// Every name visible from this scope, innermost first, without duplicates
    pub fn visible_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut scope = Some(self);
        while let Some(current) = scope {
            let mut local: Vec<String> = current.vars.read().keys().cloned().collect();
            local.sort();
            for name in local {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
            scope = current.parent.as_deref();
        }
        names
    }
}

/* ===================== Scope Stack ===================== */

/// The scopes of one execution context, innermost last
#[derive(Debug, Clone)]
pub struct ScopeStack {
    scopes: Vec<Arc<Scope>>,
}

impl ScopeStack {
    pub fn new(root: Arc<Scope>) -> Self {
        Self { scopes: vec![root] }
    }

    pub fn push(&mut self, scope: Arc<Scope>) {
        self.scopes.push(scope);
    }

    /// Pop the innermost scope; the root is never popped
    pub fn pop(&mut self) -> Option<Arc<Scope>> {
        if self.scopes.len() > 1 {
            self.scopes.pop()
        } else {
            None
        }
    }

    pub fn current(&self) -> &Arc<Scope> {
        // The root is never popped, so the stack is never empty
        &self.scopes[self.scopes.len() - 1]
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_parents() {
        let globals = Scope::root("globals");
        globals.define("rate", Val::Int(5));
        let inner = Scope::child(&globals, "block");
        assert_eq!(inner.lookup("rate"), Some(Val::Int(5)));
        assert_eq!(inner.lookup("missing"), None);
    }

    #[test]
    fn test_shadowing_leaves_outer_binding() {
        let globals = Scope::root("globals");
        globals.declare("x", Val::Int(1)).unwrap();
        let inner = Scope::child(&globals, "block");
        inner.declare("x", Val::Int(2)).unwrap();
        assert_eq!(inner.lookup("x"), Some(Val::Int(2)));
        assert_eq!(globals.lookup("x"), Some(Val::Int(1)));
    }

    #[test]
    fn test_declare_rejects_duplicates_in_same_scope() {
        let scope = Scope::root("globals");
        scope.declare("x", Val::Int(1)).unwrap();
        let err = scope.declare("x", Val::Int(2)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DuplicateName);
    }

    #[test]
    fn test_assign_updates_nearest_binding() {
        let globals = Scope::root("globals");
        globals.declare("total", Val::Int(0)).unwrap();
        let inner = Scope::child(&globals, "loop");
        assert!(inner.assign("total", Val::Int(7)));
        assert_eq!(globals.lookup("total"), Some(Val::Int(7)));
        assert!(!inner.assign("nope", Val::Null));
    }

    #[test]
    fn test_visible_names_innermost_first() {
        let globals = Scope::root("globals");
        globals.define("b", Val::Null);
        globals.define("a", Val::Null);
        let inner = Scope::child(&globals, "block");
        inner.define("c", Val::Null);
        inner.define("a", Val::Null);
        assert_eq!(inner.visible_names(), ["a", "c", "b"]);
    }

    #[test]
    fn test_scope_stack_keeps_root() {
        let mut stack = ScopeStack::new(Scope::root("globals"));
        let child = Scope::child(stack.current(), "block");
        stack.push(child);
        assert_eq!(stack.depth(), 2);
        assert!(stack.pop().is_some());
        assert!(stack.pop().is_none());
        assert_eq!(stack.current().name(), "globals");
    }
}
