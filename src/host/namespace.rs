//! Namespaces and the module table
//!
//! A namespace is an isolated name → value mapping. The module table maps an
//! identity (`__main__`, an imported module's name) to the namespace
//! registered under it; registering replaces, nothing is ever restored.

use std::cell::RefCell;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::value::Value;

#[derive(Debug, Default)]
struct NamespaceData {
    bindings: IndexMap<String, Value>,
}

/// Shared handle to one binding environment
#[derive(Clone, Default)]
pub struct Namespace(Rc<RefCell<NamespaceData>>);

impl Namespace {
    /// Fresh namespace with `__name__` bound to `identity`
    pub fn new(identity: &str) -> Self {
        let ns = Self::default();
        ns.set("__name__", Value::str(identity));
        ns
    }

    /// Fresh namespace for a module loaded from `path`
    pub fn for_file(
        identity: &str,
        path: &Path,
    ) -> Self {
        let ns = Self::new(identity);
        ns.set("__file__", Value::str(path.display().to_string()));
        ns
    }

    /// `__name__`, if bound to a string
    pub fn identity(&self) -> Option<String> {
        match self.get("__name__") {
            Some(Value::Str(s)) => Some(s.to_string()),
            _ => None,
        }
    }

    /// `__file__`, if bound to a string
    pub fn file(&self) -> Option<PathBuf> {
        match self.get("__file__") {
            Some(Value::Str(s)) => Some(PathBuf::from(s.as_ref())),
            _ => None,
        }
    }

    pub fn get(
        &self,
        name: &str,
    ) -> Option<Value> {
        self.0.borrow().bindings.get(name).cloned()
    }

    pub fn contains(
        &self,
        name: &str,
    ) -> bool {
        self.0.borrow().bindings.contains_key(name)
    }

    pub fn set(
        &self,
        name: &str,
        value: Value,
    ) {
        // the displaced value drops after the borrow ends
        let old = self.0.borrow_mut().bindings.insert(name.to_string(), value);
        drop(old);
    }

    /// Bound names in definition order
    pub fn names(&self) -> Vec<String> {
        self.0.borrow().bindings.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every binding
    pub fn clear(&self) -> usize {
        let bindings = std::mem::take(&mut self.0.borrow_mut().bindings);
        let count = bindings.len();
        drop(bindings);
        count
    }

    /// Handles held to this namespace, including this one
    pub fn handle_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    pub fn downgrade(&self) -> WeakNamespace {
        WeakNamespace(Rc::downgrade(&self.0))
    }

    pub fn ptr_eq(
        &self,
        other: &Namespace,
    ) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Namespace {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("identity", &self.identity())
            .field("names", &self.names())
            .finish()
    }
}

/// Non-owning namespace handle, held by functions for their globals
#[derive(Clone, Default)]
pub struct WeakNamespace(Weak<RefCell<NamespaceData>>);

impl WeakNamespace {
    pub fn upgrade(&self) -> Option<Namespace> {
        self.0.upgrade().map(Namespace)
    }
}

impl fmt::Debug for WeakNamespace {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str("WeakNamespace")
    }
}

/// Identity → namespace registry
#[derive(Debug, Default)]
pub struct ModuleTable {
    modules: IndexMap<String, Namespace>,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `ns` under `identity`, returning whatever it replaced
    pub fn insert(
        &mut self,
        identity: &str,
        ns: Namespace,
    ) -> Option<Namespace> {
        self.modules.insert(identity.to_string(), ns)
    }

    pub fn get(
        &self,
        identity: &str,
    ) -> Option<Namespace> {
        self.modules.get(identity).cloned()
    }

    pub fn contains(
        &self,
        identity: &str,
    ) -> bool {
        self.modules.contains_key(identity)
    }

    /// Registered identities in registration order
    pub fn identities(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
