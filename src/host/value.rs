//! Script values

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::ast::Stmt;
use super::namespace::{Namespace, WeakNamespace};
use super::reclaim::Resource;

/// Functions provided by the host itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print,
    Len,
    Str,
    Args,
    Exit,
    Raise,
    Import,
    AtCleanup,
    Resource,
    TaskId,
}

impl Builtin {
    pub const ALL: [Builtin; 10] = [
        Builtin::Print,
        Builtin::Len,
        Builtin::Str,
        Builtin::Args,
        Builtin::Exit,
        Builtin::Raise,
        Builtin::Import,
        Builtin::AtCleanup,
        Builtin::Resource,
        Builtin::TaskId,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Len => "len",
            Builtin::Str => "str",
            Builtin::Args => "args",
            Builtin::Exit => "exit",
            Builtin::Raise => "raise",
            Builtin::Import => "import",
            Builtin::AtCleanup => "at_cleanup",
            Builtin::Resource => "resource",
            Builtin::TaskId => "task_id",
        }
    }

    pub fn lookup(name: &str) -> Option<Builtin> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }
}

/// A user-defined function
#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub body: Rc<[Stmt]>,
    /// Namespace the function was defined in
    pub globals: WeakNamespace,
}

/// A script value
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Function(Rc<Function>),
    Builtin(Builtin),
    Module(Namespace),
    Resource(Rc<Resource>),
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Function(_) | Value::Builtin(_) => "function",
            Value::Module(_) => "module",
            Value::Resource(_) => "resource",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            _ => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Builtin(_))
    }

    /// Quoted form, used by the console and inside lists
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("{:?}", s.as_ref()),
            other => other.to_string(),
        }
    }

    /// Equality as the `==` operator sees it
    pub fn equals(
        &self,
        other: &Value,
    ) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Module(a), Value::Module(b)) => a.ptr_eq(b),
            (Value::Resource(a), Value::Resource(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(items) => {
                let items = items.borrow();
                write!(
                    f,
                    "[{}]",
                    items
                        .iter()
                        .map(Value::repr)
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
            Value::Function(func) => write!(f, "<fn {}>", func.name),
            Value::Builtin(b) => write!(f, "<builtin {}>", b.name()),
            Value::Module(ns) => write!(
                f,
                "<module {}>",
                ns.identity().unwrap_or_else(|| "?".to_string())
            ),
            Value::Resource(res) => write!(f, "<resource {}>", res.name()),
        }
    }
}
