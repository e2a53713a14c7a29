//! tl script evaluator
//!
//! A tree walker over [`ast`](super::ast). Names resolve through the function
//! locals (if any), then the namespace the code runs in, then the builtins.

use std::cell::Cell;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use super::ast::{BinOp, Expr, Stmt, StmtKind, UnaryOp};
use super::error::ScriptError;
use super::namespace::Namespace;
use super::reclaim::Resource;
use super::value::{Builtin, Function, Value};
use super::Host;
use crate::task;

/// Deepest call nesting before a script is stopped
pub const MAX_CALL_DEPTH: usize = 64;

/// Deepest expression evaluation, across calls, before a script is stopped
pub const MAX_EVAL_DEPTH: usize = 2048;

type EvalResult<T> = Result<T, ScriptError>;

/// How a block finished
#[derive(Debug)]
enum Flow {
    Normal,
    Return(Value),
}

/// Where names are bound and looked up
struct Scope {
    globals: Namespace,
    locals: Option<IndexMap<String, Value>>,
}

impl Scope {
    fn lookup(
        &self,
        name: &str,
    ) -> Option<Value> {
        if let Some(value) = self.locals.as_ref().and_then(|locals| locals.get(name)) {
            return Some(value.clone());
        }
        self.globals
            .get(name)
            .or_else(|| Builtin::lookup(name).map(Value::Builtin))
    }

    fn define(
        &mut self,
        name: &str,
        value: Value,
    ) {
        match &mut self.locals {
            Some(locals) => {
                locals.insert(name.to_string(), value);
            }
            None => self.globals.set(name, value),
        }
    }

    fn assign(
        &mut self,
        name: &str,
        value: Value,
    ) -> bool {
        if let Some(slot) = self.locals.as_mut().and_then(|locals| locals.get_mut(name)) {
            *slot = value;
            return true;
        }
        if self.globals.contains(name) {
            self.globals.set(name, value);
            return true;
        }
        false
    }
}

/// Evaluates statements on behalf of a [`Host`]
pub struct Interpreter<'h> {
    host: &'h Host,
    depth: Cell<usize>,
    nesting: Cell<usize>,
}

impl<'h> Interpreter<'h> {
    pub fn new(host: &'h Host) -> Self {
        Self {
            host,
            depth: Cell::new(0),
            nesting: Cell::new(0),
        }
    }

    /// Run `stmts` with `ns` as the global namespace.
    ///
    /// Yields the value of the last statement when it is an expression, which
    /// is what the console echoes.
    pub fn run(
        &self,
        stmts: &[Stmt],
        ns: &Namespace,
    ) -> EvalResult<Option<Value>> {
        let mut scope = Scope {
            globals: ns.clone(),
            locals: None,
        };
        let Some((last, init)) = stmts.split_last() else {
            return Ok(None);
        };
        if let Flow::Return(_) = self.block(init, &mut scope)? {
            return Ok(None);
        }
        match &last.kind {
            StmtKind::Expr(expr) => self.eval(expr, &mut scope, last.line).map(Some),
            _ => {
                self.statement(last, &mut scope)?;
                Ok(None)
            }
        }
    }

    /// Call `callee` with `args`
    pub fn call(
        &self,
        callee: &Value,
        args: Vec<Value>,
        line: usize,
    ) -> EvalResult<Value> {
        match callee {
            Value::Function(func) => self.call_function(func, args, line),
            Value::Builtin(builtin) => self.call_builtin(*builtin, args, line),
            other => Err(ScriptError::type_error(
                line,
                format!("'{}' object is not callable", other.type_name()),
            )),
        }
    }

    fn block(
        &self,
        stmts: &[Stmt],
        scope: &mut Scope,
    ) -> EvalResult<Flow> {
        for stmt in stmts {
            if let Flow::Return(value) = self.statement(stmt, scope)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn statement(
        &self,
        stmt: &Stmt,
        scope: &mut Scope,
    ) -> EvalResult<Flow> {
        let line = stmt.line;
        match &stmt.kind {
            StmtKind::Let(name, expr) => {
                let value = self.eval(expr, scope, line)?;
                scope.define(name, value);
            }
            StmtKind::Assign(name, expr) => {
                let value = self.eval(expr, scope, line)?;
                if !scope.assign(name, value) {
                    return Err(ScriptError::Name {
                        name: name.clone(),
                        line,
                    });
                }
            }
            StmtKind::FnDef { name, params, body } => {
                let func = self.function(name, params, body, scope);
                scope.define(name, func);
            }
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr, scope, line)?,
                    None => Value::Nil,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                let branch = if self.eval(cond, scope, line)?.is_truthy() {
                    then
                } else {
                    otherwise
                };
                return self.block(branch, scope);
            }
            StmtKind::While(cond, body) => {
                while self.eval(cond, scope, line)?.is_truthy() {
                    if let Flow::Return(value) = self.block(body, scope)? {
                        return Ok(Flow::Return(value));
                    }
                }
            }
            StmtKind::Expr(expr) => {
                self.eval(expr, scope, line)?;
            }
        }
        Ok(Flow::Normal)
    }

    fn function(
        &self,
        name: &str,
        params: &[String],
        body: &Rc<[Stmt]>,
        scope: &Scope,
    ) -> Value {
        Value::Function(Rc::new(Function {
            name: name.to_string(),
            params: params.to_vec(),
            body: Rc::clone(body),
            globals: scope.globals.downgrade(),
        }))
    }

    fn eval(
        &self,
        expr: &Expr,
        scope: &mut Scope,
        line: usize,
    ) -> EvalResult<Value> {
        let nesting = self.nesting.get();
        if nesting >= MAX_EVAL_DEPTH {
            return Err(ScriptError::Raised {
                message: "maximum evaluation depth exceeded".to_string(),
                line,
            });
        }
        self.nesting.set(nesting + 1);
        let value = self.eval_expr(expr, scope, line);
        self.nesting.set(nesting);
        value
    }

    fn eval_expr(
        &self,
        expr: &Expr,
        scope: &mut Scope,
        line: usize,
    ) -> EvalResult<Value> {
        match expr {
            Expr::Nil => Ok(Value::Nil),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(i) => Ok(Value::Int(*i)),
            Expr::Str(s) => Ok(Value::Str(Rc::clone(s))),
            Expr::Ident(name) => scope.lookup(name).ok_or_else(|| ScriptError::Name {
                name: name.clone(),
                line,
            }),
            Expr::List(items) => {
                let items = items
                    .iter()
                    .map(|item| self.eval(item, scope, line))
                    .collect::<EvalResult<Vec<_>>>()?;
                Ok(Value::list(items))
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand, scope, line)?;
                match (op, value) {
                    (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
                    (UnaryOp::Neg, Value::Int(i)) => i
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or_else(|| ScriptError::type_error(line, "integer overflow")),
                    (UnaryOp::Neg, other) => Err(ScriptError::type_error(
                        line,
                        format!("bad operand type for unary -: '{}'", other.type_name()),
                    )),
                }
            }
            Expr::Binary(BinOp::And, left, right) => {
                let left = self.eval(left, scope, line)?;
                if !left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right, scope, line)
            }
            Expr::Binary(BinOp::Or, left, right) => {
                let left = self.eval(left, scope, line)?;
                if left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right, scope, line)
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left, scope, line)?;
                let right = self.eval(right, scope, line)?;
                binary(*op, left, right, line)
            }
            Expr::Call(callee, args) => {
                let callee = self.eval(callee, scope, line)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg, scope, line))
                    .collect::<EvalResult<Vec<_>>>()?;
                self.call(&callee, args, line)
            }
            Expr::Index(target, index) => {
                let target = self.eval(target, scope, line)?;
                let index = self.eval(index, scope, line)?;
                subscript(&target, &index, line)
            }
            Expr::Attr(target, name) => match self.eval(target, scope, line)? {
                Value::Module(ns) => ns.get(name).ok_or_else(|| ScriptError::Name {
                    name: format!(
                        "{}.{}",
                        ns.identity().unwrap_or_else(|| "?".to_string()),
                        name
                    ),
                    line,
                }),
                other => Err(ScriptError::type_error(
                    line,
                    format!("'{}' object has no attribute '{}'", other.type_name(), name),
                )),
            },
            Expr::Lambda(params, body) => Ok(self.function("<anonymous>", params, body, scope)),
        }
    }

    fn call_function(
        &self,
        func: &Function,
        args: Vec<Value>,
        line: usize,
    ) -> EvalResult<Value> {
        if args.len() != func.params.len() {
            return Err(ScriptError::type_error(
                line,
                format!(
                    "{}() takes {} argument(s) but {} were given",
                    func.name,
                    func.params.len(),
                    args.len()
                ),
            ));
        }
        let globals = func.globals.upgrade().ok_or_else(|| ScriptError::Raised {
            message: format!("namespace of {}() has been released", func.name),
            line,
        })?;

        let depth = self.depth.get();
        if depth >= MAX_CALL_DEPTH {
            return Err(ScriptError::Raised {
                message: "maximum call depth exceeded".to_string(),
                line,
            });
        }
        self.depth.set(depth + 1);

        let mut scope = Scope {
            globals,
            locals: Some(func.params.iter().cloned().zip(args).collect()),
        };
        let result = self.block(&func.body, &mut scope);
        self.depth.set(depth);

        match result? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::Nil),
        }
    }

    fn call_builtin(
        &self,
        builtin: Builtin,
        args: Vec<Value>,
        line: usize,
    ) -> EvalResult<Value> {
        trace!("builtin {}() with {} argument(s)", builtin.name(), args.len());
        match builtin {
            Builtin::Print => {
                let text = args
                    .iter()
                    .map(Value::to_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                self.host.write_line(&text);
                Ok(Value::Nil)
            }
            Builtin::Len => match one_arg(builtin, args, line)? {
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                Value::List(items) => Ok(Value::Int(items.borrow().len() as i64)),
                Value::Module(ns) => Ok(Value::Int(ns.len() as i64)),
                other => Err(ScriptError::type_error(
                    line,
                    format!("object of type '{}' has no len()", other.type_name()),
                )),
            },
            Builtin::Str => Ok(Value::str(one_arg(builtin, args, line)?.to_string())),
            Builtin::Args => {
                no_args(builtin, &args, line)?;
                let items = self
                    .host
                    .program_args()
                    .iter()
                    .map(Value::str)
                    .collect();
                Ok(Value::list(items))
            }
            Builtin::Exit => {
                let code = match args.as_slice() {
                    [] => 0,
                    [Value::Int(code)] => i32::try_from(*code).unwrap_or(1),
                    [Value::Nil] => 0,
                    _ => 1,
                };
                Err(ScriptError::Exit { code })
            }
            Builtin::Raise => {
                let message = match args.as_slice() {
                    [] => "error".to_string(),
                    _ => args
                        .iter()
                        .map(Value::to_string)
                        .collect::<Vec<_>>()
                        .join(" "),
                };
                Err(ScriptError::Raised { message, line })
            }
            Builtin::Import => match one_arg(builtin, args, line)? {
                Value::Str(name) => self.host.import(&name).map(Value::Module),
                other => Err(ScriptError::type_error(
                    line,
                    format!("import() expects a str, got '{}'", other.type_name()),
                )),
            },
            Builtin::AtCleanup => {
                let action = one_arg(builtin, args, line)?;
                if !action.is_callable() {
                    return Err(ScriptError::type_error(
                        line,
                        format!("at_cleanup() expects a function, got '{}'", action.type_name()),
                    ));
                }
                let host = self.host.clone();
                task::register(move || {
                    Interpreter::new(&host).call(&action, Vec::new(), line)?;
                    Ok(())
                })
                .map_err(|_| ScriptError::NoTaskContext)?;
                Ok(Value::Nil)
            }
            Builtin::Resource => {
                let name = match one_arg(builtin, args, line)? {
                    Value::Str(name) => name.to_string(),
                    other => other.to_string(),
                };
                let resource = Resource::new(name, self.host.finalizer_log());
                Ok(Value::Resource(Rc::new(resource)))
            }
            Builtin::TaskId => {
                no_args(builtin, &args, line)?;
                let task = task::current_task().map_err(|_| ScriptError::NoTaskContext)?;
                Ok(Value::Int(task.raw() as i64))
            }
        }
    }
}

fn one_arg(
    builtin: Builtin,
    args: Vec<Value>,
    line: usize,
) -> EvalResult<Value> {
    let count = args.len();
    let mut args = args.into_iter();
    match (args.next(), count) {
        (Some(value), 1) => Ok(value),
        _ => Err(ScriptError::type_error(
            line,
            format!("{}() takes exactly one argument ({} given)", builtin.name(), count),
        )),
    }
}

fn no_args(
    builtin: Builtin,
    args: &[Value],
    line: usize,
) -> EvalResult<()> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(ScriptError::type_error(
            line,
            format!("{}() takes no arguments ({} given)", builtin.name(), args.len()),
        ))
    }
}

fn binary(
    op: BinOp,
    left: Value,
    right: Value,
    line: usize,
) -> EvalResult<Value> {
    let unsupported = |left: &Value, right: &Value| {
        ScriptError::type_error(
            line,
            format!(
                "unsupported operand types for {:?}: '{}' and '{}'",
                op,
                left.type_name(),
                right.type_name()
            ),
        )
    };
    let overflow = || ScriptError::type_error(line, "integer overflow");

    match (op, &left, &right) {
        (BinOp::Eq, _, _) => Ok(Value::Bool(left.equals(&right))),
        (BinOp::Ne, _, _) => Ok(Value::Bool(!left.equals(&right))),

        (BinOp::Add, Value::Int(a), Value::Int(b)) => {
            a.checked_add(*b).map(Value::Int).ok_or_else(overflow)
        }
        (BinOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::str(format!("{}{}", a, b))),
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        (BinOp::Sub, Value::Int(a), Value::Int(b)) => {
            a.checked_sub(*b).map(Value::Int).ok_or_else(overflow)
        }
        (BinOp::Mul, Value::Int(a), Value::Int(b)) => {
            a.checked_mul(*b).map(Value::Int).ok_or_else(overflow)
        }
        (BinOp::Div | BinOp::Rem, Value::Int(_), Value::Int(0)) => Err(ScriptError::Raised {
            message: "division by zero".to_string(),
            line,
        }),
        (BinOp::Div, Value::Int(a), Value::Int(b)) => {
            a.checked_div(*b).map(Value::Int).ok_or_else(overflow)
        }
        (BinOp::Rem, Value::Int(a), Value::Int(b)) => {
            a.checked_rem(*b).map(Value::Int).ok_or_else(overflow)
        }

        (BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge, Value::Int(a), Value::Int(b)) => {
            Ok(Value::Bool(compare(op, a.cmp(b))))
        }
        (BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge, Value::Str(a), Value::Str(b)) => {
            Ok(Value::Bool(compare(op, a.cmp(b))))
        }

        _ => Err(unsupported(&left, &right)),
    }
}

fn compare(
    op: BinOp,
    ordering: std::cmp::Ordering,
) -> bool {
    match op {
        BinOp::Lt => ordering.is_lt(),
        BinOp::Le => ordering.is_le(),
        BinOp::Gt => ordering.is_gt(),
        BinOp::Ge => ordering.is_ge(),
        _ => false,
    }
}

fn subscript(
    target: &Value,
    index: &Value,
    line: usize,
) -> EvalResult<Value> {
    let Value::Int(index) = index else {
        return Err(ScriptError::type_error(
            line,
            format!("indices must be int, not '{}'", index.type_name()),
        ));
    };
    let out_of_range = || ScriptError::Raised {
        message: format!("index {} out of range", index),
        line,
    };
    let resolve = |len: usize| -> Option<usize> {
        let len = len as i64;
        let i = if *index < 0 { len + index } else { *index };
        (0..len).contains(&i).then_some(i as usize)
    };

    match target {
        Value::List(items) => {
            let items = items.borrow();
            resolve(items.len())
                .map(|i| items[i].clone())
                .ok_or_else(out_of_range)
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            resolve(chars.len())
                .map(|i| Value::str(chars[i].to_string()))
                .ok_or_else(out_of_range)
        }
        other => Err(ScriptError::type_error(
            line,
            format!("'{}' object is not subscriptable", other.type_name()),
        )),
    }
}
