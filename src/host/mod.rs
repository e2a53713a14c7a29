//! tl script host
//!
//! The host owns everything a running script can observe besides its own
//! values: the module table, the module search path, the program arguments
//! and the output stream. One [`Host`] serves one top-level task; it is cheap
//! to clone and never leaves the thread that created it.
//!
//! - [`lexer`], [`parser`], [`ast`]: source to syntax tree
//! - [`interp`]: evaluation and builtins
//! - [`namespace`]: binding environments and the module table
//! - [`reclaim`]: retired namespaces, resources and their finalizers

pub mod ast;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod namespace;
pub mod parser;
pub mod reclaim;
pub mod value;

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, info, trace};

pub use error::ScriptError;
pub use interp::Interpreter;
pub use namespace::{ModuleTable, Namespace};
pub use reclaim::{FinalizerLog, ReclaimConfig, Reclaimer, Resource};
pub use value::Value;

use crate::args::ArgumentVector;
use crate::runtime::local::Journal;
use crate::task::Reclaim;
use crate::util::config::HostConfig;

/// Where `print` goes
#[derive(Debug, Clone, Default)]
pub enum Output {
    #[default]
    Stdout,
    /// Captured in memory
    Buffer(Rc<RefCell<String>>),
}

impl Output {
    /// A fresh in-memory buffer
    pub fn buffer() -> Self {
        Output::Buffer(Rc::new(RefCell::new(String::new())))
    }

    /// Everything written so far, for buffered output
    pub fn captured(&self) -> Option<String> {
        match self {
            Output::Stdout => None,
            Output::Buffer(buf) => Some(buf.borrow().clone()),
        }
    }

    fn write_line(
        &self,
        text: &str,
    ) {
        match self {
            Output::Stdout => println!("{}", text),
            Output::Buffer(buf) => {
                let mut buf = buf.borrow_mut();
                buf.push_str(text);
                buf.push('\n');
            }
        }
    }
}

/// Result of one interactive turn
#[derive(Debug)]
pub enum TurnOutcome {
    /// Ran to completion; carries the value of a trailing expression
    Value(Option<Value>),
    /// Failed; the console reports it and carries on
    Failed(ScriptError),
    /// The script asked to leave the console
    Stop,
}

struct HostState {
    config: HostConfig,
    modules: RefCell<ModuleTable>,
    search_path: RefCell<Vec<PathBuf>>,
    program_args: RefCell<ArgumentVector>,
    reclaimer: RefCell<Reclaimer>,
    log: Rc<FinalizerLog>,
    output: Output,
}

/// Shared handle to the script host
#[derive(Clone)]
pub struct Host {
    inner: Rc<HostState>,
}

impl std::fmt::Debug for Host {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("modules", &self.inner.modules.borrow().identities())
            .field("search_path", &self.inner.search_path.borrow())
            .finish()
    }
}

impl Host {
    /// Host writing to stdout, without a journal
    pub fn new(config: &HostConfig) -> Self {
        Self::with_output(config, Output::Stdout, None)
    }

    /// Host writing to `output`; resource finalization and reclamation are
    /// noted in `journal` when given
    pub fn with_output(
        config: &HostConfig,
        output: Output,
        journal: Option<Journal>,
    ) -> Self {
        let log = Rc::new(FinalizerLog::new(journal));
        let reclaimer = Reclaimer::new(ReclaimConfig::default(), Rc::clone(&log));

        let mut modules = ModuleTable::new();
        modules.insert(&config.main_module, Namespace::new(&config.main_module));

        Self {
            inner: Rc::new(HostState {
                config: config.clone(),
                modules: RefCell::new(modules),
                search_path: RefCell::new(config.module_path.clone()),
                program_args: RefCell::new(ArgumentVector::default()),
                reclaimer: RefCell::new(reclaimer),
                log,
                output,
            }),
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.inner.config
    }

    /// A namespace not yet registered anywhere
    pub fn new_namespace(
        &self,
        identity: &str,
    ) -> Namespace {
        Namespace::new(identity)
    }

    /// Register `ns` under `identity`. A replaced namespace is retired and
    /// released by the next reclamation.
    pub fn register_module(
        &self,
        identity: &str,
        ns: Namespace,
    ) {
        let replaced = self.inner.modules.borrow_mut().insert(identity, ns.clone());
        debug!("module '{}' registered", identity);
        if let Some(old) = replaced {
            if !old.ptr_eq(&ns) {
                self.retire(old);
            }
        }
    }

    pub fn module(
        &self,
        identity: &str,
    ) -> Option<Namespace> {
        self.inner.modules.borrow().get(identity)
    }

    /// Registered module identities
    pub fn modules(&self) -> Vec<String> {
        self.inner.modules.borrow().identities()
    }

    pub fn append_search_path(
        &self,
        dir: impl Into<PathBuf>,
    ) {
        let dir = dir.into();
        trace!("search path += {}", dir.display());
        self.inner.search_path.borrow_mut().push(dir);
    }

    pub fn search_path(&self) -> Vec<PathBuf> {
        self.inner.search_path.borrow().clone()
    }

    /// Replace the arguments scripts see through `args()`
    pub fn set_program_args(
        &self,
        args: ArgumentVector,
    ) {
        *self.inner.program_args.borrow_mut() = args;
    }

    pub fn program_args(&self) -> ArgumentVector {
        self.inner.program_args.borrow().clone()
    }

    pub fn output(&self) -> &Output {
        &self.inner.output
    }

    pub(crate) fn write_line(
        &self,
        text: &str,
    ) {
        self.inner.output.write_line(text);
    }

    /// Parse and run `source` in `ns`
    pub fn exec(
        &self,
        source: &str,
        origin: &str,
        ns: &Namespace,
    ) -> Result<Option<Value>, ScriptError> {
        let program = parser::parse(source, origin)?;
        Interpreter::new(self).run(&program, ns)
    }

    /// Read `path` and run it in `ns`
    pub fn exec_file(
        &self,
        path: &Path,
        ns: &Namespace,
    ) -> Result<Option<Value>, ScriptError> {
        let source = fs::read_to_string(path).map_err(|source| ScriptError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.exec(&source, &path.display().to_string(), ns)
    }

    /// Run one console turn in `ns`
    pub fn eval_turn(
        &self,
        source: &str,
        ns: &Namespace,
    ) -> TurnOutcome {
        match self.exec(source, "<console>", ns) {
            Ok(value) => TurnOutcome::Value(value),
            Err(ScriptError::Exit { code }) => {
                debug!("console exit requested with status {}", code);
                TurnOutcome::Stop
            }
            Err(err) => TurnOutcome::Failed(err),
        }
    }

    /// Load module `name`, or return it if already loaded.
    ///
    /// `<dir>/<name>.tl` is tried for every search path entry in order. The
    /// module is registered before it runs so circular imports see it.
    pub fn import(
        &self,
        name: &str,
    ) -> Result<Namespace, ScriptError> {
        if let Some(ns) = self.module(name) {
            return Ok(ns);
        }

        let file_name = format!("{}.tl", name);
        let searched: Vec<PathBuf> = self
            .search_path()
            .into_iter()
            .map(|dir| dir.join(&file_name))
            .collect();
        let Some(path) = searched.iter().find(|candidate| candidate.is_file()) else {
            return Err(ScriptError::ModuleNotFound {
                name: name.to_string(),
                searched,
            });
        };

        info!("importing '{}' from {}", name, path.display());
        let ns = Namespace::for_file(name, path);
        self.register_module(name, ns.clone());
        self.exec_file(path, &ns)?;
        Ok(ns)
    }

    /// Hand `ns` to the reclaimer
    pub fn retire(
        &self,
        ns: Namespace,
    ) {
        self.inner.reclaimer.borrow_mut().retire(ns);
    }

    /// Namespaces waiting for reclamation
    pub fn retired(&self) -> usize {
        self.inner.reclaimer.borrow().pending()
    }

    /// Release retired namespaces now
    pub fn collect(&self) -> usize {
        self.inner.reclaimer.borrow_mut().collect()
    }

    pub fn finalizer_log(&self) -> Rc<FinalizerLog> {
        Rc::clone(&self.inner.log)
    }

    /// Names of resources finalized so far, in order
    pub fn finalized(&self) -> Vec<String> {
        self.inner.log.entries()
    }
}

impl Reclaim for Host {
    fn reclaim(&mut self) -> usize {
        self.collect()
    }
}

#[cfg(test)]
mod tests;
