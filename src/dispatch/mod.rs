//! Script dispatch
//!
//! The filtered argument vector decides what the top-level task runs:
//!
//! ```text
//! prog                   interactive console
//! prog -                 interactive console
//! prog -c <code>         inline code as the main module
//! prog <script> [args]   script file as the main module
//! ```
//!
//! Inline and file mode register a fresh namespace as the main module. The
//! namespace it replaces is not restored afterwards; other work started by
//! the script may still refer to the new one.

pub mod console;
pub mod repl;

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

pub use console::{Console, EditorConsole, ScriptedConsole, Transcript};
pub use repl::{is_complete, Repl};

use crate::args::ArgumentVector;
use crate::host::{Host, Namespace, ScriptError};
use crate::task::TaskError;
use crate::util::config::ReplConfig;

/// What the argument vector asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchMode {
    Interactive,
    Inline,
    File(PathBuf),
}

impl fmt::Display for DispatchMode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            DispatchMode::Interactive => f.write_str("interactive"),
            DispatchMode::Inline => f.write_str("inline"),
            DispatchMode::File(path) => write!(f, "file {}", path.display()),
        }
    }
}

/// Pick the mode for a filtered argument vector
pub fn select_mode(args: &ArgumentVector) -> DispatchMode {
    match args.arg(1) {
        None | Some("-") => DispatchMode::Interactive,
        Some("-c") => DispatchMode::Inline,
        Some(path) => DispatchMode::File(PathBuf::from(path)),
    }
}

/// Runs the script selected by the argument vector inside a [`Host`]
pub struct Dispatcher<'a, C: Console + ?Sized> {
    host: &'a Host,
    console: &'a mut C,
    repl: &'a ReplConfig,
}

impl<'a, C: Console + ?Sized> Dispatcher<'a, C> {
    pub fn new(
        host: &'a Host,
        console: &'a mut C,
        repl: &'a ReplConfig,
    ) -> Self {
        Self {
            host,
            console,
            repl,
        }
    }

    /// Run whatever `args` selects; returns the mode that ran
    pub fn dispatch(
        &mut self,
        args: &ArgumentVector,
    ) -> Result<DispatchMode, TaskError> {
        let mode = select_mode(args);
        info!("dispatching {}", mode);
        match &mode {
            DispatchMode::Interactive => {
                let turns = self.run_repl()?;
                debug!("console closed after {} turn(s)", turns);
            }
            DispatchMode::Inline => {
                let code = args.arg(2).ok_or_else(|| {
                    ScriptError::Usage("argument expected for the -c option".to_string())
                })?;
                self.run_cmd(code)?;
            }
            DispatchMode::File(path) => {
                self.host.set_program_args(args.clone());
                self.run_path(path)?;
            }
        }
        Ok(mode)
    }

    /// Interactive console in its own namespace, retired once it closes
    pub fn run_repl(&mut self) -> Result<usize, TaskError> {
        let identity = self.host.config().console_module.clone();
        let ns = self.host.new_namespace(&identity);
        let turns = Repl::new(self.host, &mut *self.console, self.repl, ns.clone()).run();
        self.host.retire(ns);
        Ok(turns?)
    }

    /// Run `code` as the main module
    pub fn run_cmd(
        &mut self,
        code: &str,
    ) -> Result<Namespace, ScriptError> {
        let identity = self.host.config().main_module.clone();
        let ns = self.host.new_namespace(&identity);
        self.host.register_module(&identity, ns.clone());
        self.host.exec(code, "<string>", &ns)?;
        Ok(ns)
    }

    /// Run the file at `path` as the main module
    pub fn run_path(
        &mut self,
        path: &Path,
    ) -> Result<Namespace, ScriptError> {
        let identity = self.host.config().main_module.clone();
        let ns = Namespace::for_file(&identity, path);
        self.host.register_module(&identity, ns.clone());

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        debug!("adding {} to the module search path", dir.display());
        self.host.append_search_path(dir);

        self.host.exec_file(path, &ns)?;
        Ok(ns)
    }
}

#[cfg(test)]
mod tests;
