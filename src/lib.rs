//! toptask: a scripting host as the top-level task of a task-parallel runtime
//!
//! The runtime calls one entry point on a worker thread. That entry point
//! exchanges handles with the runtime, runs a tl script the way a normal
//! program invocation would, and returns control with every host-side
//! resource released.
//!
//! ```text
//! input_args ─► filter ─► bootstrap ─► dispatch ─► drain ─► teardown ─► reclaim ─► postamble
//! ```
//!
//! # Example
//!
//! ```no_run
//! use toptask::runtime::local::LocalRuntime;
//! use toptask::{ArgumentVector, TopLevel, TopLevelConfig};
//!
//! let runtime = LocalRuntime::new(ArgumentVector::new(["toptask", "-c", "print(1 + 2)"]));
//! let report = runtime
//!     .execute(|rt| {
//!         let processor = rt.processor(0);
//!         TopLevel::new(rt.clone(), TopLevelConfig::default())
//!             .run(&[], &[], processor)
//!             .map_err(|e| e.to_string())
//!     })
//!     .unwrap()
//!     .unwrap();
//! println!("{} finished in {} mode", report.task, report.mode);
//! ```

#![warn(rust_2018_idioms)]

pub mod args;
pub mod dispatch;
pub mod host;
pub mod runtime;
pub mod task;
pub mod util;

use tracing::{debug, error, info};

pub use args::{filter, ArgumentVector, RESERVED_OPTIONS};
pub use dispatch::{Console, DispatchMode, Dispatcher, EditorConsole};
pub use host::{Host, Output, ScriptError};
pub use runtime::{ProcessorHandle, Runtime, RuntimeError, TaskHandle};
pub use task::{Lifecycle, ProtocolViolation, TaskError, TaskPhase};
pub use util::config::TopLevelConfig;

use crate::runtime::local::Journal;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Binary name
pub const NAME: &str = "toptask";

/// Summary of one top-level task invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub task: TaskHandle,
    pub mode: DispatchMode,
    /// Phases visited, in order
    pub phases: Vec<TaskPhase>,
    /// Cleanup actions that ran
    pub cleanup_run: usize,
    /// Objects released by forced reclamation
    pub reclaimed: usize,
}

/// The top-level task entry point
pub struct TopLevel<R: Runtime> {
    runtime: R,
    config: TopLevelConfig,
    console: Option<Box<dyn Console>>,
    output: Output,
    journal: Option<Journal>,
}

impl<R: Runtime> TopLevel<R> {
    pub fn new(
        runtime: R,
        config: TopLevelConfig,
    ) -> Self {
        Self {
            runtime,
            config,
            console: None,
            output: Output::Stdout,
            journal: None,
        }
    }

    /// Console for interactive mode; a terminal editor by default
    pub fn with_console(
        mut self,
        console: impl Console + 'static,
    ) -> Self {
        self.console = Some(Box::new(console));
        self
    }

    /// Where script `print` output goes
    pub fn with_output(
        mut self,
        output: Output,
    ) -> Self {
        self.output = output;
        self
    }

    /// Note resource finalization and reclamation in `journal`
    pub fn with_journal(
        mut self,
        journal: Journal,
    ) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Run the whole top-level task on the current thread.
    ///
    /// A script error does not skip finalization: cleanup actions registered
    /// before the failure still run, and the postamble is still signalled.
    /// The script error is returned afterwards, ahead of any cleanup error.
    pub fn run(
        mut self,
        raw_args: &[u8],
        user_data: &[u8],
        processor: ProcessorHandle,
    ) -> Result<TaskReport, TaskError> {
        let mut lifecycle = Lifecycle::new();
        let ctx = task::bootstrap(&self.runtime, raw_args, user_data, processor)?;
        lifecycle.advance(TaskPhase::Bootstrapped)?;
        let task_handle = ctx.task();
        info!("{} started", task_handle);

        let mut host = Host::with_output(&self.config.host, self.output.clone(), self.journal.take());
        lifecycle.advance(TaskPhase::Running)?;

        let args = args::input_args(&self.runtime, self.config.task.filter_runtime_options);
        debug!("script arguments: {}", args);
        let dispatched = self.dispatch(&host, &args);

        let finalized = task::finalize(ctx, &self.runtime, &mut lifecycle, &mut host);
        drop(host);

        if let (Err(_), Err(err)) = (&dispatched, &finalized) {
            error!("{} finalization also failed: {}", task_handle, err);
        }
        let mode = dispatched?;
        let finalized = finalized?;
        info!(
            "{} finished: {} cleanup action(s), {} object(s) reclaimed",
            task_handle, finalized.cleanup_run, finalized.reclaimed
        );
        Ok(TaskReport {
            task: task_handle,
            mode,
            phases: lifecycle.history().to_vec(),
            cleanup_run: finalized.cleanup_run,
            reclaimed: finalized.reclaimed,
        })
    }

    fn dispatch(
        &mut self,
        host: &Host,
        args: &ArgumentVector,
    ) -> Result<DispatchMode, TaskError> {
        let mut console: Box<dyn Console> = match self.console.take() {
            Some(console) => console,
            None if dispatch::select_mode(args) == DispatchMode::Interactive => {
                Box::new(EditorConsole::new(&self.config.repl)?)
            }
            None => Box::new(dispatch::ScriptedConsole::default()),
        };
        Dispatcher::new(host, console.as_mut(), &self.config.repl).dispatch(args)
    }
}
