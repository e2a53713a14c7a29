//! Top-level task state
//!
//! - [`context`]: thread-scoped handles obtained from the runtime preamble
//! - [`cleanup`]: actions run once the script has finished
//! - [`finalize`]: ordered teardown ending in the runtime postamble
//!
//! A task moves through [`TaskPhase`]s strictly forward; [`Lifecycle`]
//! rejects any other transition.

pub mod cleanup;
pub mod context;
pub mod finalize;

use std::fmt;

use smallvec::SmallVec;
use tracing::debug;

use crate::host::ScriptError;
use crate::runtime::{RuntimeError, TaskHandle};

pub use cleanup::{drain, register, CleanupAction};
pub use context::{bootstrap, current_context, current_runtime, current_task, is_live, TaskContext};
pub use finalize::{finalize, Finalized, Reclaim};

/// Lifecycle of one top-level task invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskPhase {
    Created = 0,
    Bootstrapped = 1,
    Running = 2,
    Draining = 3,
    TornDown = 4,
    Finalized = 5,
}

impl TaskPhase {
    /// The only phase this one may advance to
    pub fn next(self) -> Option<TaskPhase> {
        match self {
            TaskPhase::Created => Some(TaskPhase::Bootstrapped),
            TaskPhase::Bootstrapped => Some(TaskPhase::Running),
            TaskPhase::Running => Some(TaskPhase::Draining),
            TaskPhase::Draining => Some(TaskPhase::TornDown),
            TaskPhase::TornDown => Some(TaskPhase::Finalized),
            TaskPhase::Finalized => None,
        }
    }
}

impl fmt::Display for TaskPhase {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            TaskPhase::Created => "CREATED",
            TaskPhase::Bootstrapped => "BOOTSTRAPPED",
            TaskPhase::Running => "RUNNING",
            TaskPhase::Draining => "DRAINING",
            TaskPhase::TornDown => "TORN_DOWN",
            TaskPhase::Finalized => "FINALIZED",
        };
        f.write_str(name)
    }
}

/// Forward-only phase tracker
#[derive(Debug, Clone)]
pub struct Lifecycle {
    history: SmallVec<[TaskPhase; 6]>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Start in [`TaskPhase::Created`]
    pub fn new() -> Self {
        let mut history = SmallVec::new();
        history.push(TaskPhase::Created);
        Self { history }
    }

    /// Current phase
    pub fn phase(&self) -> TaskPhase {
        self.history
            .last()
            .copied()
            .unwrap_or(TaskPhase::Created)
    }

    /// Move to `to`, which must be the immediate successor
    pub fn advance(
        &mut self,
        to: TaskPhase,
    ) -> Result<(), ProtocolViolation> {
        let from = self.phase();
        if from.next() != Some(to) {
            return Err(ProtocolViolation::PhaseOrder { from, to });
        }
        debug!("task phase {} -> {}", from, to);
        self.history.push(to);
        Ok(())
    }

    /// Every phase visited so far, in order
    pub fn history(&self) -> &[TaskPhase] {
        &self.history
    }
}

/// Misuse of the top-level task protocol
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("{task} is already live on thread {thread}")]
    ContextAlreadyLive { task: TaskHandle, thread: String },
    #[error("no top-level task context is live on this thread")]
    NoLiveContext,
    #[error("task phase {from} cannot advance to {to}")]
    PhaseOrder { from: TaskPhase, to: TaskPhase },
}

/// Anything that ends a top-level task abnormally
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),
    #[error("runtime: {0}")]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error("cleanup action #{index} failed: {error:#}")]
    Cleanup { index: usize, error: anyhow::Error },
    #[error("console: {0}")]
    Console(#[from] std::io::Error),
}

impl TaskError {
    /// Exit status requested by the script, if that is why the task ended
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            TaskError::Script(ScriptError::Exit { code }) => Some(*code),
            _ => None,
        }
    }

    /// Process status for [`exit_code`](Self::exit_code), truncated to the
    /// low byte the way the operating system reports it
    pub fn exit_status(&self) -> Option<u8> {
        self.exit_code().map(|code| (code & 0xff) as u8)
    }
}
