//! Runtime interface
//!
//! The task-parallel runtime is an external collaborator. The top-level task
//! only needs three calls from it: the argument vector, the preamble that
//! hands out task handles, and the postamble that signals completion.
//!
//! [`local::LocalRuntime`] implements the interface in-process.

pub mod local;

use std::fmt;

use smallvec::SmallVec;

use crate::args::ArgumentVector;

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw handle value
            #[inline]
            pub fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Raw handle value
            #[inline]
            pub fn raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(
                &self,
                f: &mut fmt::Formatter<'_>,
            ) -> fmt::Result {
                write!(f, concat!($label, "({:#x})"), self.0)
            }
        }
    };
}

handle_type!(
    /// Handle to the runtime instance
    RuntimeHandle,
    "Runtime"
);
handle_type!(
    /// Handle to a running task
    TaskHandle,
    "Task"
);
handle_type!(
    /// Handle to a task's execution context
    ContextHandle,
    "Context"
);
handle_type!(
    /// Processor the task was mapped onto
    ProcessorHandle,
    "Proc"
);
handle_type!(
    /// Physical region mapped for a task
    PhysicalRegion,
    "Region"
);

/// Region list returned by the preamble; top-level tasks usually get none.
pub type RegionList = SmallVec<[PhysicalRegion; 4]>;

/// Handles returned by [`Runtime::preamble`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preamble {
    pub task: TaskHandle,
    pub regions: RegionList,
    pub context: ContextHandle,
    pub runtime: RuntimeHandle,
}

/// Errors reported by the runtime side of the handshake
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("preamble called twice for {0}")]
    DuplicatePreamble(TaskHandle),
    #[error("postamble for unknown {0}")]
    UnknownContext(ContextHandle),
    #[error("{runtime} does not own {context}")]
    ForeignContext {
        runtime: RuntimeHandle,
        context: ContextHandle,
    },
    #[error("runtime has shut down")]
    ShutDown,
}

/// Calls the top-level task makes into the runtime.
///
/// `preamble` must come before any other task-scoped call and `postamble` must
/// be the last one; both happen exactly once per task.
pub trait Runtime {
    /// The runtime's view of the process arguments, verbatim
    fn input_args(&self) -> ArgumentVector;

    /// Bind the calling thread's task and return its handles
    fn preamble(
        &self,
        raw_args: &[u8],
        processor: ProcessorHandle,
    ) -> Result<Preamble, RuntimeError>;

    /// Signal completion of the task owning `context`
    fn postamble(
        &self,
        runtime: RuntimeHandle,
        context: ContextHandle,
        result: Option<&[u8]>,
    ) -> Result<(), RuntimeError>;
}

impl<R: Runtime + ?Sized> Runtime for &R {
    fn input_args(&self) -> ArgumentVector {
        (**self).input_args()
    }

    fn preamble(
        &self,
        raw_args: &[u8],
        processor: ProcessorHandle,
    ) -> Result<Preamble, RuntimeError> {
        (**self).preamble(raw_args, processor)
    }

    fn postamble(
        &self,
        runtime: RuntimeHandle,
        context: ContextHandle,
        result: Option<&[u8]>,
    ) -> Result<(), RuntimeError> {
        (**self).postamble(runtime, context, result)
    }
}

#[cfg(test)]
mod tests;
