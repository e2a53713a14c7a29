//! Thread-scoped task context
//!
//! The runtime may hand the same worker thread to many tasks over time, so the
//! handles of the running top-level task live in a thread-local slot that is
//! filled by [`bootstrap`] and emptied by teardown. At most one context is live
//! per thread.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::thread;

use tracing::{debug, trace, warn};

use super::cleanup::CleanupAction;
use super::{ProtocolViolation, TaskError};
use crate::runtime::{
    ContextHandle, ProcessorHandle, RegionList, Runtime, RuntimeHandle, TaskHandle,
};

pub(crate) struct TaskState {
    pub(crate) runtime: RuntimeHandle,
    pub(crate) task: TaskHandle,
    pub(crate) context: ContextHandle,
    pub(crate) cleanup: Vec<CleanupAction>,
}

thread_local! {
    static TOP_LEVEL: RefCell<Option<TaskState>> = const { RefCell::new(None) };
}

/// Proof that a top-level task context is live on the current thread.
///
/// Not `Send`: it is only meaningful on the thread that bootstrapped it.
/// Consumed by [`finalize`](super::finalize); if dropped without finalizing,
/// the thread slot is still cleared.
#[derive(Debug)]
pub struct TaskContext {
    runtime: RuntimeHandle,
    task: TaskHandle,
    context: ContextHandle,
    regions: RegionList,
    torn_down: bool,
    _thread: PhantomData<*const ()>,
}

impl TaskContext {
    pub fn runtime(&self) -> RuntimeHandle {
        self.runtime
    }

    pub fn task(&self) -> TaskHandle {
        self.task
    }

    pub fn context(&self) -> ContextHandle {
        self.context
    }

    /// Physical regions mapped for the task
    pub fn regions(&self) -> &RegionList {
        &self.regions
    }

    /// Empty the thread slot, returning actions that were never drained
    pub(crate) fn teardown(&mut self) -> Result<Vec<CleanupAction>, ProtocolViolation> {
        let state = TOP_LEVEL
            .with(|slot| slot.borrow_mut().take())
            .ok_or(ProtocolViolation::NoLiveContext)?;
        self.torn_down = true;
        debug!("{} context cleared", state.task);
        Ok(state.cleanup)
    }
}

impl Drop for TaskContext {
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        warn!("{} dropped without finalize, clearing context", self.task);
        let leftover = TOP_LEVEL.with(|slot| {
            let mut slot = slot.borrow_mut();
            match slot.as_ref() {
                Some(state) if state.task == self.task => slot.take(),
                _ => None,
            }
        });
        drop(leftover);
    }
}

/// Run the runtime preamble and make the task context live on this thread.
pub fn bootstrap<R: Runtime + ?Sized>(
    runtime: &R,
    raw_args: &[u8],
    user_data: &[u8],
    processor: ProcessorHandle,
) -> Result<TaskContext, TaskError> {
    if let Ok(task) = current_task() {
        return Err(ProtocolViolation::ContextAlreadyLive {
            task,
            thread: thread_label(),
        }
        .into());
    }

    let preamble = runtime.preamble(raw_args, processor)?;
    trace!(
        "{} bootstrapped on {}: {} region(s), {} byte(s) of user data",
        preamble.task,
        processor,
        preamble.regions.len(),
        user_data.len()
    );

    TOP_LEVEL.with(|slot| {
        *slot.borrow_mut() = Some(TaskState {
            runtime: preamble.runtime,
            task: preamble.task,
            context: preamble.context,
            cleanup: Vec::new(),
        });
    });

    Ok(TaskContext {
        runtime: preamble.runtime,
        task: preamble.task,
        context: preamble.context,
        regions: preamble.regions,
        torn_down: false,
        _thread: PhantomData,
    })
}

/// Run `f` against the live task state
pub(crate) fn with_state<T>(f: impl FnOnce(&mut TaskState) -> T) -> Result<T, ProtocolViolation> {
    TOP_LEVEL.with(|slot| {
        slot.borrow_mut()
            .as_mut()
            .map(f)
            .ok_or(ProtocolViolation::NoLiveContext)
    })
}

/// Whether a task context is live on this thread
pub fn is_live() -> bool {
    TOP_LEVEL.with(|slot| slot.borrow().is_some())
}

/// Runtime handle of the live task
pub fn current_runtime() -> Result<RuntimeHandle, ProtocolViolation> {
    with_state(|state| state.runtime)
}

/// Context handle of the live task
pub fn current_context() -> Result<ContextHandle, ProtocolViolation> {
    with_state(|state| state.context)
}

/// Task handle of the live task
pub fn current_task() -> Result<TaskHandle, ProtocolViolation> {
    with_state(|state| state.task)
}

fn thread_label() -> String {
    let current = thread::current();
    match current.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", current.id()),
    }
}
