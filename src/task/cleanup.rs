//! Cleanup registry
//!
//! Script-level code registers zero-argument actions while the task runs; they
//! run once, in registration order, after the script has finished.

use std::mem;

use tracing::{error, trace};

use super::context::with_state;
use super::{ProtocolViolation, TaskError};

/// A deferred action owned by the registry until it runs
pub type CleanupAction = Box<dyn FnOnce() -> anyhow::Result<()> + 'static>;

/// Append `action` to the live task's registry
pub fn register<F>(action: F) -> Result<(), ProtocolViolation>
where
    F: FnOnce() -> anyhow::Result<()> + 'static,
{
    with_state(|state| {
        state.cleanup.push(Box::new(action));
        trace!("cleanup action #{} registered", state.cleanup.len());
    })
}

/// Number of actions waiting to run
pub fn pending() -> Result<usize, ProtocolViolation> {
    with_state(|state| state.cleanup.len())
}

/// Run every registered action in order and empty the registry.
///
/// Actions registered while draining run after the ones already queued. The
/// first failure stops the drain and discards everything still queued.
pub fn drain() -> Result<usize, TaskError> {
    let mut index = 0;
    loop {
        // actions run outside the slot borrow so they may register more
        let batch = with_state(|state| mem::take(&mut state.cleanup))?;
        if batch.is_empty() {
            return Ok(index);
        }

        let mut batch = batch.into_iter();
        #[allow(clippy::while_let_on_iterator)]
        while let Some(action) = batch.next() {
            if let Err(err) = action() {
                error!("cleanup action #{} failed: {:#}", index, err);
                let rest: Vec<CleanupAction> = batch.collect();
                let queued = with_state(|state| mem::take(&mut state.cleanup))?;
                drop(rest);
                drop(queued);
                return Err(TaskError::Cleanup { index, error: err });
            }
            index += 1;
        }
    }
}
