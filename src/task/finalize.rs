//! Finalizer
//!
//! Order matters and is fixed:
//!
//! 1. drain the cleanup registry
//! 2. clear the thread-scoped context
//! 3. force reclamation of everything the script left unreachable
//! 4. signal completion through the runtime postamble
//!
//! Finalizers run during step 3 may still talk to the runtime, which is only
//! released by step 4.

use tracing::{debug, error};

use super::context::TaskContext;
use super::{cleanup, Lifecycle, TaskError, TaskPhase};
use crate::runtime::Runtime;

/// Something holding resources that must be released before the postamble
pub trait Reclaim {
    /// Release everything unreachable; returns how many objects were freed
    fn reclaim(&mut self) -> usize;
}

/// What finalization did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Finalized {
    /// Cleanup actions that ran successfully
    pub cleanup_run: usize,
    /// Objects released by forced reclamation
    pub reclaimed: usize,
}

/// Tear down `ctx` and hand control back to the runtime.
///
/// Teardown, reclamation and the postamble happen even when a cleanup action
/// fails; the cleanup error is returned afterwards. Called outside the
/// running phase, it skips cleanup and reclamation but still clears the
/// context and signals the postamble.
pub fn finalize<R, C>(
    mut ctx: TaskContext,
    runtime: &R,
    lifecycle: &mut Lifecycle,
    reclaim: &mut C,
) -> Result<Finalized, TaskError>
where
    R: Runtime + ?Sized,
    C: Reclaim + ?Sized,
{
    if let Err(violation) = lifecycle.advance(TaskPhase::Draining) {
        // nothing runs, but the thread still goes back to the runtime
        error!("cannot finalize {}: {}", ctx.task(), violation);
        drop(ctx.teardown());
        if let Err(err) = runtime.postamble(ctx.runtime(), ctx.context(), None) {
            error!("postamble for {} failed: {}", ctx.task(), err);
        }
        return Err(violation.into());
    }
    let drained = cleanup::drain();

    let leftover = ctx.teardown()?;
    if !leftover.is_empty() {
        debug!("discarding {} cleanup action(s) after failed drain", leftover.len());
    }
    drop(leftover);
    lifecycle.advance(TaskPhase::TornDown)?;

    let reclaimed = reclaim.reclaim();
    debug!("{} reclaimed {} object(s)", ctx.task(), reclaimed);

    let signalled = runtime.postamble(ctx.runtime(), ctx.context(), None);
    if let Err(err) = &signalled {
        error!("postamble for {} failed: {}", ctx.task(), err);
    }
    lifecycle.advance(TaskPhase::Finalized)?;

    let cleanup_run = drained?;
    signalled?;
    Ok(Finalized {
        cleanup_run,
        reclaimed,
    })
}
