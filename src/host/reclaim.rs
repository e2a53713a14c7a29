//! Forced reclamation
//!
//! Values are reference counted, so most of them go away as soon as the script
//! drops them. What stays behind are namespaces the host itself let go of: the
//! console namespace once the interactive loop ends, and module registrations
//! that were replaced. Those are parked here as *retired* and released in one
//! pass right before the task signals completion, so resource finalizers run
//! while the runtime context is still valid.

use std::cell::RefCell;
use std::mem;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use super::namespace::Namespace;
use crate::runtime::local::Journal;

/// Reclaimer configuration
#[derive(Debug, Clone)]
pub struct ReclaimConfig {
    /// Clear bindings of retired namespaces nobody else holds
    pub clear_retired: bool,
    /// Passes slower than this are reported
    pub slow_pause: Duration,
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            clear_retired: true,
            slow_pause: Duration::from_millis(10),
        }
    }
}

/// Reclaimer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimState {
    Idle,
    Releasing,
}

/// Record of resources whose finalizers have run
#[derive(Debug, Default)]
pub struct FinalizerLog {
    entries: RefCell<Vec<String>>,
    journal: Option<Journal>,
}

impl FinalizerLog {
    pub fn new(journal: Option<Journal>) -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
            journal,
        }
    }

    fn record(
        &self,
        name: &str,
    ) {
        self.entries.borrow_mut().push(name.to_string());
        if let Some(journal) = &self.journal {
            journal.note(format!("finalized {}", name));
        }
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

static NEXT_RESOURCE: AtomicU64 = AtomicU64::new(1);

/// A script-visible resource with a finalizer
#[derive(Debug)]
pub struct Resource {
    id: u64,
    name: String,
    log: Rc<FinalizerLog>,
}

impl Resource {
    pub fn new(
        name: impl Into<String>,
        log: Rc<FinalizerLog>,
    ) -> Self {
        let id = NEXT_RESOURCE.fetch_add(1, Ordering::Relaxed);
        let name = name.into();
        trace!("resource #{} '{}' acquired", id, name);
        Self { id, name, log }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Resource {
    fn drop(&mut self) {
        trace!("resource #{} '{}' finalized", self.id, self.name);
        self.log.record(&self.name);
    }
}

/// Releases retired namespaces on demand
#[derive(Debug)]
pub struct Reclaimer {
    config: ReclaimConfig,
    state: ReclaimState,
    retired: Vec<Namespace>,
    log: Rc<FinalizerLog>,
    total_pause: Duration,
    last_pause: Duration,
    collections: usize,
}

impl Reclaimer {
    pub fn new(
        config: ReclaimConfig,
        log: Rc<FinalizerLog>,
    ) -> Self {
        Self {
            config,
            state: ReclaimState::Idle,
            retired: Vec::new(),
            log,
            total_pause: Duration::ZERO,
            last_pause: Duration::ZERO,
            collections: 0,
        }
    }

    /// Park `ns` until the next collection
    pub fn retire(
        &mut self,
        ns: Namespace,
    ) {
        trace!("retiring namespace {:?}", ns.identity());
        self.retired.push(ns);
    }

    /// Namespaces waiting to be released
    pub fn pending(&self) -> usize {
        self.retired.len()
    }

    /// Release every retired namespace; returns namespaces released plus
    /// resources finalized during the pass
    pub fn collect(&mut self) -> usize {
        self.state = ReclaimState::Releasing;
        let start = Instant::now();
        let finalized_before = self.log.len();

        let retired = mem::take(&mut self.retired);
        let released = retired.len();
        for ns in retired {
            // other handles keep it alive; only drop ours
            if self.config.clear_retired && ns.handle_count() == 1 {
                ns.clear();
            }
            drop(ns);
        }

        let finalized = self.log.len() - finalized_before;
        self.last_pause = start.elapsed();
        self.total_pause += self.last_pause;
        self.collections += 1;
        self.state = ReclaimState::Idle;

        if self.last_pause > self.config.slow_pause {
            warn!("reclamation took {:?}", self.last_pause);
        }
        debug!(
            "reclaimed {} namespace(s), finalized {} resource(s)",
            released, finalized
        );
        if let Some(journal) = &self.log.journal {
            journal.note(format!("reclaimed {}", released + finalized));
        }
        released + finalized
    }

    pub fn state(&self) -> ReclaimState {
        self.state
    }

    pub fn collections(&self) -> usize {
        self.collections
    }

    pub fn total_pause(&self) -> Duration {
        self.total_pause
    }

    pub fn last_pause(&self) -> Duration {
        self.last_pause
    }

    pub fn log(&self) -> &Rc<FinalizerLog> {
        &self.log
    }
}
