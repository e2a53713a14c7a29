//! In-process runtime
//!
//! `LocalRuntime` plays the runtime's part of the top-level handshake without a
//! distributed scheduler behind it. It owns one worker thread that is reused
//! for every task it executes, hands out handles, checks the
//! preamble/postamble discipline and keeps a journal of what happened.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::{
    ContextHandle, Preamble, ProcessorHandle, RegionList, Runtime, RuntimeError, RuntimeHandle,
    TaskHandle,
};
use crate::args::{ArgumentVector, RESERVED_OPTIONS};

/// Options the runtime reads from its own argument vector.
///
/// These are the reserved options the top-level task filters out before the
/// script runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeOptions {
    /// `-level <n>`: 0 spew, 1 debug, 2 info, 3 print, 4 warning, 5 error
    pub log_level: Option<u8>,
    /// `-logfile <path>`
    pub logfile: Option<PathBuf>,
    /// `-ll:cpu <n>`
    pub cpus: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            log_level: None,
            logfile: None,
            cpus: 1,
        }
    }
}

impl RuntimeOptions {
    /// Read the options this runtime understands; everything else is ignored
    pub fn parse(args: &ArgumentVector) -> Self {
        let mut options = Self::default();
        let mut iter = args.iter().skip(1).peekable();
        while let Some(arg) = iter.next() {
            if !RESERVED_OPTIONS.matches(arg) {
                continue;
            }
            let value = iter.next_if(|next| !next.starts_with('-'));
            match (arg.as_str(), value) {
                ("-level", Some(v)) => options.log_level = v.parse().ok(),
                ("-logfile", Some(v)) => options.logfile = Some(PathBuf::from(v)),
                ("-ll:cpu", Some(v)) => {
                    options.cpus = v.parse().map(|n: usize| n.max(1)).unwrap_or(1);
                }
                _ => {}
            }
        }
        options
    }
}

/// One observable event on the runtime side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    Preamble {
        task: TaskHandle,
        context: ContextHandle,
    },
    Postamble {
        context: ContextHandle,
        result_len: usize,
    },
    /// Free-form marker recorded by collaborators sharing the journal
    Note(String),
}

/// Shared, append-only event log
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<JournalEntry>>>);

impl Journal {
    /// Create an empty journal
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn record(
        &self,
        entry: JournalEntry,
    ) {
        self.0.lock().push(entry);
    }

    /// Append a note
    pub fn note(
        &self,
        text: impl Into<String>,
    ) {
        self.record(JournalEntry::Note(text.into()));
    }

    /// Snapshot of all entries
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.0.lock().clone()
    }

    /// Position of the first entry matching `pred`
    pub fn position(
        &self,
        pred: impl Fn(&JournalEntry) -> bool,
    ) -> Option<usize> {
        self.0.lock().iter().position(pred)
    }
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Stack reserved for the worker thread; script evaluation recurses
pub const WORKER_STACK_SIZE: usize = 32 * 1024 * 1024;

struct Worker {
    sender: Option<Sender<Job>>,
    thread: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl Worker {
    fn spawn(name: String) -> std::io::Result<Self> {
        let (sender, receiver) = channel::unbounded::<Job>();
        let thread = thread::Builder::new()
            .name(name)
            .stack_size(WORKER_STACK_SIZE)
            .spawn(move || {
                for job in receiver {
                    job();
                }
            })?;
        let thread_id = thread.thread().id();
        Ok(Self {
            sender: Some(sender),
            thread: Some(thread),
            thread_id,
        })
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(thread) = self.thread.take() {
            // the last handle can be released by a job running on the worker itself
            if thread::current().id() != self.thread_id && thread.join().is_err() {
                warn!("runtime worker exited by panic");
            }
        }
    }
}

struct Inner {
    handle: RuntimeHandle,
    args: ArgumentVector,
    options: RuntimeOptions,
    next_id: AtomicU64,
    /// Tasks between preamble and postamble
    live: Mutex<HashMap<ContextHandle, TaskHandle>>,
    /// Which task each thread is currently bound to
    bound: Mutex<HashMap<ThreadId, TaskHandle>>,
    journal: Journal,
    worker: Mutex<Option<Worker>>,
}

/// In-process implementation of [`Runtime`]
#[derive(Clone)]
pub struct LocalRuntime {
    inner: Arc<Inner>,
}

impl fmt::Debug for LocalRuntime {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("LocalRuntime")
            .field("handle", &self.inner.handle)
            .field("args", &self.inner.args)
            .field("options", &self.inner.options)
            .finish()
    }
}

static NEXT_RUNTIME: AtomicU64 = AtomicU64::new(1);

impl LocalRuntime {
    /// Create a runtime over the given process arguments
    pub fn new(args: ArgumentVector) -> Self {
        Self::with_journal(args, Journal::new())
    }

    /// Create a runtime recording into an existing journal
    pub fn with_journal(
        args: ArgumentVector,
        journal: Journal,
    ) -> Self {
        let options = RuntimeOptions::parse(&args);
        let handle = RuntimeHandle::new(NEXT_RUNTIME.fetch_add(1, Ordering::SeqCst));
        debug!("{} up with {} cpu(s)", handle, options.cpus);
        Self {
            inner: Arc::new(Inner {
                handle,
                args,
                options,
                next_id: AtomicU64::new(1),
                live: Mutex::new(HashMap::new()),
                bound: Mutex::new(HashMap::new()),
                journal,
                worker: Mutex::new(None),
            }),
        }
    }

    /// This runtime's handle
    pub fn handle(&self) -> RuntimeHandle {
        self.inner.handle
    }

    /// Options parsed from the argument vector
    pub fn options(&self) -> &RuntimeOptions {
        &self.inner.options
    }

    /// Event journal
    pub fn journal(&self) -> &Journal {
        &self.inner.journal
    }

    /// Processor `index`, clamped to the configured count
    pub fn processor(
        &self,
        index: usize,
    ) -> ProcessorHandle {
        let index = index.min(self.inner.options.cpus - 1);
        ProcessorHandle::new(0x1d00_0000_0000_0000 | index as u64)
    }

    /// Number of tasks between preamble and postamble
    pub fn live_tasks(&self) -> usize {
        self.inner.live.lock().len()
    }

    /// Thread that executes tasks, once one has been started
    pub fn worker_thread(&self) -> Option<ThreadId> {
        self.inner.worker.lock().as_ref().map(|w| w.thread_id)
    }

    /// Run `job` on the worker thread and wait for its result.
    ///
    /// Every call reuses the same thread, the way a scheduler hands a thread
    /// to one task after another.
    pub fn execute<F, T>(
        &self,
        job: F,
    ) -> Result<T, RuntimeError>
    where
        F: FnOnce(&LocalRuntime) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = channel::bounded(1);
        let runtime = self.clone();
        let boxed: Job = Box::new(move || {
            let value = job(&runtime);
            let _ = result_tx.send(value);
        });

        {
            let mut worker = self.inner.worker.lock();
            if worker.is_none() {
                let name = format!("toptask-worker-{}", self.inner.handle.raw());
                *worker = Some(Worker::spawn(name).map_err(|_| RuntimeError::ShutDown)?);
            }
            let sender = worker
                .as_ref()
                .and_then(|w| w.sender.as_ref())
                .ok_or(RuntimeError::ShutDown)?;
            sender.send(boxed).map_err(|_| RuntimeError::ShutDown)?;
        }

        // a panicking job drops the sender without a value
        result_rx.recv().map_err(|_| RuntimeError::ShutDown)
    }

    fn allocate(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

impl Runtime for LocalRuntime {
    fn input_args(&self) -> ArgumentVector {
        self.inner.args.clone()
    }

    fn preamble(
        &self,
        raw_args: &[u8],
        processor: ProcessorHandle,
    ) -> Result<Preamble, RuntimeError> {
        let thread = thread::current().id();
        let mut bound = self.inner.bound.lock();
        if let Some(task) = bound.get(&thread) {
            return Err(RuntimeError::DuplicatePreamble(*task));
        }

        let id = self.allocate();
        let task = TaskHandle::new(id);
        let context = ContextHandle::new((id << 8) | 0x01);
        bound.insert(thread, task);
        self.inner.live.lock().insert(context, task);
        self.inner
            .journal
            .record(JournalEntry::Preamble { task, context });
        trace!(
            "preamble {} on {} with {} byte(s) of task args",
            task,
            processor,
            raw_args.len()
        );

        Ok(Preamble {
            task,
            regions: RegionList::new(),
            context,
            runtime: self.inner.handle,
        })
    }

    fn postamble(
        &self,
        runtime: RuntimeHandle,
        context: ContextHandle,
        result: Option<&[u8]>,
    ) -> Result<(), RuntimeError> {
        if runtime != self.inner.handle {
            return Err(RuntimeError::ForeignContext { runtime, context });
        }
        let task = self
            .inner
            .live
            .lock()
            .remove(&context)
            .ok_or(RuntimeError::UnknownContext(context))?;
        self.inner.bound.lock().retain(|_, bound| *bound != task);

        let result_len = result.map_or(0, <[u8]>::len);
        self.inner.journal.record(JournalEntry::Postamble {
            context,
            result_len,
        });
        trace!("postamble {} ({} byte result)", task, result_len);
        Ok(())
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let live = self.live.get_mut();
        if !live.is_empty() {
            warn!("{} dropped with {} unfinished task(s)", self.handle, live.len());
        }
    }
}
