//! Program arguments as seen by the top-level task
//!
//! The runtime keeps its own copy of the process argument vector. Before the
//! script sees it, every option reserved for a runtime subsystem is stripped
//! together with its value.

use std::fmt;
use std::ops::Deref;

use once_cell::sync::Lazy;
use tracing::trace;

use crate::runtime::Runtime;

/// Ordered argument list; index 0 is the program name by convention.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArgumentVector(Vec<String>);

impl ArgumentVector {
    /// Create from any sequence of strings
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(args.into_iter().map(Into::into).collect())
    }

    /// Program name, if present
    pub fn program(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Argument at `index`
    pub fn arg(
        &self,
        index: usize,
    ) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    /// Consume into the underlying vector
    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

impl Deref for ArgumentVector {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<String>> for ArgumentVector {
    fn from(args: Vec<String>) -> Self {
        Self(args)
    }
}

impl fmt::Display for ArgumentVector {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// Options owned by runtime subsystems.
///
/// This table is shared with the runtime's option parser and must not drift
/// from it.
#[derive(Debug, Clone, Copy)]
pub struct ReservedOptionSpec {
    /// Subsystem namespace markers, matched with `starts_with`
    pub prefixes: &'static [&'static str],
    /// Options matched exactly
    pub exact: &'static [&'static str],
}

impl ReservedOptionSpec {
    /// Whether `arg` names a reserved option
    pub fn matches(
        &self,
        arg: &str,
    ) -> bool {
        self.prefixes.iter().any(|prefix| arg.starts_with(prefix))
            || self.exact.iter().any(|name| arg == *name)
    }
}

/// The runtime's reserved options.
pub static RESERVED_OPTIONS: Lazy<ReservedOptionSpec> = Lazy::new(|| ReservedOptionSpec {
    prefixes: &[
        "-lg:", "-hl:", "-realm:", "-ll:", "-cuda:", "-numa:", "-dm:", "-bishop:",
    ],
    exact: &["-level", "-logfile"],
});

/// Strip runtime options from `args`.
///
/// Every reserved option is assumed to take one value, unless the token after
/// it starts with a dash; such a token is left in place and may be read as a
/// flag downstream.
pub fn filter(
    args: &ArgumentVector,
    filter_runtime_options: bool,
) -> ArgumentVector {
    if !filter_runtime_options {
        return args.clone();
    }
    filter_with(args, &RESERVED_OPTIONS)
}

/// [`filter`] against an explicit option table
pub fn filter_with(
    args: &ArgumentVector,
    spec: &ReservedOptionSpec,
) -> ArgumentVector {
    let mut out = args.0.clone();
    // index 0 is the program name
    let mut i = 1;
    while i < out.len() {
        if spec.matches(&out[i]) {
            let option = out.remove(i);
            if i < out.len() && !out[i].starts_with('-') {
                let value = out.remove(i);
                trace!("dropped runtime option {} {}", option, value);
            } else {
                trace!("dropped runtime option {}", option);
            }
            continue;
        }
        i += 1;
    }
    ArgumentVector(out)
}

/// Fetch the runtime's argument vector, optionally filtered.
pub fn input_args<R: Runtime + ?Sized>(
    runtime: &R,
    filter_runtime_options: bool,
) -> ArgumentVector {
    let raw = runtime.input_args();
    filter(&raw, filter_runtime_options)
}
