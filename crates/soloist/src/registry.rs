//! # Service Registry
//!
//! The table of exposed functions the singleton can run, keyed by name.
//!
//! Entries speak bytes: arguments arrive serialized and the entry returns an
//! `Outcome` holding the serialized result. Binding typed handlers to this
//! byte-level interface is the binder's job.
//!
//! Uses DashMap so dispatch can read while registrations are still being
//! made. Registering a name twice replaces the earlier entry; a call either
//! sees the old entry or the new one.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use solowire::Failure;
use solowire::ReplyFrame;
use tracing::debug;
use tracing::warn;

use crate::arguments::Arguments;

/// The result of running one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The handler returned a value, already serialized.
    Value(Vec<u8>),
    /// The handler returned no value.
    Empty,
    Failed(Failure),
}

impl From<Outcome> for ReplyFrame {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Value(bytes) => ReplyFrame::Value(bytes),
            Outcome::Empty => ReplyFrame::Empty,
            Outcome::Failed(failure) => ReplyFrame::Failed(failure),
        }
    }
}

/// A byte-level handler: serialized arguments in, `Outcome` out.
pub type RawHandler = Arc<dyn Fn(Arguments<Vec<u8>>) -> Outcome + Send + Sync>;

/// A named capability the singleton exposes.
#[derive(Clone)]
pub struct ExposedFunction {
    name: String,
    handler: RawHandler,
}

impl ExposedFunction {
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Arguments<Vec<u8>>) -> Outcome + Send + Sync + 'static,
    {
        Self { name: name.into(), handler: Arc::new(handler) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the handler on the calling thread.
    pub fn call(&self, args: Arguments<Vec<u8>>) -> Outcome {
        (self.handler)(args)
    }
}

impl fmt::Debug for ExposedFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExposedFunction").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Name to entry mapping owned by a singleton server.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    entries: DashMap<String, ExposedFunction>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `entry`, returning the entry it replaced, if any.
    pub fn register(&self, entry: ExposedFunction) -> Option<ExposedFunction> {
        let name = entry.name.clone();
        let previous = self.entries.insert(name.clone(), entry);
        if previous.is_some() {
            warn!(function = %name, "replacing previously registered function");
        } else {
            debug!(function = %name, "registered function");
        }
        previous
    }

    /// Returns a handle to the entry; the map is not locked while it runs.
    pub fn get(&self, name: &str) -> Option<ExposedFunction> {
        self.entries.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn remove(&self, name: &str) -> Option<ExposedFunction> {
        self.entries.remove(name).map(|(_, entry)| entry)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
