// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Start/completion observers for asynchronous computations.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

/// How an asynchronous computation ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskOutcome {
    /// The formula produced a value, which was applied to the property.
    Succeeded,
    /// The formula failed; no value was applied.
    Faulted,
    /// The formula observed cancellation; no value was applied.
    Cancelled,
}

impl TaskOutcome {
    /// Maps the outcome to the tri-state used by completion callbacks.
    ///
    /// `Some(true)` for success, `Some(false)` for failure, `None` for
    /// cancellation.
    #[must_use]
    pub fn as_success(self) -> Option<bool> {
        match self {
            Self::Succeeded => Some(true),
            Self::Faulted => Some(false),
            Self::Cancelled => None,
        }
    }
}

/// Receives the start and outcome of an asynchronous computation.
///
/// `notify_task_starting` is called synchronously from the read that started
/// (or joined) the computation. `notify_task_completed` is called on the
/// owning context after the property has left the computing state, so it may
/// read the property again.
pub trait TaskListener {
    /// A computation this listener is attached to has started.
    fn notify_task_starting(&self);

    /// The computation ended with `outcome`.
    fn notify_task_completed(&self, outcome: TaskOutcome);
}

/// Fans notifications out to several listeners in insertion order.
#[derive(Clone, Default)]
pub struct AggregateTaskListener {
    listeners: SmallVec<[Rc<dyn TaskListener>; 2]>,
}

thread_local! {
    static EMPTY: Rc<AggregateTaskListener> = Rc::new(AggregateTaskListener::default());
}

impl AggregateTaskListener {
    /// Creates an aggregate over `listeners`.
    pub fn new(listeners: impl IntoIterator<Item = Rc<dyn TaskListener>>) -> Self {
        Self {
            listeners: listeners.into_iter().collect(),
        }
    }

    /// Returns the shared listener that does nothing.
    #[must_use]
    pub fn empty() -> Rc<Self> {
        EMPTY.with(Rc::clone)
    }

    /// Appends a listener.
    pub fn push(&mut self, listener: Rc<dyn TaskListener>) {
        self.listeners.push(listener);
    }

    /// Returns the number of wrapped listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Returns `true` if no listener is wrapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl TaskListener for AggregateTaskListener {
    fn notify_task_starting(&self) {
        for listener in &self.listeners {
            listener.notify_task_starting();
        }
    }

    fn notify_task_completed(&self, outcome: TaskOutcome) {
        for listener in &self.listeners {
            listener.notify_task_completed(outcome);
        }
    }
}

impl fmt::Debug for AggregateTaskListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateTaskListener")
            .field("len", &self.listeners.len())
            .finish()
    }
}

/// A listener that records what it was told.
///
/// Useful for observing a single read, and in tests.
#[derive(Debug, Default)]
pub struct RecordingListener {
    started: Cell<usize>,
    outcomes: RefCell<Vec<TaskOutcome>>,
}

impl RecordingListener {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Returns how many times a start was reported.
    #[must_use]
    pub fn started(&self) -> usize {
        self.started.get()
    }

    /// Returns the reported outcomes, oldest first.
    #[must_use]
    pub fn outcomes(&self) -> Vec<TaskOutcome> {
        self.outcomes.borrow().clone()
    }
}

impl TaskListener for RecordingListener {
    fn notify_task_starting(&self) {
        self.started.set(self.started.get() + 1);
    }

    fn notify_task_completed(&self, outcome: TaskOutcome) {
        self.outcomes.borrow_mut().push(outcome);
    }
}
