// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Memoized formulas over tracked sources.

use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use core::cell::RefCell;
use core::fmt;

use crate::helper::Node;
use crate::source::{Dependent, SourceNode};
use crate::tracker::DependencyTracker;

/// A memoized formula that is recomputed after any source it read changes.
///
/// The first [`get_value`](Self::get_value) evaluates the formula inside a
/// tracker frame; every source read during that evaluation links this
/// property as a dependent. When one of them changes, the cached value is
/// dropped, dependents of this property are invalidated in turn, and the
/// property is reported as changed. The formula runs again on the next read.
///
/// A `CalculatedProperty` is itself a [`Source`](crate::Source), so formulas
/// can be layered.
///
/// # Invariants
///
/// 1. The formula runs at most once between two invalidations.
/// 2. Invalidating an already-invalid property does nothing and reports
///    nothing.
/// 3. If the formula panics, nothing is cached and the next read retries.
pub struct CalculatedProperty<T> {
    source: SourceNode,
    tracker: DependencyTracker,
    formula: Box<dyn Fn() -> T>,
    value: RefCell<Option<T>>,
    this: Weak<Self>,
}

impl<T: Clone + 'static> CalculatedProperty<T> {
    /// Creates a calculated property named `name`.
    pub fn new(
        tracker: DependencyTracker,
        name: &str,
        on_changed: impl Fn(&str) + 'static,
        formula: impl Fn() -> T + 'static,
    ) -> Rc<Self> {
        Self::with_callback(tracker, name, Rc::new(on_changed), Box::new(formula))
    }

    pub(crate) fn with_callback(
        tracker: DependencyTracker,
        name: &str,
        on_changed: Rc<dyn Fn(&str)>,
        formula: Box<dyn Fn() -> T>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            source: SourceNode::with_callback(name, on_changed),
            tracker,
            formula,
            value: RefCell::new(None),
            this: this.clone(),
        })
    }

    /// Returns the memoized value, evaluating the formula if it is stale.
    pub fn get_value(&self) -> T {
        self.tracker.register(&self.source);
        if let Some(value) = self.value.borrow().as_ref() {
            return value.clone();
        }
        let dependent: Weak<dyn Dependent> = self.this.clone();
        let value = self.tracker.evaluate(dependent, || (self.formula)());
        *self.value.borrow_mut() = Some(value.clone());
        value
    }

    /// Returns `true` if a memoized value is present.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.value.borrow().is_some()
    }

    /// Returns the underlying source node.
    #[must_use]
    pub fn source(&self) -> &SourceNode {
        &self.source
    }
}

impl<T> CalculatedProperty<T> {
    fn drop_value(&self) {
        let stale = self.value.borrow_mut().take();
        if stale.is_some() {
            self.source.invalidate();
        }
    }
}

impl<T> Dependent for CalculatedProperty<T> {
    fn on_source_changed(&self) {
        self.drop_value();
    }
}

impl<T: 'static> Node for CalculatedProperty<T> {
    fn invalidate(&self) {
        self.drop_value();
    }
}

impl<T: fmt::Debug> fmt::Debug for CalculatedProperty<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalculatedProperty")
            .field("name", &self.source.name())
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}
