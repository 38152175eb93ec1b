// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Settable source properties.

use alloc::rc::Rc;
use core::cell::RefCell;
use core::fmt;

use crate::helper::Node;
use crate::source::SourceNode;
use crate::tracker::DependencyTracker;

/// A settable value that tracked formulas can depend on.
///
/// Reading the value registers it with the [`DependencyTracker`]. Setting a
/// value that differs from the stored one invalidates every dependent and
/// reports the property as changed.
///
/// # Example
///
/// ```rust
/// use understory_calculated::{DependencyTracker, TriggerProperty};
///
/// let width = TriggerProperty::new(DependencyTracker::new(), "Width", |_: &str| {}, 10_u32);
/// assert_eq!(width.get_value(), 10);
/// assert!(width.set_value(20));
/// assert!(!width.set_value(20));
/// ```
pub struct TriggerProperty<T> {
    source: SourceNode,
    tracker: DependencyTracker,
    value: RefCell<T>,
}

impl<T: Clone + PartialEq + 'static> TriggerProperty<T> {
    /// Creates a trigger holding `value`.
    pub fn new(
        tracker: DependencyTracker,
        name: &str,
        on_changed: impl Fn(&str) + 'static,
        value: T,
    ) -> Self {
        Self::with_callback(tracker, name, Rc::new(on_changed), value)
    }

    pub(crate) fn with_callback(
        tracker: DependencyTracker,
        name: &str,
        on_changed: Rc<dyn Fn(&str)>,
        value: T,
    ) -> Self {
        Self {
            source: SourceNode::with_callback(name, on_changed),
            tracker,
            value: RefCell::new(value),
        }
    }

    /// Returns the current value, registering the read.
    pub fn get_value(&self) -> T {
        self.tracker.register(&self.source);
        self.value.borrow().clone()
    }

    /// Stores `value` if it differs from the current one.
    ///
    /// Returns `true` if the value changed (and dependents were invalidated).
    pub fn set_value(&self, value: T) -> bool {
        {
            let mut current = self.value.borrow_mut();
            if *current == value {
                return false;
            }
            *current = value;
        }
        self.source.invalidate();
        true
    }

    /// Returns the underlying source node.
    #[must_use]
    pub fn source(&self) -> &SourceNode {
        &self.source
    }
}

impl<T: 'static> Node for TriggerProperty<T> {
    fn invalidate(&self) {
        self.source.invalidate();
    }
}

impl<T: fmt::Debug> fmt::Debug for TriggerProperty<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerProperty")
            .field("name", &self.source.name())
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}
