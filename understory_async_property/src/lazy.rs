// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Synchronously computed properties.

use std::fmt;

use crate::cell::{ChangeCallback, Comparer, ValueCell};
use crate::property::Property;

/// A property computed by a synchronous formula on first read.
///
/// The formula runs when the property is read while invalid. Its result is
/// stored without a change notification: the reader already has the value.
/// Assigning a value with [`set_value`](Self::set_value) skips the formula and
/// notifies if the value changed.
///
/// If the formula panics nothing is stored, so the next read retries.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use understory_async_property::{LazyProperty, default_comparer};
///
/// let calls = Rc::new(Cell::new(0));
/// let counter = calls.clone();
/// let two = LazyProperty::new(
///     move || {
///         counter.set(counter.get() + 1);
///         1 + 1
///     },
///     default_comparer(),
///     Rc::new(|_: &i32, _: &str| {}),
/// );
///
/// assert_eq!(two.get_value("Two"), 2);
/// assert_eq!(two.get_value("Two"), 2);
/// assert_eq!(calls.get(), 1);
/// ```
pub struct LazyProperty<T> {
    cell: ValueCell<T>,
    formula: Box<dyn Fn() -> T>,
}

impl<T: Clone + Default + 'static> LazyProperty<T> {
    /// Creates an invalid property over `formula`.
    pub fn new(
        formula: impl Fn() -> T + 'static,
        comparer: Comparer<T>,
        on_change: ChangeCallback<T>,
    ) -> Self {
        Self {
            cell: ValueCell::new(comparer, on_change),
            formula: Box::new(formula),
        }
    }

    /// Returns the value, computing it first if the property is invalid.
    pub fn get_value(&self, name: &str) -> T {
        if !self.cell.is_valid() {
            tracing::trace!(property = name, "computing lazy property");
            let value = (self.formula)();
            self.cell.store(value);
        }
        self.cell.current()
    }

    /// Assigns `value`, notifying if it differs from the stored value.
    ///
    /// Returns `true` if the value was stored.
    pub fn set_value(&self, value: T, name: &str) -> bool {
        self.cell.set_if_changed(value, name)
    }

    /// Returns the stored value without computing it.
    #[must_use]
    pub fn current(&self) -> T {
        self.cell.current()
    }
}

impl<T: Clone + Default + 'static> Property for LazyProperty<T> {
    fn invalidate(&self, notify: bool, name: &str) {
        self.cell.invalidate(notify, name);
    }

    fn is_valid(&self) -> bool {
        self.cell.is_valid()
    }
}

impl<T: fmt::Debug> fmt::Debug for LazyProperty<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyProperty")
            .field("cell", &self.cell)
            .finish_non_exhaustive()
    }
}
