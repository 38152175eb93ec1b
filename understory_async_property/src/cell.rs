// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The memoization slot shared by every property kind.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Equality used to decide whether a new value is a change.
///
/// Returns `true` if the two values are considered equal.
pub type Comparer<T> = Rc<dyn Fn(&T, &T) -> bool>;

/// Callback fired with the new value and the property name on change.
pub type ChangeCallback<T> = Rc<dyn Fn(&T, &str)>;

/// Returns a comparer backed by [`PartialEq`].
#[must_use]
pub fn default_comparer<T: PartialEq + 'static>() -> Comparer<T> {
    Rc::new(|a: &T, b: &T| a == b)
}

struct Slot<T> {
    value: T,
    valid: bool,
}

/// A typed slot with a valid flag and change notification.
///
/// While the slot is invalid its value is `T::default()`. The change callback
/// always runs after the slot's internal borrow is released, so it may read or
/// write the slot again.
pub struct ValueCell<T> {
    slot: RefCell<Slot<T>>,
    comparer: Comparer<T>,
    on_change: ChangeCallback<T>,
}

impl<T: Clone + Default> ValueCell<T> {
    /// Creates an invalid cell.
    pub fn new(comparer: Comparer<T>, on_change: ChangeCallback<T>) -> Self {
        Self {
            slot: RefCell::new(Slot {
                value: T::default(),
                valid: false,
            }),
            comparer,
            on_change,
        }
    }

    /// Returns `true` if the cell holds a computed or assigned value.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.slot.borrow().valid
    }

    /// Returns the stored value, valid or not.
    #[must_use]
    pub fn current(&self) -> T {
        self.slot.borrow().value.clone()
    }

    /// Resets the cell to the invalid, default state.
    ///
    /// With `notify`, the change callback fires with the default value.
    pub fn invalidate(&self, notify: bool, name: &str) {
        {
            let mut slot = self.slot.borrow_mut();
            slot.value = T::default();
            slot.valid = false;
        }
        if notify {
            (self.on_change)(&T::default(), name);
        }
    }

    /// Stores `value` if the cell is invalid or `value` differs from the
    /// stored one, then fires the change callback.
    ///
    /// An invalid cell holds only the default placeholder, so any assignment
    /// to it counts as a change, even one equal to the default.
    ///
    /// Returns `true` if the value was stored.
    pub fn set_if_changed(&self, value: T, name: &str) -> bool {
        let changed = {
            let mut slot = self.slot.borrow_mut();
            if slot.valid && (self.comparer)(&slot.value, &value) {
                None
            } else {
                slot.value = value.clone();
                slot.valid = true;
                Some(value)
            }
        };
        match changed {
            Some(value) => {
                (self.on_change)(&value, name);
                true
            }
            None => false,
        }
    }

    /// Stores `value` and marks the cell valid without notifying.
    pub fn store(&self, value: T) {
        let mut slot = self.slot.borrow_mut();
        slot.value = value;
        slot.valid = true;
    }
}

impl<T: fmt::Debug> fmt::Debug for ValueCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.borrow();
        f.debug_struct("ValueCell")
            .field("value", &slot.value)
            .field("valid", &slot.valid)
            .finish_non_exhaustive()
    }
}
