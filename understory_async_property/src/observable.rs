// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A list that reports in-place mutation.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::mutation::{MutationEvents, MutationHandler, Subscription};

/// A change made to an [`ObservableVec`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CollectionChange {
    /// An item was inserted at `index`.
    Added {
        /// Position of the new item.
        index: usize,
    },
    /// The item at `index` was removed.
    Removed {
        /// Former position of the item.
        index: usize,
    },
    /// The item at `index` was replaced.
    Replaced {
        /// Position of the replaced item.
        index: usize,
    },
    /// Every item was removed.
    Cleared,
}

type ChangeHandler = Rc<dyn Fn(&CollectionChange)>;

struct Shared<T> {
    items: RefCell<Vec<T>>,
    handlers: RefCell<SmallVec<[(u64, ChangeHandler); 2]>>,
    next_id: Cell<u64>,
}

/// A shared list that raises a [`CollectionChange`] for every mutation.
///
/// Cloning an `ObservableVec` yields another handle to the same list, and two
/// handles compare equal only if they share the list. This matches how a
/// property holding a collection is expected to behave: replacing the list is
/// a change of the property, editing it in place is a mutation event.
///
/// Handlers run after the list has been updated and with no borrow of it held,
/// so they may read or edit the list.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use understory_async_property::{CollectionChange, ObservableVec};
///
/// let list = ObservableVec::from(vec![1, 2]);
/// let last = Rc::new(Cell::new(None));
/// let seen = last.clone();
/// let sub = list.subscribe(move |change| seen.set(Some(*change)));
///
/// list.push(3);
/// assert_eq!(last.get(), Some(CollectionChange::Added { index: 2 }));
/// assert_eq!(list.to_vec(), [1, 2, 3]);
///
/// drop(sub);
/// list.clear();
/// assert_eq!(last.get(), Some(CollectionChange::Added { index: 2 }));
/// ```
pub struct ObservableVec<T> {
    shared: Rc<Shared<T>>,
}

impl<T> ObservableVec<T> {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::from(Vec::new())
    }

    /// Returns the number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.items.borrow().len()
    }

    /// Returns `true` if the list has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.items.borrow().is_empty()
    }

    /// Calls `f` with the current items.
    pub fn with<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.shared.items.borrow())
    }

    /// Returns `true` if both handles refer to the same list.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    /// Appends an item.
    pub fn push(&self, item: T) {
        let index = {
            let mut items = self.shared.items.borrow_mut();
            items.push(item);
            items.len() - 1
        };
        self.raise(CollectionChange::Added { index });
    }

    /// Inserts an item at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert(&self, index: usize, item: T) {
        self.shared.items.borrow_mut().insert(index, item);
        self.raise(CollectionChange::Added { index });
    }

    /// Removes and returns the item at `index`, or `None` if out of bounds.
    pub fn remove(&self, index: usize) -> Option<T> {
        let removed = {
            let mut items = self.shared.items.borrow_mut();
            (index < items.len()).then(|| items.remove(index))
        };
        if removed.is_some() {
            self.raise(CollectionChange::Removed { index });
        }
        removed
    }

    /// Replaces the item at `index`, returning the previous one.
    ///
    /// Returns `None`, and changes nothing, if `index` is out of bounds.
    pub fn replace(&self, index: usize, item: T) -> Option<T> {
        let previous = {
            let mut items = self.shared.items.borrow_mut();
            let slot = items.get_mut(index)?;
            std::mem::replace(slot, item)
        };
        self.raise(CollectionChange::Replaced { index });
        Some(previous)
    }

    /// Removes every item.
    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.shared.items.borrow_mut());
        self.raise(CollectionChange::Cleared);
        drop(removed);
    }

    /// Attaches a change handler.
    ///
    /// Handlers run in the order they were attached.
    pub fn subscribe(&self, handler: impl Fn(&CollectionChange) + 'static) -> Subscription
    where
        T: 'static,
    {
        let id = self.shared.next_id.get();
        self.shared.next_id.set(id + 1);
        self.shared
            .handlers
            .borrow_mut()
            .push((id, Rc::new(handler)));

        let shared: Weak<Shared<T>> = Rc::downgrade(&self.shared);
        Subscription::new(move || {
            if let Some(shared) = shared.upgrade() {
                shared.handlers.borrow_mut().retain(|(h, _)| *h != id);
            }
        })
    }

    /// Returns the number of attached handlers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared.handlers.borrow().len()
    }

    fn raise(&self, change: CollectionChange) {
        let handlers: SmallVec<[ChangeHandler; 2]> = self
            .shared
            .handlers
            .borrow()
            .iter()
            .map(|(_, h)| h.clone())
            .collect();
        for handler in handlers {
            handler(&change);
        }
    }
}

impl<T: Clone> ObservableVec<T> {
    /// Returns a clone of the item at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        self.shared.items.borrow().get(index).cloned()
    }

    /// Returns a clone of all items.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.shared.items.borrow().clone()
    }
}

impl<T> From<Vec<T>> for ObservableVec<T> {
    fn from(items: Vec<T>) -> Self {
        Self {
            shared: Rc::new(Shared {
                items: RefCell::new(items),
                handlers: RefCell::new(SmallVec::new()),
                next_id: Cell::new(0),
            }),
        }
    }
}

impl<T> FromIterator<T> for ObservableVec<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl<T> Default for ObservableVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ObservableVec<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> PartialEq for ObservableVec<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T> Eq for ObservableVec<T> {}

impl<T: 'static> MutationEvents for ObservableVec<T> {
    fn subscribe_mutations(&self, handler: MutationHandler) -> Option<Subscription> {
        Some(self.subscribe(move |_| handler()))
    }
}

impl<T: fmt::Debug> fmt::Debug for ObservableVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableVec")
            .field("items", &self.shared.items.borrow())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorded(list: &ObservableVec<i32>) -> (Rc<RefCell<Vec<CollectionChange>>>, Subscription) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let sub = list.subscribe(move |change| sink.borrow_mut().push(*change));
        (log, sub)
    }

    #[test]
    fn every_mutation_is_reported() {
        let list = ObservableVec::from(vec![1, 2, 3]);
        let (log, _sub) = recorded(&list);

        list.insert(0, 0);
        assert_eq!(list.remove(3), Some(3));
        assert_eq!(list.remove(10), None);
        assert_eq!(list.replace(1, 9), Some(1));
        assert_eq!(list.replace(10, 9), None);
        list.clear();

        assert_eq!(
            *log.borrow(),
            [
                CollectionChange::Added { index: 0 },
                CollectionChange::Removed { index: 3 },
                CollectionChange::Replaced { index: 1 },
                CollectionChange::Cleared,
            ]
        );
        assert!(list.is_empty());
    }

    #[test]
    fn equality_is_identity() {
        let a = ObservableVec::from(vec![1]);
        let b = ObservableVec::from(vec![1]);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn dropped_subscription_stops_reports() {
        let list = ObservableVec::new();
        let (log, sub) = recorded(&list);
        list.push(1);
        drop(sub);
        assert_eq!(list.subscriber_count(), 0);
        list.push(2);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn handlers_may_edit_the_list() {
        let list = ObservableVec::new();
        let handle = list.clone();
        let _sub = list.subscribe(move |change| {
            if let CollectionChange::Added { index: 0 } = change {
                handle.push(100);
            }
        });
        list.push(1);
        assert_eq!(list.to_vec(), [1, 100]);
    }

    #[test]
    fn subscription_outliving_list_is_harmless() {
        let list = ObservableVec::<i32>::new();
        let sub = list.subscribe(|_| {});
        drop(list);
        sub.unsubscribe();
    }
}
