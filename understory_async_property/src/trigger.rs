// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Properties that calculated formulas can depend on.
//!
//! A trigger property wraps a [`LazyProperty`] or an [`AsyncProperty`] and
//! makes it a source for the dependency engine:
//!
//! - Reading it registers the read with the [`DependencyTracker`], so a
//!   calculated formula that reads it becomes its dependent.
//! - When its value changes, every dependent is invalidated and the owner is
//!   told the property changed.
//! - While it holds a value that reports in-place mutation (see
//!   [`MutationEvents`]), a mutation has the same effect as a change. The
//!   watch moves to the new value whenever the value is replaced.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use understory_calculated::{ChangedCallback, DependencyTracker, SourceNode};

use crate::async_property::{AsyncFormula, AsyncProperty, Spawner};
use crate::cancel::CancellationToken;
use crate::cell::{ChangeCallback, Comparer, default_comparer};
use crate::lazy::LazyProperty;
use crate::listener::TaskListener;
use crate::mutation::{MutationEvents, Subscription};
use crate::property::Property;

/// Engine-facing half shared by both trigger kinds.
struct TriggerSource {
    source: Rc<SourceNode>,
    tracker: DependencyTracker,
    subscription: RefCell<Option<Subscription>>,
}

impl TriggerSource {
    fn new(tracker: DependencyTracker, name: &str, on_property_changed: ChangedCallback) -> Self {
        Self {
            source: Rc::new(SourceNode::with_callback(name, on_property_changed)),
            tracker,
            subscription: RefCell::new(None),
        }
    }

    fn register(&self) {
        self.tracker.register(&*self.source);
    }

    fn watch<T: MutationEvents>(&self, value: &T) {
        self.unwatch();
        let source: Weak<SourceNode> = Rc::downgrade(&self.source);
        let subscription = value.subscribe_mutations(Rc::new(move || {
            if let Some(source) = source.upgrade() {
                tracing::trace!(property = source.name(), "watched value mutated");
                source.invalidate();
            }
        }));
        let replaced = self.subscription.replace(subscription);
        drop(replaced);
    }

    fn unwatch(&self) {
        let previous = self.subscription.borrow_mut().take();
        drop(previous);
    }

    fn is_watching(&self) -> bool {
        self.subscription.borrow().is_some()
    }
}

trait Triggered: 'static {
    fn trigger_source(&self) -> &TriggerSource;

    fn holds_value(&self) -> bool;
}

/// Builds the inner property's change callback.
///
/// A new value moves the mutation watch to it. Invalidation drops the watch.
/// Either way dependents are invalidated and the owner is notified.
fn route_changes<S: Triggered, T: MutationEvents>(owner: &Weak<S>) -> ChangeCallback<T> {
    let owner = owner.clone();
    Rc::new(move |value: &T, _name: &str| {
        if let Some(owner) = owner.upgrade() {
            let trigger = owner.trigger_source();
            if owner.holds_value() {
                trigger.watch(value);
            } else {
                trigger.unwatch();
            }
            trigger.source.invalidate();
        }
    })
}

/// A [`LazyProperty`] that is also a dependency source.
///
/// The lazy formula's first result is stored silently, like a plain lazy
/// property. The mutation watch is attached to it all the same.
pub struct LazyTriggerProperty<T> {
    trigger: TriggerSource,
    property: LazyProperty<T>,
}

impl<T: Clone + Default + MutationEvents + 'static> LazyTriggerProperty<T> {
    /// Creates a trigger named `name` over `formula`.
    ///
    /// `on_property_changed` receives `name` whenever the value changes or
    /// mutates in place.
    pub fn new(
        tracker: DependencyTracker,
        name: &str,
        on_property_changed: ChangedCallback,
        formula: impl Fn() -> T + 'static,
        comparer: Comparer<T>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            trigger: TriggerSource::new(tracker, name, on_property_changed),
            property: LazyProperty::new(formula, comparer, route_changes(this)),
        })
    }

    /// Returns the value, computing it if needed, and registers the read.
    pub fn get_value(&self, name: &str) -> T {
        self.trigger.register();
        let was_valid = self.property.is_valid();
        let value = self.property.get_value(name);
        if !was_valid {
            self.trigger.watch(&value);
        }
        value
    }

    /// Assigns `value`, invalidating dependents if it differs from the stored
    /// value.
    pub fn set_value(&self, value: T, name: &str) -> bool {
        self.property.set_value(value, name)
    }

    /// Returns the engine source of this property.
    #[must_use]
    pub fn source(&self) -> &SourceNode {
        &self.trigger.source
    }

    /// Returns `true` if the current value is watched for mutation.
    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.trigger.is_watching()
    }
}

impl<T: Clone + Default + MutationEvents + 'static> Property for LazyTriggerProperty<T> {
    fn invalidate(&self, notify: bool, name: &str) {
        self.property.invalidate(notify, name);
    }

    fn is_valid(&self) -> bool {
        self.property.is_valid()
    }
}

impl<T: Clone + Default + MutationEvents + 'static> Triggered for LazyTriggerProperty<T> {
    fn trigger_source(&self) -> &TriggerSource {
        &self.trigger
    }

    fn holds_value(&self) -> bool {
        self.property.is_valid()
    }
}

impl<T: fmt::Debug> fmt::Debug for LazyTriggerProperty<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyTriggerProperty")
            .field("source", &self.trigger.source)
            .field("property", &self.property)
            .finish_non_exhaustive()
    }
}

/// An [`AsyncProperty`] that is also a dependency source.
pub struct AsyncTriggerProperty<T> {
    trigger: TriggerSource,
    property: Rc<AsyncProperty<T>>,
}

impl<T: Clone + Default + PartialEq + MutationEvents + 'static> AsyncTriggerProperty<T> {
    /// Creates a trigger named `name` over `formula`.
    pub fn new(
        tracker: DependencyTracker,
        name: &str,
        on_property_changed: ChangedCallback,
        formula: AsyncFormula<T>,
        spawner: Spawner,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            trigger: TriggerSource::new(tracker, name, on_property_changed),
            property: AsyncProperty::with_formula(
                formula,
                default_comparer(),
                spawner,
                route_changes(this),
            ),
        })
    }

    /// Returns the current value, starting a computation if needed, and
    /// registers the read.
    pub fn get_value(
        &self,
        token: CancellationToken,
        listener: Option<Rc<dyn TaskListener>>,
        name: &str,
    ) -> T {
        self.trigger.register();
        self.property.get_value(token, listener, name)
    }

    /// Returns `true` while a computation is outstanding.
    #[must_use]
    pub fn is_computing(&self) -> bool {
        self.property.is_computing()
    }

    /// Returns the engine source of this property.
    #[must_use]
    pub fn source(&self) -> &SourceNode {
        &self.trigger.source
    }

    /// Returns `true` if the current value is watched for mutation.
    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.trigger.is_watching()
    }
}

impl<T> Property for AsyncTriggerProperty<T>
where
    T: Clone + Default + PartialEq + MutationEvents + 'static,
{
    fn invalidate(&self, notify: bool, name: &str) {
        self.property.invalidate(notify, name);
    }

    fn is_valid(&self) -> bool {
        self.property.is_valid()
    }
}

impl<T> Triggered for AsyncTriggerProperty<T>
where
    T: Clone + Default + PartialEq + MutationEvents + 'static,
{
    fn trigger_source(&self) -> &TriggerSource {
        &self.trigger
    }

    fn holds_value(&self) -> bool {
        self.property.is_valid()
    }
}

impl<T: fmt::Debug> fmt::Debug for AsyncTriggerProperty<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncTriggerProperty")
            .field("source", &self.trigger.source)
            .field("property", &self.property)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use futures::FutureExt;
    use futures::executor::LocalPool;
    use understory_calculated::{CalculatedProperty, Dependent, Source};

    use crate::error::ComputeError;
    use crate::observable::ObservableVec;

    fn changed_log() -> (Rc<RefCell<Vec<String>>>, ChangedCallback) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        (log, Rc::new(move |name: &str| sink.borrow_mut().push(name.to_owned())))
    }

    struct Flag(Cell<u32>);

    impl Dependent for Flag {
        fn on_source_changed(&self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn read_registers_with_tracker() {
        let tracker = DependencyTracker::new();
        let (changed, callback) = changed_log();
        let trigger = LazyTriggerProperty::new(
            tracker.clone(),
            "Width",
            callback,
            || 3_i32,
            default_comparer(),
        );

        let t = trigger.clone();
        let area = CalculatedProperty::new(tracker, "Area", |_: &str| {}, move || {
            t.get_value("Width") * 2
        });
        assert_eq!(area.get_value(), 6);
        assert_eq!(trigger.source().dependent_count(), 1);

        trigger.set_value(5, "Width");
        assert!(!area.is_valid());
        assert_eq!(*changed.borrow(), ["Width"]);
        assert_eq!(area.get_value(), 10);
    }

    #[test]
    fn equal_set_does_not_invalidate() {
        let tracker = DependencyTracker::new();
        let (changed, callback) = changed_log();
        let trigger =
            LazyTriggerProperty::new(tracker.clone(), "N", callback, || 1_i32, default_comparer());
        let flag = Rc::new(Flag(Cell::new(0)));

        let weak = Rc::downgrade(&flag) as Weak<dyn Dependent>;
        tracker.evaluate(weak, || trigger.get_value("N"));
        trigger.set_value(1, "N");
        assert_eq!(flag.0.get(), 0);
        assert!(changed.borrow().is_empty());
    }

    #[test]
    fn mutation_of_current_value_invalidates() {
        let tracker = DependencyTracker::new();
        let (changed, callback) = changed_log();
        let items = ObservableVec::from(vec![1, 2]);
        let initial = items.clone();
        let trigger = LazyTriggerProperty::new(
            tracker.clone(),
            "Items",
            callback,
            move || initial.clone(),
            default_comparer(),
        );

        let t = trigger.clone();
        let total = CalculatedProperty::new(tracker, "Total", |_: &str| {}, move || {
            t.get_value("Items").with(|items| items.iter().sum::<i32>())
        });
        assert_eq!(total.get_value(), 3);
        assert!(trigger.is_watching());

        items.push(4);
        assert!(!total.is_valid());
        assert_eq!(*changed.borrow(), ["Items"]);
        assert_eq!(total.get_value(), 7);
    }

    #[test]
    fn replaced_value_is_no_longer_watched() {
        let tracker = DependencyTracker::new();
        let (changed, callback) = changed_log();
        let a = ObservableVec::from(vec![1]);
        let b = ObservableVec::from(vec![2]);
        let trigger = LazyTriggerProperty::new(
            tracker,
            "Items",
            callback,
            ObservableVec::new,
            default_comparer(),
        );

        trigger.set_value(a.clone(), "Items");
        assert_eq!(a.subscriber_count(), 1);
        trigger.set_value(b.clone(), "Items");
        assert_eq!(a.subscriber_count(), 0);
        assert_eq!(b.subscriber_count(), 1);
        changed.borrow_mut().clear();

        a.push(10);
        assert!(changed.borrow().is_empty());
        b.push(20);
        assert_eq!(*changed.borrow(), ["Items"]);
    }

    #[test]
    fn notifying_invalidate_detaches_and_cascades() {
        let tracker = DependencyTracker::new();
        let (changed, callback) = changed_log();
        let items = ObservableVec::from(vec![1]);
        let initial = items.clone();
        let trigger = LazyTriggerProperty::new(
            tracker.clone(),
            "Items",
            callback,
            move || initial.clone(),
            default_comparer(),
        );
        let flag = Rc::new(Flag(Cell::new(0)));
        let weak = Rc::downgrade(&flag) as Weak<dyn Dependent>;
        tracker.evaluate(weak, || trigger.get_value("Items"));

        trigger.invalidate(true, "Items");
        assert_eq!(flag.0.get(), 1);
        assert_eq!(*changed.borrow(), ["Items"]);
        assert!(!trigger.is_watching());
        assert_eq!(items.subscriber_count(), 0);
    }

    #[test]
    fn async_completion_invalidates_dependents() {
        let mut pool = LocalPool::new();
        let tracker = DependencyTracker::new();
        let (changed, callback) = changed_log();
        let formula: AsyncFormula<String> = Rc::new(|_: CancellationToken| {
            async { Ok::<_, ComputeError>(String::from("loaded")) }.boxed_local()
        });
        let trigger = AsyncTriggerProperty::new(
            tracker.clone(),
            "Status",
            callback,
            formula,
            Rc::new(pool.spawner()),
        );

        let t = trigger.clone();
        let label = CalculatedProperty::new(tracker, "Label", |_: &str| {}, move || {
            format!("[{}]", t.get_value(CancellationToken::new(), None, "Status"))
        });
        assert_eq!(label.get_value(), "[]");
        assert!(trigger.is_computing());

        pool.run_until_stalled();
        assert_eq!(*changed.borrow(), ["Status"]);
        assert!(!label.is_valid());
        assert_eq!(label.get_value(), "[loaded]");
    }

    #[test]
    fn source_deduplicates_repeated_reads() {
        let tracker = DependencyTracker::new();
        let (_, callback) = changed_log();
        let trigger =
            LazyTriggerProperty::new(tracker.clone(), "X", callback, || 0_u8, default_comparer());
        let flag = Rc::new(Flag(Cell::new(0)));
        let weak = Rc::downgrade(&flag) as Weak<dyn Dependent>;
        tracker.evaluate(weak.clone(), || {
            trigger.get_value("X");
            trigger.get_value("X");
        });
        trigger.source().add_dependent(weak);
        assert_eq!(trigger.source().dependent_count(), 1);
    }

    /// An asynchronous trigger whose runs resolve to `values` in order.
    fn loading_items(
        pool: &LocalPool,
        tracker: &DependencyTracker,
        values: Vec<ObservableVec<i32>>,
    ) -> (Rc<AsyncTriggerProperty<ObservableVec<i32>>>, Rc<RefCell<Vec<String>>>) {
        let (changed, callback) = changed_log();
        let queue = Rc::new(RefCell::new(values.into_iter()));
        let formula: AsyncFormula<ObservableVec<i32>> = Rc::new(move |_: CancellationToken| {
            let next = queue.borrow_mut().next().unwrap_or_default();
            async move { Ok::<_, ComputeError>(next) }.boxed_local()
        });
        let spawner = Rc::new(pool.spawner());
        let trigger =
            AsyncTriggerProperty::new(tracker.clone(), "Items", callback, formula, spawner);
        (trigger, changed)
    }

    #[test]
    fn mutation_of_async_value_invalidates() {
        let mut pool = LocalPool::new();
        let tracker = DependencyTracker::new();
        let items = ObservableVec::from(vec![1]);
        let (trigger, changed) = loading_items(&pool, &tracker, vec![items.clone()]);

        let t = trigger.clone();
        let sink = changed.clone();
        let count = CalculatedProperty::new(
            tracker,
            "Count",
            move |name: &str| sink.borrow_mut().push(name.to_owned()),
            move || t.get_value(CancellationToken::new(), None, "Items").len(),
        );
        assert_eq!(count.get_value(), 0);
        assert!(!trigger.is_watching());
        pool.run_until_stalled();
        assert!(trigger.is_watching());
        assert_eq!(items.subscriber_count(), 1);
        assert_eq!(count.get_value(), 1);
        changed.borrow_mut().clear();

        items.push(2);
        assert_eq!(*changed.borrow(), ["Count", "Items"]);
        assert_eq!(items.subscriber_count(), 1);
        assert_eq!(count.get_value(), 2);
    }

    #[test]
    fn recomputed_async_value_moves_the_watch() {
        let mut pool = LocalPool::new();
        let tracker = DependencyTracker::new();
        let a = ObservableVec::from(vec![1]);
        let b = ObservableVec::from(vec![2, 3]);
        let (trigger, changed) = loading_items(&pool, &tracker, vec![a.clone(), b.clone()]);

        trigger.get_value(CancellationToken::new(), None, "Items");
        pool.run_until_stalled();
        assert_eq!(a.subscriber_count(), 1);

        trigger.invalidate(true, "Items");
        assert!(!trigger.is_watching());
        assert_eq!(a.subscriber_count(), 0);

        trigger.get_value(CancellationToken::new(), None, "Items");
        pool.run_until_stalled();
        assert_eq!(trigger.get_value(CancellationToken::new(), None, "Items").len(), 2);
        assert_eq!((a.subscriber_count(), b.subscriber_count()), (0, 1));
        changed.borrow_mut().clear();

        a.push(10);
        assert!(changed.borrow().is_empty());
        b.push(20);
        assert_eq!(*changed.borrow(), ["Items"]);
    }

    #[test]
    fn cancelled_recompute_leaves_nothing_watched() {
        let mut pool = LocalPool::new();
        let tracker = DependencyTracker::new();
        let (changed, callback) = changed_log();
        let items = ObservableVec::from(vec![1]);
        let first = RefCell::new(Some(items.clone()));
        let formula: AsyncFormula<ObservableVec<i32>> = Rc::new(move |_: CancellationToken| {
            let next = first.borrow_mut().take();
            async move { next.ok_or(ComputeError::Cancelled) }.boxed_local()
        });
        let trigger =
            AsyncTriggerProperty::new(tracker, "Items", callback, formula, Rc::new(pool.spawner()));

        trigger.get_value(CancellationToken::new(), None, "Items");
        pool.run_until_stalled();
        assert!(trigger.is_watching());

        trigger.invalidate(true, "Items");
        trigger.get_value(CancellationToken::new(), None, "Items");
        pool.run_until_stalled();
        assert!(!trigger.is_valid());
        assert!(!trigger.is_watching());
        assert_eq!(items.subscriber_count(), 0);
        changed.borrow_mut().clear();

        items.push(2);
        assert!(changed.borrow().is_empty());
    }
}
