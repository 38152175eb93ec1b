// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-object store of named tracked nodes.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::string::String;
use core::any::Any;
use core::cell::RefCell;
use core::fmt;

use hashbrown::HashMap;

use crate::calculated::CalculatedProperty;
use crate::tracker::DependencyTracker;
use crate::trigger::TriggerProperty;

/// Change callback shared by every node of one object.
///
/// The argument is the name of the property that changed.
pub type ChangedCallback = Rc<dyn Fn(&str)>;

/// A named entry of a [`PropertyHelper`].
///
/// Nodes are stored type-erased and recovered by downcasting, so any
/// `'static` type can be stored as long as it knows how to invalidate itself.
pub trait Node: Any {
    /// Marks the node stale, invalidating its dependents and reporting the
    /// change.
    fn invalidate(&self);
}

/// Error returned when a name is already bound to a node of another type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeKindMismatch {
    /// The name that was looked up.
    pub name: String,
    /// The type that was requested.
    pub requested: &'static str,
}

impl fmt::Display for NodeKindMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "property `{}` is already bound to a node that is not a `{}`",
            self.name, self.requested
        )
    }
}

impl core::error::Error for NodeKindMismatch {}

/// Name-keyed store of tracked nodes for one object.
///
/// A node is created the first time its name is used and stays bound to that
/// name, and to its type, for the lifetime of the helper. All nodes share the
/// helper's [`DependencyTracker`] and change callback.
///
/// The store never holds its internal borrow while user code runs, so
/// formulas and initializers may freely read other nodes of the same helper.
pub struct PropertyHelper {
    tracker: DependencyTracker,
    on_changed: ChangedCallback,
    nodes: RefCell<HashMap<Rc<str>, Rc<dyn Node>>>,
}

impl PropertyHelper {
    /// Creates an empty store that reports changes through `on_changed`.
    pub fn new(tracker: DependencyTracker, on_changed: impl Fn(&str) + 'static) -> Self {
        Self::with_callback(tracker, Rc::new(on_changed))
    }

    /// Creates an empty store sharing an existing change callback.
    pub fn with_callback(tracker: DependencyTracker, on_changed: ChangedCallback) -> Self {
        Self {
            tracker,
            on_changed,
            nodes: RefCell::new(HashMap::new()),
        }
    }

    /// Returns the evaluation context shared by this store's nodes.
    #[must_use]
    pub fn tracker(&self) -> &DependencyTracker {
        &self.tracker
    }

    /// Returns the change callback shared by this store's nodes.
    #[must_use]
    pub fn on_changed(&self) -> &ChangedCallback {
        &self.on_changed
    }

    /// Returns the number of bound names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    /// Returns `true` if no name is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.borrow().is_empty()
    }

    /// Returns the node bound to `name`, if any.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<Rc<dyn Node>> {
        self.nodes.borrow().get(name).cloned()
    }

    /// Returns the node of type `S` bound to `name`, creating it with `create`
    /// if the name is unbound.
    ///
    /// `create` runs at most once per name. If it binds `name` itself (for
    /// example through a nested call), the node it bound wins.
    pub fn get_or_add<S: Node>(
        &self,
        name: &str,
        create: impl FnOnce() -> Rc<S>,
    ) -> Result<Rc<S>, NodeKindMismatch> {
        let node = match self.node(name) {
            Some(node) => node,
            None => {
                let created: Rc<dyn Node> = create();
                self.nodes
                    .borrow_mut()
                    .entry(Rc::from(name))
                    .or_insert(created)
                    .clone()
            }
        };
        let any: Rc<dyn Any> = node;
        any.downcast::<S>().map_err(|_| NodeKindMismatch {
            name: String::from(name),
            requested: core::any::type_name::<S>(),
        })
    }

    /// Returns the calculated property bound to `name`, creating it over
    /// `formula` if the name is unbound.
    pub fn calculated_property<T: Clone + 'static>(
        &self,
        name: &str,
        formula: impl Fn() -> T + 'static,
    ) -> Result<Rc<CalculatedProperty<T>>, NodeKindMismatch> {
        self.get_or_add(name, || {
            CalculatedProperty::with_callback(
                self.tracker.clone(),
                name,
                self.on_changed.clone(),
                Box::new(formula),
            )
        })
    }

    /// Returns the trigger bound to `name`, creating it with the value from
    /// `init` if the name is unbound.
    pub fn trigger_property<T: Clone + PartialEq + 'static>(
        &self,
        name: &str,
        init: impl FnOnce() -> T,
    ) -> Result<Rc<TriggerProperty<T>>, NodeKindMismatch> {
        self.get_or_add(name, || {
            Rc::new(TriggerProperty::with_callback(
                self.tracker.clone(),
                name,
                self.on_changed.clone(),
                init(),
            ))
        })
    }

    /// Reads the calculated property `name`.
    ///
    /// `formula` is only used the first time `name` is seen.
    ///
    /// # Panics
    ///
    /// Panics if `name` is bound to a node other than a
    /// `CalculatedProperty<T>`.
    #[track_caller]
    pub fn calculated<T: Clone + 'static>(
        &self,
        name: &str,
        formula: impl Fn() -> T + 'static,
    ) -> T {
        match self.calculated_property(name, formula) {
            Ok(property) => property.get_value(),
            Err(err) => panic!("{err}"),
        }
    }

    /// Reads the trigger `name`, creating it with the value from `init`.
    ///
    /// # Panics
    ///
    /// Panics if `name` is bound to a node other than a `TriggerProperty<T>`.
    #[track_caller]
    pub fn trigger<T: Clone + PartialEq + 'static>(
        &self,
        name: &str,
        init: impl FnOnce() -> T,
    ) -> T {
        match self.trigger_property(name, init) {
            Ok(property) => property.get_value(),
            Err(err) => panic!("{err}"),
        }
    }

    /// Sets the trigger `name` to `value`.
    ///
    /// Returns `true` if the value changed. Binding a new trigger counts as a
    /// change.
    ///
    /// # Panics
    ///
    /// Panics if `name` is bound to a node other than a `TriggerProperty<T>`.
    #[track_caller]
    pub fn set<T: Clone + PartialEq + 'static>(&self, name: &str, value: T) -> bool {
        let mut created = false;
        let bound = self.trigger_property(name, || {
            created = true;
            value.clone()
        });
        let property = match bound {
            Ok(property) => property,
            Err(err) => panic!("{err}"),
        };
        if created {
            property.source().invalidate();
            true
        } else {
            property.set_value(value)
        }
    }

    /// Invalidates the node bound to `name`.
    ///
    /// Returns `false` if no node is bound to `name`.
    pub fn invalidate(&self, name: &str) -> bool {
        match self.node(name) {
            Some(node) => {
                node.invalidate();
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for PropertyHelper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyHelper")
            .field("tracker", &self.tracker)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
