// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The property helper for models that mix stored, computed, and calculated
//! properties.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use understory_calculated::{DependencyTracker, PropertyHelper};

use crate::async_property::Spawner;
use crate::cancel::CancellationToken;
use crate::cell::{Comparer, default_comparer};
use crate::error::{ComputeError, PropertyError};
use crate::helper::{bound, erase_formula};
use crate::listener::TaskListener;
use crate::mutation::MutationEvents;
use crate::property::Property;
use crate::store::ErasedProperty;
use crate::trigger::{AsyncTriggerProperty, LazyTriggerProperty};

/// Prefix of the engine key under which a trigger property is stored.
///
/// The trigger for property `P` lives under `"$P"`, so `P` itself stays free
/// to be declared as a calculated property.
pub const TRIGGER_KEY_PREFIX: char = '$';

/// Implements the properties of one model object on top of the dependency
/// engine.
///
/// Getters and setters behave like those of
/// [`AsyncPropertyHelper`](crate::AsyncPropertyHelper), except that every
/// property is a trigger: calculated properties declared with
/// [`calculated`](Self::calculated) that read it are invalidated whenever it
/// changes, including when a collection it holds is edited in place.
///
/// All helpers whose properties depend on each other must share one
/// [`DependencyTracker`].
///
/// # Panics
///
/// Getters and setters panic if `name` is already bound to a property of
/// another kind or value type.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use futures::executor::LocalPool;
/// use understory_async_property::CalculatedAsyncPropertyHelper;
/// use understory_calculated::DependencyTracker;
///
/// let pool = LocalPool::new();
/// let changed = Rc::new(RefCell::new(Vec::<String>::new()));
/// let log = changed.clone();
/// let model = Rc::new(CalculatedAsyncPropertyHelper::new(
///     DependencyTracker::new(),
///     Rc::new(pool.spawner()),
///     move |name: &str| log.borrow_mut().push(name.into()),
/// ));
///
/// model.set("First", String::from("Ada"));
/// model.set("Last", String::from("Lovelace"));
///
/// let full_name = |model: &Rc<CalculatedAsyncPropertyHelper>| {
///     let m = model.clone();
///     model.calculated("FullName", move || {
///         let first = m.get_or_init("First", String::new());
///         let last = m.get_or_init("Last", String::new());
///         format!("{first} {last}")
///     })
/// };
/// assert_eq!(full_name(&model), "Ada Lovelace");
///
/// changed.borrow_mut().clear();
/// model.set("Last", String::from("Byron"));
/// assert_eq!(*changed.borrow(), ["FullName", "Last"]);
/// assert_eq!(full_name(&model), "Ada Byron");
/// ```
pub struct CalculatedAsyncPropertyHelper {
    engine: PropertyHelper,
    spawner: Spawner,
}

impl CalculatedAsyncPropertyHelper {
    /// Creates a helper that tracks dependencies with `tracker`, spawns
    /// computations on `spawner`, and reports changed property names to
    /// `on_property_changed`.
    pub fn new(
        tracker: DependencyTracker,
        spawner: Spawner,
        on_property_changed: impl Fn(&str) + 'static,
    ) -> Self {
        Self {
            engine: PropertyHelper::new(tracker, on_property_changed),
            spawner,
        }
    }

    /// Returns the dependency engine store backing this helper.
    #[must_use]
    pub fn engine(&self) -> &PropertyHelper {
        &self.engine
    }

    /// Returns the evaluation context shared by this helper's properties.
    #[must_use]
    pub fn tracker(&self) -> &DependencyTracker {
        self.engine.tracker()
    }

    /// Returns the type-erased property bound to `name`, if any.
    ///
    /// Calculated properties are not included.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<Rc<dyn Property>> {
        self.entry(name).map(|e| e.property().clone())
    }

    /// Reads a stored property, binding it to `value` on first use.
    #[track_caller]
    pub fn get_or_init<T>(&self, name: &str, value: T) -> T
    where
        T: Clone + Default + PartialEq + MutationEvents + 'static,
    {
        self.get(name, move || value.clone())
    }

    /// Reads a synchronously computed property.
    #[track_caller]
    pub fn get<T>(&self, name: &str, formula: impl Fn() -> T + 'static) -> T
    where
        T: Clone + Default + PartialEq + MutationEvents + 'static,
    {
        self.get_with_comparer(name, formula, default_comparer())
    }

    /// Reads a synchronously computed property that uses `comparer` to
    /// detect changes.
    #[track_caller]
    pub fn get_with_comparer<T>(
        &self,
        name: &str,
        formula: impl Fn() -> T + 'static,
        comparer: Comparer<T>,
    ) -> T
    where
        T: Clone + Default + MutationEvents + 'static,
    {
        bound(self.lazy(name, formula, comparer)).get_value(name)
    }

    /// Reads an asynchronously computed property.
    #[track_caller]
    pub fn get_async<T, F, Fut>(&self, name: &str, formula: F) -> T
    where
        T: Clone + Default + PartialEq + MutationEvents + 'static,
        F: Fn(CancellationToken) -> Fut + 'static,
        Fut: Future<Output = Result<T, ComputeError>> + 'static,
    {
        self.get_async_with(name, formula, CancellationToken::new(), None)
    }

    /// Reads an asynchronously computed property with an explicit token and
    /// listener.
    #[track_caller]
    pub fn get_async_with<T, F, Fut>(
        &self,
        name: &str,
        formula: F,
        token: CancellationToken,
        listener: Option<Rc<dyn TaskListener>>,
    ) -> T
    where
        T: Clone + Default + PartialEq + MutationEvents + 'static,
        F: Fn(CancellationToken) -> Fut + 'static,
        Fut: Future<Output = Result<T, ComputeError>> + 'static,
    {
        let property = bound(self.trigger(name, || {
            AsyncTriggerProperty::new(
                self.tracker().clone(),
                name,
                self.engine.on_changed().clone(),
                erase_formula(formula),
                self.spawner.clone(),
            )
        }));
        property.get_value(token, listener, name)
    }

    /// Assigns a stored property.
    ///
    /// Returns `true` if the value changed.
    #[track_caller]
    pub fn set<T>(&self, name: &str, value: T) -> bool
    where
        T: Clone + Default + PartialEq + MutationEvents + 'static,
    {
        self.set_with_comparer(name, value, default_comparer())
    }

    /// Assigns a stored property, using `comparer` to detect the change.
    #[track_caller]
    pub fn set_with_comparer<T>(&self, name: &str, value: T, comparer: Comparer<T>) -> bool
    where
        T: Clone + Default + MutationEvents + 'static,
    {
        let initial = value.clone();
        bound(self.lazy(name, move || initial.clone(), comparer)).set_value(value, name)
    }

    /// Reads a calculated property.
    ///
    /// The dependency engine owns calculated properties; `formula` is only
    /// used the first time `name` is seen.
    ///
    /// # Panics
    ///
    /// Panics if `name` is bound to an engine node of another type.
    #[track_caller]
    pub fn calculated<T: Clone + 'static>(
        &self,
        name: &str,
        formula: impl Fn() -> T + 'static,
    ) -> T {
        self.engine.calculated(name, formula)
    }

    /// Invalidates the property `name`, notifying its change.
    ///
    /// Falls back to a calculated property of that name. Returns `Ok(false)`
    /// if neither exists, and
    /// [`PropertyError::EntityInvalidationUnsupported`] for the empty name.
    pub fn invalidate(&self, name: &str) -> Result<bool, PropertyError> {
        if name.is_empty() {
            return Err(PropertyError::EntityInvalidationUnsupported);
        }
        if let Some(entry) = self.entry(name) {
            entry.property().invalidate(true, name);
            return Ok(true);
        }
        Ok(self.engine.invalidate(name))
    }

    fn entry(&self, name: &str) -> Option<Rc<ErasedProperty>> {
        let node = self.engine.node(&trigger_key(name))?;
        let any: Rc<dyn Any> = node;
        any.downcast::<ErasedProperty>().ok()
    }

    fn lazy<T: Clone + Default + MutationEvents + 'static>(
        &self,
        name: &str,
        formula: impl Fn() -> T + 'static,
        comparer: Comparer<T>,
    ) -> Result<Rc<LazyTriggerProperty<T>>, PropertyError> {
        self.trigger(name, || {
            LazyTriggerProperty::new(
                self.tracker().clone(),
                name,
                self.engine.on_changed().clone(),
                formula,
                comparer,
            )
        })
    }

    fn trigger<P: Property>(
        &self,
        name: &str,
        create: impl FnOnce() -> Rc<P>,
    ) -> Result<Rc<P>, PropertyError> {
        let entry = self
            .engine
            .get_or_add(&trigger_key(name), || Rc::new(ErasedProperty::new(name, create())))
            .map_err(|mismatch| PropertyError::KindMismatch {
                name: name.to_owned(),
                existing: "foreign engine node",
                requested: mismatch.requested,
            })?;
        entry.downcast()
    }
}

fn trigger_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len() + 1);
    key.push(TRIGGER_KEY_PREFIX);
    key.push_str(name);
    key
}

impl fmt::Debug for CalculatedAsyncPropertyHelper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalculatedAsyncPropertyHelper")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}
