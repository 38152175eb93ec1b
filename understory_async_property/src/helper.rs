// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The object-facing property helper.

use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::FutureExt;
use understory_calculated::ChangedCallback;

use crate::async_property::{AsyncFormula, AsyncProperty, Spawner};
use crate::cancel::CancellationToken;
use crate::cell::{ChangeCallback, Comparer, default_comparer};
use crate::error::{ComputeError, PropertyError};
use crate::lazy::LazyProperty;
use crate::listener::TaskListener;
use crate::store::PropertyStore;

/// Unwraps a store result, panicking at the caller on a kind mismatch.
#[track_caller]
pub(crate) fn bound<P>(result: Result<P, PropertyError>) -> P {
    match result {
        Ok(property) => property,
        Err(err) => panic!("{err}"),
    }
}

/// Adapts an owner's name-only callback to a typed change callback.
pub(crate) fn forward_name<T>(on_property_changed: &ChangedCallback) -> ChangeCallback<T> {
    let on_property_changed = on_property_changed.clone();
    Rc::new(move |_: &T, name: &str| on_property_changed(name))
}

/// Erases an async formula closure.
pub(crate) fn erase_formula<T, F, Fut>(formula: F) -> AsyncFormula<T>
where
    F: Fn(CancellationToken) -> Fut + 'static,
    Fut: Future<Output = Result<T, ComputeError>> + 'static,
{
    Rc::new(move |token| formula(token).boxed_local())
}

/// Implements the properties of one model object.
///
/// Each property is identified by name and created on first use. The first
/// getter called for a name decides its kind: [`get`](Self::get) binds a
/// synchronously computed property, [`get_async`](Self::get_async) an
/// asynchronously computed one.
///
/// Whenever a property's value changes the helper reports its name through
/// the callback given to [`new`](Self::new).
///
/// # Panics
///
/// Every getter and setter panics if `name` is already bound to a property of
/// another kind or value type. This is a programming error in the model.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use futures::executor::LocalPool;
/// use understory_async_property::{AsyncPropertyHelper, ComputeError};
///
/// let mut pool = LocalPool::new();
/// let changed = Rc::new(RefCell::new(Vec::<String>::new()));
/// let log = changed.clone();
/// let helper = AsyncPropertyHelper::new(Rc::new(pool.spawner()), move |name: &str| {
///     log.borrow_mut().push(name.into());
/// });
///
/// assert_eq!(helper.get("Sum", || 1 + 1), 2);
///
/// let status = helper.get_async("Status", |_token| async {
///     Ok::<_, ComputeError>(String::from("done"))
/// });
/// assert_eq!(status, "");
/// pool.run_until_stalled();
/// assert_eq!(*changed.borrow(), ["Status"]);
/// let status = helper.get_async("Status", |_token| async {
///     Ok::<_, ComputeError>(String::new())
/// });
/// assert_eq!(status, "done");
/// ```
pub struct AsyncPropertyHelper {
    store: PropertyStore,
    spawner: Spawner,
    on_property_changed: ChangedCallback,
}

impl AsyncPropertyHelper {
    /// Creates a helper that spawns computations on `spawner` and reports
    /// changed property names to `on_property_changed`.
    pub fn new(spawner: Spawner, on_property_changed: impl Fn(&str) + 'static) -> Self {
        Self {
            store: PropertyStore::new(),
            spawner,
            on_property_changed: Rc::new(on_property_changed),
        }
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &PropertyStore {
        &self.store
    }

    /// Reads a synchronously computed property.
    ///
    /// `formula` is only used the first time `name` is seen.
    #[track_caller]
    pub fn get<T>(&self, name: &str, formula: impl Fn() -> T + 'static) -> T
    where
        T: Clone + Default + PartialEq + 'static,
    {
        self.get_with_comparer(name, formula, default_comparer())
    }

    /// Reads a synchronously computed property that uses `comparer` to
    /// detect changes.
    ///
    /// The same comparer should be passed to the matching setter.
    #[track_caller]
    pub fn get_with_comparer<T>(
        &self,
        name: &str,
        formula: impl Fn() -> T + 'static,
        comparer: Comparer<T>,
    ) -> T
    where
        T: Clone + Default + 'static,
    {
        bound(self.lazy(name, formula, comparer)).get_value(name)
    }

    /// Reads an asynchronously computed property.
    ///
    /// Returns the current value, which is `T::default()` until the first
    /// computation completes.
    #[track_caller]
    pub fn get_async<T, F, Fut>(&self, name: &str, formula: F) -> T
    where
        T: Clone + Default + PartialEq + 'static,
        F: Fn(CancellationToken) -> Fut + 'static,
        Fut: Future<Output = Result<T, ComputeError>> + 'static,
    {
        self.get_async_with(name, formula, CancellationToken::new(), None)
    }

    /// Reads an asynchronously computed property, passing `token` to a
    /// computation this read starts and attaching `listener` to the
    /// computation this read starts or joins.
    #[track_caller]
    pub fn get_async_with<T, F, Fut>(
        &self,
        name: &str,
        formula: F,
        token: CancellationToken,
        listener: Option<Rc<dyn TaskListener>>,
    ) -> T
    where
        T: Clone + Default + PartialEq + 'static,
        F: Fn(CancellationToken) -> Fut + 'static,
        Fut: Future<Output = Result<T, ComputeError>> + 'static,
    {
        let property = bound(self.store.get_or_create(name, || {
            AsyncProperty::with_formula(
                erase_formula(formula),
                default_comparer(),
                self.spawner.clone(),
                forward_name(&self.on_property_changed),
            )
        }));
        property.get_value(token, listener, name)
    }

    /// Assigns a synchronously computed property.
    ///
    /// If `name` is unbound, it is bound to a property whose formula yields
    /// `value`. Returns `true` if the value changed.
    #[track_caller]
    pub fn set<T>(&self, name: &str, value: T) -> bool
    where
        T: Clone + Default + PartialEq + 'static,
    {
        self.set_with_comparer(name, value, default_comparer())
    }

    /// Assigns a synchronously computed property, using `comparer` to detect
    /// the change.
    #[track_caller]
    pub fn set_with_comparer<T>(&self, name: &str, value: T, comparer: Comparer<T>) -> bool
    where
        T: Clone + Default + 'static,
    {
        let initial = value.clone();
        bound(self.lazy(name, move || initial.clone(), comparer)).set_value(value, name)
    }

    /// Invalidates the property `name`, notifying its change.
    ///
    /// An empty name invalidates the whole object, see
    /// [`invalidate_entity`](Self::invalidate_entity). Returns `false` if no
    /// property is bound to `name`.
    pub fn invalidate(&self, name: &str) -> bool {
        if name.is_empty() {
            self.invalidate_entity();
            return true;
        }
        match self.store.get(name) {
            Some(property) => {
                property.invalidate(true, name);
                true
            }
            None => false,
        }
    }

    /// Invalidates every property without individual notifications, then
    /// reports a change of the empty name.
    pub fn invalidate_entity(&self) {
        self.store.invalidate_all(false);
        (self.on_property_changed)("");
    }

    fn lazy<T: Clone + Default + 'static>(
        &self,
        name: &str,
        formula: impl Fn() -> T + 'static,
        comparer: Comparer<T>,
    ) -> Result<Rc<LazyProperty<T>>, PropertyError> {
        self.store.get_or_create(name, || {
            Rc::new(LazyProperty::new(
                formula,
                comparer,
                forward_name(&self.on_property_changed),
            ))
        })
    }
}

impl fmt::Debug for AsyncPropertyHelper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncPropertyHelper")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
