// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Validation errors computed like properties.
//!
//! An [`AsyncValidationHelper`] keeps, per property name, the last computed
//! collection of errors. The empty name holds errors that concern the whole
//! object. Error collections are memoized and invalidated exactly like the
//! values of an [`AsyncPropertyHelper`](crate::AsyncPropertyHelper), with one
//! difference in notification: a recomputation that yields no collection
//! (`None`), and an invalidation, only notify when
//! [`notify_on_invalidate`](AsyncValidationHelper::notify_on_invalidate) is
//! set.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::rc::Rc;

use understory_calculated::ChangedCallback;

use crate::async_property::{AsyncProperty, Spawner};
use crate::cancel::CancellationToken;
use crate::cell::{ChangeCallback, default_comparer};
use crate::error::ComputeError;
use crate::helper::{bound, erase_formula};
use crate::lazy::LazyProperty;
use crate::store::PropertyStore;

/// The errors of one property, or `None` if it has none to report.
pub type Errors<E> = Option<Vec<E>>;

/// Computes and caches validation errors for one model object.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use futures::executor::LocalPool;
/// use understory_async_property::AsyncValidationHelper;
///
/// let pool = LocalPool::new();
/// let changed = Rc::new(RefCell::new(Vec::<String>::new()));
/// let log = changed.clone();
/// let errors = AsyncValidationHelper::<&str>::builder(Rc::new(pool.spawner()), move |name: &str| {
///     log.borrow_mut().push(name.into());
/// })
/// .notify_on_invalidate(false)
/// .build();
///
/// let age = -3;
/// let found = errors.get("Age", move |_| (age < 0).then(|| vec!["must not be negative"]));
/// assert_eq!(found, Some(vec!["must not be negative"]));
///
/// assert!(errors.invalidate("Age"));
/// assert!(changed.borrow().is_empty());
/// ```
pub struct AsyncValidationHelper<E> {
    store: PropertyStore,
    spawner: Spawner,
    on_errors_changed: ChangedCallback,
    notify_on_invalidate: bool,
    _errors: PhantomData<fn() -> E>,
}

/// Configures an [`AsyncValidationHelper`].
pub struct AsyncValidationHelperBuilder<E> {
    spawner: Spawner,
    on_errors_changed: ChangedCallback,
    notify_on_invalidate: bool,
    _errors: PhantomData<fn() -> E>,
}

impl<E> AsyncValidationHelperBuilder<E> {
    /// Sets whether invalidation alone notifies. Defaults to `true`.
    #[must_use]
    pub fn notify_on_invalidate(mut self, notify: bool) -> Self {
        self.notify_on_invalidate = notify;
        self
    }

    /// Builds the helper.
    #[must_use]
    pub fn build(self) -> AsyncValidationHelper<E> {
        AsyncValidationHelper {
            store: PropertyStore::new(),
            spawner: self.spawner,
            on_errors_changed: self.on_errors_changed,
            notify_on_invalidate: self.notify_on_invalidate,
            _errors: PhantomData,
        }
    }
}

impl<E> fmt::Debug for AsyncValidationHelperBuilder<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncValidationHelperBuilder")
            .field("notify_on_invalidate", &self.notify_on_invalidate)
            .finish_non_exhaustive()
    }
}

impl<E: Clone + PartialEq + 'static> AsyncValidationHelper<E> {
    /// Creates a helper that notifies on invalidation.
    pub fn new(spawner: Spawner, on_errors_changed: impl Fn(&str) + 'static) -> Self {
        Self::builder(spawner, on_errors_changed).build()
    }

    /// Starts configuring a helper.
    pub fn builder(
        spawner: Spawner,
        on_errors_changed: impl Fn(&str) + 'static,
    ) -> AsyncValidationHelperBuilder<E> {
        AsyncValidationHelperBuilder {
            spawner,
            on_errors_changed: Rc::new(on_errors_changed),
            notify_on_invalidate: true,
            _errors: PhantomData,
        }
    }

    /// Returns `true` if invalidation alone notifies.
    #[must_use]
    pub fn notify_on_invalidate(&self) -> bool {
        self.notify_on_invalidate
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &PropertyStore {
        &self.store
    }

    /// Returns the errors of `name`, computing them with `get_errors` if
    /// needed.
    ///
    /// `get_errors` receives `name` and is only used the first time `name`
    /// is seen.
    ///
    /// # Panics
    ///
    /// Panics if `name` was first read with [`get_async`](Self::get_async).
    #[track_caller]
    pub fn get(&self, name: &str, get_errors: impl Fn(&str) -> Errors<E> + 'static) -> Errors<E> {
        let property = bound(self.store.get_or_create(name, || {
            let key: Rc<str> = name.into();
            Rc::new(LazyProperty::new(
                move || get_errors(&key),
                default_comparer(),
                self.filtered_callback(),
            ))
        }));
        property.get_value(name)
    }

    /// Returns the errors of `name` computed so far, starting an
    /// asynchronous computation with `get_errors` if needed.
    ///
    /// # Panics
    ///
    /// Panics if `name` was first read with [`get`](Self::get).
    #[track_caller]
    pub fn get_async<F, Fut>(&self, name: &str, get_errors: F) -> Errors<E>
    where
        F: Fn(&str) -> Fut + 'static,
        Fut: Future<Output = Result<Errors<E>, ComputeError>> + 'static,
    {
        let property = bound(self.store.get_or_create(name, || {
            let key: Rc<str> = name.into();
            AsyncProperty::with_formula(
                erase_formula(move |_: CancellationToken| get_errors(&key)),
                default_comparer(),
                self.spawner.clone(),
                self.filtered_callback(),
            )
        }));
        property.get_value(CancellationToken::new(), None, name)
    }

    /// Invalidates the errors of `name`.
    ///
    /// The empty name invalidates every property's errors silently and then
    /// reports a change of the empty name. Returns `false` if no errors were
    /// ever computed for `name`.
    pub fn invalidate(&self, name: &str) -> bool {
        if name.is_empty() {
            self.store.invalidate_all(false);
            (self.on_errors_changed)("");
            return true;
        }
        match self.store.get(name) {
            Some(property) => {
                property.invalidate(self.notify_on_invalidate, name);
                true
            }
            None => false,
        }
    }

    fn filtered_callback(&self) -> ChangeCallback<Errors<E>> {
        let on_errors_changed = self.on_errors_changed.clone();
        let notify_on_invalidate = self.notify_on_invalidate;
        Rc::new(move |errors: &Errors<E>, name: &str| {
            if errors.is_some() || notify_on_invalidate {
                on_errors_changed(name);
            }
        })
    }
}

impl<E> fmt::Debug for AsyncValidationHelper<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncValidationHelper")
            .field("store", &self.store)
            .field("notify_on_invalidate", &self.notify_on_invalidate)
            .finish_non_exhaustive()
    }
}
