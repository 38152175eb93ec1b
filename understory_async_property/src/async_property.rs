// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Asynchronously computed properties.
//!
//! An [`AsyncProperty`] starts its formula the first time it is read while
//! invalid and returns the current (possibly default) value immediately. The
//! formula's future is spawned on the owning context's [`LocalSpawn`], so the
//! result is applied on that context and never concurrently with other reads
//! or writes of the property.
//!
//! ```text
//!            get_value                    completion
//!   Invalid ───────────▶ Computing ─────────────────────▶ Valid (Succeeded)
//!      ▲                     │ Faulted / Cancelled
//!      │                     ▼
//!      └──────────────── Invalid
//! ```
//!
//! While computing, further reads do not start a second formula run. They
//! join the in-flight computation instead: a listener that is not already
//! attached is told the computation started and will receive its outcome.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::rc::{Rc, Weak};

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use futures::task::{LocalSpawn, LocalSpawnExt};
use smallvec::{SmallVec, smallvec};

use crate::cancel::CancellationToken;
use crate::cell::{ChangeCallback, Comparer, ValueCell};
use crate::error::ComputeError;
use crate::listener::{AggregateTaskListener, TaskListener, TaskOutcome};
use crate::property::Property;

/// Type-erased asynchronous formula.
pub type AsyncFormula<T> =
    Rc<dyn Fn(CancellationToken) -> LocalBoxFuture<'static, Result<T, ComputeError>>>;

/// The owning execution context computations are spawned on.
pub type Spawner = Rc<dyn LocalSpawn>;

struct InFlight {
    listeners: SmallVec<[Rc<dyn TaskListener>; 2]>,
}

/// A property computed by an asynchronous formula.
///
/// # Invariants
///
/// 1. At most one formula run is outstanding per property.
/// 2. The computing state is left before completion listeners run, so a
///    listener may read the property again and start a fresh computation.
/// 3. Only a successful run writes a value. Failure and cancellation leave the
///    property as it was and produce no change notification.
/// 4. An outstanding run holds the property weakly. Dropping the property
///    drops the result.
/// 5. Every run ends with an outcome. A formula that panics, or a run whose
///    task is dropped or refused by the executor, completes as faulted.
///
/// Invalidating a property while a run is outstanding does not abandon the
/// run: its result is still applied when it arrives.
pub struct AsyncProperty<T> {
    cell: ValueCell<T>,
    formula: AsyncFormula<T>,
    spawner: Spawner,
    in_flight: RefCell<Option<InFlight>>,
    this: Weak<Self>,
}

impl<T: Clone + Default + 'static> AsyncProperty<T> {
    /// Creates an invalid property over `formula`.
    pub fn new<F, Fut>(
        formula: F,
        comparer: Comparer<T>,
        spawner: Spawner,
        on_change: ChangeCallback<T>,
    ) -> Rc<Self>
    where
        F: Fn(CancellationToken) -> Fut + 'static,
        Fut: Future<Output = Result<T, ComputeError>> + 'static,
    {
        let formula: AsyncFormula<T> = Rc::new(move |token| formula(token).boxed_local());
        Self::with_formula(formula, comparer, spawner, on_change)
    }

    /// Creates an invalid property over an already type-erased formula.
    pub fn with_formula(
        formula: AsyncFormula<T>,
        comparer: Comparer<T>,
        spawner: Spawner,
        on_change: ChangeCallback<T>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            cell: ValueCell::new(comparer, on_change),
            formula,
            spawner,
            in_flight: RefCell::new(None),
            this: this.clone(),
        })
    }

    /// Returns the current value, starting a computation if the property is
    /// invalid and none is outstanding.
    ///
    /// `listener` is told when the computation this read started or joined
    /// begins and how it ends. Without a listener the shared no-op listener
    /// is used.
    pub fn get_value(
        &self,
        token: CancellationToken,
        listener: Option<Rc<dyn TaskListener>>,
        name: &str,
    ) -> T {
        if !self.cell.is_valid() {
            self.start_or_join(token, listener, name);
        }
        self.cell.current()
    }

    /// Returns `true` while a computation is outstanding.
    #[must_use]
    pub fn is_computing(&self) -> bool {
        self.in_flight.borrow().is_some()
    }

    /// Returns the stored value without starting a computation.
    #[must_use]
    pub fn current(&self) -> T {
        self.cell.current()
    }

    fn start_or_join(
        &self,
        token: CancellationToken,
        listener: Option<Rc<dyn TaskListener>>,
        name: &str,
    ) {
        let listener =
            listener.unwrap_or_else(|| AggregateTaskListener::empty() as Rc<dyn TaskListener>);

        let joined = {
            let mut in_flight = self.in_flight.borrow_mut();
            match in_flight.as_mut() {
                Some(flight) => {
                    let attached = flight.listeners.iter().any(|l| Rc::ptr_eq(l, &listener));
                    if !attached {
                        flight.listeners.push(listener.clone());
                    }
                    Some(!attached)
                }
                None => {
                    *in_flight = Some(InFlight {
                        listeners: smallvec![listener.clone()],
                    });
                    None
                }
            }
        };

        match joined {
            Some(newly_attached) => {
                tracing::trace!(property = name, newly_attached, "joining in-flight computation");
                if newly_attached {
                    listener.notify_task_starting();
                }
            }
            None => {
                tracing::trace!(property = name, "starting asynchronous computation");
                listener.notify_task_starting();
                self.spawn(token, name);
            }
        }
    }

    fn spawn(&self, token: CancellationToken, name: &str) {
        let run = RunGuard {
            property: Some(self.this.clone()),
            name: Rc::from(name),
        };
        let computation = AssertUnwindSafe((self.formula)(token)).catch_unwind();
        let task = async move {
            let result = computation.await.unwrap_or_else(|panic| {
                let message = panic_message(&*panic);
                tracing::warn!(
                    property = &*run.name,
                    panic = %message,
                    "asynchronous formula panicked"
                );
                Err(ComputeError::failed(format!("formula panicked: {message}")))
            });
            run.finish(result);
        };
        // A refused task is dropped here, which faults the run through its guard.
        if let Err(err) = self.spawner.spawn_local(task) {
            tracing::warn!(property = name, error = %err, "owning context refused the computation");
        }
    }

    fn complete(&self, result: Result<T, ComputeError>, name: &str) {
        let flight = self.in_flight.borrow_mut().take();
        let outcome = match result {
            Ok(value) => {
                self.cell.set_if_changed(value, name);
                TaskOutcome::Succeeded
            }
            Err(ComputeError::Cancelled) => TaskOutcome::Cancelled,
            Err(ComputeError::Failed(err)) => {
                tracing::debug!(property = name, error = %err, "asynchronous formula failed");
                TaskOutcome::Faulted
            }
        };
        tracing::debug!(property = name, ?outcome, "asynchronous computation completed");
        if let Some(flight) = flight {
            for listener in flight.listeners {
                listener.notify_task_completed(outcome);
            }
        }
    }
}

/// Ends an outstanding run exactly once.
///
/// Dropped without [`finish`](Self::finish), for example when the formula
/// panics before returning its future or the executor drops the task, the run
/// completes as faulted.
struct RunGuard<T: Clone + Default + 'static> {
    property: Option<Weak<AsyncProperty<T>>>,
    name: Rc<str>,
}

impl<T: Clone + Default + 'static> RunGuard<T> {
    fn finish(mut self, result: Result<T, ComputeError>) {
        if let Some(property) = self.property.take().and_then(|p| p.upgrade()) {
            property.complete(result, &self.name);
        }
    }
}

impl<T: Clone + Default + 'static> Drop for RunGuard<T> {
    fn drop(&mut self) {
        if let Some(property) = self.property.take().and_then(|p| p.upgrade()) {
            tracing::debug!(property = &*self.name, "computation dropped before completing");
            property.complete(
                Err(ComputeError::failed("computation dropped before completing")),
                &self.name,
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| String::from("non-string payload"))
}

impl<T: Clone + Default + 'static> Property for AsyncProperty<T> {
    fn invalidate(&self, notify: bool, name: &str) {
        self.cell.invalidate(notify, name);
    }

    fn is_valid(&self) -> bool {
        self.cell.is_valid()
    }
}

impl<T: fmt::Debug> fmt::Debug for AsyncProperty<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncProperty")
            .field("cell", &self.cell)
            .field("computing", &self.in_flight.borrow().is_some())
            .finish_non_exhaustive()
    }
}
