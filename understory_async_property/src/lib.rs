// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Async Property: memoized synchronous and asynchronous
//! properties for model objects.
//!
//! A model object delegates each of its properties to a helper, naming the
//! property and giving the formula that computes it. The helper creates the
//! property on first use, computes it at most once until it is invalidated,
//! and reports the property's name whenever its value changes.
//!
//! - **Values** ([`ValueCell`]): a valid/invalid slot that notifies only when
//!   its value really changes, as decided by a [`Comparer`].
//! - **Properties** ([`LazyProperty`], [`AsyncProperty`]): a synchronous
//!   formula run on first read, and an asynchronous formula spawned on the
//!   owning context with at most one run in flight. Progress of an
//!   asynchronous run is reported to [`TaskListener`]s and it can be stopped
//!   through a [`CancellationToken`].
//! - **Triggers** ([`LazyTriggerProperty`], [`AsyncTriggerProperty`]): the
//!   same properties made into sources for [`understory_calculated`], so
//!   calculated formulas that read them are invalidated when they change.
//!   Values that report in-place mutation through [`MutationEvents`], such as
//!   [`ObservableVec`], invalidate dependents when they are edited.
//! - **Storage** ([`PropertyStore`]): name-keyed, type-erased properties.
//! - **Helpers** ([`AsyncPropertyHelper`], [`CalculatedAsyncPropertyHelper`],
//!   [`AsyncValidationHelper`]): the surface a model object uses.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use futures::executor::LocalPool;
//! use understory_async_property::{
//!     AsyncPropertyHelper, CancellationToken, ComputeError, RecordingListener, TaskOutcome,
//! };
//!
//! let mut pool = LocalPool::new();
//! let changed = Rc::new(RefCell::new(Vec::<String>::new()));
//! let log = changed.clone();
//! let props = AsyncPropertyHelper::new(Rc::new(pool.spawner()), move |name: &str| {
//!     log.borrow_mut().push(name.into());
//! });
//!
//! // Synchronous properties are computed on first read.
//! assert_eq!(props.get("Two", || 1 + 1), 2);
//!
//! // Asynchronous properties return the default value until the run completes.
//! let listener = RecordingListener::new();
//! let status = props.get_async_with(
//!     "Status",
//!     |token| async move {
//!         token.check()?;
//!         Ok::<_, ComputeError>(String::from("done"))
//!     },
//!     CancellationToken::new(),
//!     Some(listener.clone()),
//! );
//! assert_eq!(status, "");
//!
//! pool.run_until_stalled();
//! assert_eq!(*changed.borrow(), ["Status"]);
//! assert_eq!(listener.outcomes(), [TaskOutcome::Succeeded]);
//! ```
//!
//! ## Execution model
//!
//! Everything is single-threaded and `Rc`-based: a model object and its
//! properties live on one context. Asynchronous formulas are spawned on a
//! [`Spawner`] for that context, so their results are applied there. A formula
//! may hand work to other threads; the [`CancellationToken`] it receives is
//! `Send + Sync` for that purpose.
//!
//! Callbacks never run while a property holds an internal borrow, so change
//! callbacks and listeners may read and write properties.

mod async_property;
mod calculated;
mod cancel;
mod cell;
mod error;
mod helper;
mod lazy;
mod listener;
mod mutation;
mod observable;
mod property;
mod store;
mod trigger;
mod validation;

pub use async_property::{AsyncFormula, AsyncProperty, Spawner};
pub use calculated::{CalculatedAsyncPropertyHelper, TRIGGER_KEY_PREFIX};
pub use cancel::{CancellationToken, Cancelled};
pub use cell::{ChangeCallback, Comparer, ValueCell, default_comparer};
pub use error::{BoxError, ComputeError, PropertyError};
pub use helper::AsyncPropertyHelper;
pub use lazy::LazyProperty;
pub use listener::{AggregateTaskListener, RecordingListener, TaskListener, TaskOutcome};
pub use mutation::{MutationEvents, MutationHandler, Subscription};
pub use observable::{CollectionChange, ObservableVec};
pub use property::Property;
pub use store::{ErasedProperty, PropertyStore};
pub use trigger::{AsyncTriggerProperty, LazyTriggerProperty};
pub use validation::{AsyncValidationHelper, AsyncValidationHelperBuilder, Errors};

pub use understory_calculated;
