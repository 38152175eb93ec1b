// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Calculated: dependency-tracked calculated properties.
//!
//! This crate provides the dependency-tracking half of a reactive property
//! system. A *calculated* property is a memoized formula; while the formula
//! runs, every *source* it reads registers itself with the evaluation context,
//! and when any of those sources later changes the calculated property is
//! invalidated and its owner is notified.
//!
//! - **Evaluation context** ([`DependencyTracker`]): an explicit, cloneable
//!   handle to a stack of frames. There is no ambient global; whoever evaluates
//!   a formula and whoever reads a source must share the same tracker.
//! - **Edges** ([`Source`], [`Dependent`], [`SourceNode`]): a source keeps weak
//!   references to the dependents that read it during their last evaluation.
//! - **Nodes** ([`TriggerProperty`], [`CalculatedProperty`]): a settable source
//!   and a memoized formula that is itself a source.
//! - **Per-object store** ([`PropertyHelper`]): name-keyed nodes, created on
//!   first use and bound to one kind for their lifetime.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use understory_calculated::{DependencyTracker, PropertyHelper};
//!
//! let changed = Rc::new(RefCell::new(Vec::<String>::new()));
//! let log = changed.clone();
//! let model = Rc::new(PropertyHelper::new(DependencyTracker::new(), move |name: &str| {
//!     log.borrow_mut().push(name.into());
//! }));
//!
//! model.set("Width", 3_i32);
//! let m = model.clone();
//! let area = model.calculated("Area", move || m.trigger("Width", || 0_i32) * 2);
//! assert_eq!(area, 6);
//!
//! // Changing the source invalidates the calculated property.
//! changed.borrow_mut().clear();
//! model.set("Width", 5_i32);
//! assert_eq!(*changed.borrow(), ["Area", "Width"]);
//! let m = model.clone();
//! assert_eq!(model.calculated("Area", move || m.trigger("Width", || 0_i32) * 2), 10);
//! ```
//!
//! ## Scope
//!
//! Cycle detection and ordered re-evaluation are not provided: invalidation is
//! a push of "stale" marks, and recomputation happens lazily on the next read.
//!
//! ## `no_std` Support
//!
//! This crate is `no_std` and uses `alloc`. It does not depend on `std`.

#![no_std]

extern crate alloc;

mod calculated;
mod helper;
mod source;
mod tracker;
mod trigger;

pub use calculated::CalculatedProperty;
pub use helper::{ChangedCallback, Node, NodeKindMismatch, PropertyHelper};
pub use source::{Dependent, Source, SourceNode};
pub use tracker::DependencyTracker;
pub use trigger::TriggerProperty;
