// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Source/dependent edges.

use alloc::rc::{Rc, Weak};
use core::cell::RefCell;
use core::fmt;

use smallvec::SmallVec;

/// Something that can be read by a tracked formula.
pub trait Source {
    /// Links `dependent` so it is invalidated when this source changes.
    ///
    /// Adding a dependent that is already linked must not create a duplicate
    /// edge.
    fn add_dependent(&self, dependent: Weak<dyn Dependent>);
}

/// Something whose value was derived from one or more sources.
pub trait Dependent {
    /// Called when a source read during the last evaluation has changed.
    fn on_source_changed(&self);
}

/// Shared bookkeeping for a named source.
///
/// A `SourceNode` keeps weak links to the dependents that read it since its
/// last invalidation. Invalidating the node takes those links, invalidates each
/// live dependent, and then reports the node's own name through the change
/// callback. Dependents re-link on their next evaluation.
pub struct SourceNode {
    name: Rc<str>,
    on_changed: Rc<dyn Fn(&str)>,
    dependents: RefCell<SmallVec<[Weak<dyn Dependent>; 4]>>,
}

impl SourceNode {
    /// Creates a source reporting changes as `name`.
    pub fn new(name: impl Into<Rc<str>>, on_changed: impl Fn(&str) + 'static) -> Self {
        Self::with_callback(name, Rc::new(on_changed))
    }

    /// Creates a source sharing an existing change callback.
    pub fn with_callback(name: impl Into<Rc<str>>, on_changed: Rc<dyn Fn(&str)>) -> Self {
        Self {
            name: name.into(),
            on_changed,
            dependents: RefCell::new(SmallVec::new()),
        }
    }

    /// Returns the name reported on change.
    #[must_use]
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of live dependents currently linked.
    #[must_use]
    pub fn dependent_count(&self) -> usize {
        self.dependents
            .borrow()
            .iter()
            .filter(|d| d.strong_count() > 0)
            .count()
    }

    /// Invalidates every linked dependent, then reports this source as changed.
    pub fn invalidate(&self) {
        self.invalidate_dependents();
        (self.on_changed)(&self.name);
    }

    /// Invalidates every linked dependent without reporting this source.
    pub fn invalidate_dependents(&self) {
        let dependents = core::mem::take(&mut *self.dependents.borrow_mut());
        if !dependents.is_empty() {
            tracing::debug!(
                source = %self.name,
                dependents = dependents.len(),
                "invalidating dependents"
            );
        }
        for dependent in dependents.iter().filter_map(Weak::upgrade) {
            dependent.on_source_changed();
        }
    }
}

impl Source for SourceNode {
    fn add_dependent(&self, dependent: Weak<dyn Dependent>) {
        let mut dependents = self.dependents.borrow_mut();
        dependents.retain(|d| d.strong_count() > 0);
        if !dependents.iter().any(|d| Weak::ptr_eq(d, &dependent)) {
            dependents.push(dependent);
        }
    }
}

// Manual Debug impl since callbacks aren't Debug
impl fmt::Debug for SourceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceNode")
            .field("name", &self.name)
            .field("dependents", &self.dependent_count())
            .finish_non_exhaustive()
    }
}
