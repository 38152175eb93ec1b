// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Explicit evaluation context for dependency tracking.

use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use crate::source::{Dependent, Source};

/// Explicit evaluation context shared by sources and calculated formulas.
///
/// The tracker holds a stack of frames, one per formula currently being
/// evaluated. Reading a source while a frame is active links the source to the
/// innermost frame's dependent, so the dependent is invalidated the next time
/// the source changes.
///
/// Cloning a `DependencyTracker` creates a new handle to the **same** stack.
/// Objects whose properties should be able to depend on each other must share
/// one tracker.
///
/// # Example
///
/// ```rust
/// use understory_calculated::DependencyTracker;
///
/// let tracker = DependencyTracker::new();
/// assert!(!tracker.is_evaluating());
/// assert_eq!(tracker.depth(), 0);
/// ```
#[derive(Clone, Default)]
pub struct DependencyTracker {
    frames: Rc<RefCell<Vec<Weak<dyn Dependent>>>>,
}

impl DependencyTracker {
    /// Creates a tracker with an empty frame stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if a formula is currently being evaluated.
    #[must_use]
    pub fn is_evaluating(&self) -> bool {
        !self.frames.borrow().is_empty()
    }

    /// Returns the number of nested evaluations in progress.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.borrow().len()
    }

    /// Returns `true` if both handles refer to the same frame stack.
    #[must_use]
    pub fn same_context(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.frames, &other.frames)
    }

    /// Records that the innermost evaluating dependent reads `source`.
    ///
    /// Outside of any evaluation this is a no-op.
    pub fn register(&self, source: &dyn Source) {
        let current = self.frames.borrow().last().cloned();
        if let Some(dependent) = current {
            source.add_dependent(dependent);
        }
    }

    /// Runs `evaluate` with `dependent` as the innermost frame.
    ///
    /// Every source registered while `evaluate` runs is linked to
    /// `dependent`. The frame is popped when `evaluate` returns or unwinds.
    pub fn evaluate<R>(&self, dependent: Weak<dyn Dependent>, evaluate: impl FnOnce() -> R) -> R {
        self.frames.borrow_mut().push(dependent);
        let _frame = FrameGuard {
            frames: &self.frames,
        };
        tracing::trace!(depth = self.depth(), "evaluating tracked formula");
        evaluate()
    }
}

impl fmt::Debug for DependencyTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyTracker")
            .field("depth", &self.depth())
            .finish()
    }
}

/// Pops the innermost frame on drop.
struct FrameGuard<'a> {
    frames: &'a RefCell<Vec<Weak<dyn Dependent>>>,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.frames.borrow_mut().pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    use crate::source::SourceNode;

    struct Recorder {
        hits: Cell<u32>,
    }

    impl Dependent for Recorder {
        fn on_source_changed(&self) {
            self.hits.set(self.hits.get() + 1);
        }
    }

    fn recorder() -> Rc<Recorder> {
        Rc::new(Recorder { hits: Cell::new(0) })
    }

    #[test]
    fn register_outside_evaluation_is_noop() {
        let tracker = DependencyTracker::new();
        let source = SourceNode::new("A", |_| {});
        tracker.register(&source);
        assert_eq!(source.dependent_count(), 0);
    }

    #[test]
    fn register_links_innermost_frame() {
        let tracker = DependencyTracker::new();
        let outer = recorder();
        let inner = recorder();
        let a = SourceNode::new("A", |_| {});
        let b = SourceNode::new("B", |_| {});

        let outer_weak: Weak<dyn Dependent> = Rc::downgrade(&outer) as Weak<dyn Dependent>;
        let inner_weak: Weak<dyn Dependent> = Rc::downgrade(&inner) as Weak<dyn Dependent>;
        tracker.evaluate(outer_weak, || {
            tracker.register(&a);
            assert_eq!(tracker.depth(), 1);
            tracker.evaluate(inner_weak, || {
                tracker.register(&b);
                assert_eq!(tracker.depth(), 2);
            });
        });
        assert!(!tracker.is_evaluating());

        b.invalidate();
        assert_eq!(inner.hits.get(), 1);
        assert_eq!(outer.hits.get(), 0);

        a.invalidate();
        assert_eq!(outer.hits.get(), 1);
    }

    #[test]
    fn frame_popped_on_unwind() {
        extern crate std;

        let tracker = DependencyTracker::new();
        let dependent = recorder();
        let weak: Weak<dyn Dependent> = Rc::downgrade(&dependent) as Weak<dyn Dependent>;
        let t = tracker.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            t.evaluate::<()>(weak, || panic!("formula failed"));
        }));
        assert!(result.is_err());
        assert_eq!(tracker.depth(), 0);
    }

    #[test]
    fn clones_share_context() {
        let tracker = DependencyTracker::new();
        let other = tracker.clone();
        assert!(tracker.same_context(&other));
        assert!(!tracker.same_context(&DependencyTracker::new()));
    }
}
