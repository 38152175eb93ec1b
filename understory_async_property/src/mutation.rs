// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! In-place mutation events.
//!
//! Trigger properties watch their current value for in-place mutation so that
//! editing a collection that a property holds invalidates the property the same
//! way replacing it would. A value type opts in by implementing
//! [`MutationEvents::subscribe_mutations`]; types that keep the default
//! implementation are simply not watched.

use std::fmt;
use std::rc::Rc;

/// Handler invoked when a watched value mutates in place.
pub type MutationHandler = Rc<dyn Fn()>;

/// A value that can report in-place mutation.
pub trait MutationEvents {
    /// Attaches `handler` to this value's mutation event.
    ///
    /// Returns `None` if the value cannot report mutation. Dropping the
    /// returned [`Subscription`] detaches the handler.
    fn subscribe_mutations(&self, handler: MutationHandler) -> Option<Subscription> {
        let _ = handler;
        None
    }
}

macro_rules! immutable_values {
    ($($ty:ty),* $(,)?) => {
        $(impl MutationEvents for $ty {})*
    };
}

immutable_values!(
    (), bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64,
    str, String, &'static str,
);

impl<T> MutationEvents for Vec<T> {}

impl<T: MutationEvents> MutationEvents for Option<T> {
    fn subscribe_mutations(&self, handler: MutationHandler) -> Option<Subscription> {
        self.as_ref()?.subscribe_mutations(handler)
    }
}

impl<T: MutationEvents + ?Sized> MutationEvents for Box<T> {
    fn subscribe_mutations(&self, handler: MutationHandler) -> Option<Subscription> {
        (**self).subscribe_mutations(handler)
    }
}

impl<T: MutationEvents + ?Sized> MutationEvents for Rc<T> {
    fn subscribe_mutations(&self, handler: MutationHandler) -> Option<Subscription> {
        (**self).subscribe_mutations(handler)
    }
}

/// Attachment of a handler to a mutation event.
///
/// The handler is detached when the subscription is dropped or
/// [`unsubscribe`](Self::unsubscribe)d.
#[must_use = "dropping a subscription detaches its handler"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Creates a subscription that runs `detach` exactly once.
    pub fn new(detach: impl FnOnce() + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// Detaches the handler now.
    pub fn unsubscribe(mut self) {
        self.detach_now();
    }

    fn detach_now(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}
