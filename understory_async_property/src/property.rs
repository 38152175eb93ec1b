// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The type-erased property interface.

use std::any::Any;

/// Operations every stored property supports regardless of its value type.
///
/// Stores keep properties as `Rc<dyn Property>` and recover the concrete type
/// by downcasting through [`Any`].
pub trait Property: Any {
    /// Resets the property to its invalid state.
    ///
    /// With `notify`, the change callback fires with the default value.
    fn invalidate(&self, notify: bool, name: &str);

    /// Returns `true` if the property holds a value that does not need to be
    /// recomputed.
    fn is_valid(&self) -> bool;
}
