// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-object, name-keyed property storage.
//!
//! Properties of different kinds and value types live side by side, so the
//! store keeps them type-erased and recovers the concrete type with a checked
//! downcast. A name is bound to the first property created for it; asking for
//! a different kind under the same name is reported as
//! [`PropertyError::KindMismatch`].

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use hashbrown::HashMap;

use crate::error::PropertyError;
use crate::property::Property;

/// A stored property together with its name and concrete kind.
pub struct ErasedProperty {
    name: Rc<str>,
    property: Rc<dyn Property>,
    kind: &'static str,
}

impl ErasedProperty {
    /// Erases `property`, remembering its concrete type.
    pub fn new<P: Property>(name: impl Into<Rc<str>>, property: Rc<P>) -> Self {
        Self {
            name: name.into(),
            property,
            kind: std::any::type_name::<P>(),
        }
    }

    /// Returns the property name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the type name of the stored property.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Returns the type-erased property.
    #[must_use]
    pub fn property(&self) -> &Rc<dyn Property> {
        &self.property
    }

    /// Recovers the concrete property.
    pub fn downcast<P: Property>(&self) -> Result<Rc<P>, PropertyError> {
        let any: Rc<dyn Any> = self.property.clone();
        any.downcast::<P>().map_err(|_| PropertyError::KindMismatch {
            name: self.name.to_string(),
            existing: self.kind,
            requested: std::any::type_name::<P>(),
        })
    }
}

/// Invalidating an erased property through the dependency engine always
/// notifies.
impl understory_calculated::Node for ErasedProperty {
    fn invalidate(&self) {
        self.property.invalidate(true, &self.name);
    }
}

impl fmt::Debug for ErasedProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedProperty")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("valid", &self.property.is_valid())
            .finish()
    }
}

#[derive(Default)]
struct Entries {
    list: Vec<Rc<ErasedProperty>>,
    index: HashMap<Rc<str>, usize>,
}

/// Name-keyed storage for the properties of one object.
///
/// Entries are kept in creation order. The store never holds its internal
/// borrow while a factory or a property callback runs, so factories may
/// create other properties and change callbacks may read the store.
#[derive(Default)]
pub struct PropertyStore {
    entries: RefCell<Entries>,
}

impl PropertyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().list.len()
    }

    /// Returns `true` if no property has been created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().list.is_empty()
    }

    /// Returns the names of all stored properties in creation order.
    #[must_use]
    pub fn names(&self) -> Vec<Rc<str>> {
        self.entries
            .borrow()
            .list
            .iter()
            .map(|e| e.name.clone())
            .collect()
    }

    /// Returns the entry for `name`, if any.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<Rc<ErasedProperty>> {
        let entries = self.entries.borrow();
        entries.index.get(name).map(|&i| entries.list[i].clone())
    }

    /// Returns the property bound to `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Rc<dyn Property>> {
        self.entry(name).map(|e| e.property.clone())
    }

    /// Returns the property of type `P` bound to `name`, creating it with
    /// `factory` if the name is unbound.
    ///
    /// `factory` runs at most once per call and only if `name` is unbound. If
    /// it binds `name` itself, the property it bound wins.
    pub fn get_or_create<P: Property>(
        &self,
        name: &str,
        factory: impl FnOnce() -> Rc<P>,
    ) -> Result<Rc<P>, PropertyError> {
        if let Some(entry) = self.entry(name) {
            return entry.downcast();
        }
        let created = Rc::new(ErasedProperty::new(name, factory()));
        let entry = {
            let mut entries = self.entries.borrow_mut();
            let Entries { list, index } = &mut *entries;
            let slot = *index.entry(created.name.clone()).or_insert_with(|| {
                list.push(created.clone());
                list.len() - 1
            });
            list[slot].clone()
        };
        entry.downcast()
    }

    /// Invalidates every stored property.
    pub fn invalidate_all(&self, notify: bool) {
        let snapshot = self.entries.borrow().list.clone();
        tracing::debug!(properties = snapshot.len(), notify, "invalidating all properties");
        for entry in snapshot {
            entry.property.invalidate(notify, &entry.name);
        }
    }
}

impl fmt::Debug for PropertyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.borrow().list.iter()).finish()
    }
}
