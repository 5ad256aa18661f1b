// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-object property storage.
//!
//! [`PropertyContainer`] maps the properties an object has touched to their
//! value slots. Properties that were never written, or were written back to
//! their default, have no entry: reads fall through to the shared default.

use core::any::Any;
use core::cell::RefCell;
use core::fmt;
use std::rc::Rc;
use std::sync::Arc;

use hashbrown::HashMap;

use crate::error::{PropertyError, PropertyResult};
use crate::event::{
    EventChannel, ExtensionChangedEvent, ExtensionChangedHandler, HandlerId, PropertyChangedEvent,
    PropertyChangedHandler,
};
use crate::object::DependencyObject;
use crate::property::{DependencyProperty, PropertyRef, PropertyValue};
use crate::registry::{ClassId, DependencyClass, DependencyType, TypeRegistry};
use crate::slot::{ErasedSlot, ValueSlot};

/// Sparse storage for one object's dependency property values.
///
/// A container is owned by the object it serves and is reached through
/// [`DependencyObject::dependency_container`]. Reads and writes go through
/// [`DependencyObjectExt`](crate::DependencyObjectExt).
///
/// The container uses interior mutability and is not `Sync`: one thread
/// at a time may operate on an object. The two object-wide event channels
/// are the exception; they are shared `Arc`s whose subscriber lists may be
/// changed from any thread.
///
/// # Example
///
/// ```rust
/// use understory_dependency::{DependencyClass, PropertyContainer};
///
/// struct Border;
/// impl DependencyClass for Border {}
///
/// let container = PropertyContainer::new::<Border>();
/// assert!(container.is_empty());
/// assert!(container.dependency_type().is_subclass_of(container.class()));
/// ```
pub struct PropertyContainer {
    dependency_type: Arc<DependencyType>,
    slots: RefCell<HashMap<PropertyRef, Rc<dyn ErasedSlot>>>,
    property_changed: Arc<EventChannel<PropertyChangedHandler>>,
    extension_changed: Arc<EventChannel<ExtensionChangedHandler>>,
}

impl PropertyContainer {
    /// Creates an empty container for an object of class `C`.
    #[must_use]
    pub fn new<C: DependencyClass>() -> Self {
        Self::for_class(ClassId::of::<C>())
    }

    /// Creates an empty container for an object of class `class`.
    #[must_use]
    pub fn for_class(class: ClassId) -> Self {
        Self {
            dependency_type: TypeRegistry::global().get_or_create(class),
            slots: RefCell::new(HashMap::new()),
            property_changed: Arc::new(EventChannel::new()),
            extension_changed: Arc::new(EventChannel::new()),
        }
    }

    /// Returns the class of the owning object.
    #[must_use]
    #[inline]
    pub fn class(&self) -> ClassId {
        self.dependency_type.class()
    }

    /// Returns the class descriptor of the owning object.
    #[must_use]
    #[inline]
    pub fn dependency_type(&self) -> &Arc<DependencyType> {
        &self.dependency_type
    }

    /// Returns `true` if `property` may be used on this object: it is
    /// attached, or the object's class is its owner class or derives from it.
    #[must_use]
    pub fn is_valid_property(&self, property: &PropertyRef) -> bool {
        property.is_attached() || self.dependency_type.is_subclass_of(property.owner_class())
    }

    /// Returns the number of properties with a live slot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    /// Returns `true` if no property holds a slot.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    /// Returns `true` if `property` currently holds a slot.
    #[must_use]
    pub fn contains(&self, property: &PropertyRef) -> bool {
        self.slots.borrow().contains_key(property)
    }

    /// Returns the properties that currently hold a slot, in no particular order.
    #[must_use]
    pub fn touched_properties(&self) -> Vec<PropertyRef> {
        self.slots.borrow().keys().cloned().collect()
    }

    /// Returns the attached properties that currently hold a slot.
    #[must_use]
    pub fn attached_properties(&self) -> Vec<PropertyRef> {
        self.slots
            .borrow()
            .keys()
            .filter(|property| property.is_attached())
            .cloned()
            .collect()
    }

    /// Returns the channel raised after any property of the object changed.
    #[must_use]
    #[inline]
    pub fn property_changed(&self) -> &Arc<EventChannel<PropertyChangedHandler>> {
        &self.property_changed
    }

    /// Returns the channel raised when a value provider of the object was
    /// attached, replaced or detached.
    #[must_use]
    #[inline]
    pub fn extension_changed(&self) -> &Arc<EventChannel<ExtensionChangedHandler>> {
        &self.extension_changed
    }

    /// Subscribes to [`property_changed`](Self::property_changed).
    pub fn on_property_changed(
        &self,
        handler: impl Fn(&dyn DependencyObject, &PropertyChangedEvent<'_>) + Send + Sync + 'static,
    ) -> HandlerId {
        self.property_changed.subscribe(Arc::new(handler))
    }

    /// Subscribes to [`extension_changed`](Self::extension_changed).
    pub fn on_extension_changed(
        &self,
        handler: impl Fn(&dyn DependencyObject, &ExtensionChangedEvent<'_>) + Send + Sync + 'static,
    ) -> HandlerId {
        self.extension_changed.subscribe(Arc::new(handler))
    }

    pub(crate) fn raise_property_changed(&self, owner: &dyn DependencyObject, event: &PropertyChangedEvent<'_>) {
        self.property_changed.raise(|handler| handler(owner, event));
    }

    pub(crate) fn raise_extension_changed(
        &self,
        owner: &dyn DependencyObject,
        event: &ExtensionChangedEvent<'_>,
    ) {
        self.extension_changed.raise(|handler| handler(owner, event));
    }

    pub(crate) fn check_valid(&self, property: &PropertyRef) -> PropertyResult<()> {
        if self.is_valid_property(property) {
            Ok(())
        } else {
            Err(PropertyError::InvalidOwner {
                property: property.name(),
                class: self.class().name(),
            })
        }
    }

    /// Returns the slot of `property` if it has one.
    pub(crate) fn existing_slot<T: PropertyValue>(
        &self,
        property: &DependencyProperty<T>,
    ) -> Option<Rc<ValueSlot<T>>> {
        let slot = self.slots.borrow().get(&property.to_ref()).cloned()?;
        downcast_slot(slot)
    }

    /// Returns the slot of `property`, creating it if needed.
    pub(crate) fn slot<T: PropertyValue>(
        &self,
        owner: &dyn DependencyObject,
        property: &DependencyProperty<T>,
    ) -> PropertyResult<Rc<ValueSlot<T>>> {
        if let Some(slot) = self.existing_slot(property) {
            return Ok(slot);
        }
        let key = property.to_ref();
        self.check_valid(&key)?;
        // Built without a borrow held: a factory default may read other
        // properties of the object.
        let created: Rc<dyn ErasedSlot> = Rc::new(ValueSlot::new(property.clone(), owner));
        let slot = self.insert_slot(key, created);
        downcast_slot(slot).ok_or(PropertyError::TypeMismatch {
            property: property.name(),
            expected: core::any::type_name::<T>(),
            found: "slot of another type",
        })
    }

    pub(crate) fn existing_erased_slot(&self, property: &PropertyRef) -> Option<Rc<dyn ErasedSlot>> {
        self.slots.borrow().get(property).cloned()
    }

    pub(crate) fn erased_slot(
        &self,
        owner: &dyn DependencyObject,
        property: &PropertyRef,
    ) -> PropertyResult<Rc<dyn ErasedSlot>> {
        if let Some(slot) = self.existing_erased_slot(property) {
            return Ok(slot);
        }
        self.check_valid(property)?;
        let created = property.create_slot(owner);
        Ok(self.insert_slot(property.clone(), created))
    }

    fn insert_slot(&self, key: PropertyRef, created: Rc<dyn ErasedSlot>) -> Rc<dyn ErasedSlot> {
        let mut slots = self.slots.borrow_mut();
        tracing::trace!(property = key.name(), class = self.class().name(), "creating value slot");
        Rc::clone(slots.entry(key).or_insert(created))
    }

    /// Drops the slot of `property` if it no longer holds anything.
    pub(crate) fn evict_if_unused(&self, property: &PropertyRef) {
        let evicted = {
            let mut slots = self.slots.borrow_mut();
            if slots.get(property).is_some_and(|slot| slot.is_evictable()) {
                slots.remove(property)
            } else {
                None
            }
        };
        if evicted.is_some() {
            tracing::trace!(property = property.name(), "evicted value slot");
        }
    }
}

fn downcast_slot<T: PropertyValue>(slot: Rc<dyn ErasedSlot>) -> Option<Rc<ValueSlot<T>>> {
    let slot: Rc<dyn Any> = slot;
    slot.downcast::<ValueSlot<T>>().ok()
}

impl fmt::Debug for PropertyContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyContainer")
            .field("class", &self.class())
            .field("slots", &self.touched_properties())
            .field("property_changed", &self.property_changed)
            .field("extension_changed", &self.extension_changed)
            .finish()
    }
}
