// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dependency object traits.
//!
//! This module provides the [`DependencyObject`] trait for objects that own a
//! [`PropertyContainer`], and [`DependencyObjectExt`] with the property access
//! methods: get, set, clear, coerce, value providers and change handlers.

use core::any::Any;
use std::rc::Rc;

use crate::container::PropertyContainer;
use crate::error::{PropertyError, PropertyResult};
use crate::event::{ExpressionLayer, HandlerId, PropertyChangedArgs, PropertyChangedEvent};
use crate::expression::{ExpressionHandle, ValueProvider};
use crate::property::{DependencyProperty, PropertyKey, PropertyRef, PropertyValue};
use crate::slot::{ErasedSlot, ValueSlot};
use crate::value::ErasedValue;

/// A trait for objects that can have dependency properties.
///
/// # Example
///
/// ```rust
/// use understory_dependency::{DependencyClass, DependencyObject, PropertyContainer};
///
/// struct TextBlock {
///     container: PropertyContainer,
/// }
///
/// impl DependencyClass for TextBlock {}
///
/// impl DependencyObject for TextBlock {
///     fn dependency_container(&self) -> &PropertyContainer {
///         &self.container
///     }
/// }
///
/// let block = TextBlock { container: PropertyContainer::new::<TextBlock>() };
/// let erased: &dyn DependencyObject = &block;
/// assert!(erased.downcast_ref::<TextBlock>().is_some());
/// ```
pub trait DependencyObject: Any {
    /// Returns the object's property container.
    fn dependency_container(&self) -> &PropertyContainer;

    /// Decides whether `property` may be accessed on this object.
    ///
    /// Consulted before every read, write and handler change, including
    /// writes through a [`PropertyKey`]. The default allows everything.
    fn check_property_access(&self, property: &PropertyRef) -> PropertyResult<()> {
        let _ = property;
        Ok(())
    }
}

impl dyn DependencyObject {
    /// Returns the object as `O` if that is its concrete type.
    #[must_use]
    pub fn downcast_ref<O: DependencyObject>(&self) -> Option<&O> {
        let any: &dyn Any = self;
        any.downcast_ref()
    }
}

/// Conversion to `&dyn DependencyObject`, implemented for every dependency
/// object and for `dyn DependencyObject` itself.
pub trait AsDependencyObject {
    /// Returns `self` as a trait object.
    fn as_dependency_object(&self) -> &dyn DependencyObject;
}

impl<O: DependencyObject> AsDependencyObject for O {
    #[inline]
    fn as_dependency_object(&self) -> &dyn DependencyObject {
        self
    }
}

impl AsDependencyObject for dyn DependencyObject {
    #[inline]
    fn as_dependency_object(&self) -> &dyn DependencyObject {
        self
    }
}

/// Property access methods for dependency objects.
///
/// Every method works on concrete objects and on `&dyn DependencyObject`,
/// which is what callbacks receive.
///
/// Writes run synchronously and may reenter: a changed callback can write
/// other properties, which can in turn coerce this one. Per-property handlers
/// and the object-wide [`property_changed`](PropertyContainer::property_changed)
/// channel see only the outermost change of such a cascade.
pub trait DependencyObjectExt: AsDependencyObject {
    /// Returns the current value of `property`.
    ///
    /// # Panics
    ///
    /// Panics if `property` is not valid for this object or access to it is
    /// denied. See [`try_get_value`](Self::try_get_value) for the fallible form.
    fn get_value<T: PropertyValue>(&self, property: &DependencyProperty<T>) -> T {
        match self.try_get_value(property) {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Returns the current value of `property`.
    ///
    /// Without a slot this is the default value. A factory default is
    /// materialized into a slot so the factory runs once per object.
    fn try_get_value<T: PropertyValue>(&self, property: &DependencyProperty<T>) -> PropertyResult<T> {
        let owner = self.as_dependency_object();
        check_access(owner, &property.to_ref())?;
        let container = owner.dependency_container();
        if let Some(slot) = container.existing_slot(property) {
            return Ok(slot.value());
        }
        if property.uses_value_factory() {
            return Ok(container.slot(owner, property)?.value());
        }
        Ok(property.default_value(owner))
    }

    /// Returns the base value of `property`: the last explicitly assigned
    /// value before coercion.
    ///
    /// # Panics
    ///
    /// Panics if `property` is not valid for this object or access to it is
    /// denied. See [`try_get_base_value`](Self::try_get_base_value) for the
    /// fallible form.
    fn get_base_value<T: PropertyValue>(&self, property: &DependencyProperty<T>) -> T {
        match self.try_get_base_value(property) {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Returns the base value of `property`.
    fn try_get_base_value<T: PropertyValue>(&self, property: &DependencyProperty<T>) -> PropertyResult<T> {
        let owner = self.as_dependency_object();
        check_access(owner, &property.to_ref())?;
        let container = owner.dependency_container();
        if let Some(slot) = container.existing_slot(property) {
            return Ok(slot.base_value());
        }
        if property.uses_value_factory() {
            return Ok(container.slot(owner, property)?.base_value());
        }
        Ok(property.default_value(owner))
    }

    /// Explicitly assigns `value` to `property`.
    ///
    /// Any value provider bound to the property is detached.
    fn set_value<T: PropertyValue>(&self, property: &DependencyProperty<T>, value: T) -> PropertyResult<()> {
        write(self.as_dependency_object(), property, None, |owner, slot| {
            slot.set_value(owner, value)
        })
    }

    /// Assigns a read-only property through its key.
    fn set_value_with_key<T: PropertyValue>(&self, key: &PropertyKey<T>, value: T) -> PropertyResult<()> {
        write(self.as_dependency_object(), key.property(), Some(key), |owner, slot| {
            slot.set_value(owner, value)
        })
    }

    /// Resets `property` to its default value.
    fn clear_value<T: PropertyValue>(&self, property: &DependencyProperty<T>) -> PropertyResult<()> {
        clear(self.as_dependency_object(), property, None)
    }

    /// Resets a read-only property through its key.
    fn clear_value_with_key<T: PropertyValue>(&self, key: &PropertyKey<T>) -> PropertyResult<()> {
        clear(self.as_dependency_object(), key.property(), Some(key))
    }

    /// Recomputes the coerced value of `property` from its current source.
    ///
    /// Used by other properties' callbacks when the coercion of `property`
    /// depends on them. Does nothing for properties without a coerce callback.
    fn coerce_value<T: PropertyValue>(&self, property: &DependencyProperty<T>) -> PropertyResult<()> {
        if !property.metadata().has_coerce_callback() {
            return Ok(());
        }
        let owner = self.as_dependency_object();
        check_access(owner, &property.to_ref())?;
        let container = owner.dependency_container();
        let slot = container.slot(owner, property)?;
        slot.coerce_value(owner);
        container.evict_if_unused(&property.to_ref());
        Ok(())
    }

    /// Attaches (or with `None`, detaches) the primary value provider.
    fn set_value_extension<T: PropertyValue>(
        &self,
        property: &DependencyProperty<T>,
        provider: Option<Rc<dyn ValueProvider<T>>>,
    ) -> PropertyResult<()> {
        set_extension(self.as_dependency_object(), property, None, ExpressionLayer::Primary, provider)
    }

    /// Attaches the primary value provider of a read-only property.
    fn set_value_extension_with_key<T: PropertyValue>(
        &self,
        key: &PropertyKey<T>,
        provider: Option<Rc<dyn ValueProvider<T>>>,
    ) -> PropertyResult<()> {
        set_extension(
            self.as_dependency_object(),
            key.property(),
            Some(key),
            ExpressionLayer::Primary,
            provider,
        )
    }

    /// Attaches (or with `None`, detaches) the override value provider.
    ///
    /// While present, the override's value supersedes the primary's.
    fn set_value_extension_override<T: PropertyValue>(
        &self,
        property: &DependencyProperty<T>,
        provider: Option<Rc<dyn ValueProvider<T>>>,
    ) -> PropertyResult<()> {
        set_extension(self.as_dependency_object(), property, None, ExpressionLayer::Override, provider)
    }

    /// Attaches the override value provider of a read-only property.
    fn set_value_extension_override_with_key<T: PropertyValue>(
        &self,
        key: &PropertyKey<T>,
        provider: Option<Rc<dyn ValueProvider<T>>>,
    ) -> PropertyResult<()> {
        set_extension(
            self.as_dependency_object(),
            key.property(),
            Some(key),
            ExpressionLayer::Override,
            provider,
        )
    }

    /// Returns the primary value provider, if one is attached.
    fn get_value_extension<T: PropertyValue>(
        &self,
        property: &DependencyProperty<T>,
    ) -> PropertyResult<Option<Rc<dyn ValueProvider<T>>>> {
        let slot = checked_slot(self.as_dependency_object(), property)?;
        Ok(slot.and_then(|slot| slot.provider(ExpressionLayer::Primary)))
    }

    /// Returns the override value provider, if one is attached.
    fn get_value_extension_override<T: PropertyValue>(
        &self,
        property: &DependencyProperty<T>,
    ) -> PropertyResult<Option<Rc<dyn ValueProvider<T>>>> {
        let slot = checked_slot(self.as_dependency_object(), property)?;
        Ok(slot.and_then(|slot| slot.provider(ExpressionLayer::Override)))
    }

    /// Returns a handle to the primary bound expression, if any.
    fn get_value_expression<T: PropertyValue>(
        &self,
        property: &DependencyProperty<T>,
    ) -> PropertyResult<Option<ExpressionHandle<T>>> {
        let slot = checked_slot(self.as_dependency_object(), property)?;
        Ok(slot.and_then(|slot| slot.expression(ExpressionLayer::Primary)))
    }

    /// Returns a handle to the override bound expression, if any.
    fn get_value_expression_override<T: PropertyValue>(
        &self,
        property: &DependencyProperty<T>,
    ) -> PropertyResult<Option<ExpressionHandle<T>>> {
        let slot = checked_slot(self.as_dependency_object(), property)?;
        Ok(slot.and_then(|slot| slot.expression(ExpressionLayer::Override)))
    }

    /// Adds a handler run after each outermost change of `property`.
    fn add_change_handler<T: PropertyValue>(
        &self,
        property: &DependencyProperty<T>,
        handler: impl Fn(&dyn DependencyObject, &PropertyChangedArgs<'_, T>) + 'static,
    ) -> PropertyResult<HandlerId> {
        let owner = self.as_dependency_object();
        check_access(owner, &property.to_ref())?;
        let slot = owner.dependency_container().slot(owner, property)?;
        Ok(slot.add_handler(Rc::new(handler)))
    }

    /// Removes a handler added with [`add_change_handler`](Self::add_change_handler).
    ///
    /// Returns `Ok(false)` if the handler was not attached to `property`.
    fn remove_change_handler<T: PropertyValue>(
        &self,
        property: &DependencyProperty<T>,
        id: HandlerId,
    ) -> PropertyResult<bool> {
        self.remove_any_change_handler(&property.to_ref(), id)
    }

    /// Removes a handler added with either
    /// [`add_any_change_handler`](Self::add_any_change_handler) or
    /// [`add_change_handler`](Self::add_change_handler).
    fn remove_any_change_handler(&self, property: &PropertyRef, id: HandlerId) -> PropertyResult<bool> {
        let owner = self.as_dependency_object();
        check_access(owner, property)?;
        let container = owner.dependency_container();
        let Some(slot) = container.existing_erased_slot(property) else {
            return Ok(false);
        };
        let removed = slot.remove_handler(id);
        drop(slot);
        container.evict_if_unused(property);
        Ok(removed)
    }

    /// Adds a type-erased handler run after each outermost change of `property`.
    fn add_any_change_handler(
        &self,
        property: &PropertyRef,
        handler: impl Fn(&dyn DependencyObject, &PropertyChangedEvent<'_>) + 'static,
    ) -> PropertyResult<HandlerId> {
        let owner = self.as_dependency_object();
        check_access(owner, property)?;
        let slot = owner.dependency_container().erased_slot(owner, property)?;
        Ok(slot.add_any_handler(Rc::new(handler)))
    }

    /// Returns the current value of `property` without knowing its type.
    fn get_value_erased(&self, property: &PropertyRef) -> PropertyResult<ErasedValue> {
        let owner = self.as_dependency_object();
        check_access(owner, property)?;
        let container = owner.dependency_container();
        if let Some(slot) = container.existing_erased_slot(property) {
            return Ok(slot.value_erased());
        }
        if property.uses_value_factory() {
            return Ok(container.erased_slot(owner, property)?.value_erased());
        }
        Ok(property.default_value_erased(owner))
    }

    /// Explicitly assigns a type-erased value.
    ///
    /// Read-only properties cannot be written this way.
    fn set_value_erased(&self, property: &PropertyRef, value: &ErasedValue) -> PropertyResult<()> {
        if property.is_read_only() {
            return Err(PropertyError::ReadOnly {
                property: property.name(),
            });
        }
        let owner = self.as_dependency_object();
        check_access(owner, property)?;
        let container = owner.dependency_container();
        let slot = container.erased_slot(owner, property)?;
        let result = slot.set_value_erased(owner, value);
        drop(slot);
        container.evict_if_unused(property);
        result
    }
}

impl<O: AsDependencyObject + ?Sized> DependencyObjectExt for O {}

/// The access hook, then the validity check. Runs before any storage access.
fn check_access(owner: &dyn DependencyObject, property: &PropertyRef) -> PropertyResult<()> {
    owner.check_property_access(property)?;
    owner.dependency_container().check_valid(property)
}

fn checked_slot<T: PropertyValue>(
    owner: &dyn DependencyObject,
    property: &DependencyProperty<T>,
) -> PropertyResult<Option<Rc<ValueSlot<T>>>> {
    check_access(owner, &property.to_ref())?;
    Ok(owner.dependency_container().existing_slot(property))
}

fn write<T: PropertyValue>(
    owner: &dyn DependencyObject,
    property: &DependencyProperty<T>,
    key: Option<&PropertyKey<T>>,
    op: impl FnOnce(&dyn DependencyObject, &ValueSlot<T>) -> PropertyResult<()>,
) -> PropertyResult<()> {
    property.check_write(key)?;
    let reference = property.to_ref();
    check_access(owner, &reference)?;
    let container = owner.dependency_container();
    let slot = container.slot(owner, property)?;
    let result = op(owner, &*slot);
    drop(slot);
    container.evict_if_unused(&reference);
    result
}

fn clear<T: PropertyValue>(
    owner: &dyn DependencyObject,
    property: &DependencyProperty<T>,
    key: Option<&PropertyKey<T>>,
) -> PropertyResult<()> {
    property.check_write(key)?;
    let reference = property.to_ref();
    check_access(owner, &reference)?;
    let container = owner.dependency_container();
    // Nothing stored means the value already is the default.
    let Some(slot) = container.existing_slot(property) else {
        return Ok(());
    };
    let result = slot.clear_value(owner);
    drop(slot);
    container.evict_if_unused(&reference);
    result
}

fn set_extension<T: PropertyValue>(
    owner: &dyn DependencyObject,
    property: &DependencyProperty<T>,
    key: Option<&PropertyKey<T>>,
    layer: ExpressionLayer,
    provider: Option<Rc<dyn ValueProvider<T>>>,
) -> PropertyResult<()> {
    if provider.is_none() && owner.dependency_container().existing_slot(property).is_none() {
        property.check_write(key)?;
        return check_access(owner, &property.to_ref());
    }
    write(owner, property, key, |owner, slot| {
        slot.set_extension(owner, layer, provider)
    })
}
