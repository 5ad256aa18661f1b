// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Property metadata definitions.
//!
//! This module provides [`PropertyMetadata`] for a property's default value
//! policy and callbacks, and [`PropertyMetadataBuilder`] for ergonomic
//! construction. Whether a coerce callback is present decides, once and for
//! all, whether instances store a separate base value for the property.

use core::fmt;

use crate::event::{PropertyChangedArgs, PropertyChangingArgs};
use crate::object::DependencyObject;
use crate::property::PropertyValue;

/// Callback deciding whether a proposed value is acceptable.
pub type ValidateValueCallback<T> = Box<dyn Fn(&dyn DependencyObject, &T) -> bool + Send + Sync>;

/// Callback invoked just before a property's current value changes.
pub type PropertyChangingCallback<T> =
    Box<dyn Fn(&dyn DependencyObject, &PropertyChangingArgs<'_, T>) + Send + Sync>;

/// Callback invoked just after a property's current value changed.
pub type PropertyChangedCallback<T> =
    Box<dyn Fn(&dyn DependencyObject, &PropertyChangedArgs<'_, T>) + Send + Sync>;

/// Callback mapping a base value to the value actually exposed.
pub type CoerceValueCallback<T> = Box<dyn Fn(&dyn DependencyObject, T) -> T + Send + Sync>;

/// Callback producing a per-instance default value.
pub type CreateValueCallback<T> = Box<dyn Fn(&dyn DependencyObject) -> T + Send + Sync>;

/// How a property obtains its default value.
pub enum DefaultValue<T> {
    /// One value shared by every instance.
    Constant(T),
    /// A factory run once per instance, the first time the value is needed.
    Factory(CreateValueCallback<T>),
}

impl<T: fmt::Debug> fmt::Debug for DefaultValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Self::Factory(_) => f.write_str("Factory"),
        }
    }
}

/// The direction a binding takes when none is requested explicitly.
///
/// Discriminants are stable so they can be exchanged with tooling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BindingMode {
    /// Changes flow from source to target and back.
    TwoWay = 0,
    /// Changes flow from source to target only.
    OneWay = 1,
    /// Let the binding decide.
    #[default]
    Default = 4,
}

/// Metadata for a dependency property.
///
/// # Example
///
/// ```rust
/// use understory_dependency::{BindingMode, PropertyMetadataBuilder};
///
/// let metadata = PropertyMetadataBuilder::new(1.0_f32)
///     .binding_mode(BindingMode::TwoWay)
///     .validate(|_, v| *v >= 0.0)
///     .coerce(|_, v: f32| v.min(100.0))
///     .build();
///
/// assert!(metadata.has_coerce_callback());
/// assert!(!metadata.uses_value_factory());
/// assert_eq!(metadata.binding_mode(), BindingMode::TwoWay);
/// ```
pub struct PropertyMetadata<T: PropertyValue> {
    default: DefaultValue<T>,
    binding_mode: BindingMode,
    validate: Option<ValidateValueCallback<T>>,
    changing: Option<PropertyChangingCallback<T>>,
    changed: Option<PropertyChangedCallback<T>>,
    coerce: Option<CoerceValueCallback<T>>,
}

impl<T: PropertyValue> PropertyMetadata<T> {
    /// Creates metadata with a constant default and no callbacks.
    #[must_use]
    pub fn new(default_value: T) -> Self {
        PropertyMetadataBuilder::new(default_value).build()
    }

    /// Returns the default value policy.
    #[must_use]
    #[inline]
    pub fn default_value(&self) -> &DefaultValue<T> {
        &self.default
    }

    /// Returns the default binding direction.
    #[must_use]
    #[inline]
    pub fn binding_mode(&self) -> BindingMode {
        self.binding_mode
    }

    /// Returns whether defaults are produced per instance.
    #[must_use]
    #[inline]
    pub fn uses_value_factory(&self) -> bool {
        matches!(self.default, DefaultValue::Factory(_))
    }

    /// Returns whether a coerce callback is set.
    #[must_use]
    #[inline]
    pub fn has_coerce_callback(&self) -> bool {
        self.coerce.is_some()
    }

    pub(crate) fn default_for(&self, owner: &dyn DependencyObject) -> T {
        match &self.default {
            DefaultValue::Constant(value) => value.clone(),
            DefaultValue::Factory(factory) => factory(owner),
        }
    }

    pub(crate) fn validate(&self, owner: &dyn DependencyObject, value: &T) -> bool {
        self.validate.as_ref().is_none_or(|validate| validate(owner, value))
    }

    pub(crate) fn coerce(&self, owner: &dyn DependencyObject, value: T) -> T {
        match &self.coerce {
            Some(coerce) => coerce(owner, value),
            None => value,
        }
    }

    pub(crate) fn on_changing(&self, owner: &dyn DependencyObject, args: &PropertyChangingArgs<'_, T>) {
        if let Some(callback) = &self.changing {
            callback(owner, args);
        }
    }

    pub(crate) fn on_changed(&self, owner: &dyn DependencyObject, args: &PropertyChangedArgs<'_, T>) {
        if let Some(callback) = &self.changed {
            callback(owner, args);
        }
    }
}

// Manual Debug impl since callbacks aren't Debug
impl<T: PropertyValue> fmt::Debug for PropertyMetadata<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyMetadata")
            .field("default", &self.default)
            .field("binding_mode", &self.binding_mode)
            .field("has_validate_callback", &self.validate.is_some())
            .field("has_changing_callback", &self.changing.is_some())
            .field("has_changed_callback", &self.changed.is_some())
            .field("has_coerce_callback", &self.coerce.is_some())
            .finish()
    }
}

/// Builder for [`PropertyMetadata`].
///
/// # Example
///
/// ```rust
/// use understory_dependency::PropertyMetadataBuilder;
///
/// let metadata = PropertyMetadataBuilder::with_factory(|_| vec![1_u8, 2, 3])
///     .on_changed(|_, args| println!("{:?} -> {:?}", args.old_value, args.new_value))
///     .build();
///
/// assert!(metadata.uses_value_factory());
/// ```
pub struct PropertyMetadataBuilder<T: PropertyValue> {
    metadata: PropertyMetadata<T>,
}

impl<T: PropertyValue> PropertyMetadataBuilder<T> {
    /// Starts a builder with a constant default value.
    #[must_use]
    pub fn new(default_value: T) -> Self {
        Self::from_default(DefaultValue::Constant(default_value))
    }

    /// Starts a builder whose default is produced per instance by `factory`.
    #[must_use]
    pub fn with_factory(
        factory: impl Fn(&dyn DependencyObject) -> T + Send + Sync + 'static,
    ) -> Self {
        Self::from_default(DefaultValue::Factory(Box::new(factory)))
    }

    fn from_default(default: DefaultValue<T>) -> Self {
        Self {
            metadata: PropertyMetadata {
                default,
                binding_mode: BindingMode::Default,
                validate: None,
                changing: None,
                changed: None,
                coerce: None,
            },
        }
    }

    /// Sets the default binding direction.
    #[must_use]
    pub fn binding_mode(mut self, mode: BindingMode) -> Self {
        self.metadata.binding_mode = mode;
        self
    }

    /// Sets the validation callback. Values for which it returns `false`
    /// are rejected with [`PropertyError::InvalidValue`](crate::PropertyError::InvalidValue).
    #[must_use]
    pub fn validate(
        mut self,
        callback: impl Fn(&dyn DependencyObject, &T) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.metadata.validate = Some(Box::new(callback));
        self
    }

    /// Sets the callback run before the current value changes.
    #[must_use]
    pub fn on_changing(
        mut self,
        callback: impl Fn(&dyn DependencyObject, &PropertyChangingArgs<'_, T>) + Send + Sync + 'static,
    ) -> Self {
        self.metadata.changing = Some(Box::new(callback));
        self
    }

    /// Sets the callback run after the current value changed.
    #[must_use]
    pub fn on_changed(
        mut self,
        callback: impl Fn(&dyn DependencyObject, &PropertyChangedArgs<'_, T>) + Send + Sync + 'static,
    ) -> Self {
        self.metadata.changed = Some(Box::new(callback));
        self
    }

    /// Sets the coerce callback.
    ///
    /// Properties with a coerce callback keep the last explicitly assigned
    /// value as a base value and expose the coerced result.
    #[must_use]
    pub fn coerce(
        mut self,
        callback: impl Fn(&dyn DependencyObject, T) -> T + Send + Sync + 'static,
    ) -> Self {
        self.metadata.coerce = Some(Box::new(callback));
        self
    }

    /// Builds the metadata.
    #[must_use]
    pub fn build(self) -> PropertyMetadata<T> {
        self.metadata
    }
}

impl<T: PropertyValue> fmt::Debug for PropertyMetadataBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyMetadataBuilder")
            .field("metadata", &self.metadata)
            .finish()
    }
}
