// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Property descriptors.
//!
//! A [`DependencyProperty<T>`] is the process-wide, immutable description of
//! one named property: its identity, value type and [`PropertyMetadata`].
//! Descriptors are cheap handles and are usually kept in a `LazyLock` static
//! next to the class that declares them. [`PropertyRef`] is the type-erased
//! form used as a map key and by generic tooling.

use core::any::{Any, TypeId, type_name};
use core::fmt;
use core::hash::{Hash, Hasher};
use std::hash::DefaultHasher;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::{PropertyError, PropertyResult};
use crate::metadata::{BindingMode, PropertyMetadata};
use crate::object::DependencyObject;
use crate::registry::{ClassId, DependencyClass, TypeRegistry};
use crate::slot::{ErasedSlot, ValueSlot};
use crate::value::ErasedValue;

/// Bound satisfied by every type that can be stored in a dependency property.
///
/// Values are compared with `PartialEq` to decide whether a write is a
/// change at all, so two distinct but equal values never notify.
pub trait PropertyValue: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {}

impl<T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static> PropertyValue for T {}

/// Storage shape used by every slot of a property.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SlotKind {
    /// Current value only.
    Simple,
    /// Separate base and coerced current value.
    Dual,
}

/// The five components that make two descriptors the same property.
#[derive(Clone, Debug)]
pub(crate) struct PropertyIdentity {
    name: &'static str,
    declaring: ClassId,
    owner: ClassId,
    value_type: TypeId,
    value_type_name: &'static str,
    attached: bool,
    hash: u64,
}

impl PropertyIdentity {
    fn new<T: 'static>(name: &'static str, declaring: ClassId, owner: ClassId, attached: bool) -> Self {
        let value_type = TypeId::of::<T>();
        let mut hasher = DefaultHasher::new();
        declaring.hash(&mut hasher);
        owner.hash(&mut hasher);
        value_type.hash(&mut hasher);
        name.hash(&mut hasher);
        attached.hash(&mut hasher);
        Self {
            name,
            declaring,
            owner,
            value_type,
            value_type_name: type_name::<T>(),
            attached,
            hash: hasher.finish(),
        }
    }
}

impl PartialEq for PropertyIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && self.declaring == other.declaring
            && self.owner == other.owner
            && self.value_type == other.value_type
            && self.name == other.name
            && self.attached == other.attached
    }
}

impl Eq for PropertyIdentity {}

fn validate_name(name: &'static str, attached: bool) -> PropertyResult<()> {
    if name.trim().is_empty() || (attached && !is_dotted_identifier(name)) {
        return Err(PropertyError::InvalidName { name });
    }
    Ok(())
}

/// `ident(.ident)*`, where an identifier starts with an ASCII letter or `_`.
fn is_dotted_identifier(name: &str) -> bool {
    name.split('.').all(|segment| {
        let mut chars = segment.chars();
        chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_alphanumeric() || c == '_')
    })
}

pub(crate) struct PropertyData<T: PropertyValue> {
    identity: PropertyIdentity,
    metadata: PropertyMetadata<T>,
    read_only: bool,
}

/// A typed dependency property descriptor.
///
/// Cloning is cheap and clones compare equal. Equality and hashing follow
/// the property's identity: name, declaring class, owning class, value type
/// and whether it is attached.
///
/// # Example
///
/// ```rust
/// use std::sync::LazyLock;
/// use understory_dependency::{
///     DependencyClass, DependencyObject, DependencyObjectExt, DependencyProperty,
///     PropertyContainer, PropertyMetadataBuilder,
/// };
///
/// struct Slider {
///     container: PropertyContainer,
/// }
///
/// impl DependencyClass for Slider {}
///
/// impl DependencyObject for Slider {
///     fn dependency_container(&self) -> &PropertyContainer {
///         &self.container
///     }
/// }
///
/// static VALUE: LazyLock<DependencyProperty<f64>> = LazyLock::new(|| {
///     DependencyProperty::register::<Slider>(
///         "Value",
///         PropertyMetadataBuilder::new(0.0).coerce(|_, v: f64| v.clamp(0.0, 1.0)).build(),
///     )
///     .expect("valid property")
/// });
///
/// let slider = Slider { container: PropertyContainer::new::<Slider>() };
/// assert_eq!(slider.get_value(&VALUE), 0.0);
///
/// slider.set_value(&VALUE, 3.0).unwrap();
/// assert_eq!(slider.get_value(&VALUE), 1.0);
/// assert_eq!(slider.get_base_value(&VALUE), 3.0);
/// ```
pub struct DependencyProperty<T: PropertyValue> {
    inner: Arc<PropertyData<T>>,
}

impl<T: PropertyValue> DependencyProperty<T> {
    /// Declares a property on class `D`.
    ///
    /// Fails if the name is empty or whitespace, or if `D` already declares
    /// a non-attached property with the same name.
    pub fn register<D: DependencyClass>(
        name: &'static str,
        metadata: PropertyMetadata<T>,
    ) -> PropertyResult<Self> {
        Self::declare(name, ClassId::of::<D>(), false, false, metadata)
    }

    /// Declares a read-only property on class `D`.
    ///
    /// The returned [`PropertyKey`] is the only way to write the property;
    /// [`PropertyKey::property`] is the descriptor to publish.
    pub fn register_read_only<D: DependencyClass>(
        name: &'static str,
        metadata: PropertyMetadata<T>,
    ) -> PropertyResult<PropertyKey<T>> {
        Self::declare(name, ClassId::of::<D>(), false, true, metadata)
            .map(|property| PropertyKey { property })
    }

    /// Declares an attached property, usable on any dependency object.
    ///
    /// The name must be a dotted identifier path such as `Grid.Row`.
    pub fn register_attached<D: DependencyClass>(
        name: &'static str,
        metadata: PropertyMetadata<T>,
    ) -> PropertyResult<Self> {
        Self::declare(name, ClassId::of::<D>(), true, false, metadata)
    }

    /// Declares a read-only attached property.
    pub fn register_attached_read_only<D: DependencyClass>(
        name: &'static str,
        metadata: PropertyMetadata<T>,
    ) -> PropertyResult<PropertyKey<T>> {
        Self::declare(name, ClassId::of::<D>(), true, true, metadata)
            .map(|property| PropertyKey { property })
    }

    fn declare(
        name: &'static str,
        class: ClassId,
        attached: bool,
        read_only: bool,
        metadata: PropertyMetadata<T>,
    ) -> PropertyResult<Self> {
        validate_name(name, attached)?;
        let property = Self {
            inner: Arc::new(PropertyData {
                identity: PropertyIdentity::new::<T>(name, class, class, attached),
                metadata,
                read_only,
            }),
        };
        TypeRegistry::global().register(class, property.to_ref())?;
        Ok(property)
    }

    /// Returns the property name.
    #[must_use]
    #[inline]
    pub fn name(&self) -> &'static str {
        self.inner.identity.name
    }

    /// Returns the class that declared the property.
    #[must_use]
    #[inline]
    pub fn declaring_class(&self) -> ClassId {
        self.inner.identity.declaring
    }

    /// Returns the class whose instances (and subclasses) accept the property.
    #[must_use]
    #[inline]
    pub fn owner_class(&self) -> ClassId {
        self.inner.identity.owner
    }

    /// Returns whether the property is attached.
    #[must_use]
    #[inline]
    pub fn is_attached(&self) -> bool {
        self.inner.identity.attached
    }

    /// Returns whether the property needs a [`PropertyKey`] to be written.
    #[must_use]
    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.inner.read_only
    }

    /// Returns the default binding direction.
    #[must_use]
    #[inline]
    pub fn binding_mode(&self) -> BindingMode {
        self.inner.metadata.binding_mode()
    }

    /// Returns the property metadata.
    #[must_use]
    #[inline]
    pub fn metadata(&self) -> &PropertyMetadata<T> {
        &self.inner.metadata
    }

    /// Returns whether defaults are produced per instance.
    #[must_use]
    #[inline]
    pub fn uses_value_factory(&self) -> bool {
        self.inner.metadata.uses_value_factory()
    }

    /// Returns the default value for `owner`, running the factory if the
    /// property has one.
    #[must_use]
    pub fn default_value(&self, owner: &dyn DependencyObject) -> T {
        self.inner.metadata.default_for(owner)
    }

    /// Returns `true` if `key` grants write access to this property.
    #[must_use]
    pub fn has_access(&self, key: &PropertyKey<T>) -> bool {
        Arc::ptr_eq(&self.inner, &key.property.inner)
    }

    /// Returns the type-erased form of this property.
    #[must_use]
    pub fn to_ref(&self) -> PropertyRef {
        PropertyRef {
            inner: self.inner.clone(),
        }
    }

    pub(crate) fn slot_kind(&self) -> SlotKind {
        if self.inner.metadata.has_coerce_callback() {
            SlotKind::Dual
        } else {
            SlotKind::Simple
        }
    }

    /// Fails unless the property is writable, either because it is not
    /// read-only or because its key is presented.
    pub(crate) fn check_write(&self, key: Option<&PropertyKey<T>>) -> PropertyResult<()> {
        if !self.is_read_only() || key.is_some_and(|key| self.has_access(key)) {
            Ok(())
        } else {
            Err(PropertyError::ReadOnly {
                property: self.name(),
            })
        }
    }
}

impl<T: PropertyValue> Clone for DependencyProperty<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: PropertyValue> PartialEq for DependencyProperty<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.identity == other.inner.identity
    }
}

impl<T: PropertyValue> Eq for DependencyProperty<T> {}

impl<T: PropertyValue> Hash for DependencyProperty<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.inner.identity.hash);
    }
}

impl<T: PropertyValue> fmt::Debug for DependencyProperty<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let identity = &self.inner.identity;
        f.debug_struct("DependencyProperty")
            .field("name", &identity.name)
            .field("owner", &identity.owner)
            .field("value_type", &identity.value_type_name)
            .field("attached", &identity.attached)
            .field("read_only", &self.inner.read_only)
            .finish_non_exhaustive()
    }
}

impl<T: PropertyValue> fmt::Display for DependencyProperty<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_ref(), f)
    }
}

/// Write capability for a read-only [`DependencyProperty`].
///
/// A key is handed out once, by [`DependencyProperty::register_read_only`],
/// and cannot be cloned. Code holding the key can write the property through
/// the `*_with_key` methods of [`DependencyObjectExt`](crate::DependencyObjectExt).
pub struct PropertyKey<T: PropertyValue> {
    property: DependencyProperty<T>,
}

impl<T: PropertyValue> PropertyKey<T> {
    /// Returns the read-only property this key unlocks.
    #[must_use]
    #[inline]
    pub fn property(&self) -> &DependencyProperty<T> {
        &self.property
    }
}

impl<T: PropertyValue> fmt::Debug for PropertyKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PropertyKey").field(&self.property.name()).finish()
    }
}

/// Operations every descriptor supports without knowing its value type.
pub(crate) trait ErasedProperty: Any + Send + Sync {
    fn identity(&self) -> &PropertyIdentity;
    fn is_read_only(&self) -> bool;
    fn uses_value_factory(&self) -> bool;
    fn default_erased(&self, owner: &dyn DependencyObject) -> ErasedValue;
    fn create_slot(self: Arc<Self>, owner: &dyn DependencyObject) -> Rc<dyn ErasedSlot>;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: PropertyValue> ErasedProperty for PropertyData<T> {
    fn identity(&self) -> &PropertyIdentity {
        &self.identity
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn uses_value_factory(&self) -> bool {
        self.metadata.uses_value_factory()
    }

    fn default_erased(&self, owner: &dyn DependencyObject) -> ErasedValue {
        ErasedValue::new(self.metadata.default_for(owner))
    }

    fn create_slot(self: Arc<Self>, owner: &dyn DependencyObject) -> Rc<dyn ErasedSlot> {
        Rc::new(ValueSlot::new(DependencyProperty { inner: self }, owner))
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A type-erased dependency property.
///
/// Compares and hashes exactly like the typed descriptor it came from.
///
/// ```rust
/// use understory_dependency::{DependencyClass, DependencyProperty, PropertyMetadata};
///
/// struct Label;
/// impl DependencyClass for Label {}
///
/// let text = DependencyProperty::register::<Label>("Text", PropertyMetadata::new(String::new()))
///     .unwrap();
/// let erased = text.to_ref();
/// assert_eq!(erased.name(), "Text");
/// assert!(erased.is::<String>());
/// assert_eq!(erased.downcast::<String>(), Some(text));
/// ```
#[derive(Clone)]
pub struct PropertyRef {
    inner: Arc<dyn ErasedProperty>,
}

impl PropertyRef {
    /// Returns the property name.
    #[must_use]
    #[inline]
    pub fn name(&self) -> &'static str {
        self.inner.identity().name
    }

    /// Returns the class that declared the property.
    #[must_use]
    #[inline]
    pub fn declaring_class(&self) -> ClassId {
        self.inner.identity().declaring
    }

    /// Returns the class whose instances accept the property.
    #[must_use]
    #[inline]
    pub fn owner_class(&self) -> ClassId {
        self.inner.identity().owner
    }

    /// Returns whether the property is attached.
    #[must_use]
    #[inline]
    pub fn is_attached(&self) -> bool {
        self.inner.identity().attached
    }

    /// Returns whether the property is read-only.
    #[must_use]
    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.inner.is_read_only()
    }

    /// Returns whether defaults are produced per instance.
    #[must_use]
    #[inline]
    pub fn uses_value_factory(&self) -> bool {
        self.inner.uses_value_factory()
    }

    /// Returns the [`TypeId`] of the value type.
    #[must_use]
    #[inline]
    pub fn value_type_id(&self) -> TypeId {
        self.inner.identity().value_type
    }

    /// Returns the Rust type name of the value type.
    #[must_use]
    #[inline]
    pub fn value_type_name(&self) -> &'static str {
        self.inner.identity().value_type_name
    }

    /// Returns `true` if the value type is `T`.
    #[must_use]
    pub fn is<T: 'static>(&self) -> bool {
        self.value_type_id() == TypeId::of::<T>()
    }

    /// Returns the default value for `owner` as an [`ErasedValue`].
    #[must_use]
    pub fn default_value_erased(&self, owner: &dyn DependencyObject) -> ErasedValue {
        self.inner.default_erased(owner)
    }

    /// Recovers the typed descriptor.
    #[must_use]
    pub fn downcast<T: PropertyValue>(&self) -> Option<DependencyProperty<T>> {
        self.inner
            .clone()
            .into_any()
            .downcast::<PropertyData<T>>()
            .ok()
            .map(|inner| DependencyProperty { inner })
    }

    pub(crate) fn create_slot(&self, owner: &dyn DependencyObject) -> Rc<dyn ErasedSlot> {
        self.inner.clone().create_slot(owner)
    }
}

impl PartialEq for PropertyRef {
    fn eq(&self, other: &Self) -> bool {
        self.inner.identity() == other.inner.identity()
    }
}

impl Eq for PropertyRef {}

impl Hash for PropertyRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.inner.identity().hash);
    }
}

impl<T: PropertyValue> PartialEq<DependencyProperty<T>> for PropertyRef {
    fn eq(&self, other: &DependencyProperty<T>) -> bool {
        *self.inner.identity() == other.inner.identity
    }
}

impl fmt::Debug for PropertyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let identity = self.inner.identity();
        f.debug_struct("PropertyRef")
            .field("name", &identity.name)
            .field("owner", &identity.owner)
            .field("value_type", &identity.value_type_name)
            .field("attached", &identity.attached)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for PropertyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let identity = self.inner.identity();
        write!(
            f,
            "Name={} OwnerType={} PropertyType={}",
            identity.name, identity.owner, identity.value_type_name
        )
    }
}
