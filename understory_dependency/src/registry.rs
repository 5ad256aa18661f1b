// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Class descriptors and the process-wide type registry.
//!
//! Every class that can host dependency properties is identified by a
//! [`ClassId`]. The [`TypeRegistry`] maps each class to a single shared
//! [`DependencyType`], which links to its parent class and records the
//! properties the class declares. Validity checks for non-attached
//! properties walk this parent chain.

use core::any::{TypeId, type_name};
use core::fmt;
use core::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock};

use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::error::{PropertyError, PropertyResult};
use crate::property::PropertyRef;

/// A class that can declare dependency properties.
///
/// Implementors name their parent class, if any, so the registry can build
/// the inheritance chain used for property validity checks.
///
/// ```rust
/// use understory_dependency::{ClassId, DependencyClass};
///
/// struct Control;
/// impl DependencyClass for Control {}
///
/// struct Button;
/// impl DependencyClass for Button {
///     fn parent_class() -> Option<ClassId> {
///         Some(ClassId::of::<Control>())
///     }
/// }
///
/// assert_eq!(ClassId::of::<Button>().parent(), Some(ClassId::of::<Control>()));
/// ```
pub trait DependencyClass: 'static {
    /// Returns the parent class, or `None` for a root class.
    fn parent_class() -> Option<ClassId> {
        None
    }
}

/// Identity token for a [`DependencyClass`].
///
/// Equality and hashing use the class's [`TypeId`] only.
#[derive(Clone, Copy)]
pub struct ClassId {
    type_id: TypeId,
    name: &'static str,
    parent: fn() -> Option<ClassId>,
}

impl ClassId {
    /// Returns the identity of class `C`.
    #[must_use]
    pub fn of<C: DependencyClass>() -> Self {
        Self {
            type_id: TypeId::of::<C>(),
            name: type_name::<C>(),
            parent: C::parent_class,
        }
    }

    /// Returns the Rust type name of the class.
    #[must_use]
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the parent class, if any.
    #[must_use]
    #[inline]
    pub fn parent(&self) -> Option<Self> {
        (self.parent)()
    }
}

impl PartialEq for ClassId {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ClassId {}

impl Hash for ClassId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClassId").field(&self.name).finish()
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Shared descriptor for one class: its parent link and declared properties.
pub struct DependencyType {
    class: ClassId,
    parent: Option<Arc<DependencyType>>,
    properties: RwLock<Vec<PropertyRef>>,
}

impl DependencyType {
    /// Returns the class this descriptor belongs to.
    #[must_use]
    #[inline]
    pub fn class(&self) -> ClassId {
        self.class
    }

    /// Returns the parent class descriptor.
    #[must_use]
    #[inline]
    pub fn parent(&self) -> Option<&Arc<Self>> {
        self.parent.as_ref()
    }

    /// Returns `true` if this class is `class` or (transitively) derives from it.
    #[must_use]
    pub fn is_subclass_of(&self, class: ClassId) -> bool {
        let mut current = Some(self);
        while let Some(ty) = current {
            if ty.class == class {
                return true;
            }
            current = ty.parent.as_deref();
        }
        false
    }

    /// Returns a snapshot of the properties declared directly by this class.
    #[must_use]
    pub fn declared_properties(&self) -> Vec<PropertyRef> {
        self.properties.read().clone()
    }

    /// Looks up a non-attached property by name on this class and its ancestors.
    #[must_use]
    pub fn find_property(&self, name: &str) -> Option<PropertyRef> {
        let mut current = Some(self);
        while let Some(ty) = current {
            let found = ty
                .properties
                .read()
                .iter()
                .find(|p| !p.is_attached() && p.name() == name)
                .cloned();
            if found.is_some() {
                return found;
            }
            current = ty.parent.as_deref();
        }
        None
    }

    pub(crate) fn register(&self, property: PropertyRef) -> PropertyResult<()> {
        let mut properties = self.properties.write();
        if !property.is_attached()
            && properties
                .iter()
                .any(|p| !p.is_attached() && p.name() == property.name())
        {
            return Err(PropertyError::DuplicateName {
                name: property.name(),
                class: self.class.name(),
            });
        }
        tracing::trace!(class = self.class.name(), property = property.name(), "registered property");
        properties.push(property);
        Ok(())
    }
}

impl fmt::Debug for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyType")
            .field("class", &self.class)
            .field("parent", &self.parent.as_ref().map(|p| p.class))
            .field("properties", &self.properties.read().len())
            .finish()
    }
}

static GLOBAL: LazyLock<TypeRegistry> = LazyLock::new(TypeRegistry::new);

/// Registry of [`DependencyType`] descriptors keyed by [`ClassId`].
///
/// Lookups take a shared lock; the first lookup of a class resolves its
/// parent chain without holding the lock and then inserts under the write
/// lock, so concurrent first use yields a single descriptor per class.
///
/// ```rust
/// use understory_dependency::{ClassId, DependencyClass, TypeRegistry};
///
/// struct Panel;
/// impl DependencyClass for Panel {}
///
/// struct Grid;
/// impl DependencyClass for Grid {
///     fn parent_class() -> Option<ClassId> {
///         Some(ClassId::of::<Panel>())
///     }
/// }
///
/// let registry = TypeRegistry::new();
/// let grid = registry.get_or_create(ClassId::of::<Grid>());
/// assert!(grid.is_subclass_of(ClassId::of::<Panel>()));
/// assert!(registry.is_subclass_of(ClassId::of::<Grid>(), ClassId::of::<Panel>()));
/// assert!(!registry.is_subclass_of(ClassId::of::<Panel>(), ClassId::of::<Grid>()));
/// assert_eq!(registry.len(), 2);
/// ```
#[derive(Default)]
pub struct TypeRegistry {
    types: RwLock<HashMap<ClassId, Arc<DependencyType>>>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide registry used by property declarations and
    /// containers.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Returns the descriptor for `class` if it has been created.
    #[must_use]
    pub fn get(&self, class: ClassId) -> Option<Arc<DependencyType>> {
        self.types.read().get(&class).cloned()
    }

    /// Returns the descriptor for `class`, creating it and its ancestors on
    /// first use.
    pub fn get_or_create(&self, class: ClassId) -> Arc<DependencyType> {
        if let Some(ty) = self.get(class) {
            return ty;
        }
        let parent = class.parent().map(|p| self.get_or_create(p));
        self.types
            .write()
            .entry(class)
            .or_insert_with(|| {
                tracing::trace!(class = class.name(), "created dependency type");
                Arc::new(DependencyType {
                    class,
                    parent,
                    properties: RwLock::new(Vec::new()),
                })
            })
            .clone()
    }

    /// Registers `property` with the descriptor of `class`.
    pub fn register(&self, class: ClassId, property: PropertyRef) -> PropertyResult<()> {
        self.get_or_create(class).register(property)
    }

    /// Returns `true` if `class` is `ancestor` or derives from it.
    #[must_use]
    pub fn is_subclass_of(&self, class: ClassId, ancestor: ClassId) -> bool {
        self.get_or_create(class).is_subclass_of(ancestor)
    }

    /// Returns the number of known classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    /// Returns `true` if no class has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.len())
            .finish()
    }
}
