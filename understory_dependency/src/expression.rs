// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Value providers and bound expressions.
//!
//! A [`ValueProvider`] supplies a property's value instead of an explicit
//! assignment. When attached to an object it creates a [`BoundExpression`]
//! for that (object, property) pair. The expression pushes values through an
//! [`ExpressionHandle`]; those pushes drive the current value without
//! replacing the base value an explicit `set_value` recorded.
//!
//! Each slot keeps at most two expressions: a primary and an override. The
//! override wins while present; removing it makes the primary's last pushed
//! value visible again without re-initializing the primary.

use core::any::Any;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::rc::Rc;

use crate::error::{PropertyError, PropertyResult};
use crate::event::ExpressionLayer;
use crate::object::DependencyObject;
use crate::property::{DependencyProperty, PropertyValue};

/// Creates bound expressions for a property.
///
/// Providers are shared: the same provider may be attached to many objects,
/// and each attachment gets its own expression.
pub trait ValueProvider<T: PropertyValue>: Any {
    /// Creates the expression that will drive `property` on one object.
    fn create_expression(&self, property: &DependencyProperty<T>) -> Box<dyn BoundExpression<T>>;
}

/// A live binding of a [`ValueProvider`] to one object's property.
pub trait BoundExpression<T: PropertyValue> {
    /// Starts the expression. It may push a value right away through
    /// `cx.change_value`, and may keep `cx.handle()` to push more later.
    ///
    /// Returning an error aborts the attachment; the expression is then
    /// released and the property falls back to its previous source.
    fn on_initialize(&mut self, cx: &ExpressionContext<'_, T>) -> PropertyResult<()>;

    /// Stops the expression. Called exactly once, when the expression is
    /// replaced, detached, rolled back or dropped with its object.
    fn on_release(&mut self) {}
}

/// Identity of one attachment of a provider to a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ExpressionId(u64);

impl ExpressionId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A bound expression's channel back to the property it drives.
///
/// A handle stays valid until its expression is released; afterwards
/// [`change_value`](Self::change_value) reports
/// [`PropertyError::ExpressionDetached`].
pub struct ExpressionHandle<T: PropertyValue> {
    property: DependencyProperty<T>,
    id: ExpressionId,
    layer: ExpressionLayer,
}

impl<T: PropertyValue> ExpressionHandle<T> {
    pub(crate) fn new(property: DependencyProperty<T>, id: ExpressionId, layer: ExpressionLayer) -> Self {
        Self {
            property,
            id,
            layer,
        }
    }

    /// Returns the property the expression drives.
    #[must_use]
    #[inline]
    pub fn property(&self) -> &DependencyProperty<T> {
        &self.property
    }

    /// Returns the layer the expression occupies.
    #[must_use]
    #[inline]
    pub fn layer(&self) -> ExpressionLayer {
        self.layer
    }

    /// Returns `true` while the expression is still bound on `owner`.
    #[must_use]
    pub fn is_bound(&self, owner: &dyn DependencyObject) -> bool {
        owner
            .dependency_container()
            .existing_slot(&self.property)
            .is_some_and(|slot| slot.is_expression_bound(self.id))
    }

    /// Pushes a new value from the expression.
    ///
    /// The value becomes the expression's last value. If the expression is
    /// the active layer it also becomes the property's current value,
    /// through the same validate, coerce and notify path as an explicit set,
    /// but without touching the base value. Errors are returned, never raised,
    /// so a provider can decide how to react to a rejected push.
    pub fn change_value(&self, owner: &dyn DependencyObject, value: T) -> PropertyResult<()> {
        let Some(slot) = owner.dependency_container().existing_slot(&self.property) else {
            return Err(PropertyError::ExpressionDetached {
                property: self.property.name(),
            });
        };
        slot.push_expression_value(owner, self.id, value)
    }
}

impl<T: PropertyValue> Clone for ExpressionHandle<T> {
    fn clone(&self) -> Self {
        Self {
            property: self.property.clone(),
            id: self.id,
            layer: self.layer,
        }
    }
}

impl<T: PropertyValue> fmt::Debug for ExpressionHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionHandle")
            .field("property", &self.property.name())
            .field("id", &self.id)
            .field("layer", &self.layer)
            .finish()
    }
}

/// Passed to [`BoundExpression::on_initialize`].
pub struct ExpressionContext<'a, T: PropertyValue> {
    owner: &'a dyn DependencyObject,
    handle: ExpressionHandle<T>,
}

impl<'a, T: PropertyValue> ExpressionContext<'a, T> {
    pub(crate) fn new(owner: &'a dyn DependencyObject, handle: ExpressionHandle<T>) -> Self {
        Self { owner, handle }
    }

    /// Returns the object the expression is bound to.
    #[must_use]
    #[inline]
    pub fn owner(&self) -> &'a dyn DependencyObject {
        self.owner
    }

    /// Returns the property the expression drives.
    #[must_use]
    #[inline]
    pub fn property(&self) -> &DependencyProperty<T> {
        self.handle.property()
    }

    /// Returns a handle for pushing values after initialization.
    #[must_use]
    pub fn handle(&self) -> ExpressionHandle<T> {
        self.handle.clone()
    }

    /// Pushes a value. See [`ExpressionHandle::change_value`].
    pub fn change_value(&self, value: T) -> PropertyResult<()> {
        self.handle.change_value(self.owner, value)
    }
}

impl<T: PropertyValue> fmt::Debug for ExpressionContext<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionContext")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// One attached provider and its expression.
pub(crate) struct BoundEntry<T: PropertyValue> {
    pub(crate) id: ExpressionId,
    pub(crate) provider: Rc<dyn ValueProvider<T>>,
    /// `None` while the expression is being initialized.
    pub(crate) expression: Option<Box<dyn BoundExpression<T>>>,
    pub(crate) last_value: T,
}

impl<T: PropertyValue> BoundEntry<T> {
    pub(crate) fn new(id: ExpressionId, provider: Rc<dyn ValueProvider<T>>, initial: T) -> Self {
        Self {
            id,
            provider,
            expression: None,
            last_value: initial,
        }
    }
}

impl<T: PropertyValue> Drop for BoundEntry<T> {
    fn drop(&mut self) {
        if let Some(mut expression) = self.expression.take() {
            tracing::trace!(id = self.id.0, "releasing expression");
            expression.on_release();
        }
    }
}

pub(crate) enum Primary<T: PropertyValue> {
    /// Anchors an override when no primary provider is attached.
    Placeholder,
    Bound(BoundEntry<T>),
}

impl<T: PropertyValue> Primary<T> {
    fn entry(&self) -> Option<&BoundEntry<T>> {
        match self {
            Self::Placeholder => None,
            Self::Bound(entry) => Some(entry),
        }
    }

    fn entry_mut(&mut self) -> Option<&mut BoundEntry<T>> {
        match self {
            Self::Placeholder => None,
            Self::Bound(entry) => Some(entry),
        }
    }

    pub(crate) fn into_entry(self) -> Option<BoundEntry<T>> {
        match self {
            Self::Placeholder => None,
            Self::Bound(entry) => Some(entry),
        }
    }
}

/// The primary and override expressions of one slot.
pub(crate) struct ExpressionChain<T: PropertyValue> {
    id: ExpressionId,
    pub(crate) primary: Primary<T>,
    pub(crate) overriding: Option<BoundEntry<T>>,
}

impl<T: PropertyValue> ExpressionChain<T> {
    pub(crate) fn new() -> Self {
        Self {
            id: ExpressionId::next(),
            primary: Primary::Placeholder,
            overriding: None,
        }
    }

    pub(crate) fn id(&self) -> ExpressionId {
        self.id
    }

    /// A chain holding only a placeholder carries no information.
    pub(crate) fn is_vacant(&self) -> bool {
        matches!(self.primary, Primary::Placeholder) && self.overriding.is_none()
    }

    pub(crate) fn entry(&self, layer: ExpressionLayer) -> Option<&BoundEntry<T>> {
        match layer {
            ExpressionLayer::Primary => self.primary.entry(),
            ExpressionLayer::Override => self.overriding.as_ref(),
        }
    }

    pub(crate) fn take(&mut self, layer: ExpressionLayer) -> Option<BoundEntry<T>> {
        match layer {
            ExpressionLayer::Primary => {
                core::mem::replace(&mut self.primary, Primary::Placeholder).into_entry()
            }
            ExpressionLayer::Override => self.overriding.take(),
        }
    }

    pub(crate) fn insert(&mut self, layer: ExpressionLayer, entry: BoundEntry<T>) -> Option<BoundEntry<T>> {
        match layer {
            ExpressionLayer::Primary => {
                core::mem::replace(&mut self.primary, Primary::Bound(entry)).into_entry()
            }
            ExpressionLayer::Override => self.overriding.replace(entry),
        }
    }

    pub(crate) fn find_mut(&mut self, id: ExpressionId) -> Option<&mut BoundEntry<T>> {
        if let Some(entry) = self.overriding.as_mut().filter(|e| e.id == id) {
            return Some(entry);
        }
        self.primary.entry_mut().filter(|e| e.id == id)
    }

    pub(crate) fn remove(&mut self, id: ExpressionId) -> Option<BoundEntry<T>> {
        if self.overriding.as_ref().is_some_and(|e| e.id == id) {
            return self.overriding.take();
        }
        if self.primary.entry().is_some_and(|e| e.id == id) {
            return self.take(ExpressionLayer::Primary);
        }
        None
    }

    pub(crate) fn contains(&self, id: ExpressionId) -> bool {
        self.overriding.as_ref().is_some_and(|e| e.id == id)
            || self.primary.entry().is_some_and(|e| e.id == id)
    }

    /// Consumes the chain, yielding the override first.
    pub(crate) fn into_layers(self) -> [(ExpressionLayer, Option<BoundEntry<T>>); 2] {
        [
            (ExpressionLayer::Override, self.overriding),
            (ExpressionLayer::Primary, self.primary.into_entry()),
        ]
    }

    /// The expression whose value is visible: the override if present,
    /// otherwise the bound primary.
    pub(crate) fn active(&self) -> Option<&BoundEntry<T>> {
        self.overriding.as_ref().or_else(|| self.primary.entry())
    }
}
