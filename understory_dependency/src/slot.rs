// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-instance value slots.
//!
//! A [`ValueSlot`] holds everything one object knows about one property:
//! the current value, the base value (coerced properties only), the
//! per-property handlers and the expression chain. All mutation funnels
//! through [`ValueSlot::apply`], guarded by a reentrancy counter so that
//! only the outermost change of a cascade reaches external handlers.
//!
//! No `RefCell` borrow is held while user code runs, so callbacks may read
//! and write any property of the object, including this one.

use core::any::{Any, type_name};
use core::cell::{Cell, RefCell};
use std::rc::Rc;

use smallvec::SmallVec;

use crate::error::{PropertyError, PropertyResult};
use crate::event::{
    ExpressionLayer, ExtensionChangedEvent, HandlerId, PropertyChangedArgs, PropertyChangedEvent,
    PropertyChangingArgs,
};
use crate::expression::{
    BoundEntry, ExpressionChain, ExpressionContext, ExpressionHandle, ExpressionId, ValueProvider,
};
use crate::object::DependencyObject;
use crate::property::{DependencyProperty, PropertyRef, PropertyValue, SlotKind};
use crate::value::ErasedValue;

pub(crate) type ChangeHandler<T> = Rc<dyn Fn(&dyn DependencyObject, &PropertyChangedArgs<'_, T>)>;

pub(crate) type AnyChangeHandler = Rc<dyn Fn(&dyn DependencyObject, &PropertyChangedEvent<'_>)>;

enum SlotValues<T> {
    Simple { value: T },
    Dual { base: T, value: T },
}

impl<T> SlotValues<T> {
    fn current(&self) -> &T {
        match self {
            Self::Simple { value } | Self::Dual { value, .. } => value,
        }
    }

    /// For simple storage the base value is the current value.
    fn base(&self) -> &T {
        match self {
            Self::Simple { value } | Self::Dual { base: value, .. } => value,
        }
    }

    fn set_current(&mut self, new_value: T) {
        match self {
            Self::Simple { value } | Self::Dual { value, .. } => *value = new_value,
        }
    }

    fn set_base(&mut self, new_value: T) {
        match self {
            Self::Simple { value } | Self::Dual { base: value, .. } => *value = new_value,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Origin {
    /// `set_value` and friends: records the base value, detaches expressions.
    Explicit,
    /// Pushed by a bound expression or restored from one.
    Expression,
}

/// Increments the reentrancy counter and restores the previous count on drop.
struct ChangeGuard<'a> {
    count: &'a Cell<u16>,
    previous: u16,
}

impl<'a> ChangeGuard<'a> {
    fn enter(count: &'a Cell<u16>) -> Self {
        let previous = count.get();
        count.set(previous.saturating_add(1));
        Self { count, previous }
    }

    fn depth(&self) -> u16 {
        self.count.get()
    }
}

impl Drop for ChangeGuard<'_> {
    fn drop(&mut self) {
        self.count.set(self.previous);
    }
}

pub(crate) struct ValueSlot<T: PropertyValue> {
    property: DependencyProperty<T>,
    reference: PropertyRef,
    /// Default for this instance; a factory default is materialized once.
    default: T,
    values: RefCell<SlotValues<T>>,
    change_count: Cell<u16>,
    handlers: RefCell<SmallVec<[(HandlerId, ChangeHandler<T>); 2]>>,
    chain: RefCell<Option<ExpressionChain<T>>>,
}

impl<T: PropertyValue> ValueSlot<T> {
    pub(crate) fn new(property: DependencyProperty<T>, owner: &dyn DependencyObject) -> Self {
        let default = property.default_value(owner);
        let values = match property.slot_kind() {
            SlotKind::Simple => SlotValues::Simple {
                value: default.clone(),
            },
            SlotKind::Dual => SlotValues::Dual {
                base: default.clone(),
                value: default.clone(),
            },
        };
        Self {
            reference: property.to_ref(),
            property,
            default,
            values: RefCell::new(values),
            change_count: Cell::new(0),
            handlers: RefCell::new(SmallVec::new()),
            chain: RefCell::new(None),
        }
    }

    pub(crate) fn value(&self) -> T {
        self.values.borrow().current().clone()
    }

    pub(crate) fn base_value(&self) -> T {
        self.values.borrow().base().clone()
    }

    /// Explicit assignment.
    pub(crate) fn set_value(&self, owner: &dyn DependencyObject, value: T) -> PropertyResult<()> {
        let bound = self.chain.borrow().as_ref().map(ExpressionChain::id);
        let unchanged = *self.values.borrow().base() == value;
        if !unchanged {
            self.apply(owner, value, Origin::Explicit)?;
        }
        // An explicit value always wins over a live expression. When the base
        // did not move, the visible value may still be the expression's.
        if let Some(id) = bound
            && self.detach(owner, id)
            && unchanged
        {
            self.coerce_value(owner);
        }
        Ok(())
    }

    /// Resets the base value to this instance's default.
    pub(crate) fn clear_value(&self, owner: &dyn DependencyObject) -> PropertyResult<()> {
        self.set_value(owner, self.default.clone())
    }

    /// Recomputes the coerced value. Simple slots have nothing to recompute.
    ///
    /// The coercion source is the active expression's last value while one
    /// is bound, otherwise the base value.
    pub(crate) fn coerce_value(&self, owner: &dyn DependencyObject) {
        if self.property.slot_kind() == SlotKind::Simple {
            return;
        }
        let source = self
            .chain
            .borrow()
            .as_ref()
            .and_then(ExpressionChain::active)
            .map(|entry| entry.last_value.clone());
        let source = source.unwrap_or_else(|| self.base_value());
        let guard = ChangeGuard::enter(&self.change_count);
        let coerced = self.property.metadata().coerce(owner, source);
        self.commit(owner, guard, coerced);
    }

    fn apply(&self, owner: &dyn DependencyObject, value: T, origin: Origin) -> PropertyResult<()> {
        let guard = ChangeGuard::enter(&self.change_count);
        self.validate(owner, &value)?;
        self.store(owner, guard, value, origin);
        Ok(())
    }

    fn validate(&self, owner: &dyn DependencyObject, value: &T) -> PropertyResult<()> {
        if self.property.metadata().validate(owner, value) {
            return Ok(());
        }
        tracing::debug!(property = self.property.name(), ?value, "rejected invalid value");
        Err(PropertyError::InvalidValue {
            property: self.property.name(),
            value: format!("{value:?}"),
        })
    }

    fn store(&self, owner: &dyn DependencyObject, guard: ChangeGuard<'_>, value: T, origin: Origin) {
        let value = match self.property.slot_kind() {
            SlotKind::Simple => value,
            SlotKind::Dual => {
                if origin == Origin::Explicit {
                    self.values.borrow_mut().set_base(value.clone());
                }
                self.property.metadata().coerce(owner, value)
            }
        };
        self.commit(owner, guard, value);
    }

    fn commit(&self, owner: &dyn DependencyObject, guard: ChangeGuard<'_>, value: T) {
        let old_value = self.value();
        if old_value == value {
            return;
        }
        let is_base_change = guard.depth() == 1;
        let metadata = self.property.metadata();
        metadata.on_changing(
            owner,
            &PropertyChangingArgs {
                property: &self.property,
                old_value: &old_value,
            },
        );
        self.values.borrow_mut().set_current(value.clone());
        let args = PropertyChangedArgs {
            property: &self.property,
            old_value: &old_value,
            new_value: &value,
            is_base_change,
        };
        metadata.on_changed(owner, &args);
        if is_base_change {
            // Handlers run outside the guard; a write from a handler starts
            // a new outermost change.
            drop(guard);
            self.notify(owner, &args);
        }
    }

    fn notify(&self, owner: &dyn DependencyObject, args: &PropertyChangedArgs<'_, T>) {
        let handlers: SmallVec<[ChangeHandler<T>; 2]> = self
            .handlers
            .borrow()
            .iter()
            .map(|(_, handler)| Rc::clone(handler))
            .collect();
        for handler in &handlers {
            handler(owner, args);
        }
        owner.dependency_container().raise_property_changed(
            owner,
            &PropertyChangedEvent {
                property: &self.reference,
                old_value: args.old_value,
                new_value: args.new_value,
                is_base_change: args.is_base_change,
            },
        );
    }

    pub(crate) fn add_handler(&self, handler: ChangeHandler<T>) -> HandlerId {
        let id = HandlerId::next();
        self.handlers.borrow_mut().push((id, handler));
        id
    }

    pub(crate) fn provider(&self, layer: ExpressionLayer) -> Option<Rc<dyn ValueProvider<T>>> {
        self.chain
            .borrow()
            .as_ref()
            .and_then(|chain| chain.entry(layer))
            .map(|entry| Rc::clone(&entry.provider))
    }

    pub(crate) fn expression(&self, layer: ExpressionLayer) -> Option<ExpressionHandle<T>> {
        self.chain
            .borrow()
            .as_ref()
            .and_then(|chain| chain.entry(layer))
            .map(|entry| ExpressionHandle::new(self.property.clone(), entry.id, layer))
    }

    pub(crate) fn is_expression_bound(&self, id: ExpressionId) -> bool {
        self.chain
            .borrow()
            .as_ref()
            .is_some_and(|chain| chain.contains(id))
    }

    /// A value pushed by a bound expression.
    pub(crate) fn push_expression_value(
        &self,
        owner: &dyn DependencyObject,
        id: ExpressionId,
        value: T,
    ) -> PropertyResult<()> {
        self.validate(owner, &value)?;
        let active = {
            let mut chain = self.chain.borrow_mut();
            let Some(entry) = chain.as_mut().and_then(|c| c.find_mut(id)) else {
                tracing::warn!(property = self.property.name(), "push from a released expression");
                return Err(PropertyError::ExpressionDetached {
                    property: self.property.name(),
                });
            };
            entry.last_value = value.clone();
            chain
                .as_ref()
                .and_then(ExpressionChain::active)
                .is_some_and(|entry| entry.id == id)
        };
        if active {
            let guard = ChangeGuard::enter(&self.change_count);
            self.store(owner, guard, value, Origin::Expression);
        }
        Ok(())
    }

    /// Replaces the provider of one layer. `None` removes it.
    pub(crate) fn set_extension(
        &self,
        owner: &dyn DependencyObject,
        layer: ExpressionLayer,
        provider: Option<Rc<dyn ValueProvider<T>>>,
    ) -> PropertyResult<()> {
        let current = self.provider(layer);
        let same = match (&current, &provider) {
            (Some(current), Some(provider)) => Rc::ptr_eq(current, provider),
            (None, None) => true,
            _ => false,
        };
        if same {
            return Ok(());
        }
        drop(current);

        let old = self.take_layer(layer);
        let old_provider = old.as_ref().map(|entry| Rc::clone(&entry.provider));
        // Releases the old expression before the new one starts.
        drop(old);

        let Some(provider) = provider else {
            self.raise_extension_changed(owner, layer, None, old_provider.as_ref());
            self.restore_visible(owner);
            return Ok(());
        };

        match self.install(owner, layer, &provider) {
            Ok(true) => {
                self.raise_extension_changed(owner, layer, Some(&provider), old_provider.as_ref());
                Ok(())
            }
            // Detached again while initializing. The detach reported the new
            // provider; the one it replaced still needs its removal reported.
            Ok(false) => {
                if old_provider.is_some() {
                    self.raise_extension_changed(owner, layer, None, old_provider.as_ref());
                }
                Ok(())
            }
            Err(err) => {
                tracing::debug!(
                    property = self.property.name(),
                    ?layer,
                    error = %err,
                    "value provider failed to initialize"
                );
                if old_provider.is_some() {
                    self.raise_extension_changed(owner, layer, None, old_provider.as_ref());
                }
                self.restore_visible(owner);
                Err(err)
            }
        }
    }

    /// Creates and initializes an expression. Returns `Ok(false)` if the
    /// expression was detached before initialization finished.
    fn install(
        &self,
        owner: &dyn DependencyObject,
        layer: ExpressionLayer,
        provider: &Rc<dyn ValueProvider<T>>,
    ) -> PropertyResult<bool> {
        let id = ExpressionId::next();
        let mut expression = provider.create_expression(&self.property);
        let displaced = self
            .chain
            .borrow_mut()
            .get_or_insert_with(ExpressionChain::new)
            .insert(layer, BoundEntry::new(id, Rc::clone(provider), self.default.clone()));
        drop(displaced);

        tracing::trace!(property = self.property.name(), ?layer, "initializing expression");
        let cx = ExpressionContext::new(owner, ExpressionHandle::new(self.property.clone(), id, layer));
        if let Err(err) = expression.on_initialize(&cx) {
            let failed = self.remove_entry(id);
            drop(failed);
            expression.on_release();
            return Err(err);
        }

        let orphan = {
            let mut chain = self.chain.borrow_mut();
            match chain.as_mut().and_then(|c| c.find_mut(id)) {
                Some(entry) => {
                    entry.expression = Some(expression);
                    None
                }
                None => Some(expression),
            }
        };
        match orphan {
            Some(mut expression) => {
                expression.on_release();
                Ok(false)
            }
            None => Ok(true),
        }
    }

    fn take_layer(&self, layer: ExpressionLayer) -> Option<BoundEntry<T>> {
        let mut chain = self.chain.borrow_mut();
        let entry = chain.as_mut().and_then(|c| c.take(layer));
        if chain.as_ref().is_some_and(ExpressionChain::is_vacant) {
            *chain = None;
        }
        entry
    }

    fn remove_entry(&self, id: ExpressionId) -> Option<BoundEntry<T>> {
        let mut chain = self.chain.borrow_mut();
        let entry = chain.as_mut().and_then(|c| c.remove(id));
        if chain.as_ref().is_some_and(ExpressionChain::is_vacant) {
            *chain = None;
        }
        entry
    }

    /// Drops the whole chain if it is still the one identified by `id`.
    fn detach(&self, owner: &dyn DependencyObject, id: ExpressionId) -> bool {
        let chain = {
            let mut chain = self.chain.borrow_mut();
            if chain.as_ref().is_some_and(|c| c.id() == id) {
                chain.take()
            } else {
                None
            }
        };
        let Some(chain) = chain else {
            return false;
        };
        // One broadcast for the whole chain, naming the primary unless it is
        // the placeholder.
        let mut reported = None;
        for (layer, entry) in chain.into_layers() {
            if let Some(entry) = entry {
                reported = Some((layer, Rc::clone(&entry.provider)));
                drop(entry);
            }
        }
        if let Some((layer, provider)) = reported {
            self.raise_extension_changed(owner, layer, None, Some(&provider));
        }
        true
    }

    /// Makes the value of whatever source is now in charge visible.
    fn restore_visible(&self, owner: &dyn DependencyObject) {
        let active = self
            .chain
            .borrow()
            .as_ref()
            .and_then(ExpressionChain::active)
            .map(|entry| entry.last_value.clone());
        match (active, self.property.slot_kind()) {
            (Some(value), _) => {
                let guard = ChangeGuard::enter(&self.change_count);
                self.store(owner, guard, value, Origin::Expression);
            }
            (None, SlotKind::Dual) => self.coerce_value(owner),
            (None, SlotKind::Simple) => {
                let guard = ChangeGuard::enter(&self.change_count);
                self.store(owner, guard, self.default.clone(), Origin::Expression);
            }
        }
    }

    fn raise_extension_changed(
        &self,
        owner: &dyn DependencyObject,
        layer: ExpressionLayer,
        new_provider: Option<&Rc<dyn ValueProvider<T>>>,
        old_provider: Option<&Rc<dyn ValueProvider<T>>>,
    ) {
        owner.dependency_container().raise_extension_changed(
            owner,
            &ExtensionChangedEvent {
                property: &self.reference,
                layer,
                new_provider: new_provider.map(provider_as_any),
                old_provider: old_provider.map(provider_as_any),
            },
        );
    }
}

fn provider_as_any<T: PropertyValue>(provider: &Rc<dyn ValueProvider<T>>) -> &dyn Any {
    &**provider
}

fn typed_handler<T: PropertyValue>(
    handler: impl Fn(&dyn DependencyObject, &PropertyChangedArgs<'_, T>) + 'static,
) -> ChangeHandler<T> {
    Rc::new(handler)
}

/// The parts of a slot the container uses without knowing `T`.
pub(crate) trait ErasedSlot: Any {
    fn property(&self) -> &PropertyRef;
    fn is_evictable(&self) -> bool;
    fn value_erased(&self) -> ErasedValue;
    fn set_value_erased(&self, owner: &dyn DependencyObject, value: &ErasedValue) -> PropertyResult<()>;
    fn add_any_handler(&self, handler: AnyChangeHandler) -> HandlerId;
    fn remove_handler(&self, id: HandlerId) -> bool;
}

impl<T: PropertyValue> ErasedSlot for ValueSlot<T> {
    fn property(&self) -> &PropertyRef {
        &self.reference
    }

    /// A slot may go once it holds nothing the property default would not
    /// reproduce. Factory defaults stay so the factory runs once per object.
    fn is_evictable(&self) -> bool {
        if self.change_count.get() != 0
            || self.property.uses_value_factory()
            || !self.handlers.borrow().is_empty()
            || self.chain.borrow().is_some()
        {
            return false;
        }
        let values = self.values.borrow();
        *values.base() == self.default && *values.current() == self.default
    }

    fn value_erased(&self) -> ErasedValue {
        ErasedValue::new(self.value())
    }

    fn set_value_erased(&self, owner: &dyn DependencyObject, value: &ErasedValue) -> PropertyResult<()> {
        let Some(typed) = value.downcast_ref::<T>() else {
            return Err(PropertyError::TypeMismatch {
                property: self.property.name(),
                expected: type_name::<T>(),
                found: value.type_name(),
            });
        };
        self.set_value(owner, typed.clone())
    }

    fn add_any_handler(&self, handler: AnyChangeHandler) -> HandlerId {
        let property = self.reference.clone();
        self.add_handler(typed_handler(move |owner, args| {
            handler(
                owner,
                &PropertyChangedEvent {
                    property: &property,
                    old_value: args.old_value,
                    new_value: args.new_value,
                    is_base_change: args.is_base_change,
                },
            );
        }))
    }

    fn remove_handler(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.borrow_mut();
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        handlers.len() != before
    }
}
