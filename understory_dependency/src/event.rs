// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Change notification types.
//!
//! Typed argument structs are passed to per-property callbacks and handlers.
//! Object-wide notifications use the erased [`PropertyChangedEvent`] and
//! [`ExtensionChangedEvent`] and are delivered through an [`EventChannel`],
//! whose subscriber list is swapped atomically so handlers can be added and
//! removed from any thread while events are being raised.

use core::any::Any;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::object::DependencyObject;
use crate::property::{DependencyProperty, PropertyRef, PropertyValue};

/// Arguments for a pending change, passed to the changing callback.
#[derive(Debug)]
pub struct PropertyChangingArgs<'a, T: PropertyValue> {
    /// The property about to change.
    pub property: &'a DependencyProperty<T>,
    /// The value that is about to be replaced.
    pub old_value: &'a T,
}

/// Arguments for a completed change.
#[derive(Debug)]
pub struct PropertyChangedArgs<'a, T: PropertyValue> {
    /// The property that changed.
    pub property: &'a DependencyProperty<T>,
    /// The previous value.
    pub old_value: &'a T,
    /// The new value.
    pub new_value: &'a T,
    /// `true` for the outermost change of a (possibly reentrant) update;
    /// nested changes made from inside callbacks report `false`.
    pub is_base_change: bool,
}

/// Type-erased form of [`PropertyChangedArgs`], raised object-wide.
#[derive(Debug)]
pub struct PropertyChangedEvent<'a> {
    /// The property that changed.
    pub property: &'a PropertyRef,
    /// The previous value.
    pub old_value: &'a dyn Any,
    /// The new value.
    pub new_value: &'a dyn Any,
    /// See [`PropertyChangedArgs::is_base_change`].
    pub is_base_change: bool,
}

impl PropertyChangedEvent<'_> {
    /// Returns the previous value as `T`.
    #[must_use]
    pub fn old_value_as<T: Any>(&self) -> Option<&T> {
        self.old_value.downcast_ref()
    }

    /// Returns the new value as `T`.
    #[must_use]
    pub fn new_value_as<T: Any>(&self) -> Option<&T> {
        self.new_value.downcast_ref()
    }
}

/// Which provider layer of a property an event refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExpressionLayer {
    /// The primary value provider.
    Primary,
    /// The override provider, which supersedes the primary while present.
    Override,
}

/// Raised when a property's value provider is attached, replaced or detached.
///
/// Providers are exposed as [`Any`] so handlers can downcast to the concrete
/// provider type they care about.
#[derive(Debug)]
pub struct ExtensionChangedEvent<'a> {
    /// The property whose provider changed.
    pub property: &'a PropertyRef,
    /// The layer that changed.
    pub layer: ExpressionLayer,
    /// The provider now in place, if any.
    pub new_provider: Option<&'a dyn Any>,
    /// The provider that was replaced, if any.
    pub old_provider: Option<&'a dyn Any>,
}

/// Identifies a subscribed handler so it can be removed later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Object-wide handler for [`PropertyChangedEvent`]s.
pub type PropertyChangedHandler =
    dyn Fn(&dyn DependencyObject, &PropertyChangedEvent<'_>) + Send + Sync;

/// Object-wide handler for [`ExtensionChangedEvent`]s.
pub type ExtensionChangedHandler =
    dyn Fn(&dyn DependencyObject, &ExtensionChangedEvent<'_>) + Send + Sync;

struct Subscriber<H: ?Sized> {
    id: HandlerId,
    handler: Arc<H>,
}

impl<H: ?Sized> Clone for Subscriber<H> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            handler: Arc::clone(&self.handler),
        }
    }
}

/// A broadcast list of handlers.
///
/// The list is immutable once published. `subscribe` and `unsubscribe`
/// build a new list and swap it in with a compare-and-retry loop, so a
/// concurrent `raise` always walks one consistent snapshot.
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use understory_dependency::EventChannel;
///
/// let channel: EventChannel<dyn Fn(u32) + Send + Sync> = EventChannel::new();
/// let total = Arc::new(AtomicUsize::new(0));
/// let sink = Arc::clone(&total);
/// let id = channel.subscribe(Arc::new(move |n: u32| {
///     sink.fetch_add(n as usize, Ordering::Relaxed);
/// }));
///
/// channel.raise(|handler| handler(3));
/// assert!(channel.unsubscribe(id));
/// channel.raise(|handler| handler(3));
/// assert_eq!(total.load(Ordering::Relaxed), 3);
/// ```
pub struct EventChannel<H: ?Sized> {
    subscribers: ArcSwap<Vec<Subscriber<H>>>,
}

impl<H: ?Sized> EventChannel<H> {
    /// Creates an empty channel.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Adds a handler and returns its id.
    pub fn subscribe(&self, handler: Arc<H>) -> HandlerId {
        let id = HandlerId::next();
        self.subscribers.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Subscriber {
                id,
                handler: Arc::clone(&handler),
            });
            next
        });
        id
    }

    /// Removes a handler. Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&self, id: HandlerId) -> bool {
        let mut removed = false;
        self.subscribers.rcu(|current| {
            let next: Vec<_> = current.iter().filter(|s| s.id != id).cloned().collect();
            removed = next.len() != current.len();
            next
        });
        removed
    }

    /// Invokes `call` for every handler in the current snapshot, in
    /// subscription order.
    pub fn raise(&self, mut call: impl FnMut(&H)) {
        let snapshot = self.subscribers.load_full();
        for subscriber in snapshot.iter() {
            call(&subscriber.handler);
        }
    }

    /// Returns the number of subscribed handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.load().len()
    }

    /// Returns `true` if no handler is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.load().is_empty()
    }
}

impl<H: ?Sized> Default for EventChannel<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: ?Sized> fmt::Debug for EventChannel<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("subscribers", &self.len())
            .finish()
    }
}
