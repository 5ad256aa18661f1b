// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Type-erased property values.
//!
//! [`ErasedValue`] is what generic tooling sees when it reads or writes a
//! property through a [`PropertyRef`](crate::PropertyRef) without knowing the
//! value type at compile time.

use core::any::{Any, TypeId, type_name};
use core::fmt;
use std::sync::Arc;

/// A type-erased, cheaply clonable property value.
///
/// # Example
///
/// ```rust
/// use understory_dependency::ErasedValue;
///
/// let value = ErasedValue::new(42_i32);
/// assert!(value.is::<i32>());
/// assert_eq!(value.downcast_ref::<i32>(), Some(&42));
/// assert_eq!(value.type_name(), "i32");
///
/// let shared = value.clone();
/// assert_eq!(shared.downcast::<i32>(), Some(42));
/// ```
#[derive(Clone)]
pub struct ErasedValue {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl ErasedValue {
    /// Wraps a concrete value.
    #[must_use]
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_name: type_name::<T>(),
        }
    }

    /// Returns the [`TypeId`] of the contained value.
    #[must_use]
    #[inline]
    pub fn value_type_id(&self) -> TypeId {
        (*self.inner).type_id()
    }

    /// Returns the Rust type name of the contained value.
    #[must_use]
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns `true` if the contained value is of type `T`.
    #[must_use]
    #[inline]
    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// Borrows the contained value as `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref()
    }

    /// Clones the contained value out as `T`.
    #[must_use]
    pub fn downcast<T: Any + Clone>(&self) -> Option<T> {
        self.downcast_ref::<T>().cloned()
    }
}

impl fmt::Debug for ErasedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedValue")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}
