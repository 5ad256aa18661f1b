// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types for property declaration and value access.

use thiserror::Error;

/// Errors raised while declaring dependency properties or reading and
/// writing their values.
///
/// Every error is reported synchronously to the immediate caller. None of
/// them leave partially applied state behind.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PropertyError {
    /// The property name is empty, whitespace, or not a dotted identifier
    /// path (attached properties only).
    #[error("invalid property name `{name}`")]
    InvalidName {
        /// The rejected name.
        name: &'static str,
    },

    /// A non-attached property with this name is already declared by the class.
    #[error("property `{name}` is already declared on `{class}`")]
    DuplicateName {
        /// The duplicated property name.
        name: &'static str,
        /// The declaring class.
        class: &'static str,
    },

    /// The validation callback rejected the value.
    #[error("value {value} is not valid for property `{property}`")]
    InvalidValue {
        /// The property being written.
        property: &'static str,
        /// Debug rendering of the rejected value.
        value: String,
    },

    /// The property is read-only and no matching [`PropertyKey`](crate::PropertyKey)
    /// was presented.
    #[error("property `{property}` is read-only")]
    ReadOnly {
        /// The property being written.
        property: &'static str,
    },

    /// The property is neither attached nor declared by the object's class
    /// hierarchy.
    #[error("property `{property}` is not valid for objects of type `{class}`")]
    InvalidOwner {
        /// The property being accessed.
        property: &'static str,
        /// The class of the object.
        class: &'static str,
    },

    /// The object refused access to the property.
    #[error("access to property `{property}` was denied")]
    AccessDenied {
        /// The property being accessed.
        property: &'static str,
    },

    /// A type-erased value did not match the property's value type.
    #[error("property `{property}` expects `{expected}`, got `{found}`")]
    TypeMismatch {
        /// The property being accessed.
        property: &'static str,
        /// The declared value type.
        expected: &'static str,
        /// The supplied value type.
        found: &'static str,
    },

    /// A bound expression pushed a value after it was released.
    #[error("expression for property `{property}` is no longer bound")]
    ExpressionDetached {
        /// The property the expression was bound to.
        property: &'static str,
    },

    /// A value provider failed to initialize its expression.
    #[error("value provider failed: {0}")]
    Provider(String),
}

impl PropertyError {
    /// Creates a [`PropertyError::Provider`] from any displayable message.
    #[must_use]
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider(message.into())
    }
}

/// Result type for property operations.
pub type PropertyResult<T> = Result<T, PropertyError>;
