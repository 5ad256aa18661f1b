// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Dependency: a dependency property runtime.
//!
//! Properties are declared once per class as [`DependencyProperty`]
//! descriptors carrying metadata: a default value, optional validation,
//! coercion and change callbacks. Objects implement [`DependencyObject`] by
//! owning a [`PropertyContainer`], and read and write values through
//! [`DependencyObjectExt`].
//!
//! ## Core Concepts
//!
//! ### Values
//!
//! - **Default** - from the metadata, either a constant or a per-instance factory
//! - **Base** - the last explicitly assigned value
//! - **Current** - what readers see: the base, or the active value provider's
//!   value, passed through the coerce callback
//!
//! ### Value Providers
//!
//! A [`ValueProvider`] attached with
//! [`set_value_extension`](DependencyObjectExt::set_value_extension) creates
//! a [`BoundExpression`] that pushes values into the property. An override
//! provider, attached with
//! [`set_value_extension_override`](DependencyObjectExt::set_value_extension_override),
//! temporarily supersedes the primary one. An explicit `set_value` detaches both.
//!
//! ### Notifications
//!
//! Writes are synchronous and may cascade: a changed callback can write other
//! properties, and coercion may depend on them. Per-property handlers and the
//! container's [`property_changed`](PropertyContainer::property_changed)
//! channel see exactly one notification for the outermost change of a cascade.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::LazyLock;
//! use understory_dependency::{
//!     DependencyClass, DependencyObject, DependencyObjectExt, DependencyProperty,
//!     PropertyContainer, PropertyMetadataBuilder,
//! };
//!
//! struct ProgressBar {
//!     container: PropertyContainer,
//! }
//!
//! impl DependencyClass for ProgressBar {}
//!
//! impl DependencyObject for ProgressBar {
//!     fn dependency_container(&self) -> &PropertyContainer {
//!         &self.container
//!     }
//! }
//!
//! static PROGRESS: LazyLock<DependencyProperty<f64>> = LazyLock::new(|| {
//!     DependencyProperty::register::<ProgressBar>(
//!         "Progress",
//!         PropertyMetadataBuilder::new(0.0)
//!             .validate(|_, v: &f64| v.is_finite())
//!             .coerce(|_, v: f64| v.clamp(0.0, 1.0))
//!             .build(),
//!     )
//!     .unwrap()
//! });
//!
//! let bar = ProgressBar { container: PropertyContainer::new::<ProgressBar>() };
//! assert_eq!(bar.get_value(&PROGRESS), 0.0);
//!
//! // Coerced on the way in; the base value keeps what was asked for.
//! bar.set_value(&PROGRESS, 1.5).unwrap();
//! assert_eq!(bar.get_value(&PROGRESS), 1.0);
//! assert_eq!(bar.get_base_value(&PROGRESS), 1.5);
//!
//! // Rejected by validation; nothing changes.
//! assert!(bar.set_value(&PROGRESS, f64::NAN).is_err());
//! assert_eq!(bar.get_value(&PROGRESS), 1.0);
//! ```
//!
//! ## Memory Optimizations
//!
//! | Optimization | Description |
//! |--------------|-------------|
//! | **Sparse storage** | A container holds slots only for properties it touched |
//! | **Shared defaults** | Constant defaults live in the descriptor, not per object |
//! | **Eviction** | A slot written back to its default with nothing attached is dropped |
//! | **Single value for plain properties** | Only coerced properties keep a separate base value |
//!
//! ## Threading
//!
//! Descriptors, metadata and the class registry are `Send + Sync` and usually
//! live in statics. Objects and their containers are single-threaded; the
//! container's event channels can be subscribed to from any thread.

mod container;
mod error;
mod event;
mod expression;
mod metadata;
mod object;
mod property;
mod registry;
mod slot;
mod value;

pub use container::PropertyContainer;
pub use error::{PropertyError, PropertyResult};
pub use event::{
    EventChannel, ExpressionLayer, ExtensionChangedEvent, ExtensionChangedHandler, HandlerId,
    PropertyChangedArgs, PropertyChangedEvent, PropertyChangedHandler, PropertyChangingArgs,
};
pub use expression::{BoundExpression, ExpressionContext, ExpressionHandle, ValueProvider};
pub use metadata::{
    BindingMode, CoerceValueCallback, CreateValueCallback, DefaultValue, PropertyChangedCallback,
    PropertyChangingCallback, PropertyMetadata, PropertyMetadataBuilder, ValidateValueCallback,
};
pub use object::{AsDependencyObject, DependencyObject, DependencyObjectExt};
pub use property::{DependencyProperty, PropertyKey, PropertyRef, PropertyValue};
pub use registry::{ClassId, DependencyClass, DependencyType, TypeRegistry};
pub use value::ErasedValue;
