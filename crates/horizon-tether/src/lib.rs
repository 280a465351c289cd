//! Horizon Tether - property bindings and observable collections.
//!
//! This is the main crate; it re-exports the core object model from
//! `horizon-tether-core` and the `Bindable` derive.
//!
//! # Binding Example
//!
//! ```
//! use horizon_tether::prelude::*;
//! use std::sync::Arc;
//!
//! #[derive(Bindable, Default)]
//! struct Slider {
//!     #[property(name = "Value")]
//!     value: Property<i64>,
//!
//!     #[notify]
//!     notifier: PropertyChangedNotifier,
//! }
//!
//! let slider = Arc::new(Slider::default());
//! let label = Arc::new(DynamicObject::new("Label").with_property("Text", 0));
//!
//! let _binding = HierarchicalBinding::builder()
//!     .source(&slider, "Value")
//!     .target(&label, "Text")
//!     .build()
//!     .unwrap();
//!
//! slider.set_value(42);
//! assert_eq!(label.get("Text"), Some(Value::from(42)));
//! ```

pub use horizon_tether_core::*;
pub use horizon_tether_macros::*;

pub mod binding;
pub mod collections;
mod error;
pub mod prelude;

pub use error::{BindingError, CollectionError, Error, Result};
