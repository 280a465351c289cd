//! Property bindings.
//!
//! - [`HierarchicalBinding`]: binds the ends of two dotted paths, following
//!   every intermediate object so that replacing one re-resolves the rest
//! - [`PropertyBinding`]: binds one property to another, validating access
//!   up front
//!
//! Objects are reached through [`PropertyHost`](horizon_tether_core::PropertyHost).
//! Changes are followed through the host's change signal when it has one,
//! through per-property observers otherwise; a host offering neither is
//! read once.

mod hierarchical;
mod part;
mod path;
mod property_binding;

pub use hierarchical::{BindingMode, ErrorHook, HierarchicalBinding, HierarchicalBindingBuilder};
pub use part::{BindingPart, Resolved};
pub use path::PropertyPath;
pub use property_binding::PropertyBinding;
