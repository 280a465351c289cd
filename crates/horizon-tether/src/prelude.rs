//! Prelude module for Horizon Tether.
//!
//! This module re-exports the most commonly used types for convenient importing:
//!
//! ```
//! use horizon_tether::prelude::*;
//! ```

// ============================================================================
// Signal/Slot and Property System
// ============================================================================

pub use horizon_tether_core::{ConnectionId, ConnectionType, Property, Signal};

// ============================================================================
// Object Model
// ============================================================================

pub use horizon_tether_core::{
    DynamicObject, IntoObjectRef, NotifyPropertyChanged, ObjectRef, ObservableItem, PropertyAccess,
    PropertyChanged, PropertyChangedNotifier, PropertyHost, Value,
};
pub use horizon_tether_macros::Bindable;

// ============================================================================
// Dispatchers
// ============================================================================

pub use horizon_tether_core::{DispatchQueue, Dispatcher, InlineDispatcher};

// ============================================================================
// Bindings
// ============================================================================

pub use crate::binding::{BindingMode, HierarchicalBinding, PropertyBinding, Resolved};

// ============================================================================
// Collections
// ============================================================================

pub use crate::collections::{
    CollectionChange, CollectionChanged, CollectionConfig, ConcurrentObservableCollection,
    ConcurrentObservableList, FilteredList, ObservableCollection, SortedList,
};

// ============================================================================
// Errors
// ============================================================================

pub use crate::error::{BindingError, CollectionError};
