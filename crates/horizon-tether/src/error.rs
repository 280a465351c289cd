//! Error types for bindings and collections.

/// Errors raised when constructing or using a binding.
///
/// Only construction and explicit operations return these. Failures while
/// propagating a change are logged and forwarded to the binding's error hook
/// instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindingError {
    /// No source object was supplied.
    #[error("Binding source object is missing")]
    MissingSource,

    /// No target object was supplied.
    #[error("Binding target object is missing")]
    MissingTarget,

    /// The property path is empty.
    #[error("Property path is empty")]
    EmptyPath,

    /// A dotted path contains an empty segment.
    #[error("Property path '{path}' has an empty segment at position {position}")]
    EmptySegment {
        /// The offending path.
        path: String,
        /// Zero-based index of the empty segment.
        position: usize,
    },

    /// The object has no property with this name.
    #[error("Property '{name}' not found on {type_name}")]
    UnknownProperty {
        /// The requested property name.
        name: String,
        /// The object's type name.
        type_name: &'static str,
    },

    /// The property cannot be read.
    #[error("Property '{name}' on {type_name} is not readable")]
    NotReadable {
        /// The property name.
        name: String,
        /// The object's type name.
        type_name: &'static str,
    },

    /// The property cannot be written.
    #[error("Property '{name}' on {type_name} is not writable")]
    NotWritable {
        /// The property name.
        name: String,
        /// The object's type name.
        type_name: &'static str,
    },

    /// The object reports no property changes.
    #[error("{type_name} does not report property changes")]
    NotNotifiable {
        /// The object's type name.
        type_name: &'static str,
    },

    /// The operation requires a two-way binding.
    #[error("Operation requires a two-way binding")]
    NotTwoWay,

    /// The binding is propagating a change on this thread.
    #[error("Binding is busy propagating a change")]
    Busy,

    /// The binding has been disposed.
    #[error("Binding has been disposed")]
    Disposed,
}

/// Errors raised by observable collections and their views.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollectionError {
    /// The collection is a read-only view.
    #[error("Cannot {operation} a read-only view")]
    ReadOnly {
        /// The rejected operation.
        operation: &'static str,
    },

    /// An index was outside the collection.
    #[error("Index {index} out of range for length {len}")]
    IndexOutOfRange {
        /// The requested index.
        index: usize,
        /// The collection length at the time.
        len: usize,
    },

    /// The delivery options contradict each other.
    #[error("Invalid collection configuration: {0}")]
    InvalidConfig(&'static str),

    /// Marshaled delivery was requested on a thread without a dispatcher.
    #[error("No dispatcher is current on this thread to marshal notifications to")]
    NoExecutionContext,
}

/// Any error raised by this crate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Binding error.
    #[error(transparent)]
    Binding(#[from] BindingError),

    /// Collection error.
    #[error(transparent)]
    Collection(#[from] CollectionError),

    /// Property access error.
    #[error(transparent)]
    Property(#[from] horizon_tether_core::PropertyError),
}

/// Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
