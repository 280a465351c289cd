//! Error types for Horizon Tether core.

/// Errors raised when reading or writing a named property on a host.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PropertyError {
    /// The host has no property with this name.
    #[error("Property '{name}' not found on {type_name}")]
    NotFound {
        /// The requested property name.
        name: String,
        /// The host's type name.
        type_name: &'static str,
    },

    /// The supplied value could not be converted to the property's type.
    #[error("Property type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// The expected type name.
        expected: &'static str,
        /// The type name of the supplied value.
        got: &'static str,
    },

    /// The property has no public setter.
    #[error("Property '{name}' is read-only")]
    ReadOnly {
        /// The name of the read-only property.
        name: String,
    },

    /// The property has no public getter.
    #[error("Property '{name}' is write-only")]
    WriteOnly {
        /// The name of the write-only property.
        name: String,
    },

    /// The host object was dropped while a binding still referred to it.
    #[error("Property host has been dropped")]
    HostDropped,
}

impl PropertyError {
    /// Create a not-found error.
    pub fn not_found(name: impl Into<String>, type_name: &'static str) -> Self {
        Self::NotFound {
            name: name.into(),
            type_name,
        }
    }

    /// Create a read-only error.
    pub fn read_only(name: impl Into<String>) -> Self {
        Self::ReadOnly { name: name.into() }
    }

    /// Create a write-only error.
    pub fn write_only(name: impl Into<String>) -> Self {
        Self::WriteOnly { name: name.into() }
    }
}

/// Errors raised when handing work to an execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The dispatcher has been shut down and accepts no more work.
    #[error("Dispatcher has been shut down")]
    ShutDown,

    /// The dispatcher's bounded queue is full.
    #[error("Dispatcher queue is full")]
    QueueFull,
}

/// Result type for property access.
pub type PropertyResult<T> = std::result::Result<T, PropertyError>;
