//! Storage cells behind named properties.
//!
//! A [`Property<T>`] holds one value behind a lock and reports whether a
//! write changed it. It never notifies anyone itself: the owning host emits
//! [`PropertyChanged`](crate::PropertyChanged), usually through a
//! [`PropertyChangedNotifier`](crate::PropertyChangedNotifier) or the setters
//! generated by `#[derive(Bindable)]`. Reporting "unchanged" for equal values
//! is what stops two-way bindings from echoing forever.
//!
//! # Example
//!
//! ```
//! use horizon_tether_core::{Property, PropertyChangedNotifier};
//!
//! struct Thermostat {
//!     target: Property<f64>,
//!     notifier: PropertyChangedNotifier,
//! }
//!
//! impl Thermostat {
//!     fn set_target(&self, degrees: f64) -> bool {
//!         self.notifier.set_and_notify(&self.target, degrees, "Target")
//!     }
//! }
//!
//! let thermostat = Thermostat { target: Property::new(20.0), notifier: PropertyChangedNotifier::new() };
//! assert!(thermostat.set_target(21.5));
//! assert!(!thermostat.set_target(21.5));
//! ```

use std::fmt;

use parking_lot::RwLock;

/// A value behind a reader/writer lock with change detection on write.
///
/// `Property<T>` is `Send + Sync` whenever `T` is, so hosts holding only
/// properties can be shared across threads as they are.
pub struct Property<T> {
    value: RwLock<T>,
}

impl<T> Property<T> {
    /// A cell holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            value: RwLock::new(value),
        }
    }

    /// Borrow the value for the duration of `f`.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.read())
    }

    /// Take the value out of the cell.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: Clone> Property<T> {
    /// A copy of the value.
    pub fn get(&self) -> T {
        self.value.read().clone()
    }
}

impl<T: PartialEq> Property<T> {
    /// Store `value` unless it equals the current one.
    ///
    /// Returns whether anything was stored; owners notify only on `true`.
    pub fn set(&self, value: T) -> bool {
        self.replace(value).is_some()
    }

    /// Like [`set`](Self::set), handing back the previous value on change.
    pub fn replace(&self, value: T) -> Option<T> {
        let mut current = self.value.write();
        if *current == value {
            None
        } else {
            Some(std::mem::replace(&mut *current, value))
        }
    }
}

impl<T: Clone + PartialEq> Property<T> {
    /// Edit the value in place under the write lock.
    ///
    /// Returns whether the edit changed the value.
    pub fn update(&self, edit: impl FnOnce(&mut T)) -> bool {
        let mut current = self.value.write();
        let before = current.clone();
        edit(&mut current);
        *current != before
    }
}

impl<T: Clone> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

impl<T: Default> Default for Property<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with(|value| f.debug_tuple("Property").field(value).finish())
    }
}

impl<T> From<T> for Property<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}
