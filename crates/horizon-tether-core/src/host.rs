//! Named property access on objects.
//!
//! [`PropertyHost`] is the runtime property surface bindings work against:
//! look up a property by name, ask whether it can be read or written, and get
//! or set it as a [`Value`]. Types usually get it from `#[derive(Bindable)]`;
//! [`DynamicObject`] provides a map-backed host for properties defined at
//! runtime.
//!
//! Hosts advertise how they report changes through two accessors:
//!
//! - [`PropertyHost::as_notify`] for hosts with a [`NotifyPropertyChanged`]
//!   signal covering all of their properties;
//! - [`PropertyHost::as_observable`] for hosts that accept per-property
//!   observers ([`ObservableProperties`]).
//!
//! A host answering neither can still be read, it just never reports changes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use slotmap::{SlotMap, new_key_type};

use crate::error::{PropertyError, PropertyResult};
use crate::logging::targets;
use crate::notify::NotifyPropertyChanged;
use crate::value::{HostAny, Value};

/// Read/write capability of one property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropertyAccess {
    /// The property has a public getter.
    pub readable: bool,
    /// The property has a public setter.
    pub writable: bool,
}

impl PropertyAccess {
    /// Readable and writable.
    pub const READ_WRITE: Self = Self {
        readable: true,
        writable: true,
    };
    /// Readable only.
    pub const READ_ONLY: Self = Self {
        readable: true,
        writable: false,
    };
    /// Writable only.
    pub const WRITE_ONLY: Self = Self {
        readable: false,
        writable: true,
    };
}

/// An object whose properties can be accessed by name.
pub trait PropertyHost: HostAny {
    /// The host's type name, for diagnostics.
    fn type_name(&self) -> &'static str;

    /// Names of all properties this host exposes.
    fn property_names(&self) -> Vec<String>;

    /// Capabilities of the named property, or `None` if it does not exist.
    fn property_access(&self, name: &str) -> Option<PropertyAccess>;

    /// Read a property.
    fn get_property(&self, name: &str) -> PropertyResult<Value>;

    /// Write a property.
    fn set_property(&self, name: &str, value: Value) -> PropertyResult<()>;

    /// The host's change signal, if it has one.
    fn as_notify(&self) -> Option<&dyn NotifyPropertyChanged> {
        None
    }

    /// Per-property observation, for hosts without a change signal.
    fn as_observable(&self) -> Option<&dyn ObservableProperties> {
        None
    }
}

impl std::fmt::Debug for dyn PropertyHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyHost")
            .field("type_name", &self.type_name())
            .finish_non_exhaustive()
    }
}

/// Hosts compare by identity.
impl PartialEq for dyn PropertyHost {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(self as *const Self, other as *const Self)
    }
}

new_key_type! {
    /// Identifies an observer registered through [`ObservableProperties`].
    pub struct ObserverId;
}

/// Callback invoked after an observed property changes.
pub type PropertyObserver = Arc<dyn Fn() + Send + Sync>;

/// Per-property change observation.
pub trait ObservableProperties: Send + Sync {
    /// Register `observer` for changes to `name`.
    ///
    /// Returns `None` if the property does not exist.
    fn observe_property(&self, name: &str, observer: PropertyObserver) -> Option<ObserverId>;

    /// Remove an observer. Returns `false` if it was not registered.
    fn unobserve_property(&self, name: &str, id: ObserverId) -> bool;
}

/// A value stored in a [`DynamicObject`].
#[derive(Debug, Clone)]
struct DynamicProperty {
    value: Value,
    access: PropertyAccess,
}

/// A property host whose properties are defined at runtime.
///
/// Changes are reported through [`ObservableProperties`] rather than a
/// change signal.
///
/// # Example
///
/// ```
/// use horizon_tether_core::{DynamicObject, PropertyHost, Value};
///
/// let obj = DynamicObject::new("Settings").with_property("theme", "dark");
/// assert_eq!(obj.get_property("theme").unwrap(), Value::from("dark"));
///
/// obj.set_property("theme", "light".into()).unwrap();
/// assert_eq!(obj.get("theme"), Some(Value::from("light")));
/// ```
pub struct DynamicObject {
    type_name: &'static str,
    properties: RwLock<HashMap<String, DynamicProperty>>,
    observers: Mutex<SlotMap<ObserverId, (String, PropertyObserver)>>,
}

impl DynamicObject {
    /// Create an object with no properties.
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            properties: RwLock::new(HashMap::new()),
            observers: Mutex::new(SlotMap::with_key()),
        }
    }

    /// Builder-style variant of [`define`](Self::define) for a read-write property.
    pub fn with_property(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.define(name, value, PropertyAccess::READ_WRITE);
        self
    }

    /// Builder-style variant of [`define`](Self::define) for a read-only property.
    pub fn with_read_only(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.define(name, value, PropertyAccess::READ_ONLY);
        self
    }

    /// Define or redefine a property.
    ///
    /// Observers of the property are notified if it already existed with a
    /// different value.
    pub fn define(&self, name: impl Into<String>, value: impl Into<Value>, access: PropertyAccess) {
        let name = name.into();
        let value = value.into();
        let changed = {
            let mut properties = self.properties.write();
            let previous = properties.insert(
                name.clone(),
                DynamicProperty {
                    value: value.clone(),
                    access,
                },
            );
            previous.is_some_and(|p| p.value != value)
        };
        if changed {
            self.notify(&name);
        }
    }

    /// Remove a property, returning its last value.
    pub fn remove(&self, name: &str) -> Option<Value> {
        crate::tether_debug!(type_name = self.type_name, property = name, "removing dynamic property");
        self.properties.write().remove(name).map(|p| p.value)
    }

    /// Read a property regardless of its access flags.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.properties.read().get(name).map(|p| p.value.clone())
    }

    /// Number of defined properties.
    pub fn len(&self) -> usize {
        self.properties.read().len()
    }

    /// Returns `true` if no properties are defined.
    pub fn is_empty(&self) -> bool {
        self.properties.read().is_empty()
    }

    fn notify(&self, name: &str) {
        let observers: Vec<PropertyObserver> = self
            .observers
            .lock()
            .values()
            .filter(|(observed, _)| observed == name)
            .map(|(_, observer)| observer.clone())
            .collect();
        tracing::trace!(target: targets::PROPERTY, property = name, observers = observers.len(), "dynamic property changed");
        for observer in observers {
            observer();
        }
    }
}

impl PropertyHost for DynamicObject {
    fn type_name(&self) -> &'static str {
        self.type_name
    }

    fn property_names(&self) -> Vec<String> {
        self.properties.read().keys().cloned().collect()
    }

    fn property_access(&self, name: &str) -> Option<PropertyAccess> {
        self.properties.read().get(name).map(|p| p.access)
    }

    fn get_property(&self, name: &str) -> PropertyResult<Value> {
        let properties = self.properties.read();
        let property = properties
            .get(name)
            .ok_or_else(|| PropertyError::not_found(name, self.type_name))?;
        if !property.access.readable {
            return Err(PropertyError::write_only(name));
        }
        Ok(property.value.clone())
    }

    fn set_property(&self, name: &str, value: Value) -> PropertyResult<()> {
        let changed = {
            let mut properties = self.properties.write();
            let property = properties
                .get_mut(name)
                .ok_or_else(|| PropertyError::not_found(name, self.type_name))?;
            if !property.access.writable {
                return Err(PropertyError::read_only(name));
            }
            if property.value == value {
                false
            } else {
                property.value = value;
                true
            }
        };
        if changed {
            self.notify(name);
        }
        Ok(())
    }

    fn as_observable(&self) -> Option<&dyn ObservableProperties> {
        Some(self)
    }
}

impl ObservableProperties for DynamicObject {
    fn observe_property(&self, name: &str, observer: PropertyObserver) -> Option<ObserverId> {
        if !self.properties.read().contains_key(name) {
            return None;
        }
        Some(self.observers.lock().insert((name.to_owned(), observer)))
    }

    fn unobserve_property(&self, name: &str, id: ObserverId) -> bool {
        let mut observers = self.observers.lock();
        match observers.get(id) {
            Some((observed, _)) if observed == name => observers.remove(id).is_some(),
            _ => false,
        }
    }
}

impl std::fmt::Debug for DynamicObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicObject")
            .field("type_name", &self.type_name)
            .field("properties", &self.properties.read().len())
            .field("observers", &self.observers.lock().len())
            .finish()
    }
}

static_assertions::assert_impl_all!(DynamicObject: Send, Sync);
