//! Property change notification.
//!
//! [`NotifyPropertyChanged`] is the change capability that bindings and
//! collection views subscribe to: one signal carrying the name of whichever
//! property changed. [`ObservableItem`] lets generic collection code ask an
//! element for that capability without knowing its type.

use std::sync::Arc;

use crate::host::PropertyHost;
use crate::property::Property;
use crate::signal::Signal;
use crate::value::Value;

/// Payload of a property change notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyChanged {
    name: Arc<str>,
}

impl PropertyChanged {
    /// Create a notification for `name`.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self { name: name.into() }
    }

    /// The changed property's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if this notification is about `name`.
    pub fn is(&self, name: &str) -> bool {
        &*self.name == name
    }
}

/// An object that announces property changes through a signal.
///
/// Subscribing is [`Signal::connect`] on [`property_changed`](Self::property_changed);
/// unsubscribing is [`Signal::disconnect`] with the returned id.
pub trait NotifyPropertyChanged: Send + Sync {
    /// The signal emitted after any property changes.
    fn property_changed(&self) -> &Signal<PropertyChanged>;
}

/// A reusable change signal for hand-written property hosts.
///
/// # Example
///
/// ```
/// use horizon_tether_core::{NotifyPropertyChanged, Property, PropertyChangedNotifier};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let notifier = PropertyChangedNotifier::new();
/// let title = Property::new(String::new());
/// let hits = Arc::new(AtomicUsize::new(0));
///
/// let hits_clone = hits.clone();
/// notifier.property_changed().connect(move |change| {
///     assert_eq!(change.name(), "title");
///     hits_clone.fetch_add(1, Ordering::SeqCst);
/// });
///
/// assert!(notifier.set_and_notify(&title, "Report".to_string(), "title"));
/// assert!(!notifier.set_and_notify(&title, "Report".to_string(), "title"));
/// assert_eq!(hits.load(Ordering::SeqCst), 1);
/// ```
#[derive(Debug, Default)]
pub struct PropertyChangedNotifier {
    signal: Signal<PropertyChanged>,
}

impl PropertyChangedNotifier {
    /// Create a notifier with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce that `name` changed.
    pub fn notify(&self, name: &str) {
        crate::tether_trace!(property = name, "property changed");
        self.signal.emit(PropertyChanged::new(name));
    }

    /// Store `value` in `property` and announce `name` if it changed.
    ///
    /// Returns whether the value changed.
    pub fn set_and_notify<T: Clone + PartialEq>(&self, property: &Property<T>, value: T, name: &str) -> bool {
        let changed = property.set(value);
        if changed {
            self.notify(name);
        }
        changed
    }
}

impl NotifyPropertyChanged for PropertyChangedNotifier {
    fn property_changed(&self) -> &Signal<PropertyChanged> {
        &self.signal
    }
}

/// Element-level access to change notification.
///
/// Collection views call [`notifier`](Self::notifier) on every element they
/// hold and re-evaluate the element when it reports a change. Plain values
/// report no notifier.
pub trait ObservableItem {
    /// The element's change signal, if it has one.
    fn notifier(&self) -> Option<&dyn NotifyPropertyChanged> {
        None
    }
}

macro_rules! unobservable {
    ($($ty:ty),* $(,)?) => {
        $(impl ObservableItem for $ty {})*
    };
}

unobservable!(
    (), bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
    String, &'static str,
);

impl<T: ObservableItem + ?Sized> ObservableItem for Arc<T> {
    fn notifier(&self) -> Option<&dyn NotifyPropertyChanged> {
        (**self).notifier()
    }
}

impl<T: ObservableItem + ?Sized> ObservableItem for Box<T> {
    fn notifier(&self) -> Option<&dyn NotifyPropertyChanged> {
        (**self).notifier()
    }
}

impl ObservableItem for dyn PropertyHost {
    fn notifier(&self) -> Option<&dyn NotifyPropertyChanged> {
        self.as_notify()
    }
}

impl ObservableItem for Value {
    fn notifier(&self) -> Option<&dyn NotifyPropertyChanged> {
        self.as_object().and_then(|host| host.as_notify())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_notify_emits_name() {
        let notifier = PropertyChangedNotifier::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let received_clone = received.clone();
        notifier.property_changed().connect(move |change: &PropertyChanged| {
            received_clone.lock().push(change.name().to_string());
        });

        notifier.notify("width");
        notifier.notify("height");
        assert_eq!(*received.lock(), vec!["width", "height"]);
    }

    #[test]
    fn test_property_changed_is() {
        let change = PropertyChanged::new("Value");
        assert!(change.is("Value"));
        assert!(!change.is("value"));
    }

    #[test]
    fn test_scalars_have_no_notifier() {
        assert!(5i32.notifier().is_none());
        assert!(String::from("x").notifier().is_none());
        assert!(Arc::new(1.5f64).notifier().is_none());
        assert!(Value::from(3).notifier().is_none());
    }
}
