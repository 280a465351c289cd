//! Single-property bindings with eager validation.

use horizon_tether_core::{IntoObjectRef, ObjectRef, PropertyAccess, PropertyError, PropertyHost};

use super::hierarchical::{BindingMode, HierarchicalBinding};
use super::part::Resolved;
use crate::error::BindingError;

/// Binds one property of one object to one property of another.
///
/// Unlike [`HierarchicalBinding`], which tolerates paths that do not resolve
/// yet, a `PropertyBinding` checks up front that both properties exist and
/// support the requested direction.
///
/// # Example
///
/// ```
/// use horizon_tether::binding::{BindingMode, PropertyBinding};
/// use horizon_tether_core::{DynamicObject, PropertyHost, Value};
/// use std::sync::Arc;
///
/// let slider = Arc::new(DynamicObject::new("Slider").with_property("Position", 10));
/// let label = Arc::new(DynamicObject::new("Label").with_property("Text", 0));
///
/// let _binding = PropertyBinding::new(&slider, "Position", &label, "Text", BindingMode::OneWay).unwrap();
/// slider.set_property("Position", Value::from(25)).unwrap();
/// assert_eq!(label.get("Text"), Some(Value::from(25)));
/// ```
#[derive(Debug)]
pub struct PropertyBinding {
    binding: HierarchicalBinding,
}

impl PropertyBinding {
    /// Bind `target_property` on `target` to `source_property` on `source`.
    ///
    /// # Errors
    ///
    /// - [`BindingError::UnknownProperty`] if either property does not exist
    /// - [`BindingError::NotReadable`] / [`BindingError::NotWritable`] if a
    ///   property lacks the access the mode needs
    /// - [`BindingError::NotNotifiable`] if an object whose changes must be
    ///   followed reports none
    pub fn new(
        source: impl IntoObjectRef,
        source_property: &str,
        target: impl IntoObjectRef,
        target_property: &str,
        mode: BindingMode,
    ) -> Result<Self, BindingError> {
        let source = source.into_object_ref();
        let target = target.into_object_ref();
        let two_way = mode == BindingMode::TwoWay;

        check(&source, source_property, Requirement {
            read: true,
            write: two_way,
            notify: true,
        })?;
        check(&target, target_property, Requirement {
            read: two_way,
            write: true,
            notify: two_way,
        })?;

        let binding = HierarchicalBinding::new(Some(source), source_property, Some(target), target_property, mode, None)?;
        Ok(Self { binding })
    }

    /// The binding's direction.
    pub fn mode(&self) -> BindingMode {
        self.binding.mode()
    }

    /// The source property's value as last read.
    pub fn source_value(&self) -> Result<Resolved, BindingError> {
        self.binding.source_value()
    }

    /// The target property's value as last read.
    pub fn target_value(&self) -> Result<Resolved, BindingError> {
        self.binding.target_value()
    }

    /// Read the source again and push it to the target.
    pub fn refresh(&self) -> Result<(), BindingError> {
        self.binding.refresh()
    }

    /// Push the target's value to the source. Two-way bindings only.
    pub fn update_source(&self) -> Result<(), BindingError> {
        self.binding.update_source()
    }

    /// Install a callback for propagation failures.
    pub fn set_error_hook(&self, hook: impl Fn(&PropertyError) + Send + Sync + 'static) {
        self.binding.set_error_hook(hook);
    }

    /// Remove both subscriptions. Later calls do nothing.
    pub fn dispose(&self) {
        self.binding.dispose();
    }

    /// Returns `true` once disposed.
    pub fn is_disposed(&self) -> bool {
        self.binding.is_disposed()
    }
}

struct Requirement {
    read: bool,
    write: bool,
    notify: bool,
}

fn check(host: &ObjectRef, property: &str, required: Requirement) -> Result<PropertyAccess, BindingError> {
    if property.is_empty() {
        return Err(BindingError::EmptyPath);
    }
    let type_name = host.type_name();
    let access = host
        .property_access(property)
        .ok_or_else(|| BindingError::UnknownProperty {
            name: property.to_owned(),
            type_name,
        })?;

    if required.read && !access.readable {
        return Err(BindingError::NotReadable {
            name: property.to_owned(),
            type_name,
        });
    }
    if required.write && !access.writable {
        return Err(BindingError::NotWritable {
            name: property.to_owned(),
            type_name,
        });
    }
    if required.notify && host.as_notify().is_none() && host.as_observable().is_none() {
        return Err(BindingError::NotNotifiable { type_name });
    }
    Ok(access)
}

#[cfg(test)]
mod tests {
    use super::*;
    use horizon_tether_core::{DynamicObject, Property, PropertyChangedNotifier, Value};
    use horizon_tether_macros::Bindable;
    use std::sync::Arc;

    #[derive(Bindable, Default)]
    struct Plain {
        #[property(name = "Value")]
        value: Property<i32>,
    }

    #[derive(Bindable, Default)]
    struct Counter {
        #[property(name = "Count")]
        count: Property<i32>,

        #[property(name = "Total", read_only)]
        total: Property<i32>,

        #[notify]
        notifier: PropertyChangedNotifier,
    }

    #[test]
    fn test_unknown_property() {
        let a = Arc::new(Counter::default());
        let b = Arc::new(Counter::default());
        let err = PropertyBinding::new(&a, "Missing", &b, "Count", BindingMode::OneWay).unwrap_err();
        assert_eq!(
            err,
            BindingError::UnknownProperty {
                name: "Missing".into(),
                type_name: "Counter"
            }
        );
    }

    #[test]
    fn test_target_must_be_writable() {
        let a = Arc::new(Counter::default());
        let b = Arc::new(Counter::default());
        let err = PropertyBinding::new(&a, "Count", &b, "Total", BindingMode::OneWay).unwrap_err();
        assert!(matches!(err, BindingError::NotWritable { .. }));
    }

    #[test]
    fn test_two_way_needs_writable_source() {
        let a = Arc::new(Counter::default());
        let b = Arc::new(Counter::default());
        let err = PropertyBinding::new(&a, "Total", &b, "Count", BindingMode::TwoWay).unwrap_err();
        assert!(matches!(err, BindingError::NotWritable { .. }));

        // One-way only needs to read the source.
        assert!(PropertyBinding::new(&a, "Total", &b, "Count", BindingMode::OneWay).is_ok());
    }

    #[test]
    fn test_source_must_notify() {
        let silent = Arc::new(Plain::default());
        let b = Arc::new(Counter::default());
        let err = PropertyBinding::new(&silent, "Value", &b, "Count", BindingMode::OneWay).unwrap_err();
        assert_eq!(err, BindingError::NotNotifiable { type_name: "Plain" });

        // A silent target is fine one way, not two way.
        assert!(PropertyBinding::new(&b, "Count", &silent, "Value", BindingMode::OneWay).is_ok());
        let err = PropertyBinding::new(&b, "Count", &silent, "Value", BindingMode::TwoWay).unwrap_err();
        assert!(matches!(err, BindingError::NotNotifiable { .. }));
    }

    #[test]
    fn test_two_way_sync() {
        let a = Arc::new(Counter::default());
        let b = Arc::new(DynamicObject::new("Mirror").with_property("Count", 0));

        let binding = PropertyBinding::new(&a, "Count", &b, "Count", BindingMode::TwoWay).unwrap();
        a.set_count(3);
        assert_eq!(b.get("Count"), Some(Value::from(3)));

        b.set_property("Count", Value::from(8)).unwrap();
        assert_eq!(a.count(), 8);
        assert_eq!(binding.source_value().unwrap(), super::Resolved::Value(Value::from(8)));

        binding.dispose();
        a.set_count(1);
        assert_eq!(b.get("Count"), Some(Value::from(8)));
    }
}
