//! Path segments and the chains built from them.
//!
//! A [`BindingPart`] tracks one segment of a dotted path: the object it is
//! currently attached to, what that object allows for the segment's
//! property, the last value read, and the subscription that reports changes
//! back to the owning binding. A chain of parts is bound root first; each
//! part's host is the value resolved by the part before it.

use std::sync::{Arc, Weak};

use horizon_tether_core::logging::targets;
use horizon_tether_core::{
    ConnectionId, ConnectionType, ObjectRef, ObserverId, PropertyError, PropertyHost, Value, host_addr,
};

use super::path::PropertyPath;

/// Callback installed on hosts: receives the host's address and the name of
/// the property that changed.
pub(crate) type ChangeSink = Arc<dyn Fn(usize, &str) + Send + Sync>;

/// Resolution state of a path segment.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Resolved {
    /// The segment has never been bound.
    #[default]
    Uninitialized,
    /// The segment is bound but its host is missing or the property cannot
    /// be read.
    Unresolved,
    /// The property's value as last read.
    Value(Value),
}

impl Resolved {
    /// The resolved value, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Consume into the resolved value, if any.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Returns `true` if a value was resolved.
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    /// The object this segment resolved to, which hosts the next segment.
    fn object(&self) -> Option<ObjectRef> {
        self.value().and_then(Value::as_object).cloned()
    }
}

/// Result of binding a segment to a host.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Rebind {
    /// The host is the same object as before; nothing was re-subscribed.
    Unchanged,
    /// The chain was re-bound; carries the terminal segment's state.
    Resolved(Resolved),
}

/// How a part hears about changes on its host.
enum Subscription {
    /// Read once, no live updates.
    None,
    /// Connected to the host's change signal.
    Notify {
        host: Weak<dyn PropertyHost>,
        id: ConnectionId,
    },
    /// Registered as a per-property observer.
    Observe {
        host: Weak<dyn PropertyHost>,
        id: ObserverId,
    },
}

impl Subscription {
    /// Subscribe to changes on `host`, preferring its change signal.
    fn attach(host: &ObjectRef, property: &Arc<str>, sink: &ChangeSink) -> Self {
        let addr = host_addr(host.as_ref());

        if let Some(notify) = host.as_notify() {
            let sink = sink.clone();
            let id = notify
                .property_changed()
                .connect_with_type(move |change| sink(addr, change.name()), ConnectionType::Direct);
            return Self::Notify {
                host: Arc::downgrade(host),
                id,
            };
        }

        if let Some(observable) = host.as_observable() {
            let sink = sink.clone();
            let name = property.clone();
            if let Some(id) = observable.observe_property(property, Arc::new(move || sink(addr, &name))) {
                return Self::Observe {
                    host: Arc::downgrade(host),
                    id,
                };
            }
        }

        tracing::debug!(
            target: targets::BINDING,
            host = host.type_name(),
            property = &**property,
            "host reports no changes, value is read once"
        );
        Self::None
    }

    fn detach(&mut self, property: &str) {
        match std::mem::replace(self, Self::None) {
            Self::None => {}
            Self::Notify { host, id } => {
                if let Some(host) = host.upgrade()
                    && let Some(notify) = host.as_notify()
                {
                    notify.property_changed().disconnect(id);
                }
            }
            Self::Observe { host, id } => {
                if let Some(host) = host.upgrade()
                    && let Some(observable) = host.as_observable()
                {
                    observable.unobserve_property(property, id);
                }
            }
        }
    }

    fn is_live(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// One segment of a binding path.
pub struct BindingPart {
    property: Arc<str>,
    host: Option<Weak<dyn PropertyHost>>,
    /// Address of the host. The `Weak` keeps the allocation, so the address
    /// cannot be reused while the part holds it.
    host_addr: Option<usize>,
    can_get: bool,
    can_set: bool,
    resolved: Resolved,
    subscription: Subscription,
}

impl BindingPart {
    fn new(property: Arc<str>) -> Self {
        Self {
            property,
            host: None,
            host_addr: None,
            can_get: false,
            can_set: false,
            resolved: Resolved::Uninitialized,
            subscription: Subscription::None,
        }
    }

    /// The property this segment reads.
    pub fn property(&self) -> &str {
        &self.property
    }

    /// The object currently hosting this segment, if it is still alive.
    pub fn host(&self) -> Option<ObjectRef> {
        self.host.as_ref().and_then(Weak::upgrade)
    }

    /// Whether the property can be read on the current host.
    pub fn can_get(&self) -> bool {
        self.can_get
    }

    /// Whether the property can be written on the current host.
    pub fn can_set(&self) -> bool {
        self.can_set
    }

    /// The value last read for this segment.
    pub fn resolved(&self) -> &Resolved {
        &self.resolved
    }

    /// Whether the part receives live change reports from its host.
    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_live()
    }

    fn is_attached_to(&self, addr: usize) -> bool {
        self.host_addr == Some(addr)
    }

    /// Attach to `host`, or report [`Rebind::Unchanged`] if it already is.
    fn bind(
        &mut self,
        host: Option<ObjectRef>,
        sink: &ChangeSink,
        report: &mut dyn FnMut(PropertyError),
    ) -> Rebind {
        let addr = host.as_ref().map(|h| host_addr(h.as_ref()));
        if !matches!(self.resolved, Resolved::Uninitialized) && addr == self.host_addr {
            return Rebind::Unchanged;
        }

        self.release();
        self.host_addr = addr;
        self.can_get = false;
        self.can_set = false;
        self.resolved = Resolved::Unresolved;

        let Some(host) = host else {
            self.host = None;
            return Rebind::Resolved(Resolved::Unresolved);
        };
        self.host = Some(Arc::downgrade(&host));

        match host.property_access(&self.property) {
            Some(access) => {
                self.can_get = access.readable;
                self.can_set = access.writable;
                self.subscription = Subscription::attach(&host, &self.property, sink);
                self.resolved = self.read(&host, report);
            }
            None => {
                tracing::debug!(
                    target: targets::BINDING,
                    host = host.type_name(),
                    property = &*self.property,
                    "property not found, segment unresolved"
                );
                // A host with a change signal may define the property later.
                if host.as_notify().is_some() {
                    self.subscription = Subscription::attach(&host, &self.property, sink);
                }
            }
        }
        Rebind::Resolved(self.resolved.clone())
    }

    /// Read the property again from the current host.
    ///
    /// Access flags are refreshed first, so a property that appeared or
    /// vanished since the last read is seen as such.
    fn reread(&mut self, report: &mut dyn FnMut(PropertyError)) -> Resolved {
        self.resolved = match self.host() {
            Some(host) => {
                let access = host.property_access(&self.property);
                self.can_get = access.is_some_and(|a| a.readable);
                self.can_set = access.is_some_and(|a| a.writable);
                self.read(&host, report)
            }
            None => Resolved::Unresolved,
        };
        self.resolved.clone()
    }

    fn read(&self, host: &ObjectRef, report: &mut dyn FnMut(PropertyError)) -> Resolved {
        if !self.can_get {
            return Resolved::Unresolved;
        }
        match host.get_property(&self.property) {
            Ok(value) => Resolved::Value(value),
            Err(err) => {
                report(err);
                Resolved::Unresolved
            }
        }
    }

    /// Write `value` to the property.
    ///
    /// Does nothing if the property is not writable or already holds an
    /// equal value. Returns whether a write happened.
    pub(crate) fn write(&mut self, value: &Value) -> Result<bool, PropertyError> {
        if !self.can_set {
            return Ok(false);
        }
        let host = self.host().ok_or(PropertyError::HostDropped)?;
        if self.can_get {
            let current = host.get_property(&self.property)?;
            if current == *value {
                self.resolved = Resolved::Value(current);
                return Ok(false);
            }
        }
        host.set_property(&self.property, value.clone())?;
        if self.can_get {
            self.resolved = Resolved::Value(host.get_property(&self.property)?);
        }
        Ok(true)
    }

    fn release(&mut self) {
        self.subscription.detach(&self.property);
    }
}

impl std::fmt::Debug for BindingPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingPart")
            .field("property", &self.property)
            .field("host", &self.host().map(|h| h.type_name()))
            .field("can_get", &self.can_get)
            .field("can_set", &self.can_set)
            .field("resolved", &self.resolved)
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}

/// The parts of one dotted path, root first.
#[derive(Debug)]
pub(crate) struct Chain {
    parts: Vec<BindingPart>,
}

impl Chain {
    pub(crate) fn new(path: &PropertyPath) -> Self {
        Self {
            parts: path.segments().iter().cloned().map(BindingPart::new).collect(),
        }
    }

    pub(crate) fn parts(&self) -> &[BindingPart] {
        &self.parts
    }

    /// Bind part `index` to `host` and cascade through the rest of the chain.
    ///
    /// Stops at the first part whose host is unchanged.
    pub(crate) fn rebind(
        &mut self,
        index: usize,
        host: Option<ObjectRef>,
        sink: &ChangeSink,
        report: &mut dyn FnMut(PropertyError),
    ) -> Rebind {
        let mut index = index;
        let mut host = host;
        loop {
            match self.parts[index].bind(host, sink, report) {
                Rebind::Unchanged => return Rebind::Unchanged,
                Rebind::Resolved(resolved) => {
                    if index + 1 == self.parts.len() {
                        return Rebind::Resolved(resolved);
                    }
                    host = resolved.object();
                    index += 1;
                }
            }
        }
    }

    /// Re-read part `index` after its property changed and re-bind what
    /// follows it.
    pub(crate) fn reread(
        &mut self,
        index: usize,
        sink: &ChangeSink,
        report: &mut dyn FnMut(PropertyError),
    ) -> Rebind {
        let resolved = self.parts[index].reread(report);
        if index + 1 == self.parts.len() {
            Rebind::Resolved(resolved)
        } else {
            self.rebind(index + 1, resolved.object(), sink, report)
        }
    }

    /// The part attached to the host at `addr` for `property`.
    pub(crate) fn find(&self, addr: usize, property: &str) -> Option<usize> {
        self.parts
            .iter()
            .position(|part| part.is_attached_to(addr) && *part.property == *property)
    }

    pub(crate) fn terminal(&self) -> &BindingPart {
        &self.parts[self.parts.len() - 1]
    }

    pub(crate) fn terminal_mut(&mut self) -> &mut BindingPart {
        let last = self.parts.len() - 1;
        &mut self.parts[last]
    }

    /// Drop every subscription. Safe to call more than once.
    pub(crate) fn release(&mut self) {
        for part in &mut self.parts {
            part.release();
        }
    }
}
