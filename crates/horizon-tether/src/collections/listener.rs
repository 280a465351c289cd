//! Re-broadcasting wrappers.
//!
//! A listener subscribes to another object's notifications and repeats them
//! through its own signals on a chosen dispatcher, so consumers bound to one
//! thread can follow objects mutated from any thread.

use std::collections::HashSet;
use std::sync::Arc;

use horizon_tether_core::logging::targets;
use horizon_tether_core::{
    ConnectionId, ConnectionType, Dispatcher, IntoObjectRef, NotifyPropertyChanged, ObjectRef,
    PropertyChanged, Signal,
};
use parking_lot::Mutex;

use super::change::CollectionChanged;
use super::config::{CollectionConfig, Delivery};
use super::observable::{ChangeQueue, CollectionItem, Notification};
use super::view::SharedCollection;
use crate::error::{BindingError, CollectionError};

fn delivery(dispatcher: Arc<dyn Dispatcher>, asynchronous: bool) -> Delivery {
    if asynchronous {
        Delivery::Post(dispatcher)
    } else {
        Delivery::Invoke(dispatcher)
    }
}

/// Repeats a collection's notifications on a dispatcher.
///
/// # Example
///
/// ```
/// use horizon_tether::collections::{CollectionChangedListener, ConcurrentObservableList};
/// use horizon_tether_core::InlineDispatcher;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let list = Arc::new(ConcurrentObservableList::<i32>::new());
/// let listener = CollectionChangedListener::new(list.clone(), InlineDispatcher::shared(), false);
///
/// let seen = Arc::new(AtomicUsize::new(0));
/// let seen_clone = seen.clone();
/// listener.count_changed().connect(move |count| seen_clone.store(*count, Ordering::SeqCst));
///
/// list.add(7);
/// assert_eq!(seen.load(Ordering::SeqCst), 1);
/// ```
pub struct CollectionChangedListener<T: CollectionItem> {
    source: SharedCollection<T>,
    queue: Arc<ChangeQueue<T>>,
    connections: Mutex<Option<(ConnectionId, ConnectionId)>>,
}

impl<T: CollectionItem> CollectionChangedListener<T> {
    /// Follow `source`, re-emitting on `dispatcher`.
    ///
    /// With `asynchronous` the notifications are queued on the dispatcher;
    /// otherwise the source's notifying thread waits for them.
    pub fn new(source: SharedCollection<T>, dispatcher: Arc<dyn Dispatcher>, asynchronous: bool) -> Self {
        Self::attach(source, delivery(dispatcher, asynchronous))
    }

    /// Follow `source` with delivery chosen by a [`CollectionConfig`].
    ///
    /// # Errors
    ///
    /// As [`CollectionConfig`] resolution.
    pub fn with_config(source: SharedCollection<T>, config: CollectionConfig) -> Result<Self, CollectionError> {
        let delivery = config.resolve()?;
        Ok(Self::attach(source, delivery))
    }

    fn attach(source: SharedCollection<T>, delivery: Delivery) -> Self {
        let queue = Arc::new(ChangeQueue::new(delivery));

        let changes = queue.clone();
        let changed = source.collection_changed().connect_with_type(
            move |event: &CollectionChanged<T>| changes.deliver(Notification::Changed(event.clone())),
            ConnectionType::Direct,
        );
        let counts = queue.clone();
        let counted = source.count_changed().connect_with_type(
            move |count: &usize| counts.deliver(Notification::Count(*count)),
            ConnectionType::Direct,
        );
        tracing::debug!(target: targets::COLLECTIONS, delivery = ?queue, "collection listener attached");

        Self {
            source,
            queue,
            connections: Mutex::new(Some((changed, counted))),
        }
    }

    /// Re-emitted change notifications.
    pub fn collection_changed(&self) -> &Signal<CollectionChanged<T>> {
        self.queue.collection_changed()
    }

    /// Re-emitted count notifications.
    pub fn count_changed(&self) -> &Signal<usize> {
        self.queue.count_changed()
    }

    /// The collection being followed.
    pub fn source(&self) -> &SharedCollection<T> {
        &self.source
    }

    /// Returns `true` while still subscribed to the source.
    pub fn is_attached(&self) -> bool {
        self.connections.lock().is_some()
    }

    /// Stop following the source. Idempotent.
    pub fn detach(&self) {
        if let Some((changed, counted)) = self.connections.lock().take() {
            self.source.collection_changed().disconnect(changed);
            self.source.count_changed().disconnect(counted);
            tracing::debug!(target: targets::COLLECTIONS, "collection listener detached");
        }
    }
}

impl<T: CollectionItem> Drop for CollectionChangedListener<T> {
    fn drop(&mut self) {
        self.detach();
    }
}

impl<T: CollectionItem> std::fmt::Debug for CollectionChangedListener<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionChangedListener")
            .field("attached", &self.is_attached())
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

/// Repeats an object's property change notifications on a dispatcher.
pub struct PropertyChangedListener {
    host: ObjectRef,
    signal: Arc<Signal<PropertyChanged>>,
    connection: Mutex<Option<ConnectionId>>,
}

impl PropertyChangedListener {
    /// Follow every property of `host`.
    ///
    /// # Errors
    ///
    /// [`BindingError::NotNotifiable`] if the host has no change signal.
    pub fn new(
        host: impl IntoObjectRef,
        dispatcher: Arc<dyn Dispatcher>,
        asynchronous: bool,
    ) -> Result<Self, BindingError> {
        Self::attach(host.into_object_ref(), dispatcher, asynchronous, None)
    }

    /// Follow only the named properties of `host`.
    ///
    /// # Errors
    ///
    /// [`BindingError::NotNotifiable`] if the host has no change signal.
    pub fn with_filter<S: Into<String>>(
        host: impl IntoObjectRef,
        dispatcher: Arc<dyn Dispatcher>,
        asynchronous: bool,
        names: impl IntoIterator<Item = S>,
    ) -> Result<Self, BindingError> {
        let names = names.into_iter().map(Into::into).collect();
        Self::attach(host.into_object_ref(), dispatcher, asynchronous, Some(names))
    }

    fn attach(
        host: ObjectRef,
        dispatcher: Arc<dyn Dispatcher>,
        asynchronous: bool,
        names: Option<HashSet<String>>,
    ) -> Result<Self, BindingError> {
        let notify = host.as_notify().ok_or(BindingError::NotNotifiable {
            type_name: host.type_name(),
        })?;
        let signal = Arc::new(Signal::new());

        let forward = signal.clone();
        let connection = notify.property_changed().connect_with_type(
            move |change: &PropertyChanged| {
                if names.as_ref().is_some_and(|names| !names.contains(change.name())) {
                    return;
                }
                let forward = forward.clone();
                let change = change.clone();
                let task = Box::new(move || forward.emit(change));
                let result = if asynchronous {
                    dispatcher.post(task)
                } else {
                    dispatcher.invoke(task)
                };
                if let Err(err) = result {
                    tracing::warn!(target: targets::COLLECTIONS, dispatcher = dispatcher.name(), error = %err, "property notification dropped");
                }
            },
            ConnectionType::Direct,
        );

        Ok(Self {
            host,
            signal,
            connection: Mutex::new(Some(connection)),
        })
    }

    /// The object being followed.
    pub fn host(&self) -> &ObjectRef {
        &self.host
    }

    /// Returns `true` while still subscribed to the host.
    pub fn is_attached(&self) -> bool {
        self.connection.lock().is_some()
    }

    /// Stop following the host. Idempotent.
    pub fn detach(&self) {
        if let Some(id) = self.connection.lock().take()
            && let Some(notify) = self.host.as_notify()
        {
            notify.property_changed().disconnect(id);
        }
    }
}

impl NotifyPropertyChanged for PropertyChangedListener {
    fn property_changed(&self) -> &Signal<PropertyChanged> {
        &self.signal
    }
}

impl Drop for PropertyChangedListener {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for PropertyChangedListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyChangedListener")
            .field("host", &self.host)
            .field("attached", &self.is_attached())
            .finish()
    }
}

static_assertions::assert_impl_all!(PropertyChangedListener: Send, Sync);
static_assertions::assert_impl_all!(CollectionChangedListener<String>: Send, Sync);
