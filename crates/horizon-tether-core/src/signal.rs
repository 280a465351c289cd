//! Signals: multicast callbacks with per-connection delivery.
//!
//! Every notification in Horizon Tether travels through a [`Signal`]: hosts
//! emit `Signal<PropertyChanged>`, collections emit
//! `Signal<CollectionChanged<T>>` and `Signal<usize>` for their length.
//!
//! A connection decides where its slot runs:
//!
//! - [`ConnectionType::Direct`] runs the slot on the emitting thread;
//! - [`ConnectionType::Queued`] posts it to the dispatcher that was current
//!   when connecting;
//! - [`ConnectionType::Auto`] (the default) is direct on that dispatcher's
//!   thread and queued elsewhere;
//! - [`ConnectionType::BlockingQueued`] hands it to that dispatcher and waits.
//!
//! Connecting on a thread without a current dispatcher (see
//! [`crate::dispatch::current`]) leaves nowhere to queue to, so the slot is
//! run directly.
//!
//! Slots are copied out of the connection table before any of them runs. A
//! slot may connect, disconnect or emit on the signal it is called from; one
//! disconnected mid-emission may still see that emission.
//!
//! # Example
//!
//! ```
//! use horizon_tether_core::Signal;
//!
//! let renamed = Signal::<String>::new();
//! let id = renamed.connect(|name| println!("now called {name}"));
//!
//! renamed.emit("Ada".to_string());
//! assert!(renamed.disconnect(id));
//! assert_eq!(renamed.connection_count(), 0);
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::dispatch::{self, Dispatcher};
use crate::logging::targets;

new_key_type! {
    /// Identifies one connection; pass it to [`Signal::disconnect`].
    pub struct ConnectionId;
}

/// Where a connected slot runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionType {
    /// On the emitting thread, before `emit` returns.
    Direct,

    /// Posted to the dispatcher current at connect time.
    Queued,

    /// Direct on the captured dispatcher's thread, queued from anywhere else.
    #[default]
    Auto,

    /// Handed to the captured dispatcher; the emitter waits for it.
    ///
    /// Emitting from the dispatcher's own thread runs the slot inline.
    BlockingQueued,
}

type Slot<Args> = Arc<dyn Fn(&Args) + Send + Sync>;

#[derive(Clone)]
enum Route {
    Direct,
    Auto(Arc<dyn Dispatcher>),
    Queued(Arc<dyn Dispatcher>),
    Blocking(Arc<dyn Dispatcher>),
}

impl Route {
    fn for_type(connection_type: ConnectionType) -> Self {
        if connection_type == ConnectionType::Direct {
            return Self::Direct;
        }
        match (connection_type, dispatch::current()) {
            (_, None) | (ConnectionType::Direct, _) => Self::Direct,
            (ConnectionType::Auto, Some(d)) => Self::Auto(d),
            (ConnectionType::Queued, Some(d)) => Self::Queued(d),
            (ConnectionType::BlockingQueued, Some(d)) => Self::Blocking(d),
        }
    }
}

struct Connection<Args> {
    slot: Slot<Args>,
    route: Route,
}

/// A thread-safe list of slots called with `&Args` on every emission.
///
/// `Signal<Args>` is `Send + Sync`; emitting from several threads at once
/// runs the slots concurrently.
pub struct Signal<Args> {
    connections: Mutex<SlotMap<ConnectionId, Connection<Args>>>,
}

impl<Args: Clone + Send + 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: Clone + Send + 'static> Signal<Args> {
    /// A signal with no connections.
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(SlotMap::with_key()),
        }
    }

    /// Connect `slot` with [`ConnectionType::Auto`].
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.connect_with_type(slot, ConnectionType::Auto)
    }

    /// Connect `slot` with an explicit connection type.
    ///
    /// Bindings and views connect [`ConnectionType::Direct`] so that their
    /// bookkeeping happens on the thread that caused the change.
    pub fn connect_with_type<F>(&self, slot: F, connection_type: ConnectionType) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        let route = Route::for_type(connection_type);
        self.connections.lock().insert(Connection {
            slot: Arc::new(slot),
            route,
        })
    }

    /// Remove a connection. Returns `false` if it was already gone.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.connections.lock().remove(id).is_some()
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Call every connected slot with `args`, each along its own route.
    ///
    /// Queued routes receive a clone of `args`.
    #[tracing::instrument(skip_all, target = "horizon_tether_core::signal", level = "trace")]
    pub fn emit(&self, args: Args) {
        let slots: Vec<(Slot<Args>, Route)> = self
            .connections
            .lock()
            .values()
            .map(|conn| (conn.slot.clone(), conn.route.clone()))
            .collect();
        tracing::trace!(target: targets::SIGNAL, connection_count = slots.len(), "emitting signal");

        for (slot, route) in slots {
            match route {
                Route::Direct => slot(&args),
                Route::Auto(dispatcher) if dispatcher.is_current() => slot(&args),
                Route::Auto(dispatcher) | Route::Queued(dispatcher) => {
                    let queued = args.clone();
                    if let Err(err) = dispatcher.post(Box::new(move || slot(&queued))) {
                        tracing::warn!(target: targets::SIGNAL, %err, dispatcher = dispatcher.name(), "queued slot dropped");
                    }
                }
                Route::Blocking(dispatcher) => {
                    let queued = args.clone();
                    let queued_slot = slot.clone();
                    if let Err(err) = dispatcher.invoke(Box::new(move || queued_slot(&queued))) {
                        tracing::warn!(target: targets::SIGNAL, %err, dispatcher = dispatcher.name(), "blocking delivery failed, running slot here");
                        slot(&args);
                    }
                }
            }
        }
    }
}

impl<Args> std::fmt::Debug for Signal<Args> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("connections", &self.connections.lock().len())
            .finish()
    }
}

static_assertions::assert_impl_all!(Signal<String>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{DispatchQueue, set_current};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn recorder<T: Clone + Send + 'static>(signal: &Signal<T>) -> Arc<Mutex<Vec<T>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        signal.connect_with_type(move |value: &T| seen_clone.lock().push(value.clone()), ConnectionType::Direct);
        seen
    }

    #[test]
    fn test_emit_reaches_every_slot() {
        let signal = Signal::<i32>::new();
        let first = recorder(&signal);
        let second = recorder(&signal);

        signal.emit(42);
        signal.emit(100);

        assert_eq!(*first.lock(), vec![42, 100]);
        assert_eq!(*second.lock(), vec![42, 100]);
        assert_eq!(signal.connection_count(), 2);
    }

    #[test]
    fn test_disconnect() {
        let signal = Signal::<&'static str>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = seen.clone();
        let id = signal.connect(move |name| seen_clone.lock().push(*name));

        signal.emit("Width");
        assert!(signal.disconnect(id));
        assert!(!signal.disconnect(id));
        signal.emit("Height");

        assert_eq!(*seen.lock(), vec!["Width"]);
    }

    #[test]
    fn test_slot_can_disconnect_itself() {
        let signal = Arc::new(Signal::<i32>::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let own_id = Arc::new(Mutex::new(None));

        let signal_clone = signal.clone();
        let calls_clone = calls.clone();
        let own_id_clone = own_id.clone();
        let id = signal.connect(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = *own_id_clone.lock() {
                signal_clone.disconnect(id);
            }
        });
        *own_id.lock() = Some(id);

        signal.emit(1);
        signal.emit(2);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(signal.connection_count(), 0);
    }

    #[test]
    fn test_slot_can_emit_reentrantly() {
        let signal = Arc::new(Signal::<u32>::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let signal_clone = signal.clone();
        let seen_clone = seen.clone();
        signal.connect(move |&depth| {
            seen_clone.lock().push(depth);
            if depth < 3 {
                signal_clone.emit(depth + 1);
            }
        });

        signal.emit(0);
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_direct_runs_on_emitting_thread() {
        let signal = Arc::new(Signal::<i32>::new());
        let slot_thread = Arc::new(Mutex::new(None));

        let slot_thread_clone = slot_thread.clone();
        signal.connect_with_type(
            move |_| *slot_thread_clone.lock() = Some(std::thread::current().id()),
            ConnectionType::Direct,
        );

        let signal_clone = signal.clone();
        let emitter = std::thread::spawn(move || {
            signal_clone.emit(100);
            std::thread::current().id()
        })
        .join()
        .unwrap();

        assert_eq!(*slot_thread.lock(), Some(emitter));
    }

    #[test]
    fn test_queued_without_dispatcher_runs_directly() {
        let signal = Signal::<i32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = seen.clone();
        signal.connect_with_type(move |&value| seen_clone.lock().push(value), ConnectionType::Queued);

        signal.emit(42);
        assert_eq!(*seen.lock(), vec![42]);
    }

    #[test]
    fn test_blocking_queued_runs_on_dispatcher() {
        let queue = DispatchQueue::new();
        let previous = set_current(Some(queue.dispatcher()));

        let signal = Signal::<i32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let dispatcher = queue.dispatcher();
        signal.connect_with_type(
            move |&value| seen_clone.lock().push((value, dispatcher.is_current())),
            ConnectionType::BlockingQueued,
        );
        set_current(previous);

        signal.emit(7);
        assert_eq!(*seen.lock(), vec![(7, true)]);
        queue.shutdown();
    }

    #[test]
    fn test_auto_connection_captures_current_dispatcher() {
        let queue = DispatchQueue::new();
        let previous = set_current(Some(queue.dispatcher()));

        let signal = Signal::<i32>::new();
        let on_queue = Arc::new(AtomicBool::new(false));
        let on_queue_clone = on_queue.clone();
        let dispatcher = queue.dispatcher();
        signal.connect(move |_| on_queue_clone.store(dispatcher.is_current(), Ordering::SeqCst));
        set_current(previous);

        signal.emit(1);
        queue.shutdown();
        assert!(on_queue.load(Ordering::SeqCst));
    }

    #[test]
    fn test_concurrent_emitters() {
        let signal = Arc::new(Signal::<usize>::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = counter.clone();
        signal.connect_with_type(
            move |_| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            },
            ConnectionType::Direct,
        );

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let signal = signal.clone();
                std::thread::spawn(move || (0..100).for_each(|i| signal.emit(i)))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counter.load(Ordering::SeqCst), 1000);
    }
}
