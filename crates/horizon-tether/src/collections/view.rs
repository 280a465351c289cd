//! Shared machinery of the derived views.
//!
//! A view follows two kinds of events: structural changes of its source
//! collection, and property changes of the elements it holds. Both are
//! applied under one maintenance lock; the derived items live behind a
//! separate reader/writer lock so reads never wait on maintenance, and the
//! roster of element subscriptions behind a third.
//!
//! Source events carry the source's version. A view remembers the last
//! version it has applied, either incrementally or through a full refresh
//! from a snapshot, and ignores anything at or below it.

use std::sync::{Arc, Weak};

use horizon_tether_core::logging::{span_names, targets};
use horizon_tether_core::{ConnectionId, ConnectionType, ObservableItem, PerfSpan, Signal};
use parking_lot::{Mutex, RwLock};

use super::change::{CollectionChange, CollectionChanged};
use super::config::Delivery;
use super::observable::{ChangeQueue, CollectionItem, Notification, ObservableCollection};

/// A shared, type-erased observable collection, usable as a view's source.
pub type SharedCollection<T> = Arc<dyn ObservableCollection<T>>;

/// Bound for elements of derived views: collection items that may report
/// their own property changes.
pub trait ViewItem: CollectionItem + ObservableItem {}

impl<T: CollectionItem + ObservableItem> ViewItem for T {}

/// What distinguishes one kind of view from another.
pub(crate) trait ViewPolicy<T: ViewItem>: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Place an item that entered the source.
    fn insert(&self, items: &mut Vec<T>, item: T) -> Option<CollectionChange<T>>;

    /// Re-place `item` after it reported a change. It occurs `occurrences`
    /// times in the source.
    fn reevaluate(&self, items: &mut Vec<T>, item: &T, occurrences: usize) -> Vec<CollectionChange<T>>;

    /// Derive the view from the source's items.
    fn rebuild(&self, items: Vec<T>) -> Vec<T>;
}

struct ViewState<T> {
    items: Vec<T>,
    version: u64,
}

struct SyncState {
    /// Bumped on every source replacement; events from older sources are stale.
    generation: u64,
    /// Source version the view reflects.
    applied: u64,
    /// A refresh is pending and will cover incremental events.
    stale: bool,
    connection: Option<ConnectionId>,
}

struct Watch<T> {
    item: T,
    connection: Option<ConnectionId>,
}

impl<T: ViewItem> Watch<T> {
    fn release(self) {
        if let Some(id) = self.connection
            && let Some(notifier) = self.item.notifier()
        {
            notifier.property_changed().disconnect(id);
        }
    }
}

pub(crate) struct View<T: ViewItem, P> {
    policy: P,
    source: RwLock<SharedCollection<T>>,
    state: RwLock<ViewState<T>>,
    watched: Mutex<Vec<Watch<T>>>,
    sync: Mutex<SyncState>,
    queue: ChangeQueue<T>,
    this: Weak<Self>,
}

impl<T: ViewItem, P: ViewPolicy<T>> View<T, P> {
    pub(crate) fn new(source: SharedCollection<T>, policy: P, delivery: Delivery) -> Arc<Self> {
        let view = Arc::new_cyclic(|this| Self {
            policy,
            source: RwLock::new(source.clone()),
            state: RwLock::new(ViewState {
                items: Vec::new(),
                version: 0,
            }),
            watched: Mutex::new(Vec::new()),
            sync: Mutex::new(SyncState {
                generation: 0,
                applied: 0,
                stale: true,
                connection: None,
            }),
            queue: ChangeQueue::new(delivery),
            this: this.clone(),
        });
        {
            let mut sync = view.sync.lock();
            sync.connection = Some(view.connect(&source, sync.generation));
        }
        view.refresh();
        tracing::debug!(target: targets::COLLECTIONS, view = view.policy.name(), len = view.len(), "view created");
        view
    }

    pub(crate) fn policy(&self) -> &P {
        &self.policy
    }

    pub(crate) fn source(&self) -> SharedCollection<T> {
        self.source.read().clone()
    }

    fn connect(&self, source: &SharedCollection<T>, generation: u64) -> ConnectionId {
        let this = self.this.clone();
        source.collection_changed().connect_with_type(
            move |event| {
                if let Some(view) = this.upgrade() {
                    view.on_source_changed(generation, event);
                }
            },
            ConnectionType::Direct,
        )
    }

    /// Follow a different source and rebuild from it.
    pub(crate) fn set_source(&self, source: SharedCollection<T>) {
        {
            let mut sync = self.sync.lock();
            let old = std::mem::replace(&mut *self.source.write(), source.clone());
            if let Some(id) = sync.connection.take() {
                old.collection_changed().disconnect(id);
            }
            sync.generation += 1;
            sync.applied = 0;
            sync.stale = true;
            sync.connection = Some(self.connect(&source, sync.generation));
        }
        self.refresh();
    }

    /// Rebuild the view from a fresh snapshot of the source.
    ///
    /// Sends `Reset` followed by one `Add` covering the new contents.
    pub(crate) fn refresh(&self) {
        let _perf = PerfSpan::new(span_names::REFRESH);
        loop {
            let source = self.source();
            let (items, version) = source.versioned_snapshot();

            let mut sync = self.sync.lock();
            if !std::ptr::addr_eq(Arc::as_ptr(&source), Arc::as_ptr(&*self.source.read())) {
                continue;
            }
            if !sync.stale && sync.applied > version {
                // Events newer than the snapshot were applied meanwhile.
                continue;
            }
            sync.applied = version;
            sync.stale = false;

            self.rewatch(&items);
            let rebuilt = self.policy.rebuild(items);
            self.commit(|current| {
                *current = rebuilt;
                let mut changes = vec![CollectionChange::Reset];
                if !current.is_empty() {
                    changes.push(CollectionChange::Add {
                        index: 0,
                        items: current.clone(),
                    });
                }
                changes
            });
            drop(sync);

            tracing::debug!(target: targets::COLLECTIONS, view = self.policy.name(), source_version = version, "view refreshed");
            self.queue.drain();
            return;
        }
    }

    fn on_source_changed(&self, generation: u64, event: &CollectionChanged<T>) {
        let mut sync = self.sync.lock();
        if sync.generation != generation || sync.stale || event.version <= sync.applied {
            return;
        }
        if matches!(event.change, CollectionChange::Reset) || event.version != sync.applied + 1 {
            if event.version != sync.applied + 1 {
                tracing::debug!(
                    target: targets::COLLECTIONS,
                    view = self.policy.name(),
                    expected = sync.applied + 1,
                    got = event.version,
                    "missed source events, refreshing"
                );
            }
            drop(sync);
            self.refresh();
            return;
        }
        sync.applied = event.version;
        tracing::trace!(target: targets::COLLECTIONS, view = self.policy.name(), change = ?event.change.kind(), "source changed");

        match &event.change {
            CollectionChange::Add { items, .. } => {
                for item in items {
                    self.watch(item);
                }
                self.commit(|view| {
                    items
                        .iter()
                        .filter_map(|item| self.policy.insert(view, item.clone()))
                        .collect()
                });
            }
            CollectionChange::Remove { items, .. } => {
                for item in items {
                    self.unwatch(item);
                }
                self.commit(|view| items.iter().filter_map(|item| remove_one(view, item)).collect());
            }
            CollectionChange::Replace { old, new, .. } => {
                self.unwatch(old);
                self.watch(new);
                self.commit(|view| {
                    let mut changes = Vec::new();
                    changes.extend(remove_one(view, old));
                    changes.extend(self.policy.insert(view, new.clone()));
                    changes
                });
            }
            CollectionChange::Move { .. } | CollectionChange::Reset => {}
        }
        drop(sync);
        self.queue.drain();
    }

    fn on_item_changed(&self, item: &T) {
        let sync = self.sync.lock();
        if sync.stale {
            return;
        }
        let occurrences = self.watched.lock().iter().filter(|w| w.item == *item).count();
        if occurrences == 0 {
            return;
        }
        self.commit(|view| self.policy.reevaluate(view, item, occurrences));
        drop(sync);
        self.queue.drain();
    }

    /// Apply changes to the derived items and queue their notifications.
    fn commit(&self, apply: impl FnOnce(&mut Vec<T>) -> Vec<CollectionChange<T>>) {
        let notifications = {
            let mut state = self.state.write();
            let before = state.items.len();
            let changes = apply(&mut state.items);
            if changes.is_empty() {
                return;
            }
            let reset = changes.iter().any(|c| matches!(c, CollectionChange::Reset));
            let mut notifications = Vec::with_capacity(changes.len() + 1);
            for change in changes {
                state.version += 1;
                notifications.push(Notification::Changed(CollectionChanged::new(change, state.version)));
            }
            if reset || state.items.len() != before {
                notifications.push(Notification::Count(state.items.len()));
            }
            notifications
        };
        self.queue.push(notifications);
    }

    fn watch(&self, item: &T) {
        let connection = item.notifier().map(|notifier| {
            let this = self.this.clone();
            let key = item.clone();
            notifier.property_changed().connect_with_type(
                move |_| {
                    if let Some(view) = this.upgrade() {
                        view.on_item_changed(&key);
                    }
                },
                ConnectionType::Direct,
            )
        });
        self.watched.lock().push(Watch {
            item: item.clone(),
            connection,
        });
    }

    fn unwatch(&self, item: &T) {
        let removed = {
            let mut watched = self.watched.lock();
            watched
                .iter()
                .position(|w| w.item == *item)
                .map(|index| watched.swap_remove(index))
        };
        if let Some(watch) = removed {
            watch.release();
        }
    }

    fn rewatch(&self, items: &[T]) {
        let previous = std::mem::take(&mut *self.watched.lock());
        for watch in previous {
            watch.release();
        }
        for item in items {
            self.watch(item);
        }
    }

    /// Number of elements with a live change subscription.
    pub(crate) fn subscribed_items(&self) -> usize {
        self.watched.lock().iter().filter(|w| w.connection.is_some()).count()
    }
}

fn remove_one<T: PartialEq>(items: &mut Vec<T>, item: &T) -> Option<CollectionChange<T>> {
    let index = items.iter().position(|x| x == item)?;
    let removed = items.remove(index);
    Some(CollectionChange::Remove {
        index,
        items: vec![removed],
    })
}

impl<T: ViewItem, P: ViewPolicy<T>> ObservableCollection<T> for View<T, P> {
    fn len(&self) -> usize {
        self.state.read().items.len()
    }

    fn get(&self, index: usize) -> Option<T> {
        self.state.read().items.get(index).cloned()
    }

    fn index_of(&self, item: &T) -> Option<usize> {
        self.state.read().items.iter().position(|x| x == item)
    }

    fn versioned_snapshot(&self) -> (Vec<T>, u64) {
        let state = self.state.read();
        (state.items.clone(), state.version)
    }

    fn version(&self) -> u64 {
        self.state.read().version
    }

    fn collection_changed(&self) -> &Signal<CollectionChanged<T>> {
        self.queue.collection_changed()
    }

    fn count_changed(&self) -> &Signal<usize> {
        self.queue.count_changed()
    }
}

impl<T: ViewItem, P> Drop for View<T, P> {
    fn drop(&mut self) {
        if let Some(id) = self.sync.get_mut().connection.take() {
            self.source.get_mut().collection_changed().disconnect(id);
        }
        for watch in std::mem::take(self.watched.get_mut()) {
            watch.release();
        }
    }
}
