//! Core systems for Horizon Tether.
//!
//! This crate provides the foundations the binding and collection layers are
//! built on:
//!
//! - **Signal/Slot System**: Type-safe notification with direct or queued delivery
//! - **Property System**: Change-detecting property cells
//! - **Object Model**: Named property access ([`PropertyHost`]) and change
//!   notification ([`NotifyPropertyChanged`], [`ObservableProperties`])
//! - **Values**: The dynamically typed [`Value`] exchanged through named access
//! - **Dispatchers**: Execution contexts for marshaling callbacks onto one thread
//!
//! # Signal/Slot Example
//!
//! ```
//! use horizon_tether_core::{Signal, Property};
//!
//! // Create a signal that notifies when a value changes
//! let value_changed = Signal::<i32>::new();
//!
//! // Connect a slot to handle the signal
//! let conn_id = value_changed.connect(|value| {
//!     println!("Value changed to: {}", value);
//! });
//!
//! // Emit the signal
//! value_changed.emit(42);
//!
//! // Disconnect when done
//! value_changed.disconnect(conn_id);
//! ```
//!
//! # Property Host Example
//!
//! ```
//! use horizon_tether_core::{PropertyHost, Value};
//! use horizon_tether_macros::Bindable;
//!
//! #[derive(Bindable, Default)]
//! struct Person {
//!     #[property(name = "Name")]
//!     name: horizon_tether_core::Property<String>,
//!
//!     #[notify]
//!     notifier: horizon_tether_core::PropertyChangedNotifier,
//! }
//!
//! let person = Person::default();
//! person.set_property("Name", Value::from("Ada")).unwrap();
//! assert_eq!(person.name(), "Ada");
//! ```
//!
//! # Dispatcher Example
//!
//! ```
//! use horizon_tether_core::{DispatchQueue, Dispatcher};
//!
//! let ui = DispatchQueue::builder().name("ui").build();
//! ui.post(Box::new(|| println!("running on the ui thread"))).unwrap();
//! ui.shutdown();
//! ```

pub mod dispatch;
mod error;
pub mod host;
mod invocation;
pub mod logging;
pub mod notify;
pub mod property;
pub mod signal;
pub mod value;

pub use dispatch::{
    DispatchQueue, DispatchQueueBuilder, DispatchQueueConfig, Dispatcher, InlineDispatcher, Task,
};
pub use error::{DispatchError, PropertyError, PropertyResult};
pub use host::{
    DynamicObject, ObservableProperties, ObserverId, PropertyAccess, PropertyHost, PropertyObserver,
};
pub use logging::{HostTreeDebug, PerfSpan, TreeFormatOptions, TreeStyle};
pub use notify::{NotifyPropertyChanged, ObservableItem, PropertyChanged, PropertyChangedNotifier};
pub use property::Property;
pub use signal::{ConnectionId, ConnectionType, Signal};
pub use value::{FromValue, HostAny, IntoObjectRef, ObjectRef, Value, host_addr, same_host};
