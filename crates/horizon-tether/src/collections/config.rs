//! Notification delivery options.

use std::sync::Arc;

use horizon_tether_core::dispatch::{self, Dispatcher};

use crate::error::CollectionError;

/// How a collection delivers its change notifications.
///
/// The default delivers on the mutating thread, after the mutation and
/// outside the collection lock.
///
/// # Example
///
/// ```
/// use horizon_tether::collections::CollectionConfig;
/// use horizon_tether_core::DispatchQueue;
///
/// let ui = DispatchQueue::builder().name("ui").build();
/// let config = CollectionConfig::builder()
///     .dispatcher(ui.dispatcher())
///     .asynchronous(true)
///     .build()
///     .unwrap();
/// assert!(config.marshal);
/// # ui.shutdown();
/// ```
#[derive(Debug, Clone, Default)]
pub struct CollectionConfig {
    /// Deliver notifications on a dispatcher's thread.
    pub marshal: bool,
    /// Queue marshaled notifications instead of waiting for them.
    pub asynchronous: bool,
    /// Deliver inline while still holding the collection lock, so callbacks
    /// observe exactly the post-mutation state.
    pub hold_lock_during_notify: bool,
    /// Dispatcher to marshal to. When `None`, the dispatcher current on the
    /// constructing thread is captured.
    pub dispatcher: Option<Arc<dyn Dispatcher>>,
}

impl CollectionConfig {
    /// Inline delivery on the mutating thread.
    pub fn inline() -> Self {
        Self::default()
    }

    /// Start building a configuration.
    pub fn builder() -> CollectionConfigBuilder {
        CollectionConfigBuilder::default()
    }

    /// Reject contradictory combinations.
    ///
    /// # Errors
    ///
    /// [`CollectionError::InvalidConfig`] for asynchronous delivery without
    /// marshaling, or marshaling combined with holding the lock.
    pub fn validate(&self) -> Result<(), CollectionError> {
        if self.asynchronous && !self.marshal {
            return Err(CollectionError::InvalidConfig(
                "asynchronous delivery requires marshaling",
            ));
        }
        if self.hold_lock_during_notify && self.marshal {
            return Err(CollectionError::InvalidConfig(
                "holding the lock during notification requires inline delivery",
            ));
        }
        Ok(())
    }

    /// Validate and capture the dispatcher.
    pub(crate) fn resolve(&self) -> Result<Delivery, CollectionError> {
        self.validate()?;
        if !self.marshal {
            return Ok(Delivery::Inline);
        }
        let dispatcher = self
            .dispatcher
            .clone()
            .or_else(dispatch::current)
            .ok_or(CollectionError::NoExecutionContext)?;
        Ok(if self.asynchronous {
            Delivery::Post(dispatcher)
        } else {
            Delivery::Invoke(dispatcher)
        })
    }
}

/// Builder for [`CollectionConfig`].
#[derive(Debug, Default)]
pub struct CollectionConfigBuilder {
    config: CollectionConfig,
}

impl CollectionConfigBuilder {
    /// Deliver on a dispatcher's thread.
    pub fn marshal(mut self, marshal: bool) -> Self {
        self.config.marshal = marshal;
        self
    }

    /// Queue marshaled notifications instead of waiting.
    pub fn asynchronous(mut self, asynchronous: bool) -> Self {
        self.config.asynchronous = asynchronous;
        self
    }

    /// Deliver while holding the collection lock.
    pub fn hold_lock_during_notify(mut self, hold: bool) -> Self {
        self.config.hold_lock_during_notify = hold;
        self
    }

    /// Marshal to `dispatcher`. Implies [`marshal`](Self::marshal).
    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.config.marshal = true;
        self.config.dispatcher = Some(dispatcher);
        self
    }

    /// Finish, validating the combination.
    pub fn build(self) -> Result<CollectionConfig, CollectionError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Resolved delivery strategy.
#[derive(Clone)]
pub(crate) enum Delivery {
    /// Emit on the thread that drains the event queue.
    Inline,
    /// Hop to the dispatcher and wait.
    Invoke(Arc<dyn Dispatcher>),
    /// Hop to the dispatcher without waiting.
    Post(Arc<dyn Dispatcher>),
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inline => f.write_str("Inline"),
            Self::Invoke(d) => write!(f, "Invoke({})", d.name()),
            Self::Post(d) => write!(f, "Post({})", d.name()),
        }
    }
}
