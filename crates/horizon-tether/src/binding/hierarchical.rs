//! Bindings between dotted property paths.
//!
//! A [`HierarchicalBinding`] keeps the property at the end of a target path
//! in sync with the property at the end of a source path. Every object along
//! both paths is watched, so replacing an intermediate object re-resolves the
//! rest of the path and pushes the new value through.
//!
//! # Example
//!
//! ```
//! use horizon_tether::binding::{BindingMode, HierarchicalBinding};
//! use horizon_tether_core::{DynamicObject, ObjectRef, PropertyHost, Value};
//! use std::sync::Arc;
//!
//! let leaf: ObjectRef = Arc::new(DynamicObject::new("Leaf").with_property("Value", "first"));
//! let source = Arc::new(DynamicObject::new("Source").with_property("Other", leaf));
//! let target = Arc::new(DynamicObject::new("Target").with_property("Text", ""));
//!
//! let binding = HierarchicalBinding::builder()
//!     .source(source.clone(), "Other.Value")
//!     .target(target.clone(), "Text")
//!     .mode(BindingMode::OneWay)
//!     .build()
//!     .unwrap();
//! assert_eq!(target.get("Text"), Some(Value::from("first")));
//!
//! let replacement: ObjectRef = Arc::new(DynamicObject::new("Leaf").with_property("Value", "second"));
//! source.set_property("Other", replacement.into()).unwrap();
//! assert_eq!(target.get("Text"), Some(Value::from("second")));
//! # drop(binding);
//! ```

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use horizon_tether_core::logging::{span_names, targets};
use horizon_tether_core::{IntoObjectRef, ObjectRef, PerfSpan, PropertyError, PropertyHost, Value};
use parking_lot::{ReentrantMutex, RwLock};

use super::part::{ChangeSink, Chain, Rebind, Resolved};
use super::path::PropertyPath;
use crate::error::BindingError;

/// Nested propagations allowed on one thread before changes are dropped.
const MAX_DEPTH: usize = 32;

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Direction of data flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingMode {
    /// Source to target only. Edits made directly to the target are
    /// overwritten with the source's value.
    #[default]
    OneWay,
    /// Source to target and target to source.
    TwoWay,
}

/// Receives propagation failures.
pub type ErrorHook = Arc<dyn Fn(&PropertyError) + Send + Sync>;

struct DepthGuard;

impl DepthGuard {
    fn enter() -> Option<Self> {
        DEPTH.with(|depth| {
            if depth.get() >= MAX_DEPTH {
                None
            } else {
                depth.set(depth.get() + 1);
                Some(Self)
            }
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DEPTH.with(|depth| depth.set(depth.get() - 1));
    }
}

/// Marks the resolver busy until dropped.
struct Busy<'a>(&'a Cell<bool>);

impl<'a> Busy<'a> {
    fn enter(flag: &'a Cell<bool>) -> Option<Self> {
        if flag.replace(true) { None } else { Some(Self(flag)) }
    }
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

struct Chains {
    source: Chain,
    target: Chain,
}

struct Resolver {
    chains: RefCell<Chains>,
    busy: Cell<bool>,
    /// Changes reported while a propagation was running, in arrival order.
    deferred: RefCell<VecDeque<(usize, String)>>,
}

struct Inner {
    resolver: ReentrantMutex<Resolver>,
    sink: ChangeSink,
    mode: BindingMode,
    fallback: Option<Value>,
    error_hook: RwLock<Option<ErrorHook>>,
    disposed: AtomicBool,
    source_path: PropertyPath,
    target_path: PropertyPath,
}

impl Inner {
    fn report(&self, err: PropertyError) {
        tracing::warn!(
            target: targets::BINDING,
            source = %self.source_path,
            target_path = %self.target_path,
            error = %err,
            "binding propagation failed"
        );
        let hook = self.error_hook.read().clone();
        if let Some(hook) = hook {
            hook(&err);
        }
    }

    /// The value to push for a source state: the value itself, or the
    /// fallback when unresolved.
    fn effective(&self, resolved: &Resolved) -> Option<Value> {
        match resolved {
            Resolved::Value(value) => Some(value.clone()),
            _ => self.fallback.clone(),
        }
    }

    fn write(&self, chain: &mut Chain, value: &Value) {
        match chain.terminal_mut().write(value) {
            Ok(true) => tracing::trace!(target: targets::BINDING, value = %value, "value propagated"),
            Ok(false) => {}
            Err(err) => self.report(err),
        }
    }

    fn on_changed(&self, addr: usize, property: &str) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        let Some(_depth) = DepthGuard::enter() else {
            tracing::warn!(
                target: targets::BINDING,
                source = %self.source_path,
                target_path = %self.target_path,
                property,
                "binding propagation depth limit reached, change dropped"
            );
            return;
        };

        let resolver = self.resolver.lock();
        let Some(busy) = Busy::enter(&resolver.busy) else {
            tracing::trace!(target: targets::BINDING, property, "change deferred until the running propagation ends");
            resolver.deferred.borrow_mut().push_back((addr, property.to_owned()));
            return;
        };
        {
            let _perf = PerfSpan::new(span_names::BINDING);
            let mut chains = resolver.chains.borrow_mut();
            self.propagate(&mut chains, addr, property);
            self.settle(&resolver, &mut chains);
        }
        drop(busy);

        // dispose() called from inside the propagation leaves the release to us.
        if self.disposed.load(Ordering::Acquire) {
            let mut chains = resolver.chains.borrow_mut();
            chains.source.release();
            chains.target.release();
        }
    }

    fn propagate(&self, chains: &mut Chains, addr: usize, property: &str) {
        let mut report = |err| self.report(err);

        if let Some(index) = chains.source.find(addr, property) {
            if let Rebind::Resolved(resolved) = chains.source.reread(index, &self.sink, &mut report)
                && let Some(value) = self.effective(&resolved)
            {
                self.write(&mut chains.target, &value);
            }
            return;
        }

        if let Some(index) = chains.target.find(addr, property)
            && let Rebind::Resolved(Resolved::Value(value)) =
                chains.target.reread(index, &self.sink, &mut report)
        {
            match self.mode {
                BindingMode::TwoWay => self.write(&mut chains.source, &value),
                BindingMode::OneWay => {
                    if let Some(last) = self.effective(chains.source.terminal().resolved()) {
                        self.write(&mut chains.target, &last);
                    }
                }
            }
        }
    }

    /// Propagate the changes deferred while the chains were busy.
    ///
    /// Equal values are never written, so a feedback loop stops once the
    /// values agree; anything still queued after `MAX_DEPTH` rounds is
    /// dropped.
    fn settle(&self, resolver: &Resolver, chains: &mut Chains) {
        let mut rounds = 0;
        loop {
            let next = resolver.deferred.borrow_mut().pop_front();
            let Some((addr, property)) = next else {
                return;
            };
            if self.disposed.load(Ordering::Acquire) {
                resolver.deferred.borrow_mut().clear();
                return;
            }
            rounds += 1;
            if rounds > MAX_DEPTH {
                let dropped = resolver.deferred.borrow_mut().drain(..).count() + 1;
                tracing::warn!(
                    target: targets::BINDING,
                    source = %self.source_path,
                    target_path = %self.target_path,
                    dropped,
                    "binding did not settle, deferred changes dropped"
                );
                return;
            }
            self.propagate(chains, addr, &property);
        }
    }

    /// Run `f` with exclusive access to the chains, unless this thread is
    /// already propagating for this binding.
    fn with_chains<R>(&self, f: impl FnOnce(&mut Chains) -> R) -> Option<R> {
        let resolver = self.resolver.lock();
        let _busy = Busy::enter(&resolver.busy)?;
        let mut chains = resolver.chains.borrow_mut();
        let result = f(&mut chains);
        self.settle(&resolver, &mut chains);
        Some(result)
    }

    fn check(&self) -> Result<(), BindingError> {
        if self.disposed.load(Ordering::Acquire) {
            Err(BindingError::Disposed)
        } else {
            Ok(())
        }
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let resolver = self.resolver.lock();
        if resolver.busy.get() {
            return;
        }
        let mut chains = resolver.chains.borrow_mut();
        chains.source.release();
        chains.target.release();
        tracing::debug!(
            target: targets::BINDING,
            source = %self.source_path,
            target_path = %self.target_path,
            "binding disposed"
        );
    }
}

/// Keeps the property at the end of a target path in sync with the property
/// at the end of a source path.
///
/// Objects along both paths are held weakly. Dropping the binding, or calling
/// [`dispose`](Self::dispose), removes every subscription it made.
pub struct HierarchicalBinding {
    inner: Arc<Inner>,
}

impl HierarchicalBinding {
    /// Bind `target_path` on `target` to `source_path` on `source`.
    ///
    /// On success both paths are resolved and the target property holds the
    /// source value, or `fallback` if the source path does not resolve.
    ///
    /// # Errors
    ///
    /// Fails without subscribing to anything if a root object is missing or
    /// a path is empty or has an empty segment.
    pub fn new(
        source: Option<ObjectRef>,
        source_path: &str,
        target: Option<ObjectRef>,
        target_path: &str,
        mode: BindingMode,
        fallback: Option<Value>,
    ) -> Result<Self, BindingError> {
        Self::create(source, source_path, target, target_path, mode, fallback, None)
    }

    /// Start building a binding.
    pub fn builder() -> HierarchicalBindingBuilder {
        HierarchicalBindingBuilder::default()
    }

    fn create(
        source: Option<ObjectRef>,
        source_path: &str,
        target: Option<ObjectRef>,
        target_path: &str,
        mode: BindingMode,
        fallback: Option<Value>,
        error_hook: Option<ErrorHook>,
    ) -> Result<Self, BindingError> {
        let source = source.ok_or(BindingError::MissingSource)?;
        let source_path = PropertyPath::parse(source_path)?;
        let target = target.ok_or(BindingError::MissingTarget)?;
        let target_path = PropertyPath::parse(target_path)?;

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let weak = weak.clone();
            let sink: ChangeSink = Arc::new(move |addr, property| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_changed(addr, property);
                }
            });
            Inner {
                resolver: ReentrantMutex::new(Resolver {
                    chains: RefCell::new(Chains {
                        source: Chain::new(&source_path),
                        target: Chain::new(&target_path),
                    }),
                    busy: Cell::new(false),
                    deferred: RefCell::new(VecDeque::new()),
                }),
                sink,
                mode,
                fallback,
                error_hook: RwLock::new(error_hook),
                disposed: AtomicBool::new(false),
                source_path,
                target_path,
            }
        });

        inner.with_chains(|chains| {
            let mut report = |err| inner.report(err);
            chains.source.rebind(0, Some(source), &inner.sink, &mut report);
            chains.target.rebind(0, Some(target), &inner.sink, &mut report);
            if let Some(value) = inner.effective(chains.source.terminal().resolved()) {
                inner.write(&mut chains.target, &value);
            }
        });

        tracing::debug!(
            target: targets::BINDING,
            source = %inner.source_path,
            target_path = %inner.target_path,
            ?mode,
            "binding created"
        );
        Ok(Self { inner })
    }

    /// The binding's direction.
    pub fn mode(&self) -> BindingMode {
        self.inner.mode
    }

    /// The source path.
    pub fn source_path(&self) -> &PropertyPath {
        &self.inner.source_path
    }

    /// The target path.
    pub fn target_path(&self) -> &PropertyPath {
        &self.inner.target_path
    }

    /// The fallback pushed when the source path does not resolve.
    pub fn fallback(&self) -> Option<&Value> {
        self.inner.fallback.as_ref()
    }

    /// The source path's terminal value as last read.
    pub fn source_value(&self) -> Result<Resolved, BindingError> {
        self.inner.check()?;
        self.read_chains(|chains| chains.source.terminal().resolved().clone())
    }

    /// The target path's terminal value as last read.
    pub fn target_value(&self) -> Result<Resolved, BindingError> {
        self.inner.check()?;
        self.read_chains(|chains| chains.target.terminal().resolved().clone())
    }

    fn read_chains<R>(&self, f: impl FnOnce(&Chains) -> R) -> Result<R, BindingError> {
        let resolver = self.inner.resolver.lock();
        let chains = resolver.chains.try_borrow().map_err(|_| BindingError::Busy)?;
        Ok(f(&chains))
    }

    /// Re-resolve both paths from their roots and push the source value to
    /// the target.
    ///
    /// Useful for hosts that do not report changes.
    ///
    /// # Errors
    ///
    /// [`BindingError::Busy`] when called from inside this binding's own
    /// propagation, for example from its error hook.
    pub fn refresh(&self) -> Result<(), BindingError> {
        self.inner.check()?;
        let inner = &self.inner;
        inner.with_chains(|chains| {
            let mut report = |err| inner.report(err);
            chains.source.reread(0, &inner.sink, &mut report);
            chains.target.reread(0, &inner.sink, &mut report);
            if let Some(value) = inner.effective(chains.source.terminal().resolved()) {
                inner.write(&mut chains.target, &value);
            }
        })
        .ok_or(BindingError::Busy)
    }

    /// Push the target's current value to the source.
    ///
    /// # Errors
    ///
    /// [`BindingError::NotTwoWay`] for one-way bindings, and
    /// [`BindingError::Busy`] as for [`refresh`](Self::refresh).
    pub fn update_source(&self) -> Result<(), BindingError> {
        self.inner.check()?;
        if self.inner.mode != BindingMode::TwoWay {
            return Err(BindingError::NotTwoWay);
        }
        let inner = &self.inner;
        inner.with_chains(|chains| {
            let mut report = |err| inner.report(err);
            chains.target.reread(0, &inner.sink, &mut report);
            if let Some(value) = chains.target.terminal().resolved().value().cloned() {
                inner.write(&mut chains.source, &value);
            }
        })
        .ok_or(BindingError::Busy)
    }

    /// Install a callback for propagation failures, replacing any previous one.
    pub fn set_error_hook(&self, hook: impl Fn(&PropertyError) + Send + Sync + 'static) {
        *self.inner.error_hook.write() = Some(Arc::new(hook));
    }

    /// Remove every subscription. Later calls do nothing.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Returns `true` once [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Host types along the source path, for diagnostics. `None` marks a
    /// segment whose host is missing.
    pub fn source_hosts(&self) -> Result<Vec<Option<&'static str>>, BindingError> {
        self.inner.check()?;
        self.read_chains(|chains| {
            chains
                .source
                .parts()
                .iter()
                .map(|part| part.host().map(|host| host.type_name()))
                .collect()
        })
    }

    /// Number of segments, across both paths, receiving change reports.
    pub fn live_subscriptions(&self) -> Result<usize, BindingError> {
        self.inner.check()?;
        self.read_chains(|chains| {
            chains
                .source
                .parts()
                .iter()
                .chain(chains.target.parts())
                .filter(|part| part.is_subscribed())
                .count()
        })
    }
}

impl Drop for HierarchicalBinding {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl std::fmt::Debug for HierarchicalBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchicalBinding")
            .field("source", &self.inner.source_path.to_string())
            .field("target", &self.inner.target_path.to_string())
            .field("mode", &self.inner.mode)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

static_assertions::assert_impl_all!(HierarchicalBinding: Send, Sync);

/// Builder for [`HierarchicalBinding`].
#[derive(Default)]
pub struct HierarchicalBindingBuilder {
    source: Option<(ObjectRef, String)>,
    target: Option<(ObjectRef, String)>,
    mode: BindingMode,
    fallback: Option<Value>,
    error_hook: Option<ErrorHook>,
}

impl HierarchicalBindingBuilder {
    /// Set the source root and path.
    pub fn source(mut self, host: impl IntoObjectRef, path: impl Into<String>) -> Self {
        self.source = Some((host.into_object_ref(), path.into()));
        self
    }

    /// Set the target root and path.
    pub fn target(mut self, host: impl IntoObjectRef, path: impl Into<String>) -> Self {
        self.target = Some((host.into_object_ref(), path.into()));
        self
    }

    /// Set the direction. Defaults to [`BindingMode::OneWay`].
    pub fn mode(mut self, mode: BindingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Value pushed to the target while the source path does not resolve.
    pub fn fallback(mut self, value: impl Into<Value>) -> Self {
        self.fallback = Some(value.into());
        self
    }

    /// Callback for propagation failures.
    pub fn on_error(mut self, hook: impl Fn(&PropertyError) + Send + Sync + 'static) -> Self {
        self.error_hook = Some(Arc::new(hook));
        self
    }

    /// Create the binding.
    ///
    /// # Errors
    ///
    /// As [`HierarchicalBinding::new`].
    pub fn build(self) -> Result<HierarchicalBinding, BindingError> {
        let (source, source_path) = self.source.ok_or(BindingError::MissingSource)?;
        let (target, target_path) = self.target.ok_or(BindingError::MissingTarget)?;
        HierarchicalBinding::create(
            Some(source),
            &source_path,
            Some(target),
            &target_path,
            self.mode,
            self.fallback,
            self.error_hook,
        )
    }
}

impl std::fmt::Debug for HierarchicalBindingBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchicalBindingBuilder")
            .field("source", &self.source.as_ref().map(|(_, path)| path))
            .field("target", &self.target.as_ref().map(|(_, path)| path))
            .field("mode", &self.mode)
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}
