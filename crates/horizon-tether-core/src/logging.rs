//! Logging and debugging facilities for Horizon Tether.
//!
//! This module provides:
//! - Integration with the `tracing` crate for structured logging
//! - Debug visualization for object graphs reachable through properties
//! - Performance tracing hooks for profiling
//!
//! # Tracing Integration
//!
//! Horizon Tether uses the `tracing` crate for instrumentation. To see logs,
//! you need to install a tracing subscriber in your application:
//!
//! ```ignore
//! fn main() {
//!     tracing_subscriber::fmt()
//!         .with_env_filter("horizon_tether::binding=trace")
//!         .init();
//!
//!     // Your application code...
//! }
//! ```
//!
//! # Debug Visualization
//!
//! Use [`HostTreeDebug`] to dump a host and the objects its properties refer
//! to, which is handy when a dotted binding path does not resolve:
//!
//! ```
//! use horizon_tether_core::{DynamicObject, Value};
//! use horizon_tether_core::logging::HostTreeDebug;
//! use std::sync::Arc;
//!
//! let child = Arc::new(DynamicObject::new("Child").with_property("Value", "leaf"));
//! let root = DynamicObject::new("Root").with_property("Other", Value::object(child));
//!
//! let output = HostTreeDebug::new().format(&root);
//! assert!(output.contains("Other: Child"));
//! assert!(output.contains("Value = leaf"));
//! ```

use std::collections::HashSet;
use std::fmt::Write as FmtWrite;

use crate::host::PropertyHost;
use crate::value::{Value, host_addr};

/// Span names used throughout Horizon Tether for tracing.
///
/// These constants can be used to filter traces for specific subsystems.
pub mod span_names {
    /// Binding propagation span.
    pub const BINDING: &str = "horizon_tether::binding";
    /// Collection view refresh span.
    pub const REFRESH: &str = "horizon_tether::refresh";
    /// Dispatched task span.
    pub const DISPATCH: &str = "horizon_tether::dispatch";
}

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core target.
    pub const CORE: &str = "horizon_tether_core";
    /// Signal/slot system target.
    pub const SIGNAL: &str = "horizon_tether_core::signal";
    /// Property system target.
    pub const PROPERTY: &str = "horizon_tether_core::property";
    /// Dispatcher target.
    pub const DISPATCH: &str = "horizon_tether_core::dispatch";
    /// Binding resolver target.
    pub const BINDING: &str = "horizon_tether::binding";
    /// Observable collections target.
    pub const COLLECTIONS: &str = "horizon_tether::collections";
}

/// Style options for host tree visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeStyle {
    /// ASCII characters for tree branches.
    Ascii,
    /// Unicode box-drawing characters.
    #[default]
    Unicode,
}

/// Configuration for host tree debug output.
#[derive(Debug, Clone)]
pub struct TreeFormatOptions {
    /// The style of tree visualization.
    pub style: TreeStyle,
    /// Whether to show host addresses.
    pub show_addresses: bool,
    /// Maximum depth to traverse (None for unlimited).
    pub max_depth: Option<usize>,
}

impl Default for TreeFormatOptions {
    fn default() -> Self {
        Self {
            style: TreeStyle::default(),
            show_addresses: false,
            max_depth: Some(8),
        }
    }
}

impl TreeFormatOptions {
    /// Create options for detailed debugging output.
    pub fn detailed() -> Self {
        Self {
            show_addresses: true,
            max_depth: None,
            ..Default::default()
        }
    }
}

/// Debug utility for visualizing the object graph under a host.
///
/// Properties are listed in name order. Object-valued properties are
/// expanded recursively; a host already on the current path is printed but
/// not expanded again.
#[derive(Debug, Clone, Default)]
pub struct HostTreeDebug {
    options: TreeFormatOptions,
}

impl HostTreeDebug {
    /// Create a visualizer with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a visualizer with custom options.
    pub fn with_options(options: TreeFormatOptions) -> Self {
        Self { options }
    }

    /// Format `host` and everything reachable from it.
    pub fn format(&self, host: &dyn PropertyHost) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "{}", self.label(host));
        let mut path = HashSet::new();
        path.insert(host_addr(host));
        self.format_children(host, 1, "", &mut path, &mut output);
        output
    }

    fn label(&self, host: &dyn PropertyHost) -> String {
        if self.options.show_addresses {
            format!("{} @{:#x}", host.type_name(), host_addr(host))
        } else {
            host.type_name().to_string()
        }
    }

    fn format_children(
        &self,
        host: &dyn PropertyHost,
        depth: usize,
        prefix: &str,
        path: &mut HashSet<usize>,
        output: &mut String,
    ) {
        if self.options.max_depth.is_some_and(|max| depth > max) {
            let _ = writeln!(output, "{prefix}...");
            return;
        }

        let (branch, last_branch, pipe, blank) = match self.options.style {
            TreeStyle::Ascii => ("|-- ", "`-- ", "|   ", "    "),
            TreeStyle::Unicode => ("├── ", "└── ", "│   ", "    "),
        };

        let mut names = host.property_names();
        names.sort();
        let count = names.len();

        for (i, name) in names.into_iter().enumerate() {
            let is_last = i + 1 == count;
            let connector = if is_last { last_branch } else { branch };
            match host.get_property(&name) {
                Ok(Value::Object(child)) => {
                    let addr = host_addr(child.as_ref());
                    let _ = writeln!(output, "{prefix}{connector}{name}: {}", self.label(child.as_ref()));
                    if path.insert(addr) {
                        let child_prefix = format!("{prefix}{}", if is_last { blank } else { pipe });
                        self.format_children(child.as_ref(), depth + 1, &child_prefix, path, output);
                        path.remove(&addr);
                    }
                }
                Ok(value) => {
                    let _ = writeln!(output, "{prefix}{connector}{name} = {value}");
                }
                Err(err) => {
                    let _ = writeln!(output, "{prefix}{connector}{name} <{err}>");
                }
            }
        }
    }
}

/// A guard that keeps a tracing span entered until dropped.
///
/// This is useful for tracking the duration of operations.
#[derive(Debug)]
pub struct PerfSpan {
    _span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create a new performance span.
    ///
    /// The span will be active until the guard is dropped.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::debug_span!(target: "horizon_tether::perf", "perf", operation = name);
        Self {
            _span: span.entered(),
        }
    }
}

/// Macros for common tracing patterns.
///
/// These are re-exported for convenience but are just wrappers around
/// the `tracing` crate macros with consistent target naming.
#[macro_export]
macro_rules! tether_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "horizon_tether_core", $($arg)*)
    };
}

#[macro_export]
macro_rules! tether_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "horizon_tether_core", $($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::DynamicObject;
    use std::sync::Arc;

    fn chain() -> DynamicObject {
        let leaf = Arc::new(DynamicObject::new("Leaf").with_property("Value", "third"));
        let middle = Arc::new(
            DynamicObject::new("Middle")
                .with_property("Other", Value::object(leaf))
                .with_property("Count", 2),
        );
        DynamicObject::new("Root").with_property("Other", Value::object(middle))
    }

    #[test]
    fn test_tree_format_nested() {
        let output = HostTreeDebug::new().format(&chain());

        assert!(output.starts_with("Root\n"));
        assert!(output.contains("└── Other: Middle"));
        assert!(output.contains("Count = 2"));
        assert!(output.contains("Value = third"));
    }

    #[test]
    fn test_tree_format_ascii_and_depth() {
        let options = TreeFormatOptions {
            style: TreeStyle::Ascii,
            show_addresses: false,
            max_depth: Some(1),
        };
        let output = HostTreeDebug::with_options(options).format(&chain());

        assert!(output.contains("`-- Other: Middle"));
        assert!(output.contains("..."));
        assert!(!output.contains("third"));
    }

    #[test]
    fn test_tree_format_cycle_terminates() {
        let a = Arc::new(DynamicObject::new("A").with_property("Next", Value::Null));
        let b = Arc::new(DynamicObject::new("B").with_property("Next", Value::object(a.clone())));
        a.define("Next", Value::object(b), crate::host::PropertyAccess::READ_WRITE);

        let output = HostTreeDebug::with_options(TreeFormatOptions::detailed()).format(a.as_ref());
        assert_eq!(output.matches("Next: B").count(), 1);
        assert_eq!(output.matches("Next: A").count(), 1);

        // Break the cycle so both objects are freed.
        a.define("Next", Value::Null, crate::host::PropertyAccess::READ_WRITE);
    }

    #[test]
    fn test_perf_span() {
        let _span = PerfSpan::new("test_operation");
    }
}
