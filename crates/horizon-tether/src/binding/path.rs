//! Dotted property paths.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::BindingError;

/// A parsed property path such as `Other.Other.Value`.
///
/// Segments are plain property names separated by dots. There is no
/// escaping and no indexer or method-call syntax.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyPath {
    segments: Vec<Arc<str>>,
}

impl PropertyPath {
    /// Parse a dotted path.
    ///
    /// # Errors
    ///
    /// [`BindingError::EmptyPath`] for an empty string and
    /// [`BindingError::EmptySegment`] for `"A..B"`, `".A"` or `"A."`.
    pub fn parse(path: &str) -> Result<Self, BindingError> {
        if path.is_empty() {
            return Err(BindingError::EmptyPath);
        }
        let mut segments = Vec::new();
        for (position, segment) in path.split('.').enumerate() {
            if segment.is_empty() {
                return Err(BindingError::EmptySegment {
                    path: path.to_owned(),
                    position,
                });
            }
            segments.push(Arc::from(segment));
        }
        Ok(Self { segments })
    }

    /// The property names, root first.
    pub fn segments(&self) -> &[Arc<str>] {
        &self.segments
    }

    /// Number of segments. Always at least one.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always `false`; a parsed path has at least one segment.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The final property name.
    pub fn terminal(&self) -> &str {
        self.segments.last().map(|s| &**s).unwrap_or_default()
    }
}

impl FromStr for PropertyPath {
    type Err = BindingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}
