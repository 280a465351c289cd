//! Structured change events.

/// What changed in a collection.
///
/// Indices refer to the collection as it was when the change was applied:
/// `Add` and `Move::new_index` to the state after it, `Remove` and
/// `Move::old_index` to the state before it.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionChange<T> {
    /// `items` were inserted starting at `index`.
    Add {
        /// Position of the first inserted item.
        index: usize,
        /// The inserted items, in order.
        items: Vec<T>,
    },
    /// `items` were removed starting at `index`.
    Remove {
        /// Position of the first removed item.
        index: usize,
        /// The removed items, in order.
        items: Vec<T>,
    },
    /// The item at `index` was replaced.
    Replace {
        /// Position of the replaced item.
        index: usize,
        /// The previous item.
        old: T,
        /// The new item.
        new: T,
    },
    /// An item moved from `old_index` to `new_index`.
    Move {
        /// Position before the move.
        old_index: usize,
        /// Position after the move.
        new_index: usize,
        /// The moved item.
        item: T,
    },
    /// The contents changed wholesale; re-read everything.
    Reset,
}

/// Discriminant of a [`CollectionChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Items were inserted.
    Add,
    /// Items were removed.
    Remove,
    /// An item was replaced.
    Replace,
    /// An item moved.
    Move,
    /// The contents were reset.
    Reset,
}

impl<T> CollectionChange<T> {
    /// The kind of change.
    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Add { .. } => ChangeKind::Add,
            Self::Remove { .. } => ChangeKind::Remove,
            Self::Replace { .. } => ChangeKind::Replace,
            Self::Move { .. } => ChangeKind::Move,
            Self::Reset => ChangeKind::Reset,
        }
    }

    /// Returns `true` if the change alters the item count.
    ///
    /// `Reset` counts, since the new length is unknown to a listener.
    pub fn changes_count(&self) -> bool {
        matches!(self, Self::Add { .. } | Self::Remove { .. } | Self::Reset)
    }
}

/// A change together with the collection version it produced.
///
/// Versions increase by one per mutation of a collection instance, so a
/// listener that synchronised from a snapshot at version `v` can skip every
/// event with `version <= v`.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionChanged<T> {
    /// The change.
    pub change: CollectionChange<T>,
    /// The collection's version after the change.
    pub version: u64,
}

impl<T> CollectionChanged<T> {
    /// Pair a change with a version.
    pub fn new(change: CollectionChange<T>, version: u64) -> Self {
        Self { change, version }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_count() {
        let add = CollectionChange::Add {
            index: 0,
            items: vec![1],
        };
        let replace = CollectionChange::Replace {
            index: 0,
            old: 1,
            new: 2,
        };
        let moved = CollectionChange::Move {
            old_index: 0,
            new_index: 1,
            item: 1,
        };

        assert_eq!(add.kind(), ChangeKind::Add);
        assert!(add.changes_count());
        assert!(!replace.changes_count());
        assert!(!moved.changes_count());
        assert!(CollectionChange::<i32>::Reset.changes_count());
    }
}
