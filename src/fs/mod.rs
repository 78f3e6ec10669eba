//! Virtual filesystem mirror.
//!
//! An in-memory working tree (the single source of truth for the session)
//! kept in step with two kinds of backing storage:
//!
//! - the persistent store behind the home directory, restored on
//!   [`FsMirror::mount_home`] and written back after changes;
//! - at most one native host directory attached at the mount point.
//!
//! Observers register a [`PathPredicate`] and get one debounced
//! notification per scheduling tick when matching paths change.

mod error;
mod file_tree;
mod mirror;
pub mod path;
mod store;
mod subscription;
mod sync;
mod tree;

pub use error::{FsError, StoreError};
pub use file_tree::{FileTree, FileTreeNode};
pub use mirror::{FsLayout, FsMirror, PathKind};
pub use store::{BackingStore, DirectoryStore, MemoryStore, SnapshotStore, StoreSnapshot, StoredEntry};
pub use subscription::{PathPredicate, Subscription};
pub use tree::{EntryKind, FsEvent};
