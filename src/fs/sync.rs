//! Conversion between a working-tree subtree and a [`StoreSnapshot`].

use super::error::FsError;
use super::path;
use super::store::{StoreSnapshot, StoredEntry};
use super::tree::{Node, WorkingTree};

/// Capture everything below `root` (exclusive) as a snapshot.
pub(crate) fn capture(tree: &WorkingTree, root: &str) -> StoreSnapshot {
    let mut snapshot = StoreSnapshot::default();
    for (key, node) in tree.descendants(root) {
        let Some(relative) = path::relative_to(key, root) else {
            continue;
        };
        let entry = match node {
            Node::Directory => StoredEntry::Directory,
            Node::File(bytes) => StoredEntry::File {
                bytes: bytes.clone(),
            },
            Node::Symlink(target) => StoredEntry::Symlink {
                target: target.clone(),
            },
        };
        snapshot.entries.insert(relative.to_string(), entry);
    }
    snapshot
}

/// Make the subtree below `root` match `snapshot`.
///
/// Entries absent from the snapshot are removed, changed files are
/// rewritten, unchanged entries are left alone (no events for them).
pub(crate) fn apply(
    tree: &mut WorkingTree,
    root: &str,
    snapshot: &StoreSnapshot,
) -> Result<(), FsError> {
    tree.mkdir_tree(root)?;

    let local: Vec<(String, Node)> = tree
        .descendants(root)
        .map(|(key, node)| (key.to_string(), node.clone()))
        .collect();
    for (key, node) in local.iter().rev() {
        let Some(relative) = path::relative_to(key, root) else {
            continue;
        };
        let keep = match (snapshot.entries.get(relative), node) {
            (Some(StoredEntry::Directory), Node::Directory) => true,
            (Some(StoredEntry::File { .. }), Node::File(_)) => true,
            (Some(StoredEntry::Symlink { target }), Node::Symlink(current)) => target == current,
            _ => false,
        };
        if keep {
            continue;
        }
        match node {
            Node::Directory => remove_subtree(tree, key)?,
            _ => tree.unlink(key)?,
        }
    }

    for (relative, entry) in &snapshot.entries {
        let target = path::normalize(&path::join(root, relative))?;
        match entry {
            StoredEntry::Directory => {
                if !tree.exists(&target) {
                    tree.mkdir_tree(&target)?;
                }
            }
            StoredEntry::File { bytes } => {
                let unchanged = matches!(tree.node(&target), Some(Node::File(current)) if current == bytes);
                if !unchanged {
                    tree.mkdir_tree(path::dirname(&target))?;
                    tree.write_file(&target, bytes.clone())?;
                }
            }
            StoredEntry::Symlink { target: link_target } => {
                if !tree.exists(&target) {
                    tree.mkdir_tree(path::dirname(&target))?;
                    tree.symlink(link_target, &target)?;
                }
            }
        }
    }
    Ok(())
}

/// Remove `dir` and everything below it, children first.
pub(crate) fn remove_subtree(tree: &mut WorkingTree, dir: &str) -> Result<(), FsError> {
    let below: Vec<(String, bool)> = tree
        .descendants(dir)
        .map(|(key, node)| (key.to_string(), matches!(node, Node::Directory)))
        .collect();
    for (key, is_dir) in below.iter().rev() {
        if *is_dir {
            tree.rmdir(key)?;
        } else {
            tree.unlink(key)?;
        }
    }
    if tree.exists(dir) {
        tree.rmdir(dir)?;
    }
    Ok(())
}
