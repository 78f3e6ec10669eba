//! Value types exchanged with the build pipeline and the presentation layer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::FsError;
use super::mirror::FsMirror;
use super::path;
use super::tree::EntryKind;

/// Flat mapping from relative path to file payload.
///
/// Directories are implicit: a tree holding `build/top.json` implies a
/// `build` directory. Passed by value across the build worker boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileTree {
    #[serde(with = "crate::encoding::base64_map")]
    files: BTreeMap<String, Vec<u8>>,
}

impl FileTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the payload at `path`.
    pub fn insert(&mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), bytes.into());
    }

    pub fn with(mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(path, bytes);
        self
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn remove(&mut self, path: &str) -> Option<Vec<u8>> {
        self.files.remove(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files
            .iter()
            .map(|(path, bytes)| (path.as_str(), bytes.as_slice()))
    }

    /// Snapshot every file below `root` in the working tree. Symlinks are
    /// followed; dangling links are skipped.
    pub fn from_fs(fs: &FsMirror, root: &str) -> Result<Self, FsError> {
        let root = path::normalize(root)?;
        let mut tree = FileTree::new();
        collect(fs, &root, &root, &mut tree)?;
        Ok(tree)
    }

    /// Write every file into the working tree below `root`, creating parent
    /// directories and replacing existing payloads.
    pub fn write_to_fs(&self, fs: &FsMirror, root: &str) -> Result<(), FsError> {
        let root = path::normalize(root)?;
        for (relative, bytes) in self.iter() {
            let target = path::normalize(&path::join(&root, relative))?;
            if !path::is_within(&target, &root) || target == root {
                return Err(FsError::Validation(format!(
                    "'{}' escapes the build directory",
                    relative
                )));
            }
            fs.write_file(&target, bytes.to_vec())?;
        }
        Ok(())
    }
}

impl FromIterator<(String, Vec<u8>)> for FileTree {
    fn from_iter<I: IntoIterator<Item = (String, Vec<u8>)>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

fn collect(fs: &FsMirror, root: &str, dir: &str, tree: &mut FileTree) -> Result<(), FsError> {
    for name in fs.readdir(dir)? {
        let child = path::join(dir, &name);
        let kind = match fs.stat(&child) {
            Ok(kind) => kind,
            Err(FsError::NotFound { .. }) => continue,
            Err(err) => return Err(err),
        };
        match kind {
            EntryKind::Directory => collect(fs, root, &child, tree)?,
            _ => {
                if let Some(relative) = path::relative_to(&child, root) {
                    tree.insert(relative, fs.read_file(&child)?);
                }
            }
        }
    }
    Ok(())
}

/// Snapshot of one entry in a directory listing.
///
/// `children` is `None` for leaves and `Some` for directories, ordered
/// directories first, then by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTreeNode {
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FileTreeNode>>,
}

impl FileTreeNode {
    pub fn is_directory(&self) -> bool {
        self.children.is_some()
    }
}

pub(crate) fn sort_nodes(nodes: &mut [FileTreeNode]) {
    nodes.sort_by(|a, b| {
        b.is_directory()
            .cmp(&a.is_directory())
            .then_with(|| a.name.cmp(&b.name))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str) -> FileTreeNode {
        FileTreeNode {
            name: name.into(),
            path: format!("/root/{}", name),
            children: None,
        }
    }

    fn dir(name: &str) -> FileTreeNode {
        FileTreeNode {
            children: Some(Vec::new()),
            ..leaf(name)
        }
    }

    #[test]
    fn directories_sort_before_files() {
        let mut nodes = vec![leaf("a.txt"), dir("zeta"), leaf("B"), dir("alpha")];
        sort_nodes(&mut nodes);
        let names: Vec<_> = nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta", "B", "a.txt"]);
    }

    #[test]
    fn file_tree_serializes_payloads_as_base64() {
        let tree = FileTree::new().with("top.v", b"module".to_vec());
        let json = serde_json::to_string(&tree).unwrap();
        assert_eq!(json, r#"{"top.v":"bW9kdWxl"}"#);
        let back: FileTree = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tree);
    }
}
