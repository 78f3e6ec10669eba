//! In-memory working tree.
//!
//! Every node is keyed by its normalized absolute path, so a directory's
//! subtree is a contiguous key range. Mutations append [`FsEvent`]s to a
//! pending list that the owner drains after releasing its lock.

use std::collections::BTreeMap;

use super::error::FsError;
use super::path;

const MAX_SYMLINK_DEPTH: usize = 8;

/// Node stored at one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    Directory,
    File(Vec<u8>),
    Symlink(String),
}

/// Kind of entry found by [`WorkingTree::lstat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    Symlink,
}

/// Structural change observed on the working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    MakeDirectory { path: String },
    MakeSymlink { path: String },
    Move { from: String, to: String },
    Delete { path: String },
    CloseFile { path: String },
}

impl FsEvent {
    /// Paths this event touches, for subscription matching.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        let (first, second) = match self {
            FsEvent::MakeDirectory { path }
            | FsEvent::MakeSymlink { path }
            | FsEvent::Delete { path }
            | FsEvent::CloseFile { path } => (path.as_str(), None),
            FsEvent::Move { from, to } => (from.as_str(), Some(to.as_str())),
        };
        std::iter::once(first).chain(second)
    }
}

#[derive(Debug)]
pub(crate) struct WorkingTree {
    nodes: BTreeMap<String, Node>,
    events: Vec<FsEvent>,
}

impl Default for WorkingTree {
    fn default() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Directory);
        Self {
            nodes,
            events: Vec::new(),
        }
    }
}

impl WorkingTree {
    pub fn take_events(&mut self) -> Vec<FsEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn lstat(&self, path: &str) -> Option<EntryKind> {
        self.nodes.get(path).map(|node| match node {
            Node::Directory => EntryKind::Directory,
            Node::File(_) => EntryKind::File,
            Node::Symlink(_) => EntryKind::Symlink,
        })
    }

    /// Kind of the entry after following symlinks.
    pub fn stat(&self, path: &str) -> Result<EntryKind, FsError> {
        let resolved = self.resolve(path)?;
        self.lstat(&resolved).ok_or_else(|| FsError::NotFound {
            path: path.to_string(),
        })
    }

    pub fn exists(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    /// Names of the direct children of `dir`, in byte order.
    pub fn readdir(&self, dir: &str) -> Result<Vec<String>, FsError> {
        let dir = self.resolve(dir)?;
        self.require_directory(&dir)?;
        Ok(self
            .descendants(&dir)
            .filter_map(|(child, _)| {
                let rest = path::relative_to(child, &dir)?;
                (!rest.contains('/')).then(|| rest.to_string())
            })
            .collect())
    }

    pub fn mkdir(&mut self, dir: &str) -> Result<(), FsError> {
        if self.exists(dir) {
            return Err(FsError::AlreadyExists {
                path: dir.to_string(),
            });
        }
        self.require_directory(path::dirname(dir))?;
        self.nodes.insert(dir.to_string(), Node::Directory);
        self.events.push(FsEvent::MakeDirectory {
            path: dir.to_string(),
        });
        Ok(())
    }

    /// Create `dir` and every missing ancestor. Existing directories are fine.
    pub fn mkdir_tree(&mut self, dir: &str) -> Result<(), FsError> {
        let mut current = String::from("/");
        for segment in dir.split('/').filter(|s| !s.is_empty()) {
            current = path::join(&current, segment);
            match self.nodes.get(&current) {
                Some(Node::Directory) => {}
                Some(_) => {
                    return Err(FsError::NotADirectory { path: current });
                }
                None => self.mkdir(&current)?,
            }
        }
        Ok(())
    }

    pub fn write_file(&mut self, file: &str, bytes: Vec<u8>) -> Result<(), FsError> {
        let target = self.resolve(file)?;
        match self.nodes.get(&target) {
            Some(Node::Directory) => {
                return Err(FsError::IsADirectory {
                    path: file.to_string(),
                })
            }
            Some(_) => {}
            None => self.require_directory(path::dirname(&target))?,
        }
        self.nodes.insert(target.clone(), Node::File(bytes));
        self.events.push(FsEvent::CloseFile { path: target });
        Ok(())
    }

    pub fn read_file(&self, file: &str) -> Result<Vec<u8>, FsError> {
        let target = self.resolve(file)?;
        match self.nodes.get(&target) {
            Some(Node::File(bytes)) => Ok(bytes.clone()),
            Some(_) => Err(FsError::IsADirectory {
                path: file.to_string(),
            }),
            None => Err(FsError::NotFound {
                path: file.to_string(),
            }),
        }
    }

    pub fn symlink(&mut self, target: &str, link: &str) -> Result<(), FsError> {
        if self.exists(link) {
            return Err(FsError::AlreadyExists {
                path: link.to_string(),
            });
        }
        self.require_directory(path::dirname(link))?;
        self.nodes
            .insert(link.to_string(), Node::Symlink(target.to_string()));
        self.events.push(FsEvent::MakeSymlink {
            path: link.to_string(),
        });
        Ok(())
    }

    pub fn readlink(&self, link: &str) -> Result<String, FsError> {
        match self.nodes.get(link) {
            Some(Node::Symlink(target)) => Ok(target.clone()),
            Some(_) => Err(FsError::Validation(format!("'{}' is not a symbolic link", link))),
            None => Err(FsError::NotFound {
                path: link.to_string(),
            }),
        }
    }

    /// Remove a file or symlink.
    pub fn unlink(&mut self, file: &str) -> Result<(), FsError> {
        match self.nodes.get(file) {
            Some(Node::Directory) => Err(FsError::IsADirectory {
                path: file.to_string(),
            }),
            Some(_) => {
                self.nodes.remove(file);
                self.events.push(FsEvent::Delete {
                    path: file.to_string(),
                });
                Ok(())
            }
            None => Err(FsError::NotFound {
                path: file.to_string(),
            }),
        }
    }

    /// Remove an empty directory.
    pub fn rmdir(&mut self, dir: &str) -> Result<(), FsError> {
        self.require_directory(dir)?;
        if dir == "/" || self.descendants(dir).next().is_some() {
            return Err(FsError::DirectoryNotEmpty {
                path: dir.to_string(),
            });
        }
        self.nodes.remove(dir);
        self.events.push(FsEvent::Delete {
            path: dir.to_string(),
        });
        Ok(())
    }

    /// Move a node and its whole subtree. The destination must not exist.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), FsError> {
        if !self.exists(from) {
            return Err(FsError::NotFound {
                path: from.to_string(),
            });
        }
        if self.exists(to) {
            return Err(FsError::AlreadyExists {
                path: to.to_string(),
            });
        }
        if path::is_within(to, from) {
            return Err(FsError::InvalidMove {
                from: from.to_string(),
            });
        }
        self.require_directory(path::dirname(to))?;

        let moved: Vec<String> = std::iter::once(from.to_string())
            .chain(self.descendants(from).map(|(key, _)| key.to_string()))
            .collect();
        for old in moved {
            if let Some(node) = self.nodes.remove(&old) {
                let new = match path::relative_to(&old, from) {
                    Some(rest) => path::join(to, rest),
                    None => to.to_string(),
                };
                self.nodes.insert(new, node);
            }
        }
        self.events.push(FsEvent::Move {
            from: from.to_string(),
            to: to.to_string(),
        });
        Ok(())
    }

    /// Entries strictly below `dir`, in key order.
    pub fn descendants<'a>(
        &'a self,
        dir: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a Node)> + 'a {
        let start = if dir == "/" {
            "/".to_string()
        } else {
            format!("{}/", dir)
        };
        self.nodes
            .range(start.clone()..)
            .take_while(move |(key, _)| key.starts_with(&start))
            .filter(move |(key, _)| key.as_str() != dir)
            .map(|(key, node)| (key.as_str(), node))
    }

    pub fn node(&self, path: &str) -> Option<&Node> {
        self.nodes.get(path)
    }

    fn require_directory(&self, dir: &str) -> Result<(), FsError> {
        match self.nodes.get(dir) {
            Some(Node::Directory) => Ok(()),
            Some(_) => Err(FsError::NotADirectory {
                path: dir.to_string(),
            }),
            None => Err(FsError::NotFound {
                path: dir.to_string(),
            }),
        }
    }

    /// Follow symlinks on the final component. Intermediate components are
    /// taken literally.
    fn resolve(&self, start: &str) -> Result<String, FsError> {
        let mut current = start.to_string();
        for _ in 0..MAX_SYMLINK_DEPTH {
            match self.nodes.get(&current) {
                Some(Node::Symlink(target)) => {
                    let joined = if target.starts_with('/') {
                        target.clone()
                    } else {
                        path::join(path::dirname(&current), target)
                    };
                    current = path::normalize(&joined)?;
                }
                _ => return Ok(current),
            }
        }
        Err(FsError::SymlinkLoop {
            path: start.to_string(),
        })
    }
}
