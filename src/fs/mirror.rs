//! Shared handle over the working tree, its mounts and its observers.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::error::FsError;
use super::file_tree::{sort_nodes, FileTreeNode};
use super::path;
use super::store::BackingStore;
use super::subscription::{PathPredicate, Subscription, SubscriptionRegistry};
use super::sync;
use super::tree::{EntryKind, WorkingTree};

/// Where the home directory and the native mount live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsLayout {
    pub home_directory: String,
    pub mount_directory: String,
}

impl Default for FsLayout {
    fn default() -> Self {
        Self {
            home_directory: "/root".to_string(),
            mount_directory: "/mnt".to_string(),
        }
    }
}

/// What `create_path` creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    File,
    Folder,
}

struct HomeMount {
    persist: Option<Subscription>,
}

struct NativeMount {
    store: Arc<dyn BackingStore>,
}

struct Shared {
    layout: FsLayout,
    tree: Mutex<WorkingTree>,
    subscriptions: Arc<SubscriptionRegistry>,
    persistent: Arc<dyn BackingStore>,
    auto_persist: bool,
    home: Mutex<Option<HomeMount>>,
    native: Mutex<Option<NativeMount>>,
}

/// Cloneable handle to the session's virtual filesystem.
///
/// Working-tree operations are synchronous and hold the tree lock only for
/// the duration of one call. Change events are dispatched after the lock
/// is released.
#[derive(Clone)]
pub struct FsMirror {
    shared: Arc<Shared>,
}

impl FsMirror {
    pub fn new(layout: FsLayout, persistent: Arc<dyn BackingStore>, auto_persist: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                layout,
                tree: Mutex::new(WorkingTree::default()),
                subscriptions: Arc::new(SubscriptionRegistry::default()),
                persistent,
                auto_persist,
                home: Mutex::new(None),
                native: Mutex::new(None),
            }),
        }
    }

    pub fn layout(&self) -> &FsLayout {
        &self.shared.layout
    }

    fn with_tree<R>(
        &self,
        op: impl FnOnce(&mut WorkingTree) -> Result<R, FsError>,
    ) -> Result<R, FsError> {
        let (result, events) = {
            let mut tree = self.shared.tree.lock();
            let result = op(&mut tree);
            (result, tree.take_events())
        };
        self.shared.subscriptions.dispatch(&events);
        result
    }

    fn read<R>(&self, op: impl FnOnce(&WorkingTree) -> R) -> R {
        op(&self.shared.tree.lock())
    }

    // --- working tree ---------------------------------------------------

    /// Recursive snapshot of the children of `root`.
    pub fn read_tree(&self, root: &str) -> Result<Vec<FileTreeNode>, FsError> {
        let root = path::normalize(root)?;
        self.read(|tree| build_nodes(tree, &root))
    }

    pub fn read_file(&self, file: &str) -> Result<Vec<u8>, FsError> {
        let file = path::normalize(file)?;
        self.read(|tree| tree.read_file(&file))
    }

    /// Replace (or create) the payload of a file whose parent exists.
    pub fn write_file(&self, file: &str, bytes: Vec<u8>) -> Result<(), FsError> {
        let file = path::normalize(file)?;
        self.with_tree(|tree| {
            tree.mkdir_tree(path::dirname(&file))?;
            tree.write_file(&file, bytes)
        })
    }

    pub fn readdir(&self, dir: &str) -> Result<Vec<String>, FsError> {
        let dir = path::normalize(dir)?;
        self.read(|tree| tree.readdir(&dir))
    }

    /// Entry kind after following symlinks.
    pub fn stat(&self, target: &str) -> Result<EntryKind, FsError> {
        let target = path::normalize(target)?;
        self.read(|tree| tree.stat(&target))
    }

    /// Entry kind without following symlinks.
    pub fn lstat(&self, target: &str) -> Result<Option<EntryKind>, FsError> {
        let target = path::normalize(target)?;
        Ok(self.read(|tree| tree.lstat(&target)))
    }

    pub fn create_path(
        &self,
        raw: &str,
        kind: PathKind,
        contents: Option<&[u8]>,
        dry_run: bool,
    ) -> Result<(), FsError> {
        validate_name(raw)?;
        let target = path::normalize(raw)?;
        self.ensure_does_not_exist(&target)?;
        if dry_run {
            return Ok(());
        }
        self.with_tree(|tree| match kind {
            PathKind::File => {
                tree.mkdir_tree(path::dirname(&target))?;
                tree.write_file(&target, contents.unwrap_or_default().to_vec())
            }
            PathKind::Folder => tree.mkdir_tree(&target),
        })
    }

    /// Remove `target` and, for directories, everything below it.
    pub fn delete_path(&self, target: &str) -> Result<(), FsError> {
        let target = path::normalize(target)?;
        if target == "/" {
            return Err(FsError::Validation(
                "The root directory cannot be deleted".to_string(),
            ));
        }
        self.with_tree(|tree| match tree.lstat(&target) {
            Some(EntryKind::Directory) => sync::remove_subtree(tree, &target),
            Some(_) => tree.unlink(&target),
            None => Err(FsError::NotFound { path: target.clone() }),
        })
    }

    pub fn duplicate_path(&self, source: &str, destination: &str, dry_run: bool) -> Result<(), FsError> {
        if source == destination {
            return Err(FsError::Validation("The path cannot be the same".to_string()));
        }
        let source = path::normalize(source)?;
        let destination = path::normalize(destination)?;
        if source == destination {
            return Err(FsError::Validation("The path cannot be the same".to_string()));
        }
        self.ensure_does_not_exist(&destination)?;
        if path::is_within(&destination, &source) {
            return Err(FsError::Validation(
                "A folder cannot be copied into itself".to_string(),
            ));
        }
        if dry_run {
            return Ok(());
        }
        self.with_tree(|tree| {
            if !tree.exists(&source) {
                return Err(FsError::NotFound { path: source.clone() });
            }
            copy_entry(tree, &source, &destination)
        })
    }

    pub fn rename_path(&self, source: &str, destination: &str, dry_run: bool) -> Result<(), FsError> {
        if source == destination {
            return Ok(());
        }
        let source = path::normalize(source)?;
        let destination = path::normalize(destination)?;
        if source == destination {
            return Ok(());
        }
        self.ensure_does_not_exist(&destination)?;
        if dry_run {
            return Ok(());
        }
        self.with_tree(|tree| tree.rename(&source, &destination))
    }

    fn ensure_does_not_exist(&self, target: &str) -> Result<(), FsError> {
        match self.read(|tree| tree.lstat(target)) {
            None => Ok(()),
            Some(kind) => {
                let noun = if kind == EntryKind::Directory { "folder" } else { "file" };
                Err(FsError::Validation(format!(
                    "A {} with the same name already exists",
                    noun
                )))
            }
        }
    }

    // --- observers ------------------------------------------------------

    pub fn subscribe_to_updates(
        &self,
        predicate: PathPredicate,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> Subscription {
        self.shared.subscriptions.subscribe(predicate, callback)
    }

    // --- mounts and synchronization -------------------------------------

    /// Create the home directory and fill it from the persistent store.
    ///
    /// If the store cannot be read or applied, home is left unmounted so
    /// later pushes never overwrite the saved snapshot.
    pub async fn mount_home(&self) -> Result<(), FsError> {
        let home = self.shared.layout.home_directory.clone();
        self.with_tree(|tree| tree.mkdir_tree(&home))?;

        let snapshot = self.shared.persistent.load().await.map_err(|err| {
            warn!(
                store = %self.shared.persistent.describe(),
                error = %err,
                "failed to read persistent store"
            );
            FsError::Store(err)
        })?;
        self.with_tree(|tree| sync::apply(tree, &home, &snapshot))
            .inspect_err(|err| warn!(error = %err, "failed to restore home directory"))?;

        let persist = self
            .shared
            .auto_persist
            .then(|| self.subscribe_to_updates(PathPredicate::under(home.clone()), persist_on_change(Arc::downgrade(&self.shared))));
        if let Some(previous) = self.shared.home.lock().replace(HomeMount { persist }) {
            if let Some(subscription) = previous.persist {
                subscription.dispose();
            }
        }
        info!(home = %home, store = %self.shared.persistent.describe(), "home directory mounted");
        Ok(())
    }

    pub fn is_home_mounted(&self) -> bool {
        self.shared.home.lock().is_some()
    }

    /// Attach a native directory at the mount point and pull its contents.
    pub async fn mount_native_fs(&self, store: Arc<dyn BackingStore>) -> Result<(), FsError> {
        {
            let mut slot = self.shared.native.lock();
            if slot.is_some() {
                return Err(FsError::AlreadyMounted);
            }
            *slot = Some(NativeMount {
                store: Arc::clone(&store),
            });
        }

        let mount = self.shared.layout.mount_directory.clone();
        let pulled = match store.load().await {
            Ok(snapshot) => self.with_tree(|tree| sync::apply(tree, &mount, &snapshot)),
            Err(err) => Err(FsError::Store(err)),
        };
        if let Err(err) = pulled {
            self.shared.native.lock().take();
            return Err(err);
        }
        info!(mount = %mount, native = %store.describe(), "native directory mounted");
        Ok(())
    }

    /// Push the mount one last time, then detach it and drop its subtree.
    pub async fn unmount_native_fs(&self) -> Result<(), FsError> {
        let mount = self.shared.native.lock().take().ok_or(FsError::NotMounted)?;
        let mount_dir = self.shared.layout.mount_directory.clone();
        self.push(&mount_dir, mount.store.as_ref()).await;
        self.with_tree(|tree| {
            if tree.exists(&mount_dir) {
                sync::remove_subtree(tree, &mount_dir)
            } else {
                Ok(())
            }
        })?;
        info!(native = %mount.store.describe(), "native directory unmounted");
        Ok(())
    }

    pub fn is_native_mounted(&self) -> bool {
        self.shared.native.lock().is_some()
    }

    /// Pull the native mount into the working tree. Failures are logged.
    pub async fn sync_fs_from_backing(&self) {
        let Some(store) = self.native_store() else {
            return;
        };
        let mount_dir = self.shared.layout.mount_directory.clone();
        match store.load().await {
            Ok(snapshot) => {
                if let Err(err) = self.with_tree(|tree| sync::apply(tree, &mount_dir, &snapshot)) {
                    warn!(error = %err, "failed to apply native directory");
                }
            }
            Err(err) => warn!(native = %store.describe(), error = %err, "failed to read native directory"),
        }
    }

    /// Push home to the persistent store and the mount to its directory.
    /// Failures are logged.
    pub async fn sync_fs_to_backing(&self) {
        self.push_home().await;
        if let Some(store) = self.native_store() {
            let mount_dir = self.shared.layout.mount_directory.clone();
            self.push(&mount_dir, store.as_ref()).await;
        }
    }

    async fn push_home(&self) {
        if !self.is_home_mounted() {
            return;
        }
        let home = self.shared.layout.home_directory.clone();
        let store = Arc::clone(&self.shared.persistent);
        self.push(&home, store.as_ref()).await;
    }

    async fn push(&self, root: &str, store: &dyn BackingStore) {
        let snapshot = self.read(|tree| sync::capture(tree, root));
        match store.save(&snapshot).await {
            Ok(()) => debug!(root, store = %store.describe(), entries = snapshot.entries.len(), "pushed"),
            Err(err) => warn!(root, store = %store.describe(), error = %err, "failed to push"),
        }
    }

    fn native_store(&self) -> Option<Arc<dyn BackingStore>> {
        self.shared
            .native
            .lock()
            .as_ref()
            .map(|mount| Arc::clone(&mount.store))
    }
}

fn persist_on_change(shared: Weak<Shared>) -> impl Fn() + Send + Sync + 'static {
    move || {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("no runtime; skipping automatic persist");
            return;
        };
        let mirror = FsMirror { shared };
        handle.spawn(async move { mirror.push_home().await });
    }
}

fn validate_name(raw: &str) -> Result<(), FsError> {
    if raw.len() > 1 && raw.ends_with('/') {
        return Err(FsError::Validation(
            "The file name must not include a slash".to_string(),
        ));
    }
    let name = path::basename(raw);
    if name.is_empty() || name == "." || name == ".." {
        return Err(FsError::Validation(
            "The file name must not be . or ..".to_string(),
        ));
    }
    Ok(())
}

fn build_nodes(tree: &WorkingTree, dir: &str) -> Result<Vec<FileTreeNode>, FsError> {
    let mut nodes = Vec::new();
    for name in tree.readdir(dir)? {
        let child = path::join(dir, &name);
        let children = match tree.lstat(&child) {
            Some(EntryKind::Directory) => Some(build_nodes(tree, &child)?),
            _ => None,
        };
        nodes.push(FileTreeNode {
            name,
            path: child,
            children,
        });
    }
    sort_nodes(&mut nodes);
    Ok(nodes)
}

fn copy_entry(tree: &mut WorkingTree, source: &str, destination: &str) -> Result<(), FsError> {
    match tree.lstat(source) {
        Some(EntryKind::Directory) => {
            tree.mkdir_tree(destination)?;
            for name in tree.readdir(source)? {
                copy_entry(tree, &path::join(source, &name), &path::join(destination, &name))?;
            }
            Ok(())
        }
        Some(EntryKind::Symlink) => {
            let target = tree.readlink(source)?;
            tree.symlink(&target, destination)
        }
        Some(EntryKind::File) => {
            let bytes = tree.read_file(source)?;
            tree.write_file(destination, bytes)
        }
        None => Err(FsError::NotFound {
            path: source.to_string(),
        }),
    }
}
