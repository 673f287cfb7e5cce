//! Path-prefix routing over the mounted backends.

use std::ops::Deref;

use thiserror::Error;

use crate::interface::{self, syscall_error, Errno, StatData};
use crate::safeposix::filesystem::normpath;
use crate::safeposix::mounts::Mount;
use crate::safeposix::syscalls::fs_constants::is_dir;

/// Why `add_mount` refused a mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MountError {
    #[error("a mount is already registered at this path")]
    AlreadyMounted,
    #[error("mount path must be a non-empty absolute path")]
    BadPath,
    #[error("parent of the mount path does not exist")]
    ParentMissing,
}

impl MountError {
    /// Distinct negative code per reason.
    pub fn code(self) -> i32 {
        match self {
            MountError::AlreadyMounted => -1,
            MountError::BadPath => -3,
            MountError::ParentMissing => -4,
        }
    }

    pub fn errno(self) -> Errno {
        match self {
            MountError::AlreadyMounted => Errno::EBUSY,
            MountError::BadPath => Errno::EINVAL,
            MountError::ParentMissing => Errno::ENOENT,
        }
    }
}

/// A mounted backend plus its whole-mount reference count.
///
/// Open handles and child mounts each hold one reference; the mount cannot
/// be removed while any are outstanding.
pub struct MountPoint {
    path: String,
    mount: interface::RustRfc<dyn Mount>,
    refs: interface::RustAtomicUsize,
    parent: Option<interface::RustRfc<MountPoint>>,
}

impl MountPoint {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn mount(&self) -> &dyn Mount {
        &*self.mount
    }

    pub fn ref_mount(&self) {
        self.refs.fetch_add(1, interface::RustAtomicOrdering::SeqCst);
    }

    pub fn unref_mount(&self) {
        let _ = self.refs.fetch_update(
            interface::RustAtomicOrdering::SeqCst,
            interface::RustAtomicOrdering::SeqCst,
            |n| n.checked_sub(1),
        );
    }

    pub fn ref_count(&self) -> usize {
        self.refs.load(interface::RustAtomicOrdering::SeqCst)
    }
}

/// A mount reference taken while the mount table was locked, so the mount
/// cannot be removed between lookup and use. Dropping it returns the
/// reference; [`MountRef::keep`] passes it on to a longer-lived owner.
pub struct MountRef {
    mp: interface::RustRfc<MountPoint>,
    kept: bool,
}

impl MountRef {
    /// The caller now owns the reference and must `unref_mount` it.
    pub fn keep(mut self) -> interface::RustRfc<MountPoint> {
        self.kept = true;
        self.mp.clone()
    }
}

impl Deref for MountRef {
    type Target = MountPoint;

    fn deref(&self) -> &MountPoint {
        &self.mp
    }
}

impl Drop for MountRef {
    fn drop(&mut self) {
        if !self.kept {
            self.mp.unref_mount();
        }
    }
}

type MountTable = interface::RustBTreeMap<String, interface::RustRfc<MountPoint>>;

// Longest registered prefix owning `path`, and the part of `path` past it.
fn longest_match(mounts: &MountTable, path: &str) -> Option<(interface::RustRfc<MountPoint>, String)> {
    let (prefix, mp) = mounts
        .iter()
        .filter(|(prefix, _)| owns(prefix, path))
        .max_by_key(|(prefix, _)| prefix.len())?;
    let remainder = if path == prefix.as_str() {
        "/".to_string()
    } else {
        path[prefix.len()..].to_string()
    };
    Some((mp.clone(), remainder))
}

#[derive(Default)]
pub struct MountManager {
    mounts: interface::RustLock<MountTable>,
}

// `prefix` owns `path` when it is the root, the path itself, or a
// directory above it.
fn owns(prefix: &str, path: &str) -> bool {
    prefix == "/"
        || path == prefix
        || (path.starts_with(prefix) && path.as_bytes().get(prefix.len()) == Some(&b'/'))
}

impl MountManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `mount` at `path`. Every path but the root needs an existing
    /// directory at `path/..`.
    pub fn add_mount(&self, mount: interface::RustRfc<dyn Mount>, path: &str) -> Result<(), MountError> {
        if path.is_empty() || !path.starts_with('/') {
            return Err(MountError::BadPath);
        }
        let path = normpath(path, "/");

        let parent = if path == "/" {
            None
        } else {
            let (parent, st) = self
                .get_node(&normpath(&format!("{}/..", path), "/"))
                .map_err(|_| MountError::ParentMissing)?;
            parent.mount().forget_node(st.st_ino);
            if !is_dir(st.st_mode) {
                return Err(MountError::ParentMissing);
            }
            Some(parent)
        };

        let mut mounts = self.mounts.write();
        if mounts.contains_key(&path) {
            return Err(MountError::AlreadyMounted);
        }
        // the parent may have been unmounted since the lookup
        if let Some(parent) = &parent {
            let registered = mounts
                .get(parent.path())
                .map_or(false, |mp| interface::RustRfc::ptr_eq(mp, parent));
            if !registered {
                return Err(MountError::ParentMissing);
            }
        }
        if let Some(parent) = &parent {
            parent.ref_mount();
        }
        log::info!("mounted backend at {}", path);
        mounts.insert(
            path.clone(),
            interface::RustRfc::new(MountPoint {
                path,
                mount,
                refs: interface::RustAtomicUsize::new(0),
                parent,
            }),
        );
        Ok(())
    }

    /// Unregisters the mount at `path`, refusing while it is referenced.
    pub fn remove_mount(&self, path: &str) -> Result<(), Errno> {
        let path = normpath(path, "/");
        let mut mounts = self.mounts.write();
        let mp = match mounts.get(&path) {
            Some(mp) => mp,
            None => return Err(syscall_error(Errno::ENOENT, "umount", "nothing is mounted there")),
        };
        if mp.ref_count() > 0 {
            return Err(syscall_error(Errno::EBUSY, "umount", "mount is busy"));
        }
        if let Some(mp) = mounts.remove(&path) {
            if let Some(parent) = &mp.parent {
                parent.unref_mount();
            }
        }
        log::info!("unmounted {}", path);
        Ok(())
    }

    /// Removes every mount, innermost first, regardless of references.
    pub fn clear_mounts(&self) {
        let mut mounts = self.mounts.write();
        while let Some((path, _)) = mounts.pop_last() {
            log::info!("unmounted {}", path);
        }
    }

    /// Longest-prefix match. The remainder is `"/"` for an exact match and
    /// the part of `path` past the prefix otherwise.
    pub fn get_mount(&self, path: &str) -> Option<(interface::RustRfc<MountPoint>, String)> {
        longest_match(&self.mounts.read(), path)
    }

    /// Like `get_mount`, but the mount is referenced before the table lock
    /// is released. `remove_mount` refuses it until the reference is gone.
    pub fn get_mount_ref(&self, path: &str) -> Option<(MountRef, String)> {
        let mounts = self.mounts.read();
        let (mp, remainder) = longest_match(&mounts, path)?;
        mp.ref_mount();
        Some((MountRef { mp, kept: false }, remainder))
    }

    /// Resolves `path` to its mount and node. The caller forgets the node on
    /// its mount when done with it.
    pub fn get_node(&self, path: &str) -> Result<(interface::RustRfc<MountPoint>, StatData), Errno> {
        if path.is_empty() {
            return Err(syscall_error(Errno::ENOENT, "getnode", "empty path"));
        }
        let (mp, remainder) = self
            .get_mount(path)
            .ok_or_else(|| syscall_error(Errno::ENOENT, "getnode", "no mount covers this path"))?;
        if remainder.is_empty() {
            return Err(syscall_error(Errno::ENOENT, "getnode", "empty path within mount"));
        }
        let st = mp.mount().get_node(&remainder)?;
        Ok((mp, st))
    }

    /// True when `path` is a mount root or has a mount somewhere beneath it.
    pub fn in_mount_root_path(&self, path: &str) -> bool {
        let mounts = self.mounts.read();
        mounts.keys().any(|prefix| owns(path, prefix))
    }

    pub fn mount_paths(&self) -> Vec<String> {
        self.mounts.read().keys().cloned().collect()
    }
}
