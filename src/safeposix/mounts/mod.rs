//! Pluggable storage and device backends.
//!
//! A backend implements only the capabilities it supports; every method of
//! [`Mount`] has a default that reports `ENOSYS` (or `ENOENT` for lookups),
//! so [`BaseMount`] with no overrides at all is a legal mount.
//!
//! A node returned by a lookup stays valid until the caller calls
//! [`Mount::forget_node`] on it; `ref_node` keeps it alive past that.
//!
//! Paths handed to a mount are relative to its mount point. They arrive
//! either as `"/"` for the mount root, `"/a/b"` for a nested mount, or
//! `"a/b"` for the root mount; [`path_components`] accepts all three.

pub mod buffer;
pub mod console;
pub mod dev;
pub mod hostfs;
pub mod kv;
pub mod memory;
pub mod pipe;
pub mod range;

pub use buffer::BufferMount;
pub use console::ConsoleMount;
pub use dev::DevMount;
pub use hostfs::HostFsMount;
pub use kv::KvMount;
pub use memory::MemMount;
pub use pipe::{OutboundBridge, PipeMount, PostMessageBridge};
pub use range::RangeMount;

use crate::interface::{syscall_error, DirEntry, Errno, NodeId, StatData};
use crate::safeposix::syscalls::fs_constants::MAX_FILE_SIZE;

pub trait Mount: Send + Sync {
    /// Looks up `path`; the returned stat's `st_ino` is the node id.
    fn get_node(&self, _path: &str) -> Result<StatData, Errno> {
        Err(syscall_error(Errno::ENOENT, "getnode", "no such path in this mount"))
    }

    fn ref_node(&self, _node: NodeId) {}

    fn unref_node(&self, _node: NodeId) {}

    /// Ends the claim a `get_node` or `creat` result has on its node. Callers
    /// forget every node they looked up, after taking a reference if they
    /// keep it. Backends that load nodes on lookup free unreferenced ones
    /// here.
    fn forget_node(&self, _node: NodeId) {}

    fn creat(&self, _path: &str, _mode: u32) -> Result<StatData, Errno> {
        Err(syscall_error(Errno::ENOSYS, "creat", "not supported by this mount"))
    }

    fn mkdir(&self, _path: &str, _mode: u32) -> Result<StatData, Errno> {
        Err(syscall_error(Errno::ENOSYS, "mkdir", "not supported by this mount"))
    }

    fn unlink(&self, _path: &str) -> Result<(), Errno> {
        Err(syscall_error(Errno::ENOSYS, "unlink", "not supported by this mount"))
    }

    fn rmdir(&self, _node: NodeId) -> Result<(), Errno> {
        Err(syscall_error(Errno::ENOSYS, "rmdir", "not supported by this mount"))
    }

    fn chmod(&self, _node: NodeId, _mode: u32) -> Result<(), Errno> {
        Err(syscall_error(Errno::ENOSYS, "chmod", "not supported by this mount"))
    }

    fn stat(&self, _node: NodeId) -> Result<StatData, Errno> {
        Err(syscall_error(Errno::ENOSYS, "stat", "not supported by this mount"))
    }

    fn fsync(&self, _node: NodeId) -> Result<(), Errno> {
        Err(syscall_error(Errno::ENOSYS, "fsync", "not supported by this mount"))
    }

    /// At most `count` entries starting at entry index `offset`.
    fn getdents(&self, _node: NodeId, _offset: usize, _count: usize) -> Result<Vec<DirEntry>, Errno> {
        Err(syscall_error(Errno::ENOSYS, "getdents", "not supported by this mount"))
    }

    fn read(&self, _node: NodeId, _offset: usize, _buf: &mut [u8]) -> Result<usize, Errno> {
        Err(syscall_error(Errno::ENOSYS, "read", "not supported by this mount"))
    }

    fn write(&self, _node: NodeId, _offset: usize, _buf: &[u8]) -> Result<usize, Errno> {
        Err(syscall_error(Errno::ENOSYS, "write", "not supported by this mount"))
    }

    fn truncate(&self, _node: NodeId, _length: usize) -> Result<(), Errno> {
        Err(syscall_error(Errno::ENOSYS, "truncate", "not supported by this mount"))
    }

    fn isatty(&self, _node: NodeId) -> bool {
        false
    }
}

/// A mount that supports nothing.
#[derive(Debug, Default)]
pub struct BaseMount;

impl Mount for BaseMount {}

/// Splits a mount-relative path into its non-empty components.
pub fn path_components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty() && *c != ".")
}

/// Splits a mount-relative path into its parent components and final name.
pub fn split_parent(path: &str) -> Option<(Vec<&str>, &str)> {
    let mut comps: Vec<&str> = path_components(path).collect();
    let name = comps.pop()?;
    Some((comps, name))
}

/// Resizes file contents held in memory, failing with `EFBIG` past
/// [`MAX_FILE_SIZE`] and with `ENOSPC` when the allocation itself fails.
pub fn resize_file(data: &mut Vec<u8>, len: usize, syscall: &str) -> Result<(), Errno> {
    if len > MAX_FILE_SIZE {
        return Err(syscall_error(Errno::EFBIG, syscall, "file would exceed the size limit"));
    }
    if len > data.len() {
        data.try_reserve(len - data.len())
            .map_err(|_| syscall_error(Errno::ENOSPC, syscall, "no memory left for file contents"))?;
    }
    data.resize(len, 0);
    Ok(())
}

/// Copies `buf` into `data` at `offset`, zero-filling any hole.
pub fn write_at(data: &mut Vec<u8>, offset: usize, buf: &[u8]) -> Result<usize, Errno> {
    if buf.is_empty() {
        return Ok(0);
    }
    let end = offset
        .checked_add(buf.len())
        .ok_or_else(|| syscall_error(Errno::EFBIG, "write", "write would pass the largest offset"))?;
    if data.len() < end {
        resize_file(data, end, "write")?;
    }
    data[offset..end].copy_from_slice(buf);
    Ok(buf.len())
}
