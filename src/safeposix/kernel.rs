//! The kernel proxy context object.
//!
//! A `KernelProxy` owns everything one sandboxed process sees: the mount
//! table, the descriptor and handle tables, the socket subsystem and the
//! working directory. There is no global instance; embedders construct one
//! through [`kernelinit`](crate::safeposix::dispatcher::kernelinit) and pass it
//! around. The syscalls themselves live in `syscalls::fs_calls` and
//! `syscalls::net_calls`.

use crate::config::KernelConfig;
use crate::interface::{self, syscall_error, Coordinator, Errno, HostNetwork, NodeId, SlotAllocator, SlotHandle, StatData};
use crate::safeposix::filesystem::normpath;
use crate::safeposix::mount_manager::{MountManager, MountPoint};
use crate::safeposix::mounts::Mount;
use crate::safeposix::net::{SocketId, SocketSubsystem};
use crate::safeposix::syscalls::fs_constants::*;

/// An open file description, shared by every descriptor dup'ed from it.
pub struct FileHandle {
    pub mount: interface::RustRfc<MountPoint>,
    pub node: NodeId,
    /// File type bits of the node at open time.
    pub filetype: u32,
    pub flags: interface::RustAtomicI32,
    // guards the offset and serializes transfers through this handle
    pub offset: interface::Mutex<usize>,
}

impl FileHandle {
    pub fn flags(&self) -> i32 {
        self.flags.load(interface::RustAtomicOrdering::SeqCst)
    }

    pub fn is_dir(&self) -> bool {
        self.filetype == S_IFDIR
    }

    pub fn readable(&self) -> bool {
        !is_wronly(self.flags())
    }

    pub fn writable(&self) -> bool {
        !is_rdonly(self.flags())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileDescriptor {
    File(SlotHandle),
    Socket(SocketId),
}

/// A node found by path. Dropping it forgets the node on its mount.
pub(crate) struct NodeLookup {
    pub mp: interface::RustRfc<MountPoint>,
    pub remainder: String,
    pub st: StatData,
}

impl Drop for NodeLookup {
    fn drop(&mut self) {
        self.mp.mount().forget_node(self.st.st_ino);
    }
}

/// Forgets a node on drop, for lookups made straight on a mount.
pub(crate) struct NodePin<'a> {
    pub mount: &'a dyn Mount,
    pub node: NodeId,
}

impl Drop for NodePin<'_> {
    fn drop(&mut self) {
        self.mount.forget_node(self.node);
    }
}

pub struct HandleSlot {
    pub handle: interface::RustRfc<FileHandle>,
    pub refs: usize,
}

#[derive(Default)]
pub struct FdTables {
    pub fds: SlotAllocator<FileDescriptor>,
    pub handles: SlotAllocator<HandleSlot>,
}

pub struct KernelProxy {
    pub(crate) config: KernelConfig,
    pub(crate) mounts: MountManager,
    pub(crate) coordinator: Coordinator,
    pub(crate) net: SocketSubsystem,
    pub(crate) cwd: interface::RustLock<String>,
    pub(crate) tables: interface::Mutex<FdTables>,
}

impl KernelProxy {
    /// A proxy with nothing mounted and no descriptors open.
    pub fn new(config: KernelConfig, coordinator: Coordinator, network: interface::RustRfc<dyn HostNetwork>) -> Self {
        let net = SocketSubsystem::new(coordinator.clone(), network, config.socket_buffer_size);
        let cwd = normpath(&config.initial_cwd, "/");
        KernelProxy {
            config,
            mounts: MountManager::new(),
            coordinator,
            net,
            cwd: interface::RustLock::new(cwd),
            tables: interface::Mutex::new(FdTables::default()),
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn mount_manager(&self) -> &MountManager {
        &self.mounts
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn sockets(&self) -> &SocketSubsystem {
        &self.net
    }

    /// Number of open descriptors.
    pub fn open_fds(&self) -> usize {
        self.tables.lock().fds.len()
    }

    /// Absolute, normalized form of `path` against the working directory.
    pub(crate) fn resolve(&self, path: &str, syscall: &str) -> Result<String, Errno> {
        if path.is_empty() {
            return Err(syscall_error(Errno::ENOENT, syscall, "empty path"));
        }
        let abs = normpath(path, &self.cwd.read());
        if abs.len() > self.config.max_path_len {
            return Err(syscall_error(Errno::ENAMETOOLONG, syscall, "path is too long"));
        }
        Ok(abs)
    }

    /// Resolves an absolute path to its mount, mount-relative remainder and
    /// node.
    pub(crate) fn lookup(&self, abs: &str, syscall: &str) -> Result<NodeLookup, Errno> {
        let (mp, remainder) = self
            .mounts
            .get_mount(abs)
            .ok_or_else(|| syscall_error(Errno::ENOENT, syscall, "no mount covers this path"))?;
        let st = mp.mount().get_node(&remainder)?;
        Ok(NodeLookup { mp, remainder, st })
    }

    fn check_capacity(&self, tables: &FdTables, syscall: &str) -> Result<(), Errno> {
        if tables.fds.len() >= self.config.max_fds {
            return Err(syscall_error(Errno::EMFILE, syscall, "descriptor table is full"));
        }
        Ok(())
    }

    /// Allocates a handle and the lowest free descriptor for it. The node and
    /// mount must already be referenced by the caller.
    pub(crate) fn install_handle(&self, handle: FileHandle, syscall: &str) -> Result<i32, Errno> {
        let mut tables = self.tables.lock();
        self.check_capacity(&tables, syscall)?;
        let slot = tables.handles.insert_handle(HandleSlot {
            handle: interface::RustRfc::new(handle),
            refs: 1,
        });
        Ok(tables.fds.insert(FileDescriptor::File(slot)) as i32)
    }

    pub(crate) fn install_socket(&self, id: SocketId, syscall: &str) -> Result<i32, Errno> {
        let mut tables = self.tables.lock();
        self.check_capacity(&tables, syscall)?;
        Ok(tables.fds.insert(FileDescriptor::Socket(id)) as i32)
    }

    pub(crate) fn get_fd(&self, fd: i32, syscall: &str) -> Result<FileDescriptor, Errno> {
        let tables = self.tables.lock();
        usize::try_from(fd)
            .ok()
            .and_then(|index| tables.fds.at(index))
            .copied()
            .ok_or_else(|| syscall_error(Errno::EBADF, syscall, "invalid file descriptor"))
    }

    /// The open file behind `fd`; sockets are reported with `socket_errno`.
    pub(crate) fn get_file(
        &self,
        fd: i32,
        syscall: &str,
        socket_errno: Errno,
    ) -> Result<interface::RustRfc<FileHandle>, Errno> {
        let tables = self.tables.lock();
        let desc = usize::try_from(fd)
            .ok()
            .and_then(|index| tables.fds.at(index))
            .ok_or_else(|| syscall_error(Errno::EBADF, syscall, "invalid file descriptor"))?;
        match desc {
            FileDescriptor::File(slot) => tables
                .handles
                .get(*slot)
                .map(|s| s.handle.clone())
                .ok_or_else(|| syscall_error(Errno::EBADF, syscall, "stale file handle")),
            FileDescriptor::Socket(_) => Err(syscall_error(socket_errno, syscall, "descriptor is a socket")),
        }
    }

    pub(crate) fn get_socket(&self, fd: i32, syscall: &str) -> Result<SocketId, Errno> {
        match self.get_fd(fd, syscall)? {
            FileDescriptor::Socket(id) => Ok(id),
            FileDescriptor::File(_) => Err(syscall_error(Errno::ENOTSOCK, syscall, "descriptor is not a socket")),
        }
    }

    /// Adds a reference to whatever `desc` points at, for dup and dup2.
    pub(crate) fn retain(&self, tables: &mut FdTables, desc: FileDescriptor, syscall: &str) -> Result<(), Errno> {
        match desc {
            FileDescriptor::File(slot) => {
                let entry = tables
                    .handles
                    .get_mut(slot)
                    .ok_or_else(|| syscall_error(Errno::EBADF, syscall, "stale file handle"))?;
                entry.refs += 1;
                entry.handle.mount.ref_mount();
                Ok(())
            }
            FileDescriptor::Socket(id) => self.net.retain(id),
        }
    }

    /// Drops the descriptor's reference to its target. The last reference to
    /// a handle unrefs its node and its mount.
    pub(crate) fn release(&self, desc: FileDescriptor) -> Result<(), Errno> {
        match desc {
            FileDescriptor::File(slot) => {
                let closed = {
                    let mut tables = self.tables.lock();
                    let entry = match tables.handles.get_mut(slot) {
                        Some(entry) => entry,
                        None => return Ok(()),
                    };
                    entry.refs -= 1;
                    // every descriptor holds one mount reference
                    entry.handle.mount.unref_mount();
                    if entry.refs == 0 {
                        tables.handles.free_handle(slot)
                    } else {
                        None
                    }
                };
                if let Some(entry) = closed {
                    let handle = entry.handle;
                    handle.mount.mount().unref_node(handle.node);
                }
                Ok(())
            }
            FileDescriptor::Socket(id) => self.net.close(id),
        }
    }

    /// Closes every open descriptor.
    pub fn close_all(&self) {
        let descs: Vec<FileDescriptor> = {
            let mut tables = self.tables.lock();
            let indices = tables.fds.indices();
            indices.into_iter().filter_map(|fd| tables.fds.free(fd)).collect()
        };
        for desc in descs {
            if let Err(e) = self.release(desc) {
                log::warn!("error while closing descriptor: {}", e);
            }
        }
    }
}
