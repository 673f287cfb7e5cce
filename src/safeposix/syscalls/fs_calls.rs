//! This module contains all filesystem-related system calls.
//!
//! ## Notes:
//!
//! - These calls are implementations of the [`KernelProxy`] struct. Paths are
//!   normalized against the proxy's working directory and routed through its
//!   mount table; descriptors index the proxy's descriptor table.
//! - Every call returns a `Result`; the error is the errno the classic call
//!   would have set.
//!
//! ## File System Calls
//!
//! - [open_syscall](KernelProxy::open_syscall)
//! - [creat_syscall](KernelProxy::creat_syscall)
//! - [close_syscall](KernelProxy::close_syscall)
//! - [read_syscall](KernelProxy::read_syscall)
//! - [write_syscall](KernelProxy::write_syscall)
//! - [lseek_syscall](KernelProxy::lseek_syscall)
//! - [fstat_syscall](KernelProxy::fstat_syscall)
//! - [stat_syscall](KernelProxy::stat_syscall)
//! - [mkdir_syscall](KernelProxy::mkdir_syscall)
//! - [rmdir_syscall](KernelProxy::rmdir_syscall)
//! - [remove_syscall](KernelProxy::remove_syscall)
//! - [unlink_syscall](KernelProxy::unlink_syscall)
//! - [chmod_syscall](KernelProxy::chmod_syscall)
//! - [access_syscall](KernelProxy::access_syscall)
//! - [getdents_syscall](KernelProxy::getdents_syscall)
//! - [fsync_syscall](KernelProxy::fsync_syscall)
//! - [ftruncate_syscall](KernelProxy::ftruncate_syscall)
//! - [isatty_syscall](KernelProxy::isatty_syscall)
//! - [dup_syscall](KernelProxy::dup_syscall)
//! - [dup2_syscall](KernelProxy::dup2_syscall)
//! - [fcntl_syscall](KernelProxy::fcntl_syscall)
//! - [chdir_syscall](KernelProxy::chdir_syscall)
//! - [getcwd_syscall](KernelProxy::getcwd_syscall)
//! - [getwd_syscall](KernelProxy::getwd_syscall)
//! - [mount_syscall](KernelProxy::mount_syscall)
//! - [umount_syscall](KernelProxy::umount_syscall)
//! - [ioctl_syscall](KernelProxy::ioctl_syscall),
//!   [link_syscall](KernelProxy::link_syscall),
//!   [symlink_syscall](KernelProxy::symlink_syscall),
//!   [kill_syscall](KernelProxy::kill_syscall): always `ENOSYS`

use super::fs_constants::*;
use crate::interface::{self, syscall_error, DirEntry, Errno, StatData};
use crate::safeposix::kernel::{FileDescriptor, FileHandle, KernelProxy, NodePin};
use crate::safeposix::mounts::Mount;

impl KernelProxy {
    /// ### Description
    ///
    /// `open_syscall()` resolves `path` to a node and creates an open file
    /// handle plus a descriptor referring to it. With `O_CREAT` the node is
    /// created first; an existing node is accepted unless `O_EXCL` is also
    /// given.
    ///
    /// ### Arguments
    ///
    /// * `path` - absolute, or relative to the working directory.
    /// * `flags` - an access mode (`O_RDONLY`, `O_WRONLY`, `O_RDWR`) or'ed
    ///   with `O_CREAT`, `O_EXCL`, `O_TRUNC`, `O_APPEND`, `O_NONBLOCK`.
    /// * `mode` - permission bits for a newly created file.
    ///
    /// ### Returns
    ///
    /// The lowest free descriptor. With `O_APPEND` the handle starts at the
    /// end of the file, otherwise at offset 0.
    ///
    /// ### Errors
    ///
    /// * `ENOENT` - the path does not exist and `O_CREAT` was not given.
    /// * `EEXIST` - `O_CREAT | O_EXCL` and the path exists.
    /// * `EISDIR` - a directory was opened for writing.
    /// * `ENAMETOOLONG` - the normalized path exceeds the configured limit.
    /// * `EMFILE` - the descriptor table is full.
    /// * `EIO` - the backing mount failed.
    pub fn open_syscall(&self, path: &str, flags: i32, mode: u32) -> Result<i32, Errno> {
        let abs = self.resolve(path, "open")?;
        // held from lookup on, so an unmount cannot slip in before the
        // handle exists
        let (mp, remainder) = self
            .mounts
            .get_mount_ref(&abs)
            .ok_or_else(|| syscall_error(Errno::ENOENT, "open", "no mount covers this path"))?;
        let mount = mp.mount();

        let st = if flags & O_CREAT != 0 {
            match mount.creat(&remainder, mode & S_IRWXA) {
                Ok(st) => st,
                Err(Errno::EEXIST) if flags & O_EXCL == 0 => mount.get_node(&remainder)?,
                Err(e) => return Err(e),
            }
        } else {
            mount.get_node(&remainder)?
        };
        let pin = NodePin { mount, node: st.st_ino };

        if is_dir(st.st_mode) && !is_rdonly(flags) {
            return Err(syscall_error(Errno::EISDIR, "open", "directories can only be opened read-only"));
        }
        if flags & O_TRUNC != 0 && !is_rdonly(flags) && is_reg(st.st_mode) && st.st_size > 0 {
            mount.truncate(st.st_ino, 0)?;
        }

        let offset = if flags & O_APPEND != 0 && flags & O_TRUNC == 0 {
            st.st_size
        } else {
            0
        };
        mount.ref_node(st.st_ino);
        drop(pin);
        let mp = mp.keep();
        let handle = FileHandle {
            mount: mp.clone(),
            node: st.st_ino,
            filetype: st.st_mode & S_FILETYPEFLAGS,
            flags: interface::RustAtomicI32::new(flags & !(O_CREAT | O_EXCL | O_TRUNC)),
            offset: interface::Mutex::new(offset),
        };
        match self.install_handle(handle, "open") {
            Ok(fd) => Ok(fd),
            Err(e) => {
                mp.mount().unref_node(st.st_ino);
                mp.unref_mount();
                Err(e)
            }
        }
    }

    /// Same as `open(path, O_CREAT | O_WRONLY | O_TRUNC, mode)`.
    pub fn creat_syscall(&self, path: &str, mode: u32) -> Result<i32, Errno> {
        self.open_syscall(path, O_CREAT | O_WRONLY | O_TRUNC, mode)
    }

    /// ### Description
    ///
    /// Frees the descriptor. When it was the last descriptor sharing its
    /// handle, the node and mount references held by the handle are dropped.
    /// A socket descriptor closes the socket once its last descriptor goes.
    ///
    /// ### Errors
    ///
    /// * `EBADF` - `fd` is not open, including a second close of the same
    ///   descriptor.
    pub fn close_syscall(&self, fd: i32) -> Result<(), Errno> {
        let desc = {
            let mut tables = self.tables.lock();
            usize::try_from(fd)
                .ok()
                .and_then(|index| tables.fds.free(index))
                .ok_or_else(|| syscall_error(Errno::EBADF, "close", "invalid file descriptor"))?
        };
        self.release(desc)
    }

    /// ### Description
    ///
    /// Reads up to `buf.len()` bytes at the handle's offset and advances the
    /// offset by the number of bytes read. The handle's lock is held for the
    /// whole transfer, so reads and writes through one handle never
    /// interleave. Socket descriptors read from the socket's inbound queue.
    ///
    /// ### Returns
    ///
    /// The number of bytes read; 0 at end of file. A short count is not an
    /// error.
    ///
    /// ### Errors
    ///
    /// * `EBADF` - `fd` is not open, or was opened write-only.
    /// * `EISDIR` - `fd` refers to a directory.
    /// * `EAGAIN` - a non-blocking socket has no data.
    pub fn read_syscall(&self, fd: i32, buf: &mut [u8]) -> Result<usize, Errno> {
        let handle = match self.get_fd(fd, "read")? {
            FileDescriptor::Socket(id) => return self.net.read(id, buf),
            FileDescriptor::File(_) => self.get_file(fd, "read", Errno::EBADF)?,
        };
        if !handle.readable() {
            return Err(syscall_error(Errno::EBADF, "read", "descriptor is not open for reading"));
        }
        if handle.is_dir() {
            return Err(syscall_error(Errno::EISDIR, "read", "descriptor refers to a directory"));
        }
        let mut offset = handle.offset.lock();
        let n = handle.mount.mount().read(handle.node, *offset, buf)?;
        *offset = offset.saturating_add(n);
        Ok(n)
    }

    /// ### Description
    ///
    /// Writes `buf` at the handle's offset, or at the current end of file
    /// when the handle has `O_APPEND`, and advances the offset by the number
    /// of bytes written.
    ///
    /// ### Errors
    ///
    /// * `EBADF` - `fd` is not open, or was opened read-only.
    /// * `EISDIR` - `fd` refers to a directory.
    /// * `EPIPE` - the socket's connection is closed.
    /// * `EFBIG` - the write would grow the file past the size limit.
    pub fn write_syscall(&self, fd: i32, buf: &[u8]) -> Result<usize, Errno> {
        let handle = match self.get_fd(fd, "write")? {
            FileDescriptor::Socket(id) => return self.net.write(id, buf),
            FileDescriptor::File(_) => self.get_file(fd, "write", Errno::EBADF)?,
        };
        if !handle.writable() {
            return Err(syscall_error(Errno::EBADF, "write", "descriptor is not open for writing"));
        }
        if handle.is_dir() {
            return Err(syscall_error(Errno::EISDIR, "write", "descriptor refers to a directory"));
        }
        let mount = handle.mount.mount();
        let mut offset = handle.offset.lock();
        if handle.flags() & O_APPEND != 0 {
            *offset = mount.stat(handle.node)?.st_size;
        }
        let n = mount.write(handle.node, *offset, buf)?;
        *offset = offset.saturating_add(n);
        Ok(n)
    }

    /// ### Description
    ///
    /// Repositions the handle's offset. `SEEK_END` stats the node for its
    /// current size.
    ///
    /// ### Errors
    ///
    /// * `EBADF` - `fd` is not open.
    /// * `ESPIPE` - `fd` is a socket.
    /// * `EISDIR` - `fd` refers to a directory.
    /// * `EINVAL` - bad `whence`, or the resulting offset would be negative.
    pub fn lseek_syscall(&self, fd: i32, offset: isize, whence: i32) -> Result<usize, Errno> {
        let handle = self.get_file(fd, "lseek", Errno::ESPIPE)?;
        if handle.is_dir() {
            return Err(syscall_error(Errno::EISDIR, "lseek", "cannot seek a directory"));
        }
        let mut current = handle.offset.lock();
        let base = match whence {
            SEEK_SET => 0,
            SEEK_CUR => *current as isize,
            SEEK_END => handle.mount.mount().stat(handle.node)?.st_size as isize,
            _ => return Err(syscall_error(Errno::EINVAL, "lseek", "bad whence")),
        };
        let target = base
            .checked_add(offset)
            .filter(|t| *t >= 0)
            .ok_or_else(|| syscall_error(Errno::EINVAL, "lseek", "resulting offset would be negative"))?;
        *current = target as usize;
        Ok(*current)
    }

    pub fn fstat_syscall(&self, fd: i32) -> Result<StatData, Errno> {
        match self.get_fd(fd, "fstat")? {
            FileDescriptor::Socket(_) => Ok(StatData {
                st_mode: S_IFSOCK | S_IRWXA,
                st_nlink: 1,
                st_uid: DEFAULT_UID,
                st_gid: DEFAULT_GID,
                st_blksize: DEFAULT_BLKSIZE,
                ..Default::default()
            }),
            FileDescriptor::File(_) => {
                let handle = self.get_file(fd, "fstat", Errno::EBADF)?;
                handle.mount.mount().stat(handle.node)
            }
        }
    }

    pub fn stat_syscall(&self, path: &str) -> Result<StatData, Errno> {
        let abs = self.resolve(path, "stat")?;
        let found = self.lookup(&abs, "stat")?;
        found.mp.mount().stat(found.st.st_ino)
    }

    pub fn mkdir_syscall(&self, path: &str, mode: u32) -> Result<(), Errno> {
        let abs = self.resolve(path, "mkdir")?;
        let (mp, remainder) = self
            .mounts
            .get_mount(&abs)
            .ok_or_else(|| syscall_error(Errno::ENOENT, "mkdir", "no mount covers this path"))?;
        mp.mount().mkdir(&remainder, mode & S_IRWXA)?;
        Ok(())
    }

    /// ### Description
    ///
    /// Removes an empty directory. A directory that is a mount point, or
    /// that has a mount point anywhere beneath it, is refused.
    ///
    /// ### Errors
    ///
    /// * `ENOENT` - the path does not exist.
    /// * `ENOTDIR` - the path is not a directory.
    /// * `EBUSY` - the directory is, or contains, a mount point.
    /// * `ENOTEMPTY` - the directory still has entries.
    pub fn rmdir_syscall(&self, path: &str) -> Result<(), Errno> {
        let abs = self.resolve(path, "rmdir")?;
        if self.mounts.in_mount_root_path(&abs) {
            return Err(syscall_error(Errno::EBUSY, "rmdir", "directory is or contains a mount point"));
        }
        let found = self.lookup(&abs, "rmdir")?;
        if !is_dir(found.st.st_mode) {
            return Err(syscall_error(Errno::ENOTDIR, "rmdir", "path is not a directory"));
        }
        found.mp.mount().rmdir(found.st.st_ino)
    }

    pub fn unlink_syscall(&self, path: &str) -> Result<(), Errno> {
        let abs = self.resolve(path, "unlink")?;
        let found = self.lookup(&abs, "unlink")?;
        if is_dir(found.st.st_mode) {
            return Err(syscall_error(Errno::EISDIR, "unlink", "path is a directory"));
        }
        found.mp.mount().unlink(&found.remainder)
    }

    /// Unlinks a regular file or removes a directory, whichever `path` is.
    /// Any other file type is `EINVAL`.
    pub fn remove_syscall(&self, path: &str) -> Result<(), Errno> {
        let abs = self.resolve(path, "remove")?;
        let mode = self.lookup(&abs, "remove")?.st.st_mode;
        if is_dir(mode) {
            self.rmdir_syscall(&abs)
        } else if is_reg(mode) {
            self.unlink_syscall(&abs)
        } else {
            Err(syscall_error(Errno::EINVAL, "remove", "only files and directories can be removed"))
        }
    }

    pub fn chmod_syscall(&self, path: &str, mode: u32) -> Result<(), Errno> {
        let abs = self.resolve(path, "chmod")?;
        let found = self.lookup(&abs, "chmod")?;
        found.mp.mount().chmod(found.st.st_ino, mode & S_IRWXA)
    }

    /// ### Description
    ///
    /// Checks that every component of `path`, from the root down to the
    /// target, exists and has all the permission bits requested in `amode`.
    /// Users are not modelled, so the bits checked are the "other" class.
    ///
    /// ### Errors
    ///
    /// * `ENOENT` - a component does not exist.
    /// * `EACCES` - a component lacks a requested bit.
    /// * `EINVAL` - `amode` has bits other than `R_OK | W_OK | X_OK`.
    pub fn access_syscall(&self, path: &str, amode: u32) -> Result<(), Errno> {
        if amode & !(R_OK | W_OK | X_OK) != 0 {
            return Err(syscall_error(Errno::EINVAL, "access", "bad access mode"));
        }
        let abs = self.resolve(path, "access")?;
        let mut current = String::from("/");
        let mut prefixes = vec![current.clone()];
        for comp in abs.split('/').filter(|c| !c.is_empty()) {
            if current.len() > 1 {
                current.push('/');
            }
            current.push_str(comp);
            prefixes.push(current.clone());
        }
        for prefix in prefixes {
            let st_mode = self.lookup(&prefix, "access")?.st.st_mode;
            if st_mode & amode != amode {
                return Err(syscall_error(Errno::EACCES, "access", "permission bit not set on path component"));
            }
        }
        Ok(())
    }

    /// Reads up to `count` entries starting at the handle's entry offset and
    /// advances it by the number returned.
    pub fn getdents_syscall(&self, fd: i32, count: usize) -> Result<Vec<DirEntry>, Errno> {
        let handle = self.get_file(fd, "getdents", Errno::ENOTDIR)?;
        if !handle.is_dir() {
            return Err(syscall_error(Errno::ENOTDIR, "getdents", "descriptor is not a directory"));
        }
        let mut offset = handle.offset.lock();
        let entries = handle.mount.mount().getdents(handle.node, *offset, count)?;
        *offset += entries.len();
        Ok(entries)
    }

    pub fn fsync_syscall(&self, fd: i32) -> Result<(), Errno> {
        let handle = self.get_file(fd, "fsync", Errno::EINVAL)?;
        handle.mount.mount().fsync(handle.node)
    }

    pub fn ftruncate_syscall(&self, fd: i32, length: usize) -> Result<(), Errno> {
        let handle = self.get_file(fd, "ftruncate", Errno::EINVAL)?;
        if !handle.writable() || handle.is_dir() {
            return Err(syscall_error(Errno::EINVAL, "ftruncate", "descriptor is not a writable file"));
        }
        let _offset = handle.offset.lock();
        handle.mount.mount().truncate(handle.node, length)
    }

    pub fn isatty_syscall(&self, fd: i32) -> Result<bool, Errno> {
        match self.get_fd(fd, "isatty")? {
            FileDescriptor::Socket(_) => Ok(false),
            FileDescriptor::File(_) => {
                let handle = self.get_file(fd, "isatty", Errno::EBADF)?;
                Ok(handle.mount.mount().isatty(handle.node))
            }
        }
    }

    /// ### Description
    ///
    /// Makes the lowest free descriptor refer to the same open file (or
    /// socket) as `fd`. Both descriptors share one offset and one set of
    /// flags.
    ///
    /// ### Errors
    ///
    /// * `EBADF` - `fd` is not open.
    /// * `EMFILE` - the descriptor table is full.
    pub fn dup_syscall(&self, fd: i32) -> Result<i32, Errno> {
        self.dup_from(fd, 0, "dup")
    }

    // Duplicates onto the lowest free descriptor not below `lowest`.
    fn dup_from(&self, fd: i32, lowest: i32, syscall: &str) -> Result<i32, Errno> {
        let mut tables = self.tables.lock();
        let desc = usize::try_from(fd)
            .ok()
            .and_then(|index| tables.fds.at(index))
            .copied()
            .ok_or_else(|| syscall_error(Errno::EBADF, syscall, "invalid file descriptor"))?;
        if tables.fds.len() >= self.config.max_fds {
            return Err(syscall_error(Errno::EMFILE, syscall, "descriptor table is full"));
        }
        let lowest = usize::try_from(lowest)
            .map_err(|_| syscall_error(Errno::EINVAL, syscall, "negative descriptor"))?;
        let newfd = (lowest..self.config.max_fds)
            .find(|index| tables.fds.at(*index).is_none())
            .ok_or_else(|| syscall_error(Errno::EMFILE, syscall, "no free descriptor in range"))?;
        self.retain(&mut tables, desc, syscall)?;
        if tables.fds.insert_at(newfd, desc).is_err() {
            return Err(syscall_error(Errno::EBADF, syscall, "descriptor was taken"));
        }
        Ok(newfd as i32)
    }

    /// ### Description
    ///
    /// Makes `newfd` refer to the same open file as `oldfd`, closing
    /// whatever `newfd` referred to before. If the two are equal nothing
    /// happens.
    ///
    /// ### Errors
    ///
    /// * `EBADF` - `oldfd` is not open, or `newfd` is outside the table.
    pub fn dup2_syscall(&self, oldfd: i32, newfd: i32) -> Result<i32, Errno> {
        let previous = {
            let mut tables = self.tables.lock();
            let desc = usize::try_from(oldfd)
                .ok()
                .and_then(|index| tables.fds.at(index))
                .copied()
                .ok_or_else(|| syscall_error(Errno::EBADF, "dup2", "invalid old file descriptor"))?;
            let target = usize::try_from(newfd)
                .ok()
                .filter(|index| *index < self.config.max_fds)
                .ok_or_else(|| syscall_error(Errno::EBADF, "dup2", "new file descriptor is out of range"))?;
            if oldfd == newfd {
                return Ok(newfd);
            }
            self.retain(&mut tables, desc, "dup2")?;
            let previous = tables.fds.free(target);
            if tables.fds.insert_at(target, desc).is_err() {
                return Err(syscall_error(Errno::EBADF, "dup2", "descriptor was taken"));
            }
            previous
        };
        if let Some(previous) = previous {
            self.release(previous)?;
        }
        Ok(newfd)
    }

    /// ### Description
    ///
    /// Supported commands:
    /// * `F_GETFL` / `F_SETFL` - read or change the status flags; only
    ///   `O_APPEND` and `O_NONBLOCK` can be changed.
    /// * `F_GETFD` / `F_SETFD` - accepted; there is no exec, so close-on-exec
    ///   has no effect and always reads as 0.
    /// * `F_DUPFD` - duplicate onto the lowest free descriptor `>= arg`.
    ///
    /// ### Errors
    ///
    /// * `EBADF` - `fd` is not open.
    /// * `EINVAL` - unknown command.
    pub fn fcntl_syscall(&self, fd: i32, cmd: i32, arg: i32) -> Result<i32, Errno> {
        match (self.get_fd(fd, "fcntl")?, cmd) {
            (_, F_DUPFD) => self.dup_from(fd, arg, "fcntl"),
            (_, F_GETFD) | (_, F_SETFD) => Ok(0),
            (FileDescriptor::Socket(id), F_GETFL) => {
                let nonblocking = self.net.is_nonblocking(id)?;
                Ok(if nonblocking { O_RDWR | O_NONBLOCK } else { O_RDWR })
            }
            (FileDescriptor::Socket(id), F_SETFL) => {
                self.net.set_nonblocking(id, arg & O_NONBLOCK != 0)?;
                Ok(0)
            }
            (FileDescriptor::File(_), F_GETFL) => Ok(self.get_file(fd, "fcntl", Errno::EBADF)?.flags()),
            (FileDescriptor::File(_), F_SETFL) => {
                let handle = self.get_file(fd, "fcntl", Errno::EBADF)?;
                let _ = handle.flags.fetch_update(
                    interface::RustAtomicOrdering::SeqCst,
                    interface::RustAtomicOrdering::SeqCst,
                    |flags| Some((flags & !SETFL_MASK) | (arg & SETFL_MASK)),
                );
                Ok(0)
            }
            _ => Err(syscall_error(Errno::EINVAL, "fcntl", "unsupported command")),
        }
    }

    /// ### Description
    ///
    /// Changes the working directory. The target must resolve to an
    /// existing directory; on failure the working directory is unchanged.
    ///
    /// ### Errors
    ///
    /// * `ENOENT` - the directory does not exist.
    /// * `ENOTDIR` - the path names something other than a directory.
    ///
    /// To learn more about the syscall and possible error values, see
    /// [chdir(2)](https://man7.org/linux/man-pages/man2/chdir.2.html)
    pub fn chdir_syscall(&self, path: &str) -> Result<(), Errno> {
        let truepath = self.resolve(path, "chdir")?;
        let found = self.lookup(&truepath, "chdir")?;
        let st = found.mp.mount().stat(found.st.st_ino)?;
        if !is_dir(st.st_mode) {
            return Err(syscall_error(Errno::ENOTDIR, "chdir", "the last component in path is not a directory"));
        }
        *self.cwd.write() = truepath;
        Ok(())
    }

    /// Returns the working directory if it fits in a buffer of `size` bytes
    /// including the terminating NUL.
    ///
    /// * `EINVAL` - `size` is 0.
    /// * `ERANGE` - the buffer would be too small.
    pub fn getcwd_syscall(&self, size: usize) -> Result<String, Errno> {
        if size == 0 {
            return Err(syscall_error(Errno::EINVAL, "getcwd", "size is zero"));
        }
        let cwd = self.cwd.read();
        if cwd.len() + 1 > size {
            return Err(syscall_error(Errno::ERANGE, "getcwd", "buffer is too small for the working directory"));
        }
        Ok(cwd.clone())
    }

    /// `getcwd` with a buffer of the configured maximum path length.
    pub fn getwd_syscall(&self) -> Result<String, Errno> {
        self.getcwd_syscall(self.config.max_path_len)
    }

    /// Mounts `mount` at `path`. Fails with `EINVAL` for a bad path,
    /// `EBUSY` if something is already mounted there and `ENOENT` if the
    /// parent directory does not exist.
    pub fn mount_syscall(&self, mount: interface::RustRfc<dyn Mount>, path: &str) -> Result<(), Errno> {
        let abs = self.resolve(path, "mount")?;
        self.mounts
            .add_mount(mount, &abs)
            .map_err(|e| syscall_error(e.errno(), "mount", &e.to_string()))
    }

    /// Unmounts the mount at `path`; `EBUSY` while any descriptor or child
    /// mount still references it.
    pub fn umount_syscall(&self, path: &str) -> Result<(), Errno> {
        let abs = self.resolve(path, "umount")?;
        self.mounts.remove_mount(&abs)
    }

    pub fn ioctl_syscall(&self, fd: i32, request: u64) -> Result<i32, Errno> {
        self.get_fd(fd, "ioctl")?;
        log::warn!("ioctl {:#x} on fd {} is not implemented", request, fd);
        Err(syscall_error(Errno::ENOSYS, "ioctl", "ioctl is not implemented"))
    }

    pub fn link_syscall(&self, oldpath: &str, newpath: &str) -> Result<(), Errno> {
        log::warn!("link {} -> {} is not implemented", newpath, oldpath);
        Err(syscall_error(Errno::ENOSYS, "link", "hard links are not implemented"))
    }

    pub fn symlink_syscall(&self, oldpath: &str, newpath: &str) -> Result<(), Errno> {
        log::warn!("symlink {} -> {} is not implemented", newpath, oldpath);
        Err(syscall_error(Errno::ENOSYS, "symlink", "symbolic links are not implemented"))
    }

    pub fn kill_syscall(&self, pid: i32, sig: i32) -> Result<(), Errno> {
        log::warn!("kill({}, {}) is not implemented", pid, sig);
        Err(syscall_error(Errno::ENOSYS, "kill", "signals are not implemented"))
    }
}
