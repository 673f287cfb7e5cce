//! This module contains all networking-related system calls.
//!
//! Socket descriptors share the descriptor table with files, so `read`,
//! `write`, `close`, `dup`, `fstat` and `fcntl` in `fs_calls` also accept
//! them. The calls here translate descriptors to socket ids and hand off to
//! the [`SocketSubsystem`](crate::safeposix::net::SocketSubsystem).
//!
//! - [socket_syscall](KernelProxy::socket_syscall)
//! - [bind_syscall](KernelProxy::bind_syscall)
//! - [connect_syscall](KernelProxy::connect_syscall)
//! - [listen_syscall](KernelProxy::listen_syscall)
//! - [accept_syscall](KernelProxy::accept_syscall)
//! - [send_syscall](KernelProxy::send_syscall)
//! - [recv_syscall](KernelProxy::recv_syscall)
//! - [shutdown_syscall](KernelProxy::shutdown_syscall)
//! - [getsockname_syscall](KernelProxy::getsockname_syscall)
//! - [getpeername_syscall](KernelProxy::getpeername_syscall)
//! - [select_syscall](KernelProxy::select_syscall)

use std::net::{Ipv4Addr, SocketAddr};

use crate::interface::{self, syscall_error, Errno};
use crate::safeposix::kernel::{FileDescriptor, KernelProxy};
use crate::safeposix::net::{AddrHints, AddrInfo, SocketId};

impl KernelProxy {
    /// ### Description
    ///
    /// Creates an unconnected TCP socket and a descriptor for it.
    ///
    /// ### Arguments
    ///
    /// * `domain` - `AF_INET` or `AF_INET6`.
    /// * `socktype` - `SOCK_STREAM`, optionally or'ed with `SOCK_NONBLOCK`.
    /// * `protocol` - 0 or `IPPROTO_TCP`.
    ///
    /// ### Errors
    ///
    /// * `EAFNOSUPPORT` - any other domain.
    /// * `EOPNOTSUPP` - any other socket type or protocol.
    /// * `EMFILE` - the descriptor table is full.
    pub fn socket_syscall(&self, domain: i32, socktype: i32, protocol: i32) -> Result<i32, Errno> {
        let id = self.net.socket(domain, socktype, protocol)?;
        match self.install_socket(id, "socket") {
            Ok(fd) => Ok(fd),
            Err(e) => {
                let _ = self.net.close(id);
                Err(e)
            }
        }
    }

    pub fn bind_syscall(&self, fd: i32, addr: &SocketAddr) -> Result<(), Errno> {
        let id = self.get_socket(fd, "bind")?;
        self.net.bind(id, *addr)
    }

    /// ### Description
    ///
    /// Connects the socket. A blocking socket waits for the host to report
    /// the outcome; a non-blocking one returns `EINPROGRESS` and becomes
    /// writable once the outcome is known, after which another `connect`
    /// reports it.
    ///
    /// ### Errors
    ///
    /// * `EISCONN` - the socket is already connected.
    /// * `EALREADY` - a non-blocking connect is still in progress.
    /// * `ECONNREFUSED` - nobody is listening at `addr`.
    /// * `ENOTSOCK` - `fd` is not a socket.
    pub fn connect_syscall(&self, fd: i32, addr: &SocketAddr) -> Result<(), Errno> {
        let id = self.get_socket(fd, "connect")?;
        self.net.connect(id, *addr)
    }

    /// Starts listening on the bound address, or on an ephemeral port if the
    /// socket was never bound. `EADDRINUSE` if the port is taken, `EACCES`
    /// for any other host refusal.
    pub fn listen_syscall(&self, fd: i32, backlog: i32) -> Result<(), Errno> {
        let id = self.get_socket(fd, "listen")?;
        self.net.listen(id, backlog)
    }

    /// ### Description
    ///
    /// Takes the next pending connection, blocking until one arrives unless
    /// the listening socket is non-blocking.
    ///
    /// ### Returns
    ///
    /// The new connection's descriptor and its peer address.
    ///
    /// ### Errors
    ///
    /// * `EINVAL` - the socket is not listening.
    /// * `EAGAIN` - non-blocking and nothing is pending.
    /// * `EMFILE` - the descriptor table is full; the connection is dropped.
    pub fn accept_syscall(&self, fd: i32) -> Result<(i32, SocketAddr), Errno> {
        let id = self.get_socket(fd, "accept")?;
        let (conn, peer) = self.net.accept(id)?;
        match self.install_socket(conn, "accept") {
            Ok(newfd) => Ok((newfd, peer)),
            Err(e) => {
                let _ = self.net.close(conn);
                Err(e)
            }
        }
    }

    /// `write` on a socket; `flags` are ignored.
    pub fn send_syscall(&self, fd: i32, buf: &[u8], _flags: i32) -> Result<usize, Errno> {
        let id = self.get_socket(fd, "send")?;
        self.net.write(id, buf)
    }

    /// `read` on a socket; `flags` are ignored.
    pub fn recv_syscall(&self, fd: i32, buf: &mut [u8], _flags: i32) -> Result<usize, Errno> {
        let id = self.get_socket(fd, "recv")?;
        self.net.read(id, buf)
    }

    /// Closes the host connection in both directions once queued bytes are
    /// sent, whatever `how` says. The descriptor stays open.
    pub fn shutdown_syscall(&self, fd: i32, how: i32) -> Result<(), Errno> {
        let id = self.get_socket(fd, "shutdown")?;
        self.net.shutdown(id, how)
    }

    pub fn getsockname_syscall(&self, fd: i32) -> Result<SocketAddr, Errno> {
        let id = self.get_socket(fd, "getsockname")?;
        self.net.getsockname(id)
    }

    pub fn getpeername_syscall(&self, fd: i32) -> Result<SocketAddr, Errno> {
        let id = self.get_socket(fd, "getpeername")?;
        self.net.getpeername(id)
    }

    /// ### Description
    ///
    /// Resolves a host and service into addresses a stream socket can
    /// connect to or bind. Names that are not numeric addresses go to the
    /// host resolver; `hints` of `None` accepts any family.
    ///
    /// ### Errors
    ///
    /// Errors are `EAI_*` codes, as `getaddrinfo` reports them.
    ///
    /// * `EAI_FAMILY` - the hinted family is not `AF_UNSPEC`, `AF_INET` or `AF_INET6`.
    /// * `EAI_SERVICE` - `service` is not a port number.
    /// * `EAI_NONAME` - the name is unknown, or not numeric under `AI_NUMERICHOST`.
    /// * `EAI_FAIL` - the host resolver failed.
    pub fn getaddrinfo_syscall(
        &self,
        node: Option<&str>,
        service: Option<&str>,
        hints: Option<&AddrHints>,
    ) -> Result<Vec<AddrInfo>, i32> {
        self.net.getaddrinfo(node, service, hints.unwrap_or(&AddrHints::default()))
    }

    /// First IPv4 address of `name`, or an `EAI_*` code.
    pub fn gethostbyname_syscall(&self, name: &str) -> Result<Ipv4Addr, i32> {
        self.net.gethostbyname(name)
    }

    /// Host and service text for `addr`, or an `EAI_*` code.
    pub fn getnameinfo_syscall(&self, addr: &SocketAddr, flags: i32) -> Result<(String, String), i32> {
        self.net.getnameinfo(addr, flags)
    }

    fn select_targets(
        &self,
        nfds: i32,
        set: &Option<&mut interface::RustHashSet<i32>>,
    ) -> Result<Vec<(i32, SocketId)>, Errno> {
        let mut targets = Vec::new();
        if let Some(set) = set {
            for fd in set.iter().copied().filter(|fd| *fd < nfds) {
                match self.get_fd(fd, "select")? {
                    FileDescriptor::Socket(id) => targets.push((fd, id)),
                    FileDescriptor::File(_) => {
                        return Err(syscall_error(Errno::ENOTSOCK, "select", "only sockets can be selected"));
                    }
                }
            }
        }
        Ok(targets)
    }

    /// ### Description
    ///
    /// Waits until at least one of the given socket descriptors is ready for
    /// reading, writing or has an exceptional condition, or until `timeout`
    /// expires. `None` waits indefinitely; a zero timeout polls.
    ///
    /// ### Arguments
    ///
    /// * `nfds` - descriptors at or above this value are ignored.
    /// * `readfds`, `writefds`, `exceptfds` - on return each set only holds
    ///   the descriptors that are ready in its sense.
    ///
    /// ### Returns
    ///
    /// The total number of descriptors left across the three sets; 0 on
    /// timeout.
    ///
    /// ### Errors
    ///
    /// * `EINVAL` - `nfds` is negative.
    /// * `EBADF` - a set holds a descriptor that is not open.
    /// * `ENOTSOCK` - a set holds a descriptor that is not a socket.
    pub fn select_syscall(
        &self,
        nfds: i32,
        mut readfds: Option<&mut interface::RustHashSet<i32>>,
        mut writefds: Option<&mut interface::RustHashSet<i32>>,
        mut exceptfds: Option<&mut interface::RustHashSet<i32>>,
        timeout: Option<interface::RustDuration>,
    ) -> Result<usize, Errno> {
        if nfds < 0 {
            return Err(syscall_error(Errno::EINVAL, "select", "nfds is negative"));
        }
        let mut reads = self.select_targets(nfds, &readfds)?;
        let mut writes = self.select_targets(nfds, &writefds)?;
        let mut excepts = self.select_targets(nfds, &exceptfds)?;

        let count = self.net.select(&mut reads, &mut writes, &mut excepts, timeout)?;

        keep_ready(readfds.as_deref_mut(), &reads);
        keep_ready(writefds.as_deref_mut(), &writes);
        keep_ready(exceptfds.as_deref_mut(), &excepts);
        Ok(count)
    }
}

// Leaves only the descriptors `select` found ready.
fn keep_ready(set: Option<&mut interface::RustHashSet<i32>>, ready: &[(i32, SocketId)]) {
    if let Some(set) = set {
        set.retain(|fd| ready.iter().any(|(ready_fd, _)| ready_fd == fd));
    }
}
