//! Descriptor-style TCP sockets over the host's asynchronous network API.
//!
//! Every host call is started from a coordinator job. Completions update the
//! shared socket table under one mutex and broadcast one condition variable;
//! blocking callers and `select` wait on that condition and re-check their
//! own socket each time it fires.
//!
//! An open stream keeps a read chain running: each host read that delivers
//! bytes appends them to the inbound queue and issues the next read, until
//! the peer closes or the inbound queue fills up. Outbound bytes are queued
//! and drained by a write chain that keeps at most one host write in flight.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::interface::{
    self, syscall_error, Coordinator, Errno, HostCallback, HostNetwork, HostResource, JobEntry, SlotAllocator,
    SlotHandle,
};

use super::syscalls::net_constants::*;

/// Generation-checked reference to a socket; stale ids never alias a newer
/// socket that reused the slot.
pub type SocketId = SlotHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenState {
    Opening,
    Listening,
    Failed(Errno),
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Read,
    Write,
    Exception,
}

/// One `getaddrinfo` answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrInfo {
    pub family: i32,
    pub socktype: i32,
    pub protocol: i32,
    pub addr: SocketAddr,
    /// Only on the first answer, and only when `AI_CANONNAME` was asked for.
    pub canonname: Option<String>,
}

/// Narrows a `getaddrinfo` query. The default accepts any family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddrHints {
    pub flags: i32,
    pub family: i32,
    pub socktype: i32,
    pub protocol: i32,
}

struct TcpStream {
    resource: Option<HostResource>,
    state: StreamState,
    error: Option<Errno>,
    inbound: interface::RustDeque<u8>,
    outbound: interface::RustDeque<u8>,
    reading: bool,
    write_in_flight: bool,
    bytes_queued: u64,
    bytes_sent: u64,
    // release the host connection as soon as the outbound queue drains
    shutdown: bool,
    local: Option<SocketAddr>,
    peer: Option<SocketAddr>,
}

impl TcpStream {
    fn connecting(peer: SocketAddr) -> Self {
        TcpStream {
            resource: None,
            state: StreamState::Connecting,
            error: None,
            inbound: interface::RustDeque::new(),
            outbound: interface::RustDeque::new(),
            reading: false,
            write_in_flight: false,
            bytes_queued: 0,
            bytes_sent: 0,
            shutdown: false,
            local: None,
            peer: Some(peer),
        }
    }

    fn accepted(resource: HostResource, local: SocketAddr, peer: SocketAddr) -> Self {
        TcpStream {
            resource: Some(resource),
            state: StreamState::Open,
            reading: true,
            local: Some(local),
            ..Self::connecting(peer)
        }
    }

    fn idle(&self) -> bool {
        !self.write_in_flight && (self.outbound.is_empty() || self.state != StreamState::Open)
    }
}

struct Listener {
    resource: Option<HostResource>,
    state: ListenState,
    pending: interface::RustDeque<(HostResource, SocketAddr)>,
    local: SocketAddr,
}

enum SocketKind {
    Unopened { bound: Option<SocketAddr> },
    Stream(TcpStream),
    Server(Listener),
}

struct Socket {
    domain: i32,
    nonblocking: bool,
    refs: usize,
    // every descriptor is gone; the slot lives on only to finish a flush
    detached: bool,
    kind: SocketKind,
}

impl Socket {
    fn is_ready(&self, which: Readiness, buffer_size: usize) -> bool {
        match which {
            Readiness::Read => match &self.kind {
                SocketKind::Unopened { .. } => true,
                SocketKind::Stream(s) => match s.state {
                    StreamState::Connecting => false,
                    StreamState::Open => !s.inbound.is_empty(),
                    StreamState::Closed => true,
                },
                SocketKind::Server(l) => match l.state {
                    ListenState::Opening => false,
                    ListenState::Listening => !l.pending.is_empty(),
                    _ => true,
                },
            },
            Readiness::Write => match &self.kind {
                SocketKind::Unopened { .. } => true,
                SocketKind::Stream(s) => match s.state {
                    StreamState::Connecting => false,
                    StreamState::Open => !s.shutdown && s.outbound.len() < buffer_size,
                    StreamState::Closed => true,
                },
                SocketKind::Server(l) => !matches!(l.state, ListenState::Opening | ListenState::Listening),
            },
            Readiness::Exception => match &self.kind {
                SocketKind::Unopened { .. } => false,
                SocketKind::Stream(s) => s.error.is_some(),
                SocketKind::Server(l) => matches!(l.state, ListenState::Failed(_)),
            },
        }
    }
}

#[derive(Default)]
struct NetState {
    sockets: SlotAllocator<Socket>,
}

impl NetState {
    // A socket still reachable through some descriptor.
    fn live_mut(&mut self, id: SocketId, syscall: &str) -> Result<&mut Socket, Errno> {
        match self.sockets.get_mut(id) {
            Some(sock) if !sock.detached => Ok(sock),
            _ => Err(syscall_error(Errno::EBADF, syscall, "no such socket")),
        }
    }

    fn live(&self, id: SocketId, syscall: &str) -> Result<&Socket, Errno> {
        match self.sockets.get(id) {
            Some(sock) if !sock.detached => Ok(sock),
            _ => Err(syscall_error(Errno::EBADF, syscall, "no such socket")),
        }
    }

    // Once a shut-down stream has nothing left to send, hand back its host
    // connection for closing, and drop the slot if no descriptor remains.
    fn release_if_done(&mut self, id: SocketId) -> Option<HostResource> {
        let (resource, detached) = {
            let sock = self.sockets.get_mut(id)?;
            let stream = match &mut sock.kind {
                SocketKind::Stream(stream) => stream,
                _ => return None,
            };
            if !stream.shutdown || !stream.idle() || stream.state == StreamState::Connecting {
                return None;
            }
            stream.state = StreamState::Closed;
            stream.reading = false;
            (stream.resource.take(), sock.detached)
        };
        if detached {
            self.sockets.free_handle(id);
        }
        resource
    }
}

struct NetShared {
    state: interface::Mutex<NetState>,
    changed: interface::Condvar,
    host: interface::RustRfc<dyn HostNetwork>,
    buffer_size: usize,
}

// Rides along with every step and host callback queued for one socket. If
// the coordinator drops it unrun, the socket fails with EIO and waiters wake.
struct Stranded {
    shared: interface::RustRfc<NetShared>,
    id: Option<SocketId>,
}

impl Stranded {
    fn new(shared: &interface::RustRfc<NetShared>, id: SocketId) -> Self {
        Stranded {
            shared: shared.clone(),
            id: Some(id),
        }
    }

    fn defuse(mut self) -> interface::RustRfc<NetShared> {
        self.id = None;
        self.shared.clone()
    }
}

impl Drop for Stranded {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.shared.strand(id);
        }
    }
}

// The chain steps below run on the coordinator thread only.
impl NetShared {
    fn strand(&self, id: SocketId) {
        let mut state = self.state.lock();
        match state.sockets.get_mut(id).map(|sock| &mut sock.kind) {
            Some(SocketKind::Stream(s)) if s.state != StreamState::Closed || s.write_in_flight => {
                log::warn!("socket {} lost its pending host work", id.index());
                s.state = StreamState::Closed;
                s.error.get_or_insert(Errno::EIO);
                s.reading = false;
                s.write_in_flight = false;
                s.outbound.clear();
            }
            Some(SocketKind::Server(l)) if matches!(l.state, ListenState::Opening | ListenState::Listening) => {
                log::warn!("listener {} lost its pending host work", id.index());
                l.state = ListenState::Failed(Errno::EIO);
            }
            _ => {}
        }
        // a detached stream has nothing left to flush; its host side is
        // unreachable without the coordinator
        let _ = state.release_if_done(id);
        drop(state);
        self.changed.notify_all();
    }

    fn read_chain(self: &interface::RustRfc<Self>, id: SocketId, resource: HostResource) {
        let pending = Stranded::new(self, id);
        self.host.tcp_read(
            resource,
            self.buffer_size,
            Box::new(move |r: Result<Vec<u8>, i32>| pending.defuse().on_read(id, resource, r)),
        );
    }

    fn on_read(self: &interface::RustRfc<Self>, id: SocketId, resource: HostResource, r: Result<Vec<u8>, i32>) {
        let mut state = self.state.lock();
        let mut again = false;
        if let Some(Socket { kind: SocketKind::Stream(s), .. }) = state.sockets.get_mut(id) {
            match r {
                Ok(data) if data.is_empty() => {
                    s.state = StreamState::Closed;
                    s.reading = false;
                }
                Ok(data) => {
                    s.inbound.extend(data);
                    again = s.state == StreamState::Open && !s.shutdown && s.inbound.len() < self.buffer_size;
                    s.reading = again;
                }
                Err(code) => {
                    s.state = StreamState::Closed;
                    s.error = Some(Errno::from_host(code));
                    s.reading = false;
                }
            }
        }
        let release = if again { None } else { state.release_if_done(id) };
        drop(state);
        self.changed.notify_all();
        if again {
            self.read_chain(id, resource);
        }
        if let Some(resource) = release {
            self.host.close(resource);
        }
    }

    fn write_chain(self: &interface::RustRfc<Self>, id: SocketId) {
        let (resource, chunk) = {
            let mut state = self.state.lock();
            let stream = match state.sockets.get_mut(id) {
                Some(Socket { kind: SocketKind::Stream(s), .. }) => s,
                _ => return,
            };
            let resource = match stream.resource {
                Some(resource) if stream.state == StreamState::Open => resource,
                _ => return,
            };
            if stream.write_in_flight || stream.outbound.is_empty() {
                return;
            }
            let n = stream.outbound.len().min(self.buffer_size);
            stream.write_in_flight = true;
            (resource, stream.outbound.iter().take(n).copied().collect::<Vec<u8>>())
        };
        let pending = Stranded::new(self, id);
        self.host.tcp_write(
            resource,
            chunk,
            Box::new(move |r: Result<usize, i32>| pending.defuse().on_write(id, r)),
        );
    }

    fn on_write(self: &interface::RustRfc<Self>, id: SocketId, r: Result<usize, i32>) {
        let mut state = self.state.lock();
        let mut more = false;
        if let Some(Socket { kind: SocketKind::Stream(s), .. }) = state.sockets.get_mut(id) {
            s.write_in_flight = false;
            let failure = match r {
                Ok(n) if n > 0 => {
                    let n = n.min(s.outbound.len());
                    s.outbound.drain(..n);
                    s.bytes_sent += n as u64;
                    more = !s.outbound.is_empty();
                    None
                }
                Ok(_) => Some(Errno::EPIPE),
                Err(code) => Some(Errno::from_host(code)),
            };
            if let Some(e) = failure {
                s.state = StreamState::Closed;
                s.error = Some(e);
                s.outbound.clear();
            }
        }
        let release = if more { None } else { state.release_if_done(id) };
        drop(state);
        self.changed.notify_all();
        if more {
            self.write_chain(id);
        }
        if let Some(resource) = release {
            self.host.close(resource);
        }
    }

    fn on_connect(self: &interface::RustRfc<Self>, id: SocketId, r: Result<(HostResource, SocketAddr), i32>) {
        let mut state = self.state.lock();
        let mut read_from = None;
        let mut orphan = None;
        match state.sockets.get_mut(id) {
            Some(Socket { kind: SocketKind::Stream(s), .. }) if s.state == StreamState::Connecting => match r {
                Ok((resource, local)) => {
                    s.resource = Some(resource);
                    s.local = Some(local);
                    s.state = StreamState::Open;
                    s.reading = true;
                    read_from = Some(resource);
                }
                Err(code) => {
                    s.state = StreamState::Closed;
                    s.error = Some(Errno::from_host(code));
                }
            },
            _ => {
                if let Ok((resource, _)) = r {
                    orphan = Some(resource);
                }
            }
        }
        // closed while connecting
        if let Some(resource) = state.release_if_done(id) {
            orphan = Some(resource);
            read_from = None;
        }
        drop(state);
        self.changed.notify_all();
        if let Some(resource) = read_from {
            self.read_chain(id, resource);
        }
        if let Some(resource) = orphan {
            self.host.close(resource);
        }
    }

    fn on_listen(self: &interface::RustRfc<Self>, id: SocketId, r: Result<(HostResource, SocketAddr), i32>) {
        let mut state = self.state.lock();
        let mut accept_on = None;
        let mut orphan = None;
        match state.sockets.get_mut(id) {
            Some(Socket { kind: SocketKind::Server(l), .. }) if l.state == ListenState::Opening => match r {
                Ok((resource, bound)) => {
                    l.resource = Some(resource);
                    l.local = bound;
                    l.state = ListenState::Listening;
                    accept_on = Some(resource);
                }
                Err(code) => l.state = ListenState::Failed(Errno::from_host(code)),
            },
            _ => {
                if let Ok((resource, _)) = r {
                    orphan = Some(resource);
                }
            }
        }
        drop(state);
        self.changed.notify_all();
        if let Some(resource) = accept_on {
            self.accept_chain(id, resource);
        }
        if let Some(resource) = orphan {
            self.host.close(resource);
        }
    }

    fn accept_chain(self: &interface::RustRfc<Self>, id: SocketId, listener: HostResource) {
        let pending = Stranded::new(self, id);
        self.host.tcp_accept(
            listener,
            Box::new(move |r: Result<(HostResource, SocketAddr), i32>| {
                pending.defuse().on_accept(id, listener, r)
            }),
        );
    }

    fn on_accept(
        self: &interface::RustRfc<Self>,
        id: SocketId,
        listener: HostResource,
        r: Result<(HostResource, SocketAddr), i32>,
    ) {
        let mut state = self.state.lock();
        let mut again = false;
        let mut orphan = None;
        match state.sockets.get_mut(id) {
            Some(Socket { kind: SocketKind::Server(l), .. })
                if l.state == ListenState::Listening && l.resource == Some(listener) =>
            {
                if let Ok(conn) = r {
                    l.pending.push_back(conn);
                    again = true;
                }
            }
            _ => {
                if let Ok((resource, _)) = r {
                    orphan = Some(resource);
                }
            }
        }
        drop(state);
        self.changed.notify_all();
        if again {
            self.accept_chain(id, listener);
        }
        if let Some(resource) = orphan {
            self.host.close(resource);
        }
    }
}

fn family_matches(domain: i32, addr: &SocketAddr) -> bool {
    match domain {
        AF_INET => addr.is_ipv4(),
        AF_INET6 => addr.is_ipv6(),
        _ => false,
    }
}

fn unspecified(domain: i32) -> SocketAddr {
    if domain == AF_INET6 {
        SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0)
    } else {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
    }
}

/// The socket table and its host bridge.
pub struct SocketSubsystem {
    coordinator: Coordinator,
    shared: interface::RustRfc<NetShared>,
}

impl SocketSubsystem {
    pub fn new(coordinator: Coordinator, host: interface::RustRfc<dyn HostNetwork>, buffer_size: usize) -> Self {
        SocketSubsystem {
            coordinator,
            shared: interface::RustRfc::new(NetShared {
                state: interface::Mutex::new(NetState::default()),
                changed: interface::Condvar::new(),
                host,
                buffer_size: buffer_size.max(1),
            }),
        }
    }

    /// Sockets still holding a slot, including ones finishing a flush after
    /// their last descriptor closed.
    pub fn socket_count(&self) -> usize {
        self.shared.state.lock().sockets.len()
    }

    // Queues `step` for the coordinator. When `id` is given and the step is
    // dropped unrun, that socket fails instead of waiting forever.
    fn in_coordinator<F>(&self, id: Option<SocketId>, step: F)
    where
        F: FnOnce(&interface::RustRfc<NetShared>) + Send + 'static,
    {
        let shared = self.shared.clone();
        let guard = id.map(|id| Stranded::new(&self.shared, id));
        let queued = self.coordinator.submit(Box::new(move |entry: JobEntry| {
            if let Some(guard) = guard {
                guard.defuse();
            }
            step(&shared);
            entry.finish(0);
        }));
        if !queued {
            log::debug!("socket step discarded, coordinator is shut down");
        }
    }

    fn release(&self, resources: Vec<HostResource>) {
        if resources.is_empty() {
            return;
        }
        self.in_coordinator(None, move |shared| {
            for resource in resources {
                shared.host.close(resource);
            }
        });
    }

    pub fn socket(&self, domain: i32, socktype: i32, protocol: i32) -> Result<SocketId, Errno> {
        if domain != AF_INET && domain != AF_INET6 {
            return Err(syscall_error(Errno::EAFNOSUPPORT, "socket", "only AF_INET and AF_INET6 are supported"));
        }
        if socktype & SOCK_TYPEMASK != SOCK_STREAM {
            return Err(syscall_error(Errno::EOPNOTSUPP, "socket", "only stream sockets are supported"));
        }
        if protocol != IPPROTO_IP && protocol != IPPROTO_TCP {
            return Err(syscall_error(Errno::EOPNOTSUPP, "socket", "unsupported protocol"));
        }
        let sock = Socket {
            domain,
            nonblocking: socktype & SOCK_NONBLOCK != 0,
            refs: 1,
            detached: false,
            kind: SocketKind::Unopened { bound: None },
        };
        Ok(self.shared.state.lock().sockets.insert_handle(sock))
    }

    /// One more descriptor refers to `id`.
    pub fn retain(&self, id: SocketId) -> Result<(), Errno> {
        let mut state = self.shared.state.lock();
        state.live_mut(id, "dup")?.refs += 1;
        Ok(())
    }

    pub fn set_nonblocking(&self, id: SocketId, nonblocking: bool) -> Result<(), Errno> {
        let mut state = self.shared.state.lock();
        state.live_mut(id, "fcntl")?.nonblocking = nonblocking;
        Ok(())
    }

    pub fn is_nonblocking(&self, id: SocketId) -> Result<bool, Errno> {
        Ok(self.shared.state.lock().live(id, "fcntl")?.nonblocking)
    }

    pub fn bind(&self, id: SocketId, addr: SocketAddr) -> Result<(), Errno> {
        let mut state = self.shared.state.lock();
        let sock = state.live_mut(id, "bind")?;
        if !family_matches(sock.domain, &addr) {
            return Err(syscall_error(Errno::EAFNOSUPPORT, "bind", "address family does not match socket"));
        }
        match &mut sock.kind {
            SocketKind::Unopened { bound } if bound.is_none() => {
                *bound = Some(addr);
                Ok(())
            }
            _ => Err(syscall_error(Errno::EINVAL, "bind", "socket is already bound")),
        }
    }

    /// Opens the host listener, waiting for the outcome even on a
    /// non-blocking socket.
    pub fn listen(&self, id: SocketId, backlog: i32) -> Result<(), Errno> {
        let mut state = self.shared.state.lock();
        let sock = state.live_mut(id, "listen")?;
        let addr = match &sock.kind {
            SocketKind::Unopened { bound } => bound.unwrap_or_else(|| unspecified(sock.domain)),
            SocketKind::Server(l) if l.state == ListenState::Listening => return Ok(()),
            _ => return Err(syscall_error(Errno::EINVAL, "listen", "socket is connected or closing")),
        };
        sock.kind = SocketKind::Server(Listener {
            resource: None,
            state: ListenState::Opening,
            pending: interface::RustDeque::new(),
            local: addr,
        });
        drop(state);

        self.in_coordinator(Some(id), move |shared| {
            let pending = Stranded::new(shared, id);
            shared.host.tcp_listen(
                addr,
                backlog,
                Box::new(move |r: Result<(HostResource, SocketAddr), i32>| pending.defuse().on_listen(id, r)),
            );
        });

        let mut state = self.shared.state.lock();
        loop {
            let sock = state.live_mut(id, "listen")?;
            let outcome = match &sock.kind {
                SocketKind::Server(l) => l.state,
                _ => return Err(syscall_error(Errno::EINVAL, "listen", "socket changed while listening")),
            };
            match outcome {
                ListenState::Opening => self.shared.changed.wait(&mut state),
                ListenState::Listening => return Ok(()),
                ListenState::Failed(e) => {
                    sock.kind = SocketKind::Unopened { bound: Some(addr).filter(|a| a.port() != 0) };
                    let e = if e == Errno::EADDRINUSE { e } else { Errno::EACCES };
                    return Err(syscall_error(e, "listen", "host refused to listen"));
                }
                ListenState::Closed => return Err(syscall_error(Errno::EBADF, "listen", "socket closed")),
            }
        }
    }

    /// Takes the next pending connection as a new open socket.
    pub fn accept(&self, id: SocketId) -> Result<(SocketId, SocketAddr), Errno> {
        let mut state = self.shared.state.lock();
        loop {
            let sock = state.live_mut(id, "accept")?;
            let (domain, nonblocking) = (sock.domain, sock.nonblocking);
            let listener = match &mut sock.kind {
                SocketKind::Server(l) if l.state == ListenState::Listening => l,
                _ => return Err(syscall_error(Errno::EINVAL, "accept", "socket is not listening")),
            };
            if let Some((resource, peer)) = listener.pending.pop_front() {
                let local = listener.local;
                let new_id = state.sockets.insert_handle(Socket {
                    domain,
                    nonblocking: false,
                    refs: 1,
                    detached: false,
                    kind: SocketKind::Stream(TcpStream::accepted(resource, local, peer)),
                });
                drop(state);
                self.in_coordinator(Some(new_id), move |shared| shared.read_chain(new_id, resource));
                return Ok((new_id, peer));
            }
            if nonblocking {
                return Err(syscall_error(Errno::EAGAIN, "accept", "no pending connections"));
            }
            self.shared.changed.wait(&mut state);
        }
    }

    /// Connects to `addr`. A non-blocking socket returns `EINPROGRESS` and
    /// becomes writable once the outcome is known.
    pub fn connect(&self, id: SocketId, addr: SocketAddr) -> Result<(), Errno> {
        let mut state = self.shared.state.lock();
        let sock = state.live_mut(id, "connect")?;
        if !family_matches(sock.domain, &addr) {
            return Err(syscall_error(Errno::EAFNOSUPPORT, "connect", "address family does not match socket"));
        }
        let nonblocking = sock.nonblocking;
        let earlier = match &mut sock.kind {
            SocketKind::Unopened { .. } => None,
            SocketKind::Stream(s) => match s.state {
                StreamState::Open => return Err(syscall_error(Errno::EISCONN, "connect", "already connected")),
                StreamState::Connecting => {
                    return Err(syscall_error(Errno::EALREADY, "connect", "connection already in progress"))
                }
                StreamState::Closed => Some(s.error.take()),
            },
            SocketKind::Server(_) => {
                return Err(syscall_error(Errno::EINVAL, "connect", "socket is listening"));
            }
        };
        match earlier {
            // the outcome of an earlier non-blocking attempt
            Some(Some(e)) => {
                sock.kind = SocketKind::Unopened { bound: None };
                return Err(syscall_error(e, "connect", "earlier connection attempt failed"));
            }
            Some(None) => return Err(syscall_error(Errno::EISCONN, "connect", "connection already closed")),
            None => {}
        }
        sock.kind = SocketKind::Stream(TcpStream::connecting(addr));
        drop(state);

        self.in_coordinator(Some(id), move |shared| {
            let pending = Stranded::new(shared, id);
            shared.host.tcp_connect(
                addr,
                Box::new(move |r: Result<(HostResource, SocketAddr), i32>| pending.defuse().on_connect(id, r)),
            );
        });
        if nonblocking {
            return Err(Errno::EINPROGRESS);
        }

        let mut state = self.shared.state.lock();
        loop {
            let sock = state.live_mut(id, "connect")?;
            let outcome = match &mut sock.kind {
                SocketKind::Stream(s) => match s.state {
                    StreamState::Connecting => None,
                    StreamState::Open => Some(Ok(())),
                    StreamState::Closed => Some(Err(s.error.take().unwrap_or(Errno::ECONNREFUSED))),
                },
                _ => Some(Err(Errno::EBADF)),
            };
            match outcome {
                None => self.shared.changed.wait(&mut state),
                Some(Ok(())) => return Ok(()),
                Some(Err(e)) => {
                    sock.kind = SocketKind::Unopened { bound: None };
                    return Err(syscall_error(e, "connect", "connection failed"));
                }
            }
        }
    }

    /// Drains the inbound queue. Returns 0 only once the peer has closed and
    /// everything it sent has been read.
    pub fn read(&self, id: SocketId, buf: &mut [u8]) -> Result<usize, Errno> {
        let mut state = self.shared.state.lock();
        loop {
            let sock = state.live_mut(id, "read")?;
            let nonblocking = sock.nonblocking;
            let stream = match &mut sock.kind {
                SocketKind::Stream(s) => s,
                _ => return Err(syscall_error(Errno::ENOTCONN, "read", "socket is not connected")),
            };
            if buf.is_empty() {
                return Ok(0);
            }
            if !stream.inbound.is_empty() {
                let n = buf.len().min(stream.inbound.len());
                for (dst, src) in buf.iter_mut().zip(stream.inbound.drain(..n)) {
                    *dst = src;
                }
                let resume = match stream.resource {
                    Some(resource)
                        if !stream.reading
                            && !stream.shutdown
                            && stream.state == StreamState::Open
                            && stream.inbound.len() < self.shared.buffer_size =>
                    {
                        stream.reading = true;
                        Some(resource)
                    }
                    _ => None,
                };
                drop(state);
                if let Some(resource) = resume {
                    self.in_coordinator(Some(id), move |shared| shared.read_chain(id, resource));
                }
                return Ok(n);
            }
            if stream.state == StreamState::Closed {
                return Ok(0);
            }
            if nonblocking {
                return Err(syscall_error(Errno::EAGAIN, "read", "no data available"));
            }
            self.shared.changed.wait(&mut state);
        }
    }

    /// Queues `buf` for sending. A non-blocking socket returns at once as if
    /// everything was sent; a blocking one waits until the host took it all.
    pub fn write(&self, id: SocketId, buf: &[u8]) -> Result<usize, Errno> {
        let mut state = self.shared.state.lock();
        let target = loop {
            let buffer_size = self.shared.buffer_size;
            let sock = state.live_mut(id, "write")?;
            let nonblocking = sock.nonblocking;
            let stream = match &mut sock.kind {
                SocketKind::Stream(s) => s,
                _ => return Err(syscall_error(Errno::ENOTCONN, "write", "socket is not connected")),
            };
            match stream.state {
                StreamState::Connecting if nonblocking => {
                    return Err(syscall_error(Errno::EAGAIN, "write", "connection in progress"));
                }
                StreamState::Connecting => {
                    self.shared.changed.wait(&mut state);
                    continue;
                }
                StreamState::Closed => return Err(syscall_error(Errno::EPIPE, "write", "connection closed")),
                StreamState::Open if stream.shutdown => {
                    return Err(syscall_error(Errno::EPIPE, "write", "socket was shut down"));
                }
                StreamState::Open => {}
            }
            if buf.is_empty() {
                return Ok(0);
            }
            if nonblocking && stream.outbound.len() >= buffer_size {
                return Err(syscall_error(Errno::EAGAIN, "write", "outbound queue is full"));
            }
            stream.outbound.extend(buf);
            stream.bytes_queued += buf.len() as u64;
            break (!nonblocking).then_some(stream.bytes_queued);
        };
        drop(state);
        self.in_coordinator(Some(id), move |shared| shared.write_chain(id));

        let target = match target {
            Some(target) => target,
            None => return Ok(buf.len()),
        };
        let mut state = self.shared.state.lock();
        loop {
            let stream = match state.sockets.get(id) {
                Some(Socket { kind: SocketKind::Stream(s), .. }) => s,
                _ => return Err(syscall_error(Errno::EBADF, "write", "socket closed during write")),
            };
            if stream.bytes_sent >= target {
                return Ok(buf.len());
            }
            if stream.state != StreamState::Open && !stream.write_in_flight {
                let e = stream.error.unwrap_or(Errno::EPIPE);
                return Err(syscall_error(e, "write", "connection closed during write"));
            }
            self.shared.changed.wait(&mut state);
        }
    }

    /// Releases the host connection in both directions once queued bytes
    /// are sent. The socket stays allocated until closed.
    pub fn shutdown(&self, id: SocketId, how: i32) -> Result<(), Errno> {
        if !matches!(how, SHUT_RD | SHUT_WR | SHUT_RDWR) {
            return Err(syscall_error(Errno::EINVAL, "shutdown", "bad shutdown direction"));
        }
        let mut state = self.shared.state.lock();
        match &mut state.live_mut(id, "shutdown")?.kind {
            SocketKind::Stream(s) if s.state == StreamState::Open => s.shutdown = true,
            _ => return Err(syscall_error(Errno::ENOTCONN, "shutdown", "socket is not connected")),
        }
        let release = state.release_if_done(id);
        drop(state);
        self.shared.changed.notify_all();
        self.release(release.into_iter().collect());
        Ok(())
    }

    /// Drops one descriptor's reference. The last one closes the socket;
    /// unsent bytes are still flushed before the host connection goes away.
    pub fn close(&self, id: SocketId) -> Result<(), Errno> {
        let mut state = self.shared.state.lock();
        let sock = state.live_mut(id, "close")?;
        sock.refs = sock.refs.saturating_sub(1);
        if sock.refs > 0 {
            return Ok(());
        }
        sock.detached = true;
        let mut release = Vec::new();
        match &mut sock.kind {
            SocketKind::Unopened { .. } => {
                state.sockets.free_handle(id);
            }
            SocketKind::Server(l) => {
                l.state = ListenState::Closed;
                release.extend(l.resource.take());
                release.extend(l.pending.drain(..).map(|(resource, _)| resource));
                state.sockets.free_handle(id);
            }
            SocketKind::Stream(s) => {
                s.shutdown = true;
                release.extend(state.release_if_done(id));
            }
        }
        drop(state);
        self.shared.changed.notify_all();
        self.release(release);
        Ok(())
    }

    pub fn getsockname(&self, id: SocketId) -> Result<SocketAddr, Errno> {
        let state = self.shared.state.lock();
        let sock = state.live(id, "getsockname")?;
        Ok(match &sock.kind {
            SocketKind::Unopened { bound } => bound.unwrap_or_else(|| unspecified(sock.domain)),
            SocketKind::Stream(s) => s.local.unwrap_or_else(|| unspecified(sock.domain)),
            SocketKind::Server(l) => l.local,
        })
    }

    pub fn getpeername(&self, id: SocketId) -> Result<SocketAddr, Errno> {
        let state = self.shared.state.lock();
        match &state.live(id, "getpeername")?.kind {
            SocketKind::Stream(s) if s.state == StreamState::Open => {
                s.peer.ok_or_else(|| syscall_error(Errno::ENOTCONN, "getpeername", "no peer"))
            }
            _ => Err(syscall_error(Errno::ENOTCONN, "getpeername", "socket is not connected")),
        }
    }

    pub fn is_ready(&self, id: SocketId, which: Readiness) -> Result<bool, Errno> {
        let state = self.shared.state.lock();
        Ok(state.live(id, "select")?.is_ready(which, self.shared.buffer_size))
    }

    fn count_ready<K>(
        &self,
        state: &NetState,
        sets: [(&[(K, SocketId)], Readiness); 3],
    ) -> Result<usize, Errno> {
        let mut ready = 0;
        for (set, which) in sets {
            for (_, id) in set {
                if state.live(*id, "select")?.is_ready(which, self.shared.buffer_size) {
                    ready += 1;
                }
            }
        }
        Ok(ready)
    }

    /// Waits until any listed socket is ready in its set's sense, or until
    /// `timeout` passes (`None` waits forever). Entries that are not ready
    /// are then removed from each set and the survivors counted.
    pub fn select<K>(
        &self,
        readfds: &mut Vec<(K, SocketId)>,
        writefds: &mut Vec<(K, SocketId)>,
        exceptfds: &mut Vec<(K, SocketId)>,
        timeout: Option<interface::RustDuration>,
    ) -> Result<usize, Errno> {
        let deadline = timeout.map(|t| interface::deadline_after(t));
        let mut state = self.shared.state.lock();
        loop {
            let ready = self.count_ready(
                &state,
                [
                    (readfds.as_slice(), Readiness::Read),
                    (writefds.as_slice(), Readiness::Write),
                    (exceptfds.as_slice(), Readiness::Exception),
                ],
            )?;
            if ready > 0 {
                break;
            }
            match deadline {
                Some(Some(deadline)) => {
                    if interface::RustInstant::now() >= deadline {
                        break;
                    }
                    self.shared.changed.wait_until(&mut state, deadline);
                }
                // no timeout, or one too large to represent
                _ => self.shared.changed.wait(&mut state),
            }
        }

        let buffer_size = self.shared.buffer_size;
        let apply = |set: &mut Vec<(K, SocketId)>, which: Readiness| {
            set.retain(|(_, id)| {
                state
                    .sockets
                    .get(*id)
                    .map_or(false, |sock| sock.is_ready(which, buffer_size))
            });
            set.len()
        };
        Ok(apply(readfds, Readiness::Read) + apply(writefds, Readiness::Write) + apply(exceptfds, Readiness::Exception))
    }
}

// Name lookups. These fail with EAI_* codes, not errnos.
impl SocketSubsystem {
    // Asks the host on the coordinator thread and waits for the answer.
    fn host_lookup<T, F>(&self, start: F) -> Result<T, i32>
    where
        T: Send + 'static,
        F: FnOnce(&dyn HostNetwork, HostCallback<T>) + Send + 'static,
    {
        let shared = self.shared.clone();
        let slot: interface::RustRfc<interface::Mutex<Option<T>>> =
            interface::RustRfc::new(interface::Mutex::new(None));
        let out = slot.clone();
        let result = self.coordinator.run_job(Box::new(move |entry: JobEntry| {
            start(
                &*shared.host,
                Box::new(move |r: Result<T, i32>| match r {
                    Ok(value) => {
                        *out.lock() = Some(value);
                        entry.finish(0);
                    }
                    Err(code) => entry.finish(code),
                }),
            );
        }));
        let value = slot.lock().take();
        match value {
            Some(value) if result >= 0 => Ok(value),
            _ if result == Errno::ENOENT.as_retval() => Err(EAI_NONAME),
            _ => {
                log::debug!("host name lookup failed with {}", result);
                Err(EAI_FAIL)
            }
        }
    }

    /// Resolves `host` and `service` into stream socket addresses.
    ///
    /// Numeric hosts never reach the host resolver. Without a host the answer
    /// is the loopback address, or the unspecified address under
    /// `AI_PASSIVE`. The service must be a port number.
    pub fn getaddrinfo(&self, host: Option<&str>, service: Option<&str>, hints: &AddrHints) -> Result<Vec<AddrInfo>, i32> {
        if hints.family != AF_UNSPEC && hints.family != AF_INET && hints.family != AF_INET6 {
            return Err(EAI_FAMILY);
        }
        if hints.socktype != 0 && hints.socktype != SOCK_STREAM {
            return Err(EAI_SOCKTYPE);
        }
        if hints.flags & !(AI_PASSIVE | AI_CANONNAME | AI_NUMERICHOST) != 0 {
            return Err(EAI_BADFLAGS);
        }
        let port = match service {
            Some(service) => service.parse::<u16>().map_err(|_| EAI_SERVICE)?,
            None => 0,
        };
        let domain = if hints.family == AF_INET6 { AF_INET6 } else { AF_INET };

        let (addrs, canonname) = match host {
            None if hints.flags & AI_PASSIVE != 0 => (vec![unspecified(domain).ip()], None),
            None if domain == AF_INET6 => (vec![IpAddr::V6(Ipv6Addr::LOCALHOST)], None),
            None => (vec![IpAddr::V4(Ipv4Addr::LOCALHOST)], None),
            Some(name) => match name.parse::<IpAddr>() {
                Ok(ip) => (vec![ip], None),
                Err(_) if hints.flags & AI_NUMERICHOST != 0 => return Err(EAI_NONAME),
                Err(_) => {
                    let owned = name.to_string();
                    let found = self.host_lookup(move |host, done| host.lookup_host(&owned, done))?;
                    (found, (hints.flags & AI_CANONNAME != 0).then(|| name.to_string()))
                }
            },
        };

        let answers: Vec<AddrInfo> = addrs
            .into_iter()
            .map(|ip| SocketAddr::new(ip, port))
            .filter(|addr| hints.family == AF_UNSPEC || family_matches(hints.family, addr))
            .enumerate()
            .map(|(i, addr)| AddrInfo {
                family: if addr.is_ipv4() { AF_INET } else { AF_INET6 },
                socktype: SOCK_STREAM,
                protocol: hints.protocol,
                addr,
                canonname: if i == 0 { canonname.clone() } else { None },
            })
            .collect();
        if answers.is_empty() {
            return Err(EAI_NONAME);
        }
        log::trace!("resolved {:?} to {} addresses", host, answers.len());
        Ok(answers)
    }

    /// The first IPv4 address `name` resolves to.
    pub fn gethostbyname(&self, name: &str) -> Result<Ipv4Addr, i32> {
        let hints = AddrHints {
            family: AF_INET,
            ..AddrHints::default()
        };
        let answers = self.getaddrinfo(Some(name), None, &hints)?;
        match answers.first().map(|a| a.addr.ip()) {
            Some(IpAddr::V4(ip)) => Ok(ip),
            _ => Err(EAI_NONAME),
        }
    }

    /// Returns the host and service text for `addr`. The host is a name when
    /// the host resolver knows one and `NI_NUMERICHOST` is not set, otherwise
    /// the numeric address unless `NI_NAMEREQD` demands a name.
    pub fn getnameinfo(&self, addr: &SocketAddr, flags: i32) -> Result<(String, String), i32> {
        if flags & !(NI_NUMERICHOST | NI_NUMERICSERV | NI_NAMEREQD) != 0 {
            return Err(EAI_BADFLAGS);
        }
        let service = addr.port().to_string();
        if flags & NI_NUMERICHOST != 0 {
            return Ok((addr.ip().to_string(), service));
        }
        let ip = addr.ip();
        match self.host_lookup(move |host, done| host.lookup_addr(ip, done)) {
            Ok(name) => Ok((name, service)),
            Err(EAI_NONAME) if flags & NI_NAMEREQD == 0 => Ok((ip.to_string(), service)),
            Err(code) => Err(code),
        }
    }
}
