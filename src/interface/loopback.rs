//! In-process host implementations.
//!
//! These satisfy the host contracts without any real network or remote
//! storage: a TCP loopback keyed by port with its own hosts table, a
//! range-readable file table, a host file system, a key-value map and a
//! message log. Every completion is posted back through
//! the coordinator, never invoked inline.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use parking_lot::Mutex;

use super::coordinator::Coordinator;
use super::errnos::Errno;
use super::host::*;

const EPHEMERAL_BASE: u16 = 40000;

fn complete<T: Send + 'static>(coordinator: &Coordinator, done: HostCallback<T>, result: Result<T, i32>) {
    coordinator.post(move || done(result));
}

struct Listener {
    addr: SocketAddr,
    backlog: VecDeque<(HostResource, SocketAddr)>,
    waiting: Option<HostCallback<(HostResource, SocketAddr)>>,
}

struct Stream {
    peer: HostResource,
    inbox: VecDeque<u8>,
    peer_closed: bool,
    pending_read: Option<(usize, HostCallback<Vec<u8>>)>,
}

impl Stream {
    fn take(&mut self, max: usize) -> Vec<u8> {
        let n = max.min(self.inbox.len());
        self.inbox.drain(..n).collect()
    }
}

#[derive(Default)]
struct LoopbackState {
    next_resource: HostResource,
    next_port: u16,
    ports: HashMap<u16, HostResource>,
    listeners: HashMap<HostResource, Listener>,
    streams: HashMap<HostResource, Stream>,
    hosts: BTreeMap<String, Vec<IpAddr>>,
}

impl LoopbackState {
    fn resource(&mut self) -> HostResource {
        self.next_resource += 1;
        self.next_resource
    }

    fn ephemeral_port(&mut self) -> u16 {
        loop {
            let port = EPHEMERAL_BASE.wrapping_add(self.next_port);
            self.next_port = self.next_port.wrapping_add(1);
            if port != 0 && !self.ports.contains_key(&port) {
                return port;
            }
        }
    }
}

/// TCP semantics between sockets of the same process.
pub struct LoopbackNetwork {
    coordinator: Coordinator,
    state: Mutex<LoopbackState>,
}

impl LoopbackNetwork {
    pub fn new(coordinator: Coordinator) -> Self {
        let mut state = LoopbackState::default();
        state.hosts.insert(
            "localhost".to_string(),
            vec![IpAddr::V4(Ipv4Addr::LOCALHOST), IpAddr::V6(Ipv6Addr::LOCALHOST)],
        );
        LoopbackNetwork {
            coordinator,
            state: Mutex::new(state),
        }
    }

    /// Makes `name` resolve to `addrs`, replacing any earlier entry.
    pub fn add_host(&self, name: &str, addrs: &[IpAddr]) {
        self.state
            .lock()
            .hosts
            .insert(name.to_ascii_lowercase(), addrs.to_vec());
    }

    fn close_stream(&self, state: &mut LoopbackState, resource: HostResource) {
        let stream = match state.streams.remove(&resource) {
            Some(stream) => stream,
            None => return,
        };
        if let Some((_, done)) = stream.pending_read {
            complete(&self.coordinator, done, Ok(Vec::new()));
        }
        if let Some(peer) = state.streams.get_mut(&stream.peer) {
            peer.peer_closed = true;
            if let Some((max, done)) = peer.pending_read.take() {
                let data = peer.take(max);
                complete(&self.coordinator, done, Ok(data));
            }
        }
    }
}

impl HostResolver for LoopbackNetwork {
    fn lookup_host(&self, name: &str, done: HostCallback<Vec<IpAddr>>) {
        let result = match self.state.lock().hosts.get(&name.to_ascii_lowercase()) {
            Some(addrs) if !addrs.is_empty() => Ok(addrs.clone()),
            _ => Err(Errno::ENOENT.as_retval()),
        };
        complete(&self.coordinator, done, result);
    }

    fn lookup_addr(&self, addr: IpAddr, done: HostCallback<String>) {
        let result = self
            .state
            .lock()
            .hosts
            .iter()
            .find(|(_, addrs)| addrs.contains(&addr))
            .map(|(name, _)| name.clone())
            .ok_or(Errno::ENOENT.as_retval());
        complete(&self.coordinator, done, result);
    }
}

impl HostNetwork for LoopbackNetwork {
    fn tcp_connect(&self, addr: SocketAddr, done: HostCallback<(HostResource, SocketAddr)>) {
        let mut state = self.state.lock();
        let listener_id = match state.ports.get(&addr.port()) {
            Some(id) => *id,
            None => {
                complete(&self.coordinator, done, Err(Errno::ECONNREFUSED.as_retval()));
                return;
            }
        };
        let client = state.resource();
        let server = state.resource();
        let client_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), state.ephemeral_port());
        for (id, peer) in [(client, server), (server, client)] {
            state.streams.insert(
                id,
                Stream {
                    peer,
                    inbox: VecDeque::new(),
                    peer_closed: false,
                    pending_read: None,
                },
            );
        }
        if let Some(listener) = state.listeners.get_mut(&listener_id) {
            match listener.waiting.take() {
                Some(accept_done) => complete(&self.coordinator, accept_done, Ok((server, client_addr))),
                None => listener.backlog.push_back((server, client_addr)),
            }
        }
        complete(&self.coordinator, done, Ok((client, client_addr)));
    }

    fn tcp_listen(&self, addr: SocketAddr, _backlog: i32, done: HostCallback<(HostResource, SocketAddr)>) {
        let mut state = self.state.lock();
        let port = if addr.port() == 0 {
            state.ephemeral_port()
        } else {
            addr.port()
        };
        if state.ports.contains_key(&port) {
            complete(&self.coordinator, done, Err(Errno::EADDRINUSE.as_retval()));
            return;
        }
        let id = state.resource();
        let bound = SocketAddr::new(addr.ip(), port);
        state.ports.insert(port, id);
        state.listeners.insert(
            id,
            Listener {
                addr: bound,
                backlog: VecDeque::new(),
                waiting: None,
            },
        );
        complete(&self.coordinator, done, Ok((id, bound)));
    }

    fn tcp_accept(&self, listener: HostResource, done: HostCallback<(HostResource, SocketAddr)>) {
        let mut state = self.state.lock();
        let entry = match state.listeners.get_mut(&listener) {
            Some(entry) => entry,
            None => {
                complete(&self.coordinator, done, Err(Errno::EINVAL.as_retval()));
                return;
            }
        };
        if let Some(conn) = entry.backlog.pop_front() {
            complete(&self.coordinator, done, Ok(conn));
        } else if entry.waiting.is_some() {
            complete(&self.coordinator, done, Err(Errno::EALREADY.as_retval()));
        } else {
            entry.waiting = Some(done);
        }
    }

    fn tcp_read(&self, stream: HostResource, max: usize, done: HostCallback<Vec<u8>>) {
        let mut state = self.state.lock();
        let entry = match state.streams.get_mut(&stream) {
            Some(entry) => entry,
            None => {
                complete(&self.coordinator, done, Err(Errno::EBADF.as_retval()));
                return;
            }
        };
        if !entry.inbox.is_empty() || entry.peer_closed {
            let data = entry.take(max);
            complete(&self.coordinator, done, Ok(data));
        } else {
            entry.pending_read = Some((max, done));
        }
    }

    fn tcp_write(&self, stream: HostResource, data: Vec<u8>, done: HostCallback<usize>) {
        let mut state = self.state.lock();
        let peer_id = match state.streams.get(&stream) {
            Some(entry) if !entry.peer_closed => entry.peer,
            Some(_) => {
                complete(&self.coordinator, done, Err(Errno::EPIPE.as_retval()));
                return;
            }
            None => {
                complete(&self.coordinator, done, Err(Errno::EBADF.as_retval()));
                return;
            }
        };
        let peer = match state.streams.get_mut(&peer_id) {
            Some(peer) => peer,
            None => {
                complete(&self.coordinator, done, Err(Errno::EPIPE.as_retval()));
                return;
            }
        };
        let len = data.len();
        peer.inbox.extend(data);
        if let Some((max, read_done)) = peer.pending_read.take() {
            let chunk = peer.take(max);
            complete(&self.coordinator, read_done, Ok(chunk));
        }
        complete(&self.coordinator, done, Ok(len));
    }

    fn close(&self, resource: HostResource) {
        let mut state = self.state.lock();
        if let Some(listener) = state.listeners.remove(&resource) {
            state.ports.remove(&listener.addr.port());
            if let Some(done) = listener.waiting {
                complete(&self.coordinator, done, Err(Errno::EINVAL.as_retval()));
            }
            for (stream, _) in listener.backlog {
                self.close_stream(&mut state, stream);
            }
            return;
        }
        self.close_stream(&mut state, resource);
    }
}

/// Read-only files addressed by path and read by byte range.
pub struct MemoryRangeSource {
    coordinator: Coordinator,
    files: Mutex<HashMap<String, Vec<u8>>>,
    opened: Mutex<Vec<String>>,
}

impl MemoryRangeSource {
    pub fn new(coordinator: Coordinator) -> Self {
        MemoryRangeSource {
            coordinator,
            files: Mutex::new(HashMap::new()),
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn insert(&self, path: &str, data: Vec<u8>) {
        self.files.lock().insert(path.to_string(), data);
    }

    pub fn remove(&self, path: &str) {
        self.files.lock().remove(path);
    }
}

impl RangeSource for MemoryRangeSource {
    fn open(&self, path: &str, done: HostCallback<HostResource>) {
        let result = if self.files.lock().contains_key(path) {
            let mut opened = self.opened.lock();
            opened.push(path.to_string());
            Ok(opened.len() as HostResource)
        } else {
            Err(Errno::ENOENT.as_retval())
        };
        complete(&self.coordinator, done, result);
    }

    fn read_range(&self, file: HostResource, offset: u64, len: usize, done: HostCallback<Vec<u8>>) {
        let path = (file as usize)
            .checked_sub(1)
            .and_then(|i| self.opened.lock().get(i).cloned());
        let files = self.files.lock();
        let result = match path.as_ref().and_then(|p| files.get(p)) {
            Some(data) => {
                let start = (offset as usize).min(data.len());
                let end = start.saturating_add(len).min(data.len());
                Ok(data[start..end].to_vec())
            }
            None => Err(Errno::EIO.as_retval()),
        };
        complete(&self.coordinator, done, result);
    }
}

#[derive(Default)]
struct HostFsState {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    handles: HashMap<HostResource, String>,
    next_handle: HostResource,
    flushes: usize,
}

impl HostFsState {
    fn handle_path(&self, file: HostResource) -> Result<String, i32> {
        self.handles.get(&file).cloned().ok_or(Errno::EBADF.as_retval())
    }

    fn parent_exists(&self, path: &str) -> bool {
        match path.rfind('/') {
            Some(0) => true,
            Some(i) => self.dirs.contains(&path[..i]),
            None => false,
        }
    }
}

/// Host storage kept in memory. Paths are absolute and `/` always exists.
pub struct MemoryHostFs {
    coordinator: Coordinator,
    state: Mutex<HostFsState>,
}

impl MemoryHostFs {
    pub fn new(coordinator: Coordinator) -> Self {
        let mut state = HostFsState::default();
        state.dirs.insert("/".to_string());
        MemoryHostFs {
            coordinator,
            state: Mutex::new(state),
        }
    }

    /// Direct access for seeding and inspection, bypassing the coordinator.
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().files.get(path).cloned()
    }

    pub fn set_contents(&self, path: &str, data: &[u8]) {
        self.state.lock().files.insert(path.to_string(), data.to_vec());
    }

    pub fn add_dir(&self, path: &str) {
        self.state.lock().dirs.insert(path.to_string());
    }

    /// Handles opened and not yet closed.
    pub fn open_handles(&self) -> usize {
        self.state.lock().handles.len()
    }

    pub fn flushes(&self) -> usize {
        self.state.lock().flushes
    }

    fn open_locked(state: &mut HostFsState, path: &str, create: bool) -> Result<HostResource, i32> {
        let exists = state.files.contains_key(path) || state.dirs.contains(path);
        match (exists, create) {
            (true, true) => return Err(Errno::EEXIST.as_retval()),
            (false, false) => return Err(Errno::ENOENT.as_retval()),
            (false, true) if !state.parent_exists(path) => return Err(Errno::ENOENT.as_retval()),
            (false, true) => {
                state.files.insert(path.to_string(), Vec::new());
            }
            (true, false) => {}
        }
        state.next_handle += 1;
        let handle = state.next_handle;
        state.handles.insert(handle, path.to_string());
        Ok(handle)
    }

    fn write_locked(state: &mut HostFsState, file: HostResource, offset: u64, data: &[u8]) -> Result<usize, i32> {
        let path = state.handle_path(file)?;
        let contents = state.files.get_mut(&path).ok_or(Errno::EISDIR.as_retval())?;
        let start = usize::try_from(offset).map_err(|_| Errno::EFBIG.as_retval())?;
        let end = start.checked_add(data.len()).ok_or(Errno::EFBIG.as_retval())?;
        if contents.len() < end {
            contents
                .try_reserve(end - contents.len())
                .map_err(|_| Errno::ENOSPC.as_retval())?;
            contents.resize(end, 0);
        }
        contents[start..end].copy_from_slice(data);
        Ok(data.len())
    }
}

impl HostFileSystem for MemoryHostFs {
    fn open(&self, path: &str, create: bool, done: HostCallback<HostResource>) {
        let result = Self::open_locked(&mut self.state.lock(), path, create);
        complete(&self.coordinator, done, result);
    }

    fn read(&self, file: HostResource, offset: u64, len: usize, done: HostCallback<Vec<u8>>) {
        let state = self.state.lock();
        let result = state.handle_path(file).and_then(|path| match state.files.get(&path) {
            Some(data) => {
                let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
                let end = start.saturating_add(len).min(data.len());
                Ok(data[start..end].to_vec())
            }
            None => Err(Errno::EISDIR.as_retval()),
        });
        drop(state);
        complete(&self.coordinator, done, result);
    }

    fn write(&self, file: HostResource, offset: u64, data: Vec<u8>, done: HostCallback<usize>) {
        let result = Self::write_locked(&mut self.state.lock(), file, offset, &data);
        complete(&self.coordinator, done, result);
    }

    fn query(&self, file: HostResource, done: HostCallback<HostFileInfo>) {
        let state = self.state.lock();
        let result = state.handle_path(file).map(|path| match state.files.get(&path) {
            Some(data) => HostFileInfo {
                size: data.len() as u64,
                is_dir: false,
            },
            None => HostFileInfo { size: 0, is_dir: true },
        });
        drop(state);
        complete(&self.coordinator, done, result);
    }

    fn flush(&self, file: HostResource, done: HostCallback<()>) {
        let mut state = self.state.lock();
        let result = state.handle_path(file).map(|_| state.flushes += 1);
        drop(state);
        complete(&self.coordinator, done, result);
    }

    fn make_dir(&self, path: &str, done: HostCallback<()>) {
        let mut state = self.state.lock();
        let result = if state.dirs.contains(path) || state.files.contains_key(path) {
            Err(Errno::EEXIST.as_retval())
        } else if !state.parent_exists(path) {
            Err(Errno::ENOENT.as_retval())
        } else {
            state.dirs.insert(path.to_string());
            Ok(())
        };
        drop(state);
        complete(&self.coordinator, done, result);
    }

    fn read_dir(&self, path: &str, done: HostCallback<Vec<String>>) {
        let state = self.state.lock();
        let result = if state.dirs.contains(path) {
            let prefix = if path == "/" { "/".to_string() } else { format!("{}/", path) };
            let names: BTreeSet<String> = state
                .dirs
                .iter()
                .chain(state.files.keys())
                .filter_map(|p| p.strip_prefix(&prefix))
                .filter(|rest| !rest.is_empty() && !rest.contains('/'))
                .map(str::to_string)
                .collect();
            Ok(names.into_iter().collect())
        } else if state.files.contains_key(path) {
            Err(Errno::ENOTDIR.as_retval())
        } else {
            Err(Errno::ENOENT.as_retval())
        };
        drop(state);
        complete(&self.coordinator, done, result);
    }

    fn close(&self, file: HostResource) {
        self.state.lock().handles.remove(&file);
    }
}

/// Key-value store held in a sorted map.
pub struct MemoryKvStore {
    coordinator: Coordinator,
    values: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    pub fn new(coordinator: Coordinator) -> Self {
        MemoryKvStore {
            coordinator,
            values: Mutex::new(BTreeMap::new()),
        }
    }

    /// Direct access for seeding and inspection, bypassing the coordinator.
    pub fn value(&self, key: &str) -> Option<Vec<u8>> {
        self.values.lock().get(key).cloned()
    }

    pub fn set_value(&self, key: &str, value: &[u8]) {
        self.values.lock().insert(key.to_string(), value.to_vec());
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str, done: HostCallback<Option<Vec<u8>>>) {
        let value = self.values.lock().get(key).cloned();
        complete(&self.coordinator, done, Ok(value));
    }

    fn put(&self, key: &str, value: Vec<u8>, done: HostCallback<()>) {
        self.values.lock().insert(key.to_string(), value);
        complete(&self.coordinator, done, Ok(()));
    }

    fn list(&self, prefix: &str, done: HostCallback<Vec<String>>) {
        let keys = self
            .values
            .lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        complete(&self.coordinator, done, Ok(keys));
    }
}

/// Records every outbound message in order.
#[derive(Default)]
pub struct MessageLog {
    messages: Mutex<Vec<Vec<u8>>>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<Vec<u8>> {
        self.messages.lock().clone()
    }
}

impl MessageChannel for MessageLog {
    fn post_message(&self, message: Vec<u8>) {
        self.messages.lock().push(message);
    }
}
