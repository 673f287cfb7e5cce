//! Many logical byte streams multiplexed over one message channel.
//!
//! Stream `n` lives at `/<n>`. Writes leave as `"<prefix>:<n>:<payload>"`
//! envelopes through an [`OutboundBridge`]; envelopes handed to
//! [`PipeMount::receive`] are queued for the addressed stream, and `read`
//! blocks until its stream has bytes.

use crate::interface::{
    self, syscall_error, Coordinator, DirEntry, Errno, JobEntry, MessageChannel, NodeId, StatData,
};
use crate::safeposix::syscalls::fs_constants::*;

use super::{path_components, Mount};

pub const DEFAULT_PIPE_PREFIX: &str = "JSPipeMount";

const ROOT_INO: NodeId = 0;

pub trait OutboundBridge: Send + Sync {
    fn post(&self, message: Vec<u8>) -> Result<(), Errno>;
}

/// Posts messages from the coordinator thread without waiting.
pub struct PostMessageBridge {
    coordinator: Coordinator,
    channel: interface::RustRfc<dyn MessageChannel>,
}

impl PostMessageBridge {
    pub fn new(coordinator: Coordinator, channel: interface::RustRfc<dyn MessageChannel>) -> Self {
        PostMessageBridge { coordinator, channel }
    }
}

impl OutboundBridge for PostMessageBridge {
    fn post(&self, message: Vec<u8>) -> Result<(), Errno> {
        let channel = self.channel.clone();
        self.coordinator.submit(Box::new(move |entry: JobEntry| {
            channel.post_message(message);
            entry.finish(0);
        }));
        Ok(())
    }
}

pub struct PipeMount {
    prefix: interface::RustLock<String>,
    is_tty: interface::RustAtomicBool,
    bridge: interface::RustRfc<dyn OutboundBridge>,
    incoming: interface::Mutex<interface::RustBTreeMap<u32, interface::RustDeque<u8>>>,
    arrived: interface::Condvar,
}

impl PipeMount {
    pub fn new(bridge: interface::RustRfc<dyn OutboundBridge>) -> Self {
        PipeMount {
            prefix: interface::RustLock::new(DEFAULT_PIPE_PREFIX.to_string()),
            is_tty: interface::RustAtomicBool::new(true),
            bridge,
            incoming: interface::Mutex::new(interface::RustBTreeMap::new()),
            arrived: interface::Condvar::new(),
        }
    }

    pub fn prefix(&self) -> String {
        self.prefix.read().clone()
    }

    pub fn set_prefix(&self, prefix: &str) {
        *self.prefix.write() = prefix.to_string();
    }

    pub fn set_is_tty(&self, is_tty: bool) {
        self.is_tty.store(is_tty, interface::RustAtomicOrdering::Relaxed);
    }

    /// Queues an inbound envelope for its stream. Returns false when the
    /// message is not addressed to this mount or is malformed.
    pub fn receive(&self, message: &[u8]) -> bool {
        let prefix = self.prefix();
        let rest = match message.strip_prefix(prefix.as_bytes()) {
            Some(rest) => rest,
            None => return false,
        };
        let rest = match rest.strip_prefix(b":") {
            Some(rest) => rest,
            None => return false,
        };
        let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
        if digits == 0 || rest.get(digits) != Some(&b':') {
            return false;
        }
        let id = match std::str::from_utf8(&rest[..digits]).ok().and_then(|s| s.parse::<u32>().ok()) {
            Some(id) => id,
            None => return false,
        };
        let payload = &rest[digits + 1..];
        self.incoming.lock().entry(id).or_default().extend(payload);
        self.arrived.notify_all();
        true
    }

    fn stream_id(node: NodeId) -> Result<u32, Errno> {
        node.checked_sub(1)
            .and_then(|id| u32::try_from(id).ok())
            .ok_or_else(|| syscall_error(Errno::EISDIR, "pipemount", "node is the pipe directory"))
    }
}

impl Mount for PipeMount {
    fn get_node(&self, path: &str) -> Result<StatData, Errno> {
        let comps: Vec<&str> = path_components(path).collect();
        let node = match comps.as_slice() {
            [] => ROOT_INO,
            [id] => id
                .parse::<u32>()
                .map(|id| id as NodeId + 1)
                .map_err(|_| syscall_error(Errno::ENOENT, "getnode", "pipe names are numbers"))?,
            _ => return Err(syscall_error(Errno::ENOENT, "getnode", "no such pipe")),
        };
        self.stat(node)
    }

    fn creat(&self, path: &str, _mode: u32) -> Result<StatData, Errno> {
        self.get_node(path)
    }

    fn stat(&self, node: NodeId) -> Result<StatData, Errno> {
        let mode = if node == ROOT_INO {
            S_IFDIR | S_IRWXA
        } else {
            S_IFCHR | S_IRWXA
        };
        Ok(StatData {
            st_ino: node,
            st_mode: mode,
            st_nlink: 1,
            st_blksize: DEFAULT_BLKSIZE,
            ..Default::default()
        })
    }

    fn fsync(&self, _node: NodeId) -> Result<(), Errno> {
        Ok(())
    }

    fn getdents(&self, node: NodeId, offset: usize, count: usize) -> Result<Vec<DirEntry>, Errno> {
        if node != ROOT_INO {
            return Err(syscall_error(Errno::ENOTDIR, "getdents", "pipe is not a directory"));
        }
        let incoming = self.incoming.lock();
        Ok(incoming
            .keys()
            .enumerate()
            .skip(offset)
            .take(count)
            .map(|(i, id)| DirEntry::new(*id as NodeId + 1, i + 1, &id.to_string()))
            .collect())
    }

    fn read(&self, node: NodeId, _offset: usize, buf: &mut [u8]) -> Result<usize, Errno> {
        let id = Self::stream_id(node)?;
        if buf.is_empty() {
            return Ok(0);
        }
        let mut incoming = self.incoming.lock();
        loop {
            if let Some(queue) = incoming.get_mut(&id) {
                if !queue.is_empty() {
                    let n = buf.len().min(queue.len());
                    for (dst, src) in buf.iter_mut().zip(queue.drain(..n)) {
                        *dst = src;
                    }
                    return Ok(n);
                }
            }
            self.arrived.wait(&mut incoming);
        }
    }

    fn write(&self, node: NodeId, _offset: usize, buf: &[u8]) -> Result<usize, Errno> {
        let id = Self::stream_id(node)?;
        let mut message = format!("{}:{}:", self.prefix(), id).into_bytes();
        message.extend_from_slice(buf);
        self.bridge.post(message)?;
        Ok(buf.len())
    }

    fn truncate(&self, _node: NodeId, _length: usize) -> Result<(), Errno> {
        Ok(())
    }

    fn isatty(&self, node: NodeId) -> bool {
        node != ROOT_INO && self.is_tty.load(interface::RustAtomicOrdering::Relaxed)
    }
}
