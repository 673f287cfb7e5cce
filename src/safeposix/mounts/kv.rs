//! Files stored whole in a remote key-value store.
//!
//! A file is fetched in full when it is looked up and kept in memory only
//! while a lookup or an open handle holds it, so the next lookup after that
//! sees the store's current value. Writes only touch the local copy; `fsync`
//! and the last release push the whole value back. The key of a file is its
//! mount-relative path, e.g. `/notes/today`.

use crate::interface::{
    self, syscall_error, Coordinator, DirEntry, Errno, JobEntry, KeyValueStore, NodeId, SlotAllocator,
    StatData,
};
use crate::safeposix::syscalls::fs_constants::*;

use super::{path_components, resize_file, write_at, Mount};

const ROOT_INO: NodeId = 0;

struct KvNode {
    key: String,
    data: Vec<u8>,
    use_count: usize,
    // lookups not yet forgotten
    lookups: usize,
    dirty: bool,
}

impl KvNode {
    fn idle(&self) -> bool {
        self.use_count == 0 && self.lookups == 0
    }
}

type KvNodes = SlotAllocator<Option<KvNode>>;

pub struct KvMount {
    coordinator: Coordinator,
    store: interface::RustRfc<dyn KeyValueStore>,
    nodes: interface::Mutex<KvNodes>,
    // only changed with `nodes` locked
    path_map: interface::RustHashDashMap<String, NodeId>,
}

fn key_for(path: &str) -> String {
    let mut key = String::new();
    for comp in path_components(path) {
        key.push('/');
        key.push_str(comp);
    }
    key
}

impl KvMount {
    pub fn new(coordinator: Coordinator, store: interface::RustRfc<dyn KeyValueStore>) -> Self {
        let mut nodes = SlotAllocator::new();
        // slot 0 is the root directory
        nodes.insert(None);
        KvMount {
            coordinator,
            store,
            nodes: interface::Mutex::new(nodes),
            path_map: interface::RustHashDashMap::new(),
        }
    }

    /// Number of files currently held in memory.
    pub fn resident(&self) -> usize {
        self.path_map.len()
    }

    fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>, Errno> {
        let store = self.store.clone();
        let slot: interface::RustRfc<interface::Mutex<Option<Vec<u8>>>> = Default::default();
        let out = slot.clone();
        let key = key.to_string();
        let result = self.coordinator.run_job(Box::new(move |entry: JobEntry| {
            store.get(
                &key,
                Box::new(move |r: Result<Option<Vec<u8>>, i32>| match r {
                    Ok(value) => {
                        let found = value.is_some() as i32;
                        *out.lock() = value;
                        entry.finish(found);
                    }
                    Err(code) => entry.finish(code),
                }),
            );
        }));
        if result < 0 {
            return Err(syscall_error(Errno::EIO, "getnode", "remote fetch failed"));
        }
        let value = slot.lock().take();
        Ok(value)
    }

    fn push(&self, key: &str, value: Vec<u8>) -> Result<(), Errno> {
        let store = self.store.clone();
        let key = key.to_string();
        let result = self.coordinator.run_job(Box::new(move |entry: JobEntry| {
            store.put(
                &key,
                value,
                Box::new(move |r: Result<(), i32>| entry.finish(r.map(|_| 0).unwrap_or_else(|code| code))),
            );
        }));
        if result < 0 {
            return Err(syscall_error(Errno::EIO, "fsync", "remote push failed"));
        }
        Ok(())
    }

    // Adds a lookup to the node already loaded for `key`, if any.
    fn pin_locked(&self, nodes: &mut KvNodes, key: &str) -> Option<StatData> {
        let id = *self.path_map.get(key)?;
        match nodes.at_mut(id) {
            Some(Some(file)) => {
                file.lookups += 1;
                Some(Self::file_stat(file, id))
            }
            _ => None,
        }
    }

    // Loads `key` with one lookup on it, unless another thread loaded it
    // meanwhile, in which case that node wins, `data` is dropped and the
    // second value is false.
    fn pin_or_insert(&self, key: &str, data: Vec<u8>, dirty: bool) -> (StatData, bool) {
        let mut nodes = self.nodes.lock();
        if let Some(st) = self.pin_locked(&mut nodes, key) {
            return (st, false);
        }
        let node = KvNode {
            key: key.to_string(),
            data,
            use_count: 0,
            lookups: 1,
            dirty,
        };
        let st = Self::file_stat(&node, 0);
        let id = nodes.insert(Some(node));
        self.path_map.insert(key.to_string(), id);
        log::trace!("loaded {} ({} bytes) as node {}", key, st.st_size, id);
        (StatData { st_ino: id, ..st }, true)
    }

    // Pushes and unloads `node` once no handle or lookup holds it.
    fn settle(&self, node: NodeId) {
        let idle = matches!(self.nodes.lock().at(node), Some(Some(file)) if file.idle());
        if !idle {
            return;
        }
        if let Err(e) = self.flush(node) {
            log::warn!("dropping unsaved changes to node {}: {}", node, e);
        }
        let mut nodes = self.nodes.lock();
        // a lookup may have claimed it again during the push
        if !matches!(nodes.at(node), Some(Some(file)) if file.idle()) {
            return;
        }
        if let Some(Some(file)) = nodes.free(node) {
            self.path_map.remove_if(&file.key, |_, id| *id == node);
        }
    }

    fn file_stat(node: &KvNode, ino: NodeId) -> StatData {
        StatData {
            st_ino: ino,
            st_mode: S_IFREG | S_IRWXA,
            st_nlink: 1,
            st_size: node.data.len(),
            st_blksize: DEFAULT_BLKSIZE,
            st_blocks: (node.data.len() + 511) / 512,
            ..Default::default()
        }
    }

    fn with_file<R>(&self, node: NodeId, op: &str, f: impl FnOnce(&mut KvNode) -> R) -> Result<R, Errno> {
        let mut nodes = self.nodes.lock();
        match nodes.at_mut(node) {
            Some(Some(file)) => Ok(f(file)),
            Some(None) => Err(syscall_error(Errno::EISDIR, op, "node is the root directory")),
            None => Err(syscall_error(Errno::ENOENT, op, "no such file")),
        }
    }

    // Pushes the node's contents if they changed since the last push.
    fn flush(&self, node: NodeId) -> Result<(), Errno> {
        let pending = self.with_file(node, "fsync", |file| {
            if file.dirty {
                file.dirty = false;
                Some((file.key.clone(), file.data.clone()))
            } else {
                None
            }
        })?;
        if let Some((key, data)) = pending {
            if let Err(e) = self.push(&key, data) {
                let _ = self.with_file(node, "fsync", |file| file.dirty = true);
                return Err(e);
            }
        }
        Ok(())
    }
}

impl Mount for KvMount {
    fn get_node(&self, path: &str) -> Result<StatData, Errno> {
        let key = key_for(path);
        if key.is_empty() {
            return self.stat(ROOT_INO);
        }
        if let Some(st) = self.pin_locked(&mut self.nodes.lock(), &key) {
            return Ok(st);
        }
        match self.fetch(&key)? {
            Some(data) => Ok(self.pin_or_insert(&key, data, false).0),
            None => Err(syscall_error(Errno::ENOENT, "getnode", "no such key")),
        }
    }

    fn ref_node(&self, node: NodeId) {
        let _ = self.with_file(node, "ref", |file| file.use_count += 1);
    }

    fn unref_node(&self, node: NodeId) {
        if self
            .with_file(node, "unref", |file| file.use_count = file.use_count.saturating_sub(1))
            .is_ok()
        {
            self.settle(node);
        }
    }

    fn forget_node(&self, node: NodeId) {
        if self
            .with_file(node, "forget", |file| file.lookups = file.lookups.saturating_sub(1))
            .is_ok()
        {
            self.settle(node);
        }
    }

    fn creat(&self, path: &str, _mode: u32) -> Result<StatData, Errno> {
        let key = key_for(path);
        if key.is_empty() || self.path_map.contains_key(&key) || self.fetch(&key)?.is_some() {
            return Err(syscall_error(Errno::EEXIST, "creat", "key already exists"));
        }
        match self.pin_or_insert(&key, Vec::new(), true) {
            (st, true) => Ok(st),
            // created by someone else in the meantime
            (st, false) => {
                self.forget_node(st.st_ino);
                Err(syscall_error(Errno::EEXIST, "creat", "key already exists"))
            }
        }
    }

    fn stat(&self, node: NodeId) -> Result<StatData, Errno> {
        if node == ROOT_INO {
            return Ok(StatData {
                st_ino: ROOT_INO,
                st_mode: S_IFDIR | S_IRWXA,
                st_nlink: 2,
                st_blksize: DEFAULT_BLKSIZE,
                ..Default::default()
            });
        }
        self.with_file(node, "stat", |file| Self::file_stat(file, node))
    }

    fn fsync(&self, node: NodeId) -> Result<(), Errno> {
        if node == ROOT_INO {
            return Ok(());
        }
        self.flush(node)
    }

    fn getdents(&self, node: NodeId, offset: usize, count: usize) -> Result<Vec<DirEntry>, Errno> {
        if node != ROOT_INO {
            return Err(syscall_error(Errno::ENOTDIR, "getdents", "key is not a directory"));
        }
        let store = self.store.clone();
        let slot: interface::RustRfc<interface::Mutex<Vec<String>>> = Default::default();
        let out = slot.clone();
        let result = self.coordinator.run_job(Box::new(move |entry: JobEntry| {
            store.list(
                "/",
                Box::new(move |r: Result<Vec<String>, i32>| match r {
                    Ok(keys) => {
                        *out.lock() = keys;
                        entry.finish(0);
                    }
                    Err(code) => entry.finish(code),
                }),
            );
        }));
        if result < 0 {
            return Err(syscall_error(Errno::EIO, "getdents", "remote listing failed"));
        }
        let keys = slot.lock();
        Ok(keys
            .iter()
            .enumerate()
            .skip(offset)
            .take(count)
            .map(|(i, key)| {
                let ino = self.path_map.get(key).map(|id| *id).unwrap_or(0);
                DirEntry::new(ino, i + 1, key.trim_start_matches('/'))
            })
            .collect())
    }

    fn read(&self, node: NodeId, offset: usize, buf: &mut [u8]) -> Result<usize, Errno> {
        self.with_file(node, "read", |file| {
            if offset >= file.data.len() {
                return 0;
            }
            let n = buf.len().min(file.data.len() - offset);
            buf[..n].copy_from_slice(&file.data[offset..offset + n]);
            n
        })
    }

    fn write(&self, node: NodeId, offset: usize, buf: &[u8]) -> Result<usize, Errno> {
        self.with_file(node, "write", |file| {
            let n = write_at(&mut file.data, offset, buf)?;
            file.dirty = true;
            Ok(n)
        })?
    }

    fn truncate(&self, node: NodeId, length: usize) -> Result<(), Errno> {
        self.with_file(node, "truncate", |file| {
            resize_file(&mut file.data, length, "truncate")?;
            file.dirty = true;
            Ok(())
        })?
    }
}
