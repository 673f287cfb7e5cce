//! Files kept in storage the host owns.
//!
//! Every operation is one coordinator job against the host file system. A
//! file is opened on the host when it is first looked up and closed again
//! once no handle or lookup holds it. Directories are never opened; they
//! stay registered so their inode numbers hold still, and `getdents` asks
//! the host for a fresh listing each time. Paths are resolved under a fixed
//! host-side prefix.

use crate::interface::{
    self, syscall_error, Coordinator, DirEntry, Errno, HostCallback, HostFileInfo, HostFileSystem,
    HostResource, JobEntry, NodeId, SlotAllocator, StatData,
};
use crate::safeposix::syscalls::fs_constants::*;

use super::{path_components, Mount};

const ROOT_INO: NodeId = 0;

struct HostNode {
    path: String,
    // None for directories
    resource: Option<HostResource>,
    use_count: usize,
    lookups: usize,
}

impl HostNode {
    fn is_dir(&self) -> bool {
        self.resource.is_none()
    }
}

type HostNodes = SlotAllocator<HostNode>;

pub struct HostFsMount {
    coordinator: Coordinator,
    host: interface::RustRfc<dyn HostFileSystem>,
    prefix: String,
    nodes: interface::Mutex<HostNodes>,
    // only changed with `nodes` locked
    path_map: interface::RustHashDashMap<String, NodeId>,
}

fn canonical(path: &str) -> String {
    let mut out = String::new();
    for comp in path_components(path) {
        out.push('/');
        out.push_str(comp);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

// Keeps the host's errno where it means the same thing here.
fn host_errno(code: i32, syscall: &str) -> Errno {
    let errno = [
        Errno::ENOENT,
        Errno::EEXIST,
        Errno::ENOTDIR,
        Errno::EISDIR,
        Errno::EFBIG,
        Errno::ENOSPC,
    ]
    .into_iter()
    .find(|e| e.as_retval() == code)
    .unwrap_or(Errno::EIO);
    syscall_error(errno, syscall, "host file system call failed")
}

impl HostFsMount {
    /// Serves the host tree below `prefix`, e.g. `"/"` or `"/persistent"`.
    pub fn new(coordinator: Coordinator, host: interface::RustRfc<dyn HostFileSystem>, prefix: &str) -> Self {
        let mut nodes = SlotAllocator::new();
        nodes.insert(HostNode {
            path: "/".to_string(),
            resource: None,
            use_count: 0,
            lookups: 0,
        });
        let path_map = interface::RustHashDashMap::new();
        path_map.insert("/".to_string(), ROOT_INO);
        HostFsMount {
            coordinator,
            host,
            prefix: canonical(prefix),
            nodes: interface::Mutex::new(nodes),
            path_map,
        }
    }

    /// Files currently open on the host.
    pub fn open_files(&self) -> usize {
        self.nodes.lock().iter().filter(|(_, n)| !n.is_dir()).count()
    }

    fn host_path(&self, key: &str) -> String {
        match (self.prefix.as_str(), key) {
            ("/", key) => key.to_string(),
            (prefix, "/") => prefix.to_string(),
            (prefix, key) => format!("{}{}", prefix, key),
        }
    }

    // Starts one host call on the coordinator thread and waits for its value.
    fn run<T, F>(&self, syscall: &str, start: F) -> Result<T, Errno>
    where
        T: Send + 'static,
        F: FnOnce(&dyn HostFileSystem, HostCallback<T>) + Send + 'static,
    {
        let host = self.host.clone();
        let slot: interface::RustRfc<interface::Mutex<Option<T>>> =
            interface::RustRfc::new(interface::Mutex::new(None));
        let out = slot.clone();
        let result = self.coordinator.run_job(Box::new(move |entry: JobEntry| {
            start(
                &*host,
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
            _ => Err(host_errno(result, syscall)),
        }
    }

    fn open_remote(&self, key: &str, create: bool, syscall: &str) -> Result<HostResource, Errno> {
        let path = self.host_path(key);
        self.run(syscall, move |host, done| host.open(&path, create, done))
    }

    fn query(&self, resource: HostResource, syscall: &str) -> Result<HostFileInfo, Errno> {
        self.run(syscall, move |host, done| host.query(resource, done))
    }

    fn close_remote(&self, resource: HostResource) {
        let host = self.host.clone();
        let result = self.coordinator.run_job(Box::new(move |entry: JobEntry| {
            host.close(resource);
            entry.finish(0);
        }));
        if result < 0 {
            log::warn!("host file {} may still be open: {}", resource, result);
        }
    }

    // Registers `key` with one lookup on it. If another thread registered it
    // first, that node wins and `resource` is closed again.
    fn pin_or_insert(&self, key: &str, resource: Option<HostResource>) -> NodeId {
        let mut nodes = self.nodes.lock();
        if let Some(id) = self.path_map.get(key).map(|id| *id) {
            if let Some(node) = nodes.at_mut(id) {
                node.lookups += 1;
                drop(nodes);
                if let Some(resource) = resource {
                    self.close_remote(resource);
                }
                return id;
            }
        }
        let id = nodes.insert(HostNode {
            path: key.to_string(),
            resource,
            use_count: 0,
            lookups: 1,
        });
        self.path_map.insert(key.to_string(), id);
        log::trace!("host path {} is node {}", key, id);
        id
    }

    fn pin(&self, key: &str) -> Option<NodeId> {
        let mut nodes = self.nodes.lock();
        let id = *self.path_map.get(key)?;
        nodes.at_mut(id).map(|node| {
            node.lookups += 1;
            id
        })
    }

    // Closes and forgets a file node once nothing holds it.
    fn settle(&self, id: NodeId) {
        let resource = {
            let mut nodes = self.nodes.lock();
            match nodes.at(id) {
                Some(node) if !node.is_dir() && node.use_count == 0 && node.lookups == 0 => {}
                _ => return,
            }
            match nodes.free(id) {
                Some(node) => {
                    self.path_map.remove_if(&node.path, |_, v| *v == id);
                    node.resource
                }
                None => return,
            }
        };
        if let Some(resource) = resource {
            self.close_remote(resource);
        }
    }

    fn node_info(&self, id: NodeId, syscall: &str) -> Result<(String, Option<HostResource>), Errno> {
        let nodes = self.nodes.lock();
        let node = nodes
            .at(id)
            .ok_or_else(|| syscall_error(Errno::ENOENT, syscall, "no such host node"))?;
        Ok((node.path.clone(), node.resource))
    }

    fn file_resource(&self, id: NodeId, syscall: &str) -> Result<HostResource, Errno> {
        self.node_info(id, syscall)?
            .1
            .ok_or_else(|| syscall_error(Errno::EISDIR, syscall, "host node is a directory"))
    }

    fn dir_stat(ino: NodeId) -> StatData {
        StatData {
            st_ino: ino,
            st_mode: S_IFDIR | S_IRWXA,
            st_nlink: 2,
            st_blksize: DEFAULT_BLKSIZE,
            ..Default::default()
        }
    }

    fn unpin(&self, id: NodeId, f: impl FnOnce(&mut HostNode)) {
        if let Some(node) = self.nodes.lock().at_mut(id) {
            f(node);
        }
        self.settle(id);
    }
}

impl Mount for HostFsMount {
    fn get_node(&self, path: &str) -> Result<StatData, Errno> {
        let key = canonical(path);
        let id = match self.pin(&key) {
            Some(id) => id,
            None => {
                let resource = self.open_remote(&key, false, "getnode")?;
                let is_dir = match self.query(resource, "getnode") {
                    Ok(info) => info.is_dir,
                    Err(e) => {
                        self.close_remote(resource);
                        return Err(e);
                    }
                };
                if is_dir {
                    self.close_remote(resource);
                    self.pin_or_insert(&key, None)
                } else {
                    self.pin_or_insert(&key, Some(resource))
                }
            }
        };
        self.stat(id).map_err(|e| {
            self.forget_node(id);
            e
        })
    }

    fn ref_node(&self, node: NodeId) {
        if let Some(n) = self.nodes.lock().at_mut(node) {
            n.use_count += 1;
        }
    }

    fn unref_node(&self, node: NodeId) {
        self.unpin(node, |n| n.use_count = n.use_count.saturating_sub(1));
    }

    fn forget_node(&self, node: NodeId) {
        self.unpin(node, |n| n.lookups = n.lookups.saturating_sub(1));
    }

    fn creat(&self, path: &str, _mode: u32) -> Result<StatData, Errno> {
        let key = canonical(path);
        if key == "/" || self.path_map.contains_key(&key) {
            return Err(syscall_error(Errno::EEXIST, "creat", "host file already exists"));
        }
        let resource = self.open_remote(&key, true, "creat")?;
        let id = self.pin_or_insert(&key, Some(resource));
        let st = self.stat(id);
        if st.is_err() {
            self.forget_node(id);
        }
        st
    }

    fn mkdir(&self, path: &str, _mode: u32) -> Result<StatData, Errno> {
        let key = canonical(path);
        let host_path = self.host_path(&key);
        self.run("mkdir", move |host, done| host.make_dir(&host_path, done))?;
        // directories stay registered, so no lookup is left for the caller
        let id = self.pin_or_insert(&key, None);
        if let Some(node) = self.nodes.lock().at_mut(id) {
            node.lookups = node.lookups.saturating_sub(1);
        }
        Ok(Self::dir_stat(id))
    }

    fn stat(&self, node: NodeId) -> Result<StatData, Errno> {
        let resource = match self.node_info(node, "stat")?.1 {
            Some(resource) => resource,
            None => return Ok(Self::dir_stat(node)),
        };
        let info = self.query(resource, "stat")?;
        let size = usize::try_from(info.size).unwrap_or(usize::MAX);
        Ok(StatData {
            st_ino: node,
            st_mode: S_IFREG | S_IRWXA,
            st_nlink: 1,
            st_size: size,
            st_blksize: DEFAULT_BLKSIZE,
            st_blocks: size.div_ceil(512),
            ..Default::default()
        })
    }

    fn fsync(&self, node: NodeId) -> Result<(), Errno> {
        match self.node_info(node, "fsync")?.1 {
            Some(resource) => self.run("fsync", move |host, done| host.flush(resource, done)),
            None => Ok(()),
        }
    }

    fn getdents(&self, node: NodeId, offset: usize, count: usize) -> Result<Vec<DirEntry>, Errno> {
        let (path, resource) = self.node_info(node, "getdents")?;
        if resource.is_some() {
            return Err(syscall_error(Errno::ENOTDIR, "getdents", "host node is a file"));
        }
        let host_path = self.host_path(&path);
        let names = self.run("getdents", move |host, done| host.read_dir(&host_path, done))?;
        Ok(names
            .iter()
            .enumerate()
            .skip(offset)
            .take(count)
            .map(|(i, name)| {
                let child = if path == "/" {
                    format!("/{}", name)
                } else {
                    format!("{}/{}", path, name)
                };
                let ino = self.path_map.get(&child).map(|id| *id).unwrap_or(0);
                DirEntry::new(ino, i + 1, name)
            })
            .collect())
    }

    fn read(&self, node: NodeId, offset: usize, buf: &mut [u8]) -> Result<usize, Errno> {
        let resource = self.file_resource(node, "read")?;
        if buf.is_empty() {
            return Ok(0);
        }
        let len = buf.len();
        let data = self.run("read", move |host, done| host.read(resource, offset as u64, len, done))?;
        let n = data.len().min(len);
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }

    fn write(&self, node: NodeId, offset: usize, buf: &[u8]) -> Result<usize, Errno> {
        let resource = self.file_resource(node, "write")?;
        if buf.is_empty() {
            return Ok(0);
        }
        match offset.checked_add(buf.len()) {
            Some(end) if end <= MAX_FILE_SIZE => {}
            _ => return Err(syscall_error(Errno::EFBIG, "write", "file would exceed the size limit")),
        }
        let data = buf.to_vec();
        self.run("write", move |host, done| host.write(resource, offset as u64, data, done))
    }
}
