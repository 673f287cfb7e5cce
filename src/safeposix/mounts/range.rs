//! Read-only remote files fetched by byte range.
//!
//! The tree is declared up front with `add_dir`/`add_file`. A file is opened
//! on the host the first time it is looked up, and every read becomes one
//! range request for exactly the window asked for. All host traffic goes
//! through the job coordinator.

use crate::interface::{
    self, syscall_error, Coordinator, DirEntry, Errno, HostResource, JobEntry, NodeId, RangeSource,
    SlotAllocator, StatData,
};
use crate::safeposix::syscalls::fs_constants::*;

use super::{path_components, Mount};

const RANGE_MODE: u32 = 0o555;

struct RangeNode {
    is_dir: bool,
    size: usize,
    path: String,
    children: interface::RustBTreeMap<String, NodeId>,
    resource: Option<HostResource>,
}

pub struct RangeMount {
    coordinator: Coordinator,
    source: interface::RustRfc<dyn RangeSource>,
    nodes: interface::Mutex<SlotAllocator<RangeNode>>,
    paths: interface::RustHashDashMap<String, NodeId>,
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

impl RangeMount {
    pub fn new(coordinator: Coordinator, source: interface::RustRfc<dyn RangeSource>) -> Self {
        let mut nodes = SlotAllocator::new();
        let root = nodes.insert(RangeNode {
            is_dir: true,
            size: 0,
            path: "/".to_string(),
            children: interface::RustBTreeMap::new(),
            resource: None,
        });
        let paths = interface::RustHashDashMap::new();
        paths.insert("/".to_string(), root);
        RangeMount {
            coordinator,
            source,
            nodes: interface::Mutex::new(nodes),
            paths,
        }
    }

    pub fn add_dir(&self, path: &str) -> Result<NodeId, Errno> {
        self.add(path, true, 0)
    }

    pub fn add_file(&self, path: &str, size: usize) -> Result<NodeId, Errno> {
        self.add(path, false, size)
    }

    fn add(&self, path: &str, is_dir: bool, size: usize) -> Result<NodeId, Errno> {
        let key = canonical(path);
        if self.paths.contains_key(&key) {
            return Err(syscall_error(Errno::EEXIST, "rangemount", "path already declared"));
        }
        let (parent_key, name) = match key.rfind('/') {
            Some(0) => ("/".to_string(), key[1..].to_string()),
            Some(i) => (key[..i].to_string(), key[i + 1..].to_string()),
            None => return Err(syscall_error(Errno::EINVAL, "rangemount", "bad path")),
        };
        if name.is_empty() {
            return Err(syscall_error(Errno::EEXIST, "rangemount", "root already exists"));
        }
        let parent = *self
            .paths
            .get(&parent_key)
            .ok_or_else(|| syscall_error(Errno::ENOENT, "rangemount", "parent not declared"))?;

        let mut nodes = self.nodes.lock();
        match nodes.at(parent) {
            Some(p) if p.is_dir => {}
            _ => return Err(syscall_error(Errno::ENOTDIR, "rangemount", "parent is not a directory")),
        }
        let id = nodes.insert(RangeNode {
            is_dir,
            size,
            path: key.clone(),
            children: interface::RustBTreeMap::new(),
            resource: None,
        });
        if let Some(p) = nodes.at_mut(parent) {
            p.children.insert(name, id);
        }
        drop(nodes);
        self.paths.insert(key, id);
        Ok(id)
    }

    fn node_stat(node: &RangeNode, ino: NodeId) -> StatData {
        StatData {
            st_ino: ino,
            st_mode: if node.is_dir { S_IFDIR | RANGE_MODE } else { S_IFREG | RANGE_MODE },
            st_nlink: 1,
            st_size: node.size,
            st_blksize: DEFAULT_BLKSIZE,
            st_blocks: (node.size + 511) / 512,
            ..Default::default()
        }
    }

    fn open_remote(&self, path: &str) -> Result<HostResource, Errno> {
        let source = self.source.clone();
        let slot = interface::RustRfc::new(interface::Mutex::new(None));
        let out = slot.clone();
        let path = path.to_string();
        let result = self.coordinator.run_job(Box::new(move |entry: JobEntry| {
            source.open(
                &path,
                Box::new(move |r: Result<HostResource, i32>| match r {
                    Ok(resource) => {
                        *out.lock() = Some(resource);
                        entry.finish(0);
                    }
                    Err(code) => entry.finish(code),
                }),
            );
        }));
        let resource = *slot.lock();
        match resource {
            Some(resource) if result >= 0 => Ok(resource),
            _ => Err(syscall_error(Errno::EIO, "open", "remote open failed")),
        }
    }

    fn read_remote(&self, resource: HostResource, offset: usize, buf: &mut [u8]) -> Result<usize, Errno> {
        let source = self.source.clone();
        let slot: interface::RustRfc<interface::Mutex<Vec<u8>>> = Default::default();
        let out = slot.clone();
        let len = buf.len();
        let result = self.coordinator.run_job(Box::new(move |entry: JobEntry| {
            source.read_range(
                resource,
                offset as u64,
                len,
                Box::new(move |r: Result<Vec<u8>, i32>| match r {
                    Ok(data) => {
                        let n = data.len().min(i32::MAX as usize) as i32;
                        *out.lock() = data;
                        entry.finish(n);
                    }
                    Err(code) => entry.finish(code),
                }),
            );
        }));
        if result < 0 {
            return Err(syscall_error(Errno::EIO, "read", "remote range read failed"));
        }
        let data = slot.lock();
        let n = data.len().min(len);
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }
}

impl Mount for RangeMount {
    fn get_node(&self, path: &str) -> Result<StatData, Errno> {
        let key = canonical(path);
        let id = *self
            .paths
            .get(&key)
            .ok_or_else(|| syscall_error(Errno::ENOENT, "getnode", "no such remote path"))?;
        let needs_open = {
            let nodes = self.nodes.lock();
            let node = nodes
                .at(id)
                .ok_or_else(|| syscall_error(Errno::ENOENT, "getnode", "no such remote path"))?;
            !node.is_dir && node.resource.is_none()
        };
        if needs_open {
            let resource = self.open_remote(&key)?;
            if let Some(node) = self.nodes.lock().at_mut(id) {
                node.resource.get_or_insert(resource);
            }
        }
        self.stat(id)
    }

    fn stat(&self, node: NodeId) -> Result<StatData, Errno> {
        let nodes = self.nodes.lock();
        let n = nodes
            .at(node)
            .ok_or_else(|| syscall_error(Errno::ENOENT, "stat", "no such remote node"))?;
        Ok(Self::node_stat(n, node))
    }

    fn fsync(&self, _node: NodeId) -> Result<(), Errno> {
        Ok(())
    }

    fn getdents(&self, node: NodeId, offset: usize, count: usize) -> Result<Vec<DirEntry>, Errno> {
        let nodes = self.nodes.lock();
        let n = nodes
            .at(node)
            .ok_or_else(|| syscall_error(Errno::ENOENT, "getdents", "no such remote node"))?;
        if !n.is_dir {
            return Err(syscall_error(Errno::ENOTDIR, "getdents", "remote node is a file"));
        }
        Ok(n.children
            .iter()
            .enumerate()
            .skip(offset)
            .take(count)
            .map(|(i, (name, id))| DirEntry::new(*id, i + 1, name))
            .collect())
    }

    fn read(&self, node: NodeId, offset: usize, buf: &mut [u8]) -> Result<usize, Errno> {
        let (size, resource, path) = {
            let nodes = self.nodes.lock();
            let n = nodes
                .at(node)
                .ok_or_else(|| syscall_error(Errno::ENOENT, "read", "no such remote node"))?;
            if n.is_dir {
                return Err(syscall_error(Errno::EISDIR, "read", "remote node is a directory"));
            }
            (n.size, n.resource, n.path.clone())
        };
        if offset >= size || buf.is_empty() {
            return Ok(0);
        }
        let resource = match resource {
            Some(resource) => resource,
            None => self.open_remote(&path)?,
        };
        let len = buf.len().min(size - offset);
        self.read_remote(resource, offset, &mut buf[..len])
    }
}
