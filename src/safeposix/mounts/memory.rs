//! In-memory directory tree.
//!
//! Nodes live in a slot table; directories map child names to node ids. A
//! file that is unlinked while open stays allocated until its last `unref`.

use crate::interface::{self, syscall_error, DirEntry, Errno, NodeId, SlotAllocator, StatData};
use crate::safeposix::syscalls::fs_constants::*;

use super::{path_components, resize_file, split_parent, write_at, Mount};

#[derive(Debug)]
enum MemKind {
    File(Vec<u8>),
    Dir(interface::RustBTreeMap<String, NodeId>),
}

#[derive(Debug)]
struct MemNode {
    kind: MemKind,
    mode: u32,
    parent: NodeId,
    use_count: usize,
    unlinked: bool,
}

impl MemNode {
    fn new_dir(parent: NodeId, mode: u32) -> Self {
        MemNode {
            kind: MemKind::Dir(interface::RustBTreeMap::new()),
            mode: mode & 0o7777,
            parent,
            use_count: 0,
            unlinked: false,
        }
    }

    fn new_file(parent: NodeId, mode: u32) -> Self {
        MemNode {
            kind: MemKind::File(Vec::new()),
            mode: mode & 0o7777,
            parent,
            use_count: 0,
            unlinked: false,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.kind, MemKind::Dir(_))
    }

    fn stat(&self, ino: NodeId) -> StatData {
        let (filetype, size, nlink) = match &self.kind {
            MemKind::Dir(children) => (S_IFDIR, 0, 2 + children.len() as u32),
            MemKind::File(data) => (S_IFREG, data.len(), 1),
        };
        StatData {
            st_ino: ino,
            st_mode: filetype | self.mode,
            st_nlink: if self.unlinked { 0 } else { nlink },
            st_uid: DEFAULT_UID,
            st_gid: DEFAULT_GID,
            st_size: size,
            st_blksize: DEFAULT_BLKSIZE,
            st_blocks: (size + 511) / 512,
            ..Default::default()
        }
    }
}

struct MemTree {
    nodes: SlotAllocator<MemNode>,
    root: NodeId,
}

impl MemTree {
    fn node(&self, id: NodeId) -> Result<&MemNode, Errno> {
        self.nodes
            .at(id)
            .ok_or_else(|| syscall_error(Errno::ENOENT, "memmount", "stale node"))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut MemNode, Errno> {
        self.nodes
            .at_mut(id)
            .ok_or_else(|| syscall_error(Errno::ENOENT, "memmount", "stale node"))
    }

    fn walk<'a, I: Iterator<Item = &'a str>>(&self, comps: I) -> Result<NodeId, Errno> {
        let mut current = self.root;
        for comp in comps {
            let node = self.node(current)?;
            current = match &node.kind {
                MemKind::Dir(children) => {
                    if comp == ".." {
                        node.parent
                    } else {
                        *children.get(comp).ok_or_else(|| {
                            syscall_error(Errno::ENOENT, "getnode", "path component does not exist")
                        })?
                    }
                }
                MemKind::File(_) => {
                    return Err(syscall_error(
                        Errno::ENOTDIR,
                        "getnode",
                        "path component is not a directory",
                    ))
                }
            };
        }
        Ok(current)
    }

    fn add_child(&mut self, path: &str, node: MemNode) -> Result<NodeId, Errno> {
        let (parent_comps, name) = split_parent(path)
            .ok_or_else(|| syscall_error(Errno::EEXIST, "creat", "the mount root already exists"))?;
        let parent = self.walk(parent_comps.into_iter())?;
        match &self.node(parent)?.kind {
            MemKind::Dir(children) => {
                if children.contains_key(name) {
                    return Err(syscall_error(Errno::EEXIST, "creat", "path already exists"));
                }
            }
            MemKind::File(_) => {
                return Err(syscall_error(Errno::ENOTDIR, "creat", "parent is not a directory"))
            }
        }
        let id = self.nodes.insert(MemNode { parent, ..node });
        if let MemKind::Dir(children) = &mut self.node_mut(parent)?.kind {
            children.insert(name.to_string(), id);
        }
        Ok(id)
    }

    // Detach `id` from its parent, freeing it unless it is still open.
    fn detach(&mut self, id: NodeId) -> Result<(), Errno> {
        let parent = self.node(id)?.parent;
        if let MemKind::Dir(children) = &mut self.node_mut(parent)?.kind {
            children.retain(|_, child| *child != id);
        }
        let node = self.node_mut(id)?;
        if node.use_count == 0 {
            self.nodes.free(id);
        } else {
            node.unlinked = true;
        }
        Ok(())
    }
}

pub struct MemMount {
    tree: interface::Mutex<MemTree>,
}

impl Default for MemMount {
    fn default() -> Self {
        Self::new()
    }
}

impl MemMount {
    pub fn new() -> Self {
        let mut nodes = SlotAllocator::new();
        let root = nodes.insert(MemNode::new_dir(0, S_IRWXA));
        MemMount {
            tree: interface::Mutex::new(MemTree { nodes, root }),
        }
    }

    /// Number of live nodes, including the root.
    pub fn node_count(&self) -> usize {
        self.tree.lock().nodes.len()
    }
}

impl Mount for MemMount {
    fn get_node(&self, path: &str) -> Result<StatData, Errno> {
        let tree = self.tree.lock();
        let id = tree.walk(path_components(path))?;
        Ok(tree.node(id)?.stat(id))
    }

    fn ref_node(&self, node: NodeId) {
        if let Some(n) = self.tree.lock().nodes.at_mut(node) {
            n.use_count += 1;
        }
    }

    fn unref_node(&self, node: NodeId) {
        let mut tree = self.tree.lock();
        let release = match tree.nodes.at_mut(node) {
            Some(n) => {
                n.use_count = n.use_count.saturating_sub(1);
                n.use_count == 0 && n.unlinked
            }
            None => false,
        };
        if release {
            tree.nodes.free(node);
        }
    }

    fn creat(&self, path: &str, mode: u32) -> Result<StatData, Errno> {
        let mut tree = self.tree.lock();
        let id = tree.add_child(path, MemNode::new_file(0, mode))?;
        Ok(tree.node(id)?.stat(id))
    }

    fn mkdir(&self, path: &str, mode: u32) -> Result<StatData, Errno> {
        let mut tree = self.tree.lock();
        let id = tree.add_child(path, MemNode::new_dir(0, mode))?;
        Ok(tree.node(id)?.stat(id))
    }

    fn unlink(&self, path: &str) -> Result<(), Errno> {
        let mut tree = self.tree.lock();
        let id = tree.walk(path_components(path))?;
        if tree.node(id)?.is_dir() {
            return Err(syscall_error(Errno::EISDIR, "unlink", "cannot unlink a directory"));
        }
        tree.detach(id)
    }

    fn rmdir(&self, node: NodeId) -> Result<(), Errno> {
        let mut tree = self.tree.lock();
        if node == tree.root {
            return Err(syscall_error(Errno::EBUSY, "rmdir", "cannot remove the mount root"));
        }
        match &tree.node(node)?.kind {
            MemKind::File(_) => {
                return Err(syscall_error(Errno::ENOTDIR, "rmdir", "node is not a directory"))
            }
            MemKind::Dir(children) if !children.is_empty() => {
                return Err(syscall_error(Errno::ENOTEMPTY, "rmdir", "directory is not empty"))
            }
            MemKind::Dir(_) => {}
        }
        tree.detach(node)
    }

    fn chmod(&self, node: NodeId, mode: u32) -> Result<(), Errno> {
        let mut tree = self.tree.lock();
        tree.node_mut(node)?.mode = mode & 0o7777;
        Ok(())
    }

    fn stat(&self, node: NodeId) -> Result<StatData, Errno> {
        let tree = self.tree.lock();
        Ok(tree.node(node)?.stat(node))
    }

    fn fsync(&self, node: NodeId) -> Result<(), Errno> {
        self.tree.lock().node(node).map(|_| ())
    }

    fn getdents(&self, node: NodeId, offset: usize, count: usize) -> Result<Vec<DirEntry>, Errno> {
        let tree = self.tree.lock();
        match &tree.node(node)?.kind {
            MemKind::Dir(children) => Ok(children
                .iter()
                .enumerate()
                .skip(offset)
                .take(count)
                .map(|(i, (name, id))| DirEntry::new(*id, i + 1, name))
                .collect()),
            MemKind::File(_) => Err(syscall_error(Errno::ENOTDIR, "getdents", "node is not a directory")),
        }
    }

    fn read(&self, node: NodeId, offset: usize, buf: &mut [u8]) -> Result<usize, Errno> {
        let tree = self.tree.lock();
        match &tree.node(node)?.kind {
            MemKind::File(data) => {
                if offset >= data.len() {
                    return Ok(0);
                }
                let n = buf.len().min(data.len() - offset);
                buf[..n].copy_from_slice(&data[offset..offset + n]);
                Ok(n)
            }
            MemKind::Dir(_) => Err(syscall_error(Errno::EISDIR, "read", "node is a directory")),
        }
    }

    fn write(&self, node: NodeId, offset: usize, buf: &[u8]) -> Result<usize, Errno> {
        let mut tree = self.tree.lock();
        match &mut tree.node_mut(node)?.kind {
            MemKind::File(data) => write_at(data, offset, buf),
            MemKind::Dir(_) => Err(syscall_error(Errno::EISDIR, "write", "node is a directory")),
        }
    }

    fn truncate(&self, node: NodeId, length: usize) -> Result<(), Errno> {
        let mut tree = self.tree.lock();
        match &mut tree.node_mut(node)?.kind {
            MemKind::File(data) => resize_file(data, length, "truncate"),
            MemKind::Dir(_) => Err(syscall_error(Errno::EISDIR, "truncate", "node is a directory")),
        }
    }
}
