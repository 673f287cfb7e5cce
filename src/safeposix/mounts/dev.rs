//! Pseudo devices.
//!
//! Node 1 is the mount root and node 2 the `fd` directory that the console
//! mount is stacked on. Character devices are numbered from 3 upward.

use crate::interface::{self, syscall_error, DirEntry, Errno, NodeId, StatData};
use crate::safeposix::syscalls::fs_constants::*;

use super::{path_components, Mount};

const ROOT_INO: NodeId = 1;
const FD_DIR_INO: NodeId = 2;
const FIRST_DEVICE_INO: NodeId = 3;

pub trait Device: Send + Sync {
    fn read(&self, buf: &mut [u8]) -> Result<usize, Errno>;
    fn write(&self, buf: &[u8]) -> Result<usize, Errno>;
    fn devno(&self) -> DevNo;
}

/// Reads end of file, swallows writes.
pub struct NullDevice;

impl Device for NullDevice {
    fn read(&self, _buf: &mut [u8]) -> Result<usize, Errno> {
        Ok(0)
    }

    fn write(&self, buf: &[u8]) -> Result<usize, Errno> {
        Ok(buf.len())
    }

    fn devno(&self) -> DevNo {
        NULLDEVNO
    }
}

pub struct ZeroDevice;

impl Device for ZeroDevice {
    fn read(&self, buf: &mut [u8]) -> Result<usize, Errno> {
        buf.fill(0);
        Ok(buf.len())
    }

    fn write(&self, buf: &[u8]) -> Result<usize, Errno> {
        Ok(buf.len())
    }

    fn devno(&self) -> DevNo {
        ZERODEVNO
    }
}

pub struct RandomDevice {
    devno: DevNo,
}

impl RandomDevice {
    pub fn random() -> Self {
        RandomDevice { devno: RANDOMDEVNO }
    }

    pub fn urandom() -> Self {
        RandomDevice { devno: URANDOMDEVNO }
    }
}

impl Device for RandomDevice {
    fn read(&self, buf: &mut [u8]) -> Result<usize, Errno> {
        interface::fillrandom(buf)
    }

    fn write(&self, _buf: &[u8]) -> Result<usize, Errno> {
        Err(syscall_error(Errno::EPERM, "write", "random device is read only"))
    }

    fn devno(&self) -> DevNo {
        self.devno
    }
}

pub struct DevMount {
    devices: Vec<(String, Box<dyn Device>)>,
}

impl Default for DevMount {
    fn default() -> Self {
        Self::new()
    }
}

impl DevMount {
    /// Mount with `null`, `zero`, `random` and `urandom`.
    pub fn new() -> Self {
        let mut mnt = DevMount { devices: Vec::new() };
        mnt.add_device("null", Box::new(NullDevice));
        mnt.add_device("zero", Box::new(ZeroDevice));
        mnt.add_device("random", Box::new(RandomDevice::random()));
        mnt.add_device("urandom", Box::new(RandomDevice::urandom()));
        mnt
    }

    pub fn add_device(&mut self, name: &str, device: Box<dyn Device>) -> NodeId {
        self.devices.push((name.to_string(), device));
        FIRST_DEVICE_INO + self.devices.len() - 1
    }

    fn device(&self, node: NodeId) -> Result<&dyn Device, Errno> {
        node.checked_sub(FIRST_DEVICE_INO)
            .and_then(|i| self.devices.get(i))
            .map(|(_, dev)| &**dev)
            .ok_or_else(|| {
                if node == ROOT_INO || node == FD_DIR_INO {
                    syscall_error(Errno::EISDIR, "devmount", "node is a directory")
                } else {
                    syscall_error(Errno::ENOENT, "devmount", "no such device")
                }
            })
    }
}

impl Mount for DevMount {
    fn get_node(&self, path: &str) -> Result<StatData, Errno> {
        let comps: Vec<&str> = path_components(path).collect();
        let node = match comps.as_slice() {
            [] => ROOT_INO,
            ["fd"] => FD_DIR_INO,
            [name] => self
                .devices
                .iter()
                .position(|(n, _)| n.as_str() == *name)
                .map(|i| FIRST_DEVICE_INO + i)
                .ok_or_else(|| syscall_error(Errno::ENOENT, "getnode", "no such device"))?,
            _ => return Err(syscall_error(Errno::ENOENT, "getnode", "no such device")),
        };
        self.stat(node)
    }

    fn creat(&self, path: &str, _mode: u32) -> Result<StatData, Errno> {
        // devices cannot be created, but opening one with O_CREAT works
        match self.get_node(path) {
            Ok(_) => Err(syscall_error(Errno::EEXIST, "creat", "device already exists")),
            Err(_) => Err(syscall_error(Errno::EACCES, "creat", "cannot create files under /dev")),
        }
    }

    fn stat(&self, node: NodeId) -> Result<StatData, Errno> {
        let mut st = StatData {
            st_ino: node,
            st_nlink: 1,
            st_blksize: DEFAULT_BLKSIZE,
            ..Default::default()
        };
        if node == ROOT_INO || node == FD_DIR_INO {
            st.st_mode = S_IFDIR | S_IRWXA;
            st.st_nlink = 2;
        } else {
            let dev = self.device(node)?;
            st.st_mode = S_IFCHR | S_IRWXA;
            st.st_rdev = makedev(&dev.devno());
        }
        Ok(st)
    }

    fn fsync(&self, _node: NodeId) -> Result<(), Errno> {
        Ok(())
    }

    fn getdents(&self, node: NodeId, offset: usize, count: usize) -> Result<Vec<DirEntry>, Errno> {
        match node {
            ROOT_INO => {
                let names = std::iter::once(("fd", FD_DIR_INO)).chain(
                    self.devices
                        .iter()
                        .enumerate()
                        .map(|(i, (name, _))| (name.as_str(), FIRST_DEVICE_INO + i)),
                );
                Ok(names
                    .enumerate()
                    .skip(offset)
                    .take(count)
                    .map(|(i, (name, ino))| DirEntry::new(ino, i + 1, name))
                    .collect())
            }
            FD_DIR_INO => Ok(Vec::new()),
            _ => Err(syscall_error(Errno::ENOTDIR, "getdents", "device is not a directory")),
        }
    }

    fn read(&self, node: NodeId, _offset: usize, buf: &mut [u8]) -> Result<usize, Errno> {
        self.device(node)?.read(buf)
    }

    fn write(&self, node: NodeId, _offset: usize, buf: &[u8]) -> Result<usize, Errno> {
        self.device(node)?.write(buf)
    }

    fn truncate(&self, node: NodeId, _length: usize) -> Result<(), Errno> {
        self.device(node).map(|_| ())
    }
}
