//! Console passthrough: `0`, `1` and `2` map onto standard streams.

use std::io::{self, Read, Write};

use crate::interface::{self, syscall_error, DirEntry, Errno, NodeId, StatData};
use crate::safeposix::syscalls::fs_constants::*;

use super::{path_components, Mount};

const ROOT_INO: NodeId = 0;
const STDIN_INO: NodeId = 1;
const STDOUT_INO: NodeId = 2;
const STDERR_INO: NodeId = 3;

pub struct ConsoleMount {
    stdin: interface::Mutex<Box<dyn Read + Send>>,
    stdout: interface::Mutex<Box<dyn Write + Send>>,
    stderr: interface::Mutex<Box<dyn Write + Send>>,
}

impl Default for ConsoleMount {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleMount {
    /// Console bound to the process's own standard streams.
    pub fn new() -> Self {
        Self::with_streams(Box::new(io::stdin()), Box::new(io::stdout()), Box::new(io::stderr()))
    }

    pub fn with_streams(
        stdin: Box<dyn Read + Send>,
        stdout: Box<dyn Write + Send>,
        stderr: Box<dyn Write + Send>,
    ) -> Self {
        ConsoleMount {
            stdin: interface::Mutex::new(stdin),
            stdout: interface::Mutex::new(stdout),
            stderr: interface::Mutex::new(stderr),
        }
    }

    fn node_for(path: &str) -> Result<NodeId, Errno> {
        let comps: Vec<&str> = path_components(path).collect();
        match comps.as_slice() {
            [] => Ok(ROOT_INO),
            ["0"] => Ok(STDIN_INO),
            ["1"] => Ok(STDOUT_INO),
            ["2"] => Ok(STDERR_INO),
            _ => Err(syscall_error(Errno::ENOENT, "getnode", "no such console stream")),
        }
    }
}

impl Mount for ConsoleMount {
    fn get_node(&self, path: &str) -> Result<StatData, Errno> {
        let node = Self::node_for(path)?;
        self.stat(node)
    }

    fn creat(&self, path: &str, _mode: u32) -> Result<StatData, Errno> {
        self.get_node(path)
    }

    fn stat(&self, node: NodeId) -> Result<StatData, Errno> {
        let mode = match node {
            ROOT_INO => S_IFDIR | S_IRWXA,
            STDIN_INO | STDOUT_INO | STDERR_INO => S_IFCHR | S_IRWXA,
            _ => return Err(syscall_error(Errno::ENOENT, "stat", "no such console stream")),
        };
        Ok(StatData {
            st_ino: node,
            st_mode: mode,
            st_nlink: 1,
            st_blksize: DEFAULT_BLKSIZE,
            ..Default::default()
        })
    }

    fn fsync(&self, node: NodeId) -> Result<(), Errno> {
        let result = match node {
            STDOUT_INO => self.stdout.lock().flush(),
            STDERR_INO => self.stderr.lock().flush(),
            _ => Ok(()),
        };
        result.map_err(|_| syscall_error(Errno::EIO, "fsync", "console flush failed"))
    }

    fn getdents(&self, node: NodeId, offset: usize, count: usize) -> Result<Vec<DirEntry>, Errno> {
        if node != ROOT_INO {
            return Err(syscall_error(Errno::ENOTDIR, "getdents", "console stream is not a directory"));
        }
        Ok([("0", STDIN_INO), ("1", STDOUT_INO), ("2", STDERR_INO)]
            .iter()
            .enumerate()
            .skip(offset)
            .take(count)
            .map(|(i, (name, ino))| DirEntry::new(*ino, i + 1, name))
            .collect())
    }

    fn read(&self, node: NodeId, _offset: usize, buf: &mut [u8]) -> Result<usize, Errno> {
        match node {
            STDIN_INO => self
                .stdin
                .lock()
                .read(buf)
                .map_err(|_| syscall_error(Errno::EIO, "read", "console read failed")),
            ROOT_INO => Err(syscall_error(Errno::EISDIR, "read", "node is a directory")),
            _ => Err(syscall_error(Errno::EINVAL, "read", "console stream is write only")),
        }
    }

    fn write(&self, node: NodeId, _offset: usize, buf: &[u8]) -> Result<usize, Errno> {
        let result = match node {
            STDOUT_INO => self.stdout.lock().write(buf),
            STDERR_INO => self.stderr.lock().write(buf),
            ROOT_INO => return Err(syscall_error(Errno::EISDIR, "write", "node is a directory")),
            _ => return Err(syscall_error(Errno::EINVAL, "write", "console stream is read only")),
        };
        result.map_err(|_| syscall_error(Errno::EIO, "write", "console write failed"))
    }

    fn truncate(&self, _node: NodeId, _length: usize) -> Result<(), Errno> {
        Ok(())
    }

    fn isatty(&self, node: NodeId) -> bool {
        matches!(node, STDIN_INO | STDOUT_INO | STDERR_INO)
    }
}
