//! Plain data carried across the mount boundary.

use serde::{Deserialize, Serialize};

/// Per-mount node identifier, only meaningful inside the owning mount.
pub type NodeId = usize;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatData {
    pub st_dev: u64,
    pub st_ino: NodeId,
    pub st_mode: u32,
    pub st_nlink: u32,
    pub st_uid: u32,
    pub st_gid: u32,
    pub st_rdev: u64,
    pub st_size: usize,
    pub st_blksize: isize,
    pub st_blocks: usize,
    //time bits are filled by the mounts that track them
    pub st_atim: (u64, u64),
    pub st_mtim: (u64, u64),
    pub st_ctim: (u64, u64),
}

/// One directory entry as returned by `getdents`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub d_ino: NodeId,
    // index of the entry that follows this one
    pub d_off: usize,
    pub d_name: String,
}

impl DirEntry {
    pub fn new(d_ino: NodeId, d_off: usize, name: &str) -> Self {
        DirEntry {
            d_ino,
            d_off,
            d_name: name.to_string(),
        }
    }
}
