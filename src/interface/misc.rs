// Misc functions for interface
// Random, locks, etc.

use std::fs::File;
use std::io::Read;

use super::errnos::{syscall_error, Errno};

pub use dashmap::DashMap as RustHashDashMap;
pub use parking_lot::{Condvar, Mutex, RwLock as RustLock};
pub use std::collections::{BTreeMap as RustBTreeMap, HashMap as RustHashMap};
pub use std::collections::{HashSet as RustHashSet, VecDeque as RustDeque};
pub use std::sync::atomic::{AtomicBool as RustAtomicBool, AtomicI32 as RustAtomicI32, AtomicUsize as RustAtomicUsize};
pub use std::sync::atomic::Ordering as RustAtomicOrdering;
pub use std::path::{Component as RustPathComponent, PathBuf as RustPathBuf};
pub use std::sync::Arc as RustRfc;

// Fill buf with random bytes from the host entropy source
pub fn fillrandom(buf: &mut [u8]) -> Result<usize, Errno> {
    let mut f = File::open("/dev/urandom")
        .map_err(|_| syscall_error(Errno::EIO, "read", "entropy source unavailable"))?;
    f.read_exact(buf)
        .map_err(|_| syscall_error(Errno::EIO, "read", "short read from entropy source"))?;
    Ok(buf.len())
}
