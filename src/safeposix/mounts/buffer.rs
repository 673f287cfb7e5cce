//! Chunked read cache in front of another mount.
//!
//! Reads are split at chunk boundaries and each chunk is fetched from the
//! source once, then served from a bounded LRU. Everything except `read`
//! goes straight to the source; `write`, `truncate`, `unlink`, `rmdir` and
//! `unref` purge the node's chunks first. Nothing is ever buffered for
//! writing, so `fsync` has nothing to do.

use std::num::NonZeroUsize;

use lru::LruCache;

use crate::interface::{self, DirEntry, Errno, NodeId, StatData};

use super::Mount;

type ChunkKey = (NodeId, usize);

struct ChunkCache {
    chunks: LruCache<ChunkKey, Vec<u8>>,
    // bumped on every invalidation of a node, so a fill that raced with a
    // write is not inserted
    epochs: interface::RustHashMap<NodeId, u64>,
}

impl ChunkCache {
    fn epoch(&self, node: NodeId) -> u64 {
        self.epochs.get(&node).copied().unwrap_or(0)
    }

    fn invalidate(&mut self, node: NodeId) {
        let stale: Vec<ChunkKey> = self
            .chunks
            .iter()
            .filter(|((n, _), _)| *n == node)
            .map(|(key, _)| *key)
            .collect();
        for key in stale {
            self.chunks.pop(&key);
        }
        *self.epochs.entry(node).or_insert(0) += 1;
    }
}

pub struct BufferMount {
    source: interface::RustRfc<dyn Mount>,
    chunk_size: usize,
    cache: interface::Mutex<ChunkCache>,
    hits: interface::RustAtomicUsize,
    misses: interface::RustAtomicUsize,
}

impl BufferMount {
    /// Caches at most `max_chunks` chunks of `chunk_size` bytes each.
    pub fn new(source: interface::RustRfc<dyn Mount>, chunk_size: usize, max_chunks: usize) -> Self {
        let capacity = NonZeroUsize::new(max_chunks).unwrap_or(NonZeroUsize::MIN);
        BufferMount {
            source,
            chunk_size: chunk_size.max(1),
            cache: interface::Mutex::new(ChunkCache {
                chunks: LruCache::new(capacity),
                epochs: interface::RustHashMap::new(),
            }),
            hits: interface::RustAtomicUsize::new(0),
            misses: interface::RustAtomicUsize::new(0),
        }
    }

    pub fn source(&self) -> &interface::RustRfc<dyn Mount> {
        &self.source
    }

    pub fn cached_chunks(&self) -> usize {
        self.cache.lock().chunks.len()
    }

    pub fn is_cached(&self, node: NodeId, offset: usize) -> bool {
        let base = offset - offset % self.chunk_size;
        self.cache.lock().chunks.contains(&(node, base))
    }

    /// (hits, misses) since creation.
    pub fn counters(&self) -> (usize, usize) {
        (
            self.hits.load(interface::RustAtomicOrdering::Relaxed),
            self.misses.load(interface::RustAtomicOrdering::Relaxed),
        )
    }

    fn invalidate(&self, node: NodeId) {
        self.cache.lock().invalidate(node);
    }

    // Copies from the chunk at `base`, starting `skip` bytes in, into `dst`.
    fn read_chunk(&self, node: NodeId, base: usize, skip: usize, dst: &mut [u8]) -> Result<usize, Errno> {
        let epoch = {
            let mut cache = self.cache.lock();
            if let Some(chunk) = cache.chunks.get(&(node, base)) {
                self.hits.fetch_add(1, interface::RustAtomicOrdering::Relaxed);
                log::trace!("chunk hit node {} base {}", node, base);
                return Ok(copy_from(chunk, skip, dst));
            }
            cache.epoch(node)
        };

        self.misses.fetch_add(1, interface::RustAtomicOrdering::Relaxed);
        log::trace!("chunk miss node {} base {}", node, base);
        let mut data = vec![0u8; self.chunk_size];
        let len = self.source.read(node, base, &mut data)?;
        data.truncate(len);
        let copied = copy_from(&data, skip, dst);

        let mut cache = self.cache.lock();
        if cache.epoch(node) == epoch {
            cache.chunks.put((node, base), data);
        }
        Ok(copied)
    }
}

fn copy_from(chunk: &[u8], skip: usize, dst: &mut [u8]) -> usize {
    if skip >= chunk.len() {
        return 0;
    }
    let n = dst.len().min(chunk.len() - skip);
    dst[..n].copy_from_slice(&chunk[skip..skip + n]);
    n
}

impl Mount for BufferMount {
    fn get_node(&self, path: &str) -> Result<StatData, Errno> {
        self.source.get_node(path)
    }

    fn ref_node(&self, node: NodeId) {
        self.source.ref_node(node)
    }

    fn unref_node(&self, node: NodeId) {
        self.invalidate(node);
        self.source.unref_node(node)
    }

    // an unreferenced node has no cached chunks left to purge
    fn forget_node(&self, node: NodeId) {
        self.source.forget_node(node)
    }

    fn creat(&self, path: &str, mode: u32) -> Result<StatData, Errno> {
        self.source.creat(path, mode)
    }

    fn mkdir(&self, path: &str, mode: u32) -> Result<StatData, Errno> {
        self.source.mkdir(path, mode)
    }

    fn unlink(&self, path: &str) -> Result<(), Errno> {
        let node = self.source.get_node(path)?.st_ino;
        self.invalidate(node);
        let result = self.source.unlink(path);
        self.source.forget_node(node);
        result
    }

    fn rmdir(&self, node: NodeId) -> Result<(), Errno> {
        self.invalidate(node);
        self.source.rmdir(node)
    }

    fn chmod(&self, node: NodeId, mode: u32) -> Result<(), Errno> {
        self.source.chmod(node, mode)
    }

    fn stat(&self, node: NodeId) -> Result<StatData, Errno> {
        self.source.stat(node)
    }

    fn fsync(&self, _node: NodeId) -> Result<(), Errno> {
        Ok(())
    }

    fn getdents(&self, node: NodeId, offset: usize, count: usize) -> Result<Vec<DirEntry>, Errno> {
        self.source.getdents(node, offset, count)
    }

    fn read(&self, node: NodeId, offset: usize, buf: &mut [u8]) -> Result<usize, Errno> {
        let mut total = 0;
        while total < buf.len() {
            let pos = offset + total;
            let base = pos - pos % self.chunk_size;
            let skip = pos - base;
            let want = (buf.len() - total).min(self.chunk_size - skip);
            let n = match self.read_chunk(node, base, skip, &mut buf[total..total + want]) {
                Ok(n) => n,
                // bytes already copied are still a valid short read
                Err(e) if total == 0 => return Err(e),
                Err(_) => break,
            };
            total += n;
            if n < want {
                break;
            }
        }
        Ok(total)
    }

    fn write(&self, node: NodeId, offset: usize, buf: &[u8]) -> Result<usize, Errno> {
        self.invalidate(node);
        self.source.write(node, offset, buf)
    }

    fn truncate(&self, node: NodeId, length: usize) -> Result<(), Errno> {
        self.invalidate(node);
        self.source.truncate(node, length)
    }

    fn isatty(&self, node: NodeId) -> bool {
        self.source.isatty(node)
    }
}
