//! Asynchronous operations consumed from the host platform.
//!
//! Every method here is invoked on the coordinator thread only. An
//! implementation must never call `done` inline; it delivers the result later
//! through [`Coordinator::post`](super::Coordinator::post) so the callback
//! also runs on the coordinator thread. Failures are reported as negated
//! errno numbers.

use std::net::{IpAddr, SocketAddr};

/// Opaque host-side identifier for a connection, listener or open file.
pub type HostResource = u64;

pub type HostCallback<T> = Box<dyn FnOnce(Result<T, i32>) + Send>;

/// TCP plus the name lookups that go with it.
pub trait HostNetwork: HostResolver {
    /// Resolves with the new stream and its local address.
    fn tcp_connect(&self, addr: SocketAddr, done: HostCallback<(HostResource, SocketAddr)>);

    /// Resolves with the listener and the address it is bound to.
    fn tcp_listen(
        &self,
        addr: SocketAddr,
        backlog: i32,
        done: HostCallback<(HostResource, SocketAddr)>,
    );

    /// Resolves with the accepted stream and its peer address.
    fn tcp_accept(&self, listener: HostResource, done: HostCallback<(HostResource, SocketAddr)>);

    /// Resolves with at most `max` bytes. An empty buffer means end of stream.
    fn tcp_read(&self, stream: HostResource, max: usize, done: HostCallback<Vec<u8>>);

    /// Resolves with the number of bytes accepted, which may be short.
    fn tcp_write(&self, stream: HostResource, data: Vec<u8>, done: HostCallback<usize>);

    fn close(&self, resource: HostResource);
}

/// Remote files served by byte range.
pub trait RangeSource: Send + Sync {
    fn open(&self, path: &str, done: HostCallback<HostResource>);

    fn read_range(&self, file: HostResource, offset: u64, len: usize, done: HostCallback<Vec<u8>>);
}

/// What the host reports about one open file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostFileInfo {
    pub size: u64,
    pub is_dir: bool,
}

/// Persistent storage owned by the host, addressed by absolute path.
pub trait HostFileSystem: Send + Sync {
    /// Opens `path` for reading and writing, creating it first when `create`
    /// is set. Opening an existing file with `create` fails with `-EEXIST`.
    fn open(&self, path: &str, create: bool, done: HostCallback<HostResource>);

    /// Resolves with at most `len` bytes. An empty buffer means end of file.
    fn read(&self, file: HostResource, offset: u64, len: usize, done: HostCallback<Vec<u8>>);

    fn write(&self, file: HostResource, offset: u64, data: Vec<u8>, done: HostCallback<usize>);

    fn query(&self, file: HostResource, done: HostCallback<HostFileInfo>);

    fn flush(&self, file: HostResource, done: HostCallback<()>);

    fn make_dir(&self, path: &str, done: HostCallback<()>);

    /// Resolves with the names directly inside `path`, sorted.
    fn read_dir(&self, path: &str, done: HostCallback<Vec<String>>);

    fn close(&self, file: HostResource);
}

/// Name lookups answered by the host.
pub trait HostResolver: Send + Sync {
    /// Resolves with every address `name` maps to, or `-ENOENT`.
    fn lookup_host(&self, name: &str, done: HostCallback<Vec<IpAddr>>);

    /// Resolves with the name registered for `addr`, or `-ENOENT`.
    fn lookup_addr(&self, addr: IpAddr, done: HostCallback<String>);
}

/// Remote key-value storage moved in whole values.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str, done: HostCallback<Option<Vec<u8>>>);

    fn put(&self, key: &str, value: Vec<u8>, done: HostCallback<()>);

    fn list(&self, prefix: &str, done: HostCallback<Vec<String>>);
}

/// One-way outbound channel to the embedding page.
pub trait MessageChannel: Send + Sync {
    fn post_message(&self, message: Vec<u8>);
}
