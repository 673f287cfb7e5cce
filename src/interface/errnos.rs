//! Error taxonomy shared by every layer.
//!
//! Each variant carries the Linux errno number so a failure can still be
//! reported the classic way (`-errno`) by callers that want a raw return
//! value, while Rust callers get a tagged `Result<T, Errno>`.

use thiserror::Error;

macro_rules! errnos {
    ($($name:ident = $num:expr => $msg:expr,)*) => {
        #[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(i32)]
        pub enum Errno {
            $(
                #[error($msg)]
                $name = $num,
            )*
        }

        impl Errno {
            /// Maps a positive errno number back onto a variant.
            pub fn from_raw(num: i32) -> Option<Errno> {
                match num {
                    $($num => Some(Errno::$name),)*
                    _ => None,
                }
            }
        }
    };
}

errnos! {
    EPERM = 1 => "operation not permitted",
    ENOENT = 2 => "no such file or directory",
    EINTR = 4 => "interrupted system call",
    EIO = 5 => "input/output error",
    EBADF = 9 => "bad file descriptor",
    EAGAIN = 11 => "resource temporarily unavailable",
    ENOMEM = 12 => "cannot allocate memory",
    EACCES = 13 => "permission denied",
    EFAULT = 14 => "bad address",
    EBUSY = 16 => "device or resource busy",
    EEXIST = 17 => "file exists",
    ENOTDIR = 20 => "not a directory",
    EISDIR = 21 => "is a directory",
    EINVAL = 22 => "invalid argument",
    ENFILE = 23 => "too many open files in system",
    EMFILE = 24 => "too many open files",
    ENOTTY = 25 => "inappropriate ioctl for device",
    EFBIG = 27 => "file too large",
    ENOSPC = 28 => "no space left on device",
    ESPIPE = 29 => "illegal seek",
    EPIPE = 32 => "broken pipe",
    ERANGE = 34 => "numerical result out of range",
    EDEADLK = 35 => "resource deadlock avoided",
    ENAMETOOLONG = 36 => "file name too long",
    ENOSYS = 38 => "function not implemented",
    ENOTEMPTY = 39 => "directory not empty",
    ENOTSOCK = 88 => "socket operation on non-socket",
    EDESTADDRREQ = 89 => "destination address required",
    EPROTOTYPE = 91 => "protocol wrong type for socket",
    EOPNOTSUPP = 95 => "operation not supported",
    EAFNOSUPPORT = 97 => "address family not supported by protocol",
    EADDRINUSE = 98 => "address already in use",
    ECONNRESET = 104 => "connection reset by peer",
    EISCONN = 106 => "transport endpoint is already connected",
    ENOTCONN = 107 => "transport endpoint is not connected",
    ETIMEDOUT = 110 => "connection timed out",
    ECONNREFUSED = 111 => "connection refused",
    EALREADY = 114 => "operation already in progress",
    EINPROGRESS = 115 => "operation now in progress",
}

impl Errno {
    /// The classic syscall return value, `-errno`.
    pub fn as_retval(self) -> i32 {
        -(self as i32)
    }

    /// Translates a host result code into the taxonomy. Hosts report
    /// failures as negated errno numbers; anything unrecognised is `EIO`.
    pub fn from_host(code: i32) -> Errno {
        if code < 0 {
            Errno::from_raw(-code).unwrap_or(Errno::EIO)
        } else {
            Errno::EIO
        }
    }
}

/// Raises `e` on behalf of `syscall`, logging `message` for diagnosis.
///
/// Call sites read `return Err(syscall_error(Errno::EBADF, "read", "..."))`.
pub fn syscall_error(e: Errno, syscall: &str, message: &str) -> Errno {
    log::debug!("{} failed with {:?}: {}", syscall, e, message);
    e
}

/// Converts a syscall result into the raw `-errno` convention.
pub fn to_retval<T: Into<i64>>(result: Result<T, Errno>) -> i64 {
    match result {
        Ok(v) => v.into(),
        Err(e) => e.as_retval() as i64,
    }
}
