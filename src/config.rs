//! Kernel proxy configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::interface::{syscall_error, Errno};
use crate::safeposix::syscalls::fs_constants::{MAXFD, MAXPATHLEN};
use crate::safeposix::syscalls::net_constants::SOCKET_BUF_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Longest accepted absolute path; also the `getwd` buffer size.
    pub max_path_len: usize,
    /// Descriptor table capacity.
    pub max_fds: usize,
    /// Mount the pseudo devices at `/dev`.
    pub dev_mount: bool,
    /// Mount the console at `/dev/fd` and open descriptors 0, 1 and 2.
    pub console: bool,
    pub socket_buffer_size: usize,
    pub initial_cwd: String,
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            max_path_len: MAXPATHLEN,
            max_fds: MAXFD as usize,
            dev_mount: true,
            console: true,
            socket_buffer_size: SOCKET_BUF_SIZE,
            initial_cwd: "/".to_string(),
        }
    }
}

impl KernelConfig {
    pub fn from_json(text: &str) -> Result<Self, Errno> {
        let config: KernelConfig = serde_json::from_str(text).map_err(|e| {
            log::warn!("bad kernel config: {}", e);
            syscall_error(Errno::EINVAL, "config", "malformed kernel configuration")
        })?;
        config.validate()
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Errno> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|_| syscall_error(Errno::EIO, "config", "could not read configuration file"))?;
        Self::from_json(&text)
    }

    fn validate(self) -> Result<Self, Errno> {
        if self.max_fds < 3 && self.console {
            return Err(syscall_error(
                Errno::EINVAL,
                "config",
                "console needs room for three descriptors",
            ));
        }
        if !self.initial_cwd.starts_with('/') {
            return Err(syscall_error(Errno::EINVAL, "config", "initial cwd must be absolute"));
        }
        if self.max_path_len == 0 || self.socket_buffer_size == 0 {
            return Err(syscall_error(Errno::EINVAL, "config", "limits must be nonzero"));
        }
        Ok(self)
    }
}
