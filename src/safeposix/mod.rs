//! This module implements the POSIX-like surface on top of pluggable mounts
//! and an asynchronous host.
//!
//! ## top-level features:
//!
//! - ### Kernel Proxy:
//!     - A [`KernelProxy`](kernel::KernelProxy) is an explicitly constructed
//!       context object holding the mount table, the descriptor and handle
//!       tables, the socket subsystem and the working directory. It is built
//!       by [`kernelinit`](dispatcher::kernelinit) and torn down by
//!       [`kernelfinalize`](dispatcher::kernelfinalize).
//!
//! - ### Mount Manager:
//!     - Maps normalized absolute paths to mounts by longest prefix. A mount
//!       stays registered while descriptors or child mounts reference it.
//!
//! - ### Mounts:
//!     - Backends implement the [`Mount`](mounts::Mount) trait: an in-memory
//!       tree, devices, the console, message pipes, a caching decorator and
//!       host-backed range and key-value stores.
//!
//! - ### Sockets:
//!     - TCP sockets over the host network, with blocking calls bridged
//!       through the job coordinator and `select` over readiness.
//!
//! - ### System Calls:
//!     - The proxy has public methods corresponding to each system call,
//!       split into filesystem and network calls in their respective files.

pub mod dispatcher;
pub mod filesystem;
pub mod kernel;
pub mod mount_manager;
pub mod mounts;
pub mod net;
pub mod syscalls;
