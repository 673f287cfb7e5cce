//! Module definitions for the interface
//!
//! ## Interface Module
//!
//! Low-level primitives the rest of the crate is built from. Third-party
//! crates for locking and collections are re-exported from here so that the
//! `safeposix` layer reaches them through one narrow path.
//!
//! - `errnos`: the error taxonomy and `syscall_error`
//! - `slots`: reusable-index tables with generation-checked handles
//! - `coordinator`: the job queue bridging worker threads to the one thread
//!   allowed to start host operations
//! - `host`: the asynchronous host contracts, `loopback`: in-process hosts

mod coordinator;
pub mod errnos;
mod host;
mod loopback;
mod misc;
mod slots;
mod timer;
pub mod types;
pub use coordinator::*;
pub use errnos::*;
pub use host::*;
pub use loopback::*;
pub use misc::*;
pub use slots::*;
pub use timer::*;
pub use types::*;
