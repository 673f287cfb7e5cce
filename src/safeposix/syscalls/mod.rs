//! The syscall surface of the [`KernelProxy`](crate::safeposix::kernel::KernelProxy),
//! divided into two categories: filesystem and network.
//!
//! ## System Calls
//!
//! Every call is a method on the kernel proxy and returns a `Result` whose
//! error is an [`Errno`](crate::interface::Errno). Socket descriptors share
//! the descriptor table with files, so the generic descriptor calls in
//! `fs_calls` work on both.

pub mod fs_calls;
pub mod fs_constants;
pub mod net_calls;
pub mod net_constants;
pub use fs_calls::*;
pub use fs_constants::*;
pub use net_calls::*;
pub use net_constants::*;
