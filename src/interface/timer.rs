// Timer functions for the interface

pub use std::time::Duration as RustDuration;
pub use std::time::Instant as RustInstant;

// Absolute deadline for a relative timeout, None when it would overflow
pub fn deadline_after(timeout: RustDuration) -> Option<RustInstant> {
    RustInstant::now().checked_add(timeout)
}
