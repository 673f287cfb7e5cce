#![allow(clippy::needless_return, clippy::explicit_auto_deref, clippy::redundant_field_names)]

// interface and safeposix are public because otherwise there isn't a great
// way to 'use' them for benchmarking.
pub mod config;
pub mod interface;
pub mod safeposix;

#[cfg(test)]
mod tests;
