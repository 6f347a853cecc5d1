//! # k7-common
//!
//! Shared foundation types for the K7 kernel crates.
//!
//! This crate defines the time vocabulary used throughout the scheduling
//! subsystem:
//! - [`Ticks`](time::Ticks): a tick count on the per-core timer
//!
//! All types use `#[repr(transparent)]` or `#[repr(C)]` for stable ABI
//! across compilation units.
//!
//! # no_std
//!
//! This crate is `#![no_std]` and has zero dependencies, making it suitable
//! as a foundation crate that all other K7 crates can depend on.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod time;

// Re-export commonly used types
pub use time::Ticks;
