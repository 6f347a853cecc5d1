//! Kernel object types
//!
//! This module defines the layout and intrinsic operations of the kernel
//! objects the capability system hands out.
//!
//! ## System Objects
//! - [`SchedContext`]: CPU time budget authority backed by a circular
//!   buffer of sporadic-server refills

pub mod sched;

pub use sched::{
    refill_absolute_max, sc_object_size, Refill, SchedContext, MIN_SC_SIZE_BITS,
};
