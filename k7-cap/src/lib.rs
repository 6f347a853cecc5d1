//! K7 Kernel Objects
//!
//! This crate defines the kernel object types that capabilities refer to,
//! following seL4's model of variable-size objects carved out of untyped
//! memory.
//!
//! # Overview
//!
//! Kernel objects are plain `#[repr(C)]` aggregates placed into memory the
//! capability system allocates. This crate defines their layout and the
//! operations that are intrinsic to the object itself; the kernel crate
//! provides storage and the algorithms that act on the objects.
//!
//! # Object Types
//!
//! - [`SchedContext`](objects::SchedContext): CPU time budget authority,
//!   holding the circular buffer of sporadic-server refills that back the
//!   kernel's bandwidth guarantees.
//!
//! # Errors
//!
//! Fallible paths (object creation) use [`CapError`]; the objects' own
//! operations are infallible with debug-asserted preconditions, since they
//! run on kernel fast paths.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod error;
pub mod objects;

// Re-exports for convenient access
pub use error::{CapError, CapResult};
pub use objects::{Refill, SchedContext};
