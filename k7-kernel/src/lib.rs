//! # k7-kernel
//!
//! The scheduling subsystem of the K7 microkernel.
//!
//! K7 schedules threads through capability-managed scheduling contexts:
//! each runnable thread is bound to a [`SchedContext`](k7_cap::SchedContext)
//! that entitles it to a bounded amount of CPU time per period. This crate
//! implements the sporadic-server replenishment engine that enforces those
//! entitlements, the per-core scheduler state it hangs off, and the storage
//! path that carves scheduling context objects out of kernel memory.
//!
//! # Crate layout
//!
//! - [`config`]: platform timing constants (counter frequency, kernel WCET,
//!   derived minimum budgets)
//! - [`sched`]: per-core scheduler state and the refill engine
//!
//! Logging goes through the `log` facade; the kernel binary installs the
//! actual logger during boot.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(test)]
extern crate std;

pub mod config;
pub mod sched;
