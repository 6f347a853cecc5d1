//! Kernel object error types
//!
//! This module defines the error types that can occur when creating kernel
//! objects from untyped memory. The objects' own operations have no error
//! paths; a precondition violation there is a kernel bug, not a condition.

use core::fmt;

/// Errors that can occur during kernel object creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[must_use = "object creation errors must be handled"]
pub enum CapError {
    /// Out of memory.
    ///
    /// The backing allocation for the requested object could not be made.
    OutOfMemory,

    /// Object size is too small.
    ///
    /// The requested size class is smaller than the minimum for this
    /// object type.
    SizeTooSmall,

    /// Invalid operation for this object type.
    ///
    /// The requested parameters are outside what the object type supports.
    InvalidOperation,
}

impl CapError {
    /// Get a short description of the error.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OutOfMemory => "out of memory",
            Self::SizeTooSmall => "object size too small",
            Self::InvalidOperation => "invalid operation for object type",
        }
    }
}

impl fmt::Display for CapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result type for kernel object creation.
pub type CapResult<T> = Result<T, CapError>;
