//! Error types for allocator configuration and checked allocation.
//!
//! The unchecked allocation path never returns errors: exhausting the
//! system allocator aborts through [`std::alloc::handle_alloc_error`], and
//! malformed requests are debug assertions. These errors surface only from
//! [`SlabAllocator::try_allocate`](crate::SlabAllocator::try_allocate) and
//! [`SlabAllocator::with_config`](crate::SlabAllocator::with_config).

use std::fmt;

/// Errors reported by the checked allocator entry points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    /// Alignment is zero or not a power of two.
    InvalidAlignment {
        /// The requested alignment.
        alignment: usize,
    },

    /// Size plus alignment padding does not fit in `usize`.
    SizeOverflow {
        /// The requested size.
        size: usize,
        /// The requested alignment.
        alignment: usize,
    },

    /// A slab configuration value is out of range.
    InvalidConfig {
        /// Human-readable description of the offending setting.
        reason: &'static str,
    },
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::InvalidAlignment { alignment } => {
                write!(
                    f,
                    "Invalid alignment: {alignment} is not a power of two"
                )
            }
            AllocError::SizeOverflow { size, alignment } => {
                write!(
                    f,
                    "Allocation of {size} bytes aligned to {alignment} overflows"
                )
            }
            AllocError::InvalidConfig { reason } => {
                write!(f, "Invalid slab configuration: {reason}")
            }
        }
    }
}

impl std::error::Error for AllocError {}

/// Result type for checked allocator operations.
pub type Result<T> = std::result::Result<T, AllocError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AllocError::InvalidAlignment { alignment: 3 };
        assert_eq!(err.to_string(), "Invalid alignment: 3 is not a power of two");

        let err = AllocError::InvalidConfig {
            reason: "size threshold exceeds slab size",
        };
        assert_eq!(
            err.to_string(),
            "Invalid slab configuration: size threshold exceeds slab size"
        );
    }
}
