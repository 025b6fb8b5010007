//! Invariant violations reported by tree validation.

use std::fmt;

/// A broken structural invariant found by `validate_tree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// A node's cached height disagrees with its subtrees.
    HeightMismatch {
        /// Height recomputed from the children.
        expected: u32,
        /// Height stored in the node.
        found: u32,
    },

    /// Subtree heights differ by more than two.
    Unbalanced {
        /// Height of the left subtree.
        left: u32,
        /// Height of the right subtree.
        right: u32,
    },

    /// The left child's key does not order before its parent's key.
    LeftOrdering,

    /// The parent's key does not order before its right child's key.
    RightOrdering,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::HeightMismatch { expected, found } => {
                write!(f, "Height calculation wrong: expected {expected}, found {found}")
            }
            ValidationError::Unbalanced { left, right } => {
                write!(
                    f,
                    "Balancing invariant violated: left height {left}, right height {right}"
                )
            }
            ValidationError::LeftOrdering => {
                write!(f, "Value in left child is not less than current value")
            }
            ValidationError::RightOrdering => {
                write!(f, "Current value is not less than value of right child")
            }
        }
    }
}

impl std::error::Error for ValidationError {}
