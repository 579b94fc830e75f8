//! Error types for kd-tree construction.

use std::fmt;

/// Errors that can occur while building a [`KdTree`](crate::KdTree).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KdTreeError {
    /// The approximate binner needs at least two bins.
    InvalidMinMaxBins(usize),

    /// Leaves must be allowed to hold at least one primitive.
    InvalidStopPrimitives(usize),

    /// The exact phase threshold must exceed the leaf creation threshold.
    InvalidExactThreshold {
        /// Configured exact phase threshold.
        threshold: usize,
        /// Configured leaf creation threshold.
        stop_primitives: usize,
    },

    /// The tree only supports one to four dimensions, the split axis being packed in two bits.
    InvalidDimension(usize),

    /// A count or offset does not fit the packed node or index encoding.
    CapacityOverflow {
        /// The quantity that overflowed.
        what: &'static str,
        /// Its value.
        value: usize,
        /// The largest value the encoding holds.
        limit: usize,
    },
}

impl fmt::Display for KdTreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KdTreeError::InvalidMinMaxBins(n) => {
                write!(f, "invalid min-max bin count: need at least 2, got {}", n)
            }
            KdTreeError::InvalidStopPrimitives(n) => {
                write!(f, "invalid stop primitive count: need at least 1, got {}", n)
            }
            KdTreeError::InvalidExactThreshold {
                threshold,
                stop_primitives,
            } => {
                write!(
                    f,
                    "invalid exact primitive threshold: {} does not exceed the stop primitive count {}",
                    threshold, stop_primitives
                )
            }
            KdTreeError::InvalidDimension(d) => {
                write!(f, "unsupported dimension: expected 1 to 4, got {}", d)
            }
            KdTreeError::CapacityOverflow { what, value, limit } => {
                write!(f, "capacity overflow: {} is {} but at most {} fits", what, value, limit)
            }
        }
    }
}

impl std::error::Error for KdTreeError {}
