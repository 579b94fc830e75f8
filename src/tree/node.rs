use crate::KdTreeError;
use std::fmt;

const LEAF_EXPONENT: u32 = 0x7F80_0000;
const COUNT_MASK: u32 = 0x007F_FFFF;

/// Largest number of primitives a single leaf can reference.
pub const MAX_LEAF_PRIMITIVES: usize = COUNT_MASK as usize;

/// Largest distance between an interior node and its left child.
pub const MAX_CHILD_OFFSET: usize = (1 << 30) - 1;

/// Decoded view of a [`KdNode`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NodeKind {
    /// Interior node splitting space along `axis` at `split`.
    Interior {
        /// Split axis.
        axis: usize,
        /// Split coordinate.
        split: f32,
        /// Distance from this node to its left child, the right child follows the left one.
        child_offset: usize,
    },
    /// Leaf referencing `count` entries of the primitive index array starting at `offset`.
    Leaf {
        /// Number of referenced primitives.
        count: usize,
        /// Position of the first primitive in the index array.
        offset: usize,
    },
}

/// A kd-tree node packed in 8 bytes.
///
/// The low word holds the split coordinate of an interior node. A leaf sets the exponent bits of
/// that word to all ones, which no finite split coordinate has, and stores its primitive count in
/// the mantissa bits. The high word holds `child_offset << 2 | axis` for interior nodes and the
/// offset of the primitive list for leaves.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct KdNode(u64);

impl Default for KdNode {
    /// An empty leaf.
    #[inline]
    fn default() -> Self {
        Self(LEAF_EXPONENT as u64)
    }
}

impl KdNode {
    #[inline]
    fn from_words(low: u32, high: u32) -> Self {
        Self(low as u64 | (high as u64) << 32)
    }

    #[inline]
    fn low(&self) -> u32 {
        self.0 as u32
    }

    #[inline]
    fn high(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Creates a new interior node.
    pub fn interior(axis: usize, split: f32, child_offset: usize) -> Result<Self, KdTreeError> {
        debug_assert!(axis < 4);
        debug_assert!(split.is_finite());
        if child_offset > MAX_CHILD_OFFSET {
            return Err(KdTreeError::CapacityOverflow {
                what: "child offset",
                value: child_offset,
                limit: MAX_CHILD_OFFSET,
            });
        }
        Ok(Self::from_words(
            split.to_bits(),
            (child_offset as u32) << 2 | axis as u32,
        ))
    }

    /// Creates a new leaf.
    pub fn leaf(count: usize, offset: usize) -> Result<Self, KdTreeError> {
        if count > MAX_LEAF_PRIMITIVES {
            return Err(KdTreeError::CapacityOverflow {
                what: "leaf primitive count",
                value: count,
                limit: MAX_LEAF_PRIMITIVES,
            });
        }
        if offset > u32::MAX as usize {
            return Err(KdTreeError::CapacityOverflow {
                what: "primitive list offset",
                value: offset,
                limit: u32::MAX as usize,
            });
        }
        Ok(Self::from_words(LEAF_EXPONENT | count as u32, offset as u32))
    }

    /// Returns `true` if the node is a leaf.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.low() & LEAF_EXPONENT == LEAF_EXPONENT
    }

    /// Split axis of an interior node.
    #[inline]
    pub fn axis(&self) -> usize {
        (self.high() & 0b11) as usize
    }

    /// Split coordinate of an interior node.
    #[inline]
    pub fn split(&self) -> f32 {
        f32::from_bits(self.low())
    }

    /// Distance to the left child of an interior node.
    #[inline]
    pub fn child_offset(&self) -> usize {
        (self.high() >> 2) as usize
    }

    /// Index of the left child of the interior node stored at `index`.
    #[inline]
    pub fn left(&self, index: usize) -> usize {
        index + self.child_offset()
    }

    /// Index of the right child of the interior node stored at `index`.
    #[inline]
    pub fn right(&self, index: usize) -> usize {
        index + self.child_offset() + 1
    }

    /// Number of primitives referenced by a leaf.
    #[inline]
    pub fn primitive_count(&self) -> usize {
        (self.low() & COUNT_MASK) as usize
    }

    /// Position of the first primitive of a leaf in the index array.
    #[inline]
    pub fn primitive_offset(&self) -> usize {
        self.high() as usize
    }

    /// Returns the decoded node.
    #[inline]
    pub fn kind(&self) -> NodeKind {
        if self.is_leaf() {
            NodeKind::Leaf {
                count: self.primitive_count(),
                offset: self.primitive_offset(),
            }
        } else {
            NodeKind::Interior {
                axis: self.axis(),
                split: self.split(),
                child_offset: self.child_offset(),
            }
        }
    }
}

impl fmt::Debug for KdNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_is_eight_bytes() {
        assert_eq!(std::mem::size_of::<KdNode>(), 8);
        assert!(crossbeam_utils::atomic::AtomicCell::<KdNode>::is_lock_free());
    }

    #[test]
    fn interior_encoding() {
        for (axis, split) in [(0, 0.0), (1, -3.5), (2, f32::MAX), (3, -0.0)] {
            let node = KdNode::interior(axis, split, MAX_CHILD_OFFSET).unwrap();
            assert!(!node.is_leaf());
            assert_eq!(node.axis(), axis);
            assert_eq!(node.split().to_bits(), split.to_bits());
            assert_eq!(node.left(10), 10 + MAX_CHILD_OFFSET);
            assert_eq!(node.right(10), 11 + MAX_CHILD_OFFSET);
        }
    }

    #[test]
    fn leaf_encoding() {
        let node = KdNode::leaf(MAX_LEAF_PRIMITIVES, u32::MAX as usize).unwrap();
        assert!(node.is_leaf());
        assert_eq!(
            node.kind(),
            NodeKind::Leaf {
                count: MAX_LEAF_PRIMITIVES,
                offset: u32::MAX as usize
            }
        );

        assert!(KdNode::default().is_leaf());
        assert_eq!(KdNode::default().primitive_count(), 0);
    }

    #[test]
    fn overflow() {
        assert!(matches!(
            KdNode::interior(0, 1.0, MAX_CHILD_OFFSET + 1),
            Err(KdTreeError::CapacityOverflow { .. })
        ));
        assert!(matches!(
            KdNode::leaf(MAX_LEAF_PRIMITIVES + 1, 0),
            Err(KdTreeError::CapacityOverflow { .. })
        ));
    }
}
