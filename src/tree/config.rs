use crate::KdTreeError;

/// Largest depth a tree can reach, bounding the traversal stack.
pub const MAX_KD_DEPTH: usize = 48;

/// Largest supported dimension, the split axis being packed in two bits.
pub const MAX_DIMENSION: usize = 4;

/// Parameters of [`KdTree::build`](crate::KdTree::build).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildConfig {
    /// Maximum depth of the tree, `0` picks `8 + 1.3·log2(N)`. Always capped at [`MAX_KD_DEPTH`].
    pub max_depth: usize,
    /// Number of bins of the approximate phase, per axis.
    pub min_max_bins: usize,
    /// Nodes with this many primitives or fewer become leaves.
    pub stop_primitives: usize,
    /// Nodes with this many primitives or fewer are built with the exact sweep.
    pub exact_primitive_threshold: usize,
    /// Clips straddling primitives against child boxes in the exact phase.
    pub clip_primitives: bool,
    /// Collapses subtrees that end up costlier than a leaf.
    pub retract_bad_splits: bool,
    /// Number of consecutive splits costlier than a leaf tolerated along a path.
    pub max_bad_refines: usize,
}

impl Default for BuildConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_depth: 0,
            min_max_bins: 128,
            stop_primitives: 3,
            exact_primitive_threshold: 65536,
            clip_primitives: true,
            retract_bad_splits: true,
            max_bad_refines: 0,
        }
    }
}

impl BuildConfig {
    /// Checks that the configuration can build a tree.
    pub fn validate(&self) -> Result<(), KdTreeError> {
        if self.min_max_bins < 2 {
            return Err(KdTreeError::InvalidMinMaxBins(self.min_max_bins));
        }
        if self.stop_primitives == 0 {
            return Err(KdTreeError::InvalidStopPrimitives(self.stop_primitives));
        }
        if self.exact_primitive_threshold <= self.stop_primitives {
            return Err(KdTreeError::InvalidExactThreshold {
                threshold: self.exact_primitive_threshold,
                stop_primitives: self.stop_primitives,
            });
        }
        Ok(())
    }

    /// Returns the depth limit used for `primitive_count` primitives.
    pub fn effective_max_depth(&self, primitive_count: usize) -> usize {
        let depth = if self.max_depth == 0 {
            let log2 = (primitive_count.max(1) as f32).log2();
            (8.0 + 1.3 * log2) as usize
        } else {
            self.max_depth
        };
        depth.min(MAX_KD_DEPTH)
    }
}
