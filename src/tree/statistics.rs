use super::iterator::NodeWalk;
use crate::{BoundingBox, CostModel, KdNode};
use std::{fmt, time::Duration};

/// Summary of a [`KdTree::build`](crate::KdTree::build).
///
/// Expected values are those of a ray hitting the root box, each node being visited with a
/// probability given by its [`CostModel::eval`] measure relative to the root's.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuildStatistics {
    /// Number of primitives in the set.
    pub primitive_count: usize,
    /// Number of nodes in the node array, including nodes orphaned by retracted splits.
    pub node_count: usize,
    /// Number of reachable interior nodes.
    pub interior_count: usize,
    /// Number of reachable leaves.
    pub leaf_count: usize,
    /// Number of reachable leaves referencing at least one primitive.
    pub nonempty_leaf_count: usize,
    /// Number of entries in the primitive index array.
    pub index_count: usize,
    /// Depth of the deepest leaf.
    pub max_depth: usize,
    /// Largest number of primitives in one leaf.
    pub max_leaf_size: usize,
    /// Splits made although costlier than a leaf.
    pub bad_refines: usize,
    /// Subtrees collapsed into leaves after construction.
    pub retracted_splits: usize,
    /// Primitives discarded because their clipped bounds were degenerate.
    pub pruned_primitives: usize,
    /// Subtrees built by the exact sweep.
    pub exact_work_units: usize,
    /// Expected number of interior nodes traversed.
    pub expected_traversal_steps: f32,
    /// Expected number of leaves visited.
    pub expected_leaves_visited: f32,
    /// Expected number of primitive intersection tests.
    pub expected_primitives_intersected: f32,
    /// Memory used by the node array in bytes.
    pub node_bytes: usize,
    /// Memory used by the primitive index array in bytes.
    pub index_bytes: usize,
    /// Memory held by construction scratch buffers in bytes.
    pub scratch_bytes: usize,
    /// Time spent building.
    pub duration: Duration,
}

impl BuildStatistics {
    /// Computes the structural fields from the final arrays.
    pub(crate) fn analyze<C, const D: usize>(
        nodes: &[KdNode],
        indices: &[u32],
        root_bbox: BoundingBox<D>,
    ) -> Self
    where
        C: CostModel<D>,
    {
        let mut stats = Self {
            node_count: nodes.len(),
            index_count: indices.len(),
            node_bytes: std::mem::size_of_val(nodes),
            index_bytes: std::mem::size_of_val(indices),
            ..Default::default()
        };

        let root = C::eval(&root_bbox);
        for item in NodeWalk::new(nodes, root_bbox) {
            let probability = if root > 0.0 {
                C::eval(&item.bbox) / root
            } else {
                1.0
            };

            if item.node.is_leaf() {
                let count = item.node.primitive_count();
                stats.leaf_count += 1;
                stats.nonempty_leaf_count += (count > 0) as usize;
                stats.max_leaf_size = stats.max_leaf_size.max(count);
                stats.max_depth = stats.max_depth.max(item.depth);
                stats.expected_leaves_visited += probability;
                stats.expected_primitives_intersected += probability * count as f32;
            } else {
                stats.interior_count += 1;
                stats.expected_traversal_steps += probability;
            }
        }

        stats
    }

    /// Returns the expected cost of a ray query given the cost of one traversal step and of one
    /// primitive intersection test.
    #[inline]
    pub fn expected_cost(&self, traversal_cost: f32, query_cost: f32) -> f32 {
        self.expected_traversal_steps * traversal_cost
            + self.expected_primitives_intersected * query_cost
    }

    /// Returns the number of nodes reachable from the root.
    #[inline]
    pub fn reachable_node_count(&self) -> usize {
        self.interior_count + self.leaf_count
    }
}

impl fmt::Display for BuildStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} primitives, {} nodes ({} interior, {} leaves, {} non-empty), {} indices, \
             depth {}, largest leaf {}, expected {:.2} steps / {:.2} leaves / {:.2} primitives, \
             {:.2} KiB tree + {:.2} KiB scratch, built in {:.2?}",
            self.primitive_count,
            self.node_count,
            self.interior_count,
            self.leaf_count,
            self.nonempty_leaf_count,
            self.index_count,
            self.max_depth,
            self.max_leaf_size,
            self.expected_traversal_steps,
            self.expected_leaves_visited,
            self.expected_primitives_intersected,
            (self.node_bytes + self.index_bytes) as f32 / 1024.0,
            self.scratch_bytes as f32 / 1024.0,
            self.duration,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SurfaceAreaHeuristic;

    #[test]
    fn expected_values_weigh_by_area() {
        // Root split in two halves, the left one holding two primitives and the right one none.
        let nodes = vec![
            KdNode::interior(0, 1.0, 1).unwrap(),
            KdNode::leaf(2, 0).unwrap(),
            KdNode::leaf(0, 0).unwrap(),
        ];
        let indices = vec![3, 7];
        let root = BoundingBox::new([0.0, 0.0], [2.0, 1.0]);

        let stats =
            BuildStatistics::analyze::<SurfaceAreaHeuristic<2>, 2>(&nodes, &indices, root);
        assert_eq!(stats.interior_count, 1);
        assert_eq!(stats.leaf_count, 2);
        assert_eq!(stats.nonempty_leaf_count, 1);
        assert_eq!(stats.max_depth, 1);
        assert_eq!(stats.max_leaf_size, 2);
        assert_eq!(stats.expected_traversal_steps, 1.0);
        // Each half has perimeter 4 out of 6.
        assert!((stats.expected_leaves_visited - 8.0 / 6.0).abs() < 1e-6);
        assert!((stats.expected_primitives_intersected - 8.0 / 6.0).abs() < 1e-6);
        assert_eq!(stats.node_bytes, 24);
        assert_eq!(stats.index_bytes, 8);
    }
}
