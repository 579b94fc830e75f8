use crate::{BoundingBox, KdNode};

/// A reachable node visited by [`NodeWalk`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct WalkItem<const D: usize> {
    pub(crate) index: usize,
    pub(crate) node: KdNode,
    pub(crate) bbox: BoundingBox<D>,
    pub(crate) depth: usize,
}

/// Depth-first, left-first walk over the nodes reachable from the root.
///
/// Nodes orphaned by retracted splits are never visited.
#[derive(Clone, Debug)]
pub(crate) struct NodeWalk<'a, const D: usize> {
    nodes: &'a [KdNode],
    stack: Vec<(usize, BoundingBox<D>, usize)>,
}

impl<'a, const D: usize> NodeWalk<'a, D> {
    pub(crate) fn new(nodes: &'a [KdNode], root_bbox: BoundingBox<D>) -> Self {
        let stack = if nodes.is_empty() {
            Vec::new()
        } else {
            vec![(0, root_bbox, 0)]
        };
        Self { nodes, stack }
    }
}

impl<const D: usize> Iterator for NodeWalk<'_, D> {
    type Item = WalkItem<D>;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, bbox, depth) = self.stack.pop()?;
        let node = *self.nodes.get(index)?;
        if !node.is_leaf() {
            let (left, right) = bbox.split(node.axis(), node.split());
            self.stack.push((node.right(index), right, depth + 1));
            self.stack.push((node.left(index), left, depth + 1));
        }
        Some(WalkItem {
            index,
            node,
            bbox,
            depth,
        })
    }
}

/// A leaf of a [`KdTree`](crate::KdTree).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Leaf<'a, const D: usize> {
    /// Region of space covered by the leaf.
    pub bbox: BoundingBox<D>,
    /// Depth of the leaf, the root being at depth 0.
    pub depth: usize,
    /// Indices of the primitives overlapping the leaf.
    pub primitives: &'a [u32],
}

/// Iterator over the leaves of a [`KdTree`](crate::KdTree), from left to right.
#[derive(Clone, Debug)]
pub struct Leaves<'a, const D: usize> {
    walk: NodeWalk<'a, D>,
    indices: &'a [u32],
}

impl<'a, const D: usize> Leaves<'a, D> {
    pub(crate) fn new(nodes: &'a [KdNode], indices: &'a [u32], root_bbox: BoundingBox<D>) -> Self {
        Self {
            walk: NodeWalk::new(nodes, root_bbox),
            indices,
        }
    }
}

impl<'a, const D: usize> Iterator for Leaves<'a, D> {
    type Item = Leaf<'a, D>;

    fn next(&mut self) -> Option<Self::Item> {
        let indices = self.indices;
        self.walk.by_ref().find(|item| item.node.is_leaf()).map(|item| {
            let offset = item.node.primitive_offset();
            let count = item.node.primitive_count();
            Leaf {
                bbox: item.bbox,
                depth: item.depth,
                primitives: indices.get(offset..offset + count).unwrap_or_default(),
            }
        })
    }
}
