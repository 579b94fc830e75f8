use crate::BoundingBox;

/// Trait for the cost models driving split selection.
///
/// A cost model is configured once per node with [`set_bounding_box`](Self::set_bounding_box)
/// and then queried for every candidate split of that node. The builders clone the tree's model
/// for each node, so implementations should be cheap to clone.
pub trait CostModel<const D: usize>: Clone + Send + Sync {
    /// Precomputes the per-axis constants for a node with the given bounding box.
    fn set_bounding_box(&mut self, bbox: &BoundingBox<D>);

    /// Returns the cost of a leaf holding `primitive_count` primitives.
    fn leaf_cost(&self, primitive_count: usize) -> f32;

    /// Returns the cost of splitting the current node at `split` along `axis` given the costs of
    /// both children.
    fn inner_cost(&self, axis: usize, split: f32, left_cost: f32, right_cost: f32) -> f32;

    /// Returns the measure the model weighs nodes by, used to normalise build statistics.
    fn eval(bbox: &BoundingBox<D>) -> f32;
}

/// Surface area heuristic.
///
/// The probability of a ray visiting a child is the ratio of its surface area to the parent's
/// (its length in 1D). A split leaving one side empty has its cost scaled by the empty space bonus.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceAreaHeuristic<const D: usize> {
    traversal_cost: f32,
    query_cost: f32,
    empty_space_bonus: f32,
    min: [f32; D],
    max: [f32; D],
    // Measure of the facets orthogonal to an axis and the growth rate of the others along it.
    base: [f32; D],
    slope: [f32; D],
    inv_area: f32,
}

impl<const D: usize> Default for SurfaceAreaHeuristic<D> {
    #[inline]
    fn default() -> Self {
        Self::new(15.0, 20.0, 0.9)
    }
}

impl<const D: usize> SurfaceAreaHeuristic<D> {
    /// Creates a new [`SurfaceAreaHeuristic`] with the given costs.
    #[inline]
    pub fn new(traversal_cost: f32, query_cost: f32, empty_space_bonus: f32) -> Self {
        Self {
            traversal_cost,
            query_cost,
            empty_space_bonus,
            min: [0.0; D],
            max: [0.0; D],
            base: [0.0; D],
            slope: [0.0; D],
            inv_area: 0.0,
        }
    }

    /// Returns the cost of one traversal step through an interior node.
    #[inline]
    pub fn traversal_cost(&self) -> f32 {
        self.traversal_cost
    }

    /// Returns the cost of one primitive intersection test.
    #[inline]
    pub fn query_cost(&self) -> f32 {
        self.query_cost
    }

    /// Returns the multiplier applied to splits cutting off empty space.
    #[inline]
    pub fn empty_space_bonus(&self) -> f32 {
        self.empty_space_bonus
    }

    /// Sets the cost of one traversal step.
    #[inline]
    pub fn with_traversal_cost(mut self, traversal_cost: f32) -> Self {
        self.traversal_cost = traversal_cost;
        self
    }

    /// Sets the cost of one primitive intersection test.
    #[inline]
    pub fn with_query_cost(mut self, query_cost: f32) -> Self {
        self.query_cost = query_cost;
        self
    }

    /// Sets the multiplier applied to splits cutting off empty space.
    #[inline]
    pub fn with_empty_space_bonus(mut self, empty_space_bonus: f32) -> Self {
        self.empty_space_bonus = empty_space_bonus;
        self
    }

    /// Returns the probabilities of visiting the left and right child of a split.
    #[inline]
    pub fn probabilities(&self, axis: usize, split: f32) -> (f32, f32) {
        let left = self.base[axis] + (split - self.min[axis]) * self.slope[axis];
        let right = self.base[axis] + (self.max[axis] - split) * self.slope[axis];
        (left * self.inv_area, right * self.inv_area)
    }
}

impl<const D: usize> CostModel<D> for SurfaceAreaHeuristic<D> {
    fn set_bounding_box(&mut self, bbox: &BoundingBox<D>) {
        let size = bbox.size();
        self.min = bbox.min;
        self.max = bbox.max;

        for axis in 0..D {
            if D == 1 {
                self.base[axis] = 0.0;
                self.slope[axis] = 1.0;
                continue;
            }

            let base: f32 = (0..D).filter(|&i| i != axis).map(|i| size[i]).product();
            let slope: f32 = (0..D)
                .filter(|&i| i != axis)
                .map(|i| {
                    (0..D)
                        .filter(|&j| j != axis && j != i)
                        .map(|j| size[j])
                        .product::<f32>()
                })
                .sum();
            self.base[axis] = 2.0 * base;
            self.slope[axis] = 2.0 * slope;
        }

        let area = Self::eval(bbox);
        self.inv_area = if area > 0.0 { 1.0 / area } else { 0.0 };
    }

    #[inline]
    fn leaf_cost(&self, primitive_count: usize) -> f32 {
        self.query_cost * primitive_count as f32
    }

    #[inline]
    fn inner_cost(&self, axis: usize, split: f32, left_cost: f32, right_cost: f32) -> f32 {
        let (left, right) = self.probabilities(axis, split);
        let cost = self.traversal_cost + left * left_cost + right * right_cost;
        if left_cost == 0.0 || right_cost == 0.0 {
            cost * self.empty_space_bonus
        } else {
            cost
        }
    }

    #[inline]
    fn eval(bbox: &BoundingBox<D>) -> f32 {
        bbox.surface_area()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() <= 1e-5 * a.abs().max(b.abs()).max(1.0)
    }

    #[test]
    fn probabilities_match_child_areas() {
        let bbox = BoundingBox::new([0.0, -1.0, 2.0], [4.0, 2.0, 3.5]);
        let mut sah = SurfaceAreaHeuristic::default();
        sah.set_bounding_box(&bbox);

        for axis in 0..3 {
            let split = bbox.min[axis] + (bbox.max[axis] - bbox.min[axis]) * 0.3;
            let (left_box, right_box) = bbox.split(axis, split);
            let (left, right) = sah.probabilities(axis, split);
            assert!(approx(left, left_box.surface_area() / bbox.surface_area()));
            assert!(approx(right, right_box.surface_area() / bbox.surface_area()));
        }
    }

    #[test]
    fn one_dimensional_probabilities_are_lengths() {
        let mut sah = SurfaceAreaHeuristic::<1>::default();
        sah.set_bounding_box(&BoundingBox::new([0.0], [4.0]));
        assert_eq!(sah.probabilities(0, 1.0), (0.25, 0.75));
    }

    #[test]
    fn empty_space_bonus() {
        let mut sah = SurfaceAreaHeuristic::<2>::default();
        sah.set_bounding_box(&BoundingBox::new([0.0; 2], [1.0; 2]));

        let full = sah.inner_cost(0, 0.5, sah.leaf_cost(2), sah.leaf_cost(2));
        assert!(approx(full, 15.0 + 0.75 * 40.0 + 0.75 * 40.0));

        let empty = sah.inner_cost(0, 0.5, sah.leaf_cost(0), sah.leaf_cost(2));
        assert!(approx(empty, (15.0 + 0.75 * 40.0) * 0.9));
    }
}
