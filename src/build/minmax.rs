use super::SplitCandidate;
use crate::{parallel, BoundingBox, CostModel, PrimitiveSet};
use std::ops::AddAssign;

/// Per-axis histograms of where primitive intervals start and end.
///
/// Bins span the bounding box given on creation. Values outside of it are clamped to the first or
/// last bin, so that binning and partitioning always agree on which side a primitive lies.
#[derive(Clone, Debug)]
pub(crate) struct MinMaxBinner<const D: usize> {
    bin_count: usize,
    bbox: BoundingBox<D>,
    bin_size: [f32; D],
    inv_bin_size: [f32; D],
    min_bins: Vec<u32>,
    max_bins: Vec<u32>,
}

/// Primitive lists and their bounds on each side of a split.
#[derive(Clone, Debug, Default)]
pub(crate) struct Partition<const D: usize> {
    pub(crate) left: Vec<u32>,
    pub(crate) right: Vec<u32>,
    pub(crate) left_bbox: BoundingBox<D>,
    pub(crate) right_bbox: BoundingBox<D>,
}

impl<const D: usize> AddAssign<&Self> for MinMaxBinner<D> {
    #[inline]
    fn add_assign(&mut self, rhs: &Self) {
        debug_assert_eq!(self.bin_count, rhs.bin_count);
        for (a, b) in self.min_bins.iter_mut().zip(&rhs.min_bins) {
            *a += b;
        }
        for (a, b) in self.max_bins.iter_mut().zip(&rhs.max_bins) {
            *a += b;
        }
    }
}

impl<const D: usize> MinMaxBinner<D> {
    pub(crate) fn new(bin_count: usize, bbox: BoundingBox<D>) -> Self {
        let bin_size = bbox.size().map(|s| s / bin_count as f32);
        let inv_bin_size = bin_size.map(|s| if s > 0.0 { 1.0 / s } else { 0.0 });
        Self {
            bin_count,
            bbox,
            bin_size,
            inv_bin_size,
            min_bins: vec![0; D * bin_count],
            max_bins: vec![0; D * bin_count],
        }
    }

    /// Bins the given primitives in parallel.
    pub(crate) fn bin<P>(
        primitives: &P,
        indices: &[u32],
        bin_count: usize,
        bbox: &BoundingBox<D>,
    ) -> Self
    where
        P: PrimitiveSet<D> + Sync + ?Sized,
    {
        parallel::fold_chunks(
            indices,
            || Self::new(bin_count, *bbox),
            |mut binner, chunk| {
                for &index in chunk {
                    binner.put(&primitives.bbox(index as usize));
                }
                binner
            },
            |mut a, b| {
                a += &b;
                a
            },
        )
    }

    #[inline]
    fn bin_index(&self, axis: usize, value: f32) -> usize {
        let bin = ((value - self.bbox.min[axis]) * self.inv_bin_size[axis]) as isize;
        bin.clamp(0, self.bin_count as isize - 1) as usize
    }

    #[inline]
    pub(crate) fn put(&mut self, bbox: &BoundingBox<D>) {
        for axis in 0..D {
            let offset = axis * self.bin_count;
            let min = self.bin_index(axis, bbox.min[axis]);
            let max = self.bin_index(axis, bbox.max[axis]);
            self.min_bins[offset + min] += 1;
            self.max_bins[offset + max] += 1;
        }
    }

    /// Returns the cheapest split along a bin boundary, `prim_count` being the number of binned
    /// primitives.
    ///
    /// The split position is refined to the smallest coordinate binned past the boundary, so that
    /// the returned counts are exact for that position.
    ///
    /// Only the interior boundaries are evaluated. The two outer ones bound the node and would leave
    /// every primitive in one child.
    pub(crate) fn best_candidate<C>(&self, prim_count: usize, cost_model: &C) -> SplitCandidate
    where
        C: CostModel<D>,
    {
        let mut best = SplitCandidate::default();

        for axis in (0..D).filter(|&axis| self.bin_size[axis] > 0.0) {
            let offset = axis * self.bin_count;
            let mut left = 0;
            let mut right = prim_count;

            for i in 0..self.bin_count - 1 {
                left += self.min_bins[offset + i] as usize;
                right -= self.max_bins[offset + i] as usize;

                let pos = self.bbox.min[axis] + (i + 1) as f32 * self.bin_size[axis];
                let cost = cost_model.inner_cost(
                    axis,
                    pos,
                    cost_model.leaf_cost(left),
                    cost_model.leaf_cost(right),
                );

                if cost < best.cost {
                    best = SplitCandidate {
                        axis,
                        pos,
                        cost,
                        num_left: left,
                        num_right: right,
                        right_bin: i + 1,
                        planar_left: false,
                    };
                }
            }
        }

        if best.cost.is_finite() {
            let pos = self.refine(best.axis, best.right_bin);
            if pos <= self.bbox.min[best.axis] || pos >= self.bbox.max[best.axis] {
                return SplitCandidate::default();
            }

            best.pos = pos;
            best.cost = cost_model.inner_cost(
                best.axis,
                pos,
                cost_model.leaf_cost(best.num_left),
                cost_model.leaf_cost(best.num_right),
            );
        }

        best
    }

    /// Bisects for the smallest coordinate falling in `right_bin` or above.
    fn refine(&self, axis: usize, right_bin: usize) -> f32 {
        let mut lo = self.bbox.min[axis];
        let mut hi = self.bbox.max[axis];
        debug_assert!(self.bin_index(axis, lo) < right_bin);
        debug_assert!(self.bin_index(axis, hi) >= right_bin);

        loop {
            let mid = lo + (hi - lo) * 0.5;
            if mid <= lo || mid >= hi {
                return hi;
            }
            if self.bin_index(axis, mid) >= right_bin {
                hi = mid;
            } else {
                lo = mid;
            }
        }
    }

    /// Splits the primitives by the bins their intervals span, straddling primitives going to
    /// both sides. The output keeps the input order.
    pub(crate) fn partition<P>(
        &self,
        primitives: &P,
        indices: &[u32],
        split: &SplitCandidate,
    ) -> Partition<D>
    where
        P: PrimitiveSet<D> + Sync + ?Sized,
    {
        let axis = split.axis;
        let chunks = parallel::map_chunks(indices, |chunk| {
            let mut part = Partition::default();
            for &index in chunk {
                let bbox = primitives.bbox(index as usize);
                if self.bin_index(axis, bbox.max[axis]) < split.right_bin {
                    part.left.push(index);
                    part.left_bbox.expand_by(&bbox);
                } else if self.bin_index(axis, bbox.min[axis]) >= split.right_bin {
                    part.right.push(index);
                    part.right_bbox.expand_by(&bbox);
                } else {
                    part.left.push(index);
                    part.right.push(index);
                    part.left_bbox.expand_by(&bbox);
                    part.right_bbox.expand_by(&bbox);
                }
            }
            part
        });

        let mut result = Partition {
            left: Vec::with_capacity(split.num_left),
            right: Vec::with_capacity(split.num_right),
            ..Default::default()
        };
        for part in chunks {
            result.left.extend_from_slice(&part.left);
            result.right.extend_from_slice(&part.right);
            result.left_bbox.expand_by(&part.left_bbox);
            result.right_bbox.expand_by(&part.right_bbox);
        }

        debug_assert_eq!(result.left.len(), split.num_left);
        debug_assert_eq!(result.right.len(), split.num_right);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SurfaceAreaHeuristic;

    fn boxes() -> Vec<BoundingBox<2>> {
        vec![
            BoundingBox::new([0.0, 0.0], [1.0, 1.0]),
            BoundingBox::new([0.5, 0.0], [1.5, 1.0]),
            BoundingBox::new([6.0, 0.0], [7.0, 1.0]),
            BoundingBox::new([8.0, 0.0], [10.0, 1.0]),
            BoundingBox::new([3.0, 0.0], [6.5, 1.0]),
        ]
    }

    fn bounds(boxes: &[BoundingBox<2>]) -> BoundingBox<2> {
        boxes.iter().fold(BoundingBox::default(), |b, x| b.union(x))
    }

    #[test]
    fn merged_histograms_match_sequential() {
        let boxes = boxes();
        let bbox = bounds(&boxes);

        let mut a = MinMaxBinner::new(16, bbox);
        let mut b = MinMaxBinner::new(16, bbox);
        let mut all = MinMaxBinner::new(16, bbox);
        for (i, x) in boxes.iter().enumerate() {
            if i % 2 == 0 { a.put(x) } else { b.put(x) }
            all.put(x);
        }
        a += &b;
        assert_eq!(a.min_bins, all.min_bins);
        assert_eq!(a.max_bins, all.max_bins);
        assert_eq!(all.min_bins.iter().sum::<u32>(), 2 * boxes.len() as u32);
    }

    #[test]
    fn refined_split_is_consistent() {
        let boxes = boxes();
        let bbox = bounds(&boxes);
        let indices: Vec<u32> = (0..boxes.len() as u32).collect();

        let mut sah = SurfaceAreaHeuristic::default();
        sah.set_bounding_box(&bbox);
        let binner = MinMaxBinner::bin(boxes.as_slice(), &indices, 32, &bbox);
        let best = binner.best_candidate(boxes.len(), &sah);
        assert!(best.cost.is_finite());
        assert_eq!(best.axis, 0);

        // The split is the first coordinate of its bin.
        assert!(binner.bin_index(0, best.pos) >= best.right_bin);
        let below = f32::from_bits(best.pos.to_bits() - 1);
        assert!(binner.bin_index(0, below) < best.right_bin);

        let partition = binner.partition(boxes.as_slice(), &indices, &best);
        assert_eq!(partition.left.len(), best.num_left);
        assert_eq!(partition.right.len(), best.num_right);
        for &i in &partition.left {
            assert!(boxes[i as usize].min[0] < best.pos);
        }
        for &i in &partition.right {
            assert!(boxes[i as usize].max[0] >= best.pos);
        }
    }

    #[test]
    fn collapsed_box_has_no_candidate() {
        let bbox = BoundingBox::new([1.0, 2.0], [1.0, 2.0]);
        let mut binner = MinMaxBinner::new(8, bbox);
        binner.put(&bbox);
        let mut sah = SurfaceAreaHeuristic::default();
        sah.set_bounding_box(&bbox);
        assert_eq!(binner.best_candidate(1, &sah).cost, f32::INFINITY);
    }
}
