mod config;
mod iterator;
mod node;
mod statistics;
mod traversal;

pub use config::{BuildConfig, MAX_DIMENSION, MAX_KD_DEPTH};
pub use iterator::{Leaf, Leaves};
pub use node::{KdNode, NodeKind, MAX_CHILD_OFFSET, MAX_LEAF_PRIMITIVES};
pub use statistics::BuildStatistics;
pub use traversal::Hit;

use crate::{
    build::{BuildContext, BuildCounters, BuildTask},
    parallel, BoundingBox, CostModel, KdTreeError, PrimitiveSet, SurfaceAreaHeuristic,
};
use std::time::Instant;

/// Relative margin added around the primitives' bounds to get the box rays are clipped against.
const BBOX_EPSILON: f32 = 1e-4;

/// A kd-tree over a set of primitives, built with the surface area heuristic or another
/// [`CostModel`].
///
/// The tree owns its primitive set and only reads it. Configuration changes take effect on the
/// next [`build`](Self::build).
///
/// ```
/// # use kdaccel::prelude::*;
/// let boxes: Vec<_> = (0..100)
///     .map(|i| BoundingBox::new([i as f32, 0.0], [i as f32 + 0.5, 1.0]))
///     .collect();
///
/// let mut tree: KdTree<_, 2> = KdTree::new(boxes);
/// tree.build()?;
///
/// let hit = tree.ray_intersect(&Ray::new([-1.0, 0.5], [1.0, 0.0]));
/// assert_eq!(hit.map(|hit| hit.primitive), Some(0));
/// # Ok::<(), KdTreeError>(())
/// ```
#[derive(Clone, Debug)]
pub struct KdTree<P, const D: usize, C = SurfaceAreaHeuristic<D>> {
    pub(crate) primitives: P,
    config: BuildConfig,
    cost_model: C,
    pub(crate) nodes: Vec<KdNode>,
    pub(crate) indices: Vec<u32>,
    pub(crate) bbox: BoundingBox<D>,
    tight_bbox: BoundingBox<D>,
    statistics: Option<BuildStatistics>,
}

impl<P, const D: usize> KdTree<P, D> {
    /// Creates a new unbuilt [`KdTree`] using the default [`SurfaceAreaHeuristic`].
    #[inline]
    pub fn new(primitives: P) -> Self {
        Self::with_cost_model(primitives, SurfaceAreaHeuristic::default())
    }
}

impl<P, const D: usize, C> KdTree<P, D, C> {
    /// Creates a new unbuilt [`KdTree`] using the given cost model.
    pub fn with_cost_model(primitives: P, cost_model: C) -> Self {
        Self {
            primitives,
            config: BuildConfig::default(),
            cost_model,
            nodes: Vec::new(),
            indices: Vec::new(),
            bbox: BoundingBox::default(),
            tight_bbox: BoundingBox::default(),
            statistics: None,
        }
    }

    /// Replaces the whole build configuration.
    #[inline]
    pub fn with_config(mut self, config: BuildConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the build configuration.
    #[inline]
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Sets the maximum depth, `0` deriving it from the primitive count.
    #[inline]
    pub fn set_max_depth(&mut self, max_depth: usize) {
        self.config.max_depth = max_depth;
    }

    /// Returns the configured maximum depth.
    #[inline]
    pub fn max_depth(&self) -> usize {
        self.config.max_depth
    }

    /// Sets the number of bins of the approximate phase.
    #[inline]
    pub fn set_min_max_bins(&mut self, min_max_bins: usize) {
        self.config.min_max_bins = min_max_bins;
    }

    /// Returns the number of bins of the approximate phase.
    #[inline]
    pub fn min_max_bins(&self) -> usize {
        self.config.min_max_bins
    }

    /// Sets the primitive count at or below which nodes become leaves.
    #[inline]
    pub fn set_stop_primitives(&mut self, stop_primitives: usize) {
        self.config.stop_primitives = stop_primitives;
    }

    /// Returns the primitive count at or below which nodes become leaves.
    #[inline]
    pub fn stop_primitives(&self) -> usize {
        self.config.stop_primitives
    }

    /// Sets the primitive count at or below which subtrees are built with the exact sweep.
    #[inline]
    pub fn set_exact_primitive_threshold(&mut self, threshold: usize) {
        self.config.exact_primitive_threshold = threshold;
    }

    /// Returns the primitive count at or below which subtrees are built with the exact sweep.
    #[inline]
    pub fn exact_primitive_threshold(&self) -> usize {
        self.config.exact_primitive_threshold
    }

    /// Enables clipping of primitives against child boxes in the exact phase.
    #[inline]
    pub fn set_clip_primitives(&mut self, clip: bool) {
        self.config.clip_primitives = clip;
    }

    /// Returns `true` if primitives are clipped in the exact phase.
    #[inline]
    pub fn clip_primitives(&self) -> bool {
        self.config.clip_primitives
    }

    /// Enables collapsing subtrees costlier than a leaf.
    #[inline]
    pub fn set_retract_bad_splits(&mut self, retract: bool) {
        self.config.retract_bad_splits = retract;
    }

    /// Returns `true` if subtrees costlier than a leaf are collapsed.
    #[inline]
    pub fn retract_bad_splits(&self) -> bool {
        self.config.retract_bad_splits
    }

    /// Sets the number of consecutive splits costlier than a leaf tolerated along a path.
    #[inline]
    pub fn set_max_bad_refines(&mut self, max_bad_refines: usize) {
        self.config.max_bad_refines = max_bad_refines;
    }

    /// Returns the number of consecutive splits costlier than a leaf tolerated along a path.
    #[inline]
    pub fn max_bad_refines(&self) -> usize {
        self.config.max_bad_refines
    }

    /// Returns the cost model.
    #[inline]
    pub fn cost_model(&self) -> &C {
        &self.cost_model
    }

    /// Replaces the cost model.
    #[inline]
    pub fn set_cost_model(&mut self, cost_model: C) {
        self.cost_model = cost_model;
    }

    /// Returns the primitive set.
    #[inline]
    pub fn primitives(&self) -> &P {
        &self.primitives
    }

    /// Consumes the tree and returns its primitive set.
    #[inline]
    pub fn into_primitives(self) -> P {
        self.primitives
    }

    /// Returns `true` once a build has succeeded.
    #[inline]
    pub fn ready(&self) -> bool {
        !self.nodes.is_empty()
    }

    /// Returns the bounds of the tree, slightly larger than the bounds of its primitives.
    #[inline]
    pub fn bbox(&self) -> &BoundingBox<D> {
        &self.bbox
    }

    /// Returns the bounds of the primitives the tree was built over.
    #[inline]
    pub fn tight_bbox(&self) -> &BoundingBox<D> {
        &self.tight_bbox
    }

    /// Returns the node array, the root being the first node.
    #[inline]
    pub fn nodes(&self) -> &[KdNode] {
        &self.nodes
    }

    /// Returns the primitive index array referenced by the leaves.
    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Returns the number of nodes, including nodes orphaned by retracted splits.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of entries of the primitive index array.
    #[inline]
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Returns the statistics of the last successful build.
    #[inline]
    pub fn statistics(&self) -> Option<&BuildStatistics> {
        self.statistics.as_ref()
    }

    /// Returns an iterator over the leaves reachable from the root.
    #[inline]
    pub fn leaves(&self) -> Leaves<'_, D> {
        Leaves::new(&self.nodes, &self.indices, self.tight_bbox)
    }

    fn clear(&mut self) {
        self.nodes = Vec::new();
        self.indices = Vec::new();
        self.bbox = BoundingBox::default();
        self.tight_bbox = BoundingBox::default();
        self.statistics = None;
    }
}

impl<P, const D: usize, C> KdTree<P, D, C>
where
    P: PrimitiveSet<D> + Sync,
    C: CostModel<D>,
{
    /// Builds the tree, replacing any previous one.
    ///
    /// Primitives with invalid bounding boxes are left out. On error the tree is left unbuilt.
    pub fn build(&mut self) -> Result<BuildStatistics, KdTreeError> {
        self.clear();
        if D == 0 || D > MAX_DIMENSION {
            return Err(KdTreeError::InvalidDimension(D));
        }
        self.config.validate()?;

        let start = Instant::now();
        let primitive_count = self.primitives.primitive_count();
        if primitive_count > u32::MAX as usize {
            return Err(KdTreeError::CapacityOverflow {
                what: "primitive count",
                value: primitive_count,
                limit: u32::MAX as usize,
            });
        }

        let (primitives, tight_bbox) = valid_primitives(&self.primitives, primitive_count);
        let valid_count = primitives.len();
        let tight_bbox = if valid_count == 0 {
            BoundingBox::zero()
        } else {
            tight_bbox
        };

        let max_depth = self.config.effective_max_depth(valid_count);
        log::debug!(
            "building kd-tree over {} primitives ({} skipped), max depth {}, {:?}",
            valid_count,
            primitive_count - valid_count,
            max_depth,
            self.config
        );

        let ctx = BuildContext::new(&self.primitives, &self.config, &self.cost_model, max_depth);
        ctx.nodes.reserve(2 * valid_count + 1);
        ctx.indices.reserve(valid_count);

        let root = ctx.nodes.grow_by(1)?;
        let outcome = BuildTask {
            ctx: &ctx,
            node: root,
            depth: 0,
            node_bbox: tight_bbox,
            tight_bbox,
            primitives,
            bad_refines: 0,
        }
        .execute()?;
        log::debug!("root finished as {:?} with cost {}", outcome.phase, outcome.cost);

        let nodes = ctx.nodes.to_vec();
        let indices = ctx.indices.to_vec();

        let mut statistics = BuildStatistics::analyze::<C, D>(&nodes, &indices, tight_bbox);
        statistics.primitive_count = primitive_count;
        statistics.bad_refines = BuildCounters::get(&ctx.counters.bad_refines);
        statistics.retracted_splits = BuildCounters::get(&ctx.counters.retracted_splits);
        statistics.pruned_primitives = BuildCounters::get(&ctx.counters.pruned);
        statistics.exact_work_units = BuildCounters::get(&ctx.counters.work_units);
        statistics.scratch_bytes = ctx.scratch_bytes();
        drop(ctx);
        statistics.duration = start.elapsed();

        log::debug!(
            "{} bad refines, {} retracted splits, {} pruned primitives, {} exact work units",
            statistics.bad_refines,
            statistics.retracted_splits,
            statistics.pruned_primitives,
            statistics.exact_work_units
        );
        log::info!("built kd-tree: {}", statistics);

        self.nodes = nodes;
        self.indices = indices;
        self.tight_bbox = tight_bbox;
        self.bbox = if valid_count == 0 {
            tight_bbox
        } else {
            tight_bbox.inflated(BBOX_EPSILON)
        };
        self.statistics = Some(statistics.clone());
        Ok(statistics)
    }
}

/// Returns the primitives with a valid bounding box, in index order, and their bounds.
fn valid_primitives<P, const D: usize>(primitives: &P, count: usize) -> (Vec<u32>, BoundingBox<D>)
where
    P: PrimitiveSet<D> + Sync,
{
    let all: Vec<u32> = (0..count as u32).collect();
    let chunks = parallel::map_chunks(&all, |chunk| {
        let mut valid = Vec::with_capacity(chunk.len());
        let mut bbox = BoundingBox::default();
        for &index in chunk {
            let primitive = primitives.bbox(index as usize);
            if primitive.is_valid() {
                valid.push(index);
                bbox.expand_by(&primitive);
            }
        }
        (valid, bbox)
    });

    let mut result = (Vec::with_capacity(count), BoundingBox::default());
    for (valid, bbox) in chunks {
        result.0.extend_from_slice(&valid);
        result.1.expand_by(&bbox);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IntersectRay, Ray};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random_boxes<const D: usize>(count: usize, seed: u64) -> Vec<BoundingBox<D>> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..count)
            .map(|_| {
                let min: [f32; D] = std::array::from_fn(|_| rng.gen_range(0.0..99.0));
                BoundingBox::new(min, min.map(|x| x + 1.0))
            })
            .collect()
    }

    fn built<const D: usize>(
        boxes: Vec<BoundingBox<D>>,
        clip: bool,
        threshold: usize,
    ) -> KdTree<Vec<BoundingBox<D>>, D> {
        let mut tree = KdTree::new(boxes);
        tree.set_clip_primitives(clip);
        tree.set_exact_primitive_threshold(threshold);
        tree.build().unwrap();
        tree
    }

    fn brute_force<const D: usize>(boxes: &[BoundingBox<D>], ray: &Ray<D>) -> Option<f32> {
        boxes
            .iter()
            .filter_map(|b| b.intersect_ray(ray, ray.mint, ray.maxt))
            .min_by(f32::total_cmp)
    }

    fn leaves_cover_primitives<const D: usize>(clip: bool, threshold: usize) {
        let tree = built(random_boxes::<D>(1000, 1), clip, threshold);
        let boxes = tree.primitives();

        let mut seen = vec![false; boxes.len()];
        for leaf in tree.leaves() {
            assert!(leaf.depth <= MAX_KD_DEPTH);
            for &index in leaf.primitives {
                assert!(leaf.bbox.overlaps(&boxes[index as usize]));
                seen[index as usize] = true;
            }
        }
        assert!(seen.into_iter().all(|seen| seen));

        let stats = tree.statistics().unwrap();
        assert_eq!(stats.primitive_count, 1000);
        assert_eq!(stats.node_count, tree.node_count());
        assert!(stats.max_leaf_size <= 32);
        assert!(stats.index_count >= tree.leaves().map(|l| l.primitives.len()).sum::<usize>());
        assert!(tree.bbox().contains(&tree.tight_bbox().min));
        assert!(tree.bbox().contains(&tree.tight_bbox().max));
    }

    fn closest_hits_match_brute_force<const D: usize>(clip: bool, threshold: usize) {
        let tree = built(random_boxes::<D>(1000, 2), clip, threshold);
        let boxes = tree.primitives();
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        for target in boxes.iter().take(100) {
            let origin: [f32; D] = std::array::from_fn(|_| rng.gen_range(-20.0..120.0));
            let center = target.center();
            let direction = std::array::from_fn(|i| center[i] - origin[i]);
            let ray = Ray::new(origin, direction);

            let expected = brute_force(boxes, &ray);
            assert!(expected.is_some());
            let hit = tree.ray_intersect(&ray);
            assert_eq!(hit.map(|hit| hit.t), expected);
            if let Some(hit) = hit {
                assert_eq!(
                    boxes[hit.primitive].intersect_ray(&ray, ray.mint, ray.maxt),
                    Some(hit.t)
                );
            }
            assert!(tree.ray_occluded(&ray));
        }

        let away = Ray::new([-10.0; D], [-1.0; D]);
        assert_eq!(tree.ray_intersect(&away), None);
        assert!(!tree.ray_occluded(&away));
    }

    fn retraction_only_removes_nodes<const D: usize>() {
        let boxes = random_boxes::<D>(1000, 4);
        let mut tree: KdTree<_, D> = KdTree::new(boxes);
        tree.set_exact_primitive_threshold(64);

        tree.set_retract_bad_splits(false);
        let full = tree.build().unwrap();
        tree.set_retract_bad_splits(true);
        let retracted = tree.build().unwrap();

        assert_eq!(full.retracted_splits, 0);
        assert!(full.reachable_node_count() >= retracted.reachable_node_count());
        assert_eq!(
            full.reachable_node_count() == retracted.reachable_node_count(),
            retracted.retracted_splits == 0
        );
    }

    #[cfg(feature = "parallel")]
    fn single_thread_builds_are_identical<const D: usize>() {
        let boxes = random_boxes::<D>(1000, 5);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .build()
            .unwrap();

        let first = pool.install(|| built(boxes.clone(), true, 64));
        let second = pool.install(|| built(boxes.clone(), true, 64));
        assert_eq!(first.nodes(), second.nodes());
        assert_eq!(first.indices(), second.indices());

        // Only the array layout depends on scheduling.
        let parallel = built(boxes, true, 64);
        assert!(first.leaves().eq(parallel.leaves()));
    }

    macro_rules! scenario_tests {
        ($($dim:literal),*) => {$(
            paste::paste! {
                #[test]
                fn [<leaves_cover_primitives_ $dim d>]() {
                    leaves_cover_primitives::<$dim>(true, 64);
                    leaves_cover_primitives::<$dim>(false, 64);
                    leaves_cover_primitives::<$dim>(true, 4);
                }

                #[test]
                fn [<closest_hits_match_brute_force_ $dim d>]() {
                    closest_hits_match_brute_force::<$dim>(true, 64);
                    closest_hits_match_brute_force::<$dim>(false, 64);
                    closest_hits_match_brute_force::<$dim>(true, 4);
                    closest_hits_match_brute_force::<$dim>(true, 65536);
                }

                #[test]
                fn [<retraction_only_removes_nodes_ $dim d>]() {
                    retraction_only_removes_nodes::<$dim>();
                }

                #[cfg(feature = "parallel")]
                #[test]
                fn [<single_thread_builds_are_identical_ $dim d>]() {
                    single_thread_builds_are_identical::<$dim>();
                }
            }
        )*};
    }

    scenario_tests!(2, 3, 4);

    #[test]
    fn empty_set() {
        let mut tree = KdTree::<Vec<BoundingBox<3>>, 3>::new(Vec::new());
        let stats = tree.build().unwrap();
        assert!(tree.ready());
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.index_count(), 0);
        assert_eq!(*tree.bbox(), BoundingBox::zero());
        assert_eq!(stats.leaf_count, 1);
        assert_eq!(stats.nonempty_leaf_count, 0);
        assert!(!tree.ray_occluded(&Ray::new([-1.0; 3], [1.0; 3])));
    }

    #[test]
    fn invalid_boxes_are_skipped() {
        let mut boxes = random_boxes::<3>(50, 6);
        boxes.push(BoundingBox::default());
        boxes.push(BoundingBox::new([f32::NAN; 3], [1.0; 3]));

        let mut tree: KdTree<_, 3> = KdTree::new(boxes);
        let stats = tree.build().unwrap();
        assert_eq!(stats.primitive_count, 52);
        assert!(tree.leaves().all(|leaf| leaf.primitives.iter().all(|&i| i < 50)));
    }

    #[test]
    fn duplicates_end_in_one_leaf() {
        let boxes = vec![BoundingBox::new([0.0; 3], [1.0; 3]); 100];
        let mut tree: KdTree<_, 3> = KdTree::new(boxes);
        let stats = tree.build().unwrap();
        assert_eq!(stats.leaf_count, 1);
        assert_eq!(stats.max_leaf_size, 100);
    }

    #[test]
    fn bad_refines_allow_costly_splits() {
        // Overlapping boxes where every split costs more than a leaf.
        let boxes: Vec<_> = (0..20)
            .map(|i| {
                let x = i as f32 * 0.125;
                BoundingBox::new([x, 0.0], [x + 10.0, 1.0])
            })
            .collect();

        let mut tree: KdTree<_, 2> = KdTree::new(boxes);
        tree.set_retract_bad_splits(false);
        let stats = tree.build().unwrap();
        assert_eq!(stats.bad_refines, 0);
        assert_eq!(stats.node_count, 1);

        tree.set_max_bad_refines(1);
        let stats = tree.build().unwrap();
        assert!(stats.bad_refines >= 1);
        assert!(stats.node_count > 1);

        let ray = Ray::new([-1.0, 0.5], [1.0, 0.0]);
        assert_eq!(tree.ray_intersect(&ray).map(|hit| hit.primitive), Some(0));
    }

    #[test]
    fn degenerate_boxes_are_pruned_when_clipping() {
        let mut boxes = random_boxes::<3>(50, 8);
        // A segment along x has no surface area.
        boxes.push(BoundingBox::new([10.0; 3], [20.0, 10.0, 10.0]));

        let tree = built(boxes.clone(), true, 65536);
        let stats = tree.statistics().unwrap();
        assert_eq!(stats.pruned_primitives, 1);
        assert!(tree.leaves().all(|leaf| !leaf.primitives.contains(&50)));

        let tree = built(boxes, false, 65536);
        assert_eq!(tree.statistics().unwrap().pruned_primitives, 0);
        assert!(tree.leaves().any(|leaf| leaf.primitives.contains(&50)));
    }

    /// A row of boxes plus one primitive whose bounding box spans the row but whose geometry only
    /// exists around `anchor`.
    struct Anchored {
        row: Vec<BoundingBox<2>>,
        anchor: [f32; 2],
    }

    impl PrimitiveSet<2> for Anchored {
        fn primitive_count(&self) -> usize {
            self.row.len() + 1
        }

        fn bbox(&self, index: usize) -> BoundingBox<2> {
            match index {
                0 => BoundingBox::new([0.0, 0.0], [63.0, 1.0]),
                _ => self.row[index - 1],
            }
        }

        fn clipped_bbox(&self, index: usize, clip: &BoundingBox<2>) -> BoundingBox<2> {
            if index == 0 && !clip.contains(&self.anchor) {
                return BoundingBox::default();
            }
            self.bbox(index).intersection(clip)
        }
    }

    #[test]
    fn clipped_children_drop_primitives_outside_them() {
        let set = Anchored {
            row: (0..32)
                .map(|i| {
                    let x = i as f32 * 2.0;
                    BoundingBox::new([x, 0.0], [x + 1.0, 1.0])
                })
                .collect(),
            anchor: [0.5, 0.5],
        };

        let mut tree: KdTree<_, 2> = KdTree::new(set);
        tree.set_stop_primitives(1);
        let stats = tree.build().unwrap();
        assert!(stats.pruned_primitives >= 1);

        let mut seen = vec![false; 33];
        for leaf in tree.leaves() {
            for &i in leaf.primitives {
                seen[i as usize] = true;
                if i == 0 {
                    assert!(leaf.bbox.contains(&[0.5, 0.5]));
                }
            }
        }
        assert!(seen.iter().all(|&seen| seen));
    }

    #[test]
    fn configuration_errors_leave_tree_unbuilt() {
        let mut tree: KdTree<_, 3> = KdTree::new(random_boxes::<3>(100, 7));
        tree.build().unwrap();
        assert!(tree.ready());

        tree.set_min_max_bins(1);
        assert_eq!(tree.build(), Err(KdTreeError::InvalidMinMaxBins(1)));
        assert!(!tree.ready());
        assert!(tree.statistics().is_none());
        assert!(tree.ray_intersect(&Ray::new([-1.0; 3], [1.0; 3])).is_none());

        tree.set_min_max_bins(32);
        tree.set_stop_primitives(0);
        assert_eq!(tree.build(), Err(KdTreeError::InvalidStopPrimitives(0)));

        tree.set_stop_primitives(3);
        tree.build().unwrap();
        assert!(tree.ready());
    }

    #[test]
    fn unsupported_dimension() {
        let mut tree: KdTree<_, 5> = KdTree::new(vec![BoundingBox::new([0.0; 5], [1.0; 5])]);
        assert_eq!(tree.build(), Err(KdTreeError::InvalidDimension(5)));
    }

    #[test]
    fn one_dimension() {
        let boxes: Vec<_> = (0..200)
            .map(|i| BoundingBox::new([i as f32 * 3.0], [i as f32 * 3.0 + 1.0]))
            .collect();
        let mut tree: KdTree<_, 1> = KdTree::new(boxes);
        tree.set_exact_primitive_threshold(16);
        tree.build().unwrap();

        let hit = tree.ray_intersect(&Ray::new([101.0], [1.0])).unwrap();
        assert_eq!((hit.primitive, hit.t), (34, 1.0));
        let hit = tree.ray_intersect(&Ray::new([101.0], [-1.0])).unwrap();
        assert_eq!((hit.primitive, hit.t), (33, 1.0));
    }
}
