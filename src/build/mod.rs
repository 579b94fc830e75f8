//! Tree construction.
//!
//! Large nodes are split in parallel using binned min-max histograms. Once a node holds at most
//! [`exact_primitive_threshold`](crate::BuildConfig::exact_primitive_threshold) primitives, its
//! subtree is built sequentially by sweeping sorted edge events, which finds the optimal split of
//! every node.

mod classification;
mod event;
mod exact;
mod minmax;

use crate::{
    memory::{GrowableConcurrentArray, OrderedChunkAllocator},
    parallel, BoundingBox, BuildConfig, CostModel, KdNode, KdTreeError, PrimitiveSet,
};
use classification::ClassificationStorage;
use crossbeam_utils::CachePadded;
use event::EdgeEvent;
use minmax::MinMaxBinner;
use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxHashSet;
use std::{
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicUsize, Ordering},
};

/// A candidate split of a node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct SplitCandidate {
    pub(crate) axis: usize,
    pub(crate) pos: f32,
    /// `f32::INFINITY` when no usable split was found.
    pub(crate) cost: f32,
    pub(crate) num_left: usize,
    pub(crate) num_right: usize,
    /// First bin on the right side, for binned candidates.
    pub(crate) right_bin: usize,
    /// Whether primitives lying in the split plane go left, for swept candidates.
    pub(crate) planar_left: bool,
}

impl Default for SplitCandidate {
    #[inline]
    fn default() -> Self {
        Self {
            axis: 0,
            pos: 0.0,
            cost: f32::INFINITY,
            num_left: 0,
            num_right: 0,
            right_bin: 0,
            planar_left: false,
        }
    }
}

/// State a node ends up in once its subtree is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Phase {
    MinMax,
    TransitionToExact,
    ExactSweep,
    Leaf,
    Retracted,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct NodeOutcome {
    pub(crate) cost: f32,
    pub(crate) phase: Phase,
}

#[derive(Debug, Default)]
pub(crate) struct BuildCounters {
    pub(crate) bad_refines: CachePadded<AtomicUsize>,
    pub(crate) retracted_splits: CachePadded<AtomicUsize>,
    pub(crate) pruned: CachePadded<AtomicUsize>,
    pub(crate) work_units: CachePadded<AtomicUsize>,
}

impl BuildCounters {
    #[inline]
    pub(crate) fn add(counter: &AtomicUsize, amount: usize) {
        if amount > 0 {
            counter.fetch_add(amount, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::Relaxed)
    }
}

/// Scratch memory of the exact phase, owned by one worker at a time.
#[derive(Debug, Default)]
pub(crate) struct LocalBuildContext {
    pub(crate) left_events: OrderedChunkAllocator<EdgeEvent>,
    pub(crate) right_events: OrderedChunkAllocator<EdgeEvent>,
    pub(crate) classification: ClassificationStorage,
}

impl LocalBuildContext {
    fn allocated_bytes(&self) -> usize {
        self.left_events.allocated_bytes()
            + self.right_events.allocated_bytes()
            + self.classification.allocated_bytes()
    }
}

pub(crate) enum LocalGuard<'a> {
    Pooled(MutexGuard<'a, LocalBuildContext>),
    Owned(Box<LocalBuildContext>),
}

impl Deref for LocalGuard<'_> {
    type Target = LocalBuildContext;

    #[inline]
    fn deref(&self) -> &LocalBuildContext {
        match self {
            LocalGuard::Pooled(guard) => guard,
            LocalGuard::Owned(local) => local,
        }
    }
}

impl DerefMut for LocalGuard<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut LocalBuildContext {
        match self {
            LocalGuard::Pooled(guard) => guard,
            LocalGuard::Owned(local) => local,
        }
    }
}

/// State shared by all tasks of one build.
pub(crate) struct BuildContext<'a, P, C, const D: usize> {
    pub(crate) primitives: &'a P,
    pub(crate) config: &'a BuildConfig,
    pub(crate) cost_model: &'a C,
    pub(crate) max_depth: usize,
    pub(crate) nodes: GrowableConcurrentArray<KdNode>,
    pub(crate) indices: GrowableConcurrentArray<u32>,
    pub(crate) counters: BuildCounters,
    locals: Vec<Mutex<LocalBuildContext>>,
}

impl<'a, P, C, const D: usize> BuildContext<'a, P, C, D>
where
    P: PrimitiveSet<D> + Sync,
    C: CostModel<D>,
{
    pub(crate) fn new(
        primitives: &'a P,
        config: &'a BuildConfig,
        cost_model: &'a C,
        max_depth: usize,
    ) -> Self {
        // One slot per worker plus one for the calling thread.
        let locals = (0..parallel::worker_count() + 1)
            .map(|_| Mutex::new(LocalBuildContext::default()))
            .collect();

        Self {
            primitives,
            config,
            cost_model,
            max_depth,
            nodes: GrowableConcurrentArray::new(),
            indices: GrowableConcurrentArray::new(),
            counters: BuildCounters::default(),
            locals,
        }
    }

    /// Returns the scratch memory of the current worker, or a fresh one if it is in use.
    pub(crate) fn local_context(&self) -> LocalGuard<'_> {
        let slot = parallel::worker_index().min(self.locals.len() - 1);
        match self.locals[slot].try_lock() {
            Some(guard) => LocalGuard::Pooled(guard),
            None => LocalGuard::Owned(Box::default()),
        }
    }

    /// Returns the scratch memory held by all workers in bytes.
    pub(crate) fn scratch_bytes(&self) -> usize {
        self.locals
            .iter()
            .map(|local| local.lock().allocated_bytes())
            .sum()
    }

    /// Decides whether a split is worth making and returns the bad refine count of the children.
    pub(crate) fn accept_split(
        &self,
        best: &SplitCandidate,
        leaf_cost: f32,
        primitive_count: usize,
        bad_refines: usize,
    ) -> Option<usize> {
        if !best.cost.is_finite() {
            return None;
        }
        if best.cost < leaf_cost {
            return Some(bad_refines);
        }
        if (best.cost > 4.0 * leaf_cost && primitive_count < 16)
            || bad_refines >= self.config.max_bad_refines
        {
            return None;
        }

        BuildCounters::add(&self.counters.bad_refines, 1);
        Some(bad_refines + 1)
    }

    /// Writes a leaf holding `count` primitives at `node`.
    pub(crate) fn create_leaf<I>(
        &self,
        node: usize,
        count: usize,
        primitives: I,
    ) -> Result<NodeOutcome, KdTreeError>
    where
        I: IntoIterator<Item = u32>,
    {
        // Fails on oversized leaves before reserving index slots.
        KdNode::leaf(count, 0)?;
        let offset = if count > 0 {
            self.indices.grow_by(count)?
        } else {
            0
        };

        let mut written = 0;
        for (i, index) in primitives.into_iter().enumerate() {
            self.indices.set(offset + i, index);
            written += 1;
        }
        debug_assert_eq!(written, count, "leaf primitive count mismatch");

        self.nodes.set(node, KdNode::leaf(count, offset)?);

        Ok(NodeOutcome {
            cost: self.cost_model.leaf_cost(count),
            phase: Phase::Leaf,
        })
    }

    /// Finishes an interior node, collapsing it into a leaf if its subtree is costlier than one.
    pub(crate) fn finish_split(
        &self,
        node: usize,
        cost: f32,
        leaf_cost: f32,
        phase: Phase,
    ) -> Result<NodeOutcome, KdTreeError> {
        if !self.config.retract_bad_splits || cost < leaf_cost {
            return Ok(NodeOutcome { cost, phase });
        }

        let primitives = self.subtree_primitives(node);
        BuildCounters::add(&self.counters.retracted_splits, 1);
        let outcome = self.create_leaf(node, primitives.len(), primitives)?;
        Ok(NodeOutcome {
            phase: Phase::Retracted,
            ..outcome
        })
    }

    /// Returns the sorted set of primitives referenced by the leaves below `node`.
    fn subtree_primitives(&self, node: usize) -> Vec<u32> {
        let mut primitives = FxHashSet::default();
        let mut stack = vec![node];

        while let Some(index) = stack.pop() {
            let Some(current) = self.nodes.get(index) else {
                continue;
            };
            if current.is_leaf() {
                let offset = current.primitive_offset();
                let count = current.primitive_count();
                primitives.extend((offset..offset + count).filter_map(|i| self.indices.get(i)));
            } else {
                stack.push(current.right(index));
                stack.push(current.left(index));
            }
        }

        let mut primitives: Vec<u32> = primitives.into_iter().collect();
        primitives.sort_unstable();
        primitives
    }
}

/// Construction of the subtree rooted at one node.
pub(crate) struct BuildTask<'c, 'a, P, C, const D: usize> {
    pub(crate) ctx: &'c BuildContext<'a, P, C, D>,
    pub(crate) node: usize,
    pub(crate) depth: usize,
    pub(crate) node_bbox: BoundingBox<D>,
    /// Bounds of the primitives, clipped to the node.
    pub(crate) tight_bbox: BoundingBox<D>,
    pub(crate) primitives: Vec<u32>,
    pub(crate) bad_refines: usize,
}

impl<P, C, const D: usize> BuildTask<'_, '_, P, C, D>
where
    P: PrimitiveSet<D> + Sync,
    C: CostModel<D>,
{
    fn phase(&self) -> Phase {
        let config = self.ctx.config;
        let count = self.primitives.len();
        if count <= config.stop_primitives
            || self.depth >= self.ctx.max_depth
            || C::eval(&self.tight_bbox) <= 0.0
        {
            Phase::Leaf
        } else if count <= config.exact_primitive_threshold {
            Phase::TransitionToExact
        } else {
            Phase::MinMax
        }
    }

    pub(crate) fn execute(self) -> Result<NodeOutcome, KdTreeError> {
        match self.phase() {
            Phase::Leaf => self.into_leaf(),
            Phase::TransitionToExact => exact::transition(self),
            _ => self.split(),
        }
    }

    fn into_leaf(self) -> Result<NodeOutcome, KdTreeError> {
        let count = self.primitives.len();
        self.ctx.create_leaf(self.node, count, self.primitives)
    }

    fn split(self) -> Result<NodeOutcome, KdTreeError> {
        let ctx = self.ctx;
        let count = self.primitives.len();

        let mut cost_model = ctx.cost_model.clone();
        cost_model.set_bounding_box(&self.node_bbox);

        let binner = MinMaxBinner::bin(
            ctx.primitives,
            &self.primitives,
            ctx.config.min_max_bins,
            &self.tight_bbox,
        );
        let best = binner.best_candidate(count, &cost_model);
        let leaf_cost = cost_model.leaf_cost(count);

        let Some(bad_refines) = ctx.accept_split(&best, leaf_cost, count, self.bad_refines) else {
            return self.into_leaf();
        };

        let partition = binner.partition(ctx.primitives, &self.primitives, &best);
        let children = ctx.nodes.grow_by(2)?;
        ctx.nodes.set(
            self.node,
            KdNode::interior(best.axis, best.pos, children - self.node)?,
        );

        let (left_bbox, right_bbox) = self.node_bbox.split(best.axis, best.pos);
        let left = BuildTask {
            ctx,
            node: children,
            depth: self.depth + 1,
            node_bbox: left_bbox,
            tight_bbox: partition.left_bbox.intersection(&left_bbox),
            primitives: partition.left,
            bad_refines,
        };
        let right = BuildTask {
            ctx,
            node: children + 1,
            depth: self.depth + 1,
            node_bbox: right_bbox,
            tight_bbox: partition.right_bbox.intersection(&right_bbox),
            primitives: partition.right,
            bad_refines,
        };
        let node = self.node;
        drop(self);

        let (left, right) = parallel::join(|| left.execute(), || right.execute());
        let (left, right) = (left?, right?);

        let cost = cost_model.inner_cost(best.axis, best.pos, left.cost, right.cost);
        ctx.finish_split(node, cost, leaf_cost, Phase::MinMax)
    }
}
