use super::{
    classification::{ClassificationStorage, PrimClass},
    event::{
        axis_range, events_bbox, events_per_primitive, merge_events, sort_events,
        write_box_events, EdgeEvent, EventKind,
    },
    BuildContext, BuildCounters, BuildTask, LocalBuildContext, NodeOutcome, Phase,
    SplitCandidate,
};
use crate::{
    memory::{Allocation, OrderedChunkAllocator},
    BoundingBox, CostModel, KdNode, KdTreeError, PrimitiveSet,
};

/// Allocator holding the event list of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// Scratch blocks of a split, released once both children are built.
enum Scratch {
    InPlace {
        other: Allocation,
    },
    Clipped {
        new_same: Allocation,
        merged_same: Allocation,
        new_other: Allocation,
        other: Allocation,
        merged_other: Allocation,
    },
}

/// Event lists of both children of a split.
struct EventSplit {
    left: Allocation,
    right: Allocation,
    left_count: usize,
    right_count: usize,
    scratch: Scratch,
}

type Events = OrderedChunkAllocator<EdgeEvent>;

/// Returns the allocator holding the events of `side`, the other one and the classification.
#[inline]
fn split_local(
    local: &mut LocalBuildContext,
    side: Side,
) -> (&mut Events, &mut Events, &mut ClassificationStorage) {
    let LocalBuildContext {
        left_events,
        right_events,
        classification,
    } = local;
    match side {
        Side::Left => (left_events, right_events, classification),
        Side::Right => (right_events, left_events, classification),
    }
}

/// Generates the sorted events of a node's primitives and builds its subtree with the sweep.
pub(crate) fn transition<P, C, const D: usize>(
    task: BuildTask<'_, '_, P, C, D>,
) -> Result<NodeOutcome, KdTreeError>
where
    P: PrimitiveSet<D> + Sync,
    C: CostModel<D>,
{
    let BuildTask {
        ctx,
        node,
        depth,
        node_bbox,
        primitives,
        bad_refines,
        ..
    } = task;

    let mut local = ctx.local_context();
    let primitive_count = ctx.primitives.primitive_count();
    if local.classification.len() != primitive_count {
        local.classification.resize(primitive_count);
    }

    let clip = ctx.config.clip_primitives;
    let mut events = local
        .left_events
        .allocate(primitives.len() * events_per_primitive(D));
    let mut len = 0;
    let mut pruned = 0;
    {
        let out = local.left_events.get_mut(&events);
        for &index in &primitives {
            let bbox = if clip {
                ctx.primitives.clipped_bbox(index as usize, &node_bbox)
            } else {
                ctx.primitives.bbox(index as usize).intersection(&node_bbox)
            };

            if !bbox.is_valid() || (clip && bbox.surface_area() <= 0.0) {
                pruned += 1;
                continue;
            }
            len += write_box_events(&mut out[len..], &bbox, index);
        }
    }
    local.left_events.shrink_allocation(&mut events, len);
    sort_events(local.left_events.get_mut(&events));

    BuildCounters::add(&ctx.counters.pruned, pruned);
    BuildCounters::add(&ctx.counters.work_units, 1);
    log::trace!(
        "exact phase at node {} (depth {}): {} primitives, {} pruned",
        node,
        depth,
        primitives.len(),
        pruned
    );

    let count = primitives.len() - pruned;
    drop(primitives);

    let result = ExactBuilder {
        ctx,
        local: &mut *local,
    }
    .build(node, depth, node_bbox, events, count, Side::Left, bad_refines);
    local.left_events.release(events);
    result
}

/// Finds the cheapest split of a node by sweeping its sorted events.
///
/// Events sharing a position are grouped: ends leave the right side before the split is scored,
/// starts join the left side after it. Primitives lying in the split plane are tried on both
/// sides. Only positions strictly inside `node_bbox` are considered.
pub(crate) fn sweep<C, const D: usize>(
    events: &[EdgeEvent],
    prim_count: usize,
    node_bbox: &BoundingBox<D>,
    cost_model: &C,
) -> SplitCandidate
where
    C: CostModel<D>,
{
    let mut best = SplitCandidate::default();
    let mut num_left = [0usize; D];
    let mut num_right = [prim_count; D];

    let mut i = 0;
    while i < events.len() {
        let axis = events[i].axis as usize;
        let pos = events[i].pos;
        let same_plane = |e: &EdgeEvent| e.axis as usize == axis && e.pos == pos;

        let count = |kind: EventKind, i: &mut usize| {
            let start = *i;
            while *i < events.len() && same_plane(&events[*i]) && events[*i].kind == kind {
                *i += 1;
            }
            *i - start
        };
        let num_end = count(EventKind::End, &mut i);
        let num_planar = count(EventKind::Planar, &mut i);
        let num_start = count(EventKind::Start, &mut i);

        num_right[axis] -= num_planar + num_end;

        if pos > node_bbox.min[axis] && pos < node_bbox.max[axis] {
            let (left, right) = (num_left[axis], num_right[axis]);

            let cost = cost_model.inner_cost(
                axis,
                pos,
                cost_model.leaf_cost(left + num_planar),
                cost_model.leaf_cost(right),
            );
            if cost < best.cost {
                best = SplitCandidate {
                    axis,
                    pos,
                    cost,
                    num_left: left + num_planar,
                    num_right: right,
                    planar_left: true,
                    ..Default::default()
                };
            }

            if num_planar > 0 {
                let cost = cost_model.inner_cost(
                    axis,
                    pos,
                    cost_model.leaf_cost(left),
                    cost_model.leaf_cost(right + num_planar),
                );
                if cost < best.cost {
                    best = SplitCandidate {
                        axis,
                        pos,
                        cost,
                        num_left: left,
                        num_right: right + num_planar,
                        planar_left: false,
                        ..Default::default()
                    };
                }
            }
        }

        num_left[axis] += num_start + num_planar;
    }

    best
}

/// Tags every primitive of the node with the side of `best` it lies on and returns the number
/// of straddling primitives.
fn classify(
    events: &[EdgeEvent],
    best: &SplitCandidate,
    classification: &mut ClassificationStorage,
) -> usize {
    let events = &events[axis_range(events, best.axis)];
    for e in events {
        classification.set(e.index, PrimClass::Both);
    }

    for e in events {
        let class = match e.kind {
            EventKind::End if e.pos <= best.pos => PrimClass::Left,
            EventKind::Start if e.pos >= best.pos => PrimClass::Right,
            EventKind::Planar => {
                if e.pos < best.pos || (e.pos == best.pos && best.planar_left) {
                    PrimClass::Left
                } else {
                    PrimClass::Right
                }
            }
            _ => continue,
        };
        classification.set(e.index, class);
    }

    let mut counts = [0usize; 3];
    for e in events.iter().filter(|e| e.kind != EventKind::End) {
        match classification.get(e.index) {
            PrimClass::Left => counts[0] += 1,
            PrimClass::Right => counts[1] += 1,
            _ => counts[2] += 1,
        }
    }
    debug_assert_eq!(counts[0] + counts[2], best.num_left);
    debug_assert_eq!(counts[1] + counts[2], best.num_right);
    counts[2]
}

/// Returns `(to_same, to_other)` for an event of a primitive of the given class.
#[inline]
fn route(class: PrimClass, side: Side) -> (bool, bool) {
    match class {
        PrimClass::Both | PrimClass::BothProcessed => (true, true),
        PrimClass::Left => (side == Side::Left, side == Side::Right),
        PrimClass::Right => (side == Side::Right, side == Side::Left),
    }
}

struct ExactBuilder<'l, 'c, 'a, P, C, const D: usize> {
    ctx: &'c BuildContext<'a, P, C, D>,
    local: &'l mut LocalBuildContext,
}

impl<P, C, const D: usize> ExactBuilder<'_, '_, '_, P, C, D>
where
    P: PrimitiveSet<D> + Sync,
    C: CostModel<D>,
{
    #[inline]
    fn events(&self, side: Side, events: &Allocation) -> &[EdgeEvent] {
        match side {
            Side::Left => self.local.left_events.get(events),
            Side::Right => self.local.right_events.get(events),
        }
    }

    /// Builds the subtree of `node` from its events, which must be the most recent block of the
    /// allocator of `side`.
    #[allow(clippy::too_many_arguments)]
    fn build(
        &mut self,
        node: usize,
        depth: usize,
        node_bbox: BoundingBox<D>,
        events: Allocation,
        prim_count: usize,
        side: Side,
        bad_refines: usize,
    ) -> Result<NodeOutcome, KdTreeError> {
        let ctx = self.ctx;

        if prim_count <= ctx.config.stop_primitives || depth >= ctx.max_depth {
            return self.leaf(node, side, &events, prim_count);
        }

        let tight = events_bbox::<D>(self.events(side, &events));
        if C::eval(&tight) <= 0.0 {
            return self.leaf(node, side, &events, prim_count);
        }

        let mut cost_model = ctx.cost_model.clone();
        cost_model.set_bounding_box(&node_bbox);
        let best = sweep(self.events(side, &events), prim_count, &node_bbox, &cost_model);
        let leaf_cost = cost_model.leaf_cost(prim_count);

        let Some(bad_refines) = ctx.accept_split(&best, leaf_cost, prim_count, bad_refines) else {
            return self.leaf(node, side, &events, prim_count);
        };

        let children = ctx.nodes.grow_by(2)?;
        ctx.nodes
            .set(node, KdNode::interior(best.axis, best.pos, children - node)?);

        let num_both = {
            let (same, _, classification) = split_local(self.local, side);
            classify(same.get(&events), &best, classification)
        };

        let (left_bbox, right_bbox) = node_bbox.split(best.axis, best.pos);
        let split = if ctx.config.clip_primitives && num_both > 0 {
            self.partition_clipped(side, events, &best, num_both, &left_bbox, &right_bbox)
        } else {
            self.partition_in_place(side, events, &best)
        };

        let result = self
            .build(
                children,
                depth + 1,
                left_bbox,
                split.left,
                split.left_count,
                Side::Left,
                bad_refines,
            )
            .and_then(|left| {
                let right = self.build(
                    children + 1,
                    depth + 1,
                    right_bbox,
                    split.right,
                    split.right_count,
                    Side::Right,
                    bad_refines,
                )?;
                Ok((left, right))
            });
        self.release(side, split.scratch);
        let (left, right) = result?;

        let cost = cost_model.inner_cost(best.axis, best.pos, left.cost, right.cost);
        ctx.finish_split(node, cost, leaf_cost, Phase::ExactSweep)
    }

    /// Creates a leaf from the primitives of the first axis' events.
    fn leaf(
        &self,
        node: usize,
        side: Side,
        events: &Allocation,
        prim_count: usize,
    ) -> Result<NodeOutcome, KdTreeError> {
        let events = self.events(side, events);
        let primitives = events
            .iter()
            .take_while(|e| e.axis == 0)
            .filter(|e| e.kind != EventKind::End)
            .map(|e| e.index);
        self.ctx.create_leaf(node, prim_count, primitives)
    }

    /// Splits the events by copying them to the side of their primitive. Events staying on the
    /// side of the node are compacted in place.
    fn partition_in_place(
        &mut self,
        side: Side,
        events: Allocation,
        best: &SplitCandidate,
    ) -> EventSplit {
        let num_other = match side {
            Side::Left => best.num_right,
            Side::Right => best.num_left,
        };

        let (same, other, classification) = split_local(self.local, side);
        let mut other_events = other.allocate(num_other * events_per_primitive(D));
        let mut same_events = events;
        let (mut same_len, mut other_len) = (0, 0);
        {
            let input = same.get_mut(&events);
            let output = other.get_mut(&other_events);
            for i in 0..input.len() {
                let e = input[i];
                let (to_same, to_other) = route(classification.get(e.index), side);
                if to_same {
                    input[same_len] = e;
                    same_len += 1;
                }
                if to_other {
                    output[other_len] = e;
                    other_len += 1;
                }
            }
        }
        same.shrink_allocation(&mut same_events, same_len);
        other.shrink_allocation(&mut other_events, other_len);

        let (left, right) = match side {
            Side::Left => (same_events, other_events),
            Side::Right => (other_events, same_events),
        };
        EventSplit {
            left,
            right,
            left_count: best.num_left,
            right_count: best.num_right,
            scratch: Scratch::InPlace {
                other: other_events,
            },
        }
    }

    /// Splits the events, replacing those of straddling primitives by events of their parts
    /// clipped to each child.
    fn partition_clipped(
        &mut self,
        side: Side,
        events: Allocation,
        best: &SplitCandidate,
        num_both: usize,
        left_bbox: &BoundingBox<D>,
        right_bbox: &BoundingBox<D>,
    ) -> EventSplit {
        let primitives = self.ctx.primitives;
        let (num_same, num_other, same_clip, other_clip) = match side {
            Side::Left => (best.num_left, best.num_right, left_bbox, right_bbox),
            Side::Right => (best.num_right, best.num_left, right_bbox, left_bbox),
        };
        let usable = |bbox: &BoundingBox<D>| bbox.is_valid() && bbox.surface_area() > 0.0;

        let (same, other, classification) = split_local(self.local, side);

        // Events of the clipped straddling primitives.
        let bound = num_both * events_per_primitive(D);
        let mut new_same = same.allocate(bound);
        let mut new_other = other.allocate(bound);
        let (mut new_same_len, mut new_other_len) = (0, 0);
        let (mut pruned_same, mut pruned_other) = (0, 0);
        {
            let [input, new_same_out] = same.get_disjoint_mut([&events, &new_same]);
            let new_other_out = other.get_mut(&new_other);
            for e in input.iter() {
                if classification.get(e.index) != PrimClass::Both {
                    continue;
                }
                classification.set(e.index, PrimClass::BothProcessed);

                let bbox = primitives.clipped_bbox(e.index as usize, same_clip);
                if usable(&bbox) {
                    new_same_len += write_box_events(&mut new_same_out[new_same_len..], &bbox, e.index);
                } else {
                    pruned_same += 1;
                }

                let bbox = primitives.clipped_bbox(e.index as usize, other_clip);
                if usable(&bbox) {
                    new_other_len +=
                        write_box_events(&mut new_other_out[new_other_len..], &bbox, e.index);
                } else {
                    pruned_other += 1;
                }
            }
        }
        same.shrink_allocation(&mut new_same, new_same_len);
        other.shrink_allocation(&mut new_other, new_other_len);
        sort_events(same.get_mut(&new_same));
        sort_events(other.get_mut(&new_other));

        // Events of the primitives lying on one side only.
        let mut other_events = other.allocate((num_other - num_both) * events_per_primitive(D));
        let (mut same_len, mut other_len) = (0, 0);
        {
            let input = same.get_mut(&events);
            let output = other.get_mut(&other_events);
            for i in 0..input.len() {
                let e = input[i];
                match classification.get(e.index) {
                    PrimClass::Both | PrimClass::BothProcessed => {}
                    class => {
                        let (to_same, _) = route(class, side);
                        if to_same {
                            input[same_len] = e;
                            same_len += 1;
                        } else {
                            output[other_len] = e;
                            other_len += 1;
                        }
                    }
                }
            }
        }
        other.shrink_allocation(&mut other_events, other_len);

        let merged_same = same.allocate(same_len + new_same.len());
        {
            let [input, clipped, merged] =
                same.get_disjoint_mut([&events, &new_same, &merged_same]);
            merge_events(&input[..same_len], clipped, merged);
        }
        let merged_other = other.allocate(other_len + new_other.len());
        {
            let [unclipped, clipped, merged] =
                other.get_disjoint_mut([&other_events, &new_other, &merged_other]);
            merge_events(unclipped, clipped, merged);
        }

        BuildCounters::add(&self.ctx.counters.pruned, pruned_same + pruned_other);

        let same_count = num_same - pruned_same;
        let other_count = num_other - pruned_other;
        let (left, right, left_count, right_count) = match side {
            Side::Left => (merged_same, merged_other, same_count, other_count),
            Side::Right => (merged_other, merged_same, other_count, same_count),
        };
        EventSplit {
            left,
            right,
            left_count,
            right_count,
            scratch: Scratch::Clipped {
                new_same,
                merged_same,
                new_other,
                other: other_events,
                merged_other,
            },
        }
    }

    fn release(&mut self, side: Side, scratch: Scratch) {
        let (same, other, _) = split_local(self.local, side);
        match scratch {
            Scratch::InPlace { other: block } => other.release(block),
            Scratch::Clipped {
                new_same,
                merged_same,
                new_other,
                other: block,
                merged_other,
            } => {
                same.release(merged_same);
                same.release(new_same);
                other.release(merged_other);
                other.release(block);
                other.release(new_other);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::minmax::MinMaxBinner;
    use super::*;
    use crate::SurfaceAreaHeuristic;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random_boxes(count: usize, seed: u64) -> Vec<BoundingBox<3>> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..count)
            .map(|_| {
                let min: [f32; 3] = std::array::from_fn(|_| rng.gen_range(0.0..50.0));
                let max = std::array::from_fn(|i| min[i] + rng.gen_range(0.1..4.0));
                BoundingBox::new(min, max)
            })
            .collect()
    }

    fn sorted_events(boxes: &[BoundingBox<3>]) -> Vec<EdgeEvent> {
        let mut events = vec![EdgeEvent::default(); boxes.len() * 6];
        let mut len = 0;
        for (i, bbox) in boxes.iter().enumerate() {
            len += write_box_events(&mut events[len..], bbox, i as u32);
        }
        events.truncate(len);
        sort_events(&mut events);
        events
    }

    #[test]
    fn sweep_separates_clusters() {
        let boxes = vec![
            BoundingBox::new([0.0; 3], [1.0; 3]),
            BoundingBox::new([0.5; 3], [1.5; 3]),
            BoundingBox::new([10.0, 0.0, 0.0], [11.0, 1.0, 1.0]),
            BoundingBox::new([10.5, 0.5, 0.5], [11.5, 1.5, 1.5]),
        ];
        let node = BoundingBox::new([0.0; 3], [11.5, 1.5, 1.5]);
        let mut sah = SurfaceAreaHeuristic::default();
        sah.set_bounding_box(&node);

        let best = sweep(&sorted_events(&boxes), boxes.len(), &node, &sah);
        assert_eq!(best.axis, 0);
        assert!(best.pos >= 1.5 && best.pos <= 10.0);
        assert_eq!((best.num_left, best.num_right), (2, 2));
    }

    #[test]
    fn planar_primitives_pick_a_side() {
        let boxes = vec![
            BoundingBox::new([0.0, 0.0], [1.0, 1.0]),
            BoundingBox::new([2.0, 0.0], [2.0, 1.0]),
            BoundingBox::new([2.0, 0.0], [4.0, 1.0]),
        ];
        let node = BoundingBox::new([0.0; 2], [4.0, 1.0]);
        let mut events = vec![EdgeEvent::default(); 12];
        let mut len = 0;
        for (i, bbox) in boxes.iter().enumerate() {
            len += write_box_events(&mut events[len..], bbox, i as u32);
        }
        events.truncate(len);
        sort_events(&mut events);

        let mut sah = SurfaceAreaHeuristic::default();
        sah.set_bounding_box(&node);
        let best = sweep(&events, 3, &node, &sah);
        assert_eq!(best.axis, 0);

        let mut classification = ClassificationStorage::default();
        classification.resize(3);
        let num_both = classify(&events, &best, &mut classification);
        assert_eq!(num_both, 0);
        assert_eq!(classification.get(0), PrimClass::Left);
        assert_eq!(classification.get(2), PrimClass::Right);
        assert_eq!(best.num_left + best.num_right, 3);
    }

    #[test]
    fn exact_is_not_worse_than_binned() {
        for seed in 0..8 {
            let boxes = random_boxes(200, seed);
            let tight = boxes.iter().fold(BoundingBox::default(), |b, x| b.union(x));
            // Keeps every event strictly inside the node.
            let node = tight.inflated(1e-2);
            let indices: Vec<u32> = (0..boxes.len() as u32).collect();

            let mut sah = SurfaceAreaHeuristic::default();
            sah.set_bounding_box(&node);

            let binner = MinMaxBinner::bin(boxes.as_slice(), &indices, 32, &tight);
            let binned = binner.best_candidate(boxes.len(), &sah);
            let exact = sweep(&sorted_events(&boxes), boxes.len(), &node, &sah);

            assert!(binned.cost.is_finite());
            assert!(exact.cost <= binned.cost * (1.0 + 1e-4));
        }
    }
}
