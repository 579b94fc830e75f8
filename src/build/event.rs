use crate::BoundingBox;
use std::cmp::Ordering;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub(crate) enum EventKind {
    #[default]
    End = 0,
    Planar = 1,
    Start = 2,
}

/// Boundary of the projection of a primitive onto one axis.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct EdgeEvent {
    pub(crate) pos: f32,
    pub(crate) index: u32,
    pub(crate) axis: u8,
    pub(crate) kind: EventKind,
}

impl EdgeEvent {
    #[inline]
    pub(crate) fn new(kind: EventKind, axis: usize, pos: f32, index: u32) -> Self {
        Self {
            // Folds -0.0 into 0.0 so that the total order agrees with `==`.
            pos: pos + 0.0,
            index,
            axis: axis as u8,
            kind,
        }
    }

    /// Sweep order: by axis, position, kind (end, planar, start) and primitive index.
    #[inline]
    pub(crate) fn order(&self, other: &Self) -> Ordering {
        self.axis
            .cmp(&other.axis)
            .then_with(|| self.pos.total_cmp(&other.pos))
            .then_with(|| self.kind.cmp(&other.kind))
            .then_with(|| self.index.cmp(&other.index))
    }
}

/// Maximum number of events a single primitive generates.
#[inline]
pub(crate) const fn events_per_primitive(dimension: usize) -> usize {
    2 * dimension
}

/// Writes the events of a box into `out` and returns how many were written.
///
/// Axes along which the box is flat produce a single planar event.
#[inline]
pub(crate) fn write_box_events<const D: usize>(
    out: &mut [EdgeEvent],
    bbox: &BoundingBox<D>,
    index: u32,
) -> usize {
    let mut len = 0;
    for axis in 0..D {
        if bbox.min[axis] == bbox.max[axis] {
            out[len] = EdgeEvent::new(EventKind::Planar, axis, bbox.min[axis], index);
            len += 1;
        } else {
            out[len] = EdgeEvent::new(EventKind::Start, axis, bbox.min[axis], index);
            out[len + 1] = EdgeEvent::new(EventKind::End, axis, bbox.max[axis], index);
            len += 2;
        }
    }
    len
}

/// Sorts events into sweep order.
#[inline]
pub(crate) fn sort_events(events: &mut [EdgeEvent]) {
    events.sort_unstable_by(EdgeEvent::order);
}

/// Merges two sorted event lists into `out`, which must hold exactly both lists.
pub(crate) fn merge_events(a: &[EdgeEvent], b: &[EdgeEvent], out: &mut [EdgeEvent]) {
    debug_assert_eq!(a.len() + b.len(), out.len());
    let (mut i, mut j) = (0, 0);
    for slot in out.iter_mut() {
        let take_a = j == b.len() || (i < a.len() && a[i].order(&b[j]) != Ordering::Greater);
        if take_a {
            *slot = a[i];
            i += 1;
        } else {
            *slot = b[j];
            j += 1;
        }
    }
}

/// Returns the range of `events` lying on `axis`.
#[inline]
pub(crate) fn axis_range(events: &[EdgeEvent], axis: usize) -> std::ops::Range<usize> {
    let start = events.partition_point(|e| (e.axis as usize) < axis);
    let end = events.partition_point(|e| (e.axis as usize) <= axis);
    start..end
}

/// Returns the bounds of sorted events, which are those of the primitives they were built from.
pub(crate) fn events_bbox<const D: usize>(events: &[EdgeEvent]) -> BoundingBox<D> {
    let mut bbox = BoundingBox::default();
    for axis in 0..D {
        let range = axis_range(events, axis);
        if !range.is_empty() {
            bbox.min[axis] = events[range.start].pos;
            bbox.max[axis] = events[range.end - 1].pos;
        }
    }
    bbox
}
