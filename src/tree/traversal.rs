use super::{config::MAX_KD_DEPTH, KdTree};
use crate::{Ray, RayIntersect};

/// Closest intersection found by [`KdTree::ray_intersect`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hit {
    /// Parametric distance of the intersection along the ray.
    pub t: f32,
    /// Index of the intersected primitive.
    pub primitive: usize,
}

#[derive(Clone, Copy, Debug, Default)]
struct StackEntry {
    node: usize,
    mint: f32,
    maxt: f32,
}

impl<P, const D: usize, C> KdTree<P, D, C>
where
    P: RayIntersect<D>,
{
    /// Returns the closest intersection of the ray with the primitives inside its valid interval.
    pub fn ray_intersect(&self, ray: &Ray<D>) -> Option<Hit> {
        let mut closest = None;
        self.traverse(ray, |primitives, maxt| {
            for &primitive in primitives {
                let primitive = primitive as usize;
                if let Some(t) = self.primitives.intersect(primitive, ray, ray.mint, *maxt) {
                    let closer = match closest {
                        Some(Hit { t: best, .. }) => t < best,
                        None => t <= *maxt,
                    };
                    if closer {
                        closest = Some(Hit { t, primitive });
                        *maxt = t;
                    }
                }
            }
            false
        });
        closest
    }

    /// Returns `true` if the ray hits any primitive inside its valid interval.
    pub fn ray_occluded(&self, ray: &Ray<D>) -> bool {
        self.traverse(ray, |primitives, maxt| {
            primitives
                .iter()
                .any(|&primitive| self.primitives.intersects(primitive as usize, ray, ray.mint, *maxt))
        })
    }

    /// Visits the leaves pierced by the ray in front-to-back order.
    ///
    /// `visit` receives the primitive list of the leaf and the current end of the ray interval,
    /// which it may shorten. Returns `true` as soon as `visit` does.
    fn traverse<F>(&self, ray: &Ray<D>, mut visit: F) -> bool
    where
        F: FnMut(&[u32], &mut f32) -> bool,
    {
        if !self.ready() {
            return false;
        }
        let Some((mut mint, mut maxt)) = self.bbox.ray_interval(ray) else {
            return false;
        };

        let origin = ray.origin();
        let direction = ray.direction();
        let inv_direction = ray.inv_direction();

        let mut ray_maxt = ray.maxt;
        let mut stack = [StackEntry::default(); MAX_KD_DEPTH];
        let mut size = 0;
        let mut index = 0;

        loop {
            let node = self.nodes[index];

            if !node.is_leaf() {
                let axis = node.axis();
                let split = node.split();
                let (o, d) = (origin[axis], direction[axis]);

                if d == 0.0 {
                    let (near, far) = if o <= split {
                        (node.left(index), node.right(index))
                    } else {
                        (node.right(index), node.left(index))
                    };
                    // A ray inside the plane touches both children over the whole interval.
                    if o == split {
                        debug_assert!(size < stack.len());
                        stack[size] = StackEntry { node: far, mint, maxt };
                        size += 1;
                    }
                    index = near;
                    continue;
                }

                // Children in the order the ray crosses them, for any sign of the interval.
                let (first, second) = if d > 0.0 {
                    (node.left(index), node.right(index))
                } else {
                    (node.right(index), node.left(index))
                };

                let t_plane = (split - o) * inv_direction[axis];
                if t_plane > maxt {
                    index = first;
                } else if t_plane < mint {
                    index = second;
                } else {
                    debug_assert!(size < stack.len());
                    stack[size] = StackEntry {
                        node: second,
                        mint: t_plane,
                        maxt,
                    };
                    size += 1;
                    index = first;
                    maxt = t_plane;
                }
                continue;
            }

            let offset = node.primitive_offset();
            let count = node.primitive_count();
            if count > 0 && visit(&self.indices[offset..offset + count], &mut ray_maxt) {
                return true;
            }

            // Entries are popped in increasing distance, so a hit before the next one ends the walk.
            if size == 0 {
                return false;
            }
            size -= 1;
            let entry = stack[size];
            if entry.mint > ray_maxt {
                return false;
            }
            index = entry.node;
            mint = entry.mint;
            maxt = entry.maxt.min(ray_maxt);
        }
    }
}
