use crate::Ray;

/// An axis-aligned bounding box in `D` dimensions.
///
/// The [`Default`] box is empty: its minimum corner is at `+∞` and its maximum corner at `-∞`, so
/// that [`extend`](Self::extend) and [`expand_by`](Self::expand_by) can grow it from nothing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox<const D: usize> {
    /// Minimum corner of the box.
    pub min: [f32; D],
    /// Maximum corner of the box.
    pub max: [f32; D],
}

impl<const D: usize> Default for BoundingBox<D> {
    #[inline]
    fn default() -> Self {
        Self::new([f32::INFINITY; D], [f32::NEG_INFINITY; D])
    }
}

#[allow(clippy::needless_range_loop)]
impl<const D: usize> BoundingBox<D> {
    /// Creates a new [`BoundingBox`] with the given min and max corners.
    #[inline]
    pub const fn new(min: [f32; D], max: [f32; D]) -> Self {
        Self { min, max }
    }

    /// Creates a new [`BoundingBox`] with all values set to zero.
    #[inline]
    pub const fn zero() -> Self {
        Self::new([0.0; D], [0.0; D])
    }

    /// Creates a new degenerate [`BoundingBox`] containing a single point.
    #[inline]
    pub const fn point(position: [f32; D]) -> Self {
        Self::new(position, position)
    }

    /// Creates a new [`BoundingBox`] that contains the given positions.
    #[inline]
    pub fn with<I>(positions: I) -> Self
    where
        I: IntoIterator<Item = [f32; D]>,
    {
        let mut result = Self::default();
        for position in positions {
            result.extend(&position);
        }
        result
    }

    /// Returns `true` if the minimum corner is below or equal to the maximum corner on every axis.
    ///
    /// Degenerate boxes (zero extent along some axes) are valid, empty ones are not.
    #[inline]
    pub fn is_valid(&self) -> bool {
        (0..D).all(|i| self.min[i] <= self.max[i])
    }

    /// Extends the [`BoundingBox`] so that it contains the given position.
    #[inline]
    pub fn extend(&mut self, position: &[f32; D]) {
        for i in 0..D {
            self.min[i] = self.min[i].min(position[i]);
            self.max[i] = self.max[i].max(position[i]);
        }
    }

    /// Extends the [`BoundingBox`] so that it contains the given box.
    #[inline]
    pub fn expand_by(&mut self, other: &Self) {
        for i in 0..D {
            self.min[i] = self.min[i].min(other.min[i]);
            self.max[i] = self.max[i].max(other.max[i]);
        }
    }

    /// Returns the smallest box containing both boxes.
    #[inline]
    pub fn union(mut self, other: &Self) -> Self {
        self.expand_by(other);
        self
    }

    /// Returns the intersection of both boxes. The result is not [valid](Self::is_valid) when the
    /// boxes do not overlap.
    #[inline]
    pub fn intersection(mut self, other: &Self) -> Self {
        self.clip(other);
        self
    }

    /// Shrinks the [`BoundingBox`] to its intersection with the given box.
    #[inline]
    pub fn clip(&mut self, other: &Self) {
        for i in 0..D {
            self.min[i] = self.min[i].max(other.min[i]);
            self.max[i] = self.max[i].min(other.max[i]);
        }
    }

    /// Returns `true` if the position lies inside the box or on its boundary.
    #[inline]
    pub fn contains(&self, position: &[f32; D]) -> bool {
        (0..D).all(|i| self.min[i] <= position[i] && position[i] <= self.max[i])
    }

    /// Returns `true` if both boxes share at least one point.
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        (0..D).all(|i| self.min[i] <= other.max[i] && other.min[i] <= self.max[i])
    }

    /// Returns the center of the [`BoundingBox`].
    #[inline]
    pub fn center(&self) -> [f32; D] {
        std::array::from_fn(|i| (self.min[i] + self.max[i]) * 0.5)
    }

    /// Returns the size of the [`BoundingBox`] along each axis.
    #[inline]
    pub fn size(&self) -> [f32; D] {
        std::array::from_fn(|i| self.max[i] - self.min[i])
    }

    /// Returns the axis along which the box is the largest.
    #[inline]
    pub fn major_axis(&self) -> usize {
        let size = self.size();
        (0..D).fold(0, |best, i| if size[i] > size[best] { i } else { best })
    }

    /// Returns the surface measure of the box.
    ///
    /// This is the total measure of the box's boundary facets: the surface area in 3D, the
    /// perimeter in 2D, and the length of the box in 1D. Invalid boxes have a surface area of zero.
    pub fn surface_area(&self) -> f32 {
        if !self.is_valid() {
            return 0.0;
        }

        let size = self.size();
        if D == 1 {
            return size[0];
        }

        let mut sum = 0.0;
        for i in 0..D {
            sum += (0..D).filter(|&j| j != i).map(|j| size[j]).product::<f32>();
        }
        2.0 * sum
    }

    /// Returns the volume of the box, zero for invalid boxes.
    #[inline]
    pub fn volume(&self) -> f32 {
        if self.is_valid() {
            self.size().into_iter().product()
        } else {
            0.0
        }
    }

    /// Splits the box with the plane orthogonal to `axis` at `position`, returning the boxes on the
    /// lower and upper side of the plane.
    #[inline]
    pub fn split(&self, axis: usize, position: f32) -> (Self, Self) {
        let mut left = *self;
        let mut right = *self;
        left.max[axis] = position;
        right.min[axis] = position;
        (left, right)
    }

    /// Returns a copy of the box grown by a margin relative to its extent plus a fixed epsilon.
    #[inline]
    pub fn inflated(&self, epsilon: f32) -> Self {
        let mut result = *self;
        for i in 0..D {
            let margin = (self.max[i] - self.min[i]).abs() * epsilon + epsilon;
            result.min[i] -= margin;
            result.max[i] += margin;
        }
        result
    }

    /// Intersects the ray with the box and returns the parametric interval overlapping the box,
    /// restricted to `[ray.mint, ray.maxt]`.
    pub fn ray_interval(&self, ray: &Ray<D>) -> Option<(f32, f32)> {
        let (mut mint, mut maxt) = (ray.mint, ray.maxt);
        let (origin, direction, inv_direction) =
            (ray.origin(), ray.direction(), ray.inv_direction());

        for i in 0..D {
            if direction[i] == 0.0 {
                if origin[i] < self.min[i] || origin[i] > self.max[i] {
                    return None;
                }
                continue;
            }

            let mut near = (self.min[i] - origin[i]) * inv_direction[i];
            let mut far = (self.max[i] - origin[i]) * inv_direction[i];
            if near > far {
                std::mem::swap(&mut near, &mut far);
            }

            mint = mint.max(near);
            maxt = maxt.min(far);
            if mint > maxt {
                return None;
            }
        }

        Some((mint, maxt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_empty_and_grows() {
        let mut bbox = BoundingBox::<3>::default();
        assert!(!bbox.is_valid());
        assert_eq!(bbox.surface_area(), 0.0);

        bbox.extend(&[1.0, 2.0, 3.0]);
        assert!(bbox.is_valid());
        assert_eq!(bbox, BoundingBox::point([1.0, 2.0, 3.0]));

        bbox.expand_by(&BoundingBox::new([0.0; 3], [2.0; 3]));
        assert_eq!(bbox, BoundingBox::new([0.0; 3], [2.0, 2.0, 3.0]));
    }

    #[test]
    fn surface_area_per_dimension() {
        assert_eq!(BoundingBox::new([0.0], [4.0]).surface_area(), 4.0);
        assert_eq!(BoundingBox::new([0.0; 2], [2.0, 3.0]).surface_area(), 10.0);
        assert_eq!(BoundingBox::new([0.0; 3], [1.0, 2.0, 3.0]).surface_area(), 22.0);
        // Flat boxes keep a surface in 3D but not once two axes collapse.
        assert_eq!(BoundingBox::new([0.0; 3], [1.0, 1.0, 0.0]).surface_area(), 2.0);
        assert_eq!(BoundingBox::new([0.0; 3], [1.0, 0.0, 0.0]).surface_area(), 0.0);
    }

    #[test]
    fn intersection_and_split() {
        let a = BoundingBox::new([0.0; 2], [2.0; 2]);
        let b = BoundingBox::new([1.0; 2], [3.0; 2]);
        assert_eq!(a.intersection(&b), BoundingBox::new([1.0; 2], [2.0; 2]));
        assert!(!a.intersection(&BoundingBox::new([5.0; 2], [6.0; 2])).is_valid());

        let (left, right) = a.split(1, 0.5);
        assert_eq!(left, BoundingBox::new([0.0, 0.0], [2.0, 0.5]));
        assert_eq!(right, BoundingBox::new([0.0, 0.5], [2.0, 2.0]));
    }

    #[test]
    fn ray_interval_slabs() {
        let bbox = BoundingBox::new([0.0; 3], [1.0; 3]);

        let ray = Ray::new([-1.0, 0.5, 0.5], [1.0, 0.0, 0.0]);
        assert_eq!(bbox.ray_interval(&ray), Some((1.0, 2.0)));

        let miss = Ray::new([-1.0, 2.0, 0.5], [1.0, 0.0, 0.0]);
        assert_eq!(bbox.ray_interval(&miss), None);

        let behind = Ray::new([2.0, 0.5, 0.5], [1.0, 0.0, 0.0]);
        assert_eq!(bbox.ray_interval(&behind), None);

        let inside = Ray::new([0.5; 3], [0.0, 0.0, -1.0]);
        assert_eq!(bbox.ray_interval(&inside), Some((0.0, 0.5)));
    }
}
