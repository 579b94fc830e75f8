use crate::{BoundingBox, Ray};

/// Trait for collections of primitives a [`KdTree`](crate::KdTree) can be built over.
///
/// Primitives are addressed by their index in `0..primitive_count()`. The tree never mutates the
/// set, it only queries bounding boxes during construction.
pub trait PrimitiveSet<const D: usize> {
    /// Returns the number of primitives in the set.
    fn primitive_count(&self) -> usize;

    /// Returns the bounding box of the primitive at the given index.
    fn bbox(&self, index: usize) -> BoundingBox<D>;

    /// Returns the bounding box of the part of the primitive lying inside `clip`.
    ///
    /// The default implementation intersects [`bbox`](Self::bbox) with `clip`. Implementors with
    /// exact clipping (e.g. triangles) can return tighter boxes. The result may be invalid when
    /// the primitive does not overlap `clip`.
    #[inline]
    fn clipped_bbox(&self, index: usize, clip: &BoundingBox<D>) -> BoundingBox<D> {
        self.bbox(index).intersection(clip)
    }
}

/// Trait for primitive sets that can be intersected with rays.
pub trait RayIntersect<const D: usize>: PrimitiveSet<D> {
    /// Returns the parametric distance of the closest intersection of the ray with the primitive
    /// inside `[mint, maxt]`, if any.
    fn intersect(&self, index: usize, ray: &Ray<D>, mint: f32, maxt: f32) -> Option<f32>;

    /// Returns `true` if the ray hits the primitive anywhere inside `[mint, maxt]`.
    #[inline]
    fn intersects(&self, index: usize, ray: &Ray<D>, mint: f32, maxt: f32) -> bool {
        self.intersect(index, ray, mint, maxt).is_some()
    }
}

/// Trait for single primitives with a bounding box.
///
/// Slices and vectors of [`Bounded`] values are [`PrimitiveSet`]s.
///
/// ```
/// # use kdaccel::prelude::*;
/// #[derive(Bounded)]
/// struct Shape {
///     bbox: BoundingBox<3>,
///     id: u32,
/// }
/// ```
pub trait Bounded<const D: usize> {
    /// Returns the bounding box of the primitive.
    fn bounding_box(&self) -> BoundingBox<D>;

    /// Returns the bounding box of the part of the primitive lying inside `clip`.
    #[inline]
    fn clipped_bounding_box(&self, clip: &BoundingBox<D>) -> BoundingBox<D> {
        self.bounding_box().intersection(clip)
    }
}

/// Trait for single primitives that can be intersected with rays.
pub trait IntersectRay<const D: usize> {
    /// Returns the parametric distance of the closest intersection inside `[mint, maxt]`, if any.
    fn intersect_ray(&self, ray: &Ray<D>, mint: f32, maxt: f32) -> Option<f32>;
}

impl<const D: usize> Bounded<D> for BoundingBox<D> {
    #[inline]
    fn bounding_box(&self) -> BoundingBox<D> {
        *self
    }
}

impl<const D: usize> IntersectRay<D> for BoundingBox<D> {
    /// Hits at the entry point of the ray into the box, or at `mint` when starting inside.
    #[inline]
    fn intersect_ray(&self, ray: &Ray<D>, mint: f32, maxt: f32) -> Option<f32> {
        let mut ray = *ray;
        ray.mint = mint;
        ray.maxt = maxt;
        self.ray_interval(&ray).map(|(near, _)| near)
    }
}

impl<P: Bounded<D>, const D: usize> PrimitiveSet<D> for [P] {
    #[inline]
    fn primitive_count(&self) -> usize {
        self.len()
    }

    #[inline]
    fn bbox(&self, index: usize) -> BoundingBox<D> {
        self[index].bounding_box()
    }

    #[inline]
    fn clipped_bbox(&self, index: usize, clip: &BoundingBox<D>) -> BoundingBox<D> {
        self[index].clipped_bounding_box(clip)
    }
}

impl<P: Bounded<D> + IntersectRay<D>, const D: usize> RayIntersect<D> for [P] {
    #[inline]
    fn intersect(&self, index: usize, ray: &Ray<D>, mint: f32, maxt: f32) -> Option<f32> {
        self[index].intersect_ray(ray, mint, maxt)
    }
}

impl<P: Bounded<D>, const D: usize> PrimitiveSet<D> for Vec<P> {
    #[inline]
    fn primitive_count(&self) -> usize {
        self.as_slice().primitive_count()
    }

    #[inline]
    fn bbox(&self, index: usize) -> BoundingBox<D> {
        self.as_slice().bbox(index)
    }

    #[inline]
    fn clipped_bbox(&self, index: usize, clip: &BoundingBox<D>) -> BoundingBox<D> {
        self.as_slice().clipped_bbox(index, clip)
    }
}

impl<P: Bounded<D> + IntersectRay<D>, const D: usize> RayIntersect<D> for Vec<P> {
    #[inline]
    fn intersect(&self, index: usize, ray: &Ray<D>, mint: f32, maxt: f32) -> Option<f32> {
        self.as_slice().intersect(index, ray, mint, maxt)
    }
}

impl<T: PrimitiveSet<D> + ?Sized, const D: usize> PrimitiveSet<D> for &T {
    #[inline]
    fn primitive_count(&self) -> usize {
        (**self).primitive_count()
    }

    #[inline]
    fn bbox(&self, index: usize) -> BoundingBox<D> {
        (**self).bbox(index)
    }

    #[inline]
    fn clipped_bbox(&self, index: usize, clip: &BoundingBox<D>) -> BoundingBox<D> {
        (**self).clipped_bbox(index, clip)
    }
}

impl<T: RayIntersect<D> + ?Sized, const D: usize> RayIntersect<D> for &T {
    #[inline]
    fn intersect(&self, index: usize, ray: &Ray<D>, mint: f32, maxt: f32) -> Option<f32> {
        (**self).intersect(index, ray, mint, maxt)
    }

    #[inline]
    fn intersects(&self, index: usize, ray: &Ray<D>, mint: f32, maxt: f32) -> bool {
        (**self).intersects(index, ray, mint, maxt)
    }
}
