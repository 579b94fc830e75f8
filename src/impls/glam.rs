use crate::{BoundingBox, Ray};
use ::glam::{Vec2, Vec3, Vec3A, Vec4};

macro_rules! impl_glam {
    ($($vector: ty => $dim: literal),*) => {$(
        impl From<($vector, $vector)> for BoundingBox<$dim> {
            /// Creates a box from its minimum and maximum corners.
            #[inline]
            fn from((min, max): ($vector, $vector)) -> Self {
                Self::new(min.into(), max.into())
            }
        }

        impl From<BoundingBox<$dim>> for ($vector, $vector) {
            #[inline]
            fn from(bbox: BoundingBox<$dim>) -> Self {
                (bbox.min.into(), bbox.max.into())
            }
        }

        impl From<($vector, $vector)> for Ray<$dim> {
            /// Creates a ray from its origin and direction.
            #[inline]
            fn from((origin, direction): ($vector, $vector)) -> Self {
                Self::new(origin.into(), direction.into())
            }
        }
    )*};
}

impl_glam!(Vec2 => 2, Vec3 => 3, Vec3A => 3, Vec4 => 4);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bounded, KdTree};

    #[derive(crate::Bounded)]
    struct Sphere {
        #[bbox]
        bounds: (Vec3, Vec3),
    }

    #[test]
    fn conversions() {
        let bbox = BoundingBox::from((Vec3::ZERO, Vec3::ONE));
        assert_eq!(bbox, BoundingBox::new([0.0; 3], [1.0; 3]));
        assert_eq!(<(Vec3A, Vec3A)>::from(bbox), (Vec3A::ZERO, Vec3A::ONE));

        let ray = Ray::from((Vec2::new(1.0, 2.0), Vec2::X));
        assert_eq!(ray.origin(), &[1.0, 2.0]);
        assert_eq!(ray.direction(), &[1.0, 0.0]);
    }

    #[test]
    fn derived_primitives() {
        let spheres: Vec<_> = (0..10)
            .map(|i| {
                let center = Vec3::splat(i as f32 * 3.0);
                Sphere {
                    bounds: (center - Vec3::ONE, center + Vec3::ONE),
                }
            })
            .collect();
        assert_eq!(spheres[1].bounding_box(), BoundingBox::new([2.0; 3], [4.0; 3]));

        let mut tree: KdTree<_, 3> = KdTree::new(spheres);
        let stats = tree.build().unwrap();
        assert_eq!(stats.primitive_count, 10);
        assert_eq!(tree.leaves().map(|leaf| leaf.primitives.len()).sum::<usize>(), 10);
    }
}
