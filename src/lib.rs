//! # kdaccel
//!
//! kdaccel builds kd-trees over sets of n-dimensional primitives with the surface area heuristic
//! (SAH) and traverses them with rays.
//!
//! ## Goals
//!
//! The main goal of this crate is to provide high quality trees for ray queries that can be built
//! quickly over large primitive sets and plugged into existing renderers or physics engines. It
//! does not provide primitives beyond axis-aligned boxes and instead lets users describe their
//! own through a couple of traits.
//!
//! Construction runs in two phases. Nodes holding many primitives are split in parallel thanks to
//! [rayon](https://github.com/rayon-rs/rayon) using binned min-max histograms (enable the default
//! "parallel" feature). Smaller subtrees are then built with an exact sweep over sorted edge
//! events, optionally clipping primitives against the children, which finds the best split of
//! every node. Subtrees that turn out costlier than a leaf are collapsed afterwards.
//!
//! ## Using kdaccel
//!
//! ### Describing primitives
//!
//! A [`KdTree`] is built over any [`PrimitiveSet`] and queried with rays when the set also
//! implements [`RayIntersect`]. Slices and vectors of types implementing [`Bounded`] and
//! [`IntersectRay`] implement both traits.
//!
//! When the type has a field named `bbox` or `bounds`, or a field tagged `#[bbox]`, convertible
//! into a [`BoundingBox`], [`Bounded`] can be derived.
//!
//! ```
//! use kdaccel::prelude::*;
//!
//! #[derive(Bounded)]
//! struct Sphere {
//!     center: [f32; 3],
//!     radius: f32,
//!     bbox: BoundingBox<3>,
//! }
//!
//! impl IntersectRay<3> for Sphere {
//!     fn intersect_ray(&self, ray: &Ray<3>, mint: f32, maxt: f32) -> Option<f32> {
//!         let (o, d) = (ray.origin(), ray.direction());
//!         let oc: [f32; 3] = std::array::from_fn(|i| o[i] - self.center[i]);
//!         let a = d.iter().map(|x| x * x).sum::<f32>();
//!         let b = 2.0 * (0..3).map(|i| oc[i] * d[i]).sum::<f32>();
//!         let c = oc.iter().map(|x| x * x).sum::<f32>() - self.radius * self.radius;
//!
//!         let discriminant = b * b - 4.0 * a * c;
//!         if discriminant < 0.0 {
//!             return None;
//!         }
//!         let sqrt = discriminant.sqrt();
//!         [(-b - sqrt) / (2.0 * a), (-b + sqrt) / (2.0 * a)]
//!             .into_iter()
//!             .find(|t| (mint..=maxt).contains(t))
//!     }
//! }
//! ```
//!
//! ### Building and querying
//!
//! ```
//! use kdaccel::prelude::*;
//!
//! let boxes: Vec<_> = (0..1000)
//!     .map(|i| {
//!         let x = (i % 10) as f32 * 2.0;
//!         let y = (i / 10 % 10) as f32 * 2.0;
//!         let z = (i / 100) as f32 * 2.0;
//!         BoundingBox::new([x, y, z], [x + 1.0, y + 1.0, z + 1.0])
//!     })
//!     .collect();
//!
//! let mut tree: KdTree<_, 3> = KdTree::new(boxes);
//! tree.set_exact_primitive_threshold(256);
//! let statistics = tree.build()?;
//! assert!(tree.ready());
//! assert_eq!(statistics.primitive_count, 1000);
//!
//! let ray = Ray::new([-5.0, 0.5, 0.5], [1.0, 0.0, 0.0]);
//! let hit = tree.ray_intersect(&ray).unwrap();
//! assert_eq!((hit.primitive, hit.t), (0, 5.0));
//! assert!(!tree.ray_occluded(&Ray::segment([1.5, 0.5, 0.5], [1.5, 0.5, 30.0])));
//! # Ok::<(), KdTreeError>(())
//! ```

#![warn(missing_docs)]

extern crate self as kdaccel;

mod bbox;
mod build;
mod cost;
mod error;
mod impls;
mod memory;
mod parallel;
mod primitive;
mod ray;

/// The kd-tree, its configuration, nodes, statistics and queries.
pub mod tree;

pub use bbox::BoundingBox;
pub use cost::{CostModel, SurfaceAreaHeuristic};
pub use error::KdTreeError;
pub use primitive::{Bounded, IntersectRay, PrimitiveSet, RayIntersect};
pub use ray::Ray;
pub use tree::{
    BuildConfig, BuildStatistics, Hit, KdNode, KdTree, Leaf, Leaves, NodeKind, MAX_KD_DEPTH,
};

/// Derive macro generating an implementation of the trait [`Bounded`](trait@Bounded).
pub use kdaccel_derive::Bounded;

/// Everything needed to use the crate.
pub mod prelude {
    pub use crate::{
        Bounded, BoundingBox, BuildConfig, CostModel, Hit, IntersectRay, KdTree, KdTreeError,
        PrimitiveSet, Ray, RayIntersect, SurfaceAreaHeuristic,
    };
}
