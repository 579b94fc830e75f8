/// A ray with a parametric validity interval `[mint, maxt]`.
///
/// The reciprocal of the direction is cached on construction since both the root box test and the
/// split plane distances divide by it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray<const D: usize> {
    origin: [f32; D],
    direction: [f32; D],
    inv_direction: [f32; D],
    /// Start of the valid interval.
    pub mint: f32,
    /// End of the valid interval.
    pub maxt: f32,
}

impl<const D: usize> Ray<D> {
    /// Creates a new [`Ray`] valid over `[0, ∞)`.
    #[inline]
    pub fn new(origin: [f32; D], direction: [f32; D]) -> Self {
        Self::with_range(origin, direction, 0.0, f32::INFINITY)
    }

    /// Creates a new [`Ray`] valid over `[mint, maxt]`.
    #[inline]
    pub fn with_range(origin: [f32; D], direction: [f32; D], mint: f32, maxt: f32) -> Self {
        Self {
            origin,
            direction,
            inv_direction: direction.map(|d| 1.0 / d),
            mint,
            maxt,
        }
    }

    /// Creates a new [`Ray`] going from `from` to `to`, valid over `[0, 1]`.
    #[inline]
    pub fn segment(from: [f32; D], to: [f32; D]) -> Self {
        Self::with_range(from, std::array::from_fn(|i| to[i] - from[i]), 0.0, 1.0)
    }

    /// Returns the origin of the ray.
    #[inline]
    pub fn origin(&self) -> &[f32; D] {
        &self.origin
    }

    /// Returns the direction of the ray.
    #[inline]
    pub fn direction(&self) -> &[f32; D] {
        &self.direction
    }

    /// Returns the component-wise reciprocal of the direction.
    #[inline]
    pub fn inv_direction(&self) -> &[f32; D] {
        &self.inv_direction
    }

    /// Returns the point at parametric distance `t` along the ray.
    #[inline]
    pub fn at(&self, t: f32) -> [f32; D] {
        std::array::from_fn(|i| self.origin[i] + self.direction[i] * t)
    }
}
