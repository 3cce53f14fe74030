// Shortcuts for the linear-algebra types used throughout this crate. Points
// and vectors are thin aliases over cgmath so callers get axis indexing and
// affine/linear arithmetic for free; this crate only adds the handful of
// component-wise operations cgmath doesn't provide out of the box.
pub use cgmath::prelude::*;
use cgmath::{ Point3, Vector3 };

pub mod bounds;

pub use self::bounds::Aabb;

pub type Point = Point3<f32>;
pub type Vector = Vector3<f32>;

/// The zero vector, used as the initial per-axis contribution vector in
/// kd-tree queries.
pub const ZERO: Vector = Vector3::new(0.0, 0.0, 0.0);

/// Sentinel returned by `KdTree::query_or_sentinel` when no point lies
/// within the search radius. An immutable zero-valued point, never exposed
/// as a mutable global (see DESIGN.md, "Sentinel mutability").
pub const POINT_NOT_FOUND: Point = Point3::new(0.0, 0.0, 0.0);

/// Component-wise minimum of two points.
#[inline]
pub fn point_min(a: Point, b: Point) -> Point {
    Point::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z))
}

/// Component-wise maximum of two points.
#[inline]
pub fn point_max(a: Point, b: Point) -> Point {
    Point::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z))
}

/// Squared Euclidean distance between two points.
#[inline]
pub fn distance2(a: Point, b: Point) -> f32 {
    (a - b).magnitude2()
}
