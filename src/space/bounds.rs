use super::{ point_max, point_min, Point };

/// Axis-aligned bounding box: a pair of corner points.
///
/// Mirrors the donor crate's `Bounds3` (same `union`/`point_union` shape),
/// narrowed to the single `f32` `Point` this crate needs and to the
/// operations the BVH and kd-tree actually call.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub min: Point,
    pub max: Point,
}

impl Aabb {
    /// A new box spanning exactly the two given corners (not necessarily
    /// min/max-ordered; callers that build a box from two arbitrary points
    /// should go through `none()` + `point_union` instead).
    #[inline]
    pub fn new(min: Point, max: Point) -> Aabb {
        Aabb { min, max }
    }

    /// The empty/identity box: `min = +inf`, `max = -inf`. Unioning any real
    /// box or point with `none()` returns that box/point unchanged. Used as
    /// the reset value for BVH internal nodes before a refit and as the fold
    /// seed when accumulating a bounding box over a set of points.
    #[inline]
    pub fn none() -> Aabb {
        Aabb {
            min: Point::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Point::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }

    /// Component-wise union of two boxes.
    #[inline]
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: point_min(self.min, other.min),
            max: point_max(self.max, other.max),
        }
    }

    /// Expand this box to include a point.
    #[inline]
    pub fn point_union(&self, p: Point) -> Aabb {
        Aabb {
            min: point_min(self.min, p),
            max: point_max(self.max, p),
        }
    }

    /// True iff no separating axis exists between the two boxes.
    #[inline]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        !(self.min.x > other.max.x || other.min.x > self.max.x
            || self.min.y > other.max.y || other.min.y > self.max.y
            || self.min.z > other.max.z || other.min.z > self.max.z)
    }
}
