//! Morton-code bounding volume hierarchy and packed-node kd-tree spatial
//! indices, for triangle meshes and point clouds respectively.

pub mod space;
pub mod bits;
pub mod cell;
pub mod accelerators;
pub mod kdtree;

pub use crate::space::{ Aabb, Point, Vector, POINT_NOT_FOUND };
pub use crate::accelerators::bvh::{ Bvh, BvhLeaf, BvhInternal, BvhNodeRef };
pub use crate::kdtree::KdTree;
