//! Kd-tree over a point cloud, packed into 8 bytes per node, queried with
//! the incremental nearest-neighbor search of Merry, Gain and Marais
//! (_Accelerating kd-tree searches for all k-nearest neighbours_, EG2013
//! Algorithm 1). The packing and the query both come straight from that
//! paper's reference layout; see the module tests for the exact bit
//! boundaries.

use crate::space::{ distance2, Point, Vector, ZERO, POINT_NOT_FOUND };

/// Tag stored in the low 2 bits of `Node::data`.
const TAG_LEAF: u32 = 3;
const TAG_MASK: u32 = 3;

/// Largest value the 30 remaining bits of `Node::data` can hold: a bucket
/// size (leaf) or a right-child offset in nodes (internal).
pub const MAX_BUCKET_SIZE: u32 = (1 << 30) - 1;
pub const MAX_OFFSET: u32 = (1 << 30) - 1;

/// Default max points per leaf bucket, matching the paper's reference
/// implementation.
pub const DEFAULT_BUCKET_SIZE: u32 = 24;

/// Split axis of an internal node, also `KdTreeNodeInternal::Axis` in the
/// node this crate packs nodes the same way as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X = 0,
    Y = 1,
    Z = 2,
}

impl Axis {
    fn of(index: u32) -> Axis {
        match index {
            0 => Axis::X,
            1 => Axis::Y,
            _ => Axis::Z,
        }
    }

    fn component(self, p: Point) -> f32 {
        match self {
            Axis::X => p.x,
            Axis::Y => p.y,
            Axis::Z => p.z,
        }
    }
}

/// One 8-byte kd-tree node. `data`'s low 2 bits tell leaf from internal;
/// the remaining 30 bits are either a bucket size (leaf) or a right-child
/// offset in nodes (internal; the left child always sits at `index + 1`).
/// `payload` is either a bucket start index (leaf) or an `f32` split
/// coordinate reinterpreted as bits (internal).
#[derive(Debug, Clone, Copy)]
struct Node {
    data: u32,
    payload: u32,
}

impl Node {
    fn is_leaf(self) -> bool {
        self.data & TAG_MASK == TAG_LEAF
    }

    fn leaf(bucket_index: u32, bucket_size: u32) -> Node {
        Node { data: (bucket_size << 2) | TAG_LEAF, payload: bucket_index }
    }

    fn bucket_index(self) -> u32 {
        debug_assert!(self.is_leaf());
        self.payload
    }

    fn bucket_size(self) -> u32 {
        debug_assert!(self.is_leaf());
        self.data >> 2
    }

    fn internal(axis: Axis) -> Node {
        Node { data: axis as u32, payload: 0 }
    }

    fn axis(self) -> Axis {
        debug_assert!(!self.is_leaf());
        Axis::of(self.data & TAG_MASK)
    }

    fn set_split_coordinate(&mut self, coord: f32) {
        self.payload = coord.to_bits();
    }

    fn split_coordinate(self) -> f32 {
        debug_assert!(!self.is_leaf());
        f32::from_bits(self.payload)
    }

    fn set_right_child_offset(&mut self, offset: u32) {
        self.data = (offset << 2) | (self.data & TAG_MASK);
    }

    fn right_child_offset(self) -> u32 {
        debug_assert!(!self.is_leaf());
        self.data >> 2
    }
}

/// Kd-tree over a fixed point cloud. Bucketed leaves keep the tree shallow:
/// a leaf holds up to `bucket_size` points instead of splitting down to one.
pub struct KdTree {
    tree: Vec<Node>,
    buckets: Vec<Point>,
    bucket_size: u32,
}

impl Default for KdTree {
    fn default() -> KdTree {
        KdTree::new(DEFAULT_BUCKET_SIZE)
    }
}

impl KdTree {
    /// A tree with the given max points per leaf bucket, built by the first
    /// `construct` call.
    pub fn new(bucket_size: u32) -> KdTree {
        assert!(bucket_size > 0, "bucket_size must be positive");
        assert!(bucket_size <= MAX_BUCKET_SIZE, "bucket_size exceeds the 30 bits available to store it");
        KdTree { tree: Vec::new(), buckets: Vec::new(), bucket_size }
    }

    /// Clears and rebuilds the tree over `points`. Costs are amortized over
    /// the queries that follow; rebuild whenever the point set changes
    /// rather than trying to update the tree in place.
    pub fn construct(&mut self, points: &[Point]) {
        self.clear();
        log::debug!("constructing kd-tree over {} points, bucket size {}", points.len(), self.bucket_size);
        if points.is_empty() {
            return;
        }

        let mut order: Vec<usize> = (0..points.len()).collect();
        self.construct_tree_(points, &mut order, 0, points.len());
    }

    pub fn clear(&mut self) {
        self.tree.clear();
        self.buckets.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn bucket_size(&self) -> u32 {
        self.bucket_size
    }

    /// Recursively builds the subtree over `order[begin..end]`, returning the
    /// index of its root in `self.tree`. Below `bucket_size` points, emits a
    /// leaf; the points feeding that leaf are copied into `self.buckets`
    /// sequentially so a leaf's points form one contiguous run.
    fn construct_tree_(&mut self, points: &[Point], order: &mut [usize], begin: usize, end: usize) -> usize {
        let size = end - begin;
        if size as u32 <= self.bucket_size {
            let bucket_index = self.buckets.len() as u32;
            for &i in &order[begin..end] {
                self.buckets.push(points[i]);
            }
            self.tree.push(Node::leaf(bucket_index, size as u32));
            return self.tree.len() - 1;
        }

        let axis = Self::find_split_axis_(points, &order[begin..end]);
        let node_index = self.tree.len();
        self.tree.push(Node::internal(axis));

        let median = begin + size / 2;
        order[begin..end].select_nth_unstable_by(size / 2, |&a, &b| {
            axis.component(points[a]).partial_cmp(&axis.component(points[b])).unwrap()
        });
        self.tree[node_index].set_split_coordinate(axis.component(points[order[median]]));

        self.construct_tree_(points, order, begin, median);
        let right_child_index = self.construct_tree_(points, order, median, end);

        // The left/right recursion may have grown self.tree and moved it, so
        // re-resolve node_index before writing the offset back.
        let offset = (right_child_index - node_index) as u32;
        assert!(offset <= MAX_OFFSET, "right-child offset exceeds the 30 bits available to store it");
        self.tree[node_index].set_right_child_offset(offset);

        node_index
    }

    /// Axis with the largest extent over `order`'s points, widest-first
    /// tiebreak on z, then y, then x.
    fn find_split_axis_(points: &[Point], order: &[usize]) -> Axis {
        let mut min = Point::new(f32::INFINITY, f32::INFINITY, f32::INFINITY);
        let mut max = Point::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY);
        for &i in order {
            let p = points[i];
            min = Point::new(min.x.min(p.x), min.y.min(p.y), min.z.min(p.z));
            max = Point::new(max.x.max(p.x), max.y.max(p.y), max.z.max(p.z));
        }

        let extent = max - min;
        if extent.x < extent.y {
            if extent.y < extent.z { Axis::Z } else { Axis::Y }
        } else {
            if extent.x < extent.z { Axis::Z } else { Axis::X }
        }
    }

    /// Finds the nearest point to `query_point` within `max_dist`, or
    /// `POINT_NOT_FOUND` if none is. `eps` relaxes the subtree pruning test,
    /// trading a small chance of missing the true nearest point for a
    /// faster search; 0.0 disables the relaxation.
    pub fn query(&self, query_point: Point, max_dist: f32, eps: f32) -> Option<Point> {
        assert!(eps >= 0.0, "eps must be non-negative");
        if self.tree.is_empty() {
            return None;
        }

        let mut result: Option<Point> = None;
        let mut squared_dist = max_dist * max_dist;
        self.find_1nn_(&mut result, query_point, 0, ZERO, 0.0, &mut squared_dist, eps);
        result
    }

    /// Same as `query`, but returns `POINT_NOT_FOUND` instead of `None` for
    /// callers ported from code that relies on the sentinel value rather
    /// than an `Option`.
    pub fn query_or_sentinel(&self, query_point: Point, max_dist: f32, eps: f32) -> Point {
        self.query(query_point, max_dist, eps).unwrap_or(POINT_NOT_FOUND)
    }

    /// Algorithm 1 of Merry/Gain/Marais: `a` holds the per-axis squared
    /// distance from `p` to the subtree region's boundary on that axis,
    /// `d` their sum (the squared distance from `p` to the region), and
    /// `squared_dist` the squared distance to the best point found so far.
    /// Descending the near child never needs `a`/`d` to change; descending
    /// the far child updates exactly the one axis that child's parent split
    /// on, so the region distance is maintained incrementally instead of
    /// recomputed.
    fn find_1nn_(
        &self,
        result: &mut Option<Point>,
        p: Point,
        node_index: usize,
        mut a: Vector,
        mut d: f32,
        squared_dist: &mut f32,
        eps: f32,
    ) {
        let node = self.tree[node_index];
        if node.is_leaf() {
            let start = node.bucket_index() as usize;
            let end = start + node.bucket_size() as usize;
            for bucket_point in &self.buckets[start..end] {
                let candidate_dist = distance2(*bucket_point, p);
                if candidate_dist < *squared_dist {
                    *squared_dist = candidate_dist;
                    *result = Some(*bucket_point);
                }
            }
            return;
        }

        let axis = node.axis();
        let axis_index = axis as usize;
        let signed_dist = axis.component(p) - node.split_coordinate();

        let (near_index, far_index) = if signed_dist > 0.0 {
            (node_index + node.right_child_offset() as usize, node_index + 1)
        } else {
            (node_index + 1, node_index + node.right_child_offset() as usize)
        };

        self.find_1nn_(result, p, near_index, a, d, squared_dist, eps);

        let u = signed_dist * signed_dist;
        d += u - a[axis_index];
        a[axis_index] = u;

        if d < *squared_dist + eps {
            self.find_1nn_(result, p, far_index, a, d, squared_dist, eps);
        }
    }

    /// Dumps a one-line-per-node trace of node kind, axis/coordinate or
    /// bucket range, and child indices, followed by every bucketed point.
    /// Diagnostic only.
    pub fn print_tree(&self, out: &mut impl std::fmt::Write) -> std::fmt::Result {
        for (i, node) in self.tree.iter().enumerate() {
            if node.is_leaf() {
                writeln!(out, "{}: Leaf bucketIndex={} bucketSize={}", i, node.bucket_index(), node.bucket_size())?;
            } else {
                let right = i + node.right_child_offset() as usize;
                writeln!(out, "{}: Internal axis={:?} coordinate={} left={} right={}", i, node.axis(), node.split_coordinate(), i + 1, right)?;
            }
        }
        writeln!(out)?;
        for point in &self.buckets {
            writeln!(out, "{:?}", point)?;
        }
        Ok(())
    }
}
