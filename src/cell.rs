//! Maps a world-space position inside a fitted AABB to a quantized Morton
//! cell code, used by the BVH build to turn triangle centroids into a
//! sortable key.

use crate::bits::calc_morton_code32;
use crate::space::{ Aabb, Point };

/// Divisor used to turn an AABB extent into a per-axis cell size. 1023, not
/// 1024, so that the maximum cell id stays at or below 1023 — safely within
/// the 10 bits `calc_morton_code32` spreads per axis.
const CELL_DIVISIONS: f32 = 1023.0;

/// Quantizes positions inside a configured AABB into a 30-bit Morton code.
///
/// Behavior for positions outside the configured AABB is undefined: the BVH
/// only ever feeds this calculator centroids known to lie inside the AABB it
/// was reset with.
#[derive(Debug, Clone, Copy, Default)]
pub struct CellCodeCalculator {
    bbox_min: Point,
    cell_size: Point,
}

impl CellCodeCalculator {
    pub fn new() -> CellCodeCalculator {
        CellCodeCalculator {
            bbox_min: Point::new(0.0, 0.0, 0.0),
            cell_size: Point::new(1.0, 1.0, 1.0),
        }
    }

    /// Reconfigure the calculator to quantize positions within `bbox`.
    pub fn reset(&mut self, bbox: &Aabb) {
        self.bbox_min = bbox.min;
        self.cell_size = Point::new(
            (bbox.max.x - bbox.min.x) / CELL_DIVISIONS,
            (bbox.max.y - bbox.min.y) / CELL_DIVISIONS,
            (bbox.max.z - bbox.min.z) / CELL_DIVISIONS,
        );
    }

    /// Cell-quantized Morton code of the position `(x, y, z)`.
    pub fn get_code32(&self, x: f32, y: f32, z: f32) -> u32 {
        let cell_x = ((x - self.bbox_min.x) / self.cell_size.x) as u32;
        let cell_y = ((y - self.bbox_min.y) / self.cell_size.y) as u32;
        let cell_z = ((z - self.bbox_min.z) / self.cell_size.z) as u32;
        calc_morton_code32(cell_x, cell_y, cell_z)
    }
}
