use nalgebra::Vector3;

use crate::error::{GeometryError, Result};
use crate::geometry::bbox::OrientedBoundingBox;
use crate::geometry::Dimension;

/// Two-point end-plate proxy taken from a bounding-box edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TangentLine {
    pub p1: Vector3<f64>,
    pub p2: Vector3<f64>,
    pub dimension: Dimension,
}

impl TangentLine {
    pub fn new(p1: Vector3<f64>, p2: Vector3<f64>, dimension: Dimension) -> Self {
        Self { p1, p2, dimension }
    }

    pub fn direction(&self) -> Vector3<f64> {
        self.p2 - self.p1
    }

    /// Point at parameter `s` (0 at `p1`, 1 at `p2`).
    pub fn point_at(&self, s: f64) -> Vector3<f64> {
        self.p1 + self.direction() * s
    }
}

// Vertex pairs (upper, lower) per dimension. The upper vertebra uses an edge
// of its first face, the lower vertebra an edge of its opposite face.
const TANGENT_VERTICES_3D: ((usize, usize), (usize, usize)) = ((0, 1), (6, 7));
const TANGENT_VERTICES_2D: ((usize, usize), (usize, usize)) = ((0, 1), (2, 3));

fn check_box(obb: &OrientedBoundingBox) -> Result<()> {
    let expected = obb.dimension().vertex_count();
    if obb.vertices().len() != expected {
        return Err(GeometryError::VertexCount {
            label: obb.label(),
            coordinates: obb.vertices().len() * obb.dimension().axes(),
            expected: expected * obb.dimension().axes(),
        });
    }
    Ok(())
}

fn edge(obb: &OrientedBoundingBox, (a, b): (usize, usize)) -> TangentLine {
    let v = obb.vertices();
    TangentLine::new(v[a], v[b], obb.dimension())
}

/// Picks the upper-vertebra and lower-vertebra tangent lines by fixed vertex
/// index: (0, 1) / (6, 7) in 3-D, (0, 1) / (2, 3) in 2-D.
pub fn select_tangents(
    uv_box: &OrientedBoundingBox,
    lv_box: &OrientedBoundingBox,
) -> Result<(TangentLine, TangentLine)> {
    if uv_box.dimension() != lv_box.dimension() {
        return Err(GeometryError::dimension_mismatch(format!(
            "upper vertebra box is {} but lower vertebra box is {}",
            uv_box.dimension(),
            lv_box.dimension()
        )));
    }
    check_box(uv_box)?;
    check_box(lv_box)?;

    let (uv_pair, lv_pair) = match uv_box.dimension() {
        Dimension::Three => TANGENT_VERTICES_3D,
        Dimension::Two => TANGENT_VERTICES_2D,
    };
    Ok((edge(uv_box, uv_pair), edge(lv_box, lv_pair)))
}
