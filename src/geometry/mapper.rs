use nalgebra::Vector3;
use serde::Serialize;

use crate::error::{GeometryError, Result};
use crate::geometry::bbox::OrientedBoundingBox;
use crate::geometry::intersection::IntersectionPoint;
use crate::geometry::tangent::TangentLine;
use crate::io::label_map::ImageGeometry;

/// Discrete image index, one entry per image axis.
pub type Index = Vec<i64>;

/// The three annotation points of a Cobb angle, in index space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AngleIndices {
    pub upper: Index,
    pub vertex: Index,
    pub lower: Index,
}

pub fn to_index(point: &Vector3<f64>, geometry: &ImageGeometry) -> Result<Index> {
    geometry.physical_to_index(point)
}

/// (upper anchor, intersection, lower anchor) where the anchors are the `p1`
/// endpoints of the two tangent lines.
pub fn angle_indices(
    uv_line: &TangentLine,
    intersection: &IntersectionPoint,
    lv_line: &TangentLine,
    geometry: &ImageGeometry,
) -> Result<AngleIndices> {
    for dimension in [uv_line.dimension, intersection.dimension, lv_line.dimension] {
        if dimension != geometry.dimension() {
            return Err(GeometryError::dimension_mismatch(format!(
                "{} point cannot be mapped into a {} image",
                dimension,
                geometry.dimension()
            )));
        }
    }
    Ok(AngleIndices {
        upper: to_index(&uv_line.p1, geometry)?,
        vertex: to_index(&intersection.point, geometry)?,
        lower: to_index(&lv_line.p1, geometry)?,
    })
}

/// Index of every vertex of `obb`.
pub fn box_indices(obb: &OrientedBoundingBox, geometry: &ImageGeometry) -> Result<Vec<Index>> {
    if obb.dimension() != geometry.dimension() {
        return Err(GeometryError::dimension_mismatch(format!(
            "{} box cannot be mapped into a {} image",
            obb.dimension(),
            geometry.dimension()
        )));
    }
    obb.vertices().iter().map(|v| to_index(v, geometry)).collect()
}
