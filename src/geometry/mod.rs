//! Oriented-bounding-box to Cobb angle geometry.
//!
//! All points are carried as `Vector3<f64>`; 2-D computations keep the third
//! coordinate at zero and record their dimension alongside the points.

pub mod angle;
pub mod bbox;
pub mod intersection;
pub mod mapper;
pub mod solver;
pub mod tangent;

use nalgebra::Vector3;
use std::fmt;

use crate::error::{GeometryError, Result};

pub use angle::angle_between;
pub use bbox::{
    extract, OrientedBoundingBox, OrientedBoxProvider, PrecomputedBoxProvider,
    PrincipalAxesBoxProvider,
};
pub use intersection::{estimate_intersection, IntersectionPoint};
pub use mapper::{angle_indices, box_indices, to_index, AngleIndices, Index};
pub use tangent::{select_tangents, TangentLine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Two,
    Three,
}

impl Dimension {
    pub fn from_len(len: usize) -> Result<Self> {
        match len {
            2 => Ok(Dimension::Two),
            3 => Ok(Dimension::Three),
            other => Err(GeometryError::dimension_mismatch(format!(
                "only 2-D and 3-D data is supported, got {}-D",
                other
            ))),
        }
    }

    pub fn axes(self) -> usize {
        match self {
            Dimension::Two => 2,
            Dimension::Three => 3,
        }
    }

    /// Number of oriented bounding box vertices: 4 or 8.
    pub fn vertex_count(self) -> usize {
        1 << self.axes()
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-D", self.axes())
    }
}

/// Embeds a 2- or 3-element coordinate slice into a `Vector3`.
pub fn point_from_slice(coords: &[f64]) -> Result<Vector3<f64>> {
    match coords {
        [x, y] => Ok(Vector3::new(*x, *y, 0.0)),
        [x, y, z] => Ok(Vector3::new(*x, *y, *z)),
        _ => Err(GeometryError::dimension_mismatch(format!(
            "expected 2 or 3 coordinates, got {}",
            coords.len()
        ))),
    }
}

/// Coordinates of `p` truncated to `dimension`.
pub fn point_coords(p: &Vector3<f64>, dimension: Dimension) -> Vec<f64> {
    p.iter().take(dimension.axes()).copied().collect()
}
