//! Cobb angle measurement between two labelled vertebrae.
//!
//! Each vertebra's oriented bounding box yields an end-plate tangent line;
//! the angle between the two tangents is the Cobb angle and their
//! least-squares intersection is reported in image index space.

pub mod cobb;
pub mod config;
pub mod entry;
pub mod error;
pub mod geometry;
pub mod io;
pub mod processing;
mod utils;

#[cfg(feature = "python")]
mod binding;

pub use cobb::{compute_cobb_angle, compute_cobb_angle_with, CobbAngleCalculator, CobbAngleResult};
pub use config::{CobbConfig, SolverConfig};
pub use error::{GeometryError, Result};
pub use geometry::{
    Dimension, IntersectionPoint, OrientedBoundingBox, OrientedBoxProvider, PrecomputedBoxProvider,
    PrincipalAxesBoxProvider, TangentLine,
};
pub use io::{ImageGeometry, LabelMap};

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// This is the module importable from Python:
///
/// ```python
/// import lssegrs
/// res = lssegrs.cobb_angle_from_file("labels.png", 1, 2)
/// ```
#[cfg(feature = "python")]
#[pymodule]
fn lssegrs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    binding::register(m)
}
