use crate::error::{GeometryError, Result};
use crate::geometry::tangent::TangentLine;

/// Angle in degrees, in [0, 180], between the direction vectors of two lines.
pub fn angle_between(line_a: &TangentLine, line_b: &TangentLine) -> Result<f64> {
    if line_a.dimension != line_b.dimension {
        return Err(GeometryError::dimension_mismatch(format!(
            "cannot measure the angle between a {} and a {} line",
            line_a.dimension, line_b.dimension
        )));
    }
    let d1 = line_a.direction();
    let d2 = line_b.direction();
    let n1 = d1.norm();
    let n2 = d2.norm();
    if !n1.is_finite() || !n2.is_finite() {
        return Err(GeometryError::non_finite("tangent line direction"));
    }
    if n1 <= f64::EPSILON || n2 <= f64::EPSILON {
        return Err(GeometryError::degenerate_line(format!(
            "tangent line endpoints coincide (lengths {:.3e}, {:.3e})",
            n1, n2
        )));
    }

    // |d1||d2| as one square root keeps identical directions at exactly 1
    let norms = (d1.dot(&d1) * d2.dot(&d2)).sqrt();
    let cos_theta = (d1.dot(&d2) / norms).clamp(-1.0, 1.0);
    Ok(cos_theta.acos().to_degrees())
}
