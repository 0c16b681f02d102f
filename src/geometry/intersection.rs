use log::{debug, warn};
use nalgebra::Vector3;

use crate::config::SolverConfig;
use crate::error::{GeometryError, Result};
use crate::geometry::solver::{fit_line_pair, LinePairResidual};
use crate::geometry::tangent::TangentLine;
use crate::geometry::{point_coords, Dimension};

/// Line parameters the solve starts from. The crossing of interest usually
/// lies past the `p2` ends, between the two boxes, so the seed is (1, 1).
pub const INITIAL_GUESS: [f64; 2] = [1.0, 1.0];

/// Least-squares crossing of two lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionPoint {
    /// Midpoint of the two closest points.
    pub point: Vector3<f64>,
    pub dimension: Dimension,
    pub s: f64,
    pub t: f64,
    /// Distance between the two closest points.
    pub residual_norm: f64,
    /// Directions are parallel within `parallel_tolerance`; the point is the
    /// minimiser the solve reached from the seed, not a crossing.
    pub parallel: bool,
}

impl IntersectionPoint {
    pub fn coords(&self) -> Vec<f64> {
        point_coords(&self.point, self.dimension)
    }

    pub fn is_exact(&self, residual_tolerance: f64) -> bool {
        !self.parallel && self.residual_norm <= residual_tolerance
    }
}

/// Distance from `line_a.p1` to the crossing of two 2-D lines, in units of
/// the largest spread between their endpoints.
fn crossing_reach(line_a: &TangentLine, line_b: &TangentLine, sine: f64) -> f64 {
    let d2 = line_b.direction();
    let offset = d2.cross(&(line_a.p1 - line_b.p1)).norm() / d2.norm();
    let ends = [line_a.p1, line_a.p2, line_b.p1, line_b.p2];
    let scale = ends
        .iter()
        .flat_map(|p| ends.iter().map(move |q| (p - q).norm()))
        .fold(0.0f64, f64::max);
    offset / (sine * scale)
}

/// Estimates where `line_a` and `line_b`, extended to infinite lines, cross.
///
/// Fails on non-convergence or a non-finite solution. In 2-D, parallel lines,
/// near-parallel lines crossing more than `max_crossing_ratio` scene widths
/// away, and solves ending more than `residual_tolerance` from the crossing
/// are errors. In 3-D, skew lines are expected and the residual is
/// reported; parallel lines return the minimiser reached from the seed with
/// `parallel` set.
pub fn estimate_intersection(
    line_a: &TangentLine,
    line_b: &TangentLine,
    config: &SolverConfig,
) -> Result<IntersectionPoint> {
    if line_a.dimension != line_b.dimension {
        return Err(GeometryError::dimension_mismatch(format!(
            "cannot intersect a {} and a {} line",
            line_a.dimension, line_b.dimension
        )));
    }
    let dimension = line_a.dimension;
    let d1 = line_a.direction();
    let d2 = line_b.direction();
    let (n1, n2) = (d1.norm(), d2.norm());
    if !(n1 > f64::EPSILON && n2 > f64::EPSILON) {
        return Err(GeometryError::degenerate_line(
            "cannot intersect a line whose endpoints coincide",
        ));
    }

    let sine = d1.cross(&d2).norm() / (n1 * n2);
    let parallel = sine < config.parallel_tolerance;
    if dimension == Dimension::Two {
        if parallel {
            return Err(GeometryError::ill_conditioned(format!(
                "2-D lines are parallel (sine {:.3e}), no unique crossing",
                sine
            )));
        }
        let reach = crossing_reach(line_a, line_b, sine);
        if reach > config.max_crossing_ratio {
            return Err(GeometryError::ill_conditioned(format!(
                "2-D lines are near-parallel (sine {:.3e}): they cross {:.3e} scene widths away (limit {:.1e})",
                sine, reach, config.max_crossing_ratio
            )));
        }
    }

    let fit = fit_line_pair(&LinePairResidual::new(line_a, line_b), INITIAL_GUESS, config)?;
    if dimension == Dimension::Two && fit.residual_norm > config.residual_tolerance {
        return Err(GeometryError::ill_conditioned(format!(
            "solve stopped {:.3e} short of the crossing of 2-D lines (sine {:.3e}, tolerance {:.3e})",
            fit.residual_norm, sine, config.residual_tolerance
        )));
    }
    if !fit.converged {
        return Err(GeometryError::NotConverged {
            max_iterations: config.max_iterations,
            residual_norm: fit.residual_norm,
        });
    }

    let (s, t) = (fit.s, fit.t);
    let point = (line_a.point_at(s) + line_b.point_at(t)) * 0.5;
    if !point.iter().all(|c| c.is_finite()) {
        return Err(GeometryError::non_finite(format!(
            "intersection point at s = {}, t = {}",
            s, t
        )));
    }
    if parallel {
        warn!(
            "tangent lines are parallel; intersection estimate is the minimiser reached from the seed (residual {:.3})",
            fit.residual_norm
        );
    }
    debug!(
        "intersection s = {:.6}, t = {:.6}, residual {:.3e}, optimality {:.3e}",
        s, t, fit.residual_norm, fit.optimality
    );

    Ok(IntersectionPoint {
        point,
        dimension,
        s,
        t,
        residual_norm: fit.residual_norm,
        parallel,
    })
}
