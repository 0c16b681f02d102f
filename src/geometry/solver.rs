//! Levenberg-Marquardt fit of the two line parameters, run by `tiny_solver`.
//!
//! The solver only minimises. Convergence is judged here, from the residual
//! and gradient at the returned parameters.

use std::collections::HashMap;

use log::trace;
use nalgebra::{Matrix3x2, Vector3};
use tiny_solver::factors::na as ts_na;
use tiny_solver::Optimizer;

use crate::config::SolverConfig;
use crate::error::{GeometryError, Result};
use crate::geometry::tangent::TangentLine;

const PARAMS: &str = "st";

/// r(s, t) = (p1 + s (p2 - p1)) - (q1 + t (q2 - q1))
#[derive(Debug, Clone)]
pub struct LinePairResidual {
    offset: [f64; 3],
    da: [f64; 3],
    db: [f64; 3],
}

impl LinePairResidual {
    pub fn new(a: &TangentLine, b: &TangentLine) -> Self {
        let offset = a.p1 - b.p1;
        let (da, db) = (a.direction(), b.direction());
        Self {
            offset: [offset.x, offset.y, offset.z],
            da: [da.x, da.y, da.z],
            db: [db.x, db.y, db.z],
        }
    }

    pub fn residual(&self, s: f64, t: f64) -> Vector3<f64> {
        Vector3::from_fn(|k, _| self.offset[k] + s * self.da[k] - t * self.db[k])
    }

    pub fn jacobian(&self) -> Matrix3x2<f64> {
        Matrix3x2::from_fn(|k, j| if j == 0 { self.da[k] } else { -self.db[k] })
    }
}

impl<T: ts_na::RealField> tiny_solver::factors::Factor<T> for LinePairResidual {
    fn residual_func(&self, params: &[ts_na::DVector<T>]) -> ts_na::DVector<T> {
        let st = &params[0];
        let s = st[0].clone();
        let t = st[1].clone();
        let r = (0..3)
            .map(|k| {
                T::from_f64(self.offset[k]).unwrap() + s.clone() * T::from_f64(self.da[k]).unwrap()
                    - t.clone() * T::from_f64(self.db[k]).unwrap()
            })
            .collect();
        ts_na::DVector::<T>::from_vec(r)
    }
}

/// Parameters returned by the solver and their quality.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    pub s: f64,
    pub t: f64,
    pub residual_norm: f64,
    /// `|J^T r|_inf / (|J|_inf |r|)`, zero at a stationary point.
    pub optimality: f64,
    pub converged: bool,
}

/// Minimises `|r(s, t)|` from `initial` with at most `max_iterations`
/// Levenberg-Marquardt iterations.
///
/// The fit counts as converged when the residual is within
/// `residual_tolerance` or the relative gradient is within `tolerance`.
pub fn fit_line_pair(residual: &LinePairResidual, initial: [f64; 2], config: &SolverConfig) -> Result<LineFit> {
    let mut problem = tiny_solver::Problem::new();
    problem.add_residual_block(3, &[PARAMS], Box::new(residual.clone()), None);

    let mut initial_values = HashMap::<String, ts_na::DVector<f64>>::new();
    initial_values.insert(
        PARAMS.to_string(),
        ts_na::DVector::<f64>::from_vec(initial.to_vec()),
    );

    // absolute stops only once the cost is well inside the residual
    // tolerance; a relative cost decrease of tolerance^2 matches a relative
    // gradient of tolerance
    let cost_floor = (0.1 * config.residual_tolerance).powi(2);
    let optimizer = tiny_solver::LevenbergMarquardtOptimizer::default();
    let options = tiny_solver::OptimizerOptions {
        max_iteration: config.max_iterations,
        verbosity_level: 0,
        min_abs_error_decrease_threshold: cost_floor,
        min_rel_error_decrease_threshold: config.tolerance * config.tolerance,
        min_error_threshold: cost_floor,
        ..Default::default()
    };
    let result = optimizer
        .optimize(&problem, &initial_values, Some(options))
        .ok_or_else(|| GeometryError::ill_conditioned("Levenberg-Marquardt step could not be solved"))?;
    let st = result
        .get(PARAMS)
        .filter(|v| v.len() == 2)
        .ok_or_else(|| GeometryError::non_finite("solver returned no line parameters"))?;
    let (s, t) = (st[0], st[1]);
    if !s.is_finite() || !t.is_finite() {
        return Err(GeometryError::non_finite(format!(
            "intersection parameters s = {}, t = {}",
            s, t
        )));
    }

    let r = residual.residual(s, t);
    let j = residual.jacobian();
    let residual_norm = r.norm();
    let optimality = if residual_norm > 0.0 {
        (j.transpose() * r).amax() / (j.amax() * residual_norm)
    } else {
        0.0
    };
    let converged = residual_norm <= config.residual_tolerance || optimality <= config.tolerance;
    trace!(
        "line fit s = {:.6}, t = {:.6}, residual {:.3e}, optimality {:.3e}",
        s,
        t,
        residual_norm,
        optimality
    );

    Ok(LineFit {
        s,
        t,
        residual_norm,
        optimality,
        converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Dimension;
    use approx::assert_relative_eq;
    use tiny_solver::factors::Factor;

    fn line(p1: [f64; 3], p2: [f64; 3]) -> TangentLine {
        TangentLine::new(Vector3::from(p1), Vector3::from(p2), Dimension::Three)
    }

    #[test]
    fn test_factor_matches_residual() {
        let a = line([0.0, 1.0, 2.0], [3.0, 1.0, 2.0]);
        let b = line([1.0, 0.0, 0.0], [1.0, 2.0, 1.0]);
        let residual = LinePairResidual::new(&a, &b);
        let params = [ts_na::DVector::<f64>::from_vec(vec![0.5, -2.0])];
        let from_factor = residual.residual_func(&params);
        let direct = a.point_at(0.5) - b.point_at(-2.0);
        for k in 0..3 {
            assert_relative_eq!(from_factor[k], direct[k], epsilon = 1e-12);
        }
        assert_eq!(residual.jacobian().column(0).into_owned(), a.direction());
        assert_eq!(residual.jacobian().column(1).into_owned(), -b.direction());
    }

    #[test]
    fn test_fit_reaches_crossing() {
        let a = line([0.0, 0.0, 0.0], [2.0, 2.0, 0.0]);
        let b = line([0.0, 2.0, 0.0], [2.0, 0.0, 0.0]);
        let fit = fit_line_pair(&LinePairResidual::new(&a, &b), [1.0, 1.0], &SolverConfig::default()).unwrap();
        assert!(fit.converged);
        assert_relative_eq!(fit.s, 0.5, epsilon = 1e-6);
        assert_relative_eq!(fit.t, 0.5, epsilon = 1e-6);
        assert!(fit.residual_norm <= SolverConfig::default().residual_tolerance);
    }

    #[test]
    fn test_skew_fit_is_stationary() {
        let a = line([0.0, 0.0, 0.0], [1.0, 0.0, 0.0]);
        let b = line([0.0, 1.0, 1.0], [0.0, 2.0, 1.0]);
        let config = SolverConfig::default();
        let fit = fit_line_pair(&LinePairResidual::new(&a, &b), [1.0, 1.0], &config).unwrap();
        assert!(fit.converged);
        assert!(fit.optimality <= config.tolerance);
        assert_relative_eq!(fit.residual_norm, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_one_iteration_on_shallow_pair_is_not_converged() {
        // directions 0.01 rad apart, closest points at s = t = -100
        let a = line([0.0, 0.0, 0.0], [1.0, 0.0, 0.0]);
        let b = line([0.0, 1.0, 1.0], [1.0, 1.01, 1.0]);
        let config = SolverConfig {
            max_iterations: 1,
            ..SolverConfig::default()
        };
        let fit = fit_line_pair(&LinePairResidual::new(&a, &b), [1.0, 1.0], &config).unwrap();
        assert!(!fit.converged);
        assert!(fit.optimality > config.tolerance);
    }
}
