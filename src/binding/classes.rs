use pyo3::prelude::*;

use crate::cobb::CobbAngleResult;
use crate::geometry::{point_coords, IntersectionPoint, TangentLine};
use crate::processing::batch::PairOutcome;

/// Python representation of a tangent line through two box vertices
///
/// Attributes:
///     p1 (list[float]): First vertex, physical coordinates
///     p2 (list[float]): Second vertex, physical coordinates
#[pyclass]
#[derive(Debug, Clone)]
pub struct PyTangentLine {
    #[pyo3(get)]
    pub p1: Vec<f64>,
    #[pyo3(get)]
    pub p2: Vec<f64>,
}

#[pymethods]
impl PyTangentLine {
    fn __repr__(&self) -> String {
        format!("TangentLine(p1={:?}, p2={:?})", self.p1, self.p2)
    }
}

impl From<&TangentLine> for PyTangentLine {
    fn from(line: &TangentLine) -> Self {
        Self {
            p1: point_coords(&line.p1, line.dimension),
            p2: point_coords(&line.p2, line.dimension),
        }
    }
}

/// Python representation of the tangent-line intersection estimate
///
/// Attributes:
///     point (list[float]): Midpoint of the closest points of both lines
///     residual_norm (float): Distance between those points, 0 for a true crossing
///     parallel (bool): Tangents were parallel; the point is not a crossing
#[pyclass]
#[derive(Debug, Clone)]
pub struct PyIntersection {
    #[pyo3(get)]
    pub point: Vec<f64>,
    #[pyo3(get)]
    pub residual_norm: f64,
    #[pyo3(get)]
    pub parallel: bool,
}

#[pymethods]
impl PyIntersection {
    fn __repr__(&self) -> String {
        format!(
            "Intersection(point={:?}, residual_norm={:.3e}, parallel={})",
            self.point, self.residual_norm, self.parallel
        )
    }
}

impl From<&IntersectionPoint> for PyIntersection {
    fn from(x: &IntersectionPoint) -> Self {
        Self {
            point: x.coords(),
            residual_norm: x.residual_norm,
            parallel: x.parallel,
        }
    }
}

/// Python representation of one Cobb angle measurement
///
/// Attributes:
///     uv_label (int): Upper vertebra label
///     lv_label (int): Lower vertebra label
///     cobb_angle (float): Angle in degrees
///     uv_box (list[list[float]]): Upper vertebra box vertices
///     lv_box (list[list[float]]): Lower vertebra box vertices
///     uv_line (PyTangentLine): Upper end-plate tangent
///     lv_line (PyTangentLine): Lower end-plate tangent
///     intersection (PyIntersection): Tangent intersection estimate
///     angle_indices (list[list[int]]): Upper anchor, intersection and
///         lower anchor as image indices
///
/// Example:
///     >>> res = lssegrs.cobb_angle_from_file("labels.png", 1, 2)
///     >>> res.cobb_angle
#[pyclass]
#[derive(Debug, Clone)]
pub struct PyCobbResult {
    #[pyo3(get)]
    pub uv_label: i64,
    #[pyo3(get)]
    pub lv_label: i64,
    #[pyo3(get)]
    pub cobb_angle: f64,
    #[pyo3(get)]
    pub uv_box: Vec<Vec<f64>>,
    #[pyo3(get)]
    pub lv_box: Vec<Vec<f64>>,
    #[pyo3(get)]
    pub uv_line: PyTangentLine,
    #[pyo3(get)]
    pub lv_line: PyTangentLine,
    #[pyo3(get)]
    pub intersection: PyIntersection,
    #[pyo3(get)]
    pub angle_indices: Vec<Vec<i64>>,
}

#[pymethods]
impl PyCobbResult {
    fn __repr__(&self) -> String {
        format!(
            "CobbResult(uv={}, lv={}, angle={:.2}, parallel={})",
            self.uv_label, self.lv_label, self.cobb_angle, self.intersection.parallel
        )
    }
}

impl From<&CobbAngleResult> for PyCobbResult {
    fn from(r: &CobbAngleResult) -> Self {
        let dim = r.dimension();
        let corners = |obb: &crate::geometry::OrientedBoundingBox| -> Vec<Vec<f64>> {
            obb.vertices().iter().map(|v| point_coords(v, dim)).collect()
        };
        Self {
            uv_label: r.uv_label,
            lv_label: r.lv_label,
            cobb_angle: r.cobb_angle,
            uv_box: corners(&r.uv_box),
            lv_box: corners(&r.lv_box),
            uv_line: PyTangentLine::from(&r.uv_line),
            lv_line: PyTangentLine::from(&r.lv_line),
            intersection: PyIntersection::from(&r.intersection),
            angle_indices: vec![
                r.angle_indices.upper.clone(),
                r.angle_indices.vertex.clone(),
                r.angle_indices.lower.clone(),
            ],
        }
    }
}

/// Outcome of one label pair in a batch run; `result` is None and `error`
/// holds the message when the pair failed.
#[pyclass]
#[derive(Debug, Clone)]
pub struct PyPairOutcome {
    #[pyo3(get)]
    pub uv_label: i64,
    #[pyo3(get)]
    pub lv_label: i64,
    #[pyo3(get)]
    pub result: Option<PyCobbResult>,
    #[pyo3(get)]
    pub error: Option<String>,
}

#[pymethods]
impl PyPairOutcome {
    fn __repr__(&self) -> String {
        match (&self.result, &self.error) {
            (Some(r), _) => format!("PairOutcome({}, {}, angle={:.2})", self.uv_label, self.lv_label, r.cobb_angle),
            (None, e) => format!("PairOutcome({}, {}, error={:?})", self.uv_label, self.lv_label, e),
        }
    }
}

impl From<&PairOutcome> for PyPairOutcome {
    fn from(o: &PairOutcome) -> Self {
        Self {
            uv_label: o.uv_label,
            lv_label: o.lv_label,
            result: o.result.as_ref().ok().map(PyCobbResult::from),
            error: o.result.as_ref().err().map(|e| e.to_string()),
        }
    }
}
