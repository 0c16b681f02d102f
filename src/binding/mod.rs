pub mod classes;

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::cobb::compute_cobb_angle;
use crate::config::CobbConfig;
use crate::entry::{run_cobb_angle, run_cobb_angle_from_boxes, run_label_pairs};
use crate::error::GeometryError;
use crate::io::label_map::{ImageGeometry, LabelMap};
use classes::{PyCobbResult, PyIntersection, PyPairOutcome, PyTangentLine};

fn geometry_err(e: GeometryError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn runtime_err(e: anyhow::Error) -> PyErr {
    PyRuntimeError::new_err(format!("{:#}", e))
}

/// Computes the Cobb angle between two labels of a label map file.
///
/// Arguments:
///
/// - ``label_map_path`` – ``.png``, ``.toml`` (header + raw data) or ``.json``
/// - ``uv_label`` – upper vertebra label
/// - ``lv_label`` – lower vertebra label
/// - ``image_path`` (default: None) – image whose geometry the angle indices
///   are reported in, defaults to the label map
/// - ``config_path`` (default: None) – TOML solver configuration
/// - ``output_path`` (default: None) – JSON report destination
///
/// Returns:
///
/// A ``PyCobbResult``.
///
/// Example:
///
/// .. code-block:: python
///
///    import lssegrs
///    res = lssegrs.cobb_angle_from_file("labels.toml", 20, 21)
///    print(res.cobb_angle, res.intersection.parallel)
#[pyfunction]
#[pyo3(signature = (label_map_path, uv_label, lv_label, image_path=None, config_path=None, output_path=None))]
pub fn cobb_angle_from_file(
    label_map_path: &str,
    uv_label: i64,
    lv_label: i64,
    image_path: Option<&str>,
    config_path: Option<&str>,
    output_path: Option<&str>,
) -> PyResult<PyCobbResult> {
    let result = run_cobb_angle(label_map_path, image_path, uv_label, lv_label, config_path, output_path)
        .map_err(runtime_err)?;
    Ok(PyCobbResult::from(&result))
}

/// Like ``cobb_angle_from_file`` with boxes taken from a ``label,x,y[,z]``
/// CSV vertex export.
#[pyfunction]
#[pyo3(signature = (label_map_path, boxes_path, uv_label, lv_label, config_path=None, output_path=None))]
pub fn cobb_angle_from_boxes(
    label_map_path: &str,
    boxes_path: &str,
    uv_label: i64,
    lv_label: i64,
    config_path: Option<&str>,
    output_path: Option<&str>,
) -> PyResult<PyCobbResult> {
    let result = run_cobb_angle_from_boxes(label_map_path, boxes_path, uv_label, lv_label, config_path, output_path)
        .map_err(runtime_err)?;
    Ok(PyCobbResult::from(&result))
}

/// Computes the Cobb angle on an in-memory label array.
///
/// ``values`` is flattened with x varying fastest and ``size`` lists the
/// extent per axis (2 or 3 entries). ``direction`` is row-major.
#[pyfunction]
#[pyo3(signature = (values, size, uv_label, lv_label, origin=None, spacing=None, direction=None, background=0))]
pub fn cobb_angle_from_array(
    values: Vec<i64>,
    size: Vec<usize>,
    uv_label: i64,
    lv_label: i64,
    origin: Option<Vec<f64>>,
    spacing: Option<Vec<f64>>,
    direction: Option<Vec<f64>>,
    background: i64,
) -> PyResult<PyCobbResult> {
    let n = size.len();
    let origin = origin.unwrap_or_else(|| vec![0.0; n]);
    let spacing = spacing.unwrap_or_else(|| vec![1.0; n]);
    let direction = direction.unwrap_or_else(|| {
        (0..n * n)
            .map(|i| if i / n == i % n { 1.0 } else { 0.0 })
            .collect()
    });
    let geometry = ImageGeometry::new(&origin, &spacing, &direction).map_err(geometry_err)?;
    let label_map = LabelMap::new(size, values, geometry).map_err(geometry_err)?;
    let config = CobbConfig {
        background,
        ..CobbConfig::default()
    };
    let result = compute_cobb_angle(label_map.geometry(), &label_map, uv_label, lv_label, &config)
        .map_err(geometry_err)?;
    Ok(PyCobbResult::from(&result))
}

/// Runs several label pairs in parallel. Without ``pairs`` every pair of
/// neighbouring labels is measured. Failed pairs are returned, not raised.
#[pyfunction]
#[pyo3(signature = (label_map_path, pairs=None, config_path=None, output_path=None))]
pub fn label_pairs_from_file(
    label_map_path: &str,
    pairs: Option<Vec<(i64, i64)>>,
    config_path: Option<&str>,
    output_path: Option<&str>,
) -> PyResult<Vec<PyPairOutcome>> {
    let outcomes = run_label_pairs(label_map_path, pairs.as_deref(), config_path, output_path)
        .map_err(runtime_err)?;
    Ok(outcomes.iter().map(PyPairOutcome::from).collect())
}

pub fn register(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(cobb_angle_from_file, m)?)?;
    m.add_function(wrap_pyfunction!(cobb_angle_from_boxes, m)?)?;
    m.add_function(wrap_pyfunction!(cobb_angle_from_array, m)?)?;
    m.add_function(wrap_pyfunction!(label_pairs_from_file, m)?)?;
    m.add_class::<PyCobbResult>()?;
    m.add_class::<PyTangentLine>()?;
    m.add_class::<PyIntersection>()?;
    m.add_class::<PyPairOutcome>()?;
    Ok(())
}
