use anyhow::{Context, Result};
use csv::Writer;
use nalgebra::Vector3;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::cobb::CobbAngleResult;
use crate::geometry::{point_coords, AngleIndices, TangentLine};
use crate::processing::batch::PairOutcome;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineReport {
    pub p1: Vec<f64>,
    pub p2: Vec<f64>,
}

impl From<&TangentLine> for LineReport {
    fn from(line: &TangentLine) -> Self {
        Self {
            p1: point_coords(&line.p1, line.dimension),
            p2: point_coords(&line.p2, line.dimension),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntersectionReport {
    pub point: Vec<f64>,
    pub s: f64,
    pub t: f64,
    pub residual_norm: f64,
    pub parallel: bool,
}

/// Serialisable view of a [`CobbAngleResult`], coordinates as plain arrays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CobbReport {
    pub uv_label: i64,
    pub lv_label: i64,
    pub dimension: usize,
    pub cobb_angle: f64,
    pub uv_box: Vec<Vec<f64>>,
    pub lv_box: Vec<Vec<f64>>,
    pub uv_line: LineReport,
    pub lv_line: LineReport,
    pub intersection: IntersectionReport,
    pub angle_indices: AngleIndices,
}

impl From<&CobbAngleResult> for CobbReport {
    fn from(r: &CobbAngleResult) -> Self {
        let dim = r.dimension();
        let corners = |v: &[Vector3<f64>]| -> Vec<Vec<f64>> { v.iter().map(|p| point_coords(p, dim)).collect() };
        Self {
            uv_label: r.uv_label,
            lv_label: r.lv_label,
            dimension: dim.axes(),
            cobb_angle: r.cobb_angle,
            uv_box: corners(r.uv_box.vertices()),
            lv_box: corners(r.lv_box.vertices()),
            uv_line: LineReport::from(&r.uv_line),
            lv_line: LineReport::from(&r.lv_line),
            intersection: IntersectionReport {
                point: r.intersection.coords(),
                s: r.intersection.s,
                t: r.intersection.t,
                residual_norm: r.intersection.residual_norm,
                parallel: r.intersection.parallel,
            },
            angle_indices: r.angle_indices.clone(),
        }
    }
}

pub fn write_report_json<P: AsRef<Path>>(path: P, result: &CobbAngleResult) -> Result<()> {
    let path = path.as_ref();
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory {:?}", dir))?;
    }
    let file = File::create(path).with_context(|| format!("failed to create report {:?}", path))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &CobbReport::from(result))
        .with_context(|| format!("failed to write report {:?}", path))?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct BatchRow<'a> {
    uv_label: i64,
    lv_label: i64,
    cobb_angle: Option<f64>,
    intersection: Option<String>,
    residual_norm: Option<f64>,
    parallel: Option<bool>,
    error: Option<&'a str>,
}

/// One row per label pair; failed pairs keep their error message and leave
/// the numeric columns empty.
pub fn write_batch_csv<P: AsRef<Path>>(path: P, outcomes: &[PairOutcome]) -> Result<()> {
    let path = path.as_ref();
    let mut wtr = Writer::from_path(path)
        .with_context(|| format!("failed to create batch report {:?}", path))?;
    let messages: Vec<Option<String>> = outcomes
        .iter()
        .map(|o| o.result.as_ref().err().map(|e| e.to_string()))
        .collect();

    for (outcome, message) in outcomes.iter().zip(&messages) {
        let ok = outcome.result.as_ref().ok();
        let point = ok.map(|r| {
            r.intersection
                .coords()
                .iter()
                .map(|c| format!("{:.6}", c))
                .collect::<Vec<_>>()
                .join(" ")
        });
        wtr.serialize(BatchRow {
            uv_label: outcome.uv_label,
            lv_label: outcome.lv_label,
            cobb_angle: ok.map(|r| r.cobb_angle),
            intersection: point,
            residual_norm: ok.map(|r| r.intersection.residual_norm),
            parallel: ok.map(|r| r.intersection.parallel),
            error: message.as_deref(),
        })?;
    }
    wtr.flush()
        .with_context(|| format!("failed to flush batch report {:?}", path))?;
    Ok(())
}
