use anyhow::{Context, Result};
use log::info;

use crate::cobb::{compute_cobb_angle_with, CobbAngleResult};
use crate::config::CobbConfig;
use crate::geometry::{OrientedBoxProvider, PrincipalAxesBoxProvider};
use crate::io::input::{load_label_map, read_box_vertices};
use crate::io::label_map::LabelMap;
use crate::io::output::{write_batch_csv, write_report_json};
use crate::processing::batch::{compute_pairs, consecutive_pairs, PairOutcome};

/// Loads the label map and, when given, the image whose geometry the angle
/// indices are reported in.
fn load_inputs(label_map_path: &str, image_path: Option<&str>) -> Result<(LabelMap, Option<LabelMap>)> {
    let label_map = load_label_map(label_map_path)
        .with_context(|| format!("loading label map {} failed", label_map_path))?;
    let image = image_path
        .map(|p| load_label_map(p).with_context(|| format!("loading image {} failed", p)))
        .transpose()?;
    Ok((label_map, image))
}

fn run_single<P: OrientedBoxProvider + ?Sized>(
    provider: &P,
    label_map: &LabelMap,
    image: Option<&LabelMap>,
    uv_label: i64,
    lv_label: i64,
    config: &CobbConfig,
    output_path: Option<&str>,
) -> Result<CobbAngleResult> {
    let geometry = image.map(|i| i.geometry()).unwrap_or(label_map.geometry());
    let result = compute_cobb_angle_with(provider, geometry, label_map, uv_label, lv_label, config)
        .context(format!("Cobb angle for labels {} / {} failed", uv_label, lv_label))?;

    if let Some(out) = output_path {
        write_report_json(out, &result).context("writing Cobb angle report failed")?;
        info!("wrote report to {}", out);
    }
    Ok(result)
}

/// Full file-driven run: label map (and optional reporting image) in, JSON
/// report out.
pub fn run_cobb_angle(
    label_map_path: &str,
    image_path: Option<&str>,
    uv_label: i64,
    lv_label: i64,
    config_path: Option<&str>,
    output_path: Option<&str>,
) -> Result<CobbAngleResult> {
    let config = CobbConfig::load_or_default(config_path)?;
    let (label_map, image) = load_inputs(label_map_path, image_path)?;
    run_single(
        &PrincipalAxesBoxProvider,
        &label_map,
        image.as_ref(),
        uv_label,
        lv_label,
        &config,
        output_path,
    )
}

/// Same as [`run_cobb_angle`] but with boxes read from a CSV vertex export
/// instead of computed from the label map.
pub fn run_cobb_angle_from_boxes(
    label_map_path: &str,
    boxes_path: &str,
    uv_label: i64,
    lv_label: i64,
    config_path: Option<&str>,
    output_path: Option<&str>,
) -> Result<CobbAngleResult> {
    let config = CobbConfig::load_or_default(config_path)?;
    let (label_map, _) = load_inputs(label_map_path, None)?;
    let provider = read_box_vertices(boxes_path)
        .with_context(|| format!("loading box vertices {} failed", boxes_path))?;
    run_single(&provider, &label_map, None, uv_label, lv_label, &config, output_path)
}

/// Runs `pairs`, or every pair of neighbouring labels when `None`, and
/// optionally writes a CSV with one row per pair.
pub fn run_label_pairs(
    label_map_path: &str,
    pairs: Option<&[(i64, i64)]>,
    config_path: Option<&str>,
    output_path: Option<&str>,
) -> Result<Vec<PairOutcome>> {
    let config = CobbConfig::load_or_default(config_path)?;
    let (label_map, _) = load_inputs(label_map_path, None)?;
    let pairs = match pairs {
        Some(p) => p.to_vec(),
        None => consecutive_pairs(&label_map.labels(config.background)),
    };
    let outcomes = compute_pairs(label_map.geometry(), &label_map, &pairs, &config);

    if let Some(out) = output_path {
        write_batch_csv(out, &outcomes).context("writing batch report failed")?;
        info!("wrote {} rows to {}", outcomes.len(), out);
    }
    Ok(outcomes)
}
