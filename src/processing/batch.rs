use log::{info, warn};
use rayon::prelude::*;

use crate::cobb::{compute_cobb_angle_with, CobbAngleResult};
use crate::config::CobbConfig;
use crate::error::GeometryError;
use crate::geometry::{OrientedBoxProvider, PrincipalAxesBoxProvider};
use crate::io::label_map::{ImageGeometry, LabelMap};

/// Result of one (upper, lower) label pair. Failures stay per pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PairOutcome {
    pub uv_label: i64,
    pub lv_label: i64,
    pub result: Result<CobbAngleResult, GeometryError>,
}

impl PairOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Neighbouring pairs of `labels` in the given order, `(labels[i], labels[i + 1])`.
pub fn consecutive_pairs(labels: &[i64]) -> Vec<(i64, i64)> {
    labels.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Computes every pair in parallel with the principal-axes provider. The
/// output keeps the order of `pairs`.
pub fn compute_pairs(
    image: &ImageGeometry,
    label_map: &LabelMap,
    pairs: &[(i64, i64)],
    config: &CobbConfig,
) -> Vec<PairOutcome> {
    compute_pairs_with(&PrincipalAxesBoxProvider, image, label_map, pairs, config)
}

pub fn compute_pairs_with<P: OrientedBoxProvider + Sync + ?Sized>(
    provider: &P,
    image: &ImageGeometry,
    label_map: &LabelMap,
    pairs: &[(i64, i64)],
    config: &CobbConfig,
) -> Vec<PairOutcome> {
    let outcomes: Vec<PairOutcome> = pairs
        .par_iter()
        .map(|&(uv_label, lv_label)| PairOutcome {
            uv_label,
            lv_label,
            result: compute_cobb_angle_with(provider, image, label_map, uv_label, lv_label, config),
        })
        .collect();

    for o in outcomes.iter() {
        if let Err(e) = &o.result {
            warn!("labels {} / {}: {}", o.uv_label, o.lv_label, e);
        }
    }
    info!(
        "computed {} of {} label pairs",
        outcomes.iter().filter(|o| o.is_ok()).count(),
        outcomes.len()
    );
    outcomes
}

/// Every pair of neighbouring foreground labels of the map, in ascending
/// label order.
pub fn compute_consecutive(label_map: &LabelMap, config: &CobbConfig) -> Vec<PairOutcome> {
    let pairs = consecutive_pairs(&label_map.labels(config.background));
    compute_pairs(label_map.geometry(), label_map, &pairs, config)
}
