//! Cobb angle pipeline: boxes -> tangents -> {angle, intersection} -> indices.

use log::{debug, info};
use std::fmt;

use crate::config::CobbConfig;
use crate::error::{GeometryError, Result};
use crate::geometry::{
    angle_between, angle_indices, box_indices, estimate_intersection, extract, select_tangents,
    AngleIndices, Dimension, Index, IntersectionPoint, OrientedBoundingBox, OrientedBoxProvider,
    PrincipalAxesBoxProvider, TangentLine,
};
use crate::io::label_map::{ImageGeometry, LabelMap};

/// Everything one pipeline run produces.
#[derive(Debug, Clone, PartialEq)]
pub struct CobbAngleResult {
    pub uv_label: i64,
    pub lv_label: i64,
    pub uv_box: OrientedBoundingBox,
    pub lv_box: OrientedBoundingBox,
    pub uv_line: TangentLine,
    pub lv_line: TangentLine,
    /// Degrees, in [0, 180].
    pub cobb_angle: f64,
    pub intersection: IntersectionPoint,
    /// Annotation points in the index space of the reporting image.
    pub angle_indices: AngleIndices,
}

impl CobbAngleResult {
    pub fn dimension(&self) -> Dimension {
        self.uv_box.dimension()
    }
}

impl fmt::Display for CobbAngleResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Cobb angle between labels {} (upper) and {} (lower): {:.2} deg",
            self.uv_label, self.lv_label, self.cobb_angle
        )?;
        let p: Vec<String> = self.intersection.coords().iter().map(|c| format!("{:.3}", c)).collect();
        writeln!(
            f,
            "\tIntersection: ({}) residual {:.3e}{}",
            p.join(", "),
            self.intersection.residual_norm,
            if self.intersection.parallel { " [parallel]" } else { "" }
        )?;
        write!(
            f,
            "\tAnnotation indices: {:?} -> {:?} -> {:?}",
            self.angle_indices.upper, self.angle_indices.vertex, self.angle_indices.lower
        )
    }
}

/// Runs the pipeline with the principal-axes box provider. Index mapping uses
/// `image`, which must share the label map's dimension.
pub fn compute_cobb_angle(
    image: &ImageGeometry,
    label_map: &LabelMap,
    uv_label: i64,
    lv_label: i64,
    config: &CobbConfig,
) -> Result<CobbAngleResult> {
    compute_cobb_angle_with(&PrincipalAxesBoxProvider, image, label_map, uv_label, lv_label, config)
}

pub fn compute_cobb_angle_with<P: OrientedBoxProvider + ?Sized>(
    provider: &P,
    image: &ImageGeometry,
    label_map: &LabelMap,
    uv_label: i64,
    lv_label: i64,
    config: &CobbConfig,
) -> Result<CobbAngleResult> {
    if image.dimension() != label_map.dimension() {
        return Err(GeometryError::dimension_mismatch(format!(
            "image is {} but label map is {}",
            image.dimension(),
            label_map.dimension()
        )));
    }
    debug!("computing Cobb angle for labels {} / {}", uv_label, lv_label);

    let uv_box = extract(provider, label_map, uv_label, config.background)?;
    let lv_box = extract(provider, label_map, lv_label, config.background)?;

    let (uv_line, lv_line) = select_tangents(&uv_box, &lv_box)?;
    let cobb_angle = angle_between(&uv_line, &lv_line)?;
    let intersection = estimate_intersection(&uv_line, &lv_line, &config.solver)?;
    let angle_indices = angle_indices(&uv_line, &intersection, &lv_line, image)?;

    info!(
        "Cobb angle {:.2} deg between labels {} and {}",
        cobb_angle, uv_label, lv_label
    );

    Ok(CobbAngleResult {
        uv_label,
        lv_label,
        uv_box,
        lv_box,
        uv_line,
        lv_line,
        cobb_angle,
        intersection,
        angle_indices,
    })
}

/// Stateful front end: configure, `execute()`, then read the result.
/// Accessors fail with [`GeometryError::NotExecuted`] until an `execute()`
/// succeeds, and a failing `execute()` drops any earlier result.
pub struct CobbAngleCalculator<'a, P: OrientedBoxProvider = PrincipalAxesBoxProvider> {
    image: &'a ImageGeometry,
    label_map: &'a LabelMap,
    uv_label: i64,
    lv_label: i64,
    config: CobbConfig,
    provider: P,
    result: Option<CobbAngleResult>,
}

impl<'a> CobbAngleCalculator<'a, PrincipalAxesBoxProvider> {
    /// `image` is the geometry the intersection and tangent anchors are
    /// reported in; box vertex indices always use the label map.
    pub fn new(image: &'a ImageGeometry, label_map: &'a LabelMap, uv_label: i64, lv_label: i64) -> Self {
        Self::with_provider(PrincipalAxesBoxProvider, label_map, uv_label, lv_label)
            .with_image_geometry(image)
    }
}

impl<'a, P: OrientedBoxProvider> CobbAngleCalculator<'a, P> {
    pub fn with_provider(provider: P, label_map: &'a LabelMap, uv_label: i64, lv_label: i64) -> Self {
        Self {
            image: label_map.geometry(),
            label_map,
            uv_label,
            lv_label,
            config: CobbConfig::default(),
            provider,
            result: None,
        }
    }

    /// Replaces the geometry used for the angle indices. Defaults to the
    /// label map's own.
    pub fn with_image_geometry(mut self, image: &'a ImageGeometry) -> Self {
        self.image = image;
        self.result = None;
        self
    }

    pub fn with_config(mut self, config: CobbConfig) -> Self {
        self.config = config;
        self.result = None;
        self
    }

    pub fn dimension(&self) -> Dimension {
        self.label_map.dimension()
    }

    pub fn execute(&mut self) -> Result<&CobbAngleResult> {
        self.result = None;
        let result = compute_cobb_angle_with(
            &self.provider,
            self.image,
            self.label_map,
            self.uv_label,
            self.lv_label,
            &self.config,
        )?;
        Ok(&*self.result.insert(result))
    }

    pub fn result(&self) -> Result<&CobbAngleResult> {
        self.result.as_ref().ok_or(GeometryError::NotExecuted)
    }

    pub fn cobb_angle(&self) -> Result<f64> {
        Ok(self.result()?.cobb_angle)
    }

    pub fn uv_box(&self) -> Result<&OrientedBoundingBox> {
        Ok(&self.result()?.uv_box)
    }

    pub fn lv_box(&self) -> Result<&OrientedBoundingBox> {
        Ok(&self.result()?.lv_box)
    }

    /// Upper vertebra box vertices in the label map's index space.
    pub fn uv_box_indices(&self) -> Result<Vec<Index>> {
        box_indices(&self.result()?.uv_box, self.label_map.geometry())
    }

    pub fn lv_box_indices(&self) -> Result<Vec<Index>> {
        box_indices(&self.result()?.lv_box, self.label_map.geometry())
    }

    pub fn tangent_lines(&self) -> Result<(TangentLine, TangentLine)> {
        let r = self.result()?;
        Ok((r.uv_line, r.lv_line))
    }

    pub fn intersection_point(&self) -> Result<&IntersectionPoint> {
        Ok(&self.result()?.intersection)
    }

    pub fn intersection_point_index(&self) -> Result<Index> {
        Ok(self.result()?.angle_indices.vertex.clone())
    }

    pub fn angle_indices(&self) -> Result<&AngleIndices> {
        Ok(&self.result()?.angle_indices)
    }
}

impl<P: OrientedBoxProvider> fmt::Display for CobbAngleCalculator<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\nCobb Angle Calculator\n")?;
        writeln!(f, "\tImage dimension: {}", self.dimension())?;
        writeln!(f, "\tUpper vertebra label index: {}", self.uv_label)?;
        writeln!(f, "\tLower vertebra label index: {}\n", self.lv_label)?;
        write!(f, "{}", self.label_map)?;
        if let Some(result) = &self.result {
            write!(f, "{}", result)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PrecomputedBoxProvider;
    use crate::utils::test_utils::{
        box_vertices, init_logger, merge_label_maps, prism_label_map, rectangle_label_map,
        rotated_rectangle_label_map,
    };
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    /// Upper prism label 1 above lower prism label 2, same x/y footprint.
    fn stacked_prisms() -> LabelMap {
        prism_label_map(
            [20, 16, 30],
            &[(1, [4, 4, 18], [12, 8, 4]), (2, [4, 4, 8], [12, 8, 4])],
        )
    }

    #[test]
    fn test_parallel_end_plates_3d() {
        init_logger();
        let map = stacked_prisms();
        let result =
            compute_cobb_angle(map.geometry(), &map, 1, 2, &CobbConfig::default()).unwrap();

        assert_relative_eq!(result.cobb_angle, 0.0, epsilon = 1e-6);
        assert_eq!(result.uv_box.vertices().len(), 8);
        assert_eq!(result.lv_box.vertices().len(), 8);

        // tangents run along the shortest (vertical) box axis: uv edge at
        // x = y = 3.5, lv edge at x = 15.5, y = 11.5
        assert_relative_eq!(result.uv_line.direction(), Vector3::new(0.0, 0.0, 4.0), epsilon = 1e-9);
        assert_relative_eq!(result.lv_line.direction(), Vector3::new(0.0, 0.0, 4.0), epsilon = 1e-9);

        let x = &result.intersection;
        // on the shared vertical symmetry axis
        assert_relative_eq!(x.point.x, 9.5, epsilon = 1e-4);
        assert_relative_eq!(x.point.y, 7.5, epsilon = 1e-4);
        // between the prisms: lower top face at z = 11.5, upper bottom at 17.5
        assert!(x.point.z > 11.5 && x.point.z < 17.5, "z = {}", x.point.z);
        // parallel end-plates never pose as an exact crossing
        assert!(x.parallel);
        assert_relative_eq!(x.residual_norm, 208.0f64.sqrt(), epsilon = 1e-6);
        assert_eq!(result.angle_indices.vertex.len(), 3);
    }

    #[test]
    fn test_tilted_lower_vertebra_2d() {
        let angle = 15.0f64.to_radians();
        let map = merge_label_maps(&[
            rotated_rectangle_label_map([160, 160], 2, (80.0, 50.0), (70.0, 16.0), angle),
            rectangle_label_map([160, 160], &[(1, [45, 100], [70, 16])]),
        ]);

        let result =
            compute_cobb_angle(map.geometry(), &map, 1, 2, &CobbConfig::default()).unwrap();
        assert!((result.cobb_angle - 15.0).abs() < 1.0, "angle {}", result.cobb_angle);
        assert!(!result.intersection.parallel);
        assert!(result.intersection.residual_norm < 1e-6);
        assert_eq!(result.angle_indices.vertex.len(), 2);
    }

    #[test]
    fn test_steep_vertebrae_keep_small_angle() {
        // end plates at -40 and -50 degrees straddle the 45 degree diagonal
        let map = merge_label_maps(&[
            rotated_rectangle_label_map([200, 200], 1, (100.0, 130.0), (60.0, 14.0), -40.0f64.to_radians()),
            rotated_rectangle_label_map([200, 200], 2, (100.0, 60.0), (60.0, 14.0), -50.0f64.to_radians()),
        ]);

        let result =
            compute_cobb_angle(map.geometry(), &map, 1, 2, &CobbConfig::default()).unwrap();
        assert!((result.cobb_angle - 10.0).abs() < 1.0, "angle {}", result.cobb_angle);
        assert!(result.uv_line.direction().x > 0.0);
        assert!(result.lv_line.direction().x > 0.0);
        assert!(!result.intersection.parallel);
    }

    #[test]
    fn test_known_boxes_with_precomputed_provider() {
        // upper box flat, lower box rotated 10 degrees about y
        let uv_pts = box_vertices([0.0, 0.0, 20.0], [10.0, 6.0, 4.0]);
        let theta = 10.0f64.to_radians();
        let (c, s) = (theta.cos(), theta.sin());
        let lv_pts: Vec<Vector3<f64>> = box_vertices([0.0, 0.0, 0.0], [10.0, 6.0, 4.0])
            .into_iter()
            .map(|p| Vector3::new(c * p.x - s * p.z, p.y, s * p.x + c * p.z))
            .collect();
        let provider = PrecomputedBoxProvider::new()
            .with_points(1, &uv_pts, Dimension::Three)
            .with_points(2, &lv_pts, Dimension::Three);
        let map = prism_label_map([4, 4, 4], &[(1, [0, 0, 0], [1, 1, 1])]);

        let result =
            compute_cobb_angle_with(&provider, map.geometry(), &map, 1, 2, &CobbConfig::default())
                .unwrap();
        assert_relative_eq!(result.cobb_angle, 10.0, epsilon = 1e-9);
        assert_eq!(result.uv_line.p1, uv_pts[0]);
        assert_eq!(result.lv_line.p2, lv_pts[7]);
        // both tangents lie in planes y = 0 and y = 6: skew, residual 6
        assert_relative_eq!(result.intersection.residual_norm, 6.0, epsilon = 1e-6);
        assert_relative_eq!(result.intersection.point.y, 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_calculator_lifecycle() {
        let map = stacked_prisms();
        let mut calc = CobbAngleCalculator::new(map.geometry(), &map, 1, 2);
        assert_eq!(calc.cobb_angle().unwrap_err(), GeometryError::NotExecuted);
        assert_eq!(calc.intersection_point_index().unwrap_err(), GeometryError::NotExecuted);
        assert!(calc.uv_box_indices().is_err());

        let first = calc.execute().unwrap().clone();
        let second = calc.execute().unwrap().clone();
        assert_eq!(first, second);
        assert_eq!(first.cobb_angle.to_bits(), second.cobb_angle.to_bits());

        assert_eq!(calc.uv_box().unwrap().vertices().len(), 8);
        let uv_idx = calc.uv_box_indices().unwrap();
        assert_eq!(uv_idx, box_indices(calc.uv_box().unwrap(), map.geometry()).unwrap());
        assert_eq!(uv_idx.len(), 8);
        assert_eq!(calc.lv_box_indices().unwrap().len(), 8);
        // upper anchor is uv vertex 0
        assert_eq!(calc.angle_indices().unwrap().upper, uv_idx[0]);
        let (uv_line, _) = calc.tangent_lines().unwrap();
        assert_eq!(uv_line.p1, calc.uv_box().unwrap().vertices()[0]);
        assert_eq!(
            calc.intersection_point_index().unwrap(),
            calc.angle_indices().unwrap().vertex
        );
    }

    #[test]
    fn test_failed_execute_clears_result() {
        let map = stacked_prisms();
        let mut calc = CobbAngleCalculator::new(map.geometry(), &map, 1, 2);
        calc.execute().unwrap();
        let mut calc = calc.with_config(CobbConfig {
            background: 1,
            ..CobbConfig::default()
        });
        assert_eq!(calc.execute().unwrap_err(), GeometryError::BackgroundLabel(1));
        assert_eq!(calc.result().unwrap_err(), GeometryError::NotExecuted);
    }

    #[test]
    fn test_errors_propagate() {
        let map = stacked_prisms();
        let config = CobbConfig::default();
        assert_eq!(
            compute_cobb_angle(map.geometry(), &map, 1, 9, &config).unwrap_err(),
            GeometryError::LabelNotFound(9)
        );
        let image_2d = ImageGeometry::identity(Dimension::Two);
        assert!(matches!(
            compute_cobb_angle(&image_2d, &map, 1, 2, &config).unwrap_err(),
            GeometryError::DimensionMismatch(_)
        ));
    }

    #[test]
    fn test_parallel_2d_rectangles_fail() {
        let map = rectangle_label_map([40, 40], &[(1, [5, 25], [20, 6]), (2, [5, 5], [20, 6])]);
        assert!(matches!(
            compute_cobb_angle(map.geometry(), &map, 1, 2, &CobbConfig::default()).unwrap_err(),
            GeometryError::IllConditioned(_)
        ));
    }

    #[test]
    fn test_separate_image_geometry() {
        let map = stacked_prisms();
        let image = ImageGeometry::new(
            &[0.0, 0.0, 0.0],
            &[0.5, 0.5, 0.5],
            &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        )
        .unwrap();
        let mut calc = CobbAngleCalculator::new(&image, &map, 1, 2);
        calc.execute().unwrap();
        // (9.5, 7.5, z) in a 0.5 mm image, 11.5 < z < 17.5
        let vertex = calc.intersection_point_index().unwrap();
        assert_eq!(&vertex[..2], &[19, 15]);
        assert!(vertex[2] >= 23 && vertex[2] <= 35, "z index {}", vertex[2]);
        let text = calc.to_string();
        assert!(text.contains("Upper vertebra label index: 1"));
        assert!(text.contains("Cobb angle between labels 1 (upper) and 2 (lower)"));
    }
}
