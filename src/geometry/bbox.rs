use log::debug;
use nalgebra::{Matrix2, Matrix3, SymmetricEigen, Vector3};
use std::collections::BTreeMap;

use crate::error::{GeometryError, Result};
use crate::geometry::Dimension;
use crate::io::label_map::LabelMap;

/// Oriented bounding box of one label.
///
/// Vertex `i` sits at `corner + sum_k bit_k(i) * extent_k * axis_k`. In 3-D
/// the axes are sorted by increasing extent, so vertices 0-3 form the face at
/// the low end of the longest axis and 4-7 the opposite face, `i` and `i + 4`
/// sharing an edge. In 2-D the axes are sorted by decreasing extent and 0-1
/// and 2-3 are the long edges. Tangent selection relies on this ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct OrientedBoundingBox {
    label: i64,
    dimension: Dimension,
    vertices: Vec<Vector3<f64>>,
}

impl OrientedBoundingBox {
    /// Builds a box from a flat coordinate list of 8 (2-D) or 24 (3-D) values.
    pub fn from_flat(label: i64, dimension: Dimension, coords: &[f64]) -> Result<Self> {
        let n = dimension.axes();
        let expected = dimension.vertex_count() * n;
        if coords.len() != expected {
            return Err(GeometryError::VertexCount {
                label,
                coordinates: coords.len(),
                expected,
            });
        }
        if coords.iter().any(|c| !c.is_finite()) {
            return Err(GeometryError::non_finite(format!(
                "oriented bounding box of label {}",
                label
            )));
        }
        let vertices = coords
            .chunks(n)
            .map(|c| match dimension {
                Dimension::Two => Vector3::new(c[0], c[1], 0.0),
                Dimension::Three => Vector3::new(c[0], c[1], c[2]),
            })
            .collect();
        Ok(Self {
            label,
            dimension,
            vertices,
        })
    }

    pub fn label(&self) -> i64 {
        self.label
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn vertices(&self) -> &[Vector3<f64>] {
        &self.vertices
    }

    pub fn vertex(&self, i: usize) -> Option<&Vector3<f64>> {
        self.vertices.get(i)
    }

    pub fn centroid(&self) -> Vector3<f64> {
        self.vertices.iter().sum::<Vector3<f64>>() / self.vertices.len() as f64
    }
}

/// Computes per-label, background-excluded oriented bounding boxes.
///
/// Implementations return flat physical coordinates, 8 values for 2-D maps and
/// 24 for 3-D maps, in the vertex order documented on [`OrientedBoundingBox`].
pub trait OrientedBoxProvider {
    fn oriented_box_vertices(
        &self,
        label_map: &LabelMap,
        label: i64,
        background: i64,
    ) -> Result<Vec<f64>>;
}

/// Asks `provider` for the box of `label` and normalises it into an
/// [`OrientedBoundingBox`] of the label map's dimension.
pub fn extract<P: OrientedBoxProvider + ?Sized>(
    provider: &P,
    label_map: &LabelMap,
    label: i64,
    background: i64,
) -> Result<OrientedBoundingBox> {
    if label == background {
        return Err(GeometryError::BackgroundLabel(label));
    }
    let coords = provider.oriented_box_vertices(label_map, label, background)?;
    let obb = OrientedBoundingBox::from_flat(label, label_map.dimension(), &coords)?;
    debug!(
        "label {}: oriented bounding box with {} vertices, centroid {:?}",
        label,
        obb.vertices().len(),
        obb.centroid().as_slice()
    );
    Ok(obb)
}

/// Box from the principal axes of the label's voxel-centre distribution.
/// Extents cover whole voxels, not only their centres.
///
/// The longest axis points along increasing index axis 0, the middle one
/// (3-D) along increasing index axis 1, and (longest, middle, shortest) is
/// right-handed. 2-D boxes list their axes longest first, 3-D boxes
/// shortest first, so that in 3-D the `i -> i + 4` edges run along the
/// longest axis and the edge `0 -> 1` along the shortest.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrincipalAxesBoxProvider;

// an axis counts as orthogonal to an index axis below this cosine
const ORTHOGONAL_COSINE: f64 = 1e-9;

impl PrincipalAxesBoxProvider {
    /// Unit eigenvectors, largest eigenvalue first.
    fn principal_axes(cov: &Matrix3<f64>, dimension: Dimension) -> Vec<Vector3<f64>> {
        let mut axes: Vec<(f64, Vector3<f64>)> = match dimension {
            Dimension::Two => {
                let m = Matrix2::new(cov[(0, 0)], cov[(0, 1)], cov[(1, 0)], cov[(1, 1)]);
                let eig = SymmetricEigen::new(m);
                (0..2)
                    .map(|i| {
                        let v = eig.eigenvectors.column(i);
                        (eig.eigenvalues[i], Vector3::new(v[0], v[1], 0.0))
                    })
                    .collect()
            }
            Dimension::Three => {
                let eig = SymmetricEigen::new(*cov);
                (0..3)
                    .map(|i| (eig.eigenvalues[i], eig.eigenvectors.column(i).into_owned()))
                    .collect()
            }
        };
        axes.sort_by(|a, b| b.0.total_cmp(&a.0));
        axes.into_iter().map(|(_, axis)| axis.normalize()).collect()
    }
}

/// Flips `axis` to point along increasing index axis `preferred`, falling
/// back to the next index axes when it is orthogonal to that one.
fn orient_along(axis: Vector3<f64>, steps: &[Vector3<f64>], preferred: usize) -> Vector3<f64> {
    let n = steps.len();
    let cosine = (0..n)
        .map(|k| {
            let step = &steps[(preferred + k) % n];
            axis.dot(step) / step.norm()
        })
        .find(|c| c.abs() > ORTHOGONAL_COSINE)
        .unwrap_or(0.0);
    if cosine < 0.0 {
        -axis
    } else {
        axis
    }
}

impl OrientedBoxProvider for PrincipalAxesBoxProvider {
    fn oriented_box_vertices(
        &self,
        label_map: &LabelMap,
        label: i64,
        background: i64,
    ) -> Result<Vec<f64>> {
        if label == background {
            return Err(GeometryError::BackgroundLabel(label));
        }
        let geometry = label_map.geometry();
        let dimension = label_map.dimension();
        let n = dimension.axes();

        let centres: Vec<Vector3<f64>> = label_map
            .voxel_indices(label)
            .map(|idx| geometry.index_to_physical(idx))
            .collect();
        if centres.is_empty() {
            return Err(GeometryError::LabelNotFound(label));
        }

        let count = centres.len() as f64;
        let mean = centres.iter().sum::<Vector3<f64>>() / count;
        let cov = centres
            .iter()
            .map(|c| {
                let d = c - mean;
                d * d.transpose()
            })
            .sum::<Matrix3<f64>>()
            / count;

        let steps: Vec<Vector3<f64>> = (0..n).map(|k| geometry.axis_step(k)).collect();
        let half_voxel = |axis: &Vector3<f64>| steps.iter().map(|s| axis.dot(s).abs()).sum::<f64>() * 0.5;
        let range = |axis: &Vector3<f64>| {
            centres.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
                let p = axis.dot(&(c - mean));
                (lo.min(p), hi.max(p))
            })
        };

        // (extent, axis), longest first; stable, so equal extents keep the
        // eigenvalue order
        let mut frame: Vec<(f64, Vector3<f64>)> = Self::principal_axes(&cov, dimension)
            .into_iter()
            .map(|axis| {
                let (lo, hi) = range(&axis);
                (hi - lo + 2.0 * half_voxel(&axis), axis)
            })
            .collect();
        frame.sort_by(|a, b| b.0.total_cmp(&a.0));

        frame[0].1 = orient_along(frame[0].1, &steps, 0);
        match dimension {
            Dimension::Two => {
                let long = frame[0].1;
                frame[1].1 = Vector3::new(-long.y, long.x, 0.0);
            }
            Dimension::Three => {
                frame[1].1 = orient_along(frame[1].1, &steps, 1);
                frame[2].1 = frame[0].1.cross(&frame[1].1);
                frame.reverse();
            }
        }

        let corner = frame
            .iter()
            .fold(mean, |acc, (_, axis)| acc + axis * (range(axis).0 - half_voxel(axis)));
        let edges: Vec<Vector3<f64>> = frame.iter().map(|(extent, axis)| axis * *extent).collect();

        let mut coords = Vec::with_capacity(dimension.vertex_count() * n);
        for i in 0..dimension.vertex_count() {
            let vertex = edges
                .iter()
                .enumerate()
                .filter(|(k, _)| (i >> *k) & 1 == 1)
                .fold(corner, |acc, (_, edge)| acc + edge);
            coords.extend(vertex.iter().take(n));
        }
        Ok(coords)
    }
}

/// Boxes computed elsewhere (e.g. exported by an image toolkit), keyed by
/// label. Coordinates are returned exactly as stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrecomputedBoxProvider {
    boxes: BTreeMap<i64, Vec<f64>>,
}

impl PrecomputedBoxProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: i64, coords: Vec<f64>) {
        self.boxes.insert(label, coords);
    }

    pub fn with_points(mut self, label: i64, points: &[Vector3<f64>], dimension: Dimension) -> Self {
        let coords = points
            .iter()
            .flat_map(|p| p.iter().take(dimension.axes()).copied().collect::<Vec<_>>())
            .collect();
        self.insert(label, coords);
        self
    }

    /// Appends one vertex to the list of `label`.
    pub fn push_vertex(&mut self, label: i64, coords: &[f64]) {
        self.boxes.entry(label).or_default().extend_from_slice(coords);
    }

    pub fn labels(&self) -> Vec<i64> {
        self.boxes.keys().copied().collect()
    }
}

impl OrientedBoxProvider for PrecomputedBoxProvider {
    fn oriented_box_vertices(
        &self,
        _label_map: &LabelMap,
        label: i64,
        background: i64,
    ) -> Result<Vec<f64>> {
        if label == background {
            return Err(GeometryError::BackgroundLabel(label));
        }
        self.boxes
            .get(&label)
            .cloned()
            .ok_or(GeometryError::LabelNotFound(label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::label_map::ImageGeometry;
    use crate::utils::test_utils::{box_vertices, prism_label_map, rectangle_label_map};
    use approx::assert_relative_eq;

    fn edge(obb: &OrientedBoundingBox, i: usize, j: usize) -> Vector3<f64> {
        obb.vertices()[j] - obb.vertices()[i]
    }

    #[test]
    fn test_axis_aligned_prism_contract() {
        // x 12 voxels, y 8 voxels, z 4 voxels
        let map = prism_label_map([20, 16, 30], &[(1, [4, 4, 18], [12, 8, 4])]);
        let obb = extract(&PrincipalAxesBoxProvider, &map, 1, 0).unwrap();
        assert_eq!(obb.vertices().len(), 8);

        // i -> i+4 edges share one direction, the longest axis (x)
        for i in 0..4 {
            let e = edge(&obb, i, i + 4);
            assert_relative_eq!(e, Vector3::new(12.0, 0.0, 0.0), epsilon = 1e-9);
        }
        // both faces are 4 x 8 rectangles, x = 3.5 and x = 15.5
        for face in [0usize, 4] {
            assert_relative_eq!(edge(&obb, face, face + 1), Vector3::new(0.0, 0.0, 4.0), epsilon = 1e-9);
            assert_relative_eq!(edge(&obb, face, face + 2), Vector3::new(0.0, 8.0, 0.0), epsilon = 1e-9);
            assert_relative_eq!(edge(&obb, face + 2, face + 3), Vector3::new(0.0, 0.0, 4.0), epsilon = 1e-9);
        }
        // voxel faces, not centres
        assert_relative_eq!(obb.vertices()[0], Vector3::new(3.5, 3.5, 17.5), epsilon = 1e-9);
        assert_relative_eq!(obb.vertices()[7], Vector3::new(15.5, 11.5, 21.5), epsilon = 1e-9);
        // longest x middle = shortest
        let handedness = edge(&obb, 0, 4).cross(&edge(&obb, 0, 2)).dot(&edge(&obb, 0, 1));
        assert!(handedness > 0.0);
    }

    #[test]
    fn test_matches_synthetic_vertex_order() {
        let map = prism_label_map([12, 12, 12], &[(3, [1, 2, 3], [9, 5, 2])]);
        let obb = extract(&PrincipalAxesBoxProvider, &map, 3, 0).unwrap();
        let expected = box_vertices([0.5, 1.5, 2.5], [9.0, 5.0, 2.0]);
        for (v, e) in obb.vertices().iter().zip(expected.iter()) {
            assert_relative_eq!(v, e, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_spacing_scales_extent() {
        let map = prism_label_map([10, 10, 10], &[(1, [2, 2, 2], [6, 4, 2])]);
        let geometry = ImageGeometry::new(
            &[0.0, 0.0, 0.0],
            &[0.5, 1.0, 2.0],
            &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        )
        .unwrap();
        let map = map.with_geometry(geometry).unwrap();
        // physical extents: x 3, y 4, z 4; y and z tie, x is shortest
        let obb = extract(&PrincipalAxesBoxProvider, &map, 1, 0).unwrap();
        let shortest = edge(&obb, 0, 1);
        assert_relative_eq!(shortest.norm(), 3.0, epsilon = 1e-9);
        assert_relative_eq!(shortest.x.abs(), 3.0, epsilon = 1e-9);
        assert_relative_eq!(edge(&obb, 0, 4).norm(), 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_tilted_prism_keeps_axis_signs() {
        // 3-D counterpart of a steep 2-D tilt: x/z rotation past 45 degrees
        let angle = -50.0f64.to_radians();
        let (sin, cos) = angle.sin_cos();
        let (nx, ny, nz) = (80usize, 20usize, 80usize);
        let mut values = vec![0i64; nx * ny * nz];
        for z in 0..nz {
            for y in 4..14 {
                for x in 0..nx {
                    let (dx, dz) = (x as f64 - 40.0, z as f64 - 40.0);
                    let (u, w) = (dx * cos + dz * sin, -dx * sin + dz * cos);
                    if u.abs() <= 25.0 && w.abs() <= 4.0 {
                        values[x + nx * (y + ny * z)] = 1;
                    }
                }
            }
        }
        let map = LabelMap::from_values(vec![nx, ny, nz], values).unwrap();
        let obb = extract(&PrincipalAxesBoxProvider, &map, 1, 0).unwrap();

        let longest = edge(&obb, 0, 4).normalize();
        assert!(longest.x > 0.0);
        assert!((longest.z.atan2(longest.x) - angle).abs() < 1.0f64.to_radians());
        assert!(edge(&obb, 0, 2).y > 0.0);
        let handedness = edge(&obb, 0, 4).cross(&edge(&obb, 0, 2)).dot(&edge(&obb, 0, 1));
        assert!(handedness > 0.0);
    }

    #[test]
    fn test_rectangle_2d_long_edges() {
        let map = rectangle_label_map([30, 20], &[(2, [5, 6], [16, 6])]);
        let obb = extract(&PrincipalAxesBoxProvider, &map, 2, 0).unwrap();
        assert_eq!(obb.vertices().len(), 4);
        assert_eq!(obb.dimension(), Dimension::Two);
        assert_relative_eq!(edge(&obb, 0, 1), Vector3::new(16.0, 0.0, 0.0), epsilon = 1e-9);
        assert_relative_eq!(edge(&obb, 2, 3), Vector3::new(16.0, 0.0, 0.0), epsilon = 1e-9);
        assert_relative_eq!(edge(&obb, 0, 2), Vector3::new(0.0, 6.0, 0.0), epsilon = 1e-9);
        assert!(obb.vertices().iter().all(|v| v.z == 0.0));
    }

    fn long_edge_angle(angle: f64) -> f64 {
        let map = crate::utils::test_utils::rotated_rectangle_label_map(
            [120, 120],
            1,
            (60.0, 60.0),
            (70.0, 18.0),
            angle,
        );
        let obb = extract(&PrincipalAxesBoxProvider, &map, 1, 0).unwrap();
        let long = edge(&obb, 0, 1);
        assert!(long.x > 0.0);
        long.y.atan2(long.x)
    }

    #[test]
    fn test_tilted_rectangle_orientation() {
        let angle = 20.0f64.to_radians();
        let measured = long_edge_angle(angle);
        assert!((measured - angle).abs() < 1.0f64.to_radians(), "measured {}", measured.to_degrees());
    }

    #[test]
    fn test_steep_rectangles_point_along_x() {
        // long edges steeper than 45 degrees keep pointing along +x
        for deg in [-50.0f64, -40.0, 50.0, 70.0] {
            let angle = deg.to_radians();
            let measured = long_edge_angle(angle);
            assert!((measured - angle).abs() < 1.0f64.to_radians(), "{} measured {}", deg, measured.to_degrees());
        }
    }

    #[test]
    fn test_missing_and_background_labels() {
        let map = rectangle_label_map([10, 10], &[(1, [1, 1], [3, 2])]);
        assert_eq!(
            extract(&PrincipalAxesBoxProvider, &map, 4, 0).unwrap_err(),
            GeometryError::LabelNotFound(4)
        );
        assert_eq!(
            extract(&PrincipalAxesBoxProvider, &map, 0, 0).unwrap_err(),
            GeometryError::BackgroundLabel(0)
        );
    }

    #[test]
    fn test_malformed_vertex_count_is_error() {
        let map = prism_label_map([4, 4, 4], &[(1, [0, 0, 0], [2, 2, 1])]);
        let mut provider = PrecomputedBoxProvider::new();
        provider.insert(1, vec![0.0; 8]);
        let err = extract(&provider, &map, 1, 0).unwrap_err();
        assert_eq!(
            err,
            GeometryError::VertexCount {
                label: 1,
                coordinates: 8,
                expected: 24
            }
        );
    }

    #[test]
    fn test_precomputed_provider_round_trip() {
        let map = rectangle_label_map([4, 4], &[(1, [0, 0], [2, 1])]);
        let points = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(4.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(4.0, 1.0, 0.0),
        ];
        let provider = PrecomputedBoxProvider::new().with_points(7, &points, Dimension::Two);
        assert_eq!(provider.labels(), vec![7]);
        let obb = extract(&provider, &map, 7, 0).unwrap();
        assert_eq!(obb.vertices(), &points);
        assert_relative_eq!(obb.centroid(), Vector3::new(2.0, 0.5, 0.0));
    }

    #[test]
    fn test_non_finite_vertices_rejected() {
        let err = OrientedBoundingBox::from_flat(1, Dimension::Two, &[0.0, 0.0, 1.0, f64::NAN, 0.0, 1.0, 1.0, 1.0])
            .unwrap_err();
        assert!(matches!(err, GeometryError::NonFinite(_)));
    }
}
