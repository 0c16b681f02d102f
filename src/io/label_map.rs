use nalgebra::{Matrix3, Vector3};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{GeometryError, Result};
use crate::geometry::{point_from_slice, Dimension, Index};

/// Affine mapping between index space and physical space:
/// `physical = origin + direction * diag(spacing) * index`.
///
/// 2-D geometries are embedded with a zero third origin component, unit third
/// spacing and an identity third direction row/column.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageGeometry {
    dimension: Dimension,
    origin: Vector3<f64>,
    spacing: Vector3<f64>,
    direction: Matrix3<f64>,
    index_to_physical: Matrix3<f64>,
    physical_to_index: Matrix3<f64>,
}

impl ImageGeometry {
    /// `direction` is the row-major direction cosine matrix (4 or 9 values).
    pub fn new(origin: &[f64], spacing: &[f64], direction: &[f64]) -> Result<Self> {
        let dimension = Dimension::from_len(origin.len())?;
        let n = dimension.axes();
        if spacing.len() != n || direction.len() != n * n {
            return Err(GeometryError::dimension_mismatch(format!(
                "origin has {} components but spacing has {} and direction {}",
                n,
                spacing.len(),
                direction.len()
            )));
        }
        if let Some(s) = spacing.iter().find(|s| !s.is_finite() || **s <= 0.0) {
            return Err(GeometryError::invalid_label_map(format!(
                "spacing must be positive and finite, got {}",
                s
            )));
        }
        if origin.iter().chain(direction.iter()).any(|v| !v.is_finite()) {
            return Err(GeometryError::non_finite("origin or direction"));
        }

        let mut dir = Matrix3::identity();
        let mut sp = Vector3::new(1.0, 1.0, 1.0);
        for r in 0..n {
            sp[r] = spacing[r];
            for c in 0..n {
                dir[(r, c)] = direction[r * n + c];
            }
        }
        let origin = point_from_slice(origin)?;
        let index_to_physical = dir * Matrix3::from_diagonal(&sp);
        let physical_to_index = index_to_physical.try_inverse().ok_or_else(|| {
            GeometryError::invalid_label_map("direction matrix is singular")
        })?;

        Ok(Self {
            dimension,
            origin,
            spacing: sp,
            direction: dir,
            index_to_physical,
            physical_to_index,
        })
    }

    /// Zero origin, unit spacing, identity direction.
    pub fn identity(dimension: Dimension) -> Self {
        Self {
            dimension,
            origin: Vector3::zeros(),
            spacing: Vector3::new(1.0, 1.0, 1.0),
            direction: Matrix3::identity(),
            index_to_physical: Matrix3::identity(),
            physical_to_index: Matrix3::identity(),
        }
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn origin(&self) -> &Vector3<f64> {
        &self.origin
    }

    pub fn spacing(&self) -> &Vector3<f64> {
        &self.spacing
    }

    pub fn direction(&self) -> &Matrix3<f64> {
        &self.direction
    }

    /// Physical direction of index axis `axis`, scaled by its spacing.
    pub fn axis_step(&self, axis: usize) -> Vector3<f64> {
        self.index_to_physical.column(axis).into_owned()
    }

    pub fn continuous_index_to_physical(&self, index: &Vector3<f64>) -> Vector3<f64> {
        self.origin + self.index_to_physical * index
    }

    pub fn index_to_physical(&self, index: [usize; 3]) -> Vector3<f64> {
        let idx = Vector3::new(index[0] as f64, index[1] as f64, index[2] as f64);
        self.continuous_index_to_physical(&idx)
    }

    pub fn physical_to_continuous_index(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.physical_to_index * (point - self.origin)
    }

    /// Nearest discrete index; halves round up as in ITK.
    pub fn physical_to_index(&self, point: &Vector3<f64>) -> Result<Index> {
        if point.iter().any(|v| !v.is_finite()) {
            return Err(GeometryError::non_finite(format!(
                "cannot map point ({}, {}, {}) to an index",
                point.x, point.y, point.z
            )));
        }
        let continuous = self.physical_to_continuous_index(point);
        Ok(continuous
            .iter()
            .take(self.dimension.axes())
            .map(|c| (c + 0.5).floor() as i64)
            .collect())
    }
}

impl fmt::Display for ImageGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.dimension.axes();
        let origin: Vec<String> = self.origin.iter().take(n).map(|v| format!("{:.3}", v)).collect();
        let spacing: Vec<String> = self.spacing.iter().take(n).map(|v| format!("{:.3}", v)).collect();
        writeln!(f, "\tOrigin: [{}]", origin.join(", "))?;
        writeln!(f, "\tSpacing: [{}]", spacing.join(", "))?;
        let mut rows = Vec::with_capacity(n);
        for r in 0..n {
            let row: Vec<String> = (0..n).map(|c| format!("{:.3}", self.direction[(r, c)])).collect();
            rows.push(format!("[{}]", row.join(", ")));
        }
        writeln!(f, "\tDirection: [{}]", rows.join(", "))
    }
}

/// Integer label per voxel, stored x-fastest, with its physical geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMap {
    size: Vec<usize>,
    values: Vec<i64>,
    geometry: ImageGeometry,
}

impl LabelMap {
    pub fn new(size: Vec<usize>, values: Vec<i64>, geometry: ImageGeometry) -> Result<Self> {
        let dimension = Dimension::from_len(size.len())?;
        if dimension != geometry.dimension() {
            return Err(GeometryError::dimension_mismatch(format!(
                "label map is {} but its geometry is {}",
                dimension,
                geometry.dimension()
            )));
        }
        if size.iter().any(|&s| s == 0) {
            return Err(GeometryError::invalid_label_map(format!(
                "size {:?} has an empty axis",
                size
            )));
        }
        let expected: usize = size.iter().product();
        if values.len() != expected {
            return Err(GeometryError::invalid_label_map(format!(
                "size {:?} needs {} values, got {}",
                size,
                expected,
                values.len()
            )));
        }
        Ok(Self {
            size,
            values,
            geometry,
        })
    }

    /// Label map with identity geometry.
    pub fn from_values(size: Vec<usize>, values: Vec<i64>) -> Result<Self> {
        let dimension = Dimension::from_len(size.len())?;
        Self::new(size, values, ImageGeometry::identity(dimension))
    }

    pub fn with_geometry(self, geometry: ImageGeometry) -> Result<Self> {
        Self::new(self.size, self.values, geometry)
    }

    pub fn dimension(&self) -> Dimension {
        self.geometry.dimension()
    }

    pub fn size(&self) -> &[usize] {
        &self.size
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }

    pub fn geometry(&self) -> &ImageGeometry {
        &self.geometry
    }

    fn extent3(&self) -> [usize; 3] {
        [
            self.size[0],
            self.size[1],
            self.size.get(2).copied().unwrap_or(1),
        ]
    }

    pub fn value_at(&self, index: &[usize]) -> Option<i64> {
        if index.len() != self.size.len() || index.iter().zip(&self.size).any(|(i, s)| i >= s) {
            return None;
        }
        let [nx, ny, _] = self.extent3();
        let z = index.get(2).copied().unwrap_or(0);
        self.values.get(index[0] + nx * (index[1] + ny * z)).copied()
    }

    /// Indices (third component 0 in 2-D) of every voxel carrying `label`.
    pub fn voxel_indices(&self, label: i64) -> impl Iterator<Item = [usize; 3]> + '_ {
        let [nx, ny, _] = self.extent3();
        self.values
            .iter()
            .enumerate()
            .filter(move |(_, &v)| v == label)
            .map(move |(i, _)| [i % nx, (i / nx) % ny, i / (nx * ny)])
    }

    pub fn voxel_count(&self, label: i64) -> usize {
        self.values.iter().filter(|&&v| v == label).count()
    }

    /// Distinct labels in ascending order, background excluded.
    pub fn labels(&self, background: i64) -> Vec<i64> {
        self.values
            .iter()
            .copied()
            .filter(|&v| v != background)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// 2-D label map at `index` along `axis` of a 3-D map. The slice keeps the
    /// spacing and the direction sub-matrix of the two remaining axes.
    pub fn slice(&self, axis: usize, index: usize) -> Result<LabelMap> {
        if self.dimension() != Dimension::Three {
            return Err(GeometryError::dimension_mismatch(
                "slices can only be taken from a 3-D label map",
            ));
        }
        if axis > 2 || index >= self.size[axis] {
            return Err(GeometryError::invalid_label_map(format!(
                "slice {} along axis {} is outside size {:?}",
                index, axis, self.size
            )));
        }
        let kept: Vec<usize> = (0..3).filter(|&a| a != axis).collect();
        let (a, b) = (kept[0], kept[1]);

        let mut values = Vec::with_capacity(self.size[a] * self.size[b]);
        let mut idx = [0usize; 3];
        idx[axis] = index;
        for j in 0..self.size[b] {
            for i in 0..self.size[a] {
                idx[a] = i;
                idx[b] = j;
                values.push(self.value_at(&idx).unwrap_or_default());
            }
        }

        let mut start = [0usize; 3];
        start[axis] = index;
        let start = self.geometry.index_to_physical(start);
        let dir = self.geometry.direction();
        let sp = self.geometry.spacing();
        let geometry = ImageGeometry::new(
            &[start[a], start[b]],
            &[sp[a], sp[b]],
            &[dir[(a, a)], dir[(a, b)], dir[(b, a)], dir[(b, b)]],
        )?;
        LabelMap::new(vec![self.size[a], self.size[b]], values, geometry)
    }
}

impl fmt::Display for LabelMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "LabelMap ({})", self.dimension())?;
        writeln!(f, "\tSize: {:?}", self.size)?;
        write!(f, "{}", self.geometry)
    }
}
