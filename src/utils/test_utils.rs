use nalgebra::Vector3;

use crate::io::label_map::LabelMap;

/// Enables `log` output in tests; repeated calls are harmless.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 3-D label map with identity geometry holding axis-aligned prisms given as
/// `(label, start index, extent in voxels)`.
pub fn prism_label_map(size: [usize; 3], prisms: &[(i64, [usize; 3], [usize; 3])]) -> LabelMap {
    let [nx, ny, nz] = size;
    let mut values = vec![0i64; nx * ny * nz];
    for (label, start, extent) in prisms {
        for z in start[2]..start[2] + extent[2] {
            for y in start[1]..start[1] + extent[1] {
                for x in start[0]..start[0] + extent[0] {
                    values[x + nx * (y + ny * z)] = *label;
                }
            }
        }
    }
    LabelMap::from_values(size.to_vec(), values).unwrap()
}

/// 2-D counterpart of [`prism_label_map`].
pub fn rectangle_label_map(size: [usize; 2], rects: &[(i64, [usize; 2], [usize; 2])]) -> LabelMap {
    let [nx, ny] = size;
    let mut values = vec![0i64; nx * ny];
    for (label, start, extent) in rects {
        for y in start[1]..start[1] + extent[1] {
            for x in start[0]..start[0] + extent[0] {
                values[x + nx * y] = *label;
            }
        }
    }
    LabelMap::from_values(size.to_vec(), values).unwrap()
}

/// Counter-clockwise rotation about the origin, `angle` in radians.
pub fn rotate_point((x, y): (f64, f64), angle: f64) -> (f64, f64) {
    let (sin, cos) = angle.sin_cos();
    (x * cos - y * sin, x * sin + y * cos)
}

/// Rasterises a `dims = (length, width)` rectangle centred on `center` and
/// rotated by `angle` radians. A pixel belongs to it if its centre does.
pub fn rotated_rectangle_label_map(
    size: [usize; 2],
    label: i64,
    center: (f64, f64),
    dims: (f64, f64),
    angle: f64,
) -> LabelMap {
    let [nx, ny] = size;
    let mut values = vec![0i64; nx * ny];
    for y in 0..ny {
        for x in 0..nx {
            let (u, v) = rotate_point((x as f64 - center.0, y as f64 - center.1), -angle);
            if u.abs() <= dims.0 / 2.0 && v.abs() <= dims.1 / 2.0 {
                values[x + nx * y] = label;
            }
        }
    }
    LabelMap::from_values(size.to_vec(), values).unwrap()
}

/// Vertices of an axis-aligned box with `extents = [x, y, z]`, x longest and
/// z shortest, in provider order: bit 0 of the vertex index steps along z,
/// bit 1 along y, bit 2 along x.
pub fn box_vertices(corner: [f64; 3], extents: [f64; 3]) -> Vec<Vector3<f64>> {
    (0..8)
        .map(|i| {
            Vector3::new(
                corner[0] + if i & 4 == 4 { extents[0] } else { 0.0 },
                corner[1] + if i & 2 == 2 { extents[1] } else { 0.0 },
                corner[2] + if i & 1 == 1 { extents[2] } else { 0.0 },
            )
        })
        .collect()
}

/// Overlays label maps of equal size; later maps win where labels overlap.
pub fn merge_label_maps(maps: &[LabelMap]) -> LabelMap {
    let mut values = maps[0].values().to_vec();
    for map in &maps[1..] {
        for (v, m) in values.iter_mut().zip(map.values()) {
            if *m != 0 {
                *v = *m;
            }
        }
    }
    LabelMap::from_values(maps[0].size().to_vec(), values).unwrap()
}
