use anyhow::{anyhow, bail, Context, Result};
use csv::ReaderBuilder;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::geometry::{Dimension, PrecomputedBoxProvider};
use crate::io::label_map::{ImageGeometry, LabelMap};

/// Utility: detect whether the file uses comma or tab as delimiter.
fn detect_delimiter<P: AsRef<Path>>(path: P) -> Result<u8> {
    let file = File::open(&path).with_context(|| {
        format!(
            "failed to open file for delimiter sniffing: {:?}",
            path.as_ref()
        )
    })?;
    let mut reader = BufReader::new(file);
    let mut first_line = String::new();
    reader
        .read_line(&mut first_line)
        .with_context(|| "failed to read first line for delimiter detection")?;

    let tabs = first_line.matches('\t').count();
    let commas = first_line.matches(',').count();
    Ok(if tabs > commas { b'\t' } else { b',' })
}

/// Element type of a raw label buffer, little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelType {
    U8,
    U16,
    I16,
    I32,
}

impl PixelType {
    pub fn byte_size(self) -> usize {
        match self {
            PixelType::U8 => 1,
            PixelType::U16 | PixelType::I16 => 2,
            PixelType::I32 => 4,
        }
    }

    fn decode(self, bytes: &[u8]) -> Vec<i64> {
        let n = self.byte_size();
        bytes
            .chunks_exact(n)
            .map(|b| match self {
                PixelType::U8 => b[0] as i64,
                PixelType::U16 => u16::from_le_bytes([b[0], b[1]]) as i64,
                PixelType::I16 => i16::from_le_bytes([b[0], b[1]]) as i64,
                PixelType::I32 => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64,
            })
            .collect()
    }
}

/// Geometry shared by the TOML and JSON label map formats. Missing entries
/// default to zero origin, unit spacing and identity direction.
#[derive(Debug, Clone, Deserialize)]
pub struct GeometryHeader {
    pub size: Vec<usize>,
    pub origin: Option<Vec<f64>>,
    pub spacing: Option<Vec<f64>>,
    /// Row-major direction cosines.
    pub direction: Option<Vec<f64>>,
}

impl GeometryHeader {
    pub fn image_geometry(&self) -> Result<ImageGeometry> {
        let dimension = Dimension::from_len(self.size.len())?;
        let n = dimension.axes();
        let origin = self.origin.clone().unwrap_or_else(|| vec![0.0; n]);
        let spacing = self.spacing.clone().unwrap_or_else(|| vec![1.0; n]);
        let direction = self.direction.clone().unwrap_or_else(|| {
            (0..n * n)
                .map(|i| if i / n == i % n { 1.0 } else { 0.0 })
                .collect()
        });
        Ok(ImageGeometry::new(&origin, &spacing, &direction)?)
    }
}

/// TOML header pointing at a raw voxel buffer (x fastest).
///
/// ```toml
/// size = [64, 64, 40]
/// spacing = [0.8, 0.8, 2.5]
/// data = "labels.raw"
/// pixel_type = "u16"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct LabelMapHeader {
    #[serde(flatten)]
    pub geometry: GeometryHeader,
    /// Raw data file, relative to the header's directory.
    pub data: PathBuf,
    pub pixel_type: PixelType,
}

/// Label map with inline values, for small maps and fixtures.
#[derive(Debug, Clone, Deserialize)]
pub struct LabelMapJson {
    #[serde(flatten)]
    pub geometry: GeometryHeader,
    pub values: Vec<i64>,
}

pub fn read_label_map_header<P: AsRef<Path>>(path: P) -> Result<LabelMap> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read label map header: {:?}", path))?;
    let header: LabelMapHeader = toml::from_str(&text)
        .with_context(|| format!("failed to parse label map header: {:?}", path))?;

    let expected = header
        .geometry
        .size
        .iter()
        .try_fold(header.pixel_type.byte_size(), |acc, &n| acc.checked_mul(n));
    let Some(expected) = expected else {
        bail!(
            "label map size {:?} in {:?} overflows the addressable byte count",
            header.geometry.size,
            path
        );
    };

    let data_path = path
        .parent()
        .map(|dir| dir.join(&header.data))
        .unwrap_or_else(|| header.data.clone());
    let bytes = std::fs::read(&data_path)
        .with_context(|| format!("failed to read raw label data: {:?}", data_path))?;

    if bytes.len() != expected {
        bail!(
            "raw label data {:?} has {} bytes, header {:?} needs {}",
            data_path,
            bytes.len(),
            header.geometry.size,
            expected
        );
    }

    let values = header.pixel_type.decode(&bytes);
    let geometry = header.geometry.image_geometry()?;
    LabelMap::new(header.geometry.size.clone(), values, geometry)
        .with_context(|| format!("invalid label map in {:?}", path))
}

pub fn read_label_map_json<P: AsRef<Path>>(path: P) -> Result<LabelMap> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("failed to open label map: {:?}", path))?;
    let parsed: LabelMapJson = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse label map JSON: {:?}", path))?;
    let geometry = parsed.geometry.image_geometry()?;
    LabelMap::new(parsed.geometry.size, parsed.values, geometry)
        .with_context(|| format!("invalid label map in {:?}", path))
}

/// Grayscale PNG as a 2-D label map with identity geometry. 8- and 16-bit
/// images are read without rescaling; colour images are rejected.
pub fn read_label_map_png<P: AsRef<Path>>(path: P) -> Result<LabelMap> {
    let path = path.as_ref();
    let img = image::open(path).with_context(|| format!("failed to open PNG: {:?}", path))?;
    let (size, values): (Vec<usize>, Vec<i64>) = match img {
        image::DynamicImage::ImageLuma8(buf) => {
            let (w, h) = buf.dimensions();
            (vec![w as usize, h as usize], buf.into_raw().into_iter().map(i64::from).collect())
        }
        image::DynamicImage::ImageLuma16(buf) => {
            let (w, h) = buf.dimensions();
            (vec![w as usize, h as usize], buf.into_raw().into_iter().map(i64::from).collect())
        }
        other => bail!(
            "{:?} is a {:?} image, label maps must be 8- or 16-bit grayscale",
            path,
            other.color()
        ),
    };
    LabelMap::from_values(size, values).with_context(|| format!("invalid label map in {:?}", path))
}

/// Picks the reader from the file extension: `.png`, `.toml` or `.json`.
pub fn load_label_map<P: AsRef<Path>>(path: P) -> Result<LabelMap> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .ok_or_else(|| anyhow!("label map path {:?} has no extension", path))?;
    match ext.as_str() {
        "png" => read_label_map_png(path),
        "toml" => read_label_map_header(path),
        "json" => read_label_map_json(path),
        other => bail!("unsupported label map format '.{}' for {:?}", other, path),
    }
}

#[derive(Debug, Deserialize)]
struct BoxVertexRecord {
    label: i64,
    x: f64,
    y: f64,
    z: Option<f64>,
}

/// Reads OBB vertices exported by an external tool, one `label,x,y[,z]` row
/// per vertex, vertices of a label in provider order.
pub fn read_box_vertices<P: AsRef<Path>>(path: P) -> Result<PrecomputedBoxProvider> {
    let path = path.as_ref();
    let delimiter = detect_delimiter(path)?;
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open box vertex file: {:?}", path))?;

    let mut provider = PrecomputedBoxProvider::new();
    let mut dimension: Option<Dimension> = None;
    for (row, record) in rdr.deserialize::<BoxVertexRecord>().enumerate() {
        let record = record.with_context(|| format!("invalid box vertex at row {} of {:?}", row + 1, path))?;
        let this = if record.z.is_some() { Dimension::Three } else { Dimension::Two };
        match dimension {
            Some(d) if d != this => bail!("row {} of {:?} mixes 2-D and 3-D vertices", row + 1, path),
            _ => dimension = Some(this),
        }
        match record.z {
            Some(z) => provider.push_vertex(record.label, &[record.x, record.y, z]),
            None => provider.push_vertex(record.label, &[record.x, record.y]),
        }
    }
    if provider.labels().is_empty() {
        bail!("no box vertices in {:?}", path);
    }
    Ok(provider)
}
