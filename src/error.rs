//! Error type shared by every stage of the Cobb angle pipeline.

use thiserror::Error;

/// Geometry failures. Every stage returns this type and the orchestrator
/// passes it through unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// The bounding-box primitive returned a coordinate list that does not
    /// describe 4 (2-D) or 8 (3-D) vertices.
    #[error("oriented bounding box of label {label} has {coordinates} coordinates, expected {expected}")]
    VertexCount {
        label: i64,
        coordinates: usize,
        expected: usize,
    },

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Both endpoints of a tangent line coincide.
    #[error("degenerate line: {0}")]
    DegenerateLine(String),

    #[error("ill-conditioned intersection: {0}")]
    IllConditioned(String),

    #[error("least-squares solve did not converge within {max_iterations} iterations (residual {residual_norm:.3e})")]
    NotConverged {
        max_iterations: usize,
        residual_norm: f64,
    },

    #[error("label {0} not present in label map")]
    LabelNotFound(i64),

    #[error("label {0} is the background value")]
    BackgroundLabel(i64),

    #[error("invalid label map: {0}")]
    InvalidLabelMap(String),

    /// A result accessor was called before a successful `execute()`.
    #[error("Cobb angle calculator has not been executed")]
    NotExecuted,

    #[error("non-finite value: {0}")]
    NonFinite(String),
}

pub type Result<T> = std::result::Result<T, GeometryError>;

impl GeometryError {
    pub fn dimension_mismatch(msg: impl Into<String>) -> Self {
        Self::DimensionMismatch(msg.into())
    }

    pub fn degenerate_line(msg: impl Into<String>) -> Self {
        Self::DegenerateLine(msg.into())
    }

    pub fn ill_conditioned(msg: impl Into<String>) -> Self {
        Self::IllConditioned(msg.into())
    }

    pub fn invalid_label_map(msg: impl Into<String>) -> Self {
        Self::InvalidLabelMap(msg.into())
    }

    pub fn non_finite(msg: impl Into<String>) -> Self {
        Self::NonFinite(msg.into())
    }
}
