use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings of the bounded Levenberg-Marquardt solve (`tiny_solver`) used
/// for the tangent-line intersection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub max_iterations: usize,
    /// Largest relative gradient `|J^T r| / (|J| |r|)` accepted as converged.
    pub tolerance: f64,
    /// Largest residual norm (physical units) accepted for a 2-D crossing.
    pub residual_tolerance: f64,
    /// Lines whose direction sine falls below this are treated as parallel.
    pub parallel_tolerance: f64,
    /// 2-D lines crossing farther away than this many times the spread of
    /// their endpoints are treated as near-parallel.
    pub max_crossing_ratio: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-6,
            residual_tolerance: 1e-6,
            parallel_tolerance: 1e-8,
            max_crossing_ratio: 1e4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CobbConfig {
    /// Label value excluded from bounding-box computation.
    pub background: i64,
    pub solver: SolverConfig,
}

impl Default for CobbConfig {
    fn default() -> Self {
        Self {
            background: 0,
            solver: SolverConfig::default(),
        }
    }
}

impl CobbConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: CobbConfig = toml::from_str(text).context("failed to parse Cobb config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {:?}", path.as_ref()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("invalid config file: {:?}", path.as_ref()))
    }

    /// Loads `path` when given, otherwise the defaults.
    pub fn load_or_default(path: Option<&str>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        let s = &self.solver;
        if s.max_iterations == 0 {
            anyhow::bail!("solver.max_iterations must be at least 1");
        }
        for (name, value) in [
            ("solver.tolerance", s.tolerance),
            ("solver.residual_tolerance", s.residual_tolerance),
            ("solver.parallel_tolerance", s.parallel_tolerance),
            ("solver.max_crossing_ratio", s.max_crossing_ratio),
        ] {
            if !value.is_finite() || value <= 0.0 {
                anyhow::bail!("{} must be a positive finite number, got {}", name, value);
            }
        }
        Ok(())
    }
}
