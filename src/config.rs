//! Configuration enumeration for the core, loaded and validated once at construction.
//!
//! Mirrors the workspace's existing config-struct convention: a plain, serde-derived
//! value tree with a `validate()` pass rather than fallible construction scattered across
//! many call sites.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::error::{SaxsError, SaxsResult};

/// Output q-range and distance-bin axis configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct AxesConfig {
    /// Lower bound of the output q-range, in 1/Å.
    pub qmin: f64,
    /// Upper bound of the output q-range, in 1/Å.
    pub qmax: f64,
    /// Number of distance bins in the accumulators.
    pub bin_count: usize,
    /// Width of a distance bin, in Å.
    pub bin_width: f64,
}

impl Default for AxesConfig {
    fn default() -> Self {
        Self {
            qmin: 1e-4,
            qmax: 1.0,
            bin_count: 1000,
            bin_width: 0.1,
        }
    }
}

/// Selects weighted vs unweighted distance accumulators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct HistConfig {
    /// If true, bins additionally track a weighted mean distance ("vbw" in the source
    /// this was distilled from); if false, plain unweighted counts are used.
    pub weighted_bins: bool,
}

impl Default for HistConfig {
    fn default() -> Self {
        Self {
            weighted_bins: false,
        }
    }
}

/// Parameters driving the optional Grid-exv external collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct GridConfig {
    /// Voxel cell width, in Å. `None` disables the grid-exv path entirely.
    pub cell_width: Option<f64>,
    /// Width of the excluded-volume shell around each atom, in Å.
    pub exv_width: f64,
    /// Thickness of the surface layer used by `GridSurfaceExv`, in Å.
    pub surface_thickness: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            cell_width: None,
            exv_width: 1.0,
            surface_thickness: 3.0,
        }
    }
}

/// Which excluded-volume form-factor strategy a Composite Distance Histogram uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum ExvMethod {
    /// Single averaged excluded-volume form-factor (Average-exv, §4.7).
    Simple,
    /// Explicit per-atom-type form-factors, FoXS-tabulated.
    FoXS,
    /// Explicit-exv plus a Pepsi-style displaced-volume-per-atom scalar.
    Pepsi,
    /// Explicit-exv plus a CRYSOL-style displaced-volume convention.
    CRYSOL,
}

impl Default for ExvMethod {
    fn default() -> Self {
        Self::Simple
    }
}

/// Which Grid-exv interpretation is layered on top of `exv_method` when `grid.cell_width`
/// is configured. Orthogonal to `ExvMethod`; see §4.7 and §9 of the design notes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum GridExvVariant {
    /// cx scales F_E(q) directly; dummy-dummy distances are unscaled.
    Volume,
    /// Volume-scale plus a surface-layer correction term on dummy weights.
    Surface,
    /// cx = k is a radius scale factor; F_E(q;k) and dummy-dummy distances both scale
    /// with k.
    Scalable,
}

impl Default for GridExvVariant {
    fn default() -> Self {
        Self::Volume
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct ExvConfig {
    pub exv_method: ExvMethod,
    pub grid_variant: GridExvVariant,
}

impl Default for ExvConfig {
    fn default() -> Self {
        Self {
            exv_method: ExvMethod::default(),
            grid_variant: GridExvVariant::default(),
        }
    }
}

/// General scheduling knobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct GeneralConfig {
    /// Inner-loop chunk size for task dispatch (outer-index chunking in the full-
    /// recompute manager).
    pub job_size: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { job_size: 1000 }
    }
}

/// The complete, validated configuration surface for the core.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default, Encode, Decode)]
pub struct SaxsConfig {
    pub axes: AxesConfig,
    pub hist: HistConfig,
    pub grid: GridConfig,
    pub exv: ExvConfig,
    pub general: GeneralConfig,
}

impl SaxsConfig {
    /// Validates against the InvalidConfiguration taxonomy (design doc §7).
    pub fn validate(&self) -> SaxsResult<()> {
        if self.axes.qmin >= self.axes.qmax {
            return Err(SaxsError::invalid_config(&format!(
                "qmin ({}) must be less than qmax ({})",
                self.axes.qmin, self.axes.qmax
            )));
        }
        if self.axes.bin_width <= 0.0 {
            return Err(SaxsError::invalid_config(&format!(
                "bin_width must be positive, got {}",
                self.axes.bin_width
            )));
        }
        if self.axes.bin_count < 10 {
            return Err(SaxsError::invalid_config(&format!(
                "bin_count must be at least 10, got {}",
                self.axes.bin_count
            )));
        }
        if let Some(cell_width) = self.grid.cell_width
            && cell_width <= 0.0
        {
            return Err(SaxsError::invalid_config(&format!(
                "grid.cell_width must be positive, got {cell_width}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(SaxsConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_q_range() {
        let mut cfg = SaxsConfig::default();
        cfg.axes.qmin = 1.0;
        cfg.axes.qmax = 0.5;
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.kind, crate::error::SaxsErrorKind::InvalidConfiguration);
    }

    #[test]
    fn rejects_nonpositive_bin_width() {
        let mut cfg = SaxsConfig::default();
        cfg.axes.bin_width = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_small_bin_count() {
        let mut cfg = SaxsConfig::default();
        cfg.axes.bin_count = 3;
        assert!(cfg.validate().is_err());
    }
}
